use ndarray::{array, Array2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use revgrad::models::Mlp;
use revgrad::ops;
use revgrad::optim::Sgd;
use revgrad::{Tape, TensorId};

fn batch_loss(tape: &mut Tape, model: &Mlp, x: TensorId, t: TensorId) -> f64 {
    let logits = model.forward(tape, x).unwrap();
    let loss = ops::softmax_cross_entropy(tape, logits, t).unwrap();
    tape.value(loss).unwrap()[[0, 0]]
}

#[test]
fn test_one_descent_step_decreases_loss() {
    let mut tape = Tape::new();
    let mut rng = StdRng::seed_from_u64(3);

    // Two-layer MLP with random weights and one-hot targets.
    let model = Mlp::new(&mut tape, &[4, 8, 3], &mut rng).unwrap();
    let params = model.params();

    let features: Array2<f64> = Array2::random_using((6, 4), StandardNormal, &mut rng);
    let mut targets = Array2::<f64>::zeros((6, 3));
    for row in 0..6 {
        targets[[row, row % 3]] = 1.0;
    }

    let x = tape.alloc_from(features.into_dyn()).unwrap();
    let t = tape.alloc_from(targets.into_dyn()).unwrap();
    let mut keep = params.clone();
    keep.push(x);
    keep.push(t);

    let logits = model.forward(&mut tape, x).unwrap();
    let loss = ops::softmax_cross_entropy(&mut tape, logits, t).unwrap();
    let before = tape.value(loss).unwrap()[[0, 0]];

    tape.zero_grad(&params).unwrap();
    tape.backward(loss).unwrap();
    let mut optimizer = Sgd::new(0.1, 0.0);
    optimizer.step(&mut tape, &params).unwrap();
    tape.reset(&keep).unwrap();

    let after = batch_loss(&mut tape, &model, x, t);
    assert!(
        after < before,
        "loss should drop after one SGD step (before {before}, after {after})"
    );
}

#[test]
fn test_momentum_sgd_converges_on_quadratic() {
    let mut tape = Tape::new();

    // Minimize MSE between a free parameter and a fixed target column.
    let w = tape.alloc_from(array![[0.0], [0.0]].into_dyn()).unwrap();
    let target = tape.alloc_from(array![[1.0], [-2.0]].into_dyn()).unwrap();
    let keep = vec![w, target];
    let mut optimizer = Sgd::new(0.2, 0.9);

    let mut last = f64::INFINITY;
    for _ in 0..200 {
        let loss = ops::mse(&mut tape, w, target).unwrap();
        last = tape.value(loss).unwrap()[[0, 0]];
        tape.zero_grad(&[w]).unwrap();
        tape.backward(loss).unwrap();
        optimizer.step(&mut tape, &[w]).unwrap();
        tape.reset(&keep).unwrap();
    }

    assert!(last < 1e-3, "momentum SGD should converge (final loss {last})");
    let w_value = tape.value(w).unwrap();
    assert!((w_value[[0, 0]] - 1.0).abs() < 0.1);
    assert!((w_value[[1, 0]] + 2.0).abs() < 0.1);
}

#[test]
fn test_optimizer_skips_parameters_without_gradients() {
    let mut tape = Tape::new();
    let w = tape.alloc_from(array![[1.0, 2.0]].into_dyn()).unwrap();
    let mut optimizer = Sgd::new(0.5, 0.9);

    optimizer.step(&mut tape, &[w]).unwrap();
    assert_eq!(*tape.value(w).unwrap(), array![[1.0, 2.0]].into_dyn());
}

#[test]
fn test_gradient_accumulation_across_micro_batches() {
    let mut tape = Tape::new();
    let w = tape.alloc_from(array![[2.0]].into_dyn()).unwrap();

    // Two micro-batches, no zero_grad between: contributions sum.
    for _ in 0..2 {
        let y = ops::relu(&mut tape, w).unwrap();
        let root = ops::sum(&mut tape, y).unwrap();
        tape.backward(root).unwrap();
        tape.reset(&[w]).unwrap();
    }
    assert_eq!(tape.grad(w).unwrap().unwrap()[[0, 0]], 2.0);
}
