use ndarray::array;
use revgrad::ops;
use revgrad::{GradError, Tape};

#[test]
fn test_relu_scalar_scenario() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[-1.0, 2.0, -3.0, 4.0]].into_dyn()).unwrap();
    let y = ops::relu(&mut tape, x).unwrap();
    let z = ops::sum(&mut tape, y).unwrap();

    assert_eq!(tape.value(z).unwrap()[[0, 0]], 6.0);

    tape.backward(z).unwrap();
    assert_eq!(*tape.grad(x).unwrap().unwrap(), array![[0.0, 1.0, 0.0, 1.0]].into_dyn());
}

#[test]
fn test_mse_scenario() {
    let mut tape = Tape::new();
    let pred = tape
        .alloc_from(array![[1.0], [2.0], [3.0], [4.0]].into_dyn())
        .unwrap();
    let target = tape
        .alloc_from(array![[1.0], [1.0], [1.0], [1.0]].into_dyn())
        .unwrap();
    let loss = ops::mse(&mut tape, pred, target).unwrap();

    assert_eq!(tape.value(loss).unwrap()[[0, 0]], 1.75);

    tape.backward(loss).unwrap();
    assert_eq!(
        *tape.grad(pred).unwrap().unwrap(),
        array![[0.0], [0.25], [0.5], [0.75]].into_dyn()
    );
    assert_eq!(
        *tape.grad(target).unwrap().unwrap(),
        array![[0.0], [-0.25], [-0.5], [-0.75]].into_dyn()
    );
}

#[test]
fn test_linear_scenario() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[1.0, 2.0]].into_dyn()).unwrap();
    let w = tape
        .alloc_from(array![[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]].into_dyn())
        .unwrap();
    let b = tape.alloc_from(array![[0.0], [0.0], [0.0]].into_dyn()).unwrap();

    let out = ops::linear(&mut tape, x, w, b).unwrap();
    assert_eq!(*tape.value(out).unwrap(), array![[1.0, 2.0, 3.0]].into_dyn());

    // Seed grad_out = [[1, 1, 1]] by summing to a scalar root.
    let root = ops::sum(&mut tape, out).unwrap();
    tape.backward(root).unwrap();

    assert_eq!(*tape.grad(x).unwrap().unwrap(), array![[2.0, 2.0]].into_dyn());
    assert_eq!(
        *tape.grad(w).unwrap().unwrap(),
        array![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]].into_dyn()
    );
    assert_eq!(*tape.grad(b).unwrap().unwrap(), array![[1.0], [1.0], [1.0]].into_dyn());
}

#[test]
fn test_chained_relu_passes_gradient() {
    for (input, expected) in [(2.0, 1.0), (-2.0, 0.0)] {
        let mut tape = Tape::new();
        let x = tape.alloc_from(array![[input]].into_dyn()).unwrap();
        let y = ops::relu(&mut tape, x).unwrap();
        let z = ops::relu(&mut tape, y).unwrap();
        let loss = ops::sum(&mut tape, z).unwrap();
        tape.backward(loss).unwrap();
        assert_eq!(tape.grad(x).unwrap().unwrap()[[0, 0]], expected);
    }
}

#[test]
fn test_two_backwards_double_gradients() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[1.0, 2.0], [3.0, 4.0]].into_dyn()).unwrap();
    let y = ops::relu(&mut tape, x).unwrap();
    let z = ops::sum(&mut tape, y).unwrap();

    tape.backward(z).unwrap();
    let once = tape.grad(x).unwrap().unwrap().clone();
    let once_interior = tape.grad(y).unwrap().unwrap().clone();

    tape.backward(z).unwrap();
    assert_eq!(*tape.grad(x).unwrap().unwrap(), &once * 2.0);
    assert_eq!(*tape.grad(y).unwrap().unwrap(), &once_interior * 2.0);
}

#[test]
fn test_zero_grad_round_trip() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[1.0, 2.0]].into_dyn()).unwrap();
    let y = ops::relu(&mut tape, x).unwrap();
    let z = ops::sum(&mut tape, y).unwrap();

    tape.zero_grad(&[x]).unwrap();
    tape.backward(z).unwrap();
    assert_eq!(*tape.grad(x).unwrap().unwrap(), array![[1.0, 1.0]].into_dyn());

    tape.zero_grad(&[x]).unwrap();
    assert_eq!(*tape.grad(x).unwrap().unwrap(), array![[0.0, 0.0]].into_dyn());
}

#[test]
fn test_duplicate_operand_counts_every_appearance() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[3.0]].into_dyn()).unwrap();
    // x appears in both slots of the same addition.
    let doubled = ops::add(&mut tape, x, x).unwrap();
    let root = ops::sum(&mut tape, doubled).unwrap();

    tape.backward(root).unwrap();
    assert_eq!(tape.grad(x).unwrap().unwrap()[[0, 0]], 2.0);
}

#[test]
fn test_operand_shared_across_consumers() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[1.0, 1.0]].into_dyn()).unwrap();
    let w = tape.alloc_from(array![[2.0, 0.0], [0.0, 2.0]].into_dyn()).unwrap();

    // w feeds a matmul; its product also feeds an addition with x.
    let prod = ops::matmul(&mut tape, x, w).unwrap();
    let merged = ops::add(&mut tape, prod, x).unwrap();
    let root = ops::sum(&mut tape, merged).unwrap();

    tape.backward(root).unwrap();

    // x receives the matmul path (. w^T = [2, 2]) plus the add path ([1, 1]).
    assert_eq!(*tape.grad(x).unwrap().unwrap(), array![[3.0, 3.0]].into_dyn());
    assert_eq!(*tape.grad(w).unwrap().unwrap(), array![[1.0, 1.0], [1.0, 1.0]].into_dyn());
}

#[test]
fn test_non_scalar_root_seeds_ones() {
    let mut tape = Tape::new();
    let x = tape.alloc_from(array![[5.0, 6.0, 7.0]].into_dyn()).unwrap();
    tape.backward(x).unwrap();
    assert_eq!(*tape.grad(x).unwrap().unwrap(), array![[1.0, 1.0, 1.0]].into_dyn());
}

#[test]
fn test_invalid_root() {
    let mut tape = Tape::new();
    let untracked = tape.tensors.alloc_from(array![[1.0]].into_dyn()).unwrap();
    assert!(matches!(tape.backward(untracked), Err(GradError::InvalidRoot)));

    let tracked = tape.alloc_from(array![[1.0]].into_dyn()).unwrap();
    tape.free(tracked).unwrap();
    assert!(matches!(tape.backward(tracked), Err(GradError::InvalidRoot)));
}

#[test]
fn test_softmax_cross_entropy_gradients() {
    let mut tape = Tape::new();
    let logits = tape
        .alloc_from(array![[2.0, 1.0, 0.0], [0.0, 0.0, 0.0]].into_dyn())
        .unwrap();
    let targets = tape
        .alloc_from(array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]].into_dyn())
        .unwrap();
    let loss = ops::softmax_cross_entropy(&mut tape, logits, targets).unwrap();
    tape.backward(loss).unwrap();

    let grad = tape.grad(logits).unwrap().unwrap();
    // Each row of the gradient sums to zero for one-hot targets.
    for i in 0..2 {
        let row_sum: f64 = (0..3).map(|j| grad[[i, j]]).sum();
        assert!(row_sum.abs() < 1e-12);
    }
    // Uniform logits with a one-hot target: softmax is 1/3 everywhere.
    assert!((grad[[1, 0]] - (1.0 / 3.0) / 2.0).abs() < 1e-12);
    assert!((grad[[1, 1]] - ((1.0 / 3.0) - 1.0) / 2.0).abs() < 1e-12);

    // Loss value: row 0 is -log softmax(2.0 | [2,1,0]), row 1 is -log(1/3).
    let row0 = {
        let denom: f64 = [2.0f64, 1.0, 0.0].iter().map(|v| (v - 2.0f64).exp()).sum();
        -(1.0f64 / denom).ln()
    };
    let expected = (row0 + (3.0f64).ln()) / 2.0;
    assert!((tape.value(loss).unwrap()[[0, 0]] - expected).abs() < 1e-12);
}
