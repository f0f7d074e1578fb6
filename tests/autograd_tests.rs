use ndarray::array;
use revgrad::ops;
use revgrad::Tape;

#[test]
fn test_autograd_simple_chain() {
    let mut tape = Tape::new();

    // z = sum(relu(x + w))
    let x = tape.alloc_from(array![[1.0, -2.0]].into_dyn()).unwrap();
    let w = tape.alloc_from(array![[0.5, 0.5]].into_dyn()).unwrap();
    let s = ops::add(&mut tape, x, w).unwrap();
    let out = ops::relu(&mut tape, s).unwrap();

    assert_eq!(*tape.value(out).unwrap(), array![[1.5, 0.0]].into_dyn());

    let root = ops::sum(&mut tape, out).unwrap();
    tape.backward(root).unwrap();

    // Grad wrt w: 1.0 where the sum was positive, 0.0 elsewhere
    assert_eq!(*tape.grad(w).unwrap().unwrap(), array![[1.0, 0.0]].into_dyn());
}

#[test]
fn test_autograd_matmul() {
    let mut tape = Tape::new();

    // y = x . w
    let x = tape.alloc_from(array![[1.0, 2.0]].into_dyn()).unwrap();
    let w = tape.alloc_from(array![[0.5, 0.1], [0.2, 0.4]].into_dyn()).unwrap();
    let out = ops::matmul(&mut tape, x, w).unwrap();
    let root = ops::sum(&mut tape, out).unwrap();

    tape.backward(root).unwrap();

    // Grad wrt w: x^T . grad_out = [[1], [2]] . [[1, 1]] = [[1, 1], [2, 2]]
    assert_eq!(*tape.grad(w).unwrap().unwrap(), array![[1.0, 1.0], [2.0, 2.0]].into_dyn());

    // Grad wrt x: grad_out . w^T = [[0.6, 0.6]]
    let grad_x = tape.grad(x).unwrap().unwrap();
    assert!((grad_x[[0, 0]] - 0.6).abs() < 1e-12);
    assert!((grad_x[[0, 1]] - 0.6).abs() < 1e-12);
}
