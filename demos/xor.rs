use anyhow::Result;
use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;

use revgrad::layers::Linear;
use revgrad::ops;
use revgrad::optim::Sgd;
use revgrad::Tape;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
    println!("XOR training (tape API)");

    let mut tape = Tape::new();
    let mut rng = StdRng::seed_from_u64(1);

    let inputs = tape.alloc_from(
        array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]].into_dyn(),
    )?;
    let targets = tape.alloc_from(array![[0.0], [1.0], [1.0], [0.0]].into_dyn())?;

    // 2 -> 4 -> 1
    let hidden = Linear::new(&mut tape, 2, 4, &mut rng)?;
    let output = Linear::new(&mut tape, 4, 1, &mut rng)?;

    let mut params = Vec::new();
    params.extend(hidden.params());
    params.extend(output.params());

    let mut keep = params.clone();
    keep.push(inputs);
    keep.push(targets);

    let mut optimizer = Sgd::new(0.5, 0.9);

    for epoch in 0..5001 {
        let h = hidden.forward(&mut tape, inputs)?;
        let a = ops::sigmoid(&mut tape, h)?;
        let o = output.forward(&mut tape, a)?;
        let pred = ops::sigmoid(&mut tape, o)?;
        let loss = ops::mse(&mut tape, pred, targets)?;

        let loss_value = tape.value(loss)?[[0, 0]];

        tape.zero_grad(&params)?;
        tape.backward(loss)?;
        optimizer.step(&mut tape, &params)?;
        tape.reset(&keep)?;

        if epoch % 1000 == 0 {
            println!("epoch {epoch}: loss = {loss_value:.6}");
        }
    }

    // Final predictions
    let h = hidden.forward(&mut tape, inputs)?;
    let a = ops::sigmoid(&mut tape, h)?;
    let o = output.forward(&mut tape, a)?;
    let pred = ops::sigmoid(&mut tape, o)?;
    println!("final predictions:\n{:?}", tape.value(pred)?);

    Ok(())
}
