use anyhow::Result;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;

use revgrad::data::CsvDataset;
use revgrad::models::Mlp;
use revgrad::ops;
use revgrad::optim::Sgd;
use revgrad::{Tape, TrainConfig};

#[derive(Serialize)]
struct History {
    config: TrainConfig,
    epoch_loss: Vec<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let config = TrainConfig::default();
    let dataset = match std::env::args().nth(1) {
        Some(path) => CsvDataset::from_path(path)?,
        None => CsvDataset::from_reader(synthetic_csv(&config).as_bytes())?,
    };
    println!(
        "dataset: {} rows, {} features, {} classes",
        dataset.len(),
        dataset.num_features(),
        dataset.num_classes()
    );

    let mut tape = Tape::new();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let model = Mlp::new(&mut tape, &[dataset.num_features(), 16, dataset.num_classes()], &mut rng)?;
    let params = model.params();
    let mut optimizer = Sgd::new(config.learning_rate, config.momentum);

    let mut history = History { config: config.clone(), epoch_loss: Vec::new() };

    for epoch in 0..config.epochs {
        let order = dataset.shuffled_indices(&mut rng);
        let mut epoch_loss = 0.0;
        let mut batches = 0;
        for chunk in order.chunks(config.batch_size) {
            let (features, targets) = dataset.batch(chunk)?;
            let x = tape.alloc_from(features)?;
            let t = tape.alloc_from(targets)?;
            let logits = model.forward(&mut tape, x)?;
            let loss = ops::softmax_cross_entropy(&mut tape, logits, t)?;
            epoch_loss += tape.value(loss)?[[0, 0]];
            batches += 1;

            tape.zero_grad(&params)?;
            tape.backward(loss)?;
            optimizer.step(&mut tape, &params)?;
            tape.reset(&params)?;
        }
        let mean_loss = epoch_loss / batches as f64;
        history.epoch_loss.push(mean_loss);
        if epoch % 10 == 0 || epoch + 1 == config.epochs {
            println!("epoch {epoch}: mean loss = {mean_loss:.6}");
        }
    }

    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

/// Three Gaussian blobs, one per class, two features each.
fn synthetic_csv(config: &TrainConfig) -> String {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let centers = [(-2.0, -2.0), (2.0, -2.0), (0.0, 2.0)];
    let mut out = String::new();
    for (class, &(cx, cy)) in centers.iter().enumerate() {
        for _ in 0..40 {
            let x: f64 = cx + rng.gen_range(-0.8..0.8);
            let y: f64 = cy + rng.gen_range(-0.8..0.8);
            out.push_str(&format!("{x:.4},{y:.4},{class}\n"));
        }
    }
    out
}
