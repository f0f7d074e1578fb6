//! CSV dataset ingestion and mini-batch iteration.

use std::io::Read;
use std::path::Path;

use ndarray::{Array2, ArrayD};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::errors::{GradError, GradResult};

/// An in-memory classification dataset: a dense feature matrix and one
/// integer class label per row. The last CSV column is the label, everything
/// before it a feature.
#[derive(Debug)]
pub struct CsvDataset {
    features: Array2<f64>,
    labels: Vec<usize>,
    num_classes: usize,
}

impl CsvDataset {
    pub fn from_path<P: AsRef<Path>>(path: P) -> GradResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> GradResult<Self> {
        let mut csv = csv::ReaderBuilder::new().has_headers(false).from_reader(reader);
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut labels: Vec<usize> = Vec::new();
        for record in csv.records() {
            let record = record.map_err(|e| GradError::Dataset(e.to_string()))?;
            if record.len() < 2 {
                return Err(GradError::Dataset(format!(
                    "row {} has {} columns; need at least one feature and a label",
                    rows.len() + 1,
                    record.len()
                )));
            }
            let mut row = Vec::with_capacity(record.len() - 1);
            for field in record.iter().take(record.len() - 1) {
                let value: f64 = field
                    .trim()
                    .parse()
                    .map_err(|_| GradError::Dataset(format!("bad feature value {field:?}")))?;
                row.push(value);
            }
            let label_field = &record[record.len() - 1];
            let label: usize = label_field
                .trim()
                .parse()
                .map_err(|_| GradError::Dataset(format!("bad class label {label_field:?}")))?;
            if let Some(first) = rows.first() {
                if first.len() != row.len() {
                    return Err(GradError::Dataset(format!(
                        "row {} has {} features; expected {}",
                        rows.len() + 1,
                        row.len(),
                        first.len()
                    )));
                }
            }
            rows.push(row);
            labels.push(label);
        }
        if rows.is_empty() {
            return Err(GradError::Dataset("empty dataset".to_string()));
        }
        let num_features = rows[0].len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((labels.len(), num_features), flat)
            .map_err(|e| GradError::Dataset(e.to_string()))?;
        let num_classes = labels.iter().max().copied().unwrap_or(0) + 1;
        Ok(Self { features, labels, num_classes })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// A freshly shuffled index permutation over the rows.
    pub fn shuffled_indices(&self, rng: &mut StdRng) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);
        indices
    }

    /// Materializes the rows at `indices` as a `[batch, features]` matrix
    /// and a one-hot `[batch, classes]` target matrix.
    pub fn batch(&self, indices: &[usize]) -> GradResult<(ArrayD<f64>, ArrayD<f64>)> {
        let mut features = Array2::<f64>::zeros((indices.len(), self.num_features()));
        let mut targets = Array2::<f64>::zeros((indices.len(), self.num_classes));
        for (row, &index) in indices.iter().enumerate() {
            if index >= self.len() {
                return Err(GradError::IndexOutOfBounds { index, limit: self.len() });
            }
            features.row_mut(row).assign(&self.features.row(index));
            targets[[row, self.labels[index]]] = 1.0;
        }
        Ok((features.into_dyn(), targets.into_dyn()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const SAMPLE: &str = "0.5,1.0,0\n0.25,0.75,1\n0.0,0.1,2\n";

    #[test]
    fn parses_features_and_labels() {
        let ds = CsvDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_features(), 2);
        assert_eq!(ds.num_classes(), 3);
    }

    #[test]
    fn one_hot_targets() {
        let ds = CsvDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let (features, targets) = ds.batch(&[1, 2]).unwrap();
        assert_eq!(features.shape(), &[2, 2]);
        assert_eq!(targets.shape(), &[2, 3]);
        assert_eq!(targets[[0, 1]], 1.0);
        assert_eq!(targets[[1, 2]], 1.0);
        assert_eq!(targets[[0, 0]], 0.0);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let ds = CsvDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut indices = ds.shuffled_indices(&mut rng);
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = CsvDataset::from_reader("1.0,2.0,0\n1.0,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, GradError::Dataset(_)));
    }
}
