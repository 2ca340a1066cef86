//! Chronological train/test split

use tracing::debug;

use super::types::Dataset;
use crate::error::{PipelineError, PipelineResult};

/// Splits a dataset by time: the trailing slice becomes the test set
#[derive(Debug, Clone, Copy)]
pub struct DatasetSplitter {
    test_fraction: f64,
}

impl Default for DatasetSplitter {
    fn default() -> Self {
        Self { test_fraction: 0.2 }
    }
}

impl DatasetSplitter {
    /// `test_fraction` must lie strictly between 0 and 1
    pub fn new(test_fraction: f64) -> PipelineResult<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test_fraction must lie in (0, 1), got {}",
                test_fraction
            )));
        }
        Ok(Self { test_fraction })
    }

    /// Number of rows the test set receives out of `n`
    pub fn test_len(&self, n: usize) -> usize {
        ((self.test_fraction * n as f64).round() as usize).min(n)
    }

    /// Split without shuffling; `train ++ test` equals the input
    pub fn split(&self, dataset: &Dataset) -> (Dataset, Dataset) {
        let n = dataset.len();
        let train_len = n - self.test_len(n);
        let (train, test) = dataset.split_at(train_len);

        debug!(
            "Chronological split: {} train rows, {} test rows",
            train.len(),
            test.len()
        );

        (train, test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FeatureRow, LabeledExample, PriceBar};
    use chrono::{Duration, NaiveDate};

    fn dataset(n: usize) -> Dataset {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        Dataset::new(
            (0..n)
                .map(|i| LabeledExample {
                    row: FeatureRow {
                        bar: PriceBar {
                            date: start + Duration::days(i as i64),
                            open: i as f64,
                            high: i as f64,
                            low: i as f64,
                            close: i as f64,
                            volume: 1.0,
                        },
                        ret: 0.0,
                        ma5: 0.0,
                        ma10: 0.0,
                        rsi: 50.0,
                    },
                    label: (i % 2) as u8,
                })
                .collect(),
        )
    }

    #[test]
    fn test_default_eighty_twenty() {
        let (train, test) = DatasetSplitter::default().split(&dataset(100));
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        assert!(train.examples.last().unwrap().row.date() < test.examples[0].row.date());
    }

    #[test]
    fn test_test_len_rounds() {
        let splitter = DatasetSplitter::new(0.2).unwrap();
        assert_eq!(splitter.test_len(7), 1); // 1.4
        assert_eq!(splitter.test_len(8), 2); // 1.6
        assert_eq!(splitter.test_len(0), 0);

        let half = DatasetSplitter::new(0.5).unwrap();
        assert_eq!(half.test_len(5), 3); // 2.5 rounds away from zero
    }

    #[test]
    fn test_concatenation_reconstructs_input() {
        let fractions = [0.01, 0.1, 0.2, 0.33, 0.5, 0.75, 0.99];
        for n in 1..60 {
            let data = dataset(n);
            for fraction in fractions {
                let (train, test) = DatasetSplitter::new(fraction).unwrap().split(&data);
                let mut joined = train.examples.clone();
                joined.extend(test.examples.iter().copied());

                assert_eq!(joined, data.examples, "n = {n}, fraction = {fraction}");
                assert_eq!(train.len() + test.len(), n);
            }
        }
    }

    #[test]
    fn test_invalid_fraction() {
        for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            assert!(DatasetSplitter::new(fraction).is_err());
        }
    }
}
