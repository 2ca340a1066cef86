//! Data types for daily price data
//!
//! This module defines the core data structures passed between pipeline
//! stages. Each stage produces a new value; nothing is mutated in place.

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Feature columns in the order the model and the exported graph expect them
pub const FEATURE_COLUMNS: [&str; 9] = [
    "Open", "High", "Low", "Close", "Volume", "ma5", "ma10", "rsi", "return",
];

/// Number of model input features
pub const NUM_FEATURES: usize = FEATURE_COLUMNS.len();

/// Daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Trading day
    pub date: NaiveDate,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Traded volume
    pub volume: f64,
}

/// Price bar with its derived indicators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Source bar
    pub bar: PriceBar,
    /// Close-to-close return
    pub ret: f64,
    /// Short simple moving average of close
    pub ma5: f64,
    /// Long simple moving average of close
    pub ma10: f64,
    /// Relative strength index
    pub rsi: f64,
}

impl FeatureRow {
    /// Model inputs in [`FEATURE_COLUMNS`] order
    pub fn features(&self) -> [f64; NUM_FEATURES] {
        [
            self.bar.open,
            self.bar.high,
            self.bar.low,
            self.bar.close,
            self.bar.volume,
            self.ma5,
            self.ma10,
            self.rsi,
            self.ret,
        ]
    }

    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }
}

/// Feature row with its next-day direction label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub row: FeatureRow,
    /// 1 if the next close is strictly higher, 0 otherwise
    pub label: u8,
}

/// Ordered sequence of labeled examples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature names, fixed to [`FEATURE_COLUMNS`]
    pub feature_names: Vec<String>,
    /// Examples in ascending date order
    pub examples: Vec<LabeledExample>,
}

impl Dataset {
    /// Create a dataset from examples already in chronological order
    pub fn new(examples: Vec<LabeledExample>) -> Self {
        Self {
            feature_names: FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            examples,
        }
    }

    /// Get the number of samples
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Get the number of features
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Feature matrix (rows = samples, cols = features)
    pub fn features_array(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.len(), NUM_FEATURES));
        for (i, example) in self.examples.iter().enumerate() {
            for (j, value) in example.row.features().iter().enumerate() {
                matrix[[i, j]] = *value;
            }
        }
        matrix
    }

    /// Labels as 0.0 / 1.0
    pub fn labels_array(&self) -> Array1<f64> {
        self.examples.iter().map(|e| e.label as f64).collect()
    }

    /// First and last date covered, if any
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.examples.first(), self.examples.last()) {
            (Some(first), Some(last)) => Some((first.row.date(), last.row.date())),
            _ => None,
        }
    }

    /// Split at `index`: `[..index]` and `[index..]`, order preserved
    pub fn split_at(&self, index: usize) -> (Dataset, Dataset) {
        let (head, tail) = self.examples.split_at(index.min(self.len()));
        let train = Dataset {
            feature_names: self.feature_names.clone(),
            examples: head.to_vec(),
        };
        let test = Dataset {
            feature_names: self.feature_names.clone(),
            examples: tail.to_vec(),
        };
        (train, test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 2.0,
            close,
            volume: 1000.0 * day as f64,
        }
    }

    fn example(day: u32, close: f64, label: u8) -> LabeledExample {
        LabeledExample {
            row: FeatureRow {
                bar: bar(day, close),
                ret: 0.01,
                ma5: close - 0.5,
                ma10: close - 1.0,
                rsi: 55.0,
            },
            label,
        }
    }

    #[test]
    fn test_feature_order_matches_columns() {
        let row = example(3, 100.0, 1).row;
        let features = row.features();

        assert_eq!(features.len(), FEATURE_COLUMNS.len());
        assert_eq!(features[0], 99.0);
        assert_eq!(features[3], 100.0);
        assert_eq!(features[4], 3000.0);
        assert_eq!(features[7], 55.0);
        assert_eq!(features[8], 0.01);
    }

    #[test]
    fn test_arrays() {
        let dataset = Dataset::new(vec![example(1, 10.0, 0), example(2, 11.0, 1)]);
        let x = dataset.features_array();
        let y = dataset.labels_array();

        assert_eq!(x.dim(), (2, NUM_FEATURES));
        assert_eq!(x[[1, 3]], 11.0);
        assert_eq!(y.to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_split_at_preserves_order() {
        let dataset = Dataset::new((1..=5).map(|d| example(d, d as f64, 1)).collect());
        let (train, test) = dataset.split_at(3);

        assert_eq!(train.len(), 3);
        assert_eq!(test.len(), 2);
        assert_eq!(test.examples[0].row.date(), dataset.examples[3].row.date());
        assert_eq!(train.num_features(), NUM_FEATURES);
    }
}
