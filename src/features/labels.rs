//! Next-day direction labels

use crate::data::{FeatureRow, LabeledExample};

/// Attaches the next-day direction to each feature row
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelGenerator;

impl LabelGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Label every row that has a successor
    ///
    /// `label = 1` when the next close is strictly higher; ties and drops
    /// are `0`. The last row has no future close and is left out.
    pub fn label(&self, rows: &[FeatureRow]) -> Vec<LabeledExample> {
        rows.windows(2)
            .map(|pair| LabeledExample {
                row: pair[0],
                label: u8::from(pair[1].close() > pair[0].close()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;
    use chrono::{Duration, NaiveDate};

    fn rows(closes: &[f64]) -> Vec<FeatureRow> {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| FeatureRow {
                bar: PriceBar {
                    date: start + Duration::days(i as i64),
                    open: *close,
                    high: *close,
                    low: *close,
                    close: *close,
                    volume: 1.0,
                },
                ret: 0.0,
                ma5: *close,
                ma10: *close,
                rsi: 50.0,
            })
            .collect()
    }

    #[test]
    fn test_labels_follow_next_close() {
        let input = rows(&[10.0, 11.0, 11.0, 9.0, 12.0]);
        let labeled = LabelGenerator::new().label(&input);

        assert_eq!(labeled.len(), input.len() - 1);
        let labels: Vec<u8> = labeled.iter().map(|e| e.label).collect();
        // up, tie, down, up
        assert_eq!(labels, vec![1, 0, 0, 1]);

        for (t, example) in labeled.iter().enumerate() {
            assert_eq!(example.row, input[t]);
            assert_eq!(example.label == 1, input[t + 1].close() > input[t].close());
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        let generator = LabelGenerator::new();
        assert!(generator.label(&[]).is_empty());
        assert!(generator.label(&rows(&[5.0])).is_empty());
    }
}
