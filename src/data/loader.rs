//! Data loading utilities
//!
//! Reads daily price bars from CSV files and returns them sorted by date.

use chrono::{NaiveDate, NaiveDateTime};
use csv::{Reader, StringRecord};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::types::PriceBar;
use crate::error::{PipelineError, PipelineResult};

/// Columns every input file must provide
pub const REQUIRED_COLUMNS: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

/// One CSV row as written by the price fetcher; extra columns are ignored
#[derive(Debug, Deserialize)]
struct BarRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

impl BarRecord {
    /// NaN or infinite prices and volume are rejected with their line
    fn check_finite(&self, line: u64) -> PipelineResult<()> {
        let fields = [
            ("Open", self.open),
            ("High", self.high),
            ("Low", self.low),
            ("Close", self.close),
            ("Volume", self.volume),
        ];
        match fields.iter().find(|(_, value)| !value.is_finite()) {
            Some((column, value)) => Err(PipelineError::InvalidRecord {
                line,
                reason: format!("{} is {}", column, value),
            }),
            None => Ok(()),
        }
    }
}

/// Data loader for CSV files
pub struct DataLoader;

impl DataLoader {
    /// Load price bars from a CSV file, sorted ascending by date
    pub fn load_bars<P: AsRef<Path>>(path: P) -> PipelineResult<Vec<PriceBar>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInputFile(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let bars = Self::read_bars(file)?;
        info!("Loaded {} price bars from {}", bars.len(), path.display());
        Ok(bars)
    }

    /// Parse price bars from any reader, sorted ascending by date
    pub fn read_bars<R: Read>(reader: R) -> PipelineResult<Vec<PriceBar>> {
        let mut reader = Reader::from_reader(reader);
        check_columns(reader.headers()?)?;

        let mut bars = Vec::new();
        for (index, result) in reader.deserialize().enumerate() {
            let record: BarRecord = result?;
            // header is line 1
            let line = index as u64 + 2;
            let date = parse_date(&record.date).ok_or_else(|| PipelineError::InvalidRecord {
                line,
                reason: format!("unrecognised date '{}'", record.date),
            })?;
            record.check_finite(line)?;
            bars.push(PriceBar {
                date,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        // Stable sort keeps the file order of duplicate dates
        bars.sort_by_key(|b| b.date);
        warn_on_duplicates(&bars);

        Ok(bars)
    }
}

fn check_columns(headers: &StringRecord) -> PipelineResult<()> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|h| h.trim() == **column))
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::DataShape(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )))
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time of day
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn warn_on_duplicates(bars: &[PriceBar]) {
    let duplicates = bars.windows(2).filter(|w| w[0].date == w[1].date).count();
    if duplicates > 0 {
        warn!(
            "{} duplicate trading date(s) in input; rows are kept in file order",
            duplicates
        );
    } else {
        debug!("All {} dates are unique", bars.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CSV: &str = "\
Date,Open,High,Low,Close,Volume,Adj Close
2024-01-03,11.0,12.0,10.5,11.5,2000,11.5
2024-01-02,10.0,11.0,9.5,10.5,1000,10.5
2024-01-04,11.5,12.5,11.0,12.0,3000,12.0
";

    #[test]
    fn test_rows_are_sorted_by_date() {
        let bars = DataLoader::read_bars(CSV.as_bytes()).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[2].volume, 3000.0);
    }

    #[test]
    fn test_missing_column_is_data_shape_error() {
        let csv = "Date,Open,High,Low,Close\n2024-01-02,1,2,0.5,1.5\n";
        let err = DataLoader::read_bars(csv.as_bytes()).unwrap_err();

        match err {
            PipelineError::DataShape(msg) => assert!(msg.contains("Volume")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_date_reports_line() {
        let csv = "Date,Open,High,Low,Close,Volume\nyesterday,1,2,0.5,1.5,10\n";
        let err = DataLoader::read_bars(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn test_non_finite_price_is_rejected() {
        let csv = "\
Date,Open,High,Low,Close,Volume
2024-01-02,10.0,11.0,9.5,10.5,1000
2024-01-03,11.0,12.0,10.5,NaN,2000
";
        let err = DataLoader::read_bars(csv.as_bytes()).unwrap_err();
        match err {
            PipelineError::InvalidRecord { line, reason } => {
                assert_eq!(line, 3);
                assert!(reason.contains("Close"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let csv = "Date,Open,High,Low,Close,Volume\n2024-01-02,10.0,11.0,9.5,10.5,inf\n";
        assert!(matches!(
            DataLoader::read_bars(csv.as_bytes()),
            Err(PipelineError::InvalidRecord { line: 2, .. })
        ));
    }

    #[test]
    fn test_datetime_dates_accepted() {
        assert_eq!(
            parse_date("2024-03-01 00:00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date("2024-03-01"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date("03/01/2024"), None);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.csv");

        let err = DataLoader::load_bars(&path).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInputFile(p) if p == path));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        std::fs::write(&path, CSV).unwrap();

        let bars = DataLoader::load_bars(&path).unwrap();
        assert_eq!(bars.len(), 3);
    }
}
