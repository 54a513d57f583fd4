//! Price series loading from CSV.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sim::price::{PriceSeries, PriceSeriesError};

/// Zero-based index of the price column.
const PRICE_COLUMN: usize = 1;

/// Problems loading a price file. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("cannot read price file \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: missing price column")]
    MissingColumn { line: u64 },
    #[error("line {line}: price \"{value}\" is not a number")]
    NotNumeric { line: u64, value: String },
    #[error("line {line}: price {value} is not finite")]
    NonFinite { line: u64, value: f64 },
    #[error("line {line}: price {value} is negative")]
    Negative { line: u64, value: f64 },
    #[error("price source \"csv\" needs a path")]
    MissingPath,
    #[error("unknown price source \"{0}\"")]
    UnknownSource(String),
    #[error(transparent)]
    Series(#[from] PriceSeriesError),
}

/// Loads a price series from a CSV file.
///
/// The price is read from the second column; any other columns (typically
/// a timestamp first) are ignored.
///
/// # Arguments
///
/// * `path` - CSV file to read
/// * `has_header` - Skip the first row
///
/// # Errors
///
/// Returns a [`PriceError`] naming the first offending line.
pub fn load_prices(path: &Path, has_header: bool) -> Result<PriceSeries, PriceError> {
    let file = File::open(path).map_err(|source| PriceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_prices(file, has_header)
}

/// Reads a price series from any CSV source.
///
/// # Errors
///
/// See [`load_prices`].
pub fn read_prices(reader: impl Read, has_header: bool) -> Result<PriceSeries, PriceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut prices = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, csv::Position::line);

        let raw = record
            .get(PRICE_COLUMN)
            .ok_or(PriceError::MissingColumn { line })?;
        let value: f64 = raw.parse().map_err(|_| PriceError::NotNumeric {
            line,
            value: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(PriceError::NonFinite { line, value });
        }
        if value < 0.0 {
            return Err(PriceError::Negative { line, value });
        }
        prices.push(value);
    }

    Ok(PriceSeries::new(prices)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str, has_header: bool) -> Result<PriceSeries, PriceError> {
        read_prices(text.as_bytes(), has_header)
    }

    #[test]
    fn reads_second_column() {
        let p = read("2024-01-01T00:00,1.5\n2024-01-01T01:00,2.25\n", false).unwrap();
        assert_eq!(p.as_slice(), &[1.5, 2.25]);
    }

    #[test]
    fn skips_header_when_asked() {
        let p = read("time,price\n0,3.0\n1,4.0\n", true).unwrap();
        assert_eq!(p.horizon(), 2);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let p = read("0,1.0,foo,bar\n1,2.0\n", false).unwrap();
        assert_eq!(p.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn missing_column_names_line() {
        let err = read("0,1.0\n1\n", false).unwrap_err();
        assert!(matches!(err, PriceError::MissingColumn { line: 2 }));
    }

    #[test]
    fn non_numeric_names_line() {
        let err = read("time,price\n0,1.0\n1,abc\n", true).unwrap_err();
        assert!(matches!(err, PriceError::NotNumeric { line: 3, .. }));
        assert_eq!(err.to_string(), "line 3: price \"abc\" is not a number");
    }

    #[test]
    fn negative_and_non_finite_are_rejected() {
        assert!(matches!(
            read("0,-1.0\n", false).unwrap_err(),
            PriceError::Negative { line: 1, .. }
        ));
        assert!(matches!(
            read("0,1.0\n1,NaN\n", false).unwrap_err(),
            PriceError::NonFinite { line: 2, .. }
        ));
        assert!(matches!(
            read("0,inf\n", false).unwrap_err(),
            PriceError::NonFinite { line: 1, .. }
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        assert!(matches!(
            read("time,price\n", true).unwrap_err(),
            PriceError::Series(PriceSeriesError::Empty)
        ));
    }

    #[test]
    fn missing_file() {
        let err = load_prices(Path::new("/definitely/not/here.csv"), false).unwrap_err();
        assert!(matches!(err, PriceError::Io { .. }));
    }
}
