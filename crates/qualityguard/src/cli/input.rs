//! Reading measurement and series files given on the command line.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::measurement::{BatchMetadata, Measurement, MeasurementBatch};

/// Parse a numeric series.
///
/// Accepts either a JSON array of numbers or one number per line. In the
/// line format blank lines and lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns an error for malformed JSON, for a line that is not a number, or
/// for a value that is not finite.
pub fn parse_series(text: &str) -> Result<Vec<f64>> {
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(text)?);
    }

    let mut values = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let entry = line.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let value: f64 = entry
            .parse()
            .map_err(|_| Error::invalid_input(index + 1, format!("not a number: {entry}")))?;
        if !value.is_finite() {
            return Err(Error::invalid_input(
                index + 1,
                format!("not a finite number: {entry}"),
            ));
        }
        values.push(value);
    }
    Ok(values)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Batch(MeasurementBatch),
    Measurements(Vec<Measurement>),
}

/// Parse a batch file.
///
/// Accepts a full batch (`{"measurements": [...], "metadata": {...}}`) or a
/// bare array of measurements, which gets empty metadata. Every measurement
/// is validated.
///
/// # Errors
///
/// Returns an error if the JSON does not match either shape or a
/// measurement is invalid.
pub fn parse_batch(text: &str) -> Result<MeasurementBatch> {
    let batch = match serde_json::from_str(text)? {
        BatchFile::Batch(batch) => batch,
        BatchFile::Measurements(measurements) => {
            MeasurementBatch::new(measurements, BatchMetadata::default())
        }
    };
    for measurement in &batch.measurements {
        measurement.validate()?;
    }
    Ok(batch)
}
