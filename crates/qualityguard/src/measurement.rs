//! Inspection measurements and the batches they are saved in.
//!
//! A measurement only stores canonical values. Its status and capability
//! class are derived on demand, so they cannot drift from value, limits and
//! cpk.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cpk at or above which a process is considered capable.
pub const CPK_CAPABLE: f64 = 1.33;

/// Cpk below which a process is considered not capable.
pub const CPK_MARGINAL: f64 = 1.0;

/// Process-capability class derived from cpk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// cpk >= 1.33
    Capable,
    /// 1.0 <= cpk < 1.33
    Marginal,
    /// cpk < 1.0
    NotCapable,
}

impl Capability {
    /// Classify a cpk value.
    #[must_use]
    pub fn from_cpk(cpk: f64) -> Self {
        if cpk >= CPK_CAPABLE {
            Self::Capable
        } else if cpk >= CPK_MARGINAL {
            Self::Marginal
        } else {
            Self::NotCapable
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capable => write!(f, "capable"),
            Self::Marginal => write!(f, "marginal"),
            Self::NotCapable => write!(f, "not_capable"),
        }
    }
}

/// Inspection status of a single measurement.
///
/// Variants are ordered by severity so `max` picks the worse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Within tolerance and capable.
    Ok,
    /// Out of tolerance or only marginally capable.
    Warning,
    /// Process not capable.
    Critical,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single inspected characteristic of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Characteristic identifier, e.g. `DIM001`.
    pub id: String,
    /// Human-readable parameter name.
    pub parameter: String,
    /// Category such as `Dimensional` or `Angular`.
    #[serde(default)]
    pub category: String,
    /// Measured value.
    pub value: f64,
    /// Nominal (target) value.
    pub nominal: f64,
    /// Upper tolerance limit.
    pub upper_limit: f64,
    /// Lower tolerance limit.
    pub lower_limit: f64,
    /// Process capability index.
    pub cpk: f64,
}

impl Measurement {
    /// Whether the value lies within `[lower_limit, upper_limit]`.
    #[must_use]
    pub fn within_tolerance(&self) -> bool {
        self.value >= self.lower_limit && self.value <= self.upper_limit
    }

    /// Capability class of the process that produced this measurement.
    #[must_use]
    pub fn capability(&self) -> Capability {
        Capability::from_cpk(self.cpk)
    }

    /// Derived inspection status.
    ///
    /// The worse of the capability class and the tolerance check, where an
    /// out-of-tolerance value counts as at least a warning.
    #[must_use]
    pub fn status(&self) -> Status {
        let by_capability = match self.capability() {
            Capability::Capable => Status::Ok,
            Capability::Marginal => Status::Warning,
            Capability::NotCapable => Status::Critical,
        };
        let by_tolerance = if self.within_tolerance() {
            Status::Ok
        } else {
            Status::Warning
        };
        by_capability.max(by_tolerance)
    }

    /// Relative deviation from nominal in percent.
    ///
    /// `None` when nominal is zero, where a percentage is undefined.
    #[must_use]
    pub fn deviation_percent(&self) -> Option<f64> {
        if self.nominal == 0.0 {
            return None;
        }
        Some(((self.value - self.nominal) / self.nominal).abs() * 100.0)
    }

    /// Check that the numbers are finite and the limits are ordered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMeasurement`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("value", self.value),
            ("nominal", self.nominal),
            ("upperLimit", self.upper_limit),
            ("lowerLimit", self.lower_limit),
            ("cpk", self.cpk),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::invalid_measurement(
                &self.id,
                format!("{name} is not a finite number"),
            ));
        }
        if self.upper_limit < self.nominal {
            return Err(Error::invalid_measurement(
                &self.id,
                "upper limit is below nominal",
            ));
        }
        if self.nominal < self.lower_limit {
            return Err(Error::invalid_measurement(
                &self.id,
                "lower limit is above nominal",
            ));
        }
        Ok(())
    }
}

/// Context attached to a saved batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchMetadata {
    /// Production batch identifier.
    pub batch_id: String,
    /// Operator who performed the inspection.
    pub operator: String,
    /// Shift during which the inspection happened.
    pub shift: String,
    /// Inspection timestamp as reported by the gauge report.
    pub timestamp: String,
}

/// A set of measurements persisted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    /// The measurements to persist.
    pub measurements: Vec<Measurement>,
    /// Batch context.
    #[serde(default)]
    pub metadata: BatchMetadata,
}

impl MeasurementBatch {
    /// Create a batch from measurements and metadata.
    #[must_use]
    pub fn new(measurements: Vec<Measurement>, metadata: BatchMetadata) -> Self {
        Self {
            measurements,
            metadata,
        }
    }

    /// Identifiers of the measurements in this batch.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.measurements.iter().map(|m| m.id.as_str())
    }
}

/// Result of a save, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    /// Whether the batch is considered saved.
    pub success: bool,
    /// Set when the batch was queued locally instead of reaching the service.
    #[serde(default)]
    pub offline: bool,
}

impl SaveAck {
    /// Acknowledgement for a batch that was queued for later replay.
    #[must_use]
    pub fn queued() -> Self {
        Self {
            success: true,
            offline: true,
        }
    }
}
