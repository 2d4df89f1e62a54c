//! Statistical process control.
//!
//! Shewhart individuals chart with 3-sigma limits computed from the
//! population standard deviation of the series itself.

use serde::Serialize;

/// Number of standard deviations between the center line and each limit.
pub const SIGMA_MULTIPLIER: f64 = 3.0;

/// Center line and control limits of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlLimits {
    /// Number of observations.
    pub n: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation (divisor `n`).
    pub stddev: f64,
    /// Upper control limit, `mean + 3 * stddev`.
    pub ucl: f64,
    /// Lower control limit, `mean - 3 * stddev`.
    pub lcl: f64,
}

impl ControlLimits {
    /// Compute limits for `values`. Returns `None` for an empty series.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let count = n as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
        let stddev = variance.sqrt();

        Some(Self {
            n,
            mean,
            stddev,
            ucl: mean + SIGMA_MULTIPLIER * stddev,
            lcl: mean - SIGMA_MULTIPLIER * stddev,
        })
    }

    /// Whether a value falls strictly outside the limits.
    #[must_use]
    pub fn is_out_of_control(&self, value: f64) -> bool {
        value > self.ucl || value < self.lcl
    }
}

/// One plotted observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    /// Position in the series.
    pub index: usize,
    /// Observed value.
    pub value: f64,
    /// Whether the value lies outside the control limits.
    pub out_of_control: bool,
}

/// A control chart: limits plus classified points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlChart {
    /// Limits of the series.
    pub limits: ControlLimits,
    /// Points in input order.
    pub points: Vec<ChartPoint>,
}

impl ControlChart {
    /// Build a chart from an ordered series.
    ///
    /// An empty series has no chart; callers show a placeholder instead.
    #[must_use]
    pub fn compute(values: &[f64]) -> Option<Self> {
        let limits = ControlLimits::from_values(values)?;
        let points = values
            .iter()
            .enumerate()
            .map(|(index, &value)| ChartPoint {
                index,
                value,
                out_of_control: limits.is_out_of_control(value),
            })
            .collect();
        Some(Self { limits, points })
    }

    /// Indices of points outside the control limits.
    #[must_use]
    pub fn out_of_control(&self) -> Vec<usize> {
        self.points
            .iter()
            .filter(|p| p.out_of_control)
            .map(|p| p.index)
            .collect()
    }

    /// Vertical span needed to draw the series together with both limits.
    #[must_use]
    pub fn value_range(&self) -> (f64, f64) {
        self.points.iter().fold(
            (self.limits.lcl, self.limits.ucl),
            |(lo, hi), p| (lo.min(p.value), hi.max(p.value)),
        )
    }
}

/// Process capability index of a series against specification limits.
///
/// `min(upper - mean, mean - lower) / (3 * stddev)`. `None` for an empty
/// series or one without spread.
#[must_use]
pub fn process_capability(values: &[f64], lower: f64, upper: f64) -> Option<f64> {
    let limits = ControlLimits::from_values(values)?;
    if limits.stddev == 0.0 {
        return None;
    }
    let nearest = (upper - limits.mean).min(limits.mean - lower);
    Some(nearest / (SIGMA_MULTIPLIER * limits.stddev))
}
