//! Waveform samples, the bounded playback table, and voltage clamping.

use std::path::Path;

use crate::error::AppResult;
use crate::tabular::{self, OverflowPolicy, RowLimit};

/// Default upper bound on rows held by a [`WaveformTable`].
pub const BUF_SIZE: usize = 10_000;

/// Safety band applied to every output sample.
pub const OUTPUT_BAND: VoltageBand = VoltageBand { min: 0.0, max: 5.0 };

/// One (relative time, voltage) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the start of the waveform
    pub time: f64,
    /// Voltage in volts
    pub voltage: f64,
}

impl Sample {
    /// Create a new sample.
    pub fn new(time: f64, voltage: f64) -> Self {
        Self { time, voltage }
    }
}

/// Closed voltage interval used to clamp values before they reach hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageBand {
    /// Lower bound in volts
    pub min: f64,
    /// Upper bound in volts
    pub max: f64,
}

impl VoltageBand {
    /// Create a band, returning `None` unless `min <= max` and both are finite.
    pub fn new(min: f64, max: f64) -> Option<Self> {
        (min.is_finite() && max.is_finite() && min <= max).then_some(Self { min, max })
    }

    /// Restrict `voltage` to the band.
    ///
    /// NaN has no meaningful position in the band and is mapped to `min`.
    pub fn clamp(&self, voltage: f64) -> f64 {
        if voltage.is_nan() {
            return self.min;
        }
        voltage.clamp(self.min, self.max)
    }

    /// Check if a voltage lies inside the band.
    pub fn contains(&self, voltage: f64) -> bool {
        voltage >= self.min && voltage <= self.max
    }
}

/// Clamp an output voltage to [`OUTPUT_BAND`].
pub fn clamp_output(voltage: f64) -> f64 {
    OUTPUT_BAND.clamp(voltage)
}

/// Floor an acquired voltage at zero, leaving large values untouched.
///
/// Acquisition keeps the upper end of the reading as measured; only the
/// negative side is cut off.
pub fn floor_input(voltage: f64) -> f64 {
    // f64::max returns the non-NaN operand, so NaN readings become 0.0
    voltage.max(0.0)
}

/// Ordered, capacity-bounded sequence of samples played back by the scheduler.
///
/// Index `i` of the table is emitted at elapsed time `i / sample_rate`; the
/// stored `time` column is carried for reference only.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTable {
    samples: Vec<Sample>,
    capacity: usize,
}

impl WaveformTable {
    /// Create an empty table able to hold `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.min(BUF_SIZE)),
            capacity,
        }
    }

    /// Build a table from samples, keeping at most `capacity` of them.
    pub fn from_samples(samples: Vec<Sample>, capacity: usize) -> Self {
        let mut samples = samples;
        samples.truncate(capacity);
        Self { samples, capacity }
    }

    /// Load up to `limit` rows from a two-column file.
    pub fn load(
        path: impl AsRef<Path>,
        limit: RowLimit,
        capacity: usize,
        overflow: OverflowPolicy,
    ) -> AppResult<Self> {
        let samples = tabular::read_table(path, limit, capacity, overflow)?;
        Ok(Self { samples, capacity })
    }

    /// Number of loaded samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if no samples were loaded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples this table may hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sample at `index`, if loaded.
    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    /// Clamped output voltage for `index`.
    pub fn output_voltage(&self, index: usize) -> Option<f64> {
        self.get(index).map(|s| clamp_output(s.voltage))
    }

    /// All loaded samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_output_bounds() {
        assert_eq!(clamp_output(-1.0), 0.0);
        assert_eq!(clamp_output(6.0), 5.0);
        assert_eq!(clamp_output(2.5), 2.5);
        assert_eq!(clamp_output(f64::NEG_INFINITY), 0.0);
        assert_eq!(clamp_output(f64::INFINITY), 5.0);
        assert_eq!(clamp_output(f64::NAN), 0.0);
    }

    #[test]
    fn test_clamp_output_always_in_band() {
        let mut v = -20.0;
        while v <= 20.0 {
            let c = clamp_output(v);
            assert!((0.0..=5.0).contains(&c), "clamp({v}) = {c}");
            v += 0.37;
        }
    }

    #[test]
    fn test_floor_input_is_asymmetric() {
        assert_eq!(floor_input(-2.0), 0.0);
        assert_eq!(floor_input(0.0), 0.0);
        assert_eq!(floor_input(3.3), 3.3);
        assert_eq!(floor_input(12.5), 12.5);
        assert_eq!(floor_input(f64::NAN), 0.0);
    }

    #[test]
    fn test_voltage_band_validation() {
        assert!(VoltageBand::new(0.0, 5.0).is_some());
        assert!(VoltageBand::new(5.0, 0.0).is_none());
        assert!(VoltageBand::new(f64::NAN, 1.0).is_none());
        assert!(OUTPUT_BAND.contains(5.0));
        assert!(!OUTPUT_BAND.contains(5.01));
    }

    #[test]
    fn test_from_samples_respects_capacity() {
        let samples = (0..10).map(|i| Sample::new(i as f64, 1.0)).collect();
        let table = WaveformTable::from_samples(samples, 4);
        assert_eq!(table.len(), 4);
        assert_eq!(table.capacity(), 4);
        assert!(table.get(4).is_none());
    }

    #[test]
    fn test_output_voltage_is_clamped() {
        let table = WaveformTable::from_samples(
            vec![Sample::new(0.0, 1.0), Sample::new(0.01, 6.0)],
            BUF_SIZE,
        );
        assert_eq!(table.output_voltage(0), Some(1.0));
        assert_eq!(table.output_voltage(1), Some(5.0));
        assert_eq!(table.output_voltage(2), None);
        assert!(WaveformTable::with_capacity(8).is_empty());
    }
}
