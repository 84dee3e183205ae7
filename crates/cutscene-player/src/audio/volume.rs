use std::sync::atomic::{AtomicU32, Ordering};

/// Gain range of an output, in decibels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl GainRange {
    /// Range used when the gain is applied in software; 0 dB never clips.
    pub const SOFTWARE: Self = Self {
        min_db: -80.0,
        max_db: 0.0,
    };

    /// Gain for a `0..=100` volume setting.
    ///
    /// The setting interpolates linear amplitude between the two ends of the
    /// range and converts the result back to decibels, which sounds smoother
    /// than stepping linearly in decibels.
    pub fn gain_db(&self, volume: u8) -> f32 {
        let volume = f64::from(volume.min(100));
        let min_linear = db_to_amplitude(f64::from(self.min_db));
        let max_linear = db_to_amplitude(f64::from(self.max_db));
        let linear = min_linear + volume * (max_linear - min_linear) / 100.0;
        let db = 20.0 * linear.log10();
        (db as f32).clamp(self.min_db, self.max_db)
    }

    /// Linear amplitude multiplier for a `0..=100` volume setting.
    pub fn amplitude(&self, volume: u8) -> f32 {
        db_to_amplitude(f64::from(self.gain_db(volume))) as f32
    }
}

impl Default for GainRange {
    fn default() -> Self {
        Self::SOFTWARE
    }
}

pub fn db_to_amplitude(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Linear amplitude shared between the control thread and the device callback.
#[derive(Debug)]
pub struct Gain(AtomicU32);

impl Gain {
    pub fn new(amplitude: f32) -> Self {
        Self(AtomicU32::new(amplitude.to_bits()))
    }

    pub fn set(&self, amplitude: f32) {
        self.0.store(amplitude.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_map_to_range_limits() {
        let range = GainRange::SOFTWARE;
        assert!((range.gain_db(0) - range.min_db).abs() < 1e-3);
        assert!((range.gain_db(100) - range.max_db).abs() < 1e-3);
    }

    #[test]
    fn mapping_is_monotonic() {
        for range in [
            GainRange::SOFTWARE,
            GainRange {
                min_db: -40.0,
                max_db: 0.0,
            },
        ] {
            let mut last = f32::NEG_INFINITY;
            for v in 0..=100u8 {
                let db = range.gain_db(v);
                assert!(db >= last, "volume {v} gave {db} after {last}");
                last = db;
            }
        }
    }

    #[test]
    fn half_volume_is_half_linear_span() {
        let range = GainRange {
            min_db: -80.0,
            max_db: 0.0,
        };
        // min linear is 1e-4, so half volume is ~0.50005 → about -6 dB
        let db = range.gain_db(50);
        assert!((db - (-6.0197)).abs() < 1e-2, "got {db}");
        assert!((range.amplitude(50) - 0.50005).abs() < 1e-3);
    }

    #[test]
    fn volume_above_hundred_clamps() {
        let range = GainRange::SOFTWARE;
        assert_eq!(range.gain_db(200), range.gain_db(100));
    }

    #[test]
    fn gain_round_trips_bits() {
        let gain = Gain::default();
        assert!((gain.get() - 1.0).abs() < f32::EPSILON);
        gain.set(0.25);
        assert!((gain.get() - 0.25).abs() < f32::EPSILON);
    }
}
