use airmouse_config::ImuConfig;

/// Derives the time between samples from the wrapping hardware counter.
#[derive(Debug, Clone)]
pub struct SampleClock {
    ticks_per_unit: f64,
    unit_seconds: f64,
    last_counter: Option<u16>,
}

impl SampleClock {
    pub fn new(ticks_per_unit: f64, unit_seconds: f64) -> Self {
        Self {
            ticks_per_unit,
            unit_seconds,
            last_counter: None,
        }
    }

    pub fn from_config(config: &ImuConfig) -> Self {
        Self::new(config.ticks_per_unit, config.unit_seconds)
    }

    /// Record `counter` and return seconds since the previous one.
    /// The first call after construction or reset returns `None`.
    pub fn tick(&mut self, counter: u16) -> Option<f64> {
        let dt = self.last_counter.map(|last| {
            let ticks = counter.wrapping_sub(last);
            f64::from(ticks) / self.ticks_per_unit * self.unit_seconds
        });
        self.last_counter = Some(counter);
        dt
    }

    pub fn reset(&mut self) {
        self.last_counter = None;
    }
}
