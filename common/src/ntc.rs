use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe reading {0} mV is outside the divider range")]
    ReadingOutOfRange(u32),
}

/// Beta-model conversion for the NTC divider: series resistor on the supply
/// side, thermistor to ground, tap voltage into the ADC.
#[derive(Debug, Clone, PartialEq)]
pub struct NtcProfile {
    pub supply_mv: f32,
    pub series_ohms: f32,
    pub beta: f32,
    /// Thermistor resistance at the nominal temperature.
    pub nominal_ohms: f32,
    pub nominal_celsius: f32,
}

impl Default for NtcProfile {
    fn default() -> Self {
        Self {
            supply_mv: 4900.0,
            series_ohms: 4800.0,
            beta: 4000.0,
            nominal_ohms: 4800.0,
            nominal_celsius: 18.0,
        }
    }
}

impl NtcProfile {
    /// Converts a divider tap reading to degrees Celsius. The trailing half
    /// degree matches the production calibration offset.
    pub fn celsius_from_mv(&self, mv: u32) -> Result<f32, ProbeError> {
        let tap = mv as f32;
        if tap <= 0.0 || tap >= self.supply_mv {
            return Err(ProbeError::ReadingOutOfRange(mv));
        }
        let rt = self.series_ohms * tap / (self.supply_mv - tap);
        let inv_kelvin = (rt / self.nominal_ohms).ln() / self.beta
            + 1.0 / (self.nominal_celsius + 273.15);
        Ok(1.0 / inv_kelvin - 273.15 + 0.5)
    }
}
