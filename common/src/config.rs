use serde::{Deserialize, Serialize};

use crate::types::{Scene, WindSpeed, WorkMode};

pub const SETPOINT_MIN: f32 = 0.0;
pub const SETPOINT_MAX: f32 = 40.0;
pub const SETPOINT_STEP: f32 = 0.1;

/// Timing knobs for the input classifier and display effects. All values are
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Touch scan period.
    pub tick_ms: u32,
    /// Hold time before held-key feedback starts.
    pub short_press_ms: u32,
    /// Releases past this classify as a long press.
    pub long_press_ms: u32,
    /// Power held this long requests a factory reset.
    pub factory_reset_ms: u32,
    /// Minimum gap between repeated up/down steps while held.
    pub step_repeat_ms: u32,
    /// Half-period of the setpoint blink.
    pub blink_period_ms: u32,
    /// Number of blink half-periods before the setpoint is committed.
    pub blink_count: u32,
    /// Buzzer on-time for a confirmation chirp.
    pub beep_ms: u32,
    /// Ambient sample and report period.
    pub ambient_period_ms: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            short_press_ms: 600,
            long_press_ms: 3000,
            factory_reset_ms: 10_000,
            step_repeat_ms: 100,
            blink_period_ms: 500,
            blink_count: 10,
            beep_ms: 100,
            ambient_period_ms: 60_000,
        }
    }
}

impl PanelConfig {
    /// Pulls nonsense values back to something the classifier can run with.
    pub fn sanitize(&mut self) {
        if self.tick_ms == 0 {
            self.tick_ms = 10;
        }
        if self.short_press_ms == 0 {
            self.short_press_ms = 600;
        }
        if self.long_press_ms <= self.short_press_ms {
            self.long_press_ms = self.short_press_ms * 5;
        }
        if self.factory_reset_ms <= self.long_press_ms {
            self.factory_reset_ms = self.long_press_ms * 3;
        }
        if self.blink_period_ms == 0 {
            self.blink_period_ms = 500;
        }
        if self.blink_count == 0 {
            self.blink_count = 10;
        }
        if self.beep_ms == 0 {
            self.beep_ms = 100;
        }
        if self.ambient_period_ms < 1000 {
            self.ambient_period_ms = 60_000;
        }
    }
}

/// User-visible state that survives a power cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedParams {
    pub power: bool,
    pub setpoint: f32,
    pub mode: WorkMode,
    pub speed: WindSpeed,
    pub scene: Scene,
    pub valve_open: bool,
    pub direction: String,
}

impl Default for PersistedParams {
    fn default() -> Self {
        Self {
            power: true,
            setpoint: 16.0,
            mode: WorkMode::Auto,
            speed: WindSpeed::Auto,
            scene: Scene::None,
            valve_open: false,
            direction: "Auto".to_string(),
        }
    }
}

impl PersistedParams {
    pub fn sanitize(&mut self) {
        if !self.setpoint.is_finite() {
            self.setpoint = 16.0;
        }
        self.setpoint = self.setpoint.clamp(SETPOINT_MIN, SETPOINT_MAX);
        if crate::params::DIRECTION_LABELS
            .iter()
            .all(|label| *label != self.direction)
        {
            self.direction = "Auto".to_string();
        }
    }
}

/// Which capacitive pad drives which key, plus the shared sensitivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchHardwareConfig {
    /// Pad numbers in key order: power, mode, time, speed, up, down.
    pub pads: [u32; 6],
    /// A reading under baseline * percent / 100 counts as touched.
    pub threshold_percent: u32,
}

impl Default for TouchHardwareConfig {
    fn default() -> Self {
        Self {
            pads: [0, 4, 5, 6, 8, 9],
            threshold_percent: 90,
        }
    }
}

impl TouchHardwareConfig {
    pub fn sanitize(&mut self) {
        if self.threshold_percent == 0 || self.threshold_percent >= 100 {
            self.threshold_percent = 90;
        }
    }
}

/// GPIO assignment for the display bus, buzzer line and thermistor input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusHardwareConfig {
    pub cs_pin: i32,
    pub wr_pin: i32,
    pub data_pin: i32,
    pub backlight_pin: i32,
    pub adc_channel: u32,
}

impl Default for BusHardwareConfig {
    fn default() -> Self {
        Self {
            cs_pin: 16,
            wr_pin: 17,
            data_pin: 18,
            backlight_pin: 19,
            adc_channel: 3,
        }
    }
}

/// Everything the binary needs at startup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub panel: PanelConfig,
    pub touch: TouchHardwareConfig,
    pub bus: BusHardwareConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.panel.sanitize();
        self.touch.sanitize();
    }
}
