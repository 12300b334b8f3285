use std::fmt;

pub const PARAM_POWER: &str = "Power";
pub const PARAM_SETPOINT: &str = "Setpoint Temperature";
pub const PARAM_SPEED: &str = "Speed";
pub const PARAM_DIRECTION: &str = "Direction";
pub const PARAM_MODE: &str = "Mode";
pub const PARAM_VALVE: &str = "Valve";
pub const PARAM_TEMPERATURE: &str = "Temperature";

pub const DIRECTION_LABELS: [&str; 4] = ["Auto", "Low", "Medium", "High"];

/// Typed value for a parameter write or report.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Distinguishes a live write from the boot-time snapshot replay; replayed
/// writes apply silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Cloud,
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRequest {
    Network,
    Factory,
}

/// Outbound half of the device-cloud collaboration. The panel reports
/// accepted values and surfaces reset requests; the platform decides what
/// resetting means.
pub trait CloudLink: Send + Sync {
    fn report(&self, param: &str, value: ParamValue);
    fn request_reset(&self, request: ResetRequest);
}
