pub mod config;
pub mod ht1621;
pub mod lcd;
pub mod ntc;
pub mod panel;
pub mod params;
pub mod timer;
pub mod touch;
pub mod types;

pub use config::{
    BusHardwareConfig, PanelConfig, PersistedParams, RuntimeConfig, TouchHardwareConfig,
};
pub use ht1621::{Command, Ht1621, SegmentBuffer, SegmentPanel};
pub use ntc::{NtcProfile, ProbeError};
pub use panel::{Panel, PanelAction, PanelCore, PanelParams};
pub use params::{CloudLink, ParamValue, ResetRequest, WriteSource};
pub use touch::{PressEvent, TouchChannel, TouchPanel, TouchProbe};
pub use types::{ClockTime, DayOfWeek, PressKind, Scene, TouchKey, WindSpeed, WorkMode};
