use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkMode {
    Auto,
    Cold,
    Heat,
    Wind,
    Dry,
}

impl WorkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Cold => "Cold",
            Self::Heat => "Heat",
            Self::Wind => "Wind",
            Self::Dry => "Dry",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Auto" => Some(Self::Auto),
            "Cold" => Some(Self::Cold),
            "Heat" => Some(Self::Heat),
            "Wind" => Some(Self::Wind),
            "Dry" => Some(Self::Dry),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Auto => Self::Cold,
            Self::Cold => Self::Heat,
            Self::Heat => Self::Wind,
            Self::Wind => Self::Dry,
            Self::Dry => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindSpeed {
    Auto,
    Low,
    Mid,
    High,
}

impl WindSpeed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Low => "Low",
            Self::Mid => "Mid",
            Self::High => "High",
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Self::Auto => 0,
            Self::Low => 1,
            Self::Mid => 2,
            Self::High => 3,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Self::Auto),
            1 => Some(Self::Low),
            2 => Some(Self::Mid),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Auto => Self::Low,
            Self::Low => Self::Mid,
            Self::Mid => Self::High,
            Self::High => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scene {
    None,
    Outdoor,
    Sleep,
}

impl Scene {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Outdoor => "Outdoor",
            Self::Sleep => "Sleep",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "None" => Some(Self::None),
            "Outdoor" => Some(Self::Outdoor),
            "Sleep" => Some(Self::Sleep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "Mon",
            Self::Tue => "Tue",
            Self::Wed => "Wed",
            Self::Thu => "Thu",
            Self::Fri => "Fri",
            Self::Sat => "Sat",
            Self::Sun => "Sun",
        }
    }

    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => Self::Mon,
            chrono::Weekday::Tue => Self::Tue,
            chrono::Weekday::Wed => Self::Wed,
            chrono::Weekday::Thu => Self::Thu,
            chrono::Weekday::Fri => Self::Fri,
            chrono::Weekday::Sat => Self::Sat,
            chrono::Weekday::Sun => Self::Sun,
        }
    }
}

/// Wall-clock reading shown in the clock area of the glass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
    pub day: DayOfWeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TouchKey {
    Power,
    Mode,
    Time,
    Speed,
    Up,
    Down,
}

pub const TOUCH_KEY_COUNT: usize = 6;

impl TouchKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Mode => "mode",
            Self::Time => "time",
            Self::Speed => "speed",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Power => 0,
            Self::Mode => 1,
            Self::Time => 2,
            Self::Speed => 3,
            Self::Up => 4,
            Self::Down => 5,
        }
    }

    pub const ALL: [TouchKey; TOUCH_KEY_COUNT] = [
        Self::Power,
        Self::Mode,
        Self::Time,
        Self::Speed,
        Self::Up,
        Self::Down,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Short,
    Long,
}

impl PressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
        }
    }
}
