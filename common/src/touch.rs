use log::warn;

use crate::config::{PanelConfig, TouchHardwareConfig};
use crate::types::{PressKind, TouchKey};

// Raw counters outside this range mean the pad is floating or shorted.
const BASELINE_MIN: u16 = 1;
const BASELINE_MAX: u16 = 4094;

/// Raw access to the capacitive pads. Lower readings mean touched.
pub trait TouchProbe {
    fn read_raw(&mut self, pad: u32) -> u16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    /// Rising edge, exactly once per press.
    Start { key: TouchKey },
    /// Once per tick while held longer than the feedback threshold.
    Keep { key: TouchKey, held_ms: u64 },
    /// Falling edge, exactly once per press.
    End {
        key: TouchKey,
        kind: PressKind,
        held_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelPhase {
    Idle,
    Held { since_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct TouchChannel {
    key: TouchKey,
    pad: u32,
    threshold: u16,
    alive: bool,
    phase: ChannelPhase,
}

impl TouchChannel {
    /// Builds a channel from its untouched baseline reading. An implausible
    /// baseline disables the channel; the rest of the panel keeps working.
    pub fn calibrated(key: TouchKey, pad: u32, baseline: u16, threshold_percent: u32) -> Self {
        let alive = (BASELINE_MIN..=BASELINE_MAX).contains(&baseline);
        if !alive {
            warn!(
                "touch pad {pad} ({}) baseline {baseline} implausible, channel disabled",
                key.as_str()
            );
        }
        let threshold = (u32::from(baseline) * threshold_percent / 100) as u16;
        Self {
            key,
            pad,
            threshold,
            alive,
            phase: ChannelPhase::Idle,
        }
    }

    pub fn key(&self) -> TouchKey {
        self.key
    }

    pub fn pad(&self) -> u32 {
        self.pad
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    fn step(
        &mut self,
        touched: bool,
        now_ms: u64,
        t1_ms: u64,
        t2_ms: u64,
        events: &mut Vec<PressEvent>,
    ) {
        match self.phase {
            ChannelPhase::Idle => {
                if touched {
                    self.phase = ChannelPhase::Held { since_ms: now_ms };
                    events.push(PressEvent::Start { key: self.key });
                }
            }
            ChannelPhase::Held { since_ms } => {
                let held_ms = now_ms.saturating_sub(since_ms);
                if touched {
                    if held_ms >= t1_ms {
                        events.push(PressEvent::Keep {
                            key: self.key,
                            held_ms,
                        });
                    }
                } else {
                    self.phase = ChannelPhase::Idle;
                    let kind = if held_ms >= t2_ms {
                        PressKind::Long
                    } else {
                        PressKind::Short
                    };
                    events.push(PressEvent::End {
                        key: self.key,
                        kind,
                        held_ms,
                    });
                }
            }
        }
    }
}

/// Six press state machines sampled on a fixed tick. Events come back from
/// the poll; nothing fires from interrupt context.
pub struct TouchPanel {
    channels: Vec<TouchChannel>,
    t1_ms: u64,
    t2_ms: u64,
}

impl TouchPanel {
    pub fn new(config: &PanelConfig, channels: Vec<TouchChannel>) -> Self {
        Self {
            channels,
            t1_ms: u64::from(config.short_press_ms),
            t2_ms: u64::from(config.long_press_ms),
        }
    }

    /// Samples every pad once for its baseline and derives thresholds.
    pub fn calibrate<P: TouchProbe>(
        config: &PanelConfig,
        touch: &TouchHardwareConfig,
        probe: &mut P,
    ) -> Self {
        let channels = TouchKey::ALL
            .iter()
            .map(|&key| {
                let pad = touch.pads[key.index()];
                let baseline = probe.read_raw(pad);
                TouchChannel::calibrated(key, pad, baseline, touch.threshold_percent)
            })
            .collect();
        Self::new(config, channels)
    }

    pub fn channels(&self) -> &[TouchChannel] {
        &self.channels
    }

    /// One sampling tick: reads every live pad and advances its state
    /// machine. `now_ms` is a monotonic millisecond clock.
    pub fn poll<P: TouchProbe>(&mut self, probe: &mut P, now_ms: u64) -> Vec<PressEvent> {
        let mut events = Vec::new();
        for channel in &mut self.channels {
            if !channel.alive {
                continue;
            }
            let touched = probe.read_raw(channel.pad) < channel.threshold;
            channel.step(touched, now_ms, self.t1_ms, self.t2_ms, &mut events);
        }
        events
    }
}
