use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::{PanelConfig, PersistedParams, SETPOINT_MAX, SETPOINT_MIN, SETPOINT_STEP};
use crate::ht1621::SegmentPanel;
use crate::lcd;
use crate::params::{
    CloudLink, ParamValue, ResetRequest, WriteSource, DIRECTION_LABELS, PARAM_DIRECTION,
    PARAM_MODE, PARAM_POWER, PARAM_SETPOINT, PARAM_SPEED, PARAM_TEMPERATURE, PARAM_VALVE,
};
use crate::timer::{self, TimerHandle};
use crate::touch::PressEvent;
use crate::types::{
    ClockTime, DayOfWeek, PressKind, Scene, TouchKey, WindSpeed, WorkMode, TOUCH_KEY_COUNT,
};

/// Semantic panel state. Everything the glass shows derives from this.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelParams {
    pub power: bool,
    pub mode: WorkMode,
    pub speed: WindSpeed,
    pub direction: String,
    pub setpoint: f32,
    pub ambient: f32,
    pub valve_open: bool,
    pub clock: ClockTime,
    pub show_clock: bool,
    pub scene: Scene,
    pub alarm: bool,
    pub lock: bool,
    pub house: bool,
    pub warning: bool,
}

impl Default for PanelParams {
    fn default() -> Self {
        Self {
            power: true,
            mode: WorkMode::Auto,
            speed: WindSpeed::Auto,
            direction: "Auto".to_string(),
            setpoint: 16.0,
            ambient: 26.0,
            valve_open: false,
            clock: ClockTime {
                hour: 0,
                minute: 0,
                day: DayOfWeek::Mon,
            },
            show_clock: true,
            scene: Scene::None,
            alarm: false,
            lock: false,
            house: false,
            warning: false,
        }
    }
}

/// Side effects a state transition asks for. The caller executes them after
/// releasing the state lock.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelAction {
    Report {
        param: &'static str,
        value: ParamValue,
    },
    RequestReset(ResetRequest),
    SaveParams(PersistedParams),
    /// Tone is already on; arm the one-shot that turns it off.
    ArmBeepOff,
    /// Start the setpoint blink periodic if one is not already running.
    StartBlink,
}

/// The state controller proper: owns the semantic state and the display
/// element, applies key presses and collaborator writes, and hands side
/// effects back as actions.
pub struct PanelCore<P> {
    panel: P,
    config: PanelConfig,
    params: PanelParams,
    blink_count: u32,
    blink_running: bool,
    // Held-key repeat bookkeeping, indexed by TouchKey::index().
    last_step_held_ms: [u64; TOUCH_KEY_COUNT],
}

impl<P: SegmentPanel> PanelCore<P> {
    pub fn new(panel: P, config: PanelConfig, params: PanelParams) -> Self {
        Self {
            panel,
            config,
            params,
            blink_count: 0,
            blink_running: false,
            last_step_held_ms: [0; TOUCH_KEY_COUNT],
        }
    }

    pub fn params(&self) -> &PanelParams {
        &self.params
    }

    pub fn is_blinking(&self) -> bool {
        self.blink_count > 0
    }

    /// Restores a persisted snapshot. Silent; call before `init`.
    pub fn apply_persisted(&mut self, mut saved: PersistedParams) {
        saved.sanitize();
        self.params.power = saved.power;
        self.params.setpoint = saved.setpoint;
        self.params.mode = saved.mode;
        self.params.speed = saved.speed;
        self.params.scene = saved.scene;
        self.params.valve_open = saved.valve_open;
        self.params.direction = saved.direction;
    }

    /// First paint: fixed furniture into the mirror, then a full repaint.
    pub fn init(&mut self) {
        lcd::set_defaults(self.panel.buffer());
        let mut actions = Vec::new();
        self.refresh(false, &mut actions);
    }

    pub fn handle_press(&mut self, event: PressEvent) -> Vec<PanelAction> {
        let mut actions = Vec::new();
        match event {
            PressEvent::Start { key } => {
                self.last_step_held_ms[key.index()] = 0;
            }
            PressEvent::Keep { key, held_ms } => self.handle_keep(key, held_ms, &mut actions),
            PressEvent::End { key, kind, held_ms } => match kind {
                PressKind::Short => self.handle_short(key, &mut actions),
                PressKind::Long => self.handle_long(key, held_ms, &mut actions),
            },
        }
        actions
    }

    fn handle_keep(&mut self, key: TouchKey, held_ms: u64, actions: &mut Vec<PanelAction>) {
        let delta = match key {
            TouchKey::Up => SETPOINT_STEP,
            TouchKey::Down => -SETPOINT_STEP,
            _ => return,
        };
        let slot = &mut self.last_step_held_ms[key.index()];
        if held_ms.saturating_sub(*slot) < u64::from(self.config.step_repeat_ms) {
            return;
        }
        *slot = held_ms;
        self.step_setpoint(delta, actions);
    }

    fn handle_short(&mut self, key: TouchKey, actions: &mut Vec<PanelAction>) {
        match key {
            TouchKey::Power => {
                self.params.power = !self.params.power;
                actions.push(PanelAction::Report {
                    param: PARAM_POWER,
                    value: ParamValue::Bool(self.params.power),
                });
                actions.push(PanelAction::SaveParams(self.persisted_snapshot()));
                self.refresh(true, actions);
            }
            TouchKey::Mode => {
                self.params.mode = self.params.mode.next();
                actions.push(PanelAction::Report {
                    param: PARAM_MODE,
                    value: ParamValue::Text(self.params.mode.as_str().to_string()),
                });
                actions.push(PanelAction::SaveParams(self.persisted_snapshot()));
                self.refresh(true, actions);
            }
            TouchKey::Speed => {
                self.params.speed = self.params.speed.next();
                actions.push(PanelAction::Report {
                    param: PARAM_SPEED,
                    value: ParamValue::Int(self.params.speed.index()),
                });
                actions.push(PanelAction::SaveParams(self.persisted_snapshot()));
                self.refresh(true, actions);
            }
            TouchKey::Time => {
                // Clock visibility is panel-local; nothing to report.
                self.params.show_clock = !self.params.show_clock;
                self.refresh(true, actions);
            }
            TouchKey::Up => {
                if self.last_step_held_ms[key.index()] == 0 {
                    self.step_setpoint(SETPOINT_STEP, actions);
                }
            }
            TouchKey::Down => {
                if self.last_step_held_ms[key.index()] == 0 {
                    self.step_setpoint(-SETPOINT_STEP, actions);
                }
            }
        }
    }

    fn handle_long(&mut self, key: TouchKey, held_ms: u64, actions: &mut Vec<PanelAction>) {
        if key != TouchKey::Power {
            return;
        }
        let request = if held_ms >= u64::from(self.config.factory_reset_ms) {
            ResetRequest::Factory
        } else {
            ResetRequest::Network
        };
        actions.push(PanelAction::RequestReset(request));
    }

    // Setpoint changes do not repaint immediately; the first visible change
    // is the blank half of the first blink period.
    fn step_setpoint(&mut self, delta: f32, actions: &mut Vec<PanelAction>) {
        let next = (self.params.setpoint + delta).clamp(SETPOINT_MIN, SETPOINT_MAX);
        self.params.setpoint = next;
        self.start_blink(actions);
    }

    fn start_blink(&mut self, actions: &mut Vec<PanelAction>) {
        self.blink_count = self.config.blink_count;
        if !self.blink_running {
            self.blink_running = true;
            actions.push(PanelAction::StartBlink);
        }
    }

    /// One period of the setpoint blink. Returns the actions to execute and
    /// whether the periodic should keep running.
    pub fn blink_tick(&mut self) -> (Vec<PanelAction>, bool) {
        let mut actions = Vec::new();
        if self.blink_count == 0 {
            self.blink_running = false;
            return (actions, false);
        }
        self.blink_count -= 1;
        let mut beep = false;
        if self.blink_count == 0 {
            self.blink_running = false;
            actions.push(PanelAction::Report {
                param: PARAM_SETPOINT,
                value: ParamValue::Float(self.params.setpoint),
            });
            actions.push(PanelAction::SaveParams(self.persisted_snapshot()));
            beep = true;
        }
        self.refresh(beep, &mut actions);
        (actions, self.blink_count > 0)
    }

    /// Applies a collaborator write. Unknown names and wrong payload types
    /// are ignored without an error.
    pub fn write(
        &mut self,
        param: &str,
        value: ParamValue,
        source: WriteSource,
    ) -> Vec<PanelAction> {
        let mut actions = Vec::new();
        let accepted: Option<(&'static str, ParamValue)> = match (param, &value) {
            (PARAM_POWER, ParamValue::Bool(on)) => {
                self.params.power = *on;
                Some((PARAM_POWER, value.clone()))
            }
            (PARAM_SETPOINT, ParamValue::Float(celsius)) => {
                let clamped = celsius.clamp(SETPOINT_MIN, SETPOINT_MAX);
                self.params.setpoint = clamped;
                if source != WriteSource::Init {
                    self.start_blink(&mut actions);
                }
                Some((PARAM_SETPOINT, ParamValue::Float(clamped)))
            }
            (PARAM_SPEED, ParamValue::Int(index)) => match WindSpeed::from_index(*index) {
                Some(speed) => {
                    self.params.speed = speed;
                    Some((PARAM_SPEED, value.clone()))
                }
                None => None,
            },
            (PARAM_MODE, ParamValue::Text(label)) => match WorkMode::from_label(label) {
                Some(mode) => {
                    self.params.mode = mode;
                    Some((PARAM_MODE, value.clone()))
                }
                None => None,
            },
            (PARAM_DIRECTION, ParamValue::Text(label)) => {
                if DIRECTION_LABELS.contains(&label.as_str()) {
                    self.params.direction = label.clone();
                    Some((PARAM_DIRECTION, value.clone()))
                } else {
                    None
                }
            }
            (PARAM_VALVE, ParamValue::Bool(open)) => {
                self.params.valve_open = *open;
                Some((PARAM_VALVE, value.clone()))
            }
            _ => None,
        };
        match accepted {
            Some((name, echo)) => {
                if source == WriteSource::Init {
                    self.refresh(false, &mut actions);
                } else {
                    actions.push(PanelAction::Report {
                        param: name,
                        value: echo,
                    });
                    actions.push(PanelAction::SaveParams(self.persisted_snapshot()));
                    self.refresh(true, &mut actions);
                }
            }
            None => debug!("ignoring parameter write {param}={value}"),
        }
        actions
    }

    /// Ambient sample from the probe; reported and shown unless the
    /// setpoint blink owns the temperature area.
    pub fn set_ambient(&mut self, celsius: f32) -> Vec<PanelAction> {
        self.params.ambient = celsius;
        let mut actions = vec![PanelAction::Report {
            param: PARAM_TEMPERATURE,
            value: ParamValue::Float(celsius),
        }];
        self.refresh(false, &mut actions);
        actions
    }

    pub fn sync_clock(&mut self, time: ClockTime) -> Vec<PanelAction> {
        self.params.clock = time;
        let mut actions = Vec::new();
        self.refresh(false, &mut actions);
        actions
    }

    pub fn beep_off(&mut self) {
        self.panel.beep(false);
    }

    fn persisted_snapshot(&self) -> PersistedParams {
        PersistedParams {
            power: self.params.power,
            setpoint: self.params.setpoint,
            mode: self.params.mode,
            speed: self.params.speed,
            scene: self.params.scene,
            valve_open: self.params.valve_open,
            direction: self.params.direction.clone(),
        }
    }

    // The single repaint path. Powered on: every field from the semantic
    // state, then one commit. Powered off: RAM wipe; the mirror keeps its
    // contents for the next power-on repaint.
    fn refresh(&mut self, beep: bool, actions: &mut Vec<PanelAction>) {
        if self.params.power {
            let buffer = self.panel.buffer();
            if self.blink_count > 0 {
                if self.blink_count % 2 == 1 {
                    lcd::clear_temperature(buffer);
                } else {
                    lcd::set_temperature(buffer, self.params.setpoint);
                }
            } else {
                lcd::set_temperature(buffer, self.params.ambient);
            }
            lcd::set_wind_speed(buffer, self.params.speed);
            lcd::set_valve(buffer, self.params.valve_open);
            if self.params.show_clock {
                lcd::set_time(buffer, self.params.clock);
            } else {
                lcd::clear_time(buffer);
            }
            lcd::set_work_mode(buffer, self.params.mode);
            lcd::set_alarm(buffer, self.params.alarm);
            lcd::set_lock(buffer, self.params.lock);
            lcd::set_house(buffer, self.params.house);
            lcd::set_scene(buffer, self.params.scene);
            lcd::set_warning(buffer, self.params.warning);
            self.panel.commit();
        } else {
            self.panel.wipe_ram();
        }
        if beep {
            self.panel.beep(true);
            actions.push(PanelAction::ArmBeepOff);
        }
    }
}

struct PanelShared<P> {
    core: Mutex<PanelCore<P>>,
    cloud: Arc<dyn CloudLink>,
    store: Box<dyn Fn(&PersistedParams) + Send + Sync>,
    beep_off: Mutex<Option<TimerHandle>>,
    beep_ms: u64,
    blink_period_ms: u64,
}

fn execute_actions<P: SegmentPanel + Send + 'static>(
    shared: &Arc<PanelShared<P>>,
    actions: Vec<PanelAction>,
) {
    for action in actions {
        match action {
            PanelAction::Report { param, value } => shared.cloud.report(param, value),
            PanelAction::RequestReset(request) => shared.cloud.request_reset(request),
            PanelAction::SaveParams(params) => (shared.store)(&params),
            PanelAction::ArmBeepOff => arm_beep_off(shared),
            PanelAction::StartBlink => start_blink(shared),
        }
    }
}

fn arm_beep_off<P: SegmentPanel + Send + 'static>(shared: &Arc<PanelShared<P>>) {
    let worker = Arc::clone(shared);
    let mut slot = shared.beep_off.lock().unwrap();
    if let Some(previous) = slot.take() {
        previous.cancel();
    }
    *slot = Some(timer::once("beep-off", shared.beep_ms, move || {
        worker.core.lock().unwrap().beep_off();
    }));
}

fn start_blink<P: SegmentPanel + Send + 'static>(shared: &Arc<PanelShared<P>>) {
    let worker = Arc::clone(shared);
    timer::every("setpoint-blink", shared.blink_period_ms, move || {
        let (actions, keep_going) = worker.core.lock().unwrap().blink_tick();
        execute_actions(&worker, actions);
        keep_going
    });
}

/// Thread-safe handle around the state controller. One lock guards state,
/// compositor and bus together; actions run after it is released.
pub struct Panel<P> {
    shared: Arc<PanelShared<P>>,
}

impl<P> Clone for Panel<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: SegmentPanel + Send + 'static> Panel<P> {
    pub fn new(
        core: PanelCore<P>,
        cloud: Arc<dyn CloudLink>,
        store: impl Fn(&PersistedParams) + Send + Sync + 'static,
    ) -> Self {
        let beep_ms = u64::from(core.config.beep_ms);
        let blink_period_ms = u64::from(core.config.blink_period_ms);
        Self {
            shared: Arc::new(PanelShared {
                core: Mutex::new(core),
                cloud,
                store: Box::new(store),
                beep_off: Mutex::new(None),
                beep_ms,
                blink_period_ms,
            }),
        }
    }

    pub fn init(&self) {
        self.shared.core.lock().unwrap().init();
    }

    pub fn params(&self) -> PanelParams {
        self.shared.core.lock().unwrap().params().clone()
    }

    pub fn handle_event(&self, event: PressEvent) {
        let actions = self.shared.core.lock().unwrap().handle_press(event);
        execute_actions(&self.shared, actions);
    }

    pub fn write(&self, param: &str, value: ParamValue, source: WriteSource) {
        let actions = self.shared.core.lock().unwrap().write(param, value, source);
        execute_actions(&self.shared, actions);
    }

    pub fn set_ambient(&self, celsius: f32) {
        let actions = self.shared.core.lock().unwrap().set_ambient(celsius);
        execute_actions(&self.shared, actions);
    }

    pub fn sync_clock(&self, time: ClockTime) {
        let actions = self.shared.core.lock().unwrap().sync_clock(time);
        execute_actions(&self.shared, actions);
    }

    /// Clock plus ambient in one locked pass, for the periodic platform task.
    pub fn periodic_update(&self, time: ClockTime, ambient: Option<f32>) {
        let actions = {
            let mut core = self.shared.core.lock().unwrap();
            let mut actions = core.sync_clock(time);
            if let Some(celsius) = ambient {
                actions.extend(core.set_ambient(celsius));
            }
            actions
        };
        execute_actions(&self.shared, actions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ht1621::SegmentBuffer;
    use crate::lcd::{glyph, CLOCK_COLON_MASK, MODE_COLD_MASK, VALVE_MASK};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct MockPanel {
        buffer: SegmentBuffer,
        commits: usize,
        wipes: usize,
        beeps: Vec<bool>,
    }

    impl SegmentPanel for MockPanel {
        fn buffer(&mut self) -> &mut SegmentBuffer {
            &mut self.buffer
        }

        fn commit(&mut self) {
            self.commits += 1;
        }

        fn wipe_ram(&mut self) {
            self.wipes += 1;
        }

        fn beep(&mut self, on: bool) {
            self.beeps.push(on);
        }
    }

    fn core() -> PanelCore<MockPanel> {
        let mut core = PanelCore::new(
            MockPanel::default(),
            PanelConfig::default(),
            PanelParams::default(),
        );
        core.init();
        core
    }

    fn tap(key: TouchKey) -> PressEvent {
        PressEvent::End {
            key,
            kind: PressKind::Short,
            held_ms: 100,
        }
    }

    fn temp_cells(core: &mut PanelCore<MockPanel>) -> [u8; 3] {
        let buffer = core.panel.buffer();
        [
            buffer.get(2) & !0x01,
            buffer.get(3) & !0x01,
            buffer.get(4) & !0x01,
        ]
    }

    fn reported(actions: &[PanelAction]) -> Vec<&'static str> {
        actions
            .iter()
            .filter_map(|a| match a {
                PanelAction::Report { param, .. } => Some(*param),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn init_paints_ambient_and_clock() {
        let mut core = core();
        assert_eq!(core.panel.commits, 1);
        assert_eq!(temp_cells(&mut core), [glyph('2'), glyph('6'), glyph('0')]);
        assert_ne!(core.panel.buffer().get(6) & CLOCK_COLON_MASK, 0);
    }

    #[test]
    fn power_tap_blanks_then_repaints() {
        let mut core = core();
        let actions = core.handle_press(tap(TouchKey::Power));
        assert!(!core.params().power);
        assert_eq!(core.panel.wipes, 1);
        assert_eq!(reported(&actions), vec![PARAM_POWER]);
        assert!(actions.contains(&PanelAction::ArmBeepOff));
        assert!(actions
            .iter()
            .any(|a| matches!(a, PanelAction::SaveParams(p) if !p.power)));

        let commits_before = core.panel.commits;
        core.handle_press(tap(TouchKey::Power));
        assert!(core.params().power);
        assert_eq!(core.panel.commits, commits_before + 1);
        assert_eq!(temp_cells(&mut core), [glyph('2'), glyph('6'), glyph('0')]);
    }

    #[test]
    fn mode_tap_cycles_and_reports_label() {
        let mut core = core();
        let actions = core.handle_press(tap(TouchKey::Mode));
        assert_eq!(core.params().mode, WorkMode::Cold);
        assert!(actions.contains(&PanelAction::Report {
            param: PARAM_MODE,
            value: ParamValue::Text("Cold".to_string()),
        }));
        assert_ne!(core.panel.buffer().get(16) & MODE_COLD_MASK, 0);
    }

    #[test]
    fn speed_tap_reports_index() {
        let mut core = core();
        let actions = core.handle_press(tap(TouchKey::Speed));
        assert_eq!(core.params().speed, WindSpeed::Low);
        assert!(actions.contains(&PanelAction::Report {
            param: PARAM_SPEED,
            value: ParamValue::Int(1),
        }));
    }

    #[test]
    fn time_tap_toggles_clock_without_reporting() {
        let mut core = core();
        let actions = core.handle_press(tap(TouchKey::Time));
        assert!(!core.params().show_clock);
        assert!(reported(&actions).is_empty());
        assert!(actions.contains(&PanelAction::ArmBeepOff));
        assert_eq!(core.panel.buffer().get(6), 0);

        core.handle_press(tap(TouchKey::Time));
        assert_ne!(core.panel.buffer().get(6) & CLOCK_COLON_MASK, 0);
    }

    #[test]
    fn up_tap_steps_setpoint_and_arms_blink_only() {
        let mut core = core();
        let actions = core.handle_press(tap(TouchKey::Up));
        assert!((core.params().setpoint - 16.1).abs() < 1e-4);
        assert_eq!(actions, vec![PanelAction::StartBlink]);
        // No repaint yet; the glass still shows the ambient reading.
        assert_eq!(temp_cells(&mut core), [glyph('2'), glyph('6'), glyph('0')]);
    }

    #[test]
    fn setpoint_clamps_at_range_ends() {
        let mut core = core();
        core.params.setpoint = 39.95;
        core.handle_press(tap(TouchKey::Up));
        core.handle_press(tap(TouchKey::Up));
        assert_eq!(core.params().setpoint, SETPOINT_MAX);

        core.params.setpoint = 0.05;
        core.handle_press(tap(TouchKey::Down));
        core.handle_press(tap(TouchKey::Down));
        assert_eq!(core.params().setpoint, SETPOINT_MIN);
    }

    #[test]
    fn blink_runs_ten_periods_then_reports_once() {
        let mut core = core();
        core.handle_press(tap(TouchKey::Up));
        assert!(core.is_blinking());

        let mut toggles = Vec::new();
        for tick in 0..10 {
            let (actions, keep_going) = core.blink_tick();
            toggles.push(temp_cells(&mut core));
            let last = tick == 9;
            assert_eq!(keep_going, !last, "tick {tick}");
            if last {
                assert_eq!(reported(&actions), vec![PARAM_SETPOINT]);
                assert!(actions.contains(&PanelAction::ArmBeepOff));
            } else {
                assert!(reported(&actions).is_empty(), "tick {tick}");
            }
        }
        // Odd counts blank the area, even counts show the setpoint, and the
        // final tick falls back to the ambient reading.
        assert_eq!(toggles[0], [0, 0, 0]);
        assert_eq!(toggles[1], [glyph('1'), glyph('6'), glyph('1')]);
        assert_eq!(toggles[8], [0, 0, 0]);
        assert_eq!(toggles[9], [glyph('2'), glyph('6'), glyph('0')]);
        assert!(!core.is_blinking());

        // The counter is inert once it reaches zero.
        let (actions, keep_going) = core.blink_tick();
        assert!(actions.is_empty());
        assert!(!keep_going);
    }

    #[test]
    fn step_while_blinking_reloads_without_second_timer() {
        let mut core = core();
        let first = core.handle_press(tap(TouchKey::Up));
        assert_eq!(first, vec![PanelAction::StartBlink]);
        core.blink_tick();
        core.blink_tick();
        core.blink_tick();

        let second = core.handle_press(tap(TouchKey::Up));
        assert!(second.is_empty());
        assert!((core.params().setpoint - 16.2).abs() < 1e-4);

        let mut remaining = 0;
        loop {
            let (_, keep_going) = core.blink_tick();
            remaining += 1;
            if !keep_going {
                break;
            }
        }
        assert_eq!(remaining, 10);
    }

    #[test]
    fn held_up_repeats_every_hundred_ms() {
        let mut core = core();
        core.handle_press(PressEvent::Start { key: TouchKey::Up });
        for held_ms in [600, 650, 700, 750, 800] {
            core.handle_press(PressEvent::Keep {
                key: TouchKey::Up,
                held_ms,
            });
        }
        // Steps land at 600, 700 and 800 ms of hold.
        assert!((core.params().setpoint - 16.3).abs() < 1e-4);

        core.handle_press(PressEvent::End {
            key: TouchKey::Up,
            kind: PressKind::Short,
            held_ms: 820,
        });
        assert!((core.params().setpoint - 16.3).abs() < 1e-4);
    }

    #[test]
    fn long_power_press_requests_matching_reset() {
        let mut core = core();
        let network = core.handle_press(PressEvent::End {
            key: TouchKey::Power,
            kind: PressKind::Long,
            held_ms: 4000,
        });
        assert_eq!(
            network,
            vec![PanelAction::RequestReset(ResetRequest::Network)]
        );
        assert!(core.params().power);

        let factory = core.handle_press(PressEvent::End {
            key: TouchKey::Power,
            kind: PressKind::Long,
            held_ms: 12_000,
        });
        assert_eq!(
            factory,
            vec![PanelAction::RequestReset(ResetRequest::Factory)]
        );
    }

    #[test]
    fn long_press_on_other_keys_is_ignored() {
        let mut core = core();
        let actions = core.handle_press(PressEvent::End {
            key: TouchKey::Mode,
            kind: PressKind::Long,
            held_ms: 4000,
        });
        assert!(actions.is_empty());
        assert_eq!(core.params().mode, WorkMode::Auto);
    }

    #[test]
    fn live_write_applies_echoes_and_beeps() {
        let mut core = core();
        let actions = core.write(PARAM_VALVE, ParamValue::Bool(true), WriteSource::Cloud);
        assert!(core.params().valve_open);
        assert_ne!(core.panel.buffer().get(1) & VALVE_MASK, 0);
        assert!(actions.contains(&PanelAction::Report {
            param: PARAM_VALVE,
            value: ParamValue::Bool(true),
        }));
        assert!(actions.contains(&PanelAction::ArmBeepOff));
    }

    #[test]
    fn init_write_applies_silently() {
        let mut core = core();
        let commits_before = core.panel.commits;
        let actions = core.write(
            PARAM_SETPOINT,
            ParamValue::Float(30.0),
            WriteSource::Init,
        );
        assert_eq!(core.params().setpoint, 30.0);
        assert!(actions.is_empty());
        assert!(!core.is_blinking());
        assert_eq!(core.panel.commits, commits_before + 1);
        assert!(core.panel.beeps.is_empty());
    }

    #[test]
    fn live_setpoint_write_clamps_echoes_and_blinks() {
        let mut core = core();
        let actions = core.write(PARAM_SETPOINT, ParamValue::Float(99.0), WriteSource::Cloud);
        assert_eq!(core.params().setpoint, SETPOINT_MAX);
        assert!(core.is_blinking());
        assert!(actions.contains(&PanelAction::StartBlink));
        assert!(actions.contains(&PanelAction::Report {
            param: PARAM_SETPOINT,
            value: ParamValue::Float(SETPOINT_MAX),
        }));
    }

    #[test]
    fn unknown_or_mistyped_writes_are_ignored() {
        let mut core = core();
        let before = core.params().clone();
        let commits_before = core.panel.commits;

        assert!(core
            .write("Humidity", ParamValue::Float(50.0), WriteSource::Cloud)
            .is_empty());
        assert!(core
            .write(PARAM_SPEED, ParamValue::Int(9), WriteSource::Cloud)
            .is_empty());
        assert!(core
            .write(PARAM_MODE, ParamValue::Int(1), WriteSource::Cloud)
            .is_empty());
        assert!(core
            .write(PARAM_MODE, ParamValue::Text("Blast".into()), WriteSource::Cloud)
            .is_empty());
        assert!(core
            .write(PARAM_DIRECTION, ParamValue::Text("Sideways".into()), WriteSource::Cloud)
            .is_empty());

        assert_eq!(*core.params(), before);
        assert_eq!(core.panel.commits, commits_before);
    }

    #[test]
    fn ambient_update_reports_and_repaints() {
        let mut core = core();
        let actions = core.set_ambient(23.4);
        assert_eq!(reported(&actions), vec![PARAM_TEMPERATURE]);
        assert!(actions.iter().all(|a| *a != PanelAction::ArmBeepOff));
        assert_eq!(temp_cells(&mut core), [glyph('2'), glyph('3'), glyph('4')]);
    }

    #[test]
    fn ambient_update_during_blink_keeps_blink_display() {
        let mut core = core();
        core.handle_press(tap(TouchKey::Up));
        core.blink_tick();
        core.set_ambient(23.4);
        // Count sits at an odd value, so the area stays blank.
        assert_eq!(temp_cells(&mut core), [0, 0, 0]);
    }

    #[test]
    fn persisted_snapshot_survives_restore() {
        let mut core = core();
        core.handle_press(tap(TouchKey::Mode));
        core.handle_press(tap(TouchKey::Speed));
        core.handle_press(tap(TouchKey::Power));
        let saved = core.persisted_snapshot();

        let mut restored = PanelCore::new(
            MockPanel::default(),
            PanelConfig::default(),
            PanelParams::default(),
        );
        restored.apply_persisted(saved.clone());
        restored.init();
        assert_eq!(restored.persisted_snapshot(), saved);
        assert!(!restored.params().power);
        assert_eq!(restored.params().mode, WorkMode::Cold);
        assert_eq!(restored.params().speed, WindSpeed::Low);
    }

    struct NullLink;

    impl CloudLink for NullLink {
        fn report(&self, _param: &str, _value: ParamValue) {}
        fn request_reset(&self, _request: ResetRequest) {}
    }

    #[test]
    fn concurrent_writes_and_presses_stay_consistent() {
        use std::thread;

        let core = PanelCore::new(
            MockPanel::default(),
            PanelConfig::default(),
            PanelParams::default(),
        );
        let panel = Panel::new(core, Arc::new(NullLink), |_| {});
        panel.init();

        let writer = {
            let panel = panel.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    panel.write(
                        PARAM_VALVE,
                        ParamValue::Bool(i % 2 == 0),
                        WriteSource::Cloud,
                    );
                    panel.write(
                        PARAM_MODE,
                        ParamValue::Text("Heat".to_string()),
                        WriteSource::Cloud,
                    );
                }
            })
        };
        let presser = {
            let panel = panel.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    panel.handle_event(tap(TouchKey::Speed));
                }
            })
        };
        let sampler = {
            let panel = panel.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    panel.set_ambient(20.0 + (i % 10) as f32);
                }
            })
        };
        writer.join().unwrap();
        presser.join().unwrap();
        sampler.join().unwrap();

        // 200 speed taps land back on the starting variant.
        let params = panel.params();
        assert_eq!(params.mode, WorkMode::Heat);
        assert_eq!(params.speed, WindSpeed::Auto);

        // The glass agrees with the final state.
        let mut core = panel.shared.core.lock().unwrap();
        let byte16 = core.panel.buffer().get(16);
        assert_ne!(byte16 & crate::lcd::MODE_HEAT_MASK, 0);
        assert_eq!(byte16 & crate::lcd::SPEED_AUTO_MASK, crate::lcd::SPEED_AUTO_MASK);
    }
}
