use std::{
    collections::HashMap,
    convert::Infallible,
    fmt::Write as _,
    fs,
    io::{self, BufRead, ErrorKind},
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use chrono::{Datelike, Timelike};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use tracing::{info, warn};

use fancoil_common::{
    config::TouchHardwareConfig,
    ht1621::{BUFFER_LEN, COMMIT_ORDER},
    lcd,
    params::{PARAM_DIRECTION, PARAM_MODE, PARAM_POWER, PARAM_SETPOINT, PARAM_SPEED, PARAM_VALVE},
    touch::TouchProbe,
    ClockTime, CloudLink, DayOfWeek, Ht1621, Panel, PanelCore, PanelParams, ParamValue,
    PersistedParams, ResetRequest, RuntimeConfig, TouchKey, TouchPanel, WriteSource,
};

// 32 nibble addresses; each data byte spans two. The controller decodes
// five address bits, so the byte-1 write at bus address 32 wraps to 0 and
// the wipe covers it.
const RAM_LEN: usize = 32;
const RAM_ADDR_MASK: usize = 0x1F;

const IDLE_LEVEL: u16 = 1200;
const TOUCHED_LEVEL: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusLine {
    Cs,
    Wr,
    Data,
}

/// Far side of the 3-wire bus: reassembles frames from pin edges the same
/// way the display controller does and keeps the resulting RAM image.
struct GlassState {
    ram: [u8; RAM_LEN],
    lcd_on: bool,
    beeping: bool,
    wr: bool,
    data: bool,
    frame: Option<Vec<bool>>,
}

impl GlassState {
    fn new() -> Self {
        Self {
            ram: [0; RAM_LEN],
            lcd_on: false,
            beeping: false,
            wr: true,
            data: true,
            frame: None,
        }
    }

    // A frame opens while CS is low; each WR rising edge clocks in the DATA
    // level; raising CS closes and applies the frame.
    fn edge(&mut self, line: BusLine, level: bool) {
        match line {
            BusLine::Cs => {
                if !level {
                    self.frame = Some(Vec::new());
                } else if let Some(bits) = self.frame.take() {
                    self.apply_frame(&bits);
                }
            }
            BusLine::Wr => {
                if level && !self.wr {
                    if let Some(bits) = self.frame.as_mut() {
                        bits.push(self.data);
                    }
                }
                self.wr = level;
            }
            BusLine::Data => self.data = level,
        }
    }

    fn apply_frame(&mut self, bits: &[bool]) {
        if bits.len() == 17 && bits[0] && !bits[1] && bits[2] {
            let addr = field(&bits[3..9]) as usize & RAM_ADDR_MASK;
            let data = field(&bits[9..17]);
            self.ram[addr] = data;
        } else if bits.len() == 12 && bits[0] && !bits[1] && !bits[2] && !bits[3] {
            match field(&bits[4..12]) {
                0x02 => self.lcd_on = false,
                0x03 => self.lcd_on = true,
                0x08 => self.beeping = false,
                0x09 => self.beeping = true,
                _ => {}
            }
        } else {
            warn!("unrecognized bus frame of {} bits", bits.len());
        }
    }
}

fn field(bits: &[bool]) -> u8 {
    bits.iter().fold(0u8, |acc, &b| (acc << 1) | b as u8)
}

struct SimPin {
    line: BusLine,
    glass: Arc<Mutex<GlassState>>,
}

impl embedded_hal::digital::ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.glass.lock().unwrap().edge(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.glass.lock().unwrap().edge(self.line, true);
        Ok(())
    }
}

struct SimDelay;

impl DelayNs for SimDelay {
    // Bus settle time means nothing off-hardware.
    fn delay_ns(&mut self, _ns: u32) {}
}

type SimDriver = Ht1621<SimPin, SimPin, SimPin, SimDelay>;

/// Capacitive pads as a table of raw levels the console can poke.
#[derive(Clone)]
struct SimProbe {
    levels: Arc<Mutex<HashMap<u32, u16>>>,
}

impl SimProbe {
    fn new(touch: &TouchHardwareConfig) -> Self {
        let levels = touch.pads.iter().map(|&pad| (pad, IDLE_LEVEL)).collect();
        Self {
            levels: Arc::new(Mutex::new(levels)),
        }
    }

    fn set_level(&self, pad: u32, level: u16) {
        self.levels.lock().unwrap().insert(pad, level);
    }
}

impl TouchProbe for SimProbe {
    fn read_raw(&mut self, pad: u32) -> u16 {
        self.levels
            .lock()
            .unwrap()
            .get(&pad)
            .copied()
            .unwrap_or(IDLE_LEVEL)
    }
}

struct ConsoleLink {
    store: PanelStore,
}

impl CloudLink for ConsoleLink {
    fn report(&self, param: &str, value: ParamValue) {
        info!("report {param} = {value}");
    }

    fn request_reset(&self, request: ResetRequest) {
        match request {
            ResetRequest::Network => {
                warn!("network reset requested; host build has nothing to reprovision");
            }
            ResetRequest::Factory => {
                warn!("factory reset requested; clearing stored parameters");
                if let Err(err) = self.store.clear_params() {
                    warn!("failed to clear stored parameters: {err:#}");
                }
            }
        }
    }
}

#[derive(Clone)]
struct PanelStore {
    runtime_path: Arc<PathBuf>,
    params_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = PanelStore::new();
    let mut runtime = store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let saved = store.load_params().unwrap_or_else(|err| {
        warn!("failed to load saved parameters from store: {err:#}");
        PersistedParams::default()
    });

    let glass = Arc::new(Mutex::new(GlassState::new()));
    let pin = |line| SimPin {
        line,
        glass: Arc::clone(&glass),
    };
    let mut driver = Ht1621::new(pin(BusLine::Cs), pin(BusLine::Wr), pin(BusLine::Data), SimDelay);
    driver.begin();

    let mut core = PanelCore::new(driver, runtime.panel.clone(), PanelParams::default());
    core.apply_persisted(saved);

    let link = ConsoleLink {
        store: store.clone(),
    };
    let panel = Panel::new(core, Arc::new(link), {
        let store = store.clone();
        move |params: &PersistedParams| {
            if let Err(err) = store.save_params(params) {
                warn!("failed to persist parameters: {err:#}");
            }
        }
    });
    panel.init();
    panel.sync_clock(local_clock_time());

    let mut probe = SimProbe::new(&runtime.touch);
    let touch = TouchPanel::calibrate(&runtime.panel, &runtime.touch, &mut probe);
    let console_probe = probe.clone();
    spawn_touch_poll(panel.clone(), touch, probe, u64::from(runtime.panel.tick_ms));

    let ambient = Arc::new(Mutex::new(panel.params().ambient));
    spawn_periodic(
        panel.clone(),
        Arc::clone(&ambient),
        u64::from(runtime.panel.ambient_period_ms),
    );

    info!("fan coil panel simulator ready; type 'help' for commands");
    repl(panel, console_probe, &runtime.touch, glass, ambient)
}

fn spawn_touch_poll(
    panel: Panel<SimDriver>,
    mut touch: TouchPanel,
    mut probe: SimProbe,
    tick_ms: u64,
) {
    thread::Builder::new()
        .name("touch-poll".to_string())
        .spawn(move || loop {
            for event in touch.poll(&mut probe, monotonic_ms()) {
                panel.handle_event(event);
            }
            thread::sleep(Duration::from_millis(tick_ms));
        })
        .expect("failed to spawn touch poll thread");
}

fn spawn_periodic(panel: Panel<SimDriver>, ambient: Arc<Mutex<f32>>, period_ms: u64) {
    thread::Builder::new()
        .name("panel-periodic".to_string())
        .spawn(move || loop {
            thread::sleep(Duration::from_millis(period_ms));
            let celsius = *ambient.lock().unwrap();
            panel.periodic_update(local_clock_time(), Some(celsius));
        })
        .expect("failed to spawn periodic thread");
}

fn repl(
    panel: Panel<SimDriver>,
    probe: SimProbe,
    touch: &TouchHardwareConfig,
    glass: Arc<Mutex<GlassState>>,
    ambient: Arc<Mutex<f32>>,
) -> anyhow::Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else { continue };
        match command {
            "tap" | "hold" => {
                let Some(key) = words.next().and_then(parse_key) else {
                    println!("usage: {command} <power|mode|time|speed|up|down> [ms]");
                    continue;
                };
                let default_ms = if command == "tap" { 200 } else { 4000 };
                let hold_ms = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(default_ms);
                press_key(&probe, touch, key, hold_ms);
            }
            "set" => {
                let (Some(name), Some(raw)) = (words.next(), words.next()) else {
                    println!("usage: set <power|setpoint|mode|speed|direction|valve> <value>");
                    continue;
                };
                match parse_write(name, raw) {
                    Some((param, value)) => panel.write(param, value, WriteSource::Cloud),
                    None => println!("cannot parse '{raw}' for '{name}'"),
                }
            }
            "ambient" => {
                let Some(celsius) = words.next().and_then(|w| w.parse::<f32>().ok()) else {
                    println!("usage: ambient <celsius>");
                    continue;
                };
                *ambient.lock().unwrap() = celsius;
                panel.set_ambient(celsius);
            }
            "clock" => {
                let Some(time) = words.next().and_then(|w| parse_clock(w, words.next())) else {
                    println!("usage: clock <hh:mm> [Mon|Tue|Wed|Thu|Fri|Sat|Sun]");
                    continue;
                };
                panel.sync_clock(time);
            }
            "show" => println!("{}", render(&glass.lock().unwrap())),
            "params" => println!("{:#?}", panel.params()),
            "help" => print_help(),
            "quit" | "exit" => break,
            other => println!("unknown command '{other}'; type 'help'"),
        }
    }
    Ok(())
}

fn press_key(probe: &SimProbe, touch: &TouchHardwareConfig, key: TouchKey, hold_ms: u64) {
    let pad = touch.pads[key.index()];
    probe.set_level(pad, TOUCHED_LEVEL);
    thread::sleep(Duration::from_millis(hold_ms));
    probe.set_level(pad, IDLE_LEVEL);
}

fn parse_key(word: &str) -> Option<TouchKey> {
    TouchKey::ALL.into_iter().find(|key| key.as_str() == word)
}

fn parse_write(name: &str, raw: &str) -> Option<(&'static str, ParamValue)> {
    match name {
        "power" => parse_bool(raw).map(|v| (PARAM_POWER, ParamValue::Bool(v))),
        "valve" => parse_bool(raw).map(|v| (PARAM_VALVE, ParamValue::Bool(v))),
        "setpoint" => raw.parse().ok().map(|v| (PARAM_SETPOINT, ParamValue::Float(v))),
        "speed" => raw.parse().ok().map(|v| (PARAM_SPEED, ParamValue::Int(v))),
        "mode" => Some((PARAM_MODE, ParamValue::Text(raw.to_string()))),
        "direction" => Some((PARAM_DIRECTION, ParamValue::Text(raw.to_string()))),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_clock(hhmm: &str, day: Option<&str>) -> Option<ClockTime> {
    let (h, m) = hhmm.split_once(':')?;
    let hour = h.parse::<u8>().ok().filter(|h| *h < 24)?;
    let minute = m.parse::<u8>().ok().filter(|m| *m < 60)?;
    let day = match day {
        Some(label) => parse_day(label)?,
        None => local_clock_time().day,
    };
    Some(ClockTime { hour, minute, day })
}

fn parse_day(label: &str) -> Option<DayOfWeek> {
    [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
        DayOfWeek::Sat,
        DayOfWeek::Sun,
    ]
    .into_iter()
    .find(|d| d.as_str() == label)
}

fn print_help() {
    println!("commands:");
    println!("  tap <key> [ms]       brief touch; keys: power mode time speed up down");
    println!("  hold <key> [ms]      long touch, default 4000 ms");
    println!("  set <param> <value>  collaborator write; params: power setpoint mode speed direction valve");
    println!("  ambient <celsius>    simulated probe reading");
    println!("  clock <hh:mm> [day]  wall clock shown on the glass");
    println!("  show                 decode the simulated display RAM");
    println!("  params               dump the semantic panel state");
    println!("  quit");
}

/// Decodes the RAM image back into a readout, reversing the commit mapping
/// and the glyph table.
fn render(glass: &GlassState) -> String {
    let mut bytes = [0u8; BUFFER_LEN];
    for (addr, index) in COMMIT_ORDER {
        bytes[index] = glass.ram[addr as usize & RAM_ADDR_MASK];
    }
    let b = |i: usize| bytes[i];
    let digit = |g: u8| lcd::glyph_digit(g).unwrap_or('?');

    let mut out = String::new();
    let _ = writeln!(
        out,
        "lcd {}  tone {}",
        on_off(glass.lcd_on),
        on_off(glass.beeping)
    );

    let point = if b(4) & lcd::DECIMAL_POINT_MASK != 0 { '.' } else { ' ' };
    let unit = if b(1) & lcd::CELSIUS_MASK != 0 { "\u{b0}C" } else { "" };
    let _ = writeln!(
        out,
        "temp [{}{}{point}{}] {unit}",
        digit(b(2) & !0x01),
        digit(b(3) & !0x01),
        digit(b(4) & !0x01),
    );

    let hour_low = (b(6) & 0xF0) | (b(14) & 0x0E);
    let hour_high = (b(14) & 0xF0) | (b(15) & 0x0E);
    let colon = if b(6) & lcd::CLOCK_COLON_MASK != 0 { ':' } else { ' ' };
    let _ = writeln!(
        out,
        "clock [{}{}{colon}{}{}] {}",
        digit(hour_high),
        digit(hour_low),
        digit(b(7) & !0x01),
        digit(b(8) & !0x01),
        weekday_label(&bytes),
    );

    let mode = if b(1) & lcd::MODE_AUTO_MASK != 0 {
        "Auto"
    } else if b(1) & lcd::MODE_DRY_MASK != 0 {
        "Dry"
    } else if b(15) & lcd::MODE_WIND_MASK != 0 {
        "Wind"
    } else if b(16) & lcd::MODE_HEAT_MASK != 0 {
        "Heat"
    } else if b(16) & lcd::MODE_COLD_MASK != 0 {
        "Cold"
    } else {
        "-"
    };
    let speed = if b(15) & lcd::SPEED_HIGH_BAR_MASK != 0 {
        "High"
    } else if b(16) & lcd::SPEED_AUTO_MASK != 0 {
        "Auto"
    } else if b(16) & lcd::SPEED_MID_MASK == lcd::SPEED_MID_MASK {
        "Mid"
    } else if b(16) & lcd::SPEED_LOW_MASK != 0 {
        "Low"
    } else {
        "-"
    };
    let _ = writeln!(out, "mode {mode}  speed {speed}");

    let mut icons = Vec::new();
    if b(1) & lcd::VALVE_MASK != 0 {
        icons.push("valve");
    }
    if b(1) & lcd::WARNING_MASK != 0 {
        icons.push("warning");
    }
    if b(15) & lcd::LOCK_MASK != 0 {
        icons.push("lock");
    }
    if b(5) & lcd::HOUSE_MASK != 0 {
        icons.push("house");
    }
    if b(5) & lcd::ALARM_MASK != 0 {
        icons.push("alarm");
    }
    if b(2) & lcd::SCENE_OUTDOOR_MASK != 0 {
        icons.push("outdoor");
    }
    if b(3) & lcd::SCENE_SLEEP_MASK != 0 {
        icons.push("sleep");
    }
    if b(16) & lcd::FAN_LOGO_MASK != 0 {
        icons.push("fan");
    }
    let _ = write!(out, "icons [{}]", icons.join(" "));
    out
}

fn weekday_label(bytes: &[u8; BUFFER_LEN]) -> &'static str {
    if bytes[5] & lcd::WEEKDAY_MON_MASK != 0 {
        "Mon"
    } else if bytes[5] & lcd::WEEKDAY_TUE_MASK != 0 {
        "Tue"
    } else if bytes[5] & lcd::WEEKDAY_WED_MASK != 0 {
        "Wed"
    } else if bytes[5] & lcd::WEEKDAY_THU_MASK != 0 {
        "Thu"
    } else if bytes[5] & lcd::WEEKDAY_FRI_MASK != 0 {
        "Fri"
    } else if bytes[6] & lcd::WEEKDAY_SAT_MASK != 0 {
        "Sat"
    } else if bytes[6] & lcd::WEEKDAY_SUN_MASK != 0 {
        "Sun"
    } else {
        ""
    }
}

fn on_off(state: bool) -> &'static str {
    if state {
        "on"
    } else {
        "off"
    }
}

impl PanelStore {
    fn new() -> Self {
        let data_dir = std::env::var("FANCOIL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.fancoil"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            params_path: Arc::new(data_dir.join("params.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().unwrap();
        match fs::read(self.runtime_path.as_ref()) {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn load_params(&self) -> anyhow::Result<PersistedParams> {
        let _guard = self.lock.lock().unwrap();
        match fs::read(self.params_path.as_ref()) {
            Ok(raw) => Ok(serde_json::from_slice::<PersistedParams>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(PersistedParams::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn save_params(&self, params: &PersistedParams) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let path = self.params_path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(params)?;
        fs::write(path, payload)?;
        Ok(())
    }

    fn clear_params(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        match fs::remove_file(self.params_path.as_ref()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn local_clock_time() -> ClockTime {
    let now = chrono::Local::now();
    ClockTime {
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        day: DayOfWeek::from_chrono(now.weekday()),
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
