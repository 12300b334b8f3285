use std::{
    sync::{Arc, Mutex, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::{Datelike, Timelike};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyOutputPin, Output, PinDriver},
};
use esp_idf_svc::{
    hal::prelude::Peripherals,
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    sys,
};
use log::{info, warn};

use fancoil_common::{
    config::BusHardwareConfig,
    ntc::NtcProfile,
    touch::TouchProbe,
    ClockTime, CloudLink, DayOfWeek, Ht1621, Panel, PanelCore, PanelParams, ParamValue,
    PersistedParams, ResetRequest, RuntimeConfig, TouchPanel,
};

const NVS_NAMESPACE: &str = "fancoil";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const NVS_PARAMS_KEY: &str = "params_json";
const MAX_NVS_JSON: usize = 2048;
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const RESTART_DELAY_MS: u64 = 500;
const TOUCH_FILTER_PERIOD_MS: u32 = 10;
const ADC_DEFAULT_VREF_MV: u32 = 1100;

type BusPin = PinDriver<'static, AnyOutputPin, Output>;
type PanelDriver = Ht1621<BusPin, BusPin, BusPin, Ets>;

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
    lock: Arc<Mutex<()>>,
}

pub fn run() -> anyhow::Result<()> {
    sys::link_patches();
    EspLogger::initialize_default();

    let nvs_partition = EspDefaultNvsPartition::take()?;
    let store = NvsStore {
        partition: nvs_partition,
        lock: Arc::new(Mutex::new(())),
    };

    let mut runtime = store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let saved = store.load_params().unwrap_or_else(|err| {
        warn!("failed to load saved parameters from NVS: {err:#}");
        PersistedParams::default()
    });

    info!(
        "NVS config loaded: bus cs/wr/data={}/{}/{}, adc_channel={}, pads={:?}",
        runtime.bus.cs_pin,
        runtime.bus.wr_pin,
        runtime.bus.data_pin,
        runtime.bus.adc_channel,
        runtime.touch.pads,
    );

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    let _peripherals = Peripherals::take()?;
    let driver = init_display(&runtime.bus).context("display bus init failed")?;
    let _backlight = init_backlight(runtime.bus.backlight_pin);

    let mut core = PanelCore::new(driver, runtime.panel.clone(), PanelParams::default());
    core.apply_persisted(saved);

    let link = EspCloudLink {
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

    let mut probe =
        TouchPadProbe::init(&runtime.touch.pads).context("touch peripheral init failed")?;
    let touch = TouchPanel::calibrate(&runtime.panel, &runtime.touch, &mut probe);
    for channel in touch.channels() {
        info!(
            "touch pad {} ({}) threshold {}",
            channel.pad(),
            channel.key().as_str(),
            channel.threshold(),
        );
    }
    spawn_touch_poll(panel.clone(), touch, probe, u64::from(runtime.panel.tick_ms));

    let ntc = match NtcReader::init(runtime.bus.adc_channel) {
        Ok(reader) => Some(reader),
        Err(err) => {
            warn!("ambient probe unavailable, running without it: {err:#}");
            None
        }
    };
    spawn_periodic(panel, ntc, u64::from(runtime.panel.ambient_period_ms));

    info!("fan coil panel running");
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

fn init_display(bus: &BusHardwareConfig) -> anyhow::Result<PanelDriver> {
    for (name, pin) in [("cs", bus.cs_pin), ("wr", bus.wr_pin), ("data", bus.data_pin)] {
        if pin < 0 {
            return Err(anyhow!("invalid display bus {name} pin: {pin}"));
        }
    }

    let cs = unsafe { PinDriver::output(AnyOutputPin::new(bus.cs_pin)) }?;
    let wr = unsafe { PinDriver::output(AnyOutputPin::new(bus.wr_pin)) }?;
    let data = unsafe { PinDriver::output(AnyOutputPin::new(bus.data_pin)) }?;

    let mut driver = Ht1621::new(cs, wr, data, Ets);
    driver.begin();
    Ok(driver)
}

// The backlight is a plain GPIO held high for the program lifetime; losing
// it is cosmetic, so failures only warn.
fn init_backlight(pin: i32) -> Option<BusPin> {
    if pin < 0 {
        return None;
    }
    match unsafe { PinDriver::output(AnyOutputPin::new(pin)) } {
        Ok(mut driver) => {
            let _ = driver.set_high();
            Some(driver)
        }
        Err(err) => {
            warn!("backlight unavailable on GPIO{pin}: {err}");
            None
        }
    }
}

fn spawn_touch_poll(
    panel: Panel<PanelDriver>,
    mut touch: TouchPanel,
    mut probe: TouchPadProbe,
    tick_ms: u64,
) {
    thread::Builder::new()
        .name("touch-poll".to_string())
        .stack_size(8 * 1024)
        .spawn(move || {
            if let Err(err) = add_current_task_to_watchdog() {
                warn!("failed to register touch poll with watchdog: {err:#}");
            }
            loop {
                feed_watchdog();
                for event in touch.poll(&mut probe, monotonic_ms()) {
                    panel.handle_event(event);
                }
                thread::sleep(Duration::from_millis(tick_ms));
            }
        })
        .expect("failed to spawn touch poll thread");
}

fn spawn_periodic(panel: Panel<PanelDriver>, mut ntc: Option<NtcReader>, period_ms: u64) {
    thread::Builder::new()
        .name("panel-periodic".to_string())
        .spawn(move || loop {
            thread::sleep(Duration::from_millis(period_ms));
            let ambient = ntc.as_mut().and_then(|reader| match reader.read_celsius() {
                Ok(celsius) => Some(celsius),
                Err(err) => {
                    warn!("ambient probe read failed: {err:#}");
                    None
                }
            });
            panel.periodic_update(local_clock_time(), ambient);
        })
        .expect("failed to spawn periodic thread");
}

struct EspCloudLink {
    store: NvsStore,
}

impl CloudLink for EspCloudLink {
    fn report(&self, param: &str, value: ParamValue) {
        info!("report {param} = {value}");
    }

    fn request_reset(&self, request: ResetRequest) {
        match request {
            ResetRequest::Network => {
                warn!("network reset requested; restarting to reprovision");
                restart_after("network-reset", RESTART_DELAY_MS);
            }
            ResetRequest::Factory => {
                warn!("factory reset requested; clearing stored parameters");
                if let Err(err) = self.store.clear_params() {
                    warn!("failed to clear stored parameters: {err:#}");
                }
                restart_after("factory-reset", RESTART_DELAY_MS);
            }
        }
    }
}

/// ESP32 legacy touch peripheral behind the probe trait. A failed read comes
/// back saturated so the channel looks untouched instead of stuck pressed.
struct TouchPadProbe;

impl TouchPadProbe {
    fn init(pads: &[u32; 6]) -> anyhow::Result<Self> {
        esp_check(unsafe { sys::touch_pad_init() }, "touch_pad_init")?;
        esp_check(
            unsafe {
                sys::touch_pad_set_voltage(
                    sys::touch_high_volt_t_TOUCH_HVOLT_2V7,
                    sys::touch_low_volt_t_TOUCH_LVOLT_0V5,
                    sys::touch_volt_atten_t_TOUCH_HVOLT_ATTEN_1V,
                )
            },
            "touch_pad_set_voltage",
        )?;
        for &pad in pads {
            esp_check(
                unsafe { sys::touch_pad_config(pad as sys::touch_pad_t, 0) },
                "touch_pad_config",
            )?;
        }
        esp_check(
            unsafe { sys::touch_pad_filter_start(TOUCH_FILTER_PERIOD_MS) },
            "touch_pad_filter_start",
        )?;
        Ok(Self)
    }
}

impl TouchProbe for TouchPadProbe {
    fn read_raw(&mut self, pad: u32) -> u16 {
        let mut raw: u16 = 0;
        let rc = unsafe { sys::touch_pad_read_filtered(pad as sys::touch_pad_t, &mut raw) };
        if rc != sys::ESP_OK {
            return u16::MAX;
        }
        raw
    }
}

/// Thermistor divider on ADC1, converted through the factory calibration
/// curve and the beta model.
struct NtcReader {
    channel: sys::adc1_channel_t,
    characteristics: sys::esp_adc_cal_characteristics_t,
    profile: NtcProfile,
}

impl NtcReader {
    fn init(channel: u32) -> anyhow::Result<Self> {
        if channel >= sys::adc1_channel_t_ADC1_CHANNEL_MAX {
            return Err(anyhow!("unsupported ADC1 channel: {channel}"));
        }
        let channel = channel as sys::adc1_channel_t;

        esp_check(
            unsafe { sys::adc1_config_width(sys::adc_bits_width_t_ADC_WIDTH_BIT_12) },
            "adc1_config_width",
        )?;
        esp_check(
            unsafe { sys::adc1_config_channel_atten(channel, sys::adc_atten_t_ADC_ATTEN_DB_11) },
            "adc1_config_channel_atten",
        )?;

        let mut characteristics = sys::esp_adc_cal_characteristics_t::default();
        unsafe {
            sys::esp_adc_cal_characterize(
                sys::adc_unit_t_ADC_UNIT_1,
                sys::adc_atten_t_ADC_ATTEN_DB_11,
                sys::adc_bits_width_t_ADC_WIDTH_BIT_12,
                ADC_DEFAULT_VREF_MV,
                &mut characteristics,
            );
        }

        Ok(Self {
            channel,
            characteristics,
            profile: NtcProfile::default(),
        })
    }

    fn read_celsius(&mut self) -> anyhow::Result<f32> {
        let raw = unsafe { sys::adc1_get_raw(self.channel) };
        if raw < 0 {
            return Err(anyhow!("adc1_get_raw failed"));
        }
        let mv = unsafe { sys::esp_adc_cal_raw_to_voltage(raw as u32, &self.characteristics) };
        Ok(self.profile.celsius_from_mv(mv)?)
    }
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().unwrap();
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; MAX_NVS_JSON];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }

    fn load_params(&self) -> anyhow::Result<PersistedParams> {
        let _guard = self.lock.lock().unwrap();
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; MAX_NVS_JSON];

        match nvs.get_str(NVS_PARAMS_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<PersistedParams>(value)?),
            None => Ok(PersistedParams::default()),
        }
    }

    fn save_params(&self, params: &PersistedParams) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let payload = serde_json::to_string(params)?;
        nvs.set_str(NVS_PARAMS_KEY, &payload)?;
        Ok(())
    }

    fn clear_params(&self) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        nvs.remove(NVS_PARAMS_KEY)?;
        Ok(())
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { sys::esp_task_wdt_init(&config) };
    if rc == sys::ESP_OK || rc == sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == sys::ESP_OK || rc == sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { sys::esp_task_wdt_reset() };
}

fn esp_check(rc: sys::esp_err_t, what: &str) -> anyhow::Result<()> {
    if rc == sys::ESP_OK {
        Ok(())
    } else {
        Err(anyhow!("{what} failed with code {rc}"))
    }
}

fn restart_after(reason: &'static str, delay_ms: u64) {
    thread::Builder::new()
        .name("restart-request".to_string())
        .spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            info!("restarting ({reason})");
            unsafe { sys::esp_restart() };
        })
        .expect("failed to spawn restart thread");
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
