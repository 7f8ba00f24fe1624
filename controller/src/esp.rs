use core::convert::TryInto;
use std::{
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::{dht11, DhtError};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, PrimitiveStyle},
    text::{Baseline, Text},
};
use embedded_svc::{
    http::{
        server::{Connection, Request},
        Method,
    },
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        delay::{Ets, FreeRtos},
        gpio::{
            AnyIOPin, AnyInputPin, AnyOutputPin, Input, InputOutput, InterruptType, Output,
            PinDriver, Pull,
        },
        i2c::{I2cConfig, I2cDriver},
        ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver},
        modem::Modem,
        prelude::*,
    },
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use ssd1306::{
    mode::BufferedGraphicsMode, prelude::*, size::DisplaySize128x64, I2CDisplayInterface,
    Ssd1306,
};

use hub_common::{
    config::{BoardPins, NetworkConfig},
    handle, Actuator, ButtonEventSource, ButtonId, DeviceState, DisplayDriver, EventQueue,
    FirmwareReset, HttpError, Hub, IndicatorChannel, InternalThermometer, NetworkInfo,
    NetworkStatus, PeripheralError, Peripherals as HubPeripherals, RequestLine, ResponseSink,
    RuntimeConfig, SensorDriver, SensorError,
};

const NVS_NAMESPACE: &str = "hub";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 2_000;
const WIFI_RESTART_GRACE_MS: u64 = 120_000;

type OledDisplay = Ssd1306<
    I2CInterface<I2cDriver<'static>>,
    DisplaySize128x64,
    BufferedGraphicsMode<DisplaySize128x64>,
>;

#[derive(Clone)]
struct NvsStore {
    partition: EspDefaultNvsPartition,
}

struct Dht11 {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

struct DieThermometer {
    handle: esp_idf_svc::sys::temperature_sensor_handle_t,
}

struct BoardOutputs {
    leds: Mutex<[PinDriver<'static, AnyOutputPin, Output>; 3]>,
    status_led: Mutex<Option<PinDriver<'static, AnyOutputPin, Output>>>,
    buzzer: Mutex<LedcDriver<'static>>,
}

struct Oled {
    display: OledDisplay,
}

struct WifiLink {
    wifi: EspWifi<'static>,
    supervise: bool,
    disconnected_since: Option<Instant>,
}

struct ButtonPins {
    mode: PinDriver<'static, AnyInputPin, Input>,
    reset: PinDriver<'static, AnyInputPin, Input>,
}

struct ServerResponse<C: Connection>(Option<Request<C>>);

struct EspReset;

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore {
        partition: nvs_partition.clone(),
    };

    let mut runtime = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();
    ensure_wifi_defaults(&mut runtime);

    info!(
        "NVS config loaded: ssid=`{}`, limit={:.1}C, tick={}ms, port={}",
        runtime.network.wifi_ssid,
        runtime.hub.alarm.temperature_limit_c,
        runtime.hub.tick_ms,
        runtime.hub.http_port,
    );

    let esp_idf_svc::hal::prelude::Peripherals {
        modem, i2c0, ledc, ..
    } = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let pins = &runtime.pins;

    let outputs = Arc::new(init_outputs(pins, ledc)?);
    let display = init_display(pins, i2c0).context("failed to initialize display")?;
    let sensor = Dht11::new(pins.dht).context("failed to initialize DHT11")?;
    let thermometer = DieThermometer::new().context("failed to start die temperature sensor")?;

    let state = Arc::new(DeviceState::new(runtime.hub.alarm.temperature_limit_c));
    let events = Arc::new(EventQueue::new());
    let mut buttons = ButtonPins::new(
        pins,
        ButtonEventSource::new(
            state.clone(),
            events.clone(),
            runtime.hub.buttons.debounce_ms,
        ),
    )
    .context("failed to configure button interrupts")?;

    let network = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    // Keep the server alive for the program lifetime.
    let _server = if network.supervise {
        let port = runtime.hub.http_port;
        create_http_server(state.clone(), outputs.clone(), port)
            .inspect_err(|err| warn!("http server unavailable on port {port}: {err:#}"))
            .ok()
    } else {
        None
    };

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let mut hub = Hub::new(
        runtime.hub.clone(),
        state,
        events,
        outputs,
        HubPeripherals {
            sensor,
            thermometer,
            display: Oled { display },
            network,
            reset: EspReset,
        },
    );

    let tick_ms = runtime.hub.tick_ms.try_into().unwrap_or(u32::MAX);
    let mut delay = FreeRtos;
    loop {
        feed_watchdog();
        hub.tick(&mut delay);
        buttons.rearm();
        feed_watchdog();
        FreeRtos::delay_ms(tick_ms);
    }
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn has_station_credentials(network: &NetworkConfig) -> bool {
    let ssid = network.wifi_ssid.trim();
    !ssid.is_empty() && ssid != "CHANGE_ME"
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<WifiLink> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

    if !has_station_credentials(network) {
        warn!("wifi credentials missing; running offline");
        return Ok(WifiLink {
            wifi: esp_wifi,
            supervise: false,
            disconnected_since: None,
        });
    }

    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;
    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut connected = false;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|_| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                connected = true;
                break;
            }
            Err(err) => warn!("wifi connect failed on attempt {attempt}: {err:#}"),
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }
    if !connected {
        warn!("all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed; continuing offline");
    }
    drop(wifi);
    disable_wifi_power_save();

    Ok(WifiLink {
        wifi: esp_wifi,
        supervise: true,
        disconnected_since: None,
    })
}

impl NetworkStatus for WifiLink {
    fn network_info(&self) -> Option<NetworkInfo> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        if rc != esp_idf_svc::sys::ESP_OK {
            return None;
        }

        let ssid_len = ap_info
            .ssid
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(ap_info.ssid.len());
        let address = self
            .wifi
            .sta_netif()
            .get_ip_info()
            .map(|ip_info| ip_info.ip.to_string())
            .unwrap_or_default();

        Some(NetworkInfo {
            identifier: String::from_utf8_lossy(&ap_info.ssid[..ssid_len]).into_owned(),
            signal_quality: ap_info.rssi,
            channel: ap_info.primary,
            address,
        })
    }

    fn poll<A: Actuator>(&mut self, _state: &DeviceState, _actuator: &A) {
        if self.supervise {
            maintain_wifi_health(&mut self.disconnected_since);
        }
    }
}

fn create_http_server(
    state: Arc<DeviceState>,
    outputs: Arc<BoardOutputs>,
    port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 8 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;
    for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
        let state = state.clone();
        let outputs = outputs.clone();
        server.fn_handler::<anyhow::Error, _>("/*", method, move |req| {
            let request = RequestLine::new(method_name(req.method()), req.uri());
            handle(&request, &state, &*outputs, &mut ServerResponse(Some(req)))?;
            Ok(())
        })?;
    }

    info!("http server listening on port {port}");
    Ok(server)
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
        _ => "OTHER",
    }
}

fn write_failed(err: impl core::fmt::Debug) -> HttpError {
    HttpError::WriteFailed(format!("{err:?}"))
}

impl<C: Connection> ResponseSink for ServerResponse<C> {
    fn send(&mut self, content_type: &'static str, body: &[u8]) -> Result<(), HttpError> {
        let request = self
            .0
            .take()
            .ok_or_else(|| HttpError::WriteFailed("response already started".to_string()))?;
        let mut response = request
            .into_response(200, Some("OK"), &[("Content-Type", content_type)])
            .map_err(write_failed)?;
        response.write_all(body).map_err(write_failed)?;
        response.flush().map_err(write_failed)
    }
}

impl Dht11 {
    fn new(gpio: i32) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(unsafe { AnyIOPin::new(gpio) })?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin, delay: Ets })
    }
}

impl SensorDriver for Dht11 {
    fn read_once(&mut self) -> Result<(f32, f32), SensorError> {
        self.pin
            .set_high()
            .map_err(|err| SensorError::Driver(err.to_string()))?;

        match dht11::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => Ok((
                reading.temperature as f32,
                reading.relative_humidity as f32,
            )),
            Err(DhtError::Timeout) => Err(SensorError::Timeout),
            Err(DhtError::ChecksumMismatch) => Err(SensorError::Checksum),
            Err(err) => Err(SensorError::Driver(format!("{err:?}"))),
        }
    }
}

impl DieThermometer {
    fn new() -> anyhow::Result<Self> {
        let config = esp_idf_svc::sys::temperature_sensor_config_t {
            range_min: -10,
            range_max: 80,
            clk_src: esp_idf_svc::sys::soc_periph_temperature_sensor_clk_src_t_TEMPERATURE_SENSOR_CLK_SRC_DEFAULT,
            ..Default::default()
        };
        let mut handle: esp_idf_svc::sys::temperature_sensor_handle_t = core::ptr::null_mut();

        let rc = unsafe { esp_idf_svc::sys::temperature_sensor_install(&config, &mut handle) };
        if rc != esp_idf_svc::sys::ESP_OK {
            return Err(anyhow!("temperature_sensor_install failed with code {}", rc));
        }
        let rc = unsafe { esp_idf_svc::sys::temperature_sensor_enable(handle) };
        if rc != esp_idf_svc::sys::ESP_OK {
            return Err(anyhow!("temperature_sensor_enable failed with code {}", rc));
        }
        Ok(Self { handle })
    }
}

impl InternalThermometer for DieThermometer {
    fn read_celsius(&mut self) -> Result<f32, PeripheralError> {
        let mut celsius = 0.0_f32;
        let rc =
            unsafe { esp_idf_svc::sys::temperature_sensor_get_celsius(self.handle, &mut celsius) };
        if rc != esp_idf_svc::sys::ESP_OK {
            return Err(PeripheralError::Driver(format!(
                "temperature_sensor_get_celsius failed with code {rc}"
            )));
        }
        Ok(celsius)
    }
}

fn init_outputs(
    pins: &BoardPins,
    ledc: esp_idf_svc::hal::ledc::LEDC,
) -> anyhow::Result<BoardOutputs> {
    let led = |gpio: i32| -> anyhow::Result<PinDriver<'static, AnyOutputPin, Output>> {
        let mut pin = PinDriver::output(unsafe { AnyOutputPin::new(gpio) })?;
        pin.set_low()?;
        Ok(pin)
    };
    let leds = [led(pins.red)?, led(pins.green)?, led(pins.blue)?];
    let status_led = pins.status_led.map(led).transpose()?;

    let timer = LedcTimerDriver::new(
        ledc.timer0,
        &TimerConfig::default().frequency(1.kHz().into()),
    )?;
    let mut buzzer = LedcDriver::new(ledc.channel0, timer, unsafe {
        AnyOutputPin::new(pins.buzzer)
    })?;
    buzzer.set_duty(0)?;

    info!(
        "outputs ready: leds GPIO{}/{}/{}, buzzer GPIO{}",
        pins.red, pins.green, pins.blue, pins.buzzer
    );
    Ok(BoardOutputs {
        leds: Mutex::new(leds),
        status_led: Mutex::new(status_led),
        buzzer: Mutex::new(buzzer),
    })
}

fn driver_error(err: impl std::fmt::Display) -> PeripheralError {
    PeripheralError::Driver(err.to_string())
}

impl Actuator for BoardOutputs {
    fn set_indicator(&self, channel: IndicatorChannel, on: bool) -> Result<(), PeripheralError> {
        let mut leds = self
            .leds
            .lock()
            .map_err(|_| PeripheralError::Driver("led lock poisoned".to_string()))?;
        let pin = &mut leds[channel.index()];
        let result = if on { pin.set_high() } else { pin.set_low() };
        result.map_err(driver_error)
    }

    fn set_status_led(&self, on: bool) -> Result<(), PeripheralError> {
        let mut status_led = self
            .status_led
            .lock()
            .map_err(|_| PeripheralError::Driver("led lock poisoned".to_string()))?;
        let pin = status_led
            .as_mut()
            .ok_or_else(|| PeripheralError::Driver("no status led configured".to_string()))?;
        let result = if on { pin.set_high() } else { pin.set_low() };
        result.map_err(driver_error)
    }

    fn play_tone(&self, frequency_hz: u32, duration_ms: u32) -> Result<(), PeripheralError> {
        let mut buzzer = self
            .buzzer
            .lock()
            .map_err(|_| PeripheralError::Driver("buzzer lock poisoned".to_string()))?;

        let rc = unsafe {
            esp_idf_svc::sys::ledc_set_freq(
                esp_idf_svc::sys::ledc_mode_t_LEDC_LOW_SPEED_MODE,
                esp_idf_svc::sys::ledc_timer_t_LEDC_TIMER_0,
                frequency_hz,
            )
        };
        if rc != esp_idf_svc::sys::ESP_OK {
            return Err(PeripheralError::Driver(format!(
                "ledc_set_freq({frequency_hz}) failed with code {rc}"
            )));
        }

        let duty = buzzer.get_max_duty() / 2;
        buzzer.set_duty(duty).map_err(driver_error)?;
        FreeRtos::delay_ms(duration_ms);
        buzzer.set_duty(0).map_err(driver_error)
    }
}

fn init_display(
    pins: &BoardPins,
    i2c0: esp_idf_svc::hal::i2c::I2C0,
) -> anyhow::Result<OledDisplay> {
    let i2c = I2cDriver::new(
        i2c0,
        unsafe { AnyIOPin::new(pins.i2c_sda) },
        unsafe { AnyIOPin::new(pins.i2c_scl) },
        &I2cConfig::new().baudrate(400.kHz().into()),
    )?;

    let mut display = Ssd1306::new(
        I2CDisplayInterface::new(i2c),
        DisplaySize128x64,
        DisplayRotation::Rotate0,
    )
    .into_buffered_graphics_mode();
    display
        .init()
        .map_err(|err| anyhow!("ssd1306 init failed: {err:?}"))?;
    Ok(display)
}

fn display_error(err: impl core::fmt::Debug) -> PeripheralError {
    PeripheralError::Driver(format!("{err:?}"))
}

impl DisplayDriver for Oled {
    fn clear(&mut self) -> Result<(), PeripheralError> {
        self.display.clear_buffer();
        Ok(())
    }

    fn fill(&mut self) -> Result<(), PeripheralError> {
        self.display.clear(BinaryColor::On).map_err(display_error)
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32) -> Result<(), PeripheralError> {
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
            .draw(&mut self.display)
            .map(|_| ())
            .map_err(display_error)
    }

    fn draw_circle(&mut self, x: i32, y: i32, diameter: u32) -> Result<(), PeripheralError> {
        Circle::new(Point::new(x, y), diameter)
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 2))
            .draw(&mut self.display)
            .map_err(display_error)
    }

    fn present(&mut self) -> Result<(), PeripheralError> {
        self.display.flush().map_err(display_error)
    }
}

impl ButtonPins {
    fn new(pins: &BoardPins, source: ButtonEventSource) -> anyhow::Result<Self> {
        let mut buttons = Self {
            mode: Self::input(pins.button_mode)?,
            reset: Self::input(pins.button_reset)?,
        };

        for (pin, button) in [
            (&mut buttons.mode, ButtonId::Mode),
            (&mut buttons.reset, ButtonId::Reset),
        ] {
            let source = source.clone();
            unsafe {
                pin.subscribe(move || {
                    source.on_falling_edge(button, isr_now_ms());
                })?;
            }
            pin.enable_interrupt()?;
        }

        info!(
            "buttons armed: mode GPIO{}, reset GPIO{}",
            pins.button_mode, pins.button_reset
        );
        Ok(buttons)
    }

    fn input(gpio: i32) -> anyhow::Result<PinDriver<'static, AnyInputPin, Input>> {
        let mut pin = PinDriver::input(unsafe { AnyInputPin::new(gpio) })?;
        pin.set_pull(Pull::Up)?;
        pin.set_interrupt_type(InterruptType::NegEdge)?;
        Ok(pin)
    }

    // GPIO interrupts disable themselves after firing.
    fn rearm(&mut self) {
        for pin in [&mut self.mode, &mut self.reset] {
            if let Err(err) = pin.enable_interrupt() {
                warn!("failed to re-enable button interrupt: {err}");
            }
        }
    }
}

fn isr_now_ms() -> u32 {
    let micros = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    (micros / 1_000) as u32
}

impl FirmwareReset for EspReset {
    fn request_firmware_reset(&mut self) {
        warn!("firmware reset requested from button; restarting");
        thread::sleep(Duration::from_millis(100));
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

impl NvsStore {
    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 4096];

        match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
            Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

fn maintain_wifi_health(wifi_disconnected_since: &mut Option<Instant>) {
    if is_wifi_station_connected() {
        *wifi_disconnected_since = None;
        return;
    }

    match wifi_disconnected_since {
        Some(disconnected_since)
            if disconnected_since.elapsed().as_millis() as u64 >= WIFI_RESTART_GRACE_MS =>
        {
            warn!(
                "wifi disconnected for {}s; restarting device for recovery",
                WIFI_RESTART_GRACE_MS / 1000
            );
            thread::sleep(Duration::from_millis(100));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }
        Some(_) => {}
        None => *wifi_disconnected_since = Some(Instant::now()),
    }
}
