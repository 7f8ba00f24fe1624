use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, Method, Uri},
    response::{IntoResponse, Response},
    Router,
};
use embedded_hal::delay::DelayNs;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    sync::Notify,
};
use tracing::{debug, info, warn};

use hub_common::{
    dispatch, sensor::adc_to_celsius, Actuator, ButtonEventSource, ButtonId, DeviceState,
    DisplayDriver, EdgeOutcome, EventQueue, FirmwareReset, Hub, IndicatorChannel,
    InternalThermometer, NetworkInfo, NetworkStatus, PeripheralError, Peripherals, RequestLine,
    RuntimeConfig, SensorDriver, SensorError,
};

type HostHub = Hub<
    SimulatedDht,
    SimulatedDieSensor,
    LogDisplay,
    HostNetwork,
    HostReset,
    Arc<LogActuator>,
>;

#[derive(Clone)]
struct HttpState {
    state: Arc<DeviceState>,
    actuator: Arc<LogActuator>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let port = std::env::var("HUB_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.hub.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind hub server at {addr}"))?;

    let state = Arc::new(DeviceState::new(runtime.hub.alarm.temperature_limit_c));
    let events = Arc::new(EventQueue::new());
    let actuator = Arc::new(LogActuator);
    let shutdown = Arc::new(Notify::new());

    let hub = Hub::new(
        runtime.hub.clone(),
        state.clone(),
        events.clone(),
        actuator.clone(),
        Peripherals {
            sensor: SimulatedDht::from_env(),
            thermometer: SimulatedDieSensor::default(),
            display: LogDisplay::default(),
            network: HostNetwork {
                address: addr.to_string(),
            },
            reset: HostReset {
                shutdown: shutdown.clone(),
            },
        },
    );
    spawn_hub_loop(hub, Duration::from_millis(runtime.hub.tick_ms))?;
    spawn_button_reader(ButtonEventSource::new(
        state.clone(),
        events,
        runtime.hub.buttons.debounce_ms,
    ));

    info!("hub listening on http://{addr} (stdin: `a` = mode button, `b` = reset button)");
    axum::serve(listener, router(HttpState { state, actuator }))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

fn router(state: HttpState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

async fn handle_request(State(app): State<HttpState>, method: Method, uri: Uri) -> Response {
    let request = RequestLine::new(method.as_str(), uri.path());
    let (route, response) = dispatch(&request, &app.state, &app.actuator);
    debug!(?route, path = uri.path(), "served request");
    ([(header::CONTENT_TYPE, response.content_type)], response.body).into_response()
}

fn spawn_hub_loop(mut hub: HostHub, tick: Duration) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("hub-loop".into())
        .spawn(move || {
            let mut delay = StdDelay;
            loop {
                let report = hub.tick(&mut delay);
                debug!(
                    view = report.view.name(),
                    events = report.events,
                    successes = report.acquisition.successes,
                    "tick"
                );
                thread::sleep(tick);
            }
        })
        .context("failed to spawn hub loop thread")?;
    Ok(())
}

fn spawn_button_reader(source: ButtonEventSource) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            };

            let button = match line.trim() {
                "a" => ButtonId::Mode,
                "b" => ButtonId::Reset,
                "" => continue,
                other => {
                    warn!("unknown input `{other}`; use `a` (mode) or `b` (reset)");
                    continue;
                }
            };
            match source.on_falling_edge(button, monotonic_ms()) {
                EdgeOutcome::Accepted(event) => debug!(?event, "button event queued"),
                EdgeOutcome::Dropped(event) => warn!(?event, "button event queue full"),
                EdgeOutcome::Bounced => {}
            }
        }
    });
}

async fn shutdown_signal(reset: Arc<Notify>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!("failed to listen for ctrl-c: {err}");
            }
        }
        _ = reset.notified() => info!("reset button pressed; stopping simulator"),
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HUB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hub"));
        Self::at(data_dir)
    }

    fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns.into()));
    }
}

struct SimulatedDht {
    base_c: f32,
    reads: u32,
    started: Instant,
}

impl SimulatedDht {
    fn new(base_c: f32) -> Self {
        Self {
            base_c,
            reads: 0,
            started: Instant::now(),
        }
    }

    fn from_env() -> Self {
        let base_c = std::env::var("HUB_SIM_BASE_C")
            .ok()
            .and_then(|value| value.parse::<f32>().ok())
            .unwrap_or(23.0);
        Self::new(base_c)
    }
}

impl SensorDriver for SimulatedDht {
    fn read_once(&mut self) -> Result<(f32, f32), SensorError> {
        self.reads = self.reads.wrapping_add(1);
        if self.reads % 7 == 0 {
            return Err(SensorError::Timeout);
        }
        if self.reads % 23 == 0 {
            return Err(SensorError::Checksum);
        }

        let phase = self.started.elapsed().as_secs_f32() / 120.0 * std::f32::consts::TAU;
        let jitter = (self.reads.wrapping_mul(37) % 11) as f32 * 0.05 - 0.25;
        let temperature = self.base_c + 1.5 * phase.sin() + jitter;
        let humidity = 55.0 + 5.0 * phase.cos() - jitter;
        Ok((temperature, humidity))
    }
}

#[derive(Default)]
struct SimulatedDieSensor {
    samples: u16,
}

impl InternalThermometer for SimulatedDieSensor {
    fn read_celsius(&mut self) -> Result<f32, PeripheralError> {
        self.samples = self.samples.wrapping_add(1);
        let raw = 870 + self.samples % 12;
        Ok(adc_to_celsius(raw))
    }
}

struct LogActuator;

impl Actuator for LogActuator {
    fn set_indicator(&self, channel: IndicatorChannel, on: bool) -> Result<(), PeripheralError> {
        info!(channel = channel.as_str(), on, "indicator");
        Ok(())
    }

    fn set_status_led(&self, on: bool) -> Result<(), PeripheralError> {
        info!(on, "status led");
        Ok(())
    }

    fn play_tone(&self, frequency_hz: u32, duration_ms: u32) -> Result<(), PeripheralError> {
        debug!(frequency_hz, duration_ms, "buzzer");
        thread::sleep(Duration::from_millis(duration_ms.into()));
        Ok(())
    }
}

#[derive(Default)]
struct LogDisplay {
    lines: Vec<String>,
    lit: bool,
    last_frame: Option<String>,
}

impl LogDisplay {
    fn frame(&self) -> String {
        if self.lit {
            "[filled]".to_string()
        } else {
            self.lines.join(" | ")
        }
    }
}

impl DisplayDriver for LogDisplay {
    fn clear(&mut self) -> Result<(), PeripheralError> {
        self.lines.clear();
        self.lit = false;
        Ok(())
    }

    fn fill(&mut self) -> Result<(), PeripheralError> {
        self.lit = true;
        Ok(())
    }

    fn draw_text(&mut self, text: &str, _x: i32, _y: i32) -> Result<(), PeripheralError> {
        self.lines.push(text.to_string());
        Ok(())
    }

    fn draw_circle(&mut self, _x: i32, _y: i32, _diameter: u32) -> Result<(), PeripheralError> {
        self.lines.push("(o)".to_string());
        Ok(())
    }

    fn present(&mut self) -> Result<(), PeripheralError> {
        let frame = self.frame();
        if self.last_frame.as_deref() != Some(frame.as_str()) {
            info!(target: "display", "{frame}");
            self.last_frame = Some(frame);
        }
        Ok(())
    }
}

struct HostNetwork {
    address: String,
}

impl NetworkStatus for HostNetwork {
    fn network_info(&self) -> Option<NetworkInfo> {
        Some(NetworkInfo {
            identifier: "host-sim".to_string(),
            signal_quality: 0,
            channel: 0,
            address: self.address.clone(),
        })
    }
}

struct HostReset {
    shutdown: Arc<Notify>,
}

impl FirmwareReset for HostReset {
    fn request_firmware_reset(&mut self) {
        warn!("firmware reset requested");
        self.shutdown.notify_one();
    }
}

fn monotonic_ms() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u32
}
