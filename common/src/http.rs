use std::fmt::Write as _;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    peripherals::Actuator,
    state::{DeviceState, StateSnapshot},
    types::IndicatorChannel,
};

pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("response write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
}

impl RequestLine {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    pub fn parse(head: &[u8]) -> Option<Self> {
        let end = head.iter().position(|&byte| byte == b'\n')?;
        let line = String::from_utf8_lossy(&head[..end]);
        let mut tokens = line.trim_end_matches('\r').split_ascii_whitespace();
        let method = tokens.next().unwrap_or_default();
        let path = tokens.next().unwrap_or_default();
        Some(Self::new(method, path))
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Toggle(IndicatorChannel),
    Set(IndicatorChannel, bool),
    StatusLed(bool),
    ToggleAlarm,
    SensorData,
    Index,
}

const ROUTES: &[(&str, Route)] = &[
    ("/toggle_red", Route::Toggle(IndicatorChannel::Red)),
    ("/toggle_green", Route::Toggle(IndicatorChannel::Green)),
    ("/toggle_blue", Route::Toggle(IndicatorChannel::Blue)),
    ("/toggle_alarm", Route::ToggleAlarm),
    ("/sensorData", Route::SensorData),
    ("/red_on", Route::Set(IndicatorChannel::Red, true)),
    ("/red_off", Route::Set(IndicatorChannel::Red, false)),
    ("/green_on", Route::Set(IndicatorChannel::Green, true)),
    ("/green_off", Route::Set(IndicatorChannel::Green, false)),
    ("/blue_on", Route::Set(IndicatorChannel::Blue, true)),
    ("/blue_off", Route::Set(IndicatorChannel::Blue, false)),
    ("/on", Route::StatusLed(true)),
    ("/off", Route::StatusLed(false)),
];

impl Route {
    pub fn resolve(request: &RequestLine) -> Self {
        if !request.is_get() {
            return Self::Index;
        }
        ROUTES
            .iter()
            .find(|(prefix, _)| request.path.starts_with(prefix))
            .map(|(_, route)| *route)
            .unwrap_or(Self::Index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn html(body: String) -> Self {
        Self {
            content_type: CONTENT_TYPE_HTML,
            body,
        }
    }

    pub fn json(body: String) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON,
            body,
        }
    }
}

pub fn dispatch<A: Actuator>(
    request: &RequestLine,
    state: &DeviceState,
    actuator: &A,
) -> (Route, HttpResponse) {
    let route = Route::resolve(request);
    match route {
        Route::Toggle(channel) => {
            let on = state.toggle_led(channel);
            drive_indicator(actuator, channel, on);
        }
        Route::Set(channel, on) => {
            state.set_led(channel, on);
            drive_indicator(actuator, channel, on);
        }
        Route::StatusLed(on) => {
            state.set_status_led(on);
            if let Err(err) = actuator.set_status_led(on) {
                warn!("failed to drive status led: {err}");
            }
        }
        Route::ToggleAlarm => {
            let enabled = state.toggle_alarm();
            debug!("alarm {}", if enabled { "enabled" } else { "disabled" });
        }
        Route::SensorData | Route::Index => {}
    }

    let snapshot = state.snapshot();
    let response = match route {
        Route::SensorData => HttpResponse::json(sensor_json(&snapshot)),
        _ => HttpResponse::html(status_page(&snapshot)),
    };
    (route, response)
}

fn drive_indicator<A: Actuator>(actuator: &A, channel: IndicatorChannel, on: bool) {
    if let Err(err) = actuator.set_indicator(channel, on) {
        warn!("failed to drive {} indicator: {err}", channel.as_str());
    }
}

fn json_number(value: Option<f32>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => "null".to_string(),
    }
}

pub fn sensor_json(snapshot: &StateSnapshot) -> String {
    format!(
        "{{\"internal_temperature\": {}, \"dht_temperature\": {}, \"dht_humidity\": {}}}",
        json_number(Some(snapshot.internal_temperature)),
        json_number(snapshot.sensor.temperature()),
        json_number(snapshot.sensor.humidity()),
    )
}

fn reading_text(value: Option<f32>) -> String {
    match value {
        Some(value) if value.is_finite() => format!("{value:.2}"),
        _ => "no data".to_string(),
    }
}

const STYLE: &str = "body { background-color: #f0f4f8; font-family: Arial, sans-serif; text-align: center; margin-top: 50px; color: #333; }\n\
h1 { font-size: 48px; color: #444; }\n\
.section { margin-bottom: 30px; padding: 20px; background-color: #fff; border-radius: 15px; display: inline-block; width: 80%; max-width: 500px; }\n\
button { background-color: #007bff; color: #fff; font-size: 20px; margin: 10px; padding: 15px 30px; border: none; border-radius: 10px; }\n\
button.alarm { background-color: #dc3545; }\n\
button.active { background-color: #28a745; }\n\
.label { font-weight: bold; margin-right: 10px; }\n";

pub fn status_page(snapshot: &StateSnapshot) -> String {
    let mut html = String::with_capacity(2048);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<title>Monitoring Hub</title>\n<style>\n");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<h1>Monitoring Hub</h1>\n");

    let _ = write!(
        html,
        "<div class=\"section\">\n<h2>Board</h2>\n\
         <p><span class=\"label\">Internal temperature:</span><span id=\"internalTemp\">{}</span> &deg;C</p>\n\
         </div>\n",
        reading_text(Some(snapshot.internal_temperature)),
    );

    let _ = write!(
        html,
        "<div class=\"section\">\n<h2>Environment</h2>\n\
         <p><span class=\"label\">Temperature:</span><span id=\"dhtTemp\">{}</span> &deg;C</p>\n\
         <p><span class=\"label\">Humidity:</span><span id=\"dhtHum\">{}</span> %</p>\n\
         </div>\n",
        reading_text(snapshot.sensor.temperature()),
        reading_text(snapshot.sensor.humidity()),
    );

    let (alarm_label, alarm_class) = if snapshot.alarm_enabled {
        ("Deactivate alarm", "alarm active")
    } else {
        ("Activate alarm", "alarm")
    };
    let _ = write!(
        html,
        "<div class=\"section\">\n<h2>Alarm</h2>\n\
         <form action=\"/toggle_alarm\"><button id=\"alarmButton\" class=\"{alarm_class}\">{alarm_label}</button></form>\n\
         </div>\n",
    );

    html.push_str("<div class=\"section\">\n<h2>Lights</h2>\n");
    for channel in IndicatorChannel::ALL {
        let on = snapshot.leds[channel.index()];
        let _ = writeln!(
            html,
            "<form action=\"/toggle_{}\"><button{}>Turn {} {}</button></form>",
            channel.as_str(),
            if on { " class=\"active\"" } else { "" },
            if on { "off" } else { "on" },
            channel.label(),
        );
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

pub trait ResponseSink {
    fn send(&mut self, content_type: &'static str, body: &[u8]) -> Result<(), HttpError>;
}

pub fn respond<S: ResponseSink>(sink: &mut S, response: &HttpResponse) -> Result<(), HttpError> {
    sink.send(response.content_type, response.body.as_bytes())
        .inspect_err(|err| warn!("closing session: {err}"))
}

pub fn handle<S, A>(
    request: &RequestLine,
    state: &DeviceState,
    actuator: &A,
    sink: &mut S,
) -> Result<Route, HttpError>
where
    S: ResponseSink,
    A: Actuator,
{
    debug!("{} {}", request.method, request.path);
    let (route, response) = dispatch(request, state, actuator);
    respond(sink, &response)?;
    Ok(route)
}
