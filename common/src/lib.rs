pub mod button;
pub mod config;
pub mod display;
pub mod http;
pub mod hub;
pub mod peripherals;
pub mod sensor;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

pub use button::{ButtonEvent, ButtonEventSource, EdgeOutcome, EventQueue};
pub use config::{
    AlarmConfig, BoardPins, ButtonConfig, HubConfig, NetworkConfig, RuntimeConfig, SamplingConfig,
};
pub use display::{decide, Panel, View};
pub use http::{dispatch, handle, HttpError, HttpResponse, RequestLine, ResponseSink, Route};
pub use hub::{Hub, Peripherals, TickReport};
pub use peripherals::{
    Actuator, DisplayDriver, FirmwareReset, InternalThermometer, NetworkStatus, PeripheralError,
    SensorDriver, SensorError,
};
pub use state::{ButtonId, DeviceState, StateSnapshot};
pub use types::{DisplayMode, IndicatorChannel, NetworkInfo, SensorReading, Tone};
