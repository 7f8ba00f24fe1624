use thiserror::Error;

use crate::{
    state::DeviceState,
    types::{IndicatorChannel, NetworkInfo},
};

#[derive(Debug, Error)]
pub enum PeripheralError {
    #[error("peripheral driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor did not respond")]
    Timeout,
    #[error("sensor frame failed checksum")]
    Checksum,
    #[error("sensor driver error: {0}")]
    Driver(String),
}

pub trait SensorDriver {
    fn read_once(&mut self) -> Result<(f32, f32), SensorError>;
}

pub trait InternalThermometer {
    fn read_celsius(&mut self) -> Result<f32, PeripheralError>;
}

pub trait Actuator: Send + Sync {
    fn set_indicator(&self, channel: IndicatorChannel, on: bool) -> Result<(), PeripheralError>;

    fn set_status_led(&self, on: bool) -> Result<(), PeripheralError>;

    // Blocks for `duration_ms` while the tone plays.
    fn play_tone(&self, frequency_hz: u32, duration_ms: u32) -> Result<(), PeripheralError>;
}

pub trait DisplayDriver {
    fn clear(&mut self) -> Result<(), PeripheralError>;
    fn fill(&mut self) -> Result<(), PeripheralError>;
    fn draw_text(&mut self, text: &str, x: i32, y: i32) -> Result<(), PeripheralError>;
    fn draw_circle(&mut self, x: i32, y: i32, diameter: u32) -> Result<(), PeripheralError>;
    fn present(&mut self) -> Result<(), PeripheralError>;
}

pub trait NetworkStatus {
    fn network_info(&self) -> Option<NetworkInfo>;

    fn poll<A: Actuator>(&mut self, _state: &DeviceState, _actuator: &A) {}
}

pub trait FirmwareReset {
    fn request_firmware_reset(&mut self);
}

impl<T: Actuator + ?Sized> Actuator for std::sync::Arc<T> {
    fn set_indicator(&self, channel: IndicatorChannel, on: bool) -> Result<(), PeripheralError> {
        (**self).set_indicator(channel, on)
    }

    fn set_status_led(&self, on: bool) -> Result<(), PeripheralError> {
        (**self).set_status_led(on)
    }

    fn play_tone(&self, frequency_hz: u32, duration_ms: u32) -> Result<(), PeripheralError> {
        (**self).play_tone(frequency_hz, duration_ms)
    }
}
