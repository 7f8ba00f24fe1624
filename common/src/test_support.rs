use std::{collections::VecDeque, sync::Mutex};

use embedded_hal::delay::DelayNs;

use crate::{
    peripherals::{
        Actuator, DisplayDriver, FirmwareReset, InternalThermometer, NetworkStatus,
        PeripheralError, SensorDriver, SensorError,
    },
    types::{IndicatorChannel, NetworkInfo},
};

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayCall {
    Clear,
    Fill,
    Text(String),
    Circle,
    Present,
}

#[derive(Default)]
pub struct RecordingDisplay {
    pub calls: Vec<DisplayCall>,
}

impl RecordingDisplay {
    pub fn texts(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DisplayCall::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DisplayDriver for RecordingDisplay {
    fn clear(&mut self) -> Result<(), PeripheralError> {
        self.calls.push(DisplayCall::Clear);
        Ok(())
    }

    fn fill(&mut self) -> Result<(), PeripheralError> {
        self.calls.push(DisplayCall::Fill);
        Ok(())
    }

    fn draw_text(&mut self, text: &str, _x: i32, _y: i32) -> Result<(), PeripheralError> {
        self.calls.push(DisplayCall::Text(text.to_string()));
        Ok(())
    }

    fn draw_circle(&mut self, _x: i32, _y: i32, _diameter: u32) -> Result<(), PeripheralError> {
        self.calls.push(DisplayCall::Circle);
        Ok(())
    }

    fn present(&mut self) -> Result<(), PeripheralError> {
        self.calls.push(DisplayCall::Present);
        Ok(())
    }
}

pub struct BrokenDisplay;

impl DisplayDriver for BrokenDisplay {
    fn clear(&mut self) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("i2c nack".into()))
    }

    fn fill(&mut self) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("i2c nack".into()))
    }

    fn draw_text(&mut self, _text: &str, _x: i32, _y: i32) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("i2c nack".into()))
    }

    fn draw_circle(&mut self, _x: i32, _y: i32, _diameter: u32) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("i2c nack".into()))
    }

    fn present(&mut self) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("i2c nack".into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Indicator(IndicatorChannel, bool),
    StatusLed(bool),
    Tone(u32, u32),
}

#[derive(Default)]
pub struct RecordingActuator {
    pub calls: Mutex<Vec<ActuatorCall>>,
}

impl RecordingActuator {
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Actuator for RecordingActuator {
    fn set_indicator(
        &self,
        channel: IndicatorChannel,
        on: bool,
    ) -> Result<(), PeripheralError> {
        self.calls
            .lock()
            .unwrap()
            .push(ActuatorCall::Indicator(channel, on));
        Ok(())
    }

    fn set_status_led(&self, on: bool) -> Result<(), PeripheralError> {
        self.calls.lock().unwrap().push(ActuatorCall::StatusLed(on));
        Ok(())
    }

    fn play_tone(&self, frequency_hz: u32, duration_ms: u32) -> Result<(), PeripheralError> {
        self.calls
            .lock()
            .unwrap()
            .push(ActuatorCall::Tone(frequency_hz, duration_ms));
        Ok(())
    }
}

pub struct MutedActuator;

impl Actuator for MutedActuator {
    fn set_indicator(&self, _channel: IndicatorChannel, _on: bool) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("gpio busy".into()))
    }

    fn set_status_led(&self, _on: bool) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("gpio busy".into()))
    }

    fn play_tone(&self, _frequency_hz: u32, _duration_ms: u32) -> Result<(), PeripheralError> {
        Err(PeripheralError::Driver("ledc busy".into()))
    }
}

pub struct FixedNetwork(pub Option<NetworkInfo>);

impl NetworkStatus for FixedNetwork {
    fn network_info(&self) -> Option<NetworkInfo> {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct RecordingDelay {
    pub total_ms: u64,
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ms += ns as u64 / 1_000_000;
    }
}

pub struct ScriptedSensor {
    script: VecDeque<Result<(f32, f32), SensorError>>,
    pub reads: u32,
}

impl ScriptedSensor {
    pub fn new(script: Vec<Result<(f32, f32), SensorError>>) -> Self {
        Self {
            script: script.into(),
            reads: 0,
        }
    }

    pub fn steady(temperature: f32, humidity: f32, reads: usize) -> Self {
        Self::new(vec![Ok((temperature, humidity)); reads])
    }
}

impl SensorDriver for ScriptedSensor {
    fn read_once(&mut self) -> Result<(f32, f32), SensorError> {
        self.reads += 1;
        self.script.pop_front().unwrap_or(Err(SensorError::Timeout))
    }
}

pub struct FixedThermometer(pub Result<f32, String>);

impl InternalThermometer for FixedThermometer {
    fn read_celsius(&mut self) -> Result<f32, PeripheralError> {
        self.0.clone().map_err(PeripheralError::Driver)
    }
}

#[derive(Default)]
pub struct CountingReset {
    pub requests: u32,
}

impl FirmwareReset for CountingReset {
    fn request_firmware_reset(&mut self) {
        self.requests += 1;
    }
}

pub fn network_info() -> NetworkInfo {
    NetworkInfo {
        identifier: "home".to_string(),
        signal_quality: -61,
        channel: 6,
        address: "192.168.1.40".to_string(),
    }
}
