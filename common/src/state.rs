use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::types::{DisplayMode, IndicatorChannel, SensorReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    Mode,
    Reset,
}

impl ButtonId {
    pub fn index(self) -> usize {
        match self {
            Self::Mode => 0,
            Self::Reset => 1,
        }
    }
}

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

#[derive(Debug)]
struct ButtonStamp {
    seen: AtomicBool,
    at_ms: AtomicU32,
}

impl ButtonStamp {
    fn new() -> Self {
        Self {
            seen: AtomicBool::new(false),
            at_ms: AtomicU32::new(0),
        }
    }
}

#[derive(Debug)]
pub struct DeviceState {
    alarm_enabled: AtomicBool,
    leds: [AtomicBool; 3],
    status_led: AtomicBool,
    sensor_temperature: AtomicF32,
    sensor_humidity: AtomicF32,
    sensor_valid: AtomicBool,
    sampling_failures: AtomicU32,
    internal_temperature: AtomicF32,
    temperature_limit: AtomicF32,
    display_mode: AtomicU8,
    buttons: [ButtonStamp; 2],
    firmware_reset_requested: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub alarm_enabled: bool,
    pub leds: [bool; 3],
    pub sensor: SensorReading,
    pub sampling_failures: u32,
    pub internal_temperature: f32,
    pub temperature_limit: f32,
    pub display_mode: DisplayMode,
}

impl DeviceState {
    pub fn new(temperature_limit: f32) -> Self {
        Self {
            alarm_enabled: AtomicBool::new(false),
            leds: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
            status_led: AtomicBool::new(false),
            sensor_temperature: AtomicF32::new(f32::NAN),
            sensor_humidity: AtomicF32::new(f32::NAN),
            sensor_valid: AtomicBool::new(false),
            sampling_failures: AtomicU32::new(0),
            internal_temperature: AtomicF32::new(0.0),
            temperature_limit: AtomicF32::new(temperature_limit),
            display_mode: AtomicU8::new(DisplayMode::Sensor.index()),
            buttons: [ButtonStamp::new(), ButtonStamp::new()],
            firmware_reset_requested: AtomicBool::new(false),
        }
    }

    pub fn alarm_enabled(&self) -> bool {
        self.alarm_enabled.load(Ordering::Acquire)
    }

    pub fn set_alarm_enabled(&self, enabled: bool) {
        self.alarm_enabled.store(enabled, Ordering::Release);
    }

    pub fn toggle_alarm(&self) -> bool {
        !self.alarm_enabled.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn led(&self, channel: IndicatorChannel) -> bool {
        self.leds[channel.index()].load(Ordering::Acquire)
    }

    pub fn set_led(&self, channel: IndicatorChannel, on: bool) {
        self.leds[channel.index()].store(on, Ordering::Release);
    }

    pub fn toggle_led(&self, channel: IndicatorChannel) -> bool {
        !self.leds[channel.index()].fetch_xor(true, Ordering::AcqRel)
    }

    pub fn leds(&self) -> [bool; 3] {
        IndicatorChannel::ALL.map(|channel| self.led(channel))
    }

    // The validity flag is written last and read first so a reader that sees
    // `valid` also sees numbers from the same or a later write.
    pub fn status_led(&self) -> bool {
        self.status_led.load(Ordering::Acquire)
    }

    pub fn set_status_led(&self, on: bool) {
        self.status_led.store(on, Ordering::Release);
    }

    pub fn sensor_reading(&self) -> SensorReading {
        if !self.sensor_valid.load(Ordering::Acquire) {
            return SensorReading::unavailable();
        }
        SensorReading::new(self.sensor_temperature.load(), self.sensor_humidity.load())
    }

    pub fn set_sensor_reading(&self, reading: SensorReading) {
        match reading.values() {
            Some((temperature, humidity)) => {
                self.sensor_temperature.store(temperature);
                self.sensor_humidity.store(humidity);
                self.sensor_valid.store(true, Ordering::Release);
            }
            None => self.sensor_valid.store(false, Ordering::Release),
        }
    }

    pub fn sampling_failures(&self) -> u32 {
        self.sampling_failures.load(Ordering::Acquire)
    }

    pub fn set_sampling_failures(&self, failures: u32) {
        self.sampling_failures.store(failures, Ordering::Release);
    }

    pub fn internal_temperature(&self) -> f32 {
        self.internal_temperature.load()
    }

    pub fn set_internal_temperature(&self, celsius: f32) {
        self.internal_temperature.store(celsius);
    }

    pub fn temperature_limit(&self) -> f32 {
        self.temperature_limit.load()
    }

    pub fn display_mode(&self) -> DisplayMode {
        DisplayMode::from_index(self.display_mode.load(Ordering::Acquire))
            .unwrap_or(DisplayMode::Sensor)
    }

    pub fn set_display_mode(&self, mode: DisplayMode) {
        self.display_mode.store(mode.index(), Ordering::Release);
    }

    pub fn set_display_mode_index(&self, index: u8) -> bool {
        match DisplayMode::from_index(index) {
            Some(mode) => {
                self.set_display_mode(mode);
                true
            }
            None => false,
        }
    }

    pub fn advance_display_mode(&self) -> DisplayMode {
        let previous = self
            .display_mode
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| {
                Some((index + 1) % DisplayMode::COUNT)
            })
            .unwrap_or(DisplayMode::Sensor.index());
        DisplayMode::from_index(previous)
            .unwrap_or(DisplayMode::Sensor)
            .next()
    }

    pub fn last_button_event_ms(&self, button: ButtonId) -> Option<u32> {
        let stamp = &self.buttons[button.index()];
        stamp
            .seen
            .load(Ordering::Acquire)
            .then(|| stamp.at_ms.load(Ordering::Acquire))
    }

    pub fn set_last_button_event_ms(&self, button: ButtonId, now_ms: u32) {
        let stamp = &self.buttons[button.index()];
        stamp.at_ms.store(now_ms, Ordering::Release);
        stamp.seen.store(true, Ordering::Release);
    }

    pub fn firmware_reset_requested(&self) -> bool {
        self.firmware_reset_requested.load(Ordering::Acquire)
    }

    pub fn set_firmware_reset_requested(&self) {
        self.firmware_reset_requested.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            alarm_enabled: self.alarm_enabled(),
            leds: self.leds(),
            sensor: self.sensor_reading(),
            sampling_failures: self.sampling_failures(),
            internal_temperature: self.internal_temperature(),
            temperature_limit: self.temperature_limit(),
            display_mode: self.display_mode(),
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(crate::config::AlarmConfig::default().temperature_limit_c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_documented_defaults() {
        let state = DeviceState::default();
        let snapshot = state.snapshot();

        assert!(!snapshot.alarm_enabled);
        assert_eq!(snapshot.leds, [false; 3]);
        assert!(!snapshot.sensor.is_valid());
        assert_eq!(snapshot.display_mode, DisplayMode::Sensor);
        assert_eq!(snapshot.temperature_limit, 25.0);
        assert_eq!(state.last_button_event_ms(ButtonId::Mode), None);
        assert!(!state.firmware_reset_requested());
    }

    #[test]
    fn led_parity_follows_toggle_count() {
        let state = DeviceState::default();
        for toggles in 1..=7u32 {
            let now_on = state.toggle_led(IndicatorChannel::Green);
            assert_eq!(now_on, toggles % 2 == 1);
        }
        assert!(state.led(IndicatorChannel::Green));
        assert!(!state.led(IndicatorChannel::Red));
        assert!(!state.led(IndicatorChannel::Blue));
    }

    #[test]
    fn toggle_alarm_returns_new_value() {
        let state = DeviceState::default();
        assert!(state.toggle_alarm());
        assert!(state.alarm_enabled());
        assert!(!state.toggle_alarm());
    }

    #[test]
    fn invalid_reading_clears_validity_only() {
        let state = DeviceState::default();
        state.set_sensor_reading(SensorReading::new(24.5, 50.0));
        assert_eq!(state.sensor_reading().values(), Some((24.5, 50.0)));

        state.set_sensor_reading(SensorReading::unavailable());
        assert_eq!(state.sensor_reading(), SensorReading::unavailable());
    }

    #[test]
    fn display_mode_index_out_of_range_is_rejected() {
        let state = DeviceState::default();
        state.set_display_mode(DisplayMode::Network);

        assert!(!state.set_display_mode_index(3));
        assert_eq!(state.display_mode(), DisplayMode::Network);

        assert!(state.set_display_mode_index(1));
        assert_eq!(state.display_mode(), DisplayMode::Leds);
    }

    #[test]
    fn advance_wraps_modulo_three() {
        let state = DeviceState::default();
        assert_eq!(state.advance_display_mode(), DisplayMode::Leds);
        assert_eq!(state.advance_display_mode(), DisplayMode::Network);
        assert_eq!(state.advance_display_mode(), DisplayMode::Sensor);
        assert_eq!(state.display_mode(), DisplayMode::Sensor);
    }

    #[test]
    fn button_stamps_are_independent() {
        let state = DeviceState::default();
        state.set_last_button_event_ms(ButtonId::Reset, 1_234);

        assert_eq!(state.last_button_event_ms(ButtonId::Reset), Some(1_234));
        assert_eq!(state.last_button_event_ms(ButtonId::Mode), None);
    }
}
