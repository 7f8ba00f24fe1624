use serde::{Deserialize, Serialize};

use crate::types::Tone;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub attempts: u32,
    pub backoff_ms: u32,
    // Consecutive failed cycles after which the stored reading is dropped; 0 keeps it.
    pub stale_after_failures: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            attempts: 50,
            backoff_ms: 50,
            stale_after_failures: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub debounce_ms: u32,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub temperature_limit_c: f32,
    pub overheat_high: Tone,
    pub overheat_low: Tone,
    pub alarm: Tone,
    pub flash_ms: u32,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            temperature_limit_c: 25.0,
            overheat_high: Tone::new(2_000, 150),
            overheat_low: Tone::new(1_000, 150),
            alarm: Tone::new(1_500, 100),
            flash_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub sampling: SamplingConfig,
    pub buttons: ButtonConfig,
    pub alarm: AlarmConfig,
    pub tick_ms: u64,
    pub http_port: u16,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            buttons: ButtonConfig::default(),
            alarm: AlarmConfig::default(),
            tick_ms: 200,
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardPins {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub button_mode: i32,
    pub button_reset: i32,
    pub buzzer: i32,
    pub dht: i32,
    pub i2c_sda: i32,
    pub i2c_scl: i32,
    pub status_led: Option<i32>,
}

impl Default for BoardPins {
    fn default() -> Self {
        Self {
            red: 13,
            green: 11,
            blue: 12,
            button_mode: 5,
            button_reset: 6,
            buzzer: 21,
            dht: 16,
            i2c_sda: 14,
            i2c_scl: 15,
            status_led: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub hub: HubConfig,
    pub network: NetworkConfig,
    pub pins: BoardPins,
}

impl SamplingConfig {
    pub fn sanitize(&mut self) {
        self.attempts = self.attempts.clamp(1, 50);
        self.backoff_ms = self.backoff_ms.min(1_000);
    }
}

impl AlarmConfig {
    pub fn sanitize(&mut self) {
        if !self.temperature_limit_c.is_finite() {
            self.temperature_limit_c = 25.0;
        }
        self.temperature_limit_c = self.temperature_limit_c.clamp(-40.0, 125.0);
        for tone in [
            &mut self.overheat_high,
            &mut self.overheat_low,
            &mut self.alarm,
        ] {
            tone.frequency_hz = tone.frequency_hz.clamp(100, 10_000);
            tone.duration_ms = tone.duration_ms.min(2_000);
        }
        self.flash_ms = self.flash_ms.min(1_000);
    }
}

impl HubConfig {
    pub fn sanitize(&mut self) {
        self.sampling.sanitize();
        self.alarm.sanitize();
        self.buttons.debounce_ms = self.buttons.debounce_ms.clamp(10, 2_000);
        self.tick_ms = self.tick_ms.clamp(50, 1_000);
        if self.http_port == 0 {
            self.http_port = 80;
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.hub.sanitize();
    }
}
