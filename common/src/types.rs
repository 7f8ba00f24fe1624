use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayMode {
    Sensor,
    Leds,
    Network,
}

impl DisplayMode {
    pub const COUNT: u8 = 3;

    pub fn index(self) -> u8 {
        match self {
            Self::Sensor => 0,
            Self::Leds => 1,
            Self::Network => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Sensor),
            1 => Some(Self::Leds),
            2 => Some(Self::Network),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Sensor => Self::Leds,
            Self::Leds => Self::Network,
            Self::Network => Self::Sensor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "SENSOR",
            Self::Leds => "LEDS",
            Self::Network => "NETWORK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorChannel {
    Red,
    Green,
    Blue,
}

impl IndicatorChannel {
    pub const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    pub fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Blue => "Blue",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SensorReading {
    temperature: f32,
    humidity: f32,
    valid: bool,
}

impl SensorReading {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
            valid: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            temperature: f32::NAN,
            humidity: f32::NAN,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn values(&self) -> Option<(f32, f32)> {
        self.valid.then_some((self.temperature, self.humidity))
    }

    pub fn temperature(&self) -> Option<f32> {
        self.values().map(|(temperature, _)| temperature)
    }

    pub fn humidity(&self) -> Option<f32> {
        self.values().map(|(_, humidity)| humidity)
    }
}

// Two unavailable readings are equal regardless of their placeholder numbers.
impl PartialEq for SensorReading {
    fn eq(&self, other: &Self) -> bool {
        self.values() == other.values()
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::unavailable()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub identifier: String,
    #[serde(rename = "signalQuality")]
    pub signal_quality: i8,
    pub channel: u8,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

impl Tone {
    pub const fn new(frequency_hz: u32, duration_ms: u32) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }
}
