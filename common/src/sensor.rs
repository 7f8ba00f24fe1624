use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::{
    config::SamplingConfig,
    peripherals::SensorDriver,
    state::DeviceState,
    types::SensorReading,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    pub reading: SensorReading,
    pub successes: u32,
    pub failures: u32,
}

pub fn acquire<S, D>(sensor: &mut S, delay: &mut D, config: &SamplingConfig) -> Acquisition
where
    S: SensorDriver,
    D: DelayNs,
{
    let mut temperature_sum = 0.0_f32;
    let mut humidity_sum = 0.0_f32;
    let mut successes = 0_u32;
    let mut failures = 0_u32;

    for _ in 0..config.attempts {
        match sensor.read_once() {
            Ok((temperature, humidity)) => {
                temperature_sum += temperature;
                humidity_sum += humidity;
                successes += 1;
            }
            Err(err) => {
                debug!("sensor read failed: {err}");
                failures += 1;
                delay.delay_ms(config.backoff_ms);
            }
        }
    }

    let reading = if successes > 0 {
        SensorReading::new(
            temperature_sum / successes as f32,
            humidity_sum / successes as f32,
        )
    } else {
        SensorReading::unavailable()
    };

    Acquisition {
        reading,
        successes,
        failures,
    }
}

pub fn record(state: &DeviceState, acquisition: &Acquisition, config: &SamplingConfig) {
    if acquisition.reading.is_valid() {
        state.set_sensor_reading(acquisition.reading);
        state.set_sampling_failures(0);
        return;
    }

    let failures = state.sampling_failures().saturating_add(1);
    state.set_sampling_failures(failures);
    warn!(
        "sensor sampling failed ({} attempts, {} consecutive failed cycles)",
        acquisition.failures, failures
    );

    if config.stale_after_failures > 0 && failures >= config.stale_after_failures {
        if state.sensor_reading().is_valid() {
            warn!("dropping stale sensor reading after {failures} failed cycles");
        }
        state.set_sensor_reading(SensorReading::unavailable());
    }
}

pub fn adc_to_celsius(raw: u16) -> f32 {
    const CONVERSION_FACTOR: f32 = 3.3 / 4096.0;
    let voltage = raw as f32 * CONVERSION_FACTOR;
    27.0 - (voltage - 0.706) / 0.001_721
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{peripherals::SensorError, test_support::*};

    fn sampling(attempts: u32) -> SamplingConfig {
        SamplingConfig {
            attempts,
            ..SamplingConfig::default()
        }
    }

    #[test]
    fn averages_only_successful_reads() {
        let mut sensor = ScriptedSensor::new(vec![
            Ok((20.0, 40.0)),
            Err(SensorError::Checksum),
            Ok((22.0, 50.0)),
            Err(SensorError::Timeout),
            Ok((24.0, 60.0)),
        ]);
        let mut delay = RecordingDelay::default();

        let result = acquire(&mut sensor, &mut delay, &sampling(5));

        assert_eq!(result.successes, 3);
        assert_eq!(result.failures, 2);
        assert_eq!(result.reading.values(), Some((22.0, 50.0)));
        assert_eq!(delay.total_ms, 2 * 50);
    }

    #[test]
    fn failures_do_not_stop_the_cycle() {
        let mut script = vec![Err(SensorError::Timeout); 49];
        script.push(Ok((26.5, 44.0)));
        let mut sensor = ScriptedSensor::new(script);
        let mut delay = RecordingDelay::default();

        let result = acquire(&mut sensor, &mut delay, &SamplingConfig::default());

        assert_eq!(sensor.reads, 50);
        assert_eq!(result.successes, 1);
        assert_eq!(result.reading.values(), Some((26.5, 44.0)));
    }

    #[test]
    fn total_failure_yields_sentinel() {
        let mut sensor = ScriptedSensor::new(Vec::new());
        let mut delay = RecordingDelay::default();

        let result = acquire(&mut sensor, &mut delay, &sampling(4));

        assert_eq!(result.successes, 0);
        assert_eq!(result.failures, 4);
        assert!(!result.reading.is_valid());
        assert_eq!(result.reading.values(), None);
    }

    #[test]
    fn failed_cycle_keeps_previous_reading_until_stale() {
        let state = DeviceState::default();
        let config = SamplingConfig {
            stale_after_failures: 3,
            ..SamplingConfig::default()
        };
        let good = Acquisition {
            reading: SensorReading::new(23.0, 45.0),
            successes: 50,
            failures: 0,
        };
        let failed = Acquisition {
            reading: SensorReading::unavailable(),
            successes: 0,
            failures: 50,
        };

        record(&state, &good, &config);
        record(&state, &failed, &config);
        record(&state, &failed, &config);
        assert_eq!(state.sensor_reading().values(), Some((23.0, 45.0)));
        assert_eq!(state.sampling_failures(), 2);

        record(&state, &failed, &config);
        assert!(!state.sensor_reading().is_valid());

        record(&state, &good, &config);
        assert_eq!(state.sampling_failures(), 0);
        assert!(state.sensor_reading().is_valid());
    }

    #[test]
    fn zero_stale_limit_never_drops_reading() {
        let state = DeviceState::default();
        let config = SamplingConfig {
            stale_after_failures: 0,
            ..SamplingConfig::default()
        };
        state.set_sensor_reading(SensorReading::new(21.0, 30.0));
        let failed = Acquisition {
            reading: SensorReading::unavailable(),
            successes: 0,
            failures: 50,
        };

        for _ in 0..100 {
            record(&state, &failed, &config);
        }

        assert_eq!(state.sensor_reading().values(), Some((21.0, 30.0)));
    }

    #[test]
    fn adc_conversion_matches_reference_points() {
        // 0.706 V is the 27 °C calibration point.
        let raw = (0.706 / (3.3 / 4096.0)) as u16;
        assert!((adc_to_celsius(raw) - 27.0).abs() < 1.0);
        assert!(adc_to_celsius(800) > adc_to_celsius(900));
    }
}
