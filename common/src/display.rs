use embedded_hal::delay::DelayNs;

use crate::{
    config::AlarmConfig,
    peripherals::{Actuator, DisplayDriver, NetworkStatus, PeripheralError},
    state::StateSnapshot,
    types::{DisplayMode, IndicatorChannel, SensorReading},
};

const LINE_HEIGHT: i32 = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View {
    Overheat { temperature: f32, limit: f32 },
    AlarmActive,
    Sensor(SensorReading),
    Leds([bool; 3]),
    Network,
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Overheat { .. } => "overheat",
            Self::AlarmActive => "alarm",
            Self::Sensor(_) => "sensor",
            Self::Leds(_) => "leds",
            Self::Network => "network",
        }
    }
}

pub fn decide(snapshot: &StateSnapshot) -> View {
    if let Some(temperature) = snapshot.sensor.temperature() {
        if temperature > snapshot.temperature_limit {
            return View::Overheat {
                temperature,
                limit: snapshot.temperature_limit,
            };
        }
    }

    if snapshot.alarm_enabled {
        return View::AlarmActive;
    }

    match snapshot.display_mode {
        DisplayMode::Sensor => View::Sensor(snapshot.sensor),
        DisplayMode::Leds => View::Leds(snapshot.leds),
        DisplayMode::Network => View::Network,
    }
}

pub struct Panel<D> {
    display: D,
    alarm: AlarmConfig,
}

impl<D: DisplayDriver> Panel<D> {
    pub fn new(display: D, alarm: AlarmConfig) -> Self {
        Self {
            display,
            alarm,
        }
    }

    #[cfg(test)]
    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn render<A, N, Dl>(
        &mut self,
        view: &View,
        actuator: &A,
        network: &N,
        delay: &mut Dl,
    ) -> Result<(), PeripheralError>
    where
        A: Actuator,
        N: NetworkStatus,
        Dl: DelayNs,
    {
        match view {
            View::Overheat { temperature, limit } => {
                let drawn = self.draw_overheat(*temperature, *limit);
                let high = self.alarm.overheat_high;
                let low = self.alarm.overheat_low;
                let high_played = actuator.play_tone(high.frequency_hz, high.duration_ms);
                let low_played = actuator.play_tone(low.frequency_hz, low.duration_ms);
                return drawn.and(high_played).and(low_played);
            }
            View::AlarmActive => {
                let tone = self.alarm.alarm;
                let sounded = actuator.play_tone(tone.frequency_hz, tone.duration_ms);
                let flashed = self.flash(delay);
                return sounded.and(flashed);
            }
            View::Sensor(reading) => {
                self.display.clear()?;
                self.display.draw_text("Environment", 0, 0)?;
                match reading.values() {
                    Some((temperature, humidity)) => {
                        self.display.draw_text(
                            &format!("Temp: {temperature:.1} C"),
                            0,
                            LINE_HEIGHT * 2,
                        )?;
                        self.display.draw_text(
                            &format!("Hum:  {humidity:.1} %"),
                            0,
                            LINE_HEIGHT * 3,
                        )?;
                    }
                    None => {
                        self.display.draw_text("No data", 0, LINE_HEIGHT * 2)?;
                    }
                }
                self.display.present()?;
            }
            View::Leds(leds) => {
                self.display.clear()?;
                self.display.draw_text("LEDs", 0, 0)?;
                for (row, channel) in IndicatorChannel::ALL.iter().enumerate() {
                    let status = if leds[channel.index()] { "ON" } else { "OFF" };
                    self.display.draw_text(
                        &format!("{}: {status}", channel.label()),
                        0,
                        LINE_HEIGHT * (row as i32 + 2),
                    )?;
                }
                self.display.present()?;
            }
            View::Network => {
                self.display.clear()?;
                self.display.draw_text("Network", 0, 0)?;
                match network.network_info() {
                    Some(info) => {
                        let lines = [
                            format!("SSID: {}", info.identifier),
                            format!("RSSI: {} dBm", info.signal_quality),
                            format!("Ch:   {}", info.channel),
                            format!("IP:   {}", info.address),
                        ];
                        for (row, line) in lines.iter().enumerate() {
                            self.display
                                .draw_text(line, 0, LINE_HEIGHT * (row as i32 + 1))?;
                        }
                    }
                    None => {
                        self.display.draw_text("Offline", 0, LINE_HEIGHT * 2)?;
                    }
                }
                self.display.present()?;
            }
        }

        Ok(())
    }

    fn draw_overheat(&mut self, temperature: f32, limit: f32) -> Result<(), PeripheralError> {
        self.display.clear()?;
        self.display.draw_text("OVERHEAT!", 0, 0)?;
        self.display
            .draw_text(&format!("Temp: {temperature:.1} C"), 0, LINE_HEIGHT * 2)?;
        self.display
            .draw_text(&format!("Limit: {limit:.1} C"), 0, LINE_HEIGHT * 3)?;
        self.display.draw_circle(100, 20, 24)?;
        self.display.present()
    }

    fn flash<Dl: DelayNs>(&mut self, delay: &mut Dl) -> Result<(), PeripheralError> {
        self.display.fill()?;
        self.display.present()?;
        delay.delay_ms(self.alarm.flash_ms);
        self.display.clear()?;
        self.display.present()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{state::DeviceState, test_support::*};

    fn snapshot() -> StateSnapshot {
        DeviceState::default().snapshot()
    }

    #[test]
    fn overheat_beats_alarm_and_mode() {
        let mut snap = snapshot();
        snap.sensor = SensorReading::new(26.5, 40.0);
        snap.alarm_enabled = true;

        for mode in [DisplayMode::Sensor, DisplayMode::Leds, DisplayMode::Network] {
            snap.display_mode = mode;
            assert_eq!(
                decide(&snap),
                View::Overheat {
                    temperature: 26.5,
                    limit: 25.0
                }
            );
        }
    }

    #[test]
    fn overheat_triggers_without_alarm() {
        let mut snap = snapshot();
        snap.sensor = SensorReading::new(26.5, 40.0);
        snap.display_mode = DisplayMode::Leds;

        assert!(matches!(decide(&snap), View::Overheat { .. }));
    }

    #[test]
    fn reading_at_limit_is_not_overheat() {
        let mut snap = snapshot();
        snap.sensor = SensorReading::new(25.0, 40.0);

        assert_eq!(decide(&snap), View::Sensor(SensorReading::new(25.0, 40.0)));
    }

    #[test]
    fn invalid_reading_never_overheats() {
        let mut snap = snapshot();
        snap.sensor = SensorReading::unavailable();
        snap.temperature_limit = -100.0;
        snap.alarm_enabled = true;

        assert_eq!(decide(&snap), View::AlarmActive);
    }

    #[test]
    fn display_mode_selects_normal_view() {
        let mut snap = snapshot();
        snap.leds = [true, false, true];

        snap.display_mode = DisplayMode::Leds;
        assert_eq!(decide(&snap), View::Leds([true, false, true]));

        snap.display_mode = DisplayMode::Network;
        assert_eq!(decide(&snap), View::Network);
    }

    #[test]
    fn overheat_plays_high_then_low_tone() {
        let mut panel = Panel::new(RecordingDisplay::default(), AlarmConfig::default());
        let actuator = RecordingActuator::default();

        panel
            .render(
                &View::Overheat {
                    temperature: 26.5,
                    limit: 25.0,
                },
                &actuator,
                &FixedNetwork(None),
                &mut RecordingDelay::default(),
            )
            .unwrap();

        assert_eq!(
            actuator.calls(),
            vec![ActuatorCall::Tone(2_000, 150), ActuatorCall::Tone(1_000, 150)]
        );
        assert!(panel.display().texts().contains(&"OVERHEAT!".to_string()));
    }

    #[test]
    fn alarm_flashes_once_and_beeps_once() {
        let mut panel = Panel::new(RecordingDisplay::default(), AlarmConfig::default());
        let actuator = RecordingActuator::default();
        let mut delay = RecordingDelay::default();

        panel
            .render(
                &View::AlarmActive,
                &actuator,
                &FixedNetwork(None),
                &mut delay,
            )
            .unwrap();

        assert_eq!(actuator.calls(), vec![ActuatorCall::Tone(1_500, 100)]);
        assert_eq!(
            panel.display().calls,
            vec![
                DisplayCall::Fill,
                DisplayCall::Present,
                DisplayCall::Clear,
                DisplayCall::Present
            ]
        );
        assert_eq!(delay.total_ms, 100);
    }

    #[test]
    fn sensor_view_shows_no_data_for_invalid_reading() {
        let mut panel = Panel::new(RecordingDisplay::default(), AlarmConfig::default());

        panel
            .render(
                &View::Sensor(SensorReading::unavailable()),
                &RecordingActuator::default(),
                &FixedNetwork(None),
                &mut RecordingDelay::default(),
            )
            .unwrap();

        assert_eq!(
            panel.display().texts(),
            vec!["Environment".to_string(), "No data".to_string()]
        );
    }

    #[test]
    fn network_view_lists_link_details() {
        let mut panel = Panel::new(RecordingDisplay::default(), AlarmConfig::default());
        let network = FixedNetwork(Some(network_info()));

        panel
            .render(
                &View::Network,
                &RecordingActuator::default(),
                &network,
                &mut RecordingDelay::default(),
            )
            .unwrap();

        assert_eq!(
            panel.display().texts(),
            vec![
                "Network".to_string(),
                "SSID: home".to_string(),
                "RSSI: -61 dBm".to_string(),
                "Ch:   6".to_string(),
                "IP:   192.168.1.40".to_string(),
            ]
        );
    }

    #[test]
    fn leds_view_reports_each_channel() {
        let mut panel = Panel::new(RecordingDisplay::default(), AlarmConfig::default());

        panel
            .render(
                &View::Leds([true, false, false]),
                &RecordingActuator::default(),
                &FixedNetwork(None),
                &mut RecordingDelay::default(),
            )
            .unwrap();

        assert_eq!(
            panel.display().texts(),
            vec![
                "LEDs".to_string(),
                "Red: ON".to_string(),
                "Green: OFF".to_string(),
                "Blue: OFF".to_string(),
            ]
        );
    }

    #[test]
    fn overheat_tones_survive_a_failing_display() {
        let mut panel = Panel::new(BrokenDisplay, AlarmConfig::default());
        let actuator = RecordingActuator::default();

        let result = panel.render(
            &View::Overheat {
                temperature: 26.5,
                limit: 25.0,
            },
            &actuator,
            &FixedNetwork(None),
            &mut RecordingDelay::default(),
        );

        assert!(result.is_err());
        assert_eq!(
            actuator.calls(),
            vec![ActuatorCall::Tone(2_000, 150), ActuatorCall::Tone(1_000, 150)]
        );
    }

    #[test]
    fn alarm_flash_runs_when_buzzer_fails() {
        let mut panel = Panel::new(RecordingDisplay::default(), AlarmConfig::default());
        let mut delay = RecordingDelay::default();

        let result = panel.render(
            &View::AlarmActive,
            &MutedActuator,
            &FixedNetwork(None),
            &mut delay,
        );

        assert!(result.is_err());
        assert_eq!(
            panel.display().calls,
            vec![
                DisplayCall::Fill,
                DisplayCall::Present,
                DisplayCall::Clear,
                DisplayCall::Present
            ]
        );
        assert_eq!(delay.total_ms, 100);
    }
}
