use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::{
    button::{ButtonEvent, EventQueue},
    config::HubConfig,
    display::{decide, Panel, View},
    peripherals::{
        Actuator, DisplayDriver, FirmwareReset, InternalThermometer, NetworkStatus, SensorDriver,
    },
    sensor::{self, Acquisition},
    state::DeviceState,
};

pub struct Peripherals<S, T, D, N, R> {
    pub sensor: S,
    pub thermometer: T,
    pub display: D,
    pub network: N,
    pub reset: R,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub events: usize,
    pub acquisition: Acquisition,
    pub view: View,
}

pub struct Hub<S, T, D, N, R, A> {
    config: HubConfig,
    state: Arc<DeviceState>,
    events: Arc<EventQueue>,
    actuator: A,
    sensor: S,
    thermometer: T,
    panel: Panel<D>,
    network: N,
    reset: R,
}

impl<S, T, D, N, R, A> Hub<S, T, D, N, R, A>
where
    S: SensorDriver,
    T: InternalThermometer,
    D: DisplayDriver,
    N: NetworkStatus,
    R: FirmwareReset,
    A: Actuator,
{
    pub fn new(
        config: HubConfig,
        state: Arc<DeviceState>,
        events: Arc<EventQueue>,
        actuator: A,
        peripherals: Peripherals<S, T, D, N, R>,
    ) -> Self {
        let panel = Panel::new(peripherals.display, config.alarm.clone());
        Self {
            config,
            state,
            events,
            actuator,
            sensor: peripherals.sensor,
            thermometer: peripherals.thermometer,
            panel,
            network: peripherals.network,
            reset: peripherals.reset,
        }
    }

    pub fn tick<Dl: DelayNs>(&mut self, delay: &mut Dl) -> TickReport {
        let events = self.drain_events();

        self.network.poll(&self.state, &self.actuator);

        let acquisition = sensor::acquire(&mut self.sensor, delay, &self.config.sampling);
        sensor::record(&self.state, &acquisition, &self.config.sampling);

        match self.thermometer.read_celsius() {
            Ok(celsius) => self.state.set_internal_temperature(celsius),
            Err(err) => warn!("internal temperature read failed: {err}"),
        }

        let view = decide(&self.state.snapshot());
        if let Err(err) = self
            .panel
            .render(&view, &self.actuator, &self.network, delay)
        {
            warn!("{} view render failed: {err}", view.name());
        }

        TickReport {
            events,
            acquisition,
            view,
        }
    }

    fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.pop() {
            handled += 1;
            match event {
                ButtonEvent::ModeAdvance => {
                    let mode = self.state.advance_display_mode();
                    info!("display mode -> {}", mode.as_str());
                }
                ButtonEvent::FirmwareResetRequest => {
                    if self.state.firmware_reset_requested() {
                        continue;
                    }
                    self.state.set_firmware_reset_requested();
                    warn!("firmware reset requested from button");
                    self.reset.request_firmware_reset();
                }
            }
        }

        let dropped = self.events.take_dropped();
        if dropped > 0 {
            warn!("button event queue overflowed, {dropped} events dropped");
        }
        handled
    }
}
