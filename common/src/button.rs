use core::{
    cell::RefCell,
    sync::atomic::{AtomicU32, Ordering},
};
use std::sync::Arc;

use critical_section::Mutex;
use heapless::Deque;

use crate::state::{ButtonId, DeviceState};

pub const EVENT_QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ModeAdvance,
    FirmwareResetRequest,
}

impl ButtonEvent {
    pub fn for_button(button: ButtonId) -> Self {
        match button {
            ButtonId::Mode => Self::ModeAdvance,
            ButtonId::Reset => Self::FirmwareResetRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    Accepted(ButtonEvent),
    Bounced,
    Dropped(ButtonEvent),
}

pub struct EventQueue {
    events: Mutex<RefCell<Deque<ButtonEvent, EVENT_QUEUE_CAPACITY>>>,
    dropped: AtomicU32,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            events: Mutex::new(RefCell::new(Deque::new())),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn push(&self, event: ButtonEvent) -> bool {
        let pushed = critical_section::with(|cs| {
            self.events.borrow_ref_mut(cs).push_back(event).is_ok()
        });
        if !pushed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        pushed
    }

    pub fn pop(&self) -> Option<ButtonEvent> {
        critical_section::with(|cs| self.events.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.events.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ButtonEventSource {
    state: Arc<DeviceState>,
    queue: Arc<EventQueue>,
    debounce_ms: u32,
}

impl ButtonEventSource {
    pub fn new(state: Arc<DeviceState>, queue: Arc<EventQueue>, debounce_ms: u32) -> Self {
        Self {
            state,
            queue,
            debounce_ms,
        }
    }

    // Runs in interrupt context; must not log or allocate.
    pub fn on_falling_edge(&self, button: ButtonId, now_ms: u32) -> EdgeOutcome {
        if let Some(last_ms) = self.state.last_button_event_ms(button) {
            if now_ms.wrapping_sub(last_ms) < self.debounce_ms {
                return EdgeOutcome::Bounced;
            }
        }

        self.state.set_last_button_event_ms(button, now_ms);
        let event = ButtonEvent::for_button(button);
        if self.queue.push(event) {
            EdgeOutcome::Accepted(event)
        } else {
            EdgeOutcome::Dropped(event)
        }
    }
}
