//! Event handling.
//!
//! This library exposes an event-based interface for reacting
//! to the state changes of the emulator in real-time. [EventListeners](EventListener)
//! can be registered on the [Emulator](crate::emulator::Emulator) with the
//! [add_listener](crate::emulator::Emulator::add_listener) method.
//!
//! A blanket implementation of [EventListener] for all `Fn(&Event)` is provided.

use crate::registers::Register;

/// Represents an event that occurred while executing an instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// An instruction modified a register.
    RegisterChange {
        /// The register which was written. Aliases of the same cell changed with it.
        register: Register,

        /// The new value of the register.
        data: u32,
    },

    /// An instruction wrote or erased memory.
    MemoryChange {
        /// The first changed address.
        address: u32,

        /// Number of consecutive bytes that changed.
        length: u32,
    },

    /// All memory was cleared.
    MemoryCleared,

    /// An instruction was appended to the history.
    HistoryAppend {
        /// Address of the slot the instruction occupies.
        address: u32,

        /// The instruction as typed.
        line: String,
    },

    /// The history was truncated.
    HistoryCleared,

    /// The memory view window moved.
    ViewMoved {
        origin: u32,
    },

    /// A replay started.
    ReplayStarted {
        /// One past the address of the last replayed slot.
        program_end: u32,
    },

    /// The replay executed the instruction in a slot.
    ReplayStep {
        address: u32,
        status: String,
    },

    /// A replay stopped.
    ReplayFinished {
        /// True if the replay was stopped by a `QUIT` instruction.
        halted: bool,
    },
}

/// Trait for consuming events.
pub trait EventListener {
    /// Called whenever a new event has been created.
    fn event(&mut self, event: &Event);
}

impl<F> EventListener for F where F: Fn(&Event) {
    fn event(&mut self, event: &Event) {
        self(event)
    }
}

pub(crate) struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventDispatcher {
    pub fn new() -> EventDispatcher {
        EventDispatcher {
            listeners: Vec::new(),
        }
    }

    pub fn add_listener<L: EventListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener) as Box<dyn EventListener>)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn dispatch(&mut self, event: Event) {
        for listener in &mut self.listeners {
            listener.event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "EventDispatcher({} listeners)", self.listeners.len())
    }
}
