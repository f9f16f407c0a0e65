//! Runtime settings of an [Emulator](crate::emulator::Emulator).

use std::time::Duration;

/// Address the memory view window starts at before the first `MEMSET` or `MEMVIEW`.
pub const DEFAULT_VIEW_ORIGIN: u32 = 0xFFFF_F000;

/// Upper bound for the number of instructions a single `RUN` may execute.
pub const DEFAULT_MAX_REPLAY_STEPS: usize = 100_000;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Pause between two replayed instructions, so that a human can follow along.
    /// Zero disables the pause.
    pub step_delay: Duration,

    /// A `RUN` that executes more instructions than this fails instead of looping forever.
    pub max_replay_steps: usize,

    /// Initial origin of the memory view window.
    pub view_origin: u32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            step_delay: Duration::from_millis(0),
            max_replay_steps: DEFAULT_MAX_REPLAY_STEPS,
            view_origin: DEFAULT_VIEW_ORIGIN,
        }
    }
}
