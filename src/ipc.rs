use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex as RawMutex, channel::Channel};
use portable_atomic::{AtomicBool, Ordering};

use crate::command::CommandLine;
use crate::config::COMMAND_CHANNEL_SIZE;

/* Command lines: UART RX task -> acquisition task */
pub static COMMAND_CH: Channel<RawMutex, CommandLine, COMMAND_CHANNEL_SIZE> = Channel::new();

/// Set once the stream has been failed-stop; never cleared.
static HALTED: AtomicBool = AtomicBool::new(false);

pub fn halt() {
    HALTED.store(true, Ordering::Release);
}

pub fn is_halted() -> bool {
    HALTED.load(Ordering::Acquire)
}
