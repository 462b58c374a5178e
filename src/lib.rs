#![cfg_attr(not(test), no_std)]

// Must stay first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod acquisition;
pub mod batch;
pub mod command;
pub mod config;
pub mod drivers;
pub mod protocol;
pub mod sample;
pub mod units;

#[cfg(feature = "board")]
pub mod board;
#[cfg(feature = "board")]
pub mod ipc;
#[cfg(feature = "board")]
pub mod tasks;

pub use acquisition::{Acquisition, AcquisitionError, AuxInputs};
#[cfg(feature = "board")]
pub use board::Board;
pub use drivers::mpu6050::{MotionSensor, Mpu6050};
pub use protocol::{Frame, FrameDecoder, Framer};
pub use sample::Sample;
