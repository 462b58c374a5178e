pub mod acquisition;
pub mod command;

pub use acquisition::{acquisition_task, Imu, Timed, TimedError};
pub use command::command_task;
