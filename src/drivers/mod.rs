pub mod mpu6050;

pub use mpu6050::{create_default_imu, Error as ImuError, InitState, MotionReading, Mpu6050};
