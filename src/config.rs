// Centralize all configuration constants
pub const SAMPLE_RATE_HZ: u32 = 500;
pub const SAMPLE_PERIOD_US: u64 = 1_000_000 / SAMPLE_RATE_HZ as u64;
pub const UART_BAUDRATE: u32 = 1_000_000;
pub const I2C_FREQUENCY_HZ: u32 = 1_000_000;

// Idle liveness: one heartbeat per second while no batch is open
pub const HEARTBEAT_EVERY_TICKS: u32 = SAMPLE_RATE_HZ;
// Samples emitted by a TEST command
pub const TEST_BATCH_LEN: u32 = 100;
// Upper bound on a single burst read before it is treated as a bus failure
pub const BURST_READ_TIMEOUT_US: u64 = 2_000;

// MPU-6050 bring-up
pub const MPU6050_RESET_POLL_LIMIT: u32 = 1_000;
pub const MPU6050_RESET_POLL_INTERVAL_US: u32 = 1_000;
pub const MPU6050_RESET_SETTLE_MS: u32 = 100;
pub const MPU6050_SIGNAL_PATH_SETTLE_MS: u32 = 100;

// Buffer sizes
pub const MAX_MESSAGE_LEN: usize = 128;
pub const MAX_COMMAND_LEN: usize = 64;
pub const UART_RX_BUFFER_LEN: usize = 256;

// Channel sizes
pub const COMMAND_CHANNEL_SIZE: usize = 4;

/// Runtime knobs for the sensor bring-up sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorConfig {
    /// 7-bit bus address.
    pub address: u8,
    /// Maximum number of reset-status polls. `None` waits forever.
    pub reset_poll_limit: Option<u32>,
    /// Pause between two reset-status polls.
    pub reset_poll_interval_us: u32,
    pub reset_settle_ms: u32,
    pub signal_path_settle_ms: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            address: crate::drivers::mpu6050::MPU6050_ADDRESS,
            reset_poll_limit: Some(MPU6050_RESET_POLL_LIMIT),
            reset_poll_interval_us: MPU6050_RESET_POLL_INTERVAL_US,
            reset_settle_ms: MPU6050_RESET_SETTLE_MS,
            signal_path_settle_ms: MPU6050_SIGNAL_PATH_SETTLE_MS,
        }
    }
}

impl SensorConfig {
    /// Waits on the reset bit with no deadline.
    pub fn unbounded(self) -> Self {
        Self {
            reset_poll_limit: None,
            ..self
        }
    }
}
