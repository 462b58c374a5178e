//! MPU-6050 accelerometer + gyroscope over I²C.
//!
//! Register map: InvenSense RM-MPU-6000A. Calibration is not performed;
//! both full-scale ranges stay at their power-on defaults (±2 g, ±250 °/s).

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::config::SensorConfig;
use crate::sample::Sample;

// MPU-6050 I2C address, AD0 low
pub const MPU6050_ADDRESS: u8 = 0x68;

// MPU-6050 Register Addresses
const MPU6050_SIGNAL_PATH_RESET_ADDR: u8 = 0x68;
const MPU6050_PWR_MGMT_1_ADDR: u8 = 0x6B;
const MPU6050_ACCEL_XOUT_H_ADDR: u8 = 0x3B;
const MPU6050_WHO_AM_I_ADDR: u8 = 0x75;

const MPU6050_ID: u8 = 0x68;

// PWR_MGMT_1 bits
const PWR_DEVICE_RESET: u8 = 0b1000_0000;
// SLEEP cleared, CLKSEL = internal 8 MHz oscillator
const PWR_WAKE_INTERNAL_CLOCK: u8 = 0b0000_0000;
// GYRO_RESET | ACCEL_RESET | TEMP_RESET
const SIGNAL_PATH_RESET_ALL: u8 = 0b0000_0111;

/// accel xyz, temperature, gyro xyz; seven big-endian i16.
pub const BURST_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    I2c(E),
    /// The reset bit was still set after `polls` status reads.
    ResetTimeout { polls: u32 },
    NotConfigured,
    UnexpectedIdentity(u8),
}

impl<E> Error<E> {
    /// Byte reported through `Framer::send_error_code` before fail-stop.
    pub fn code(&self) -> u8 {
        match self {
            Error::I2c(_) => 0x01,
            Error::ResetTimeout { .. } => 0x02,
            Error::NotConfigured => 0x03,
            Error::UnexpectedIdentity(_) => 0x04,
        }
    }
}

/// Bring-up progress. `Configured` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitState {
    Idle,
    WaitingForResetClear { polls: u32 },
    SignalPathReset,
    Configured,
}

/// Raw codes from one burst read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionReading {
    pub accel: [i16; 3],
    pub temperature: i16,
    pub gyro: [i16; 3],
}

impl MotionReading {
    pub fn from_be_bytes(raw: &[u8; BURST_LEN]) -> Self {
        let word = |i: usize| i16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]);
        Self {
            accel: [word(0), word(1), word(2)],
            temperature: word(3),
            gyro: [word(4), word(5), word(6)],
        }
    }

    /// Writes the six motion fields; timestamp, analog and buttons are untouched.
    pub fn apply_to(&self, sample: &mut Sample) {
        [sample.accel_x, sample.accel_y, sample.accel_z] = self.accel;
        [sample.gyro_x, sample.gyro_y, sample.gyro_z] = self.gyro;
    }
}

/// Anything that can fill the motion part of a [`Sample`].
#[allow(async_fn_in_trait)]
pub trait MotionSensor {
    type Error;

    async fn fill(&mut self, sample: &mut Sample) -> Result<(), Self::Error>;
}

pub struct Mpu6050<I2C, D> {
    i2c: I2C,
    delay: D,
    config: SensorConfig,
    state: InitState,
}

impl<I2C, D> Mpu6050<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, config: SensorConfig) -> Self {
        Self {
            i2c,
            delay,
            config,
            state: InitState::Idle,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn i2c(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub async fn verify_identity(&mut self) -> Result<(), Error<I2C::Error>> {
        let id = self.read_byte(MPU6050_WHO_AM_I_ADDR).await?;
        if id != MPU6050_ID {
            error!(
                "Invalid MPU-6050 ID: 0x{:02X}, expected 0x{:02X}",
                id, MPU6050_ID
            );
            return Err(Error::UnexpectedIdentity(id));
        }
        debug!("MPU-6050 chip ID verified: 0x{:02X}", id);
        Ok(())
    }

    /// Runs the bring-up state machine to completion.
    pub async fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        info!("Starting MPU-6050 initialization sequence...");
        while self.state != InitState::Configured {
            self.step().await?;
        }
        info!("MPU-6050 initialization completed successfully");
        Ok(())
    }

    /// Advances bring-up by exactly one transition and returns the new state.
    pub async fn step(&mut self) -> Result<InitState, Error<I2C::Error>> {
        self.state = match self.state {
            InitState::Idle => {
                info!("Performing device reset...");
                self.write_byte(MPU6050_PWR_MGMT_1_ADDR, PWR_DEVICE_RESET)
                    .await?;
                InitState::WaitingForResetClear { polls: 0 }
            }
            InitState::WaitingForResetClear { polls } => {
                if let Some(limit) = self.config.reset_poll_limit {
                    if polls >= limit {
                        error!("Reset bit still set after {} polls", polls);
                        return Err(Error::ResetTimeout { polls });
                    }
                }
                if polls > 0 && self.config.reset_poll_interval_us > 0 {
                    self.delay.delay_us(self.config.reset_poll_interval_us).await;
                }
                let pwr = self.read_byte(MPU6050_PWR_MGMT_1_ADDR).await?;
                let polls = polls + 1;
                if pwr & PWR_DEVICE_RESET == 0 {
                    debug!("Reset cleared after {} polls", polls);
                    self.delay.delay_ms(self.config.reset_settle_ms).await;
                    InitState::SignalPathReset
                } else {
                    InitState::WaitingForResetClear { polls }
                }
            }
            InitState::SignalPathReset => {
                info!("Resetting signal paths...");
                self.write_byte(MPU6050_SIGNAL_PATH_RESET_ADDR, SIGNAL_PATH_RESET_ALL)
                    .await?;
                self.delay.delay_ms(self.config.signal_path_settle_ms).await;
                info!("Waking up on internal oscillator...");
                self.write_byte(MPU6050_PWR_MGMT_1_ADDR, PWR_WAKE_INTERNAL_CLOCK)
                    .await?;
                InitState::Configured
            }
            InitState::Configured => InitState::Configured,
        };
        Ok(self.state)
    }

    /// One 14-byte burst starting at ACCEL_XOUT_H, in a single transaction.
    pub async fn read_raw(&mut self) -> Result<MotionReading, Error<I2C::Error>> {
        if self.state != InitState::Configured {
            return Err(Error::NotConfigured);
        }
        let raw = self.read_bytes::<BURST_LEN>(MPU6050_ACCEL_XOUT_H_ADDR).await?;
        Ok(MotionReading::from_be_bytes(&raw))
    }

    async fn write_byte(&mut self, reg: u8, value: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.config.address, &[reg, value])
            .await
            .map_err(Error::I2c)
    }

    async fn read_byte(&mut self, reg: u8) -> Result<u8, Error<I2C::Error>> {
        let [value] = self.read_bytes::<1>(reg).await?;
        Ok(value)
    }

    async fn read_bytes<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], Error<I2C::Error>> {
        let mut buf = [0u8; N];
        self.i2c
            .write_read(self.config.address, &[reg], &mut buf)
            .await
            .map_err(Error::I2c)?;
        Ok(buf)
    }
}

impl<I2C, D> MotionSensor for Mpu6050<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    type Error = Error<I2C::Error>;

    async fn fill(&mut self, sample: &mut Sample) -> Result<(), Self::Error> {
        self.read_raw().await?.apply_to(sample);
        Ok(())
    }
}

// Factory function to create the default IMU (MPU-6050 at 0x68)
pub async fn create_default_imu<I2C, D>(
    i2c: I2C,
    delay: D,
) -> Result<Mpu6050<I2C, D>, Error<I2C::Error>>
where
    I2C: I2c,
    D: DelayNs,
{
    let mut imu = Mpu6050::new(i2c, delay, SensorConfig::default());
    imu.verify_identity().await?;
    imu.init().await?;
    Ok(imu)
}
