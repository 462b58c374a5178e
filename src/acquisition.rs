//! Sampling loop core: command handling, batch output and fail-stop.
//!
//! Hardware-free so it can run against fakes; the firmware tasks supply
//! the clock, the aux pins and the transport.

use embedded_io_async::Write;

use crate::command::{Command, ParseError};
use crate::config::{HEARTBEAT_EVERY_TICKS, SAMPLE_RATE_HZ, TEST_BATCH_LEN};
use crate::drivers::mpu6050::MotionSensor;
use crate::message;
use crate::protocol::{Framer, SendError};
use crate::sample::Sample;

/// Analog input and the two push buttons.
pub trait AuxInputs {
    /// 10-bit ADC code.
    fn analog(&mut self) -> u16;
    /// `true` = pressed.
    fn buttons(&mut self) -> [bool; 2];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Idle,
    Streaming,
    Test { remaining: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionError<SE, WE> {
    /// Burst read failed; the stream has been failed-stop.
    Sensor(SE),
    /// `Io` also latches output off; the fatal marker has been attempted.
    Transport(SendError<WE>),
}

impl<SE, WE> From<SendError<WE>> for AcquisitionError<SE, WE> {
    fn from(e: SendError<WE>) -> Self {
        AcquisitionError::Transport(e)
    }
}

impl<SE, WE> AcquisitionError<SE, WE> {
    pub fn is_halted(&self) -> bool {
        matches!(self, AcquisitionError::Transport(SendError::Halted))
    }
}

pub struct Acquisition<S, W> {
    sensor: S,
    framer: Framer<W>,
    mode: Mode,
    idle_ticks: u32,
    batch_len: u32,
}

type Result<T, S, W> = core::result::Result<
    T,
    AcquisitionError<<S as MotionSensor>::Error, <W as embedded_io_async::ErrorType>::Error>,
>;

impl<S, W> Acquisition<S, W>
where
    S: MotionSensor,
    W: Write,
{
    pub fn new(sensor: S, tx: W) -> Self {
        Self {
            sensor,
            framer: Framer::new(tx),
            mode: Mode::Idle,
            idle_ticks: 0,
            batch_len: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_halted(&self) -> bool {
        self.framer.is_halted()
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn into_parts(self) -> (S, W) {
        (self.sensor, self.framer.into_inner())
    }

    /// Schema frame, then a human-readable banner.
    pub async fn announce(&mut self) -> Result<(), S, W> {
        self.framer.schema().await?;
        self.framer
            .send_line(&message!(
                "kos-daq ",
                env!("CARGO_PKG_VERSION"),
                " ready, ",
                SAMPLE_RATE_HZ,
                " Hz"
            ))
            .await?;
        Ok(())
    }

    /// Parses and runs one command line, answering rejected lines with a message.
    pub async fn handle_line(&mut self, line: &str) -> Result<(), S, W> {
        match Command::parse(line) {
            Ok(cmd) => self.handle(cmd).await,
            Err(ParseError::Empty) => Ok(()),
            Err(ParseError::Unsupported(text)) => {
                warn!("Unsupported command");
                self.reply(&message!("Unsupported command: ", text)).await
            }
            Err(ParseError::Unknown(text)) => {
                warn!("Unknown command");
                self.reply(&message!("Unknown command: ", text)).await
            }
        }
    }

    pub async fn handle(&mut self, cmd: Command) -> Result<(), S, W> {
        match (cmd, self.mode) {
            (Command::Start, Mode::Idle) => {
                info!("Streaming started");
                self.open_batch(Mode::Streaming).await
            }
            (Command::Test, Mode::Idle) => {
                info!("Test batch of {} samples", TEST_BATCH_LEN);
                self.open_batch(Mode::Test {
                    remaining: TEST_BATCH_LEN,
                })
                .await
            }
            (Command::Stop, Mode::Streaming | Mode::Test { .. }) => {
                info!("Streaming stopped");
                self.close_batch().await
            }
            (Command::Start | Command::Test, _) => self.reply(&message!("Already streaming")).await,
            (Command::Stop, Mode::Idle) => self.reply(&message!("Not streaming")).await,
        }
    }

    /// One sample period. Samples while a batch is open, otherwise counts
    /// towards the next heartbeat.
    pub async fn tick<A: AuxInputs>(&mut self, timestamp_us: u32, aux: &mut A) -> Result<(), S, W> {
        if self.framer.is_halted() {
            return Err(SendError::Halted.into());
        }
        match self.mode {
            Mode::Idle => {
                self.idle_ticks += 1;
                if self.idle_ticks >= HEARTBEAT_EVERY_TICKS {
                    self.idle_ticks = 0;
                    self.framer.heartbeat().await?;
                }
                Ok(())
            }
            Mode::Streaming => self.sample(timestamp_us, aux).await,
            Mode::Test { remaining } => {
                self.sample(timestamp_us, aux).await?;
                if remaining <= 1 {
                    self.close_batch().await
                } else {
                    self.mode = Mode::Test {
                        remaining: remaining - 1,
                    };
                    Ok(())
                }
            }
        }
    }

    /// Fail-stop from outside the loop, e.g. when a read hangs.
    pub async fn fail(&mut self) -> core::result::Result<(), SendError<W::Error>> {
        self.mode = Mode::Idle;
        self.framer.fail().await
    }

    async fn sample<A: AuxInputs>(&mut self, timestamp_us: u32, aux: &mut A) -> Result<(), S, W> {
        let [b0, b1] = aux.buttons();
        let mut sample = Sample {
            timestamp_us,
            analog: aux.analog(),
            button_0: b0 as u8,
            button_1: b1 as u8,
            ..Default::default()
        };
        if let Err(e) = self.sensor.fill(&mut sample).await {
            error!("IMU burst read failed after {} samples", self.batch_len);
            // The sensor error is what the caller needs; a transport failure
            // here still leaves the framer latched.
            let _ = self.fail().await;
            return Err(AcquisitionError::Sensor(e));
        }
        self.framer.data_element(&sample).await?;
        self.batch_len = self.batch_len.saturating_add(1);
        Ok(())
    }

    async fn open_batch(&mut self, mode: Mode) -> Result<(), S, W> {
        self.framer.data_start().await?;
        self.mode = mode;
        self.batch_len = 0;
        Ok(())
    }

    async fn close_batch(&mut self) -> Result<(), S, W> {
        self.mode = Mode::Idle;
        self.idle_ticks = 0;
        self.framer.data_end().await?;
        debug!("Batch closed with {} samples", self.batch_len);
        Ok(())
    }

    async fn reply(&mut self, text: &crate::protocol::MessageText) -> Result<(), S, W> {
        self.framer.send_line(text).await?;
        Ok(())
    }
}
