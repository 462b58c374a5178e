use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Async;
use embassy_stm32::usart::UartTx;
use embassy_time::{with_timeout, Delay, Duration, Instant, Ticker};

use crate::acquisition::{Acquisition, AcquisitionError};
use crate::board::AuxPins;
use crate::config::{BURST_READ_TIMEOUT_US, SAMPLE_PERIOD_US, SAMPLE_RATE_HZ};
use crate::drivers::mpu6050::{MotionSensor, Mpu6050};
use crate::ipc::{self, COMMAND_CH};
use crate::protocol::SendError;
use crate::sample::Sample;

pub type Imu = Mpu6050<I2c<'static, Async>, Delay>;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimedError<E> {
    Timeout,
    Sensor(E),
}

/// Bounds every burst read so a wedged bus ends in fail-stop instead of a stall.
pub struct Timed<S>(pub S);

impl<S: MotionSensor> MotionSensor for Timed<S> {
    type Error = TimedError<S::Error>;

    async fn fill(&mut self, sample: &mut Sample) -> Result<(), Self::Error> {
        let limit = Duration::from_micros(BURST_READ_TIMEOUT_US);
        match with_timeout(limit, self.0.fill(sample)).await {
            Ok(res) => res.map_err(TimedError::Sensor),
            Err(_) => Err(TimedError::Timeout),
        }
    }
}

#[task]
pub async fn acquisition_task(imu: Imu, tx: UartTx<'static, Async>, mut aux: AuxPins) {
    info!(
        "Acquisition task started - sampling every {}us ({} Hz)",
        SAMPLE_PERIOD_US, SAMPLE_RATE_HZ
    );
    let mut acq = Acquisition::new(Timed(imu), tx);
    if let Err(e) = acq.announce().await {
        warn!("Announce failed: {:?}", e);
    }

    let mut ticker = Ticker::every(Duration::from_micros(SAMPLE_PERIOD_US));
    loop {
        let res = match select(ticker.next(), COMMAND_CH.receive()).await {
            Either::First(()) => {
                // Microseconds since boot, wrapping at 2^32
                let now = Instant::now().as_micros() as u32;
                acq.tick(now, &mut aux).await
            }
            Either::Second(line) => {
                debug!("Command: {=str}", line.as_str());
                acq.handle_line(&line).await
            }
        };

        match res {
            Ok(()) => {}
            Err(AcquisitionError::Sensor(TimedError::Timeout)) => {
                error!("IMU burst read timed out");
                break;
            }
            Err(AcquisitionError::Sensor(TimedError::Sensor(e))) => {
                error!("IMU burst read failed: {:?} (code 0x{:02X})", e, e.code());
                break;
            }
            Err(AcquisitionError::Transport(SendError::Io(e))) => {
                // The framer has latched and tried to send the fatal marker
                error!("UART TX failed: {:?}", e);
                break;
            }
            Err(e) if e.is_halted() => break,
            Err(e) => {
                // Refused before anything was written; the stream is intact
                warn!("Reply not sent: {:?}", e);
            }
        }
    }

    ipc::halt();
    warn!("Output halted, acquisition task parked");
    core::future::pending::<()>().await;
}
