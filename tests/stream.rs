//! Device side and host side wired together through an in-memory link.

use core::cell::Cell;
use core::convert::Infallible;
use std::rc::Rc;

use embassy_futures::block_on;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, Operation};
use embedded_io_async::Write;

use kos_daq::acquisition::{Acquisition, AcquisitionError, AuxInputs};
use kos_daq::batch::{BatchSummary, BatchTracker};
use kos_daq::command::LineBuffer;
use kos_daq::config::{MAX_COMMAND_LEN, SAMPLE_PERIOD_US, TEST_BATCH_LEN};
use kos_daq::drivers::{create_default_imu, ImuError, Mpu6050};
use kos_daq::protocol::{DecodeError, Frame, FrameDecoder};
use kos_daq::units::SiSample;

/// Register file that answers like a freshly powered MPU-6050.
struct Mpu {
    regs: [u8; 128],
    reset_reads_left: u32,
    /// Shared with the test so the bus can be cut after the driver owns it.
    broken: Rc<Cell<bool>>,
}

impl Mpu {
    fn new(reset_reads: u32, broken: Rc<Cell<bool>>) -> Self {
        let mut regs = [0u8; 128];
        regs[0x75] = 0x68;
        Self {
            regs,
            reset_reads_left: reset_reads,
            broken,
        }
    }

    fn set_motion(&mut self, accel: [i16; 3], gyro: [i16; 3]) {
        for (i, v) in accel.iter().enumerate() {
            self.regs[0x3B + 2 * i..0x3D + 2 * i].copy_from_slice(&v.to_be_bytes());
        }
        for (i, v) in gyro.iter().enumerate() {
            self.regs[0x43 + 2 * i..0x45 + 2 * i].copy_from_slice(&v.to_be_bytes());
        }
    }
}

impl ErrorType for Mpu {
    type Error = ErrorKind;
}

impl I2c for Mpu {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.broken.get() {
            return Err(ErrorKind::Other);
        }
        let mut reg = 0usize;
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    reg = bytes[0] as usize;
                    if bytes.len() == 2 {
                        self.regs[reg] = bytes[1] & 0x7F;
                    }
                }
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = self.regs[reg];
                        if reg == 0x6B && self.reset_reads_left > 0 {
                            self.reset_reads_left -= 1;
                            *b |= 0x80;
                        }
                        reg += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

#[derive(Default)]
struct Link {
    bytes: Vec<u8>,
}

impl embedded_io_async::ErrorType for Link {
    type Error = Infallible;
}

impl Write for Link {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }
}

struct Panel {
    analog: u16,
    pressed: [bool; 2],
}

impl AuxInputs for Panel {
    fn analog(&mut self) -> u16 {
        self.analog
    }

    fn buttons(&mut self) -> [bool; 2] {
        self.pressed
    }
}

type Device = Acquisition<Mpu6050<Mpu, NoDelay>, Link>;

/// Configured device that has announced itself, plus the switch that breaks its bus.
fn boot(reset_reads: u32) -> (Device, Rc<Cell<bool>>) {
    let broken = Rc::new(Cell::new(false));
    let mut bus = Mpu::new(reset_reads, broken.clone());
    bus.set_motion([0, 0, 16384], [-131, 0, 131]);
    let imu = block_on(create_default_imu(bus, NoDelay)).unwrap();
    let mut dev = Acquisition::new(imu, Link::default());
    block_on(dev.announce()).unwrap();
    (dev, broken)
}

/// Host side: split into odd-sized chunks to mimic serial reads.
fn receive(bytes: &[u8]) -> Vec<Result<Frame, DecodeError>> {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    for chunk in bytes.chunks(7) {
        out.extend(decoder.decode(chunk));
    }
    out
}

fn run_commands(dev: &mut Device, typed: &[u8], panel: &mut Panel, ticks_after_each: u32) {
    let mut lines = LineBuffer::<MAX_COMMAND_LEN>::new();
    let mut now = 0u32;
    for &byte in typed {
        if let Some(line) = lines.push(byte) {
            let line = line.unwrap();
            block_on(dev.handle_line(&line)).unwrap();
            for _ in 0..ticks_after_each {
                now = now.wrapping_add(SAMPLE_PERIOD_US as u32);
                block_on(dev.tick(now, panel)).unwrap();
            }
        }
    }
}

#[test]
fn streamed_batch_reaches_the_host_intact() {
    let (mut dev, _) = boot(3);
    let mut panel = Panel {
        analog: 1023,
        pressed: [false, true],
    };
    run_commands(&mut dev, b"START\r\nSTOP\r\n", &mut panel, 10);
    let (_, link) = dev.into_parts();

    let frames: Vec<Frame> = receive(&link.bytes)
        .into_iter()
        .map(|f| f.unwrap())
        .collect();
    let Frame::Schema(schema) = &frames[0] else {
        panic!("stream must open with a schema, got {:?}", frames[0]);
    };
    assert!(schema.is_compatible());
    assert!(matches!(frames[1], Frame::Message { line: true, .. }));

    let mut tracker = BatchTracker::new();
    let mut summaries: Vec<BatchSummary> = Vec::new();
    let mut samples = Vec::new();
    for frame in &frames {
        if let Some(done) = tracker.observe(frame).unwrap() {
            summaries.push(done);
        }
        if let Frame::DataElement(s) = frame {
            samples.push(SiSample::from(s));
        }
    }
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].count, 10);
    assert_eq!(summaries[0].first_us, Some(SAMPLE_PERIOD_US as u32));
    let hz = summaries[0].average_hz().unwrap();
    // 10 samples across 9 periods
    assert!((hz - 10.0 / (9.0 * SAMPLE_PERIOD_US as f64 * 1e-6)).abs() < 1e-6);

    let s = &samples[0];
    assert!((s.voltage - 5.0).abs() < 1e-12);
    assert_eq!((s.button_0, s.button_1), (0, 1));
    assert!((s.accel[2] - 9.81).abs() < 1e-9);
    assert!(s.gyro[0] < 0.0 && s.gyro[2] > 0.0);
}

#[test]
fn test_command_and_rejections() {
    let (mut dev, _) = boot(0);
    let mut panel = Panel {
        analog: 0,
        pressed: [false, false],
    };
    run_commands(
        &mut dev,
        b"LIST\nTEST\nbogus\n",
        &mut panel,
        TEST_BATCH_LEN + 1,
    );
    let (_, link) = dev.into_parts();
    let frames: Vec<Frame> = receive(&link.bytes)
        .into_iter()
        .map(|f| f.unwrap())
        .collect();

    let texts: Vec<String> = frames
        .iter()
        .filter_map(|f| match f {
            Frame::Message { text, .. } => Some(text.as_str().unwrap().to_owned()),
            _ => None,
        })
        .collect();
    assert_eq!(texts[1], "Unsupported command: LIST");
    assert_eq!(texts[2], "Unknown command: bogus");

    let mut tracker = BatchTracker::new();
    let counts: Vec<u32> = frames
        .iter()
        .filter_map(|f| tracker.observe(f).unwrap())
        .map(|b| b.count)
        .collect();
    assert_eq!(counts, vec![TEST_BATCH_LEN]);
}

#[test]
fn lost_sensor_ends_in_fail_stop() {
    let (mut dev, bus_broken) = boot(0);
    let mut panel = Panel {
        analog: 512,
        pressed: [true, false],
    };
    block_on(dev.handle_line("START")).unwrap();
    block_on(dev.tick(1, &mut panel)).unwrap();

    bus_broken.set(true);
    let err = block_on(dev.tick(2, &mut panel)).unwrap_err();
    assert!(matches!(err, AcquisitionError::Sensor(ImuError::I2c(ErrorKind::Other))));
    assert!(block_on(dev.tick(3, &mut panel)).unwrap_err().is_halted());

    let (_, link) = dev.into_parts();
    let frames = receive(&link.bytes);
    let tail: Vec<_> = frames.iter().rev().take(2).collect();
    assert_eq!(*tail[0], Ok(Frame::ErrorMarker));
    assert_eq!(*tail[1], Ok(Frame::line("---ERROR---")));
}
