//! Raw code → SI conversion for the default full-scale ranges (±2 g, ±250 °/s).
//!
//! | Data   | SI    | Conversion                        |
//! |--------|-------|-----------------------------------|
//! | time   | s     | micros × 1e-6                     |
//! | analog | V     | analog × 5 / 1023                 |
//! | accel  | m/s²  | raw × 2 × 9.81 / 2^15             |
//! | gyro   | rad/s | raw × 250 × π / 180 / 2^15        |
//!
//! Factors are precomputed once, exactly as the host tooling does, so both
//! ends produce the same `f64` bits.

use core::f64::consts::PI;
use core::fmt;

use crate::sample::{Sample, SAMPLE_FIELDS};

pub const MICROS_TO_S: f64 = 1.0e-6;
pub const ANALOG_TO_VOLTS: f64 = 5.0 / 1023.0;
pub const ACCEL_TO_MPS2: f64 = 2.0 * 9.81 / 32768.0;
pub const GYRO_TO_RADPS: f64 = 250.0 * PI / 180.0 / 32768.0;

pub fn time_s(timestamp_us: u32) -> f64 {
    timestamp_us as f64 * MICROS_TO_S
}

pub fn voltage(analog: u16) -> f64 {
    analog as f64 * ANALOG_TO_VOLTS
}

pub fn accel_mps2(raw: i16) -> f64 {
    raw as f64 * ACCEL_TO_MPS2
}

pub fn gyro_radps(raw: i16) -> f64 {
    raw as f64 * GYRO_TO_RADPS
}

/// A [`Sample`] in SI units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiSample {
    pub time_s: f64,
    pub voltage: f64,
    pub button_0: u8,
    pub button_1: u8,
    pub accel: [f64; 3],
    pub gyro: [f64; 3],
}

impl From<&Sample> for SiSample {
    fn from(s: &Sample) -> Self {
        Self {
            time_s: time_s(s.timestamp_us),
            voltage: voltage(s.analog),
            button_0: s.button_0,
            button_1: s.button_1,
            accel: s.accel().map(accel_mps2),
            gyro: s.gyro().map(gyro_radps),
        }
    }
}

/// Console rendering used by the serial monitor.
impl fmt::Display for SiSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:8.4}] a:{:4.2}, b0:{}, b1:{}, acc:{:7.3},{:7.3},{:7.3}, gyro:{:7.3},{:7.3},{:7.3}",
            self.time_s,
            self.voltage,
            self.button_0,
            self.button_1,
            self.accel[0],
            self.accel[1],
            self.accel[2],
            self.gyro[0],
            self.gyro[1],
            self.gyro[2],
        )
    }
}

impl SiSample {
    /// One CSV row matching [`write_csv_header`], no trailing newline.
    pub fn write_csv_row<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "{},{},{},{}",
            self.time_s, self.voltage, self.button_0, self.button_1
        )?;
        for v in self.accel.iter().chain(self.gyro.iter()) {
            write!(out, ",{}", v)?;
        }
        Ok(())
    }
}

/// `timestamp,analog,btn_0,...` in wire order, no trailing newline.
pub fn write_csv_header<W: fmt::Write>(out: &mut W) -> fmt::Result {
    for (i, field) in SAMPLE_FIELDS.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        out.write_str(field.name)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accel_extremes() {
        for raw in [i16::MIN, 0, i16::MAX] {
            assert_eq!(accel_mps2(raw), raw as f64 * (2.0 * 9.81 / 32768.0));
            let direct = raw as f64 * 2.0 * 9.81 / 32768.0;
            assert!((accel_mps2(raw) - direct).abs() < 1e-12);
        }
        assert_eq!(accel_mps2(0), 0.0);
        assert!((accel_mps2(i16::MIN) + 2.0 * 9.81).abs() < 1e-12);
    }

    #[test]
    fn gyro_extremes() {
        for raw in [i16::MIN, -1, 0, 1, i16::MAX] {
            let direct = raw as f64 * 250.0 * PI / 180.0 / 32768.0;
            assert!((gyro_radps(raw) - direct).abs() < 1e-12);
        }
        assert!((gyro_radps(i16::MIN) + 250.0_f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn analog_and_time() {
        assert_eq!(voltage(0), 0.0);
        assert!((voltage(1023) - 5.0).abs() < 1e-12);
        assert!((time_s(1_500_000) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn console_line_format() {
        let s = Sample {
            timestamp_us: 1_000_000,
            analog: 1023,
            button_0: 1,
            ..Default::default()
        };
        let line = format!("{}", SiSample::from(&s));
        assert_eq!(
            line,
            "[  1.0000] a:5.00, b0:1, b1:0, acc:  0.000,  0.000,  0.000, gyro:  0.000,  0.000,  0.000"
        );
    }

    #[test]
    fn csv_header_and_row() {
        let mut header = String::new();
        write_csv_header(&mut header).unwrap();
        assert_eq!(
            header,
            "timestamp,analog,btn_0,btn_1,acc_x,acc_y,acc_z,gyro_x,gyro_y,gyro_z"
        );

        let mut row = String::new();
        SiSample::from(&Sample::default())
            .write_csv_row(&mut row)
            .unwrap();
        assert_eq!(row.split(',').count(), 10);
        assert!(row.starts_with("0,0,0,0,"));
    }
}
