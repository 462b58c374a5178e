//! One instant's readings and the byte layout it travels in.
//!
//! The record only ever holds raw codes (ADC counts, sensor LSBs, microseconds).
//! Conversion lives in [`crate::units`].

use bytemuck::{Pod, Zeroable};
use crc16::{State, CCITT_FALSE};

/// Size of a `DataElement` payload.
pub const SAMPLE_LEN: usize = 20;

/// Bumped whenever a field is added, removed, resized or reordered.
pub const SCHEMA_VERSION: u8 = 1;

/// Wire-format record. Field order is the wire order; every field is
/// little-endian on the wire regardless of the producer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Zeroable, Pod)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub timestamp_us: u32,
    pub analog: u16,
    pub button_0: u8,
    pub button_1: u8,
    pub accel_x: i16,
    pub accel_y: i16,
    pub accel_z: i16,
    pub gyro_x: i16,
    pub gyro_y: i16,
    pub gyro_z: i16,
}

const _: () = assert!(core::mem::size_of::<Sample>() == SAMPLE_LEN);

impl Sample {
    pub fn accel(&self) -> [i16; 3] {
        [self.accel_x, self.accel_y, self.accel_z]
    }

    pub fn gyro(&self) -> [i16; 3] {
        [self.gyro_x, self.gyro_y, self.gyro_z]
    }

    /// Swap every field into little-endian (a no-op on the STM32).
    fn to_le(self) -> Self {
        Self {
            timestamp_us: self.timestamp_us.to_le(),
            analog: self.analog.to_le(),
            button_0: self.button_0,
            button_1: self.button_1,
            accel_x: self.accel_x.to_le(),
            accel_y: self.accel_y.to_le(),
            accel_z: self.accel_z.to_le(),
            gyro_x: self.gyro_x.to_le(),
            gyro_y: self.gyro_y.to_le(),
            gyro_z: self.gyro_z.to_le(),
        }
    }

    fn to_native(self) -> Self {
        Self {
            timestamp_us: u32::from_le(self.timestamp_us),
            analog: u16::from_le(self.analog),
            button_0: self.button_0,
            button_1: self.button_1,
            accel_x: i16::from_le(self.accel_x),
            accel_y: i16::from_le(self.accel_y),
            accel_z: i16::from_le(self.accel_z),
            gyro_x: i16::from_le(self.gyro_x),
            gyro_y: i16::from_le(self.gyro_y),
            gyro_z: i16::from_le(self.gyro_z),
        }
    }

    pub fn to_wire(&self) -> [u8; SAMPLE_LEN] {
        bytemuck::cast(self.to_le())
    }

    pub fn from_wire(bytes: &[u8; SAMPLE_LEN]) -> Self {
        bytemuck::cast::<[u8; SAMPLE_LEN], Sample>(*bytes).to_native()
    }
}

/* ────────────────── Explicit schema ───────────── */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FieldKind {
    U8,
    U16,
    U32,
    I16,
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 => 4,
        }
    }

    /// Low nibble = byte width, high bit = signed.
    pub const fn code(self) -> u8 {
        match self {
            FieldKind::U8 => 0x01,
            FieldKind::U16 => 0x02,
            FieldKind::U32 => 0x04,
            FieldKind::I16 => 0x82,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(FieldKind::U8),
            0x02 => Some(FieldKind::U16),
            0x04 => Some(FieldKind::U32),
            0x82 => Some(FieldKind::I16),
            _ => None,
        }
    }
}

pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Wire order of [`Sample`]; mirrors the CSV column names.
pub const SAMPLE_FIELDS: &[Field] = &[
    Field {
        name: "timestamp",
        kind: FieldKind::U32,
    },
    Field {
        name: "analog",
        kind: FieldKind::U16,
    },
    Field {
        name: "btn_0",
        kind: FieldKind::U8,
    },
    Field {
        name: "btn_1",
        kind: FieldKind::U8,
    },
    Field {
        name: "acc_x",
        kind: FieldKind::I16,
    },
    Field {
        name: "acc_y",
        kind: FieldKind::I16,
    },
    Field {
        name: "acc_z",
        kind: FieldKind::I16,
    },
    Field {
        name: "gyro_x",
        kind: FieldKind::I16,
    },
    Field {
        name: "gyro_y",
        kind: FieldKind::I16,
    },
    Field {
        name: "gyro_z",
        kind: FieldKind::I16,
    },
];

/// Largest field table a receiver will accept in a Schema frame.
pub const MAX_SCHEMA_FIELDS: usize = 16;

/// CRC-16/CCITT-FALSE over `version, count, codes...`.
pub fn fingerprint(version: u8, codes: &[u8]) -> u16 {
    let mut crc = State::<CCITT_FALSE>::new();
    crc.update(&[version, codes.len() as u8]);
    crc.update(codes);
    crc.get()
}

/// Fingerprint of the layout compiled into this firmware.
pub fn schema_fingerprint() -> u16 {
    let mut codes = [0u8; MAX_SCHEMA_FIELDS];
    for (slot, field) in codes.iter_mut().zip(SAMPLE_FIELDS) {
        *slot = field.kind.code();
    }
    fingerprint(SCHEMA_VERSION, &codes[..SAMPLE_FIELDS.len()])
}

/// Layout announced by the peer in a Schema frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Schema {
    pub version: u8,
    pub codes: heapless::Vec<u8, MAX_SCHEMA_FIELDS>,
}

impl Schema {
    pub fn local() -> Self {
        let mut codes = heapless::Vec::new();
        for field in SAMPLE_FIELDS {
            // SAMPLE_FIELDS is shorter than MAX_SCHEMA_FIELDS
            let _ = codes.push(field.kind.code());
        }
        Self {
            version: SCHEMA_VERSION,
            codes,
        }
    }

    pub fn fingerprint(&self) -> u16 {
        fingerprint(self.version, &self.codes)
    }

    /// Total record width implied by the announced fields.
    pub fn record_len(&self) -> Option<usize> {
        self.codes
            .iter()
            .try_fold(0usize, |acc, &c| FieldKind::from_code(c).map(|k| acc + k.width()))
    }

    /// True when a peer's samples can be decoded with [`Sample::from_wire`].
    pub fn is_compatible(&self) -> bool {
        *self == Self::local()
    }
}
