use serde::{Deserialize, Serialize};
use std::fmt;

pub const OPERATOR_SIZE: usize = 5;
pub const INSTRUMENT_SIZE: usize = 40;
pub const BANK_ID_SIZE: usize = 3;

pub const OUTPUT_CHANNELS: usize = 2; // interleaved stereo
pub const MIDI_CHANNELS: u8 = 16;
pub const PROGRAMS_PER_BANK: usize = 128;

pub type Program = u8; // 0..127

/// Address of one instrument bank inside the engine.
///
/// Melodic and percussive banks live in separate namespaces; `msb`/`lsb`
/// follow the MIDI bank select controllers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BankId {
    #[serde(default)]
    pub percussive: bool,
    #[serde(default)]
    pub msb: u8,
    #[serde(default)]
    pub lsb: u8,
}

impl BankId {
    pub fn melodic(msb: u8, lsb: u8) -> Self {
        Self {
            percussive: false,
            msb,
            lsb,
        }
    }

    pub fn percussion(msb: u8, lsb: u8) -> Self {
        Self {
            percussive: true,
            msb,
            lsb,
        }
    }

    pub fn to_bytes(self) -> [u8; BANK_ID_SIZE] {
        [self.percussive as u8, self.msb, self.lsb]
    }

    pub fn from_bytes(bytes: [u8; BANK_ID_SIZE]) -> Self {
        Self {
            percussive: bytes[0] != 0,
            msb: bytes[1],
            lsb: bytes[2],
        }
    }
}

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.percussive { "percussion" } else { "melodic" };
        write!(f, "{}:{}:{}", kind, self.msb, self.lsb)
    }
}

/// Resolved bank reference handed out by `FmEngine::get_bank`.
/// Only meaningful to the engine that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BankHandle(u64);

impl BankHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Allocation inside the engine's memory arena. Offsets stay valid across
/// arena growth; addresses derived from `HeapView` do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArenaPtr {
    pub offset: usize,
    pub len: usize,
}

/// Borrowed snapshot of the engine arena.
///
/// `generation` changes every time the arena is reallocated.
#[derive(Clone, Copy, Debug)]
pub struct HeapView<'a> {
    pub bytes: &'a [u8],
    pub generation: u64,
}

impl<'a> HeapView<'a> {
    pub fn base_addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }
}
