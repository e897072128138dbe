use crate::operator::{decode_operator, default_operator, encode_operator, Operator};
use fmbridge_ports::types::{INSTRUMENT_SIZE, OPERATOR_SIZE};
use serde::{Deserialize, Deserializer, Serialize};

pub const OPERATOR_COUNT: usize = 4;

const OFFSET_VERSION: usize = 0;
const OFFSET_NOTE_OFFSET1: usize = 4;
const OFFSET_NOTE_OFFSET2: usize = 6;
const OFFSET_VELOCITY_OFFSET: usize = 8;
const OFFSET_SECOND_VOICE_DETUNE: usize = 9;
const OFFSET_PERCUSSION_KEY: usize = 10;
const OFFSET_FLAGS: usize = 11;
const OFFSET_FB_CONN1: usize = 12;
const OFFSET_FB_CONN2: usize = 13;
pub const OFFSET_OPERATORS: usize = 14;
const OFFSET_DELAY_ON: usize = 34;
const OFFSET_DELAY_OFF: usize = 36;

pub const FLAG_4OP: u8 = 0x01;
pub const FLAG_PSEUDO_4OP: u8 = 0x02;
pub const FLAG_BLANK: u8 = 0x04;
pub const RHYTHM_MODE_MASK: u8 = 0x38;
const RHYTHM_MODE_SHIFT: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RhythmMode {
    None,
    BassDrum,
    Snare,
    TomTom,
    Cymbal,
    HiHat,
}

impl RhythmMode {
    /// `None` for the reserved values 6 and 7.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x07 {
            0 => Some(RhythmMode::None),
            1 => Some(RhythmMode::BassDrum),
            2 => Some(RhythmMode::Snare),
            3 => Some(RhythmMode::TomTom),
            4 => Some(RhythmMode::Cymbal),
            5 => Some(RhythmMode::HiHat),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            RhythmMode::None => 0,
            RhythmMode::BassDrum => 1,
            RhythmMode::Snare => 2,
            RhythmMode::TomTom => 3,
            RhythmMode::Cymbal => 4,
            RhythmMode::HiHat => 5,
        }
    }
}

/// 2- or 4-operator FM voice, as exchanged with control-path callers.
///
/// Deserializing a partial object fills missing scalars with zero/false and
/// missing or null operator slots with [`default_operator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub note_offset1: i16,
    #[serde(default)]
    pub note_offset2: i16,
    #[serde(default)]
    pub velocity_offset: i8,
    #[serde(default)]
    pub second_voice_detune: i8,
    #[serde(default)]
    pub percussion_key_number: u8,
    #[serde(default)]
    pub is_4op: bool,
    #[serde(default)]
    pub is_pseudo_4op: bool,
    #[serde(default)]
    pub is_blank: bool,
    /// 3 bits, see [`RhythmMode`].
    #[serde(default)]
    pub rhythm_mode: u8,
    #[serde(default)]
    pub fb_conn1_c0: u8,
    #[serde(default)]
    pub fb_conn2_c0: u8,
    #[serde(
        default = "default_operators",
        deserialize_with = "deserialize_operator_slots"
    )]
    pub operators: [Operator; OPERATOR_COUNT],
    #[serde(default)]
    pub delay_on_ms: u16,
    #[serde(default)]
    pub delay_off_ms: u16,
}

impl Instrument {
    pub fn rhythm(&self) -> Option<RhythmMode> {
        RhythmMode::from_bits(self.rhythm_mode)
    }

    pub fn flags(&self) -> u8 {
        (self.is_4op as u8) * FLAG_4OP
            | (self.is_pseudo_4op as u8) * FLAG_PSEUDO_4OP
            | (self.is_blank as u8) * FLAG_BLANK
            | ((self.rhythm_mode & 0x07) << RHYTHM_MODE_SHIFT)
    }
}

impl Default for Instrument {
    fn default() -> Self {
        default_instrument()
    }
}

fn default_operators() -> [Operator; OPERATOR_COUNT] {
    [default_operator(); OPERATOR_COUNT]
}

fn deserialize_operator_slots<'de, D>(deserializer: D) -> Result<[Operator; OPERATOR_COUNT], D::Error>
where
    D: Deserializer<'de>,
{
    let slots: Option<Vec<Option<Operator>>> = Option::deserialize(deserializer)?;
    let mut operators = default_operators();
    for (slot, op) in operators
        .iter_mut()
        .zip(slots.unwrap_or_default().into_iter())
    {
        if let Some(op) = op {
            *slot = op;
        }
    }
    Ok(operators)
}

/// Blank instrument: no sound, all operators silent.
pub fn default_instrument() -> Instrument {
    Instrument {
        version: 0,
        note_offset1: 0,
        note_offset2: 0,
        velocity_offset: 0,
        second_voice_detune: 0,
        percussion_key_number: 0,
        is_4op: false,
        is_pseudo_4op: false,
        is_blank: true,
        rhythm_mode: 0,
        fb_conn1_c0: 0,
        fb_conn2_c0: 0,
        operators: default_operators(),
        delay_on_ms: 0,
        delay_off_ms: 0,
    }
}

pub fn decode_instrument(bytes: &[u8; INSTRUMENT_SIZE]) -> Instrument {
    let flags = bytes[OFFSET_FLAGS];
    let mut operators = default_operators();
    for (index, op) in operators.iter_mut().enumerate() {
        let start = OFFSET_OPERATORS + index * OPERATOR_SIZE;
        let mut window = [0u8; OPERATOR_SIZE];
        window.copy_from_slice(&bytes[start..start + OPERATOR_SIZE]);
        *op = decode_operator(&window);
    }

    Instrument {
        version: i32::from_le_bytes(read_array(bytes, OFFSET_VERSION)),
        note_offset1: i16::from_le_bytes(read_array(bytes, OFFSET_NOTE_OFFSET1)),
        note_offset2: i16::from_le_bytes(read_array(bytes, OFFSET_NOTE_OFFSET2)),
        velocity_offset: bytes[OFFSET_VELOCITY_OFFSET] as i8,
        second_voice_detune: bytes[OFFSET_SECOND_VOICE_DETUNE] as i8,
        percussion_key_number: bytes[OFFSET_PERCUSSION_KEY],
        is_4op: flags & FLAG_4OP != 0,
        is_pseudo_4op: flags & FLAG_PSEUDO_4OP != 0,
        is_blank: flags & FLAG_BLANK != 0,
        rhythm_mode: (flags & RHYTHM_MODE_MASK) >> RHYTHM_MODE_SHIFT,
        fb_conn1_c0: bytes[OFFSET_FB_CONN1],
        fb_conn2_c0: bytes[OFFSET_FB_CONN2],
        operators,
        delay_on_ms: u16::from_le_bytes(read_array(bytes, OFFSET_DELAY_ON)),
        delay_off_ms: u16::from_le_bytes(read_array(bytes, OFFSET_DELAY_OFF)),
    }
}

pub fn encode_instrument(inst: &Instrument) -> [u8; INSTRUMENT_SIZE] {
    let mut bytes = [0u8; INSTRUMENT_SIZE];
    write_slice(&mut bytes, OFFSET_VERSION, &inst.version.to_le_bytes());
    write_slice(&mut bytes, OFFSET_NOTE_OFFSET1, &inst.note_offset1.to_le_bytes());
    write_slice(&mut bytes, OFFSET_NOTE_OFFSET2, &inst.note_offset2.to_le_bytes());
    bytes[OFFSET_VELOCITY_OFFSET] = inst.velocity_offset as u8;
    bytes[OFFSET_SECOND_VOICE_DETUNE] = inst.second_voice_detune as u8;
    bytes[OFFSET_PERCUSSION_KEY] = inst.percussion_key_number;
    bytes[OFFSET_FLAGS] = inst.flags();
    bytes[OFFSET_FB_CONN1] = inst.fb_conn1_c0;
    bytes[OFFSET_FB_CONN2] = inst.fb_conn2_c0;
    for (index, op) in inst.operators.iter().enumerate() {
        let start = OFFSET_OPERATORS + index * OPERATOR_SIZE;
        write_slice(&mut bytes, start, &encode_operator(op));
    }
    write_slice(&mut bytes, OFFSET_DELAY_ON, &inst.delay_on_ms.to_le_bytes());
    write_slice(&mut bytes, OFFSET_DELAY_OFF, &inst.delay_off_ms.to_le_bytes());
    bytes
}

fn read_array<const N: usize>(bytes: &[u8; INSTRUMENT_SIZE], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

fn write_slice(bytes: &mut [u8; INSTRUMENT_SIZE], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}
