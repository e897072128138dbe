use fmbridge_ports::types::OPERATOR_SIZE;
use serde::{Deserialize, Serialize};

/// One FM operator: envelope, level and waveform registers.
///
/// Field widths follow the OPL register file; values outside the width are
/// masked on encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Operator {
    /// Amplitude modulation (tremolo).
    pub am: bool,
    pub vibrato: bool,
    /// Envelope holds at the sustain level while the key is down.
    pub sustaining: bool,
    /// Key scale rate.
    pub ksr: bool,
    /// 4 bits.
    pub freq_mult: u8,
    /// 2 bits.
    pub key_scale_level: u8,
    /// 6 bits, 0 = loudest, 63 = silent.
    pub total_level: u8,
    /// 4 bits.
    pub attack: u8,
    /// 4 bits.
    pub decay: u8,
    /// 4 bits.
    pub sustain: u8,
    /// 4 bits.
    pub release: u8,
    /// 3 bits.
    pub waveform: u8,
}

pub const MAX_TOTAL_LEVEL: u8 = 0x3F;

/// Fully attenuated operator used for unused slots.
pub fn default_operator() -> Operator {
    Operator {
        total_level: MAX_TOTAL_LEVEL,
        sustain: 0,
        release: 0x0F,
        ..Operator::default()
    }
}

pub fn decode_operator(bytes: &[u8; OPERATOR_SIZE]) -> Operator {
    let [avekf, ksl_l, atdec, susrel, wave] = *bytes;
    Operator {
        am: avekf & 0x80 != 0,
        vibrato: avekf & 0x40 != 0,
        sustaining: avekf & 0x20 != 0,
        ksr: avekf & 0x10 != 0,
        freq_mult: avekf & 0x0F,
        key_scale_level: (ksl_l >> 6) & 0x03,
        total_level: ksl_l & 0x3F,
        attack: (atdec >> 4) & 0x0F,
        decay: atdec & 0x0F,
        sustain: (susrel >> 4) & 0x0F,
        release: susrel & 0x0F,
        waveform: wave & 0x07,
    }
}

pub fn encode_operator(op: &Operator) -> [u8; OPERATOR_SIZE] {
    let avekf = (op.am as u8) << 7
        | (op.vibrato as u8) << 6
        | (op.sustaining as u8) << 5
        | (op.ksr as u8) << 4
        | (op.freq_mult & 0x0F);
    let ksl_l = (op.key_scale_level & 0x03) << 6 | (op.total_level & 0x3F);
    let atdec = (op.attack & 0x0F) << 4 | (op.decay & 0x0F);
    let susrel = (op.sustain & 0x0F) << 4 | (op.release & 0x0F);
    let wave = op.waveform & 0x07;
    [avekf, ksl_l, atdec, susrel, wave]
}

