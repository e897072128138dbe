use serde::{Deserialize, Serialize};

pub const PITCH_BEND_CENTER: u16 = 8192;
pub const PITCH_BEND_MAX: u16 = 16383;

/// Realtime MIDI event addressed to one of the 16 channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealtimeEvent {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    NoteAftertouch {
        channel: u8,
        note: u8,
        pressure: u8,
    },
    ChannelAftertouch {
        channel: u8,
        pressure: u8,
    },
    ControllerChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    /// value 0..16383, 8192 = centre
    PitchBend {
        channel: u8,
        value: u16,
    },
    /// 14-bit bank number (msb << 7 | lsb)
    BankChange {
        channel: u8,
        bank: u16,
    },
}

impl RealtimeEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            RealtimeEvent::NoteOn { channel, .. }
            | RealtimeEvent::NoteOff { channel, .. }
            | RealtimeEvent::NoteAftertouch { channel, .. }
            | RealtimeEvent::ChannelAftertouch { channel, .. }
            | RealtimeEvent::ControllerChange { channel, .. }
            | RealtimeEvent::ProgramChange { channel, .. }
            | RealtimeEvent::PitchBend { channel, .. }
            | RealtimeEvent::BankChange { channel, .. } => channel,
        }
    }

    /// Mask channel and 7-bit fields into their MIDI range, mask the bank
    /// number to 14 bits and clamp pitch bend to `PITCH_BEND_MAX`.
    pub fn sanitized(self) -> Self {
        match self {
            RealtimeEvent::NoteOn {
                channel,
                note,
                velocity,
            } => RealtimeEvent::NoteOn {
                channel: channel & 0x0F,
                note: note & 0x7F,
                velocity: velocity & 0x7F,
            },
            RealtimeEvent::NoteOff { channel, note } => RealtimeEvent::NoteOff {
                channel: channel & 0x0F,
                note: note & 0x7F,
            },
            RealtimeEvent::NoteAftertouch {
                channel,
                note,
                pressure,
            } => RealtimeEvent::NoteAftertouch {
                channel: channel & 0x0F,
                note: note & 0x7F,
                pressure: pressure & 0x7F,
            },
            RealtimeEvent::ChannelAftertouch { channel, pressure } => {
                RealtimeEvent::ChannelAftertouch {
                    channel: channel & 0x0F,
                    pressure: pressure & 0x7F,
                }
            }
            RealtimeEvent::ControllerChange {
                channel,
                controller,
                value,
            } => RealtimeEvent::ControllerChange {
                channel: channel & 0x0F,
                controller: controller & 0x7F,
                value: value & 0x7F,
            },
            RealtimeEvent::ProgramChange { channel, program } => RealtimeEvent::ProgramChange {
                channel: channel & 0x0F,
                program: program & 0x7F,
            },
            RealtimeEvent::PitchBend { channel, value } => RealtimeEvent::PitchBend {
                channel: channel & 0x0F,
                value: value.min(PITCH_BEND_MAX),
            },
            RealtimeEvent::BankChange { channel, bank } => RealtimeEvent::BankChange {
                channel: channel & 0x0F,
                bank: bank & 0x3FFF,
            },
        }
    }
}
