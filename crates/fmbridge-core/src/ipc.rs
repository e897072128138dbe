use crate::playback::PlaybackMode;
use fmbridge_domain_codec::Instrument;
use fmbridge_ports::engine::Emulator;
use fmbridge_ports::midi::RealtimeEvent;
use fmbridge_ports::settings::{SettingsPatch, SynthSettings};
use fmbridge_ports::types::{BankId, Program};
use serde::{Deserialize, Serialize};

/// Control path -> render path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    NoteAftertouch { channel: u8, note: u8, pressure: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    ControllerChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    PitchBend { channel: u8, value: u16 },
    BankChange { channel: u8, bank: u16 },
    Panic,
    ResetRealtime,
    Reset,
    Configure { settings: SettingsPatch },
    LoadBank { data: Vec<u8> },
    SetBank { bank: u32 },
    GetInstrument { bank_id: BankId, program: Program },
    SetInstrument { bank_id: BankId, program: Program, instrument: Instrument },
    SwitchEmulator { emulator: Emulator },
    GetVersion,
    GetState,
    LoadMidi { data: Vec<u8> },
    Play,
    Stop,
    Seek { seconds: f64 },
    SetLoop { enabled: bool },
    SetTempo { tempo: f64 },
}

impl Request {
    /// Response tag the render side answers with, `None` for fire-and-forget.
    pub fn response_kind(&self) -> Option<ResponseKind> {
        match self {
            Request::LoadBank { .. } => Some(ResponseKind::LoadBank),
            Request::SetBank { .. } => Some(ResponseKind::SetBank),
            Request::GetInstrument { .. } => Some(ResponseKind::GetInstrument),
            Request::SetInstrument { .. } => Some(ResponseKind::SetInstrument),
            Request::SwitchEmulator { .. } => Some(ResponseKind::SwitchEmulator),
            Request::GetVersion => Some(ResponseKind::GetVersion),
            Request::GetState => Some(ResponseKind::GetState),
            Request::LoadMidi { .. } => Some(ResponseKind::LoadMidi),
            _ => None,
        }
    }

    pub fn as_realtime(&self) -> Option<RealtimeEvent> {
        let event = match *self {
            Request::NoteOn {
                channel,
                note,
                velocity,
            } => RealtimeEvent::NoteOn {
                channel,
                note,
                velocity,
            },
            Request::NoteOff { channel, note } => RealtimeEvent::NoteOff { channel, note },
            Request::NoteAftertouch {
                channel,
                note,
                pressure,
            } => RealtimeEvent::NoteAftertouch {
                channel,
                note,
                pressure,
            },
            Request::ChannelAftertouch { channel, pressure } => {
                RealtimeEvent::ChannelAftertouch { channel, pressure }
            }
            Request::ControllerChange {
                channel,
                controller,
                value,
            } => RealtimeEvent::ControllerChange {
                channel,
                controller,
                value,
            },
            Request::ProgramChange { channel, program } => {
                RealtimeEvent::ProgramChange { channel, program }
            }
            Request::PitchBend { channel, value } => RealtimeEvent::PitchBend { channel, value },
            Request::BankChange { channel, bank } => RealtimeEvent::BankChange { channel, bank },
            _ => return None,
        };
        Some(event)
    }
}

impl From<RealtimeEvent> for Request {
    fn from(event: RealtimeEvent) -> Self {
        match event {
            RealtimeEvent::NoteOn {
                channel,
                note,
                velocity,
            } => Request::NoteOn {
                channel,
                note,
                velocity,
            },
            RealtimeEvent::NoteOff { channel, note } => Request::NoteOff { channel, note },
            RealtimeEvent::NoteAftertouch {
                channel,
                note,
                pressure,
            } => Request::NoteAftertouch {
                channel,
                note,
                pressure,
            },
            RealtimeEvent::ChannelAftertouch { channel, pressure } => {
                Request::ChannelAftertouch { channel, pressure }
            }
            RealtimeEvent::ControllerChange {
                channel,
                controller,
                value,
            } => Request::ControllerChange {
                channel,
                controller,
                value,
            },
            RealtimeEvent::ProgramChange { channel, program } => {
                Request::ProgramChange { channel, program }
            }
            RealtimeEvent::PitchBend { channel, value } => Request::PitchBend { channel, value },
            RealtimeEvent::BankChange { channel, bank } => Request::BankChange { channel, bank },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    Ready,
    Error,
    LoadBank,
    SetBank,
    GetInstrument,
    SetInstrument,
    SwitchEmulator,
    GetVersion,
    GetState,
    LoadMidi,
    PlaybackEnded,
    Diagnostic,
}

impl ResponseKind {
    /// Unsolicited messages the render side emits on its own.
    pub fn is_notification(self) -> bool {
        matches!(self, ResponseKind::PlaybackEnded | ResponseKind::Diagnostic)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadyInfo {
    pub sample_rate_hz: u32,
    pub engine_version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub bridge: String,
    pub engine: String,
    pub emulator: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub sample_rate_hz: u32,
    pub mode: PlaybackMode,
    pub settings: SynthSettings,
    pub midi_loaded: bool,
    pub position_seconds: f64,
    pub total_seconds: f64,
    pub at_end: bool,
    pub emulator: String,
}

/// Render path -> control path. Answers reuse the request's tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Response {
    Ready(ReadyInfo),
    Error {
        message: String,
    },
    LoadBank {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SetBank {
        success: bool,
        bank: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    GetInstrument {
        success: bool,
        bank_id: BankId,
        program: Program,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instrument: Option<Instrument>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SetInstrument {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SwitchEmulator {
        success: bool,
        emulator: Emulator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    GetVersion(VersionInfo),
    GetState(StateSnapshot),
    LoadMidi {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PlaybackEnded,
    Diagnostic {
        message: String,
    },
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Ready(_) => ResponseKind::Ready,
            Response::Error { .. } => ResponseKind::Error,
            Response::LoadBank { .. } => ResponseKind::LoadBank,
            Response::SetBank { .. } => ResponseKind::SetBank,
            Response::GetInstrument { .. } => ResponseKind::GetInstrument,
            Response::SetInstrument { .. } => ResponseKind::SetInstrument,
            Response::SwitchEmulator { .. } => ResponseKind::SwitchEmulator,
            Response::GetVersion(_) => ResponseKind::GetVersion,
            Response::GetState(_) => ResponseKind::GetState,
            Response::LoadMidi { .. } => ResponseKind::LoadMidi,
            Response::PlaybackEnded => ResponseKind::PlaybackEnded,
            Response::Diagnostic { .. } => ResponseKind::Diagnostic,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Response::Error { message } => Some(message),
            Response::LoadBank { error, .. }
            | Response::SetBank { error, .. }
            | Response::GetInstrument { error, .. }
            | Response::SetInstrument { error, .. }
            | Response::SwitchEmulator { error, .. }
            | Response::LoadMidi { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}

/// Notification surfaced to the control side outside any request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    PlaybackEnded,
    Diagnostic { message: String },
}
