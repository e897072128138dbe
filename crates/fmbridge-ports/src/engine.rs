use crate::midi::RealtimeEvent;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{call} failed with status {status}: {message}")]
    Status {
        call: &'static str,
        status: i32,
        message: String,
    },
    #[error("engine arena exhausted: {0} bytes requested")]
    OutOfMemory(usize),
    #[error("arena pointer out of bounds: offset {offset}, len {len}")]
    InvalidPointer { offset: usize, len: usize },
}

impl EngineError {
    pub fn status(call: &'static str, status: i32, message: impl Into<String>) -> Self {
        EngineError::Status {
            call,
            status,
            message: message.into(),
        }
    }
}

pub type EngineResult<T = ()> = Result<T, EngineError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emulator {
    #[default]
    Nuked,
    Nuked174,
    Dosbox,
    Opal,
    Java,
    Esfmu,
    MameOpl2,
    YmfmOpl2,
    YmfmOpl3,
}

impl Emulator {
    pub fn name(self) -> &'static str {
        match self {
            Emulator::Nuked => "Nuked OPL3 (v 1.8)",
            Emulator::Nuked174 => "Nuked OPL3 (v 1.7.4)",
            Emulator::Dosbox => "DOSBox",
            Emulator::Opal => "Opal",
            Emulator::Java => "Java OPL3",
            Emulator::Esfmu => "ESFMu",
            Emulator::MameOpl2 => "MAME OPL2",
            Emulator::YmfmOpl2 => "YMFM OPL2",
            Emulator::YmfmOpl3 => "YMFM OPL3",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeModel {
    #[default]
    Auto,
    Generic,
    NativeOpl3,
    Dmx,
    Apogee,
    Win9x,
    DmxFixed,
    ApogeeFixed,
    Ail,
    Win9xGenericFm,
    Hmi,
    HmiOld,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelAllocMode {
    #[default]
    Auto,
    OffDelay,
    SameInst,
    AnyReleased,
}

/// Acquires an engine instance. `None` is the native "null handle".
pub trait EngineLoader: Send + Sync {
    fn init(&self, sample_rate_hz: u32) -> Option<Box<dyn FmEngine>>;
}

/// Entry-point table of the external FM synthesis engine.
///
/// Thread model:
/// - every call comes from the single render context that owns the engine
/// - calls are synchronous and expected to be fast at audio-rate block sizes
/// - dropping the engine releases the native handle
///
/// `generate`/`play` write `sample_count` interleaved stereo i16 samples into
/// an arena allocation. Any call that allocates (bank/MIDI loading, `malloc`)
/// may reallocate the arena, so callers must re-read `heap()` afterwards.
pub trait FmEngine: Send {
    fn reset(&mut self);
    /// Lightweight reset of realtime state (controllers, notes); realtime-safe.
    fn reset_realtime(&mut self);
    /// Silence every voice.
    fn panic(&mut self);

    fn set_num_chips(&mut self, chips: u32) -> EngineResult;
    fn num_chips(&self) -> u32;
    /// -1 selects the automatic count.
    fn set_num_four_op_channels(&mut self, channels: i32) -> EngineResult;
    fn num_four_op_channels(&self) -> i32;
    fn set_bank(&mut self, bank: u32) -> EngineResult;
    fn embedded_bank_count(&self) -> u32;
    fn set_deep_vibrato(&mut self, enabled: bool);
    fn set_deep_tremolo(&mut self, enabled: bool);
    fn set_soft_pan(&mut self, enabled: bool);
    fn set_volume_model(&mut self, model: VolumeModel);
    fn set_channel_alloc_mode(&mut self, mode: ChannelAllocMode);
    fn switch_emulator(&mut self, emulator: Emulator) -> EngineResult;
    fn emulator_name(&self) -> String;
    fn version(&self) -> String;

    fn realtime(&mut self, event: RealtimeEvent);

    fn open_bank_data(&mut self, data: &[u8]) -> EngineResult;
    fn open_midi_data(&mut self, data: &[u8]) -> EngineResult;

    /// Render from realtime state only.
    fn generate(&mut self, sample_count: usize, out: ArenaPtr) -> EngineResult<usize>;
    /// Advance the loaded MIDI file; returns the number of samples produced,
    /// which is lower than `sample_count` when the file ended mid-block.
    fn play(&mut self, sample_count: usize, out: ArenaPtr) -> EngineResult<usize>;

    fn position_tell(&self) -> f64;
    fn position_seek(&mut self, seconds: f64);
    fn position_rewind(&mut self);
    fn total_time_length(&self) -> f64;
    fn at_end(&self) -> bool;
    fn set_loop_enabled(&mut self, enabled: bool);
    fn set_tempo(&mut self, tempo: f64);

    fn get_bank(&mut self, id: BankId, create: bool) -> EngineResult<BankHandle>;
    fn get_instrument(
        &mut self,
        bank: BankHandle,
        program: Program,
        out: &mut [u8; INSTRUMENT_SIZE],
    ) -> EngineResult;
    fn set_instrument(
        &mut self,
        bank: BankHandle,
        program: Program,
        data: &[u8; INSTRUMENT_SIZE],
    ) -> EngineResult;

    fn malloc(&mut self, bytes: usize) -> Option<ArenaPtr>;
    fn free(&mut self, ptr: ArenaPtr);
    fn heap(&self) -> HeapView<'_>;
}
