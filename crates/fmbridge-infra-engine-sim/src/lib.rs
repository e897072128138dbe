pub mod arena;
pub mod sequence;
pub mod synth;

pub use arena::Arena;
pub use sequence::{Sequence, SequenceError, TimedEvent};

use fmbridge_ports::engine::{
    ChannelAllocMode, Emulator, EngineError, EngineLoader, EngineResult, FmEngine, VolumeModel,
};
use fmbridge_ports::midi::RealtimeEvent;
use fmbridge_ports::settings::AUTO_FOUR_OP_CHANNELS;
use fmbridge_ports::types::{
    ArenaPtr, BankHandle, BankId, HeapView, Program, INSTRUMENT_SIZE, OUTPUT_CHANNELS,
    PROGRAMS_PER_BANK,
};
use synth::Synth;
use tracing::{debug, info, warn};

pub const EMBEDDED_BANK_COUNT: u32 = 75;
pub const MAX_CHIPS: u32 = 100;
pub const FOUR_OP_CHANNELS_PER_CHIP: i32 = 6;
pub const WOPL_MAGIC: &[u8] = b"WOPL3-BANK\0";

const BYTES_PER_FRAME: usize = OUTPUT_CHANNELS * 2;

pub struct SimEngineLoader {
    pub heap_bytes: usize,
    pub heap_limit_bytes: usize,
    /// Hand out a null handle, as a native engine does when it cannot start.
    pub null_handle: bool,
}

impl Default for SimEngineLoader {
    fn default() -> Self {
        Self {
            heap_bytes: 64 * 1024,
            heap_limit_bytes: 64 * 1024 * 1024,
            null_handle: false,
        }
    }
}

impl EngineLoader for SimEngineLoader {
    fn init(&self, sample_rate_hz: u32) -> Option<Box<dyn FmEngine>> {
        if self.null_handle || sample_rate_hz == 0 {
            warn!(sample_rate_hz, "simulated engine refused to start");
            return None;
        }
        Some(Box::new(SimEngine::new(
            sample_rate_hz,
            self.heap_bytes,
            self.heap_limit_bytes,
        )))
    }
}

struct Player {
    data: ArenaPtr,
    sequence: Sequence,
    cursor: usize,
    position: f64,
    ended: bool,
}

impl Player {
    fn new(data: ArenaPtr, sequence: Sequence) -> Self {
        Self {
            data,
            sequence,
            cursor: 0,
            position: 0.0,
            ended: false,
        }
    }

    fn restart(&mut self) {
        self.cursor = 0;
        self.position = 0.0;
        self.ended = false;
    }

    fn dispatch_due(&mut self, synth: &mut Synth) {
        let events = self.sequence.events();
        while let Some(timed) = events.get(self.cursor) {
            if timed.seconds > self.position {
                break;
            }
            synth.handle(timed.event);
            self.cursor += 1;
        }
    }

    fn finished(&self) -> bool {
        self.cursor >= self.sequence.events().len()
            && self.position >= self.sequence.length_seconds()
    }
}

/// Software engine with the native entry-point behaviour: arena-backed
/// render buffers, bank storage and SMF playback.
pub struct SimEngine {
    sample_rate_hz: u32,
    arena: Arena,
    synth: Synth,
    num_chips: u32,
    four_op_channels: i32,
    bank: u32,
    emulator: Emulator,
    bank_data: Option<ArenaPtr>,
    player: Option<Player>,
    loop_enabled: bool,
    tempo: f64,
}

impl SimEngine {
    pub fn new(sample_rate_hz: u32, heap_bytes: usize, heap_limit_bytes: usize) -> Self {
        let num_chips = 1;
        Self {
            sample_rate_hz,
            arena: Arena::new(heap_bytes, heap_limit_bytes),
            synth: Synth::new(sample_rate_hz, num_chips),
            num_chips,
            four_op_channels: AUTO_FOUR_OP_CHANNELS,
            bank: 0,
            emulator: Emulator::default(),
            bank_data: None,
            player: None,
            loop_enabled: false,
            tempo: 1.0,
        }
    }

    pub fn embedded_bank(&self) -> u32 {
        self.bank
    }

    pub fn active_voices(&self) -> usize {
        self.synth.active_voices()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    fn output<'a>(
        arena: &'a mut Arena,
        out: ArenaPtr,
        sample_count: usize,
    ) -> EngineResult<&'a mut [u8]> {
        let needed = sample_count * 2;
        match arena.slice_mut(out) {
            Some(bytes) if bytes.len() >= needed => Ok(&mut bytes[..needed]),
            _ => Err(EngineError::InvalidPointer {
                offset: out.offset,
                len: out.len,
            }),
        }
    }

    fn bank_mut(&mut self, bank: BankHandle, call: &'static str) -> EngineResult<&mut synth::Bank> {
        let idx = (bank.raw() as usize).wrapping_sub(1);
        self.synth
            .banks
            .get_mut(idx)
            .ok_or_else(|| EngineError::status(call, -1, "invalid bank handle"))
    }
}

fn write_frame(frame: &mut [u8], (left, right): (f32, f32)) {
    frame[..2].copy_from_slice(&to_i16(left).to_le_bytes());
    frame[2..4].copy_from_slice(&to_i16(right).to_le_bytes());
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn check_program(program: Program, call: &'static str) -> EngineResult<usize> {
    let idx = program as usize;
    if idx >= PROGRAMS_PER_BANK {
        return Err(EngineError::status(call, -1, "program out of range"));
    }
    Ok(idx)
}

impl FmEngine for SimEngine {
    fn reset(&mut self) {
        self.synth.reset();
    }

    fn reset_realtime(&mut self) {
        self.synth.reset_controllers();
        self.synth.release_all();
    }

    fn panic(&mut self) {
        self.synth.panic();
    }

    fn set_num_chips(&mut self, chips: u32) -> EngineResult {
        if chips == 0 || chips > MAX_CHIPS {
            return Err(EngineError::status(
                "set_num_chips",
                -1,
                format!("chip count must be 1..={MAX_CHIPS}, got {chips}"),
            ));
        }
        self.num_chips = chips;
        self.synth.set_chips(chips);
        if self.four_op_channels > chips as i32 * FOUR_OP_CHANNELS_PER_CHIP {
            self.four_op_channels = AUTO_FOUR_OP_CHANNELS;
        }
        Ok(())
    }

    fn num_chips(&self) -> u32 {
        self.num_chips
    }

    fn set_num_four_op_channels(&mut self, channels: i32) -> EngineResult {
        let max = self.num_chips as i32 * FOUR_OP_CHANNELS_PER_CHIP;
        if channels != AUTO_FOUR_OP_CHANNELS && !(0..=max).contains(&channels) {
            return Err(EngineError::status(
                "set_num_four_op_channels",
                -1,
                format!("four-op channel count must be -1 or 0..={max}, got {channels}"),
            ));
        }
        self.four_op_channels = channels;
        Ok(())
    }

    fn num_four_op_channels(&self) -> i32 {
        self.four_op_channels
    }

    fn set_bank(&mut self, bank: u32) -> EngineResult {
        if bank >= EMBEDDED_BANK_COUNT {
            return Err(EngineError::status(
                "set_bank",
                -1,
                format!("embedded bank {bank} does not exist"),
            ));
        }
        self.bank = bank;
        Ok(())
    }

    fn embedded_bank_count(&self) -> u32 {
        EMBEDDED_BANK_COUNT
    }

    fn set_deep_vibrato(&mut self, enabled: bool) {
        self.synth.deep_vibrato = enabled;
    }

    fn set_deep_tremolo(&mut self, enabled: bool) {
        self.synth.deep_tremolo = enabled;
    }

    fn set_soft_pan(&mut self, enabled: bool) {
        self.synth.soft_pan = enabled;
    }

    fn set_volume_model(&mut self, model: VolumeModel) {
        self.synth.volume_model = model;
    }

    fn set_channel_alloc_mode(&mut self, mode: ChannelAllocMode) {
        self.synth.alloc_mode = mode;
    }

    fn switch_emulator(&mut self, emulator: Emulator) -> EngineResult {
        self.emulator = emulator;
        Ok(())
    }

    fn emulator_name(&self) -> String {
        self.emulator.name().to_string()
    }

    fn version(&self) -> String {
        format!("fmbridge-sim {}", env!("CARGO_PKG_VERSION"))
    }

    fn realtime(&mut self, event: RealtimeEvent) {
        self.synth.handle(event.sanitized());
    }

    fn open_bank_data(&mut self, data: &[u8]) -> EngineResult {
        if !data.starts_with(WOPL_MAGIC) {
            return Err(EngineError::status(
                "open_bank_data",
                -1,
                "not a WOPL3 bank",
            ));
        }
        let ptr = self
            .arena
            .copy_in(data)
            .ok_or(EngineError::OutOfMemory(data.len()))?;
        if let Some(old) = self.bank_data.replace(ptr) {
            self.arena.free(old);
        }
        info!(bytes = data.len(), "bank data stored");
        Ok(())
    }

    fn open_midi_data(&mut self, data: &[u8]) -> EngineResult {
        let sequence = Sequence::parse(data)
            .map_err(|e| EngineError::status("open_midi_data", -1, e.to_string()))?;
        let ptr = self
            .arena
            .copy_in(data)
            .ok_or(EngineError::OutOfMemory(data.len()))?;
        if let Some(old) = self.player.take() {
            self.arena.free(old.data);
        }

        debug!(
            events = sequence.events().len(),
            seconds = sequence.length_seconds(),
            "MIDI data parsed"
        );
        self.synth.panic();
        self.player = Some(Player::new(ptr, sequence));
        Ok(())
    }

    fn generate(&mut self, sample_count: usize, out: ArenaPtr) -> EngineResult<usize> {
        let frames = sample_count / OUTPUT_CHANNELS;
        let bytes = Self::output(&mut self.arena, out, sample_count)?;
        for frame in bytes.chunks_exact_mut(BYTES_PER_FRAME).take(frames) {
            write_frame(frame, self.synth.next_frame());
        }
        Ok(frames * OUTPUT_CHANNELS)
    }

    fn play(&mut self, sample_count: usize, out: ArenaPtr) -> EngineResult<usize> {
        let frames = sample_count / OUTPUT_CHANNELS;
        let step = self.tempo / self.sample_rate_hz as f64;
        let Some(player) = self.player.as_mut() else {
            return Err(EngineError::status("play", -1, "no MIDI data loaded"));
        };
        let bytes = Self::output(&mut self.arena, out, sample_count)?;

        let mut produced = 0;
        for frame in bytes.chunks_exact_mut(BYTES_PER_FRAME).take(frames) {
            player.dispatch_due(&mut self.synth);
            if player.finished() {
                if !self.loop_enabled {
                    player.ended = true;
                    break;
                }
                player.restart();
                self.synth.release_all();
                player.dispatch_due(&mut self.synth);
            }
            write_frame(frame, self.synth.next_frame());
            player.position += step;
            produced += 1;
        }
        Ok(produced * OUTPUT_CHANNELS)
    }

    fn position_tell(&self) -> f64 {
        self.player.as_ref().map_or(0.0, |p| p.position)
    }

    /// Silences voices, then replays every non-note event before the target
    /// so controllers and programs match the new position.
    fn position_seek(&mut self, seconds: f64) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        let target = seconds.clamp(0.0, player.sequence.length_seconds());
        self.synth.panic();
        player.restart();

        let events = player.sequence.events();
        while let Some(timed) = events.get(player.cursor) {
            if timed.seconds >= target {
                break;
            }
            match timed.event {
                RealtimeEvent::NoteOn { .. }
                | RealtimeEvent::NoteOff { .. }
                | RealtimeEvent::NoteAftertouch { .. } => {}
                event => self.synth.handle(event),
            }
            player.cursor += 1;
        }
        player.position = target;
    }

    fn position_rewind(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.restart();
        }
        self.synth.panic();
        self.synth.reset_controllers();
    }

    fn total_time_length(&self) -> f64 {
        self.player
            .as_ref()
            .map_or(0.0, |p| p.sequence.length_seconds())
    }

    fn at_end(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.ended)
    }

    fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    fn set_tempo(&mut self, tempo: f64) {
        if tempo.is_finite() && tempo > 0.0 {
            self.tempo = tempo;
        }
    }

    fn get_bank(&mut self, id: BankId, create: bool) -> EngineResult<BankHandle> {
        let idx = match self.synth.bank_index(id) {
            Some(idx) => idx,
            None if create => self.synth.create_bank(id),
            None => {
                return Err(EngineError::status(
                    "get_bank",
                    -1,
                    format!("bank {id} does not exist"),
                ))
            }
        };
        Ok(BankHandle::new(idx as u64 + 1))
    }

    fn get_instrument(
        &mut self,
        bank: BankHandle,
        program: Program,
        out: &mut [u8; INSTRUMENT_SIZE],
    ) -> EngineResult {
        let idx = check_program(program, "get_instrument")?;
        let bank = self.bank_mut(bank, "get_instrument")?;
        *out = bank.instruments[idx];
        Ok(())
    }

    fn set_instrument(
        &mut self,
        bank: BankHandle,
        program: Program,
        data: &[u8; INSTRUMENT_SIZE],
    ) -> EngineResult {
        let idx = check_program(program, "set_instrument")?;
        let bank = self.bank_mut(bank, "set_instrument")?;
        bank.instruments[idx] = *data;
        Ok(())
    }

    fn malloc(&mut self, bytes: usize) -> Option<ArenaPtr> {
        self.arena.alloc(bytes)
    }

    fn free(&mut self, ptr: ArenaPtr) {
        self.arena.free(ptr);
    }

    fn heap(&self) -> HeapView<'_> {
        self.arena.view()
    }
}
