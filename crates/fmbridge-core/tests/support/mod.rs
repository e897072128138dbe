#![allow(dead_code)]

use fmbridge_ports::engine::{
    ChannelAllocMode, Emulator, EngineError, EngineLoader, EngineResult, FmEngine, VolumeModel,
};
use fmbridge_ports::midi::RealtimeEvent;
use fmbridge_ports::types::{ArenaPtr, BankHandle, BankId, HeapView, Program, INSTRUMENT_SIZE};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const EMBEDDED_BANKS: u32 = 75;
const INITIAL_HEAP: usize = 4096;

/// Sample the mock writes at index `i` of every block.
pub fn pattern(i: usize) -> i16 {
    ((i % 64) as i16 + 1) * 256
}

pub fn pattern_f32(i: usize) -> f32 {
    pattern(i) as f32 / 32768.0
}

#[derive(Default)]
pub struct MockState {
    pub calls: Vec<String>,
    pub fail_get_bank: bool,
    pub fail_bank_data: bool,
    pub fail_render: bool,
    /// `play` reports the end of the file on this call (1-based).
    pub end_after_plays: Option<usize>,
    pub plays: usize,
    pub at_end: bool,
    pub grow_heap_on_next_render: bool,
    pub mallocs: usize,
    pub frees: usize,
    pub instruments: HashMap<(u64, Program), [u8; INSTRUMENT_SIZE]>,
    pub dropped: bool,
}

/// Shared view of a mock engine's call log and failure knobs.
#[derive(Clone, Default)]
pub struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.0.lock())
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.0.lock().calls.clear();
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.0.lock().calls.push(call);
    }
}

pub struct MockLoader {
    pub handle: MockHandle,
    pub null_handle: bool,
}

impl MockLoader {
    pub fn new(handle: MockHandle) -> Self {
        Self {
            handle,
            null_handle: false,
        }
    }

    pub fn failing(handle: MockHandle) -> Self {
        Self {
            handle,
            null_handle: true,
        }
    }
}

impl EngineLoader for MockLoader {
    fn init(&self, sample_rate_hz: u32) -> Option<Box<dyn FmEngine>> {
        self.handle.log(format!("init({sample_rate_hz})"));
        if self.null_handle {
            return None;
        }
        Some(Box::new(MockEngine::new(self.handle.clone())))
    }
}

pub struct MockEngine {
    shared: MockHandle,
    heap: Vec<u8>,
    generation: u64,
    next_free: usize,
    banks: HashMap<BankId, u64>,
    num_chips: u32,
    four_op: i32,
    emulator: Emulator,
}

impl MockEngine {
    pub fn new(shared: MockHandle) -> Self {
        Self {
            shared,
            heap: vec![0; INITIAL_HEAP],
            generation: 0,
            next_free: 0,
            banks: HashMap::new(),
            num_chips: 1,
            four_op: -1,
            emulator: Emulator::Nuked,
        }
    }

    fn grow(&mut self, min_len: usize) {
        let mut bigger = vec![0u8; min_len.max(self.heap.len() * 2)];
        bigger[..self.heap.len()].copy_from_slice(&self.heap);
        self.heap = bigger;
        self.generation += 1;
    }

    fn write_block(&mut self, count: usize, out: ArenaPtr) -> EngineResult<usize> {
        if self.shared.with(|s| s.fail_render) {
            return Err(EngineError::status("generate", -3, "emulator fault"));
        }
        if self.shared.with(|s| std::mem::take(&mut s.grow_heap_on_next_render)) {
            let len = self.heap.len() * 2;
            self.grow(len);
        }
        if out.offset + count * 2 > self.heap.len() || count * 2 > out.len {
            return Err(EngineError::InvalidPointer {
                offset: out.offset,
                len: out.len,
            });
        }
        for i in 0..count {
            let bytes = pattern(i).to_le_bytes();
            let at = out.offset + i * 2;
            self.heap[at..at + 2].copy_from_slice(&bytes);
        }
        Ok(count)
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.shared.with(|s| s.dropped = true);
        self.shared.log("close".to_string());
    }
}

impl FmEngine for MockEngine {
    fn reset(&mut self) {
        self.shared.log("reset".to_string());
    }

    fn reset_realtime(&mut self) {
        self.shared.log("reset_realtime".to_string());
    }

    fn panic(&mut self) {
        self.shared.log("panic".to_string());
    }

    fn set_num_chips(&mut self, chips: u32) -> EngineResult {
        self.shared.log(format!("set_num_chips({chips})"));
        if chips == 0 {
            return Err(EngineError::status("set_num_chips", -1, "chip count must be positive"));
        }
        self.num_chips = chips;
        Ok(())
    }

    fn num_chips(&self) -> u32 {
        self.num_chips
    }

    fn set_num_four_op_channels(&mut self, channels: i32) -> EngineResult {
        self.shared.log(format!("set_num_four_op_channels({channels})"));
        self.four_op = channels;
        Ok(())
    }

    fn num_four_op_channels(&self) -> i32 {
        self.four_op
    }

    fn set_bank(&mut self, bank: u32) -> EngineResult {
        self.shared.log(format!("set_bank({bank})"));
        if bank >= EMBEDDED_BANKS {
            return Err(EngineError::status("set_bank", -1, "embedded bank is out of range"));
        }
        Ok(())
    }

    fn embedded_bank_count(&self) -> u32 {
        EMBEDDED_BANKS
    }

    fn set_deep_vibrato(&mut self, enabled: bool) {
        self.shared.log(format!("set_deep_vibrato({enabled})"));
    }

    fn set_deep_tremolo(&mut self, enabled: bool) {
        self.shared.log(format!("set_deep_tremolo({enabled})"));
    }

    fn set_soft_pan(&mut self, enabled: bool) {
        self.shared.log(format!("set_soft_pan({enabled})"));
    }

    fn set_volume_model(&mut self, model: VolumeModel) {
        self.shared.log(format!("set_volume_model({model:?})"));
    }

    fn set_channel_alloc_mode(&mut self, mode: ChannelAllocMode) {
        self.shared.log(format!("set_channel_alloc_mode({mode:?})"));
    }

    fn switch_emulator(&mut self, emulator: Emulator) -> EngineResult {
        self.shared.log(format!("switch_emulator({emulator:?})"));
        if emulator == Emulator::Java {
            return Err(EngineError::status("switch_emulator", -1, "emulator not built in"));
        }
        self.emulator = emulator;
        Ok(())
    }

    fn emulator_name(&self) -> String {
        self.emulator.name().to_string()
    }

    fn version(&self) -> String {
        "mock-1.0".to_string()
    }

    fn realtime(&mut self, event: RealtimeEvent) {
        self.shared.log(format!("realtime({event:?})"));
    }

    fn open_bank_data(&mut self, data: &[u8]) -> EngineResult {
        self.shared.log(format!("open_bank_data({})", data.len()));
        if self.shared.with(|s| s.fail_bank_data) {
            return Err(EngineError::status("open_bank_data", -1, "bad bank data"));
        }
        Ok(())
    }

    fn open_midi_data(&mut self, data: &[u8]) -> EngineResult {
        self.shared.log(format!("open_midi_data({})", data.len()));
        if data.is_empty() {
            return Err(EngineError::status("open_midi_data", -1, "empty MIDI data"));
        }
        self.shared.with(|s| {
            s.plays = 0;
            s.at_end = false;
        });
        Ok(())
    }

    fn generate(&mut self, sample_count: usize, out: ArenaPtr) -> EngineResult<usize> {
        self.shared.log(format!("generate({sample_count})"));
        self.write_block(sample_count, out)
    }

    fn play(&mut self, sample_count: usize, out: ArenaPtr) -> EngineResult<usize> {
        self.shared.log(format!("play({sample_count})"));
        let ends_now = self.shared.with(|s| {
            s.plays += 1;
            if s.end_after_plays == Some(s.plays) {
                s.at_end = true;
                true
            } else {
                false
            }
        });
        let count = if ends_now { sample_count / 2 } else { sample_count };
        self.write_block(count, out)
    }

    fn position_tell(&self) -> f64 {
        self.shared.with(|s| s.plays as f64 * 0.01)
    }

    fn position_seek(&mut self, seconds: f64) {
        self.shared.log(format!("position_seek({seconds})"));
    }

    fn position_rewind(&mut self) {
        self.shared.log("position_rewind".to_string());
        self.shared.with(|s| {
            s.plays = 0;
            s.at_end = false;
        });
    }

    fn total_time_length(&self) -> f64 {
        2.5
    }

    fn at_end(&self) -> bool {
        self.shared.with(|s| s.at_end)
    }

    fn set_loop_enabled(&mut self, enabled: bool) {
        self.shared.log(format!("set_loop_enabled({enabled})"));
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.shared.log(format!("set_tempo({tempo})"));
    }

    fn get_bank(&mut self, id: BankId, create: bool) -> EngineResult<BankHandle> {
        self.shared.log(format!("get_bank({id}, {create})"));
        if self.shared.with(|s| s.fail_get_bank) {
            return Err(EngineError::status("get_bank", -1, "bank not found"));
        }
        let next = self.banks.len() as u64 + 1;
        let raw = *self.banks.entry(id).or_insert(next);
        Ok(BankHandle::new(raw))
    }

    fn get_instrument(
        &mut self,
        bank: BankHandle,
        program: Program,
        out: &mut [u8; INSTRUMENT_SIZE],
    ) -> EngineResult {
        self.shared.log(format!("get_instrument({}, {program})", bank.raw()));
        let stored = self
            .shared
            .with(|s| s.instruments.get(&(bank.raw(), program)).copied());
        *out = stored.unwrap_or([0; INSTRUMENT_SIZE]);
        Ok(())
    }

    fn set_instrument(
        &mut self,
        bank: BankHandle,
        program: Program,
        data: &[u8; INSTRUMENT_SIZE],
    ) -> EngineResult {
        self.shared.log(format!("set_instrument({}, {program})", bank.raw()));
        self.shared
            .with(|s| s.instruments.insert((bank.raw(), program), *data));
        Ok(())
    }

    fn malloc(&mut self, bytes: usize) -> Option<ArenaPtr> {
        self.shared.log(format!("malloc({bytes})"));
        let offset = self.next_free;
        if offset + bytes > self.heap.len() {
            self.grow(offset + bytes);
        }
        self.next_free += bytes;
        self.shared.with(|s| s.mallocs += 1);
        Some(ArenaPtr { offset, len: bytes })
    }

    fn free(&mut self, ptr: ArenaPtr) {
        self.shared.log(format!("free({})", ptr.offset));
        self.shared.with(|s| s.frees += 1);
    }

    fn heap(&self) -> HeapView<'_> {
        HeapView {
            bytes: &self.heap,
            generation: self.generation,
        }
    }
}
