use fmbridge_ports::engine::{EngineError, FmEngine};
use fmbridge_ports::types::{ArenaPtr, HeapView};
use tracing::debug;

const BYTES_PER_SAMPLE: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ArenaIdentity {
    generation: u64,
    base_addr: usize,
    len: usize,
}

impl ArenaIdentity {
    fn of(heap: &HeapView<'_>) -> Self {
        Self {
            generation: heap.generation,
            base_addr: heap.base_addr(),
            len: heap.bytes.len(),
        }
    }
}

/// Engine-side scratch region the native renderer writes i16 samples into.
///
/// The allocation is an arena offset, which stays valid when the arena grows;
/// the typed view over it does not, so it is re-derived from `heap()` on every
/// read and re-validated whenever the arena identity changed.
#[derive(Debug, Default)]
pub struct RenderBuffer {
    alloc: Option<ArenaPtr>,
    capacity_samples: usize,
    view: Option<ArenaIdentity>,
    allocations: u64,
    view_rebuilds: u64,
}

impl RenderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity_samples(&self) -> usize {
        self.capacity_samples
    }

    /// Number of arena allocations made so far.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Number of times the view was rebuilt after the arena moved.
    pub fn view_rebuilds(&self) -> u64 {
        self.view_rebuilds
    }

    /// Grow-only: reallocates when absent or smaller than `samples`.
    pub fn ensure_capacity(
        &mut self,
        engine: &mut dyn FmEngine,
        samples: usize,
    ) -> Result<ArenaPtr, EngineError> {
        if let Some(ptr) = self.alloc {
            if self.capacity_samples >= samples {
                return Ok(ptr);
            }
        }

        self.release(engine);
        let bytes = samples.max(1) * BYTES_PER_SAMPLE;
        let ptr = engine.malloc(bytes).ok_or(EngineError::OutOfMemory(bytes))?;
        debug!(
            samples,
            offset = ptr.offset,
            "render buffer allocated in engine arena"
        );
        self.alloc = Some(ptr);
        self.capacity_samples = samples.max(1);
        self.allocations += 1;
        Ok(ptr)
    }

    /// Typed view over the first `samples` values of the buffer, taken from
    /// the arena as it is right now.
    pub fn view<'h>(
        &mut self,
        heap: HeapView<'h>,
        samples: usize,
    ) -> Result<SampleView<'h>, EngineError> {
        let ptr = self.alloc.ok_or(EngineError::InvalidPointer { offset: 0, len: 0 })?;
        let identity = ArenaIdentity::of(&heap);

        if self.view != Some(identity) {
            if ptr.offset + ptr.len > heap.bytes.len() {
                self.view = None;
                return Err(EngineError::InvalidPointer {
                    offset: ptr.offset,
                    len: ptr.len,
                });
            }
            if self.view.is_some() {
                self.view_rebuilds += 1;
                debug!(
                    generation = identity.generation,
                    "engine arena moved, render buffer view rebuilt"
                );
            }
            self.view = Some(identity);
        }

        let len = (samples.min(self.capacity_samples) * BYTES_PER_SAMPLE).min(ptr.len);
        let start = ptr.offset;
        Ok(SampleView {
            bytes: &heap.bytes[start..start + len],
        })
    }

    pub fn release(&mut self, engine: &mut dyn FmEngine) {
        if let Some(ptr) = self.alloc.take() {
            engine.free(ptr);
        }
        self.capacity_samples = 0;
        self.view = None;
    }
}

/// Little-endian i16 samples borrowed from the engine arena.
#[derive(Clone, Copy, Debug)]
pub struct SampleView<'a> {
    bytes: &'a [u8],
}

impl<'a> SampleView<'a> {
    pub fn len(&self) -> usize {
        self.bytes.len() / BYTES_PER_SAMPLE
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = i16> + 'a {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}
