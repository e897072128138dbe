use fmbridge_ports::types::{ArenaPtr, HeapView};

const ALIGN: usize = 8;

fn align_up(len: usize) -> usize {
    (len.max(1) + ALIGN - 1) & !(ALIGN - 1)
}

/// Growable byte arena. Growth moves the whole arena to a new allocation and
/// bumps `generation`; offsets handed out earlier stay valid.
#[derive(Debug)]
pub struct Arena {
    bytes: Vec<u8>,
    generation: u64,
    top: usize,
    limit: usize,
    free: Vec<ArenaPtr>,
}

impl Arena {
    pub fn new(initial_bytes: usize, limit_bytes: usize) -> Self {
        let initial = align_up(initial_bytes);
        Self {
            bytes: vec![0; initial],
            generation: 0,
            top: 0,
            limit: limit_bytes.max(initial),
            free: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// First fit from the free list, otherwise bump; grows when full.
    pub fn alloc(&mut self, len: usize) -> Option<ArenaPtr> {
        let size = align_up(len);

        if let Some(idx) = self.free.iter().position(|block| block.len >= size) {
            let block = self.free.remove(idx);
            if block.len > size {
                self.free.push(ArenaPtr {
                    offset: block.offset + size,
                    len: block.len - size,
                });
            }
            self.bytes[block.offset..block.offset + size].fill(0);
            return Some(ArenaPtr {
                offset: block.offset,
                len,
            });
        }

        let end = self.top.checked_add(size)?;
        if end > self.bytes.len() {
            self.grow(end)?;
        }
        let ptr = ArenaPtr {
            offset: self.top,
            len,
        };
        self.top = end;
        Some(ptr)
    }

    /// Unknown or already freed blocks are ignored.
    pub fn free(&mut self, ptr: ArenaPtr) {
        let block = ArenaPtr {
            offset: ptr.offset,
            len: align_up(ptr.len),
        };
        if block.offset + block.len > self.top {
            return;
        }
        let overlaps = self.free.iter().any(|free| {
            block.offset < free.offset + free.len && free.offset < block.offset + block.len
        });
        if overlaps {
            return;
        }

        self.free.push(block);
        self.coalesce();
    }

    pub fn copy_in(&mut self, data: &[u8]) -> Option<ArenaPtr> {
        let ptr = self.alloc(data.len())?;
        self.bytes[ptr.offset..ptr.offset + data.len()].copy_from_slice(data);
        Some(ptr)
    }

    pub fn slice(&self, ptr: ArenaPtr) -> Option<&[u8]> {
        self.bytes.get(ptr.offset..ptr.offset.checked_add(ptr.len)?)
    }

    pub fn slice_mut(&mut self, ptr: ArenaPtr) -> Option<&mut [u8]> {
        self.bytes.get_mut(ptr.offset..ptr.offset.checked_add(ptr.len)?)
    }

    pub fn view(&self) -> HeapView<'_> {
        HeapView {
            bytes: &self.bytes,
            generation: self.generation,
        }
    }

    fn grow(&mut self, min_len: usize) -> Option<()> {
        if min_len > self.limit {
            return None;
        }
        let new_len = (self.bytes.len() * 2).clamp(min_len, self.limit);
        let mut moved = vec![0u8; new_len];
        moved[..self.bytes.len()].copy_from_slice(&self.bytes);
        self.bytes = moved;
        self.generation += 1;
        Some(())
    }

    fn coalesce(&mut self) {
        self.free.sort_by_key(|block| block.offset);
        let mut merged: Vec<ArenaPtr> = Vec::with_capacity(self.free.len());
        for block in self.free.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + last.len == block.offset => last.len += block.len,
                _ => merged.push(block),
            }
        }
        if let Some(last) = merged.last() {
            if last.offset + last.len == self.top {
                self.top = last.offset;
                merged.pop();
            }
        }
        self.free = merged;
    }
}
