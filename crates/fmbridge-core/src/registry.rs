use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type OnceHandler<M> = Box<dyn FnOnce(M) + Send + 'static>;

/// One-shot handlers keyed by message kind.
///
/// Each registration consumes exactly one message of its kind, oldest
/// registration first. A handler is unlinked from the registry before it is
/// invoked, so it can never run twice.
pub struct HandlerRegistry<K, M> {
    next_id: u64,
    slots: HashMap<K, VecDeque<(HandlerId, OnceHandler<M>)>>,
}

impl<K: Eq + Hash + Copy, M> HandlerRegistry<K, M> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            slots: HashMap::new(),
        }
    }

    pub fn once(&mut self, kind: K, handler: impl FnOnce(M) + Send + 'static) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.slots
            .entry(kind)
            .or_default()
            .push_back((id, Box::new(handler)));
        id
    }

    /// Drop a registration that has not fired yet.
    pub fn cancel(&mut self, kind: K, id: HandlerId) -> bool {
        let Some(queue) = self.slots.get_mut(&kind) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|(handler_id, _)| *handler_id != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            self.slots.remove(&kind);
        }
        removed
    }

    /// Deliver `message` to the oldest handler waiting for `kind`.
    /// Returns the message back when nobody is waiting.
    pub fn fire(&mut self, kind: K, message: M) -> Result<(), M> {
        let handler = match self.slots.get_mut(&kind) {
            Some(queue) => {
                let next = queue.pop_front();
                if queue.is_empty() {
                    self.slots.remove(&kind);
                }
                next
            }
            None => None,
        };

        match handler {
            Some((_, handler)) => {
                handler(message);
                Ok(())
            }
            None => Err(message),
        }
    }

    pub fn pending(&self, kind: K) -> usize {
        self.slots.get(&kind).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K: Eq + Hash + Copy, M> Default for HandlerRegistry<K, M> {
    fn default() -> Self {
        Self::new()
    }
}
