//! Content-addressed byte-string store.
//!
//! Every textual value the shell touches (register contents, labels, paths,
//! committed lines) lives here exactly once. Callers hold a [`Handle`], a
//! small copyable ticket made of an arena index plus a generation counter.
//! Two handles compare equal if and only if they name the same live value,
//! which (because content is deduplicated) means equal bytes.
//!
//! Lifetime is managed explicitly: values are created [`Liveness::Temporary`]
//! and are dropped by the next [`Interner::sweep_with_roots`] unless they are
//! marked [`Liveness::Persistent`] or named as a root. A swept handle is
//! never resurrected: its generation no longer matches its slot.

use ahash::{AHashSet, RandomState};
use std::hash::BuildHasher;

const MIN_CAPACITY: usize = 8;

/// Opaque, generation-checked reference to an interned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

/// Reclamation class of an interned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Reclaimed by the next sweep unless passed in as a root.
    Temporary,
    /// Never reclaimed by a sweep.
    Persistent,
}

struct Value {
    bytes: Box<[u8]>,
    hash: u64,
    liveness: Liveness,
}

struct Slot {
    generation: u32,
    value: Option<Value>,
}

/// Deduplicating string store backed by an open-addressing table.
///
/// Table buckets hold handles; a bucket whose handle went stale after a sweep
/// acts as a tombstone. Lookups probe past tombstones, inserts may reuse them,
/// and they are only dropped when the table is rebuilt on resize.
pub struct Interner {
    hasher: RandomState,
    slots: Vec<Slot>,
    free: Vec<u32>,
    table: Vec<Option<Handle>>,
    live: usize,
    occupied: usize,
    empty: Handle,
}

impl Interner {
    /// An interner holding only the persistent empty string.
    pub fn new() -> Self {
        let mut interner = Self {
            hasher: RandomState::new(),
            slots: Vec::new(),
            free: Vec::new(),
            table: Vec::new(),
            live: 0,
            occupied: 0,
            empty: Handle {
                index: 0,
                generation: 0,
            },
        };
        let empty = interner.intern(b"");
        interner.mark_persistent(empty);
        interner.empty = empty;
        interner
    }

    /// The persistent empty string.
    pub fn empty(&self) -> Handle {
        self.empty
    }

    /// Returns the live handle for `bytes`, allocating one if none exists.
    ///
    /// A freshly allocated value starts out temporary; an existing value
    /// keeps whatever liveness it already had.
    pub fn intern(&mut self, bytes: &[u8]) -> Handle {
        let hash = self.hasher.hash_one(bytes);
        if let Some(handle) = self.lookup(bytes, hash) {
            return handle;
        }

        if (self.occupied + 1) * 5 > self.table.len() * 4 {
            let capacity = if (self.live + 1) * 5 > self.table.len() * 4 {
                (self.table.len() * 2).max(MIN_CAPACITY)
            } else {
                // Only tombstones pushed us over; rebuild in place.
                self.table.len()
            };
            self.resize(capacity);
        }

        let handle = self.allocate(bytes, hash);
        let mask = self.table.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            match self.table[index] {
                None => {
                    self.occupied += 1;
                    break;
                }
                Some(existing) if !self.is_live(existing) => break,
                Some(_) => index = (index + 1) & mask,
            }
        }
        self.table[index] = Some(handle);
        self.live += 1;
        handle
    }

    fn lookup(&self, bytes: &[u8], hash: u64) -> Option<Handle> {
        if self.table.is_empty() {
            return None;
        }
        let mask = self.table.len() - 1;
        let mut index = hash as usize & mask;
        for _ in 0..self.table.len() {
            let handle = self.table[index]?;
            if let Some(value) = self.value(handle) {
                if value.hash == hash && *value.bytes == *bytes {
                    return Some(handle);
                }
            }
            index = (index + 1) & mask;
        }
        None
    }

    fn allocate(&mut self, bytes: &[u8], hash: u64) -> Handle {
        let mut owned = Vec::new();
        if owned.try_reserve_exact(bytes.len()).is_err() {
            out_of_memory();
        }
        owned.extend_from_slice(bytes);
        let value = Value {
            bytes: owned.into_boxed_slice(),
            hash,
            liveness: Liveness::Temporary,
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        if self.slots.try_reserve(1).is_err() {
            out_of_memory();
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    fn resize(&mut self, capacity: usize) {
        let mut table: Vec<Option<Handle>> = Vec::new();
        if table.try_reserve_exact(capacity).is_err() {
            out_of_memory();
        }
        table.resize(capacity, None);

        let mask = capacity - 1;
        for handle in self.table.iter().flatten() {
            let Some(value) = self.value(*handle) else {
                continue;
            };
            let mut index = value.hash as usize & mask;
            while table[index].is_some() {
                index = (index + 1) & mask;
            }
            table[index] = Some(*handle);
        }

        tracing::trace!(from = self.table.len(), to = capacity, live = self.live, "interner resized");
        self.table = table;
        self.occupied = self.live;
    }

    fn value(&self, handle: Handle) -> Option<&Value> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    fn value_mut(&mut self, handle: Handle) -> Option<&mut Value> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Whether `handle` still names a value (it has not been swept).
    pub fn is_live(&self, handle: Handle) -> bool {
        self.value(handle).is_some()
    }

    /// Content of a live handle, or `None` once it has been swept.
    pub fn get(&self, handle: Handle) -> Option<&[u8]> {
        self.value(handle).map(|value| &*value.bytes)
    }

    /// Content of `handle`. A stale handle reads as the empty string.
    pub fn bytes(&self, handle: Handle) -> &[u8] {
        match self.get(handle) {
            Some(bytes) => bytes,
            None => {
                tracing::error!(?handle, "read through a swept handle");
                &[]
            }
        }
    }

    /// Lossy UTF-8 rendering, for diagnostics and display.
    pub fn display(&self, handle: Handle) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.bytes(handle))
    }

    /// Length in bytes; 0 for a stale handle.
    pub fn len(&self, handle: Handle) -> usize {
        self.bytes(handle).len()
    }

    /// Reclamation class of `handle`, or `None` once it has been swept.
    pub fn liveness(&self, handle: Handle) -> Option<Liveness> {
        self.value(handle).map(|value| value.liveness)
    }

    /// Lets the next sweep reclaim `handle`. The empty string stays persistent.
    pub fn mark_temporary(&mut self, handle: Handle) {
        if handle == self.empty {
            return;
        }
        if let Some(value) = self.value_mut(handle) {
            value.liveness = Liveness::Temporary;
        }
    }

    /// Exempts `handle` from every future sweep.
    pub fn mark_persistent(&mut self, handle: Handle) {
        if let Some(value) = self.value_mut(handle) {
            value.liveness = Liveness::Persistent;
        }
    }

    /// Number of live values.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of table buckets.
    pub fn capacity(&self) -> usize {
        self.table.len()
    }

    /// Reclaims every temporary value. Returns how many were freed.
    pub fn sweep(&mut self) -> usize {
        self.sweep_with_roots(std::iter::empty())
    }

    /// Reclaims every temporary value not named in `roots`.
    ///
    /// Persistent values always survive. Afterwards the table shrinks while
    /// fewer than a quarter of its buckets would be live, down to the minimum
    /// capacity.
    pub fn sweep_with_roots<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = Handle>,
    {
        let roots: AHashSet<Handle> = roots.into_iter().collect();
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(value) = &slot.value else {
                continue;
            };
            if value.liveness == Liveness::Persistent {
                continue;
            }
            let handle = Handle {
                index: index as u32,
                generation: slot.generation,
            };
            if roots.contains(&handle) {
                continue;
            }
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            freed += 1;
        }
        self.live -= freed;

        let mut capacity = self.table.len();
        while capacity > MIN_CAPACITY && self.live * 4 < capacity {
            capacity /= 2;
        }
        if capacity != self.table.len() {
            self.resize(capacity);
        }

        tracing::trace!(freed, live = self.live, capacity = self.table.len(), "interner swept");
        freed
    }

    /// Interns the concatenation of `a` and `b`.
    pub fn concat(&mut self, a: Handle, b: Handle) -> Handle {
        let (left, right) = (self.bytes(a), self.bytes(b));
        let mut joined = Vec::new();
        if joined.try_reserve_exact(left.len() + right.len()).is_err() {
            out_of_memory();
        }
        joined.extend_from_slice(left);
        joined.extend_from_slice(right);
        self.intern(&joined)
    }

    /// Interns `handle` with `byte` inserted at `pos`, clamped to the length.
    pub fn insert_at(&mut self, handle: Handle, byte: u8, pos: usize) -> Handle {
        let source = self.bytes(handle);
        let pos = pos.min(source.len());
        let mut edited = Vec::new();
        if edited.try_reserve_exact(source.len() + 1).is_err() {
            out_of_memory();
        }
        edited.extend_from_slice(&source[..pos]);
        edited.push(byte);
        edited.extend_from_slice(&source[pos..]);
        self.intern(&edited)
    }

    /// Interns `handle` with the byte at `pos` removed. Removing at or past
    /// the end returns `handle` itself.
    pub fn remove_at(&mut self, handle: Handle, pos: usize) -> Handle {
        let source = self.bytes(handle);
        if pos >= source.len() {
            return handle;
        }
        let mut edited = Vec::new();
        if edited.try_reserve_exact(source.len() - 1).is_err() {
            out_of_memory();
        }
        edited.extend_from_slice(&source[..pos]);
        edited.extend_from_slice(&source[pos + 1..]);
        self.intern(&edited)
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

fn out_of_memory() -> ! {
    eprint!("Error: out of memory\r\n");
    std::process::exit(1)
}
