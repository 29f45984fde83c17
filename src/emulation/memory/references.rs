//! Arena of heap objects addressed by [`HeapRef`] handles.
//!
//! Slots are reused through a free list. Each slot carries a generation that is bumped whenever
//! its object is released, which turns use of a stale handle into
//! [`EmulationError::InvalidHeapReference`] instead of silent aliasing.

use crate::{
    config::DEFAULT_MAX_ARRAY_LENGTH,
    emulation::{EmValue, EmulationError, HeapRef},
    Result,
};

/// Contents of a heap object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Allocated but not yet initialized
    Uninit,
    /// A bag of fields
    Struct(Vec<EmValue>),
    /// A zero-based, single dimension array
    Array(Vec<EmValue>),
}

impl Payload {
    /// Values held by this payload, traversed by the collector.
    #[must_use]
    pub fn values(&self) -> &[EmValue] {
        match self {
            Payload::Uninit => &[],
            Payload::Struct(fields) => fields,
            Payload::Array(elements) => elements,
        }
    }
}

/// A heap object record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Unique, monotonically increasing object id
    pub id: u64,
    /// The object contents
    pub payload: Payload,
    /// Mark bit of the collector
    pub used: bool,
    /// The object must be queued for finalization when it becomes unreachable
    pub finalizable: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Reference>,
}

/// Owner of every heap object of an AppDomain.
#[derive(Debug)]
pub struct ReferenceTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_id: u64,
    live: usize,
    max_array_length: usize,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        ReferenceTable {
            slots: Vec::new(),
            free: Vec::new(),
            next_id: 0,
            live: 0,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

impl ReferenceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> ReferenceTable {
        ReferenceTable::default()
    }

    /// Limit the element count of arrays allocated through [`ReferenceTable::alloc_array`].
    #[must_use]
    pub fn with_max_array_length(mut self, limit: usize) -> ReferenceTable {
        self.max_array_length = limit;
        self
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no object is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store a new object, returning its handle.
    ///
    /// # Errors
    /// Returns [`EmulationError::ReferenceTableFull`] once every slot index is in use.
    pub fn alloc(&mut self, payload: Payload) -> Result<HeapRef> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = next_index(self.slots.len())?;
                self.slots.push(Slot::default());
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.entry = Some(Reference {
            id: self.next_id,
            payload,
            used: false,
            finalizable: false,
        });
        self.next_id += 1;
        self.live += 1;

        Ok(HeapRef {
            index,
            generation: slot.generation,
        })
    }

    /// Allocate an array of `length` copies of `default`.
    ///
    /// # Errors
    /// Returns [`EmulationError::ArrayTooLarge`] if `length` exceeds the configured limit or the
    /// elements cannot be reserved, and the errors of [`ReferenceTable::alloc`].
    pub fn alloc_array(&mut self, length: usize, default: EmValue) -> Result<HeapRef> {
        let limit = self.max_array_length;
        let too_large = || EmulationError::ArrayTooLarge { length, limit };

        if length > limit {
            return Err(too_large().into());
        }

        let mut elements = Vec::new();
        elements
            .try_reserve_exact(length)
            .map_err(|_| too_large())?;
        elements.resize(length, default);
        self.alloc(Payload::Array(elements))
    }

    /// Allocate a struct with `field_count` null fields.
    ///
    /// # Errors
    /// Same as [`ReferenceTable::alloc`].
    pub fn alloc_struct(&mut self, field_count: usize) -> Result<HeapRef> {
        self.alloc(Payload::Struct(vec![EmValue::Null; field_count]))
    }

    /// Allocate an object without contents.
    ///
    /// # Errors
    /// Same as [`ReferenceTable::alloc`].
    pub fn alloc_uninit(&mut self) -> Result<HeapRef> {
        self.alloc(Payload::Uninit)
    }

    /// Returns true if `reference` designates a live object.
    #[must_use]
    pub fn contains(&self, reference: HeapRef) -> bool {
        self.get(reference).is_ok()
    }

    /// Look up an object.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidHeapReference`] for stale or foreign handles.
    pub fn get(&self, reference: HeapRef) -> Result<&Reference> {
        self.slots
            .get(reference.index as usize)
            .filter(|slot| slot.generation == reference.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or_else(|| invalid(reference))
    }

    /// Look up an object for modification.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidHeapReference`] for stale or foreign handles.
    pub fn get_mut(&mut self, reference: HeapRef) -> Result<&mut Reference> {
        self.slots
            .get_mut(reference.index as usize)
            .filter(|slot| slot.generation == reference.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or_else(|| invalid(reference))
    }

    /// Elements of an array object.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidHeapReference`] for stale handles and
    /// [`EmulationError::TypeMismatch`] if the object is not an array.
    pub fn array(&self, reference: HeapRef) -> Result<&[EmValue]> {
        match &self.get(reference)?.payload {
            Payload::Array(elements) => Ok(elements),
            other => Err(not_an_array(other)),
        }
    }

    /// Elements of an array object, for modification.
    ///
    /// # Errors
    /// Same as [`ReferenceTable::array`].
    pub fn array_mut(&mut self, reference: HeapRef) -> Result<&mut [EmValue]> {
        match &mut self.get_mut(reference)?.payload {
            Payload::Array(elements) => Ok(elements),
            other => Err(not_an_array(other)),
        }
    }

    /// Flag an object for finalization.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidHeapReference`] for stale handles.
    pub fn set_finalizable(&mut self, reference: HeapRef, finalizable: bool) -> Result<()> {
        self.get_mut(reference)?.finalizable = finalizable;
        Ok(())
    }

    /// Iterate over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = (HeapRef, &Reference)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    HeapRef {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    /// Set the mark bit of every live object to `used`.
    pub(crate) fn reset_marks(&mut self, used: bool) {
        for entry in self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut()) {
            entry.used = used;
        }
    }

    /// Mark an object; returns true if it was not marked before.
    ///
    /// # Errors
    /// Returns [`EmulationError::InvalidHeapReference`] for stale handles.
    pub(crate) fn mark(&mut self, reference: HeapRef) -> Result<bool> {
        let entry = self.get_mut(reference)?;
        let fresh = !entry.used;
        entry.used = true;
        Ok(fresh)
    }

    /// Remove every unmarked object, handing each one to `condemned`.
    pub(crate) fn sweep(&mut self, mut condemned: impl FnMut(Reference)) -> usize {
        let mut swept = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.as_ref().is_some_and(|entry| !entry.used) {
                if let Some(entry) = slot.entry.take() {
                    condemned(entry);
                }
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                swept += 1;
            }
        }

        self.live -= swept;
        swept
    }
}

/// Slot index for a table holding `len` slots; handles carry 32-bit indices.
fn next_index(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| EmulationError::ReferenceTableFull.into())
}

fn invalid(reference: HeapRef) -> crate::Error {
    EmulationError::InvalidHeapReference {
        index: reference.index,
        generation: reference.generation,
    }
    .into()
}

fn not_an_array(payload: &Payload) -> crate::Error {
    EmulationError::TypeMismatch {
        operation: "array access",
        expected: "array",
        found: match payload {
            Payload::Uninit => "uninitialized object",
            Payload::Struct(_) => "struct",
            Payload::Array(_) => "array",
        },
    }
    .into()
}
