//! Lazy operand-kind specialization of polymorphic instructions.
//!
//! The IL of a method is never modified. Instead every [`super::MethodCode`] owns an
//! [`OperandCache`] with one entry per IL byte. The first execution of `add`, `ceq`, `blt` and
//! friends records the operand kind it observed at the instruction's offset; later executions
//! dispatch on the recorded kind. All frames running the same method share the cache.

use std::cell::Cell;

use crate::emulation::ValueKind;

/// Per-offset resolved operand kinds, kept parallel to the IL bytes of one method.
#[derive(Debug, Default)]
pub struct OperandCache {
    kinds: Box<[Cell<u8>]>,
}

impl OperandCache {
    /// Create an unresolved cache for `code_len` bytes of IL.
    #[must_use]
    pub fn new(code_len: usize) -> OperandCache {
        OperandCache {
            kinds: (0..code_len).map(|_| Cell::new(0)).collect(),
        }
    }

    /// The kind recorded for the instruction at `offset`.
    #[must_use]
    pub fn get(&self, offset: usize) -> Option<ValueKind> {
        self.kinds
            .get(offset)
            .and_then(|kind| ValueKind::from_u8(kind.get()))
    }

    /// Record the kind of the instruction at `offset`.
    pub fn set(&self, offset: usize, kind: ValueKind) {
        if let Some(slot) = self.kinds.get(offset) {
            slot.set(kind as u8);
        }
    }

    /// Number of specialized instructions.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.kinds.iter().filter(|kind| kind.get() != 0).count()
    }
}
