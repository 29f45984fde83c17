//! Memory of an AppDomain.
//!
//! - [`Heap`] - boundary-tag allocator holding the primitive cells of initialized locals
//! - [`ReferenceTable`] - arena of heap objects (arrays, structs) addressed by [`crate::emulation::HeapRef`]
//! - [`collect`] - mark-sweep collection of the reference table
//! - [`EvaluationStack`] - the per-thread operand stack

mod collector;
mod heap;
mod references;
mod stack;

pub use collector::{collect, CollectionStats};
pub use heap::{Block, Blocks, Heap, BLOCK_OVERHEAD, TAG_SIZE};
pub use references::{Payload, Reference, ReferenceTable};
pub use stack::EvaluationStack;
