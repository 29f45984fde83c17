//! Execution of CIL code.
//!
//! This module holds everything that runs on top of a decoded [`crate::metadata::cilimage::CilImage`]:
//!
//! - [`engine`] - the instruction interpreter and its operand specialization cache
//! - [`thread`] - call frames, green threads and the round-robin scheduler
//! - [`runtime`] - the AppDomain, assembly loading and native libraries
//! - memory: the boundary-tag [`Heap`], the [`ReferenceTable`] and the mark-sweep [`collect`]or
//! - values: [`EmValue`], the closed union of everything the operand stack can hold
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrun::{
//!     config::RuntimeConfig,
//!     emulation::{runtime::DirectorySource, AppDomain},
//! };
//!
//! let mut domain = AppDomain::new(RuntimeConfig::default(), Box::new(DirectorySource::new(".")))?;
//! let assembly = domain.load_file("Fib.exe".as_ref())?;
//! domain.run(&assembly)?;
//! domain.run_to_completion()?;
//! # Ok::<(), dotrun::Error>(())
//! ```

pub mod engine;
mod memory;
pub mod runtime;
pub mod thread;
mod value;

pub use engine::{EmulationError, Interpreter, MethodCode, OperandCache, StepResult};
pub use memory::{
    collect, Block, Blocks, CollectionStats, EvaluationStack, Heap, Payload, Reference,
    ReferenceTable, BLOCK_OVERHEAD, TAG_SIZE,
};
pub use runtime::AppDomain;
pub use thread::{Scheduler, StepBudget, Thread, ThreadId, ThreadStatus, TickReport};
pub use value::{EmValue, HeapRef, ValueKind};
