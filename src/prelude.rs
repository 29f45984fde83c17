//! # dotrun Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotrun library. Import this module to get quick access to the essential
//! types for loading and running .NET assemblies.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotrun operations
pub use crate::Error;

/// The result type used throughout dotrun
pub use crate::Result;

/// Tunables of an AppDomain
pub use crate::config::RuntimeConfig;

// ================================================================================================
// Loading
// ================================================================================================

/// A decoded PE/CLI image
pub use crate::CilImage;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Table identifiers and coded indexes
pub use crate::metadata::tables::{CodedIndex, CodedIndexType, TableId};

/// Decoded signatures
pub use crate::metadata::signatures::{
    parse_local_var_signature, parse_method_signature, SignatureMethod, TypeSignature,
};

/// Method bodies
pub use crate::metadata::method::MethodBody;

// ================================================================================================
// Execution
// ================================================================================================

/// The AppDomain and its shared state
pub use crate::emulation::runtime::{AppDomain, DomainContext};

/// Assemblies and where their bytes come from
pub use crate::emulation::runtime::{
    Assembly, AssemblyCache, ByteSource, DirectorySource, LoadCompletion, LoadState, MemorySource,
};

/// Native methods
pub use crate::emulation::runtime::{
    ConsoleLibrary, NativeCall, NativeLibrary, NativeMethod, NativeOutcome, NativeRegistry,
};

/// Threads and scheduling
pub use crate::emulation::{StepBudget, Thread, ThreadId, ThreadStatus, TickReport};

/// Runtime values and errors
pub use crate::emulation::{EmValue, EmulationError, HeapRef, ValueKind};

/// Memory
pub use crate::emulation::{CollectionStats, Heap, ReferenceTable};
