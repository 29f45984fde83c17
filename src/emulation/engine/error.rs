//! Execution faults.
//!
//! Every [`EmulationError`] aborts the run that raised it; there is no managed exception model.
//! The error travels through the crate-wide [`crate::Error::Emulation`] variant so that loader
//! failures and execution faults share one `Result` type.

use std::fmt;

use crate::metadata::token::Token;

/// Errors that can occur while executing an assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum EmulationError {
    /// Pop from an empty evaluation stack.
    StackUnderflow,
    /// Operand tags do not fit the instruction, or disagree with the specialized kind.
    TypeMismatch {
        /// Instruction or operation being performed.
        operation: &'static str,
        /// Expected operand kind.
        expected: &'static str,
        /// Actual operand kind found.
        found: &'static str,
    },
    /// Local variable index out of bounds.
    LocalIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of locals available.
        count: usize,
    },
    /// Argument index out of bounds.
    ArgumentIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// Number of arguments available.
        count: usize,
    },
    /// A reference that is not (or no longer) part of the reference table.
    InvalidHeapReference {
        /// Slot index of the reference.
        index: u32,
        /// Generation the reference was issued for.
        generation: u32,
    },
    /// Boundary tags of a heap block are inconsistent, or a heap access lies outside a block.
    HeapCorruption {
        /// Byte offset of the damaged block or access.
        offset: usize,
    },
    /// `free` on a block that is not allocated.
    InvalidFree {
        /// Payload offset passed to `free`.
        offset: usize,
    },
    /// Division or remainder by zero.
    DivisionByZero,
    /// `MIN / -1`, or a size computation that does not fit.
    ArithmeticOverflow,
    /// Branch leaving the method body.
    InvalidBranchTarget {
        /// The computed target offset.
        target: i64,
    },
    /// Instruction pointer outside the method body.
    InvalidInstructionPointer {
        /// The invalid offset.
        offset: usize,
    },
    /// Opcode outside the supported instruction set.
    UnsupportedOpcode {
        /// The unsupported opcode.
        opcode: u8,
        /// `0xFE` for two-byte opcodes.
        prefix: Option<u8>,
    },
    /// Call or type token of a kind that cannot be resolved.
    UnsupportedToken {
        /// The offending token.
        token: Token,
    },
    /// The entry point of an assembly is not a `MethodDef`.
    InvalidEntryPoint {
        /// The entry point token of the CLI header.
        token: Token,
    },
    /// The byte source could not provide an assembly.
    AssemblyNotFound {
        /// Requested assembly name.
        name: String,
    },
    /// A native assembly has no binding for a member.
    NativeMethodNotFound {
        /// `namespace.type` of the member.
        type_name: String,
        /// Binding key of the member, for example `WriteLine$_10`.
        method: String,
    },
    /// A referenced member does not exist in the resolved assembly.
    MethodNotFound {
        /// `namespace.type` of the member.
        type_name: String,
        /// Member name.
        name: String,
    },
    /// Every thread is waiting on an assembly load that did not complete in time.
    LoadTimeout {
        /// The assembly still being loaded.
        name: String,
    },
    /// Array index outside `0..length`.
    InvalidArrayIndex {
        /// The requested index.
        index: i64,
        /// Array length.
        length: usize,
    },
    /// `newarr` asked for more elements than can be allocated.
    ArrayTooLarge {
        /// The requested length.
        length: usize,
        /// The configured maximum length.
        limit: usize,
    },
    /// Every handle index of the reference table is taken.
    ReferenceTableFull,
    /// Dereference of `null`.
    NullReference,
    /// Call stack grew past the configured limit.
    CallDepthExceeded {
        /// The configured limit.
        limit: usize,
    },
}

impl fmt::Display for EmulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulationError::StackUnderflow => write!(f, "evaluation stack underflow"),
            EmulationError::TypeMismatch {
                operation,
                expected,
                found,
            } => write!(
                f,
                "type mismatch in {operation}: expected {expected}, found {found}"
            ),
            EmulationError::LocalIndexOutOfBounds { index, count } => {
                write!(
                    f,
                    "local variable index {index} out of bounds (count: {count})"
                )
            }
            EmulationError::ArgumentIndexOutOfBounds { index, count } => {
                write!(f, "argument index {index} out of bounds (count: {count})")
            }
            EmulationError::InvalidHeapReference { index, generation } => {
                write!(f, "invalid heap reference: {index}#{generation}")
            }
            EmulationError::HeapCorruption { offset } => {
                write!(f, "heap corruption at offset 0x{offset:X}")
            }
            EmulationError::InvalidFree { offset } => {
                write!(f, "invalid free of offset 0x{offset:X}")
            }
            EmulationError::DivisionByZero => write!(f, "division by zero"),
            EmulationError::ArithmeticOverflow => write!(f, "arithmetic overflow"),
            EmulationError::InvalidBranchTarget { target } => {
                write!(f, "invalid branch target: {target}")
            }
            EmulationError::InvalidInstructionPointer { offset } => {
                write!(f, "invalid instruction pointer: 0x{offset:04X}")
            }
            EmulationError::UnsupportedOpcode { opcode, prefix } => match prefix {
                Some(prefix) => write!(f, "unsupported opcode: 0x{prefix:02X} 0x{opcode:02X}"),
                None => write!(f, "unsupported opcode: 0x{opcode:02X}"),
            },
            EmulationError::UnsupportedToken { token } => {
                write!(f, "unsupported token: {token}")
            }
            EmulationError::InvalidEntryPoint { token } => {
                write!(f, "entry point is not a method definition: {token}")
            }
            EmulationError::AssemblyNotFound { name } => write!(f, "assembly not found: {name}"),
            EmulationError::NativeMethodNotFound { type_name, method } => {
                write!(f, "no native binding for {type_name}::{method}")
            }
            EmulationError::MethodNotFound { type_name, name } => {
                write!(f, "method not found: {type_name}::{name}")
            }
            EmulationError::LoadTimeout { name } => {
                write!(f, "timed out waiting for assembly {name}")
            }
            EmulationError::InvalidArrayIndex { index, length } => {
                write!(f, "array index {index} out of range (length: {length})")
            }
            EmulationError::ArrayTooLarge { length, limit } => {
                write!(f, "array of {length} elements exceeds the limit of {limit}")
            }
            EmulationError::ReferenceTableFull => write!(f, "reference table is full"),
            EmulationError::NullReference => write!(f, "null reference"),
            EmulationError::CallDepthExceeded { limit } => {
                write!(f, "call depth limit of {limit} exceeded")
            }
        }
    }
}

impl std::error::Error for EmulationError {}
