//! Runtime values of the evaluation stack, arguments, locals and array elements.

mod emvalue;

pub use emvalue::{EmValue, HeapRef, ValueKind};
