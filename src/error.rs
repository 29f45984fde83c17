use thiserror::Error;

use crate::emulation::EmulationError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, covering everything this library can return.
///
/// Loading errors are always fatal for the image being loaded: a [`crate::metadata::cilimage::CilImage`]
/// is either complete or not produced at all. Execution faults are wrapped in
/// [`Error::Emulation`] and abort the run.
///
/// # Error Categories
///
/// ## Image Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::NotSupported`] - Valid input using an unsupported feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::RecursionLimit`] - Nested signature exceeded the depth limit
///
/// ## Host Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from goblin
/// - [`Error::Error`] - Miscellaneous failures carrying a message
///
/// ## Execution Errors
/// - [`Error::Emulation`] - Interpreter, allocator, collector or scheduler fault
///
/// # Examples
///
/// ```rust,no_run
/// use dotrun::{Error, metadata::cilimage::CilImage};
///
/// match CilImage::from_file("Fib.exe".as_ref()) {
///     Ok(image) => println!("entry point {}", image.entry_point()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed file: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while reading a buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input uses a feature this library does not implement.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The PE parser rejected the image.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Recursion limit reached while decoding nested structures.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A fault raised while executing code.
    ///
    /// Boxed to keep `Result<T>` small on the hot interpreter path.
    #[error("{0}")]
    Emulation(Box<EmulationError>),
}

impl From<EmulationError> for Error {
    fn from(error: EmulationError) -> Self {
        Error::Emulation(Box::new(error))
    }
}

impl Error {
    /// Returns the execution fault carried by this error, if any.
    #[must_use]
    pub fn as_emulation(&self) -> Option<&EmulationError> {
        match self {
            Error::Emulation(inner) => Some(&**inner),
            _ => None,
        }
    }
}
