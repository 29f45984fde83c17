//! Metadata streams.
//!
//! The metadata root lists up to five streams. `#~` holds the tables; the others are heaps the
//! tables index into:
//!
//! - [`Strings`] - `#Strings`, identifiers
//! - [`Blob`] - `#Blob`, signatures and other binary values
//! - [`Guid`] - `#GUID`, module identifiers
//! - [`UserStrings`] - `#US`, string literals
//!
//! Heap views borrow the image bytes and are created on demand.

mod blob;
mod guid;
mod streamheader;
mod strings;
mod tablesheader;
mod userstrings;

pub use blob::Blob;
pub use guid::Guid;
pub use streamheader::StreamHeader;
pub use strings::Strings;
pub use tablesheader::TablesHeader;
pub use userstrings::UserStrings;
