//! Crate-internal test support.
//!
//! [`ImageBuilder`] assembles small but complete PE32 images with ECMA-335 metadata so that the
//! loader, the interpreter and the runtime can be exercised without binary fixtures.
//! The builder only names the metadata module through `super`, so integration tests can mount
//! the same file next to `use dotrun::metadata;`.

use crate::metadata;

mod builder;

pub use builder::*;
