//! Metadata tables of the `#~` stream.
//!
//! Every table present in the stream is decoded eagerly, in ascending table order, into an
//! owned [`MetadataTable`] of typed rows. Column widths depend on the row counts of other tables
//! and on the heap size flags; [`TableInfo`] computes them once per image.
//!
//! # Key Components
//!
//! - [`TableId`] - The 45 table kinds `0x00..=0x2C`
//! - [`CodedIndexType`] / [`CodedIndex`] - Tagged references into one of several tables
//! - [`TableInfo`] - Index widths derived from the table header
//! - [`RowReadable`] - Row size computation and decoding for one row type
//! - [`MetadataTables`] - All tables of an image plus the resolved parent/child ranges
//!
//! # Row Ranges
//!
//! Several tables own a contiguous run of rows in another table (a type's fields and methods,
//! a method's parameters, a map's events or properties). The run starts at the owner's list
//! column and ends where the next owner's run starts; the last owner runs to the end of the
//! child table. [`ChildRanges`] holds these runs, clamped to the child table.

mod codedindex;
mod rows;
mod tableid;
mod tableinfo;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use rows::*;
pub use tableid::TableId;
pub use tableinfo::{TableInfo, TableRowInfo};

use crate::Result;

/// Decoding of one row type.
pub trait RowReadable: Sized {
    /// Size in bytes of one row, given the column widths of the image.
    fn row_size(sizes: &TableInfo) -> u32;

    /// Decode the row `rid` at `offset`, advancing `offset` past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row is truncated.
    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self>;
}

/// The decoded rows of one table, addressed by 1-based row id.
#[derive(Debug, Clone)]
pub struct MetadataTable<T> {
    rows: Vec<T>,
    row_size: u32,
}

impl<T: RowReadable> MetadataTable<T> {
    /// Decode `row_count` consecutive rows starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the table extends past `data`.
    pub fn read(data: &[u8], offset: &mut usize, row_count: u32, sizes: &TableInfo) -> Result<Self> {
        let row_size = T::row_size(sizes);
        let needed = u64::from(row_count) * u64::from(row_size);
        if (*offset as u64).saturating_add(needed) > data.len() as u64 {
            return Err(malformed_error!(
                "Table of {} rows exceeds the stream at offset {}",
                row_count,
                offset
            ));
        }

        let mut rows = Vec::with_capacity(row_count as usize);
        for rid in 1..=row_count {
            rows.push(T::row_read(data, offset, rid, sizes)?);
        }

        Ok(MetadataTable { rows, row_size })
    }
}

impl<T> MetadataTable<T> {
    /// A table without rows.
    #[must_use]
    pub fn empty() -> Self {
        MetadataTable {
            rows: Vec::new(),
            row_size: 0,
        }
    }

    /// The row with the 1-based id `rid`.
    #[must_use]
    pub fn get(&self, rid: u32) -> Option<&T> {
        if rid == 0 {
            return None;
        }

        self.rows.get(rid as usize - 1)
    }

    /// Number of rows.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Size of a row in bytes.
    #[must_use]
    pub fn row_size(&self) -> u32 {
        self.row_size
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in ascending id order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }
}

impl<'a, T> IntoIterator for &'a MetadataTable<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
