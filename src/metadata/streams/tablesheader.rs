use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le,
    metadata::tables::{MetadataTables, TableId, TableInfo},
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Heap size flag: extra 4 bytes of data follow the row counts.
const EXTRA_DATA: u8 = 0x40;

/// The decoded `#~` stream: table header plus all tables.
#[derive(Debug, Clone)]
pub struct TablesHeader {
    /// Major version of the table schema
    pub major_version: u8,
    /// Minor version of the table schema
    pub minor_version: u8,
    /// Heap size flags
    pub heap_sizes: u8,
    /// Bit mask of present tables
    pub valid: u64,
    /// Bit mask of sorted tables
    pub sorted: u64,
    /// Column width information
    pub info: TableInfo,
    /// The decoded rows
    pub tables: MetadataTables,
}

impl TablesHeader {
    /// Decode a `#~` stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data and [`crate::Error::NotSupported`]
    /// if the `valid` mask names a table past `0x2C`.
    pub fn from(data: &[u8]) -> Result<TablesHeader> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let valid = read_le::<u64>(&data[8..])?;
        if valid >> TableId::COUNT != 0 {
            return Err(NotSupported);
        }

        let heap_sizes = data[6];
        let info = TableInfo::new(data, valid)?;

        let mut offset = 24 + valid.count_ones() as usize * 4;
        if heap_sizes & EXTRA_DATA != 0 {
            offset += 4;
        }

        let tables = MetadataTables::read(data, &mut offset, &info)?;

        Ok(TablesHeader {
            major_version: data[4],
            minor_version: data[5],
            heap_sizes,
            valid,
            sorted: read_le::<u64>(&data[16..])?,
            info,
            tables,
        })
    }

    /// Number of tables present.
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.count_ones()
    }

    /// Present tables with their row counts, in ascending order.
    #[must_use]
    pub fn present(&self) -> Vec<(TableId, u32)> {
        TableId::iter()
            .filter(|id| self.valid & (1 << *id as usize) != 0)
            .map(|id| (id, self.tables.row_count(id)))
            .collect()
    }
}
