//! PE/COFF image access for 32-bit .NET executables.
//!
//! [`File`] pairs the bytes of an image, held in memory or mapped from disk, with the
//! [`goblin`] view of its PE/COFF structure. On top of what goblin checks (DOS and PE
//! signatures, header layout) loading requires an i386 COFF machine type, a PE32 optional
//! header and a CLI runtime header directory. A [`File`] either describes such an image or is
//! not created.
//!
//! # Key Components
//!
//! - [`File`] - Validated image with section table and data directories
//! - [`Backend`] - Byte storage behind a [`File`], a buffer or a read-only file mapping
//! - [`io`] - Little-endian primitive access shared with the managed heap
//! - [`parser`] - Cursor parser used by the metadata decoders
//!
//! # Address Translation
//!
//! Metadata and method bodies are addressed by RVA. [`File::rva_to_offset`] maps an RVA through
//! the section whose virtual range contains it; RVAs outside every section are malformed.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrun::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("Fib.exe"))?;
//! let (clr_rva, clr_size) = file.clr();
//! let offset = file.rva_to_offset(clr_rva)?;
//! let header = file.data_slice(offset, clr_size)?;
//! assert_eq!(header.len(), 72);
//! # Ok::<(), dotrun::Error>(())
//! ```

pub mod io;
pub mod parser;
mod memory;
mod physical;

use std::{fmt, path::Path};

use goblin::pe::{
    data_directories::{DataDirectory, DataDirectoryType},
    header::{DosHeader, Header, COFF_MACHINE_X86},
    optional_header::{OptionalHeader, MAGIC_32},
    section_table::SectionTable,
    PE,
};
use ouroboros::self_referencing;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};

pub(crate) use memory::Memory;
pub(crate) use physical::Physical;

/// Storage holding the bytes of an image.
pub trait Backend: Send + Sync + fmt::Debug {
    /// A bounds-checked view of `len` bytes at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// All bytes.
    fn data(&self) -> &[u8];

    /// Number of bytes.
    fn len(&self) -> usize;
}

/// A validated PE32 image holding a CLI runtime header.
#[self_referencing]
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (clr_rva, clr_size) = self.clr();
        f.debug_struct("File")
            .field("len", &self.len())
            .field("imagebase", &self.imagebase())
            .field("sections", &self.sections().count())
            .field("clr_rva", &clr_rva)
            .field("clr_size", &clr_size)
            .finish_non_exhaustive()
    }
}

impl File {
    /// Map and validate an image on disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened, otherwise the same
    /// errors as [`File::from_mem`].
    pub fn from_file(file: &Path) -> Result<File> {
        Self::load(Box::new(Physical::new(file)?))
    }

    /// Validate an image held in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer, [`crate::Error::GoblinErr`] if the
    /// PE structure cannot be parsed and [`crate::Error::Malformed`] when the machine type or
    /// the optional header magic does not match, or the CLI header directory is missing.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Box::new(Memory::new(data)))
    }

    pub(crate) fn load(data: Box<dyn Backend>) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        File::try_new(data, |data| {
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;

            if pe.header.coff_header.machine != COFF_MACHINE_X86 {
                return Err(malformed_error!(
                    "Unsupported machine type - 0x{:04X}",
                    pe.header.coff_header.machine
                ));
            }

            let Some(optional_header) = pe.header.optional_header else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };

            if optional_header.standard_fields.magic != MAGIC_32 {
                return Err(malformed_error!(
                    "Unsupported optional header magic - 0x{:04X}",
                    optional_header.standard_fields.magic
                ));
            }

            match optional_header.data_directories.get_clr_runtime_header() {
                Some(clr) if clr.virtual_address != 0 && clr.size != 0 => Ok(pe),
                _ => Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                )),
            }
        })
    }

    /// Size of the image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Returns true for a zero-length image (never the case for a validated file).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Preferred load address.
    #[must_use]
    pub fn imagebase(&self) -> u64 {
        self.with_pe(|pe| pe.image_base)
    }

    /// The PE headers: DOS, COFF and optional.
    #[must_use]
    pub fn header(&self) -> &Header {
        self.with_pe(|pe| &pe.header)
    }

    /// The DOS header.
    #[must_use]
    pub fn header_dos(&self) -> &DosHeader {
        self.with_pe(|pe| &pe.header.dos_header)
    }

    /// The PE32 optional header, present on every loaded image.
    #[must_use]
    pub fn header_optional(&self) -> Option<&OptionalHeader> {
        self.with_pe(|pe| pe.header.optional_header.as_ref())
    }

    /// RVA and size of the CLI runtime header.
    #[must_use]
    pub fn clr(&self) -> (usize, usize) {
        self.get_data_directory(DataDirectoryType::ClrRuntimeHeader)
            .map_or((0, 0), |(rva, size)| (rva as usize, size as usize))
    }

    /// The section headers in file order.
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// All data directories of the optional header.
    #[must_use]
    pub fn directories(&self) -> Vec<(DataDirectoryType, DataDirectory)> {
        self.header_optional()
            .map(|optional| optional.data_directories.dirs().collect())
            .unwrap_or_default()
    }

    /// RVA and size of a data directory, `None` if it is absent or empty.
    #[must_use]
    pub fn get_data_directory(&self, dir_type: DataDirectoryType) -> Option<(u32, u32)> {
        self.header_optional()?
            .data_directories
            .dirs()
            .find(|(directory_type, directory)| {
                *directory_type == dir_type && (directory.virtual_address != 0 || directory.size != 0)
            })
            .map(|(_, directory)| (directory.virtual_address, directory.size))
    }

    /// The whole image.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// A bounds-checked view of `len` bytes at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Translate an RVA into a file offset.
    ///
    /// A section covers the larger of its virtual and raw sizes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section covers the RVA.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva_u32 =
            u32::try_from(rva).map_err(|_| malformed_error!("RVA too large to fit in u32: {}", rva))?;

        self.sections()
            .find(|section| {
                let extent = section.virtual_size.max(section.size_of_raw_data);
                rva_u32 >= section.virtual_address
                    && u64::from(rva_u32) < u64::from(section.virtual_address) + u64::from(extent)
            })
            .map(|section| {
                (rva - section.virtual_address as usize) + section.pointer_to_raw_data as usize
            })
            .ok_or_else(|| malformed_error!("RVA could not be converted to offset - {}", rva))
    }
}
