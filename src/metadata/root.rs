//! The metadata root (ECMA-335 II.24.2.1).

use crate::{
    file::io::read_le,
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// Signature of the metadata root, `BSJB`.
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The metadata root: version information and the stream directory.
#[derive(Debug, Clone)]
pub struct Root {
    /// Magic signature, always `0x424A5342`
    pub signature: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Length of the padded version string
    pub length: u32,
    /// Runtime version string
    pub version: String,
    /// Reserved flags
    pub flags: u16,
    /// Number of streams
    pub stream_number: u16,
    /// The stream directory
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Decode the root at the start of `data`, which spans the whole metadata directory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong signature, a stream extending past the
    /// metadata or a duplicate stream, and [`crate::Error::OutOfBounds`] on truncated data.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - 0x{:08X}",
                signature
            ));
        }

        let length = read_le::<u32>(&data[12..])?;
        let version_end = 16_usize
            .checked_add(length as usize)
            .filter(|end| *end + 4 <= data.len())
            .ok_or(OutOfBounds)?;

        let version = String::from_utf8_lossy(&data[16..version_end])
            .trim_end_matches('\0')
            .to_string();

        let flags = read_le::<u16>(&data[version_end..])?;
        let stream_number = read_le::<u16>(&data[version_end + 2..])?;

        let mut stream_headers: Vec<StreamHeader> = Vec::with_capacity(stream_number as usize);
        let mut stream_offset = version_end + 4;
        for _ in 0..stream_number {
            let header = StreamHeader::from(data.get(stream_offset..).ok_or(OutOfBounds)?)?;

            let end = u64::from(header.offset) + u64::from(header.size);
            if end > data.len() as u64 {
                return Err(malformed_error!(
                    "Stream {} exceeds the metadata - {} + {}",
                    header.name,
                    header.offset,
                    header.size
                ));
            }

            if stream_headers.iter().any(|known| known.name == header.name) {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            stream_offset += header.encoded_len();
            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            reserved: read_le::<u32>(&data[8..])?,
            length,
            version,
            flags,
            stream_number,
            stream_headers,
        })
    }

    /// The header of the stream called `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }
}
