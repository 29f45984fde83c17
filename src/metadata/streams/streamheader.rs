use crate::{file::io::read_le, Error::OutOfBounds, Result};

/// One entry of the metadata root's stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name, one of `#~`, `#Strings`, `#US`, `#GUID`, `#Blob`
    pub name: String,
}

impl StreamHeader {
    /// Decode a stream header; the name is at most 32 bytes including its terminator.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data or [`crate::Error::Malformed`]
    /// for an unknown stream name.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes: Vec<u8> = data[8..]
            .iter()
            .take(32)
            .take_while(|&&byte| byte != 0)
            .copied()
            .collect();
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        if !["#Strings", "#US", "#Blob", "#GUID", "#~"].contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }

    /// Bytes this header occupies in the directory: 8 plus the name padded to 4 bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        8 + (((self.name.len() + 1) + 3) & !3)
    }
}
