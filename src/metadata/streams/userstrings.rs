use widestring::U16String;

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// View of the `#US` heap: string literals referenced by `ldstr`.
///
/// Each entry is a compressed byte length followed by UTF-16LE code units and one trailing
/// flag byte (set when a code unit needs special handling beyond ASCII).
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wrap heap bytes; a non-empty heap must start with the empty entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the first byte is not 0.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.first().is_some_and(|&byte| byte != 0) {
            return Err(malformed_error!("Invalid first byte of #US heap"));
        }

        Ok(UserStrings { data })
    }

    /// Decode the string at byte offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the entry extends past the heap.
    pub fn get(&self, index: usize) -> Result<String> {
        if index == 0 && self.data.is_empty() {
            return Ok(String::new());
        }

        let tail = self.data.get(index..).ok_or(OutOfBounds)?;
        let mut parser = Parser::new(tail);
        let len = parser.read_compressed_uint()? as usize;
        let bytes = parser.read_bytes(len)?;

        // trailing flag byte
        let units: Vec<u16> = bytes[..len - (len % 2)]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(U16String::from_vec(units).to_string_lossy())
    }
}
