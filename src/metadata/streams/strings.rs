use std::ffi::CStr;

use crate::{Error::OutOfBounds, Result};

/// View of the `#Strings` heap: null-terminated UTF-8 identifiers addressed by byte offset.
///
/// A missing heap is represented by an empty view in which only index 0 (the empty string)
/// resolves.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap heap bytes; a non-empty heap must start with the empty string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the first byte is not 0.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first().is_some_and(|&byte| byte != 0) {
            return Err(malformed_error!("Invalid first byte of #Strings heap"));
        }

        Ok(Strings { data })
    }

    /// The string starting at byte offset `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the heap and [`crate::Error::Malformed`] for
    /// an unterminated or non UTF-8 string.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index == 0 && self.data.is_empty() {
            return Ok("");
        }

        let tail = self.data.get(index..).ok_or(OutOfBounds)?;
        CStr::from_bytes_until_nul(tail)
            .ok()
            .and_then(|text| text.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }
}
