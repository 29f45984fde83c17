use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// View of the `#Blob` heap: byte sequences prefixed with a compressed length.
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap heap bytes; a non-empty heap must start with the empty blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the first byte is not 0.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.first().is_some_and(|&byte| byte != 0) {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// The blob starting at byte offset `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob extends past the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index == 0 && self.data.is_empty() {
            return Ok(&[]);
        }

        let tail = self.data.get(index..).ok_or(OutOfBounds)?;
        let mut parser = Parser::new(tail);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x20, 0x00, 0x01,
            0x04, 0x00, 0x01, 0x01, 0x0E,
            0x80, 0x02, 0xAA, 0xBB,
        ];

        let blob = Blob::from(&data).unwrap();
        assert!(blob.get(0).unwrap().is_empty());
        assert_eq!(blob.get(1).unwrap(), &[0x20, 0x00, 0x01]);
        assert_eq!(blob.get(5).unwrap(), &[0x00, 0x01, 0x01, 0x0E]);
        assert_eq!(blob.get(10).unwrap(), &[0xAA, 0xBB]);
        assert!(blob.get(12).is_err());
        assert!(blob.get(20).is_err());
    }

    #[test]
    fn invalid() {
        assert!(Blob::from(&[0x01]).is_err());
        assert!(Blob::from(&[]).unwrap().get(0).unwrap().is_empty());
    }
}
