use crate::{
    file::io::{read_le, read_le_at},
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
    Error::OutOfBounds,
    Result,
};

/// Max stack of a method with a tiny header
const TINY_MAX_STACK: usize = 8;

/// A decoded method body: header fields, exception clauses and the IL code itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Size of the IL code in bytes
    pub size_code: usize,
    /// Size of the header in bytes
    pub size_header: usize,
    /// Token of the `StandAloneSig` row describing the locals, 0 if none
    pub local_var_sig_token: u32,
    /// Maximum number of items on the operand stack
    pub max_stack: usize,
    /// Fat (12-byte) or tiny (1-byte) header
    pub is_fat: bool,
    /// Locals are zero-initialized
    pub is_init_local: bool,
    /// At least one exception clause follows the code
    pub is_exception_data: bool,
    /// All decoded exception clauses
    pub exception_handlers: Vec<ExceptionHandler>,
    /// The IL byte stream
    pub code: Vec<u8>,
}

impl MethodBody {
    /// Decode a method body starting at the first byte of `data`.
    ///
    /// `data` may extend past the end of the method; only the bytes described by the header are
    /// consumed.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown header format and
    /// [`crate::Error::OutOfBounds`] if the body does not fit into `data`.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: 0,
                    max_stack: TINY_MAX_STACK,
                    is_fat: false,
                    is_init_local: false,
                    is_exception_data: false,
                    exception_handlers: Vec::new(),
                    code: data[1..=size_code].to_vec(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;

                let size_header = ((first_duo >> 12) * 4) as usize;
                if size_header < 12 {
                    return Err(malformed_error!(
                        "Fat method header too small - {}",
                        size_header
                    ));
                }

                let size_code = read_le::<u32>(&data[4..])? as usize;
                let Some(code_end) = size_header.checked_add(size_code) else {
                    return Err(OutOfBounds);
                };
                if data.len() < code_end {
                    return Err(OutOfBounds);
                }

                let local_var_sig_token = read_le::<u32>(&data[8..])?;
                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000_1111_1111_1111_u16);
                let max_stack = read_le::<u16>(&data[2..])? as usize;

                let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    Self::read_sections(data, (code_end + 3) & !3)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    size_code,
                    size_header,
                    local_var_sig_token,
                    max_stack,
                    is_fat: true,
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    is_exception_data: !exception_handlers.is_empty(),
                    exception_handlers,
                    code: data[size_header..code_end].to_vec(),
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    fn read_sections(data: &[u8], mut cursor: usize) -> Result<Vec<ExceptionHandler>> {
        let mut exception_handlers = Vec::new();

        loop {
            let section_start = cursor;
            let section_flags = SectionFlags::from_bits_truncate(read_le_at::<u8>(data, &mut cursor)?);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                return Err(malformed_error!(
                    "Unsupported method data section - {:#x}",
                    section_flags.bits()
                ));
            }

            if section_flags.contains(SectionFlags::FAT_FORMAT) {
                let size = read_le::<u32>(&data[section_start..])? & 0xFFFF_FF00;
                let section_size = (size >> 8) as usize;
                if section_size < 4 || data.len() < section_start + section_size {
                    return Err(OutOfBounds);
                }

                cursor = section_start + 4;
                for _ in 0..(section_size - 4) / 24 {
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = read_le_at::<u32>(data, &mut cursor)? as u16;
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                        try_offset: read_le_at::<u32>(data, &mut cursor)?,
                        try_length: read_le_at::<u32>(data, &mut cursor)?,
                        handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                        handler_length: read_le_at::<u32>(data, &mut cursor)?,
                        class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
                cursor = section_start + section_size;
            } else {
                let section_size = read_le_at::<u8>(data, &mut cursor)? as usize;
                if section_size < 4 || data.len() < section_start + section_size {
                    return Err(OutOfBounds);
                }

                cursor = section_start + 4;
                for _ in 0..(section_size - 4) / 12 {
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                            data,
                            &mut cursor,
                        )?),
                        try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        handler_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                        handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                        class_token_or_filter: read_le_at::<u32>(data, &mut cursor)?,
                    });
                }
                cursor = section_start + section_size;
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
            cursor = (cursor + 3) & !3;
        }

        Ok(exception_handlers)
    }

    /// Total size of header and code in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn tiny() {
        // ldc.i4.0; ret
        let data = [0x0A, 0x16, 0x2A, 0xFF];

        let method_header = MethodBody::from(&data).unwrap();

        assert!(!method_header.is_fat);
        assert!(!method_header.is_exception_data);
        assert!(!method_header.is_init_local);
        assert_eq!(method_header.max_stack, 8);
        assert_eq!(method_header.size_code, 2);
        assert_eq!(method_header.size_header, 1);
        assert_eq!(method_header.size(), 3);
        assert_eq!(method_header.local_var_sig_token, 0);
        assert_eq!(method_header.code, vec![0x16, 0x2A]);
    }

    #[test]
    fn fat() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30,             // fat, init locals, header size 3
            0x02, 0x00,             // max stack
            0x03, 0x00, 0x00, 0x00, // code size
            0x01, 0x00, 0x00, 0x11, // local sig token
            0x00, 0x00, 0x2A,
        ];

        let method_header = MethodBody::from(&data).unwrap();

        assert!(method_header.is_fat);
        assert!(!method_header.is_exception_data);
        assert!(method_header.is_init_local);
        assert_eq!(method_header.max_stack, 2);
        assert_eq!(method_header.size_code, 3);
        assert_eq!(method_header.size_header, 12);
        assert_eq!(method_header.size(), 15);
        assert_eq!(method_header.local_var_sig_token, 0x1100_0001);
        assert_eq!(method_header.code, vec![0x00, 0x00, 0x2A]);
    }

    #[test]
    fn fat_small_exceptions() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30,             // fat, init locals, more sections
            0x01, 0x00,
            0x03, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x2A,
            0x00,                   // padding
            0x01, 0x10, 0x00, 0x00, // EHTABLE, 16 bytes
            0x02, 0x00,             // finally
            0x00, 0x00, 0x01,       // try 0..1
            0x01, 0x00, 0x01,       // handler 1..2
            0x00, 0x00, 0x00, 0x00,
        ];

        let method_header = MethodBody::from(&data).unwrap();

        assert!(method_header.is_exception_data);
        assert_eq!(method_header.exception_handlers.len(), 1);
        let handler = &method_header.exception_handlers[0];
        assert_eq!(handler.flags, ExceptionHandlerFlags::FINALLY);
        assert_eq!(handler.try_offset, 0);
        assert_eq!(handler.try_length, 1);
        assert_eq!(handler.handler_offset, 1);
        assert_eq!(handler.handler_length, 1);
    }

    #[test]
    fn fat_large_exceptions() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30,
            0x01, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x2A,
            0x41, 0x1C, 0x00, 0x00, // EHTABLE | FAT, 28 bytes
            0x00, 0x00, 0x00, 0x00, // typed clause
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x05, 0x00, 0x00, 0x01, // TypeRef 5
        ];

        let method_header = MethodBody::from(&data).unwrap();

        assert_eq!(method_header.exception_handlers.len(), 1);
        let handler = &method_header.exception_handlers[0];
        assert_eq!(handler.flags, ExceptionHandlerFlags::EXCEPTION);
        assert_eq!(handler.try_length, 2);
        assert_eq!(handler.handler_offset, 2);
        assert_eq!(handler.class_token_or_filter, 0x0100_0005);
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            MethodBody::from(&[0x00, 0x2A]),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            MethodBody::from(&[0x01, 0x2A]),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(MethodBody::from(&[0x0E, 0x00]), Err(OutOfBounds)));
        assert!(matches!(MethodBody::from(&[0x13, 0x30, 0x00]), Err(OutOfBounds)));
        assert!(MethodBody::from(&[]).is_err());
    }
}
