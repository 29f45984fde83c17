use crate::{
    file::parser::Parser,
    metadata::{
        signatures::{
            ArrayDimensions, SignatureArray, SignatureField, SignatureLocalVariable,
            SignatureLocalVariables, SignatureMethod, SignatureMethodSpec, SignatureParameter,
            SignaturePointer, SignatureProperty, SignatureSzArray, SignatureTypeSpec,
            TypeSignature, ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        token::Token,
    },
    Error::RecursionLimit,
    Result,
};

const MAX_RECURSION_DEPTH: usize = 50;

/// Decoder for every signature kind found in the `#Blob` heap.
///
/// Nested types (arrays of generic instantiations of pointers ...) are decoded recursively;
/// nesting deeper than 50 levels fails with [`crate::Error::RecursionLimit`].
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a new parser over a signature blob
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    /// Decode a single type (ECMA-335 II.23.2.12)
    ///
    /// # Errors
    /// Returns an error for unknown element types, truncated input or excessive nesting
    pub fn parse_type(&mut self) -> Result<TypeSignature> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let result = self.parse_type_inner();
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        let current_byte = self.parser.read_le::<u8>()?;
        match current_byte {
            ELEMENT_TYPE::VOID => Ok(TypeSignature::Void),
            ELEMENT_TYPE::BOOLEAN => Ok(TypeSignature::Boolean),
            ELEMENT_TYPE::CHAR => Ok(TypeSignature::Char),
            ELEMENT_TYPE::I1 => Ok(TypeSignature::I1),
            ELEMENT_TYPE::U1 => Ok(TypeSignature::U1),
            ELEMENT_TYPE::I2 => Ok(TypeSignature::I2),
            ELEMENT_TYPE::U2 => Ok(TypeSignature::U2),
            ELEMENT_TYPE::I4 => Ok(TypeSignature::I4),
            ELEMENT_TYPE::U4 => Ok(TypeSignature::U4),
            ELEMENT_TYPE::I8 => Ok(TypeSignature::I8),
            ELEMENT_TYPE::U8 => Ok(TypeSignature::U8),
            ELEMENT_TYPE::R4 => Ok(TypeSignature::R4),
            ELEMENT_TYPE::R8 => Ok(TypeSignature::R8),
            ELEMENT_TYPE::STRING => Ok(TypeSignature::String),
            ELEMENT_TYPE::PTR => Ok(TypeSignature::Ptr(SignaturePointer {
                modifiers: self.parse_custom_mods()?,
                base: Box::new(self.parse_type()?),
            })),
            ELEMENT_TYPE::BYREF => Ok(TypeSignature::ByRef(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::VALUETYPE => Ok(TypeSignature::ValueType(
                self.parser.read_compressed_token()?,
            )),
            ELEMENT_TYPE::CLASS => Ok(TypeSignature::Class(self.parser.read_compressed_token()?)),
            ELEMENT_TYPE::VAR => Ok(TypeSignature::GenericParamType(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::ARRAY => {
                let elem_type = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;

                let num_sizes = self.parser.read_compressed_uint()?;
                let mut dimensions: Vec<ArrayDimensions> =
                    Vec::with_capacity(num_sizes.min(rank) as usize);
                for _ in 0..num_sizes {
                    dimensions.push(ArrayDimensions {
                        size: Some(self.parser.read_compressed_uint()?),
                        lower_bound: None,
                    });
                }

                let num_lo_bounds = self.parser.read_compressed_uint()?;
                for i in 0..num_lo_bounds {
                    let lower_bound = self.parser.read_compressed_uint()?;
                    match dimensions.get_mut(i as usize) {
                        Some(dimension) => dimension.lower_bound = Some(lower_bound),
                        None => dimensions.push(ArrayDimensions {
                            size: None,
                            lower_bound: Some(lower_bound),
                        }),
                    }
                }

                Ok(TypeSignature::Array(SignatureArray {
                    base: Box::new(elem_type),
                    rank,
                    dimensions,
                }))
            }
            ELEMENT_TYPE::GENERICINST => {
                let peek_byte = self.parser.peek_byte()?;
                if peek_byte != ELEMENT_TYPE::CLASS && peek_byte != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                        peek_byte
                    ));
                }

                let base_type = self.parse_type()?;
                let arg_count = self.parser.read_compressed_uint()?;

                let mut type_args = Vec::with_capacity(arg_count.min(16) as usize);
                for _ in 0..arg_count {
                    type_args.push(self.parse_type()?);
                }

                Ok(TypeSignature::GenericInst(Box::new(base_type), type_args))
            }
            ELEMENT_TYPE::TYPEDBYREF => Ok(TypeSignature::TypedByRef),
            ELEMENT_TYPE::I => Ok(TypeSignature::I),
            ELEMENT_TYPE::U => Ok(TypeSignature::U),
            ELEMENT_TYPE::FNPTR => {
                self.depth += 1;
                let method = self.parse_method_signature();
                self.depth -= 1;
                Ok(TypeSignature::FnPtr(Box::new(method?)))
            }
            ELEMENT_TYPE::OBJECT => Ok(TypeSignature::Object),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSignature::SzArray(SignatureSzArray {
                modifiers: self.parse_custom_mods()?,
                base: Box::new(self.parse_type()?),
            })),
            ELEMENT_TYPE::MVAR => Ok(TypeSignature::GenericParamMethod(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                let mut modifiers = vec![self.parser.read_compressed_token()?];
                modifiers.extend(self.parse_custom_mods()?);
                if current_byte == ELEMENT_TYPE::CMOD_REQD {
                    Ok(TypeSignature::ModifiedRequired(modifiers))
                } else {
                    Ok(TypeSignature::ModifiedOptional(modifiers))
                }
            }
            ELEMENT_TYPE::INTERNAL => Ok(TypeSignature::Internal),
            ELEMENT_TYPE::MODIFIER => Ok(TypeSignature::Modifier),
            ELEMENT_TYPE::SENTINEL => Ok(TypeSignature::Sentinel),
            ELEMENT_TYPE::PINNED => Ok(TypeSignature::Pinned(Box::new(self.parse_type()?))),
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - {}",
                current_byte
            )),
        }
    }

    fn parse_custom_mods(&mut self) -> Result<Vec<Token>> {
        let mut mods = Vec::new();

        while self.parser.has_more_data() {
            let next_byte = self.parser.peek_byte()?;
            if next_byte != ELEMENT_TYPE::CMOD_OPT && next_byte != ELEMENT_TYPE::CMOD_REQD {
                break;
            }

            self.parser.advance()?;
            mods.push(self.parser.read_compressed_token()?);
        }

        Ok(mods)
    }

    fn parse_param(&mut self) -> Result<SignatureParameter> {
        let custom_mods = self.parse_custom_mods()?;

        let mut by_ref = false;
        if self.parser.peek_byte()? == ELEMENT_TYPE::BYREF {
            self.parser.advance()?;
            by_ref = true;
        }

        Ok(SignatureParameter {
            modifiers: custom_mods,
            by_ref,
            base: self.parse_type()?,
        })
    }

    /// Decode a method signature (ECMA-335 II.23.2.1 - II.23.2.3)
    ///
    /// # Errors
    /// Returns an error on truncated or malformed input
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let convention_byte = self.parser.read_le::<u8>()?;
        let convention = convention_byte & 0x0F;

        let mut method = SignatureMethod {
            has_this: convention_byte & SIGNATURE_HEADER::HAS_THIS != 0,
            explicit_this: convention_byte & SIGNATURE_HEADER::EXPLICIT_THIS != 0,
            default: convention == SIGNATURE_HEADER::DEFAULT,
            vararg: convention == SIGNATURE_HEADER::VARARG,
            cdecl: convention == SIGNATURE_HEADER::C,
            stdcall: convention == SIGNATURE_HEADER::STDCALL,
            thiscall: convention == SIGNATURE_HEADER::THISCALL,
            fastcall: convention == SIGNATURE_HEADER::FASTCALL,
            param_count_generic: if convention_byte & SIGNATURE_HEADER::GENERIC != 0 {
                self.parser.read_compressed_uint()?
            } else {
                0
            },
            param_count: self.parser.read_compressed_uint()?,
            return_type: self.parse_param()?,
            params: Vec::new(),
            varargs: Vec::new(),
        };

        for _ in 0..method.param_count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                // Everything after the sentinel belongs to the vararg part of a call site
                self.parser.advance()?;
                break;
            }

            method.params.push(self.parse_param()?);
        }

        if method.params.len() < method.param_count as usize {
            for _ in method.params.len()..method.param_count as usize {
                method.varargs.push(self.parse_param()?);
            }
        }

        Ok(method)
    }

    /// Decode a field signature (ECMA-335 II.23.2.4)
    ///
    /// # Errors
    /// Returns an error if the blob does not start with `0x06`
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        let custom_mods = self.parse_custom_mods()?;
        let type_sig = self.parse_type()?;

        Ok(SignatureField {
            modifiers: custom_mods,
            base: type_sig,
        })
    }

    /// Decode a property signature (ECMA-335 II.23.2.5)
    ///
    /// # Errors
    /// Returns an error if the `PROPERTY` bit is missing from the header
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let head_byte = self.parser.read_le::<u8>()?;
        if (head_byte & SIGNATURE_HEADER::PROPERTY) == 0 {
            return Err(malformed_error!(
                "SignatureProperty - invalid start - {}",
                head_byte
            ));
        }

        let has_this = (head_byte & SIGNATURE_HEADER::HAS_THIS) != 0;

        let param_count = self.parser.read_compressed_uint()?;
        let custom_mods = self.parse_custom_mods()?;
        let type_sig = self.parse_type()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        for _ in 0..param_count {
            params.push(self.parse_param()?);
        }

        Ok(SignatureProperty {
            has_this,
            modifiers: custom_mods,
            base: type_sig,
            params,
        })
    }

    /// Decode a local variable signature (ECMA-335 II.23.2.6)
    ///
    /// # Errors
    /// Returns an error if the blob does not start with `0x07`
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!(
                "SignatureLocalVar - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;

        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::TYPEDBYREF {
                locals.push(SignatureLocalVariable {
                    modifiers: Vec::new(),
                    is_byref: false,
                    is_pinned: false,
                    base: TypeSignature::TypedByRef,
                });
                self.parser.advance()?;

                continue;
            }

            let mut custom_mods = Vec::new();
            let mut pinned = false;

            while self.parser.has_more_data() {
                match self.parser.peek_byte()? {
                    ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                        self.parser.advance()?;
                        custom_mods.push(self.parser.read_compressed_token()?);
                    }
                    ELEMENT_TYPE::PINNED => {
                        self.parser.advance()?;
                        pinned = true;
                    }
                    _ => break,
                }
            }

            let by_ref = if self.parser.peek_byte()? == ELEMENT_TYPE::BYREF {
                self.parser.advance()?;
                true
            } else {
                false
            };

            let type_sig = self.parse_type()?;

            locals.push(SignatureLocalVariable {
                modifiers: custom_mods,
                is_byref: by_ref,
                is_pinned: pinned,
                base: type_sig,
            });
        }

        Ok(SignatureLocalVariables { locals })
    }

    /// Decode a `TypeSpec` blob (ECMA-335 II.23.2.14)
    ///
    /// # Errors
    /// Returns an error on truncated or malformed input
    pub fn parse_type_spec_signature(&mut self) -> Result<SignatureTypeSpec> {
        let type_sig = self.parse_type()?;
        Ok(SignatureTypeSpec { base: type_sig })
    }

    /// Decode a `MethodSpec` blob (ECMA-335 II.23.2.15)
    ///
    /// # Errors
    /// Returns an error if the blob does not start with `0x0A`
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::GENERIC_INST {
            return Err(malformed_error!(
                "SignatureMethodSpec - invalid start - {}",
                head_byte
            ));
        }

        let arg_count = self.parser.read_compressed_uint()?;
        let mut generic_args = Vec::with_capacity(arg_count.min(16) as usize);
        for _ in 0..arg_count {
            generic_args.push(self.parse_type()?);
        }

        Ok(SignatureMethodSpec { generic_args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn parse_primitive_types() {
        #[rustfmt::skip]
        let test_cases = [
            (vec![0x01], TypeSignature::Void),
            (vec![0x02], TypeSignature::Boolean),
            (vec![0x03], TypeSignature::Char),
            (vec![0x04], TypeSignature::I1),
            (vec![0x05], TypeSignature::U1),
            (vec![0x06], TypeSignature::I2),
            (vec![0x07], TypeSignature::U2),
            (vec![0x08], TypeSignature::I4),
            (vec![0x09], TypeSignature::U4),
            (vec![0x0A], TypeSignature::I8),
            (vec![0x0B], TypeSignature::U8),
            (vec![0x0C], TypeSignature::R4),
            (vec![0x0D], TypeSignature::R8),
            (vec![0x0E], TypeSignature::String),
            (vec![0x1C], TypeSignature::Object),
            (vec![0x18], TypeSignature::I),
            (vec![0x19], TypeSignature::U),
        ];

        for (bytes, expected_type) in test_cases {
            let mut parser = SignatureParser::new(&bytes);
            let result = parser.parse_type().unwrap();
            assert_eq!(result, expected_type);
        }
    }

    #[test]
    fn parse_class_and_valuetype() {
        let mut parser = SignatureParser::new(&[0x12, 0x42]);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::Class(Token::new(0x1B00_0010))
        );

        let mut parser = SignatureParser::new(&[0x11, 0x35]);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::ValueType(Token::new(0x0100_000D))
        );

        let mut parser = SignatureParser::new(&[0x13, 0x03]);
        assert_eq!(
            parser.parse_type().unwrap(),
            TypeSignature::GenericParamType(0x03)
        );
    }

    #[test]
    fn parse_arrays() {
        let mut parser = SignatureParser::new(&[0x1D, 0x08]);
        match parser.parse_type().unwrap() {
            TypeSignature::SzArray(inner) => assert_eq!(*inner.base, TypeSignature::I4),
            other => panic!("unexpected {:?}", other),
        }

        #[rustfmt::skip]
        let mut parser = SignatureParser::new(&[
            0x14,       // ARRAY
            0x08,       // I4
            0x02,       // rank 2
            0x02,       // 2 sizes
            0x03, 0x04,
            0x01,       // 1 lower bound
            0x02,
        ]);
        match parser.parse_type().unwrap() {
            TypeSignature::Array(array) => {
                assert_eq!(*array.base, TypeSignature::I4);
                assert_eq!(array.rank, 2);
                assert_eq!(
                    array.dimensions,
                    vec![
                        ArrayDimensions { size: Some(3), lower_bound: Some(2) },
                        ArrayDimensions { size: Some(4), lower_bound: None },
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_generic_instance() {
        // List<int>
        let mut parser = SignatureParser::new(&[0x15, 0x12, 0x49, 0x01, 0x08]);
        match parser.parse_type().unwrap() {
            TypeSignature::GenericInst(base, args) => {
                assert_eq!(*base, TypeSignature::Class(Token::new(0x0100_0012)));
                assert_eq!(args, vec![TypeSignature::I4]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut parser = SignatureParser::new(&[0x15, 0x08, 0x01, 0x08]);
        assert!(matches!(parser.parse_type(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn parse_modifiers_and_pointers() {
        let mut parser = SignatureParser::new(&[0x0F, 0x1F, 0x42, 0x08]);
        match parser.parse_type().unwrap() {
            TypeSignature::Ptr(ptr) => {
                assert_eq!(ptr.modifiers, vec![Token::new(0x1B00_0010)]);
                assert_eq!(*ptr.base, TypeSignature::I4);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut parser = SignatureParser::new(&[0x1B, 0x00, 0x00, 0x01]);
        match parser.parse_type().unwrap() {
            TypeSignature::FnPtr(method) => assert!(method.params.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_element_type() {
        let mut parser = SignatureParser::new(&[0x17]);
        assert!(matches!(parser.parse_type(), Err(Error::Malformed { .. })));

        let mut parser = SignatureParser::new(&[]);
        assert!(matches!(parser.parse_type(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn recursion_limit() {
        let mut nested = vec![0x1D; 60];
        nested.push(0x08);
        let mut parser = SignatureParser::new(&nested);
        assert!(matches!(parser.parse_type(), Err(RecursionLimit(50))));

        // Depth is released again once a nested type has been decoded
        let mut siblings = vec![0x00, 60];
        siblings.push(0x01);
        for _ in 0..60 {
            siblings.extend_from_slice(&[0x1D, 0x08]);
        }
        let mut parser = SignatureParser::new(&siblings);
        assert_eq!(parser.parse_method_signature().unwrap().params.len(), 60);
    }

    #[test]
    fn vararg_method() {
        #[rustfmt::skip]
        let mut parser = SignatureParser::new(&[
            0x05,       // VARARG
            0x02,       // 2 parameters
            0x01,       // void
            0x08,       // I4
            0x41,       // SENTINEL
            0x0E,       // String
        ]);
        let method = parser.parse_method_signature().unwrap();
        assert!(method.vararg);
        assert!(!method.cdecl);
        assert_eq!(method.params.len(), 1);
        assert_eq!(method.varargs.len(), 1);
        assert_eq!(method.varargs[0].base, TypeSignature::String);
        assert_eq!(method.stack_arguments(), 2);
    }
}
