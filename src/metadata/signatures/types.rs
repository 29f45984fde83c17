use crate::metadata::token::Token;

#[allow(non_snake_case, dead_code, missing_docs)]
/// Bytes that identify an element type inside a signature blob (ECMA-335 II.23.1.16)
pub mod ELEMENT_TYPE {
    // Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 ... loCount lo1 ...
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter in a generic method definition, represented as number
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    // Or'd with following element types
    pub const MODIFIER: u8 = 0x40;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

#[allow(non_snake_case, dead_code, missing_docs)]
/// Leading bytes of the different signature kinds (ECMA-335 II.23.2)
pub mod SIGNATURE_HEADER {
    pub const DEFAULT: u8 = 0x00;
    pub const C: u8 = 0x01;
    pub const STDCALL: u8 = 0x02;
    pub const THISCALL: u8 = 0x03;
    pub const FASTCALL: u8 = 0x04;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERIC_INST: u8 = 0x0A;
    pub const GENERIC: u8 = 0x10;
    pub const HAS_THIS: u8 = 0x20;
    pub const EXPLICIT_THIS: u8 = 0x40;
}

/// A single dimension of an array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayDimensions {
    /// The size of this dimension
    pub size: Option<u32>,
    /// The lower bound of this dimension (lowest index that can be used to access an element)
    pub lower_bound: Option<u32>,
}

/// Represents a parsed type in various signatures
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypeSignature {
    #[default]
    /// Not defined
    Unknown,
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// A pointer to a type
    Ptr(SignaturePointer),
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// CIL value-type
    // TypeDefOrRefOrSpecEncoded
    ValueType(Token),
    /// CIL Class
    // TypeDefOrRefOrSpecEncoded
    Class(Token),
    /// Generic type parameter
    GenericParamType(u32),
    /// Array
    Array(SignatureArray),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Type is referenced during runtime
    TypedByRef,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// System.Object
    Object,
    /// Single dimension array
    SzArray(SignatureSzArray),
    /// Generic method parameter
    GenericParamMethod(u32),
    /// Required modifier
    ModifiedRequired(Vec<Token>),
    /// Optional modifier
    ModifiedOptional(Vec<Token>),
    /// Implemented within the CLI
    Internal,
    /// Or'd with following element types
    Modifier,
    /// Sentinel for vararg method signature
    Sentinel,
    /// Local variable pointing at a pinned object
    Pinned(Box<TypeSignature>),
}

impl TypeSignature {
    /// The `ELEMENT_TYPE` byte this signature was decoded from.
    ///
    /// Used to build native binding keys such as `WriteLine$_10`. [`TypeSignature::Unknown`]
    /// maps to `ELEMENT_TYPE::END`.
    #[must_use]
    pub fn element_type_id(&self) -> u8 {
        match self {
            TypeSignature::Unknown => ELEMENT_TYPE::END,
            TypeSignature::Void => ELEMENT_TYPE::VOID,
            TypeSignature::Boolean => ELEMENT_TYPE::BOOLEAN,
            TypeSignature::Char => ELEMENT_TYPE::CHAR,
            TypeSignature::I1 => ELEMENT_TYPE::I1,
            TypeSignature::U1 => ELEMENT_TYPE::U1,
            TypeSignature::I2 => ELEMENT_TYPE::I2,
            TypeSignature::U2 => ELEMENT_TYPE::U2,
            TypeSignature::I4 => ELEMENT_TYPE::I4,
            TypeSignature::U4 => ELEMENT_TYPE::U4,
            TypeSignature::I8 => ELEMENT_TYPE::I8,
            TypeSignature::U8 => ELEMENT_TYPE::U8,
            TypeSignature::R4 => ELEMENT_TYPE::R4,
            TypeSignature::R8 => ELEMENT_TYPE::R8,
            TypeSignature::String => ELEMENT_TYPE::STRING,
            TypeSignature::Ptr(_) => ELEMENT_TYPE::PTR,
            TypeSignature::ByRef(_) => ELEMENT_TYPE::BYREF,
            TypeSignature::ValueType(_) => ELEMENT_TYPE::VALUETYPE,
            TypeSignature::Class(_) => ELEMENT_TYPE::CLASS,
            TypeSignature::GenericParamType(_) => ELEMENT_TYPE::VAR,
            TypeSignature::Array(_) => ELEMENT_TYPE::ARRAY,
            TypeSignature::GenericInst(_, _) => ELEMENT_TYPE::GENERICINST,
            TypeSignature::TypedByRef => ELEMENT_TYPE::TYPEDBYREF,
            TypeSignature::I => ELEMENT_TYPE::I,
            TypeSignature::U => ELEMENT_TYPE::U,
            TypeSignature::FnPtr(_) => ELEMENT_TYPE::FNPTR,
            TypeSignature::Object => ELEMENT_TYPE::OBJECT,
            TypeSignature::SzArray(_) => ELEMENT_TYPE::SZARRAY,
            TypeSignature::GenericParamMethod(_) => ELEMENT_TYPE::MVAR,
            TypeSignature::ModifiedRequired(_) => ELEMENT_TYPE::CMOD_REQD,
            TypeSignature::ModifiedOptional(_) => ELEMENT_TYPE::CMOD_OPT,
            TypeSignature::Internal => ELEMENT_TYPE::INTERNAL,
            TypeSignature::Modifier => ELEMENT_TYPE::MODIFIER,
            TypeSignature::Sentinel => ELEMENT_TYPE::SENTINEL,
            TypeSignature::Pinned(_) => ELEMENT_TYPE::PINNED,
        }
    }

    /// Size in bytes of a primitive value of this type, `None` for everything that lives as a
    /// managed reference (strings, classes, arrays, ...).
    #[must_use]
    pub fn primitive_size(&self) -> Option<usize> {
        match self {
            TypeSignature::Boolean | TypeSignature::I1 | TypeSignature::U1 => Some(1),
            TypeSignature::Char | TypeSignature::I2 | TypeSignature::U2 => Some(2),
            TypeSignature::I4 | TypeSignature::U4 | TypeSignature::R4 => Some(4),
            TypeSignature::I8
            | TypeSignature::U8
            | TypeSignature::R8
            | TypeSignature::I
            | TypeSignature::U => Some(8),
            _ => None,
        }
    }

    /// Returns true for `R4` and `R8`
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, TypeSignature::R4 | TypeSignature::R8)
    }
}

/// An array with shape information
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureArray {
    /// The element type
    pub base: Box<TypeSignature>,
    /// Number of dimensions
    pub rank: u32,
    /// Sizes and lower bounds, as far as encoded
    pub dimensions: Vec<ArrayDimensions>,
}

/// A single dimension, zero-based array
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureSzArray {
    /// Custom modifiers of the element type
    pub modifiers: Vec<Token>,
    /// The element type
    pub base: Box<TypeSignature>,
}

/// An unmanaged pointer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignaturePointer {
    /// Custom modifiers of the target type
    pub modifiers: Vec<Token>,
    /// The target type
    pub base: Box<TypeSignature>,
}

/// A method parameter or return type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureParameter {
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// Passed by reference
    pub by_ref: bool,
    /// The parameter type
    pub base: TypeSignature,
}

/// A `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SignatureMethod {
    /// The method takes an implicit `this`
    pub has_this: bool,
    /// `this` is passed explicitly as the first parameter
    pub explicit_this: bool,
    /// Default calling convention
    pub default: bool,
    /// Variable argument list
    pub vararg: bool,
    /// C calling convention
    pub cdecl: bool,
    /// Standard calling convention
    pub stdcall: bool,
    /// `this` in the first register
    pub thiscall: bool,
    /// Register based calling convention
    pub fastcall: bool,
    /// Number of generic parameters
    pub param_count_generic: u32,
    /// Number of parameters, including varargs
    pub param_count: u32,
    /// The return type
    pub return_type: SignatureParameter,
    /// Fixed parameters
    pub params: Vec<SignatureParameter>,
    /// Parameters following the vararg sentinel
    pub varargs: Vec<SignatureParameter>,
}

impl SignatureMethod {
    /// Number of values a call pops off the operand stack, including `this`.
    #[must_use]
    pub fn stack_arguments(&self) -> usize {
        self.params.len() + self.varargs.len() + usize::from(self.has_this)
    }

    /// True if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !matches!(self.return_type.base, TypeSignature::Void) || self.return_type.by_ref
    }
}

/// A `FieldSig`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureField {
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// The field type
    pub base: TypeSignature,
}

/// A `PropertySig`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureProperty {
    /// Instance property
    pub has_this: bool,
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// The property type
    pub base: TypeSignature,
    /// Indexer parameters
    pub params: Vec<SignatureParameter>,
}

/// A `LocalVarSig`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureLocalVariables {
    /// All declared locals, in slot order
    pub locals: Vec<SignatureLocalVariable>,
}

/// One local variable slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureLocalVariable {
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// Declared as a managed reference
    pub is_byref: bool,
    /// Pinned for the lifetime of the frame
    pub is_pinned: bool,
    /// The variable type
    pub base: TypeSignature,
}

/// A `TypeSpec` blob
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureTypeSpec {
    /// The described type
    pub base: TypeSignature,
}

/// A `MethodSpec` blob
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureMethodSpec {
    /// The generic arguments of the instantiation
    pub generic_args: Vec<TypeSignature>,
}
