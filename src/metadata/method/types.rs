//! Flags used by method definitions and method body headers.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Attributes of a `MethodDef` row (ECMA-335 II.23.1.10), the subset the runtime inspects
    pub struct MethodModifiers: u16 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Implementation attributes of a `MethodDef` row (ECMA-335 II.23.1.11)
    pub struct MethodImplFlags: u16 {
        /// Method implementation is native
        const NATIVE = 0x0001;
        /// Method implementation is provided by the runtime
        const RUNTIME = 0x0003;
        /// Method implementation is unmanaged
        const UNMANAGED = 0x0004;
        /// Reserved: shall be zero in conforming implementations
        const INTERNAL_CALL = 0x1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Method body header flags (ECMA-335 II.25.4.4)
    pub struct MethodBodyFlags: u16 {
        /// Method header is tiny
        const TINY_FORMAT = 0x2;
        /// Method header is fat
        const FAT_FORMAT = 0x3;
        /// More sections follow after this header
        const MORE_SECTS = 0x8;
        /// Call default constructor on all local variables
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags of an extra data section following the code (ECMA-335 II.25.4.5)
    pub struct SectionFlags: u8 {
        /// Exception handling data
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// Data format is of the fat variety, meaning there is a 3-byte length
        const FAT_FORMAT = 0x40;
        /// Another data section occurs after this current section
        const MORE_SECTS = 0x80;
    }
}
