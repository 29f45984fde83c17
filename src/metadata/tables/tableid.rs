use strum::{EnumCount, EnumIter};

/// Identifiers of the ECMA-335 metadata tables (Partition II, Section 22).
///
/// The discriminant is the table number used in the `valid` bitmask of the `#~` stream and in
/// the high byte of a metadata token. Iteration order through [`strum::IntoEnumIterator`] is
/// ascending, which is also the order in which rows are laid out in the stream.
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
pub enum TableId {
    /// `Module` table (0x00) - The single row describing this module.
    Module = 0x00,
    /// `TypeRef` table (0x01) - References to types defined elsewhere.
    TypeRef = 0x01,
    /// `TypeDef` table (0x02) - Types defined in this module.
    TypeDef = 0x02,
    /// `FieldPtr` table (0x03) - Field indirection for unoptimized metadata.
    FieldPtr = 0x03,
    /// `Field` table (0x04) - Field definitions.
    Field = 0x04,
    /// `MethodPtr` table (0x05) - Method indirection for unoptimized metadata.
    MethodPtr = 0x05,
    /// `MethodDef` table (0x06) - Method definitions, with the RVA of their bodies.
    MethodDef = 0x06,
    /// `ParamPtr` table (0x07) - Parameter indirection for unoptimized metadata.
    ParamPtr = 0x07,
    /// `Param` table (0x08) - Parameter definitions.
    Param = 0x08,
    /// `InterfaceImpl` table (0x09) - Interfaces implemented by types.
    InterfaceImpl = 0x09,
    /// `MemberRef` table (0x0A) - References to fields and methods of other types.
    MemberRef = 0x0A,
    /// `Constant` table (0x0B) - Constant values of fields, parameters and properties.
    Constant = 0x0B,
    /// `CustomAttribute` table (0x0C) - Attribute applications.
    CustomAttribute = 0x0C,
    /// `FieldMarshal` table (0x0D) - Interop marshalling descriptors.
    FieldMarshal = 0x0D,
    /// `DeclSecurity` table (0x0E) - Declarative security.
    DeclSecurity = 0x0E,
    /// `ClassLayout` table (0x0F) - Explicit type layout.
    ClassLayout = 0x0F,
    /// `FieldLayout` table (0x10) - Explicit field offsets.
    FieldLayout = 0x10,
    /// `StandAloneSig` table (0x11) - Local variable and call site signatures.
    StandAloneSig = 0x11,
    /// `EventMap` table (0x12) - Maps types to their events.
    EventMap = 0x12,
    /// `EventPtr` table (0x13) - Event indirection for unoptimized metadata.
    EventPtr = 0x13,
    /// `Event` table (0x14) - Event definitions.
    Event = 0x14,
    /// `PropertyMap` table (0x15) - Maps types to their properties.
    PropertyMap = 0x15,
    /// `PropertyPtr` table (0x16) - Property indirection for unoptimized metadata.
    PropertyPtr = 0x16,
    /// `Property` table (0x17) - Property definitions.
    Property = 0x17,
    /// `MethodSemantics` table (0x18) - Accessor methods of events and properties.
    MethodSemantics = 0x18,
    /// `MethodImpl` table (0x19) - Explicit method overrides.
    MethodImpl = 0x19,
    /// `ModuleRef` table (0x1A) - References to other modules.
    ModuleRef = 0x1A,
    /// `TypeSpec` table (0x1B) - Constructed type signatures.
    TypeSpec = 0x1B,
    /// `ImplMap` table (0x1C) - P/Invoke mappings.
    ImplMap = 0x1C,
    /// `FieldRVA` table (0x1D) - Initial data of static fields.
    FieldRVA = 0x1D,
    /// `EncLog` table (0x1E) - Edit-and-continue log.
    EncLog = 0x1E,
    /// `EncMap` table (0x1F) - Edit-and-continue token map.
    EncMap = 0x1F,
    /// `Assembly` table (0x20) - The assembly manifest.
    Assembly = 0x20,
    /// `AssemblyProcessor` table (0x21) - Unused processor data.
    AssemblyProcessor = 0x21,
    /// `AssemblyOS` table (0x22) - Unused OS data.
    AssemblyOS = 0x22,
    /// `AssemblyRef` table (0x23) - Referenced assemblies.
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor` table (0x24) - Unused processor data of references.
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS` table (0x25) - Unused OS data of references.
    AssemblyRefOS = 0x25,
    /// `File` table (0x26) - Files of a multi-module assembly.
    File = 0x26,
    /// `ExportedType` table (0x27) - Types exported from other modules.
    ExportedType = 0x27,
    /// `ManifestResource` table (0x28) - Resources of the assembly.
    ManifestResource = 0x28,
    /// `NestedClass` table (0x29) - Nesting relationships.
    NestedClass = 0x29,
    /// `GenericParam` table (0x2A) - Generic parameters of types and methods.
    GenericParam = 0x2A,
    /// `MethodSpec` table (0x2B) - Generic method instantiations.
    MethodSpec = 0x2B,
    /// `GenericParamConstraint` table (0x2C) - Constraints on generic parameters.
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// The table with the given number, `None` past `0x2C`.
    #[must_use]
    pub fn from_index(index: u8) -> Option<TableId> {
        use strum::IntoEnumIterator;
        TableId::iter().find(|id| *id as u8 == index)
    }

    /// The token prefix of rows in this table.
    #[must_use]
    pub fn token_base(self) -> u32 {
        (self as u32) << 24
    }
}
