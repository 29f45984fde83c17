//! Row schemas of all metadata tables (ECMA-335 II.22).
//!
//! Each schema lists the columns of a table in stream order. A column is one of:
//!
//! - `u16` / `u32` - fixed-width constant
//! - `string` / `guid` / `blob` - heap index, 2 or 4 bytes per the heap size flags
//! - `table X` - simple index into table `X`, 2 or 4 bytes per its row count
//! - `coded X` - [`CodedIndex`] of kind `X`

use std::ops::Range;

use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        tables::{CodedIndex, CodedIndexType, MetadataTable, RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

macro_rules! column_ty {
    (u16) => { u16 };
    (u32) => { u32 };
    (string) => { u32 };
    (guid) => { u32 };
    (blob) => { u32 };
    (table $table:ident) => { u32 };
    (coded $kind:ident) => { CodedIndex };
}

macro_rules! column_size {
    ($sizes:ident; u16) => { 2_u8 };
    ($sizes:ident; u32) => { 4_u8 };
    ($sizes:ident; string) => { $sizes.str_bytes() };
    ($sizes:ident; guid) => { $sizes.guid_bytes() };
    ($sizes:ident; blob) => { $sizes.blob_bytes() };
    ($sizes:ident; table $table:ident) => { $sizes.table_index_bytes(TableId::$table) };
    ($sizes:ident; coded $kind:ident) => { $sizes.coded_index_bytes(CodedIndexType::$kind) };
}

macro_rules! column_read {
    ($data:ident, $offset:ident, $sizes:ident; u16) => {
        read_le_at::<u16>($data, $offset)?
    };
    ($data:ident, $offset:ident, $sizes:ident; u32) => {
        read_le_at::<u32>($data, $offset)?
    };
    ($data:ident, $offset:ident, $sizes:ident; string) => {
        read_le_at_dyn($data, $offset, $sizes.is_large_str())?
    };
    ($data:ident, $offset:ident, $sizes:ident; guid) => {
        read_le_at_dyn($data, $offset, $sizes.is_large_guid())?
    };
    ($data:ident, $offset:ident, $sizes:ident; blob) => {
        read_le_at_dyn($data, $offset, $sizes.is_large_blob())?
    };
    ($data:ident, $offset:ident, $sizes:ident; table $table:ident) => {
        read_le_at_dyn($data, $offset, $sizes.table_index_bytes(TableId::$table) == 4)?
    };
    ($data:ident, $offset:ident, $sizes:ident; coded $kind:ident) => {
        CodedIndex::read($data, $offset, $sizes, CodedIndexType::$kind)?
    };
}

macro_rules! metadata_rows {
    ($(
        $(#[$doc:meta])*
        $table:ident($snake:ident) => $raw:ident {
            $( $field:ident : $kind:ident $($arg:ident)? ),* $(,)?
        }
    )*) => {
        $(
            $(#[$doc])*
            #[derive(Clone, Debug, PartialEq)]
            pub struct $raw {
                /// Row id, 1-based
                pub rid: u32,
                /// Token of this row
                pub token: Token,
                /// Byte offset of the row within the `#~` stream
                pub offset: usize,
                $(
                    #[doc = concat!("`", stringify!($field), "` column")]
                    pub $field: column_ty!($kind $($arg)?),
                )*
            }

            impl RowReadable for $raw {
                fn row_size(sizes: &TableInfo) -> u32 {
                    0 $( + u32::from(column_size!(sizes; $kind $($arg)?)) )*
                }

                fn row_read(
                    data: &[u8],
                    offset: &mut usize,
                    rid: u32,
                    sizes: &TableInfo,
                ) -> Result<Self> {
                    let start = *offset;
                    Ok($raw {
                        rid,
                        token: Token::from_parts(TableId::$table as u8, rid),
                        offset: start,
                        $( $field: column_read!(data, offset, sizes; $kind $($arg)?), )*
                    })
                }
            }
        )*

        /// The decoded tables of one image.
        #[derive(Debug, Clone)]
        pub struct MetadataTables {
            $(
                #[doc = concat!("The `", stringify!($table), "` table")]
                pub $snake: MetadataTable<$raw>,
            )*
            /// Parent to child row ranges
            pub ranges: ChildRanges,
        }

        impl MetadataTables {
            /// Decode every table, in ascending table order, starting at `offset`.
            ///
            /// # Errors
            /// Returns an error if any table is truncated.
            pub fn read(data: &[u8], offset: &mut usize, info: &TableInfo) -> Result<Self> {
                let mut tables = MetadataTables {
                    $(
                        $snake: MetadataTable::read(data, offset, info.rows(TableId::$table), info)?,
                    )*
                    ranges: ChildRanges::default(),
                };

                tables.ranges = ChildRanges::resolve(&tables);
                Ok(tables)
            }

            /// Number of rows of a table.
            #[must_use]
            pub fn row_count(&self, table: TableId) -> u32 {
                match table {
                    $( TableId::$table => self.$snake.row_count(), )*
                }
            }
        }
    };
}

metadata_rows! {
    /// `Module` (0x00)
    Module(module) => ModuleRaw {
        generation: u16,
        name: string,
        mvid: guid,
        enc_id: guid,
        enc_base_id: guid,
    }

    /// `TypeRef` (0x01)
    TypeRef(type_ref) => TypeRefRaw {
        resolution_scope: coded ResolutionScope,
        type_name: string,
        type_namespace: string,
    }

    /// `TypeDef` (0x02)
    TypeDef(type_def) => TypeDefRaw {
        flags: u32,
        type_name: string,
        type_namespace: string,
        extends: coded TypeDefOrRef,
        field_list: table Field,
        method_list: table MethodDef,
    }

    /// `FieldPtr` (0x03)
    FieldPtr(field_ptr) => FieldPtrRaw {
        field: table Field,
    }

    /// `Field` (0x04)
    Field(field) => FieldRaw {
        flags: u16,
        name: string,
        signature: blob,
    }

    /// `MethodPtr` (0x05)
    MethodPtr(method_ptr) => MethodPtrRaw {
        method: table MethodDef,
    }

    /// `MethodDef` (0x06)
    MethodDef(method_def) => MethodDefRaw {
        rva: u32,
        impl_flags: u16,
        flags: u16,
        name: string,
        signature: blob,
        param_list: table Param,
    }

    /// `ParamPtr` (0x07)
    ParamPtr(param_ptr) => ParamPtrRaw {
        param: table Param,
    }

    /// `Param` (0x08)
    Param(param) => ParamRaw {
        flags: u16,
        sequence: u16,
        name: string,
    }

    /// `InterfaceImpl` (0x09)
    InterfaceImpl(interface_impl) => InterfaceImplRaw {
        class: table TypeDef,
        interface: coded TypeDefOrRef,
    }

    /// `MemberRef` (0x0A)
    MemberRef(member_ref) => MemberRefRaw {
        class: coded MemberRefParent,
        name: string,
        signature: blob,
    }

    /// `Constant` (0x0B); the one-byte element type and its padding byte read as one `u16`
    Constant(constant) => ConstantRaw {
        base: u16,
        parent: coded HasConstant,
        value: blob,
    }

    /// `CustomAttribute` (0x0C)
    CustomAttribute(custom_attribute) => CustomAttributeRaw {
        parent: coded HasCustomAttribute,
        constructor: coded CustomAttributeType,
        value: blob,
    }

    /// `FieldMarshal` (0x0D)
    FieldMarshal(field_marshal) => FieldMarshalRaw {
        parent: coded HasFieldMarshal,
        native_type: blob,
    }

    /// `DeclSecurity` (0x0E)
    DeclSecurity(decl_security) => DeclSecurityRaw {
        action: u16,
        parent: coded HasDeclSecurity,
        permission_set: blob,
    }

    /// `ClassLayout` (0x0F)
    ClassLayout(class_layout) => ClassLayoutRaw {
        packing_size: u16,
        class_size: u32,
        parent: table TypeDef,
    }

    /// `FieldLayout` (0x10)
    FieldLayout(field_layout) => FieldLayoutRaw {
        field_offset: u32,
        field: table Field,
    }

    /// `StandAloneSig` (0x11)
    StandAloneSig(stand_alone_sig) => StandAloneSigRaw {
        signature: blob,
    }

    /// `EventMap` (0x12)
    EventMap(event_map) => EventMapRaw {
        parent: table TypeDef,
        event_list: table Event,
    }

    /// `EventPtr` (0x13)
    EventPtr(event_ptr) => EventPtrRaw {
        event: table Event,
    }

    /// `Event` (0x14)
    Event(event) => EventRaw {
        flags: u16,
        name: string,
        event_type: coded TypeDefOrRef,
    }

    /// `PropertyMap` (0x15)
    PropertyMap(property_map) => PropertyMapRaw {
        parent: table TypeDef,
        property_list: table Property,
    }

    /// `PropertyPtr` (0x16)
    PropertyPtr(property_ptr) => PropertyPtrRaw {
        property: table Property,
    }

    /// `Property` (0x17)
    Property(property) => PropertyRaw {
        flags: u16,
        name: string,
        signature: blob,
    }

    /// `MethodSemantics` (0x18)
    MethodSemantics(method_semantics) => MethodSemanticsRaw {
        semantics: u16,
        method: table MethodDef,
        association: coded HasSemantics,
    }

    /// `MethodImpl` (0x19)
    MethodImpl(method_impl) => MethodImplRaw {
        class: table TypeDef,
        method_body: coded MethodDefOrRef,
        method_declaration: coded MethodDefOrRef,
    }

    /// `ModuleRef` (0x1A)
    ModuleRef(module_ref) => ModuleRefRaw {
        name: string,
    }

    /// `TypeSpec` (0x1B)
    TypeSpec(type_spec) => TypeSpecRaw {
        signature: blob,
    }

    /// `ImplMap` (0x1C)
    ImplMap(impl_map) => ImplMapRaw {
        mapping_flags: u16,
        member_forwarded: coded MemberForwarded,
        import_name: string,
        import_scope: table ModuleRef,
    }

    /// `FieldRVA` (0x1D)
    FieldRVA(field_rva) => FieldRvaRaw {
        rva: u32,
        field: table Field,
    }

    /// `EncLog` (0x1E)
    EncLog(enc_log) => EncLogRaw {
        token_value: u32,
        func_code: u32,
    }

    /// `EncMap` (0x1F)
    EncMap(enc_map) => EncMapRaw {
        token_value: u32,
    }

    /// `Assembly` (0x20)
    Assembly(assembly) => AssemblyRaw {
        hash_alg_id: u32,
        major_version: u16,
        minor_version: u16,
        build_number: u16,
        revision_number: u16,
        flags: u32,
        public_key: blob,
        name: string,
        culture: string,
    }

    /// `AssemblyProcessor` (0x21)
    AssemblyProcessor(assembly_processor) => AssemblyProcessorRaw {
        processor: u32,
    }

    /// `AssemblyOS` (0x22)
    AssemblyOS(assembly_os) => AssemblyOsRaw {
        os_platform_id: u32,
        os_major_version: u32,
        os_minor_version: u32,
    }

    /// `AssemblyRef` (0x23)
    AssemblyRef(assembly_ref) => AssemblyRefRaw {
        major_version: u16,
        minor_version: u16,
        build_number: u16,
        revision_number: u16,
        flags: u32,
        public_key_or_token: blob,
        name: string,
        culture: string,
        hash_value: blob,
    }

    /// `AssemblyRefProcessor` (0x24)
    AssemblyRefProcessor(assembly_ref_processor) => AssemblyRefProcessorRaw {
        processor: u32,
        assembly_ref: table AssemblyRef,
    }

    /// `AssemblyRefOS` (0x25)
    AssemblyRefOS(assembly_ref_os) => AssemblyRefOsRaw {
        os_platform_id: u32,
        os_major_version: u32,
        os_minor_version: u32,
        assembly_ref: table AssemblyRef,
    }

    /// `File` (0x26)
    File(file) => FileRaw {
        flags: u32,
        name: string,
        hash_value: blob,
    }

    /// `ExportedType` (0x27)
    ExportedType(exported_type) => ExportedTypeRaw {
        flags: u32,
        type_def_id: u32,
        type_name: string,
        type_namespace: string,
        implementation: coded Implementation,
    }

    /// `ManifestResource` (0x28)
    ManifestResource(manifest_resource) => ManifestResourceRaw {
        data_offset: u32,
        flags: u32,
        name: string,
        implementation: coded Implementation,
    }

    /// `NestedClass` (0x29)
    NestedClass(nested_class) => NestedClassRaw {
        nested_class: table TypeDef,
        enclosing_class: table TypeDef,
    }

    /// `GenericParam` (0x2A)
    GenericParam(generic_param) => GenericParamRaw {
        number: u16,
        flags: u16,
        owner: coded TypeOrMethodDef,
        name: string,
    }

    /// `MethodSpec` (0x2B)
    MethodSpec(method_spec) => MethodSpecRaw {
        method: coded MethodDefOrRef,
        instantiation: blob,
    }

    /// `GenericParamConstraint` (0x2C)
    GenericParamConstraint(generic_param_constraint) => GenericParamConstraintRaw {
        owner: table GenericParam,
        constraint: coded TypeDefOrRef,
    }
}

/// Contiguous child row runs owned by parent rows.
///
/// Each entry is a half-open range of 1-based child row ids, indexed by `parent rid - 1`.
#[derive(Debug, Clone, Default)]
pub struct ChildRanges {
    /// `TypeDef` → `Field`
    pub type_fields: Vec<Range<u32>>,
    /// `TypeDef` → `MethodDef`
    pub type_methods: Vec<Range<u32>>,
    /// `MethodDef` → `Param`
    pub method_params: Vec<Range<u32>>,
    /// `EventMap` → `Event`
    pub map_events: Vec<Range<u32>>,
    /// `PropertyMap` → `Property`
    pub map_properties: Vec<Range<u32>>,
}

impl ChildRanges {
    fn resolve(tables: &MetadataTables) -> Self {
        let type_defs = &tables.type_def;
        ChildRanges {
            type_fields: runs(
                type_defs.iter().map(|row| row.field_list),
                tables.field.row_count(),
            ),
            type_methods: runs(
                type_defs.iter().map(|row| row.method_list),
                tables.method_def.row_count(),
            ),
            method_params: runs(
                tables.method_def.iter().map(|row| row.param_list),
                tables.param.row_count(),
            ),
            map_events: runs(
                tables.event_map.iter().map(|row| row.event_list),
                tables.event.row_count(),
            ),
            map_properties: runs(
                tables.property_map.iter().map(|row| row.property_list),
                tables.property.row_count(),
            ),
        }
    }
}

/// Turn the list column of successive parents into child runs; the last parent runs to the end
/// of the child table, and every run is clamped to it.
fn runs(starts: impl Iterator<Item = u32>, child_rows: u32) -> Vec<Range<u32>> {
    let starts: Vec<u32> = starts.collect();
    let limit = child_rows + 1;

    starts
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = starts.get(index + 1).copied().unwrap_or(limit);
            let start = start.clamp(1, limit);
            start..end.clamp(start, limit)
        })
        .collect()
}

impl MetadataTables {
    fn range(ranges: &[Range<u32>], parent: u32) -> Range<u32> {
        parent
            .checked_sub(1)
            .and_then(|index| ranges.get(index as usize))
            .cloned()
            .unwrap_or(0..0)
    }

    /// `Field` rows owned by a `TypeDef`.
    #[must_use]
    pub fn fields_of(&self, type_rid: u32) -> Range<u32> {
        Self::range(&self.ranges.type_fields, type_rid)
    }

    /// `MethodDef` rows owned by a `TypeDef`.
    #[must_use]
    pub fn methods_of(&self, type_rid: u32) -> Range<u32> {
        Self::range(&self.ranges.type_methods, type_rid)
    }

    /// `Param` rows owned by a `MethodDef`.
    #[must_use]
    pub fn params_of(&self, method_rid: u32) -> Range<u32> {
        Self::range(&self.ranges.method_params, method_rid)
    }

    /// `Event` rows owned by an `EventMap` row.
    #[must_use]
    pub fn events_of(&self, map_rid: u32) -> Range<u32> {
        Self::range(&self.ranges.map_events, map_rid)
    }

    /// `Property` rows owned by a `PropertyMap` row.
    #[must_use]
    pub fn properties_of(&self, map_rid: u32) -> Range<u32> {
        Self::range(&self.ranges.map_properties, map_rid)
    }

    /// The `TypeDef` owning a `MethodDef`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn declaring_type(&self, method_rid: u32) -> Option<u32> {
        self.ranges
            .type_methods
            .iter()
            .position(|range| range.contains(&method_rid))
            .map(|index| index as u32 + 1)
    }
}
