//! The decoded, immutable view of one PE/CLI image.
//!
//! [`CilImage`] owns the raw bytes and everything decoded from them at load time: PE headers,
//! the CLI header, the metadata root and all metadata tables. Heaps are addressed lazily through
//! the accessor methods; method bodies are decoded on demand.
//!
//! Loading is fail-fast: a [`CilImage`] is either fully decoded or not produced at all.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrun::metadata::cilimage::CilImage;
//!
//! let image = CilImage::from_file("Fib.exe".as_ref())?;
//! let body = image.method_body(image.entry_point())?;
//! println!("entry point has {} bytes of IL", body.code.len());
//! # Ok::<(), dotrun::Error>(())
//! ```

use std::{ops::Range, path::Path};

use log::debug;

use crate::{
    file::{Backend, File},
    metadata::{
        cor20header::Cor20Header,
        method::MethodBody,
        root::Root,
        streams::{Blob, Guid, Strings, TablesHeader, UserStrings},
        tables::{CodedIndex, MetadataTables, TableId, TypeRefRaw},
        token::Token,
    },
    Error::OutOfBounds,
    Result,
};

/// Table byte of `ldstr` operands, which index the `#US` heap.
pub const USER_STRING_TABLE: u8 = 0x70;

/// Maximum chain of nested `TypeRef`s followed while resolving a scope.
const MAX_NESTING: usize = 64;

/// A `MemberRef` with its declaring type and scope resolved to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReference {
    /// Name of the assembly declaring the member, `None` if it is declared in this image
    pub assembly: Option<String>,
    /// Namespace of the declaring type
    pub namespace: String,
    /// Name of the declaring type
    pub type_name: String,
    /// Member name
    pub name: String,
    /// Signature blob
    pub signature: Vec<u8>,
}

impl MemberReference {
    /// `namespace.type_name`, or just the type name for the global namespace
    #[must_use]
    pub fn full_type_name(&self) -> String {
        if self.namespace.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}.{}", self.namespace, self.type_name)
        }
    }
}

/// A fully decoded PE/CLI image.
#[derive(Debug)]
pub struct CilImage {
    file: File,
    cor20header: Cor20Header,
    root: Root,
    tables: TablesHeader,
    strings: Range<usize>,
    userstrings: Range<usize>,
    blobs: Range<usize>,
    guids: Range<usize>,
}

impl CilImage {
    /// Load and decode an image from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or any error of
    /// [`CilImage::from_mem`].
    pub fn from_file(file: &Path) -> Result<CilImage> {
        Self::load(File::from_file(file)?)
    }

    /// Decode an image held in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`], [`crate::Error::OutOfBounds`] or
    /// [`crate::Error::NotSupported`] for any inconsistency in the PE headers, the CLI header,
    /// the metadata root, the stream directory or the tables.
    pub fn from_mem(data: Vec<u8>) -> Result<CilImage> {
        Self::load(File::from_mem(data)?)
    }

    pub(crate) fn from_backend(data: Box<dyn Backend>) -> Result<CilImage> {
        Self::load(File::load(data)?)
    }

    fn load(file: File) -> Result<CilImage> {
        let (clr_rva, clr_size) = file.clr();
        let clr_offset = file.rva_to_offset(clr_rva)?;
        let cor20header = Cor20Header::read(file.data_slice(clr_offset, clr_size)?)?;

        let meta_offset = file.rva_to_offset(cor20header.meta_data_rva as usize)?;
        let meta_size = cor20header.meta_data_size as usize;
        let meta_data = file.data_slice(meta_offset, meta_size)?;
        let root = Root::read(meta_data)?;

        let range_of = |name: &str| {
            root.stream(name).map_or(0..0, |header| {
                let start = meta_offset + header.offset as usize;
                start..start + header.size as usize
            })
        };

        let Some(tables_stream) = root.stream("#~") else {
            return Err(malformed_error!("Metadata has no #~ stream"));
        };
        let tables_start = tables_stream.offset as usize;
        let tables = TablesHeader::from(
            &meta_data[tables_start..tables_start + tables_stream.size as usize],
        )?;

        let image = CilImage {
            strings: range_of("#Strings"),
            userstrings: range_of("#US"),
            blobs: range_of("#Blob"),
            guids: range_of("#GUID"),
            file,
            cor20header,
            root,
            tables,
        };

        // Validate the heap headers once so the accessors cannot fail on them later
        image.strings()?;
        image.userstrings()?;
        image.blobs()?;
        image.guids()?;

        debug!(
            "loaded image {:?}: runtime {}, {} tables, entry point {}",
            image.assembly_name().unwrap_or("<module>"),
            image.root.version,
            image.tables.table_count(),
            image.entry_point()
        );

        Ok(image)
    }

    /// The PE file this image was decoded from.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// The CLI header.
    #[must_use]
    pub fn cor20header(&self) -> &Cor20Header {
        &self.cor20header
    }

    /// The metadata root and its stream directory.
    #[must_use]
    pub fn metadata_root(&self) -> &Root {
        &self.root
    }

    /// The decoded `#~` stream header, including the table row counts.
    #[must_use]
    pub fn tables_header(&self) -> &TablesHeader {
        &self.tables
    }

    /// The decoded metadata tables.
    #[must_use]
    pub fn tables(&self) -> &MetadataTables {
        &self.tables.tables
    }

    /// The entry point token of the CLI header; may be null or reference a `File` row.
    #[must_use]
    pub fn entry_point(&self) -> Token {
        Token::new(self.cor20header.entry_point_token)
    }

    /// The name in the `Assembly` table, `None` for a plain module.
    #[must_use]
    pub fn assembly_name(&self) -> Option<&str> {
        self.tables()
            .assembly
            .get(1)
            .and_then(|row| self.string(row.name as usize).ok())
    }

    fn heap(&self, range: &Range<usize>) -> &[u8] {
        self.file.data().get(range.clone()).unwrap_or(&[])
    }

    /// View of the `#Strings` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn strings(&self) -> Result<Strings<'_>> {
        Strings::from(self.heap(&self.strings))
    }

    /// View of the `#US` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty entry.
    pub fn userstrings(&self) -> Result<UserStrings<'_>> {
        UserStrings::from(self.heap(&self.userstrings))
    }

    /// View of the `#Blob` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn blobs(&self) -> Result<Blob<'_>> {
        Blob::from(self.heap(&self.blobs))
    }

    /// View of the `#GUID` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap size is not a multiple of 16.
    pub fn guids(&self) -> Result<Guid<'_>> {
        Guid::from(self.heap(&self.guids))
    }

    /// The identifier at `index` of the `#Strings` heap.
    ///
    /// # Errors
    /// Returns an error if `index` does not address a valid string.
    pub fn string(&self, index: usize) -> Result<&str> {
        self.strings()?.get(index)
    }

    /// The blob at `index` of the `#Blob` heap.
    ///
    /// # Errors
    /// Returns an error if `index` does not address a valid blob.
    pub fn blob(&self, index: usize) -> Result<&[u8]> {
        self.blobs()?.get(index)
    }

    /// The GUID at 1-based `index` of the `#GUID` heap.
    ///
    /// # Errors
    /// Returns an error if `index` lies past the heap.
    pub fn guid(&self, index: usize) -> Result<uguid::Guid> {
        self.guids()?.get(index)
    }

    /// The string literal referenced by an `ldstr` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a token outside the `#US` table space and
    /// [`crate::Error::OutOfBounds`] if the entry lies past the heap.
    pub fn user_string(&self, token: Token) -> Result<String> {
        if token.table() != USER_STRING_TABLE {
            return Err(malformed_error!("Not a user string token - {}", token));
        }

        self.userstrings()?.get(token.row() as usize)
    }

    /// Decode the body of the `MethodDef` referenced by `token`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token is not a `MethodDef` row with an RVA,
    /// or any error of [`MethodBody::from`].
    pub fn method_body(&self, token: Token) -> Result<MethodBody> {
        if token.table() != TableId::MethodDef as u8 {
            return Err(malformed_error!("Not a MethodDef token - {}", token));
        }

        let Some(method) = self.tables().method_def.get(token.row()) else {
            return Err(malformed_error!("MethodDef row does not exist - {}", token));
        };

        if method.rva == 0 {
            return Err(malformed_error!("Method has no body - {}", token));
        }

        let offset = self.file.rva_to_offset(method.rva as usize)?;
        let data = self.file.data().get(offset..).ok_or(OutOfBounds)?;
        MethodBody::from(data)
    }

    /// Namespace and name of a `TypeDef` or `TypeRef` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for any other table or a missing row.
    pub fn type_name(&self, token: Token) -> Result<(&str, &str)> {
        let (namespace, name) = match TableId::from_index(token.table()) {
            Some(TableId::TypeDef) => self
                .tables()
                .type_def
                .get(token.row())
                .map(|row| (row.type_namespace, row.type_name)),
            Some(TableId::TypeRef) => self
                .tables()
                .type_ref
                .get(token.row())
                .map(|row| (row.type_namespace, row.type_name)),
            _ => None,
        }
        .ok_or_else(|| malformed_error!("Token does not name a type - {}", token))?;

        Ok((self.string(namespace as usize)?, self.string(name as usize)?))
    }

    /// Find a `TypeDef` by namespace and name, returning its row id.
    #[must_use]
    pub fn find_type(&self, namespace: &str, name: &str) -> Option<u32> {
        self.tables()
            .type_def
            .iter()
            .find(|row| {
                self.string(row.type_name as usize).ok() == Some(name)
                    && self.string(row.type_namespace as usize).ok() == Some(namespace)
            })
            .map(|row| row.rid)
    }

    /// Find a method of `TypeDef` row `type_rid` by name and exact signature blob.
    #[must_use]
    pub fn find_method(&self, type_rid: u32, name: &str, signature: &[u8]) -> Option<Token> {
        let tables = self.tables();
        tables
            .methods_of(type_rid)
            .filter_map(|rid| tables.method_def.get(rid))
            .find(|row| {
                self.string(row.name as usize).ok() == Some(name)
                    && self.blob(row.signature as usize).ok() == Some(signature)
            })
            .map(|row| row.token)
    }

    /// Resolve a `MemberRef` token to its declaring type, scope and signature.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not exist or its parent is not a
    /// `TypeDef` or `TypeRef`.
    pub fn member_reference(&self, token: Token) -> Result<MemberReference> {
        let tables = self.tables();
        let Some(member) = (token.table() == TableId::MemberRef as u8)
            .then(|| tables.member_ref.get(token.row()))
            .flatten()
        else {
            return Err(malformed_error!("MemberRef row does not exist - {}", token));
        };

        let (assembly, namespace, type_name) = match member.class.tag {
            TableId::TypeRef => {
                let Some(type_ref) = tables.type_ref.get(member.class.row) else {
                    return Err(malformed_error!(
                        "MemberRef parent does not exist - {}",
                        member.class.token
                    ));
                };
                (
                    self.resolution_scope(type_ref)?,
                    self.string(type_ref.type_namespace as usize)?,
                    self.string(type_ref.type_name as usize)?,
                )
            }
            TableId::TypeDef => {
                let (namespace, name) = self.type_name(member.class.token)?;
                (None, namespace, name)
            }
            _ => {
                return Err(malformed_error!(
                    "Unsupported MemberRef parent - {}",
                    member.class.token
                ))
            }
        };

        Ok(MemberReference {
            assembly,
            namespace: namespace.to_string(),
            type_name: type_name.to_string(),
            name: self.string(member.name as usize)?.to_string(),
            signature: self.blob(member.signature as usize)?.to_vec(),
        })
    }

    /// Name of the assembly a `TypeRef` resolves in, following nested type references outward.
    fn resolution_scope(&self, type_ref: &TypeRefRaw) -> Result<Option<String>> {
        let tables = self.tables();
        let mut scope: CodedIndex = type_ref.resolution_scope;

        for _ in 0..MAX_NESTING {
            match scope.tag {
                TableId::AssemblyRef => {
                    let Some(assembly_ref) = tables.assembly_ref.get(scope.row) else {
                        return Err(malformed_error!(
                            "AssemblyRef does not exist - {}",
                            scope.token
                        ));
                    };
                    return Ok(Some(self.string(assembly_ref.name as usize)?.to_string()));
                }
                TableId::TypeRef => {
                    let Some(outer) = tables.type_ref.get(scope.row) else {
                        return Err(malformed_error!("TypeRef does not exist - {}", scope.token));
                    };
                    scope = outer.resolution_scope;
                }
                _ => return Ok(None),
            }
        }

        Err(malformed_error!(
            "TypeRef nesting too deep - {}",
            type_ref.token
        ))
    }
}
