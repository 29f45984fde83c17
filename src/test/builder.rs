use super::metadata::{
    cor20header::COR20_HEADER_SIZE,
    root::CIL_HEADER_MAGIC,
    tables::{CodedIndex, CodedIndexType, TableId},
    token::Token,
};

const PE_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_SIZE: usize = 224;
const TEXT_RVA: usize = 0x2000;
const TEXT_OFFSET: usize = 0x200;
const FILE_ALIGNMENT: usize = 0x200;
const RUNTIME_VERSION: &[u8; 12] = b"v4.0.30319\0\0";

/// `public static hidebysig`
const STATIC_METHOD: u16 = 0x0096;

/// Encode a compressed unsigned integer (ECMA-335 II.23.2).
pub fn compress_uint(value: u32) -> Vec<u8> {
    match value {
        0..=0x7F => vec![value as u8],
        0x80..=0x3FFF => vec![0x80 | (value >> 8) as u8, value as u8],
        _ => vec![
            0xC0 | (value >> 24) as u8,
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ],
    }
}

/// Wrap IL in a tiny method header.
pub fn tiny_body(code: &[u8]) -> Vec<u8> {
    assert!(code.len() < 64, "tiny bodies hold at most 63 bytes of IL");
    let mut body = vec![((code.len() as u8) << 2) | 0x02];
    body.extend_from_slice(code);
    body
}

/// Wrap IL in a fat method header.
pub fn fat_body(max_stack: u16, local_sig: Token, init_locals: bool, code: &[u8]) -> Vec<u8> {
    let flags: u16 = 0x3003 | if init_locals { 0x0010 } else { 0 };
    let mut body = Vec::with_capacity(12 + code.len());
    body.extend_from_slice(&flags.to_le_bytes());
    body.extend_from_slice(&max_stack.to_le_bytes());
    body.extend_from_slice(&(code.len() as u32).to_le_bytes());
    body.extend_from_slice(&local_sig.value().to_le_bytes());
    body.extend_from_slice(code);
    body
}

struct TypeDefRow {
    namespace: u32,
    name: u32,
    method_list: u32,
}

struct MethodRow {
    flags: u16,
    name: u32,
    signature: u32,
    body: Vec<u8>,
}

/// Builds minimal PE32 images carrying ECMA-335 metadata.
///
/// Every image has one `.text` section holding the CLI header, the method bodies and the
/// metadata, an `Assembly` row named after the builder and a `<Module>` type. Methods belong to
/// the type most recently added with [`ImageBuilder::type_def`].
pub struct ImageBuilder {
    strings: Vec<u8>,
    blobs: Vec<u8>,
    user_strings: Vec<u8>,
    module_name: u32,
    assembly_name: u32,
    assembly_refs: Vec<u32>,
    type_refs: Vec<(CodedIndex, u32, u32)>,
    type_defs: Vec<TypeDefRow>,
    methods: Vec<MethodRow>,
    member_refs: Vec<(CodedIndex, u32, u32)>,
    standalone_sigs: Vec<u32>,
    entry_point: Token,
}

impl ImageBuilder {
    /// Start an image for the assembly `name`.
    pub fn new(name: &str) -> Self {
        let mut builder = ImageBuilder {
            strings: vec![0],
            blobs: vec![0],
            user_strings: vec![0],
            module_name: 0,
            assembly_name: 0,
            assembly_refs: Vec::new(),
            type_refs: Vec::new(),
            type_defs: Vec::new(),
            methods: Vec::new(),
            member_refs: Vec::new(),
            standalone_sigs: Vec::new(),
            entry_point: Token::new(0),
        };
        builder.module_name = builder.string(&format!("{name}.exe"));
        builder.assembly_name = builder.string(name);
        builder.type_def("", "<Module>");
        builder
    }

    /// Add an identifier to `#Strings`, returning its index.
    pub fn string(&mut self, value: &str) -> u32 {
        let index = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        index
    }

    /// Add a blob to `#Blob`, returning its index.
    pub fn blob(&mut self, value: &[u8]) -> u32 {
        let index = self.blobs.len() as u32;
        self.blobs.extend(compress_uint(value.len() as u32));
        self.blobs.extend_from_slice(value);
        index
    }

    /// Add a literal to `#US`, returning its `ldstr` token.
    pub fn user_string(&mut self, value: &str) -> Token {
        let index = self.user_strings.len() as u32;
        let units: Vec<u16> = value.encode_utf16().collect();
        self.user_strings
            .extend(compress_uint(units.len() as u32 * 2 + 1));
        for unit in units {
            self.user_strings.extend_from_slice(&unit.to_le_bytes());
        }
        self.user_strings.push(0);
        Token::from_parts(0x70, index)
    }

    /// Add an `AssemblyRef` row, returning its rid.
    pub fn assembly_ref(&mut self, name: &str) -> u32 {
        let name = self.string(name);
        self.assembly_refs.push(name);
        self.assembly_refs.len() as u32
    }

    /// Add a `TypeRef` row, returning its rid.
    pub fn type_ref(&mut self, scope: CodedIndex, namespace: &str, name: &str) -> u32 {
        let namespace = self.string(namespace);
        let name = self.string(name);
        self.type_refs.push((scope, name, namespace));
        self.type_refs.len() as u32
    }

    /// Add a `TypeDef` row owning all methods added after it, returning its rid.
    pub fn type_def(&mut self, namespace: &str, name: &str) -> u32 {
        let namespace = self.string(namespace);
        let name = self.string(name);
        self.type_defs.push(TypeDefRow {
            namespace,
            name,
            method_list: self.methods.len() as u32 + 1,
        });
        self.type_defs.len() as u32
    }

    /// Add a static method with a complete body (header included), returning its token.
    pub fn method(&mut self, name: &str, signature: &[u8], body: &[u8]) -> Token {
        self.method_with_flags(name, STATIC_METHOD, signature, body)
    }

    /// Add a method with explicit `MethodAttributes`, returning its token.
    pub fn method_with_flags(
        &mut self,
        name: &str,
        flags: u16,
        signature: &[u8],
        body: &[u8],
    ) -> Token {
        let name = self.string(name);
        let signature = self.blob(signature);
        self.methods.push(MethodRow {
            flags,
            name,
            signature,
            body: body.to_vec(),
        });
        Token::from_parts(TableId::MethodDef as u8, self.methods.len() as u32)
    }

    /// Add a `MemberRef` row, returning its token.
    pub fn member_ref(&mut self, class: CodedIndex, name: &str, signature: &[u8]) -> Token {
        let name = self.string(name);
        let signature = self.blob(signature);
        self.member_refs.push((class, name, signature));
        Token::from_parts(TableId::MemberRef as u8, self.member_refs.len() as u32)
    }

    /// Add a `StandAloneSig` row, returning its token.
    pub fn standalone_sig(&mut self, signature: &[u8]) -> Token {
        let signature = self.blob(signature);
        self.standalone_sigs.push(signature);
        Token::from_parts(TableId::StandAloneSig as u8, self.standalone_sigs.len() as u32)
    }

    /// Set the CLI header entry point token.
    pub fn entry_point(&mut self, token: Token) {
        self.entry_point = token;
    }

    /// Lay out and serialize the image.
    pub fn build(&self) -> Vec<u8> {
        // .text: CLI header, method bodies (4-byte aligned), metadata
        let mut text = vec![0u8; COR20_HEADER_SIZE];
        let mut method_rvas = Vec::with_capacity(self.methods.len());
        for method in &self.methods {
            align(&mut text, 4);
            if method.body.is_empty() {
                method_rvas.push(0);
                continue;
            }
            method_rvas.push((TEXT_RVA + text.len()) as u32);
            text.extend_from_slice(&method.body);
        }

        align(&mut text, 4);
        let metadata_rva = TEXT_RVA + text.len();
        let metadata = self.metadata(&method_rvas);
        text.extend_from_slice(&metadata);

        let mut cli = Vec::with_capacity(COR20_HEADER_SIZE);
        put_u32(&mut cli, COR20_HEADER_SIZE as u32);
        put_u16(&mut cli, 2);
        put_u16(&mut cli, 5);
        put_u32(&mut cli, metadata_rva as u32);
        put_u32(&mut cli, metadata.len() as u32);
        put_u32(&mut cli, 1); // ILONLY
        put_u32(&mut cli, self.entry_point.value());
        text[..cli.len()].copy_from_slice(&cli);

        let raw_size = text.len().div_ceil(FILE_ALIGNMENT) * FILE_ALIGNMENT;
        let mut image = vec![0u8; TEXT_OFFSET + raw_size];

        image[0] = b'M';
        image[1] = b'Z';
        image[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

        let mut pe = Vec::new();
        pe.extend_from_slice(b"PE\0\0");
        put_u16(&mut pe, 0x014C);
        put_u16(&mut pe, 1);
        put_u32(&mut pe, 0);
        put_u32(&mut pe, 0);
        put_u32(&mut pe, 0);
        put_u16(&mut pe, OPTIONAL_HEADER_SIZE as u16);
        put_u16(&mut pe, 0x0102);

        let optional_start = pe.len();
        pe.resize(optional_start + OPTIONAL_HEADER_SIZE, 0);
        let optional = &mut pe[optional_start..];
        optional[0..2].copy_from_slice(&0x010B_u16.to_le_bytes());
        optional[28..32].copy_from_slice(&0x0040_0000_u32.to_le_bytes());
        optional[32..36].copy_from_slice(&(TEXT_RVA as u32).to_le_bytes());
        optional[36..40].copy_from_slice(&(FILE_ALIGNMENT as u32).to_le_bytes());
        let image_size = TEXT_RVA + text.len().div_ceil(TEXT_RVA) * TEXT_RVA;
        optional[56..60].copy_from_slice(&(image_size as u32).to_le_bytes());
        optional[60..64].copy_from_slice(&(TEXT_OFFSET as u32).to_le_bytes());
        optional[68..70].copy_from_slice(&3_u16.to_le_bytes());
        optional[92..96].copy_from_slice(&16_u32.to_le_bytes());
        optional[208..212].copy_from_slice(&(TEXT_RVA as u32).to_le_bytes());
        optional[212..216].copy_from_slice(&(COR20_HEADER_SIZE as u32).to_le_bytes());

        pe.extend_from_slice(b".text\0\0\0");
        put_u32(&mut pe, text.len() as u32);
        put_u32(&mut pe, TEXT_RVA as u32);
        put_u32(&mut pe, raw_size as u32);
        put_u32(&mut pe, TEXT_OFFSET as u32);
        put_u32(&mut pe, 0);
        put_u32(&mut pe, 0);
        put_u16(&mut pe, 0);
        put_u16(&mut pe, 0);
        put_u32(&mut pe, 0x6000_0020);

        image[PE_OFFSET..PE_OFFSET + pe.len()].copy_from_slice(&pe);
        image[TEXT_OFFSET..TEXT_OFFSET + text.len()].copy_from_slice(&text);
        image
    }

    fn metadata(&self, method_rvas: &[u32]) -> Vec<u8> {
        let mut guids = vec![0u8; 16];
        guids[0] = 0x42;

        let streams: [(&[u8], Vec<u8>); 5] = [
            (b"#~", self.tables(method_rvas)),
            (b"#Strings", self.strings.clone()),
            (b"#US", self.user_strings.clone()),
            (b"#GUID", guids),
            (b"#Blob", self.blobs.clone()),
        ];

        let mut root = Vec::new();
        put_u32(&mut root, CIL_HEADER_MAGIC);
        put_u16(&mut root, 1);
        put_u16(&mut root, 1);
        put_u32(&mut root, 0);
        put_u32(&mut root, RUNTIME_VERSION.len() as u32);
        root.extend_from_slice(RUNTIME_VERSION);
        put_u16(&mut root, 0);
        put_u16(&mut root, streams.len() as u16);

        let directory_len: usize = streams
            .iter()
            .map(|(name, _)| 8 + (name.len() + 4) / 4 * 4)
            .sum();
        let mut offset = root.len() + directory_len;
        let mut bodies = Vec::new();
        for (name, data) in &streams {
            let padded = data.len().div_ceil(4) * 4;
            put_u32(&mut root, offset as u32);
            put_u32(&mut root, padded as u32);
            root.extend_from_slice(name);
            root.push(0);
            align(&mut root, 4);

            bodies.extend_from_slice(data);
            bodies.resize(bodies.len() + padded - data.len(), 0);
            offset += padded;
        }

        root.extend_from_slice(&bodies);
        root
    }

    fn tables(&self, method_rvas: &[u32]) -> Vec<u8> {
        let rows: [(TableId, usize); 8] = [
            (TableId::Module, 1),
            (TableId::TypeRef, self.type_refs.len()),
            (TableId::TypeDef, self.type_defs.len()),
            (TableId::MethodDef, self.methods.len()),
            (TableId::MemberRef, self.member_refs.len()),
            (TableId::StandAloneSig, self.standalone_sigs.len()),
            (TableId::Assembly, 1),
            (TableId::AssemblyRef, self.assembly_refs.len()),
        ];

        let valid = rows
            .iter()
            .filter(|(_, count)| *count > 0)
            .fold(0_u64, |mask, (table, _)| mask | (1 << *table as u64));

        let mut stream = Vec::new();
        put_u32(&mut stream, 0);
        stream.push(2);
        stream.push(0);
        stream.push(0); // every heap index is 2 bytes wide
        stream.push(1);
        stream.extend_from_slice(&valid.to_le_bytes());
        stream.extend_from_slice(&0_u64.to_le_bytes());
        for (_, count) in rows.iter().filter(|(_, count)| *count > 0) {
            put_u32(&mut stream, *count as u32);
        }

        // Module
        put_u16(&mut stream, 0);
        put_u16(&mut stream, self.module_name as u16);
        put_u16(&mut stream, 1);
        put_u16(&mut stream, 0);
        put_u16(&mut stream, 0);

        for (scope, name, namespace) in &self.type_refs {
            put_u16(&mut stream, coded(CodedIndexType::ResolutionScope, scope));
            put_u16(&mut stream, *name as u16);
            put_u16(&mut stream, *namespace as u16);
        }

        for type_def in &self.type_defs {
            put_u32(&mut stream, 0x0010_0001);
            put_u16(&mut stream, type_def.name as u16);
            put_u16(&mut stream, type_def.namespace as u16);
            put_u16(&mut stream, 0);
            put_u16(&mut stream, 1);
            put_u16(&mut stream, type_def.method_list as u16);
        }

        for (method, rva) in self.methods.iter().zip(method_rvas) {
            put_u32(&mut stream, *rva);
            put_u16(&mut stream, 0);
            put_u16(&mut stream, method.flags);
            put_u16(&mut stream, method.name as u16);
            put_u16(&mut stream, method.signature as u16);
            put_u16(&mut stream, 1);
        }

        for (class, name, signature) in &self.member_refs {
            put_u16(&mut stream, coded(CodedIndexType::MemberRefParent, class));
            put_u16(&mut stream, *name as u16);
            put_u16(&mut stream, *signature as u16);
        }

        for signature in &self.standalone_sigs {
            put_u16(&mut stream, *signature as u16);
        }

        // Assembly
        put_u32(&mut stream, 0x8004);
        for part in [1_u16, 0, 0, 0] {
            put_u16(&mut stream, part);
        }
        put_u32(&mut stream, 0);
        put_u16(&mut stream, 0);
        put_u16(&mut stream, self.assembly_name as u16);
        put_u16(&mut stream, 0);

        for name in &self.assembly_refs {
            for part in [4_u16, 0, 0, 0] {
                put_u16(&mut stream, part);
            }
            put_u32(&mut stream, 0);
            put_u16(&mut stream, 0);
            put_u16(&mut stream, *name as u16);
            put_u16(&mut stream, 0);
            put_u16(&mut stream, 0);
        }

        stream
    }
}

fn coded(kind: CodedIndexType, index: &CodedIndex) -> u16 {
    let tag = kind
        .tables()
        .iter()
        .position(|table| *table == index.tag)
        .expect("table is a candidate of the coded index");
    ((index.row << kind.tag_bits()) | tag as u32) as u16
}

fn align(data: &mut Vec<u8>, alignment: usize) {
    let padded = data.len().div_ceil(alignment) * alignment;
    data.resize(padded, 0);
}

fn put_u16(data: &mut Vec<u8>, value: u16) {
    data.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_le_bytes());
}
