//! Shared helpers for the integration tests.
//!
//! The image builder is the same one the unit tests use; it is mounted here so that every test
//! binary can assemble PE images without binary fixtures.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use dotrun::{
    emulation::runtime::{ConsoleLibrary, MemorySource, CORLIB},
    metadata::{
        self,
        tables::{CodedIndex, TableId},
        token::Token,
    },
    AppDomain, Result, RuntimeConfig,
};

#[path = "../../src/test/builder.rs"]
mod builder;

pub use builder::{compress_uint, fat_body, tiny_body, ImageBuilder};

/// `static int32 ()`
pub const INT_SIG: [u8; 3] = [0x00, 0x00, 0x08];
/// `static void ()`
pub const VOID_SIG: [u8; 3] = [0x00, 0x00, 0x01];
/// `static void (int32)`
pub const WRITE_INT_SIG: [u8; 4] = [0x00, 0x01, 0x01, 0x08];

/// Encode `opcode` followed by a metadata token.
pub fn with_token(opcode: u8, token: Token) -> Vec<u8> {
    let mut il = vec![opcode];
    il.extend_from_slice(&token.value().to_le_bytes());
    il
}

/// Add a `MemberRef` to `mscorlib`'s `System.Console` method `name`.
pub fn console_method(builder: &mut ImageBuilder, name: &str, signature: &[u8]) -> Token {
    let corlib = builder.assembly_ref(CORLIB);
    let console = builder.type_ref(
        CodedIndex::new(TableId::AssemblyRef, corlib),
        "System",
        "Console",
    );
    builder.member_ref(CodedIndex::new(TableId::TypeRef, console), name, signature)
}

/// A domain whose console output is captured in the returned buffer.
pub fn capturing_domain(
    config: RuntimeConfig,
    source: MemorySource,
) -> Result<(AppDomain, Rc<RefCell<Vec<u8>>>)> {
    let output = Rc::new(RefCell::new(Vec::<u8>::new()));
    let mut domain = AppDomain::new(config, Box::new(source))?;
    domain.register_native(CORLIB, Box::new(ConsoleLibrary::new(output.clone())));
    Ok((domain, output))
}
