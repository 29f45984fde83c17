//! Prepared, shareable method code.

use log::debug;

use crate::{
    emulation::engine::OperandCache,
    metadata::{
        cilimage::CilImage,
        method::MethodBody,
        signatures::{
            parse_local_var_signature, parse_method_signature, SignatureLocalVariable,
            SignatureMethod,
        },
        tables::TableId,
        token::Token,
    },
    Result,
};

/// A `MethodDef` decoded once for execution: body, signature, locals and the operand cache.
///
/// One instance exists per method and assembly; every frame running the method holds an `Rc`
/// to it.
#[derive(Debug)]
pub struct MethodCode {
    /// The `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// The decoded body
    pub body: MethodBody,
    /// The decoded `MethodDefSig`
    pub signature: SignatureMethod,
    /// Local variables, in slot order
    pub locals: Vec<SignatureLocalVariable>,
    /// Operand kinds resolved for the polymorphic instructions of the body
    pub cache: OperandCache,
}

impl MethodCode {
    /// Decode the method `token` of `image`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token is no `MethodDef`, the method has no
    /// body, or its local signature token does not reference a `StandAloneSig` row; any decoding
    /// error of the body or the signatures.
    pub fn prepare(image: &CilImage, token: Token) -> Result<MethodCode> {
        let body = image.method_body(token)?;
        let Some(row) = image.tables().method_def.get(token.row()) else {
            return Err(malformed_error!("MethodDef row does not exist - {}", token));
        };

        let name = image.string(row.name as usize)?.to_string();
        let signature = parse_method_signature(image.blob(row.signature as usize)?)?;

        let locals = if body.local_var_sig_token == 0 {
            Vec::new()
        } else {
            let local_token = Token::new(body.local_var_sig_token);
            let Some(sig) = (local_token.table() == TableId::StandAloneSig as u8)
                .then(|| image.tables().stand_alone_sig.get(local_token.row()))
                .flatten()
            else {
                return Err(malformed_error!(
                    "Invalid local signature token - {}",
                    local_token
                ));
            };
            parse_local_var_signature(image.blob(sig.signature as usize)?)?.locals
        };

        debug!(
            "Prepared {} ({}): {} bytes of IL, {} locals",
            name,
            token,
            body.code.len(),
            locals.len()
        );

        Ok(MethodCode {
            token,
            name,
            cache: OperandCache::new(body.code.len()),
            body,
            signature,
            locals,
        })
    }

    /// The IL bytes.
    #[must_use]
    pub fn il(&self) -> &[u8] {
        &self.body.code
    }
}
