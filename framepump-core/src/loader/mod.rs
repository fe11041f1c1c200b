//! Turns guest content bytes into a compiled `wasmtime::Module`.
//!
//! libretro hands us raw content bytes and the CLI may be pointed at any file, so the format
//! is sniffed from the bytes themselves rather than from the extension.

use std::borrow::Cow;

use thiserror::Error;
use wasmtime::{Engine, Module};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unrecognized module format (expected wasm or wat)")]
    UnrecognizedFormat,
    #[error("failed to parse WAT: {0}")]
    WatParseFailed(#[from] wat::Error),
    #[error("failed to compile WASM module: {0}")]
    CompileFailed(#[source] wasmtime::Error),
}

/// Encoding of a guest module, sniffed from its first bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModuleFormat {
    Binary,
    Text,
}

impl ModuleFormat {
    /// `\0asm` magic means binary; otherwise a `(` after an optional UTF-8 BOM and
    /// whitespace means text.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(WASM_MAGIC) {
            return Some(Self::Binary);
        }
        let text = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        text.iter()
            .find(|b| !b.is_ascii_whitespace())
            .filter(|&&b| b == b'(')
            .map(|_| Self::Text)
    }
}

const WASM_MAGIC: &[u8] = b"\0asm";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Compile guest bytes, converting text modules to binary first.
pub fn compile_module(engine: &Engine, bytes: &[u8]) -> Result<Module, LoadError> {
    let format = ModuleFormat::sniff(bytes).ok_or(LoadError::UnrecognizedFormat)?;
    let binary = to_binary(format, bytes)?;
    tracing::debug!(?format, len = binary.len(), "compiling guest module");
    Module::new(engine, &binary).map_err(LoadError::CompileFailed)
}

fn to_binary(format: ModuleFormat, bytes: &[u8]) -> Result<Cow<'_, [u8]>, LoadError> {
    match format {
        ModuleFormat::Binary => Ok(Cow::Borrowed(bytes)),
        ModuleFormat::Text => Ok(wat::parse_bytes(bytes)?),
    }
}
