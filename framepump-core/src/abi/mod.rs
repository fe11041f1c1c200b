//! framepump-core ABI module
//!
//! This module defines the contract between:
//! - **Host**: `framepump-core` (libretro core / headless runner)
//! - **Guest**: the loaded WASM module that computes pixels
//!
//! ## High-level model (pull-based)
//! The guest owns a pixel buffer inside its own linear memory. Once per display refresh the
//! host asks the guest to compute the next frame and gets back a byte offset into `memory`
//! where `width * height * 4` RGBA bytes begin. The host copies those bytes out before it asks
//! again, so the guest is free to reuse the same region every frame.
//!
//! ## Exports (guest -> host)
//! Required:
//! - `memory`
//! - `wasm_get_width() -> i32`
//! - `wasm_get_height() -> i32`
//!
//! Frame entrypoint, first match wins:
//! - `wasm_compute_frame(index: i32, elapsed_ms: f64) -> i32`
//! - `wasm_compute_frame(index: i32) -> i32`
//!     - Index-driven animation; the host does not forward elapsed time.
//! - `wasm_get_pixels() -> i32`
//!     - Legacy single-image modules. Every tick presents whatever the region holds.
//!
//! Width/height are queried exactly once, right after instantiation.
//!
//! ## Imports (host -> guest)
//! Every function imported from module `"env"` resolves. Functions the host knows about are
//! bound to real implementations (see `crate::bindings`); anything else becomes a stub that
//! logs the call and returns zeros.

use thiserror::Error;
use wasmtime::{AsContextMut, Instance, Memory, TypedFunc};

/// Import module name used by the guest.
pub const IMPORT_MODULE: &str = "env";

/// Guest export names.
pub mod guest_exports {
    /// Linear memory backing every pointer the guest returns.
    pub const MEMORY: &str = "memory";
    /// Surface width in pixels (required).
    pub const WIDTH: &str = "wasm_get_width";
    /// Surface height in pixels (required).
    pub const HEIGHT: &str = "wasm_get_height";
    /// Per-tick frame computation.
    pub const COMPUTE_FRAME: &str = "wasm_compute_frame";
    /// Single-image fallback.
    pub const GET_PIXELS: &str = "wasm_get_pixels";
}

/// Bytes per texel in a frame: RGBA, 8 bits per channel, unassociated alpha.
pub const BYTES_PER_PIXEL: u32 = 4;

/// Errors raised while resolving guest exports.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("guest does not export `{0}`")]
    MissingExport(&'static str),
    #[error("guest export `{name}` has an unsupported signature")]
    SignatureMismatch {
        name: &'static str,
        #[source]
        source: wasmtime::Error,
    },
    #[error("guest exports neither `{}` nor `{}`", guest_exports::COMPUTE_FRAME, guest_exports::GET_PIXELS)]
    MissingFrameEntrypoint,
}

/// The shape of the frame entrypoint the guest chose to export.
#[derive(Clone)]
pub enum FrameEntry {
    /// `wasm_compute_frame(index, elapsed_ms) -> ptr`
    Timed(TypedFunc<(u32, f64), u32>),
    /// `wasm_compute_frame(index) -> ptr`
    IndexOnly(TypedFunc<u32, u32>),
    /// `wasm_get_pixels() -> ptr`
    Static(TypedFunc<(), u32>),
}

impl FrameEntry {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameEntry::Timed(_) => "timed",
            FrameEntry::IndexOnly(_) => "index-only",
            FrameEntry::Static(_) => "static",
        }
    }

    /// Call the entrypoint, forwarding whichever arguments its signature accepts.
    pub fn call(
        &self,
        mut store: impl AsContextMut,
        index: u32,
        elapsed_ms: f64,
    ) -> wasmtime::Result<u32> {
        match self {
            FrameEntry::Timed(f) => f.call(&mut store, (index, elapsed_ms)),
            FrameEntry::IndexOnly(f) => f.call(&mut store, index),
            FrameEntry::Static(f) => f.call(&mut store, ()),
        }
    }
}

/// A small view of a guest's entrypoints.
///
/// Resolved once after instantiation and reused on every tick.
#[derive(Clone)]
pub struct GuestEntrypoints {
    pub memory: Memory,
    pub width: TypedFunc<(), i32>,
    pub height: TypedFunc<(), i32>,
    pub frame: FrameEntry,
}

impl GuestEntrypoints {
    /// Resolve entrypoint exports from an instance.
    pub fn resolve(instance: &Instance, mut store: impl AsContextMut) -> Result<Self, AbiError> {
        let memory = instance
            .get_memory(&mut store, guest_exports::MEMORY)
            .ok_or(AbiError::MissingExport(guest_exports::MEMORY))?;
        let width = typed_export::<(), i32>(instance, &mut store, guest_exports::WIDTH)?;
        let height = typed_export::<(), i32>(instance, &mut store, guest_exports::HEIGHT)?;
        let frame = resolve_frame_entry(instance, &mut store)?;

        Ok(Self {
            memory,
            width,
            height,
            frame,
        })
    }
}

fn typed_export<P, R>(
    instance: &Instance,
    mut store: impl AsContextMut,
    name: &'static str,
) -> Result<TypedFunc<P, R>, AbiError>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    let func = instance
        .get_func(&mut store, name)
        .ok_or(AbiError::MissingExport(name))?;
    func.typed::<P, R>(&store)
        .map_err(|source| AbiError::SignatureMismatch { name, source })
}

fn resolve_frame_entry(
    instance: &Instance,
    mut store: impl AsContextMut,
) -> Result<FrameEntry, AbiError> {
    if let Some(func) = instance.get_func(&mut store, guest_exports::COMPUTE_FRAME) {
        if let Ok(timed) = func.typed::<(u32, f64), u32>(&store) {
            return Ok(FrameEntry::Timed(timed));
        }
        return func
            .typed::<u32, u32>(&store)
            .map(FrameEntry::IndexOnly)
            .map_err(|source| AbiError::SignatureMismatch {
                name: guest_exports::COMPUTE_FRAME,
                source,
            });
    }

    if instance
        .get_func(&mut store, guest_exports::GET_PIXELS)
        .is_some()
    {
        return typed_export::<(), u32>(instance, &mut store, guest_exports::GET_PIXELS)
            .map(FrameEntry::Static);
    }

    Err(AbiError::MissingFrameEntrypoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, Linker, Module, Store};

    fn instantiate(wat_src: &str) -> (Store<()>, Instance) {
        let engine = Engine::default();
        let module = Module::new(&engine, wat::parse_str(wat_src).unwrap()).unwrap();
        let mut store = Store::new(&engine, ());
        let instance = Linker::new(&engine)
            .instantiate(&mut store, &module)
            .unwrap();
        (store, instance)
    }

    const SIZE_EXPORTS: &str = r#"
        (memory (export "memory") 1)
        (func (export "wasm_get_width") (result i32) i32.const 4)
        (func (export "wasm_get_height") (result i32) i32.const 2)
    "#;

    #[test]
    fn resolves_timed_frame_entry() {
        let src = format!(
            r#"(module {SIZE_EXPORTS}
                (func (export "wasm_compute_frame") (param i32 f64) (result i32) i32.const 0))"#
        );
        let (mut store, instance) = instantiate(&src);
        let entry = GuestEntrypoints::resolve(&instance, &mut store).unwrap();
        assert_eq!(entry.frame.kind(), "timed");
    }

    #[test]
    fn resolves_index_only_frame_entry() {
        let src = format!(
            r#"(module {SIZE_EXPORTS}
                (func (export "wasm_compute_frame") (param i32) (result i32) local.get 0))"#
        );
        let (mut store, instance) = instantiate(&src);
        let entry = GuestEntrypoints::resolve(&instance, &mut store).unwrap();
        assert_eq!(entry.frame.kind(), "index-only");
        assert_eq!(entry.frame.call(&mut store, 7, 16.0).unwrap(), 7);
    }

    #[test]
    fn falls_back_to_get_pixels() {
        let src = format!(
            r#"(module {SIZE_EXPORTS}
                (func (export "wasm_get_pixels") (result i32) i32.const 128))"#
        );
        let (mut store, instance) = instantiate(&src);
        let entry = GuestEntrypoints::resolve(&instance, &mut store).unwrap();
        assert_eq!(entry.frame.kind(), "static");
        assert_eq!(entry.frame.call(&mut store, 3, 1.0).unwrap(), 128);
    }

    #[test]
    fn rejects_ill_typed_compute_frame() {
        let src = format!(
            r#"(module {SIZE_EXPORTS}
                (func (export "wasm_compute_frame") (param f32) (result i32) i32.const 0))"#
        );
        let (mut store, instance) = instantiate(&src);
        let err = GuestEntrypoints::resolve(&instance, &mut store)
            .err()
            .unwrap();
        assert!(matches!(err, AbiError::SignatureMismatch { .. }));
    }

    #[test]
    fn reports_missing_required_exports() {
        let (mut store, instance) = instantiate(
            r#"(module
                (memory (export "memory") 1)
                (func (export "wasm_get_width") (result i32) i32.const 4))"#,
        );
        let err = GuestEntrypoints::resolve(&instance, &mut store)
            .err()
            .unwrap();
        assert!(matches!(err, AbiError::MissingExport(guest_exports::HEIGHT)));

        let src = format!("(module {SIZE_EXPORTS})");
        let (mut store, instance) = instantiate(&src);
        let err = GuestEntrypoints::resolve(&instance, &mut store)
            .err()
            .unwrap();
        assert!(matches!(err, AbiError::MissingFrameEntrypoint));
    }
}
