//! Wasmtime-backed runtime glue for framepump-core.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine`/`Store`/`Linker` with a fixed set of proposals enabled.
//! - Link guest imports through the binding adapter, then instantiate.
//! - Resolve exports and serve frames out of the guest's linear memory.

mod engine;
mod session;

pub use engine::WasmtimeRuntime;
pub use session::{ModuleSession, SessionError};
