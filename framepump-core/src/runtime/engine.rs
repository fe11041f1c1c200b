//! Wasmtime engine, store and linker with the proposal set guests are compiled against.

use wasmtime::{Config, Engine, Linker, Store};

/// Engine, store and linker for one guest session.
pub struct WasmtimeRuntime {
    pub engine: Engine,
    pub store: Store<()>,
    pub linker: Linker<()>,
}

/// Proposals that current guest toolchains emit by default.
///
/// Threads, GC and exception handling stay off: the host drives the guest from a single
/// thread and never hands it managed references.
fn guest_config() -> Config {
    let mut cfg = Config::new();
    cfg.wasm_multi_value(true)
        .wasm_bulk_memory(true)
        .wasm_reference_types(true)
        .wasm_simd(true)
        .wasm_relaxed_simd(true)
        .wasm_multi_memory(true)
        .wasm_memory64(true)
        .wasm_tail_call(true);
    cfg
}

impl WasmtimeRuntime {
    pub fn new() -> wasmtime::Result<Self> {
        let engine = Engine::new(&guest_config())?;
        let store = Store::new(&engine, ());
        let linker = Linker::new(&engine);

        Ok(Self {
            engine,
            store,
            linker,
        })
    }
}
