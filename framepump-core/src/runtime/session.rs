//! A loaded guest: compiled, linked, instantiated, with its entrypoints resolved.

use thiserror::Error;
use wasmtime::Instance;

use super::WasmtimeRuntime;
use crate::abi::{AbiError, GuestEntrypoints};
use crate::bindings::{BindingAdapter, LinkReport, MissLog};
use crate::loader::{self, LoadError};
use crate::pump::{Dimensions, FrameDescriptor, FrameError, FrameSource, PixelView};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create the wasm runtime: {0}")]
    Runtime(#[source] wasmtime::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to link host imports: {0}")]
    Link(#[source] wasmtime::Error),
    #[error("failed to instantiate guest module: {0}")]
    Instantiate(#[source] wasmtime::Error),
    #[error(transparent)]
    Abi(#[from] AbiError),
}

/// The instantiated guest. Lives as long as the content is loaded.
pub struct ModuleSession {
    runtime: WasmtimeRuntime,
    // Kept so the instance outlives every function handle resolved from it.
    _instance: Instance,
    entrypoints: GuestEntrypoints,
    misses: MissLog,
    link_report: LinkReport,
}

impl ModuleSession {
    /// Compile `bytes` (WASM or WAT), link imports through `adapter`, instantiate and resolve
    /// exports.
    pub fn load(bytes: &[u8], adapter: &BindingAdapter) -> Result<Self, SessionError> {
        let mut runtime = WasmtimeRuntime::new().map_err(SessionError::Runtime)?;
        let module = loader::compile_module(&runtime.engine, bytes)?;

        let link_report = adapter
            .link(&mut runtime.linker, &module)
            .map_err(SessionError::Link)?;
        let instance = runtime
            .linker
            .instantiate(&mut runtime.store, &module)
            .map_err(SessionError::Instantiate)?;
        let entrypoints = GuestEntrypoints::resolve(&instance, &mut runtime.store)?;

        tracing::info!(
            bound = link_report.bound,
            stubbed = link_report.stubbed,
            frame_entry = entrypoints.frame.kind(),
            "guest module instantiated"
        );

        Ok(Self {
            runtime,
            _instance: instance,
            entrypoints,
            misses: adapter.misses().clone(),
            link_report,
        })
    }

    /// Calls the guest made to imports no capability source provided.
    pub fn misses(&self) -> &MissLog {
        &self.misses
    }

    pub fn link_report(&self) -> LinkReport {
        self.link_report
    }

    /// Which frame entrypoint shape the guest exports (`timed`, `index-only` or `static`).
    pub fn frame_entry_kind(&self) -> &'static str {
        self.entrypoints.frame.kind()
    }

    /// Current size of the guest's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.entrypoints.memory.data_size(&self.runtime.store)
    }
}

impl FrameSource for ModuleSession {
    fn query_dimensions(&mut self) -> Result<(i32, i32), FrameError> {
        let width = self
            .entrypoints
            .width
            .call(&mut self.runtime.store, ())
            .map_err(|source| FrameError::Query {
                what: "width",
                source,
            })?;
        let height = self
            .entrypoints
            .height
            .call(&mut self.runtime.store, ())
            .map_err(|source| FrameError::Query {
                what: "height",
                source,
            })?;
        Ok((width, height))
    }

    fn request_frame(
        &mut self,
        frame: FrameDescriptor,
        dimensions: Dimensions,
    ) -> Result<PixelView<'_>, FrameError> {
        let ptr = self
            .entrypoints
            .frame
            .call(&mut self.runtime.store, frame.index, frame.elapsed_ms)
            .map_err(|source| FrameError::Trap {
                index: frame.index,
                source,
            })?;

        let memory = self.entrypoints.memory.data(&self.runtime.store);
        PixelView::from_memory(memory, ptr, dimensions)
    }
}
