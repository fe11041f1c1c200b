//! Binding adapter: resolves every function a guest imports to something callable.
//!
//! Capability sources are consulted in priority order; the first source that provides a
//! symbol wins. A symbol no source provides resolves to a [`Stub`] that records the call in
//! a bounded [`MissLog`], warns the first time and returns zeros. Instantiation therefore never fails
//! because a host function is missing.
//!
//! Only function imports of the configured namespace are handled here. Memory, table and
//! global imports (and other namespaces) are left to the linker, where an unmet import is
//! still an instantiation error.

pub mod system;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wasmtime::{Caller, ExternType, Linker, Module, Val, ValType};

use crate::abi::IMPORT_MODULE;

/// A host function as seen by the guest: untyped params in, result slots to fill.
pub type HostFn =
    Arc<dyn Fn(&mut Caller<'_, ()>, &[Val], &mut [Val]) -> wasmtime::Result<()> + Send + Sync>;

/// A named set of host functions.
#[derive(Clone, Default)]
pub struct CapabilitySource {
    name: String,
    functions: HashMap<String, HostFn>,
}

impl CapabilitySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
        }
    }

    /// Add (or replace) a function in this source.
    pub fn with_fn<F>(mut self, symbol: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Caller<'_, ()>, &[Val], &mut [Val]) -> wasmtime::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(symbol.into(), Arc::new(f));
        self
    }

    /// Add an already shared function.
    pub fn with_host_fn(mut self, symbol: impl Into<String>, f: HostFn) -> Self {
        self.functions.insert(symbol.into(), f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, symbol: &str) -> Option<&HostFn> {
        self.functions.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for CapabilitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols: Vec<_> = self.functions.keys().collect();
        symbols.sort();
        f.debug_struct("CapabilitySource")
            .field("name", &self.name)
            .field("symbols", &symbols)
            .finish()
    }
}

/// An argument value captured from a stub call.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(u128),
    /// Any reference value (funcref, externref, ...), kept as its debug rendering.
    Ref(String),
}

impl From<&Val> for ArgValue {
    fn from(val: &Val) -> Self {
        match val {
            Val::I32(v) => ArgValue::I32(*v),
            Val::I64(v) => ArgValue::I64(*v),
            Val::F32(bits) => ArgValue::F32(f32::from_bits(*bits)),
            Val::F64(bits) => ArgValue::F64(f64::from_bits(*bits)),
            Val::V128(v) => ArgValue::V128(v.as_u128()),
            other => ArgValue::Ref(format!("{other:?}")),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::I32(v) => write!(f, "{v}"),
            ArgValue::I64(v) => write!(f, "{v}"),
            ArgValue::F32(v) => write!(f, "{v}"),
            ArgValue::F64(v) => write!(f, "{v}"),
            ArgValue::V128(v) => write!(f, "{v:#034x}"),
            ArgValue::Ref(kind) => f.write_str(kind),
        }
    }
}

/// One call to a symbol no capability source provided.
#[derive(Clone, Debug, PartialEq)]
pub struct UnresolvedCall {
    pub symbol: String,
    pub args: Vec<ArgValue>,
}

/// How many recent calls a [`MissLog`] keeps by default.
pub const RETAINED_CALLS: usize = 256;

/// Shared record of unresolved calls. Cloning shares the same log.
///
/// Guests may call a missing import every frame for hours, so only the most recent calls
/// are kept with their arguments. Per-symbol counts cover the whole session.
#[derive(Clone, Debug)]
pub struct MissLog {
    inner: Arc<Mutex<MissLogInner>>,
}

#[derive(Debug)]
struct MissLogInner {
    capacity: usize,
    recent: VecDeque<UnresolvedCall>,
    per_symbol: BTreeMap<String, u64>,
    total: u64,
}

impl Default for MissLog {
    fn default() -> Self {
        Self::with_capacity(RETAINED_CALLS)
    }
}

impl MissLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that keeps at most `capacity` recent calls.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MissLogInner {
                capacity,
                recent: VecDeque::with_capacity(capacity.min(RETAINED_CALLS)),
                per_symbol: BTreeMap::new(),
                total: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MissLogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call`, returning how many times its symbol has now been called.
    fn record(&self, call: UnresolvedCall) -> u64 {
        let mut inner = self.lock();
        inner.total += 1;
        let count = inner.per_symbol.entry(call.symbol.clone()).or_insert(0);
        *count += 1;
        let count = *count;

        if inner.capacity > 0 {
            if inner.recent.len() == inner.capacity {
                inner.recent.pop_front();
            }
            inner.recent.push_back(call);
        }
        count
    }

    /// The retained calls, oldest first.
    pub fn entries(&self) -> Vec<UnresolvedCall> {
        self.lock().recent.iter().cloned().collect()
    }

    /// Number of retained calls; never more than the log's capacity.
    pub fn len(&self) -> usize {
        self.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().total == 0
    }

    /// Every unresolved call recorded so far, including those no longer retained.
    pub fn total_calls(&self) -> u64 {
        self.lock().total
    }

    /// Call counts per symbol, sorted by symbol name.
    pub fn counts(&self) -> Vec<(String, u64)> {
        self.lock()
            .per_symbol
            .iter()
            .map(|(symbol, n)| (symbol.clone(), *n))
            .collect()
    }
}

/// Catch-all implementation for a symbol nobody provided.
#[derive(Clone, Debug)]
pub struct Stub {
    symbol: String,
    results: Vec<ValType>,
    log: MissLog,
}

impl Stub {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Record the call and fill `results` with zero/null values. Warns on the first call of
    /// each symbol only.
    ///
    /// Never fails.
    pub fn invoke(&self, params: &[Val], results: &mut [Val]) {
        let args: Vec<ArgValue> = params.iter().map(ArgValue::from).collect();
        let args_display = DisplayArgs(&args).to_string();
        let calls = self.log.record(UnresolvedCall {
            symbol: self.symbol.clone(),
            args,
        });

        if calls == 1 {
            tracing::warn!(
                symbol = %self.symbol,
                args = %args_display,
                "guest called an import with no host implementation"
            );
        } else {
            tracing::trace!(symbol = %self.symbol, args = %args_display, calls, "unresolved import called again");
        }

        for (slot, ty) in results.iter_mut().zip(&self.results) {
            *slot = zero_value(ty);
        }
    }

    fn with_results(mut self, results: impl IntoIterator<Item = ValType>) -> Self {
        self.results = results.into_iter().collect();
        self
    }
}

struct DisplayArgs<'a>(&'a [ArgValue]);

impl fmt::Display for DisplayArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str("]")
    }
}

fn zero_value(ty: &ValType) -> Val {
    match ty {
        ValType::I32 => Val::I32(0),
        ValType::I64 => Val::I64(0),
        ValType::F32 => Val::F32(0),
        ValType::F64 => Val::F64(0),
        ValType::V128 => Val::V128(0u128.into()),
        ValType::Ref(r) => Val::null_ref(r.heap_type()),
    }
}

/// What [`BindingAdapter::lookup`] resolved a symbol to.
#[derive(Clone)]
pub enum Binding {
    Host(HostFn),
    Stub(Stub),
}

impl Binding {
    pub fn is_stub(&self) -> bool {
        matches!(self, Binding::Stub(_))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Host(_) => f.write_str("Binding::Host"),
            Binding::Stub(stub) => write!(f, "Binding::Stub({})", stub.symbol),
        }
    }
}

/// Counts from one [`BindingAdapter::link`] pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkReport {
    pub bound: usize,
    pub stubbed: usize,
}

/// Priority-ordered capability sources with a stub fallback.
#[derive(Clone, Debug)]
pub struct BindingAdapter {
    namespace: String,
    sources: Vec<CapabilitySource>,
    misses: MissLog,
}

impl Default for BindingAdapter {
    fn default() -> Self {
        Self::new(IMPORT_MODULE)
    }
}

impl BindingAdapter {
    /// An adapter with no sources; every lookup yields a stub.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            sources: Vec::new(),
            misses: MissLog::new(),
        }
    }

    /// Append a source. Earlier sources take priority over later ones.
    pub fn with_source(mut self, source: CapabilitySource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn sources(&self) -> &[CapabilitySource] {
        &self.sources
    }

    /// Log shared by every stub this adapter hands out.
    pub fn misses(&self) -> &MissLog {
        &self.misses
    }

    pub fn lookup(&self, symbol: &str) -> Binding {
        self.sources
            .iter()
            .find_map(|source| source.get(symbol))
            .map(|f| Binding::Host(Arc::clone(f)))
            .unwrap_or_else(|| {
                Binding::Stub(Stub {
                    symbol: symbol.to_string(),
                    results: Vec::new(),
                    log: self.misses.clone(),
                })
            })
    }

    /// Define every function import of `module` in this adapter's namespace on `linker`.
    ///
    /// Must be called before instantiating the module.
    pub fn link(&self, linker: &mut Linker<()>, module: &Module) -> wasmtime::Result<LinkReport> {
        // A module may import the same symbol more than once.
        linker.allow_shadowing(true);

        let mut report = LinkReport::default();
        for import in module.imports() {
            if import.module() != self.namespace {
                continue;
            }
            let ExternType::Func(ty) = import.ty() else {
                continue;
            };
            let symbol = import.name();

            match self.lookup(symbol) {
                Binding::Host(f) => {
                    linker.func_new(&self.namespace, symbol, ty, move |mut caller, params, results| {
                        f(&mut caller, params, results)
                    })?;
                    report.bound += 1;
                }
                Binding::Stub(stub) => {
                    let stub = stub.with_results(ty.results());
                    linker.func_new(&self.namespace, symbol, ty, move |_caller, params, results| {
                        stub.invoke(params, results);
                        Ok(())
                    })?;
                    tracing::debug!(symbol, "no host implementation; linked a stub");
                    report.stubbed += 1;
                }
            }
        }

        Ok(report)
    }
}
