//! Built-in host services offered to every guest under the import namespace.
//!
//! - `system_log(ptr: i32, len: i32)`: UTF-8 text from guest memory, forwarded to `tracing`.
//! - `system_millis() -> i64`: wall clock milliseconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use wasmtime::{Caller, Val};

use super::CapabilitySource;
use crate::abi::guest_exports;

pub const SYSTEM_LOG: &str = "system_log";
pub const SYSTEM_MILLIS: &str = "system_millis";

/// The `system` capability source.
pub fn capabilities() -> CapabilitySource {
    CapabilitySource::new("system")
        .with_fn(SYSTEM_LOG, system_log)
        .with_fn(SYSTEM_MILLIS, system_millis)
}

fn system_log(caller: &mut Caller<'_, ()>, params: &[Val], _results: &mut [Val]) -> wasmtime::Result<()> {
    let (Some(ptr), Some(len)) = (
        params.first().and_then(Val::i32),
        params.get(1).and_then(Val::i32),
    ) else {
        return Err(anyhow::anyhow!("{SYSTEM_LOG} expects (i32, i32)").into());
    };

    let Some(memory) = caller
        .get_export(guest_exports::MEMORY)
        .and_then(|e| e.into_memory())
    else {
        tracing::warn!("{SYSTEM_LOG} called but the guest exports no memory");
        return Ok(());
    };

    let (start, len_bytes) = (ptr as u32 as usize, len as u32 as usize);
    let in_bounds = start
        .checked_add(len_bytes)
        .is_some_and(|end| end <= memory.data_size(&*caller));
    if !in_bounds {
        tracing::warn!(ptr, len, "{SYSTEM_LOG} range is outside guest memory");
        return Ok(());
    }

    let mut buf = vec![0u8; len_bytes];
    memory.read(&*caller, start, &mut buf)?;

    match std::str::from_utf8(&buf) {
        Ok(msg) => tracing::info!(target: "guest", "{msg}"),
        Err(_) => tracing::warn!(ptr, len, "{SYSTEM_LOG} received invalid UTF-8"),
    }
    Ok(())
}

fn system_millis(
    _caller: &mut Caller<'_, ()>,
    _params: &[Val],
    results: &mut [Val],
) -> wasmtime::Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    if let Some(slot) = results.first_mut() {
        *slot = Val::I64(now.as_millis() as i64);
    }
    Ok(())
}
