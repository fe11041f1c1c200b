use std::path::PathBuf;

use clap::Parser;
use framepump_core::config::{DEFAULT_REFRESH_RATE_HZ, ENV_FPS, ENV_IMPORT_MODULE};

#[derive(Parser, Debug)]
#[command(
    name = "framepump",
    author,
    version,
    about = "Run a WASM frame module headless and capture what it draws"
)]
pub struct Args {
    /// Guest module to run (`.wasm` binary or `.wat` text).
    #[arg(value_name = "MODULE")]
    pub module: PathBuf,

    /// Stop after this many frames (runs until interrupted when omitted).
    #[arg(long, short = 'n', value_name = "COUNT")]
    pub frames: Option<u64>,

    /// Refresh rate used to derive frame timestamps.
    #[arg(long, value_name = "HZ", env = ENV_FPS, default_value_t = DEFAULT_REFRESH_RATE_HZ)]
    pub fps: f64,

    /// Write every frame as `frame_NNNNN.png` into this directory.
    #[arg(long, short = 'o', value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Pace frames against the wall clock instead of rendering as fast as possible.
    #[arg(long)]
    pub realtime: bool,

    /// Import namespace resolved through host bindings and stubs.
    #[arg(long, value_name = "NAME", env = ENV_IMPORT_MODULE, default_value = "env")]
    pub import_module: String,

    /// Do not offer the built-in `system_*` host functions; every import becomes a stub.
    #[arg(long)]
    pub no_system: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
