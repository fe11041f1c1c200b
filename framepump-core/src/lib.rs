//! framepump-core: a libretro core that instantiates a guest WASM/WAT module and copies the
//! RGBA frames it computes onto the frontend's screen, once per `retro_run`.
//!
//! Guest contract (see `crate::abi`):
//! - `memory`: exported linear memory
//! - `wasm_get_width() -> i32`, `wasm_get_height() -> i32`: surface size, read once at load
//! - `wasm_compute_frame(index: i32, elapsed_ms: f64) -> i32`: pointer to
//!   `width * height * 4` RGBA bytes for that frame
//!
//! Every function the guest imports from `env` resolves to something: a host implementation
//! when one is registered (`crate::bindings`), otherwise a logging stub that returns zeros.
//!
//! The same pieces drive the headless `framepump` binary.

pub mod abi;
pub mod bindings;
pub mod config;
pub mod loader;
pub mod logging;
pub mod pump;
pub mod runtime;
pub mod surface;

use std::time::Instant;

use libretro_backend::{
    AudioVideoInfo, Core, CoreInfo, GameData, LoadGameResult, PixelFormat, RuntimeHandle,
    libretro_core,
};

use crate::config::RuntimeConfig;
use crate::pump::{FramePump, PumpPhase};
use crate::runtime::ModuleSession;
use crate::surface::Framebuffer;

/// A running guest and everything presented from it.
struct Stage {
    session: ModuleSession,
    pump: FramePump,
    framebuffer: Framebuffer,
    /// Reference for refresh timestamps; reset with the pump.
    clock: Instant,
}

impl Stage {
    /// Load `bytes` and prime the pump, sizing the framebuffer to the guest.
    fn start(bytes: &[u8], config: &RuntimeConfig) -> anyhow::Result<Self> {
        let mut session = ModuleSession::load(bytes, &config.adapter())?;
        let mut framebuffer = Framebuffer::new();
        let mut pump = FramePump::new();
        pump.start(&mut session, &mut framebuffer)?;
        Ok(Self {
            session,
            pump,
            framebuffer,
            clock: Instant::now(),
        })
    }

    /// One refresh: tick while the pump is live, then hand back the frame to show.
    ///
    /// Once the pump has halted the last good frame stays on screen.
    fn advance(&mut self) -> &[u8] {
        if matches!(self.pump.phase(), PumpPhase::Priming | PumpPhase::Running) {
            let timestamp_ms = self.clock.elapsed().as_secs_f64() * 1000.0;
            // The pump logs its own failure and stays halted.
            let _ = self
                .pump
                .tick(timestamp_ms, &mut self.session, &mut self.framebuffer);
        }
        self.framebuffer.as_bytes()
    }

    fn reset(&mut self) {
        self.pump.reprime();
        self.clock = Instant::now();
    }
}

/// State that only exists while content is loaded.
struct Loaded {
    game_data: GameData,
    stage: Stage,
}

/// The libretro core instance.
#[derive(Default)]
pub struct FramePumpCore {
    loaded: Option<Loaded>,
}

fn read_content(game_data: &GameData) -> Option<Vec<u8>> {
    if let Some(data) = game_data.data() {
        return Some(data.to_vec());
    }
    let path = game_data.path()?;
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::error!(path, error = %err, "failed to read content");
            None
        }
    }
}

impl Core for FramePumpCore {
    fn save_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn rtc_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn system_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn video_memory(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn info() -> CoreInfo {
        CoreInfo::new("framepump", env!("CARGO_PKG_VERSION"))
            .supports_roms_with_extension("wasm")
            .supports_roms_with_extension("wat")
    }

    fn on_load_game(&mut self, game_data: GameData) -> LoadGameResult {
        logging::init_tracing();

        let config = RuntimeConfig::from_env().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring invalid configuration; using defaults");
            RuntimeConfig::default()
        });

        let Some(bytes) = read_content(&game_data) else {
            return LoadGameResult::Failed(game_data);
        };

        let stage = match Stage::start(&bytes, &config) {
            Ok(stage) => stage,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to load guest module");
                return LoadGameResult::Failed(game_data);
            }
        };
        let Some(dimensions) = stage.pump.dimensions() else {
            return LoadGameResult::Failed(game_data);
        };

        tracing::info!(%dimensions, fps = config.refresh_rate_hz, "content loaded");
        self.loaded = Some(Loaded { game_data, stage });

        LoadGameResult::Success(AudioVideoInfo::new().video(
            dimensions.width(),
            dimensions.height(),
            config.refresh_rate_hz,
            PixelFormat::ARGB8888,
        ))
    }

    fn on_unload_game(&mut self) -> GameData {
        let Loaded { game_data, stage } = self
            .loaded
            .take()
            .expect("frontend unloaded content that was never loaded");

        tracing::info!(
            frames = stage.pump.stats().frames_presented,
            unresolved_calls = stage.session.misses().total_calls(),
            "content unloaded"
        );
        game_data
    }

    fn on_run(&mut self, handle: &mut RuntimeHandle) {
        if let Some(loaded) = self.loaded.as_mut() {
            handle.upload_video_frame(loaded.stage.advance());
        }
    }

    fn on_reset(&mut self) {
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.stage.reset();
        }
    }
}

libretro_core!(FramePumpCore);
