use anyhow::{Context, Result};
use framepump_core::config::RuntimeConfig;
use framepump_core::logging::init_tracing;
use framepump_core::pump::schedule::{FixedStep, Paced};
use framepump_core::pump::{self, FramePump, RefreshScheduler, Surface};
use framepump_core::runtime::ModuleSession;
use framepump_core::surface::{Framebuffer, PngSequence};

use crate::cli::Args;

pub fn run(args: Args) -> Result<()> {
    init_tracing();

    let config = RuntimeConfig {
        import_module: args.import_module.clone(),
        refresh_rate_hz: args.fps,
        system_bindings: !args.no_system,
    };
    config.validate()?;

    let bytes = std::fs::read(&args.module)
        .with_context(|| format!("failed to read {}", args.module.display()))?;
    let mut session = ModuleSession::load(&bytes, &config.adapter())
        .with_context(|| format!("failed to load {}", args.module.display()))?;
    tracing::info!(
        module = %args.module.display(),
        frame_entry = session.frame_entry_kind(),
        "module loaded"
    );

    let mut surface: Box<dyn Surface> = match args.out.as_ref() {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "capturing frames as PNG");
            Box::new(PngSequence::new(dir))
        }
        None => Box::new(Framebuffer::new()),
    };

    let mut scheduler: Box<dyn RefreshScheduler> = if args.realtime {
        Box::new(Paced::new(config.refresh_rate_hz, args.frames).context("invalid refresh rate")?)
    } else {
        Box::new(
            FixedStep::new(config.refresh_rate_hz, args.frames).context("invalid refresh rate")?,
        )
    };

    let mut pump = FramePump::new();
    pump.start(&mut session, surface.as_mut())?;
    let stats = pump::run(&mut pump, &mut session, surface.as_mut(), scheduler.as_mut())?;

    tracing::info!(
        frames = stats.frames_presented,
        total_elapsed_ms = stats.total_elapsed_ms,
        "done"
    );
    report_misses(&session);
    Ok(())
}

fn report_misses(session: &ModuleSession) {
    let misses = session.misses();
    if misses.is_empty() {
        return;
    }
    let symbols: Vec<String> = misses
        .counts()
        .into_iter()
        .map(|(symbol, calls)| format!("{symbol} x{calls}"))
        .collect();
    tracing::warn!(
        calls = misses.total_calls(),
        symbols = %symbols.join(", "),
        "guest called imports with no host implementation"
    );
}
