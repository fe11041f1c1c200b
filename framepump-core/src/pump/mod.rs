//! Frame pump: one request/present cycle per display refresh.
//!
//! ```text
//! Uninitialized --start--> Priming --tick--> Running --tick--> Running ...
//!                                      \             \
//!                                       +-------------+--> Stopped (stop flag seen after present)
//!                                       +-------------+--> Halted  (request or present failed)
//! ```
//!
//! The pump never overlaps ticks: the next refresh is only requested from the scheduler after
//! the current tick's request and present have both returned, so frame indices reach the
//! surface strictly in order with no gaps.

mod frame;
pub mod schedule;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

pub use frame::{Dimensions, DimensionsError, FrameDescriptor, FrameError, PixelView};
pub use schedule::RefreshScheduler;

/// Something that computes frames on request.
pub trait FrameSource {
    /// Raw `(width, height)` as reported by the source. Called once, by [`FramePump::start`].
    fn query_dimensions(&mut self) -> Result<(i32, i32), FrameError>;

    /// Compute the frame described by `frame` and expose its pixels.
    ///
    /// The returned view must hold exactly `dimensions.byte_len()` bytes.
    fn request_frame(
        &mut self,
        frame: FrameDescriptor,
        dimensions: Dimensions,
    ) -> Result<PixelView<'_>, FrameError>;
}

/// Something frames are presented on.
pub trait Surface {
    /// Size the surface once, before the first present.
    fn resize(&mut self, dimensions: Dimensions) -> Result<(), PresentError>;

    /// Replace the whole visible area with `view`, anchored at the origin.
    fn present(&mut self, view: &PixelView<'_>) -> Result<(), PresentError>;
}

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("surface has not been sized")]
    Unsized,
    #[error("surface is {surface} but the frame is {frame}")]
    DimensionMismatch {
        surface: Dimensions,
        frame: Dimensions,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] png::EncodingError),
}

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("failed to query surface dimensions: {0}")]
    Query(#[source] FrameError),
    #[error(transparent)]
    Dimensions(#[from] DimensionsError),
    #[error("failed to size the surface: {0}")]
    Resize(#[source] PresentError),
    #[error("pump has not been started")]
    NotStarted,
    #[error("pump was already started")]
    AlreadyStarted,
    #[error("failed to compute frame {index}: {source}")]
    Frame {
        index: u32,
        #[source]
        source: FrameError,
    },
    #[error("failed to present frame {index}: {source}")]
    Present {
        index: u32,
        #[source]
        source: PresentError,
    },
    #[error("frame index space exhausted")]
    IndexExhausted,
    #[error("pump halted after an earlier failure")]
    Halted,
    #[error("pump was stopped")]
    Stopped,
}

/// Externally visible phase of a [`FramePump`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PumpPhase {
    Uninitialized,
    Priming,
    Running,
    Stopped,
    Halted,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum PumpState {
    Uninitialized,
    Priming,
    Running {
        previous_timestamp: f64,
        frame_index: u32,
    },
    Stopped,
    Halted,
}

/// What a completed tick means for the next one.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Frame presented; schedule the next tick.
    Continue(FrameDescriptor),
    /// Frame presented and the stop flag was set; do not schedule again.
    Stopped(FrameDescriptor),
}

impl TickOutcome {
    pub fn frame(&self) -> FrameDescriptor {
        match self {
            TickOutcome::Continue(frame) | TickOutcome::Stopped(frame) => *frame,
        }
    }

    pub fn should_rearm(&self) -> bool {
        matches!(self, TickOutcome::Continue(_))
    }
}

/// Cloneable stop flag, checked by the pump before it re-arms.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Running totals over the frames a pump presented.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PumpStats {
    pub frames_presented: u64,
    pub last_frame: Option<FrameDescriptor>,
    /// Sum of every presented frame's `elapsed_ms`.
    pub total_elapsed_ms: f64,
}

impl PumpStats {
    fn record(&mut self, frame: FrameDescriptor) {
        self.frames_presented += 1;
        self.total_elapsed_ms += frame.elapsed_ms;
        self.last_frame = Some(frame);
    }
}

/// The request/present state machine.
#[derive(Debug)]
pub struct FramePump {
    state: PumpState,
    dimensions: Option<Dimensions>,
    stop: StopHandle,
    stats: PumpStats,
}

impl Default for FramePump {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePump {
    pub fn new() -> Self {
        Self {
            state: PumpState::Uninitialized,
            dimensions: None,
            stop: StopHandle::default(),
            stats: PumpStats::default(),
        }
    }

    pub fn phase(&self) -> PumpPhase {
        match self.state {
            PumpState::Uninitialized => PumpPhase::Uninitialized,
            PumpState::Priming => PumpPhase::Priming,
            PumpState::Running { .. } => PumpPhase::Running,
            PumpState::Stopped => PumpPhase::Stopped,
            PumpState::Halted => PumpPhase::Halted,
        }
    }

    /// Session dimensions, once started.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    pub fn stats(&self) -> &PumpStats {
        &self.stats
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Query the source's dimensions, size the surface to match, and move to `Priming`.
    pub fn start<S, D>(&mut self, source: &mut S, surface: &mut D) -> Result<Dimensions, PumpError>
    where
        S: FrameSource + ?Sized,
        D: Surface + ?Sized,
    {
        if self.state != PumpState::Uninitialized {
            return Err(PumpError::AlreadyStarted);
        }

        let (width, height) = source.query_dimensions().map_err(PumpError::Query)?;
        let dimensions = Dimensions::new(width, height)?;
        surface.resize(dimensions).map_err(PumpError::Resize)?;

        tracing::info!(%dimensions, "frame pump primed");
        self.dimensions = Some(dimensions);
        self.state = PumpState::Priming;
        Ok(dimensions)
    }

    /// Go back to `Priming`: the next tick becomes frame 0 with a fresh reference time.
    ///
    /// No-op unless the pump is priming or running.
    pub fn reprime(&mut self) {
        if matches!(self.state, PumpState::Priming | PumpState::Running { .. }) {
            tracing::debug!("frame pump re-primed");
            self.state = PumpState::Priming;
        }
    }

    /// Run one tick for a refresh at `timestamp_ms`.
    ///
    /// Any failure halts the pump; later ticks return [`PumpError::Halted`].
    pub fn tick<S, D>(
        &mut self,
        timestamp_ms: f64,
        source: &mut S,
        surface: &mut D,
    ) -> Result<TickOutcome, PumpError>
    where
        S: FrameSource + ?Sized,
        D: Surface + ?Sized,
    {
        let frame = match self.state {
            PumpState::Uninitialized => return Err(PumpError::NotStarted),
            PumpState::Stopped => return Err(PumpError::Stopped),
            PumpState::Halted => return Err(PumpError::Halted),
            PumpState::Priming => FrameDescriptor {
                index: 0,
                elapsed_ms: 0.0,
            },
            PumpState::Running {
                previous_timestamp,
                frame_index,
            } => {
                let Some(index) = frame_index.checked_add(1) else {
                    return Err(self.halt(PumpError::IndexExhausted));
                };
                FrameDescriptor {
                    index,
                    elapsed_ms: (timestamp_ms - previous_timestamp).max(0.0),
                }
            }
        };
        let dimensions = self.dimensions.ok_or(PumpError::NotStarted)?;

        if let Err(err) = Self::request_and_present(frame, dimensions, source, surface) {
            return Err(self.halt(err));
        }

        tracing::debug!(index = frame.index, elapsed_ms = frame.elapsed_ms, "frame presented");
        self.stats.record(frame);
        self.state = PumpState::Running {
            previous_timestamp: timestamp_ms,
            frame_index: frame.index,
        };

        if self.stop.is_stopped() {
            tracing::info!(frames = self.stats.frames_presented, "frame pump stopped");
            self.state = PumpState::Stopped;
            return Ok(TickOutcome::Stopped(frame));
        }
        Ok(TickOutcome::Continue(frame))
    }

    fn request_and_present<S, D>(
        frame: FrameDescriptor,
        dimensions: Dimensions,
        source: &mut S,
        surface: &mut D,
    ) -> Result<(), PumpError>
    where
        S: FrameSource + ?Sized,
        D: Surface + ?Sized,
    {
        let index = frame.index;
        let view = source
            .request_frame(frame, dimensions)
            .map_err(|err| PumpError::Frame { index, source: err })?;
        if view.len() != dimensions.byte_len() {
            return Err(PumpError::Frame {
                index,
                source: FrameError::LengthMismatch {
                    expected: dimensions.byte_len(),
                    actual: view.len(),
                },
            });
        }
        surface
            .present(&view)
            .map_err(|err| PumpError::Present { index, source: err })
    }

    fn halt(&mut self, err: PumpError) -> PumpError {
        tracing::error!(error = %err, "frame pump halted");
        self.state = PumpState::Halted;
        err
    }
}

/// Drive `pump` from `scheduler` until the scheduler runs dry or the pump stops.
///
/// Each refresh is requested only after the previous tick completed.
pub fn run<S, D, R>(
    pump: &mut FramePump,
    source: &mut S,
    surface: &mut D,
    scheduler: &mut R,
) -> Result<PumpStats, PumpError>
where
    S: FrameSource + ?Sized,
    D: Surface + ?Sized,
    R: RefreshScheduler + ?Sized,
{
    while let Some(timestamp_ms) = scheduler.next_refresh() {
        let outcome = pump.tick(timestamp_ms, source, surface)?;
        if !outcome.should_rearm() {
            break;
        }
    }
    Ok(pump.stats().clone())
}
