use super::*;

/// Source that fills a buffer with the frame index and records every request.
struct ScriptedSource {
    size: (i32, i32),
    buffer: Vec<u8>,
    requests: Vec<FrameDescriptor>,
    fail_on: Option<u32>,
    short_by: usize,
}

impl ScriptedSource {
    fn new(width: i32, height: i32) -> Self {
        Self {
            size: (width, height),
            buffer: Vec::new(),
            requests: Vec::new(),
            fail_on: None,
            short_by: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn query_dimensions(&mut self) -> Result<(i32, i32), FrameError> {
        Ok(self.size)
    }

    fn request_frame(
        &mut self,
        frame: FrameDescriptor,
        dimensions: Dimensions,
    ) -> Result<PixelView<'_>, FrameError> {
        self.requests.push(frame);
        if self.fail_on == Some(frame.index) {
            return Err(FrameError::OutOfBounds {
                ptr: 0,
                len: dimensions.byte_len(),
                memory_size: 0,
            });
        }
        self.buffer = vec![frame.index as u8; dimensions.byte_len() - self.short_by];
        PixelView::new(&self.buffer, dimensions)
    }
}

#[derive(Default)]
struct RecordingSurface {
    size: Option<Dimensions>,
    /// (frame value seen in the first byte, byte length) per present.
    presents: Vec<(u8, usize)>,
    reject: bool,
}

impl Surface for RecordingSurface {
    fn resize(&mut self, dimensions: Dimensions) -> Result<(), PresentError> {
        self.size = Some(dimensions);
        Ok(())
    }

    fn present(&mut self, view: &PixelView<'_>) -> Result<(), PresentError> {
        let surface = self.size.ok_or(PresentError::Unsized)?;
        if self.reject {
            return Err(PresentError::DimensionMismatch {
                surface,
                frame: view.dimensions(),
            });
        }
        self.presents.push((view.bytes()[0], view.len()));
        Ok(())
    }
}

struct Timestamps(std::vec::IntoIter<f64>);

impl Timestamps {
    fn new(stamps: &[f64]) -> Self {
        Self(stamps.to_vec().into_iter())
    }
}

impl RefreshScheduler for Timestamps {
    fn next_refresh(&mut self) -> Option<f64> {
        self.0.next()
    }
}

fn started(width: i32, height: i32) -> (FramePump, ScriptedSource, RecordingSurface) {
    let mut pump = FramePump::new();
    let mut source = ScriptedSource::new(width, height);
    let mut surface = RecordingSurface::default();
    pump.start(&mut source, &mut surface).unwrap();
    (pump, source, surface)
}

#[test]
fn start_sizes_the_surface_and_primes() {
    let (pump, _source, surface) = started(4, 2);
    assert_eq!(pump.phase(), PumpPhase::Priming);
    assert_eq!(surface.size, Some(Dimensions::new(4, 2).unwrap()));
    assert_eq!(pump.dimensions(), surface.size);
}

#[test]
fn start_rejects_empty_dimensions() {
    let mut pump = FramePump::new();
    let mut surface = RecordingSurface::default();
    let err = pump
        .start(&mut ScriptedSource::new(0, 2), &mut surface)
        .unwrap_err();
    assert!(matches!(
        err,
        PumpError::Dimensions(DimensionsError::Empty { .. })
    ));
    assert!(surface.size.is_none());
    assert_eq!(pump.phase(), PumpPhase::Uninitialized);
}

#[test]
fn start_rejects_negative_and_oversized_dimensions() {
    for (width, height) in [(-1, 4), (4, -1), (i32::MAX, 4), (65536, 65536)] {
        let mut pump = FramePump::new();
        let mut surface = RecordingSurface::default();
        let err = pump
            .start(&mut ScriptedSource::new(width, height), &mut surface)
            .unwrap_err();
        assert!(
            matches!(
                err,
                PumpError::Dimensions(
                    DimensionsError::Negative { .. } | DimensionsError::ExceedsLinearMemory { .. }
                )
            ),
            "{width}x{height} gave {err:?}"
        );
        assert!(surface.size.is_none(), "{width}x{height} sized the surface");
        assert_eq!(pump.phase(), PumpPhase::Uninitialized);
    }
}

#[test]
fn start_twice_is_an_error() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    assert!(matches!(
        pump.start(&mut source, &mut surface),
        Err(PumpError::AlreadyStarted)
    ));
}

#[test]
fn tick_before_start_is_an_error() {
    let mut pump = FramePump::new();
    let err = pump
        .tick(
            0.0,
            &mut ScriptedSource::new(4, 2),
            &mut RecordingSurface::default(),
        )
        .unwrap_err();
    assert!(matches!(err, PumpError::NotStarted));
}

#[test]
fn indices_increase_by_one_per_tick() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    let mut scheduler = Timestamps::new(&[100.0, 116.0, 133.0, 150.0, 166.0, 183.0]);

    let stats = run(&mut pump, &mut source, &mut surface, &mut scheduler).unwrap();

    let indices: Vec<u32> = source.requests.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(stats.frames_presented, 6);
    assert_eq!(pump.phase(), PumpPhase::Running);
}

#[test]
fn first_frame_has_zero_elapsed_and_later_frames_use_the_delta() {
    let (mut pump, mut source, mut surface) = started(4, 2);

    let first = pump.tick(1000.0, &mut source, &mut surface).unwrap();
    let second = pump.tick(1016.0, &mut source, &mut surface).unwrap();

    assert_eq!(
        first.frame(),
        FrameDescriptor {
            index: 0,
            elapsed_ms: 0.0
        }
    );
    assert_eq!(
        second.frame(),
        FrameDescriptor {
            index: 1,
            elapsed_ms: 16.0
        }
    );
    assert_eq!(source.requests[1].elapsed_ms, 16.0);
}

#[test]
fn one_present_per_completed_request() {
    let (mut pump, mut source, mut surface) = started(3, 3);
    let mut scheduler = Timestamps::new(&[0.0, 10.0, 20.0, 30.0, 40.0]);

    run(&mut pump, &mut source, &mut surface, &mut scheduler).unwrap();

    assert_eq!(source.requests.len(), surface.presents.len());
    // Each present carries the bytes of the request that immediately preceded it.
    let seen: Vec<u8> = surface.presents.iter().map(|(first, _)| *first).collect();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert!(surface.presents.iter().all(|(_, len)| *len == 3 * 3 * 4));
}

#[test]
fn stop_flag_ends_the_loop_after_the_current_frame() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    let stop = pump.stop_handle();

    pump.tick(0.0, &mut source, &mut surface).unwrap();
    stop.stop();
    let outcome = pump.tick(16.0, &mut source, &mut surface).unwrap();

    assert!(!outcome.should_rearm());
    assert_eq!(outcome.frame().index, 1);
    assert_eq!(surface.presents.len(), 2);
    assert_eq!(pump.phase(), PumpPhase::Stopped);
    assert!(matches!(
        pump.tick(32.0, &mut source, &mut surface),
        Err(PumpError::Stopped)
    ));
}

#[test]
fn run_stops_rearming_once_stopped() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    pump.stop_handle().stop();
    let mut scheduler = Timestamps::new(&[0.0, 16.0, 32.0]);

    let stats = run(&mut pump, &mut source, &mut surface, &mut scheduler).unwrap();

    assert_eq!(stats.frames_presented, 1);
    assert_eq!(scheduler.0.len(), 2, "no further refreshes were consumed");
}

#[test]
fn compute_failure_halts_the_pump() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    source.fail_on = Some(2);
    let mut scheduler = Timestamps::new(&[0.0, 16.0, 32.0, 48.0]);

    let err = run(&mut pump, &mut source, &mut surface, &mut scheduler).unwrap_err();

    assert!(matches!(err, PumpError::Frame { index: 2, .. }));
    assert_eq!(pump.phase(), PumpPhase::Halted);
    assert_eq!(surface.presents.len(), 2);
    assert!(matches!(
        pump.tick(64.0, &mut source, &mut surface),
        Err(PumpError::Halted)
    ));
}

#[test]
fn undersized_frames_are_rejected_before_presenting() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    source.short_by = 4;

    let err = pump.tick(0.0, &mut source, &mut surface).unwrap_err();

    assert!(matches!(
        err,
        PumpError::Frame {
            index: 0,
            source: FrameError::LengthMismatch {
                expected: 32,
                actual: 28
            }
        }
    ));
    assert!(surface.presents.is_empty());
}

#[test]
fn present_failure_halts_the_pump() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    surface.reject = true;

    let err = pump.tick(0.0, &mut source, &mut surface).unwrap_err();

    assert!(matches!(err, PumpError::Present { index: 0, .. }));
    assert_eq!(pump.phase(), PumpPhase::Halted);
}

#[test]
fn reprime_restarts_the_sequence() {
    let (mut pump, mut source, mut surface) = started(4, 2);
    pump.tick(0.0, &mut source, &mut surface).unwrap();
    pump.tick(16.0, &mut source, &mut surface).unwrap();

    pump.reprime();
    let outcome = pump.tick(5000.0, &mut source, &mut surface).unwrap();

    assert_eq!(
        outcome.frame(),
        FrameDescriptor {
            index: 0,
            elapsed_ms: 0.0
        }
    );
    assert_eq!(pump.stats().frames_presented, 3);
    assert_eq!(pump.stats().total_elapsed_ms, 16.0);
}

#[test]
fn index_exhaustion_halts_instead_of_wrapping() {
    let (mut pump, mut source, mut surface) = started(1, 1);
    pump.state = PumpState::Running {
        previous_timestamp: 0.0,
        frame_index: u32::MAX,
    };

    let err = pump.tick(16.0, &mut source, &mut surface).unwrap_err();

    assert!(matches!(err, PumpError::IndexExhausted));
    assert!(source.requests.is_empty());
}
