use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::image_pipeline::buffer::{AspectMode, BitDepth, Color, PixelBuffer, PixelSamples};
use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::common::observer::{CancelToken, LoaderObserver};
use crate::image_pipeline::filter::{
    BcgFilter, BcgSettings, CurveType, CurvesFilter, CurvesSettings, FilterContext, FilterEvent,
    FilterGenerator, FilterParams, FilterPipeline, FilterRegistry, FilterState, FilterTask,
    LensCorrectionFilter, LensProfile, LevelsChannel, LevelsFilter, LevelsSettings, RegisteredFilter,
    ResizeFilter, TcaModel, ThreadedFilter, WhiteBalanceFilter, WhiteBalanceSettings,
    points_from_eight_bit, points_to_eight_bit, spawn,
};
use crate::image_pipeline::raw::RawDecodingSettings;

// ---------------------------------------------------------------------------
// helpers

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<f32>>,
}

impl LoaderObserver for Recorder {
    fn progress_info(&self, fraction: f32) {
        self.seen.lock().unwrap().push(fraction);
    }
}

/// Lets `allowed` queries through, then asks to stop.
struct StopAfter {
    allowed: usize,
    calls: AtomicUsize,
}

impl StopAfter {
    fn new(allowed: usize) -> Self {
        Self {
            allowed,
            calls: AtomicUsize::new(0),
        }
    }
}

impl LoaderObserver for StopAfter {
    fn continue_query(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst) < self.allowed
    }
}

fn solid(width: u32, height: u32, depth: BitDepth, color: Color) -> PixelBuffer {
    let mut buffer = PixelBuffer::allocate(width, height, depth, false).unwrap();
    buffer.fill(color);
    buffer
}

fn run(filter: &mut dyn ThreadedFilter, src: &PixelBuffer) -> PixelBuffer {
    filter.filter_image(src, &FilterContext::detached()).unwrap()
}

/// Adds one to the first sample and records its name.
struct RecordingFilter {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl ThreadedFilter for RecordingFilter {
    fn id(&self) -> &'static str {
        self.name
    }

    fn filter_image(&mut self, src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        ctx.check()?;
        self.log.lock().unwrap().push(self.name);
        let mut out = src.copy()?;
        if let PixelSamples::Eight(data) = out.samples_mut() {
            data[0] += 1;
        }
        Ok(out)
    }
}

struct RecordingGenerator {
    ids: Vec<&'static str>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl FilterGenerator for RecordingGenerator {
    fn filter_ids(&self) -> Vec<&'static str> {
        self.ids.clone()
    }

    fn supported_versions(&self, _id: &str) -> Vec<u32> {
        vec![1]
    }

    fn display_name(&self, id: &str) -> Option<String> {
        Some(format!("recording {}", id))
    }

    fn create(&self, id: &str, _version: u32, _params: &FilterParams) -> Result<Box<dyn ThreadedFilter>> {
        let name = self
            .ids
            .iter()
            .copied()
            .find(|candidate| *candidate == id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        Ok(Box::new(RecordingFilter {
            name,
            log: self.log.clone(),
        }))
    }
}

/// Spins until cancelled.
struct SpinFilter;

impl ThreadedFilter for SpinFilter {
    fn id(&self) -> &'static str {
        "spin"
    }

    fn filter_image(&mut self, _src: &PixelBuffer, ctx: &FilterContext<'_>) -> Result<PixelBuffer> {
        loop {
            ctx.check()?;
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

// ---------------------------------------------------------------------------
// context and lifecycle

#[test]
fn test_slave_progress_maps_into_parent_range() {
    let recorder = Recorder::default();
    let ctx = FilterContext::new(CancelToken::new(), Some(&recorder));
    let slave = ctx.slave(33.0, 66.0);
    assert_eq!(slave.range(), (33.0, 66.0));

    slave.post_progress(50.0);
    slave.post_progress(100.0);
    let nested = ctx.slave(66.0, 100.0).slave(50.0, 100.0);
    assert_eq!(nested.range(), (83.0, 100.0));
    nested.post_progress(0.0);

    let seen = recorder.seen.lock().unwrap().clone();
    assert!((seen[0] - 0.495).abs() < 1e-4, "{:?}", seen);
    assert!((seen[1] - 0.66).abs() < 1e-4, "{:?}", seen);
    assert!((seen[2] - 0.83).abs() < 1e-4, "{:?}", seen);
}

#[test]
fn test_progress_never_goes_backwards() {
    let recorder = Recorder::default();
    let ctx = FilterContext::new(CancelToken::new(), Some(&recorder));
    ctx.post_progress(60.0);
    ctx.slave(0.0, 50.0).post_progress(100.0);
    ctx.post_progress(40.0);
    assert_eq!(*recorder.seen.lock().unwrap(), vec![0.6]);
}

#[test]
fn test_slave_shares_cancellation_flag() {
    let ctx = FilterContext::detached();
    let slave = ctx.slave(0.0, 50.0);
    ctx.cancel_token().cancel();
    assert!(!slave.is_running());
    assert!(matches!(slave.check(), Err(PipelineError::Cancelled)));
}

#[test]
fn test_observer_refusal_cancels_within_one_row_and_keeps_source() {
    let source = Arc::new(solid(16, 100, BitDepth::Eight, Color::opaque(10, 20, 30, BitDepth::Eight)));
    let pristine = (*source).clone();
    let observer = StopAfter::new(3);

    let mut task = FilterTask::new(Box::new(
        BcgFilter::new(BcgSettings {
            brightness: 0.5,
            ..Default::default()
        })
        .unwrap(),
    ));
    task.init(source.clone()).unwrap();
    let ctx = FilterContext::new(CancelToken::new(), Some(&observer));
    let result = task.run(&ctx);

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(task.state(), FilterState::Cancelled);
    assert_eq!(observer.calls.load(Ordering::SeqCst), 4);
    assert!(ctx.cancel_token().is_cancelled());
    assert_eq!(*source, pristine);
}

#[test]
fn test_task_state_machine() {
    let source = Arc::new(solid(4, 4, BitDepth::Eight, Color::opaque(1, 2, 3, BitDepth::Eight)));
    let mut task = FilterTask::new(Box::new(BcgFilter::new(BcgSettings::default()).unwrap()));
    assert_eq!(task.state(), FilterState::Constructed);
    assert!(task.run(&FilterContext::detached()).is_err(), "must be initialised first");

    task.init(source.clone()).unwrap();
    assert_eq!(task.state(), FilterState::Initialized);
    let out = task.run(&FilterContext::detached()).unwrap();
    assert_eq!(task.state(), FilterState::Completed);
    assert!(task.state().is_finished());
    assert_eq!(out, *source);
}

#[test]
fn test_second_init_is_rejected() {
    let source = Arc::new(solid(4, 4, BitDepth::Eight, Color::default()));
    let mut task = FilterTask::new(Box::new(ResizeFilter::new(2, 2, AspectMode::Free).unwrap()));
    task.init(source.clone()).unwrap();
    assert!(task.init(source).is_err());
}

#[test]
fn test_spawned_filter_completes_and_reports() {
    let source = Arc::new(solid(8, 8, BitDepth::Sixteen, Color::opaque(100, 200, 300, BitDepth::Sixteen)));
    let mut task = FilterTask::new(Box::new(ResizeFilter::new(4, 4, AspectMode::Free).unwrap()));
    task.init(source).unwrap();

    let handle = spawn(task, None).unwrap();
    let mut events = Vec::new();
    while let Some(event) = handle.next_event() {
        let done = matches!(event, FilterEvent::Done(_));
        events.push(event);
        if done {
            break;
        }
    }
    let (state, result) = handle.wait();
    assert_eq!(state, FilterState::Completed);
    let out = result.unwrap();
    assert_eq!((out.width(), out.height()), (4, 4));
    // First checkpoint past line 0 of 8 rows + 4 columns.
    assert_eq!(events.first(), Some(&FilterEvent::Progress(8)));
    assert_eq!(events.last(), Some(&FilterEvent::Done(true)));
}

#[test]
fn test_spawned_filter_cancels() {
    let source = Arc::new(solid(2, 2, BitDepth::Eight, Color::default()));
    let mut task = FilterTask::new(Box::new(SpinFilter));
    task.init(source).unwrap();

    let handle = spawn(task, None).unwrap();
    std::thread::sleep(Duration::from_millis(10));
    handle.cancel();
    let (state, result) = handle.wait();
    assert_eq!(state, FilterState::Cancelled);
    assert!(result.unwrap_err().is_cancelled());
}

#[test]
fn test_spawn_requires_initialised_task() {
    let task = FilterTask::new(Box::new(SpinFilter));
    assert!(spawn(task, None).is_err());
}

// ---------------------------------------------------------------------------
// registry

#[test]
fn test_duplicate_identifier_keeps_first_generator() {
    let registry = FilterRegistry::with_builtin_filters();
    let log = Arc::new(Mutex::new(Vec::new()));
    let added = registry.add_generator(Arc::new(RecordingGenerator {
        ids: vec!["resize", "impostor"],
        log,
    }));

    assert_eq!(added, 1, "only the new identifier is registered");
    let filter = registry.create_filter("resize", 1).unwrap();
    assert_eq!(filter.id(), ResizeFilter::ID);
    assert_eq!(registry.displayable_name("resize").as_deref(), Some(ResizeFilter::NAME));
    assert!(registry.is_supported("impostor"));
}

#[test]
fn test_remove_generator_drops_all_its_identifiers() {
    let registry = FilterRegistry::with_builtin_filters();
    let log = Arc::new(Mutex::new(Vec::new()));
    let generator = Arc::new(RecordingGenerator {
        ids: vec!["alpha", "beta"],
        log,
    });
    assert_eq!(registry.add_generator(generator.clone()), 2);

    assert_eq!(registry.remove_generator("beta"), 2);

    assert!(!registry.is_supported("alpha"));
    assert!(!registry.is_supported("beta"));
    assert!(matches!(registry.create_filter("alpha", 1), Err(PipelineError::NotFound(_))));
    assert!(registry.is_supported("resize"));
    assert_eq!(registry.remove_generator("beta"), 0);
    assert_eq!(registry.add_generator(generator), 2, "identifiers are free again");
}

#[test]
fn test_remove_generator_while_other_threads_look_up() {
    let registry = FilterRegistry::with_builtin_filters();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    assert!(registry.create_filter("bcg", 1).is_ok());
                    let _ = registry.is_supported("curves");
                }
            });
        }
        scope.spawn(|| assert_eq!(registry.remove_generator("curves"), 1));
    });
    assert!(!registry.is_supported("curves"));
    assert!(registry.is_supported("bcg"));
}

#[test]
fn test_registry_lookups() {
    let registry = FilterRegistry::with_builtin_filters();
    assert_eq!(
        registry.supported_filters(),
        vec!["bcg", "curves", "lenscorrection", "levels", "resize", "whitebalance"]
    );
    assert_eq!(registry.supported_versions("curves"), vec![1]);
    assert!(registry.is_supported_version("levels", 1));
    assert!(!registry.is_supported_version("levels", 2));
    assert!(!registry.is_supported("filmgrain"));
    assert_eq!(registry.displayable_name("filmgrain"), None);
    assert!(registry.supported_versions("filmgrain").is_empty());
}

#[test]
fn test_create_filter_errors() {
    let registry = FilterRegistry::with_builtin_filters();
    assert!(matches!(registry.create_filter("nope", 1), Err(PipelineError::NotFound(_))));
    assert!(matches!(
        registry.create_filter("bcg", 7),
        Err(PipelineError::UnsupportedVersion { version: 7, .. })
    ));
    let bad = FilterParams::new().with("gamma", "bright");
    assert!(matches!(
        registry.create_filter_with("bcg", 1, &bad),
        Err(PipelineError::InvalidParameters(_))
    ));
}

#[test]
fn test_global_registry_is_shared() {
    let a = FilterRegistry::global() as *const FilterRegistry;
    let b = FilterRegistry::global() as *const FilterRegistry;
    assert_eq!(a, b);
    assert!(FilterRegistry::global().is_supported("lenscorrection"));
}

#[test]
fn test_params_from_toml() {
    let params: FilterParams = toml::from_str(
        r#"
        width = 640
        aspect = "keep"
        points = [[0, 0], [65535, 32767]]
        values = [0.5, 1.5]
        "#,
    )
    .unwrap();
    assert_eq!(params.int("width", 0).unwrap(), 640);
    assert_eq!(params.float("width", 0.0).unwrap(), 640.0);
    assert_eq!(params.text("aspect").unwrap(), Some("keep"));
    assert_eq!(params.points("points").unwrap(), vec![(0, 0), (65535, 32767)]);
    assert_eq!(params.list("values").unwrap(), vec![0.5, 1.5]);
    assert!(params.flag("width", false).is_err());
}

// ---------------------------------------------------------------------------
// pipeline

fn recording_registry(log: &Arc<Mutex<Vec<&'static str>>>) -> FilterRegistry {
    let registry = FilterRegistry::new();
    registry.add_generator(Arc::new(RecordingGenerator {
        ids: vec!["whitebalance", "bcg", "curves", "levels"],
        log: log.clone(),
    }));
    registry
}

#[test]
fn test_post_processing_runs_in_fixed_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(&log);
    let settings = RawDecodingSettings {
        exposure_comp: 0.5,
        contrast: 1.1,
        curve_adjust: vec![(0, 0), (65535, 65535)],
        levels_adjust: crate::image_pipeline::raw::LevelsAdjust::from_flat(&[0, 65535, 0, 65535].repeat(4)),
        ..Default::default()
    };

    let mut pipeline = FilterPipeline::raw_post_processing(&settings, &registry).unwrap();
    assert_eq!(pipeline.stage_names(), vec!["whitebalance", "bcg", "curves", "levels"]);

    let src = solid(2, 2, BitDepth::Eight, Color::default());
    let (out, timings) = pipeline.run(&src, &FilterContext::detached()).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["whitebalance", "bcg", "curves", "levels"]);
    assert_eq!(timings.steps().len(), 4);
    // Each stage saw its predecessor's output.
    assert_eq!(out.bytes()[0], 4);
    assert_eq!(src.bytes()[0], 0);
}

#[test]
fn test_exposure_and_curve_only() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(&log);
    let settings = RawDecodingSettings {
        exposure_comp: 0.5,
        curve_adjust: vec![(0, 0), (30000, 40000), (65535, 65535)],
        ..Default::default()
    };
    let mut pipeline = FilterPipeline::raw_post_processing(&settings, &registry).unwrap();
    let src = solid(2, 2, BitDepth::Eight, Color::default());
    let (out, _) = pipeline.run(&src, &FilterContext::detached()).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["whitebalance", "curves"]);
    assert_eq!(out.bytes()[0], 2);
}

#[test]
fn test_clean_settings_build_empty_pipeline() {
    let registry = FilterRegistry::with_builtin_filters();
    let mut pipeline = FilterPipeline::raw_post_processing(&RawDecodingSettings::default(), &registry).unwrap();
    assert!(pipeline.is_empty());
    let src = solid(3, 3, BitDepth::Sixteen, Color::opaque(1, 2, 3, BitDepth::Sixteen));
    let (out, timings) = pipeline.run(&src, &FilterContext::detached()).unwrap();
    assert_eq!(out, src);
    assert!(timings.steps().is_empty());
}

#[test]
fn test_cancelled_pipeline_stops_before_next_stage() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = recording_registry(&log);
    let settings = RawDecodingSettings {
        exposure_comp: 0.5,
        gamma: 1.2,
        ..Default::default()
    };
    let mut pipeline = FilterPipeline::raw_post_processing(&settings, &registry).unwrap();
    let observer = StopAfter::new(2);
    let ctx = FilterContext::new(CancelToken::new(), Some(&observer));
    let src = solid(2, 2, BitDepth::Eight, Color::default());
    let err = pipeline.run(&src, &ctx).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(*log.lock().unwrap(), vec!["whitebalance"]);
}

#[test]
fn test_real_post_processing_chain_brightens() {
    let settings = RawDecodingSettings {
        exposure_comp: 1.0,
        ..Default::default()
    };
    let mut pipeline = FilterPipeline::raw_post_processing(&settings, FilterRegistry::global()).unwrap();
    let src = solid(2, 2, BitDepth::Sixteen, Color::opaque(10000, 10000, 10000, BitDepth::Sixteen));
    let (out, _) = pipeline.run(&src, &FilterContext::detached()).unwrap();
    assert_eq!(out.pixel(1, 1).green, 20000);
}

#[test]
fn test_post_processing_curve_points_are_sixteen_bit_for_eight_bit_images() {
    let run = |curve_adjust: Vec<(i32, i32)>| {
        let settings = RawDecodingSettings {
            curve_adjust,
            ..Default::default()
        };
        let mut pipeline = FilterPipeline::raw_post_processing(&settings, FilterRegistry::global()).unwrap();
        let src = solid(1, 1, BitDepth::Eight, Color::opaque(255, 255, 255, BitDepth::Eight));
        let (out, _) = pipeline.run(&src, &FilterContext::detached()).unwrap();
        out.pixel(0, 0).green
    };

    assert_eq!(run(points_from_eight_bit(&[(0, 0), (255, 128)])), 128);
    // 8-bit points read as 16-bit collapse to nothing.
    assert_eq!(run(vec![(0, 0), (255, 128)]), 0);
}

// ---------------------------------------------------------------------------
// individual filters

#[test]
fn test_bcg_default_is_identity_at_both_depths() {
    let settings = BcgSettings::default();
    assert!(settings.is_identity());
    assert!(settings.lut8().iter().enumerate().all(|(i, &v)| v as usize == i));
    assert!(settings.lut16().iter().enumerate().all(|(i, &v)| v as usize == i));
}

#[test]
fn test_bcg_brightness_scales_with_depth() {
    let settings = BcgSettings {
        brightness: 0.1,
        ..Default::default()
    };
    assert_eq!(settings.lut8()[100], 126);
    assert_eq!(settings.lut16()[1000], 7554);
    assert_eq!(settings.lut8()[250], 255);
}

#[test]
fn test_bcg_rejects_bad_gamma() {
    assert!(
        BcgFilter::new(BcgSettings {
            gamma: 0.0,
            ..Default::default()
        })
        .is_err()
    );
}

#[test]
fn test_white_balance_exposure_doubles() {
    let mut filter = WhiteBalanceFilter::new(WhiteBalanceSettings {
        exposure: 1.0,
        ..Default::default()
    })
    .unwrap();
    let src = solid(2, 2, BitDepth::Eight, Color::opaque(50, 60, 70, BitDepth::Eight));
    let px = run(&mut filter, &src).pixel(0, 0);
    assert_eq!((px.red, px.green, px.blue), (100, 120, 140));
}

#[test]
fn test_white_balance_zero_saturation_is_gray() {
    let mut filter = WhiteBalanceFilter::new(WhiteBalanceSettings {
        saturation: 0.0,
        ..Default::default()
    })
    .unwrap();
    let src = solid(1, 1, BitDepth::Eight, Color::opaque(255, 0, 0, BitDepth::Eight));
    let px = run(&mut filter, &src).pixel(0, 0);
    assert_eq!((px.red, px.green, px.blue), (76, 76, 76));
}

#[test]
fn test_white_balance_warm_scene_cools_output() {
    let mut filter = WhiteBalanceFilter::new(WhiteBalanceSettings {
        temperature: 3200.0,
        ..Default::default()
    })
    .unwrap();
    let src = solid(1, 1, BitDepth::Sixteen, Color::opaque(20000, 20000, 20000, BitDepth::Sixteen));
    let px = run(&mut filter, &src).pixel(0, 0);
    assert!(px.blue > px.red, "{:?}", px);
    assert_eq!(px.green, 20000);
}

#[test]
fn test_curves_identity_and_free_curve() {
    let identity = CurvesSettings::luminosity(vec![(0, 0), (65535, 65535)]);
    assert!(identity.lut8()[2].iter().enumerate().all(|(i, &v)| v as usize == i));

    let halve = CurvesSettings {
        curve_type: CurveType::Free,
        ..CurvesSettings::luminosity(vec![(0, 0), (65535, 32767)])
    };
    let lut = halve.lut16();
    assert_eq!(lut[0][65535], 32767);
    assert_eq!(lut[1][1000], 500);
}

#[test]
fn test_smooth_curve_is_monotone() {
    let settings = CurvesSettings::luminosity(vec![(0, 0), (64 * 255, 100 * 255), (192 * 255, 200 * 255), (65535, 65535)]);
    let lut = settings.lut8();
    assert!(lut[0].windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(lut[0][64], 100);
}

#[test]
fn test_curve_points_rescale_between_depths() {
    let persisted = vec![(25500, 51000), (65535, 65535)];
    let eight = points_to_eight_bit(&persisted);
    assert_eq!(eight, vec![(100, 200), (255, 255)]);
    assert_eq!(points_from_eight_bit(&eight[..1]), vec![(25500, 51000)]);
}

#[test]
fn test_curves_filter_applies_per_channel() {
    let mut filter = CurvesFilter::new(CurvesSettings {
        red: vec![(0, 65535), (65535, 65535)],
        ..Default::default()
    })
    .unwrap();
    let src = solid(2, 1, BitDepth::Eight, Color::opaque(10, 20, 30, BitDepth::Eight));
    let px = run(&mut filter, &src).pixel(1, 0);
    assert_eq!((px.red, px.green, px.blue), (255, 20, 30));
}

#[test]
fn test_levels_stretch_red_channel() {
    let mut settings = LevelsSettings::default();
    assert!(settings.is_identity());
    settings.channels[1] = LevelsChannel {
        high_input: 127 * 255,
        ..LevelsChannel::default()
    };
    let mut filter = LevelsFilter::new(settings).unwrap();
    let src = solid(1, 1, BitDepth::Eight, Color::opaque(127, 127, 127, BitDepth::Eight));
    let px = run(&mut filter, &src).pixel(0, 0);
    assert_eq!((px.red, px.green, px.blue), (255, 127, 127));
}

#[test]
fn test_levels_from_params() {
    let mut values = vec![0.0, 65535.0, 0.0, 65535.0].repeat(4);
    values[3] = 32767.0;
    let params = FilterParams::new().with("values", values);
    let mut filter = LevelsFilter::from_params(&params).unwrap();
    let src = solid(1, 1, BitDepth::Sixteen, Color::opaque(65535, 65535, 0, BitDepth::Sixteen));
    let px = run(&mut filter, &src).pixel(0, 0);
    assert_eq!((px.red, px.green, px.blue), (32767, 32767, 0));

    let short = FilterParams::new().with("values", vec![1.0, 2.0]);
    assert!(LevelsFilter::from_params(&short).is_err());
}

#[test]
fn test_resize_reports_progress_per_line() {
    let recorder = Recorder::default();
    let ctx = FilterContext::new(CancelToken::new(), Some(&recorder));
    let mut filter = ResizeFilter::new(10, 10, AspectMode::KeepAspect).unwrap();
    let src = solid(40, 20, BitDepth::Eight, Color::default());
    let out = filter.filter_image(&src, &ctx).unwrap();
    assert_eq!((out.width(), out.height()), (10, 5));

    // 20 source rows plus 10 destination columns.
    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 29);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(*seen.last().unwrap() < 1.0);
}

#[derive(Default)]
struct QueryCounter {
    calls: AtomicUsize,
}

impl LoaderObserver for QueryCounter {
    fn continue_query(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn test_resize_polls_cancellation_every_line() {
    let counter = QueryCounter::default();
    let ctx = FilterContext::new(CancelToken::new(), Some(&counter));
    let mut filter = ResizeFilter::new(50, 100, AspectMode::Free).unwrap();
    let src = solid(100, 200, BitDepth::Eight, Color::opaque(10, 20, 30, BitDepth::Eight));

    let out = filter.filter_image(&src, &ctx).unwrap();

    assert_eq!((out.width(), out.height()), (50, 100));
    assert_eq!(counter.calls.load(Ordering::SeqCst), 200 + 50);
    let px = out.pixel(25, 50);
    assert_eq!((px.red, px.green, px.blue), (10, 20, 30));
}

#[test]
fn test_resize_stops_within_a_line_of_cancellation() {
    let observer = StopAfter::new(120);
    let ctx = FilterContext::new(CancelToken::new(), Some(&observer));
    let mut filter = ResizeFilter::new(50, 100, AspectMode::Free).unwrap();
    let src = solid(100, 200, BitDepth::Sixteen, Color::opaque(1, 2, 3, BitDepth::Sixteen));

    let result = filter.filter_image(&src, &ctx);

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(observer.calls.load(Ordering::SeqCst), 121);
    assert!(ctx.cancel_token().is_cancelled());
}

#[test]
fn test_lens_without_corrections_copies() {
    let mut filter = LensCorrectionFilter::new(LensProfile::default());
    let src = solid(5, 5, BitDepth::Eight, Color::opaque(9, 8, 7, BitDepth::Eight));
    assert_eq!(run(&mut filter, &src), src);
}

#[test]
fn test_lens_stages_run_as_slaves_with_unified_progress() {
    let profile = LensProfile {
        tca: Some(TcaModel {
            red: [1.0, 0.0],
            blue: [1.0, 0.0],
        }),
        vignetting: Some([0.5, 0.0, 0.0]),
        distortion: Some([0.0, 0.0, 0.0]),
    };
    assert_eq!(profile.stage_count(), 3);
    let src = solid(21, 11, BitDepth::Sixteen, Color::opaque(30000, 30000, 30000, BitDepth::Sixteen));
    let recorder = Recorder::default();
    let ctx = FilterContext::new(CancelToken::new(), Some(&recorder));

    let mut task = FilterTask::new(Box::new(LensCorrectionFilter::new(profile)));
    task.init(Arc::new(src.clone())).unwrap();
    let out = task.run(&ctx).unwrap();

    let seen = recorder.seen.lock().unwrap().clone();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().any(|&p| p > 0.0 && p < 0.34));
    assert!(seen.iter().any(|&p| p > 0.34 && p < 0.67));
    assert!(seen.iter().any(|&p| p > 0.67 && p < 1.0));
    assert_eq!(seen.last().copied(), Some(1.0));

    assert_eq!(out.pixel(10, 5), src.pixel(10, 5), "optical centre is untouched");
    assert!(out.pixel(0, 5).red < 30000, "edges lose vignetting gain");
}

#[test]
fn test_lens_stages_agree_across_depths_and_keep_alpha() {
    let profile = LensProfile {
        vignetting: Some([0.5, 0.0, 0.0]),
        distortion: Some([0.0, 0.0, 0.0]),
        ..LensProfile::default()
    };
    let with_alpha = |depth: BitDepth| {
        let mut image = PixelBuffer::allocate(21, 11, depth, true).unwrap();
        image.fill(Color::new(200, 150, 100, 77, false).to_depth(depth));
        image
    };

    let out8 = run(&mut LensCorrectionFilter::new(profile.clone()), &with_alpha(BitDepth::Eight));
    let out16 = run(&mut LensCorrectionFilter::new(profile), &with_alpha(BitDepth::Sixteen));

    assert_eq!(out8.depth(), BitDepth::Eight);
    assert_eq!(out16.depth(), BitDepth::Sixteen);
    assert_eq!(out8.pixel(10, 5).red, 200);
    for (x, y) in [(0, 5), (3, 2), (20, 10)] {
        let (p8, p16) = (out8.pixel(x, y), out16.pixel(x, y));
        assert!(p8.red < 200, "({}, {}) red = {}", x, y, p8.red);
        assert!((p16.red as i32 / 257 - p8.red as i32).abs() <= 1);
        assert!((p16.blue as i32 / 257 - p8.blue as i32).abs() <= 1);
        assert_eq!(p8.alpha, 77);
        assert_eq!(p16.alpha, 77 * 257);
    }
}

#[test]
fn test_lens_stage_polls_cancellation_every_row() {
    let counter = QueryCounter::default();
    let ctx = FilterContext::new(CancelToken::new(), Some(&counter));
    let mut filter = LensCorrectionFilter::new(LensProfile {
        vignetting: Some([0.2, 0.0, 0.0]),
        ..LensProfile::default()
    });
    let src = solid(8, 30, BitDepth::Sixteen, Color::opaque(100, 100, 100, BitDepth::Sixteen));

    filter.filter_image(&src, &ctx).unwrap();

    assert_eq!(counter.calls.load(Ordering::SeqCst), 30);
}

#[test]
fn test_lens_params() {
    let params = FilterParams::new()
        .with("vignetting", vec![0.1, 0.0, 0.0])
        .with("tca_red", vec![1.001, 0.0]);
    let filter = LensCorrectionFilter::from_params(&params).unwrap();
    assert_eq!(filter.profile().stage_count(), 2);
    assert_eq!(filter.profile().tca.unwrap().blue, [1.0, 0.0]);

    let bad = FilterParams::new().with("distortion", vec![0.1]);
    assert!(LensCorrectionFilter::from_params(&bad).is_err());
}
