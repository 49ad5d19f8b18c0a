use std::path::Path;
use std::sync::{Arc, Mutex};

use dimg_core::image_pipeline::common::Result;
use dimg_core::image_pipeline::filter::{FilterEvent, FilterParams, FilterState, spawn};
use dimg_core::image_pipeline::loader::RawLoader;
use dimg_core::image_pipeline::raw::{DecodedRaw, RawInfo, RawSamples};
use dimg_core::image_pipeline::{
    AssignProfileOnly, BitDepth, ColorProfile, ConversionConfig, Converter, DecodeOptions, EditSession,
    EncodeOptions, FilterRegistry, FilterTask, LoaderObserver, LoaderSet, RawDecoder, RawDecodingSettings,
    Rotation,
};
use tempfile::TempDir;

/// A 2x2 all-white frame, as an 8-bit decoder would deliver it.
struct WhiteFrame;

impl RawDecoder for WhiteFrame {
    fn identify(&self, _path: &Path) -> Result<RawInfo> {
        Ok(RawInfo {
            width: 2,
            height: 2,
            make: "Stub".to_string(),
            model: "White".to_string(),
            bits_per_sample: 8,
        })
    }

    fn decode(&self, _path: &Path, _settings: &RawDecodingSettings) -> Result<DecodedRaw> {
        Ok(DecodedRaw {
            width: 2,
            height: 2,
            samples: RawSamples::Eight(vec![255; 12]),
            rgbmax: 255,
        })
    }
}

#[derive(Default)]
struct Progress {
    seen: Mutex<Vec<f32>>,
}

impl LoaderObserver for Progress {
    fn progress_info(&self, fraction: f32) {
        self.seen.lock().unwrap().push(fraction);
    }
}

fn loaders() -> LoaderSet {
    LoaderSet::standard().with_loader(Box::new(RawLoader::with_custom(WhiteFrame, AssignProfileOnly)))
}

fn raw_fixture(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("frame.dng");
    std::fs::write(&path, b"stub raw container").unwrap();
    path
}

#[test]
fn raw_white_frame_fills_sixteen_bit_range() {
    let dir = TempDir::new().unwrap();
    let options = DecodeOptions::with_raw(RawDecodingSettings {
        sixteen_bits_image: true,
        ..RawDecodingSettings::default()
    });
    let progress = Progress::default();

    let image = loaders().load(&raw_fixture(&dir), &options, Some(&progress)).unwrap();

    assert_eq!(image.depth(), BitDepth::Sixteen);
    for y in 0..2 {
        for x in 0..2 {
            let px = image.pixel(x, y);
            assert_eq!((px.red, px.green, px.blue), (65535, 65535, 65535));
        }
    }
    assert_eq!(image.icc_profile(), Some(&ColorProfile::Srgb));
    let seen = progress.seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[test]
fn raw_to_tiff_conversion_and_editing() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("frame.tiff");
    let config = ConversionConfig {
        decode: DecodeOptions::with_raw(RawDecodingSettings {
            sixteen_bits_image: true,
            exposure_comp: -1.0,
            ..RawDecodingSettings::default()
        }),
        encode: EncodeOptions::default(),
        ..ConversionConfig::default()
    };

    Converter::with_custom(loaders(), config)
        .convert_file(&raw_fixture(&dir), &output, None)
        .unwrap();

    let mut session = EditSession::new(loaders());
    session.load(&output, &DecodeOptions::default(), None).unwrap();
    let loaded = session.image().unwrap();
    assert_eq!(loaded.depth(), BitDepth::Sixteen);
    let red = loaded.pixel(0, 0).red;
    assert!(red > 30000 && red < 35000, "red = {}", red);

    session.rotate(Rotation::Rotate90).unwrap();
    session.set_bcg(0.0, 1.0, 1.0).unwrap();
    assert_eq!(
        session.undo_history(),
        vec!["Brightness / Contrast / Gamma", "Rotate 90"]
    );
    session.save(&EncodeOptions::default()).unwrap();
    assert!(!session.is_modified());
}

#[test]
fn background_filter_from_registry() {
    let dir = TempDir::new().unwrap();
    let image = loaders()
        .load(&raw_fixture(&dir), &DecodeOptions::default(), None)
        .unwrap();
    let params = FilterParams::new().with("width", 8u32).with("height", 6u32);
    let filter = FilterRegistry::global().create_filter_with("resize", 1, &params).unwrap();

    let mut task = FilterTask::new(filter);
    task.init(Arc::new(image)).unwrap();
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
    let resized = result.unwrap();
    assert_eq!((resized.width(), resized.height()), (8, 6));
    assert_eq!(events.last(), Some(&FilterEvent::Done(true)));
    assert!(events.contains(&FilterEvent::Progress(100)));
}
