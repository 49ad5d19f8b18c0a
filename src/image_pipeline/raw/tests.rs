use crate::image_pipeline::buffer::BitDepth;
use crate::image_pipeline::common::error::PipelineError;
use crate::image_pipeline::raw::{
    LevelsAdjust, OutputColorSpace, RawDecodingSettings, RawImageData, RawSamples, demosaic,
};

fn sensor(width: usize, height: usize, cpp: usize, value: u16) -> RawImageData {
    RawImageData {
        width,
        height,
        data: vec![value; width * height * cpp],
        bits_per_sample: 12,
        wb_coeffs: [1.0, 1.0, 1.0, f32::NAN],
        blacklevels: [0; 4],
        whitelevels: [4095; 4],
        cfa: "RGGB".to_string(),
        cpp,
        cam_to_xyz: [[0.0; 4]; 3],
    }
}

fn raw_settings(sixteen_bits_image: bool) -> RawDecodingSettings {
    RawDecodingSettings {
        sixteen_bits_image,
        output_color_space: OutputColorSpace::Raw,
        ..Default::default()
    }
}

#[test]
fn test_default_settings_are_clean() {
    let settings = RawDecodingSettings::default();
    assert!(!settings.post_processing_dirty());
    assert_eq!(settings.depth(), BitDepth::Eight);
}

#[test]
fn test_each_knob_marks_settings_dirty() {
    let cases: Vec<fn(&mut RawDecodingSettings)> = vec![
        |s| s.lightness = 0.1,
        |s| s.contrast = 1.2,
        |s| s.gamma = 0.8,
        |s| s.saturation = 1.5,
        |s| s.exposure_comp = 0.5,
        |s| s.curve_adjust = vec![(0, 0), (65535, 65535)],
        |s| s.levels_adjust = LevelsAdjust::from_flat(&[0, 65535, 0, 65535].repeat(4)),
    ];
    for change in cases {
        let mut settings = RawDecodingSettings::default();
        change(&mut settings);
        assert!(settings.post_processing_dirty(), "{}", settings.summary());
        settings.reset_post_processing();
        assert!(!settings.post_processing_dirty());
    }
}

#[test]
fn test_sub_field_dirtiness_is_independent() {
    let settings = RawDecodingSettings {
        exposure_comp: 0.5,
        ..Default::default()
    };
    assert!(settings.white_balance_dirty());
    assert!(!settings.bcg_dirty());
    assert!(!settings.curve_dirty());
    assert!(!settings.levels_dirty());
}

#[test]
fn test_levels_flat_form() {
    assert!(LevelsAdjust::from_flat(&[1, 2, 3]).is_none());
    let flat: Vec<i32> = (0..16).collect();
    let levels = LevelsAdjust::from_flat(&flat).unwrap();
    assert_eq!(levels.channels[2].low_input, 8);
    assert_eq!(levels.to_flat(), flat);
}

#[test]
fn test_settings_deserialize_with_defaults() {
    let settings: RawDecodingSettings = toml::from_str(
        r#"
        sixteen_bits_image = true
        output_color_space = "pro-photo"
        exposure_comp = 0.5
        "#,
    )
    .unwrap();
    assert!(settings.sixteen_bits_image);
    assert_eq!(settings.output_color_space, OutputColorSpace::ProPhoto);
    assert_eq!(settings.contrast, 1.0);
    assert!(settings.white_balance_dirty());
}

#[test]
fn test_linear_sensor_sixteen_bit_reports_sensor_range() {
    let mut raw = sensor(2, 2, 3, 4095);
    raw.blacklevels = [95; 4];
    let decoded = demosaic(&raw, &raw_settings(true)).unwrap();
    assert_eq!((decoded.width, decoded.height), (2, 2));
    assert_eq!(decoded.rgbmax, 4000);
    match decoded.samples {
        RawSamples::Sixteen(samples) => assert!(samples.iter().all(|&v| v == 4000)),
        other => panic!("unexpected samples {:?}", other),
    }
}

#[test]
fn test_eight_bit_output_is_gamma_encoded() {
    let mut raw = sensor(1, 1, 3, 0);
    raw.data = vec![4095, 0, 410];
    let decoded = demosaic(&raw, &raw_settings(false)).unwrap();
    assert_eq!(decoded.rgbmax, 255);
    match decoded.samples {
        RawSamples::Eight(samples) => {
            assert_eq!(samples[0], 255);
            assert_eq!(samples[1], 0);
            // 10% linear sits well above 10% once encoded
            assert!(samples[2] > 60 && samples[2] < 100, "{}", samples[2]);
        }
        other => panic!("unexpected samples {:?}", other),
    }
}

#[test]
fn test_uniform_mosaic_demosaics_to_uniform_rgb() {
    let raw = sensor(4, 4, 1, 2048);
    let decoded = demosaic(&raw, &raw_settings(true)).unwrap();
    match decoded.samples {
        RawSamples::Sixteen(samples) => {
            assert_eq!(samples.len(), 4 * 4 * 3);
            assert!(samples.iter().all(|&v| v == 2048), "{:?}", samples);
        }
        other => panic!("unexpected samples {:?}", other),
    }
}

#[test]
fn test_unknown_cfa_is_rejected() {
    let mut raw = sensor(4, 4, 1, 100);
    raw.cfa = "XTRANS".to_string();
    let err = demosaic(&raw, &raw_settings(true)).unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFormat(_)));
}

#[test]
fn test_short_sensor_data_is_a_decode_failure() {
    let mut raw = sensor(4, 4, 1, 100);
    raw.data.truncate(5);
    assert!(matches!(
        demosaic(&raw, &raw_settings(true)),
        Err(PipelineError::DecodeFailed(_))
    ));
}
