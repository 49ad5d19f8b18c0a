use crate::image_pipeline::buffer::{
    AspectMode, AttributeValue, BitDepth, Color, Flip, PixelBuffer, PixelSamples, Rect, Rotation,
};
use crate::image_pipeline::color::ColorProfile;
use crate::image_pipeline::common::error::PipelineError;

fn gradient(width: u32, height: u32, depth: BitDepth, has_alpha: bool) -> PixelBuffer {
    let mut buffer = PixelBuffer::allocate(width, height, depth, has_alpha).unwrap();
    for y in 0..height {
        for x in 0..width {
            let v = ((x + y * width) % 256) as u16;
            buffer.set_pixel(x, y, Color::new(v, 255 - v, v / 2, 255, false));
        }
    }
    buffer
}

#[test]
fn test_allocate_byte_size_matches_geometry() {
    for &(w, h) in &[(1u32, 1u32), (3, 7), (64, 33)] {
        for depth in [BitDepth::Eight, BitDepth::Sixteen] {
            for alpha in [false, true] {
                let buffer = PixelBuffer::allocate(w, h, depth, alpha).unwrap();
                let bpp = (if alpha { 4 } else { 3 }) * depth.bytes_per_channel();
                assert_eq!(buffer.byte_size(), w as usize * h as usize * bpp);
                assert_eq!(buffer.bytes().len(), buffer.byte_size());
            }
        }
    }
}

#[test]
fn test_allocate_rejects_zero_dimensions() {
    let err = PixelBuffer::allocate(0, 10, BitDepth::Eight, true).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidDimensions(0, 10)));
    assert!(err.is_invalid_parameters());
}

#[test]
fn test_huge_allocation_reports_out_of_memory() {
    let err = PixelBuffer::allocate(u32::MAX, u32::MAX, BitDepth::Sixteen, true).unwrap_err();
    assert!(matches!(err, PipelineError::OutOfMemory(_)));
}

#[test]
fn test_from_samples_validates_length() {
    let err = PixelBuffer::from_samples(2, 2, false, PixelSamples::Eight(vec![0; 11])).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParameters(_)));
}

#[test]
fn test_fill_and_pixel_use_bgra_storage() {
    let mut buffer = PixelBuffer::allocate(2, 1, BitDepth::Eight, true).unwrap();
    buffer.fill(Color::new(10, 20, 30, 40, false));
    assert_eq!(&buffer.bytes()[..4], &[30, 20, 10, 40]);
    assert_eq!(buffer.pixel(1, 0), Color::new(10, 20, 30, 40, false));
}

#[test]
fn test_fill_rescales_eight_bit_colour_into_sixteen_bit_buffer() {
    let mut buffer = PixelBuffer::allocate(1, 1, BitDepth::Sixteen, false).unwrap();
    buffer.fill(Color::opaque(255, 0, 1, BitDepth::Eight));
    let px = buffer.pixel(0, 0);
    assert_eq!((px.red, px.green, px.blue, px.alpha), (65535, 0, 257, 65535));
}

#[test]
fn test_depth_round_trip_is_lossless_from_eight_bit() {
    let original = gradient(16, 16, BitDepth::Eight, true);
    let wide = original.convert_depth(BitDepth::Sixteen).unwrap();
    let back = wide.convert_depth(BitDepth::Eight).unwrap();
    assert_eq!(back.samples(), original.samples());

    let again = back
        .convert_depth(BitDepth::Sixteen)
        .unwrap()
        .convert_depth(BitDepth::Eight)
        .unwrap();
    assert_eq!(again.samples(), back.samples());
}

#[test]
fn test_depth_round_trip_is_lossy_from_sixteen_bit() {
    let mut buffer = PixelBuffer::allocate(1, 1, BitDepth::Sixteen, false).unwrap();
    buffer.set_pixel(0, 0, Color::opaque(1000, 30000, 65535, BitDepth::Sixteen));
    let back = buffer
        .convert_depth(BitDepth::Eight)
        .unwrap()
        .convert_depth(BitDepth::Sixteen)
        .unwrap();
    assert_ne!(back.samples(), buffer.samples());
    assert_eq!(back.pixel(0, 0).blue, 65535);
}

#[test]
fn test_copy_region_extracts_pixels_and_metadata() {
    let mut source = gradient(8, 8, BitDepth::Sixteen, false);
    source.set_icc_profile(Some(ColorProfile::AdobeRgb));
    source.set_attribute("format", "TIFF");

    let region = source.copy_region(Rect::new(2, 3, 4, 2)).unwrap();
    assert_eq!((region.width(), region.height()), (4, 2));
    assert_eq!(region.byte_size(), 4 * 2 * 6);
    assert_eq!(region.pixel(0, 0), source.pixel(2, 3));
    assert_eq!(region.pixel(3, 1), source.pixel(5, 4));
    assert_eq!(region.icc_profile(), Some(&ColorProfile::AdobeRgb));
    assert_eq!(region.attribute("format"), Some(&AttributeValue::Text("TIFF".into())));
}

#[test]
fn test_copy_region_out_of_bounds_is_rejected() {
    let source = gradient(4, 4, BitDepth::Eight, false);
    assert!(source.copy_region(Rect::new(2, 2, 3, 1)).is_err());
    assert!(source.copy_region(Rect::new(0, 0, 0, 1)).is_err());
}

#[test]
fn test_composite_respects_alpha_and_clips() {
    let mut dest = PixelBuffer::allocate(3, 3, BitDepth::Eight, true).unwrap();
    dest.fill(Color::new(0, 0, 0, 255, false));

    let mut overlay = PixelBuffer::allocate(2, 2, BitDepth::Eight, true).unwrap();
    overlay.fill(Color::new(255, 255, 255, 255, false));
    overlay.set_pixel(0, 0, Color::new(255, 255, 255, 0, false));

    overlay.composite_into(&mut dest, 2, 2);
    assert_eq!(dest.pixel(2, 2).red, 0, "transparent pixel leaves destination");
    assert_eq!(dest.pixel(1, 1).red, 0, "nothing painted outside the overlay");

    overlay.composite_into(&mut dest, -1, -1);
    assert_eq!(dest.pixel(0, 0).red, 255);
}

#[test]
fn test_half_alpha_blend() {
    let mut dest = PixelBuffer::allocate(1, 1, BitDepth::Eight, true).unwrap();
    dest.fill(Color::new(0, 0, 0, 255, false));
    let mut overlay = PixelBuffer::allocate(1, 1, BitDepth::Eight, true).unwrap();
    overlay.fill(Color::new(255, 255, 255, 128, false));
    overlay.composite_into(&mut dest, 0, 0);
    let px = dest.pixel(0, 0);
    assert_eq!(px.red, 128);
    assert_eq!(px.alpha, 255);
}

#[test]
fn test_smooth_scale_free_and_keep_aspect() {
    let source = gradient(40, 20, BitDepth::Eight, true);
    let free = source.smooth_scale(10, 10, AspectMode::Free).unwrap();
    assert_eq!((free.width(), free.height()), (10, 10));
    assert_eq!(free.byte_size(), 10 * 10 * 4);

    let keep = source.smooth_scale(10, 10, AspectMode::KeepAspect).unwrap();
    assert_eq!((keep.width(), keep.height()), (10, 5));
    assert_eq!(keep.byte_size(), 10 * 5 * 4);
}

#[test]
fn test_smooth_scale_uniform_sixteen_bit_stays_uniform() {
    let mut source = PixelBuffer::allocate(8, 8, BitDepth::Sixteen, false).unwrap();
    source.fill(Color::opaque(40000, 20000, 1000, BitDepth::Sixteen));
    let scaled = source.smooth_scale(3, 5, AspectMode::Free).unwrap();
    assert!(scaled.is_sixteen_bit());
    let px = scaled.pixel(1, 2);
    assert_eq!((px.red, px.green, px.blue), (40000, 20000, 1000));
}

#[test]
fn test_sub_pixel_interpolates_between_neighbours() {
    let mut buffer = PixelBuffer::allocate(2, 1, BitDepth::Sixteen, false).unwrap();
    buffer.set_pixel(0, 0, Color::opaque(0, 0, 0, BitDepth::Sixteen));
    buffer.set_pixel(1, 0, Color::opaque(1000, 2000, 4000, BitDepth::Sixteen));

    let mid = buffer.sub_pixel(0.5, 0.0);
    assert_eq!((mid.red, mid.green, mid.blue), (500, 1000, 2000));
    let quarter = buffer.sub_pixel(0.25, 0.0);
    assert_eq!(quarter.red, 250);
    assert_eq!(buffer.sub_pixel(-1.0, 0.0).alpha, 0);
}

#[test]
fn test_rotate_and_flip() {
    let source = gradient(3, 2, BitDepth::Eight, false);

    let r90 = source.rotate(Rotation::Rotate90).unwrap();
    assert_eq!((r90.width(), r90.height()), (2, 3));
    assert_eq!(r90.pixel(1, 0), source.pixel(0, 0));
    assert_eq!(r90.pixel(0, 2), source.pixel(2, 1));

    let r270 = source.rotate(Rotation::Rotate270).unwrap();
    assert_eq!(r270.pixel(0, 2), source.pixel(0, 0));

    let r180 = source.rotate(Rotation::Rotate180).unwrap();
    assert_eq!(r180.pixel(0, 0), source.pixel(2, 1));

    let flipped = source.flip(Flip::Horizontal).unwrap();
    assert_eq!(flipped.pixel(0, 1), source.pixel(2, 1));
    let flipped = source.flip(Flip::Vertical).unwrap();
    assert_eq!(flipped.pixel(0, 0), source.pixel(0, 1));
}
