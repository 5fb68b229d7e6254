//! Watermark-background removal for scanned question images.
//!
//! Four fixed passes, in order:
//!
//! 1. **Colour key** — pixels whose every channel lies within `tolerance` of
//!    the target colour become solid white.
//! 2. **Contrast** — `v' = clamp(round(alpha · v), 0, 255)` per channel.
//! 3. **Grayscale** — ITU-R BT.601 luma in 14-bit fixed point.
//! 4. **Gamma darkening** — a 256-entry LUT `255 · (v/255)^(1/gamma)`. With
//!    the default `gamma = 0.2` the exponent is 5, which pushes faint greys to
//!    near-black while leaving white paper white.
//!
//! Everything here is pure and CPU-bound; the pipeline calls it through
//! `spawn_blocking`.

use crate::config::TransformParams;
use crate::error::ImageError;
use image::{GrayImage, Luma, RgbImage};

/// Decode `bytes` and run all four passes.
///
/// Returns [`ImageError::Unreadable`] when the bytes are not a decodable image.
pub fn transform_image(bytes: &[u8], params: &TransformParams) -> Result<GrayImage, ImageError> {
    let mut rgb = image::load_from_memory(bytes)
        .map_err(|e| ImageError::Unreadable {
            detail: e.to_string(),
        })?
        .to_rgb8();

    remove_color(&mut rgb, params);
    scale_contrast(&mut rgb, params.contrast_alpha);
    let mut gray = to_grayscale(&rgb);
    apply_lut(&mut gray, &gamma_lut(params.gamma));
    Ok(gray)
}

/// Pass 1: force every pixel inside the target window to white.
pub fn remove_color(img: &mut RgbImage, params: &TransformParams) {
    let (lo, hi) = params.target.window(params.tolerance);
    for px in img.pixels_mut() {
        let inside = (0..3).all(|c| px[c] >= lo[c] && px[c] <= hi[c]);
        if inside {
            px.0 = [255, 255, 255];
        }
    }
}

/// Pass 2: linear contrast gain with saturation. Halves round to even.
pub fn scale_contrast(img: &mut RgbImage, alpha: f32) {
    let lut: [u8; 256] = std::array::from_fn(|v| {
        (v as f64 * f64::from(alpha))
            .round_ties_even()
            .clamp(0.0, 255.0) as u8
    });
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = lut[usize::from(*c)];
        }
    }
}

/// Pass 3: `Y = 0.299 R + 0.587 G + 0.114 B`, rounded.
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    const SHIFT: u32 = 14;
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let luma = (u32::from(r) * R + u32::from(g) * G + u32::from(b) * B + (1 << (SHIFT - 1)))
            >> SHIFT;
        Luma([luma.min(255) as u8])
    })
}

/// Pass 4 lookup table: `trunc(255 · (i/255)^(1/gamma))`.
///
/// Monotone non-decreasing with `lut[0] = 0` and `lut[255] = 255`.
pub fn gamma_lut(gamma: f32) -> [u8; 256] {
    let inv = 1.0 / f64::from(gamma);
    std::array::from_fn(|i| ((i as f64 / 255.0).powf(inv) * 255.0).clamp(0.0, 255.0) as u8)
}

pub fn apply_lut(img: &mut GrayImage, lut: &[u8; 256]) {
    for px in img.pixels_mut() {
        px.0[0] = lut[usize::from(px.0[0])];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TargetColor, DEFAULT_TARGET_COLOR};
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode should succeed");
        buf
    }

    #[test]
    fn watermark_colour_becomes_white() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([0xEB, 0xF3, 0xF3]));
        img.put_pixel(0, 0, Rgb([210, 220, 250]));
        img.put_pixel(1, 0, Rgb([204, 243, 243]));
        remove_color(&mut img, &TransformParams::default());

        assert_eq!(img.get_pixel(2, 2).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255], "inside the window");
        assert_eq!(img.get_pixel(1, 0).0, [204, 243, 243], "red just below the window");
    }

    #[test]
    fn contrast_saturates_and_rounds_half_to_even() {
        let mut img = RgbImage::from_pixel(1, 1, Rgb([1, 3, 200]));
        scale_contrast(&mut img, 1.5);
        // 1.5 → 2, 4.5 → 4, 300 → 255
        assert_eq!(img.get_pixel(0, 0).0, [2, 4, 255]);
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([150, 150, 150]));
        let g = to_grayscale(&img);
        assert_eq!(g.get_pixel(0, 0).0[0], 76);
        assert_eq!(g.get_pixel(1, 0).0[0], 150);
        assert_eq!(g.get_pixel(2, 0).0[0], 150);
    }

    #[test]
    fn gamma_curve_is_monotone_with_fixed_endpoints() {
        let lut = gamma_lut(0.2);
        assert_eq!(lut[0], 0);
        assert_eq!(lut[255], 255);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        // mid-grey is pushed hard towards black
        assert_eq!(lut[150], 17);
        assert!(lut[128] < 10);
    }

    #[test]
    fn full_transform_on_synthetic_scan() {
        let mut img = RgbImage::from_pixel(3, 1, Rgb([0xEB, 0xF3, 0xF3]));
        img.put_pixel(1, 0, Rgb([100, 100, 100]));
        img.put_pixel(2, 0, Rgb([0, 0, 0]));

        let out = transform_image(&png_bytes(&img), &TransformParams::default()).unwrap();
        assert_eq!(out.dimensions(), (3, 1));
        assert_eq!(out.get_pixel(0, 0).0[0], 255, "background erased");
        assert_eq!(out.get_pixel(1, 0).0[0], 17, "100 → 150 → 150 → 17");
        assert_eq!(out.get_pixel(2, 0).0[0], 0);
    }

    #[test]
    fn custom_target_colour_is_honoured() {
        let params = TransformParams {
            target: TargetColor::new(200, 0, 0),
            tolerance: 5,
            ..TransformParams::default()
        };
        let img = RgbImage::from_pixel(1, 1, Rgb([203, 2, 0]));
        let out = transform_image(&png_bytes(&img), &params).unwrap();
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
        assert_ne!(params.target, DEFAULT_TARGET_COLOR);
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let err = transform_image(b"definitely not an image", &TransformParams::default())
            .unwrap_err();
        assert!(matches!(err, ImageError::Unreadable { .. }));
    }
}
