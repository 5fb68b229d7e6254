//! Output encoding for transformed images.
//!
//! The transformed image is written next to the staged download under the
//! requested name. Only PNG and JPEG are written; any other requested
//! extension (`.gif`, `.webp`, none at all) is silently replaced by `.png`,
//! and the concrete path is returned so the caller uploads the right file
//! under the right name.

use crate::config::TransformParams;
use crate::error::ImageError;
use crate::pipeline::transform::transform_image;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

const JPEG_QUALITY: u8 = 95;

/// Transform the image at `input` and write it to (roughly) `requested`.
///
/// Returns the path actually written.
///
/// # Errors
/// * [`ImageError::Unreadable`] — `input` is missing or not an image
/// * [`ImageError::EncodeFailed`] — the result could not be encoded or written
pub fn process_image(
    input: &Path,
    requested: &Path,
    params: &TransformParams,
) -> Result<PathBuf, ImageError> {
    let bytes = std::fs::read(input).map_err(|e| ImageError::Unreadable {
        detail: format!("{}: {e}", input.display()),
    })?;
    let gray = transform_image(&bytes, params)?;

    let output = output_path_for(requested);
    save_gray(&gray, &output)?;
    debug!(
        "Transformed {} → {} ({}x{} px)",
        input.display(),
        output.display(),
        gray.width(),
        gray.height()
    );
    Ok(output)
}

/// `requested` if it ends in `.png`/`.jpg`/`.jpeg` (any case), else the same
/// path with a `.png` extension.
pub fn output_path_for(requested: &Path) -> PathBuf {
    match output_format(requested) {
        Some(_) => requested.to_path_buf(),
        None => requested.with_extension("png"),
    }
}

fn output_format(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some(ImageFormat::Png),
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        _ => None,
    }
}

/// Encode a grayscale image as PNG or JPEG according to the path's extension.
pub fn save_gray(img: &GrayImage, path: &Path) -> Result<(), ImageError> {
    let encode_err = |detail: String| ImageError::EncodeFailed {
        path: path.to_path_buf(),
        detail,
    };

    let format = output_format(path)
        .ok_or_else(|| encode_err("unsupported output extension".to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = File::create(path).map_err(|e| encode_err(e.to_string()))?;
            let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
            encoder
                .encode_image(img)
                .map_err(|e| encode_err(e.to_string()))
        }
        _ => img
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| encode_err(e.to_string())),
    }
}

/// MIME type for an upload, from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn supported_extensions_are_kept() {
        assert_eq!(output_path_for(Path::new("/t/p_a.png")), PathBuf::from("/t/p_a.png"));
        assert_eq!(output_path_for(Path::new("/t/p_a.JPG")), PathBuf::from("/t/p_a.JPG"));
        assert_eq!(output_path_for(Path::new("/t/p_a.jpeg")), PathBuf::from("/t/p_a.jpeg"));
    }

    #[test]
    fn unsupported_extensions_become_png() {
        assert_eq!(output_path_for(Path::new("/t/p_a.gif")), PathBuf::from("/t/p_a.png"));
        assert_eq!(output_path_for(Path::new("/t/p_a.webp")), PathBuf::from("/t/p_a.png"));
        assert_eq!(output_path_for(Path::new("/t/p_image")), PathBuf::from("/t/p_image.png"));
    }

    #[test]
    fn process_image_writes_png_for_gif_request() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.png");
        RgbImage::from_pixel(8, 8, Rgb([0xEB, 0xF3, 0xF3]))
            .save(&input)
            .unwrap();

        let written = process_image(&input, &dir.path().join("p_a.gif"), &TransformParams::default())
            .unwrap();
        assert_eq!(written, dir.path().join("p_a.png"));

        let reread = image::open(&written).unwrap().to_luma8();
        assert!(reread.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn process_image_writes_jpeg_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.png");
        RgbImage::from_pixel(16, 16, Rgb([40, 40, 40])).save(&input).unwrap();

        let written =
            process_image(&input, &dir.path().join("p_scan.jpg"), &TransformParams::default())
                .unwrap();
        let bytes = std::fs::read(&written).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
    }

    #[test]
    fn unwritable_destination_is_encode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.png");
        RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])).save(&input).unwrap();

        let missing_dir = dir.path().join("no/such/dir/p_a.png");
        let err = process_image(&input, &missing_dir, &TransformParams::default()).unwrap_err();
        assert!(matches!(err, ImageError::EncodeFailed { .. }), "got: {err:?}");
    }

    #[test]
    fn non_image_input_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<html>404</html>").unwrap();
        let err = process_image(&input, &dir.path().join("p_page.png"), &TransformParams::default())
            .unwrap_err();
        assert!(matches!(err, ImageError::Unreadable { .. }));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}
