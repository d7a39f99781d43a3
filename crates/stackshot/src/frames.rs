use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{GenericImageView, RgbaImage};

/// One decoded source image in the renderer's BGRA layout.
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub bgra: Vec<u8>,
}

/// Reads the dimensions of `path` without keeping the pixels.
pub fn probe_size(path: &Path) -> Result<(u32, u32)> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image at {}", path.display()))?;
    Ok(image.dimensions())
}

/// Decodes `path`, resizing it to `size` when its dimensions differ.
pub fn load_frame(path: &Path, size: (u32, u32)) -> Result<DecodedFrame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image at {}", path.display()))?;
    let (width, height) = size;
    let rgba = if image.dimensions() == size {
        image.to_rgba8()
    } else {
        tracing::debug!(
            path = %path.display(),
            from = ?image.dimensions(),
            to = ?size,
            "resizing source image"
        );
        image.resize_exact(width, height, FilterType::Triangle).to_rgba8()
    };
    Ok(DecodedFrame {
        width,
        height,
        bgra: swap_red_blue(rgba.into_raw()),
    })
}

/// Writes tightly packed BGRA pixels as a PNG.
pub fn save_bgra_png(path: &Path, width: u32, height: u32, bgra: Vec<u8>) -> Result<()> {
    let image = RgbaImage::from_raw(width, height, swap_red_blue(bgra))
        .ok_or_else(|| anyhow!("pixel data does not cover {width}x{height}"))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write image to {}", path.display()))
}

/// Path of the running-average snapshot taken after `frame_count` frames.
pub fn snapshot_path(output: &Path, frame_count: u64) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stackshot".to_string());
    output.with_file_name(format!("{stem}-{frame_count:04}.png"))
}

/// Converts between RGBA and BGRA in place; the swap is its own inverse.
fn swap_red_blue(mut pixels: Vec<u8>) -> Vec<u8> {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn swaps_red_and_blue_only() {
        let swapped = swap_red_blue(vec![1, 2, 3, 4, 10, 20, 30, 40]);
        assert_eq!(swapped, vec![3, 2, 1, 4, 30, 20, 10, 40]);
    }

    #[test]
    fn snapshot_names_follow_output_stem() {
        let path = snapshot_path(Path::new("/tmp/out/night.png"), 12);
        assert_eq!(path, PathBuf::from("/tmp/out/night-0012.png"));
    }

    #[test]
    fn load_frame_resizes_and_converts_to_bgra() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        assert_eq!(probe_size(&path).unwrap(), (4, 4));
        let frame = load_frame(&path, (2, 2)).unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.bgra.len(), 2 * 2 * 4);
        assert_eq!(&frame.bgra[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn save_round_trips_bgra_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.png");
        save_bgra_png(&path, 1, 1, vec![10, 20, 30, 255]).unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0), &Rgba([30, 20, 10, 255]));
    }

    #[test]
    fn save_rejects_short_buffers() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_bgra_png(&dir.path().join("x.png"), 2, 2, vec![0; 4]).is_err());
    }
}
