//! Media discovery and loading: find images under the media directory and
//! scale them to the wall canvas.

use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Information about a single image file.
#[derive(Serialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct MediaEntry {
    /// Filename (e.g., "sunset.png")
    pub name: String,
    /// Relative path from media dir (e.g., "images/sunset.png")
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|e| matches!(e.as_str(), "png" | "jpg" | "jpeg"))
}

/// Scan `<media_dir>/images` for PNG and JPEG files, sorted by name.
pub fn list_images(media_dir: &Path) -> Vec<MediaEntry> {
    let images_dir = media_dir.join("images");
    let mut entries = Vec::new();

    let read_dir = match fs::read_dir(&images_dir) {
        Ok(rd) => rd,
        Err(_) => return entries,
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() || !is_supported_image(&path) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let rel_path = format!("images/{name}");

        entries.push(MediaEntry {
            name,
            path: rel_path,
            size,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

/// Load an image and resize it to exactly `width` x `height`.
pub fn load_canvas_image(path: &Path, width: u32, height: u32) -> Result<RgbImage, image::ImageError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    if img.width() == width && img.height() == height {
        return Ok(img.to_rgb8());
    }
    Ok(img
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"fake").unwrap();
    }

    #[test]
    fn list_images_finds_supported_formats() {
        let tmp = TempDir::new().unwrap();
        let images_dir = tmp.path().join("images");
        std::fs::create_dir(&images_dir).unwrap();

        create_file(&images_dir, "photo.png");
        create_file(&images_dir, "pic.jpg");
        create_file(&images_dir, "shot.JPEG");
        create_file(&images_dir, "anim.gif"); // no decoder built in
        create_file(&images_dir, "readme.txt");

        let entries = list_images(tmp.path());
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["photo.png", "pic.jpg", "shot.JPEG"]);
        assert_eq!(entries[0].path, "images/photo.png");
        assert_eq!(entries[0].size, 4);
    }

    #[test]
    fn list_images_returns_empty_when_no_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(list_images(tmp.path()).is_empty());
    }

    #[test]
    fn image_is_scaled_to_canvas() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("red.png");
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])).save(&path).unwrap();

        let img = load_canvas_image(&path, 8, 2).unwrap();
        assert_eq!(img.dimensions(), (8, 2));
        let Rgb([r, g, b]) = *img.get_pixel(3, 1);
        assert!(r >= 250 && g <= 5 && b <= 5, "got {r},{g},{b}");
    }

    #[test]
    fn matching_size_is_not_resampled() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dot.png");
        let mut src = RgbImage::new(3, 2);
        src.put_pixel(1, 1, Rgb([10, 20, 30]));
        src.save(&path).unwrap();

        let img = load_canvas_image(&path, 3, 2).unwrap();
        assert_eq!(img, src);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        create_file(tmp.path(), "bad.png");
        assert!(load_canvas_image(&tmp.path().join("bad.png"), 2, 2).is_err());
    }
}
