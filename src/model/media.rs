//! Media types: image formats and resolved media references.

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// A media reference after resolution against the media directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaRef {
    /// Path as written in the document
    pub written: String,

    /// Location of the file on disk
    pub resolved: PathBuf,
}

impl MediaRef {
    /// Create a media reference.
    pub fn new(written: impl Into<String>, resolved: impl Into<PathBuf>) -> Self {
        Self {
            written: written.into(),
            resolved: resolved.into(),
        }
    }
}

/// Image types accepted in the media directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Portable Network Graphics
    Png,
    /// JPEG
    Jpeg,
    /// Graphics Interchange Format
    Gif,
    /// Windows bitmap
    Bmp,
    /// WebP
    Webp,
}

impl ImageFormat {
    /// Every accepted format.
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Webp,
    ];

    /// Look up a format by file extension (case-insensitive, without dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" | "jpe" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Look up a format by the extension of a path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Detect the format from magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
            image::ImageFormat::WebP => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    /// Pixel dimensions of encoded image data, read without decoding the
    /// pixels.
    pub fn dimensions(data: &[u8]) -> Option<(u32, u32)> {
        let (width, height) = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()?;
        (width > 0 && height > 0).then_some((width, height))
    }

    /// Preferred file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Webp => "webp",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
        let mut data = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut data), format)
            .unwrap();
        data
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(ImageFormat::from_extension("PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("svg"), None);
        assert_eq!(
            ImageFormat::from_path(Path::new("media/photo.webp")),
            Some(ImageFormat::Webp)
        );
    }

    #[test]
    fn test_detect() {
        assert_eq!(
            ImageFormat::detect(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::detect(b"GIF89a\x02\x00\x03\x00"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::detect(&[0, 0, 0, 0]), None);
        assert_eq!(ImageFormat::detect(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_png_dimensions() {
        let data = encoded(640, 480, image::ImageFormat::Png);
        assert_eq!(ImageFormat::detect(&data), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::dimensions(&data), Some((640, 480)));
    }

    #[test]
    fn test_jpeg_dimensions() {
        let data = encoded(300, 200, image::ImageFormat::Jpeg);
        assert_eq!(ImageFormat::detect(&data), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::dimensions(&data), Some((300, 200)));
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(ImageFormat::dimensions(&[0x89, 0x50]), None);
        assert_eq!(ImageFormat::dimensions(b"RIFF"), None);
        assert_eq!(ImageFormat::dimensions(b"plain text"), None);
    }
}
