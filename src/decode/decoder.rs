//! Frame image decoding.
//! Frames are decoded to RGBA8; the rest of the player never looks at the
//! on-disk image format.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Error type for decoding operations
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Undecodable image {path:?}: {message}")]
    Undecodable { path: PathBuf, message: String },
    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DecodeError {
    /// Whether the failure only affects the one frame.
    ///
    /// Missing and corrupt frames are replaced by a blank frame; anything
    /// else means the storage itself is failing.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, DecodeError::FileNotFound(_) | DecodeError::Undecodable { .. })
    }
}

/// Decoded pixels (RGBA8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub data: Vec<u8>, // Raw pixel data (RGBA8)
    pub width: u32,
    pub height: u32,
}

/// One frame of a sequence. A blank frame has no image but keeps its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub identifier: i32,
    pub image: Option<Arc<FrameImage>>,
}

impl VideoFrame {
    pub fn new(identifier: i32, image: FrameImage) -> Self {
        Self {
            identifier,
            image: Some(Arc::new(image)),
        }
    }

    /// A placeholder for a frame that could not be decoded
    pub fn blank(identifier: i32) -> Self {
        Self {
            identifier,
            image: None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.image.is_none()
    }
}

/// Opaque "decode one frame" operation
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<FrameImage, DecodeError>;
}

/// Decoder for common still-image formats, backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFrameDecoder;

impl FrameDecoder for ImageFrameDecoder {
    fn decode(&self, path: &Path) -> Result<FrameImage, DecodeError> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(source) if source.kind() == io::ErrorKind::NotFound => {
                DecodeError::FileNotFound(path.to_path_buf())
            }
            image::ImageError::IoError(source) => DecodeError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => DecodeError::Undecodable {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;
        let rgba = img.to_rgba8();

        Ok(FrameImage {
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let frame = ImageFrameDecoder.decode(&path).unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.data.len(), 3 * 2 * 4);
        assert_eq!(&frame.data[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_and_corrupt_are_frame_local() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ImageFrameDecoder.decode(&dir.path().join("9.png")).unwrap_err();
        assert!(matches!(missing, DecodeError::FileNotFound(_)));
        assert!(missing.is_frame_local());

        let corrupt_path = dir.path().join("2.png");
        std::fs::write(&corrupt_path, b"not an image, only text padding the file past any png signature").unwrap();
        let corrupt = ImageFrameDecoder.decode(&corrupt_path).unwrap_err();
        assert!(corrupt.is_frame_local());
    }

    #[test]
    fn test_blank_frame() {
        let frame = VideoFrame::blank(12);
        assert!(frame.is_blank());
        assert_eq!(frame.identifier, 12);
    }
}
