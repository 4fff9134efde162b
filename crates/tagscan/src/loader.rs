//! Image files: extension classification and decoding into luma images.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use tagscan_core::{convert_to_luma, ConvertError, LumaImage};

/// Loader family a file is dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormatKind {
    /// `.pgm`, `.pnm` and `.png`; decoded by content, not by extension.
    Pnm,
    Jpeg,
}

/// How a file name is matched against the processable extensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionMatch {
    /// The name ends with the extension, ignoring ASCII case.
    #[default]
    Suffix,
    /// The extension occurs anywhere in the name, case-sensitive.
    Contains,
}

const PNM_EXTENSIONS: [&str; 3] = [".pgm", ".pnm", ".png"];
const JPEG_EXTENSIONS: [&str; 1] = [".jpg"];

fn matches_any(name: &str, exts: &[&str], mode: ExtensionMatch) -> bool {
    exts.iter().any(|ext| match mode {
        ExtensionMatch::Contains => name.contains(ext),
        ExtensionMatch::Suffix => {
            name.len() >= ext.len()
                && name.is_char_boundary(name.len() - ext.len())
                && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
        }
    })
}

/// Pick the loader for `file_name`, or `None` when it is not processable.
///
/// PNM-family extensions take precedence when several match.
pub fn classify(file_name: &str, mode: ExtensionMatch) -> Option<ImageFormatKind> {
    if matches_any(file_name, &PNM_EXTENSIONS, mode) {
        Some(ImageFormatKind::Pnm)
    } else if matches_any(file_name, &JPEG_EXTENSIONS, mode) {
        Some(ImageFormatKind::Jpeg)
    } else {
        None
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Source of canonical luma images.
pub trait ImageLoader {
    fn load(&self, path: &Path, format: ImageFormatKind) -> Result<LumaImage, LoadError>;
}

/// Decodes files from disk with the `image` crate.
///
/// Grayscale files (any depth, alpha dropped) are reduced to 8 bits and copied
/// as one channel; everything else is expanded to RGB and reduced with the
/// same luma weights used for raw frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileImageLoader;

impl FileImageLoader {
    fn decode(&self, path: &Path, format: ImageFormatKind) -> Result<DynamicImage, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ImageReader::open(path).map_err(io_err)?;
        match format {
            ImageFormatKind::Pnm => {
                reader = reader.with_guessed_format().map_err(io_err)?;
            }
            ImageFormatKind::Jpeg => reader.set_format(ImageFormat::Jpeg),
        }
        reader.decode().map_err(|source| LoadError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ImageLoader for FileImageLoader {
    fn load(&self, path: &Path, format: ImageFormatKind) -> Result<LumaImage, LoadError> {
        let decoded = self.decode(path, format)?;
        let (width, height) = (decoded.width() as usize, decoded.height() as usize);
        let image = match decoded {
            DynamicImage::ImageLuma8(gray) => convert_to_luma(gray.as_raw(), width, height, 1)?,
            gray @ (DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_)) => {
                convert_to_luma(gray.to_luma8().as_raw(), width, height, 1)?
            }
            other => convert_to_luma(other.to_rgb8().as_raw(), width, height, 3)?,
        };
        log::debug!("loaded {} ({width}x{height})", path.display());
        Ok(image)
    }
}
