pub mod image;
pub mod video;

use std::fmt::{self, Write};
use std::str::FromStr;

use crate::error::PreviewError;
use crate::img::{Format, Quality, ResizeMode, ResizeOptions};
use crate::workspace::FileDescriptor;

/// Output tier requested in the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewSize {
    Thumb = 0,
    Big = 1,
}

impl PreviewSize {
    pub fn as_str(self) -> &'static str {
        match self {
            PreviewSize::Thumb => "thumb",
            PreviewSize::Big => "big",
        }
    }
}

impl FromStr for PreviewSize {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thumb" => Ok(PreviewSize::Thumb),
            "big" => Ok(PreviewSize::Big),
            other => Err(PreviewError::InvalidSize(other.to_string())),
        }
    }
}

impl fmt::Display for PreviewSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key for a preview: hex of the real path, then the modification time
/// in seconds, then the size ordinal.
///
/// Touching the file changes the key, so stale entries are simply never read again.
pub fn cache_key(file: &FileDescriptor, size: PreviewSize) -> String {
    let path = file.real_path.as_os_str().as_encoded_bytes();
    let mut key = String::with_capacity(path.len() * 2 + 18);
    for b in path {
        let _ = write!(key, "{b:02x}");
    }
    let secs = file.mod_time_unix();
    if secs < 0 {
        let _ = write!(key, "-{:x}", secs.unsigned_abs());
    } else {
        let _ = write!(key, "{secs:x}");
    }
    let _ = write!(key, "{:x}", size as u8);
    key
}

/// Resize parameters for one preview tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub width: u32,
    pub height: u32,
    pub resize: ResizeOptions,
}

impl TransformOptions {
    pub fn for_image(size: PreviewSize) -> Self {
        match size {
            PreviewSize::Big => Self {
                width: 1080,
                height: 1080,
                resize: ResizeOptions {
                    mode: ResizeMode::Fit,
                    quality: Quality::Medium,
                    format: None,
                },
            },
            // Thumbnails are always JPEG so cached entries stay small whatever the source.
            PreviewSize::Thumb => Self {
                width: 256,
                height: 256,
                resize: ResizeOptions {
                    mode: ResizeMode::Fill,
                    quality: Quality::Low,
                    format: Some(Format::Jpeg),
                },
            },
        }
    }
}


#[cfg(test)]
pub(crate) mod tests_support;
