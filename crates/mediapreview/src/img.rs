//! Image format lookup and resizing.
//!
//! [`ImgService`] is the seam the preview handlers talk to. [`ImageResizer`]
//! backs it with the `image` crate, running every decode/resize/encode on the
//! blocking pool behind a semaphore so a burst of thumbnail requests cannot
//! starve the runtime.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum ImgError {
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("resize task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ImgError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    Tiff,
    Bmp,
    WebP,
}

impl Format {
    fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Format::Jpeg),
            "png" => Some(Format::Png),
            "gif" => Some(Format::Gif),
            "tif" | "tiff" => Some(Format::Tiff),
            "bmp" => Some(Format::Bmp),
            "webp" => Some(Format::WebP),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Format::Jpeg => ImageFormat::Jpeg,
            Format::Png => ImageFormat::Png,
            Format::Gif => ImageFormat::Gif,
            Format::Tiff => ImageFormat::Tiff,
            Format::Bmp => ImageFormat::Bmp,
            Format::WebP => ImageFormat::WebP,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Format::Jpeg),
            ImageFormat::Png => Some(Format::Png),
            ImageFormat::Gif => Some(Format::Gif),
            ImageFormat::Tiff => Some(Format::Tiff),
            ImageFormat::Bmp => Some(Format::Bmp),
            ImageFormat::WebP => Some(Format::WebP),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Scale down to fit inside the box, keeping the aspect ratio.
    Fit,
    /// Scale and centre-crop so the output covers the box exactly.
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    fn filter(self) -> FilterType {
        match self {
            Quality::Low => FilterType::Triangle,
            Quality::Medium => FilterType::CatmullRom,
            Quality::High => FilterType::Lanczos3,
        }
    }

    fn jpeg_quality(self) -> u8 {
        match self {
            Quality::Low => 60,
            Quality::Medium => 75,
            Quality::High => 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    pub mode: ResizeMode,
    pub quality: Quality,
    /// Output format; `None` keeps the source format.
    pub format: Option<Format>,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            mode: ResizeMode::Fit,
            quality: Quality::Medium,
            format: None,
        }
    }
}

#[async_trait]
pub trait ImgService: Send + Sync {
    fn format_from_extension(&self, ext: &str) -> Result<Format>;

    async fn resize(
        &self,
        input: &mut (dyn AsyncRead + Unpin + Send),
        width: u32,
        height: u32,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        options: ResizeOptions,
    ) -> Result<()>;
}

pub struct ImageResizer {
    permits: Arc<Semaphore>,
}

impl ImageResizer {
    /// `processors` bounds how many images are decoded and resized at once.
    pub fn new(processors: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(processors.max(1))),
        }
    }
}

#[async_trait]
impl ImgService for ImageResizer {
    fn format_from_extension(&self, ext: &str) -> Result<Format> {
        Format::from_extension(ext).ok_or(ImgError::UnsupportedFormat)
    }

    async fn resize(
        &self,
        input: &mut (dyn AsyncRead + Unpin + Send),
        width: u32,
        height: u32,
        output: &mut (dyn AsyncWrite + Unpin + Send),
        options: ResizeOptions,
    ) -> Result<()> {
        let mut source = Vec::new();
        input.read_to_end(&mut source).await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ImgError::Task(e.to_string()))?;
        let encoded =
            tokio::task::spawn_blocking(move || resize_blocking(source, width, height, options))
                .await
                .map_err(|e| ImgError::Task(e.to_string()))??;

        output.write_all(&encoded).await?;
        output.flush().await?;
        Ok(())
    }
}

fn resize_blocking(
    source: Vec<u8>,
    width: u32,
    height: u32,
    options: ResizeOptions,
) -> Result<Vec<u8>> {
    let source_format = image::guess_format(&source)?;
    let source_format =
        Format::from_image_format(source_format).ok_or(ImgError::UnsupportedFormat)?;
    let target = options.format.unwrap_or(source_format);

    let img = image::load_from_memory_with_format(&source, source_format.image_format())?;
    let (w, h) = img.dimensions();

    if options.mode == ResizeMode::Fit && w <= width && h <= height && target == source_format {
        return Ok(source);
    }

    let resized = match options.mode {
        ResizeMode::Fit => img.resize(width, height, options.quality.filter()),
        ResizeMode::Fill => img.resize_to_fill(width, height, options.quality.filter()),
    };

    encode(&resized, target, options.quality)
}

fn encode(img: &DynamicImage, format: Format, quality: Quality) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        Format::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.jpeg_quality());
            rgb.write_with_encoder(encoder)?;
        }
        Format::WebP => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut buf, ImageFormat::WebP)?;
        }
        other => img.write_to(&mut buf, other.image_format())?,
    }
    Ok(buf.into_inner())
}
