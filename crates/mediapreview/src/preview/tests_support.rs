use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use ::image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};

use crate::cache::FileCache;
use crate::workspace::{FileDescriptor, Workspace};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([20u8, 120, 220]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Write a PNG into `dir` and describe it through a workspace rooted there.
pub async fn png_file(dir: &Path, name: &str, width: u32, height: u32) -> FileDescriptor {
    std::fs::write(dir.join(name), png_bytes(width, height)).unwrap();
    Workspace::new(dir).unwrap().describe(name).await.unwrap()
}

/// Poll until a background store lands, panicking after a couple of seconds.
pub async fn wait_for_entry(cache: &dyn FileCache, key: &str) -> Vec<u8> {
    for _ in 0..200 {
        if let Some(bytes) = cache.load(key).await.unwrap() {
            return bytes;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache entry {key} never appeared");
}
