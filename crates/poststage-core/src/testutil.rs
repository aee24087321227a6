//! Synthetic image fixtures for unit tests.

use exif::Tag;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::Bytes;

use crate::attribution::{ascii_field, exif_tiff};

fn gradient() -> RgbImage {
    RgbImage::from_fn(16, 12, |x, y| Rgb([(x * 15) as u8, (y * 20) as u8, 128]))
}

/// A small JPEG with no metadata segments beyond JFIF.
pub fn plain_jpeg() -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&gradient())
        .unwrap();
    out
}

pub fn png_image() -> Vec<u8> {
    encoded_image(ImageFormat::Png)
}

pub fn encoded_image(format: ImageFormat) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    gradient().write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// A JPEG whose EXIF block holds the given ASCII fields.
pub fn jpeg_with_fields(fields: &[(Tag, &str)]) -> Vec<u8> {
    let fields: Vec<_> = fields.iter().map(|(tag, text)| ascii_field(*tag, text)).collect();
    let mut contents = b"Exif\0\0".to_vec();
    contents.extend_from_slice(&exif_tiff(&fields).unwrap());
    with_segment(plain_jpeg(), 0xE1, &contents)
}

/// Insert a raw segment right after SOI.
pub fn with_segment(bytes: Vec<u8>, marker: u8, contents: &[u8]) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes)).unwrap();
    jpeg.segments_mut().insert(
        0,
        JpegSegment::new_with_contents(marker, Bytes::copy_from_slice(contents)),
    );
    let mut out = Vec::new();
    jpeg.encoder().write_to(&mut out).unwrap();
    out
}
