use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RewriteError;
use crate::lifecycle;
use crate::record::SourceImage;

const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP13: u8 = 0xED;
const MARKER_APP14: u8 = 0xEE;
const MARKER_COM: u8 = 0xFE;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const PHOTOSHOP_PREFIX: &[u8] = b"Photoshop 3.0\0";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Fixed attribution written into every staged copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub creator: String,
    pub copyright: String,
}

impl Default for Attribution {
    fn default() -> Self {
        Self {
            creator: "Philip Massie IG:@philmassie".to_string(),
            copyright: "All rights reserved".to_string(),
        }
    }
}

/// Write an attribution-only copy of `image` into `to_upload`, then move the source into
/// `originals` under its base filename. Returns the path of the staged copy.
///
/// The staged copy is on disk before the source moves. Bytes go to a temp file in
/// `to_upload` first; an unpersisted temp file is removed on drop whatever the outcome.
pub fn rewrite(
    image: &SourceImage,
    attribution: &Attribution,
    originals: &Path,
    to_upload: &Path,
) -> Result<PathBuf, RewriteError> {
    let file_name = image
        .file_name()
        .ok_or_else(|| RewriteError::NoFileName(image.path.clone()))?
        .to_string();

    let jpeg = if image.is_jpeg() {
        image.bytes.clone()
    } else {
        reencode_as_jpeg(&image.bytes)?
    };
    let tagged = attribute_jpeg(jpeg, attribution)?;

    let staged = write_staged(&tagged, to_upload)?;
    lifecycle::move_file(&image.path, &originals.join(file_name))?;
    Ok(staged)
}

fn write_staged(bytes: &[u8], to_upload: &Path) -> Result<PathBuf, RewriteError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".poststage-")
        .suffix(".tmp")
        .tempfile_in(to_upload)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    let now = chrono::Local::now().naive_local();
    let mut attempt = 0;
    loop {
        let dest = to_upload.join(lifecycle::staged_file_name(now, attempt));
        match tmp.persist_noclobber(&dest) {
            Ok(_) => return Ok(dest),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                attempt += 1;
            }
            Err(e) => return Err(e.error.into()),
        }
    }
}

/// Drop every metadata segment (APP1..APP15, COM; an Adobe APP14 stays, it describes the
/// colour transform) and insert the attribution EXIF and IPTC
/// blocks. Entropy-coded image data passes through untouched.
pub fn attribute_jpeg(bytes: Vec<u8>, attribution: &Attribution) -> Result<Vec<u8>, RewriteError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))?;
    jpeg.segments_mut().retain(|s| !is_metadata_segment(s));

    let insert_at = jpeg
        .segments()
        .iter()
        .position(|s| s.marker() == MARKER_APP0)
        .map_or(0, |i| i + 1);

    let mut exif = EXIF_PREFIX.to_vec();
    exif.extend_from_slice(&attribution_exif(attribution)?);
    let iptc = photoshop_iptc_block(attribution);

    let segments = jpeg.segments_mut();
    segments.insert(insert_at, JpegSegment::new_with_contents(MARKER_APP1, Bytes::from(exif)));
    segments.insert(insert_at + 1, JpegSegment::new_with_contents(MARKER_APP13, Bytes::from(iptc)));

    let mut out = Vec::new();
    jpeg.encoder().write_to(&mut out)?;
    Ok(out)
}

fn is_metadata_segment(segment: &JpegSegment) -> bool {
    match segment.marker() {
        MARKER_APP14 => !segment.contents().starts_with(b"Adobe"),
        marker => (MARKER_APP1..=0xEF).contains(&marker) || marker == MARKER_COM,
    }
}

fn reencode_as_jpeg(bytes: &[u8]) -> Result<Vec<u8>, RewriteError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 100).encode_image(&decoded.to_rgb8())?;
    Ok(out)
}

/// TIFF-structured EXIF holding only Artist and Copyright in IFD0.
pub fn attribution_exif(attribution: &Attribution) -> Result<Vec<u8>, exif::Error> {
    let fields = [
        ascii_field(Tag::Artist, &attribution.creator),
        ascii_field(Tag::Copyright, &attribution.copyright),
    ];
    exif_tiff(&fields)
}

pub(crate) fn ascii_field(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

pub(crate) fn exif_tiff(fields: &[Field]) -> Result<Vec<u8>, exif::Error> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

/// APP13 payload: a Photoshop image resource block wrapping an IPTC-IIM record with
/// By-line (2:80) and Copyright Notice (2:116).
fn photoshop_iptc_block(attribution: &Attribution) -> Vec<u8> {
    let mut iptc = Vec::new();
    // 1:90 coded character set = UTF-8
    push_dataset(&mut iptc, 1, 90, b"\x1b%G");
    push_dataset(&mut iptc, 2, 0, &[0x00, 0x04]);
    push_dataset(&mut iptc, 2, 80, attribution.creator.as_bytes());
    push_dataset(&mut iptc, 2, 116, attribution.copyright.as_bytes());

    let mut block = PHOTOSHOP_PREFIX.to_vec();
    block.extend_from_slice(b"8BIM");
    block.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
    // Empty Pascal name, padded to even length
    block.extend_from_slice(&[0, 0]);
    block.extend_from_slice(&(iptc.len() as u32).to_be_bytes());
    block.extend_from_slice(&iptc);
    if iptc.len() % 2 == 1 {
        block.push(0);
    }
    block
}

fn push_dataset(out: &mut Vec<u8>, record: u8, dataset: u8, data: &[u8]) {
    let data = &data[..data.len().min(0x7FFF)];
    out.extend_from_slice(&[0x1C, record, dataset]);
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::read_metadata;
    use crate::testutil::{jpeg_with_fields, plain_jpeg, png_image, with_segment};
    use std::fs;
    use tempfile::tempdir;

    fn stage(dir: &Path, name: &str, bytes: &[u8]) -> (SourceImage, PathBuf, PathBuf) {
        let src = dir.join(name);
        fs::write(&src, bytes).unwrap();
        let orig = lifecycle::ensure_dir(dir, "orig").unwrap();
        let up = lifecycle::ensure_dir(dir, "to_upload").unwrap();
        (SourceImage::open(&src).unwrap(), orig, up)
    }

    fn segment_markers(bytes: &[u8]) -> Vec<u8> {
        Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
            .unwrap()
            .segments()
            .iter()
            .map(|s| s.marker())
            .collect()
    }

    #[test]
    fn test_metadata_replaced_not_merged() {
        let dir = tempdir().unwrap();
        let src = jpeg_with_fields(&[
            (Tag::ImageDescription, "caption text"),
            (Tag::Make, "Canon"),
            (Tag::Artist, "Someone Else"),
        ]);
        let (img, orig, up) = stage(dir.path(), "IMG_1.jpg", &src);

        let staged = rewrite(&img, &Attribution::default(), &orig, &up).unwrap();
        let exif = read_metadata(&fs::read(&staged).unwrap()).unwrap();

        let tags: Vec<Tag> = exif.fields().map(|f| f.tag).collect();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&Tag::Artist) && tags.contains(&Tag::Copyright));
        let artist = exif.get_field(Tag::Artist, In::PRIMARY).unwrap();
        match &artist.value {
            Value::Ascii(parts) => assert_eq!(parts, &vec![b"Philip Massie IG:@philmassie".to_vec()]),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_pixels_unchanged() {
        let dir = tempdir().unwrap();
        let src = jpeg_with_fields(&[(Tag::ImageDescription, "c")]);
        let (img, orig, up) = stage(dir.path(), "a.jpg", &src);

        let staged = rewrite(&img, &Attribution::default(), &orig, &up).unwrap();
        let before = image::load_from_memory(&src).unwrap().to_rgb8();
        let after = image::load_from_memory(&fs::read(staged).unwrap()).unwrap().to_rgb8();
        assert_eq!(before, after);
    }

    #[test]
    fn test_strips_comments_xmp_and_iptc() {
        let src = jpeg_with_fields(&[(Tag::ImageDescription, "c")]);
        let src = with_segment(src, MARKER_COM, b"shot by someone");
        let src = with_segment(src, MARKER_APP1, b"http://ns.adobe.com/xap/1.0/\0<x:xmpmeta/>");
        let src = with_segment(src, MARKER_APP13, b"Photoshop 3.0\0legacy-iptc-payload");

        let out = attribute_jpeg(src, &Attribution::default()).unwrap();
        let markers = segment_markers(&out);
        assert!(!markers.contains(&MARKER_COM));
        assert_eq!(markers.iter().filter(|&&m| m == MARKER_APP1).count(), 1);
        assert_eq!(markers.iter().filter(|&&m| m == MARKER_APP13).count(), 1);
        let legacy = b"legacy-iptc-payload";
        assert!(!out.windows(legacy.len()).any(|w| w == legacy));
    }

    #[test]
    fn test_adobe_colour_segment_kept() {
        let adobe = b"Adobe\x00\x64\x00\x00\x00\x00\x01";
        let src = with_segment(jpeg_with_fields(&[(Tag::ImageDescription, "c")]), MARKER_APP14, b"vendor-private-note");
        let src = with_segment(src, MARKER_APP14, adobe);

        let out = attribute_jpeg(src, &Attribution::default()).unwrap();
        let jpeg = Jpeg::from_bytes(Bytes::from(out)).unwrap();
        let app14: Vec<_> = jpeg
            .segments()
            .iter()
            .filter(|s| s.marker() == MARKER_APP14)
            .map(|s| s.contents().to_vec())
            .collect();
        assert_eq!(app14, vec![adobe.to_vec()]);
    }

    #[test]
    fn test_iptc_block_written() {
        let attribution = Attribution {
            creator: "Jane Doe".to_string(),
            copyright: "CC BY-NC".to_string(),
        };
        let out = attribute_jpeg(plain_jpeg(), &attribution).unwrap();
        let jpeg = Jpeg::from_bytes(Bytes::from(out)).unwrap();
        let app13 = jpeg
            .segments()
            .iter()
            .find(|s| s.marker() == MARKER_APP13)
            .unwrap();
        let contents = app13.contents();
        assert!(contents.starts_with(PHOTOSHOP_PREFIX));
        let by_line = [&[0x1C, 2, 80, 0, 8][..], b"Jane Doe"].concat();
        assert!(contents.windows(by_line.len()).any(|w| w == by_line.as_slice()));
        let notice = [&[0x1C, 2, 116, 0, 8][..], b"CC BY-NC"].concat();
        assert!(contents.windows(notice.len()).any(|w| w == notice.as_slice()));
    }

    #[test]
    fn test_source_moved_after_staging() {
        let dir = tempdir().unwrap();
        let src = jpeg_with_fields(&[(Tag::ImageDescription, "c")]);
        let (img, orig, up) = stage(dir.path(), "DSC_0042.JPG", &src);

        let staged = rewrite(&img, &Attribution::default(), &orig, &up).unwrap();
        assert!(staged.starts_with(&up));
        assert!(!img.path.exists());
        assert_eq!(fs::read(orig.join("DSC_0042.JPG")).unwrap(), src);
        // No temp files left behind
        let names: Vec<String> = fs::read_dir(&up)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".jpg") && !names[0].starts_with('.'));
    }

    #[test]
    fn test_twice_gives_distinct_names() {
        let dir = tempdir().unwrap();
        let src = jpeg_with_fields(&[(Tag::ImageDescription, "c")]);
        let (img, orig, up) = stage(dir.path(), "same.jpg", &src);

        let first = rewrite(&img, &Attribution::default(), &orig, &up).unwrap();
        fs::write(&img.path, &src).unwrap();
        let second = rewrite(&img, &Attribution::default(), &orig, &up).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn test_non_jpeg_reencoded() {
        let dir = tempdir().unwrap();
        let (img, orig, up) = stage(dir.path(), "scan.png", &png_image());

        let staged = rewrite(&img, &Attribution::default(), &orig, &up).unwrap();
        let bytes = fs::read(&staged).unwrap();
        assert!(bytes.starts_with(&[0xFF, 0xD8]));
        let exif = read_metadata(&bytes).unwrap();
        assert!(exif.get_field(Tag::Copyright, In::PRIMARY).is_some());
        assert!(orig.join("scan.png").exists());
    }

    #[test]
    fn test_failed_rewrite_keeps_source() {
        let dir = tempdir().unwrap();
        let (img, orig, up) = stage(dir.path(), "broken.jpg", b"not an image");

        assert!(rewrite(&img, &Attribution::default(), &orig, &up).is_err());
        assert!(img.path.exists());
        assert_eq!(fs::read_dir(&up).unwrap().count(), 0);
    }
}
