use std::io::Cursor;

use exif::{Exif, In, Reader, Tag, Value};

use crate::error::MetadataError;
use crate::record::SourceImage;

/// Parse the embedded EXIF block of an image. Containers that cannot carry EXIF at all
/// (GIF, BMP) count as having none.
pub fn read_metadata(bytes: &[u8]) -> Result<Exif, MetadataError> {
    Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .map_err(|e| match e {
            exif::Error::NotFound(_) | exif::Error::InvalidFormat("Unknown image format") => MetadataError::NoMetadata,
            other => MetadataError::Malformed(other),
        })
}

/// Read a text field from the primary image's metadata.
pub fn read_text_field(image: &SourceImage, tag: Tag) -> Result<String, MetadataError> {
    let exif = read_metadata(&image.bytes)?;
    text_field(&exif, tag)
}

/// The caption lives in ImageDescription.
pub fn read_caption(image: &SourceImage) -> Result<String, MetadataError> {
    read_text_field(image, Tag::ImageDescription)
}

pub(crate) fn text_field(exif: &Exif, tag: Tag) -> Result<String, MetadataError> {
    let field = exif
        .get_field(tag, In::PRIMARY)
        .ok_or(MetadataError::MissingField(tag))?;
    match &field.value {
        // Multiple ASCII components are NUL-separated in the file; join them back with newlines
        Value::Ascii(parts) => Ok(parts
            .iter()
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
            .collect::<Vec<_>>()
            .join("\n")),
        Value::Undefined(bytes, _) => Ok(String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()),
        _ => Err(MetadataError::NotText(tag)),
    }
}
