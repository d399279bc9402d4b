use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ::exif::{Field, In, Reader, Tag, Value};
use tracing::debug;

use crate::domain::normalize_image_time;
use crate::error::{Error, Result};

pub const DATETIME_ORIGINAL: &str = "datetime_original";
pub const PIXEL_WIDTH: &str = "pixel_width";
pub const PIXEL_HEIGHT: &str = "pixel_height";

/// Best-effort attributes of one image file, keyed by snake_case tag name.
///
/// Attributes whose tag data cannot be decoded are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    attributes: BTreeMap<String, String>,
}

impl ImageMetadata {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Capture time in stored form (`YYYY-MM-DD HH:MM:SS`).
    pub fn capture_time(&self) -> Option<String> {
        self.get(DATETIME_ORIGINAL).and_then(normalize_image_time)
    }

    pub fn width(&self) -> Option<u32> {
        self.first_u32(&["pixel_x_dimension", "image_width", PIXEL_WIDTH])
    }

    pub fn height(&self) -> Option<u32> {
        self.first_u32(&["pixel_y_dimension", "image_length", PIXEL_HEIGHT])
    }

    /// Required attributes that could not be produced.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.capture_time().is_none() {
            missing.push(DATETIME_ORIGINAL);
        }
        if self.width().is_none() {
            missing.push(PIXEL_WIDTH);
        }
        if self.height().is_none() {
            missing.push(PIXEL_HEIGHT);
        }
        missing
    }

    fn first_u32(&self, names: &[&str]) -> Option<u32> {
        names
            .iter()
            .find_map(|name| self.get(name).and_then(|v| v.trim().parse().ok()))
    }
}

/// Read EXIF attributes from `path`, filling pixel dimensions from the image
/// header when EXIF lacks them.
///
/// Fails with [`Error::UnreadableFile`] if the file cannot be read and with
/// [`Error::UnreadableImage`] if neither the EXIF reader nor the image decoder
/// recognises the container.
pub fn extract_metadata(path: &Path) -> Result<ImageMetadata> {
    let file = File::open(path).map_err(|source| Error::UnreadableFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut metadata = ImageMetadata::default();

    let exif_failure = match Reader::new()
        .continue_on_error(true)
        .read_from_container(&mut reader)
    {
        Ok(exif) => {
            collect_fields(&mut metadata, exif.fields());
            None
        }
        Err(::exif::Error::PartialResult(partial)) => {
            let (exif, errors) = partial.into_inner();
            debug!(path = %path.display(), skipped = errors.len(), "partially decoded EXIF");
            collect_fields(&mut metadata, exif.fields());
            None
        }
        Err(::exif::Error::NotFound(_)) => None,
        Err(::exif::Error::Io(source)) => {
            return Err(Error::UnreadableFile {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(other) => Some(other.to_string()),
    };

    if metadata.width().is_none() || metadata.height().is_none() {
        match image::image_dimensions(path) {
            Ok((w, h)) => {
                metadata.insert(PIXEL_WIDTH, w.to_string());
                metadata.insert(PIXEL_HEIGHT, h.to_string());
            }
            Err(err) => {
                if let Some(exif_err) = exif_failure {
                    return Err(Error::UnreadableImage {
                        path: path.to_path_buf(),
                        message: format!("{exif_err}; {err}"),
                    });
                }
                debug!(path = %path.display(), error = %err, "image header not decodable");
            }
        }
    }

    Ok(metadata)
}

fn collect_fields<'a>(metadata: &mut ImageMetadata, fields: impl Iterator<Item = &'a Field>) {
    for field in fields.filter(|f| f.ifd_num == In::PRIMARY) {
        let Some(name) = attribute_name(field.tag) else {
            continue;
        };
        if let Some(value) = field_text(field) {
            metadata.attributes.entry(name).or_insert(value);
        }
    }
}

fn field_text(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(parts) => {
            let raw = parts.first()?;
            let text = std::str::from_utf8(raw).ok()?;
            let text = text.trim_end_matches('\0').trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Value::Byte(_) | Value::Short(_) | Value::Long(_) => {
            field.value.get_uint(0).map(|v| v.to_string())
        }
        _ => Some(field.display_value().to_string()),
    }
}

/// `DateTimeOriginal` -> `datetime_original`, `PixelXDimension` -> `pixel_x_dimension`.
fn attribute_name(tag: Tag) -> Option<String> {
    match tag {
        Tag::DateTimeOriginal => return Some(DATETIME_ORIGINAL.to_string()),
        Tag::DateTimeDigitized => return Some("datetime_digitized".to_string()),
        Tag::DateTime => return Some("datetime".to_string()),
        _ => {}
    }
    let name = tag.to_string();
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(snake_case(&name))
}

fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x * 20) as u8, (y * 30) as u8, 90])
        });
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
            .unwrap();
        out
    }

    /// Big-endian TIFF block holding the given fields.
    fn tiff_bytes(fields: &[Field]) -> Vec<u8> {
        let mut writer = ::exif::experimental::Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        tiff.into_inner()
    }

    /// JPEG with an APP1 EXIF segment carrying the given fields.
    fn jpeg_with_exif(path: &Path, fields: &[Field]) {
        jpeg_with_tiff(path, &tiff_bytes(fields));
    }

    fn jpeg_with_tiff(path: &Path, tiff: &[u8]) {
        let jpeg = jpeg_bytes(8, 6);
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(tiff);
        out.extend_from_slice(&jpeg[2..]);
        fs::write(path, out).unwrap();
    }

    fn ascii(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("PixelXDimension"), "pixel_x_dimension");
        assert_eq!(snake_case("ImageWidth"), "image_width");
        assert_eq!(snake_case("Make"), "make");
        assert_eq!(snake_case("GPSLatitude"), "gps_latitude");
    }

    #[test]
    fn test_extracts_capture_time_and_dimensions() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.jpg");
        jpeg_with_exif(
            &path,
            &[
                ascii(Tag::DateTimeOriginal, "2021:09:24 15:46:41"),
                ascii(Tag::Make, "Acme"),
                Field {
                    tag: Tag::PixelXDimension,
                    ifd_num: In::PRIMARY,
                    value: Value::Long(vec![4000]),
                },
            ],
        );

        let meta = extract_metadata(&path).unwrap();
        assert_eq!(meta.get(DATETIME_ORIGINAL), Some("2021:09:24 15:46:41"));
        assert_eq!(meta.capture_time().as_deref(), Some("2021-09-24 15:46:41"));
        assert_eq!(meta.get("make"), Some("Acme"));
        assert_eq!(meta.width(), Some(4000));
        // Height comes from the decoded JPEG header.
        assert_eq!(meta.height(), Some(6));
        assert!(meta.missing_required().is_empty());
    }

    #[test]
    fn test_jpeg_without_exif_reports_missing_time() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plain.jpg");
        fs::write(&path, jpeg_bytes(10, 4)).unwrap();

        let meta = extract_metadata(&path).unwrap();
        assert_eq!(meta.capture_time(), None);
        assert_eq!(meta.width(), Some(10));
        assert_eq!(meta.height(), Some(4));
        assert_eq!(meta.missing_required(), vec![DATETIME_ORIGINAL]);
    }

    #[test]
    fn test_png_dimensions_from_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("b.png");
        image::RgbImage::new(5, 7).save(&path).unwrap();

        let meta = extract_metadata(&path).unwrap();
        assert_eq!(meta.width(), Some(5));
        assert_eq!(meta.height(), Some(7));
    }

    #[test]
    fn test_garbled_timestamp_is_treated_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.jpg");
        jpeg_with_exif(&path, &[ascii(Tag::DateTimeOriginal, "    :  :     :  :  ")]);

        let meta = extract_metadata(&path).unwrap();
        assert_eq!(meta.capture_time(), None);
        assert!(meta.missing_required().contains(&DATETIME_ORIGINAL));
    }

    #[test]
    fn test_truncated_tag_keeps_the_other_attributes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("d.jpg");
        let mut tiff = tiff_bytes(&[
            ascii(Tag::Make, "Acme Optics"),
            ascii(Tag::Model, "X1"),
            ascii(Tag::DateTimeOriginal, "2021:09:24 15:46:41"),
        ]);

        // Point the Make value past the end of the block.
        let ifd = u32::from_be_bytes(tiff[4..8].try_into().unwrap()) as usize;
        let count = u16::from_be_bytes(tiff[ifd..ifd + 2].try_into().unwrap()) as usize;
        let entry = (0..count)
            .map(|i| ifd + 2 + i * 12)
            .find(|&e| u16::from_be_bytes(tiff[e..e + 2].try_into().unwrap()) == 0x010F)
            .unwrap();
        tiff[entry + 8..entry + 12].copy_from_slice(&0xFFFF_FF00u32.to_be_bytes());
        jpeg_with_tiff(&path, &tiff);

        let meta = extract_metadata(&path).unwrap();
        assert_eq!(meta.get("make"), None);
        assert_eq!(meta.get("model"), Some("X1"));
        assert_eq!(meta.capture_time().as_deref(), Some("2021-09-24 15:46:41"));
    }

    #[test]
    fn test_garbage_file_is_unreadable_image() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fake.jpg");
        fs::write(&path, b"this is not an image at all").unwrap();

        let err = extract_metadata(&path).unwrap_err();
        assert!(matches!(err, Error::UnreadableImage { .. }));
    }

    #[test]
    fn test_missing_file_is_unreadable_file() {
        let err = extract_metadata(Path::new("/nonexistent/x.jpg")).unwrap_err();
        assert!(matches!(err, Error::UnreadableFile { .. }));
    }
}
