//! Turns raw cell values into renderable [`Cell`]s.
//!
//! Nothing in here returns an error: text that cannot be cleaned becomes empty and image
//! bytes that cannot be decoded become "no image".

use crate::config::LayoutConfig;
use crate::pdf::flate_compress;
use crate::types::Pt;
use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, GenericImageView, ImageDecoder, ImageFormat};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::sync::{Arc, LazyLock};

/// Missing-value token emitted by the upstream data model.
pub const MISSING_MARKER: &str = "nan";

const LINE_BREAK: &str = "<br/>";

static LEADING_ENUMERATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+[\s.)-]*)+").expect("static pattern"));

/// Escaped text understood by [`crate::flowable::Paragraph`]: `&amp;`, `&lt;`, `&gt;` and
/// `<br/>` are the only constructs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Markup(String);

impl Markup {
    /// Escape arbitrary text. Newlines become explicit breaks; other control characters are
    /// dropped and tabs become spaces.
    pub fn escape(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '\r' => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    out.push_str(LINE_BREAK);
                }
                '\n' => out.push_str(LINE_BREAK),
                '\t' => out.push(' '),
                c if c.is_control() => {}
                c => out.push(c),
            }
        }
        Markup(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded lines, one per explicit break.
    pub fn lines(&self) -> Vec<String> {
        self.0.split(LINE_BREAK).map(unescape).collect()
    }

    /// Decoded text with breaks rendered as `\n`.
    pub fn plain_text(&self) -> String {
        self.lines().join("\n")
    }

    /// Rendered character count, ignoring line breaks.
    pub fn char_count(&self) -> usize {
        self.lines().iter().map(|line| line.chars().count()).sum()
    }
}

fn unescape(segment: &str) -> String {
    segment
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Raw value as handed over by the input collaborator.
#[derive(Debug, Clone)]
pub enum RawValue {
    Text(String),
    /// Image bytes, or `None` when the collaborator could not produce any.
    Image(Option<Vec<u8>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageColorSpace {
    Gray,
    Rgb,
}

impl ImageColorSpace {
    pub(crate) fn pdf_name(self) -> &'static str {
        match self {
            ImageColorSpace::Gray => "/DeviceGray",
            ImageColorSpace::Rgb => "/DeviceRGB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// JPEG bytes embedded unchanged.
    Dct,
    /// Zlib-compressed 8-bit samples.
    Flate,
}

/// Image already converted to something a PDF viewer can paint directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub resource_id: String,
    pub width_px: u32,
    pub height_px: u32,
    pub color_space: ImageColorSpace,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCell {
    pub image: Arc<EmbeddedImage>,
    pub width: Pt,
    pub height: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(Markup),
    Image(ImageCell),
}

impl Cell {
    pub fn text(raw: &str) -> Self {
        Cell::Text(normalize_text(raw))
    }

    pub fn empty() -> Self {
        Cell::Text(Markup::default())
    }

    /// Width hint in characters used by the content-driven planner.
    pub fn content_chars(&self) -> usize {
        match self {
            Cell::Text(markup) => markup.char_count(),
            Cell::Image(_) => 0,
        }
    }

    pub fn as_markup(&self) -> Option<&Markup> {
        match self {
            Cell::Text(markup) => Some(markup),
            Cell::Image(_) => None,
        }
    }
}

/// Trim, map the missing-value marker to empty, and escape.
pub fn normalize_text(raw: &str) -> Markup {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(MISSING_MARKER) {
        return Markup::default();
    }
    Markup::escape(trimmed)
}

/// Drop a leading question number such as `"12) "`, `"3. "` or `"07-"`. Stacked markers
/// (`"1.2 "`) are removed together so the result never starts with another marker.
pub fn strip_enumeration(label: &str) -> String {
    let trimmed = label.trim();
    LEADING_ENUMERATION.replace(trimmed, "").trim().to_string()
}

pub fn is_certification_label(label: &str, config: &LayoutConfig) -> bool {
    !config.certification_phrase.is_empty() && label.contains(&config.certification_phrase)
}

/// Value cell for a labelled field. Self-certification prompts always read as affirmed.
pub fn field_value(label: &str, raw: &RawValue, config: &LayoutConfig) -> Cell {
    if is_certification_label(label, config) {
        return Cell::Text(Markup::escape(&config.certification_value));
    }
    normalize_cell(raw, config)
}

pub fn normalize_cell(raw: &RawValue, config: &LayoutConfig) -> Cell {
    match raw {
        RawValue::Text(text) => Cell::Text(normalize_text(text)),
        RawValue::Image(Some(bytes)) => normalize_image(
            bytes,
            Pt::from_f32(config.image_max_width),
            Pt::from_f32(config.image_max_height),
        )
        .map(Cell::Image)
        .unwrap_or_else(Cell::empty),
        RawValue::Image(None) => Cell::empty(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Gif => ImageFormat::Gif,
        }
    }
}

pub fn sniff_image(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        Some(ImageKind::Jpeg)
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some(ImageKind::Png)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageKind::Gif)
    } else {
        None
    }
}

/// Color space a JPEG can be embedded with as-is. The decoder hands CMYK and YCCK data
/// back as RGB, so this looks at the color model stored in the file instead.
fn jpeg_color_space(bytes: &[u8]) -> Option<ImageColorSpace> {
    let decoder = JpegDecoder::new(Cursor::new(bytes)).ok()?;
    dct_color_space(decoder.original_color_type())
}

fn dct_color_space(original: ExtendedColorType) -> Option<ImageColorSpace> {
    match original {
        ExtendedColorType::L8 => Some(ImageColorSpace::Gray),
        ExtendedColorType::Rgb8 => Some(ImageColorSpace::Rgb),
        _ => None,
    }
}

/// Decode and embed an image, fitting it into `max_width` x `max_height` without upscaling.
pub fn normalize_image(bytes: &[u8], max_width: Pt, max_height: Pt) -> Option<ImageCell> {
    let Some(kind) = sniff_image(bytes) else {
        log::debug!("rejecting image with unknown signature ({} bytes)", bytes.len());
        return None;
    };
    let decoded = match image::load_from_memory_with_format(bytes, kind.format()) {
        Ok(decoded) => decoded,
        Err(err) => {
            log::debug!("rejecting undecodable {kind:?} image: {err}");
            return None;
        }
    };
    let (width_px, height_px) = decoded.dimensions();
    if width_px == 0 || height_px == 0 {
        return None;
    }

    let passthrough = match kind {
        ImageKind::Jpeg => jpeg_color_space(bytes),
        _ => None,
    };
    let (color_space, encoding, data) = match passthrough {
        Some(color_space) => (color_space, ImageEncoding::Dct, bytes.to_vec()),
        None => {
            // Palette, alpha, 16-bit and CMYK sources all end up as RGB on white.
            let rgba = decoded.to_rgba8();
            let mut rgb = Vec::with_capacity((width_px as usize) * (height_px as usize) * 3);
            for pixel in rgba.pixels() {
                let [r, g, b, a] = pixel.0;
                let a = a as u32;
                for channel in [r, g, b] {
                    rgb.push(((channel as u32 * a + 255 * (255 - a) + 127) / 255) as u8);
                }
            }
            match flate_compress(&rgb) {
                Ok(data) => (ImageColorSpace::Rgb, ImageEncoding::Flate, data),
                Err(err) => {
                    log::debug!("rejecting {kind:?} image: {err}");
                    return None;
                }
            }
        }
    };

    let digest = Sha256::digest(&data);
    let resource_id = format!(
        "img-{}",
        digest[..12]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>()
    );

    let (width, height) = fit_within(width_px, height_px, max_width, max_height);
    Some(ImageCell {
        image: Arc::new(EmbeddedImage {
            resource_id,
            width_px,
            height_px,
            color_space,
            encoding,
            data,
        }),
        width,
        height,
    })
}

fn fit_within(width_px: u32, height_px: u32, max_width: Pt, max_height: Pt) -> (Pt, Pt) {
    let w = Pt::from_f32(width_px as f32);
    let h = Pt::from_f32(height_px as f32);
    if w <= max_width && h <= max_height {
        return (w, h);
    }
    // Compare max_width/w against max_height/h without dividing.
    let width_bound = max_width.to_milli_i64() as i128 * h.to_milli_i64() as i128
        <= max_height.to_milli_i64() as i128 * w.to_milli_i64() as i128;
    if width_bound {
        let height = h.mul_ratio(max_width.to_milli_i64(), w.to_milli_i64());
        (max_width, height.max(Pt::from_f32(1.0)))
    } else {
        let width = w.mul_ratio(max_height.to_milli_i64(), h.to_milli_i64());
        (width.max(Pt::from_f32(1.0)), max_height)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, Rgba};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, _| Rgba([(x * 10) as u8, 20, 30, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |_, y| Rgb([200, (y * 3) as u8, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    fn gray_jpeg_bytes() -> Vec<u8> {
        let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_fn(8, 8, |x, _| Luma([x as u8]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn escapes_markup_and_breaks_lines() {
        let markup = normalize_text("  A & B <tag>\nnext\r\nlast ");
        assert_eq!(
            markup.as_str(),
            "A &amp; B &lt;tag&gt;<br/>next<br/>last"
        );
        assert_eq!(markup.lines(), vec!["A & B <tag>", "next", "last"]);
    }

    #[test]
    fn literal_break_text_is_not_interpreted() {
        let markup = normalize_text("<br/>");
        assert_eq!(markup.lines(), vec!["<br/>"]);
    }

    #[test]
    fn missing_marker_is_empty_in_any_case() {
        for raw in ["nan", "NaN", "NAN", " nan "] {
            assert!(normalize_text(raw).is_empty(), "{raw}");
        }
        assert_eq!(normalize_text("banana").as_str(), "banana");
        assert_eq!(normalize_text("nan.").as_str(), "nan.");
    }

    #[test]
    fn control_characters_dropped() {
        assert_eq!(normalize_text("a\u{0007}b\tc").as_str(), "ab c");
    }

    #[test]
    fn enumeration_stripping() {
        assert_eq!(strip_enumeration("Name of Candidate"), "Name of Candidate");
        assert_eq!(strip_enumeration("3. Name"), "Name");
        assert_eq!(strip_enumeration("10) Age"), "Age");
        assert_eq!(strip_enumeration("07-Venue"), "Venue");
        assert_eq!(strip_enumeration("12) "), "");
        assert_eq!(strip_enumeration("1.2 Sub-item"), "Sub-item");
    }

    #[test]
    fn enumeration_stripping_is_idempotent() {
        for label in ["3. 4. Nested", "10) Age", "Plain", "2019 budget", "1.2.3 Items"] {
            let once = strip_enumeration(label);
            assert_eq!(strip_enumeration(&once), once, "{label}");
        }
    }

    #[test]
    fn certification_override_is_total() {
        let config = LayoutConfig::default();
        let label = "I hereby certify that the above is true";
        for raw in [
            RawValue::Text("No".into()),
            RawValue::Text(String::new()),
            RawValue::Text("nan".into()),
            RawValue::Image(None),
        ] {
            assert_eq!(
                field_value(label, &raw, &config),
                Cell::Text(Markup::escape("Yes"))
            );
        }
        assert_eq!(
            field_value("Remarks", &RawValue::Text("No".into()), &config),
            Cell::text("No")
        );
    }

    #[test]
    fn sniffing() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF]), Some(ImageKind::Jpeg));
        assert_eq!(sniff_image(b"\x89PNG\r\n"), Some(ImageKind::Png));
        assert_eq!(sniff_image(b"GIF89a..."), Some(ImageKind::Gif));
        assert_eq!(sniff_image(b"<html>"), None);
        assert_eq!(sniff_image(&[]), None);
    }

    #[test]
    fn png_is_flattened_to_rgb() {
        let cell = normalize_image(
            &png_bytes(4, 2),
            Pt::from_f32(120.0),
            Pt::from_f32(90.0),
        )
        .unwrap();
        assert_eq!(cell.image.encoding, ImageEncoding::Flate);
        assert_eq!(cell.image.color_space, ImageColorSpace::Rgb);
        assert_eq!(cell.width.to_milli_i64(), 4_000);
        assert_eq!(cell.height.to_milli_i64(), 2_000);
        assert!(cell.image.resource_id.starts_with("img-"));
    }

    #[test]
    fn jpeg_passes_through() {
        let bytes = jpeg_bytes(16, 8);
        let cell = normalize_image(&bytes, Pt::from_f32(120.0), Pt::from_f32(90.0)).unwrap();
        assert_eq!(cell.image.encoding, ImageEncoding::Dct);
        assert_eq!(cell.image.color_space, ImageColorSpace::Rgb);
        assert_eq!(cell.image.data, bytes);

        let gray = normalize_image(&gray_jpeg_bytes(), Pt::from_f32(120.0), Pt::from_f32(90.0))
            .unwrap();
        assert_eq!(gray.image.color_space, ImageColorSpace::Gray);
    }

    #[test]
    fn only_gray_and_rgb_jpegs_keep_their_stream() {
        assert_eq!(jpeg_color_space(&jpeg_bytes(4, 4)), Some(ImageColorSpace::Rgb));
        assert_eq!(jpeg_color_space(&gray_jpeg_bytes()), Some(ImageColorSpace::Gray));
        assert_eq!(dct_color_space(ExtendedColorType::Cmyk8), None);
        assert_eq!(dct_color_space(ExtendedColorType::Rgb16), None);
        assert_eq!(jpeg_color_space(b"\xFF\xD8 truncated"), None);
    }

    #[test]
    fn large_images_are_scaled_to_fit() {
        let cell = normalize_image(&png_bytes(400, 100), Pt::from_f32(120.0), Pt::from_f32(90.0))
            .unwrap();
        assert_eq!(cell.width.to_milli_i64(), 120_000);
        assert_eq!(cell.height.to_milli_i64(), 30_000);
    }

    #[test]
    fn corrupt_images_degrade_to_empty() {
        let config = LayoutConfig::default();
        let mut truncated = png_bytes(4, 4);
        truncated.truncate(12);
        assert_eq!(
            normalize_cell(&RawValue::Image(Some(truncated)), &config),
            Cell::empty()
        );
        assert_eq!(
            normalize_cell(&RawValue::Image(Some(b"not an image".to_vec())), &config),
            Cell::empty()
        );
        assert_eq!(normalize_cell(&RawValue::Image(None), &config), Cell::empty());
    }

    #[test]
    fn content_chars_ignore_breaks() {
        assert_eq!(Cell::text("BBBBBBBBBB").content_chars(), 10);
        assert_eq!(Cell::text("ab\ncd").content_chars(), 4);
        assert_eq!(Cell::text("a&b").content_chars(), 3);
    }
}
