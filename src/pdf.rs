use crate::canvas::{Command, Document, Page};
use crate::font::Base14Font;
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::normalize::{EmbeddedImage, ImageEncoding};
use crate::types::{Color, Pt};
use std::collections::HashMap;
use std::io::{self, Write};

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const RESOURCES_ID: usize = 3;
const INFO_ID: usize = 4;

const FONTS: [Base14Font; 2] = [Base14Font::Helvetica, Base14Font::HelveticaBold];

#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub title: Option<String>,
    /// Flate-compress page content streams.
    pub compress: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            title: None,
            compress: true,
        }
    }
}

pub fn document_to_pdf(document: &Document, options: &PdfOptions) -> io::Result<Vec<u8>> {
    document_to_pdf_with_metrics(document, options, None)
}

pub fn document_to_pdf_with_metrics(
    document: &Document,
    options: &PdfOptions,
    mut metrics: Option<&mut DocumentMetrics>,
) -> io::Result<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::new();
    let mut writer = PdfWriter::new(&mut bytes)?;
    let content_bytes = writer.write_document(document, options)?;
    let total_bytes = writer.finish()?;

    if let Some(metrics) = metrics.as_deref_mut() {
        metrics.total_bytes = total_bytes;
        for (page_index, content) in content_bytes.iter().enumerate() {
            if metrics.pages.len() <= page_index {
                metrics
                    .pages
                    .resize_with(page_index + 1, PageMetrics::default);
            }
            let entry = &mut metrics.pages[page_index];
            if entry.page_number == 0 {
                entry.page_number = page_index + 1;
            }
            entry.content_bytes = *content;
        }
    }
    Ok(bytes)
}

pub(crate) fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

struct PdfWriter<'a, W: Write> {
    writer: &'a mut W,
    offset: usize,
    // Indexed by object id; 0 is the free object.
    offsets: Vec<usize>,
    next_id: usize,
}

impl<'a, W: Write> PdfWriter<'a, W> {
    fn new(writer: &'a mut W) -> io::Result<Self> {
        let mut offset = 0usize;
        write_bytes(writer, b"%PDF-1.7\n", &mut offset)?;
        write_bytes(writer, b"%\xE2\xE3\xCF\xD3\n", &mut offset)?;
        Ok(Self {
            writer,
            offset,
            offsets: vec![0; INFO_ID + 1],
            next_id: INFO_ID + 1,
        })
    }

    fn alloc_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.offsets.resize(self.next_id, 0);
        id
    }

    fn write_object(&mut self, id: usize, body: &[u8]) -> io::Result<()> {
        if let Some(slot) = self.offsets.get_mut(id) {
            *slot = self.offset;
        }
        write_bytes(self.writer, format!("{id} 0 obj\n").as_bytes(), &mut self.offset)?;
        write_bytes(self.writer, body, &mut self.offset)?;
        write_bytes(self.writer, b"\nendobj\n", &mut self.offset)
    }

    fn write_stream(&mut self, id: usize, dict_entries: &str, data: &[u8]) -> io::Result<()> {
        let mut body = format!("<< {dict_entries} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.write_object(id, &body)
    }

    /// Writes every object of the document and returns the content stream size per page.
    fn write_document(&mut self, document: &Document, options: &PdfOptions) -> io::Result<Vec<usize>> {
        let mut font_entries = Vec::new();
        let mut font_names: HashMap<Base14Font, String> = HashMap::new();
        for (index, font) in FONTS.iter().enumerate() {
            let id = self.alloc_id();
            let resource = format!("F{}", index + 1);
            self.write_object(id, font_object(*font).as_bytes())?;
            font_entries.push(format!("/{resource} {id} 0 R"));
            font_names.insert(*font, resource);
        }

        let mut image_entries = Vec::new();
        let mut image_names: HashMap<&str, String> = HashMap::new();
        for (index, (resource_id, image)) in document.images.iter().enumerate() {
            let id = self.alloc_id();
            let name = format!("Im{}", index + 1);
            self.write_stream(id, &image_dict(image), &image.data)?;
            image_entries.push(format!("/{name} {id} 0 R"));
            image_names.insert(resource_id.as_str(), name);
        }

        let page_height = document.page_size.height;
        let media_box = format!(
            "[0 0 {} {}]",
            fmt_pt(document.page_size.width),
            fmt_pt(page_height)
        );
        let mut kids = Vec::with_capacity(document.pages.len());
        let mut content_sizes = Vec::with_capacity(document.pages.len());
        for page in &document.pages {
            let content = render_page(page, page_height, &font_names, &image_names);
            content_sizes.push(content.len());
            let content_id = self.alloc_id();
            if options.compress {
                let compressed = flate_compress(content.as_bytes())?;
                self.write_stream(content_id, "/Filter /FlateDecode", &compressed)?;
            } else {
                self.write_stream(content_id, "", content.as_bytes())?;
            }
            let page_id = self.alloc_id();
            let page_obj = format!(
                "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox {media_box} /Resources {RESOURCES_ID} 0 R /Contents {content_id} 0 R >>"
            );
            self.write_object(page_id, page_obj.as_bytes())?;
            kids.push(format!("{page_id} 0 R"));
        }

        let mut resources = format!(
            "<< /ProcSet [/PDF /Text /ImageB /ImageC] /Font << {} >>",
            font_entries.join(" ")
        );
        if !image_entries.is_empty() {
            resources.push_str(&format!(" /XObject << {} >>", image_entries.join(" ")));
        }
        resources.push_str(" >>");
        self.write_object(RESOURCES_ID, resources.as_bytes())?;

        let pages = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            kids.len()
        );
        self.write_object(PAGES_ID, pages.as_bytes())?;
        self.write_object(
            CATALOG_ID,
            format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
        )?;
        self.write_object(INFO_ID, info_object(options.title.as_deref()).as_bytes())?;
        Ok(content_sizes)
    }

    fn finish(&mut self) -> io::Result<usize> {
        let xref_start = self.offset;
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.next_id);
        for offset in &self.offsets[1..self.next_id] {
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        write_bytes(self.writer, xref.as_bytes(), &mut self.offset)?;
        let trailer = format!(
            "trailer\n<< /Size {} /Root {CATALOG_ID} 0 R /Info {INFO_ID} 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
            self.next_id
        );
        write_bytes(self.writer, trailer.as_bytes(), &mut self.offset)?;
        self.writer.flush()?;
        Ok(self.offset)
    }
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn font_object(font: Base14Font) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        font.pdf_name()
    )
}

fn image_dict(image: &EmbeddedImage) -> String {
    let filter = match image.encoding {
        ImageEncoding::Dct => "/DCTDecode",
        ImageEncoding::Flate => "/FlateDecode",
    };
    format!(
        "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter {}",
        image.width_px,
        image.height_px,
        image.color_space.pdf_name(),
        filter
    )
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec!["/Producer (recordsheet)".to_string()];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", encode_winansi_pdf_string(title).text));
    }
    format!("<< {} >>", entries.join(" "))
}

#[derive(Clone)]
struct TextState {
    font: Base14Font,
    font_size: Pt,
}

fn render_page(
    page: &Page,
    page_height: Pt,
    font_names: &HashMap<Base14Font, String>,
    image_names: &HashMap<&str, String>,
) -> String {
    let mut out = String::new();
    let mut state = TextState {
        font: Base14Font::Helvetica,
        font_size: Pt::from_f32(12.0),
    };
    let mut stack: Vec<TextState> = Vec::new();

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => {
                stack.push(state.clone());
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some(saved) = stack.pop() {
                    state = saved;
                }
                out.push_str("Q\n");
            }
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => out.push_str(&color_to_pdf(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_to_pdf(*color, "RG")),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFontName(name) => state.font = Base14Font::from_name(name),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                let resource = font_names
                    .get(&state.font)
                    .map(String::as_str)
                    .unwrap_or("F1");
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    log::debug!(
                        "{} characters outside WinAnsi replaced in {:?}",
                        encoded.replaced,
                        text
                    );
                }
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(state.font_size)));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - state.font_size)
                ));
                out.push_str(&format!("({}) Tj\n", encoded.text));
                out.push_str("ET\n");
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::StrokeRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nS\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(name) = image_names.get(resource_id.as_str()) {
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(page_height - *y - *height)
                    ));
                    out.push_str(&format!("/{name} Do\n"));
                    out.push_str("Q\n");
                }
            }
        }
    }
    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            _ => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{b:03o}")),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn color_to_pdf(color: Color, operator: &str) -> String {
    format!(
        "{} {} {} {operator}\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}

fn fmt(value: f32) -> String {
    fmt_pt(Pt::from_f32(value))
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }
    let mut s = format!("{sign}{int_part}.{frac_part:03}");
    while s.ends_with('0') {
        s.pop();
    }
    s
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::normalize::normalize_image;
    use crate::normalize::tests::png_bytes;
    use crate::types::Size;

    fn sample_document(pages: usize) -> Document {
        let mut canvas = Canvas::new(Size::letter());
        for index in 0..pages {
            canvas.set_font_name("Helvetica-Bold");
            canvas.set_font_size(Pt::from_f32(10.0));
            canvas.draw_string(Pt::from_f32(40.0), Pt::from_f32(40.0), format!("Page {index}"));
            canvas.show_page();
        }
        canvas.finish_without_show()
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(612_000), "612");
        assert_eq!(format_milli(595_280), "595.28");
        assert_eq!(format_milli(-1_500), "-1.5");
        assert_eq!(fmt(0.9), "0.9");
    }

    #[test]
    fn flate_output_inflates_back() {
        use std::io::Read;

        let data = b"BT /F1 10 Tf 40 740 Td (Page 0) Tj ET\n".repeat(20);
        let compressed = flate_compress(&data).unwrap();
        assert!(!compressed.is_empty());
        assert!(compressed.len() < data.len());
        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, data);
    }

    #[test]
    fn winansi_escapes() {
        let encoded = encode_winansi_pdf_string("a(b)\\c\u{00A0}\u{0928}");
        assert_eq!(encoded.text, "a\\(b\\)\\\\c\\240?");
        assert_eq!(encoded.replaced, 1);
    }

    #[test]
    fn output_reopens_with_expected_pages() {
        let bytes = document_to_pdf(&sample_document(3), &PdfOptions::default()).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);
        let first = *pages.get(&1).unwrap();
        let content = String::from_utf8_lossy(&doc.get_page_content(first).unwrap()).to_string();
        assert!(content.contains("/F2 10 Tf"), "{content}");
        assert!(content.contains("(Page 0) Tj"), "{content}");
        assert!(content.contains("40 742 Td"), "{content}");
    }

    #[test]
    fn uncompressed_output_and_media_box() {
        let options = PdfOptions {
            title: Some("Report (A)".to_string()),
            compress: false,
        };
        let bytes = document_to_pdf(&sample_document(1), &options).unwrap();
        let raw = String::from_utf8_lossy(&bytes);
        assert!(raw.contains("/MediaBox [0 0 612 792]"));
        assert!(raw.contains("(Page 0) Tj"));
        assert!(raw.contains("/Title (Report \\(A\\))"));
        assert!(raw.ends_with("%%EOF\n"));
    }

    #[test]
    fn images_are_embedded_once() {
        let cell = normalize_image(&png_bytes(6, 3), Pt::from_f32(120.0), Pt::from_f32(90.0))
            .unwrap();
        let mut canvas = Canvas::new(Size::a4());
        for i in 0..3 {
            let y = Pt::from_f32(40.0 + 20.0 * i as f32);
            canvas.draw_image(Pt::from_f32(40.0), y, cell.width, cell.height, &cell.image);
        }
        let document = canvas.finish();
        assert_eq!(document.images.len(), 1);
        let bytes = document_to_pdf(&document, &PdfOptions::default()).unwrap();
        let raw = String::from_utf8_lossy(&bytes);
        assert_eq!(raw.matches("/Subtype /Image").count(), 1);
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn metrics_record_bytes() {
        let mut metrics = DocumentMetrics::default();
        let bytes =
            document_to_pdf_with_metrics(&sample_document(2), &PdfOptions::default(), Some(&mut metrics))
                .unwrap();
        assert_eq!(metrics.total_bytes, bytes.len());
        assert_eq!(metrics.pages.len(), 2);
        assert!(metrics.pages.iter().all(|p| p.content_bytes > 0));
        assert_eq!(metrics.pages[1].page_number, 2);
    }
}
