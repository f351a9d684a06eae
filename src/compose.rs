//! Turns a normalized [`Table`] into a paginated document: title block, data table with a
//! repeating header row and, for individual records, the attestation footer.

use crate::canvas::Document;
use crate::config::LayoutConfig;
use crate::debug::DebugLogger;
use crate::doc_template::DocTemplate;
use crate::error::{Result, SheetError};
use crate::flowable::{
    Flowable, ImageFlowable, Paragraph, Spacer, TableCell, TableFlowable, TableStyle, TextAlign,
    TextStyle, VerticalAlign,
};
use crate::font::Base14Font;
use crate::footer::{FooterMetadata, footer_flowable};
use crate::metrics::DocumentMetrics;
use crate::normalize::Cell;
use crate::page_template::PageTemplate;
use crate::pdf::{PdfOptions, document_to_pdf_with_metrics};
use crate::planner::{LayoutMode, LayoutPlan, plan_layout};
use crate::table::Table;
use crate::types::Pt;
use serde_json::json;
use std::io::Write;
use std::path::Path;

/// One document to lay out.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRequest<'a> {
    pub table: &'a Table,
    pub mode: LayoutMode,
    pub title: &'a str,
    pub footer: Option<&'a FooterMetadata>,
}

pub struct RenderedDocument {
    pub pdf: Vec<u8>,
    pub plan: LayoutPlan,
    pub metrics: DocumentMetrics,
}

pub struct LaidOutDocument {
    pub document: Document,
    pub plan: LayoutPlan,
    pub metrics: DocumentMetrics,
}

pub struct Composer<'a> {
    config: &'a LayoutConfig,
    debug: Option<&'a DebugLogger>,
    compress: bool,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self {
            config,
            debug: None,
            compress: true,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn layout(&self, request: &DocumentRequest<'_>, label: &str) -> Result<LaidOutDocument> {
        let plan = plan_layout(request.table, request.mode, self.config);
        let geometry = plan.geometry;
        if geometry.usable_width() <= Pt::ZERO || geometry.usable_height() <= Pt::ZERO {
            return Err(SheetError::InvalidGeometry(format!(
                "margins leave no room on a {}x{}pt page",
                geometry.page_size.width.to_f32(),
                geometry.page_size.height.to_f32()
            )));
        }
        let expected = self.config.fixed_form_proportions.len();
        if request.mode == LayoutMode::FixedForm
            && !request.table.is_empty()
            && request.table.column_count() != expected
        {
            return Err(SheetError::InvalidGeometry(format!(
                "fixed-form tables have {expected} columns, got {}",
                request.table.column_count()
            )));
        }
        if let Some(logger) = self.debug {
            logger.log_event(&json!({
                "type": "layout.plan",
                "document": label,
                "mode": plan.mode,
                "columns": plan.columns.widths().iter().map(|w| w.to_f32()).collect::<Vec<_>>(),
                "page": [geometry.page_size.width.to_f32(), geometry.page_size.height.to_f32()],
                "estimated_height": plan.estimated_height.to_f32(),
            }));
        }

        let template_name = match request.mode {
            LayoutMode::Matrix => "matrix",
            LayoutMode::FixedForm => "fixed-form",
        };
        let mut doc = DocTemplate::new(PageTemplate::from_geometry(template_name, &geometry));
        if let Some(logger) = self.debug {
            doc = doc.with_debug(logger.clone(), label);
        }
        for flowable in title_block(request.title, self.config) {
            doc.add_flowable(flowable);
        }
        if let Some(table) = data_table(request.table, &plan, self.config) {
            doc.add_flowable(Box::new(table));
        }
        if let Some(meta) = request.footer {
            doc.add_flowable(Box::new(Spacer::new(self.config.footer.spacer)));
            doc.add_flowable(Box::new(footer_flowable(
                meta,
                geometry.usable_width(),
                self.config,
            )));
        }

        let (document, metrics) = doc.build_with_metrics()?;
        Ok(LaidOutDocument {
            document,
            plan,
            metrics,
        })
    }

    pub fn render(&self, request: &DocumentRequest<'_>, label: &str) -> Result<RenderedDocument> {
        let LaidOutDocument {
            document,
            plan,
            mut metrics,
        } = self.layout(request, label)?;
        let options = PdfOptions {
            title: Some(request.title.to_string()),
            compress: self.compress,
        };
        let pdf = document_to_pdf_with_metrics(&document, &options, Some(&mut metrics))?;
        log::debug!(
            "{label}: {} page(s), {} bytes, {:.2}ms layout",
            metrics.page_count(),
            metrics.total_bytes,
            metrics.total_render_ms
        );
        if let Some(logger) = self.debug {
            logger.log_event(&json!({
                "type": "document.metrics",
                "document": label,
                "metrics": metrics,
            }));
        }
        Ok(RenderedDocument { pdf, plan, metrics })
    }

    /// Render and write to `output`. Every failure is reported as a generation error naming
    /// `output`, and nothing is left at `output` unless the whole document was written.
    pub fn write(&self, request: &DocumentRequest<'_>, output: &Path) -> Result<RenderedDocument> {
        let label = output.display().to_string();
        let rendered = self
            .render(request, &label)
            .map_err(|err| SheetError::generation(output, err))?;
        persist_atomically(&rendered.pdf, output)
            .map_err(|err| SheetError::generation(output, err))?;
        Ok(rendered)
    }
}

fn persist_atomically(bytes: &[u8], output: &Path) -> std::io::Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(output).map_err(|err| err.error)?;
    Ok(())
}

fn title_block(title: &str, config: &LayoutConfig) -> Vec<Box<dyn Flowable>> {
    let bold = Base14Font::from_name(&config.bold_font);
    let regular = Base14Font::from_name(&config.regular_font);
    let line = |text: &str, font: Base14Font, size: f32| {
        let size = Pt::from_f32(size);
        Paragraph::from_text(text)
            .with_style(TextStyle::new(font, size, size * 1.2).with_color(config.text_color))
            .with_align(TextAlign::Center)
    };

    let mut blocks: Vec<Box<dyn Flowable>> = Vec::new();
    if !config.organization.trim().is_empty() {
        blocks.push(Box::new(line(&config.organization, bold, config.organization_size)));
        blocks.push(Box::new(Spacer::new(config.title_gap)));
    }
    if !config.subtitle.trim().is_empty() {
        let subtitle = line(&config.subtitle, regular, config.subtitle_size);
        let style = subtitle.style().clone().underlined();
        blocks.push(Box::new(subtitle.with_style(style)));
        blocks.push(Box::new(Spacer::new(config.title_gap)));
    }
    if !title.trim().is_empty() {
        blocks.push(Box::new(line(title, bold, config.title_size)));
    }
    blocks.push(Box::new(Spacer::new(config.title_block_gap)));
    blocks
}

/// Header row is bold on the configured background; column 0 is centered.
fn data_table(table: &Table, plan: &LayoutPlan, config: &LayoutConfig) -> Option<TableFlowable> {
    let header = table.header()?;
    if plan.columns.is_empty() {
        return None;
    }
    let size = config.font_size_pt();
    let leading = config.leading_pt();
    let regular = TextStyle::new(Base14Font::from_name(&config.regular_font), size, leading)
        .with_color(config.text_color);
    let bold = TextStyle::new(Base14Font::from_name(&config.bold_font), size, leading)
        .with_color(config.text_color);

    let to_cells = |row: &[Cell], style: &TextStyle| -> Vec<TableCell> {
        row.iter()
            .enumerate()
            .map(|(column, cell)| {
                let align = if column == 0 {
                    TextAlign::Center
                } else {
                    TextAlign::Left
                };
                match cell {
                    Cell::Text(markup) => TableCell::text(
                        Paragraph::new(markup)
                            .with_style(style.clone())
                            .with_align(align),
                    ),
                    Cell::Image(image) => TableCell::image(
                        ImageFlowable::new(image.image.clone(), image.width, image.height),
                        align,
                    ),
                }
            })
            .collect()
    };

    let rows = table.body().iter().map(|row| to_cells(row, &regular)).collect();
    Some(
        TableFlowable::new(plan.columns.widths().to_vec(), rows)
            .with_header(to_cells(header, &bold))
            .repeat_header(true)
            .with_style(TableStyle {
                padding: config.padding(),
                grid_width: Pt::from_f32(config.grid_width),
                grid_color: config.grid_color,
                header_background: Some(config.header_background),
                valign: VerticalAlign::Top,
            }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn form_table(rows: usize) -> Table {
        let mut data = vec![vec![
            Cell::text("Sl. No."),
            Cell::text("Particulars"),
            Cell::text("Response"),
        ]];
        for i in 1..=rows {
            data.push(vec![
                Cell::text(&i.to_string()),
                Cell::text(&format!("Question {i}")),
                Cell::text("A fairly long answer that needs to wrap inside its cell at least once."),
            ]);
        }
        Table::from_rows(data)
    }

    #[test]
    fn title_block_comes_first() {
        let config = LayoutConfig::default();
        let table = form_table(2);
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: "PRE-EXAM REPORT",
            footer: None,
        };
        let laid_out = Composer::new(&config).layout(&request, "t").unwrap();
        let page = &laid_out.document.pages[0];
        let texts: Vec<&str> = page.strings().collect();
        assert_eq!(
            &texts[..4],
            &[
                "ARUNACHAL PRADESH PUBLIC SERVICE COMMISSION",
                "OBSERVER REPORT",
                "PRE-EXAM REPORT",
                "Sl. No."
            ]
        );
        assert_eq!(laid_out.document.page_size, Size::a4());
    }

    #[test]
    fn header_row_is_bold_and_shaded() {
        let config = LayoutConfig::default();
        let table = form_table(1);
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: "T",
            footer: None,
        };
        let laid_out = Composer::new(&config).layout(&request, "t").unwrap();
        let commands = &laid_out.document.pages[0].commands;
        let header_at = commands
            .iter()
            .position(|c| matches!(c, Command::DrawString { text, .. } if text == "Sl. No."))
            .unwrap();
        let font_before = commands[..header_at].iter().rev().find_map(|c| match c {
            Command::SetFontName(name) => Some(name.as_str()),
            _ => None,
        });
        assert_eq!(font_before, Some("Helvetica-Bold"));
        assert!(
            commands[..header_at]
                .iter()
                .any(|c| matches!(c, Command::SetFillColor(color) if *color == config.header_background))
        );
    }

    #[test]
    fn long_form_repeats_header_on_continuation_pages() {
        let config = LayoutConfig::default();
        let table = form_table(80);
        let meta = FooterMetadata::default();
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: "T",
            footer: Some(&meta),
        };
        let laid_out = Composer::new(&config).layout(&request, "t").unwrap();
        assert!(laid_out.document.pages.len() >= 2);
        for page in &laid_out.document.pages {
            let rows: Vec<&str> = page.meta_values(crate::META_TABLE_ROW_KEY).collect();
            if rows.is_empty() {
                continue;
            }
            assert_eq!(rows[0], "0");
        }
        let last = laid_out.document.pages.last().unwrap();
        assert!(last.strings().any(|s| s == "Exam Venue:"));
    }

    #[test]
    fn zero_margin_room_is_invalid_geometry() {
        let config = LayoutConfig {
            margin: 400.0,
            ..LayoutConfig::default()
        };
        let table = form_table(1);
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: "T",
            footer: None,
        };
        let err = Composer::new(&config).write(&request, Path::new("never.pdf"));
        match err {
            Err(SheetError::Generation { output, reason }) => {
                assert_eq!(output, Path::new("never.pdf"));
                assert!(reason.contains("invalid geometry"), "{reason}");
            }
            _ => panic!("expected generation error"),
        }
        assert!(!Path::new("never.pdf").exists());
    }

    #[test]
    fn fixed_form_needs_three_columns() {
        let config = LayoutConfig::default();
        let row = |prefix: &str| -> Vec<Cell> {
            (1..=5).map(|i| Cell::text(&format!("{prefix}{i}"))).collect()
        };
        let table = Table::from_rows(vec![row("Head"), row("Value")]);
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: "T",
            footer: None,
        };
        let err = Composer::new(&config).layout(&request, "t").err().unwrap();
        assert!(matches!(err, SheetError::InvalidGeometry(_)), "{err}");

        let matrix = DocumentRequest {
            mode: LayoutMode::Matrix,
            ..request
        };
        let laid_out = Composer::new(&config).layout(&matrix, "t").unwrap();
        assert!(laid_out.document.pages[0].strings().any(|s| s == "Value5"));
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested").join("report.pdf");
        let config = LayoutConfig::default();
        let table = form_table(3);
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::Matrix,
            title: "T",
            footer: None,
        };
        let rendered = Composer::new(&config).write(&request, &output).unwrap();
        let on_disk = std::fs::read(&output).unwrap();
        assert_eq!(on_disk, rendered.pdf);
        let leftovers = std::fs::read_dir(output.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
        assert_eq!(rendered.metrics.total_bytes, on_disk.len());
    }

    #[test]
    fn trace_carries_document_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let config = LayoutConfig::default();
        let table = form_table(2);
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: "T",
            footer: None,
        };
        let rendered = Composer::new(&config)
            .with_debug(Some(&logger))
            .render(&request, "record")
            .unwrap();
        logger.flush();
        let raw = std::fs::read_to_string(&path).unwrap();
        let event: serde_json::Value = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .find(|event| event["type"] == "document.metrics")
            .unwrap();
        assert_eq!(event["document"], "record");
        assert_eq!(event["metrics"]["total_bytes"], rendered.pdf.len());
        assert_eq!(event["metrics"]["pages"][0]["page_number"], 1);
    }

    #[test]
    fn empty_table_still_renders_title() {
        let config = LayoutConfig::default();
        let table = Table::default();
        let request = DocumentRequest {
            table: &table,
            mode: LayoutMode::Matrix,
            title: "EMPTY",
            footer: None,
        };
        let rendered = Composer::new(&config).render(&request, "t").unwrap();
        let doc = lopdf::Document::load_mem(&rendered.pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
