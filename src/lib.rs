mod batch;
mod canvas;
mod compose;
mod config;
mod debug;
mod doc_template;
mod error;
mod fields;
mod flowable;
mod font;
mod footer;
mod frame;
mod metrics;
mod normalize;
mod page_template;
mod pdf;
mod planner;
mod signature;
mod table;
mod types;

pub use batch::{
    BatchOptions, BatchRunner, BatchSummary, Dataset, FULL_REPORTS_DIR, INDIVIDUAL_RECORDS_DIR,
    footer_metadata, full_report_path, full_report_table, record_paths, record_table, records_dir,
};
pub use canvas::{Canvas, Command, Document, Page};
pub use compose::{Composer, DocumentRequest, LaidOutDocument, RenderedDocument};
pub use config::{FooterConfig, LayoutConfig};
use debug::DebugLogger;
pub use doc_template::DocTemplate;
pub use error::{Result, SheetError};
pub use fields::{
    FieldRole, FieldRoles, clean_title, naming_columns, record_stem, sanitize_filename,
};
pub use flowable::{
    BreakInside, FlexFlowable, FlexItem, Flowable, ImageFlowable, Pagination,
    Paragraph, Spacer, TableCell, TableFlowable, TableStyle, TextAlign, TextStyle, VerticalAlign,
};
pub use font::Base14Font;
pub use footer::{FooterMetadata, footer_flowable};
pub use frame::{AddResult, Frame};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use normalize::{
    Cell, EmbeddedImage, ImageCell, ImageColorSpace, ImageEncoding, ImageKind, MISSING_MARKER,
    Markup, RawValue, field_value, is_certification_label, normalize_cell, normalize_image,
    normalize_text, sniff_image, strip_enumeration,
};
pub use page_template::PageTemplate;
pub use pdf::{PdfOptions, document_to_pdf, document_to_pdf_with_metrics};
pub use planner::{ColumnWidthPlan, LayoutMode, LayoutPlan, PageGeometry, plan_layout};
pub use signature::{LocalSignatures, NoSignatures, SignatureSource, decode_data_uri};
pub use table::Table;
pub use types::{Color, Margins, Pt, Rect, Size};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Meta key carrying the source row number of every table row drawn; the header is `0`.
pub const META_TABLE_ROW_KEY: &str = "table.row";
/// Meta key carrying the page template name at the start of every page.
pub const META_PAGE_TEMPLATE_KEY: &str = "page.template";

pub struct RecordSheet {
    config: LayoutConfig,
    signatures: Arc<dyn SignatureSource>,
    debug: Option<DebugLogger>,
    options: BatchOptions,
    compress: bool,
}

#[derive(Clone)]
pub struct RecordSheetBuilder {
    config: LayoutConfig,
    config_path: Option<PathBuf>,
    signatures: Arc<dyn SignatureSource>,
    debug_path: Option<PathBuf>,
    options: BatchOptions,
    compress: bool,
}

impl RecordSheet {
    pub fn builder() -> RecordSheetBuilder {
        RecordSheetBuilder::new()
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    fn composer(&self) -> Composer<'_> {
        Composer::new(&self.config)
            .with_debug(self.debug.as_ref())
            .with_compression(self.compress)
    }

    fn runner(&self) -> BatchRunner<'_> {
        BatchRunner::new(&self.config, self.signatures.as_ref())
            .with_debug(self.debug.as_ref())
            .with_options(self.options)
            .with_compression(self.compress)
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_ref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    pub fn plan(&self, table: &Table, mode: LayoutMode) -> LayoutPlan {
        plan_layout(table, mode, &self.config)
    }

    pub fn layout(&self, request: &DocumentRequest<'_>) -> Result<LaidOutDocument> {
        let laid_out = self.composer().layout(request, request.title)?;
        self.emit_debug_summary(request.title);
        Ok(laid_out)
    }

    pub fn render_to_buffer(&self, request: &DocumentRequest<'_>) -> Result<Vec<u8>> {
        let rendered = self.composer().render(request, request.title)?;
        self.emit_debug_summary(request.title);
        Ok(rendered.pdf)
    }

    /// Write one document; on failure nothing is left at `path`.
    pub fn render_to_file(
        &self,
        request: &DocumentRequest<'_>,
        path: impl AsRef<Path>,
    ) -> Result<DocumentMetrics> {
        let rendered = self.composer().write(request, path.as_ref())?;
        self.emit_debug_summary(&path.as_ref().display().to_string());
        Ok(rendered.metrics)
    }

    /// Lay out the transposed full report for `dataset` without writing it.
    pub fn layout_full_report(&self, dataset: &Dataset) -> Result<LaidOutDocument> {
        let table = full_report_table(dataset, &self.config);
        let title = clean_title(&dataset.source_name);
        self.layout(&DocumentRequest {
            table: &table,
            mode: LayoutMode::Matrix,
            title: &title,
            footer: None,
        })
    }

    /// Lay out the individual record for row `record` (0-based) without writing it.
    pub fn layout_record(&self, dataset: &Dataset, record: usize) -> Result<LaidOutDocument> {
        let roles = FieldRoles::detect(&dataset.columns);
        let table = record_table(dataset, record, &roles, &self.config);
        let meta = footer_metadata(dataset, record, &roles, self.signatures.as_ref());
        let title = clean_title(&dataset.source_name);
        self.layout(&DocumentRequest {
            table: &table,
            mode: LayoutMode::FixedForm,
            title: &title,
            footer: Some(&meta),
        })
    }

    pub fn generate(&self, dataset: &Dataset, out_dir: impl AsRef<Path>) -> BatchSummary {
        self.runner().run_all(std::slice::from_ref(dataset), out_dir.as_ref())
    }

    pub fn generate_all(&self, datasets: &[Dataset], out_dir: impl AsRef<Path>) -> BatchSummary {
        self.runner().run_all(datasets, out_dir.as_ref())
    }
}

impl RecordSheetBuilder {
    pub fn new() -> Self {
        Self {
            config: LayoutConfig::default(),
            config_path: None,
            signatures: Arc::new(NoSignatures),
            debug_path: None,
            options: BatchOptions::default(),
            compress: true,
        }
    }

    pub fn config(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self.config_path = None;
        self
    }

    /// Load the layout configuration from a JSON file at build time.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn signatures(mut self, source: impl SignatureSource + 'static) -> Self {
        self.signatures = Arc::new(source);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.options.parallel = parallel;
        self
    }

    pub fn full_report(mut self, enabled: bool) -> Self {
        self.options.full_report = enabled;
        self
    }

    pub fn individual_records(mut self, enabled: bool) -> Self {
        self.options.individual_records = enabled;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    // JSON-lines trace of plans, page breaks and per-document counters.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<RecordSheet> {
        let config = match &self.config_path {
            Some(path) => LayoutConfig::from_json_file(path)?,
            None => self.config,
        };
        config.validate()?;
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(RecordSheet {
            config,
            signatures: self.signatures,
            debug,
            options: self.options,
            compress: self.compress,
        })
    }
}

impl Default for RecordSheetBuilder {
    fn default() -> Self {
        Self::new()
    }
}
