use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageMetrics {
    pub page_number: usize,
    pub render_ms: f64,
    pub command_count: usize,
    pub flowable_count: usize,
    /// Table rows drawn on this page, repeated header rows included.
    pub table_rows: usize,
    pub content_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_render_ms: f64,
    pub total_bytes: usize,
}

impl DocumentMetrics {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
