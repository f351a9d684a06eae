use crate::canvas::{Canvas, Document};
use crate::debug::DebugLogger;
use crate::error::{Result, SheetError};
use crate::flowable::Flowable;
use crate::frame::{AddResult, Frame};
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::page_template::PageTemplate;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Instant;

pub struct DocTemplate {
    page_template: PageTemplate,
    story: Vec<Box<dyn Flowable>>,
    debug: Option<DebugLogger>,
    debug_label: Option<String>,
}

struct PageState {
    number: usize,
    frame: Frame,
    placed: bool,
    flowables: usize,
    started: Instant,
}

impl DocTemplate {
    /// Every page of the document uses `page_template`.
    pub fn new(page_template: PageTemplate) -> Self {
        Self {
            page_template,
            story: Vec::new(),
            debug: None,
            debug_label: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: DebugLogger, label: impl Into<String>) -> Self {
        self.debug = Some(debug);
        self.debug_label = Some(label.into());
        self
    }

    pub fn add_flowable(&mut self, flowable: Box<dyn Flowable>) {
        self.story.push(flowable);
    }

    pub fn build(self) -> Result<Document> {
        Ok(self.build_with_metrics()?.0)
    }

    fn log_page_break(&self, from_page: usize, reason: &str, flowable: &str) {
        log::trace!("page break after page {from_page}: {reason} ({flowable})");
        let Some(logger) = self.debug.as_ref() else {
            return;
        };
        logger.log_event(&json!({
            "type": "layout.page_break",
            "document": self.debug_label,
            "reason": reason,
            "from_page": from_page,
            "to_page": from_page + 1,
            "flowable": flowable,
        }));
        logger.increment("layout.page_break", 1);
    }

    fn start_page(&self, canvas: &mut Canvas, number: usize) -> PageState {
        canvas.meta(crate::META_PAGE_TEMPLATE_KEY, self.page_template.name.clone());
        PageState {
            number,
            frame: self.page_template.instantiate_frame(),
            placed: false,
            flowables: 0,
            started: Instant::now(),
        }
    }

    fn finish_page(canvas: &mut Canvas, page: &PageState, metrics: &mut DocumentMetrics) {
        let elapsed = page.started.elapsed().as_secs_f64() * 1000.0;
        metrics.total_render_ms += elapsed;
        metrics.pages.push(PageMetrics {
            page_number: page.number,
            render_ms: elapsed,
            command_count: canvas.current_command_count(),
            flowable_count: page.flowables,
            table_rows: canvas.current_meta_count(crate::META_TABLE_ROW_KEY),
            content_bytes: 0,
        });
        canvas.show_page();
    }

    fn next_page(
        &self,
        canvas: &mut Canvas,
        page: &mut PageState,
        metrics: &mut DocumentMetrics,
        reason: &str,
        flowable: &str,
    ) {
        self.log_page_break(page.number, reason, flowable);
        Self::finish_page(canvas, page, metrics);
        *page = self.start_page(canvas, page.number + 1);
    }

    pub fn build_with_metrics(mut self) -> Result<(Document, DocumentMetrics)> {
        let mut canvas = Canvas::new(self.page_template.page_size);
        let mut metrics = DocumentMetrics::default();
        let mut page = self.start_page(&mut canvas, 1);
        let mut story: VecDeque<Box<dyn Flowable>> = std::mem::take(&mut self.story).into();

        while let Some(flowable) = story.pop_front() {
            let mut current = flowable;
            loop {
                let name = current.debug_name();
                let frame_rect = page.frame.rect();
                let unplaceable_details = (!page.placed).then(|| {
                    let size = current.wrap(frame_rect.width, frame_rect.height);
                    format!(
                        "{} size={}x{}pt frame={}x{}pt",
                        name,
                        size.width.to_f32(),
                        size.height.to_f32(),
                        frame_rect.width.to_f32(),
                        frame_rect.height.to_f32(),
                    )
                });

                match page.frame.add(current, &mut canvas) {
                    AddResult::Placed => {
                        page.placed = true;
                        page.flowables += 1;
                        break;
                    }
                    AddResult::Split(remaining) => {
                        page.placed = true;
                        page.flowables += 1;
                        current = remaining;
                        self.next_page(&mut canvas, &mut page, &mut metrics, "flowable_split", name);
                    }
                    AddResult::Overflow(remaining) => {
                        if let Some(details) = unplaceable_details {
                            return Err(SheetError::UnplaceableFlowable(details));
                        }
                        current = remaining;
                        self.next_page(&mut canvas, &mut page, &mut metrics, "frame_overflow", name);
                    }
                }
            }
        }

        Self::finish_page(&mut canvas, &page, &mut metrics);
        if let Some(logger) = self.debug.as_ref() {
            logger.increment("layout.pages", metrics.pages.len() as u64);
        }
        Ok((canvas.finish_without_show(), metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::{Paragraph, Spacer, TableCell, TableFlowable};
    use crate::types::{Pt, Rect, Size};

    fn template(height: f32) -> PageTemplate {
        PageTemplate::new(
            "test",
            Size::letter(),
            Rect {
                x: Pt::from_f32(40.0),
                y: Pt::from_f32(40.0),
                width: Pt::from_f32(300.0),
                height: Pt::from_f32(height),
            },
        )
    }

    #[test]
    fn empty_story_yields_one_page() {
        let (document, metrics) = DocTemplate::new(template(100.0))
            .build_with_metrics()
            .unwrap();
        assert_eq!(document.pages.len(), 1);
        assert_eq!(metrics.page_count(), 1);
    }

    #[test]
    fn overflow_starts_new_pages() {
        let mut doc = DocTemplate::new(template(100.0));
        for _ in 0..5 {
            doc.add_flowable(Box::new(Spacer::new(40.0)));
        }
        let (document, metrics) = doc.build_with_metrics().unwrap();
        assert_eq!(document.pages.len(), 3);
        assert_eq!(metrics.pages[0].flowable_count, 2);
        assert_eq!(metrics.pages[2].flowable_count, 1);
        for page in &document.pages {
            assert_eq!(
                page.meta_values(crate::META_PAGE_TEMPLATE_KEY).collect::<Vec<_>>(),
                vec!["test"]
            );
        }
    }

    #[test]
    fn long_table_repeats_header_on_every_page() {
        let rows: Vec<Vec<TableCell>> = (1..=60)
            .map(|i| {
                vec![
                    TableCell::text(Paragraph::from_text(&i.to_string())),
                    TableCell::text(Paragraph::from_text("answer")),
                ]
            })
            .collect();
        let table = TableFlowable::new(vec![Pt::from_f32(50.0), Pt::from_f32(250.0)], rows)
            .with_header(vec![
                TableCell::text(Paragraph::from_text("Sl. No.")),
                TableCell::text(Paragraph::from_text("Particulars")),
            ])
            .repeat_header(true);
        let mut doc = DocTemplate::new(template(200.0));
        doc.add_flowable(Box::new(table));
        let (document, metrics) = doc.build_with_metrics().unwrap();
        assert!(document.pages.len() > 1);
        let mut seen = Vec::new();
        for page in &document.pages {
            let rows: Vec<&str> = page.meta_values(crate::META_TABLE_ROW_KEY).collect();
            assert_eq!(rows.first(), Some(&"0"));
            seen.extend(rows.into_iter().filter(|r| *r != "0"));
        }
        assert_eq!(seen.len(), 60);
        assert_eq!(
            metrics.pages.iter().map(|p| p.table_rows).sum::<usize>(),
            60 + document.pages.len()
        );
    }

    #[test]
    fn debug_trace_records_page_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let mut doc = DocTemplate::new(template(50.0)).with_debug(logger.clone(), "doc");
        doc.add_flowable(Box::new(Spacer::new(40.0)));
        doc.add_flowable(Box::new(Spacer::new(40.0)));
        doc.build().unwrap();
        logger.flush();
        let raw = std::fs::read_to_string(&path).unwrap();
        let event: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(event["type"], "layout.page_break");
        assert_eq!(event["reason"], "frame_overflow");
        assert_eq!(event["document"], "doc");
    }
}
