//! Dataset-level generation: one full report plus one individual record per row.

use crate::compose::{Composer, DocumentRequest};
use crate::config::LayoutConfig;
use crate::debug::DebugLogger;
use crate::error::{Result, SheetError};
use crate::fields::{FieldRoles, clean_title, naming_columns, record_stem, sanitize_filename};
use crate::footer::FooterMetadata;
use crate::normalize::{Cell, RawValue, field_value, strip_enumeration};
use crate::planner::LayoutMode;
use crate::signature::SignatureSource;
use crate::table::Table;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const FULL_REPORTS_DIR: &str = "Full_Reports";
pub const INDIVIDUAL_RECORDS_DIR: &str = "Individual_Records";

/// Rows and named columns as produced by the input reader.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Source file name without extension.
    pub source_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RawValue>>,
}

impl Dataset {
    pub fn new(source_name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source_name: source_name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row of text values.
    pub fn push_text_row<S: AsRef<str>>(&mut self, values: &[S]) {
        self.rows.push(
            values
                .iter()
                .map(|v| RawValue::Text(v.as_ref().to_string()))
                .collect(),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    fn value(&self, row: usize, column: usize) -> Option<&RawValue> {
        self.rows.get(row).and_then(|values| values.get(column))
    }

    fn text(&self, row: usize, column: usize) -> Option<&str> {
        match self.value(row, column)? {
            RawValue::Text(text) => Some(text.as_str()),
            RawValue::Image(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Render the individual records on the rayon pool.
    pub parallel: bool,
    pub full_report: bool,
    pub individual_records: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            full_report: true,
            individual_records: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub written: Vec<PathBuf>,
    /// Output path and reason for every document that could not be produced.
    pub failed: Vec<(PathBuf, String)>,
    /// Sources with nothing to render.
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn merge(&mut self, other: BatchSummary) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
    }

    fn record(&mut self, output: PathBuf, result: Result<()>) {
        match result {
            Ok(()) => self.written.push(output),
            Err(err) => {
                log::error!("{err}");
                let reason = match err {
                    SheetError::Generation { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.failed.push((output, reason));
            }
        }
    }
}

/// Transposed table: one row per source column, one column per record.
pub fn full_report_table(dataset: &Dataset, config: &LayoutConfig) -> Table {
    let mut header = vec![Cell::text("Sl. No."), Cell::text("Particulars")];
    header.extend((1..=dataset.rows.len()).map(|n| Cell::text(&format!("Rec {n}"))));
    let mut rows = vec![header];
    for (column, name) in dataset.columns.iter().enumerate() {
        let label = strip_enumeration(name);
        let mut row = vec![Cell::text(&(column + 1).to_string()), Cell::text(&label)];
        for record in 0..dataset.rows.len() {
            let raw = dataset
                .value(record, column)
                .cloned()
                .unwrap_or_else(|| RawValue::Text(String::new()));
            row.push(field_value(&label, &raw, config));
        }
        rows.push(row);
    }
    Table::from_rows(rows)
}

/// Sequence / label / value table for one record. Footer columns are left out and the
/// sequence counts only the fields that remain.
pub fn record_table(
    dataset: &Dataset,
    record: usize,
    roles: &FieldRoles,
    config: &LayoutConfig,
) -> Table {
    let mut rows = vec![vec![
        Cell::text("Sl. No."),
        Cell::text("Particulars"),
        Cell::text("Response"),
    ]];
    let fields = dataset
        .columns
        .iter()
        .enumerate()
        .filter(|(column, _)| !roles.is_footer_column(*column));
    for (counter, (column, name)) in fields.enumerate() {
        let label = strip_enumeration(name);
        let raw = dataset
            .value(record, column)
            .cloned()
            .unwrap_or_else(|| RawValue::Text(String::new()));
        rows.push(vec![
            Cell::text(&(counter + 1).to_string()),
            Cell::text(&label),
            field_value(&label, &raw, config),
        ]);
    }
    Table::from_rows(rows)
}

/// Footer values for one record. The signature lookup may fail; the record still renders.
pub fn footer_metadata(
    dataset: &Dataset,
    record: usize,
    roles: &FieldRoles,
    signatures: &dyn SignatureSource,
) -> FooterMetadata {
    let text = |column: Option<usize>| {
        column
            .and_then(|c| dataset.text(record, c))
            .map(str::to_string)
    };
    let signature = roles
        .signature
        .and_then(|column| dataset.value(record, column))
        .and_then(|raw| match raw {
            RawValue::Image(bytes) => bytes.clone(),
            RawValue::Text(reference) if reference.trim().is_empty() => None,
            RawValue::Text(reference) => signatures.fetch(reference),
        });
    FooterMetadata {
        name: text(roles.name),
        venue: text(roles.venue),
        date: text(roles.date),
        mobile: text(roles.mobile),
        signature,
    }
}

pub fn full_report_path(out_dir: &Path, source_name: &str) -> PathBuf {
    out_dir
        .join(FULL_REPORTS_DIR)
        .join(format!("{}_FULL_REPORT.pdf", sanitize_filename(source_name)))
}

pub fn records_dir(out_dir: &Path, source_name: &str) -> PathBuf {
    out_dir
        .join(INDIVIDUAL_RECORDS_DIR)
        .join(format!("{}_individual_records", sanitize_filename(source_name)))
}

/// One output path per row. Rows that would collide get `_2`, `_3`, ... appended.
pub fn record_paths(dataset: &Dataset, out_dir: &Path) -> Vec<PathBuf> {
    let dir = records_dir(out_dir, &dataset.source_name);
    let source = sanitize_filename(&dataset.source_name);
    let naming = naming_columns(&dataset.columns);
    let mut seen: HashSet<String> = HashSet::new();
    (0..dataset.rows.len())
        .map(|record| {
            let values: Vec<&str> = naming
                .iter()
                .take(2)
                .map(|column| dataset.text(record, *column).unwrap_or_default())
                .collect();
            let base = format!("{}_{source}", record_stem(&values, record + 1));
            let mut candidate = base.clone();
            let mut suffix = 2;
            while !seen.insert(candidate.to_lowercase()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            dir.join(format!("{candidate}.pdf"))
        })
        .collect()
}

pub struct BatchRunner<'a> {
    config: &'a LayoutConfig,
    signatures: &'a dyn SignatureSource,
    debug: Option<&'a DebugLogger>,
    options: BatchOptions,
    compress: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a LayoutConfig, signatures: &'a dyn SignatureSource) -> Self {
        Self {
            config,
            signatures,
            debug: None,
            options: BatchOptions::default(),
            compress: true,
        }
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    fn composer(&self) -> Composer<'a> {
        Composer::new(self.config)
            .with_debug(self.debug)
            .with_compression(self.compress)
    }

    /// Generate every document for `dataset` below `out_dir`. Failures are collected per
    /// document; they never stop the remaining documents.
    pub fn run(&self, dataset: &Dataset, out_dir: &Path) -> BatchSummary {
        let mut summary = BatchSummary::default();
        if dataset.is_empty() {
            log::info!("skipping {}: no rows", dataset.source_name);
            summary.skipped.push(dataset.source_name.clone());
            return summary;
        }
        let title = clean_title(&dataset.source_name);
        log::info!(
            "generating {} ({} records, {} fields)",
            dataset.source_name,
            dataset.rows.len(),
            dataset.columns.len()
        );

        if self.options.full_report {
            let output = full_report_path(out_dir, &dataset.source_name);
            let table = full_report_table(dataset, self.config);
            let request = DocumentRequest {
                table: &table,
                mode: LayoutMode::Matrix,
                title: &title,
                footer: None,
            };
            let result = self.composer().write(&request, &output).map(|_| ());
            if result.is_ok() {
                log::info!("full report saved: {}", output.display());
            }
            summary.record(output, result);
        }

        if self.options.individual_records {
            let roles = FieldRoles::detect(&dataset.columns);
            let paths = record_paths(dataset, out_dir);
            let render = |record: usize, output: &Path| -> Result<()> {
                let table = record_table(dataset, record, &roles, self.config);
                let meta = footer_metadata(dataset, record, &roles, self.signatures);
                let request = DocumentRequest {
                    table: &table,
                    mode: LayoutMode::FixedForm,
                    title: &title,
                    footer: Some(&meta),
                };
                self.composer().write(&request, output).map(|_| ())
            };

            let results: Vec<(usize, Result<()>)> = if self.options.parallel {
                use rayon::prelude::*;

                let mut results: Vec<(usize, Result<()>)> = paths
                    .par_iter()
                    .enumerate()
                    .map(|(record, output)| (record, render(record, output.as_path())))
                    .collect();
                results.sort_by_key(|(record, _)| *record);
                results
            } else {
                paths
                    .iter()
                    .enumerate()
                    .map(|(record, output)| (record, render(record, output.as_path())))
                    .collect()
            };
            for ((_, result), output) in results.into_iter().zip(paths.iter()) {
                summary.record(output.clone(), result);
            }
            log::info!(
                "individual records saved in {}",
                records_dir(out_dir, &dataset.source_name).display()
            );
        }

        if let Some(logger) = self.debug {
            logger.log_event(&json!({
                "type": "batch.dataset",
                "source": dataset.source_name,
                "written": summary.written.len(),
                "failed": summary.failed.len(),
            }));
            logger.emit_summary(&dataset.source_name);
            logger.flush();
        }
        summary
    }

    /// Run every dataset and log one completion line, whatever failed along the way.
    pub fn run_all(&self, datasets: &[Dataset], out_dir: &Path) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for dataset in datasets {
            summary.merge(self.run(dataset, out_dir));
        }
        log::info!(
            "processing complete: {} written, {} failed, {} skipped",
            summary.written.len(),
            summary.failed.len(),
            summary.skipped.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::NoSignatures;

    fn survey() -> Dataset {
        let mut dataset = Dataset::new(
            "Pre-Exam Report (Responses)",
            vec![
                "Timestamp".to_string(),
                "1. Name of Exam Venue".to_string(),
                "2. Observer Name".to_string(),
                "3) Mobile Number".to_string(),
                "4. Were papers sealed?".to_string(),
                "5. I hereby certify the above".to_string(),
            ],
        );
        dataset.push_text_row(&["2024-03-01", "Hall A", "Asha", "98765", "Yes", "nan"]);
        dataset.push_text_row(&["2024-03-01", "Hall B", "Ravi", "NaN", "No", ""]);
        dataset
    }

    fn text(cell: &Cell) -> String {
        cell.as_markup().map(|m| m.plain_text()).unwrap_or_default()
    }

    #[test]
    fn full_report_is_transposed() {
        let config = LayoutConfig::default();
        let table = full_report_table(&survey(), &config);
        assert_eq!(table.column_count(), 4);
        assert_eq!(table.row_count(), 7);
        let header: Vec<String> = table.header().unwrap().iter().map(text).collect();
        assert_eq!(header, vec!["Sl. No.", "Particulars", "Rec 1", "Rec 2"]);
        let venue: Vec<String> = table.body()[1].iter().map(text).collect();
        assert_eq!(venue, vec!["2", "Name of Exam Venue", "Hall A", "Hall B"]);
        let certify: Vec<String> = table.body()[5].iter().map(text).collect();
        assert_eq!(certify[2..], ["Yes", "Yes"]);
    }

    #[test]
    fn record_table_skips_footer_columns() {
        let config = LayoutConfig::default();
        let dataset = survey();
        let roles = FieldRoles::detect(&dataset.columns);
        let table = record_table(&dataset, 1, &roles, &config);
        let rows: Vec<Vec<String>> = table
            .rows()
            .iter()
            .map(|row| row.iter().map(text).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec!["Sl. No.", "Particulars", "Response"],
                vec!["1", "Were papers sealed?", "No"],
                vec!["2", "I hereby certify the above", "Yes"],
            ]
        );
    }

    #[test]
    fn footer_values_come_from_role_columns() {
        let dataset = survey();
        let roles = FieldRoles::detect(&dataset.columns);
        let meta = footer_metadata(&dataset, 0, &roles, &NoSignatures);
        assert_eq!(meta.venue.as_deref(), Some("Hall A"));
        assert_eq!(meta.name.as_deref(), Some("Asha"));
        assert_eq!(meta.date.as_deref(), Some("2024-03-01"));
        assert_eq!(meta.mobile.as_deref(), Some("98765"));
        assert_eq!(meta.signature, None);
    }

    #[test]
    fn record_paths_are_distinct() {
        let mut dataset = Dataset::new("Daily", vec!["Candidate Name".to_string()]);
        dataset.push_text_row(&["Asha Devi"]);
        dataset.push_text_row(&["Asha Devi"]);
        dataset.push_text_row(&[""]);
        let paths = record_paths(&dataset, Path::new("out"));
        let dir = Path::new("out")
            .join(INDIVIDUAL_RECORDS_DIR)
            .join("Daily_individual_records");
        assert_eq!(
            paths,
            vec![
                dir.join("Asha_Devi_Daily.pdf"),
                dir.join("Asha_Devi_Daily_2.pdf"),
                dir.join("Record_3_Daily.pdf"),
            ]
        );
    }

    #[test]
    fn empty_dataset_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = LayoutConfig::default();
        let dataset = Dataset::new("Empty", vec!["Name".to_string()]);
        let summary = BatchRunner::new(&config, &NoSignatures).run(&dataset, dir.path());
        assert_eq!(summary.skipped, vec!["Empty".to_string()]);
        assert!(summary.written.is_empty());
        assert!(!dir.path().join(FULL_REPORTS_DIR).exists());
    }

    #[test]
    fn writes_full_report_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = LayoutConfig::default();
        let summary = BatchRunner::new(&config, &NoSignatures)
            .with_options(BatchOptions {
                parallel: true,
                ..BatchOptions::default()
            })
            .run(&survey(), dir.path());
        assert!(summary.failed.is_empty(), "{:?}", summary.failed);
        assert_eq!(summary.written.len(), 3);
        let full = full_report_path(dir.path(), "Pre-Exam Report (Responses)");
        assert_eq!(summary.written[0], full);
        let doc = lopdf::Document::load(&full).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        for path in &summary.written[1..] {
            assert!(path.exists(), "{}", path.display());
        }
    }

    #[test]
    fn unwritable_destination_fails_one_document_only() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the full-report directory should be.
        std::fs::write(dir.path().join(FULL_REPORTS_DIR), b"").unwrap();
        let config = LayoutConfig::default();
        let summary = BatchRunner::new(&config, &NoSignatures).run_all(&[survey()], dir.path());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(
            summary.failed[0].0,
            full_report_path(dir.path(), "Pre-Exam Report (Responses)")
        );
        assert_eq!(summary.written.len(), 2);
    }
}
