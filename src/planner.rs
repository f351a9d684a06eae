//! Column widths and page geometry.
//!
//! Matrix widths come from character counts times a calibrated advance rather than from
//! measuring glyphs. It is an approximation, kept because it is cheap and stable; wrapping
//! inside the cells absorbs the error.

use crate::config::LayoutConfig;
use crate::normalize::Cell;
use crate::table::Table;
use crate::types::{Margins, Pt, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum LayoutMode {
    /// Transposed full report: one column per record, page grows with content.
    Matrix,
    /// Individual record: sequence / label / value on a fixed A4 page.
    FixedForm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnWidthPlan {
    widths: Vec<Pt>,
}

impl ColumnWidthPlan {
    pub fn widths(&self) -> &[Pt] {
        &self.widths
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn total(&self) -> Pt {
        self.widths.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_size: Size,
    pub margins: Margins,
}

impl PageGeometry {
    pub fn usable_width(&self) -> Pt {
        (self.page_size.width - self.margins.horizontal()).max(Pt::ZERO)
    }

    pub fn usable_height(&self) -> Pt {
        (self.page_size.height - self.margins.vertical()).max(Pt::ZERO)
    }

    pub fn content_rect(&self) -> Rect {
        Rect {
            x: self.margins.left,
            y: self.margins.top,
            width: self.usable_width(),
            height: self.usable_height(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub mode: LayoutMode,
    pub columns: ColumnWidthPlan,
    pub geometry: PageGeometry,
    /// Height the content is expected to need; only the matrix mode grows the page from it.
    pub estimated_height: Pt,
}

pub fn plan_layout(table: &Table, mode: LayoutMode, config: &LayoutConfig) -> LayoutPlan {
    match mode {
        LayoutMode::FixedForm => plan_fixed_form(config),
        LayoutMode::Matrix => plan_matrix(table, config),
    }
}

fn plan_fixed_form(config: &LayoutConfig) -> LayoutPlan {
    let geometry = PageGeometry {
        page_size: Size::a4(),
        margins: config.margins(),
    };
    let usable = geometry.usable_width();
    let widths = config
        .fixed_form_proportions
        .iter()
        .map(|share| usable * *share)
        .collect();
    LayoutPlan {
        mode: LayoutMode::FixedForm,
        columns: ColumnWidthPlan { widths },
        geometry,
        estimated_height: geometry.page_size.height,
    }
}

fn plan_matrix(table: &Table, config: &LayoutConfig) -> LayoutPlan {
    let baseline = Size::letter();
    let margins = config.margins();
    let mut geometry = PageGeometry {
        page_size: baseline,
        margins,
    };
    if table.is_empty() {
        return LayoutPlan {
            mode: LayoutMode::Matrix,
            columns: ColumnWidthPlan { widths: Vec::new() },
            geometry,
            estimated_height: baseline.height,
        };
    }

    let columns = table.column_count();
    let mut widths: Vec<Pt> = (0..columns)
        .map(|index| natural_column_width(table, index, config))
        .collect();

    let usable = geometry.usable_width();
    let natural_total: Pt = widths.iter().sum();
    if natural_total < usable {
        spread_slack(&mut widths, usable - natural_total);
    } else {
        geometry.page_size.width = baseline.width.max(natural_total + margins.horizontal());
    }

    let estimated_height = Pt::from_f32(config.row_height_estimate) * (table.row_count() as i32)
        + Pt::from_f32(config.height_overhead);
    geometry.page_size.height = baseline.height.max(estimated_height);

    log::debug!(
        "matrix plan: {} columns, natural {:.1}pt, page {:.1}x{:.1}pt",
        columns,
        natural_total.to_f32(),
        geometry.page_size.width.to_f32(),
        geometry.page_size.height.to_f32()
    );

    LayoutPlan {
        mode: LayoutMode::Matrix,
        columns: ColumnWidthPlan { widths },
        geometry,
        estimated_height,
    }
}

fn natural_column_width(table: &Table, index: usize, config: &LayoutConfig) -> Pt {
    let char_width = Pt::from_f32(config.char_width);
    let padding = config.padding() * 2;
    table
        .column(index)
        .map(|cell| match cell {
            Cell::Text(_) => char_width * (cell.content_chars() as i32),
            Cell::Image(image) => image.width + padding,
        })
        .fold(Pt::from_f32(config.min_column_width), Pt::max)
}

// Even split in milli-points; the first columns absorb the remainder so the sum is exact.
fn spread_slack(widths: &mut [Pt], slack: Pt) {
    let count = widths.len() as i64;
    if count == 0 {
        return;
    }
    let slack = slack.to_milli_i64();
    let share = slack / count;
    let remainder = slack % count;
    for (index, width) in widths.iter_mut().enumerate() {
        let extra = share + i64::from((index as i64) < remainder);
        *width = Pt::from_milli_i64(width.to_milli_i64() + extra);
    }
}
