use crate::normalize::Cell;

/// Rectangular grid of cells. Row 0 is the header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Vec<Cell>>,
    columns: usize,
}

impl Table {
    /// Ragged input is padded with empty cells to the widest row.
    pub fn from_rows(mut rows: Vec<Vec<Cell>>) -> Self {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize_with(columns, Cell::empty);
        }
        Self { rows, columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns == 0
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn header(&self) -> Option<&[Cell]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn body(&self) -> &[Vec<Cell>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_padded() {
        let table = Table::from_rows(vec![
            vec![Cell::text("a"), Cell::text("b"), Cell::text("c")],
            vec![Cell::text("1")],
        ]);
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows()[1].len(), 3);
        assert_eq!(table.rows()[1][2], Cell::empty());
        assert_eq!(table.body().len(), 1);
    }

    #[test]
    fn empty_table() {
        let table = Table::from_rows(Vec::new());
        assert!(table.is_empty());
        assert!(table.header().is_none());
        assert!(table.body().is_empty());
        assert_eq!(table.column(0).count(), 0);
    }
}
