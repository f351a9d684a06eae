use crate::canvas::Canvas;
use crate::font::Base14Font;
use crate::normalize::{EmbeddedImage, Markup};
use crate::types::{Color, Pt, Size};
use std::sync::Arc;

fn huge_pt() -> Pt {
    Pt::from_f32(1_000_000.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakInside {
    Auto,
    /// Move to the next page rather than split, unless the page is already empty.
    Avoid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub break_inside: BreakInside,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            break_inside: BreakInside::Auto,
        }
    }
}

pub trait Flowable: FlowableClone + Send + Sync {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size;
    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)>;
    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt);

    /// Split for a frame that already holds content. Returning `None` moves the whole
    /// flowable to the next frame.
    fn split_below_content(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        self.split(avail_width, avail_height)
    }

    fn pagination(&self) -> Pagination {
        Pagination::default()
    }

    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait FlowableClone {
    fn clone_box(&self) -> Box<dyn Flowable>;
}

impl<T> FlowableClone for T
where
    T: 'static + Flowable + Clone,
{
    fn clone_box(&self) -> Box<dyn Flowable> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Flowable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: Base14Font,
    pub font_size: Pt,
    pub leading: Pt,
    pub color: Color,
    pub underline: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: Base14Font::Helvetica,
            font_size: Pt::from_f32(10.0),
            leading: Pt::from_f32(12.0),
            color: Color::BLACK,
            underline: false,
        }
    }
}

impl TextStyle {
    pub fn new(font: Base14Font, font_size: Pt, leading: Pt) -> Self {
        Self {
            font,
            font_size,
            leading,
            ..Self::default()
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn underlined(mut self) -> Self {
        self.underline = true;
        self
    }

    fn measure(&self, text: &str) -> Pt {
        self.font.measure(self.font_size, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Top,
    Middle,
    Bottom,
}

fn align_offset(align: TextAlign, avail: Pt, used: Pt) -> Pt {
    let slack = (avail - used).max(Pt::ZERO);
    match align {
        TextAlign::Left => Pt::ZERO,
        TextAlign::Center => slack.mul_ratio(1, 2),
        TextAlign::Right => slack,
    }
}

fn valign_offset(align: VerticalAlign, avail: Pt, used: Pt) -> Pt {
    let slack = (avail - used).max(Pt::ZERO);
    match align {
        VerticalAlign::Top => Pt::ZERO,
        VerticalAlign::Middle => slack.mul_ratio(1, 2),
        VerticalAlign::Bottom => slack,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LineLayout {
    text: String,
    width: Pt,
}

/// Word-wrapped block of text in a single style. Explicit breaks from the [`Markup`] are
/// kept; words wider than the line are broken between characters.
#[derive(Debug, Clone)]
pub struct Paragraph {
    lines: Vec<String>,
    style: TextStyle,
    align: TextAlign,
    pagination: Pagination,
}

impl Paragraph {
    pub fn new(markup: &Markup) -> Self {
        Self::from_lines(markup.lines())
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(&Markup::escape(text))
    }

    fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            style: TextStyle::default(),
            align: TextAlign::Left,
            pagination: Pagination::default(),
        }
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    pub fn align(&self) -> TextAlign {
        self.align
    }

    fn layout_lines(&self, avail_width: Pt) -> Vec<LineLayout> {
        let max_width = avail_width.max(Pt::from_f32(1.0));
        let space_width = self.style.measure(" ");
        let mut lines: Vec<String> = Vec::new();
        for segment in &self.lines {
            // Split on plain spaces only so non-breaking padding stays glued together.
            let words: Vec<&str> = segment.split(' ').filter(|w| !w.is_empty()).collect();
            if words.is_empty() {
                lines.push(String::new());
                continue;
            }
            let mut current = String::new();
            let mut current_width = Pt::ZERO;
            for word in words {
                let word_width = self.style.measure(word);
                if !current.is_empty() {
                    let next_width = current_width + space_width + word_width;
                    if next_width <= max_width {
                        current.push(' ');
                        current.push_str(word);
                        current_width = next_width;
                        continue;
                    }
                    lines.push(std::mem::take(&mut current));
                }
                if word_width > max_width {
                    let mut pieces = self.split_long_word(word, max_width);
                    if let Some(last) = pieces.pop() {
                        lines.extend(pieces);
                        current_width = self.style.measure(&last);
                        current = last;
                    }
                } else {
                    current.push_str(word);
                    current_width = word_width;
                }
            }
            if !current.is_empty() {
                lines.push(current);
            }
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
            .into_iter()
            .map(|text| LineLayout {
                width: self.style.measure(&text),
                text,
            })
            .collect()
    }

    fn split_long_word(&self, word: &str, max_width: Pt) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut current_width = Pt::ZERO;
        for ch in word.chars() {
            let mut buf = [0u8; 4];
            let ch_width = self.style.measure(ch.encode_utf8(&mut buf));
            if !current.is_empty() && current_width + ch_width > max_width {
                pieces.push(std::mem::take(&mut current));
                current_width = Pt::ZERO;
            }
            current.push(ch);
            current_width += ch_width;
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    fn with_same_style(&self, lines: Vec<String>) -> Paragraph {
        Paragraph {
            lines,
            style: self.style.clone(),
            align: self.align,
            pagination: self.pagination,
        }
    }

    /// Blank paragraph carrying this one's style, used for the remainder of a split row.
    fn emptied(&self) -> Paragraph {
        self.with_same_style(vec![String::new()])
    }
}

impl Flowable for Paragraph {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let lines = self.layout_lines(avail_width);
        let height = self.style.leading * (lines.len() as i32);
        let width = lines
            .iter()
            .fold(Pt::ZERO, |acc, line| acc.max(line.width))
            .min(avail_width);
        Size { width, height }
    }

    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let (first, second) = self.split_lines(avail_width, avail_height)?;
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let lines = self.layout_lines(avail_width);
        canvas.set_fill_color(self.style.color);
        canvas.set_font_name(self.style.font.pdf_name());
        canvas.set_font_size(self.style.font_size);

        let mut cursor_y = y;
        for line in &lines {
            let offset = align_offset(self.align, avail_width, line.width);
            if !line.text.is_empty() {
                canvas.draw_string(x + offset, cursor_y, line.text.clone());
            }
            if self.style.underline {
                draw_underline(canvas, &self.style, x + offset, cursor_y, line.width);
            }
            cursor_y += self.style.leading;
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }
}

impl Paragraph {
    fn split_lines(&self, avail_width: Pt, avail_height: Pt) -> Option<(Paragraph, Paragraph)> {
        let lines = self.layout_lines(avail_width);
        let lh = self.style.leading.to_milli_i64();
        let ah = avail_height.to_milli_i64();
        if lh <= 0 || ah <= 0 {
            return None;
        }
        let max_lines = (ah / lh) as usize;
        if max_lines == 0 || max_lines >= lines.len() {
            return None;
        }
        let (head, tail) = lines.split_at(max_lines);
        let collect = |part: &[LineLayout]| part.iter().map(|l| l.text.clone()).collect();
        Some((
            self.with_same_style(collect(head)),
            self.with_same_style(collect(tail)),
        ))
    }
}

fn draw_underline(canvas: &mut Canvas, style: &TextStyle, x: Pt, y: Pt, width: Pt) {
    if width <= Pt::ZERO {
        return;
    }
    let baseline = y + style.font_size;
    let underline_y = baseline + style.font_size.mul_ratio(1, 10);
    canvas.save_state();
    canvas.set_stroke_color(style.color);
    canvas.set_line_width((style.font_size * 0.05).max(Pt::from_f32(0.5)));
    canvas.move_to(x, underline_y);
    canvas.line_to(x + width, underline_y);
    canvas.stroke();
    canvas.restore_state();
}

#[derive(Debug, Clone)]
pub struct Spacer {
    height: Pt,
}

impl Spacer {
    pub fn new(height: f32) -> Self {
        Self::new_pt(Pt::from_f32(height))
    }

    pub fn new_pt(height: Pt) -> Self {
        Self { height }
    }
}

impl Flowable for Spacer {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.height.max(Pt::ZERO),
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}
}

#[derive(Debug, Clone)]
pub struct ImageFlowable {
    pub width: Pt,
    pub height: Pt,
    image: Arc<EmbeddedImage>,
}

impl ImageFlowable {
    pub fn new(image: Arc<EmbeddedImage>, width: Pt, height: Pt) -> Self {
        Self {
            width,
            height,
            image,
        }
    }
}

impl Flowable for ImageFlowable {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        canvas.draw_image(x, y, self.width, self.height, &self.image);
    }
}

#[derive(Debug, Clone)]
enum CellContent {
    Text(Paragraph),
    Image(ImageFlowable),
}

#[derive(Debug, Clone)]
pub struct TableCell {
    content: CellContent,
    align: TextAlign,
}

impl TableCell {
    pub fn text(paragraph: Paragraph) -> Self {
        let align = paragraph.align();
        Self {
            content: CellContent::Text(paragraph),
            align,
        }
    }

    pub fn image(image: ImageFlowable, align: TextAlign) -> Self {
        Self {
            content: CellContent::Image(image),
            align,
        }
    }

    fn size(&self, width: Pt) -> Size {
        match &self.content {
            CellContent::Text(paragraph) => paragraph.wrap(width, huge_pt()),
            CellContent::Image(image) => image.wrap(width, huge_pt()),
        }
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, width: Pt, height: Pt) {
        match &self.content {
            CellContent::Text(paragraph) => paragraph.draw(canvas, x, y, width, height),
            CellContent::Image(image) => {
                let offset = align_offset(self.align, width, image.width);
                image.draw(canvas, x + offset, y, width, height);
            }
        }
    }

    fn split(&self, width: Pt, height: Pt) -> Option<(TableCell, TableCell)> {
        match &self.content {
            CellContent::Text(paragraph) => {
                let (head, tail) = paragraph.split_lines(width, height)?;
                Some((TableCell::text(head), TableCell::text(tail)))
            }
            CellContent::Image(_) => None,
        }
    }

    fn emptied(&self) -> TableCell {
        match &self.content {
            CellContent::Text(paragraph) => TableCell::text(paragraph.emptied()),
            CellContent::Image(_) => TableCell::text(Paragraph::from_lines(vec![String::new()])),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableStyle {
    pub padding: Pt,
    /// Zero disables the grid.
    pub grid_width: Pt,
    pub grid_color: Color,
    pub header_background: Option<Color>,
    pub valign: VerticalAlign,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            padding: Pt::ZERO,
            grid_width: Pt::ZERO,
            grid_color: Color::BLACK,
            header_background: None,
            valign: VerticalAlign::Top,
        }
    }
}

#[derive(Debug, Clone)]
struct TableRow {
    // Source row number (header is 0); a row split across pages keeps its number.
    index: usize,
    cells: Arc<Vec<TableCell>>,
}

/// Grid of cells at fixed column widths. Splits between rows, repeats the header row on
/// every continuation when asked to, and breaks a single row between text lines when it
/// cannot fit on an otherwise empty page.
#[derive(Debug, Clone)]
pub struct TableFlowable {
    col_widths: Arc<Vec<Pt>>,
    header: Option<TableRow>,
    rows: Vec<TableRow>,
    include_header: bool,
    repeat_header: bool,
    style: Arc<TableStyle>,
    pagination: Pagination,
}

impl TableFlowable {
    pub fn new(col_widths: Vec<Pt>, rows: Vec<Vec<TableCell>>) -> Self {
        Self {
            col_widths: Arc::new(col_widths),
            header: None,
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(index, cells)| TableRow {
                    index,
                    cells: Arc::new(cells),
                })
                .collect(),
            include_header: true,
            repeat_header: false,
            style: Arc::new(TableStyle::default()),
            pagination: Pagination::default(),
        }
    }

    /// Header row numbered 0; body rows are renumbered from 1.
    pub fn with_header(mut self, header: Vec<TableCell>) -> Self {
        self.header = Some(TableRow {
            index: 0,
            cells: Arc::new(header),
        });
        for (offset, row) in self.rows.iter_mut().enumerate() {
            row.index = offset + 1;
        }
        self
    }

    pub fn repeat_header(mut self, repeat: bool) -> Self {
        self.repeat_header = repeat;
        self
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = Arc::new(style);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    fn total_width(&self) -> Pt {
        self.col_widths.iter().sum()
    }

    fn content_width(&self, column: usize) -> Pt {
        let width = self.col_widths.get(column).copied().unwrap_or(Pt::ZERO);
        (width - self.style.padding * 2).max(Pt::ZERO)
    }

    fn row_height(&self, row: &TableRow) -> Pt {
        let content = row
            .cells
            .iter()
            .enumerate()
            .map(|(column, cell)| cell.size(self.content_width(column)).height)
            .fold(Pt::ZERO, Pt::max);
        content + self.style.padding * 2
    }

    fn header_height(&self) -> Pt {
        match (&self.header, self.include_header) {
            (Some(header), true) => self.row_height(header),
            _ => Pt::ZERO,
        }
    }

    fn piece(&self, rows: Vec<TableRow>, include_header: bool) -> TableFlowable {
        TableFlowable {
            col_widths: self.col_widths.clone(),
            header: self.header.clone(),
            rows,
            include_header,
            repeat_header: self.repeat_header,
            style: self.style.clone(),
            pagination: self.pagination,
        }
    }

    fn split_row(&self, row: &TableRow, avail_height: Pt) -> Option<(TableRow, TableRow)> {
        let content_height = avail_height - self.style.padding * 2;
        if content_height <= Pt::ZERO {
            return None;
        }
        let mut head = Vec::with_capacity(row.cells.len());
        let mut tail = Vec::with_capacity(row.cells.len());
        for (column, cell) in row.cells.iter().enumerate() {
            let width = self.content_width(column);
            if cell.size(width).height <= content_height {
                head.push(cell.clone());
                tail.push(cell.emptied());
            } else {
                let (first, rest) = cell.split(width, content_height)?;
                head.push(first);
                tail.push(rest);
            }
        }
        Some((
            TableRow {
                index: row.index,
                cells: Arc::new(head),
            },
            TableRow {
                index: row.index,
                cells: Arc::new(tail),
            },
        ))
    }

    fn draw_row(&self, canvas: &mut Canvas, x: Pt, y: Pt, row: &TableRow, is_header: bool) -> Pt {
        canvas.meta(crate::META_TABLE_ROW_KEY, row.index.to_string());
        let height = self.row_height(row);
        let padding = self.style.padding;
        let mut cursor_x = x;
        for (column, cell) in row.cells.iter().enumerate() {
            let col_width = self.col_widths.get(column).copied().unwrap_or(Pt::ZERO);
            if is_header {
                if let Some(background) = self.style.header_background {
                    canvas.set_fill_color(background);
                    canvas.draw_rect(cursor_x, y, col_width, height);
                }
            }
            let content_width = self.content_width(column);
            let content_height = (height - padding * 2).max(Pt::ZERO);
            let used = cell.size(content_width).height;
            let offset = valign_offset(self.style.valign, content_height, used);
            cell.draw(
                canvas,
                cursor_x + padding,
                y + padding + offset,
                content_width,
                content_height,
            );
            cursor_x += col_width;
        }
        if self.style.grid_width > Pt::ZERO {
            canvas.set_stroke_color(self.style.grid_color);
            canvas.set_line_width(self.style.grid_width);
            let mut cursor_x = x;
            for width in self.col_widths.iter().take(row.cells.len().max(1)) {
                canvas.stroke_rect(cursor_x, y, *width, height);
                cursor_x += *width;
            }
        }
        height
    }

    fn split_rows(
        &self,
        avail_height: Pt,
        split_first_row: bool,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let available = avail_height - self.header_height();
        if available <= Pt::ZERO {
            return None;
        }

        let mut used = Pt::ZERO;
        let mut fitting = 0usize;
        for row in &self.rows {
            let height = self.row_height(row);
            if used + height > available {
                break;
            }
            used += height;
            fitting += 1;
        }
        if fitting >= self.rows.len() {
            return None;
        }

        if fitting == 0 {
            if !split_first_row {
                return None;
            }
            let first_row = self.rows.first()?;
            let (head, tail) = self.split_row(first_row, available)?;
            let mut rest = Vec::with_capacity(self.rows.len());
            rest.push(tail);
            rest.extend(self.rows[1..].iter().cloned());
            let first = self.piece(vec![head], self.include_header);
            let second = self.piece(rest, self.repeat_header);
            return Some((Box::new(first), Box::new(second)));
        }

        let first = self.piece(self.rows[..fitting].to_vec(), self.include_header);
        let second = self.piece(self.rows[fitting..].to_vec(), self.repeat_header);
        Some((Box::new(first), Box::new(second)))
    }
}

impl Flowable for TableFlowable {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        let body: Pt = self.rows.iter().map(|row| self.row_height(row)).sum();
        Size {
            width: self.total_width(),
            height: self.header_height() + body,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        self.split_rows(avail_height, true)
    }

    // A row that does not fit below earlier content moves whole; only a fresh frame cuts
    // it between lines.
    fn split_below_content(
        &self,
        _avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        self.split_rows(avail_height, false)
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        let mut cursor_y = y;
        if self.include_header {
            if let Some(header) = &self.header {
                cursor_y += self.draw_row(canvas, x, cursor_y, header, true);
            }
        }
        for row in &self.rows {
            cursor_y += self.draw_row(canvas, x, cursor_y, row, false);
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }
}

#[derive(Clone)]
pub struct FlexItem {
    share: f32,
    inset_left: Pt,
    valign: VerticalAlign,
    content: Box<dyn Flowable>,
}

impl FlexItem {
    /// `share` is the fraction of the row width this item occupies.
    pub fn new(share: f32, content: Box<dyn Flowable>) -> Self {
        Self {
            share,
            inset_left: Pt::ZERO,
            valign: VerticalAlign::Top,
            content,
        }
    }

    pub fn with_inset_left(mut self, inset: Pt) -> Self {
        self.inset_left = inset;
        self
    }

    pub fn with_valign(mut self, valign: VerticalAlign) -> Self {
        self.valign = valign;
        self
    }

    fn content_width(&self, row_width: Pt) -> Pt {
        (row_width * self.share - self.inset_left).max(Pt::ZERO)
    }
}

/// Side-by-side regions sharing one row; the row is as tall as its tallest region.
#[derive(Clone)]
pub struct FlexFlowable {
    items: Vec<FlexItem>,
    pagination: Pagination,
}

impl FlexFlowable {
    pub fn new(items: Vec<FlexItem>) -> Self {
        Self {
            items,
            pagination: Pagination::default(),
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }
}

impl Flowable for FlexFlowable {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size {
        let height = self
            .items
            .iter()
            .map(|item| {
                item.content
                    .wrap(item.content_width(avail_width), avail_height)
                    .height
            })
            .fold(Pt::ZERO, Pt::max);
        Size {
            width: avail_width,
            height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt) {
        let row_height = self.wrap(avail_width, avail_height).height;
        let mut cursor_x = x;
        for item in &self.items {
            let width = item.content_width(avail_width);
            let used = item.content.wrap(width, avail_height).height;
            let offset = valign_offset(item.valign, row_height, used);
            item.content
                .draw(canvas, cursor_x + item.inset_left, y + offset, width, used);
            cursor_x += avail_width * item.share;
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn debug_name(&self) -> &'static str {
        "FlexFlowable"
    }
}
