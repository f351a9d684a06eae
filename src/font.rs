use crate::types::Pt;

// Advance widths (1/1000 em) for printable ASCII 0x20..=0x7E from the base-14 AFM files.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0x30
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 0x50
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 0x60
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 0x70
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0x30
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 0x50
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 0x60
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 0x70
];

const MISSING_WIDTH: u16 = 556;
const NBSP_WIDTH: u16 = 278;

/// Metrics for the two base-14 faces the renderer uses. Both are WinAnsi-encoded and never
/// embedded, so only advance widths are needed for wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base14Font {
    Helvetica,
    HelveticaBold,
}

impl Base14Font {
    pub fn from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().contains("bold") {
            Base14Font::HelveticaBold
        } else {
            Base14Font::Helvetica
        }
    }

    pub fn pdf_name(self) -> &'static str {
        match self {
            Base14Font::Helvetica => "Helvetica",
            Base14Font::HelveticaBold => "Helvetica-Bold",
        }
    }

    fn advance(self, ch: char) -> u16 {
        let table = match self {
            Base14Font::Helvetica => &HELVETICA_WIDTHS,
            Base14Font::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        };
        match ch {
            ' '..='~' => table[(ch as usize) - 0x20],
            '\u{00A0}' => NBSP_WIDTH,
            _ => MISSING_WIDTH,
        }
    }

    pub fn measure(self, font_size: Pt, text: &str) -> Pt {
        let units: i64 = text.chars().map(|ch| self.advance(ch) as i64).sum();
        font_size.mul_ratio(units, 1000)
    }
}
