use crate::config::LayoutConfig;
use crate::flowable::{
    BreakInside, FlexFlowable, FlexItem, ImageFlowable, Pagination, Paragraph, TableCell,
    TableFlowable, TableStyle, TextAlign, TextStyle, VerticalAlign,
};
use crate::font::Base14Font;
use crate::normalize::{Markup, normalize_image, normalize_text};
use crate::types::Pt;

const NBSP: char = '\u{00A0}';

/// Attestation values printed under the field table. Absent values render as blank lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FooterMetadata {
    pub name: Option<String>,
    pub venue: Option<String>,
    pub date: Option<String>,
    pub mobile: Option<String>,
    /// Undecoded signature image bytes.
    pub signature: Option<Vec<u8>>,
}

struct FooterStyles {
    label: TextStyle,
    value: TextStyle,
    padding: Pt,
}

impl FooterStyles {
    fn new(config: &LayoutConfig) -> Self {
        let size = config.font_size_pt();
        let leading = Pt::from_f32(config.footer.leading);
        let color = config.text_color;
        Self {
            label: TextStyle::new(Base14Font::from_name(&config.bold_font), size, leading)
                .with_color(color),
            value: TextStyle::new(Base14Font::from_name(&config.regular_font), size, leading)
                .with_color(color)
                .underlined(),
            padding: Pt::from_f32(2.0),
        }
    }
}

/// Two regions side by side: the date bottom-aligned on the left, the signature, name,
/// mobile and venue rows top-aligned on the right. Kept on one page.
pub fn footer_flowable(meta: &FooterMetadata, usable_width: Pt, config: &LayoutConfig) -> FlexFlowable {
    let styles = FooterStyles::new(config);
    let footer = &config.footer;
    let left_width = usable_width * footer.date_share;
    let right_share = 1.0 - footer.date_share;
    let region_gap = Pt::from_f32(footer.region_gap);
    let right_width = (usable_width * right_share - region_gap).max(Pt::ZERO);

    let date_rows = vec![(footer.date_label.as_str(), ValueSource::Text(meta.date.as_deref()))];
    let attestation_rows = vec![
        (
            footer.signature_label.as_str(),
            ValueSource::Signature(meta.signature.as_deref()),
        ),
        (footer.name_label.as_str(), ValueSource::Text(meta.name.as_deref())),
        (footer.mobile_label.as_str(), ValueSource::Text(meta.mobile.as_deref())),
        (footer.venue_label.as_str(), ValueSource::Text(meta.venue.as_deref())),
    ];

    let date_table = label_value_table(&date_rows, left_width, &styles, config);
    let attestation_table = label_value_table(&attestation_rows, right_width, &styles, config);

    FlexFlowable::new(vec![
        FlexItem::new(footer.date_share, Box::new(date_table)).with_valign(VerticalAlign::Bottom),
        FlexItem::new(right_share, Box::new(attestation_table))
            .with_inset_left(region_gap)
            .with_valign(VerticalAlign::Top),
    ])
    .with_pagination(Pagination {
        break_inside: BreakInside::Avoid,
    })
}

enum ValueSource<'a> {
    Text(Option<&'a str>),
    Signature(Option<&'a [u8]>),
}

fn label_value_table(
    rows: &[(&str, ValueSource<'_>)],
    width: Pt,
    styles: &FooterStyles,
    config: &LayoutConfig,
) -> TableFlowable {
    let label_width = rows
        .iter()
        .map(|(label, _)| styles.label.font.measure(styles.label.font_size, label))
        .fold(Pt::ZERO, Pt::max)
        + styles.padding * 2
        + Pt::from_f32(4.0);
    let label_width = label_width.min(width);
    let value_width = (width - label_width).max(Pt::ZERO);
    let value_content = (value_width - styles.padding * 2).max(Pt::ZERO);

    let cells = rows
        .iter()
        .map(|(label, value)| {
            let label_cell =
                TableCell::text(Paragraph::from_text(label).with_style(styles.label.clone()));
            let value_cell = match value {
                ValueSource::Text(text) => text_value(*text, value_content, styles, config),
                ValueSource::Signature(bytes) => {
                    signature_value(*bytes, value_content, styles, config)
                }
            };
            vec![label_cell, value_cell]
        })
        .collect();

    TableFlowable::new(vec![label_width, value_width], cells).with_style(TableStyle {
        padding: styles.padding,
        ..TableStyle::default()
    })
}

fn text_value(text: Option<&str>, max_width: Pt, styles: &FooterStyles, config: &LayoutConfig) -> TableCell {
    let markup = text.map(normalize_text).unwrap_or_default();
    let target = Pt::from_f32(config.footer.value_min_width).min(max_width);
    let padded = pad_to_width(&markup, target, &styles.value);
    TableCell::text(Paragraph::new(&padded).with_style(styles.value.clone()))
}

fn signature_value(
    bytes: Option<&[u8]>,
    max_width: Pt,
    styles: &FooterStyles,
    config: &LayoutConfig,
) -> TableCell {
    let footer = &config.footer;
    let image = bytes.and_then(|bytes| {
        normalize_image(
            bytes,
            Pt::from_f32(footer.signature_max_width).min(max_width),
            Pt::from_f32(footer.signature_max_height),
        )
    });
    match image {
        Some(cell) => TableCell::image(
            ImageFlowable::new(cell.image, cell.width, cell.height),
            TextAlign::Left,
        ),
        None => {
            if bytes.is_some() {
                log::debug!("signature bytes could not be decoded, leaving the line blank");
            }
            text_value(None, max_width, styles, config)
        }
    }
}

/// Append non-breaking spaces to the last line until it is as wide as `target`, so the
/// underline has a visible length even when the value is short or empty.
fn pad_to_width(markup: &Markup, target: Pt, style: &TextStyle) -> Markup {
    let mut lines = markup.lines();
    let Some(last) = lines.last_mut() else {
        return markup.clone();
    };
    let nbsp_width = style.font.measure(style.font_size, "\u{00A0}").to_milli_i64();
    let used = style.font.measure(style.font_size, last).to_milli_i64();
    let missing = target.to_milli_i64() - used;
    if nbsp_width > 0 && missing > 0 {
        let count = (missing / nbsp_width) as usize;
        last.extend(std::iter::repeat_n(NBSP, count));
    }
    Markup::escape(&lines.join("\n"))
}
