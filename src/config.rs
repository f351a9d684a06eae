use crate::error::{Result, SheetError};
use crate::types::{Color, Margins, Pt};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every styling and sizing constant the planner and composer read. Passed by reference into
/// each call; nothing here is global, so documents can be built concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub regular_font: String,
    pub bold_font: String,
    pub font_size: f32,
    pub leading: f32,
    pub text_color: Color,
    pub header_background: Color,
    pub grid_color: Color,
    pub grid_width: f32,
    pub cell_padding: f32,
    pub margin: f32,

    /// Sequence / label / value shares of usable width for individual records.
    pub fixed_form_proportions: [f32; 3],
    /// Calibrated advance used by the matrix planner instead of measuring text.
    pub char_width: f32,
    pub min_column_width: f32,
    pub row_height_estimate: f32,
    pub height_overhead: f32,

    pub organization: String,
    pub subtitle: String,
    pub organization_size: f32,
    pub subtitle_size: f32,
    pub title_size: f32,
    pub title_gap: f32,
    pub title_block_gap: f32,

    pub footer: FooterConfig,

    pub image_max_width: f32,
    pub image_max_height: f32,
    pub certification_phrase: String,
    pub certification_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FooterConfig {
    pub spacer: f32,
    pub date_share: f32,
    pub region_gap: f32,
    pub value_min_width: f32,
    pub leading: f32,
    pub date_label: String,
    pub signature_label: String,
    pub name_label: String,
    pub mobile_label: String,
    pub venue_label: String,
    pub signature_max_width: f32,
    pub signature_max_height: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            regular_font: "Helvetica".to_string(),
            bold_font: "Helvetica-Bold".to_string(),
            font_size: 10.0,
            leading: 12.0,
            text_color: Color::BLACK,
            header_background: Color::rgb(0.9, 0.9, 0.9),
            grid_color: Color::BLACK,
            grid_width: 0.5,
            cell_padding: 6.0,
            margin: 40.0,
            fixed_form_proportions: [0.08, 0.57, 0.35],
            char_width: 6.0,
            min_column_width: 50.0,
            row_height_estimate: 30.0,
            height_overhead: 400.0,
            organization: "ARUNACHAL PRADESH PUBLIC SERVICE COMMISSION".to_string(),
            subtitle: "OBSERVER REPORT".to_string(),
            organization_size: 14.0,
            subtitle_size: 12.0,
            title_size: 11.0,
            title_gap: 6.0,
            title_block_gap: 20.0,
            footer: FooterConfig::default(),
            image_max_width: 120.0,
            image_max_height: 90.0,
            certification_phrase: "I hereby certify".to_string(),
            certification_value: "Yes".to_string(),
        }
    }
}

impl Default for FooterConfig {
    fn default() -> Self {
        Self {
            // 0.6in
            spacer: 43.2,
            date_share: 0.40,
            region_gap: 40.0,
            value_min_width: 150.0,
            leading: 18.0,
            date_label: "Date:".to_string(),
            signature_label: "Signature of Observer:".to_string(),
            name_label: "Name:".to_string(),
            mobile_label: "Mobile Number:".to_string(),
            venue_label: "Exam Venue:".to_string(),
            signature_max_width: 140.0,
            signature_max_height: 50.0,
        }
    }
}

impl LayoutConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: LayoutConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("font_size", self.font_size),
            ("leading", self.leading),
            ("char_width", self.char_width),
            ("min_column_width", self.min_column_width),
            ("row_height_estimate", self.row_height_estimate),
            ("image_max_width", self.image_max_width),
            ("image_max_height", self.image_max_height),
            ("footer.leading", self.footer.leading),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SheetError::InvalidConfiguration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let non_negative = [
            ("margin", self.margin),
            ("cell_padding", self.cell_padding),
            ("grid_width", self.grid_width),
            ("height_overhead", self.height_overhead),
            ("footer.spacer", self.footer.spacer),
            ("footer.region_gap", self.footer.region_gap),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SheetError::InvalidConfiguration(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        let shares = self.fixed_form_proportions;
        if shares.iter().any(|v| !v.is_finite() || *v <= 0.0)
            || shares.iter().sum::<f32>() > 1.0 + 1e-4
        {
            return Err(SheetError::InvalidConfiguration(format!(
                "fixed_form_proportions must be positive and sum to at most 1, got {shares:?}"
            )));
        }
        if !(0.0..1.0).contains(&self.footer.date_share) {
            return Err(SheetError::InvalidConfiguration(format!(
                "footer.date_share must be in [0, 1), got {}",
                self.footer.date_share
            )));
        }
        Ok(())
    }

    pub fn margins(&self) -> Margins {
        Margins::all(self.margin)
    }

    pub(crate) fn padding(&self) -> Pt {
        Pt::from_f32(self.cell_padding)
    }

    pub(crate) fn font_size_pt(&self) -> Pt {
        Pt::from_f32(self.font_size)
    }

    pub(crate) fn leading_pt(&self) -> Pt {
        Pt::from_f32(self.leading)
    }
}
