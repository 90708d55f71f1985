use serde::{Deserialize, Serialize};

use gestiona_core::validation::hex_color;
use gestiona_core::{DomainError, DomainResult};

/// Standard PDF Type1 families available without embedding fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontFamily {
    #[default]
    Helvetica,
    Times,
    Courier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateStyle {
    pub primary_color: String,
    pub secondary_color: String,
    pub text_color: String,
    pub font_family: FontFamily,
    /// Body size in points.
    pub font_size: u8,
}

impl Default for TemplateStyle {
    fn default() -> Self {
        Self {
            primary_color: "#1F2937".to_string(),
            secondary_color: "#6B7280".to_string(),
            text_color: "#111827".to_string(),
            font_family: FontFamily::Helvetica,
            font_size: 9,
        }
    }
}

impl TemplateStyle {
    pub fn validate(&self) -> DomainResult<()> {
        hex_color("primary_color", &self.primary_color)?;
        hex_color("secondary_color", &self.secondary_color)?;
        hex_color("text_color", &self.text_color)?;
        if !(6..=16).contains(&self.font_size) {
            return Err(DomainError::validation("font_size must be between 6 and 16"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSection {
    pub show_logo: bool,
    pub show_company_data: bool,
    pub title: Option<String>,
}

impl Default for HeaderSection {
    fn default() -> Self {
        Self {
            show_logo: true,
            show_company_data: true,
            title: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub show_tax_id: bool,
    pub show_address: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            show_tax_id: true,
            show_address: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinesSection {
    pub show_sku: bool,
    pub show_discount: bool,
    pub show_tax_rate: bool,
}

impl Default for LinesSection {
    fn default() -> Self {
        Self {
            show_sku: false,
            show_discount: true,
            show_tax_rate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalsSection {
    pub show_tax_breakdown: bool,
    pub show_amount_in_words: bool,
}

impl Default for TotalsSection {
    fn default() -> Self {
        Self {
            show_tax_breakdown: true,
            show_amount_in_words: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FooterSection {
    pub text: Option<String>,
    pub show_bank_account: bool,
    pub show_page_numbers: bool,
}

impl Default for FooterSection {
    fn default() -> Self {
        Self {
            text: None,
            show_bank_account: true,
            show_page_numbers: true,
        }
    }
}

/// Which blocks of the document are printed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSections {
    pub header: HeaderSection,
    pub client: ClientSection,
    pub lines: LinesSection,
    pub totals: TotalsSection,
    pub footer: FooterSection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let style: TemplateStyle =
            serde_json::from_str(r##"{"primary_color":"#FF0000","font_family":"courier"}"##).unwrap();
        assert_eq!(style.primary_color, "#FF0000");
        assert_eq!(style.font_family, FontFamily::Courier);
        assert_eq!(style.font_size, 9);

        let sections: TemplateSections =
            serde_json::from_str(r#"{"lines":{"show_sku":true}}"#).unwrap();
        assert!(sections.lines.show_sku);
        assert!(sections.lines.show_tax_rate);
        assert!(sections.footer.show_page_numbers);
    }

    #[test]
    fn font_size_bounds() {
        let mut style = TemplateStyle::default();
        style.font_size = 17;
        assert!(style.validate().is_err());
        style.font_size = 6;
        assert!(style.validate().is_ok());
        style.text_color = "black".into();
        assert!(matches!(style.validate(), Err(DomainError::Validation(msg)) if msg.contains("text_color")));
    }
}
