use serde::{Deserialize, Serialize};

use facturo_core::ValueObject;

use crate::rates::CountryVatTable;

/// Which legal VAT mention a document prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatMention {
    None,
    Franchise,
    IntraEuReverseCharge,
    Export,
    /// Only the free text of the selection is printed.
    Custom,
}

/// Mention kind plus optional free text chosen on a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatMentionSelection {
    pub mention: VatMention,
    pub free_text: Option<String>,
}

impl ValueObject for VatMentionSelection {}

impl VatMentionSelection {
    pub fn new(mention: VatMention) -> Self {
        Self {
            mention,
            free_text: None,
        }
    }

    pub fn with_free_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.free_text = if text.trim().is_empty() {
            None
        } else {
            Some(text.trim().to_string())
        };
        self
    }

    /// Text to print, resolved against the seller country's table.
    ///
    /// The legal text and the free text are joined with a blank line when
    /// both are present.
    pub fn render(&self, table: &CountryVatTable) -> Option<String> {
        let legal = match self.mention {
            VatMention::None | VatMention::Custom => None,
            VatMention::Franchise => Some(table.franchise_mention.as_str()),
            VatMention::IntraEuReverseCharge => Some(table.intra_eu_mention.as_str()),
            VatMention::Export => Some(table.export_mention.as_str()),
        };
        match (legal, self.free_text.as_deref()) {
            (Some(l), Some(f)) => Some(format!("{l}\n\n{f}")),
            (Some(l), None) => Some(l.to_string()),
            (None, Some(f)) => Some(f.to_string()),
            (None, None) => None,
        }
    }
}

impl Default for VatMentionSelection {
    fn default() -> Self {
        Self::new(VatMention::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{CountryVatConfig, StaticCountryTable};
    use facturo_parties::CountryCode;

    #[test]
    fn render_joins_legal_and_free_text() {
        let config = StaticCountryTable::fallback().unwrap();
        let table = config.require(&CountryCode::new("FR").unwrap()).unwrap();

        let franchise = VatMentionSelection::new(VatMention::Franchise);
        assert_eq!(
            franchise.render(table).as_deref(),
            Some("TVA non applicable, art. 293 B du CGI")
        );

        let custom = VatMentionSelection::new(VatMention::Custom).with_free_text("  Merci ! ");
        assert_eq!(custom.render(table).as_deref(), Some("Merci !"));

        let both = VatMentionSelection::new(VatMention::Export).with_free_text("EORI FR123");
        assert!(both.render(table).unwrap().ends_with("\n\nEORI FR123"));

        assert_eq!(VatMentionSelection::default().render(table), None);
    }
}
