//! Print model: everything a rendered document shows, already resolved.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use gestiona_core::CustomerRef;
use gestiona_invoicing::{DeliveryNote, DocumentLine, DocumentTotals, Invoice};
use gestiona_templates::DocumentType;

/// Issuer data printed in the header and footer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyBlock {
    pub legal_name: String,
    pub tax_id: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintableDocument {
    pub document_type: DocumentType,
    pub number: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub company: CompanyBlock,
    pub customer: CustomerRef,
    pub lines: Vec<DocumentLine>,
    pub totals: DocumentTotals,
    pub notes: Option<String>,
}

impl PrintableDocument {
    pub fn for_invoice(company: CompanyBlock, invoice: &Invoice) -> Self {
        let details = invoice.details();
        Self {
            document_type: DocumentType::Invoice,
            number: invoice.number().to_string(),
            date: details.issue_date,
            due_date: Some(details.due_date),
            company,
            customer: details.customer.clone(),
            lines: details.lines.clone(),
            totals: invoice.totals().clone(),
            notes: details.notes.clone(),
        }
    }

    pub fn for_delivery_note(company: CompanyBlock, note: &DeliveryNote) -> Self {
        let details = note.details();
        Self {
            document_type: DocumentType::DeliveryNote,
            number: note.number().to_string(),
            date: details.date,
            due_date: None,
            company,
            customer: details.customer.clone(),
            lines: details.lines.clone(),
            totals: note.totals().clone(),
            notes: details.notes.clone(),
        }
    }

    /// Filler document for template previews.
    pub fn sample(document_type: DocumentType, company: CompanyBlock, date: NaiveDate) -> Self {
        let lines = vec![
            sample_line(1, "MAT-001", "Material de ejemplo", 3_000, 12_50, 0, 2_100),
            sample_line(2, "SRV-010", "Mano de obra (horas)", 2_500, 28_00, 1_000, 2_100),
            sample_line(3, "ALI-100", "Producto con IVA reducido", 10_000, 1_95, 0, 1_000),
        ];
        Self {
            document_type,
            number: "EJEMPLO-00001".to_string(),
            date,
            due_date: (document_type == DocumentType::Invoice).then_some(date),
            company,
            customer: CustomerRef {
                id: None,
                name: "Cliente de ejemplo S.L.".to_string(),
                tax_id: Some("B00000000".to_string()),
                address: Some("Calle Mayor 1, 28001 Madrid".to_string()),
            },
            totals: DocumentTotals::compute(&lines),
            lines,
            notes: None,
        }
    }
}

fn sample_line(
    line_no: u32,
    sku: &str,
    description: &str,
    quantity: i64,
    unit_price: u64,
    discount_bp: u32,
    tax_rate_bp: u32,
) -> DocumentLine {
    DocumentLine {
        line_no,
        product_id: None,
        sku: Some(sku.to_string()),
        description: description.to_string(),
        quantity,
        unit_price,
        discount_bp,
        tax_rate_bp,
    }
}
