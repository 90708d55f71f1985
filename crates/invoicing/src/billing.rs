//! Turning delivered notes into invoice lines.

use std::collections::HashSet;

use gestiona_core::{CustomerRef, DomainError, DomainResult};

use crate::delivery_note::{DeliveryNote, DeliveryNoteId, DeliveryNoteStatus};
use crate::lines::DocumentLine;

/// Customer and lines of an invoice covering `notes`.
///
/// Every note must be delivered and belong to the same customer. Lines keep
/// the note order and are prefixed with the note number.
pub fn invoice_lines_from_notes(
    notes: &[&DeliveryNote],
) -> DomainResult<(CustomerRef, Vec<DocumentLine>)> {
    let first = notes
        .first()
        .ok_or_else(|| DomainError::validation("select at least one delivery note"))?;
    let customer = first.details().customer.clone();

    let mut seen: HashSet<DeliveryNoteId> = HashSet::new();
    let mut lines = Vec::new();
    for note in notes {
        if !seen.insert(note.id_typed()) {
            return Err(DomainError::validation(format!(
                "delivery note {} is selected twice",
                note.number()
            )));
        }
        if note.status() != DeliveryNoteStatus::Delivered {
            return Err(DomainError::invariant(format!(
                "delivery note {} is not delivered",
                note.number()
            )));
        }
        if !note.details().customer.same_as(&customer) {
            return Err(DomainError::invariant(
                "all delivery notes must belong to the same customer",
            ));
        }
        for line in &note.details().lines {
            lines.push(DocumentLine {
                line_no: (lines.len() + 1) as u32,
                description: format!("{} - {}", note.number(), line.description),
                ..line.clone()
            });
        }
    }
    Ok((customer, lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery_note::tests::delivered;
    use gestiona_core::TenantId;

    #[test]
    fn concatenates_and_renumbers() {
        let t = TenantId::new();
        let a = delivered(t, "ALB2026-00001", "Construcciones Sur");
        let b = delivered(t, "ALB2026-00002", "construcciones sur");
        let (customer, lines) = invoice_lines_from_notes(&[&a, &b]).unwrap();
        assert_eq!(customer.name, "Construcciones Sur");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].line_no, 2);
        assert_eq!(lines[1].description, "ALB2026-00002 - Saco de cemento 25kg");
    }

    #[test]
    fn rejects_mixed_customers_and_empty_selection() {
        let t = TenantId::new();
        let a = delivered(t, "ALB2026-00001", "Construcciones Sur");
        let b = delivered(t, "ALB2026-00002", "Reformas Norte");
        assert!(matches!(
            invoice_lines_from_notes(&[&a, &b]),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(matches!(
            invoice_lines_from_notes(&[]),
            Err(DomainError::Validation(_))
        ));
        assert!(invoice_lines_from_notes(&[&a, &a]).is_err());
    }
}
