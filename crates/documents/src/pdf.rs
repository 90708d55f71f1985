//! A4 PDF rendering with the standard Type1 fonts.

use std::ops::Range;

use encoding_rs::WINDOWS_1252;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use thiserror::Error;

use gestiona_core::money::format_eur;
use gestiona_invoicing::DocumentLine;
use gestiona_templates::{FontFamily, TemplateDetails};

use crate::format;
use crate::printable::PrintableDocument;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const ROW_HEIGHT: f32 = 15.0;

/// Table rows on the first page, below the header blocks.
pub const FIRST_PAGE_ROWS: usize = 28;
/// Table rows on continuation pages.
pub const NEXT_PAGE_ROWS: usize = 42;
/// Rows kept free on the last page for the totals block.
pub const TOTALS_ROWS: usize = 9;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid color '{0}'")]
    Color(String),

    #[error("pdf: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Split `rows` table rows into pages. The last page always has room for totals.
pub fn paginate(rows: usize, first: usize, next: usize, reserve: usize) -> Vec<Range<usize>> {
    let mut pages = Vec::new();
    let mut start = 0;
    let mut capacity = first;
    loop {
        let end = (start + capacity).min(rows);
        pages.push(start..end);
        if end == rows {
            if end - start + reserve > capacity {
                pages.push(rows..rows);
            }
            return pages;
        }
        start = end;
        capacity = next;
    }
}

fn rgb(hex: &str) -> Result<[f32; 3], RenderError> {
    let bad = || RenderError::Color(hex.to_string());
    let digits = hex.strip_prefix('#').filter(|d| d.len() == 6).ok_or_else(bad)?;
    let mut out = [0.0; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| bad())?;
        *slot = f32::from(byte) / 255.0;
    }
    Ok(out)
}

fn base_fonts(family: FontFamily) -> (&'static str, &'static str) {
    match family {
        FontFamily::Helvetica => ("Helvetica", "Helvetica-Bold"),
        FontFamily::Times => ("Times-Roman", "Times-Bold"),
        FontFamily::Courier => ("Courier", "Courier-Bold"),
    }
}

fn winansi(text: &str) -> Object {
    let (bytes, _, _) = WINDOWS_1252.encode(text);
    Object::String(bytes.into_owned(), StringFormat::Literal)
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
}

/// Operation buffer for one page.
struct Canvas {
    ops: Vec<Operation>,
    family: FontFamily,
}

impl Canvas {
    fn new(family: FontFamily) -> Self {
        Self {
            ops: Vec::new(),
            family,
        }
    }

    /// Approximate advance width; exact metrics are not needed for layout.
    fn width(&self, text: &str, size: f32) -> f32 {
        let per_char = match self.family {
            FontFamily::Courier => 0.6,
            FontFamily::Helvetica => 0.53,
            FontFamily::Times => 0.48,
        };
        text.chars().count() as f32 * per_char * size
    }

    fn fill_color(&mut self, color: [f32; 3]) {
        self.ops.push(Operation::new(
            "rg",
            color.iter().map(|c| (*c).into()).collect(),
        ));
    }

    fn stroke_color(&mut self, color: [f32; 3]) {
        self.ops.push(Operation::new(
            "RG",
            color.iter().map(|c| (*c).into()).collect(),
        ));
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops.push(Operation::new(
            "re",
            vec![x.into(), y.into(), w.into(), h.into()],
        ));
        self.ops.push(Operation::new("f", vec![]));
    }

    fn hline(&mut self, x1: f32, x2: f32, y: f32) {
        self.ops.push(Operation::new("w", vec![0.5_f32.into()]));
        self.ops.push(Operation::new("m", vec![x1.into(), y.into()]));
        self.ops.push(Operation::new("l", vec![x2.into(), y.into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn text(&mut self, x: f32, y: f32, font: Font, size: f32, text: &str) {
        let key = match font {
            Font::Regular => "F1",
            Font::Bold => "F2",
        };
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new("Tf", vec![key.into(), size.into()]));
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops.push(Operation::new("Tj", vec![winansi(text)]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn text_right(&mut self, right: f32, y: f32, font: Font, size: f32, text: &str) {
        let x = right - self.width(text, size);
        self.text(x, y, font, size, text);
    }

    fn fit(&self, text: &str, size: f32, max_width: f32) -> String {
        if self.width(text, size) <= max_width {
            return text.to_string();
        }
        let per_char = self.width("x", size);
        let keep = ((max_width / per_char) as usize).saturating_sub(1);
        let mut out: String = text.chars().take(keep).collect();
        out.push('…');
        out
    }
}

/// Column layout of the lines table, driven by the section toggles.
struct Columns {
    sku: Option<f32>,
    description: f32,
    description_width: f32,
    quantity: f32,
    price: f32,
    discount: Option<f32>,
    tax: Option<f32>,
    amount: f32,
}

impl Columns {
    fn new(template: &TemplateDetails) -> Self {
        let lines = &template.sections.lines;
        let amount = PAGE_WIDTH - MARGIN;
        let mut right = amount - 75.0;
        let tax = lines.show_tax_rate.then(|| {
            let at = right;
            right -= 40.0;
            at
        });
        let discount = lines.show_discount.then(|| {
            let at = right;
            right -= 40.0;
            at
        });
        let price = right;
        right -= 65.0;
        let quantity = right;
        right -= 50.0;
        let sku = lines.show_sku.then_some(MARGIN);
        let description = if sku.is_some() { MARGIN + 60.0 } else { MARGIN };
        Self {
            sku,
            description,
            description_width: right - description - 6.0,
            quantity,
            price,
            discount,
            tax,
            amount,
        }
    }
}

struct Renderer<'a> {
    doc: &'a PrintableDocument,
    template: &'a TemplateDetails,
    primary: [f32; 3],
    secondary: [f32; 3],
    text: [f32; 3],
    size: f32,
    columns: Columns,
}

impl<'a> Renderer<'a> {
    fn new(doc: &'a PrintableDocument, template: &'a TemplateDetails) -> Result<Self, RenderError> {
        let style = &template.style;
        Ok(Self {
            doc,
            template,
            primary: rgb(&style.primary_color)?,
            secondary: rgb(&style.secondary_color)?,
            text: rgb(&style.text_color)?,
            size: f32::from(style.font_size),
            columns: Columns::new(template),
        })
    }

    fn page(&self, rows: Range<usize>, page_no: usize, page_count: usize) -> Vec<Operation> {
        let mut c = Canvas::new(self.template.style.font_family);
        c.fill_color(self.primary);
        c.rect(0.0, PAGE_HEIGHT - 10.0, PAGE_WIDTH, 10.0);

        let first = page_no == 1;
        let table_top = if first {
            self.header(&mut c)
        } else {
            c.fill_color(self.text);
            c.text(
                MARGIN,
                PAGE_HEIGHT - 40.0,
                Font::Bold,
                self.size + 2.0,
                &format!("{} {} (continuación)", self.template.title(), self.doc.number),
            );
            PAGE_HEIGHT - 70.0
        };

        let mut y = self.table_header(&mut c, table_top);
        for line in &self.doc.lines[rows.clone()] {
            self.row(&mut c, y, line);
            y -= ROW_HEIGHT;
        }

        if page_no == page_count {
            self.totals(&mut c, y - 10.0);
        }
        self.footer(&mut c, page_no, page_count);
        c.ops
    }

    /// Title, number, dates, issuer and customer. Returns where the table starts.
    fn header(&self, c: &mut Canvas) -> f32 {
        let sections = &self.template.sections;
        let size = self.size;
        let top = PAGE_HEIGHT - 50.0;

        c.fill_color(self.primary);
        c.text(MARGIN, top, Font::Bold, size + 10.0, self.template.title());
        c.fill_color(self.text);
        let right = PAGE_WIDTH - MARGIN;
        c.text_right(right, top, Font::Bold, size + 2.0, &format!("Nº {}", self.doc.number));
        c.text_right(
            right,
            top - 16.0,
            Font::Regular,
            size,
            &format!("Fecha: {}", format::date(self.doc.date)),
        );
        if let Some(due) = self.doc.due_date {
            c.text_right(
                right,
                top - 28.0,
                Font::Regular,
                size,
                &format!("Vencimiento: {}", format::date(due)),
            );
        }

        let block_top = top - 60.0;
        if sections.header.show_company_data {
            let company = &self.doc.company;
            let mut y = block_top;
            c.text(MARGIN, y, Font::Bold, size, &company.legal_name);
            y -= size + 3.0;
            c.text(MARGIN, y, Font::Regular, size, &format!("NIF: {}", company.tax_id));
            if let Some(address) = &company.address {
                y -= size + 3.0;
                c.text(MARGIN, y, Font::Regular, size, address);
            }
        }

        let x = PAGE_WIDTH / 2.0 + 10.0;
        let customer = &self.doc.customer;
        c.fill_color(self.secondary);
        c.text(x, block_top + size + 4.0, Font::Regular, size - 1.0, "CLIENTE");
        c.fill_color(self.text);
        let mut y = block_top;
        c.text(x, y, Font::Bold, size, &customer.name);
        if sections.client.show_tax_id {
            if let Some(tax_id) = &customer.tax_id {
                y -= size + 3.0;
                c.text(x, y, Font::Regular, size, &format!("NIF: {tax_id}"));
            }
        }
        if sections.client.show_address {
            if let Some(address) = &customer.address {
                y -= size + 3.0;
                let address = c.fit(address, size, PAGE_WIDTH - MARGIN - x);
                c.text(x, y, Font::Regular, size, &address);
            }
        }

        block_top - 80.0
    }

    fn table_header(&self, c: &mut Canvas, top: f32) -> f32 {
        let cols = &self.columns;
        let size = self.size;
        c.fill_color(self.primary);
        c.rect(MARGIN - 4.0, top - 5.0, PAGE_WIDTH - 2.0 * MARGIN + 8.0, ROW_HEIGHT + 2.0);
        c.fill_color([1.0, 1.0, 1.0]);
        if let Some(x) = cols.sku {
            c.text(x, top, Font::Bold, size, "Ref.");
        }
        c.text(cols.description, top, Font::Bold, size, "Concepto");
        c.text_right(cols.quantity, top, Font::Bold, size, "Cant.");
        c.text_right(cols.price, top, Font::Bold, size, "Precio");
        if let Some(x) = cols.discount {
            c.text_right(x, top, Font::Bold, size, "Dto.");
        }
        if let Some(x) = cols.tax {
            c.text_right(x, top, Font::Bold, size, "IVA");
        }
        c.text_right(cols.amount, top, Font::Bold, size, "Importe");
        c.fill_color(self.text);
        top - ROW_HEIGHT - 4.0
    }

    fn row(&self, c: &mut Canvas, y: f32, line: &DocumentLine) {
        let cols = &self.columns;
        let size = self.size;
        if let (Some(x), Some(sku)) = (cols.sku, &line.sku) {
            let sku = c.fit(sku, size, 56.0);
            c.text(x, y, Font::Regular, size, &sku);
        }
        let description = c.fit(&line.description, size, cols.description_width);
        c.text(cols.description, y, Font::Regular, size, &description);
        c.text_right(cols.quantity, y, Font::Regular, size, &format::quantity(line.quantity));
        c.text_right(cols.price, y, Font::Regular, size, &format_eur(line.unit_price));
        if let Some(x) = cols.discount {
            let discount = if line.discount_bp == 0 {
                String::new()
            } else {
                format::percent(line.discount_bp)
            };
            c.text_right(x, y, Font::Regular, size, &discount);
        }
        if let Some(x) = cols.tax {
            c.text_right(x, y, Font::Regular, size, &format::percent(line.tax_rate_bp));
        }
        c.text_right(cols.amount, y, Font::Regular, size, &format_eur(line.base()));
    }

    fn totals(&self, c: &mut Canvas, top: f32) {
        let sections = &self.template.sections;
        let totals = &self.doc.totals;
        let size = self.size;
        let right = PAGE_WIDTH - MARGIN;
        let label = right - 150.0;

        c.stroke_color(self.secondary);
        c.hline(label - 10.0, right, top + ROW_HEIGHT - 4.0);

        let mut y = top;
        c.text(label, y, Font::Regular, size, "Base imponible");
        c.text_right(right, y, Font::Regular, size, &format_eur(totals.base));
        if sections.totals.show_tax_breakdown {
            for bucket in &totals.breakdown {
                y -= ROW_HEIGHT;
                c.text(
                    label,
                    y,
                    Font::Regular,
                    size,
                    &format!("IVA {} s/ {}", format::percent(bucket.rate_bp), format_eur(bucket.base)),
                );
                c.text_right(right, y, Font::Regular, size, &format_eur(bucket.tax));
            }
        } else {
            y -= ROW_HEIGHT;
            c.text(label, y, Font::Regular, size, "IVA");
            c.text_right(right, y, Font::Regular, size, &format_eur(totals.tax));
        }
        y -= ROW_HEIGHT + 4.0;
        c.fill_color(self.primary);
        c.text(label, y, Font::Bold, size + 2.0, "TOTAL");
        c.text_right(right, y, Font::Bold, size + 2.0, &format_eur(totals.total));
        c.fill_color(self.text);

        if sections.totals.show_amount_in_words {
            y -= ROW_HEIGHT + 2.0;
            let words = format!("Son: {}", format::amount_in_words(totals.total));
            let words = c.fit(&words, size - 1.0, right - MARGIN);
            c.text(MARGIN, y, Font::Regular, size - 1.0, &words);
        }
        if let Some(notes) = &self.doc.notes {
            y -= ROW_HEIGHT + 2.0;
            let notes = c.fit(notes, size - 1.0, right - MARGIN);
            c.text(MARGIN, y, Font::Regular, size - 1.0, &notes);
        }
    }

    fn footer(&self, c: &mut Canvas, page_no: usize, page_count: usize) {
        let footer = &self.template.sections.footer;
        let size = self.size - 1.0;
        let mut y = MARGIN;
        c.fill_color(self.secondary);
        if footer.show_page_numbers {
            c.text_right(
                PAGE_WIDTH - MARGIN,
                y,
                Font::Regular,
                size,
                &format!("Página {page_no} de {page_count}"),
            );
        }
        if footer.show_bank_account {
            if let Some(iban) = &self.doc.company.iban {
                c.text(MARGIN, y, Font::Regular, size, &format!("IBAN: {iban}"));
            }
        }
        if let Some(text) = &footer.text {
            y += size + 4.0;
            let text = c.fit(text, size, PAGE_WIDTH - 2.0 * MARGIN);
            c.text(MARGIN, y, Font::Regular, size, &text);
        }
        c.fill_color(self.text);
    }
}

/// Render `doc` with the look and sections of `template`.
pub fn render_pdf(doc: &PrintableDocument, template: &TemplateDetails) -> Result<Vec<u8>, RenderError> {
    let renderer = Renderer::new(doc, template)?;
    let pages = paginate(doc.lines.len(), FIRST_PAGE_ROWS, NEXT_PAGE_ROWS, TOTALS_ROWS);

    let mut pdf = Document::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let (regular, bold) = base_fonts(template.style.font_family);
    let regular_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => regular,
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => bold,
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = pdf.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let count = pages.len();
    let mut kids: Vec<Object> = Vec::with_capacity(count);
    for (i, rows) in pages.into_iter().enumerate() {
        let content = Content {
            operations: renderer.page(rows, i + 1, count),
        };
        let content_id = pdf.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);
    pdf.compress();

    let mut out = Vec::new();
    pdf.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printable::CompanyBlock;
    use chrono::NaiveDate;
    use gestiona_templates::DocumentType;

    fn company() -> CompanyBlock {
        CompanyBlock {
            legal_name: "Hostelería Ejemplo S.L.".into(),
            tax_id: "B12345678".into(),
            address: Some("Plaza España 3, Sevilla".into()),
            iban: Some("ES91 2100 0418 4502 0005 1332".into()),
        }
    }

    #[test]
    fn pagination_keeps_room_for_totals() {
        assert_eq!(paginate(0, 28, 42, 9), vec![0..0]);
        assert_eq!(paginate(10, 28, 42, 9), vec![0..10]);
        // 25 rows leave only 3 free rows on the first page.
        assert_eq!(paginate(25, 28, 42, 9), vec![0..25, 25..25]);
        assert_eq!(paginate(60, 28, 42, 9), vec![0..28, 28..60]);
        assert_eq!(paginate(28 + 42 + 5, 28, 42, 9), vec![0..28, 28..70, 70..75]);
    }

    #[test]
    fn colors_parse() {
        assert_eq!(rgb("#FF0000").unwrap(), [1.0, 0.0, 0.0]);
        assert!(rgb("FF0000").is_err());
        assert!(rgb("#GG0000").is_err());
    }

    #[test]
    fn renders_a_loadable_pdf() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let doc = PrintableDocument::sample(DocumentType::Invoice, company(), date);
        let mut template = TemplateDetails::builtin(DocumentType::Invoice);
        template.sections.lines.show_sku = true;
        template.sections.totals.show_amount_in_words = true;

        let bytes = render_pdf(&doc, &template).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let loaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(loaded.get_pages().len(), 1);
    }

    #[test]
    fn long_documents_span_pages() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let mut doc = PrintableDocument::sample(DocumentType::DeliveryNote, company(), date);
        let line = doc.lines[0].clone();
        doc.lines = (1..=60)
            .map(|n| DocumentLine { line_no: n, ..line.clone() })
            .collect();
        let template = TemplateDetails::builtin(DocumentType::DeliveryNote);

        let bytes = render_pdf(&doc, &template).unwrap();
        let loaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(loaded.get_pages().len(), 2);
    }
}
