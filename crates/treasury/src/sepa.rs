//! ISO 20022 `pain.008.001.02` (SEPA Core direct debit initiation) export.

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

use gestiona_core::money::format_decimal;

use crate::iban::{is_valid_bic, normalize_iban};
use crate::remittance::SequenceType;

const NAMESPACE: &str = "urn:iso:std:iso:20022:tech:xsd:pain.008.001.02";

#[derive(Debug, Error)]
pub enum SepaError {
    #[error("company profile is missing {0}")]
    MissingCreditorData(&'static str),

    #[error("invalid creditor data: {0}")]
    InvalidCreditorData(String),

    #[error("a SEPA file needs at least one transaction")]
    Empty,

    #[error("xml write failed: {0}")]
    Xml(String),
}

/// The collecting company.
#[derive(Debug, Clone)]
pub struct SepaCreditor {
    pub name: String,
    pub iban: Option<String>,
    pub bic: Option<String>,
    /// SEPA creditor identifier (e.g. `ES12000B12345678`).
    pub creditor_id: Option<String>,
}

/// One debit instruction.
#[derive(Debug, Clone)]
pub struct SepaDebit {
    pub end_to_end_id: String,
    pub amount: u64,
    pub mandate_id: String,
    pub mandate_signed_on: NaiveDate,
    pub debtor_name: String,
    pub debtor_iban: String,
    pub remittance_info: String,
}

/// Header of the batch.
#[derive(Debug, Clone)]
pub struct SepaBatch {
    pub message_id: String,
    pub created_at: DateTime<Utc>,
    pub collection_date: NaiveDate,
    pub sequence_type: SequenceType,
}

struct Xml {
    writer: Writer<Vec<u8>>,
}

impl Xml {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), SepaError> {
        self.writer
            .write_event(event)
            .map_err(|e| SepaError::Xml(e.to_string()))
    }

    fn open(&mut self, name: &str) -> Result<(), SepaError> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    fn close(&mut self, name: &str) -> Result<(), SepaError> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn leaf(&mut self, name: &str, text: &str) -> Result<(), SepaError> {
        self.open(name)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn amount(&mut self, name: &str, cents: u64) -> Result<(), SepaError> {
        let mut start = BytesStart::new(name);
        start.push_attribute(("Ccy", "EUR"));
        self.write(Event::Start(start))?;
        self.write(Event::Text(BytesText::new(&format_decimal(cents))))?;
        self.close(name)
    }

    fn finish(self) -> Result<String, SepaError> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| SepaError::Xml(e.to_string()))
    }
}

/// SEPA text fields are capped at 70 characters.
fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Render a pain.008 document for one batch of debits.
pub fn pain008(
    creditor: &SepaCreditor,
    batch: &SepaBatch,
    debits: &[SepaDebit],
) -> Result<String, SepaError> {
    if debits.is_empty() {
        return Err(SepaError::Empty);
    }
    let iban = creditor
        .iban
        .as_deref()
        .ok_or(SepaError::MissingCreditorData("the company IBAN"))?;
    let iban = normalize_iban(iban).map_err(|e| SepaError::InvalidCreditorData(e.to_string()))?;
    let creditor_id = creditor
        .creditor_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(SepaError::MissingCreditorData("the SEPA creditor identifier"))?;
    let bic = creditor.bic.as_deref().map(str::trim).filter(|b| !b.is_empty());
    if let Some(bic) = bic {
        if !is_valid_bic(bic) {
            return Err(SepaError::InvalidCreditorData(format!("'{bic}' is not a BIC")));
        }
    }

    let count = debits.len().to_string();
    let control_sum = format_decimal(debits.iter().map(|d| d.amount).sum());

    let mut xml = Xml::new();
    xml.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("Document");
    root.push_attribute(("xmlns", NAMESPACE));
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    xml.write(Event::Start(root))?;
    xml.open("CstmrDrctDbtInitn")?;

    xml.open("GrpHdr")?;
    xml.leaf("MsgId", &batch.message_id)?;
    xml.leaf("CreDtTm", &batch.created_at.format("%Y-%m-%dT%H:%M:%S").to_string())?;
    xml.leaf("NbOfTxs", &count)?;
    xml.leaf("CtrlSum", &control_sum)?;
    xml.open("InitgPty")?;
    xml.leaf("Nm", &truncate(&creditor.name, 70))?;
    xml.close("InitgPty")?;
    xml.close("GrpHdr")?;

    xml.open("PmtInf")?;
    xml.leaf("PmtInfId", &format!("{}-{}", batch.message_id, batch.sequence_type.code()))?;
    xml.leaf("PmtMtd", "DD")?;
    xml.leaf("BtchBookg", "true")?;
    xml.leaf("NbOfTxs", &count)?;
    xml.leaf("CtrlSum", &control_sum)?;
    xml.open("PmtTpInf")?;
    xml.open("SvcLvl")?;
    xml.leaf("Cd", "SEPA")?;
    xml.close("SvcLvl")?;
    xml.open("LclInstrm")?;
    xml.leaf("Cd", "CORE")?;
    xml.close("LclInstrm")?;
    xml.leaf("SeqTp", batch.sequence_type.code())?;
    xml.close("PmtTpInf")?;
    xml.leaf("ReqdColltnDt", &batch.collection_date.format("%Y-%m-%d").to_string())?;
    xml.open("Cdtr")?;
    xml.leaf("Nm", &truncate(&creditor.name, 70))?;
    xml.close("Cdtr")?;
    xml.open("CdtrAcct")?;
    xml.open("Id")?;
    xml.leaf("IBAN", &iban)?;
    xml.close("Id")?;
    xml.close("CdtrAcct")?;
    xml.open("CdtrAgt")?;
    xml.open("FinInstnId")?;
    match bic {
        Some(bic) => xml.leaf("BIC", bic)?,
        None => {
            xml.open("Othr")?;
            xml.leaf("Id", "NOTPROVIDED")?;
            xml.close("Othr")?;
        }
    }
    xml.close("FinInstnId")?;
    xml.close("CdtrAgt")?;
    xml.leaf("ChrgBr", "SLEV")?;
    xml.open("CdtrSchmeId")?;
    xml.open("Id")?;
    xml.open("PrvtId")?;
    xml.open("Othr")?;
    xml.leaf("Id", creditor_id)?;
    xml.open("SchmeNm")?;
    xml.leaf("Prtry", "SEPA")?;
    xml.close("SchmeNm")?;
    xml.close("Othr")?;
    xml.close("PrvtId")?;
    xml.close("Id")?;
    xml.close("CdtrSchmeId")?;

    for debit in debits {
        xml.open("DrctDbtTxInf")?;
        xml.open("PmtId")?;
        xml.leaf("EndToEndId", &truncate(&debit.end_to_end_id, 35))?;
        xml.close("PmtId")?;
        xml.amount("InstdAmt", debit.amount)?;
        xml.open("DrctDbtTx")?;
        xml.open("MndtRltdInf")?;
        xml.leaf("MndtId", &debit.mandate_id)?;
        xml.leaf("DtOfSgntr", &debit.mandate_signed_on.format("%Y-%m-%d").to_string())?;
        xml.close("MndtRltdInf")?;
        xml.close("DrctDbtTx")?;
        xml.open("DbtrAgt")?;
        xml.open("FinInstnId")?;
        xml.open("Othr")?;
        xml.leaf("Id", "NOTPROVIDED")?;
        xml.close("Othr")?;
        xml.close("FinInstnId")?;
        xml.close("DbtrAgt")?;
        xml.open("Dbtr")?;
        xml.leaf("Nm", &truncate(&debit.debtor_name, 70))?;
        xml.close("Dbtr")?;
        xml.open("DbtrAcct")?;
        xml.open("Id")?;
        xml.leaf("IBAN", &debit.debtor_iban)?;
        xml.close("Id")?;
        xml.close("DbtrAcct")?;
        xml.open("RmtInf")?;
        xml.leaf("Ustrd", &truncate(&debit.remittance_info, 140))?;
        xml.close("RmtInf")?;
        xml.close("DrctDbtTxInf")?;
    }

    xml.close("PmtInf")?;
    xml.close("CstmrDrctDbtInitn")?;
    xml.close("Document")?;
    xml.finish()
}
