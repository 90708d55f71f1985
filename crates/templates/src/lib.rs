//! Document templates (plantillas): layout and style used when printing
//! invoices, delivery notes and the other commercial documents.

pub mod style;
pub mod template;

pub use style::{
    ClientSection, FontFamily, FooterSection, HeaderSection, LinesSection, TemplateSections,
    TemplateStyle, TotalsSection,
};
pub use template::{
    CreateTemplate, DeleteTemplate, DocumentTemplate, DocumentType, SetDefaultTemplate,
    TemplateCommand, TemplateCreated, TemplateDefaultChanged, TemplateDeleted, TemplateDetails,
    TemplateEvent, TemplateId, TemplateUpdated, UpdateTemplate,
};
