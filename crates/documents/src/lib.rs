//! Printable commercial documents and their PDF rendering.

pub mod format;
pub mod pdf;
pub mod printable;

pub use pdf::{RenderError, paginate, render_pdf};
pub use printable::{CompanyBlock, PrintableDocument};
