pub mod html;
pub mod json;

pub use html::{
    export_html,
    HtmlReport,
    HtmlSelection,
};
pub use json::{
    export_notes,
    ExportReport,
    Selection,
};
