// Report rendering: Markdown document plus CSV exports.

pub mod export;
pub mod markdown;

pub use export::{biomarkers_csv, findings_csv};
pub use markdown::render_markdown;
