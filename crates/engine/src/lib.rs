pub mod cell;
pub mod cell_name;
pub mod dep_graph;
pub mod error;
pub mod formula;
pub mod recalc;
pub mod spreadsheet;
pub mod store;

pub use cell::{CellContents, CellValue};
pub use cell_name::NamePolicy;
pub use error::SheetError;
pub use formula::{Formula, FormulaError, FormulaFormatError};
pub use recalc::CycleReport;
pub use spreadsheet::{SheetConfig, Spreadsheet};
