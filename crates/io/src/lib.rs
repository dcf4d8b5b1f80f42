// File I/O operations

pub mod error;
pub mod xml;

pub use error::IoError;
pub use xml::{load, read_version, read_xml, save, saved_version, write_xml};
