// Configuration loading

pub mod settings;

pub use settings::{ConfigError, NameCase, NameStyle, ParseError, Settings};
