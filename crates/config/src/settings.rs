// Spreadsheet settings
// Loaded from ~/.config/tally/settings.json (or an explicit .json/.toml path)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_engine::cell_name::{is_a1_style, NamePolicy};
use tally_engine::spreadsheet::{SheetConfig, DEFAULT_VERSION};

/// How cell names are rewritten before validation and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCase {
    /// Names are compared exactly as typed
    #[default]
    Preserve,
    Upper,
    Lower,
}

impl NameCase {
    pub fn apply(self, name: &str) -> String {
        match self {
            NameCase::Preserve => name.to_string(),
            NameCase::Upper => name.to_uppercase(),
            NameCase::Lower => name.to_lowercase(),
        }
    }
}

/// Which names are accepted beyond the structural rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStyle {
    /// Any letter/underscore-led identifier
    #[default]
    Any,
    /// Letters followed by digits, e.g. A1 or AA100
    A1,
}

impl NameStyle {
    pub fn accepts(self, name: &str) -> bool {
        match self {
            NameStyle::Any => true,
            NameStyle::A1 => is_a1_style(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Written into saved documents and required when loading them
    pub version: String,

    #[serde(rename = "names.case")]
    pub name_case: NameCase,

    #[serde(rename = "names.style")]
    pub name_style: NameStyle,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            name_case: NameCase::default(),
            name_style: NameStyle::default(),
        }
    }
}

/// Failure reading, writing or encoding settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to encode JSON settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode TOML settings: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Settings text that does not deserialize.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load settings from `path`, falling back to defaults.
    ///
    /// A missing file is not an error. Unreadable or unparsable files are
    /// reported with `log::warn!`.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("error reading {}: {}, using defaults", path.display(), e);
                return Self::default();
            }
        };

        match Self::parse(&contents, is_toml(path)) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("error parsing {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings text; JSON may contain `//` comment lines.
    pub fn parse(contents: &str, toml: bool) -> Result<Self, ConfigError> {
        if toml {
            return Ok(toml::from_str(contents).map_err(ParseError::from)?);
        }

        // Strip comments (lines starting with //)
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(serde_json::from_str(&cleaned).map_err(ParseError::from)?)
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    /// Save settings to `path`, as TOML if the extension is `.toml`
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let text = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        fs::write(path, text).map_err(io_err)
    }

    pub fn name_policy(&self) -> NamePolicy {
        let case = self.name_case;
        let style = self.name_style;
        NamePolicy::new(move |name| style.accepts(name), move |name| case.apply(name))
    }

    /// Spreadsheet construction settings
    pub fn sheet_config(&self) -> SheetConfig {
        SheetConfig::new(self.name_policy(), self.version.clone())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
