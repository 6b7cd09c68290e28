// SPDX-License-Identifier: MIT OR Apache-2.0
//! Export and import settings.
//!
//! Settings can be kept in a RON file so the command line tool and host
//! integrations share one configuration.

use crate::error::{Error, Result};
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default settings file name
pub const SETTINGS_FILE_NAME: &str = "nodeclip.ron";

/// Options for producing a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Omit simple properties that equal their declared default
    pub skip_defaults: bool,
    /// Record a diagnostic path on every serialized object
    pub write_paths: bool,
    /// Export trees referenced from group nodes ahead of the subject
    pub include_subtrees: bool,
    /// Encode documents in the compressed clipboard form
    pub compress: bool,
    /// Indentation of plain JSON output; zero means compact
    pub indent: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            skip_defaults: false,
            write_paths: false,
            include_subtrees: true,
            compress: true,
            indent: 0,
        }
    }
}

/// Options for applying a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Reuse locally owned trees with the same name instead of creating renamed copies
    pub overwrite: bool,
    /// Downgrade a version mismatch to a warning
    pub allow_version_mismatch: bool,
}

/// Combined settings as stored on disk
///
/// Unknown keys are rejected so a misspelled option does not silently fall
/// back to its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClipSettings {
    /// Export options
    pub export: ExportSettings,
    /// Import options
    pub import: ImportSettings,
}

impl ClipSettings {
    /// Parse settings from RON text; `origin` names the source in errors
    pub fn from_ron(text: &str, origin: &str) -> Result<Self> {
        ron::from_str(text).map_err(|source| Error::Settings {
            origin: origin.to_owned(),
            source,
        })
    }

    /// Render settings as pretty RON
    pub fn to_ron(&self) -> Result<String> {
        let config = PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a RON file
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Self::from_ron(&std::fs::read_to_string(path)?, &path.display().to_string())?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// Load settings if the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ron(&text, &path.display().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = ClipSettings::default();
        assert!(settings.export.include_subtrees);
        assert!(settings.export.compress);
        assert!(!settings.export.skip_defaults);
        assert!(!settings.import.overwrite);
        assert!(!settings.import.allow_version_mismatch);
    }

    #[test]
    fn test_settings_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);

        let mut settings = ClipSettings::default();
        settings.export.skip_defaults = true;
        settings.import.overwrite = true;
        settings.save(&path).unwrap();

        let loaded = ClipSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings = ClipSettings::from_ron("(import: (overwrite: true))", "inline").unwrap();
        assert!(settings.import.overwrite);
        assert!(settings.export.include_subtrees);
        assert_eq!(settings.export, ExportSettings::default());
    }

    #[test]
    fn test_misspelled_key_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "(exprot: (compress: false))").unwrap();

        match ClipSettings::load(&path) {
            Err(Error::Settings { origin, .. }) => assert!(origin.ends_with(SETTINGS_FILE_NAME)),
            other => panic!("expected a settings error, got {other:?}"),
        }
        assert!(matches!(ClipSettings::load_or_default(&path), Err(Error::Settings { .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ron");
        assert!(matches!(ClipSettings::load(&path), Err(Error::Io(_))));
        assert_eq!(ClipSettings::load_or_default(&path).unwrap(), ClipSettings::default());
    }
}
