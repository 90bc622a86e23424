// src/acquisition/naming.rs
//! Recording directory, project name and trial file naming

use crate::config::constants::storage;
use crate::config::FileSettings;
use crate::error::DaqResult;
use crate::utils::validation::{validate_directory, validate_project};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Operator-adjustable output location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub directory: String,
    pub project: String,
    pub default_directory: String,
    pub default_project: String,
}

impl RecordingSettings {
    pub fn new(defaults: &FileSettings) -> Self {
        Self {
            directory: defaults.default_directory.clone(),
            project: defaults.default_project.clone(),
            default_directory: defaults.default_directory.clone(),
            default_project: defaults.default_project.clone(),
        }
    }

    /// Validate both values first; nothing changes unless both pass
    pub fn update(&mut self, directory: Option<&str>, project: Option<&str>) -> DaqResult<()> {
        if let Some(dir) = directory {
            validate_directory(dir)?;
        }
        if let Some(proj) = project {
            validate_project(proj)?;
        }

        if let Some(dir) = directory {
            self.directory = dir.to_string();
        }
        if let Some(proj) = project {
            self.project = proj.to_string();
        }
        Ok(())
    }

    /// Path of the binary log for `trial`, stamped with `now`
    pub fn trial_log_path(&self, trial: u32, now: DateTime<Local>) -> PathBuf {
        Path::new(&self.directory).join(trial_file_name(trial, &self.project, now))
    }
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self::new(&FileSettings::default())
    }
}

/// `20240131_142501_swallow_JET_20240131_Trl007.bin`
pub fn trial_file_name(trial: u32, project: &str, now: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}_Trl{:03}.{}",
        now.format("%Y%m%d_%H%M%S"),
        project,
        now.format("%Y%m%d"),
        trial,
        storage::LOG_EXTENSION
    )
}

/// Sidecar for a log file: `<dir>/metadata/<stem>_metadata.json`
pub fn metadata_path(log_path: &Path) -> PathBuf {
    let stem = log_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    metadata_dir(log_path).join(format!(
        "{}{}.{}",
        stem,
        storage::METADATA_SUFFIX,
        storage::METADATA_EXTENSION
    ))
}

/// `metadata/` next to the log file
pub fn metadata_dir(log_path: &Path) -> PathBuf {
    log_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(storage::METADATA_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 31, 14, 25, 1).unwrap()
    }

    #[test]
    fn test_trial_file_name() {
        let name = trial_file_name(7, "swallow_JET", fixed_time());
        assert_eq!(name, "20240131_142501_swallow_JET_20240131_Trl007.bin");

        let name = trial_file_name(1234, "p", fixed_time());
        assert!(name.ends_with("_Trl1234.bin"));
    }

    #[test]
    fn test_metadata_path() {
        let log = Path::new("data/20240131_142501_p_20240131_Trl001.bin");
        assert_eq!(
            metadata_path(log),
            Path::new("data/metadata/20240131_142501_p_20240131_Trl001_metadata.json")
        );
    }

    #[test]
    fn test_settings_defaults() {
        let settings = RecordingSettings::default();
        assert_eq!(settings.directory, "data");
        assert_eq!(settings.project, "swallow_JET");
        assert_eq!(settings.default_directory, settings.directory);

        let path = settings.trial_log_path(1, fixed_time());
        assert_eq!(
            path,
            Path::new("data/20240131_142501_swallow_JET_20240131_Trl001.bin")
        );
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut settings = RecordingSettings::default();

        let err = settings
            .update(Some("trials/ok"), Some("bad project!"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(settings, RecordingSettings::default());

        settings.update(Some("trials/ok"), None).unwrap();
        assert_eq!(settings.directory, "trials/ok");
        assert_eq!(settings.project, "swallow_JET");
        assert_eq!(settings.default_directory, "data");
    }
}
