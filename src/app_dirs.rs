use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("lockedin"))
        } else {
            ProjectDirs::from("", "", "lockedin").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn history_db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("history.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("lockedin.log"))
    }

    pub fn preferences_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lockedin").map(|proj_dirs| proj_dirs.config_dir().join("sound.json"))
    }
}
