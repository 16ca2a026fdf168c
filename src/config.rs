use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::app_dirs::AppDirs;

pub const DEFAULT_VOLUME: f32 = 0.7;

/// Durable sound preferences, set from the command line and read by the
/// alert bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(rename = "enabled")]
    pub sound_enabled: bool,
    volume: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl Preferences {
    pub fn new(sound_enabled: bool, volume: f32) -> Self {
        let mut prefs = Self {
            sound_enabled,
            volume: DEFAULT_VOLUME,
        };
        prefs.set_volume(volume);
        prefs
    }

    /// Always within `[0, 1]`, whatever was stored on disk.
    pub fn volume(&self) -> f32 {
        if self.volume.is_nan() {
            DEFAULT_VOLUME
        } else {
            self.volume.clamp(0.0, 1.0)
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() {
            DEFAULT_VOLUME
        } else {
            volume.clamp(0.0, 1.0)
        };
    }
}

pub trait PreferenceStore {
    fn load(&self) -> Preferences;
    fn save(&self, prefs: &Preferences) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::preferences_path().unwrap_or_else(|| PathBuf::from("lockedin_sound.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FilePreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Preferences {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Preferences>(&bytes) {
                Ok(prefs) => return prefs,
                Err(err) => warn!(path = %self.path.display(), error = %err, "ignoring unreadable sound preferences"),
            }
        }
        Preferences::default()
    }

    fn save(&self, prefs: &Preferences) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(prefs).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_preferences() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::with_path(dir.path().join("sound.json"));
        let prefs = Preferences::default();
        store.save(&prefs).unwrap();
        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn save_and_load_custom_preferences() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::with_path(dir.path().join("nested").join("sound.json"));
        let prefs = Preferences::new(false, 0.25);
        store.save(&prefs).unwrap();
        let loaded = store.load();
        assert!(!loaded.sound_enabled);
        assert_eq!(loaded.volume(), 0.25);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::with_path(dir.path().join("absent.json"));
        assert_eq!(store.load(), Preferences::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sound.json");
        fs::write(&path, b"{not json").unwrap();
        let store = FilePreferenceStore::with_path(&path);
        assert_eq!(store.load(), Preferences::default());
    }

    #[test]
    fn out_of_range_volume_is_clamped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sound.json");
        fs::write(&path, br#"{"enabled": true, "volume": 4.5}"#).unwrap();
        let loaded = FilePreferenceStore::with_path(&path).load();
        assert_eq!(loaded.volume(), 1.0);

        assert_eq!(Preferences::new(true, -1.0).volume(), 0.0);
        assert_eq!(Preferences::new(true, f32::NAN).volume(), DEFAULT_VOLUME);
    }
}
