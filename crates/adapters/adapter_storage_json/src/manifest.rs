//! `pack.json` manifests and pack folder resolution.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use nudge_domain::error::{NotFoundError, NudgeError};

use crate::error::StorageError;

pub const MANIFEST_FILE: &str = "pack.json";

/// The parts of a manifest the engine reads. Everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub pack_info: PackInfo,
    pub character: Character,
    pub logic: Logic,
    pub audio: Audio,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackInfo {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Character {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Logic {
    pub interaction_configs: InteractionConfigs,
    /// Older manifests put the rule file here.
    pub triggers: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InteractionConfigs {
    pub triggers: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Audio {
    pub event_audio_dir: Option<String>,
}

impl Manifest {
    #[must_use]
    pub fn rule_file(&self) -> Option<&str> {
        self.logic
            .interaction_configs
            .triggers
            .as_deref()
            .or(self.logic.triggers.as_deref())
    }

    /// Display name: character, then pack name, then the given fallback.
    #[must_use]
    pub fn display_name(&self, fallback: &str) -> String {
        self.character
            .name
            .clone()
            .or_else(|| self.pack_info.name.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// A pack folder found on disk.
#[derive(Debug, Clone)]
pub struct PackDir {
    /// Manifest id, or the folder name when the manifest declares none.
    pub id: String,
    pub root: PathBuf,
    pub manifest: Manifest,
}

impl PackDir {
    /// Resolve a manifest path against the pack root. Absolute paths are kept.
    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn folder_name(&self) -> &str {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

/// Finds pack folders under a packs directory.
#[derive(Debug, Clone)]
pub struct PackLocator {
    packs_dir: PathBuf,
}

impl PackLocator {
    pub fn new(packs_dir: impl Into<PathBuf>) -> Self {
        Self {
            packs_dir: packs_dir.into(),
        }
    }

    #[must_use]
    pub fn packs_dir(&self) -> &Path {
        &self.packs_dir
    }

    /// Every folder with a readable manifest, sorted by id.
    ///
    /// A missing packs directory yields an empty list. Unreadable manifests
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the packs directory cannot be listed.
    pub async fn scan(&self) -> Result<Vec<PackDir>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.packs_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %self.packs_dir.display(), "packs directory missing");
                return Ok(Vec::new());
            }
            Err(err) => return Err(StorageError::io(&self.packs_dir, err)),
        };

        let mut packs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StorageError::io(&self.packs_dir, err))?
        {
            let root = entry.path();
            let manifest_path = root.join(MANIFEST_FILE);
            if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
                continue;
            }
            match read_manifest(&manifest_path).await {
                Ok(manifest) => {
                    let folder = entry.file_name().to_string_lossy().into_owned();
                    let id = manifest.pack_info.id.clone().unwrap_or(folder);
                    packs.push(PackDir { id, root, manifest });
                }
                Err(err) => {
                    tracing::warn!(path = %manifest_path.display(), error = %err, "skipping unreadable manifest");
                }
            }
        }
        packs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(packs)
    }

    /// Find a pack by manifest id, falling back to its folder name.
    ///
    /// # Errors
    ///
    /// Returns [`NudgeError::NotFound`] when no folder matches.
    pub async fn locate(&self, pack_id: &str) -> Result<PackDir, NudgeError> {
        let mut packs = self.scan().await?;
        let index = packs
            .iter()
            .position(|pack| pack.id == pack_id)
            .or_else(|| packs.iter().position(|pack| pack.folder_name() == pack_id));
        match index {
            Some(index) => Ok(packs.swap_remove(index)),
            None => Err(NotFoundError {
                entity: "Pack",
                id: pack_id.to_string(),
            }
            .into()),
        }
    }
}

async fn read_manifest(path: &Path) -> Result<Manifest, StorageError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| StorageError::io(path, err))?;
    serde_json::from_slice(&bytes).map_err(|err| StorageError::json(path, err))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;

    pub(crate) fn write_pack(packs: &Path, folder: &str, manifest: &serde_json::Value) -> PathBuf {
        let root = packs.join(folder);
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        root
    }

    #[tokio::test]
    async fn should_locate_pack_by_manifest_id() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "Resona_Default", &json!({"pack_info": {"id": "resona"}}));

        let pack = PackLocator::new(dir.path()).locate("resona").await.unwrap();

        assert_eq!(pack.id, "resona");
        assert!(pack.root.ends_with("Resona_Default"));
    }

    #[tokio::test]
    async fn should_locate_pack_by_folder_name_when_id_differs() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "Resona_Default", &json!({"pack_info": {"id": "resona"}}));

        let pack = PackLocator::new(dir.path()).locate("Resona_Default").await.unwrap();

        assert_eq!(pack.id, "resona");
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_pack() {
        let dir = tempfile::tempdir().unwrap();

        let err = PackLocator::new(dir.path()).locate("ghost").await.unwrap_err();

        assert!(matches!(err, NudgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn should_skip_folders_without_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "good", &json!({}));
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        let broken = dir.path().join("broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join(MANIFEST_FILE), "{not json").unwrap();

        let packs = PackLocator::new(dir.path()).scan().await.unwrap();

        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].id, "good");
    }

    #[tokio::test]
    async fn should_treat_missing_packs_dir_as_empty() {
        let dir = tempfile::tempdir().unwrap();

        let packs = PackLocator::new(dir.path().join("nope")).scan().await.unwrap();

        assert!(packs.is_empty());
    }

    #[test]
    fn should_prefer_interaction_configs_rule_file() {
        let manifest: Manifest = serde_json::from_value(json!({
            "logic": {"interaction_configs": {"triggers": "a.json"}, "triggers": "b.json"}
        }))
        .unwrap();
        assert_eq!(manifest.rule_file(), Some("a.json"));
    }
}
