//! Schema version storage.
//!
//! [`SchemaStorage`] is the durability seam of the registry. Two backends:
//! [`InMemorySchemaStorage`] for tests and embedding, and
//! [`LocalJsonSchemaStorage`], one pretty-printed JSON document per version
//! at `<base>/<recipe>/<version>.json`.
//!
//! Versions are write-once in every backend: saving an existing
//! `(recipe, version)` fails with [`StorageError::VersionExists`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::model::Schema;
use crate::version::VersionId;

const DOCUMENT_EXTENSION: &str = "json";

/// Errors that can occur in schema storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Version {version} already exists for recipe {recipe}")]
    VersionExists { recipe: String, version: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Schema not found: {recipe}@{version}")]
    NotFound { recipe: String, version: String },
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl StorageError {
    fn not_found(recipe: &str, version: &VersionId) -> Self {
        StorageError::NotFound {
            recipe: recipe.to_string(),
            version: version.to_string(),
        }
    }

    fn exists(recipe: &str, version: &VersionId) -> Self {
        StorageError::VersionExists {
            recipe: recipe.to_string(),
            version: version.to_string(),
        }
    }
}

/// Durable home of schema versions, keyed by `(recipe, version)`.
pub trait SchemaStorage {
    /// Persist a new version. Never overwrites.
    fn save(&mut self, recipe: &str, version: &VersionId, schema: &Schema)
        -> Result<(), StorageError>;

    fn load(&self, recipe: &str, version: &VersionId) -> Result<Schema, StorageError>;

    /// All versions of `recipe`, ascending. Unknown recipes have none.
    fn list_versions(&self, recipe: &str) -> Result<Vec<VersionId>, StorageError>;

    fn latest_version(&self, recipe: &str) -> Result<Option<VersionId>, StorageError> {
        Ok(self.list_versions(recipe)?.pop())
    }
}

/// Map-backed storage.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaStorage {
    recipes: HashMap<String, BTreeMap<VersionId, Schema>>,
}

impl InMemorySchemaStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStorage for InMemorySchemaStorage {
    fn save(
        &mut self,
        recipe: &str,
        version: &VersionId,
        schema: &Schema,
    ) -> Result<(), StorageError> {
        let versions = self.recipes.entry(recipe.to_string()).or_default();
        if versions.contains_key(version) {
            return Err(StorageError::exists(recipe, version));
        }
        versions.insert(version.clone(), schema.clone());
        Ok(())
    }

    fn load(&self, recipe: &str, version: &VersionId) -> Result<Schema, StorageError> {
        self.recipes
            .get(recipe)
            .and_then(|versions| versions.get(version))
            .cloned()
            .ok_or_else(|| StorageError::not_found(recipe, version))
    }

    fn list_versions(&self, recipe: &str) -> Result<Vec<VersionId>, StorageError> {
        Ok(self
            .recipes
            .get(recipe)
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default())
    }
}

/// One JSON document per version under a base directory.
#[derive(Debug, Clone)]
pub struct LocalJsonSchemaStorage {
    base_path: PathBuf,
}

impl LocalJsonSchemaStorage {
    /// Open storage rooted at `base_path`, creating the directory if needed.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        debug!("Schema storage at {}", base_path.display());
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn recipe_dir(&self, recipe: &str) -> Result<PathBuf, StorageError> {
        check_key(recipe)?;
        Ok(self.base_path.join(recipe))
    }

    fn document_path(&self, recipe: &str, version: &VersionId) -> Result<PathBuf, StorageError> {
        check_key(version.as_str())?;
        Ok(self
            .recipe_dir(recipe)?
            .join(format!("{}.{}", version, DOCUMENT_EXTENSION)))
    }
}

impl SchemaStorage for LocalJsonSchemaStorage {
    fn save(
        &mut self,
        recipe: &str,
        version: &VersionId,
        schema: &Schema,
    ) -> Result<(), StorageError> {
        let path = self.document_path(recipe, version)?;
        if path.exists() {
            return Err(StorageError::exists(recipe, version));
        }
        let dir = self.recipe_dir(recipe)?;
        fs::create_dir_all(&dir)?;

        let body = serde_json::to_vec_pretty(schema)?;
        let tmp = dir.join(format!(".{}.{}.tmp", version, DOCUMENT_EXTENSION));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        // A concurrent writer may have won between the check and here.
        if path.exists() {
            fs::remove_file(&tmp)?;
            return Err(StorageError::exists(recipe, version));
        }
        fs::rename(&tmp, &path)?;
        info!("Saved schema {}@{} to {}", recipe, version, path.display());
        Ok(())
    }

    fn load(&self, recipe: &str, version: &VersionId) -> Result<Schema, StorageError> {
        let path = self.document_path(recipe, version)?;
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(recipe, version));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&body)?)
    }

    fn list_versions(&self, recipe: &str) -> Result<Vec<VersionId>, StorageError> {
        let dir = self.recipe_dir(recipe)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            if let Ok(version) = VersionId::parse(stem) {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }
}

/// Reject keys that would escape their directory.
fn check_key(key: &str) -> Result<(), StorageError> {
    if key.trim().is_empty()
        || key.contains(['/', '\\'])
        || key.contains("..")
        || key.starts_with('.')
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
