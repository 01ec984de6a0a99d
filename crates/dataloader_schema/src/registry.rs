//! Versioned schemas per recipe, with lineage.
//!
//! The registry is an explicit value: build one at startup and pass it by
//! reference. Persistence is delegated to a [`SchemaStorage`] backend; the
//! lineage it keeps is in-memory and can be replayed from storage with
//! [`SchemaRegistry::rebuild_lineage`].
//!
//! A single writer per recipe is assumed. Concurrent `register` calls for the
//! same recipe must be serialized by the caller.

use tracing::{debug, info};

use crate::evolution::{SchemaEvolution, SchemaUpdate};
use crate::lineage::{LineageEntry, SchemaLineage};
use crate::model::Schema;
use crate::storage::{InMemorySchemaStorage, SchemaStorage, StorageError};
use crate::version::{VersionClock, VersionId, VersionStrategy};

pub struct SchemaRegistry<S: SchemaStorage> {
    storage: S,
    lineage: SchemaLineage,
    evolution: SchemaEvolution,
    clock: VersionClock,
}

impl SchemaRegistry<InMemorySchemaStorage> {
    pub fn in_memory() -> Self {
        Self::new(InMemorySchemaStorage::new())
    }
}

impl<S: SchemaStorage> SchemaRegistry<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            lineage: SchemaLineage::new(),
            evolution: SchemaEvolution::new(),
            clock: VersionClock::default(),
        }
    }

    pub fn with_version_strategy(mut self, strategy: VersionStrategy) -> Self {
        self.clock = VersionClock::new(strategy);
        self
    }

    /// Evolution used by [`SchemaRegistry::compare`].
    pub fn with_evolution(mut self, evolution: SchemaEvolution) -> Self {
        self.evolution = evolution;
        self
    }

    /// Start from previously saved lineage.
    pub fn with_lineage(mut self, lineage: SchemaLineage) -> Self {
        self.lineage = lineage;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn schema_lineage(&self) -> &SchemaLineage {
        &self.lineage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Persist `schema` as a new version of `recipe` and record its lineage.
    ///
    /// Without an explicit `version` the next id comes from the version clock.
    /// The schema is stored as given.
    pub fn register(
        &mut self,
        recipe: &str,
        schema: &Schema,
        version: Option<VersionId>,
    ) -> Result<VersionId, StorageError> {
        let version = match version {
            Some(version) => version,
            None => {
                let newest = self.storage.latest_version(recipe)?;
                self.clock.next(recipe, newest.as_ref())
            }
        };
        self.storage.save(recipe, &version, schema)?;
        self.lineage.record(recipe, version.as_str(), schema);
        info!(
            "Registered schema {}@{} ({} columns)",
            recipe,
            version,
            schema.len()
        );
        Ok(version)
    }

    /// Register only when the column set differs from the latest version.
    pub fn register_if_changed(
        &mut self,
        recipe: &str,
        schema: &Schema,
    ) -> Result<Option<VersionId>, StorageError> {
        if let Some((version, latest)) = self.latest(recipe)? {
            if latest.same_columns(schema) {
                debug!("Schema for {} unchanged since {}", recipe, version);
                return Ok(None);
            }
        }
        self.register(recipe, schema, None).map(Some)
    }

    /// Load one version; `None` when it does not exist.
    pub fn get(&self, recipe: &str, version: &VersionId) -> Result<Option<Schema>, StorageError> {
        match self.storage.load(recipe, version) {
            Ok(schema) => Ok(Some(schema)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn list_versions(&self, recipe: &str) -> Result<Vec<VersionId>, StorageError> {
        self.storage.list_versions(recipe)
    }

    pub fn latest(&self, recipe: &str) -> Result<Option<(VersionId, Schema)>, StorageError> {
        let Some(version) = self.storage.latest_version(recipe)? else {
            return Ok(None);
        };
        Ok(self.get(recipe, &version)?.map(|schema| (version, schema)))
    }

    /// Diff `new_schema` against a stored version without touching storage.
    /// `None` when the base version does not exist.
    pub fn compare(
        &self,
        recipe: &str,
        base_version: &VersionId,
        new_schema: &Schema,
    ) -> Result<Option<SchemaUpdate>, StorageError> {
        let Some(current) = self.get(recipe, base_version)? else {
            return Ok(None);
        };
        let (_, update) = self.evolution.apply(&current, new_schema);
        Ok(Some(update))
    }

    pub fn lineage(&self, recipe: &str, column: &str) -> &[LineageEntry] {
        self.lineage.get(recipe, column)
    }

    /// Replay every stored version of `recipe` into lineage, oldest first.
    /// Returns the number of versions replayed.
    pub fn rebuild_lineage(&mut self, recipe: &str) -> Result<usize, StorageError> {
        let versions = self.storage.list_versions(recipe)?;
        let schemas = versions
            .iter()
            .map(|version| self.storage.load(recipe, version))
            .collect::<Result<Vec<_>, _>>()?;

        self.lineage.clear_recipe(recipe);
        for (version, schema) in versions.iter().zip(&schemas) {
            self.lineage.record(recipe, version.as_str(), schema);
        }
        info!("Rebuilt lineage for {} from {} versions", recipe, versions.len());
        Ok(versions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn v1_schema() -> Schema {
        Schema::new(vec![Column::new("id", "int"), Column::new("name", "string")])
    }

    #[test]
    fn test_register_and_get_round_trip() {
        let mut registry = SchemaRegistry::in_memory();
        let schema = v1_schema().with_metadata("owner", "etl");
        let version = registry.register("orders", &schema, None).unwrap();

        assert_eq!(registry.get("orders", &version).unwrap(), Some(schema));
        assert_eq!(registry.list_versions("orders").unwrap(), vec![version]);
    }

    #[test]
    fn test_default_versions_increase() {
        let mut registry = SchemaRegistry::in_memory();
        let first = registry.register("orders", &v1_schema(), None).unwrap();
        let second = registry.register("orders", &v1_schema(), None).unwrap();
        assert!(second > first);
        assert!(first.timestamp().is_some());
        assert_eq!(registry.list_versions("orders").unwrap(), vec![first, second]);
    }

    #[test]
    fn test_explicit_version_is_verbatim_and_write_once() {
        let mut registry = SchemaRegistry::in_memory();
        let version = VersionId::parse("release-1").unwrap();
        let got = registry
            .register("orders", &v1_schema(), Some(version.clone()))
            .unwrap();
        assert_eq!(got, version);

        let dup = registry.register("orders", &Schema::default(), Some(version.clone()));
        assert!(matches!(dup, Err(StorageError::VersionExists { .. })));
        assert_eq!(registry.get("orders", &version).unwrap(), Some(v1_schema()));
    }

    #[test]
    fn test_counter_strategy() {
        let mut registry =
            SchemaRegistry::in_memory().with_version_strategy(VersionStrategy::Counter);
        assert_eq!(
            registry.register("a", &v1_schema(), None).unwrap().as_str(),
            "v000001"
        );
        assert_eq!(
            registry.register("a", &v1_schema(), None).unwrap().as_str(),
            "v000002"
        );
    }

    #[test]
    fn test_counter_continues_past_six_digits_after_restart() {
        let mut registry =
            SchemaRegistry::in_memory().with_version_strategy(VersionStrategy::Counter);
        registry
            .register("a", &v1_schema(), Some(VersionId::from_counter(999_999)))
            .unwrap();
        let next = registry.register("a", &v1_schema(), None).unwrap();
        assert_eq!(next.as_str(), "v1000000");
        assert_eq!(registry.latest("a").unwrap().unwrap().0, next);

        let mut restarted = SchemaRegistry::new(registry.into_storage())
            .with_version_strategy(VersionStrategy::Counter);
        let after = restarted.register("a", &v1_schema(), None).unwrap();
        assert_eq!(after.as_str(), "v1000001");
    }

    #[test]
    fn test_get_missing_is_none() {
        let registry = SchemaRegistry::in_memory();
        let version = VersionId::parse("v1").unwrap();
        assert_eq!(registry.get("orders", &version).unwrap(), None);
        assert!(registry.latest("orders").unwrap().is_none());
    }

    #[test]
    fn test_compare_is_a_dry_run() {
        let mut registry = SchemaRegistry::in_memory();
        let base = registry.register("orders", &v1_schema(), None).unwrap();
        let incoming = Schema::new(vec![
            Column::new("id", "string"),
            Column::new("name", "string"),
            Column::new("email", "string"),
        ]);

        let update = registry.compare("orders", &base, &incoming).unwrap().unwrap();
        assert_eq!(update.added_columns, vec!["email"]);
        assert_eq!(update.type_changes, vec!["id"]);
        assert_eq!(update.variant_columns, vec!["id__v_string"]);

        assert_eq!(registry.list_versions("orders").unwrap().len(), 1);
        assert_eq!(registry.get("orders", &base).unwrap(), Some(v1_schema()));

        let missing = VersionId::parse("nope").unwrap();
        assert!(registry.compare("orders", &missing, &incoming).unwrap().is_none());
    }

    #[test]
    fn test_register_if_changed() {
        let mut registry = SchemaRegistry::in_memory();
        let first = registry.register_if_changed("orders", &v1_schema()).unwrap();
        assert!(first.is_some());

        let reordered = Schema::new(vec![Column::new("name", "string"), Column::new("id", "int")]);
        assert!(registry.register_if_changed("orders", &reordered).unwrap().is_none());

        let widened = v1_schema().with_columns(vec![
            Column::new("id", "int"),
            Column::new("name", "string"),
            Column::new("email", "string"),
        ]);
        assert!(registry.register_if_changed("orders", &widened).unwrap().is_some());
        assert_eq!(registry.list_versions("orders").unwrap().len(), 2);
    }

    #[test]
    fn test_lineage_tracks_registrations() {
        let mut registry =
            SchemaRegistry::in_memory().with_version_strategy(VersionStrategy::Counter);
        registry.register("orders", &v1_schema(), None).unwrap();
        let v2 = Schema::new(vec![Column::new("id", "string"), Column::new("name", "string")]);
        registry.register("orders", &v2, None).unwrap();

        let history = registry.lineage("orders", "id");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].data_type, "int");
        assert_eq!(history[1].data_type, "string");
        assert_eq!(registry.lineage("orders", "name").len(), 2);
    }

    #[test]
    fn test_rebuild_lineage_from_storage() {
        let mut registry =
            SchemaRegistry::in_memory().with_version_strategy(VersionStrategy::Counter);
        registry.register("orders", &v1_schema(), None).unwrap();
        registry.register("orders", &v1_schema(), None).unwrap();
        let storage = registry.into_storage();

        let mut restarted = SchemaRegistry::new(storage);
        assert!(restarted.lineage("orders", "id").is_empty());
        assert_eq!(restarted.rebuild_lineage("orders").unwrap(), 2);
        assert_eq!(restarted.lineage("orders", "id").len(), 2);

        assert_eq!(restarted.rebuild_lineage("orders").unwrap(), 2);
        assert_eq!(restarted.lineage("orders", "id").len(), 2);
    }
}
