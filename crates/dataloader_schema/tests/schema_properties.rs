//! Property tests for evolution, inference, lineage and registry invariants.

use dataloader_schema::{
    Column, InMemorySchemaStorage, ReflectionLevel, Schema, SchemaEvolution, SchemaLineage,
    SchemaRegistry, TypeInferrer,
};
use proptest::prelude::*;

const TYPES: &[&str] = &[
    "int", "integer", "string", "str", "float", "double", "bool", "date", "datetime",
    "list<int>", "struct<x: int, y: str>",
];

fn type_name() -> impl Strategy<Value = String> {
    prop::sample::select(TYPES).prop_map(str::to_string)
}

/// Small schemas with unique column names.
fn schema() -> impl Strategy<Value = Schema> {
    prop::collection::btree_map("[a-z]{1,6}", (type_name(), any::<bool>()), 0..8).prop_map(
        |cols| {
            Schema::new(
                cols.into_iter()
                    .map(|(name, (ty, nullable))| Column::new(name, ty).with_nullable(nullable))
                    .collect(),
            )
        },
    )
}

/// A schema and a second one sharing some of its names with other types.
fn schema_pair() -> impl Strategy<Value = (Schema, Schema)> {
    (schema(), schema()).prop_map(|(current, other)| {
        let mut incoming = current.clone();
        for (col, alt) in incoming.columns.iter_mut().zip(other.columns.iter()) {
            col.data_type = alt.data_type.clone();
        }
        for col in other.columns {
            if !incoming.contains(&col.name) {
                incoming.columns.push(col);
            }
        }
        (current, incoming)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_apply_to_self_is_noop(s in schema()) {
        let (updated, update) = SchemaEvolution::new().apply(&s, &s);
        prop_assert_eq!(updated, s);
        prop_assert!(update.is_empty());
    }

    #[test]
    fn prop_reapplication_adds_nothing((current, incoming) in schema_pair()) {
        let evolution = SchemaEvolution::new();
        let (first, _) = evolution.apply(&current, &incoming);
        let (second, update) = evolution.apply(&first, &incoming);

        prop_assert_eq!(&second, &first);
        prop_assert!(update.added_columns.is_empty());
        prop_assert!(update.variant_columns.is_empty());
        prop_assert!(update.type_changes.is_empty());
    }

    #[test]
    fn prop_evolution_is_additive((current, incoming) in schema_pair()) {
        let (updated, update) = SchemaEvolution::new().apply(&current, &incoming);

        prop_assert_eq!(&updated.columns[..current.len()], &current.columns[..]);
        prop_assert_eq!(
            updated.len(),
            current.len() + update.added_columns.len() + update.variant_columns.len()
        );
        for name in &update.variant_columns {
            let variant = updated.column(name).unwrap();
            prop_assert!(variant.variant_of.is_some());
        }
    }

    #[test]
    fn prop_arrow_round_trip(s in schema()) {
        let arrow_schema = s.to_arrow_schema().unwrap();
        let back = Schema::from_arrow_schema(&arrow_schema);

        prop_assert_eq!(back.len(), s.len());
        for (orig, got) in s.columns.iter().zip(back.columns.iter()) {
            prop_assert_eq!(&got.name, &orig.name);
            prop_assert_eq!(&got.data_type, &orig.data_type);
            prop_assert_eq!(got.nullable, orig.nullable);
        }
    }

    #[test]
    fn prop_inference_is_deterministic(s in schema(), deep in any::<bool>()) {
        let level = if deep { ReflectionLevel::Deep } else { ReflectionLevel::Shallow };
        let arrow_schema = s.to_arrow_schema().unwrap();
        let inferrer = TypeInferrer::new(level);

        let first = inferrer.infer_schema(&arrow_schema);
        let second = inferrer.infer_schema(&arrow_schema);
        prop_assert_eq!(first.schema.column_names(), second.schema.column_names());
        prop_assert_eq!(first.schema, second.schema);
    }

    #[test]
    fn prop_lineage_record_is_idempotent(s in schema(), other in schema()) {
        let mut lineage = SchemaLineage::new();
        lineage.record("r", "v1", &s);
        let before: Vec<usize> = s.columns.iter().map(|c| lineage.get("r", &c.name).len()).collect();

        prop_assert_eq!(lineage.record("r", "v1", &s), 0);
        let after: Vec<usize> = s.columns.iter().map(|c| lineage.get("r", &c.name).len()).collect();
        prop_assert_eq!(before, after);

        lineage.record("r", "v2", &other);
        for col in &other.columns {
            let history = lineage.get("r", &col.name);
            prop_assert_eq!(history.last().map(|e| e.version.as_str()), Some("v2"));
        }
    }

    #[test]
    fn prop_registry_round_trip(s in schema()) {
        let mut registry = SchemaRegistry::new(InMemorySchemaStorage::new());
        let version = registry.register("recipe", &s, None).unwrap();
        prop_assert_eq!(registry.get("recipe", &version).unwrap(), Some(s));
    }
}
