//! Schema Management Engine
//!
//! # Lifecycle
//!
//! 1. **Inference**: a batch's fields become a candidate [`Schema`]
//! 2. **Validation**: each batch is reconciled against the registered schema
//!    under a [`SchemaMode`] and [`SchemaContracts`]
//! 3. **Evolution**: type changes fan out into variant columns; a column's
//!    recorded type is never rewritten
//! 4. **Registration**: the result is persisted as a new, immutable version
//!    and its per-column type lineage is recorded
//!
//! Batches are Apache Arrow [`RecordBatch`](arrow::record_batch::RecordBatch)es.
//! Column types are canonical type strings (see [`types`]).
//!
//! # Modules
//!
//! - [`types`]: canonical type vocabulary and its Arrow mapping
//! - [`model`]: Column, Schema, modes and evolution flags
//! - [`inference`]: TypeInferrer and nested-field flattening
//! - [`evolution`]: additive schema diff with variant columns
//! - [`contracts`]: contract mode resolution
//! - [`validation`]: batch validation and row/column discarding
//! - [`lineage`]: per-column type history
//! - [`storage`]: storage trait plus in-memory and JSON-file backends
//! - [`version`]: version ids and the version clock
//! - [`registry`]: versioned schemas per recipe
//! - [`config`]: the recipe `schema:` block

pub mod config;
pub mod contracts;
pub mod error;
pub mod evolution;
pub mod inference;
pub mod lineage;
pub mod model;
pub mod registry;
pub mod storage;
pub mod types;
pub mod validation;
pub mod version;

pub use config::{ColumnConfig, SchemaConfig};
pub use contracts::{ContractMode, SchemaContracts};
pub use error::SchemaError;
pub use evolution::{PolicyViolation, SchemaEvolution, SchemaUpdate};
pub use inference::{InferenceResult, ReflectionLevel, TypeInferrer};
pub use lineage::{LineageEntry, SchemaLineage};
pub use model::{Column, EvolutionPolicy, Metadata, Schema, SchemaMode};
pub use registry::SchemaRegistry;
pub use storage::{InMemorySchemaStorage, LocalJsonSchemaStorage, SchemaStorage, StorageError};
pub use types::{arrow_to_canonical, canonical_to_arrow, normalize_type};
pub use validation::{IssueLevel, SchemaValidator, ValidationIssue, ValidationResult};
pub use version::{VersionClock, VersionId, VersionStrategy};
