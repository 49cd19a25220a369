//! synapse-scaffold
//!
//! Re-runnable scaffolding for layered Rust backends. From a list of entity
//! definitions it synthesizes, per entity, a domain model, a Postgres
//! repository, wire encoders and decoders and a use case, plus the shared
//! capability traits they depend on.
//!
//! Running it again over a tree it produced, and that has since been edited
//! by hand, is the normal case. Every target file is parsed with `syn` and
//! the generated declarations are merged in structurally: missing
//! declarations, fields, parameters, arguments and table entries are
//! appended, and nothing that is already there is changed or removed. A run
//! with nothing to add leaves every file untouched.
//!
//! ```no_run
//! use synapse_scaffold::{ProjectConfig, sync_project};
//!
//! let config = ProjectConfig::load("synapse.toml")?;
//! let report = sync_project(std::path::Path::new("."), &config)?;
//! assert!(report.is_success());
//! # Ok::<(), synapse_scaffold::GeneratorError>(())
//! ```

pub mod codegen;
pub mod config;
pub mod driver;
pub mod entity;
mod error;
pub mod layout;
pub mod merge;
pub mod store;
pub mod synth;
pub mod templates;
pub mod types;

pub use config::{Features, ProjectConfig};
pub use driver::{ArtifactFailure, SyncReport, sync_project, sync_with_mapper};
pub use entity::{Entity, Field, FieldType, Scalar};
pub use error::{GeneratorError, Result};
pub use store::{SourceFile, WriteOutcome};
pub use types::{DefaultTypeMapper, TypeMapper};
