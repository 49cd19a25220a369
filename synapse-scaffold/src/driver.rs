//! Project synthesis orchestration
//!
//! A run validates every entity first and stops before touching any file
//! when one is invalid. Files shared by all entities (capability traits,
//! layer module indexes) are then synthesized one after another. Finally each
//! entity gets its own worker thread; its artifacts are distinct files, so
//! workers never contend for a path.
//!
//! A failure is confined to the artifact it happened in: the remaining
//! artifacts of the entity and all other entities still run, and the
//! failure is reported.

use std::path::{Path, PathBuf};
use std::thread;

use tracing::{error, info, info_span};

use crate::config::{ProjectConfig, ProjectSettings};
use crate::entity::Entity;
use crate::error::{GeneratorError, Result};
use crate::layout;
use crate::store::WriteOutcome;
use crate::synth::{
    DecoderSynthesizer, EncoderSynthesizer, InterfacesSynthesizer, ModelSynthesizer,
    ModuleIndexSynthesizer, RepositorySynthesizer, SyncOutcome, SynthContext, Synthesizer,
    UseCaseSynthesizer,
};
use crate::templates;
use crate::types::{DefaultTypeMapper, TypeMapper};

/// Outcome of a project run
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Every synthesizer pass that completed
    pub outcomes: Vec<SyncOutcome>,
    /// Create-once artifacts rendered by this run
    pub created: Vec<PathBuf>,
    /// Artifacts that could not be synthesized
    pub failures: Vec<ArtifactFailure>,
}

/// One failed artifact
#[derive(Debug)]
pub struct ArtifactFailure {
    /// Owning entity, `None` for shared files
    pub entity: Option<String>,
    /// Artifact name
    pub artifact: &'static str,
    /// Cause
    pub error: GeneratorError,
}

impl SyncReport {
    /// Files created or rewritten
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == WriteOutcome::Written)
            .map(|o| o.path.as_path())
            .chain(self.created.iter().map(PathBuf::as_path))
    }

    /// Whether every artifact was synthesized
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, entity: Option<&str>, artifact: &'static str, result: Result<SyncOutcome>) {
        match result {
            Ok(outcome) => self.outcomes.push(outcome),
            Err(error) => {
                error!(entity = entity.unwrap_or("-"), artifact, %error, "synthesis failed");
                self.failures.push(ArtifactFailure {
                    entity: entity.map(str::to_string),
                    artifact,
                    error,
                });
            }
        }
    }

    fn merge(&mut self, other: SyncReport) {
        self.outcomes.extend(other.outcomes);
        self.created.extend(other.created);
        self.failures.extend(other.failures);
    }
}

/// Synthesize every artifact of the project under `root`
pub fn sync_project(root: &Path, config: &ProjectConfig) -> Result<SyncReport> {
    sync_with_mapper(root, config, &DefaultTypeMapper)
}

/// [`sync_project`] with a custom type convention
pub fn sync_with_mapper(
    root: &Path,
    config: &ProjectConfig,
    mapper: &dyn TypeMapper,
) -> Result<SyncReport> {
    let entities = config.entities()?;
    let settings = &config.project;
    info!(root = %root.display(), entities = entities.len(), "synchronizing project");

    let mut report = SyncReport::default();
    for synth in shared_synthesizers(settings, &entities) {
        let result = synth.sync(root);
        report.record(None, synth.name(), result);
    }

    let entity_reports = thread::scope(|scope| {
        let workers: Vec<_> = entities
            .iter()
            .map(|entity| {
                let worker = thread::Builder::new()
                    .name(format!("scaffold-{}", entity.snake_name()))
                    .spawn_scoped(scope, move || sync_entity(root, entity, mapper, settings));
                (entity, worker)
            })
            .collect();

        workers
            .into_iter()
            .map(|(entity, worker)| {
                let joined = worker
                    .map_err(|e| GeneratorError::io(root, e))
                    .and_then(|handle| {
                        handle.join().map_err(|_| {
                            GeneratorError::CodeGenError(format!(
                                "worker for '{}' panicked",
                                entity.name
                            ))
                        })
                    });
                joined.unwrap_or_else(|error| {
                    let mut failed = SyncReport::default();
                    failed.failures.push(ArtifactFailure {
                        entity: Some(entity.name.clone()),
                        artifact: "entity",
                        error,
                    });
                    failed
                })
            })
            .collect::<Vec<_>>()
    });
    for entity_report in entity_reports {
        report.merge(entity_report);
    }

    info!(
        written = report.written().count(),
        failures = report.failures.len(),
        "project synchronized"
    );
    Ok(report)
}

/// Files shared by all entities, synthesized before any entity work
fn shared_synthesizers(settings: &ProjectSettings, entities: &[Entity]) -> Vec<Box<dyn Synthesizer>> {
    let per_entity = |module: fn(&Entity) -> String| entities.iter().map(module).collect::<Vec<_>>();
    let proto_modules = entities
        .iter()
        .flat_map(|e| [layout::encoder_module(e), layout::decoder_module(e)])
        .collect();

    vec![
        Box::new(InterfacesSynthesizer::new(settings.features)),
        Box::new(ModuleIndexSynthesizer::new(layout::DOMAIN_DIR, per_entity(Entity::snake_name))),
        Box::new(ModuleIndexSynthesizer::new(
            layout::REPOSITORY_DIR,
            per_entity(Entity::snake_name),
        )),
        Box::new(ModuleIndexSynthesizer::new(layout::USECASE_DIR, per_entity(Entity::snake_name))),
        Box::new(ModuleIndexSynthesizer::new(layout::PROTO_DIR, proto_modules)),
    ]
}

/// Synthesize every artifact of one entity
fn sync_entity(
    root: &Path,
    entity: &Entity,
    mapper: &dyn TypeMapper,
    settings: &ProjectSettings,
) -> SyncReport {
    let span = info_span!("entity", name = %entity.name);
    let _enter = span.enter();

    let ctx = SynthContext::new(entity, mapper, settings.features);
    let synthesizers: Vec<Box<dyn Synthesizer + '_>> = vec![
        Box::new(ModelSynthesizer::new(ctx)),
        Box::new(RepositorySynthesizer::new(ctx)),
        Box::new(EncoderSynthesizer::new(ctx)),
        Box::new(DecoderSynthesizer::new(ctx)),
        Box::new(UseCaseSynthesizer::new(ctx)),
    ];

    let mut report = SyncReport::default();
    for synth in &synthesizers {
        let result = synth.sync(root);
        report.record(Some(&entity.name), synth.name(), result);
    }

    if settings.templates {
        match templates::sync_entity_templates(root, entity, mapper, &settings.crate_name) {
            Ok(created) => report.created.extend(created),
            Err(error) => {
                error!(entity = %entity.name, %error, "rendering templates failed");
                report.failures.push(ArtifactFailure {
                    entity: Some(entity.name.clone()),
                    artifact: "templates",
                    error,
                });
            }
        }
    }
    report
}
