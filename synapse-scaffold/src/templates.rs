//! Create-once artifacts
//!
//! Migrations and test stubs are rendered from minijinja templates and
//! written only when the target does not exist yet. Unlike the synthesized
//! sources they are never merged: once created they belong to the project.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, info};

use crate::entity::{Entity, Field, FieldType, Scalar};
use crate::error::{GeneratorError, Result};
use crate::layout;
use crate::types::TypeMapper;

const MIGRATION: &str = "migration.sql";
const USECASE_TEST: &str = "usecase_test.rs";

const TEMPLATES: [(&str, &str); 2] = [
    (MIGRATION, include_str!("../templates/migration.sql.j2")),
    (USECASE_TEST, include_str!("../templates/usecase_test.rs.j2")),
];

/// A column as the migration template sees it
#[derive(Debug, Serialize)]
struct Column {
    tag: String,
    sql_type: String,
    primary: bool,
    orderable: bool,
    implicit: bool,
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    for (name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// Postgres column type of a field
fn sql_type(field_type: &FieldType) -> String {
    match field_type {
        FieldType::Scalar(Scalar::String) => "TEXT".to_string(),
        FieldType::Scalar(Scalar::Bool) => "BOOLEAN".to_string(),
        FieldType::Scalar(Scalar::I32) => "INTEGER".to_string(),
        FieldType::Scalar(Scalar::I64) => "BIGINT".to_string(),
        FieldType::Scalar(Scalar::F32) => "REAL".to_string(),
        FieldType::Scalar(Scalar::F64) => "DOUBLE PRECISION".to_string(),
        FieldType::Uuid => "UUID".to_string(),
        FieldType::Timestamp => "TIMESTAMPTZ".to_string(),
        FieldType::List(inner) => format!("{}[]", sql_type(inner)),
    }
}

fn column(field: &Field, mapper: &dyn TypeMapper) -> Column {
    Column {
        tag: mapper.storage_tag(field),
        sql_type: sql_type(&field.field_type),
        primary: field.primary,
        orderable: field.orderable,
        implicit: field.is_implicit(),
    }
}

/// `CREATE TABLE` migration of `entity`
pub fn render_migration(entity: &Entity, mapper: &dyn TypeMapper) -> Result<String> {
    let columns: Vec<Column> = entity.columns().iter().map(|f| column(f, mapper)).collect();
    let env = environment()?;
    let rendered = env
        .get_template(MIGRATION)?
        .render(context! { entity => entity, columns => columns })?;
    Ok(rendered)
}

/// Integration test stub for the use cases of `entity`
pub fn render_usecase_test(entity: &Entity, crate_name: &str) -> Result<String> {
    let env = environment()?;
    let rendered = env.get_template(USECASE_TEST)?.render(context! {
        entity => entity,
        snake => entity.snake_name(),
        crate_name => crate_name,
    })?;
    Ok(rendered)
}

/// Write `contents` to `path` unless the file exists
///
/// Returns whether the file was created.
pub fn write_if_absent(path: &Path, contents: &str) -> Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| GeneratorError::io(parent, e))?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "already present, not rendered");
            return Ok(false);
        }
        Err(e) => return Err(GeneratorError::io(path, e)),
    };
    file.write_all(contents.as_bytes())
        .map_err(|e| GeneratorError::io(path, e))?;
    info!(path = %path.display(), "created");
    Ok(true)
}

/// Render and create the missing create-once artifacts of `entity`
///
/// Returns the paths that were created.
pub fn sync_entity_templates(
    root: &Path,
    entity: &Entity,
    mapper: &dyn TypeMapper,
    crate_name: &str,
) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    let path = root.join(layout::migration(entity));
    if !path.exists() && write_if_absent(&path, &render_migration(entity, mapper)?)? {
        created.push(path);
    }

    let path = root.join(layout::usecase_test(entity));
    if !path.exists() && write_if_absent(&path, &render_usecase_test(entity, crate_name)?)? {
        created.push(path);
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DefaultTypeMapper;
    use tempfile::TempDir;

    fn post() -> Entity {
        Entity::new(
            "Post",
            Some("articles".into()),
            vec![
                Field::new("title", FieldType::Scalar(Scalar::String)).orderable(true),
                Field::new("tags", FieldType::List(Box::new(FieldType::Scalar(Scalar::String))))
                    .column("labels"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_migration() {
        let sql = render_migration(&post(), &DefaultTypeMapper).unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS articles ("));
        assert!(sql.contains("    id UUID NOT NULL PRIMARY KEY,"));
        assert!(sql.contains("    labels TEXT[] NOT NULL,"));
        assert!(sql.contains("    updated_at TIMESTAMPTZ NOT NULL\n);"));
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS articles_title_idx ON articles (title);"));
        assert!(!sql.contains("articles_created_at_idx"));
    }

    #[test]
    fn test_usecase_test_stub() {
        let code = render_usecase_test(&post(), "blog").unwrap();
        assert!(code.contains("use blog::pb;"));
        assert!(code.contains("fn create_request() -> pb::CreatePostRequest {"));
        assert!(code.contains("async fn create_then_get_post()"));
    }

    #[test]
    fn test_existing_files_left_alone() {
        let dir = TempDir::new().unwrap();
        let entity = post();
        let migration = dir.path().join(layout::migration(&entity));
        fs::create_dir_all(migration.parent().unwrap()).unwrap();
        fs::write(&migration, "-- hand written\n").unwrap();

        let created = sync_entity_templates(dir.path(), &entity, &DefaultTypeMapper, "blog").unwrap();
        assert_eq!(created, vec![dir.path().join(layout::usecase_test(&entity))]);
        assert_eq!(fs::read_to_string(&migration).unwrap(), "-- hand written\n");

        let created = sync_entity_templates(dir.path(), &entity, &DefaultTypeMapper, "blog").unwrap();
        assert!(created.is_empty());
    }
}
