//! End-to-end runs over a scratch project tree

use std::fs;
use std::path::{Path, PathBuf};

use synapse_scaffold::{GeneratorError, ProjectConfig, WriteOutcome, sync_project};
use tempfile::TempDir;

const USER: &str = r#"
    [project]
    crate_name = "blog"

    [[entities]]
    name = "User"

    [[entities.fields]]
    name = "name"
    type = "string"
    searchable = true

    [[entities.fields]]
    name = "email"
    type = "string"
    orderable = true
"#;

const AGE: &str = r#"
    [[entities.fields]]
    name = "age"
    type = "i32"
"#;

const POST: &str = r#"
    [[entities]]
    name = "Post"

    [[entities.fields]]
    name = "title"
    type = "string"

    [[entities.fields]]
    name = "author_id"
    type = "uuid"
"#;

fn config(toml: &str) -> ProjectConfig {
    ProjectConfig::from_toml(toml).unwrap()
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

fn written(root: &Path, config: &ProjectConfig) -> Vec<PathBuf> {
    let report = sync_project(root, config).unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures);
    let mut paths: Vec<_> = report
        .written()
        .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
        .collect();
    paths.sort();
    paths
}

#[test]
fn first_run_creates_every_artifact() {
    let dir = TempDir::new().unwrap();
    let paths = written(dir.path(), &config(USER));
    let expected: Vec<PathBuf> = [
        "migrations/create_user.sql",
        "src/domain/mod.rs",
        "src/domain/user.rs",
        "src/interfaces.rs",
        "src/proto/mod.rs",
        "src/proto/user_decoder.rs",
        "src/proto/user_encoder.rs",
        "src/repository/mod.rs",
        "src/repository/user.rs",
        "src/usecase/mod.rs",
        "src/usecase/user.rs",
        "tests/user_usecase.rs",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(paths, expected);

    let repository = read(dir.path(), "src/repository/user.rs");
    assert!(repository.starts_with("//! Postgres repository of `User` (table `user`)."));
    assert!(repository.contains("use crate::interfaces::Database;"));
    assert!(read(dir.path(), "src/proto/mod.rs").contains("pub mod user_encoder;"));
}

#[test]
fn rerun_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let config = config(USER);
    written(dir.path(), &config);
    let before = read(dir.path(), "src/repository/user.rs");

    let report = sync_project(dir.path(), &config).unwrap();
    assert!(report.is_success());
    assert!(report.outcomes.iter().all(|o| o.outcome == WriteOutcome::Unchanged));
    assert!(report.created.is_empty());
    assert_eq!(read(dir.path(), "src/repository/user.rs"), before);
}

#[test]
fn added_field_reaches_every_layer() {
    let dir = TempDir::new().unwrap();
    written(dir.path(), &config(USER));

    let paths = written(dir.path(), &config(&format!("{USER}{AGE}")));
    let expected: Vec<PathBuf> = [
        "src/domain/user.rs",
        "src/proto/user_decoder.rs",
        "src/proto/user_encoder.rs",
        "src/repository/user.rs",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    assert_eq!(paths, expected);

    let domain = read(dir.path(), "src/domain/user.rs");
    assert!(domain.contains("pub age: i32,"));
    assert!(domain.contains("pub age: Option<i32>,"));
    let repository = read(dir.path(), "src/repository/user.rs");
    assert!(repository.contains("row.age.into()"));
    assert!(repository.contains("patch.age.map(|value| (UserIden::Age, value.into()))"));
    assert!(read(dir.path(), "src/proto/user_decoder.rs").contains("age: model.age,"));

    // the migration is create-once
    assert!(!read(dir.path(), "migrations/create_user.sql").contains("age INTEGER"));
}

#[test]
fn hand_edits_survive_a_field_addition() {
    let dir = TempDir::new().unwrap();
    written(dir.path(), &config(USER));

    let path = dir.path().join("src/repository/user.rs");
    let edited = read(dir.path(), "src/repository/user.rs")
        .replace(
            "pub struct UserRepository {\n    db: Arc<dyn Database>,\n}",
            "pub struct UserRepository {\n    db: Arc<dyn Database>,\n    /// Read replica\n    replica: Option<Arc<dyn Database>>,\n}",
        )
        .replace(
            "pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {",
            "pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {\n        audit(id);",
        );
    assert!(edited.contains("replica") && edited.contains("audit(id);"));
    fs::write(&path, format!("{edited}\nfn audit(_id: Uuid) {{}}\n")).unwrap();

    written(dir.path(), &config(&format!("{USER}{AGE}")));
    let repository = read(dir.path(), "src/repository/user.rs");
    assert!(repository.contains("/// Read replica"));
    assert!(repository.contains("replica: Option<Arc<dyn Database>>,"));
    assert!(repository.contains("audit(id);"));
    assert!(repository.contains("fn audit(_id: Uuid) {}"));
    assert!(repository.contains("UserIden::Age"));
}

#[test]
fn removed_field_is_retained() {
    let dir = TempDir::new().unwrap();
    written(dir.path(), &config(&format!("{USER}{AGE}")));

    let paths = written(dir.path(), &config(USER));
    assert!(paths.is_empty());
    assert!(read(dir.path(), "src/domain/user.rs").contains("pub age: i32,"));
}

#[test]
fn existing_traits_are_not_extended() {
    let dir = TempDir::new().unwrap();
    let interfaces = dir.path().join("src/interfaces.rs");
    fs::create_dir_all(interfaces.parent().unwrap()).unwrap();
    fs::write(&interfaces, "pub trait Logger {\n    fn log(&self, line: &str);\n}\n").unwrap();

    written(dir.path(), &config(USER));
    let code = read(dir.path(), "src/interfaces.rs");
    assert!(code.contains("fn log(&self, line: &str);"));
    assert!(!code.contains("fn warn(&self"));
    assert!(code.contains("pub trait Database: Send + Sync {"));
}

#[test]
fn enabling_events_wires_the_notifier() {
    let dir = TempDir::new().unwrap();
    written(dir.path(), &config(USER));

    let with_events = USER.replace(
        "crate_name = \"blog\"",
        "crate_name = \"blog\"\n    features = { events = true }",
    );
    let paths = written(dir.path(), &config(&with_events));
    assert!(paths.contains(&PathBuf::from("src/interfaces.rs")));
    assert!(paths.contains(&PathBuf::from("src/usecase/user.rs")));

    let usecase = read(dir.path(), "src/usecase/user.rs");
    assert!(usecase.contains("notifier: Arc<dyn EventNotifier>,"));
    assert!(usecase.contains("use crate::interfaces::EventNotifier;"));
    assert!(read(dir.path(), "src/interfaces.rs").contains("pub trait EventNotifier"));
}

#[test]
fn invalid_entity_aborts_before_writing() {
    let dir = TempDir::new().unwrap();
    let err = sync_project(
        dir.path(),
        &config(&format!("{USER}\n[[entities.fields]]\nname = \"name\"\ntype = \"string\"\n")),
    )
    .unwrap_err();
    assert!(matches!(err, GeneratorError::InvalidEntity { .. }));
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn malformed_file_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("src/domain/user.rs");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "pub struct User {").unwrap();

    written(dir.path(), &config(USER));
    let domain = read(dir.path(), "src/domain/user.rs");
    assert!(domain.contains("pub struct User {\n    pub id: Uuid,"));
    assert!(syn::parse_file(&domain).is_ok());
}

#[test]
fn failure_is_confined_to_its_artifact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("src/repository/user.rs");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "pub enum UserRow {\n    Legacy,\n}\n").unwrap();

    let report = sync_project(dir.path(), &config(&format!("{USER}{POST}"))).unwrap();
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.entity.as_deref(), Some("User"));
    assert_eq!(failure.artifact, "repository");
    assert!(matches!(failure.error, GeneratorError::MissingContext(_)));

    assert_eq!(read(dir.path(), "src/repository/user.rs"), "pub enum UserRow {\n    Legacy,\n}\n");
    assert!(dir.path().join("src/usecase/user.rs").exists());
    assert!(read(dir.path(), "src/repository/post.rs").contains("pub struct PostRow {"));
    assert!(
        read(dir.path(), "src/proto/post_encoder.rs")
            .contains("author_id: parse_id(&request.author_id)?,")
    );
}
