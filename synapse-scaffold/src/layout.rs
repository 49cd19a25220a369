//! Target project layout
//!
//! Artifact paths are derived from the entity name alone, relative to the
//! target project root.

use std::path::PathBuf;

use crate::entity::Entity;

/// Shared capability contracts
pub const INTERFACES: &str = "src/interfaces.rs";

/// Directory of domain models
pub const DOMAIN_DIR: &str = "src/domain";
/// Directory of repositories
pub const REPOSITORY_DIR: &str = "src/repository";
/// Directory of use cases
pub const USECASE_DIR: &str = "src/usecase";
/// Directory of wire conversions
pub const PROTO_DIR: &str = "src/proto";
/// Directory of migrations
pub const MIGRATIONS_DIR: &str = "migrations";
/// Directory of integration tests
pub const TESTS_DIR: &str = "tests";

/// `src/domain/<entity>.rs`
pub fn domain(entity: &Entity) -> PathBuf {
    PathBuf::from(DOMAIN_DIR).join(format!("{}.rs", entity.snake_name()))
}

/// `src/repository/<entity>.rs`
pub fn repository(entity: &Entity) -> PathBuf {
    PathBuf::from(REPOSITORY_DIR).join(format!("{}.rs", entity.snake_name()))
}

/// `src/usecase/<entity>.rs`
pub fn usecase(entity: &Entity) -> PathBuf {
    PathBuf::from(USECASE_DIR).join(format!("{}.rs", entity.snake_name()))
}

/// `src/proto/<entity>_encoder.rs`
pub fn encoder(entity: &Entity) -> PathBuf {
    PathBuf::from(PROTO_DIR).join(format!("{}.rs", encoder_module(entity)))
}

/// `src/proto/<entity>_decoder.rs`
pub fn decoder(entity: &Entity) -> PathBuf {
    PathBuf::from(PROTO_DIR).join(format!("{}.rs", decoder_module(entity)))
}

/// Module name of the encoder file
pub fn encoder_module(entity: &Entity) -> String {
    format!("{}_encoder", entity.snake_name())
}

/// Module name of the decoder file
pub fn decoder_module(entity: &Entity) -> String {
    format!("{}_decoder", entity.snake_name())
}

/// `migrations/create_<table>.sql`
pub fn migration(entity: &Entity) -> PathBuf {
    PathBuf::from(MIGRATIONS_DIR).join(format!("create_{}.sql", entity.table_name))
}

/// `tests/<entity>_usecase.rs`
pub fn usecase_test(entity: &Entity) -> PathBuf {
    PathBuf::from(TESTS_DIR).join(format!("{}_usecase.rs", entity.snake_name()))
}

/// `mod.rs` of a layer directory
pub fn module_index(dir: &str) -> PathBuf {
    PathBuf::from(dir).join("mod.rs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_entity_name() {
        let entity = Entity::new("OrderLine", None, vec![]).unwrap();
        assert_eq!(repository(&entity), PathBuf::from("src/repository/order_line.rs"));
        assert_eq!(encoder(&entity), PathBuf::from("src/proto/order_line_encoder.rs"));
        assert_eq!(decoder(&entity), PathBuf::from("src/proto/order_line_decoder.rs"));
        assert_eq!(migration(&entity), PathBuf::from("migrations/create_order_line.sql"));
        assert_eq!(module_index(USECASE_DIR), PathBuf::from("src/usecase/mod.rs"));
    }
}
