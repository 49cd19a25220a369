//! Project configuration
//!
//! A project is described by a `synapse.toml` file:
//!
//! ```toml
//! [project]
//! crate_name = "blog"
//!
//! [project.features]
//! events = true
//! full_text_search = true
//!
//! [[entities]]
//! name = "User"
//!
//! [[entities.fields]]
//! name = "email"
//! type = "string"
//! searchable = true
//! orderable = true
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::entity::{Entity, Field};
use crate::error::{GeneratorError, Result};

/// Parsed `synapse.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project-wide settings
    #[serde(default)]
    pub project: ProjectSettings,

    /// Entity declarations, in file order
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

/// Project-wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSettings {
    /// Target crate name, used by rendered test stubs
    #[serde(default = "default_crate_name")]
    pub crate_name: String,

    /// Target source tree, relative to the configuration file
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Feature toggles
    #[serde(default)]
    pub features: Features,

    /// Render create-once artifacts (migrations, test stubs)
    #[serde(default = "default_true")]
    pub templates: bool,
}

/// Project-level toggles consulted by the synthesizers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Features {
    /// Publish created/updated/deleted events from use cases
    #[serde(default)]
    pub events: bool,

    /// Filter list/count queries on searchable columns
    #[serde(default = "default_true")]
    pub full_text_search: bool,
}

/// One `[[entities]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    /// Entity name
    pub name: String,

    /// Storage table override
    #[serde(default)]
    pub table: Option<String>,

    /// Declared fields
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

/// One `[[entities.fields]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// Field name
    pub name: String,

    /// Declared type, see [`crate::entity::FieldType`]
    #[serde(rename = "type")]
    pub field_type: String,

    /// Storage column override
    #[serde(default)]
    pub column: Option<String>,

    /// Wire field name override
    #[serde(default)]
    pub wire_name: Option<String>,

    /// Full-text filtering
    #[serde(default)]
    pub searchable: bool,

    /// Sort-key set membership
    #[serde(default)]
    pub orderable: bool,
}

fn default_crate_name() -> String {
    "app".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ProjectSettings {
    fn default() -> Self {
        ProjectSettings {
            crate_name: default_crate_name(),
            root: None,
            features: Features::default(),
            templates: true,
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Features {
            events: false,
            full_text_search: true,
        }
    }
}

impl ProjectConfig {
    /// Parse a configuration document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| GeneratorError::Config(e.to_string()))
    }

    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| GeneratorError::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Validated entity models, in declaration order
    pub fn entities(&self) -> Result<Vec<Entity>> {
        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(self.entities.len());
        for declared in &self.entities {
            let entity = declared.to_entity()?;
            if !seen.insert(entity.name.clone()) {
                return Err(GeneratorError::invalid_entity(
                    &entity.name,
                    "entity declared more than once",
                ));
            }
            entities.push(entity);
        }
        Ok(entities)
    }
}

impl EntityConfig {
    /// Build the validated entity model
    pub fn to_entity(&self) -> Result<Entity> {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                let field_type = f.field_type.parse().map_err(|e: GeneratorError| {
                    GeneratorError::invalid_entity(&self.name, format!("field '{}': {e}", f.name))
                })?;
                let mut field = Field::new(f.name.clone(), field_type)
                    .searchable(f.searchable)
                    .orderable(f.orderable);
                field.column = f.column.clone().filter(|c| !c.is_empty());
                field.wire_name = f.wire_name.clone().filter(|w| !w.is_empty());
                Ok(field)
            })
            .collect::<Result<Vec<_>>>()?;
        Entity::new(&self.name, self.table.clone(), fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{FieldType, Scalar};

    const SAMPLE: &str = r#"
        [project]
        crate_name = "blog"

        [project.features]
        events = true

        [[entities]]
        name = "User"

        [[entities.fields]]
        name = "name"
        type = "string"
        searchable = true

        [[entities.fields]]
        name = "email"
        type = "string"
        column = "email_address"
        orderable = true

        [[entities]]
        name = "Post"
        table = "articles"

        [[entities.fields]]
        name = "tags"
        type = "[string]"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = ProjectConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.project.crate_name, "blog");
        assert!(config.project.features.events);
        assert!(config.project.features.full_text_search);
        assert!(config.project.templates);

        let entities = config.entities().unwrap();
        assert_eq!(entities.len(), 2);
        let user = &entities[0];
        assert_eq!(user.fields[1].column.as_deref(), Some("email_address"));
        assert!(user.fields[0].searchable);
        let post = &entities[1];
        assert_eq!(post.table_name, "articles");
        assert_eq!(
            post.fields[0].field_type,
            FieldType::List(Box::new(FieldType::Scalar(Scalar::String)))
        );
    }

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::from_toml("").unwrap();
        assert_eq!(config.project.crate_name, "app");
        assert_eq!(config.project.features, Features::default());
        assert!(config.entities.is_empty());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = ProjectConfig::from_toml("[project]\nfeatures = { graphql = true }").unwrap_err();
        assert!(matches!(err, GeneratorError::Config(_)));
    }

    #[test]
    fn test_unknown_type_names_field() {
        let config = ProjectConfig::from_toml(
            "[[entities]]\nname = \"User\"\n[[entities.fields]]\nname = \"size\"\ntype = \"decimal\"",
        )
        .unwrap();
        let err = config.entities().unwrap_err();
        assert!(err.to_string().contains("field 'size'"));
    }

    #[test]
    fn test_duplicate_entities_rejected() {
        let config =
            ProjectConfig::from_toml("[[entities]]\nname = \"User\"\n[[entities]]\nname = \"user\"")
                .unwrap();
        assert!(config.entities().is_err());
    }
}
