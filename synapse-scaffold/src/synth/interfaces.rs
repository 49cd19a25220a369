//! Capability contracts shared by every entity
//!
//! `src/interfaces.rs` declares the traits the generated use cases and
//! repositories depend on. A trait is appended only when the file has no
//! declaration of that name; an existing trait is never extended, so
//! hand-written methods and signatures stay authoritative.

use std::path::PathBuf;

use quote::quote;
use syn::ItemUse;

use super::{Synthesizer, imports};
use crate::codegen::parse;
use crate::config::Features;
use crate::error::Result;
use crate::layout;
use crate::store::{DeclKey, SourceFile};

/// Synthesizes the shared capability traits
pub struct InterfacesSynthesizer {
    features: Features,
}

impl InterfacesSynthesizer {
    pub fn new(features: Features) -> Self {
        InterfacesSynthesizer { features }
    }

    fn traits(&self) -> Result<Vec<(&'static str, syn::ItemTrait)>> {
        let mut traits = vec![
            (
                "Logger",
                parse(quote! {
                    /// Structured logging sink
                    pub trait Logger: Send + Sync {
                        fn debug(&self, message: &str);
                        fn info(&self, message: &str);
                        fn warn(&self, message: &str);
                        fn error(&self, message: &str);
                    }
                })?,
            ),
            (
                "Database",
                parse(quote! {
                    /// Statement execution against Postgres
                    #[async_trait]
                    pub trait Database: Send + Sync {
                        async fn execute(&self, sql: &str, values: Values) -> Result<u64, sqlx::Error>;
                        async fn fetch_one(&self, sql: &str, values: Values) -> Result<PgRow, sqlx::Error>;
                        async fn fetch_many(&self, sql: &str, values: Values) -> Result<Vec<PgRow>, sqlx::Error>;
                    }
                })?,
            ),
        ];
        if self.features.events {
            traits.push((
                "EventNotifier",
                parse(quote! {
                    /// Publication of entity lifecycle events
                    #[async_trait]
                    pub trait EventNotifier: Send + Sync {
                        async fn created(&self, entity: &str, id: Uuid);
                        async fn updated(&self, entity: &str, id: Uuid);
                        async fn deleted(&self, entity: &str, id: Uuid);
                    }
                })?,
            ));
        }
        Ok(traits)
    }
}

impl Synthesizer for InterfacesSynthesizer {
    fn name(&self) -> &'static str {
        "interfaces"
    }

    fn path(&self) -> PathBuf {
        PathBuf::from(layout::INTERFACES)
    }

    fn header(&self) -> Vec<String> {
        vec!["Capabilities the generated layers depend on.".to_string()]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        imports([
            quote! { use async_trait::async_trait; },
            quote! { use sea_query::Values; },
            quote! { use sqlx::postgres::PgRow; },
            quote! { use uuid::Uuid; },
        ])
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let mut appended = 0;
        for (name, item) in self.traits()? {
            if file.find(&DeclKey::Type(name.to_string())).is_none() {
                appended += 1;
            }
            file.ensure_trait(name, || Ok(item))?;
        }
        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesize(source: &str, events: bool) -> (usize, String) {
        let features = Features {
            events,
            ..Features::default()
        };
        let mut file = SourceFile::from_source("interfaces.rs", source).unwrap();
        let appended = InterfacesSynthesizer::new(features).apply(&mut file).unwrap();
        (appended, file.render())
    }

    #[test]
    fn test_fresh_interfaces() {
        let (appended, code) = synthesize("", false);
        assert_eq!(appended, 2);
        assert!(code.contains("pub trait Logger: Send + Sync {"));
        assert!(code.contains("#[async_trait]\npub trait Database: Send + Sync {"));
        assert!(!code.contains("EventNotifier"));
    }

    #[test]
    fn test_existing_trait_not_extended() {
        let source = "pub trait Logger { fn log(&self, line: String); }";
        let (appended, code) = synthesize(source, true);
        assert_eq!(appended, 2);
        assert!(code.contains("fn log(&self, line: String);"));
        assert!(!code.contains("fn warn(&self"));
        assert!(code.contains("pub trait EventNotifier"));
    }
}
