//! Domain model synthesis
//!
//! `src/domain/<entity>.rs` holds the entity struct, its partial-update patch
//! and the list filter.

use std::path::PathBuf;

use quote::quote;
use syn::ItemUse;

use super::{Synthesizer, SynthContext, imports, merged};
use crate::codegen::{ident, named_field, parse};
use crate::error::Result;
use crate::layout;
use crate::merge::{ContainerKind, field_identity, merge_into, named_fields};
use crate::store::SourceFile;

/// Synthesizes the domain model file
pub struct ModelSynthesizer<'a> {
    ctx: SynthContext<'a>,
}

impl<'a> ModelSynthesizer<'a> {
    pub fn new(ctx: SynthContext<'a>) -> Self {
        ModelSynthesizer { ctx }
    }

    fn model_fields(&self) -> Result<Vec<syn::Field>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let ty = self.ctx.memory_type(field)?;
                named_field(quote! { pub #name: #ty })
            })
            .collect()
    }

    fn patch_fields(&self) -> Result<Vec<syn::Field>> {
        self.ctx
            .entity
            .fields
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let ty = self.ctx.memory_type(field)?;
                named_field(quote! { pub #name: Option<#ty> })
            })
            .collect()
    }
}

impl Synthesizer for ModelSynthesizer<'_> {
    fn name(&self) -> &'static str {
        "domain model"
    }

    fn path(&self) -> PathBuf {
        layout::domain(self.ctx.entity)
    }

    fn header(&self) -> Vec<String> {
        vec![format!("Domain model of `{}`.", self.ctx.entity.name)]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        imports([quote! { use chrono::{DateTime, Utc}; }, quote! { use uuid::Uuid; }])
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let names = self.ctx.names();
        let (model, patch, filter) = (&names.model, &names.patch, &names.filter);
        let mut inserted = 0;

        let doc = format!(" A `{}` as held in memory", self.ctx.entity.name);
        let item = file.ensure_struct(&model.to_string(), || {
            parse(quote! {
                #[doc = #doc]
                #[derive(Debug, Clone, PartialEq)]
                pub struct #model {}
            })
        })?;
        inserted += merged(
            ContainerKind::StructFields,
            &model.to_string(),
            merge_into(named_fields(item)?, self.model_fields()?, field_identity),
        );

        let item = file.ensure_struct(&patch.to_string(), || {
            parse(quote! {
                /// Fields to change in a partial update; `None` leaves a field as it is
                #[derive(Debug, Clone, Default, PartialEq)]
                pub struct #patch {}
            })
        })?;
        inserted += merged(
            ContainerKind::StructFields,
            &patch.to_string(),
            merge_into(named_fields(item)?, self.patch_fields()?, field_identity),
        );

        let item = file.ensure_struct(&filter.to_string(), || {
            parse(quote! {
                /// Search, ordering and paging of a list query
                #[derive(Debug, Clone, Default, PartialEq)]
                pub struct #filter {}
            })
        })?;
        let desired = [
            quote! { pub search: Option<String> },
            quote! { pub order_by: Option<String> },
            quote! { pub descending: bool },
            quote! { pub page: u64 },
            quote! { pub page_size: u64 },
        ]
        .into_iter()
        .map(named_field)
        .collect::<Result<Vec<_>>>()?;
        inserted += merged(
            ContainerKind::StructFields,
            &filter.to_string(),
            merge_into(named_fields(item)?, desired, field_identity),
        );

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::synth::test_support::{user, user_with_age};
    use crate::types::DefaultTypeMapper;

    fn synthesize(source: &str, entity: &crate::entity::Entity) -> (usize, String) {
        let mapper = DefaultTypeMapper;
        let synth = ModelSynthesizer::new(SynthContext::new(entity, &mapper, Features::default()));
        let mut file = SourceFile::from_source("user.rs", source).unwrap();
        let inserted = synth.apply(&mut file).unwrap();
        (inserted, file.render())
    }

    #[test]
    fn test_fresh_model() {
        let (_, code) = synthesize("", &user());
        assert!(code.contains("pub struct User {"));
        assert!(code.contains("pub id: Uuid,"));
        assert!(code.contains("pub email: String,"));
        assert!(code.contains("pub created_at: DateTime<Utc>,"));
        assert!(code.contains("pub struct UserPatch {"));
        assert!(code.contains("pub name: Option<String>,"));
        assert!(code.contains("pub page_size: u64,"));
        assert!(!code.contains("pub id: Option<Uuid>"));
    }

    #[test]
    fn test_new_field_appended_after_existing() {
        let (_, first) = synthesize("", &user());
        let (inserted, code) = synthesize(&first, &user_with_age());
        assert_eq!(inserted, 2);
        let updated_at = code.find("pub updated_at: DateTime<Utc>,").unwrap();
        let age = code.find("pub age: i32,").unwrap();
        assert!(updated_at < age);
        assert!(code.contains("pub age: Option<i32>,"));
    }

    #[test]
    fn test_hand_edited_type_kept() {
        let source = "pub struct User { pub id: Uuid, pub name: Box<str> }";
        let (_, code) = synthesize(source, &user());
        assert!(code.contains("pub name: Box<str>,"));
        assert_eq!(code.matches("pub name:").count(), 2);
    }
}
