//! Domain-to-wire conversion synthesis
//!
//! `src/proto/<entity>_decoder.rs` builds prost reply messages from domain
//! values: one message per value, and list responses delegating to it.

use std::path::PathBuf;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{FieldValue, ItemUse};

use super::{Names, Synthesizer, SynthContext, imports, merged, read_field};
use crate::codegen::{ident, parse};
use crate::entity::{Field, FieldType};
use crate::error::Result;
use crate::layout;
use crate::merge::{ContainerKind, member_identity, merge_into, with_struct_literal};
use crate::store::SourceFile;

/// Synthesizes the decoder file
pub struct DecoderSynthesizer<'a> {
    ctx: SynthContext<'a>,
    names: Names,
}

impl<'a> DecoderSynthesizer<'a> {
    pub fn new(ctx: SynthContext<'a>) -> Self {
        DecoderSynthesizer {
            names: ctx.names(),
            ctx,
        }
    }

    /// Wire value of a domain field read from `model`
    fn wire_value(&self, field: &Field) -> TokenStream {
        let model = quote! { model };
        if self.ctx.wire_matches_memory(field) {
            return read_field(&model, field);
        }
        let name = ident(&field.name);
        match &field.field_type {
            FieldType::Uuid => quote! { model.#name.to_string() },
            FieldType::Timestamp => quote! { Some(to_timestamp(model.#name)) },
            FieldType::List(inner) if **inner == FieldType::Uuid => {
                quote! { model.#name.iter().map(ToString::to_string).collect() }
            }
            FieldType::List(_) => quote! { model.#name.iter().cloned().map(Into::into).collect() },
            FieldType::Scalar(_) => {
                let value = read_field(&model, field);
                quote! { #value.into() }
            }
        }
    }

    fn message_fields(&self) -> Result<Vec<FieldValue>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let wire = self.ctx.wire_ident(field);
                let value = self.wire_value(field);
                parse(quote! { #wire: #value })
            })
            .collect()
    }
}

impl Synthesizer for DecoderSynthesizer<'_> {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn path(&self) -> PathBuf {
        layout::decoder(self.ctx.entity)
    }

    fn header(&self) -> Vec<String> {
        vec![format!("Domain to wire conversions of `{}`.", self.ctx.entity.name)]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        let Names { model, module, .. } = &self.names;
        imports([
            quote! { use chrono::{DateTime, Utc}; },
            quote! { use prost_types::Timestamp; },
            quote! { use crate::domain::#module::#model; },
            quote! { use crate::pb; },
        ])
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let Names {
            model,
            list_response,
            decode,
            decode_list,
            collection,
            ..
        } = &self.names;
        let mut inserted = 0;

        let name = decode.to_string();
        let doc = format!(" Wire message of a `{model}`");
        let item = file.ensure_fn(&name, || {
            parse(quote! {
                #[doc = #doc]
                pub fn #decode(model: &#model) -> pb::#model {
                    pb::#model {}
                }
            })
        })?;
        let desired = self.message_fields()?;
        let count = with_struct_literal(&mut item.block, &name, &model.to_string(), |fields| {
            merge_into(fields, desired, member_identity)
        })?;
        inserted += merged(ContainerKind::LiteralFields, &name, count);

        let name = decode_list.to_string();
        let item = file.ensure_fn(&name, || {
            parse(quote! {
                /// One page of values and the total number of matches
                pub fn #decode_list(models: &[#model], total: i64) -> pb::#list_response {
                    pb::#list_response {}
                }
            })
        })?;
        let desired = vec![
            parse::<FieldValue>(quote! { #collection: models.iter().map(#decode).collect() })?,
            parse::<FieldValue>(quote! { total })?,
        ];
        let count = with_struct_literal(
            &mut item.block,
            &name,
            &list_response.to_string(),
            |fields| merge_into(fields, desired, member_identity),
        )?;
        inserted += merged(ContainerKind::LiteralFields, &name, count);

        file.ensure_fn("to_timestamp", || {
            parse(quote! {
                fn to_timestamp(value: DateTime<Utc>) -> Timestamp {
                    Timestamp {
                        seconds: value.timestamp(),
                        nanos: value.timestamp_subsec_nanos() as i32,
                    }
                }
            })
        })?;

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::entity::{Entity, Scalar};
    use crate::synth::test_support::{user, user_with_age};
    use crate::types::DefaultTypeMapper;

    fn synthesize(source: &str, entity: &Entity) -> (usize, String) {
        let mapper = DefaultTypeMapper;
        let synth = DecoderSynthesizer::new(SynthContext::new(entity, &mapper, Features::default()));
        let mut file = SourceFile::from_source("user_decoder.rs", source).unwrap();
        let inserted = synth.apply(&mut file).unwrap();
        (inserted, file.render())
    }

    #[test]
    fn test_fresh_decoder() {
        let (_, code) = synthesize("", &user());
        assert!(code.contains("pub fn decode_user(model: &User) -> pb::User {"));
        assert!(code.contains("id: model.id.to_string(),"));
        assert!(code.contains("name: model.name.clone(),"));
        assert!(code.contains("created_at: Some(to_timestamp(model.created_at)),"));
        assert!(code.contains("users: models.iter().map(decode_user).collect(),"));
        assert!(code.contains("fn to_timestamp(value: DateTime<Utc>) -> Timestamp"));
    }

    #[test]
    fn test_wire_name_and_lists() {
        let entity = Entity::new(
            "Task",
            None,
            vec![
                Field::new("watchers", FieldType::List(Box::new(FieldType::Uuid))),
                Field::new("done", FieldType::Scalar(Scalar::Bool)).wire_name("completed"),
            ],
        )
        .unwrap();
        let (_, code) = synthesize("", &entity);
        assert!(code.contains("watchers: model.watchers.iter().map(ToString::to_string).collect(),"));
        assert!(code.contains("completed: model.done,"));
        assert!(code.contains("tasks: models.iter().map(decode_task).collect(),"));
    }

    #[test]
    fn test_new_field_appended() {
        let (_, first) = synthesize("", &user());
        let (inserted, code) = synthesize(&first, &user_with_age());
        assert_eq!(inserted, 1);
        let updated_at = code.find("updated_at: Some(to_timestamp(model.updated_at)),").unwrap();
        assert!(updated_at < code.find("age: model.age,").unwrap());
    }
}
