//! Wire-to-domain conversion synthesis
//!
//! `src/proto/<entity>_encoder.rs` turns prost request messages into domain
//! values. The conversion of each field is picked from its types: identifiers
//! go through `parse_id`, timestamps through `to_datetime`, fields whose wire
//! and domain types agree are moved as they are and anything else uses `Into`.
//!
//! Update requests wrap every declared field so an absent field can be told
//! from a zero value: scalars are proto3 `optional`, timestamps are messages
//! and lists come as `{ values }` wrapper messages. Only present fields end up
//! in the patch.

use std::path::PathBuf;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Expr, FieldValue, ItemUse};

use super::{Names, Synthesizer, SynthContext, imports, merged, variant_ident};
use crate::codegen::{ident, parse};
use crate::entity::{CREATED_AT_FIELD, Field, FieldType, ID_FIELD, UPDATED_AT_FIELD};
use crate::error::Result;
use crate::layout;
use crate::merge::{
    ContainerKind, const_table, entry_identity, member_identity, merge_into, with_struct_literal,
};
use crate::store::SourceFile;

/// Synthesizes the encoder file
pub struct EncoderSynthesizer<'a> {
    ctx: SynthContext<'a>,
    names: Names,
}

impl<'a> EncoderSynthesizer<'a> {
    pub fn new(ctx: SynthContext<'a>) -> Self {
        EncoderSynthesizer {
            names: ctx.names(),
            ctx,
        }
    }

    /// Domain value of a required request field
    fn required(&self, field: &Field) -> TokenStream {
        let wire = self.ctx.wire_ident(field);
        if self.ctx.wire_matches_memory(field) {
            return quote! { request.#wire };
        }
        match &field.field_type {
            FieldType::Uuid => quote! { parse_id(&request.#wire)? },
            FieldType::Timestamp => quote! { to_datetime(request.#wire)? },
            FieldType::List(inner) if **inner == FieldType::Uuid => quote! {
                request.#wire.iter().map(|item| parse_id(item)).collect::<Result<Vec<_>, _>>()?
            },
            FieldType::List(_) => quote! { request.#wire.into_iter().map(Into::into).collect() },
            FieldType::Scalar(_) => quote! { request.#wire.into() },
        }
    }

    /// Optional domain value of an update request field
    fn optional(&self, field: &Field) -> TokenStream {
        let wire = self.ctx.wire_ident(field);
        match &field.field_type {
            FieldType::List(inner) if **inner == FieldType::Uuid => quote! {
                request.#wire
                    .map(|list| list.values.iter().map(|item| parse_id(item)).collect::<Result<Vec<_>, _>>())
                    .transpose()?
            },
            FieldType::List(_) if self.ctx.wire_matches_memory(field) => {
                quote! { request.#wire.map(|list| list.values) }
            }
            FieldType::List(_) => quote! {
                request.#wire.map(|list| list.values.into_iter().map(Into::into).collect())
            },
            _ if self.ctx.wire_matches_memory(field) => quote! { request.#wire },
            FieldType::Uuid => quote! { request.#wire.map(|value| parse_id(&value)).transpose()? },
            FieldType::Timestamp => {
                quote! { request.#wire.map(|value| to_datetime(Some(value))).transpose()? }
            }
            FieldType::Scalar(_) => quote! { request.#wire.map(Into::into) },
        }
    }

    fn create_fields(&self) -> Result<Vec<FieldValue>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let value = match field.name.as_str() {
                    ID_FIELD => quote! { Uuid::new_v4() },
                    CREATED_AT_FIELD | UPDATED_AT_FIELD => quote! { now },
                    _ => self.required(field),
                };
                parse(quote! { #name: #value })
            })
            .collect()
    }

    fn patch_fields(&self) -> Result<Vec<FieldValue>> {
        self.ctx
            .entity
            .fields
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let value = self.optional(field);
                parse(quote! { #name: #value })
            })
            .collect()
    }

    fn filter_fields(&self) -> Result<Vec<FieldValue>> {
        [
            quote! { search: Some(request.search).filter(|search| !search.is_empty()) },
            quote! { order_by },
            quote! { descending: request.descending },
            quote! { page: u64::from(request.page) },
            quote! { page_size: u64::from(request.page_size) },
        ]
        .into_iter()
        .map(parse)
        .collect()
    }

    fn order_entries(&self) -> Result<Vec<Expr>> {
        let order_field = &self.names.order_field;
        self.ctx
            .entity
            .orderable_fields()
            .iter()
            .map(|field| {
                let variant = variant_ident(field);
                let key = &field.name;
                parse(quote! { (pb::#order_field::#variant, #key) })
            })
            .collect()
    }
}

impl Synthesizer for EncoderSynthesizer<'_> {
    fn name(&self) -> &'static str {
        "encoder"
    }

    fn path(&self) -> PathBuf {
        layout::encoder(self.ctx.entity)
    }

    fn header(&self) -> Vec<String> {
        vec![format!("Wire to domain conversions of `{}`.", self.ctx.entity.name)]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        let Names {
            model,
            patch,
            filter,
            module,
            ..
        } = &self.names;
        imports([
            quote! { use chrono::{DateTime, Utc}; },
            quote! { use prost_types::Timestamp; },
            quote! { use tonic::Status; },
            quote! { use uuid::Uuid; },
            quote! { use crate::domain::#module::{#filter, #model, #patch}; },
            quote! { use crate::pb; },
        ])
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let Names {
            model,
            patch,
            filter,
            create_request,
            update_request,
            list_request,
            order_field,
            order_fields_table,
            encode_create,
            encode_update,
            encode_filter,
            ..
        } = &self.names;
        let mut inserted = 0;

        let table = order_fields_table.to_string();
        let item = file.ensure_const(&table, || {
            parse(quote! {
                /// Wire sort fields and the repository sort keys they select
                pub const #order_fields_table: &[(pb::#order_field, &str)] = &[];
            })
        })?;
        inserted += merged(
            ContainerKind::MapEntries,
            &table,
            merge_into(const_table(item)?, self.order_entries()?, entry_identity),
        );

        let name = encode_create.to_string();
        let doc = format!(" New `{model}` from a create request, with a fresh id");
        let item = file.ensure_fn(&name, || {
            parse(quote! {
                #[doc = #doc]
                pub fn #encode_create(request: pb::#create_request) -> Result<#model, Status> {
                    let now = Utc::now();
                    Ok(#model {})
                }
            })
        })?;
        let desired = self.create_fields()?;
        let count = with_struct_literal(&mut item.block, &name, &model.to_string(), |fields| {
            merge_into(fields, desired, member_identity)
        })?;
        inserted += merged(ContainerKind::LiteralFields, &name, count);

        let name = encode_update.to_string();
        let doc = " Target id and the fields present in an update request";
        let item = file.ensure_fn(&name, || {
            parse(quote! {
                #[doc = #doc]
                pub fn #encode_update(request: pb::#update_request) -> Result<(Uuid, #patch), Status> {
                    let id = parse_id(&request.id)?;
                    let patch = #patch {
                        ..Default::default()
                    };
                    Ok((id, patch))
                }
            })
        })?;
        let desired = self.patch_fields()?;
        let count = with_struct_literal(&mut item.block, &name, &patch.to_string(), |fields| {
            merge_into(fields, desired, member_identity)
        })?;
        inserted += merged(ContainerKind::LiteralFields, &name, count);

        let name = encode_filter.to_string();
        let item = file.ensure_fn(&name, || {
            parse(quote! {
                /// Search, sort and paging of a list request
                pub fn #encode_filter(request: pb::#list_request) -> #filter {
                    let order_by = #order_fields_table
                        .iter()
                        .find(|(field, _)| *field as i32 == request.order_by)
                        .map(|(_, key)| key.to_string());
                    #filter {}
                }
            })
        })?;
        let desired = self.filter_fields()?;
        let count = with_struct_literal(&mut item.block, &name, &filter.to_string(), |fields| {
            merge_into(fields, desired, member_identity)
        })?;
        inserted += merged(ContainerKind::LiteralFields, &name, count);

        file.ensure_fn("parse_id", || {
            parse(quote! {
                /// Parse an id sent as a string
                pub fn parse_id(value: &str) -> Result<Uuid, Status> {
                    Uuid::parse_str(value)
                        .map_err(|_| Status::invalid_argument(format!("invalid id '{value}'")))
                }
            })
        })?;
        file.ensure_fn("to_datetime", || {
            parse(quote! {
                /// Convert a required wire timestamp
                pub fn to_datetime(value: Option<Timestamp>) -> Result<DateTime<Utc>, Status> {
                    let value = value.ok_or_else(|| Status::invalid_argument("missing timestamp"))?;
                    let nanos = u32::try_from(value.nanos)
                        .map_err(|_| Status::invalid_argument("negative timestamp nanos"))?;
                    DateTime::from_timestamp(value.seconds, nanos)
                        .ok_or_else(|| Status::invalid_argument("timestamp out of range"))
                }
            })
        })?;

        Ok(inserted)
    }
}
