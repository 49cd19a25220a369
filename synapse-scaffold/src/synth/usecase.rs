//! Use case synthesis
//!
//! `src/usecase/<entity>.rs` exposes the create/get/list/update/delete
//! operations on wire messages: decode the request into the domain, call the
//! repository, log and translate failures, encode the reply. With events
//! enabled, writes also publish through the `EventNotifier` capability.
//!
//! The struct fields, the constructor parameters and the constructor literal
//! are merged, so enabling events on an existing file wires the notifier in.
//! Method bodies are written once; they are never revisited.

use std::path::PathBuf;

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{FieldValue, FnArg, ItemUse};

use super::{Names, Synthesizer, SynthContext, imports, merged};
use crate::codegen::{named_field, parse};
use crate::error::Result;
use crate::layout;
use crate::merge::{
    ContainerKind, field_identity, member_identity, merge_into, named_fields, param_identity,
    with_struct_literal,
};
use crate::store::SourceFile;

/// Synthesizes the use case file
pub struct UseCaseSynthesizer<'a> {
    ctx: SynthContext<'a>,
    names: Names,
}

/// A collaborator held by the use case struct
struct Collaborator {
    name: &'static str,
    ty: TokenStream,
}

impl<'a> UseCaseSynthesizer<'a> {
    pub fn new(ctx: SynthContext<'a>) -> Self {
        UseCaseSynthesizer {
            names: ctx.names(),
            ctx,
        }
    }

    fn collaborators(&self) -> Vec<Collaborator> {
        let repository = &self.names.repository;
        let mut collaborators = vec![
            Collaborator {
                name: "repository",
                ty: quote! { Arc<#repository> },
            },
            Collaborator {
                name: "logger",
                ty: quote! { Arc<dyn Logger> },
            },
        ];
        if self.ctx.features.events {
            collaborators.push(Collaborator {
                name: "notifier",
                ty: quote! { Arc<dyn EventNotifier> },
            });
        }
        collaborators
    }

    /// `self.notifier.<kind>("user", id).await;` when events are enabled
    fn notify(&self, kind: &str, id: TokenStream) -> TokenStream {
        if !self.ctx.features.events {
            return TokenStream::new();
        }
        let kind = format_ident!("{}", kind);
        let label = &self.names.label;
        quote! { self.notifier.#kind(#label, #id).await; }
    }

    fn merge_constructor(&self, file: &mut SourceFile) -> Result<usize> {
        let usecase = self.names.usecase.to_string();
        let collaborators = self.collaborators();

        let method = file.ensure_method(&usecase, "new", || {
            parse(quote! {
                pub fn new() -> Self {
                    Self {}
                }
            })
        })?;

        let params = collaborators
            .iter()
            .map(|c| {
                let name = format_ident!("{}", c.name);
                let ty = &c.ty;
                parse::<FnArg>(quote! { #name: #ty })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut inserted = merged(
            ContainerKind::Parameters,
            "new",
            merge_into(&mut method.sig.inputs, params, param_identity),
        );

        let values = collaborators
            .iter()
            .map(|c| {
                let name = format_ident!("{}", c.name);
                parse::<FieldValue>(quote! { #name })
            })
            .collect::<Result<Vec<_>>>()?;
        let count = with_struct_literal(&mut method.block, "new", "Self", |fields| {
            merge_into(fields, values, member_identity)
        })?;
        inserted += merged(ContainerKind::LiteralFields, "new::Self", count);
        Ok(inserted)
    }

    fn ensure_operations(&self, file: &mut SourceFile) -> Result<()> {
        let Names {
            model,
            usecase,
            create_request,
            get_request,
            update_request,
            delete_request,
            list_request,
            list_response,
            encode_create,
            encode_update,
            encode_filter,
            decode,
            decode_list,
            label,
            ..
        } = &self.names;
        let usecase = usecase.to_string();

        let notify_created = self.notify("created", quote! { model.id });
        let doc = format!(" Create a {label}");
        file.ensure_method(&usecase, "create", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn create(&self, request: pb::#create_request) -> Result<pb::#model, Status> {
                    let model = #encode_create(request)?;
                    self.repository
                        .create(&model)
                        .await
                        .map_err(|err| self.storage_error("create", err))?;
                    #notify_created
                    Ok(#decode(&model))
                }
            })
        })?;

        let doc = format!(" Fetch a {label} by id");
        file.ensure_method(&usecase, "get", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn get(&self, request: pb::#get_request) -> Result<pb::#model, Status> {
                    let id = parse_id(&request.id)?;
                    let model = self
                        .repository
                        .get(id)
                        .await
                        .map_err(|err| self.storage_error("get", err))?;
                    Ok(#decode(&model))
                }
            })
        })?;

        let doc = format!(" List one page of {label} values");
        file.ensure_method(&usecase, "list", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn list(&self, request: pb::#list_request) -> Result<pb::#list_response, Status> {
                    let filter = #encode_filter(request);
                    let models = self
                        .repository
                        .list(&filter)
                        .await
                        .map_err(|err| self.storage_error("list", err))?;
                    let total = self
                        .repository
                        .count(&filter)
                        .await
                        .map_err(|err| self.storage_error("count", err))?;
                    Ok(#decode_list(&models, total))
                }
            })
        })?;

        let notify_updated = self.notify("updated", quote! { id });
        let doc = format!(" Apply a partial update to a {label}");
        file.ensure_method(&usecase, "update", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn update(&self, request: pb::#update_request) -> Result<pb::#model, Status> {
                    let (id, patch) = #encode_update(request)?;
                    self.repository
                        .update(id, &patch)
                        .await
                        .map_err(|err| self.storage_error("update", err))?;
                    let model = self
                        .repository
                        .get(id)
                        .await
                        .map_err(|err| self.storage_error("update", err))?;
                    #notify_updated
                    Ok(#decode(&model))
                }
            })
        })?;

        let notify_deleted = self.notify("deleted", quote! { id });
        let doc = format!(" Delete a {label} by id");
        file.ensure_method(&usecase, "delete", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn delete(&self, request: pb::#delete_request) -> Result<(), Status> {
                    let id = parse_id(&request.id)?;
                    self.repository
                        .delete(id)
                        .await
                        .map_err(|err| self.storage_error("delete", err))?;
                    #notify_deleted
                    Ok(())
                }
            })
        })?;

        let not_found = format!("{label} not found");
        let failed = format!("{label} {{action}} failed: {{err}}");
        let internal = format!("{label} {{action}} failed");
        file.ensure_method(&usecase, "storage_error", || {
            parse(quote! {
                /// Log unexpected storage failures and map them to a status
                fn storage_error(&self, action: &str, err: sqlx::Error) -> Status {
                    match err {
                        sqlx::Error::RowNotFound => Status::not_found(#not_found),
                        err => {
                            self.logger.error(&format!(#failed));
                            Status::internal(format!(#internal))
                        }
                    }
                }
            })
        })?;
        Ok(())
    }
}

impl Synthesizer for UseCaseSynthesizer<'_> {
    fn name(&self) -> &'static str {
        "use case"
    }

    fn path(&self) -> PathBuf {
        layout::usecase(self.ctx.entity)
    }

    fn header(&self) -> Vec<String> {
        vec![format!("Use cases of `{}`.", self.ctx.entity.name)]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        let Names {
            repository,
            module,
            encode_create,
            encode_update,
            encode_filter,
            decode,
            decode_list,
            ..
        } = &self.names;
        let encoder = format_ident!("{}", layout::encoder_module(self.ctx.entity));
        let decoder = format_ident!("{}", layout::decoder_module(self.ctx.entity));
        let interfaces = if self.ctx.features.events {
            quote! { use crate::interfaces::{EventNotifier, Logger}; }
        } else {
            quote! { use crate::interfaces::Logger; }
        };
        imports([
            quote! { use std::sync::Arc; },
            quote! { use tonic::Status; },
            interfaces,
            quote! { use crate::pb; },
            quote! { use crate::proto::#decoder::{#decode, #decode_list}; },
            quote! { use crate::proto::#encoder::{#encode_create, #encode_filter, #encode_update, parse_id}; },
            quote! { use crate::repository::#module::#repository; },
        ])
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let usecase = &self.names.usecase;
        let doc = format!(" Operations on `{}` values", self.ctx.entity.name);
        let item = file.ensure_struct(&usecase.to_string(), || {
            parse(quote! {
                #[doc = #doc]
                pub struct #usecase {}
            })
        })?;
        let fields = self
            .collaborators()
            .iter()
            .map(|c| {
                let name = format_ident!("{}", c.name);
                let ty = &c.ty;
                named_field(quote! { #name: #ty })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut inserted = merged(
            ContainerKind::StructFields,
            &usecase.to_string(),
            merge_into(named_fields(item)?, fields, field_identity),
        );

        inserted += self.merge_constructor(file)?;
        self.ensure_operations(file)?;
        Ok(inserted)
    }
}
