//! Repository synthesis
//!
//! `src/repository/<entity>.rs` maps the domain model onto a Postgres table
//! with sea-query statements executed through the `Database` capability.
//!
//! Per-field pieces live in mergeable containers so that adding a field only
//! appends: the `Iden` enum variants, the row struct fields, the row
//! conversions, the column lists of the insert and select statements, the
//! update assignments and the searchable/orderable column tables.

use std::path::PathBuf;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Block, Expr, FieldValue, ItemUse, Variant};

use super::{Names, Synthesizer, SynthContext, imports, is_copy, merged, read_field, variant_ident};
use crate::codegen::{ident, named_field, parse};
use crate::entity::{Field, FieldType, UPDATED_AT_FIELD};
use crate::error::Result;
use crate::layout;
use crate::merge::{
    ContainerKind, argument_identity, const_table, entry_identity, field_identity, member_identity,
    merge_into, named_fields, variant_identity, with_call_args, with_local_array,
    with_struct_literal,
};
use crate::store::SourceFile;

const SEARCHABLE_COLUMNS: &str = "SEARCHABLE_COLUMNS";
const ORDERABLE_COLUMNS: &str = "ORDERABLE_COLUMNS";

/// Synthesizes the repository file
pub struct RepositorySynthesizer<'a> {
    ctx: SynthContext<'a>,
    names: Names,
}

impl<'a> RepositorySynthesizer<'a> {
    pub fn new(ctx: SynthContext<'a>) -> Self {
        RepositorySynthesizer {
            names: ctx.names(),
            ctx,
        }
    }

    /// `UserIden::Email` for a column
    fn column(&self, field: &Field) -> TokenStream {
        let iden = &self.names.iden;
        let variant = variant_ident(field);
        quote! { #iden::#variant }
    }

    fn columns(&self) -> Result<Vec<Expr>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| parse(self.column(field)))
            .collect()
    }

    fn iden_variants(&self) -> Result<Vec<Variant>> {
        let table = &self.ctx.entity.table_name;
        let mut variants = vec![parse(quote! { #[iden = #table] Table })?];
        for field in self.ctx.entity.columns() {
            let variant = variant_ident(&field);
            let tag = self.ctx.mapper.storage_tag(&field);
            // the derive spells variants in snake case unless told otherwise
            let tokens = if tag == field.name {
                quote! { #variant }
            } else {
                quote! { #[iden = #tag] #variant }
            };
            variants.push(parse(tokens)?);
        }
        Ok(variants)
    }

    fn row_fields(&self) -> Result<Vec<syn::Field>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let ty = self.ctx.storage_type(field)?;
                let tag = self.ctx.mapper.storage_tag(field);
                named_field(quote! {
                    #[sqlx(rename = #tag)]
                    pub #name: #ty
                })
            })
            .collect()
    }

    /// Row fields read from a borrowed domain model
    fn from_model_fields(&self) -> Result<Vec<FieldValue>> {
        let model = quote! { model };
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let value = if self.storage_matches_memory(field) {
                    read_field(&model, field)
                } else if field.field_type.is_list() {
                    quote! { model.#name.iter().map(|item| item.clone().into()).collect() }
                } else {
                    let value = read_field(&model, field);
                    quote! { #value.into() }
                };
                parse(quote! { #name: #value })
            })
            .collect()
    }

    /// Domain fields moved out of an owned row
    fn into_model_fields(&self) -> Result<Vec<FieldValue>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                let value = if self.storage_matches_memory(field) {
                    quote! { self.#name }
                } else if field.field_type.is_list() {
                    quote! { self.#name.into_iter().map(Into::into).collect() }
                } else {
                    quote! { self.#name.into() }
                };
                parse(quote! { #name: #value })
            })
            .collect()
    }

    fn insert_values(&self) -> Result<Vec<Expr>> {
        self.ctx
            .entity
            .columns()
            .iter()
            .map(|field| {
                let name = ident(&field.name);
                parse(quote! { row.#name.into() })
            })
            .collect()
    }

    /// One `Option<(column, value)>` per patchable field, then the timestamp
    fn assignments(&self) -> Result<Vec<Expr>> {
        let mut assignments = Vec::with_capacity(self.ctx.entity.fields.len() + 1);
        for field in &self.ctx.entity.fields {
            let column = self.column(field);
            let name = ident(&field.name);
            let value = if is_copy(field) {
                quote! { patch.#name }
            } else {
                quote! { patch.#name.clone() }
            };
            assignments.push(parse(quote! {
                #value.map(|value| (#column, value.into()))
            })?);
        }
        let iden = &self.names.iden;
        let updated_at = variant_ident(&Field::new(UPDATED_AT_FIELD, FieldType::Timestamp));
        assignments.push(parse(quote! { Some((#iden::#updated_at, Utc::now().into())) })?);
        Ok(assignments)
    }

    fn searchable_columns(&self) -> Result<Vec<Expr>> {
        self.ctx
            .entity
            .searchable_fields()
            .map(|field| parse(self.column(field)))
            .collect()
    }

    fn orderable_columns(&self) -> Result<Vec<Expr>> {
        self.ctx
            .entity
            .orderable_fields()
            .iter()
            .map(|field| {
                let key = &field.name;
                let column = self.column(field);
                parse(quote! { (#key, #column) })
            })
            .collect()
    }

    fn storage_matches_memory(&self, field: &Field) -> bool {
        self.ctx.mapper.storage_type(field) == self.ctx.mapper.in_memory_type(field)
    }

    /// Optional search filter applied to list and count queries
    fn search_clause(&self) -> TokenStream {
        if self.ctx.features.full_text_search {
            quote! {
                if let Some(search) = filter.search.as_deref().filter(|search| !search.is_empty()) {
                    query.cond_where(search_condition(search));
                }
            }
        } else {
            TokenStream::new()
        }
    }

    fn merge_methods(&self, file: &mut SourceFile) -> Result<usize> {
        let Names {
            model,
            patch,
            filter,
            row,
            iden,
            repository,
            ..
        } = &self.names;
        let repo = repository.to_string();
        let row_name = row.to_string();
        let search = self.search_clause();
        let mut inserted = 0;

        let method = file.ensure_method(&row_name, "from_model", || {
            parse(quote! {
                /// Storage row for a domain value
                pub fn from_model(model: &#model) -> Self {
                    Self {}
                }
            })
        })?;
        inserted += merge_literal(&mut method.block, "from_model", "Self", self.from_model_fields()?)?;

        let method = file.ensure_method(&row_name, "into_model", || {
            parse(quote! {
                /// Domain value of a storage row
                pub fn into_model(self) -> #model {
                    #model {}
                }
            })
        })?;
        inserted += merge_literal(
            &mut method.block,
            "into_model",
            &model.to_string(),
            self.into_model_fields()?,
        )?;

        file.ensure_method(&repo, "new", || {
            parse(quote! {
                pub fn new(db: Arc<dyn Database>) -> Self {
                    Self { db }
                }
            })
        })?;

        let doc = format!(" Insert a new `{model}`");
        let method = file.ensure_method(&repo, "create", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn create(&self, model: &#model) -> Result<(), sqlx::Error> {
                    let row = #row::from_model(model);
                    let (sql, values) = Query::insert()
                        .into_table(#iden::Table)
                        .columns([])
                        .values_panic([])
                        .build(PostgresQueryBuilder);
                    self.db.execute(&sql, values).await?;
                    Ok(())
                }
            })
        })?;
        inserted += merge_args(&mut method.block, "create", "columns", self.columns()?)?;
        inserted += merge_args(&mut method.block, "create", "values_panic", self.insert_values()?)?;

        let doc = format!(" Fetch one `{model}` by id");
        let method = file.ensure_method(&repo, "get", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn get(&self, id: Uuid) -> Result<#model, sqlx::Error> {
                    let (sql, values) = Query::select()
                        .columns([])
                        .from(#iden::Table)
                        .and_where(Expr::col(#iden::Id).eq(id))
                        .build(PostgresQueryBuilder);
                    let row = self.db.fetch_one(&sql, values).await?;
                    Ok(#row::from_row(&row)?.into_model())
                }
            })
        })?;
        inserted += merge_args(&mut method.block, "get", "columns", self.columns()?)?;

        let doc = format!(" One page of `{model}` values matching `filter`");
        let method = file.ensure_method(&repo, "list", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn list(&self, filter: &#filter) -> Result<Vec<#model>, sqlx::Error> {
                    let mut query = Query::select();
                    query.columns([]).from(#iden::Table);
                    #search
                    let order = if filter.descending { Order::Desc } else { Order::Asc };
                    if let Some((_, column)) = ORDERABLE_COLUMNS
                        .iter()
                        .find(|(key, _)| Some(*key) == filter.order_by.as_deref())
                    {
                        query.order_by(*column, order);
                    }
                    let page_size = filter.page_size.max(1);
                    query.limit(page_size).offset(filter.page * page_size);
                    let (sql, values) = query.build(PostgresQueryBuilder);
                    let rows = self.db.fetch_many(&sql, values).await?;
                    rows.iter()
                        .map(|row| #row::from_row(row).map(#row::into_model))
                        .collect()
                }
            })
        })?;
        inserted += merge_args(&mut method.block, "list", "columns", self.columns()?)?;

        let doc = format!(" Number of `{model}` values matching `filter`");
        file.ensure_method(&repo, "count", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn count(&self, filter: &#filter) -> Result<i64, sqlx::Error> {
                    let mut query = Query::select();
                    query.expr(Expr::col(#iden::Id).count()).from(#iden::Table);
                    #search
                    let (sql, values) = query.build(PostgresQueryBuilder);
                    let row = self.db.fetch_one(&sql, values).await?;
                    row.try_get(0)
                }
            })
        })?;

        let doc = format!(" Apply the set fields of `patch` to one `{model}`");
        let method = file.ensure_method(&repo, "update", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn update(&self, id: Uuid, patch: &#patch) -> Result<(), sqlx::Error> {
                    let assignments: &[Option<(#iden, SimpleExpr)>] = &[];
                    let (sql, values) = Query::update()
                        .table(#iden::Table)
                        .values(assignments.iter().flatten().cloned())
                        .and_where(Expr::col(#iden::Id).eq(id))
                        .build(PostgresQueryBuilder);
                    self.db.execute(&sql, values).await?;
                    Ok(())
                }
            })
        })?;
        let assignments = self.assignments()?;
        let count = with_local_array(&mut method.block, "update", "assignments", |elements| {
            merge_into(elements, assignments, argument_identity)
        })?;
        inserted += merged(ContainerKind::CallArguments, "update::assignments", count);

        let doc = format!(" Remove one `{model}` by id");
        file.ensure_method(&repo, "delete", || {
            parse(quote! {
                #[doc = #doc]
                pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
                    let (sql, values) = Query::delete()
                        .from_table(#iden::Table)
                        .and_where(Expr::col(#iden::Id).eq(id))
                        .build(PostgresQueryBuilder);
                    self.db.execute(&sql, values).await?;
                    Ok(())
                }
            })
        })?;

        Ok(inserted)
    }
}

impl Synthesizer for RepositorySynthesizer<'_> {
    fn name(&self) -> &'static str {
        "repository"
    }

    fn path(&self) -> PathBuf {
        layout::repository(self.ctx.entity)
    }

    fn header(&self) -> Vec<String> {
        vec![format!(
            "Postgres repository of `{}` (table `{}`).",
            self.ctx.entity.name, self.ctx.entity.table_name
        )]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        let Names {
            model,
            patch,
            filter,
            module,
            ..
        } = &self.names;
        let mut uses = vec![
            quote! { use std::sync::Arc; },
            quote! { use chrono::{DateTime, Utc}; },
            quote! { use sea_query::{Expr, Iden, Order, PostgresQueryBuilder, Query, SimpleExpr}; },
            quote! { use sqlx::{FromRow, Row}; },
            quote! { use uuid::Uuid; },
            quote! { use crate::domain::#module::{#filter, #model, #patch}; },
            quote! { use crate::interfaces::Database; },
        ];
        if self.ctx.features.full_text_search {
            uses.push(quote! { use sea_query::Cond; });
            uses.push(quote! { use sea_query::extension::postgres::PgExpr; });
        }
        imports(uses)
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let Names { row, iden, repository, .. } = &self.names;
        let table = &self.ctx.entity.table_name;
        let mut inserted = 0;

        let item = file.ensure_enum(&iden.to_string(), || {
            parse(quote! {
                /// Table and column identifiers
                #[derive(Iden, Clone, Copy, Debug)]
                pub enum #iden {
                    #[iden = #table]
                    Table,
                }
            })
        })?;
        inserted += merged(
            ContainerKind::EnumVariants,
            &iden.to_string(),
            merge_into(&mut item.variants, self.iden_variants()?, variant_identity),
        );

        let item = file.ensure_struct(&row.to_string(), || {
            parse(quote! {
                /// One stored row
                #[derive(Debug, Clone, FromRow)]
                pub struct #row {}
            })
        })?;
        inserted += merged(
            ContainerKind::StructFields,
            &row.to_string(),
            merge_into(named_fields(item)?, self.row_fields()?, field_identity),
        );

        if self.ctx.features.full_text_search {
            let item = file.ensure_const(SEARCHABLE_COLUMNS, || {
                parse(quote! {
                    /// Columns matched by the `search` filter
                    const SEARCHABLE_COLUMNS: &[#iden] = &[];
                })
            })?;
            inserted += merged(
                ContainerKind::CallArguments,
                SEARCHABLE_COLUMNS,
                merge_into(const_table(item)?, self.searchable_columns()?, argument_identity),
            );
        }

        let item = file.ensure_const(ORDERABLE_COLUMNS, || {
            parse(quote! {
                /// Sort keys accepted by `order_by`
                const ORDERABLE_COLUMNS: &[(&str, #iden)] = &[];
            })
        })?;
        inserted += merged(
            ContainerKind::MapEntries,
            ORDERABLE_COLUMNS,
            merge_into(const_table(item)?, self.orderable_columns()?, entry_identity),
        );

        let doc = format!(" Storage of `{}` values", self.ctx.entity.name);
        let item = file.ensure_struct(&repository.to_string(), || {
            parse(quote! {
                #[doc = #doc]
                pub struct #repository {}
            })
        })?;
        inserted += merged(
            ContainerKind::StructFields,
            &repository.to_string(),
            merge_into(
                named_fields(item)?,
                [named_field(quote! { db: Arc<dyn Database> })?],
                field_identity,
            ),
        );

        inserted += self.merge_methods(file)?;

        if self.ctx.features.full_text_search {
            file.ensure_fn("search_condition", || {
                parse(quote! {
                    /// Case-insensitive substring match on any searchable column
                    fn search_condition(search: &str) -> Cond {
                        let pattern = format!("%{search}%");
                        SEARCHABLE_COLUMNS.iter().fold(Cond::any(), |condition, column| {
                            condition.add(Expr::col(*column).ilike(pattern.as_str()))
                        })
                    }
                })
            })?;
        }

        Ok(inserted)
    }
}

fn merge_args(block: &mut Block, scope: &str, call: &str, desired: Vec<Expr>) -> Result<usize> {
    let inserted = with_call_args(block, scope, call, |args| {
        merge_into(args, desired, argument_identity)
    })?;
    Ok(merged(ContainerKind::CallArguments, &format!("{scope}::{call}"), inserted))
}

fn merge_literal(
    block: &mut Block,
    scope: &str,
    type_name: &str,
    desired: Vec<FieldValue>,
) -> Result<usize> {
    let inserted = with_struct_literal(block, scope, type_name, |fields| {
        merge_into(fields, desired, member_identity)
    })?;
    Ok(merged(ContainerKind::LiteralFields, &format!("{scope}::{type_name}"), inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Features;
    use crate::entity::Entity;
    use crate::synth::test_support::{user, user_with_age};
    use crate::entity::Scalar;
    use crate::types::{DefaultTypeMapper, TypeMapper};

    fn synthesize(source: &str, entity: &Entity, features: Features) -> (usize, String) {
        synthesize_with(source, entity, features, &DefaultTypeMapper)
    }

    fn synthesize_with(
        source: &str,
        entity: &Entity,
        features: Features,
        mapper: &dyn TypeMapper,
    ) -> (usize, String) {
        let synth = RepositorySynthesizer::new(SynthContext::new(entity, mapper, features));
        let mut file = SourceFile::from_source("user.rs", source).unwrap();
        let inserted = synth.apply(&mut file).unwrap();
        (inserted, file.render())
    }

    /// Stores identifiers as text
    struct TextIds;

    impl TypeMapper for TextIds {
        fn storage_type(&self, field: &Field) -> String {
            match &field.field_type {
                FieldType::Uuid => "String".to_string(),
                FieldType::List(inner) if **inner == FieldType::Uuid => "Vec<String>".to_string(),
                _ => DefaultTypeMapper.storage_type(field),
            }
        }

        fn wire_type(&self, field: &Field) -> String {
            DefaultTypeMapper.wire_type(field)
        }

        fn in_memory_type(&self, field: &Field) -> String {
            DefaultTypeMapper.in_memory_type(field)
        }
    }

    fn flat(code: &str) -> String {
        code.split_whitespace().collect()
    }

    #[test]
    fn test_fresh_repository() {
        let (_, code) = synthesize("", &user(), Features::default());
        assert!(code.contains("pub enum UserIden {"));
        assert!(code.contains("#[iden = \"user\"]"));
        assert!(code.contains("#[iden = \"email_address\"]"));
        assert!(code.contains("#[sqlx(rename = \"email_address\")]"));
        assert!(code.contains("const SEARCHABLE_COLUMNS: &[UserIden] = &[UserIden::Name];"));
        assert!(code.contains("(\"email\", UserIden::Email)"));
        assert!(code.contains("(\"created_at\", UserIden::CreatedAt)"));
        assert!(code.contains("pub async fn create(&self, model: &User)"));
        assert!(code.contains("pub async fn count(&self, filter: &UserFilter)"));
        assert!(code.contains("fn search_condition(search: &str) -> Cond"));
        assert!(code.contains("Some((UserIden::UpdatedAt, Utc::now().into()))"));
    }

    #[test]
    fn test_field_addition_reaches_every_container() {
        let (_, first) = synthesize("", &user(), Features::default());
        let (inserted, code) = synthesize(&first, &user_with_age(), Features::default());
        // Iden variant, row field, two conversions, three column lists,
        // the insert values and the update assignments
        assert_eq!(inserted, 9);
        assert!(code.contains("    Age,"));
        assert!(code.contains("pub age: i32,"));
        assert!(code.contains("age: model.age,"));
        assert!(code.contains("age: self.age,"));
        assert!(code.contains("row.age.into()"));
        assert!(code.contains("patch.age.map(|value| (UserIden::Age, value.into()))"));
        assert_eq!(code.matches("UserIden::Age").count(), 4);
    }

    #[test]
    fn test_rerun_is_stable() {
        let (_, first) = synthesize("", &user(), Features::default());
        let (inserted, second) = synthesize(&first, &user(), Features::default());
        assert_eq!(inserted, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_search_disabled() {
        let features = Features {
            full_text_search: false,
            ..Features::default()
        };
        let (_, code) = synthesize("", &user(), features);
        assert!(!code.contains("SEARCHABLE_COLUMNS"));
        assert!(!code.contains("search_condition"));
        assert!(code.contains("ORDERABLE_COLUMNS"));
    }

    #[test]
    fn test_hand_edited_method_body_kept() {
        let source = r#"
            impl UserRepository {
                pub async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
                    soft_delete(&self.db, id).await
                }
            }
        "#;
        let (_, code) = synthesize(source, &user(), Features::default());
        assert!(code.contains("soft_delete(&self.db, id).await"));
        assert!(!code.contains("Query::delete()"));
    }

    #[test]
    fn test_custom_column_in_list_kept() {
        let source = r#"
            impl UserRepository {
                pub async fn get(&self, id: Uuid) -> Result<User, sqlx::Error> {
                    let (sql, values) = Query::select()
                        .columns([UserIden::Legacy, UserIden::Id])
                        .from(UserIden::Table)
                        .build(PostgresQueryBuilder);
                    todo!()
                }
            }
        "#;
        let (_, code) = synthesize(source, &user(), Features::default());
        assert_eq!(code.matches("pub async fn get(").count(), 1);
        let get_columns = &code[code.find("UserIden::Legacy").unwrap()..];
        let id = get_columns.find("UserIden::Id").unwrap();
        let name = get_columns.find("UserIden::Name").unwrap();
        assert!(id < name);
    }

    #[test]
    fn test_storage_conversions_follow_the_mapper() {
        let team = Entity::new(
            "Team",
            None,
            vec![
                Field::new("members", FieldType::List(Box::new(FieldType::Uuid))),
                Field::new("size", FieldType::Scalar(Scalar::I32)),
            ],
        )
        .unwrap();
        let (_, code) = synthesize_with("", &team, Features::default(), &TextIds);
        assert!(code.contains("pub id: String,"));
        assert!(code.contains("pub members: Vec<String>,"));

        let code = flat(&code);
        assert!(code.contains("id:model.id.into(),"));
        assert!(code.contains("members:model.members.iter().map(|item|item.clone().into()).collect(),"));
        assert!(code.contains("size:model.size,"));
        assert!(code.contains("id:self.id.into(),"));
        assert!(code.contains("members:self.members.into_iter().map(Into::into).collect(),"));
        assert!(code.contains("size:self.size,"));
    }

    #[test]
    fn test_mapped_storage_rerun_is_stable() {
        let team = Entity::new(
            "Team",
            None,
            vec![Field::new("members", FieldType::List(Box::new(FieldType::Uuid)))],
        )
        .unwrap();
        let (_, first) = synthesize_with("", &team, Features::default(), &TextIds);
        let (inserted, second) = synthesize_with(&first, &team, Features::default(), &TextIds);
        assert_eq!(inserted, 0);
        assert_eq!(first, second);
    }
}
