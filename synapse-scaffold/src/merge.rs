//! Structural merge of desired items into existing syntax containers
//!
//! Every container the synthesizers patch is a [`Punctuated`] sequence: named
//! struct fields, enum variants, function parameters, struct-literal fields,
//! call and array arguments, constant lookup tables. [`merge_into`] is the one
//! upsert primitive over all of them; what differs per container is only the
//! identity extractor.
//!
//! The merge is additive. An item whose identity is already present is
//! skipped, never rewritten, and missing items are appended after everything
//! that was already there. Nothing is ever removed, so an item generated for a
//! field that no longer exists stays in place.

use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::visit_mut::{self, VisitMut};
use syn::{
    Block, Expr, ExprCall, ExprMethodCall, ExprStruct, Field, FieldValue, Fields, FnArg,
    ItemConst, ItemStruct, Lit, Local, Member, Pat, Token, Variant,
};

use crate::error::{GeneratorError, Result};

/// Key used to decide whether a desired item already exists
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Named by an identifier, member, selector or key literal
    Named(String),
    /// Nothing nameable; identified by its position in the container
    Position(usize),
}

/// The kinds of containers the synthesizers merge into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Named fields of a struct declaration
    StructFields,
    /// Variants of an enum declaration
    EnumVariants,
    /// Parameters of a function signature
    Parameters,
    /// Fields of a struct literal expression
    LiteralFields,
    /// Arguments of a call, or elements of an array passed as sole argument
    CallArguments,
    /// `(key, value)` entries of a constant lookup table
    MapEntries,
}

/// Insert the desired items missing from `container`
///
/// Items are visited in the order given, which is the entity's field order.
/// Returns the number of inserted items; `0` means the container is unchanged.
pub fn merge_into<T, P, F>(
    container: &mut Punctuated<T, P>,
    desired: impl IntoIterator<Item = T>,
    identity: F,
) -> usize
where
    P: Default,
    F: Fn(usize, &T) -> Identity,
{
    let mut present: Vec<Identity> = container
        .iter()
        .enumerate()
        .map(|(position, item)| identity(position, item))
        .collect();

    let mut inserted = 0;
    for (position, item) in desired.into_iter().enumerate() {
        let key = identity(position, &item);
        if present.contains(&key) {
            continue;
        }
        container.push(item);
        present.push(key);
        inserted += 1;
    }
    inserted
}

impl ContainerKind {
    /// Human readable name used in diagnostics
    pub fn describe(self) -> &'static str {
        match self {
            ContainerKind::StructFields => "struct fields",
            ContainerKind::EnumVariants => "enum variants",
            ContainerKind::Parameters => "parameters",
            ContainerKind::LiteralFields => "struct literal fields",
            ContainerKind::CallArguments => "call arguments",
            ContainerKind::MapEntries => "table entries",
        }
    }
}

/// Identity of a named struct field
pub fn field_identity(position: usize, field: &Field) -> Identity {
    match &field.ident {
        Some(ident) => Identity::Named(ident.to_string()),
        None => Identity::Position(position),
    }
}

/// Identity of an enum variant
pub fn variant_identity(_position: usize, variant: &Variant) -> Identity {
    Identity::Named(variant.ident.to_string())
}

/// Identity of a function parameter
pub fn param_identity(position: usize, arg: &FnArg) -> Identity {
    match arg {
        FnArg::Receiver(_) => Identity::Named("self".to_string()),
        FnArg::Typed(typed) => match pattern_name(&typed.pat) {
            Some(name) => Identity::Named(name),
            None => Identity::Position(position),
        },
    }
}

/// Identity of a struct literal field
pub fn member_identity(_position: usize, value: &FieldValue) -> Identity {
    match &value.member {
        Member::Named(ident) => Identity::Named(ident.to_string()),
        Member::Unnamed(index) => Identity::Position(index.index as usize),
    }
}

/// Identity of a call argument: its selector name, or its position
pub fn argument_identity(position: usize, arg: &Expr) -> Identity {
    match selector(arg) {
        Some(name) => Identity::Named(name),
        None => Identity::Position(position),
    }
}

/// Identity of a `(key, value)` table entry: the key literal or constant
pub fn entry_identity(position: usize, entry: &Expr) -> Identity {
    let key = match entry {
        Expr::Tuple(tuple) => tuple.elems.first(),
        other => Some(other),
    };
    match key.and_then(selector) {
        Some(name) => Identity::Named(name),
        None => Identity::Position(position),
    }
}

/// First nameable component of an expression
///
/// `UserIden::Name` -> `Name`, `row.name.clone().into()` -> `name`,
/// `Some((UserIden::UpdatedAt, now))` -> `UpdatedAt`, `"name"` -> `name`.
pub fn selector(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        Expr::Field(field) => match &field.member {
            Member::Named(ident) => Some(ident.to_string()),
            Member::Unnamed(_) => selector(&field.base),
        },
        Expr::MethodCall(call) => selector(&call.receiver),
        Expr::Call(call) => call.args.first().and_then(selector),
        Expr::Tuple(tuple) => tuple.elems.first().and_then(selector),
        Expr::Reference(reference) => selector(&reference.expr),
        Expr::Paren(paren) => selector(&paren.expr),
        Expr::Group(group) => selector(&group.expr),
        Expr::Cast(cast) => selector(&cast.expr),
        Expr::Unary(unary) => selector(&unary.expr),
        Expr::Try(expr) => selector(&expr.expr),
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        _ => None,
    }
}

fn pattern_name(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(ident) => Some(ident.ident.to_string()),
        Pat::Type(typed) => pattern_name(&typed.pat),
        Pat::Reference(reference) => pattern_name(&reference.pat),
        _ => None,
    }
}

/// Named field list of a struct declaration
pub fn named_fields(item: &mut ItemStruct) -> Result<&mut Punctuated<Field, Token![,]>> {
    match &mut item.fields {
        Fields::Named(fields) => Ok(&mut fields.named),
        _ => Err(GeneratorError::MissingContext(format!(
            "struct `{}` has no named fields to merge into",
            item.ident
        ))),
    }
}

/// Elements of the array behind a constant table (`const X: &[T] = &[...]`)
pub fn const_table(item: &mut ItemConst) -> Result<&mut Punctuated<Expr, Token![,]>> {
    match array_elements(&mut item.expr) {
        Some(elements) => Ok(elements),
        None => Err(GeneratorError::MissingContext(format!(
            "constant `{}` is not an array table",
            item.ident
        ))),
    }
}

fn array_elements(expr: &mut Expr) -> Option<&mut Punctuated<Expr, Token![,]>> {
    match expr {
        Expr::Array(array) => Some(&mut array.elems),
        Expr::Reference(reference) => array_elements(&mut reference.expr),
        Expr::Paren(paren) => array_elements(&mut paren.expr),
        _ => None,
    }
}

/// Run `apply` on the argument list of the first call to `name` in `block`
///
/// Both method calls (`query.columns(..)`) and function calls
/// (`columns(..)`, `Self::columns(..)`) count. When the call takes a single
/// array literal, the array's elements are the argument list. Only `block` is
/// searched, so same-named calls in other functions are never touched.
pub fn with_call_args<R>(
    block: &mut Block,
    scope: &str,
    name: &str,
    apply: impl FnOnce(&mut Punctuated<Expr, Token![,]>) -> R,
) -> Result<R> {
    let mut locator = CallLocator {
        name,
        apply: Some(apply),
        result: None,
    };
    locator.visit_block_mut(block);
    locator.result.ok_or_else(|| {
        GeneratorError::MissingContext(format!("no call to `{name}` in `{scope}`"))
    })
}

/// Run `apply` on the fields of the first struct literal of `type_name` in `block`
///
/// `type_name` is compared with the last path segment, so `Self { .. }`
/// matches `"Self"` and `pb::User { .. }` matches `"User"`.
pub fn with_struct_literal<R>(
    block: &mut Block,
    scope: &str,
    type_name: &str,
    apply: impl FnOnce(&mut Punctuated<FieldValue, Token![,]>) -> R,
) -> Result<R> {
    let mut locator = LiteralLocator {
        type_name,
        apply: Some(apply),
        result: None,
    };
    locator.visit_block_mut(block);
    locator.result.ok_or_else(|| {
        GeneratorError::MissingContext(format!("no `{type_name} {{ .. }}` literal in `{scope}`"))
    })
}

/// Run `apply` on the elements of `let binding = [...]` in `block`
pub fn with_local_array<R>(
    block: &mut Block,
    scope: &str,
    binding: &str,
    apply: impl FnOnce(&mut Punctuated<Expr, Token![,]>) -> R,
) -> Result<R> {
    let mut locator = LocalLocator {
        binding,
        apply: Some(apply),
        result: None,
    };
    locator.visit_block_mut(block);
    locator.result.ok_or_else(|| {
        GeneratorError::MissingContext(format!("no `let {binding} = [..]` in `{scope}`"))
    })
}

fn apply_to_arguments<R>(
    args: &mut Punctuated<Expr, Token![,]>,
    apply: impl FnOnce(&mut Punctuated<Expr, Token![,]>) -> R,
) -> R {
    if args.len() == 1 {
        if let Some(Expr::Array(array)) = args.first_mut() {
            return apply(&mut array.elems);
        }
    }
    apply(args)
}

struct CallLocator<'a, F, R> {
    name: &'a str,
    apply: Option<F>,
    result: Option<R>,
}

impl<F, R> VisitMut for CallLocator<'_, F, R>
where
    F: FnOnce(&mut Punctuated<Expr, Token![,]>) -> R,
{
    fn visit_expr_method_call_mut(&mut self, node: &mut ExprMethodCall) {
        if self.result.is_none() && node.method == self.name {
            if let Some(apply) = self.apply.take() {
                self.result = Some(apply_to_arguments(&mut node.args, apply));
                return;
            }
        }
        visit_mut::visit_expr_method_call_mut(self, node);
    }

    fn visit_expr_call_mut(&mut self, node: &mut ExprCall) {
        let invoked = match node.func.as_ref() {
            Expr::Path(path) => path.path.segments.last().is_some_and(|s| s.ident == self.name),
            _ => false,
        };
        if self.result.is_none() && invoked {
            if let Some(apply) = self.apply.take() {
                self.result = Some(apply_to_arguments(&mut node.args, apply));
                return;
            }
        }
        visit_mut::visit_expr_call_mut(self, node);
    }
}

struct LiteralLocator<'a, F, R> {
    type_name: &'a str,
    apply: Option<F>,
    result: Option<R>,
}

impl<F, R> VisitMut for LiteralLocator<'_, F, R>
where
    F: FnOnce(&mut Punctuated<FieldValue, Token![,]>) -> R,
{
    fn visit_expr_struct_mut(&mut self, node: &mut ExprStruct) {
        let named = node
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == self.type_name);
        if self.result.is_none() && named {
            if let Some(apply) = self.apply.take() {
                self.result = Some(apply(&mut node.fields));
                // `..rest` needs a separator after the last field
                if node.dot2_token.is_some() && !node.fields.empty_or_trailing() {
                    node.fields.push_punct(Default::default());
                }
                return;
            }
        }
        visit_mut::visit_expr_struct_mut(self, node);
    }
}

struct LocalLocator<'a, F, R> {
    binding: &'a str,
    apply: Option<F>,
    result: Option<R>,
}

impl<F, R> VisitMut for LocalLocator<'_, F, R>
where
    F: FnOnce(&mut Punctuated<Expr, Token![,]>) -> R,
{
    fn visit_local_mut(&mut self, node: &mut Local) {
        let bound = pattern_name(&node.pat).is_some_and(|name| name == self.binding);
        if self.result.is_none() && bound {
            if let Some(init) = node.init.as_mut() {
                if let Some(elements) = array_elements(&mut init.expr) {
                    if let Some(apply) = self.apply.take() {
                        self.result = Some(apply(elements));
                        return;
                    }
                }
            }
        }
        visit_mut::visit_local_mut(self, node);
    }
}

/// Token text of a node, used for diagnostics and structural comparison
pub fn token_text(node: &impl ToTokens) -> String {
    let mut tokens = TokenStream::new();
    node.to_tokens(&mut tokens);
    tokens.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn field_names(item: &ItemStruct) -> Vec<String> {
        item.fields
            .iter()
            .filter_map(|f| f.ident.as_ref().map(ToString::to_string))
            .collect()
    }

    #[test]
    fn test_merge_appends_missing_fields_in_order() {
        let mut item: ItemStruct = parse_quote! {
            pub struct UserRow { pub id: Uuid, pub name: String }
        };
        let desired: Vec<Field> = vec![
            parse_quote!(pub id: Uuid),
            parse_quote!(pub name: String),
            parse_quote!(pub email: String),
            parse_quote!(pub age: i32),
        ];
        let inserted = merge_into(named_fields(&mut item).unwrap(), desired, field_identity);
        assert_eq!(inserted, 2);
        assert_eq!(field_names(&item), ["id", "name", "email", "age"]);
    }

    #[test]
    fn test_merge_never_overwrites() {
        let mut item: ItemStruct = parse_quote! {
            pub struct UserRow { pub name: Option<String> }
        };
        let desired: Vec<Field> = vec![parse_quote!(pub name: String)];
        let inserted = merge_into(named_fields(&mut item).unwrap(), desired, field_identity);
        assert_eq!(inserted, 0);
        assert!(token_text(&item).contains("Option < String >"));
    }

    #[test]
    fn test_merge_keeps_hand_added_items_first() {
        let mut item: ItemStruct = parse_quote! {
            pub struct UserRow { pub custom: bool, pub id: Uuid }
        };
        let desired: Vec<Field> = vec![parse_quote!(pub id: Uuid), parse_quote!(pub name: String)];
        merge_into(named_fields(&mut item).unwrap(), desired, field_identity);
        assert_eq!(field_names(&item), ["custom", "id", "name"]);
    }

    #[test]
    fn test_empty_desired_is_noop() {
        let mut item: ItemStruct = parse_quote! { pub struct A { pub a: i32 } };
        let before = token_text(&item);
        let inserted = merge_into(named_fields(&mut item).unwrap(), Vec::new(), field_identity);
        assert_eq!(inserted, 0);
        assert_eq!(token_text(&item), before);
    }

    #[test]
    fn test_duplicate_desired_items_inserted_once() {
        let mut item: ItemStruct = parse_quote! { pub struct A {} };
        let desired: Vec<Field> = vec![parse_quote!(pub a: i32), parse_quote!(pub a: i64)];
        let inserted = merge_into(named_fields(&mut item).unwrap(), desired, field_identity);
        assert_eq!(inserted, 1);
        assert_eq!(field_names(&item), ["a"]);
    }

    #[test]
    fn test_unit_struct_is_missing_context() {
        let mut item: ItemStruct = parse_quote! { pub struct A; };
        let Err(err) = named_fields(&mut item) else {
            panic!("unit struct has no named fields");
        };
        assert!(matches!(err, GeneratorError::MissingContext(_)));
    }

    #[test]
    fn test_selector_extraction() {
        let cases: Vec<(Expr, Option<&str>)> = vec![
            (parse_quote!(UserIden::Name), Some("Name")),
            (parse_quote!(row.name.clone().into()), Some("name")),
            (parse_quote!(patch.email.clone().map(|v| (UserIden::Email, v.into()))), Some("email")),
            (parse_quote!(Some((UserIden::UpdatedAt, Utc::now().into()))), Some("UpdatedAt")),
            (parse_quote!("age"), Some("age")),
            (parse_quote!(&request.owner_id), Some("owner_id")),
            (parse_quote!(42), None),
        ];
        for (expr, expected) in cases {
            assert_eq!(selector(&expr).as_deref(), expected, "{}", token_text(&expr));
        }
    }

    #[test]
    fn test_call_args_merge_targets_named_call_only() {
        let mut block: Block = parse_quote!({
            let (sql, values) = Query::insert()
                .columns([UserIden::Id, UserIden::Name])
                .values_panic([row.id.into(), row.name.into()])
                .build(PostgresQueryBuilder);
        });
        let desired: Vec<Expr> = vec![
            parse_quote!(UserIden::Id),
            parse_quote!(UserIden::Name),
            parse_quote!(UserIden::Age),
        ];
        let inserted = with_call_args(&mut block, "create", "columns", |args| {
            merge_into(args, desired, argument_identity)
        })
        .unwrap();
        assert_eq!(inserted, 1);
        let text = token_text(&block);
        assert!(text.contains("columns ([UserIden :: Id , UserIden :: Name , UserIden :: Age])"));
        assert!(text.contains("values_panic ([row . id . into () , row . name . into ()])"));
    }

    #[test]
    fn test_call_args_with_plain_arguments() {
        let mut block: Block = parse_quote!({
            let query = select("name", "email");
        });
        let desired: Vec<Expr> = vec![parse_quote!("name"), parse_quote!("age")];
        with_call_args(&mut block, "list", "select", |args| {
            merge_into(args, desired, argument_identity)
        })
        .unwrap();
        assert!(token_text(&block).contains("select (\"name\" , \"email\" , \"age\")"));
    }

    #[test]
    fn test_missing_call_fails_loudly() {
        let mut block: Block = parse_quote!({ let x = 1; });
        let err = with_call_args(&mut block, "create", "columns", |_| ()).unwrap_err();
        assert!(err.to_string().contains("no call to `columns` in `create`"));
    }

    #[test]
    fn test_struct_literal_merge() {
        let mut block: Block = parse_quote!({
            Self { repository, logger }
        });
        let desired: Vec<FieldValue> = vec![parse_quote!(repository), parse_quote!(notifier)];
        let inserted = with_struct_literal(&mut block, "new", "Self", |fields| {
            merge_into(fields, desired, member_identity)
        })
        .unwrap();
        assert_eq!(inserted, 1);
        assert!(token_text(&block).contains("Self { repository , logger , notifier }"));
    }

    #[test]
    fn test_local_array_merge() {
        let mut block: Block = parse_quote!({
            let assignments = [
                patch.name.clone().map(|v| (UserIden::Name, v.into())),
                Some((UserIden::UpdatedAt, Utc::now().into())),
            ];
        });
        let desired: Vec<Expr> = vec![
            parse_quote!(patch.name.clone().map(|v| (UserIden::Name, v.into()))),
            parse_quote!(patch.age.map(|v| (UserIden::Age, v.into()))),
        ];
        let inserted = with_local_array(&mut block, "update", "assignments", |items| {
            merge_into(items, desired, argument_identity)
        })
        .unwrap();
        assert_eq!(inserted, 1);
        let text = token_text(&block);
        let updated_at = text.find("UpdatedAt").unwrap();
        let age = text.find("UserIden :: Age").unwrap();
        assert!(updated_at < age, "new entries go after existing ones");
    }

    #[test]
    fn test_const_table_merge() {
        let mut item: ItemConst = parse_quote! {
            const ORDERABLE_COLUMNS: &[(&str, UserIden)] = &[("name", UserIden::Name)];
        };
        let desired: Vec<Expr> = vec![
            parse_quote!(("name", UserIden::Name)),
            parse_quote!(("age", UserIden::Age)),
        ];
        let inserted = merge_into(const_table(&mut item).unwrap(), desired, entry_identity);
        assert_eq!(inserted, 1);
        assert!(token_text(&item).contains("(\"age\" , UserIden :: Age)"));
    }

    #[test]
    fn test_param_identity() {
        let args: Vec<FnArg> = vec![
            parse_quote!(&self),
            parse_quote!(logger: Arc<dyn Logger>),
            parse_quote!(mut db: Arc<dyn Database>),
        ];
        let ids: Vec<_> = args.iter().enumerate().map(|(i, a)| param_identity(i, a)).collect();
        assert_eq!(
            ids,
            [
                Identity::Named("self".into()),
                Identity::Named("logger".into()),
                Identity::Named("db".into()),
            ]
        );
    }

    #[test]
    fn test_positional_arguments_match_by_position() {
        let mut block: Block = parse_quote!({ limit(10, 20); });
        let desired: Vec<Expr> = vec![parse_quote!(1), parse_quote!(2), parse_quote!(3)];
        with_call_args(&mut block, "list", "limit", |args| {
            merge_into(args, desired, argument_identity)
        })
        .unwrap();
        assert!(token_text(&block).contains("limit (10 , 20 , 3)"));
    }
}
