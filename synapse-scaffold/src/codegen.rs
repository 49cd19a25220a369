//! Token helpers shared by the synthesizers

use std::collections::HashSet;

use once_cell::sync::Lazy;
use proc_macro2::{Ident, Span, TokenStream};
use syn::parse::{Parse, Parser};

use crate::error::{GeneratorError, Result};

/// Reserved words that need a raw identifier when used as a field name
static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
        "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
        "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
        "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe",
        "unsized", "use", "virtual", "where", "while", "yield",
    ]
    .into_iter()
    .collect()
});

/// Whether `name` can be spelled as a Rust identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name != "_"
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !matches!(name, "self" | "Self" | "super" | "crate")
}

/// Identifier for `name`, raw when it collides with a keyword
pub fn ident(name: &str) -> Ident {
    if KEYWORDS.contains(name) {
        Ident::new_raw(name, Span::call_site())
    } else {
        Ident::new(name, Span::call_site())
    }
}

/// Parse generated tokens into a syntax node
pub fn parse<T: Parse>(tokens: TokenStream) -> Result<T> {
    syn::parse2(tokens).map_err(|e| {
        GeneratorError::CodeGenError(format!("failed to parse generated code: {e}"))
    })
}

/// Parse `pub name: Type` as a named struct field
pub fn named_field(tokens: TokenStream) -> Result<syn::Field> {
    syn::Field::parse_named.parse2(tokens).map_err(|e| {
        GeneratorError::CodeGenError(format!("failed to parse generated field: {e}"))
    })
}

/// Parse a type produced by the type mapper
pub fn parse_type(ty: &str) -> Result<syn::Type> {
    syn::parse_str(ty)
        .map_err(|e| GeneratorError::CodeGenError(format!("invalid mapped type '{ty}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn test_keyword_becomes_raw() {
        assert_eq!(ident("type").to_string(), "r#type");
        assert_eq!(ident("name").to_string(), "name");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("created_at"));
        assert!(is_identifier("_hidden"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("my-field"));
        assert!(!is_identifier("_"));
        assert!(!is_identifier("self"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_parse_type() {
        assert!(parse_type("Vec<Uuid>").is_ok());
        assert!(parse_type("Vec<").is_err());
    }

    #[test]
    fn test_parse_reports_codegen_error() {
        let Err(err) = parse::<syn::ItemStruct>(quote! { fn nope() {} }) else {
            panic!("a function is not a struct");
        };
        assert!(matches!(err, GeneratorError::CodeGenError(_)));
    }
}
