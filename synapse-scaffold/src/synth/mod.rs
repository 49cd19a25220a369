//! Artifact synthesizers
//!
//! Each synthesizer owns one target file. A pass loads the file (or a
//! skeleton), makes sure the fixed imports are there, finds or appends every
//! declaration it is responsible for and merges the entity-driven members
//! into them. The file is written only when something was inserted.
//!
//! Synthesizers never remove or rewrite what they find: a method body, a
//! field type or a derive list edited by hand is left as it is.

mod decoder;
mod encoder;
mod interfaces;
mod model;
mod modules;
mod repository;
mod usecase;

use std::path::{Path, PathBuf};

use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};
use syn::ItemUse;
use tracing::{debug, info};

use crate::codegen::{ident, parse};
use crate::config::Features;
use crate::entity::{Entity, Field, FieldType, Scalar};
use crate::error::Result;
use crate::merge::ContainerKind;
use crate::store::{SourceFile, WriteOutcome};
use crate::types::TypeMapper;

pub use decoder::DecoderSynthesizer;
pub use encoder::EncoderSynthesizer;
pub use interfaces::InterfacesSynthesizer;
pub use model::ModelSynthesizer;
pub use modules::ModuleIndexSynthesizer;
pub use repository::RepositorySynthesizer;
pub use usecase::UseCaseSynthesizer;

/// A synthesizer for one target file
pub trait Synthesizer {
    /// Artifact name used in logs and reports (e.g., "repository")
    fn name(&self) -> &'static str;

    /// Target path, relative to the project root
    fn path(&self) -> PathBuf;

    /// Lines of the `//!` header written into a fresh file
    fn header(&self) -> Vec<String>;

    /// Imports every version of the file must carry
    fn imports(&self) -> Result<Vec<ItemUse>>;

    /// Find or append each declaration and merge the desired members
    ///
    /// Returns the number of inserted members and declarations.
    fn apply(&self, file: &mut SourceFile) -> Result<usize>;

    /// Header and imports only, the starting point for absent files
    fn skeleton(&self) -> Result<syn::File> {
        let mut lines = self.header();
        lines.extend(MAINTENANCE_NOTE.iter().map(|line| line.to_string()));
        let docs = lines.iter().map(|line| {
            let line = if line.is_empty() { String::new() } else { format!(" {line}") };
            quote! { #![doc = #line] }
        });
        let imports = self.imports()?;
        parse(quote! {
            #(#docs)*
            #![allow(unused_imports)]

            #(#imports)*
        })
    }

    /// Run one pass over the target file under `root`
    fn sync(&self, root: &Path) -> Result<SyncOutcome> {
        let path = root.join(self.path());
        let mut file = SourceFile::load(&path, || self.skeleton())?;

        let mut inserted = 0;
        for import in self.imports()? {
            if file.ensure_use(import)? {
                inserted += 1;
            }
        }
        inserted += self.apply(&mut file)?;

        let outcome = file.write()?;
        match outcome {
            WriteOutcome::Written => {
                info!(artifact = self.name(), path = %path.display(), inserted, "synthesized")
            }
            WriteOutcome::Unchanged => {
                debug!(artifact = self.name(), path = %path.display(), "up to date")
            }
        }
        Ok(SyncOutcome {
            artifact: self.name(),
            path,
            outcome,
            inserted,
        })
    }
}

/// What one synthesizer pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Artifact name
    pub artifact: &'static str,
    /// Absolute target path
    pub path: PathBuf,
    /// Whether the file was touched
    pub outcome: WriteOutcome,
    /// Inserted members and declarations
    pub inserted: usize,
}

const MAINTENANCE_NOTE: [&str; 5] = [
    "",
    "Maintained by synapse-scaffold. Re-running the generator adds missing",
    "declarations and members and never removes or rewrites existing ones.",
    "Use doc comments for notes: plain `//` comments are dropped whenever",
    "the generator rewrites this file.",
];

/// Everything a per-entity synthesizer needs
#[derive(Clone, Copy)]
pub struct SynthContext<'a> {
    /// The entity being synthesized
    pub entity: &'a Entity,
    /// Type conventions
    pub mapper: &'a dyn TypeMapper,
    /// Project toggles
    pub features: Features,
}

impl<'a> SynthContext<'a> {
    /// Build a context
    pub fn new(entity: &'a Entity, mapper: &'a dyn TypeMapper, features: Features) -> Self {
        SynthContext {
            entity,
            mapper,
            features,
        }
    }

    /// Identifiers derived from the entity name
    pub fn names(&self) -> Names {
        Names::new(self.entity)
    }

    /// Domain-model type of `field`
    pub fn memory_type(&self, field: &Field) -> Result<syn::Type> {
        crate::codegen::parse_type(&self.mapper.in_memory_type(field))
    }

    /// Storage-row type of `field`
    pub fn storage_type(&self, field: &Field) -> Result<syn::Type> {
        crate::codegen::parse_type(&self.mapper.storage_type(field))
    }

    /// Wire field identifier of `field`
    pub fn wire_ident(&self, field: &Field) -> Ident {
        ident(&self.mapper.wire_field_name(field))
    }

    /// Whether `field` travels on the wire in its domain type
    pub fn wire_matches_memory(&self, field: &Field) -> bool {
        self.mapper.wire_type(field) == self.mapper.in_memory_type(field)
    }
}

/// Identifiers derived from an entity name
///
/// For `User`: `User`, `UserPatch`, `UserFilter`, `UserRow`, `UserIden`,
/// `UserRepository`, `UserUseCase`, the `pb::*` request/response messages
/// and the encoder/decoder function names.
pub struct Names {
    pub model: Ident,
    pub patch: Ident,
    pub filter: Ident,
    pub row: Ident,
    pub iden: Ident,
    pub repository: Ident,
    pub usecase: Ident,
    pub module: Ident,
    pub create_request: Ident,
    pub get_request: Ident,
    pub update_request: Ident,
    pub delete_request: Ident,
    pub list_request: Ident,
    pub list_response: Ident,
    pub order_field: Ident,
    pub order_fields_table: Ident,
    pub encode_create: Ident,
    pub encode_update: Ident,
    pub encode_filter: Ident,
    pub decode: Ident,
    pub decode_list: Ident,
    pub collection: Ident,
    /// Entity name in snake case, used in messages and events
    pub label: String,
}

impl Names {
    pub fn new(entity: &Entity) -> Self {
        let name = &entity.name;
        let snake = entity.snake_name();
        let plural = entity.plural_name();
        Names {
            model: format_ident!("{}", name),
            patch: format_ident!("{}Patch", name),
            filter: format_ident!("{}Filter", name),
            row: format_ident!("{}Row", name),
            iden: format_ident!("{}Iden", name),
            repository: format_ident!("{}Repository", name),
            usecase: format_ident!("{}UseCase", name),
            module: ident(&snake),
            create_request: format_ident!("Create{}Request", name),
            get_request: format_ident!("Get{}Request", name),
            update_request: format_ident!("Update{}Request", name),
            delete_request: format_ident!("Delete{}Request", name),
            list_request: format_ident!("List{}Request", plural),
            list_response: format_ident!("List{}Response", plural),
            order_field: format_ident!("{}OrderField", name),
            order_fields_table: format_ident!("{}_ORDER_FIELDS", snake.to_uppercase()),
            encode_create: format_ident!("encode_create_{}", snake),
            encode_update: format_ident!("encode_update_{}", snake),
            encode_filter: format_ident!("encode_{}_filter", snake),
            decode: format_ident!("decode_{}", snake),
            decode_list: format_ident!("decode_{}_list", snake),
            collection: ident(&entity.collection_name()),
            label: snake,
        }
    }
}

/// Variant identifier of `field` in enums such as `UserIden`
pub(crate) fn variant_ident(field: &Field) -> Ident {
    format_ident!("{}", field.variant_name())
}

/// Whether values of `field` can be copied out of a borrowed struct
pub(crate) fn is_copy(field: &Field) -> bool {
    match &field.field_type {
        FieldType::Scalar(Scalar::String) | FieldType::List(_) => false,
        FieldType::Scalar(_) | FieldType::Uuid | FieldType::Timestamp => true,
    }
}

/// `source.field`, cloned unless the value is `Copy`
pub(crate) fn read_field(source: &TokenStream, field: &Field) -> TokenStream {
    let name = ident(&field.name);
    if is_copy(field) {
        quote! { #source.#name }
    } else {
        quote! { #source.#name.clone() }
    }
}

/// Log and pass through the number of members merged into a container
pub(crate) fn merged(kind: ContainerKind, target: &str, inserted: usize) -> usize {
    if inserted > 0 {
        debug!(container = kind.describe(), target, inserted, "merged members");
    }
    inserted
}

/// Parse a list of `use` items
pub(crate) fn imports(tokens: impl IntoIterator<Item = TokenStream>) -> Result<Vec<ItemUse>> {
    tokens.into_iter().map(parse).collect()
}
