//! Declaration store for one target file
//!
//! A [`SourceFile`] owns the parsed syntax tree of a target file for the
//! duration of one synthesis pass. It is either parsed from disk or fabricated
//! from a synthesizer skeleton when the file is absent or does not parse.
//!
//! Declarations are looked up by identity ([`DeclKey`]) with a linear scan and
//! are only ever appended; nothing is removed. Methods are identified by the
//! pair `(self type, method name)` across all inherent `impl` blocks.
//!
//! Writing re-renders the whole tree with prettyplease and replaces the file
//! atomically. When the tree is unchanged since it was parsed the file is left
//! untouched, so a re-run over already synthesized output is a true no-op.
//! Plain `//` comments are not part of the syntax tree: a file that does get
//! rewritten keeps doc comments but loses ordinary comments.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use quote::{ToTokens, quote};
use syn::{
    File, ImplItem, ImplItemFn, Item, ItemConst, ItemEnum, ItemFn, ItemImpl, ItemMod, ItemStruct,
    ItemTrait, ItemUse, Type, UseTree,
};
use tracing::{debug, info, warn};

use crate::codegen::{ident, parse};
use crate::error::{GeneratorError, Result};

/// Identity of a top-level declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclKey {
    /// Type namespace: struct, enum, union, trait, type alias, module
    Type(String),
    /// Value namespace: function, const, static
    Value(String),
    /// Inherent `impl` block of a type
    Impl(String),
}

/// Where the tree of a [`SourceFile`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Parsed from the existing file
    Disk,
    /// Fabricated because the file was absent or did not parse
    Skeleton,
}

/// Result of [`SourceFile::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was created or replaced
    Written,
    /// Nothing changed, the file was not touched
    Unchanged,
}

/// A target file's declaration tree
pub struct SourceFile {
    path: PathBuf,
    file: File,
    origin: Origin,
    baseline: String,
}

impl SourceFile {
    /// Load `path`, falling back to `skeleton` when it is absent or malformed
    ///
    /// Any I/O failure other than a missing file is returned as an error.
    pub fn load(
        path: impl Into<PathBuf>,
        skeleton: impl FnOnce() -> Result<File>,
    ) -> Result<Self> {
        let path = path.into();
        match fs::read_to_string(&path) {
            Ok(source) => match syn::parse_file(&source) {
                Ok(file) => {
                    debug!(path = %path.display(), items = file.items.len(), "parsed existing file");
                    Ok(Self::new(path, file, Origin::Disk))
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "existing file does not parse, rebuilding it from the skeleton"
                    );
                    Ok(Self::new(path, skeleton()?, Origin::Skeleton))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "file absent, starting from the skeleton");
                Ok(Self::new(path, skeleton()?, Origin::Skeleton))
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(path = %path.display(), "existing file is not UTF-8, rebuilding it from the skeleton");
                Ok(Self::new(path, skeleton()?, Origin::Skeleton))
            }
            Err(e) => Err(GeneratorError::io(&path, e)),
        }
    }

    /// Parse `source` as if it had been read from `path`
    pub fn from_source(path: impl Into<PathBuf>, source: &str) -> Result<Self> {
        let file = syn::parse_file(source)
            .map_err(|e| GeneratorError::Parse(format!("{e}")))?;
        Ok(Self::new(path.into(), file, Origin::Disk))
    }

    fn new(path: PathBuf, file: File, origin: Origin) -> Self {
        let baseline = file.to_token_stream().to_string();
        SourceFile {
            path,
            file,
            origin,
            baseline,
        }
    }

    /// Target path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the tree came from
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Top-level declarations in file order
    pub fn items(&self) -> &[Item] {
        &self.file.items
    }

    /// Index of the declaration with identity `key`
    pub fn position(&self, key: &DeclKey) -> Option<usize> {
        self.file
            .items
            .iter()
            .position(|item| decl_key(item).as_ref() == Some(key))
    }

    /// Declaration with identity `key`
    pub fn find(&self, key: &DeclKey) -> Option<&Item> {
        self.position(key).map(|i| &self.file.items[i])
    }

    /// Whether a method `name` exists in an inherent impl of `self_ty`
    pub fn has_method(&self, self_ty: &str, name: &str) -> bool {
        self.method_location(self_ty, name).is_some()
    }

    /// Append a declaration after all existing ones; returns its index
    pub fn append(&mut self, item: Item) -> usize {
        self.file.items.push(item);
        self.file.items.len() - 1
    }

    fn ensure(&mut self, key: DeclKey, skeleton: impl FnOnce() -> Result<Item>) -> Result<&mut Item> {
        let index = match self.position(&key) {
            Some(index) => index,
            None => {
                let item = skeleton()?;
                debug!(path = %self.path.display(), declaration = ?key, "appending declaration");
                self.append(item)
            }
        };
        Ok(&mut self.file.items[index])
    }

    /// The struct `name`, appended from `skeleton` when absent
    pub fn ensure_struct(
        &mut self,
        name: &str,
        skeleton: impl FnOnce() -> Result<ItemStruct>,
    ) -> Result<&mut ItemStruct> {
        let path = self.path.clone();
        match self.ensure(DeclKey::Type(name.to_string()), || skeleton().map(Item::Struct))? {
            Item::Struct(item) => Ok(item),
            _ => Err(shape_mismatch(&path, name, "a struct")),
        }
    }

    /// The enum `name`, appended from `skeleton` when absent
    pub fn ensure_enum(
        &mut self,
        name: &str,
        skeleton: impl FnOnce() -> Result<ItemEnum>,
    ) -> Result<&mut ItemEnum> {
        let path = self.path.clone();
        match self.ensure(DeclKey::Type(name.to_string()), || skeleton().map(Item::Enum))? {
            Item::Enum(item) => Ok(item),
            _ => Err(shape_mismatch(&path, name, "an enum")),
        }
    }

    /// The trait `name`, appended from `skeleton` when absent
    pub fn ensure_trait(
        &mut self,
        name: &str,
        skeleton: impl FnOnce() -> Result<ItemTrait>,
    ) -> Result<&mut ItemTrait> {
        let path = self.path.clone();
        match self.ensure(DeclKey::Type(name.to_string()), || skeleton().map(Item::Trait))? {
            Item::Trait(item) => Ok(item),
            _ => Err(shape_mismatch(&path, name, "a trait")),
        }
    }

    /// The free function `name`, appended from `skeleton` when absent
    pub fn ensure_fn(
        &mut self,
        name: &str,
        skeleton: impl FnOnce() -> Result<ItemFn>,
    ) -> Result<&mut ItemFn> {
        let path = self.path.clone();
        match self.ensure(DeclKey::Value(name.to_string()), || skeleton().map(Item::Fn))? {
            Item::Fn(item) => Ok(item),
            _ => Err(shape_mismatch(&path, name, "a function")),
        }
    }

    /// The constant `name`, appended from `skeleton` when absent
    pub fn ensure_const(
        &mut self,
        name: &str,
        skeleton: impl FnOnce() -> Result<ItemConst>,
    ) -> Result<&mut ItemConst> {
        let path = self.path.clone();
        match self.ensure(DeclKey::Value(name.to_string()), || skeleton().map(Item::Const))? {
            Item::Const(item) => Ok(item),
            _ => Err(shape_mismatch(&path, name, "a constant")),
        }
    }

    /// The module declaration `name`, appended from `skeleton` when absent
    pub fn ensure_mod(
        &mut self,
        name: &str,
        skeleton: impl FnOnce() -> Result<ItemMod>,
    ) -> Result<&mut ItemMod> {
        let path = self.path.clone();
        match self.ensure(DeclKey::Type(name.to_string()), || skeleton().map(Item::Mod))? {
            Item::Mod(item) => Ok(item),
            _ => Err(shape_mismatch(&path, name, "a module")),
        }
    }

    /// The method `name` of `self_ty`, appended from `skeleton` when absent
    ///
    /// A new method goes to the end of the first inherent impl of `self_ty`;
    /// an impl block is appended to the file when there is none yet.
    pub fn ensure_method(
        &mut self,
        self_ty: &str,
        name: &str,
        skeleton: impl FnOnce() -> Result<ImplItemFn>,
    ) -> Result<&mut ImplItemFn> {
        let (item_index, member_index) = match self.method_location(self_ty, name) {
            Some(location) => location,
            None => {
                let method = skeleton()?;
                let impl_index = self.ensure_impl_index(self_ty)?;
                let Item::Impl(block) = &mut self.file.items[impl_index] else {
                    return Err(shape_mismatch(&self.path, self_ty, "an impl block"));
                };
                block.items.push(ImplItem::Fn(method));
                debug!(path = %self.path.display(), self_ty, method = name, "appending method");
                (impl_index, block.items.len() - 1)
            }
        };

        match &mut self.file.items[item_index] {
            Item::Impl(block) => match &mut block.items[member_index] {
                ImplItem::Fn(method) => Ok(method),
                _ => Err(GeneratorError::MissingContext(format!(
                    "`{self_ty}::{name}` is not a method"
                ))),
            },
            _ => Err(GeneratorError::MissingContext(format!(
                "`{self_ty}::{name}` is not inside an impl block"
            ))),
        }
    }

    /// Index of the first inherent impl of `self_ty`, appending an empty one
    pub fn ensure_impl_index(&mut self, self_ty: &str) -> Result<usize> {
        if let Some(index) = self.position(&DeclKey::Impl(self_ty.to_string())) {
            return Ok(index);
        }
        let ty = ident(self_ty);
        let block: ItemImpl = parse(quote! { impl #ty {} })?;
        Ok(self.append(Item::Impl(block)))
    }

    fn method_location(&self, self_ty: &str, name: &str) -> Option<(usize, usize)> {
        self.file.items.iter().enumerate().find_map(|(item_index, item)| {
            let Item::Impl(block) = item else {
                return None;
            };
            if block.trait_.is_some() || type_name(&block.self_ty).as_deref() != Some(self_ty) {
                return None;
            }
            block
                .items
                .iter()
                .position(|member| matches!(member, ImplItem::Fn(f) if f.sig.ident == name))
                .map(|member_index| (item_index, member_index))
        })
    }

    /// Make sure every path imported by `item` is imported by the file
    ///
    /// Imports already covered (exactly, or through a glob) are skipped. When
    /// nothing of `item` is imported yet it is inserted as is, otherwise one
    /// `use` per missing path. New imports go right after the last existing
    /// `use` item. Returns whether anything was inserted.
    pub fn ensure_use(&mut self, item: ItemUse) -> Result<bool> {
        let existing: Vec<String> = self
            .file
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Use(u) => Some(use_leaves(&u.tree)),
                _ => None,
            })
            .flatten()
            .collect();

        let wanted = use_leaves(&item.tree);
        let missing: Vec<&String> = wanted
            .iter()
            .filter(|leaf| !is_imported(leaf, &existing))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        let additions: Vec<ItemUse> = if missing.len() == wanted.len() {
            vec![item]
        } else {
            let vis = &item.vis;
            missing
                .iter()
                .map(|leaf| {
                    let tree: UseTree = syn::parse_str(leaf).map_err(|e| {
                        GeneratorError::CodeGenError(format!("invalid import path '{leaf}': {e}"))
                    })?;
                    parse(quote! { #vis use #tree; })
                })
                .collect::<Result<_>>()?
        };

        let mut at = self
            .file
            .items
            .iter()
            .rposition(|i| matches!(i, Item::Use(_)))
            .map_or(0, |i| i + 1);
        for addition in additions {
            self.file.items.insert(at, Item::Use(addition));
            at += 1;
        }
        Ok(true)
    }

    /// Whether the tree differs from what was loaded
    pub fn is_modified(&self) -> bool {
        self.origin == Origin::Skeleton || self.file.to_token_stream().to_string() != self.baseline
    }

    /// Pretty-printed file content
    pub fn render(&self) -> String {
        prettyplease::unparse(&self.file)
    }

    /// Replace the file on disk with the rendered tree when it changed
    pub fn write(&self) -> Result<WriteOutcome> {
        if !self.is_modified() {
            debug!(path = %self.path.display(), "unchanged, not writing");
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| GeneratorError::io(parent, e))?;
        }

        let staging = staging_path(&self.path);
        fs::write(&staging, self.render()).map_err(|e| GeneratorError::io(&staging, e))?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(GeneratorError::io(&self.path, e));
        }

        info!(path = %self.path.display(), origin = ?self.origin, "wrote file");
        Ok(WriteOutcome::Written)
    }
}

/// Identity of a top-level item, `None` for items that are never looked up
pub fn decl_key(item: &Item) -> Option<DeclKey> {
    let key = match item {
        Item::Struct(i) => DeclKey::Type(i.ident.to_string()),
        Item::Enum(i) => DeclKey::Type(i.ident.to_string()),
        Item::Union(i) => DeclKey::Type(i.ident.to_string()),
        Item::Trait(i) => DeclKey::Type(i.ident.to_string()),
        Item::Type(i) => DeclKey::Type(i.ident.to_string()),
        Item::Mod(i) => DeclKey::Type(i.ident.to_string()),
        Item::Fn(i) => DeclKey::Value(i.sig.ident.to_string()),
        Item::Const(i) => DeclKey::Value(i.ident.to_string()),
        Item::Static(i) => DeclKey::Value(i.ident.to_string()),
        Item::Impl(i) if i.trait_.is_none() => DeclKey::Impl(type_name(&i.self_ty)?),
        _ => return None,
    };
    Some(key)
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn shape_mismatch(path: &Path, name: &str, expected: &str) -> GeneratorError {
    GeneratorError::MissingContext(format!(
        "`{name}` in {} is not {expected}",
        path.display()
    ))
}

fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.scaffold-tmp"))
}

/// Flatten a use tree into the paths it imports (`a::b::C`, `a::*`, `a::B as C`)
fn use_leaves(tree: &UseTree) -> Vec<String> {
    let mut leaves = Vec::new();
    collect_leaves(tree, &mut Vec::new(), &mut leaves);
    leaves
}

fn collect_leaves(tree: &UseTree, prefix: &mut Vec<String>, out: &mut Vec<String>) {
    match tree {
        UseTree::Path(path) => {
            prefix.push(path.ident.to_string());
            collect_leaves(&path.tree, prefix, out);
            prefix.pop();
        }
        UseTree::Name(name) if name.ident == "self" => out.push(prefix.join("::")),
        UseTree::Name(name) => out.push(join(prefix, &name.ident.to_string())),
        UseTree::Rename(rename) => out.push(format!(
            "{} as {}",
            join(prefix, &rename.ident.to_string()),
            rename.rename
        )),
        UseTree::Glob(_) => out.push(join(prefix, "*")),
        UseTree::Group(group) => {
            for tree in &group.items {
                collect_leaves(tree, prefix, out);
            }
        }
    }
}

fn join(prefix: &[String], last: &str) -> String {
    if prefix.is_empty() {
        last.to_string()
    } else {
        format!("{}::{last}", prefix.join("::"))
    }
}

fn is_imported(leaf: &str, existing: &[String]) -> bool {
    existing.iter().any(|have| {
        have == leaf
            || have.strip_suffix("::*").is_some_and(|module| {
                leaf.strip_prefix(module)
                    .and_then(|rest| rest.strip_prefix("::"))
                    .is_some_and(|rest| !rest.contains("::") && !rest.contains(" as "))
            })
    })
}
