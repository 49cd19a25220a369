//! Layer module indexes
//!
//! Each layer directory has a `mod.rs` declaring one module per entity file.
//! Indexes are shared by all entities and are synthesized before any entity
//! work starts.

use std::path::PathBuf;

use quote::quote;
use syn::ItemUse;

use super::Synthesizer;
use crate::codegen::{ident, parse};
use crate::error::Result;
use crate::layout;
use crate::store::{DeclKey, SourceFile};

/// Synthesizes the `mod.rs` of one layer directory
pub struct ModuleIndexSynthesizer {
    dir: &'static str,
    modules: Vec<String>,
}

impl ModuleIndexSynthesizer {
    /// Index of `dir` declaring `modules`, in the order given
    pub fn new(dir: &'static str, modules: Vec<String>) -> Self {
        ModuleIndexSynthesizer { dir, modules }
    }
}

impl Synthesizer for ModuleIndexSynthesizer {
    fn name(&self) -> &'static str {
        "module index"
    }

    fn path(&self) -> PathBuf {
        layout::module_index(self.dir)
    }

    fn header(&self) -> Vec<String> {
        vec![format!("Modules of `{}`.", self.dir)]
    }

    fn imports(&self) -> Result<Vec<ItemUse>> {
        Ok(Vec::new())
    }

    fn apply(&self, file: &mut SourceFile) -> Result<usize> {
        let mut appended = 0;
        for module in &self.modules {
            if file.find(&DeclKey::Type(module.clone())).is_none() {
                appended += 1;
            }
            let name = ident(module);
            file.ensure_mod(module, || parse(quote! { pub mod #name; }))?;
        }
        Ok(appended)
    }
}
