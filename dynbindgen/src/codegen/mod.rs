//! Code generation: classification, type mapping and item emission

use std::collections::{HashMap, HashSet};

use crate::{
    codegen::classify::DataModel,
    model::{CType, Declarations, StructDecl},
};

/// Lookup tables over the user-declared type names of one declaration model.
///
/// Every conversion builds its own index; nothing is shared between runs.
#[derive(Debug, Clone, Default)]
pub struct TypeIndex<'a> {
    structs: HashMap<&'a str, &'a StructDecl>,
    enums: HashSet<&'a str>,
    typedefs: HashMap<&'a str, &'a CType>,
    data_model: DataModel,
}

impl<'a> TypeIndex<'a> {
    /// Index the structs, enums and typedefs of a model. When a name is declared
    /// twice the first declaration is indexed; the duplicate is reported by the emitter.
    pub fn new(declarations: &'a Declarations) -> Self {
        let mut structs = HashMap::new();
        for s in &declarations.structs {
            structs.entry(s.name.as_str()).or_insert(s);
        }
        let enums = declarations.enums.iter().map(|e| e.name.as_str()).collect();
        let mut typedefs = HashMap::new();
        for t in &declarations.typedefs {
            typedefs.entry(t.name.as_str()).or_insert(&t.target);
        }
        Self {
            structs,
            enums,
            typedefs,
            data_model: DataModel::default(),
        }
    }

    /// Use the integer widths of a target other than 64-bit Unix
    pub fn with_data_model(mut self, data_model: DataModel) -> Self {
        self.data_model = data_model;
        self
    }

    pub fn data_model(&self) -> DataModel {
        self.data_model
    }

    pub fn struct_decl(&self, name: &str) -> Option<&'a StructDecl> {
        self.structs.get(name).copied()
    }

    pub fn is_opaque_struct(&self, name: &str) -> bool {
        self.struct_decl(name).is_some_and(|s| s.opaque)
    }

    pub fn is_record_struct(&self, name: &str) -> bool {
        self.struct_decl(name).is_some_and(|s| !s.opaque)
    }

    pub fn is_enum(&self, name: &str) -> bool {
        self.enums.contains(name)
    }

    pub fn typedef(&self, name: &str) -> Option<&'a CType> {
        self.typedefs.get(name).copied()
    }

    pub(crate) fn typedef_count(&self) -> usize {
        self.typedefs.len()
    }
}

pub(crate) mod classify;
pub(crate) mod functions;
pub(crate) mod loader;
pub(crate) mod map_type;
pub mod naming;
pub(crate) mod types;
#[cfg(test)]
pub(crate) mod tests;
