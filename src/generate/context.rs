//! The one value threaded through every pipeline stage: both interning
//! tables, the type-by-name index and the emission roots. One
//! `BindingContext` per run; nothing here is static.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::cxx::{CxxAst, DeclId, TypeId};
use crate::generate::decl::WrappedDecl;
use crate::generate::ty::WrappedType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WDeclId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WTypeId(pub u32);

#[derive(Debug)]
pub struct BindingContext<'a> {
    pub ast: &'a CxxAst,

    decls: Vec<WrappedDecl>,
    decl_map: HashMap<DeclId, WDeclId>,

    types: Vec<WrappedType>,
    type_map: HashMap<TypeId, WTypeId>,
    types_by_name: HashMap<String, Vec<WTypeId>>,

    /// Emission roots, in insertion order. Deduplicated through `free_set`
    /// so redeclarations do not produce duplicate roots.
    free_decls: Vec<WDeclId>,
    free_set: HashSet<WDeclId>,
}

impl<'a> BindingContext<'a> {
    pub fn new(ast: &'a CxxAst) -> BindingContext<'a> {
        BindingContext {
            ast,
            decls: vec![],
            decl_map: HashMap::new(),
            types: vec![],
            type_map: HashMap::new(),
            types_by_name: HashMap::new(),
            free_decls: vec![],
            free_set: HashSet::new(),
        }
    }

    pub fn decl(&self, id: WDeclId) -> &WrappedDecl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_mut(&mut self, id: WDeclId) -> &mut WrappedDecl {
        &mut self.decls[id.0 as usize]
    }

    pub fn ty(&self, id: WTypeId) -> &WrappedType {
        &self.types[id.0 as usize]
    }

    pub fn ty_mut(&mut self, id: WTypeId) -> &mut WrappedType {
        &mut self.types[id.0 as usize]
    }

    /// Wrapped declaration for a parsed declaration, going through the
    /// canonical entry.
    pub fn lookup_decl(&self, source: DeclId) -> Option<WDeclId> {
        self.decl_map.get(&self.ast.canonical(source)).copied()
    }

    /// Inserts a wrapped declaration under its canonical key and under
    /// `source` itself when that differs.
    pub fn insert_decl(&mut self, source: DeclId, decl: WrappedDecl) -> WDeclId {
        let id = WDeclId(self.decls.len() as u32);
        let canonical = self.ast.canonical(source);
        self.decls.push(decl);
        self.decl_map.insert(canonical, id);
        if canonical != source {
            self.decl_map.insert(source, id);
        }
        id
    }

    /// Points a redeclaration at an already-wrapped canonical entry.
    pub fn alias_decl(&mut self, source: DeclId, id: WDeclId) {
        self.decl_map.entry(source).or_insert(id);
    }

    pub fn lookup_type(&self, source: TypeId) -> Option<WTypeId> {
        self.type_map.get(&source).copied()
    }

    pub(crate) fn push_type(&mut self, ty: WrappedType) -> WTypeId {
        let id = WTypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub(crate) fn map_type(&mut self, source: TypeId, id: WTypeId) {
        self.type_map.insert(source, id);
    }

    pub fn register_type_name(&mut self, name: &str, id: WTypeId) {
        let entries = self.types_by_name.entry(name.to_string()).or_default();
        if !entries.contains(&id) {
            entries.push(id);
        }
    }

    pub fn types_by_name(&self, name: &str) -> &[WTypeId] {
        self.types_by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn add_free(&mut self, id: WDeclId) {
        if self.free_set.insert(id) {
            self.free_decls.push(id);
        }
    }

    pub fn free_decls(&self) -> &[WDeclId] {
        &self.free_decls
    }

    /// Emission roots sorted by position in the translation unit; invalid
    /// locations sort first (they carry no position of their own).
    pub fn free_decls_in_source_order(&self) -> Vec<WDeclId> {
        self.free_decls
            .iter()
            .copied()
            .sorted_by_key(|&id| {
                let loc = self.ast.decl(self.decl(id).source).loc;
                (loc.is_valid(), loc.tu_order)
            })
            .collect_vec()
    }

    pub fn wrapped_decl_count(&self) -> usize {
        self.decls.len()
    }
}
