//! The declaration walker: one pass over the parsed AST that materializes a
//! wrapped declaration for every reachable entity. Nothing here fails the
//! run; a subtree the generator cannot represent is marked unwrappable and
//! traversal continues.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::cxx::{CxxAst, CxxDeclKind, DeclId, FunctionDecl, RecordDecl, RecordTag};
use crate::generate::context::{BindingContext, WDeclId};
use crate::generate::decl::{DeclVariant, Visibility, WrappedDecl};

/// Why a subtree could not be represented. Carried up by the traversal so
/// the owning declaration can be marked instead of discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unsupported {
    ParameterPack,
    UnrepresentableType,
}

type WalkResult = Result<(), Unsupported>;

/// Populates the declaration table from the translation unit down.
pub fn walk(ctx: &mut BindingContext) {
    let ast = ctx.ast;
    let mut walker = DeclWalker { ast, ctx };
    let CxxDeclKind::TranslationUnit { children } = &ast.decl(ast.tu).kind else {
        return;
    };
    for &child in children {
        walker.register(child, true, None);
    }
}

/// Second pass: flag the emission roots whose defining file is one of the
/// input headers. Paths are compared by filesystem equivalence, falling
/// back to lexical equality when a path cannot be canonicalized.
pub fn restrict_to_files(ctx: &mut BindingContext, headers: &[PathBuf]) {
    let headers: Vec<PathBuf> = headers.iter().map(|h| normalize(h)).collect();
    let roots: Vec<WDeclId> = ctx.free_decls().to_vec();
    for root in roots {
        let loc = ctx.ast.decl(ctx.decl(root).source).loc;
        let Some(file) = loc.file else { continue };
        let path = normalize(ctx.ast.file(file));
        if headers.contains(&path) {
            ctx.decl_mut(root).should_emit = true;
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

struct DeclWalker<'w, 'a> {
    ast: &'a CxxAst,
    ctx: &'w mut BindingContext<'a>,
}

impl DeclWalker<'_, '_> {
    /// Registers one declaration (and its subtree) under its canonical
    /// entry. Redeclarations resolve to the existing node.
    fn register(&mut self, id: DeclId, top_level: bool, template_list: Option<&[DeclId]>) {
        let canonical = self.ast.canonical(id);
        if let Some(existing) = self.ctx.lookup_decl(canonical) {
            self.ctx.alias_decl(id, existing);
            if top_level {
                self.ctx.add_free(existing);
            }
            return;
        }

        let decl = self.ast.decl(canonical).clone();
        let name = decl.name;
        let registered = match decl.kind {
            CxxDeclKind::TranslationUnit { .. } => return,
            CxxDeclKind::LinkageSpec { children, .. } => {
                // extern-linkage blocks are transparent; their contents keep
                // the surrounding top-level flag
                for child in children {
                    self.register(child, top_level, None);
                }
                return;
            }
            CxxDeclKind::Namespace { redecls, .. } => {
                let w = self.allocate(canonical, DeclVariant::Namespace, &name, decl.access);
                for redecl in redecls {
                    if let CxxDeclKind::Namespace { children, .. } = &self.ast.decl(redecl).kind {
                        for &child in children {
                            self.register(child, false, None);
                        }
                    }
                }
                w
            }
            CxxDeclKind::Record(record) => {
                if record.specialization.is_none() && self.inside_template(canonical) {
                    debug!("record `{name}` lives inside a template, skipping");
                    self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
                } else {
                    self.register_record(canonical, &name, decl.access, &record, false)
                }
            }
            CxxDeclKind::Function(function) => {
                self.register_function(canonical, DeclVariant::Function, &name, decl.access, &function)
            }
            CxxDeclKind::Method(function) => {
                if function.is_deleted {
                    self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
                } else if self.inside_template(canonical) {
                    self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
                } else {
                    self.register_function(canonical, DeclVariant::Method, &name, decl.access, &function)
                }
            }
            CxxDeclKind::Constructor(function) => {
                if function.is_deleted || self.inside_template(canonical) {
                    self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
                } else {
                    self.register_function(
                        canonical,
                        DeclVariant::Constructor,
                        &name,
                        decl.access,
                        &function,
                    )
                }
            }
            CxxDeclKind::Destructor(function) => {
                if function.is_deleted || self.inside_template(canonical) {
                    self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
                } else {
                    self.register_function(
                        canonical,
                        DeclVariant::Destructor,
                        &name,
                        decl.access,
                        &function,
                    )
                }
            }
            CxxDeclKind::Enum {
                underlying,
                constants,
            } => {
                let w = self.allocate(canonical, DeclVariant::Enum, &name, decl.access);
                if let Some(enum_ty) = self.ast.type_of_decl(canonical) {
                    self.ctx.intern_type(enum_ty);
                }
                let member = self.ctx.intern_type(underlying);
                if !self.ctx.is_type_wrappable(member, false) {
                    self.ctx.decl_mut(w).mark_unwrappable();
                }
                for constant in constants {
                    self.register(constant, false, None);
                }
                w
            }
            CxxDeclKind::EnumConstant { .. } => {
                self.allocate(canonical, DeclVariant::EnumConstant, &name, decl.access)
            }
            CxxDeclKind::Field { ty } => {
                let w = self.allocate(canonical, DeclVariant::Field, &name, decl.access);
                let field_ty = self.ctx.intern_type(ty);
                if !self.ctx.is_type_wrappable(field_ty, false) {
                    self.ctx.decl_mut(w).mark_unwrappable();
                }
                w
            }
            CxxDeclKind::Variable { ty, .. } => {
                let w = self.allocate(canonical, DeclVariant::Variable, &name, decl.access);
                let var_ty = self.ctx.intern_type(ty);
                if !self.ctx.is_type_wrappable(var_ty, false) {
                    self.ctx.decl_mut(w).mark_unwrappable();
                }
                w
            }
            CxxDeclKind::Param { ty } => {
                let w = self.allocate(canonical, DeclVariant::Argument, &name, decl.access);
                self.ctx.intern_type(ty);
                w
            }
            CxxDeclKind::Typedef {
                underlying,
                is_implicit,
            } => {
                let w = self.allocate(canonical, DeclVariant::Typedef, &name, decl.access);
                if let Some(typedef_ty) = self.ast.type_of_decl(canonical) {
                    self.ctx.intern_type(typedef_ty);
                }
                let target = self.ctx.intern_type(underlying);
                // weeds out compiler-injected typedefs like __int128
                if is_implicit || !self.ctx.is_type_wrappable(target, false) {
                    self.ctx.decl_mut(w).mark_unwrappable();
                }
                w
            }
            CxxDeclKind::ClassTemplate {
                params,
                templated,
                specializations,
            } => self.register_class_template(
                canonical,
                &name,
                decl.access,
                &params,
                templated,
                &specializations,
            ),
            CxxDeclKind::TemplateTypeParam { .. } => {
                let w =
                    self.allocate(canonical, DeclVariant::TemplateTypeArgument, &name, decl.access);
                if let Some(param_ty) = self.ast.type_of_decl(canonical) {
                    let wrapped = self.ctx.intern_type(param_ty);
                    if let Some(list) = template_list {
                        use crate::generate::ty::TypeVariant;
                        if let TypeVariant::TemplateArgument { param_lists, .. } =
                            &mut self.ctx.ty_mut(wrapped).variant
                        {
                            param_lists.push(list.to_vec());
                        }
                    }
                }
                w
            }
            CxxDeclKind::TemplateNonTypeParam { ty, .. } => {
                let w = self.allocate(
                    canonical,
                    DeclVariant::TemplateNonTypeArgument,
                    &name,
                    decl.access,
                );
                self.ctx.intern_type(ty);
                w
            }
            CxxDeclKind::TypeAliasTemplate => {
                debug!("type-alias template `{name}` is not representable");
                let w =
                    self.allocate(canonical, DeclVariant::UsingAliasTemplate, &name, decl.access);
                self.ctx.decl_mut(w).mark_unwrappable();
                w
            }
            CxxDeclKind::ClassTemplatePartialSpecialization => {
                debug!("skipping partial specialization of `{name}`");
                self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
            }
            CxxDeclKind::FunctionTemplate
            | CxxDeclKind::UsingDirective
            | CxxDeclKind::UsingDecl
            | CxxDeclKind::UsingShadow
            | CxxDeclKind::AccessSpec
            | CxxDeclKind::Friend
            | CxxDeclKind::StaticAssert
            | CxxDeclKind::IndirectField
            | CxxDeclKind::UnresolvedUsingValue
            | CxxDeclKind::Empty => {
                self.allocate(canonical, DeclVariant::Unwrappable, &name, decl.access)
            }
        };

        if top_level {
            self.ctx.add_free(registered);
        }
    }

    fn allocate(
        &mut self,
        source: DeclId,
        variant: DeclVariant,
        name: &str,
        access: crate::cxx::Access,
    ) -> WDeclId {
        let mut wrapped = WrappedDecl::new(source, variant, name.to_string());
        wrapped.visibility = Visibility::from_access(access);
        self.ctx.insert_decl(source, wrapped)
    }

    /// True when the declaration context is (transitively) parameterized by
    /// a template.
    fn inside_template(&self, id: DeclId) -> bool {
        let mut cursor = self.ast.decl(id).parent;
        while let Some(current) = cursor {
            if matches!(
                self.ast.decl(current).kind,
                CxxDeclKind::ClassTemplate { .. }
            ) {
                return true;
            }
            cursor = self.ast.decl(current).parent;
        }
        false
    }

    fn register_record(
        &mut self,
        source: DeclId,
        name: &str,
        access: crate::cxx::Access,
        record: &RecordDecl,
        template_body: bool,
    ) -> WDeclId {
        let variant = if record.specialization.is_some() {
            DeclVariant::SpecializedRecord
        } else if record.tag == RecordTag::Union {
            DeclVariant::Union
        } else {
            DeclVariant::Record
        };
        let w = self.allocate(source, variant, name, access);
        if let Some(record_ty) = self.ast.type_of_decl(source) {
            self.ctx.intern_type(record_ty);
        }

        if let Err(reason) = self.record_members(w, record, template_body) {
            debug!("marking record `{name}` unwrappable: {reason:?}");
            self.ctx.decl_mut(w).mark_unwrappable();
        }
        w
    }

    fn record_members(
        &mut self,
        w: WDeclId,
        record: &RecordDecl,
        template_body: bool,
    ) -> WalkResult {
        for &child in &record.children {
            self.register(child, false, None);
        }
        let mut all_fields_wrappable = true;
        for &field in &record.fields {
            self.register(field, false, None);
            if let Some(wrapped) = self.ctx.lookup_decl(field) {
                all_fields_wrappable &= self.ctx.decl(wrapped).is_wrappable;
            }
        }
        for &method in &record.methods {
            if template_body {
                // methods of a template-parameterized record are outside
                // what the non-template walker can represent
                let decl = self.ast.decl(self.ast.canonical(method)).clone();
                if self.ctx.lookup_decl(method).is_none() {
                    self.allocate(
                        self.ast.canonical(method),
                        DeclVariant::Unwrappable,
                        &decl.name,
                        decl.access,
                    );
                }
            } else {
                self.register(method, false, None);
            }
        }
        for &ctor in &record.ctors {
            self.register(ctor, false, None);
        }
        if let Some(dtor) = record.dtor {
            self.register(dtor, false, None);
        }
        if !all_fields_wrappable {
            return Err(Unsupported::UnrepresentableType);
        }
        Ok(())
    }

    fn register_function(
        &mut self,
        source: DeclId,
        variant: DeclVariant,
        name: &str,
        access: crate::cxx::Access,
        function: &FunctionDecl,
    ) -> WDeclId {
        let w = self.allocate(source, variant, name, access);
        if let Err(reason) = self.function_signature(function) {
            debug!("marking function `{name}` unwrappable: {reason:?}");
            self.ctx.decl_mut(w).mark_unwrappable();
        }
        w
    }

    /// Return type and parameters only; function bodies are never entered.
    fn function_signature(&mut self, function: &FunctionDecl) -> WalkResult {
        let return_ty = self.ctx.intern_type(function.return_type);
        let mut ok = self.ctx.is_type_wrappable(return_ty, true);
        for &param in &function.params {
            self.register(param, false, None);
            if let CxxDeclKind::Param { ty } = self.ast.decl(param).kind {
                let param_ty = self.ctx.intern_type(ty);
                ok &= self.ctx.is_type_wrappable(param_ty, true);
            }
        }
        if ok {
            Ok(())
        } else {
            Err(Unsupported::UnrepresentableType)
        }
    }

    fn register_class_template(
        &mut self,
        source: DeclId,
        name: &str,
        access: crate::cxx::Access,
        params: &[DeclId],
        templated: DeclId,
        specializations: &[DeclId],
    ) -> WDeclId {
        if let Err(Unsupported::ParameterPack) = self.check_template_params(params) {
            warn!("skipping variadic template `{name}`");
            return self.allocate(source, DeclVariant::Unwrappable, name, access);
        }

        let w = self.allocate(source, DeclVariant::RecordTemplate, name, access);
        for &param in params {
            // parameters never become free declarations
            self.register(param, false, Some(params));
        }

        if self.ctx.lookup_decl(templated).is_none() {
            let decl = self.ast.decl(self.ast.canonical(templated)).clone();
            if let CxxDeclKind::Record(record) = decl.kind {
                self.register_record(
                    self.ast.canonical(templated),
                    &decl.name,
                    decl.access,
                    &record,
                    true,
                );
            }
        }

        for &specialization in specializations {
            self.register(specialization, false, None);
        }
        w
    }

    fn check_template_params(&self, params: &[DeclId]) -> WalkResult {
        for &param in params {
            let is_pack = match self.ast.decl(param).kind {
                CxxDeclKind::TemplateTypeParam { is_pack, .. }
                | CxxDeclKind::TemplateNonTypeParam { is_pack, .. } => is_pack,
                _ => false,
            };
            if is_pack {
                return Err(Unsupported::ParameterPack);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cxx::{Access, BuiltinKind, CxxAstBuilder, CxxTypeKind, Linkage, TemplateArg};
    use pretty_assertions::assert_eq;

    #[test]
    fn struct_with_field_registers_both() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("s.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "S", crate::cxx::RecordTag::Struct, true, loc);
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 2, 5);
        let field = b.field(record, "x", int_ty, Access::Public, loc);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);

        let record_w = ctx.lookup_decl(record).expect("record not registered");
        assert_eq!(ctx.decl(record_w).variant, DeclVariant::Record);
        assert!(ctx.decl(record_w).is_wrappable);
        assert_eq!(ctx.free_decls(), &[record_w]);

        let field_w = ctx.lookup_decl(field).expect("field not registered");
        assert_eq!(ctx.decl(field_w).variant, DeclVariant::Field);
        assert_eq!(ctx.decl(field_w).visibility, Visibility::Public);
    }

    #[test]
    fn redeclarations_share_one_wrapped_entry() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("n.hpp");
        let loc = b.loc(file, 1, 1);
        let first = b.namespace(b.tu(), "n", loc);
        let loc = b.loc(file, 9, 1);
        let second = b.namespace_redecl(b.tu(), first, loc);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);
        assert_eq!(ctx.lookup_decl(first), ctx.lookup_decl(second));
        assert_eq!(ctx.free_decls().len(), 1);
    }

    #[test]
    fn variadic_template_is_unwrappable() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("t.hpp");
        let loc = b.loc(file, 1, 1);
        let (template, _) = b.class_template(
            b.tu(),
            "Pack",
            crate::cxx::RecordTag::Struct,
            &[("Ts", true)],
            loc,
        );
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);
        let w = ctx.lookup_decl(template).unwrap();
        assert_eq!(ctx.decl(w).variant, DeclVariant::Unwrappable);
        assert!(!ctx.decl(w).is_wrappable);
    }

    #[test]
    fn template_with_explicit_specialization() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("x.hpp");
        let loc = b.loc(file, 1, 1);
        let (template, templated) = b.class_template(
            b.tu(),
            "X",
            crate::cxx::RecordTag::Struct,
            &[("T", false)],
            loc,
        );
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 2, 1);
        let spec = b.explicit_specialization(template, vec![TemplateArg::Type(int_ty)], loc);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);

        let template_w = ctx.lookup_decl(template).unwrap();
        assert_eq!(ctx.decl(template_w).variant, DeclVariant::RecordTemplate);
        let spec_w = ctx.lookup_decl(spec).unwrap();
        assert_eq!(ctx.decl(spec_w).variant, DeclVariant::SpecializedRecord);
        // the templated body is registered but never a free declaration
        let body_w = ctx.lookup_decl(templated).unwrap();
        assert!(!ctx.free_decls().contains(&body_w));
    }

    #[test]
    fn deleted_method_is_unwrappable() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("m.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "S", crate::cxx::RecordTag::Class, true, loc);
        let void_ty = b.builtin(BuiltinKind::Void);
        let loc = b.loc(file, 2, 5);
        let method = b.method(record, "gone", void_ty, &[], false, loc);
        b.method_mut(method).is_deleted = true;
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);
        let method_w = ctx.lookup_decl(method).unwrap();
        assert_eq!(ctx.decl(method_w).variant, DeclVariant::Unwrappable);
    }

    #[test]
    fn field_with_unwrappable_type_poisons_the_record() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("r.hpp");
        let int_ty = b.builtin(BuiltinKind::Int);
        let rref = b.push_type(CxxTypeKind::RValueReference { pointee: int_ty });
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "Bad", crate::cxx::RecordTag::Struct, true, loc);
        let loc = b.loc(file, 2, 5);
        b.field(record, "r", rref, Access::Public, loc);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);
        let w = ctx.lookup_decl(record).unwrap();
        assert!(!ctx.decl(w).is_wrappable);
    }

    #[test]
    fn restriction_only_flags_roots_from_input_headers() {
        let mut b = CxxAstBuilder::new();
        let mine = b.add_file("mine.hpp");
        let other = b.add_file("other.hpp");
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(mine, 1, 1);
        let keep = b.function(b.tu(), "keep", int_ty, &[], Linkage::Cxx, loc);
        let loc = b.loc(other, 1, 1);
        let skip = b.function(b.tu(), "skip", int_ty, &[], Linkage::Cxx, loc);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);
        restrict_to_files(&mut ctx, &[PathBuf::from("mine.hpp")]);

        let keep_w = ctx.lookup_decl(keep).unwrap();
        let skip_w = ctx.lookup_decl(skip).unwrap();
        assert!(ctx.decl(keep_w).should_emit);
        assert!(!ctx.decl(skip_w).should_emit);
    }

    #[test]
    fn extern_c_block_contents_are_free_decls() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("c.h");
        let block = b.linkage_spec(b.tu(), Linkage::C);
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 1, 1);
        let f = b.function(block, "f", int_ty, &[], Linkage::C, loc);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walk(&mut ctx);
        let f_w = ctx.lookup_decl(f).unwrap();
        assert!(ctx.free_decls().contains(&f_w));
    }
}
