//! Builds the D AST from the configured wrapped declarations. The
//! translator reads the wrapped tables, asks the strategy resolver for
//! undecided types, and mutates only its own caches and the package tree.

use std::collections::{HashMap, HashSet};

use color_eyre::eyre::{bail, eyre};
use log::{debug, warn};

use crate::cxx::{CxxDeclKind, DeclId, Linkage};
use crate::generate::context::{BindingContext, WDeclId, WTypeId};
use crate::generate::decl::{DeclVariant, Visibility};
use crate::generate::dependent::resolve_dependent;
use crate::generate::dlang::decls::{
    DDecl, DDeclId, DFunction, DLanguage, DLinkage, DMethod, DType, DTypeId, DVisibility, DlangAst,
    MethodModifiers, Package, PointerKind,
};
use crate::generate::strategy::{determine_record_strategy, determine_strategy};
use crate::generate::ty::{Strategy, TypeVariant};

/// Declarations with no configured module land here.
const UNKNOWN_MODULE: &str = "unknown";

#[derive(Debug, Clone, Default)]
struct Scope {
    /// Dotted package path of the enclosing namespace translation.
    package: String,
    /// C++ namespace path (`a::b`) used for `extern(C++, ...)` linkage.
    namespace_path: String,
}

pub struct TranslationOutput {
    pub dast: DlangAst,
    pub root: Package,
}

/// Translates every bound emission root, in translation-unit order, into
/// the package tree.
pub fn populate(ctx: &mut BindingContext) -> color_eyre::Result<TranslationOutput> {
    let roots = ctx.free_decls_in_source_order();
    let mut translator = Translator {
        ctx,
        dast: DlangAst::default(),
        root: Package::default(),
        decl_cache: HashMap::new(),
        type_cache: HashMap::new(),
        named_types: HashMap::new(),
        placed: HashSet::new(),
    };

    for root in roots {
        {
            let decl = translator.ctx.decl(root);
            if !decl.should_emit || !decl.is_wrappable {
                continue;
            }
        }
        let scope = Scope::default();
        let translated = translator.translate_decl(root, &scope)?;
        if let Some(id) = translated {
            let module = translator.module_for(root, &scope);
            translator.place(&module, id)?;
        }
    }

    Ok(TranslationOutput {
        dast: translator.dast,
        root: translator.root,
    })
}

struct Translator<'w, 'a> {
    ctx: &'w mut BindingContext<'a>,
    dast: DlangAst,
    root: Package,
    decl_cache: HashMap<WDeclId, DDeclId>,
    type_cache: HashMap<WTypeId, DTypeId>,
    named_types: HashMap<String, DTypeId>,
    placed: HashSet<DDeclId>,
}

impl Translator<'_, '_> {
    /// Module path a declaration is emitted into: its configured target
    /// module, else the enclosing namespace's package, else "unknown".
    fn module_for(&self, w: WDeclId, scope: &Scope) -> String {
        let decl = self.ctx.decl(w);
        if decl.is_target_module_set() {
            decl.target_module.clone()
        } else if !scope.package.is_empty() {
            scope.package.clone()
        } else {
            UNKNOWN_MODULE.to_string()
        }
    }

    fn place(&mut self, module: &str, id: DDeclId) -> color_eyre::Result<()> {
        if self.placed.insert(id) {
            self.root.get_or_create_module(module)?.insert(id);
        }
        Ok(())
    }

    fn translate_decl(
        &mut self,
        w: WDeclId,
        scope: &Scope,
    ) -> color_eyre::Result<Option<DDeclId>> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(Some(cached));
        }

        match self.ctx.decl(w).variant {
            DeclVariant::Unwrappable => Ok(None),
            DeclVariant::Namespace => {
                self.translate_namespace(w, scope)?;
                Ok(None)
            }
            DeclVariant::Function => Ok(Some(self.translate_function(w, scope)?)),
            DeclVariant::Record => self.translate_record(w),
            DeclVariant::RecordTemplate => {
                if !self.record_has_definition(w) {
                    return Ok(None);
                }
                Ok(Some(self.build_struct(w)?))
            }
            // specializations are reachable through their template's
            // specialization range, never emitted on their own
            DeclVariant::SpecializedRecord => Ok(None),
            DeclVariant::Typedef => Ok(Some(self.translate_typedef(w)?)),
            DeclVariant::Enum => Ok(Some(self.translate_enum(w)?)),
            DeclVariant::EnumConstant => {
                bail!("found an enum constant outside of an enum declaration")
            }
            DeclVariant::Field => bail!("found a field outside of a record declaration"),
            DeclVariant::Union => Ok(Some(self.build_union(w)?)),
            DeclVariant::Variable => Ok(Some(self.translate_variable(w)?)),
            // members are translated by their record's builders
            DeclVariant::Method | DeclVariant::Constructor | DeclVariant::Destructor => Ok(None),
            DeclVariant::Argument
            | DeclVariant::TemplateTypeArgument
            | DeclVariant::TemplateNonTypeArgument
            | DeclVariant::UsingAliasTemplate => Ok(None),
        }
    }

    fn translate_namespace(&mut self, w: WDeclId, scope: &Scope) -> color_eyre::Result<()> {
        let ast = self.ctx.ast;
        let source = self.ctx.decl(w).source;
        let target_name = self.ctx.decl(w).target_name();
        let source_name = self.ctx.decl(w).source_name.clone();

        let this_package = if scope.package.is_empty() {
            target_name
        } else {
            format!("{}.{}", scope.package, target_name)
        };
        let this_namespace = if scope.namespace_path.is_empty() {
            source_name
        } else {
            format!("{}::{}", scope.namespace_path, source_name)
        };
        let child_scope = Scope {
            package: this_package,
            namespace_path: this_namespace,
        };

        for child in ast.context_children(source) {
            let Some(child_w) = self.ctx.lookup_decl(child) else {
                continue;
            };
            if !self.ctx.decl(child_w).is_wrappable {
                continue;
            }
            let translated = self.translate_decl(child_w, &child_scope)?;
            if let Some(id) = translated {
                let module = self.module_for(child_w, &child_scope);
                self.place(&module, id)?;
            }
        }
        Ok(())
    }

    fn translate_function(&mut self, w: WDeclId, scope: &Scope) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let decl = self.ctx.decl(w);
        if decl.source_name.is_empty() {
            bail!("cannot translate a function without a name");
        }
        let name = decl.target_name();
        let source = decl.source;
        let function = self.function_parts(source)?;

        let linkage = match function.linkage {
            Linkage::C => DLinkage {
                language: DLanguage::C,
                namespace_path: String::new(),
            },
            Linkage::Cxx => DLinkage {
                language: DLanguage::Cpp,
                namespace_path: scope.namespace_path.replace("::", "."),
            },
        };
        let return_type = self.translate_type_source(function.return_type)?;
        let arguments = self.translate_arguments(&function.params)?;

        let id = self.dast.push_decl(DDecl::Function(DFunction {
            name,
            linkage,
            return_type,
            arguments,
        }));
        self.decl_cache.insert(w, id);
        Ok(id)
    }

    fn function_parts(&self, source: DeclId) -> color_eyre::Result<crate::cxx::FunctionDecl> {
        match &self.ctx.ast.decl(self.ctx.ast.canonical(source)).kind {
            CxxDeclKind::Function(f)
            | CxxDeclKind::Method(f)
            | CxxDeclKind::Constructor(f)
            | CxxDeclKind::Destructor(f) => Ok(f.clone()),
            other => Err(eyre!("expected a function-like declaration, found {other:?}")),
        }
    }

    fn translate_arguments(&mut self, params: &[DeclId]) -> color_eyre::Result<Vec<DDeclId>> {
        let mut arguments = vec![];
        for &param in params {
            arguments.push(self.translate_argument(param)?);
        }
        Ok(arguments)
    }

    fn translate_argument(&mut self, param: DeclId) -> color_eyre::Result<DDeclId> {
        let wrapped = self
            .ctx
            .lookup_decl(param)
            .ok_or_else(|| eyre!("missing wrapped declaration for a parameter"))?;
        if let Some(&cached) = self.decl_cache.get(&wrapped) {
            return Ok(cached);
        }
        let name = self.ctx.decl(wrapped).target_name();
        let ty = match self.ctx.ast.decl(param).kind {
            CxxDeclKind::Param { ty } => self.translate_type_source(ty)?,
            ref other => bail!("expected a parameter declaration, found {other:?}"),
        };
        let id = self.dast.push_decl(DDecl::Argument { name, ty });
        self.decl_cache.insert(wrapped, id);
        Ok(id)
    }

    fn record_source(&self, w: WDeclId) -> color_eyre::Result<(DeclId, Vec<String>)> {
        let source = self.ctx.decl(w).source;
        let ast = self.ctx.ast;
        match &ast.decl(ast.canonical(source)).kind {
            CxxDeclKind::Record(_) => Ok((ast.canonical(source), vec![])),
            CxxDeclKind::ClassTemplate {
                params, templated, ..
            } => {
                let names = params
                    .iter()
                    .map(|&param| ast.decl(param).name.clone())
                    .collect();
                Ok((ast.canonical(*templated), names))
            }
            other => Err(eyre!("expected a record declaration, found {other:?}")),
        }
    }

    fn record_has_definition(&self, w: WDeclId) -> bool {
        let Ok((source, _)) = self.record_source(w) else {
            return false;
        };
        match &self.ctx.ast.decl(source).kind {
            CxxDeclKind::Record(record) => record.is_definition,
            _ => false,
        }
    }

    fn translate_record(&mut self, w: WDeclId) -> color_eyre::Result<Option<DDeclId>> {
        if !self.record_has_definition(w) {
            debug!(
                "record `{}` has no definition, not emitting",
                self.ctx.decl(w).source_name
            );
            return Ok(None);
        }
        let source = self.ctx.decl(w).source;
        let declared = self
            .ctx
            .ast
            .type_of_decl(source)
            .ok_or_else(|| eyre!("record declaration without a declared type"))?;
        let wrapped_ty = self.ctx.intern_type(declared);
        determine_record_strategy(self.ctx, wrapped_ty)?;
        match self.ctx.ty(wrapped_ty).strategy.clone() {
            Some(Strategy::Struct) => Ok(Some(self.build_struct(w)?)),
            Some(Strategy::Interface) => Ok(Some(self.build_interface(w)?)),
            Some(Strategy::Class) => Ok(Some(self.build_class(w, false)?)),
            Some(Strategy::OpaqueClass) => Ok(Some(self.build_class(w, true)?)),
            Some(Strategy::Replace(replacement)) => {
                debug!(
                    "record `{}` is replaced by `{replacement}`, not emitting",
                    self.ctx.decl(w).source_name
                );
                Ok(None)
            }
            None => bail!("record reached translation with no strategy"),
        }
    }

    fn build_struct(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let (record, template_params) = self.record_source(w)?;
        // reserve the node first so self-referential records terminate
        let id = self.dast.push_decl(DDecl::Struct {
            name,
            template_params,
            members: vec![],
        });
        self.decl_cache.insert(w, id);
        let members = self.translate_members(record, MemberFilter::All)?;
        if let DDecl::Struct { members: slot, .. } = self.dast.decl_mut(id) {
            *slot = members;
        }
        Ok(id)
    }

    fn build_interface(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let (record, _) = self.record_source(w)?;
        let id = self.dast.push_decl(DDecl::Interface {
            name,
            methods: vec![],
        });
        self.decl_cache.insert(w, id);
        let methods = self.translate_members(record, MemberFilter::VirtualMethods)?;
        if let DDecl::Interface { methods: slot, .. } = self.dast.decl_mut(id) {
            *slot = methods;
        }
        Ok(id)
    }

    fn build_class(&mut self, w: WDeclId, opaque: bool) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let (record, _) = self.record_source(w)?;
        let id = self.dast.push_decl(DDecl::Class {
            name,
            members: vec![],
        });
        self.decl_cache.insert(w, id);
        if !opaque {
            let members = self.translate_members(record, MemberFilter::ClassMembers)?;
            if let DDecl::Class { members: slot, .. } = self.dast.decl_mut(id) {
                *slot = members;
            }
        }
        Ok(id)
    }

    fn build_union(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let (record, _) = self.record_source(w)?;
        let id = self.dast.push_decl(DDecl::Union {
            name,
            members: vec![],
        });
        self.decl_cache.insert(w, id);
        let members = self.translate_members(record, MemberFilter::FieldsOnly)?;
        if let DDecl::Union { members: slot, .. } = self.dast.decl_mut(id) {
            *slot = members;
        }
        Ok(id)
    }

    fn translate_members(
        &mut self,
        record: DeclId,
        filter: MemberFilter,
    ) -> color_eyre::Result<Vec<DDeclId>> {
        let parts = match &self.ctx.ast.decl(record).kind {
            CxxDeclKind::Record(r) => (r.fields.clone(), r.methods.clone(), r.ctors.clone(), r.dtor),
            other => bail!("expected a record declaration, found {other:?}"),
        };
        let (fields, methods, ctors, dtor) = parts;

        let mut members = vec![];
        if filter != MemberFilter::VirtualMethods {
            for field in fields {
                if let Some(id) = self.translate_field(field)? {
                    members.push(id);
                }
            }
        }
        if filter != MemberFilter::FieldsOnly {
            for method in methods {
                if let Some(id) = self.translate_method(method, filter)? {
                    members.push(id);
                }
            }
        }
        if matches!(filter, MemberFilter::All | MemberFilter::ClassMembers) {
            for ctor in ctors {
                if let Some(id) = self.translate_constructor(ctor)? {
                    members.push(id);
                }
            }
            if let Some(dtor) = dtor {
                if let Some(id) = self.translate_destructor(dtor)? {
                    members.push(id);
                }
            }
        }
        Ok(members)
    }

    fn translate_field(&mut self, field: DeclId) -> color_eyre::Result<Option<DDeclId>> {
        let Some(wrapped) = self.ctx.lookup_decl(field) else {
            return Ok(None);
        };
        if !self.ctx.decl(wrapped).is_wrappable {
            return Ok(None);
        }
        if let Some(&cached) = self.decl_cache.get(&wrapped) {
            return Ok(Some(cached));
        }
        let name = self.ctx.decl(wrapped).target_name();
        let visibility = translate_visibility(self.ctx.decl(wrapped).visibility);
        let ty = match self.ctx.ast.decl(field).kind {
            CxxDeclKind::Field { ty } => self.translate_type_source(ty)?,
            ref other => bail!("expected a field declaration, found {other:?}"),
        };
        let id = self.dast.push_decl(DDecl::Field {
            name,
            ty,
            visibility,
        });
        self.decl_cache.insert(wrapped, id);
        Ok(Some(id))
    }

    fn translate_method(
        &mut self,
        method: DeclId,
        filter: MemberFilter,
    ) -> color_eyre::Result<Option<DDeclId>> {
        let Some(wrapped) = self.ctx.lookup_decl(method) else {
            return Ok(None);
        };
        if !self.ctx.decl(wrapped).is_wrappable {
            return Ok(None);
        }
        let function = self.function_parts(self.ctx.decl(wrapped).source)?;
        if function.is_operator {
            debug!(
                "skipping overloaded operator `{}`",
                self.ctx.decl(wrapped).source_name
            );
            return Ok(None);
        }
        if filter == MemberFilter::VirtualMethods && !function.is_virtual {
            return Ok(None);
        }
        if let Some(&cached) = self.decl_cache.get(&wrapped) {
            return Ok(Some(cached));
        }

        let mut modifiers = MethodModifiers::default();
        if function.is_static {
            modifiers |= MethodModifiers::STATIC;
        }
        if function.is_virtual {
            modifiers |= MethodModifiers::VIRTUAL;
        }
        if function.is_const {
            modifiers |= MethodModifiers::CONST;
        }
        // inside a class, anything the source did not declare virtual must
        // not join the vtable
        if filter == MemberFilter::ClassMembers && !function.is_virtual && !function.is_static {
            modifiers |= MethodModifiers::FINAL;
        }

        let name = self.ctx.decl(wrapped).target_name();
        let return_type = self.translate_type_source(function.return_type)?;
        let arguments = self.translate_arguments(&function.params)?;
        let id = self.dast.push_decl(DDecl::Method(DMethod {
            name,
            return_type,
            arguments,
            modifiers,
        }));
        self.decl_cache.insert(wrapped, id);
        Ok(Some(id))
    }

    fn translate_constructor(&mut self, ctor: DeclId) -> color_eyre::Result<Option<DDeclId>> {
        let Some(wrapped) = self.ctx.lookup_decl(ctor) else {
            return Ok(None);
        };
        if !self.ctx.decl(wrapped).is_wrappable {
            return Ok(None);
        }
        if let Some(&cached) = self.decl_cache.get(&wrapped) {
            return Ok(Some(cached));
        }
        let function = self.function_parts(self.ctx.decl(wrapped).source)?;
        let arguments = self.translate_arguments(&function.params)?;
        let id = self.dast.push_decl(DDecl::Constructor { arguments });
        self.decl_cache.insert(wrapped, id);
        Ok(Some(id))
    }

    fn translate_destructor(&mut self, dtor: DeclId) -> color_eyre::Result<Option<DDeclId>> {
        let Some(wrapped) = self.ctx.lookup_decl(dtor) else {
            return Ok(None);
        };
        if !self.ctx.decl(wrapped).is_wrappable {
            return Ok(None);
        }
        if let Some(&cached) = self.decl_cache.get(&wrapped) {
            return Ok(Some(cached));
        }
        let id = self.dast.push_decl(DDecl::Destructor);
        self.decl_cache.insert(wrapped, id);
        Ok(Some(id))
    }

    fn translate_typedef(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let source = self.ctx.decl(w).source;
        let underlying = match self.ctx.ast.decl(self.ctx.ast.canonical(source)).kind {
            CxxDeclKind::Typedef { underlying, .. } => underlying,
            ref other => bail!("expected a typedef declaration, found {other:?}"),
        };
        let target = self.translate_type_source(underlying)?;
        let id = self.dast.push_decl(DDecl::TypeAlias { name, target });
        self.decl_cache.insert(w, id);
        Ok(id)
    }

    fn translate_enum(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let source = self.ctx.decl(w).source;
        let (underlying, constants) =
            match &self.ctx.ast.decl(self.ctx.ast.canonical(source)).kind {
                CxxDeclKind::Enum {
                    underlying,
                    constants,
                } => (*underlying, constants.clone()),
                other => bail!("expected an enum declaration, found {other:?}"),
            };
        let base = Some(self.translate_type_source(underlying)?);

        let id = self.dast.push_decl(DDecl::Enum {
            name,
            base,
            constants: vec![],
        });
        self.decl_cache.insert(w, id);

        // constants in declaration order
        let mut translated = vec![];
        for constant in constants {
            let Some(wrapped) = self.ctx.lookup_decl(constant) else {
                warn!("error translating enum constant");
                continue;
            };
            translated.push(self.translate_enum_constant(wrapped)?);
        }
        if let DDecl::Enum { constants: slot, .. } = self.dast.decl_mut(id) {
            *slot = translated;
        }
        Ok(id)
    }

    fn translate_enum_constant(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let source = self.ctx.decl(w).source;
        let value = match self.ctx.ast.decl(self.ctx.ast.canonical(source)).kind {
            CxxDeclKind::EnumConstant { value } => value,
            ref other => bail!("expected an enum constant, found {other:?}"),
        };
        let id = self.dast.push_decl(DDecl::EnumConstant { name, value });
        self.decl_cache.insert(w, id);
        Ok(id)
    }

    fn translate_variable(&mut self, w: WDeclId) -> color_eyre::Result<DDeclId> {
        if let Some(&cached) = self.decl_cache.get(&w) {
            return Ok(cached);
        }
        let name = self.ctx.decl(w).target_name();
        let source = self.ctx.decl(w).source;
        let ty = match self.ctx.ast.decl(self.ctx.ast.canonical(source)).kind {
            CxxDeclKind::Variable { ty, .. } => self.translate_type_source(ty)?,
            ref other => bail!("expected a variable declaration, found {other:?}"),
        };
        let id = self.dast.push_decl(DDecl::Variable { name, ty });
        self.decl_cache.insert(w, id);
        Ok(id)
    }

    fn translate_type_source(&mut self, source: crate::cxx::TypeId) -> color_eyre::Result<DTypeId> {
        let wrapped = self.ctx.intern_type(source);
        self.translate_type(wrapped)
    }

    fn translate_type(&mut self, w: WTypeId) -> color_eyre::Result<DTypeId> {
        if let Some(&cached) = self.type_cache.get(&w) {
            return Ok(cached);
        }

        // kinds whose translation does not go through a strategy
        match self.ctx.ty(w).variant.clone() {
            TypeVariant::Qualified { unqualified } => {
                let target = self.translate_type(unqualified)?;
                let id = self.dast.push_type(DType::Const { target });
                self.type_cache.insert(w, id);
                return Ok(id);
            }
            TypeVariant::Delayed {
                qualifier,
                identifier,
            } => {
                let Some(resolved) = resolve_dependent(self.ctx, qualifier, &identifier) else {
                    bail!("could not resolve dependent name `{identifier}`");
                };
                let resolved = self.ctx.intern_type(resolved);
                let id = self.translate_type(resolved)?;
                self.type_cache.insert(w, id);
                return Ok(id);
            }
            TypeVariant::TemplateArgument { .. } => {
                let name = self
                    .ctx
                    .type_declaration(w)
                    .map(|decl| self.ctx.decl(decl).target_name())
                    .ok_or_else(|| eyre!("template argument type without a declaration"))?;
                let id = self.named_type(&name, "");
                self.type_cache.insert(w, id);
                return Ok(id);
            }
            _ => {}
        }

        determine_strategy(self.ctx, w)?;
        let strategy = self.ctx.ty(w).strategy.clone();
        let id = match strategy {
            None => bail!("cannot translate a type the resolver left undecided"),
            Some(Strategy::Replace(replacement)) if !replacement.is_empty() => {
                let module = self.ctx.ty(w).target_module.clone();
                self.named_type(&replacement, &module)
            }
            Some(Strategy::Replace(_)) => self.replace_structurally(w)?,
            Some(Strategy::Struct) => {
                let decl = self.type_decl(w)?;
                let target = self.build_struct(decl)?;
                self.dast.push_type(DType::DeclRef { decl: target })
            }
            Some(Strategy::Interface) => {
                let decl = self.type_decl(w)?;
                let target = self.build_interface(decl)?;
                self.dast.push_type(DType::DeclRef { decl: target })
            }
            Some(Strategy::Class) => {
                let decl = self.type_decl(w)?;
                let target = self.build_class(decl, false)?;
                self.dast.push_type(DType::DeclRef { decl: target })
            }
            Some(Strategy::OpaqueClass) => {
                let decl = self.type_decl(w)?;
                let target = self.build_class(decl, true)?;
                self.dast.push_type(DType::DeclRef { decl: target })
            }
        };
        self.type_cache.insert(w, id);
        Ok(id)
    }

    /// The empty replacement: translate by structure instead of by name.
    fn replace_structurally(&mut self, w: WTypeId) -> color_eyre::Result<DTypeId> {
        match self.ctx.ty(w).variant.clone() {
            TypeVariant::Pointer { pointee } => {
                self.translate_pointer_or_reference(pointee, PointerKind::Pointer)
            }
            TypeVariant::Reference { pointee } => {
                self.translate_pointer_or_reference(pointee, PointerKind::Reference)
            }
            TypeVariant::Typedef { .. } => {
                let decl = self.type_decl(w)?;
                let target = self.translate_typedef(decl)?;
                Ok(self.dast.push_type(DType::DeclRef { decl: target }))
            }
            TypeVariant::Enum { .. } => {
                let decl = self.type_decl(w)?;
                let target = self.translate_enum(decl)?;
                Ok(self.dast.push_type(DType::DeclRef { decl: target }))
            }
            TypeVariant::Union { .. } => {
                let decl = self.type_decl(w)?;
                let target = self.build_union(decl)?;
                Ok(self.dast.push_type(DType::DeclRef { decl: target }))
            }
            TypeVariant::Function { .. } => {
                bail!("function types are not translated yet")
            }
            other => bail!("structural replacement is not defined for {other:?}"),
        }
    }

    /// When the pointee has reference semantics the pointer or reference
    /// wrapper is dropped; the target type already behaves like one.
    fn translate_pointer_or_reference(
        &mut self,
        pointee: WTypeId,
        kind: PointerKind,
    ) -> color_eyre::Result<DTypeId> {
        determine_strategy(self.ctx, pointee)?;
        // qualified pointees delegate to their unqualified form here
        let reference_semantics = self.ctx.is_reference_type(pointee);
        let target = self.translate_type(pointee)?;
        if reference_semantics {
            Ok(target)
        } else {
            Ok(self.dast.push_type(DType::Pointer { target, kind }))
        }
    }

    fn type_decl(&self, w: WTypeId) -> color_eyre::Result<WDeclId> {
        self.ctx
            .type_declaration(w)
            .ok_or_else(|| eyre!("missing canonical declaration for a declared type"))
    }

    fn named_type(&mut self, name: &str, module: &str) -> DTypeId {
        if let Some(&existing) = self.named_types.get(name) {
            return existing;
        }
        let id = self.dast.push_type(DType::Named {
            name: name.to_string(),
            module: module.to_string(),
        });
        self.named_types.insert(name.to_string(), id);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberFilter {
    /// Fields, methods, constructors and the destructor.
    All,
    /// Only virtual methods (interfaces).
    VirtualMethods,
    /// Only fields (unions).
    FieldsOnly,
    /// Like `All`, but non-virtual methods are marked final.
    ClassMembers,
}

fn translate_visibility(visibility: Visibility) -> Option<DVisibility> {
    match visibility {
        Visibility::Unset => None,
        Visibility::Private => Some(DVisibility::Private),
        Visibility::Package => Some(DVisibility::Package),
        Visibility::Protected => Some(DVisibility::Protected),
        Visibility::Public => Some(DVisibility::Public),
        Visibility::Export => Some(DVisibility::Export),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{apply_configuration, parse_config};
    use crate::cxx::{Access, BuiltinKind, CxxAst, CxxAstBuilder, RecordTag};
    use crate::generate::walker;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn run(ast: &CxxAst, header: &str, config: Option<&str>) -> TranslationOutput {
        let mut ctx = BindingContext::new(ast);
        walker::walk(&mut ctx);
        walker::restrict_to_files(&mut ctx, &[PathBuf::from(header)]);
        if let Some(text) = config {
            let parsed = parse_config(text).unwrap();
            apply_configuration(&mut ctx, &[parsed]).unwrap();
        }
        populate(&mut ctx).unwrap()
    }

    fn type_name(out: &TranslationOutput, ty: DTypeId) -> String {
        match out.dast.ty(ty) {
            DType::Named { name, .. } => name.clone(),
            DType::Pointer { target, kind } => match kind {
                PointerKind::Pointer => format!("{}*", type_name(out, *target)),
                PointerKind::Reference => format!("ref {}", type_name(out, *target)),
            },
            DType::Const { target } => format!("const({})", type_name(out, *target)),
            DType::DeclRef { decl } => out.dast.decl(*decl).name().to_string(),
        }
    }

    #[test]
    fn plain_struct_with_one_field() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("s.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "S", RecordTag::Struct, true, loc);
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 1, 12);
        b.field(record, "x", int_ty, Access::None, loc);
        let ast = b.finish();

        let out = run(&ast, "s.hpp", None);
        let module = out.root.find_module("unknown").expect("no module emitted");
        assert_eq!(module.decls.len(), 1);
        let DDecl::Struct { name, members, .. } = out.dast.decl(module.decls[0]) else {
            panic!("expected a struct");
        };
        assert_eq!(name, "S");
        assert_eq!(members.len(), 1);
        let DDecl::Field { name, ty, .. } = out.dast.decl(members[0]) else {
            panic!("expected a field");
        };
        assert_eq!(name, "x");
        assert_eq!(type_name(&out, *ty), "int");
    }

    #[test]
    fn virtual_method_makes_an_interface() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("i.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "I", RecordTag::Struct, true, loc);
        let void_ty = b.builtin(BuiltinKind::Void);
        let loc = b.loc(file, 1, 12);
        b.method(record, "f", void_ty, &[], true, loc);
        let ast = b.finish();

        let out = run(&ast, "i.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        let DDecl::Interface { name, methods } = out.dast.decl(module.decls[0]) else {
            panic!("expected an interface");
        };
        assert_eq!(name, "I");
        assert_eq!(methods.len(), 1);
        let DDecl::Method(method) = out.dast.decl(methods[0]) else {
            panic!("expected a method");
        };
        assert_eq!(method.name, "f");
        assert!(method.modifiers.contains(MethodModifiers::VIRTUAL));
        assert_eq!(type_name(&out, method.return_type), "void");
    }

    #[test]
    fn namespace_member_lands_in_the_configured_module() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("n.hpp");
        let loc = b.loc(file, 1, 1);
        let ns = b.namespace(b.tu(), "n", loc);
        let loc = b.loc(file, 1, 14);
        b.record(ns, "A", RecordTag::Struct, true, loc);
        let ast = b.finish();

        let out = run(
            &ast,
            "n.hpp",
            Some(r#"{"binding_attributes": {"n::A": {"target_module": "x.y"}}}"#),
        );
        let module = out.root.find_module("x.y").expect("x.y was not created");
        let DDecl::Struct { name, .. } = out.dast.decl(module.decls[0]) else {
            panic!("expected a struct");
        };
        assert_eq!(name, "A");
    }

    #[test]
    fn namespace_members_default_to_the_namespace_module() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("n.hpp");
        let loc = b.loc(file, 1, 1);
        let ns = b.namespace(b.tu(), "n", loc);
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 2, 1);
        b.function(ns, "f", int_ty, &[], crate::cxx::Linkage::Cxx, loc);
        let ast = b.finish();

        let out = run(&ast, "n.hpp", None);
        let module = out.root.find_module("n").expect("namespace module missing");
        let DDecl::Function(function) = out.dast.decl(module.decls[0]) else {
            panic!("expected a function");
        };
        assert_eq!(function.name, "f");
        assert_eq!(function.linkage.language, DLanguage::Cpp);
        assert_eq!(function.linkage.namespace_path, "n");
    }

    #[test]
    fn typedef_and_variable_share_the_alias() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("t.hpp");
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 1, 1);
        let typedef = b.typedef(b.tu(), "MyInt", int_ty, loc);
        let typedef_ty = b.typedef_type(typedef);
        let loc = b.loc(file, 2, 1);
        b.variable(b.tu(), "v", typedef_ty, crate::cxx::Linkage::Cxx, loc);
        let ast = b.finish();

        let out = run(&ast, "t.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        assert_eq!(module.decls.len(), 2);
        let DDecl::TypeAlias { name, target } = out.dast.decl(module.decls[0]) else {
            panic!("expected an alias");
        };
        assert_eq!(name, "MyInt");
        assert_eq!(type_name(&out, *target), "int");
        let DDecl::Variable { name, ty } = out.dast.decl(module.decls[1]) else {
            panic!("expected a variable");
        };
        assert_eq!(name, "v");
        assert_eq!(type_name(&out, *ty), "MyInt");
    }

    #[test]
    fn enum_constants_keep_source_order_and_values() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("e.hpp");
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 1, 1);
        let enumeration = b.enumeration(b.tu(), "E", int_ty, loc);
        let loc = b.loc(file, 1, 10);
        b.enum_constant(enumeration, "A", 1, loc);
        let loc = b.loc(file, 1, 15);
        b.enum_constant(enumeration, "B", 2, loc);
        let ast = b.finish();

        let out = run(
            &ast,
            "e.hpp",
            Some(r#"{"binding_attributes": {"E": {"remove_prefix": "E_"}}}"#),
        );
        let module = out.root.find_module("unknown").unwrap();
        let DDecl::Enum {
            name,
            base,
            constants,
        } = out.dast.decl(module.decls[0])
        else {
            panic!("expected an enum");
        };
        assert_eq!(name, "E");
        assert_eq!(type_name(&out, base.unwrap()), "int");
        let rendered: Vec<(String, i64)> = constants
            .iter()
            .map(|&c| match out.dast.decl(c) {
                DDecl::EnumConstant { name, value } => (name.clone(), *value),
                other => panic!("expected an enum constant, found {other:?}"),
            })
            .collect();
        assert_eq!(rendered, vec![("A".to_string(), 1), ("B".to_string(), 2)]);
    }

    #[test]
    fn pointer_to_interface_is_elided() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("p.hpp");
        let loc = b.loc(file, 1, 1);
        let iface = b.record(b.tu(), "I", RecordTag::Struct, true, loc);
        let void_ty = b.builtin(BuiltinKind::Void);
        let loc = b.loc(file, 1, 12);
        b.method(iface, "f", void_ty, &[], true, loc);
        let iface_ty = b.record_type(iface);
        let iface_ptr = b.pointer_to(iface_ty);

        let loc = b.loc(file, 3, 1);
        let user = b.record(b.tu(), "User", RecordTag::Struct, true, loc);
        let loc = b.loc(file, 3, 15);
        b.field(user, "target", iface_ptr, Access::None, loc);
        let ast = b.finish();

        let out = run(&ast, "p.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        let user_struct = module
            .decls
            .iter()
            .find_map(|&d| match out.dast.decl(d) {
                DDecl::Struct { name, members, .. } if name == "User" => Some(members.clone()),
                _ => None,
            })
            .expect("User struct missing");
        let DDecl::Field { ty, .. } = out.dast.decl(user_struct[0]) else {
            panic!("expected a field");
        };
        // the pointer wrapper is dropped: the field type IS the interface
        assert_eq!(type_name(&out, *ty), "I");
    }

    #[test]
    fn reference_arguments_keep_the_ref_wrapper_for_value_types() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("r.hpp");
        let int_ty = b.builtin(BuiltinKind::Int);
        let int_ref = b.lvalue_ref_to(int_ty);
        let void_ty = b.builtin(BuiltinKind::Void);
        let loc = b.loc(file, 1, 1);
        b.function(
            b.tu(),
            "swap_one",
            void_ty,
            &[("value", int_ref)],
            crate::cxx::Linkage::Cxx,
            loc,
        );
        let ast = b.finish();

        let out = run(&ast, "r.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        let DDecl::Function(function) = out.dast.decl(module.decls[0]) else {
            panic!("expected a function");
        };
        let DDecl::Argument { ty, .. } = out.dast.decl(function.arguments[0]) else {
            panic!("expected an argument");
        };
        assert_eq!(type_name(&out, *ty), "ref int");
    }

    #[test]
    fn unwrappable_members_never_reach_the_output() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("d.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "S", RecordTag::Class, true, loc);
        let void_ty = b.builtin(BuiltinKind::Void);
        let loc = b.loc(file, 2, 5);
        let deleted = b.method(record, "gone", void_ty, &[], false, loc);
        b.method_mut(deleted).is_deleted = true;
        let loc = b.loc(file, 3, 5);
        b.method(record, "kept", void_ty, &[], false, loc);
        let ast = b.finish();

        let out = run(&ast, "d.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        let DDecl::Struct { members, .. } = out.dast.decl(module.decls[0]) else {
            panic!("expected a struct");
        };
        let names: Vec<&str> = members.iter().map(|&m| out.dast.decl(m).name()).collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn repeated_type_translation_is_memoized() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("m.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "Once", RecordTag::Struct, true, loc);
        let record_ty = b.record_type(record);
        let loc = b.loc(file, 2, 1);
        b.variable(b.tu(), "a", record_ty, crate::cxx::Linkage::Cxx, loc);
        let loc = b.loc(file, 3, 1);
        b.variable(b.tu(), "b", record_ty, crate::cxx::Linkage::Cxx, loc);
        let ast = b.finish();

        let out = run(&ast, "m.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        let struct_count = module
            .decls
            .iter()
            .filter(|&&d| matches!(out.dast.decl(d), DDecl::Struct { .. }))
            .count();
        assert_eq!(struct_count, 1);

        let variable_types: Vec<DTypeId> = module
            .decls
            .iter()
            .filter_map(|&d| match out.dast.decl(d) {
                DDecl::Variable { ty, .. } => Some(*ty),
                _ => None,
            })
            .collect();
        assert_eq!(variable_types.len(), 2);
        assert_eq!(variable_types[0], variable_types[1]);
    }

    #[test]
    fn record_template_emits_a_templated_struct() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("x.hpp");
        let loc = b.loc(file, 1, 1);
        let (_template, _templated) =
            b.class_template(b.tu(), "Box", RecordTag::Struct, &[("T", false)], loc);
        let ast = b.finish();

        let out = run(&ast, "x.hpp", None);
        let module = out.root.find_module("unknown").unwrap();
        let DDecl::Struct {
            name,
            template_params,
            ..
        } = out.dast.decl(module.decls[0])
        else {
            panic!("expected a struct");
        };
        assert_eq!(name, "Box");
        assert_eq!(template_params, &vec!["T".to_string()]);
    }
}
