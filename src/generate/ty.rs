//! Wrapped types and the interner. Every distinct C++ type gets exactly one
//! wrapped handle; the handle carries the translation strategy decided for
//! that type, either inferred by the resolver or forced by configuration.

use log::warn;

use crate::cxx::{BuiltinKind, CxxTypeKind, DeclId, RecordTag, TemplateArg, TypeId};
use crate::generate::context::{BindingContext, WDeclId, WTypeId};

/// How a C++ type surfaces in D. "Not decided yet" is the `None` of the
/// surrounding `Option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Substitute a named reference. The empty name means "translate
    /// structurally, not by name".
    Replace(String),
    Struct,
    Interface,
    Class,
    OpaqueClass,
}

impl Strategy {
    /// Interface, class and opaque-class types have reference semantics in
    /// the target language; pointers and references to them are elided.
    pub fn is_reference_semantics(&self) -> bool {
        matches!(
            self,
            Strategy::Interface | Strategy::Class | Strategy::OpaqueClass
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeVariant {
    Invalid,
    Builtin,
    Pointer {
        pointee: WTypeId,
    },
    Reference {
        pointee: WTypeId,
    },
    NonTemplateRecord {
        decl: DeclId,
    },
    TemplateRecord {
        decl: DeclId,
    },
    Union {
        decl: DeclId,
    },
    ConstantArray {
        element: WTypeId,
        length: u64,
    },
    VariableArray {
        element: WTypeId,
    },
    DependentLengthArray {
        element: WTypeId,
    },
    Function {
        result: WTypeId,
        params: Vec<WTypeId>,
    },
    Typedef {
        decl: DeclId,
    },
    Enum {
        decl: DeclId,
    },
    Vector,
    Qualified {
        unqualified: WTypeId,
    },
    /// The `T` of a template. Template parameter declarations are not
    /// redeclarable upstream, so every parameter list the walker sees is
    /// recorded here and arguments are matched by position.
    TemplateArgument {
        index: u32,
        param_lists: Vec<Vec<DeclId>>,
    },
    TemplateSpecialization {
        template: DeclId,
        args: Vec<TemplateArg>,
    },
    /// A dependent name to be resolved during translation.
    Delayed {
        qualifier: TypeId,
        identifier: String,
    },
}

#[derive(Debug, Clone)]
pub struct WrappedType {
    pub source: TypeId,
    pub variant: TypeVariant,
    pub strategy: Option<Strategy>,
    /// Module the replacement name lives in; only meaningful for the
    /// replace strategy (imports for replaced builtins).
    pub target_module: String,
}

impl WrappedType {
    fn new(source: TypeId, variant: TypeVariant) -> WrappedType {
        WrappedType {
            source,
            variant,
            strategy: None,
            target_module: String::new(),
        }
    }

    pub fn choose_replace_strategy(&mut self, replacement: &str) {
        self.strategy = Some(Strategy::Replace(replacement.to_string()));
    }

    pub fn replacement(&self) -> Option<&str> {
        match &self.strategy {
            Some(Strategy::Replace(name)) => Some(name),
            _ => None,
        }
    }
}

/// Attributes parsed out of a `strategy`/`target_module` configuration
/// entry, applied to every type the entry's name resolves to.
#[derive(Debug, Clone, Default)]
pub struct TypeAttributes {
    pub strategy: Option<Strategy>,
    pub target_module: Option<String>,
}

impl TypeAttributes {
    pub fn apply_to(&self, ty: &mut WrappedType) {
        if let Some(strategy) = &self.strategy {
            ty.strategy = Some(strategy.clone());
        }
        if let Some(target_module) = &self.target_module {
            ty.target_module = target_module.clone();
        }
    }
}

/// Fixed mapping from a C++ builtin kind to its D spelling, plus the module
/// the spelling must be imported from (empty for language builtins).
pub fn builtin_target_name(kind: BuiltinKind) -> (&'static str, &'static str) {
    match kind {
        BuiltinKind::Void => ("void", ""),
        BuiltinKind::Bool => ("bool", ""),
        BuiltinKind::Char => ("char", ""),
        BuiltinKind::SChar => ("byte", ""),
        BuiltinKind::UChar => ("ubyte", ""),
        // wchar_t is 32 bits everywhere this generator targets
        BuiltinKind::WChar => ("dchar", ""),
        BuiltinKind::Char16 => ("wchar", ""),
        BuiltinKind::Char32 => ("dchar", ""),
        BuiltinKind::Short => ("short", ""),
        BuiltinKind::UShort => ("ushort", ""),
        BuiltinKind::Int => ("int", ""),
        BuiltinKind::UInt => ("uint", ""),
        BuiltinKind::Long => ("c_long", "core.stdc.config"),
        BuiltinKind::ULong => ("c_ulong", "core.stdc.config"),
        BuiltinKind::LongLong => ("long", ""),
        BuiltinKind::ULongLong => ("ulong", ""),
        BuiltinKind::Int128 => ("cent", ""),
        BuiltinKind::UInt128 => ("ucent", ""),
        BuiltinKind::Float => ("float", ""),
        BuiltinKind::Double => ("double", ""),
        BuiltinKind::LongDouble => ("real", ""),
    }
}

impl BindingContext<'_> {
    /// Returns the wrapped handle for a parsed type, classifying and
    /// inserting it on first sight. Reentrant: the slot is reserved and
    /// mapped before any recursion, so self-referential shapes terminate.
    pub fn intern_type(&mut self, source: TypeId) -> WTypeId {
        if let Some(id) = self.lookup_type(source) {
            return id;
        }
        let ast = self.ast;

        // Sugar and transparent qualifiers alias the underlying handle;
        // both keys map to it.
        match &ast.ty(source).kind {
            CxxTypeKind::Sugar { desugared, .. } => {
                let id = self.intern_type(*desugared);
                self.map_type(source, id);
                return id;
            }
            CxxTypeKind::Qualified { underlying, quals } => {
                if quals.is_volatile {
                    warn!("volatile-qualified type is not representable");
                    let id = self.push_type(WrappedType::new(source, TypeVariant::Invalid));
                    self.map_type(source, id);
                    return id;
                }
                if quals.is_const {
                    let id = self.push_type(WrappedType::new(source, TypeVariant::Invalid));
                    self.map_type(source, id);
                    let unqualified = self.intern_type(*underlying);
                    self.ty_mut(id).variant = TypeVariant::Qualified { unqualified };
                    return id;
                }
                // restrict alone does not change the translation
                let id = self.intern_type(*underlying);
                self.map_type(source, id);
                return id;
            }
            _ => {}
        }

        let id = self.push_type(WrappedType::new(source, TypeVariant::Invalid));
        self.map_type(source, id);

        let variant = match &ast.ty(source).kind {
            CxxTypeKind::Builtin(kind) => {
                let (name, module) = builtin_target_name(*kind);
                let ty = self.ty_mut(id);
                ty.choose_replace_strategy(name);
                ty.target_module = module.to_string();
                self.register_type_name(name, id);
                TypeVariant::Builtin
            }
            CxxTypeKind::Pointer { pointee } => {
                let pointee = self.intern_type(*pointee);
                TypeVariant::Pointer { pointee }
            }
            CxxTypeKind::LValueReference { pointee } => {
                let pointee = self.intern_type(*pointee);
                TypeVariant::Reference { pointee }
            }
            CxxTypeKind::RValueReference { .. } => {
                warn!("skipping type due to rvalue reference");
                TypeVariant::Invalid
            }
            CxxTypeKind::Record { decl } => {
                let decl = *decl;
                match record_tag(self, decl) {
                    RecordTag::Union => TypeVariant::Union { decl },
                    _ => TypeVariant::NonTemplateRecord { decl },
                }
            }
            CxxTypeKind::InjectedClassName { decl } => TypeVariant::TemplateRecord { decl: *decl },
            CxxTypeKind::Enum { decl } => TypeVariant::Enum { decl: *decl },
            CxxTypeKind::Typedef { decl } => TypeVariant::Typedef { decl: *decl },
            CxxTypeKind::ConstantArray { element, length } => {
                let length = *length;
                let element = self.intern_type(*element);
                TypeVariant::ConstantArray { element, length }
            }
            CxxTypeKind::IncompleteArray { element } => {
                let element = self.intern_type(*element);
                TypeVariant::VariableArray { element }
            }
            CxxTypeKind::DependentSizedArray { element } => {
                warn!("skipping dependent-sized array type");
                let element = self.intern_type(*element);
                TypeVariant::DependentLengthArray { element }
            }
            CxxTypeKind::FunctionProto { result, params } => {
                let params = params.clone();
                let result = self.intern_type(*result);
                let params = params.into_iter().map(|p| self.intern_type(p)).collect();
                TypeVariant::Function { result, params }
            }
            CxxTypeKind::FunctionNoProto { .. } => {
                warn!("skipping function type without a prototype");
                TypeVariant::Invalid
            }
            CxxTypeKind::Vector { .. } => TypeVariant::Vector,
            CxxTypeKind::TemplateTypeParam { index } => TypeVariant::TemplateArgument {
                index: *index,
                param_lists: vec![],
            },
            CxxTypeKind::TemplateSpecialization { template, args } => {
                let template = *template;
                let args = args.clone();
                let qualified = ast.qualified_name(template);
                self.register_type_name(&qualified, id);
                TypeVariant::TemplateSpecialization { template, args }
            }
            CxxTypeKind::DependentName {
                qualifier,
                identifier,
            } => TypeVariant::Delayed {
                qualifier: *qualifier,
                identifier: identifier.clone(),
            },
            CxxTypeKind::MemberPointer => {
                warn!("skipping type due to a C++ member pointer");
                TypeVariant::Invalid
            }
            CxxTypeKind::PackExpansion => {
                warn!("skipping type due to a parameter pack expansion");
                TypeVariant::Invalid
            }
            CxxTypeKind::UnaryTransform | CxxTypeKind::DependentTemplateSpecialization => {
                warn!("skipping type dependent on an unsupported template construct");
                TypeVariant::Invalid
            }
            // handled above
            CxxTypeKind::Sugar { .. } | CxxTypeKind::Qualified { .. } => unreachable!(),
        };
        self.ty_mut(id).variant = variant;
        id
    }

    /// The wrapped declaration behind a type, when it has one. Builtins,
    /// pointers, arrays and function types have none.
    pub fn type_declaration(&self, id: WTypeId) -> Option<WDeclId> {
        match &self.ty(id).variant {
            TypeVariant::TemplateRecord { decl } => {
                // the injected class name points at the templated body; the
                // interesting declaration is the surrounding template
                let parent = self.ast.decl(*decl).parent;
                match parent {
                    Some(parent)
                        if matches!(
                            self.ast.decl(parent).kind,
                            crate::cxx::CxxDeclKind::ClassTemplate { .. }
                        ) =>
                    {
                        self.lookup_decl(parent)
                    }
                    _ => self.lookup_decl(*decl),
                }
            }
            TypeVariant::NonTemplateRecord { decl }
            | TypeVariant::Union { decl }
            | TypeVariant::Typedef { decl }
            | TypeVariant::Enum { decl } => self.lookup_decl(*decl),
            TypeVariant::TemplateSpecialization { template, .. } => self.lookup_decl(*template),
            TypeVariant::TemplateArgument { index, param_lists } => {
                // Parameter lists are interchangeable by construction; any
                // list naming this position identifies the declaration.
                param_lists
                    .iter()
                    .find_map(|list| list.get(*index as usize))
                    .and_then(|&decl| self.lookup_decl(decl))
            }
            TypeVariant::Qualified { unqualified } => self.type_declaration(*unqualified),
            _ => None,
        }
    }

    /// Whether a type can appear in emitted bindings. `ref_allowed` is true
    /// in positions where a C++ reference is representable (parameters and
    /// return values), false in stored positions (fields, elements).
    pub fn is_type_wrappable(&self, id: WTypeId, ref_allowed: bool) -> bool {
        match &self.ty(id).variant {
            TypeVariant::Invalid | TypeVariant::Vector => false,
            TypeVariant::Builtin | TypeVariant::Enum { .. } => true,
            TypeVariant::Pointer { pointee } => self.is_type_wrappable(*pointee, false),
            TypeVariant::Reference { .. } => ref_allowed,
            TypeVariant::NonTemplateRecord { decl }
            | TypeVariant::TemplateRecord { decl }
            | TypeVariant::Union { decl } => self
                .lookup_decl(*decl)
                .is_none_or(|w| self.decl(w).is_wrappable),
            TypeVariant::ConstantArray { element, .. } | TypeVariant::VariableArray { element } => {
                self.is_type_wrappable(*element, false)
            }
            TypeVariant::DependentLengthArray { .. } => false,
            TypeVariant::Function { .. } => true,
            TypeVariant::Typedef { decl } => self
                .lookup_decl(*decl)
                .is_none_or(|w| self.decl(w).is_wrappable),
            TypeVariant::Qualified { unqualified } => {
                self.is_type_wrappable(*unqualified, ref_allowed)
            }
            TypeVariant::TemplateArgument { .. } => true,
            TypeVariant::TemplateSpecialization { template, .. } => self
                .lookup_decl(*template)
                .is_none_or(|w| self.decl(w).is_wrappable),
            TypeVariant::Delayed { .. } => true,
        }
    }

    /// Whether the emitted D type has reference semantics. Qualified types
    /// delegate to their unqualified form; references delegate to the
    /// pointee so a reference to an interface stays an interface.
    pub fn is_reference_type(&self, id: WTypeId) -> bool {
        match &self.ty(id).variant {
            TypeVariant::Invalid => {
                warn!("asked whether an invalid type has reference semantics");
                false
            }
            TypeVariant::Reference { pointee } => self.is_reference_type(*pointee),
            TypeVariant::NonTemplateRecord { .. } | TypeVariant::TemplateRecord { .. } => {
                match &self.ty(id).strategy {
                    Some(strategy) => strategy.is_reference_semantics(),
                    None => false,
                }
            }
            TypeVariant::Typedef { decl } => {
                let underlying = self
                    .lookup_decl(*decl)
                    .map(|w| self.decl(w).source)
                    .and_then(|source| typedef_underlying(self, source))
                    .and_then(|u| self.lookup_type(u));
                underlying.is_some_and(|u| self.is_reference_type(u))
            }
            TypeVariant::Qualified { unqualified } => self.is_reference_type(*unqualified),
            _ => false,
        }
    }
}

fn record_tag(ctx: &BindingContext<'_>, decl: DeclId) -> RecordTag {
    match &ctx.ast.decl(decl).kind {
        crate::cxx::CxxDeclKind::Record(record) => record.tag,
        _ => RecordTag::Struct,
    }
}

fn typedef_underlying(ctx: &BindingContext<'_>, decl: DeclId) -> Option<TypeId> {
    match &ctx.ast.decl(decl).kind {
        crate::cxx::CxxDeclKind::Typedef { underlying, .. } => Some(*underlying),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cxx::{CxxAstBuilder, Qualifiers};
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_twice_returns_the_same_handle() {
        let mut b = CxxAstBuilder::new();
        let int_ty = b.builtin(BuiltinKind::Int);
        let ptr = b.pointer_to(int_ty);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        let first = ctx.intern_type(ptr);
        let second = ctx.intern_type(ptr);
        assert_eq!(first, second);
    }

    #[test]
    fn builtins_get_replace_strategy_and_name_index_entry() {
        let mut b = CxxAstBuilder::new();
        let int_ty = b.builtin(BuiltinKind::Int);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        let id = ctx.intern_type(int_ty);
        assert_eq!(ctx.ty(id).replacement(), Some("int"));
        assert_eq!(ctx.types_by_name("int"), &[id]);
    }

    #[test]
    fn const_wraps_and_restrict_aliases() {
        let mut b = CxxAstBuilder::new();
        let int_ty = b.builtin(BuiltinKind::Int);
        let const_int = b.const_of(int_ty);
        let restrict_int = b.push_type(CxxTypeKind::Qualified {
            underlying: int_ty,
            quals: Qualifiers {
                is_restrict: true,
                ..Qualifiers::default()
            },
        });
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        let plain = ctx.intern_type(int_ty);
        let qualified = ctx.intern_type(const_int);
        assert_eq!(
            ctx.ty(qualified).variant,
            TypeVariant::Qualified { unqualified: plain }
        );
        assert_eq!(ctx.intern_type(restrict_int), plain);
    }

    #[test]
    fn rvalue_references_become_invalid() {
        let mut b = CxxAstBuilder::new();
        let int_ty = b.builtin(BuiltinKind::Int);
        let rref = b.push_type(CxxTypeKind::RValueReference { pointee: int_ty });
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        let id = ctx.intern_type(rref);
        assert_eq!(ctx.ty(id).variant, TypeVariant::Invalid);
        assert!(!ctx.is_type_wrappable(id, true));
    }

    #[test]
    fn sugar_is_interned_under_both_keys() {
        let mut b = CxxAstBuilder::new();
        let int_ty = b.builtin(BuiltinKind::Int);
        let sugar = b.push_type(CxxTypeKind::Sugar {
            kind: crate::cxx::SugarKind::Elaborated,
            desugared: int_ty,
        });
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        let through_sugar = ctx.intern_type(sugar);
        let direct = ctx.intern_type(int_ty);
        assert_eq!(through_sugar, direct);
    }

    #[test]
    fn qualified_type_delegates_predicates_to_unqualified() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("t.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "S", RecordTag::Struct, true, loc);
        let record_ty = b.record_type(record);
        let const_record = b.const_of(record_ty);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        let plain = ctx.intern_type(record_ty);
        let qualified = ctx.intern_type(const_record);
        ctx.ty_mut(plain).strategy = Some(Strategy::Interface);
        assert_eq!(
            ctx.is_reference_type(qualified),
            ctx.is_reference_type(plain)
        );
        assert_eq!(
            ctx.is_type_wrappable(qualified, false),
            ctx.is_type_wrappable(plain, false)
        );
    }
}
