//! The libclang importer: drives the external parser over a synthesized
//! translation unit that includes every input header, and flattens the
//! entities it reports into the adapter arena. Only what the pipeline
//! consumes is imported; everything else arrives as an unsupported node
//! the walker will mark unwrappable.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use clang::{Accessibility, Availability, Clang, Entity, EntityKind, Index, Type, TypeKind};
use color_eyre::eyre::{eyre, WrapErr};
use log::{debug, warn};

use super::{
    Access, BuiltinKind, CxxAst, CxxAstBuilder, CxxBase, CxxDeclKind, DeclId, FileId,
    FunctionDecl, Linkage, RecordDecl, RecordTag, SourceLocation, SpecializationInfo, SugarKind,
    TemplateArg, TypeId,
};

pub fn parse_headers(headers: &[PathBuf], clang_args: &[String]) -> color_eyre::Result<CxxAst> {
    let clang = Clang::new().map_err(|message| eyre!("cannot load libclang: {message}"))?;
    let index = Index::new(&clang, false, true);

    // a synthesized source that includes every requested header, so one
    // translation unit covers them all
    let driver_path = std::env::temp_dir().join(format!("dbindgen-{}.cpp", std::process::id()));
    {
        let mut driver = fs::File::create(&driver_path)
            .wrap_err_with(|| format!("cannot create {}", driver_path.display()))?;
        for header in headers {
            writeln!(driver, "#include \"{}\"", header.display())?;
        }
    }

    let tu = index
        .parser(&driver_path)
        .arguments(clang_args)
        .skip_function_bodies(true)
        .parse()
        .wrap_err("the C++ parser failed")?;

    let mut importer = Importer {
        builder: CxxAstBuilder::new(),
        decl_map: HashMap::new(),
        type_map: HashMap::new(),
        file_map: HashMap::new(),
    };
    let root = importer.builder.tu();
    for child in tu.get_entity().get_children() {
        importer.import_decl(child, root, Linkage::Cxx);
    }
    let _ = fs::remove_file(&driver_path);
    Ok(importer.builder.finish())
}

struct Importer<'tu> {
    builder: CxxAstBuilder,
    /// Keyed by the canonical entity; redeclarations (other than
    /// namespaces) collapse onto one node.
    decl_map: HashMap<Entity<'tu>, DeclId>,
    type_map: HashMap<String, TypeId>,
    file_map: HashMap<PathBuf, FileId>,
}

impl<'tu> Importer<'tu> {
    fn location(&mut self, entity: Entity<'tu>) -> SourceLocation {
        let Some(location) = entity.get_location() else {
            return self.builder.invalid_loc();
        };
        let spot = location.get_file_location();
        let Some(file) = spot.file else {
            return self.builder.invalid_loc();
        };
        let path = file.get_path();
        let file_id = match self.file_map.get(&path) {
            Some(&id) => id,
            None => {
                let id = self.builder.add_file(path.clone());
                self.file_map.insert(path, id);
                id
            }
        };
        self.builder.loc(file_id, spot.line, spot.column)
    }

    fn access(entity: Entity<'tu>) -> Access {
        match entity.get_accessibility() {
            Some(Accessibility::Public) => Access::Public,
            Some(Accessibility::Protected) => Access::Protected,
            Some(Accessibility::Private) => Access::Private,
            None => Access::None,
        }
    }

    fn attach(&mut self, parent: DeclId, child: DeclId) {
        match &mut self.builder.ast.decls[parent.0 as usize].kind {
            CxxDeclKind::TranslationUnit { children }
            | CxxDeclKind::LinkageSpec { children, .. }
            | CxxDeclKind::Namespace { children, .. } => children.push(child),
            CxxDeclKind::Record(record) => record.children.push(child),
            CxxDeclKind::ClassTemplate { .. } => {}
            other => debug!("not attaching a child to {other:?}"),
        }
    }

    fn new_decl(
        &mut self,
        entity: Entity<'tu>,
        parent: Option<DeclId>,
        kind: CxxDeclKind,
    ) -> DeclId {
        let loc = self.location(entity);
        let name = entity.get_name().unwrap_or_default();
        let id = self.builder.push_decl(parent, &name, kind, loc);
        self.builder.set_access(id, Self::access(entity));
        self.decl_map.insert(entity.get_canonical_entity(), id);
        id
    }

    /// The node for a declaration referenced from a type, created as an
    /// empty placeholder when the entity has not been imported yet.
    fn ensure_decl(&mut self, entity: Entity<'tu>) -> DeclId {
        let canonical = entity.get_canonical_entity();
        if let Some(&id) = self.decl_map.get(&canonical) {
            return id;
        }
        match canonical.get_kind() {
            EntityKind::StructDecl | EntityKind::ClassDecl | EntityKind::UnionDecl => {
                let tag = match canonical.get_kind() {
                    EntityKind::UnionDecl => RecordTag::Union,
                    EntityKind::ClassDecl => RecordTag::Class,
                    _ => RecordTag::Struct,
                };
                let id = self.new_decl(
                    canonical,
                    None,
                    CxxDeclKind::Record(empty_record(tag)),
                );
                let ty = self.builder.push_type(super::CxxTypeKind::Record { decl: id });
                self.builder.set_decl_type(id, ty);
                id
            }
            EntityKind::EnumDecl => {
                let underlying = canonical
                    .get_enum_underlying_type()
                    .map(|t| self.convert_type(t))
                    .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                let id = self.new_decl(
                    canonical,
                    None,
                    CxxDeclKind::Enum {
                        underlying,
                        constants: vec![],
                    },
                );
                let ty = self.builder.push_type(super::CxxTypeKind::Enum { decl: id });
                self.builder.set_decl_type(id, ty);
                id
            }
            EntityKind::TypedefDecl | EntityKind::TypeAliasDecl => {
                let underlying = canonical
                    .get_typedef_underlying_type()
                    .map(|t| self.convert_type(t))
                    .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                let id = self.new_decl(
                    canonical,
                    None,
                    CxxDeclKind::Typedef {
                        underlying,
                        is_implicit: canonical.get_location().is_none(),
                    },
                );
                let ty = self
                    .builder
                    .push_type(super::CxxTypeKind::Typedef { decl: id });
                self.builder.set_decl_type(id, ty);
                id
            }
            _ => self.new_decl(canonical, None, CxxDeclKind::Empty),
        }
    }

    fn import_decl(&mut self, entity: Entity<'tu>, parent: DeclId, linkage: Linkage) {
        match entity.get_kind() {
            EntityKind::LinkageSpec => {
                let block = self.new_decl(
                    entity,
                    Some(parent),
                    CxxDeclKind::LinkageSpec {
                        linkage: Linkage::C,
                        children: vec![],
                    },
                );
                self.attach(parent, block);
                for child in entity.get_children() {
                    self.import_decl(child, block, Linkage::C);
                }
            }
            EntityKind::Namespace => {
                let canonical = entity.get_canonical_entity();
                let redecl_loc = self.location(entity);
                let id = match self.decl_map.get(&canonical).copied() {
                    Some(first) if canonical != entity => {
                        self.builder.namespace_redecl(parent, first, redecl_loc)
                    }
                    Some(first) => first,
                    None => {
                        let loc = redecl_loc;
                        let name = entity.get_name().unwrap_or_default();
                        let id = self.builder.push_decl(
                            Some(parent),
                            &name,
                            CxxDeclKind::Namespace {
                                children: vec![],
                                redecls: vec![],
                            },
                        loc,
                        );
                        if let CxxDeclKind::Namespace { redecls, .. } =
                            &mut self.builder.ast.decls[id.0 as usize].kind
                        {
                            redecls.push(id);
                        }
                        self.attach(parent, id);
                        self.decl_map.insert(canonical, id);
                        id
                    }
                };
                for child in entity.get_children() {
                    self.import_decl(child, id, linkage);
                }
            }
            EntityKind::StructDecl | EntityKind::ClassDecl | EntityKind::UnionDecl => {
                let id = self.ensure_decl(entity);
                // attach once; later redeclarations reuse the node
                if self.builder.ast.decls[id.0 as usize].parent.is_none() {
                    self.builder.ast.decls[id.0 as usize].parent = Some(parent);
                    self.attach(parent, id);
                }
                if entity.is_definition() {
                    self.fill_record(entity, id);
                }
            }
            EntityKind::ClassTemplate => {
                self.import_class_template(entity, parent);
            }
            EntityKind::ClassTemplatePartialSpecialization => {
                let id = self.new_decl(
                    entity,
                    Some(parent),
                    CxxDeclKind::ClassTemplatePartialSpecialization,
                );
                self.attach(parent, id);
            }
            EntityKind::FunctionDecl => {
                let function = self.convert_function(entity, linkage);
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::Function(function));
                self.import_params(entity, id);
                self.attach(parent, id);
            }
            EntityKind::EnumDecl => {
                let id = self.ensure_decl(entity);
                if self.builder.ast.decls[id.0 as usize].parent.is_none() {
                    self.builder.ast.decls[id.0 as usize].parent = Some(parent);
                    self.attach(parent, id);
                }
                let mut constants = vec![];
                for child in entity.get_children() {
                    if child.get_kind() == EntityKind::EnumConstantDecl {
                        let value = child.get_enum_constant_value().map_or(0, |(signed, _)| signed);
                        let constant =
                            self.new_decl(child, Some(id), CxxDeclKind::EnumConstant { value });
                        constants.push(constant);
                    }
                }
                if let CxxDeclKind::Enum {
                    constants: slot, ..
                } = &mut self.builder.ast.decls[id.0 as usize].kind
                {
                    *slot = constants;
                }
            }
            EntityKind::TypedefDecl | EntityKind::TypeAliasDecl => {
                let id = self.ensure_decl(entity);
                if self.builder.ast.decls[id.0 as usize].parent.is_none() {
                    self.builder.ast.decls[id.0 as usize].parent = Some(parent);
                    self.attach(parent, id);
                }
            }
            EntityKind::VarDecl => {
                let ty = entity
                    .get_type()
                    .map(|t| self.convert_type(t))
                    .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                let id =
                    self.new_decl(entity, Some(parent), CxxDeclKind::Variable { ty, linkage });
                self.attach(parent, id);
            }
            EntityKind::FunctionTemplate => {
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::FunctionTemplate);
                self.attach(parent, id);
            }
            EntityKind::TypeAliasTemplateDecl => {
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::TypeAliasTemplate);
                self.attach(parent, id);
            }
            EntityKind::UsingDirective => {
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::UsingDirective);
                self.attach(parent, id);
            }
            EntityKind::UsingDeclaration => {
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::UsingDecl);
                self.attach(parent, id);
            }
            EntityKind::StaticAssert => {
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::StaticAssert);
                self.attach(parent, id);
            }
            EntityKind::AccessSpecifier => {
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::AccessSpec);
                self.attach(parent, id);
            }
            other => {
                debug!("importing `{other:?}` as an opaque declaration");
                let id = self.new_decl(entity, Some(parent), CxxDeclKind::Empty);
                self.attach(parent, id);
            }
        }
    }

    fn fill_record(&mut self, entity: Entity<'tu>, id: DeclId) {
        let tag = match entity.get_kind() {
            EntityKind::UnionDecl => RecordTag::Union,
            EntityKind::ClassDecl => RecordTag::Class,
            _ => RecordTag::Struct,
        };
        let mut record = empty_record(tag);
        record.is_definition = true;
        record.is_dynamic = is_dynamic_class(entity);
        if let Some(template) = entity.get_template() {
            let template_id = self.ensure_decl(template);
            record.specialization = Some(SpecializationInfo {
                template: template_id,
                args: self.convert_template_args(entity),
                is_explicit: true,
            });
            if let CxxDeclKind::ClassTemplate { specializations, .. } =
                &mut self.builder.ast.decls[template_id.0 as usize].kind
            {
                specializations.push(id);
            }
        }
        self.builder.ast.decls[id.0 as usize].kind = CxxDeclKind::Record(record);

        for child in entity.get_children() {
            match child.get_kind() {
                EntityKind::FieldDecl => {
                    let ty = child
                        .get_type()
                        .map(|t| self.convert_type(t))
                        .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                    let field = self.new_decl(child, Some(id), CxxDeclKind::Field { ty });
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[id.0 as usize].kind
                    {
                        record.fields.push(field);
                    }
                }
                EntityKind::Method => {
                    let function = self.convert_function(child, Linkage::Cxx);
                    let method = self.new_decl(child, Some(id), CxxDeclKind::Method(function));
                    self.import_params(child, method);
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[id.0 as usize].kind
                    {
                        record.methods.push(method);
                    }
                }
                EntityKind::Constructor => {
                    let function = self.convert_function(child, Linkage::Cxx);
                    let ctor = self.new_decl(child, Some(id), CxxDeclKind::Constructor(function));
                    self.import_params(child, ctor);
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[id.0 as usize].kind
                    {
                        record.ctors.push(ctor);
                    }
                }
                EntityKind::Destructor => {
                    let function = self.convert_function(child, Linkage::Cxx);
                    let dtor = self.new_decl(child, Some(id), CxxDeclKind::Destructor(function));
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[id.0 as usize].kind
                    {
                        record.dtor = Some(dtor);
                    }
                }
                EntityKind::BaseSpecifier => {
                    let base = child
                        .get_type()
                        .map(|t| self.convert_type(t))
                        .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[id.0 as usize].kind
                    {
                        record.bases.push(CxxBase {
                            is_virtual: false,
                            access: Self::access(child),
                            ty: base,
                        });
                    }
                }
                _ => self.import_decl(child, id, Linkage::Cxx),
            }
        }
    }

    fn import_class_template(&mut self, entity: Entity<'tu>, parent: DeclId) {
        let id = self.new_decl(
            entity,
            Some(parent),
            CxxDeclKind::ClassTemplate {
                params: vec![],
                templated: DeclId(0),
                specializations: vec![],
            },
        );
        self.attach(parent, id);

        // libclang flattens the template: parameters and member
        // declarations are siblings under the ClassTemplate cursor
        let mut params = vec![];
        let mut index = 0;
        for child in entity.get_children() {
            match child.get_kind() {
                EntityKind::TemplateTypeParameter => {
                    let param = self.new_decl(
                        child,
                        Some(id),
                        CxxDeclKind::TemplateTypeParam {
                            index,
                            is_pack: false,
                        },
                    );
                    let param_ty = self
                        .builder
                        .push_type(super::CxxTypeKind::TemplateTypeParam { index });
                    self.builder.set_decl_type(param, param_ty);
                    params.push(param);
                    index += 1;
                }
                EntityKind::NonTypeTemplateParameter => {
                    let ty = child
                        .get_type()
                        .map(|t| self.convert_type(t))
                        .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                    let param = self.new_decl(
                        child,
                        Some(id),
                        CxxDeclKind::TemplateNonTypeParam { ty, is_pack: false },
                    );
                    params.push(param);
                    index += 1;
                }
                _ => {}
            }
        }

        let name = entity.get_name().unwrap_or_default();
        let loc = self.builder.invalid_loc();
        let templated = self.builder.push_decl(
            Some(id),
            &name,
            CxxDeclKind::Record(empty_record(RecordTag::Struct)),
            loc,
        );
        let injected = self
            .builder
            .push_type(super::CxxTypeKind::InjectedClassName { decl: templated });
        self.builder.set_decl_type(templated, injected);
        self.fill_template_body(entity, templated);

        if let CxxDeclKind::ClassTemplate {
            params: params_slot,
            templated: templated_slot,
            ..
        } = &mut self.builder.ast.decls[id.0 as usize].kind
        {
            *params_slot = params;
            *templated_slot = templated;
        }
    }

    /// Member declarations of the templated record, skipping the template
    /// parameters already harvested.
    fn fill_template_body(&mut self, entity: Entity<'tu>, templated: DeclId) {
        if let CxxDeclKind::Record(record) = &mut self.builder.ast.decls[templated.0 as usize].kind
        {
            record.is_definition = entity.is_definition();
            record.is_dynamic = is_dynamic_class(entity);
        }
        for child in entity.get_children() {
            match child.get_kind() {
                EntityKind::TemplateTypeParameter | EntityKind::NonTypeTemplateParameter => {}
                EntityKind::FieldDecl => {
                    let ty = child
                        .get_type()
                        .map(|t| self.convert_type(t))
                        .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
                    let field = self.new_decl(child, Some(templated), CxxDeclKind::Field { ty });
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[templated.0 as usize].kind
                    {
                        record.fields.push(field);
                    }
                }
                EntityKind::Method => {
                    let function = self.convert_function(child, Linkage::Cxx);
                    let method =
                        self.new_decl(child, Some(templated), CxxDeclKind::Method(function));
                    self.import_params(child, method);
                    if let CxxDeclKind::Record(record) =
                        &mut self.builder.ast.decls[templated.0 as usize].kind
                    {
                        record.methods.push(method);
                    }
                }
                _ => self.import_decl(child, templated, Linkage::Cxx),
            }
        }
    }

    fn import_params(&mut self, entity: Entity<'tu>, owner: DeclId) {
        let mut params = vec![];
        for argument in entity.get_arguments().unwrap_or_default() {
            if argument.get_kind() != EntityKind::ParmDecl {
                continue;
            }
            let ty = argument
                .get_type()
                .map(|t| self.convert_type(t))
                .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int));
            params.push(self.new_decl(argument, Some(owner), CxxDeclKind::Param { ty }));
        }
        match &mut self.builder.ast.decls[owner.0 as usize].kind {
            CxxDeclKind::Function(f)
            | CxxDeclKind::Method(f)
            | CxxDeclKind::Constructor(f)
            | CxxDeclKind::Destructor(f) => f.params = params,
            _ => {}
        }
    }

    fn convert_function(&mut self, entity: Entity<'tu>, linkage: Linkage) -> FunctionDecl {
        let return_type = entity
            .get_result_type()
            .map(|t| self.convert_type(t))
            .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Void));
        FunctionDecl {
            return_type,
            params: vec![],
            linkage,
            is_operator: entity
                .get_name()
                .is_some_and(|name| name.starts_with("operator")),
            is_deleted: entity.get_availability() == Availability::Unavailable,
            is_virtual: entity.is_virtual_method(),
            is_static: entity.is_static_method(),
            is_const: entity.is_const_method(),
        }
    }

    fn convert_template_args(&mut self, entity: Entity<'tu>) -> Vec<TemplateArg> {
        entity
            .get_template_arguments()
            .unwrap_or_default()
            .into_iter()
            .map(|argument| match argument {
                clang::TemplateArgument::Type(ty) => TemplateArg::Type(self.convert_type(ty)),
                clang::TemplateArgument::Integral(value, _) => TemplateArg::Integral(value),
                _ => TemplateArg::Expression,
            })
            .collect()
    }

    fn convert_type(&mut self, ty: Type<'tu>) -> TypeId {
        let key = ty.get_display_name();
        if let Some(&id) = self.type_map.get(&key) {
            return id;
        }
        let is_const = ty.is_const_qualified();
        let is_volatile = ty.is_volatile_qualified();
        let is_restrict = ty.is_restrict_qualified();

        let bare = self.convert_unqualified(ty);
        let id = if is_const || is_volatile || is_restrict {
            self.builder.push_type(super::CxxTypeKind::Qualified {
                underlying: bare,
                quals: super::Qualifiers {
                    is_const,
                    is_restrict,
                    is_volatile,
                },
            })
        } else {
            bare
        };
        self.type_map.insert(key, id);
        id
    }

    fn convert_unqualified(&mut self, ty: Type<'tu>) -> TypeId {
        use super::CxxTypeKind as K;
        let kind = match ty.get_kind() {
            TypeKind::Void => K::Builtin(BuiltinKind::Void),
            TypeKind::Bool => K::Builtin(BuiltinKind::Bool),
            TypeKind::CharS | TypeKind::CharU => K::Builtin(BuiltinKind::Char),
            TypeKind::SChar => K::Builtin(BuiltinKind::SChar),
            TypeKind::UChar => K::Builtin(BuiltinKind::UChar),
            TypeKind::WChar => K::Builtin(BuiltinKind::WChar),
            TypeKind::Char16 => K::Builtin(BuiltinKind::Char16),
            TypeKind::Char32 => K::Builtin(BuiltinKind::Char32),
            TypeKind::Short => K::Builtin(BuiltinKind::Short),
            TypeKind::UShort => K::Builtin(BuiltinKind::UShort),
            TypeKind::Int => K::Builtin(BuiltinKind::Int),
            TypeKind::UInt => K::Builtin(BuiltinKind::UInt),
            TypeKind::Long => K::Builtin(BuiltinKind::Long),
            TypeKind::ULong => K::Builtin(BuiltinKind::ULong),
            TypeKind::LongLong => K::Builtin(BuiltinKind::LongLong),
            TypeKind::ULongLong => K::Builtin(BuiltinKind::ULongLong),
            TypeKind::Int128 => K::Builtin(BuiltinKind::Int128),
            TypeKind::UInt128 => K::Builtin(BuiltinKind::UInt128),
            TypeKind::Float => K::Builtin(BuiltinKind::Float),
            TypeKind::Double => K::Builtin(BuiltinKind::Double),
            TypeKind::LongDouble => K::Builtin(BuiltinKind::LongDouble),
            TypeKind::Pointer => {
                let pointee = self.pointee(ty);
                K::Pointer { pointee }
            }
            TypeKind::LValueReference => {
                let pointee = self.pointee(ty);
                K::LValueReference { pointee }
            }
            TypeKind::RValueReference => {
                let pointee = self.pointee(ty);
                K::RValueReference { pointee }
            }
            TypeKind::Record => match ty.get_declaration() {
                Some(decl) => K::Record {
                    decl: self.ensure_decl(decl),
                },
                None => K::DependentTemplateSpecialization,
            },
            TypeKind::Enum => match ty.get_declaration() {
                Some(decl) => K::Enum {
                    decl: self.ensure_decl(decl),
                },
                None => K::DependentTemplateSpecialization,
            },
            TypeKind::Typedef => match ty.get_declaration() {
                Some(decl) => K::Typedef {
                    decl: self.ensure_decl(decl),
                },
                None => K::DependentTemplateSpecialization,
            },
            TypeKind::ConstantArray => {
                let element = self.element(ty);
                K::ConstantArray {
                    element,
                    length: ty.get_size().unwrap_or(0) as u64,
                }
            }
            TypeKind::IncompleteArray | TypeKind::VariableArray => {
                let element = self.element(ty);
                K::IncompleteArray { element }
            }
            TypeKind::DependentSizedArray => {
                let element = self.element(ty);
                K::DependentSizedArray { element }
            }
            TypeKind::FunctionPrototype => {
                let result = ty
                    .get_result_type()
                    .map(|t| self.convert_type(t))
                    .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Void));
                let params = ty
                    .get_argument_types()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|t| self.convert_type(t))
                    .collect();
                K::FunctionProto { result, params }
            }
            TypeKind::FunctionNoPrototype => {
                let result = ty
                    .get_result_type()
                    .map(|t| self.convert_type(t))
                    .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Void));
                K::FunctionNoProto { result }
            }
            TypeKind::Vector => {
                let element = self.element(ty);
                K::Vector {
                    element,
                    count: ty.get_size().unwrap_or(0) as u32,
                }
            }
            TypeKind::MemberPointer => K::MemberPointer,
            TypeKind::Elaborated | TypeKind::Auto => {
                let desugared = self.convert_type(ty.get_canonical_type());
                K::Sugar {
                    kind: SugarKind::Elaborated,
                    desugared,
                }
            }
            other => {
                warn!("unsupported type kind {other:?}");
                K::DependentTemplateSpecialization
            }
        };
        self.builder.push_type(kind)
    }

    fn pointee(&mut self, ty: Type<'tu>) -> TypeId {
        ty.get_pointee_type()
            .map(|t| self.convert_type(t))
            .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Void))
    }

    fn element(&mut self, ty: Type<'tu>) -> TypeId {
        ty.get_element_type()
            .map(|t| self.convert_type(t))
            .unwrap_or_else(|| self.builder.builtin(BuiltinKind::Int))
    }
}

fn empty_record(tag: RecordTag) -> RecordDecl {
    RecordDecl {
        tag,
        is_cxx: true,
        is_definition: false,
        is_dynamic: false,
        children: vec![],
        fields: vec![],
        methods: vec![],
        ctors: vec![],
        dtor: None,
        bases: vec![],
        specialization: None,
    }
}

/// Any virtual method, own or inherited, makes the class dynamic.
fn is_dynamic_class(entity: Entity<'_>) -> bool {
    for child in entity.get_children() {
        match child.get_kind() {
            EntityKind::Method | EntityKind::Destructor => {
                if child.is_virtual_method() {
                    return true;
                }
            }
            EntityKind::BaseSpecifier => {
                if let Some(base) = child.get_type().and_then(|t| t.get_declaration()) {
                    if is_dynamic_class(base) {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}
