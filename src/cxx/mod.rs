//! The C++ AST adapter: a flat arena of declaration and type nodes with
//! exactly the capabilities the translation pipeline needs. Any parser that
//! can fill this arena may act as the frontend; the in-tree producer is the
//! libclang importer behind the `libclang` feature. Tests build arenas
//! directly through [`CxxAstBuilder`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "libclang")]
pub mod frontend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeclId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileId(pub u32);

/// Location of a declaration, plus its position in the translation unit.
/// `tu_order` is a dense ordering index; comparing two locations from the
/// same parse compares their order in the translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: Option<FileId>,
    pub line: u32,
    pub column: u32,
    pub tu_order: u32,
}

impl SourceLocation {
    pub fn is_valid(&self) -> bool {
        self.file.is_some()
    }

    /// Translation-unit ordering predicate.
    pub fn is_before(&self, other: &SourceLocation) -> bool {
        self.tu_order < other.tu_order
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    C,
    Cxx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Struct,
    Class,
    Union,
}

/// C++ access specifier as reported by the parser. `None` is what clang
/// reports for declarations outside of a class body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    None,
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Void,
    Bool,
    Char,
    SChar,
    UChar,
    WChar,
    Char16,
    Char32,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Int128,
    UInt128,
    Float,
    Double,
    LongDouble,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateArg {
    Type(TypeId),
    Integral(i64),
    Expression,
    Pack,
}

#[derive(Debug, Clone)]
pub struct CxxBase {
    pub is_virtual: bool,
    pub access: Access,
    pub ty: TypeId,
}

/// A class template specialization is a record with this extra payload.
#[derive(Debug, Clone)]
pub struct SpecializationInfo {
    pub template: DeclId,
    pub args: Vec<TemplateArg>,
    pub is_explicit: bool,
}

#[derive(Debug, Clone)]
pub struct RecordDecl {
    pub tag: RecordTag,
    /// True for CXXRecordDecl-kind records, false for plain C records.
    pub is_cxx: bool,
    pub is_definition: bool,
    /// True when the record (or a base) declares a virtual function.
    pub is_dynamic: bool,
    /// Lexical children: nested records, typedefs, enums, friends, ...
    pub children: Vec<DeclId>,
    pub fields: Vec<DeclId>,
    pub methods: Vec<DeclId>,
    pub ctors: Vec<DeclId>,
    pub dtor: Option<DeclId>,
    pub bases: Vec<CxxBase>,
    pub specialization: Option<SpecializationInfo>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub return_type: TypeId,
    pub params: Vec<DeclId>,
    pub linkage: Linkage,
    pub is_operator: bool,
    pub is_deleted: bool,
    pub is_virtual: bool,
    pub is_static: bool,
    pub is_const: bool,
}

#[derive(Debug, Clone)]
pub enum CxxDeclKind {
    TranslationUnit {
        children: Vec<DeclId>,
    },
    LinkageSpec {
        linkage: Linkage,
        children: Vec<DeclId>,
    },
    /// Lexical children of this redeclaration only; `redecls` lists every
    /// redeclaration of the namespace (including this one) on the canonical
    /// entry.
    Namespace {
        children: Vec<DeclId>,
        redecls: Vec<DeclId>,
    },
    Record(RecordDecl),
    Function(FunctionDecl),
    Method(FunctionDecl),
    Constructor(FunctionDecl),
    Destructor(FunctionDecl),
    Enum {
        underlying: TypeId,
        constants: Vec<DeclId>,
    },
    EnumConstant {
        value: i64,
    },
    Field {
        ty: TypeId,
    },
    Variable {
        ty: TypeId,
        linkage: Linkage,
    },
    Param {
        ty: TypeId,
    },
    Typedef {
        underlying: TypeId,
        is_implicit: bool,
    },
    ClassTemplate {
        params: Vec<DeclId>,
        templated: DeclId,
        specializations: Vec<DeclId>,
    },
    ClassTemplatePartialSpecialization,
    TemplateTypeParam {
        index: u32,
        is_pack: bool,
    },
    TemplateNonTypeParam {
        ty: TypeId,
        is_pack: bool,
    },
    FunctionTemplate,
    TypeAliasTemplate,
    UsingDirective,
    UsingDecl,
    UsingShadow,
    AccessSpec,
    Friend,
    StaticAssert,
    IndirectField,
    UnresolvedUsingValue,
    Empty,
}

#[derive(Debug, Clone)]
pub struct CxxDecl {
    pub kind: CxxDeclKind,
    pub name: String,
    pub loc: SourceLocation,
    pub canonical: DeclId,
    pub parent: Option<DeclId>,
    pub access: Access,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_restrict: bool,
    pub is_volatile: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SugarKind {
    Elaborated,
    Decayed,
    Paren,
    Decltype,
    Auto,
    TypeOfExpr,
    SubstTemplateTypeParam,
}

#[derive(Debug, Clone)]
pub enum CxxTypeKind {
    Builtin(BuiltinKind),
    Pointer {
        pointee: TypeId,
    },
    LValueReference {
        pointee: TypeId,
    },
    RValueReference {
        pointee: TypeId,
    },
    /// struct/class/union type; which one is decided by the declaration.
    Record {
        decl: DeclId,
    },
    /// The implicit name of a class template inside its own body.
    InjectedClassName {
        decl: DeclId,
    },
    Enum {
        decl: DeclId,
    },
    Typedef {
        decl: DeclId,
    },
    ConstantArray {
        element: TypeId,
        length: u64,
    },
    IncompleteArray {
        element: TypeId,
    },
    DependentSizedArray {
        element: TypeId,
    },
    FunctionProto {
        result: TypeId,
        params: Vec<TypeId>,
    },
    FunctionNoProto {
        result: TypeId,
    },
    Vector {
        element: TypeId,
        count: u32,
    },
    /// Local qualifiers wrapped around an unqualified type.
    Qualified {
        underlying: TypeId,
        quals: Qualifiers,
    },
    /// Sugar over another type; interned under both keys.
    Sugar {
        kind: SugarKind,
        desugared: TypeId,
    },
    /// The `T` of `template<typename T>`.
    TemplateTypeParam {
        index: u32,
    },
    TemplateSpecialization {
        template: DeclId,
        args: Vec<TemplateArg>,
    },
    /// A dependent name such as `Q::type` where `Q` involves an
    /// unsubstituted template parameter. The qualifier is kept as the
    /// type-spec it was written with.
    DependentName {
        qualifier: TypeId,
        identifier: String,
    },
    MemberPointer,
    PackExpansion,
    UnaryTransform,
    DependentTemplateSpecialization,
}

#[derive(Debug, Clone)]
pub struct CxxType {
    pub kind: CxxTypeKind,
}

/// The whole parsed translation unit, flattened.
#[derive(Debug, Default)]
pub struct CxxAst {
    pub decls: Vec<CxxDecl>,
    pub types: Vec<CxxType>,
    pub files: Vec<PathBuf>,
    pub tu: DeclId,
    /// Declaration -> the type node declared by it (record, enum, typedef,
    /// template type parameter). Not every declaration has one.
    decl_types: HashMap<DeclId, TypeId>,
}

impl CxxAst {
    pub fn decl(&self, id: DeclId) -> &CxxDecl {
        &self.decls[id.0 as usize]
    }

    pub fn ty(&self, id: TypeId) -> &CxxType {
        &self.types[id.0 as usize]
    }

    pub fn file(&self, id: FileId) -> &Path {
        &self.files[id.0 as usize]
    }

    pub fn canonical(&self, id: DeclId) -> DeclId {
        self.decl(id).canonical
    }

    /// The type node a record/enum/typedef/template-parameter declares.
    pub fn type_of_decl(&self, id: DeclId) -> Option<TypeId> {
        self.decl_types.get(&self.canonical(id)).copied()
    }

    /// `a::b::c` name of a declaration, skipping unnamed scopes.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let mut segments = vec![];
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let decl = self.decl(cur);
            if !decl.name.is_empty() {
                segments.push(decl.name.clone());
            }
            cursor = decl.parent;
        }
        segments.reverse();
        segments.join("::")
    }

    /// All lexical children of a declaration context, namespaces merged
    /// across their redeclarations.
    pub fn context_children(&self, id: DeclId) -> Vec<DeclId> {
        match &self.decl(self.canonical(id)).kind {
            CxxDeclKind::TranslationUnit { children } => {
                // extern "C" { ... } contents live in the enclosing context
                let mut result = vec![];
                for &child in children {
                    match &self.decl(child).kind {
                        CxxDeclKind::LinkageSpec { children, .. } => {
                            result.extend(children.iter().copied());
                        }
                        _ => result.push(child),
                    }
                }
                result
            }
            CxxDeclKind::Namespace { redecls, .. } => redecls
                .iter()
                .flat_map(|&redecl| match &self.decl(redecl).kind {
                    CxxDeclKind::Namespace { children, .. } => children.clone(),
                    _ => vec![],
                })
                .collect(),
            CxxDeclKind::Record(record) => record.children.clone(),
            CxxDeclKind::Enum { constants, .. } => constants.clone(),
            CxxDeclKind::ClassTemplate { templated, .. } => self.context_children(*templated),
            _ => vec![],
        }
    }
}

/// Construction API used by the frontends and by tests. Parent/child links
/// and canonical pointers are maintained by the builder so hand-built ASTs
/// satisfy the same invariants a parser would.
#[derive(Debug)]
pub struct CxxAstBuilder {
    ast: CxxAst,
    builtin_cache: HashMap<BuiltinKind, TypeId>,
    next_order: u32,
}

impl Default for CxxAstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CxxAstBuilder {
    pub fn new() -> Self {
        let mut ast = CxxAst::default();
        ast.decls.push(CxxDecl {
            kind: CxxDeclKind::TranslationUnit { children: vec![] },
            name: String::new(),
            loc: SourceLocation::default(),
            canonical: DeclId(0),
            parent: None,
            access: Access::None,
        });
        ast.tu = DeclId(0);
        CxxAstBuilder {
            ast,
            builtin_cache: HashMap::new(),
            next_order: 0,
        }
    }

    pub fn tu(&self) -> DeclId {
        self.ast.tu
    }

    pub fn finish(self) -> CxxAst {
        self.ast
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> FileId {
        self.ast.files.push(path.into());
        FileId(self.ast.files.len() as u32 - 1)
    }

    pub fn loc(&mut self, file: FileId, line: u32, column: u32) -> SourceLocation {
        let tu_order = self.next_order;
        self.next_order += 1;
        SourceLocation {
            file: Some(file),
            line,
            column,
            tu_order,
        }
    }

    fn invalid_loc(&mut self) -> SourceLocation {
        let tu_order = self.next_order;
        self.next_order += 1;
        SourceLocation {
            file: None,
            line: 0,
            column: 0,
            tu_order,
        }
    }

    pub fn push_type(&mut self, kind: CxxTypeKind) -> TypeId {
        self.ast.types.push(CxxType { kind });
        TypeId(self.ast.types.len() as u32 - 1)
    }

    pub fn builtin(&mut self, kind: BuiltinKind) -> TypeId {
        if let Some(&id) = self.builtin_cache.get(&kind) {
            return id;
        }
        let id = self.push_type(CxxTypeKind::Builtin(kind));
        self.builtin_cache.insert(kind, id);
        id
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.push_type(CxxTypeKind::Pointer { pointee })
    }

    pub fn lvalue_ref_to(&mut self, pointee: TypeId) -> TypeId {
        self.push_type(CxxTypeKind::LValueReference { pointee })
    }

    pub fn const_of(&mut self, underlying: TypeId) -> TypeId {
        self.push_type(CxxTypeKind::Qualified {
            underlying,
            quals: Qualifiers {
                is_const: true,
                ..Qualifiers::default()
            },
        })
    }

    /// Pushes a declaration, wiring up `parent` but nothing else. Most
    /// callers want one of the typed helpers below instead.
    pub fn push_decl(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        kind: CxxDeclKind,
        loc: SourceLocation,
    ) -> DeclId {
        let id = DeclId(self.ast.decls.len() as u32);
        self.ast.decls.push(CxxDecl {
            kind,
            name: name.to_string(),
            loc,
            canonical: id,
            parent,
            access: Access::None,
        });
        id
    }

    fn attach(&mut self, parent: DeclId, child: DeclId) {
        match &mut self.ast.decls[parent.0 as usize].kind {
            CxxDeclKind::TranslationUnit { children }
            | CxxDeclKind::LinkageSpec { children, .. }
            | CxxDeclKind::Namespace { children, .. } => children.push(child),
            CxxDeclKind::Record(record) => record.children.push(child),
            other => panic!("cannot attach a child to {other:?}"),
        }
    }

    pub fn set_access(&mut self, decl: DeclId, access: Access) {
        self.ast.decls[decl.0 as usize].access = access;
    }

    /// Marks `redecl` as a later redeclaration of `canonical`.
    pub fn set_canonical(&mut self, redecl: DeclId, canonical: DeclId) {
        self.ast.decls[redecl.0 as usize].canonical = canonical;
    }

    pub fn namespace(&mut self, parent: DeclId, name: &str, loc: SourceLocation) -> DeclId {
        let id = self.push_decl(
            Some(parent),
            name,
            CxxDeclKind::Namespace {
                children: vec![],
                redecls: vec![],
            },
            loc,
        );
        // A namespace is one of its own redeclarations.
        if let CxxDeclKind::Namespace { redecls, .. } = &mut self.ast.decls[id.0 as usize].kind {
            redecls.push(id);
        }
        self.attach(parent, id);
        id
    }

    /// Adds a further redeclaration of an existing namespace.
    pub fn namespace_redecl(
        &mut self,
        parent: DeclId,
        canonical: DeclId,
        loc: SourceLocation,
    ) -> DeclId {
        let name = self.ast.decl(canonical).name.clone();
        let id = self.push_decl(
            Some(parent),
            &name,
            CxxDeclKind::Namespace {
                children: vec![],
                redecls: vec![],
            },
            loc,
        );
        self.set_canonical(id, canonical);
        if let CxxDeclKind::Namespace { redecls, .. } =
            &mut self.ast.decls[canonical.0 as usize].kind
        {
            redecls.push(id);
        }
        self.attach(parent, id);
        id
    }

    pub fn record(
        &mut self,
        parent: DeclId,
        name: &str,
        tag: RecordTag,
        is_cxx: bool,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(
            Some(parent),
            name,
            CxxDeclKind::Record(RecordDecl {
                tag,
                is_cxx,
                is_definition: true,
                is_dynamic: false,
                children: vec![],
                fields: vec![],
                methods: vec![],
                ctors: vec![],
                dtor: None,
                bases: vec![],
                specialization: None,
            }),
            loc,
        );
        self.attach(parent, id);
        let ty = self.push_type(CxxTypeKind::Record { decl: id });
        self.ast.decl_types.insert(id, ty);
        id
    }

    pub fn record_type(&mut self, decl: DeclId) -> TypeId {
        self.ast
            .type_of_decl(decl)
            .expect("record was created without a type node")
    }

    fn record_mut(&mut self, record: DeclId) -> &mut RecordDecl {
        match &mut self.ast.decls[record.0 as usize].kind {
            CxxDeclKind::Record(r) => r,
            other => panic!("expected a record, found {other:?}"),
        }
    }

    pub fn set_dynamic(&mut self, record: DeclId, is_dynamic: bool) {
        self.record_mut(record).is_dynamic = is_dynamic;
    }

    pub fn add_base(&mut self, record: DeclId, base_ty: TypeId, access: Access) {
        self.record_mut(record).bases.push(CxxBase {
            is_virtual: false,
            access,
            ty: base_ty,
        });
    }

    pub fn field(
        &mut self,
        record: DeclId,
        name: &str,
        ty: TypeId,
        access: Access,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(Some(record), name, CxxDeclKind::Field { ty }, loc);
        self.set_access(id, access);
        self.record_mut(record).fields.push(id);
        id
    }

    pub fn param(&mut self, owner: DeclId, name: &str, ty: TypeId) -> DeclId {
        let loc = self.invalid_loc();
        self.push_decl(Some(owner), name, CxxDeclKind::Param { ty }, loc)
    }

    fn plain_function(return_type: TypeId, linkage: Linkage) -> FunctionDecl {
        FunctionDecl {
            return_type,
            params: vec![],
            linkage,
            is_operator: false,
            is_deleted: false,
            is_virtual: false,
            is_static: false,
            is_const: false,
        }
    }

    pub fn function(
        &mut self,
        parent: DeclId,
        name: &str,
        return_type: TypeId,
        param_types: &[(&str, TypeId)],
        linkage: Linkage,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(
            Some(parent),
            name,
            CxxDeclKind::Function(Self::plain_function(return_type, linkage)),
            loc,
        );
        let params: Vec<DeclId> = param_types
            .iter()
            .map(|(pname, pty)| self.param(id, pname, *pty))
            .collect();
        if let CxxDeclKind::Function(f) = &mut self.ast.decls[id.0 as usize].kind {
            f.params = params;
        }
        self.attach(parent, id);
        id
    }

    pub fn method(
        &mut self,
        record: DeclId,
        name: &str,
        return_type: TypeId,
        param_types: &[(&str, TypeId)],
        is_virtual: bool,
        loc: SourceLocation,
    ) -> DeclId {
        let mut function = Self::plain_function(return_type, Linkage::Cxx);
        function.is_virtual = is_virtual;
        let id = self.push_decl(Some(record), name, CxxDeclKind::Method(function), loc);
        let params: Vec<DeclId> = param_types
            .iter()
            .map(|(pname, pty)| self.param(id, pname, *pty))
            .collect();
        if let CxxDeclKind::Method(f) = &mut self.ast.decls[id.0 as usize].kind {
            f.params = params;
        }
        self.record_mut(record).methods.push(id);
        if is_virtual {
            self.record_mut(record).is_dynamic = true;
        }
        id
    }

    pub fn method_mut(&mut self, method: DeclId) -> &mut FunctionDecl {
        match &mut self.ast.decls[method.0 as usize].kind {
            CxxDeclKind::Method(f)
            | CxxDeclKind::Function(f)
            | CxxDeclKind::Constructor(f)
            | CxxDeclKind::Destructor(f) => f,
            other => panic!("expected a function-like declaration, found {other:?}"),
        }
    }

    pub fn constructor(
        &mut self,
        record: DeclId,
        param_types: &[(&str, TypeId)],
        loc: SourceLocation,
    ) -> DeclId {
        let void = self.builtin(BuiltinKind::Void);
        let id = self.push_decl(
            Some(record),
            "",
            CxxDeclKind::Constructor(Self::plain_function(void, Linkage::Cxx)),
            loc,
        );
        let params: Vec<DeclId> = param_types
            .iter()
            .map(|(pname, pty)| self.param(id, pname, *pty))
            .collect();
        if let CxxDeclKind::Constructor(f) = &mut self.ast.decls[id.0 as usize].kind {
            f.params = params;
        }
        self.record_mut(record).ctors.push(id);
        id
    }

    pub fn destructor(&mut self, record: DeclId, loc: SourceLocation) -> DeclId {
        let void = self.builtin(BuiltinKind::Void);
        let id = self.push_decl(
            Some(record),
            "",
            CxxDeclKind::Destructor(Self::plain_function(void, Linkage::Cxx)),
            loc,
        );
        self.record_mut(record).dtor = Some(id);
        id
    }

    pub fn enumeration(
        &mut self,
        parent: DeclId,
        name: &str,
        underlying: TypeId,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(
            Some(parent),
            name,
            CxxDeclKind::Enum {
                underlying,
                constants: vec![],
            },
            loc,
        );
        self.attach(parent, id);
        let ty = self.push_type(CxxTypeKind::Enum { decl: id });
        self.ast.decl_types.insert(id, ty);
        id
    }

    pub fn enum_type(&mut self, decl: DeclId) -> TypeId {
        self.ast
            .type_of_decl(decl)
            .expect("enum was created without a type node")
    }

    pub fn enum_constant(
        &mut self,
        enumeration: DeclId,
        name: &str,
        value: i64,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(
            Some(enumeration),
            name,
            CxxDeclKind::EnumConstant { value },
            loc,
        );
        match &mut self.ast.decls[enumeration.0 as usize].kind {
            CxxDeclKind::Enum { constants, .. } => constants.push(id),
            other => panic!("expected an enum, found {other:?}"),
        }
        id
    }

    pub fn typedef(
        &mut self,
        parent: DeclId,
        name: &str,
        underlying: TypeId,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(
            Some(parent),
            name,
            CxxDeclKind::Typedef {
                underlying,
                is_implicit: false,
            },
            loc,
        );
        self.attach(parent, id);
        let ty = self.push_type(CxxTypeKind::Typedef { decl: id });
        self.ast.decl_types.insert(id, ty);
        id
    }

    pub fn typedef_type(&mut self, decl: DeclId) -> TypeId {
        self.ast
            .type_of_decl(decl)
            .expect("typedef was created without a type node")
    }

    pub fn variable(
        &mut self,
        parent: DeclId,
        name: &str,
        ty: TypeId,
        linkage: Linkage,
        loc: SourceLocation,
    ) -> DeclId {
        let id = self.push_decl(Some(parent), name, CxxDeclKind::Variable { ty, linkage }, loc);
        self.attach(parent, id);
        id
    }

    /// `template<typename ...> struct/class/union name { ... }`. Returns
    /// `(template, templated_record)`; parameters are created from the
    /// given names with `is_pack` flags.
    pub fn class_template(
        &mut self,
        parent: DeclId,
        name: &str,
        tag: RecordTag,
        params: &[(&str, bool)],
        loc: SourceLocation,
    ) -> (DeclId, DeclId) {
        let id = self.push_decl(
            Some(parent),
            name,
            CxxDeclKind::ClassTemplate {
                params: vec![],
                templated: DeclId(0),
                specializations: vec![],
            },
            loc,
        );
        self.attach(parent, id);

        let mut param_ids = vec![];
        for (index, (pname, is_pack)) in params.iter().enumerate() {
            let ploc = self.invalid_loc();
            let pid = self.push_decl(
                Some(id),
                pname,
                CxxDeclKind::TemplateTypeParam {
                    index: index as u32,
                    is_pack: *is_pack,
                },
                ploc,
            );
            let pty = self.push_type(CxxTypeKind::TemplateTypeParam {
                index: index as u32,
            });
            self.ast.decl_types.insert(pid, pty);
            param_ids.push(pid);
        }

        let rloc = self.invalid_loc();
        let templated = self.push_decl(
            Some(id),
            name,
            CxxDeclKind::Record(RecordDecl {
                tag,
                is_cxx: true,
                is_definition: true,
                is_dynamic: false,
                children: vec![],
                fields: vec![],
                methods: vec![],
                ctors: vec![],
                dtor: None,
                bases: vec![],
                specialization: None,
            }),
            rloc,
        );
        let injected = self.push_type(CxxTypeKind::InjectedClassName { decl: templated });
        self.ast.decl_types.insert(templated, injected);

        if let CxxDeclKind::ClassTemplate {
            params, templated: t, ..
        } = &mut self.ast.decls[id.0 as usize].kind
        {
            *params = param_ids;
            *t = templated;
        }
        (id, templated)
    }

    /// `template<> struct name<args> { ... }` for an existing template.
    pub fn explicit_specialization(
        &mut self,
        template: DeclId,
        args: Vec<TemplateArg>,
        loc: SourceLocation,
    ) -> DeclId {
        let (parent, name) = {
            let decl = self.ast.decl(template);
            (decl.parent.expect("template has no parent"), decl.name.clone())
        };
        let id = self.push_decl(
            Some(parent),
            &name,
            CxxDeclKind::Record(RecordDecl {
                tag: RecordTag::Struct,
                is_cxx: true,
                is_definition: true,
                is_dynamic: false,
                children: vec![],
                fields: vec![],
                methods: vec![],
                ctors: vec![],
                dtor: None,
                bases: vec![],
                specialization: Some(SpecializationInfo {
                    template,
                    args,
                    is_explicit: true,
                }),
            }),
            loc,
        );
        let ty = self.push_type(CxxTypeKind::Record { decl: id });
        self.ast.decl_types.insert(id, ty);
        if let CxxDeclKind::ClassTemplate { specializations, .. } =
            &mut self.ast.decls[template.0 as usize].kind
        {
            specializations.push(id);
        }
        id
    }

    pub fn linkage_spec(&mut self, parent: DeclId, linkage: Linkage) -> DeclId {
        let loc = self.invalid_loc();
        let id = self.push_decl(
            Some(parent),
            "",
            CxxDeclKind::LinkageSpec {
                linkage,
                children: vec![],
            },
            loc,
        );
        self.attach(parent, id);
        id
    }

    /// Registers a declared type for `decl`; the typed helpers do this
    /// automatically, frontends creating decls manually use this.
    pub fn set_decl_type(&mut self, decl: DeclId, ty: TypeId) {
        self.ast.decl_types.insert(decl, ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn qualified_names_skip_unnamed_scopes() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("test.hpp");
        let loc = b.loc(file, 1, 1);
        let ns = b.namespace(b.tu(), "outer", loc);
        let loc = b.loc(file, 2, 1);
        let record = b.record(ns, "Inner", RecordTag::Struct, true, loc);
        let ast = b.finish();
        assert_eq!(ast.qualified_name(record), "outer::Inner");
    }

    #[test]
    fn namespace_redecls_merge_context_children() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("test.hpp");
        let loc = b.loc(file, 1, 1);
        let first = b.namespace(b.tu(), "n", loc);
        let loc = b.loc(file, 5, 1);
        let second = b.namespace_redecl(b.tu(), first, loc);
        let loc = b.loc(file, 2, 1);
        let a = b.record(first, "A", RecordTag::Struct, true, loc);
        let loc = b.loc(file, 6, 1);
        let other = b.record(second, "B", RecordTag::Struct, true, loc);
        let ast = b.finish();

        assert_eq!(ast.canonical(second), first);
        assert_eq!(ast.context_children(first), vec![a, other]);
    }

    #[test]
    fn linkage_spec_contents_are_tu_context_children() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("test.h");
        let block = b.linkage_spec(b.tu(), Linkage::C);
        let int_ty = b.builtin(BuiltinKind::Int);
        let loc = b.loc(file, 1, 1);
        let f = b.function(block, "f", int_ty, &[], Linkage::C, loc);
        let ast = b.finish();
        assert!(ast.context_children(ast.tu).contains(&f));
    }
}
