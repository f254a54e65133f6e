//! The D declaration model the translator builds and the package tree the
//! emitter walks. Like the wrapped tables, everything lives in one arena
//! and cross-references are ids.

use std::collections::BTreeMap;

use bitflags::bitflags;
use color_eyre::eyre::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DDeclId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DTypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DVisibility {
    Private,
    Package,
    Protected,
    Public,
    Export,
}

impl DVisibility {
    pub fn keyword(self) -> &'static str {
        match self {
            DVisibility::Private => "private",
            DVisibility::Package => "package",
            DVisibility::Protected => "protected",
            DVisibility::Public => "public",
            DVisibility::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DLanguage {
    C,
    Cpp,
}

/// `extern(C)` or `extern(C++, a.b)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DLinkage {
    pub language: DLanguage,
    pub namespace_path: String,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodModifiers: u32 {
        const STATIC = 0b0001;
        const VIRTUAL = 0b0010;
        const CONST = 0b0100;
        const FINAL = 0b1000;
    }
}

#[derive(Debug, Clone)]
pub struct DFunction {
    pub name: String,
    pub linkage: DLinkage,
    pub return_type: DTypeId,
    pub arguments: Vec<DDeclId>,
}

#[derive(Debug, Clone)]
pub struct DMethod {
    pub name: String,
    pub return_type: DTypeId,
    pub arguments: Vec<DDeclId>,
    pub modifiers: MethodModifiers,
}

#[derive(Debug, Clone)]
pub enum DDecl {
    Function(DFunction),
    Struct {
        name: String,
        template_params: Vec<String>,
        members: Vec<DDeclId>,
    },
    Interface {
        name: String,
        methods: Vec<DDeclId>,
    },
    Class {
        name: String,
        members: Vec<DDeclId>,
    },
    TypeAlias {
        name: String,
        target: DTypeId,
    },
    Enum {
        name: String,
        base: Option<DTypeId>,
        constants: Vec<DDeclId>,
    },
    EnumConstant {
        name: String,
        value: i64,
    },
    Field {
        name: String,
        ty: DTypeId,
        visibility: Option<DVisibility>,
    },
    Variable {
        name: String,
        ty: DTypeId,
    },
    Argument {
        name: String,
        ty: DTypeId,
    },
    Union {
        name: String,
        members: Vec<DDeclId>,
    },
    Method(DMethod),
    Constructor {
        arguments: Vec<DDeclId>,
    },
    Destructor,
}

impl DDecl {
    /// The name a reference to this declaration is spelled with.
    pub fn name(&self) -> &str {
        match self {
            DDecl::Function(function) => &function.name,
            DDecl::Struct { name, .. }
            | DDecl::Interface { name, .. }
            | DDecl::Class { name, .. }
            | DDecl::TypeAlias { name, .. }
            | DDecl::Enum { name, .. }
            | DDecl::EnumConstant { name, .. }
            | DDecl::Field { name, .. }
            | DDecl::Variable { name, .. }
            | DDecl::Argument { name, .. }
            | DDecl::Union { name, .. } => name,
            DDecl::Method(method) => &method.name,
            DDecl::Constructor { .. } => "this",
            DDecl::Destructor => "~this",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Pointer,
    Reference,
}

#[derive(Debug, Clone)]
pub enum DType {
    /// A type referred to by name, possibly imported from a module.
    Named { name: String, module: String },
    Pointer { target: DTypeId, kind: PointerKind },
    Const { target: DTypeId },
    /// A type defined by a translated declaration.
    DeclRef { decl: DDeclId },
}

#[derive(Debug, Default)]
pub struct DlangAst {
    decls: Vec<DDecl>,
    types: Vec<DType>,
}

impl DlangAst {
    pub fn push_decl(&mut self, decl: DDecl) -> DDeclId {
        self.decls.push(decl);
        DDeclId(self.decls.len() as u32 - 1)
    }

    pub fn push_type(&mut self, ty: DType) -> DTypeId {
        self.types.push(ty);
        DTypeId(self.types.len() as u32 - 1)
    }

    pub fn decl(&self, id: DDeclId) -> &DDecl {
        &self.decls[id.0 as usize]
    }

    pub fn decl_mut(&mut self, id: DDeclId) -> &mut DDecl {
        &mut self.decls[id.0 as usize]
    }

    pub fn ty(&self, id: DTypeId) -> &DType {
        &self.types[id.0 as usize]
    }
}

#[derive(Debug)]
pub enum PackageNode {
    Package(Package),
    Module(Module),
}

/// A directory of the output tree.
#[derive(Debug, Default)]
pub struct Package {
    pub name: String,
    pub children: BTreeMap<String, PackageNode>,
}

/// A single emitted file: an ordered list of declarations.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub decls: Vec<DDeclId>,
}

impl Module {
    pub fn new(name: &str) -> Module {
        Module {
            name: name.to_string(),
            decls: vec![],
        }
    }

    pub fn insert(&mut self, decl: DDeclId) {
        self.decls.push(decl);
    }
}

impl Package {
    pub fn new(name: &str) -> Package {
        Package {
            name: name.to_string(),
            children: BTreeMap::new(),
        }
    }

    /// Walks a dotted module path, creating intermediate packages. Fails
    /// when a path component already exists with the other variant.
    pub fn get_or_create_module(&mut self, path: &str) -> color_eyre::Result<&mut Module> {
        let (first, rest) = match path.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };
        if first.is_empty() {
            bail!("empty component in module path");
        }

        let node = self
            .children
            .entry(first.to_string())
            .or_insert_with(|| match rest {
                Some(_) => PackageNode::Package(Package::new(first)),
                None => PackageNode::Module(Module::new(first)),
            });
        match (node, rest) {
            (PackageNode::Package(package), Some(rest)) => package.get_or_create_module(rest),
            (PackageNode::Module(module), None) => Ok(module),
            (PackageNode::Package(_), None) => {
                bail!("`{first}` already names a package, expected a module")
            }
            (PackageNode::Module(_), Some(_)) => {
                bail!("`{first}` already names a module, expected a package")
            }
        }
    }

    pub fn find_module(&self, path: &str) -> Option<&Module> {
        let (first, rest) = match path.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };
        match (self.children.get(first), rest) {
            (Some(PackageNode::Package(package)), Some(rest)) => package.find_module(rest),
            (Some(PackageNode::Module(module)), None) => Some(module),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn intermediate_packages_are_created_on_demand() {
        let mut root = Package::default();
        root.get_or_create_module("a.b.c").unwrap();
        let module = root.find_module("a.b.c").unwrap();
        assert_eq!(module.name, "c");
        assert!(matches!(
            root.children.get("a"),
            Some(PackageNode::Package(_))
        ));
    }

    #[test]
    fn repeated_lookup_returns_the_same_module() {
        let mut root = Package::default();
        let mut dast = DlangAst::default();
        let decl = dast.push_decl(DDecl::Destructor);
        root.get_or_create_module("m").unwrap().insert(decl);
        root.get_or_create_module("m").unwrap();
        assert_eq!(root.find_module("m").unwrap().decls.len(), 1);
    }

    #[test]
    fn module_and_package_names_cannot_collide() {
        let mut root = Package::default();
        root.get_or_create_module("a.b").unwrap();
        // `a` is a package, not a module
        assert!(root.get_or_create_module("a").is_err());
        // `a.b` is a module, not a package
        assert!(root.get_or_create_module("a.b.c").is_err());
    }
}
