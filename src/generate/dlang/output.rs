//! Serializes the package tree: one directory per package, one `.d` file
//! per module, a `module` header line, then one block per declaration in
//! the order the translator placed them.

use std::collections::BTreeSet;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use color_eyre::eyre::WrapErr;
use indent_write::io::IndentWriter;
use log::trace;

use crate::generate::dlang::decls::{
    DDecl, DDeclId, DType, DTypeId, DlangAst, DLanguage, MethodModifiers, Module, Package,
    PackageNode, PointerKind,
};

pub fn produce_output(dast: &DlangAst, root: &Package, out_dir: &Path) -> color_eyre::Result<()> {
    create_dir_all(out_dir)
        .wrap_err_with(|| format!("cannot create output directory {}", out_dir.display()))?;
    write_package(dast, root, out_dir, "")
}

fn write_package(
    dast: &DlangAst,
    package: &Package,
    dir: &Path,
    prefix: &str,
) -> color_eyre::Result<()> {
    for (name, child) in &package.children {
        let child_path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match child {
            PackageNode::Package(subpackage) => {
                let subdir = dir.join(name);
                create_dir_all(&subdir)
                    .wrap_err_with(|| format!("cannot create {}", subdir.display()))?;
                write_package(dast, subpackage, &subdir, &child_path)?;
            }
            PackageNode::Module(module) => {
                let file_path = dir.join(format!("{name}.d"));
                trace!("writing {}", file_path.display());
                let file = File::create(&file_path)
                    .wrap_err_with(|| format!("cannot create {}", file_path.display()))?;
                let mut out = BufWriter::new(file);
                write_module(&mut out, dast, module, &child_path)?;
            }
        }
    }
    Ok(())
}

/// Renders one module to a string; the emitter and the tests share this.
pub fn render_module(
    dast: &DlangAst,
    module: &Module,
    module_path: &str,
) -> color_eyre::Result<String> {
    let mut buffer = vec![];
    write_module(&mut buffer, dast, module, module_path)?;
    Ok(String::from_utf8(buffer).expect("emitted D source was not UTF-8"))
}

fn write_module(
    out: &mut dyn Write,
    dast: &DlangAst,
    module: &Module,
    module_path: &str,
) -> color_eyre::Result<()> {
    writeln!(out, "module {module_path};")?;

    let mut imports = BTreeSet::new();
    for &decl in &module.decls {
        collect_decl_imports(dast, decl, &mut imports);
    }
    if !imports.is_empty() {
        writeln!(out)?;
        for import in &imports {
            writeln!(out, "import {import};")?;
        }
    }

    for &decl in &module.decls {
        writeln!(out)?;
        write_decl(out, dast, decl)?;
    }
    Ok(())
}

fn write_decl(out: &mut dyn Write, dast: &DlangAst, id: DDeclId) -> color_eyre::Result<()> {
    match dast.decl(id) {
        DDecl::Function(function) => {
            let linkage = match function.linkage.language {
                DLanguage::C => "extern(C)".to_string(),
                DLanguage::Cpp if function.linkage.namespace_path.is_empty() => {
                    "extern(C++)".to_string()
                }
                DLanguage::Cpp => format!("extern(C++, {})", function.linkage.namespace_path),
            };
            writeln!(
                out,
                "{linkage} {} {}({});",
                type_to_string(dast, function.return_type),
                function.name,
                arguments_to_string(dast, &function.arguments),
            )?;
        }
        DDecl::Struct {
            name,
            template_params,
            members,
        } => {
            if template_params.is_empty() {
                writeln!(out, "struct {name}")?;
            } else {
                writeln!(out, "struct {name}({})", template_params.join(", "))?;
            }
            write_body(out, dast, members)?;
        }
        DDecl::Interface { name, methods } => {
            writeln!(out, "interface {name}")?;
            write_body(out, dast, methods)?;
        }
        DDecl::Class { name, members } => {
            writeln!(out, "class {name}")?;
            write_body(out, dast, members)?;
        }
        DDecl::TypeAlias { name, target } => {
            writeln!(out, "alias {name} = {};", type_to_string(dast, *target))?;
        }
        DDecl::Enum {
            name,
            base,
            constants,
        } => {
            match base {
                Some(base) => writeln!(out, "enum {name} : {}", type_to_string(dast, *base))?,
                None => writeln!(out, "enum {name}")?,
            }
            writeln!(out, "{{")?;
            let mut body = IndentWriter::new("    ", &mut *out);
            for &constant in constants {
                if let DDecl::EnumConstant { name, value } = dast.decl(constant) {
                    writeln!(body, "{name} = {value},")?;
                }
            }
            writeln!(out, "}}")?;
        }
        DDecl::EnumConstant { name, value } => {
            writeln!(out, "{name} = {value},")?;
        }
        DDecl::Field {
            name,
            ty,
            visibility,
        } => {
            match visibility {
                Some(visibility) => writeln!(
                    out,
                    "{} {} {name};",
                    visibility.keyword(),
                    type_to_string(dast, *ty)
                )?,
                None => writeln!(out, "{} {name};", type_to_string(dast, *ty))?,
            };
        }
        DDecl::Variable { name, ty } => {
            writeln!(out, "extern __gshared {} {name};", type_to_string(dast, *ty))?;
        }
        DDecl::Argument { name, ty } => {
            if name.is_empty() {
                writeln!(out, "{}", type_to_string(dast, *ty))?;
            } else {
                writeln!(out, "{} {name}", type_to_string(dast, *ty))?;
            }
        }
        DDecl::Union { name, members } => {
            writeln!(out, "union {name}")?;
            write_body(out, dast, members)?;
        }
        DDecl::Method(method) => {
            let mut prefix = String::new();
            if method.modifiers.contains(MethodModifiers::STATIC) {
                prefix.push_str("static ");
            }
            if method.modifiers.contains(MethodModifiers::FINAL) {
                prefix.push_str("final ");
            }
            let suffix = if method.modifiers.contains(MethodModifiers::CONST) {
                " const"
            } else {
                ""
            };
            writeln!(
                out,
                "{prefix}{} {}({}){suffix};",
                type_to_string(dast, method.return_type),
                method.name,
                arguments_to_string(dast, &method.arguments),
            )?;
        }
        DDecl::Constructor { arguments } => {
            writeln!(out, "this({});", arguments_to_string(dast, arguments))?;
        }
        DDecl::Destructor => {
            writeln!(out, "~this();")?;
        }
    }
    Ok(())
}

fn write_body(out: &mut dyn Write, dast: &DlangAst, members: &[DDeclId]) -> color_eyre::Result<()> {
    writeln!(out, "{{")?;
    {
        let mut body = IndentWriter::new("    ", &mut *out);
        for &member in members {
            write_decl(&mut body, dast, member)?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

fn arguments_to_string(dast: &DlangAst, arguments: &[DDeclId]) -> String {
    arguments
        .iter()
        .map(|&argument| match dast.decl(argument) {
            DDecl::Argument { name, ty } if name.is_empty() => type_to_string(dast, *ty),
            DDecl::Argument { name, ty } => format!("{} {name}", type_to_string(dast, *ty)),
            other => other.name().to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn type_to_string(dast: &DlangAst, id: DTypeId) -> String {
    match dast.ty(id) {
        DType::Named { name, .. } => name.clone(),
        DType::Pointer { target, kind } => match kind {
            PointerKind::Pointer => format!("{}*", type_to_string(dast, *target)),
            PointerKind::Reference => format!("ref {}", type_to_string(dast, *target)),
        },
        DType::Const { target } => format!("const({})", type_to_string(dast, *target)),
        DType::DeclRef { decl } => dast.decl(*decl).name().to_string(),
    }
}

fn collect_decl_imports(dast: &DlangAst, id: DDeclId, imports: &mut BTreeSet<String>) {
    match dast.decl(id) {
        DDecl::Function(function) => {
            collect_type_imports(dast, function.return_type, imports);
            for &argument in &function.arguments {
                collect_decl_imports(dast, argument, imports);
            }
        }
        DDecl::Struct { members, .. }
        | DDecl::Class { members, .. }
        | DDecl::Union { members, .. } => {
            for &member in members {
                collect_decl_imports(dast, member, imports);
            }
        }
        DDecl::Interface { methods, .. } => {
            for &method in methods {
                collect_decl_imports(dast, method, imports);
            }
        }
        DDecl::TypeAlias { target, .. } => collect_type_imports(dast, *target, imports),
        DDecl::Enum { base, .. } => {
            if let Some(base) = base {
                collect_type_imports(dast, *base, imports);
            }
        }
        DDecl::Field { ty, .. } | DDecl::Variable { ty, .. } | DDecl::Argument { ty, .. } => {
            collect_type_imports(dast, *ty, imports);
        }
        DDecl::Method(method) => {
            collect_type_imports(dast, method.return_type, imports);
            for &argument in &method.arguments {
                collect_decl_imports(dast, argument, imports);
            }
        }
        DDecl::Constructor { arguments } => {
            for &argument in arguments {
                collect_decl_imports(dast, argument, imports);
            }
        }
        DDecl::EnumConstant { .. } | DDecl::Destructor => {}
    }
}

fn collect_type_imports(dast: &DlangAst, id: DTypeId, imports: &mut BTreeSet<String>) {
    match dast.ty(id) {
        DType::Named { module, .. } => {
            if !module.is_empty() {
                imports.insert(module.clone());
            }
        }
        DType::Pointer { target, .. } | DType::Const { target } => {
            collect_type_imports(dast, *target, imports);
        }
        DType::DeclRef { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::dlang::decls::{DFunction, DLinkage, DMethod, DVisibility};
    use pretty_assertions::assert_eq;

    #[test]
    fn struct_module_renders_with_header_and_body() {
        let mut dast = DlangAst::default();
        let int_ty = dast.push_type(DType::Named {
            name: "int".to_string(),
            module: String::new(),
        });
        let field = dast.push_decl(DDecl::Field {
            name: "x".to_string(),
            ty: int_ty,
            visibility: None,
        });
        let record = dast.push_decl(DDecl::Struct {
            name: "S".to_string(),
            template_params: vec![],
            members: vec![field],
        });
        let mut module = Module::new("unknown");
        module.insert(record);

        let text = render_module(&dast, &module, "unknown").unwrap();
        assert_eq!(
            text,
            "module unknown;\n\nstruct S\n{\n    int x;\n}\n"
        );
    }

    #[test]
    fn functions_render_their_linkage_and_interfaces_their_methods() {
        let mut dast = DlangAst::default();
        let void_ty = dast.push_type(DType::Named {
            name: "void".to_string(),
            module: String::new(),
        });
        let int_ty = dast.push_type(DType::Named {
            name: "int".to_string(),
            module: String::new(),
        });
        let argument = dast.push_decl(DDecl::Argument {
            name: "count".to_string(),
            ty: int_ty,
        });
        let function = dast.push_decl(DDecl::Function(DFunction {
            name: "poke".to_string(),
            linkage: DLinkage {
                language: DLanguage::Cpp,
                namespace_path: "n".to_string(),
            },
            return_type: void_ty,
            arguments: vec![argument],
        }));
        let method = dast.push_decl(DDecl::Method(DMethod {
            name: "f".to_string(),
            return_type: void_ty,
            arguments: vec![],
            modifiers: MethodModifiers::VIRTUAL,
        }));
        let interface = dast.push_decl(DDecl::Interface {
            name: "I".to_string(),
            methods: vec![method],
        });
        let mut module = Module::new("api");
        module.insert(function);
        module.insert(interface);

        let text = render_module(&dast, &module, "pkg.api").unwrap();
        assert_eq!(
            text,
            "module pkg.api;\n\n\
             extern(C++, n) void poke(int count);\n\n\
             interface I\n{\n    void f();\n}\n"
        );
    }

    #[test]
    fn imported_replacement_modules_produce_import_lines() {
        let mut dast = DlangAst::default();
        let long_ty = dast.push_type(DType::Named {
            name: "c_long".to_string(),
            module: "core.stdc.config".to_string(),
        });
        let alias = dast.push_decl(DDecl::TypeAlias {
            name: "MyLong".to_string(),
            target: long_ty,
        });
        let mut module = Module::new("m");
        module.insert(alias);

        let text = render_module(&dast, &module, "m").unwrap();
        assert_eq!(
            text,
            "module m;\n\nimport core.stdc.config;\n\nalias MyLong = c_long;\n"
        );
    }

    #[test]
    fn fields_carry_their_visibility_keyword() {
        let mut dast = DlangAst::default();
        let int_ty = dast.push_type(DType::Named {
            name: "int".to_string(),
            module: String::new(),
        });
        let field = dast.push_decl(DDecl::Field {
            name: "hidden".to_string(),
            ty: int_ty,
            visibility: Some(DVisibility::Private),
        });
        let record = dast.push_decl(DDecl::Union {
            name: "U".to_string(),
            members: vec![field],
        });
        let mut module = Module::new("u");
        module.insert(record);

        let text = render_module(&dast, &module, "u").unwrap();
        assert_eq!(
            text,
            "module u;\n\nunion U\n{\n    private int hidden;\n}\n"
        );
    }

    #[test]
    fn output_tree_maps_packages_to_directories() {
        let mut dast = DlangAst::default();
        let record = dast.push_decl(DDecl::Struct {
            name: "A".to_string(),
            template_params: vec![],
            members: vec![],
        });
        let mut root = Package::default();
        root.get_or_create_module("x.y").unwrap().insert(record);

        let dir = std::env::temp_dir().join(format!("dbindgen-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        produce_output(&dast, &root, &dir).unwrap();
        let emitted = std::fs::read_to_string(dir.join("x").join("y.d")).unwrap();
        assert!(emitted.starts_with("module x.y;\n"));
        assert!(emitted.contains("struct A"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
