//! Resolution of dependent names (`Q::type` where `Q` mentions a template).
//! Walks the qualifier to its declaration and searches that context, then
//! its base classes depth-first. First match wins; C++ visibility rules and
//! overload resolution are deliberately not honored here.

use log::warn;

use crate::cxx::{CxxAst, CxxDeclKind, DeclId, TypeId};
use crate::generate::context::BindingContext;

/// Resolves `qualifier::identifier` to the named type, or `None` with a
/// diagnostic when the name cannot be found.
pub fn resolve_dependent(
    ctx: &BindingContext,
    qualifier: TypeId,
    identifier: &str,
) -> Option<TypeId> {
    let ast = ctx.ast;
    let Some(context_decl) = qualifier_declaration(ast, qualifier) else {
        warn!("cannot resolve dependent name `{identifier}`: unsupported qualifier");
        return None;
    };
    let result = lookup_in_declaration(ast, context_decl, identifier);
    if result.is_none() {
        warn!(
            "could not resolve dependent name `{identifier}` in `{}`",
            ast.qualified_name(context_decl)
        );
    }
    result
}

/// The declaration a qualifier type refers to. Template specializations
/// prefer a matching full specialization and fall back to the generic
/// templated declaration.
fn qualifier_declaration(ast: &CxxAst, qualifier: TypeId) -> Option<DeclId> {
    use crate::cxx::CxxTypeKind as K;
    match &ast.ty(qualifier).kind {
        K::Record { decl } | K::InjectedClassName { decl } | K::Enum { decl } => Some(*decl),
        K::Typedef { decl } => match &ast.decl(ast.canonical(*decl)).kind {
            CxxDeclKind::Typedef { underlying, .. } => qualifier_declaration(ast, *underlying),
            _ => None,
        },
        K::Sugar { desugared, .. } => qualifier_declaration(ast, *desugared),
        K::Qualified { underlying, .. } => qualifier_declaration(ast, *underlying),
        K::TemplateSpecialization { template, args } => {
            match &ast.decl(ast.canonical(*template)).kind {
                CxxDeclKind::ClassTemplate {
                    templated,
                    specializations,
                    ..
                } => {
                    let matching = specializations.iter().find(|&&spec| {
                        match &ast.decl(spec).kind {
                            CxxDeclKind::Record(record) => record
                                .specialization
                                .as_ref()
                                .is_some_and(|info| info.args == *args),
                            _ => false,
                        }
                    });
                    // An uninstantiated argument list means the arguments
                    // are unsubstituted parameters; use the generic body.
                    Some(matching.copied().unwrap_or(*templated))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn lookup_in_declaration(ast: &CxxAst, decl: DeclId, identifier: &str) -> Option<TypeId> {
    for child in ast.context_children(decl) {
        let child_decl = ast.decl(child);
        if child_decl.name != identifier {
            continue;
        }
        match &child_decl.kind {
            CxxDeclKind::Typedef { underlying, .. } => return Some(*underlying),
            CxxDeclKind::Record(_) | CxxDeclKind::Enum { .. } => {
                return ast.type_of_decl(child);
            }
            _ => continue,
        }
    }

    // transitively search base classes, depth-first, left to right
    if let CxxDeclKind::Record(record) = &ast.decl(ast.canonical(decl)).kind {
        for base in &record.bases {
            if let Some(base_decl) = qualifier_declaration(ast, base.ty) {
                if let Some(found) = lookup_in_declaration(ast, base_decl, identifier) {
                    return Some(found);
                }
            }
        }
    }
    None
}
