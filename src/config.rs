//! JSON configuration: `clang_args` for the frontend and
//! `binding_attributes` applied onto wrapped declarations and types.
//! Unknown keys anywhere in the attribute grammar are hard errors; unknown
//! strategy names are ignored for forward compatibility.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use color_eyre::eyre::{bail, eyre, WrapErr};
use log::{debug, warn};
use serde::Deserialize;

use crate::cxx::{CxxAst, DeclId};
use crate::generate::context::BindingContext;
use crate::generate::decl::{DeclarationAttributes, Visibility};
use crate::generate::ty::{Strategy, TypeAttributes};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub clang_args: Vec<String>,
    #[serde(default)]
    pub binding_attributes: BTreeMap<String, AttributeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeEntry {
    /// Integer-encoded boolean.
    pub bound: Option<i64>,
    pub target_module: Option<String>,
    pub visibility: Option<String>,
    pub remove_prefix: Option<String>,
    pub strategy: Option<StrategyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyEntry {
    pub name: String,
    pub d_decl: Option<String>,
}

pub fn parse_config(text: &str) -> color_eyre::Result<ConfigFile> {
    serde_json::from_str(text).wrap_err("malformed configuration")
}

pub fn load_config_file(path: &Path) -> color_eyre::Result<ConfigFile> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read configuration file {}", path.display()))?;
    parse_config(&text).wrap_err_with(|| format!("in configuration file {}", path.display()))
}

/// Arguments destined for the external parser, concatenated left to right.
pub fn collect_clang_args(files: &[ConfigFile]) -> Vec<String> {
    files
        .iter()
        .flat_map(|file| file.clang_args.iter().cloned())
        .collect()
}

/// Applies every file's `binding_attributes`, left to right; later values
/// overwrite earlier ones. Names that match nothing only warn.
pub fn apply_configuration(
    ctx: &mut BindingContext,
    files: &[ConfigFile],
) -> color_eyre::Result<()> {
    for file in files {
        for (name, entry) in &file.binding_attributes {
            let (decl_attributes, type_attributes) = parse_attribute_entry(entry)
                .wrap_err_with(|| format!("in attributes for `{name}`"))?;
            apply_to_name(ctx, name, &decl_attributes, &type_attributes)?;
        }
    }
    Ok(())
}

fn parse_attribute_entry(
    entry: &AttributeEntry,
) -> color_eyre::Result<(DeclarationAttributes, TypeAttributes)> {
    let mut decl_attributes = DeclarationAttributes {
        bound: entry.bound.map(|value| value != 0),
        target_module: entry.target_module.clone(),
        remove_prefix: entry.remove_prefix.clone(),
        ..DeclarationAttributes::default()
    };
    if let Some(visibility) = &entry.visibility {
        decl_attributes.visibility = Some(parse_visibility(visibility)?);
    }

    let type_attributes = TypeAttributes {
        strategy: entry
            .strategy
            .as_ref()
            .map(parse_strategy)
            .transpose()?
            .flatten(),
        // module hint for builtins replaced as imports
        target_module: entry.target_module.clone(),
    };
    Ok((decl_attributes, type_attributes))
}

fn parse_visibility(text: &str) -> color_eyre::Result<Visibility> {
    match text.to_lowercase().as_str() {
        "private" => Ok(Visibility::Private),
        "package" => Ok(Visibility::Package),
        "protected" => Ok(Visibility::Protected),
        "public" => Ok(Visibility::Public),
        "export" => Ok(Visibility::Export),
        other => Err(eyre!("unknown visibility \"{other}\"")),
    }
}

fn parse_strategy(entry: &StrategyEntry) -> color_eyre::Result<Option<Strategy>> {
    match entry.name.as_str() {
        "replace" => {
            let replacement = entry.d_decl.clone().ok_or_else(|| {
                eyre!("expected a \"d_decl\" entry for the replace translation strategy")
            })?;
            Ok(Some(Strategy::Replace(replacement)))
        }
        "struct" => Ok(Some(Strategy::Struct)),
        "interface" => Ok(Some(Strategy::Interface)),
        "class" => Ok(Some(Strategy::Class)),
        "opaque_class" => Ok(Some(Strategy::OpaqueClass)),
        other => {
            debug!("ignoring unknown strategy name \"{other}\"");
            Ok(None)
        }
    }
}

fn apply_to_name(
    ctx: &mut BindingContext,
    name: &str,
    decl_attributes: &DeclarationAttributes,
    type_attributes: &TypeAttributes,
) -> color_eyre::Result<()> {
    let matches = lookup_decl_name(ctx.ast, name)?;
    if !matches.is_empty() {
        for decl in matches {
            let Some(wrapped) = ctx.lookup_decl(decl) else {
                warn!("could not find declaration for {name}");
                continue;
            };
            if !ctx.decl(wrapped).is_wrappable {
                warn!("configuration names `{name}`, which cannot be wrapped");
            }
            decl_attributes.apply_to(ctx.decl_mut(wrapped));
            if ctx.decl(wrapped).is_wrappable {
                if let Some(declared_type) = ctx.ast.type_of_decl(decl) {
                    let wrapped_ty = ctx.intern_type(declared_type);
                    type_attributes.apply_to(ctx.ty_mut(wrapped_ty));
                }
            }
        }
        return Ok(());
    }

    let by_name = ctx.types_by_name(name).to_vec();
    if by_name.is_empty() {
        warn!("type {name} does not appear in the C++ source");
        return Ok(());
    }
    for wrapped_ty in by_name {
        type_attributes.apply_to(ctx.ty_mut(wrapped_ty));
    }
    Ok(())
}

/// Resolves `a::b::c` starting at the translation unit, descending one
/// declaration context per segment.
fn lookup_decl_name(ast: &CxxAst, name: &str) -> color_eyre::Result<Vec<DeclId>> {
    let mut segments = name.split("::");
    let first = segments.next().unwrap_or(name);
    let mut current = lookup_in_context(ast, ast.tu, first);
    for segment in segments {
        if current.is_empty() {
            return Ok(vec![]);
        }
        if current.len() > 1 {
            bail!("found more than one declaration on the path while resolving `{name}`");
        }
        current = lookup_in_context(ast, current[0], segment);
    }
    Ok(current)
}

fn lookup_in_context(ast: &CxxAst, context: DeclId, name: &str) -> Vec<DeclId> {
    ast.context_children(context)
        .into_iter()
        .filter(|&child| ast.decl(child).name == name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cxx::{BuiltinKind, CxxAstBuilder, RecordTag};
    use crate::generate::walker;
    use pretty_assertions::assert_eq;

    fn small_ast() -> (crate::cxx::CxxAst, DeclId, crate::cxx::TypeId) {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("n.hpp");
        let loc = b.loc(file, 1, 1);
        let ns = b.namespace(b.tu(), "n", loc);
        let loc = b.loc(file, 2, 1);
        let record = b.record(ns, "A", RecordTag::Struct, true, loc);
        let ty = b.record_type(record);
        (b.finish(), record, ty)
    }

    #[test]
    fn unknown_top_level_key_is_an_error() {
        assert!(parse_config(r#"{"bogus": 1}"#).is_err());
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let text = r#"{"binding_attributes": {"n::A": {"frobnicate": 1}}}"#;
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn clang_args_pass_through() {
        let config = parse_config(r#"{"clang_args": ["-std=c++11", "-I/x"]}"#).unwrap();
        assert_eq!(
            collect_clang_args(&[config]),
            vec!["-std=c++11".to_string(), "-I/x".to_string()]
        );
    }

    #[test]
    fn attributes_reach_the_declaration_and_its_type() {
        let (ast, record, ty) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);

        let config = parse_config(
            r#"{"binding_attributes": {"n::A": {
                "bound": 1,
                "target_module": "x.y",
                "visibility": "Public",
                "remove_prefix": "A_",
                "strategy": {"name": "interface"}
            }}}"#,
        )
        .unwrap();
        apply_configuration(&mut ctx, &[config]).unwrap();

        let w = ctx.lookup_decl(record).unwrap();
        assert!(ctx.decl(w).should_emit);
        assert_eq!(ctx.decl(w).target_module, "x.y");
        assert_eq!(ctx.decl(w).visibility, Visibility::Public);
        assert_eq!(ctx.decl(w).remove_prefix, "A_");

        let wt = ctx.lookup_type(ty).unwrap();
        assert_eq!(ctx.ty(wt).strategy, Some(Strategy::Interface));
        assert_eq!(ctx.ty(wt).target_module, "x.y");
    }

    #[test]
    fn applying_the_same_file_twice_is_idempotent() {
        let (ast, record, _) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);

        let text = r#"{"binding_attributes": {"n::A": {"bound": 1, "target_module": "m"}}}"#;
        let once = parse_config(text).unwrap();
        let twice = parse_config(text).unwrap();
        apply_configuration(&mut ctx, &[once]).unwrap();
        let w = ctx.lookup_decl(record).unwrap();
        let after_once = ctx.decl(w).clone();
        apply_configuration(&mut ctx, &[twice]).unwrap();
        assert_eq!(ctx.decl(w).should_emit, after_once.should_emit);
        assert_eq!(ctx.decl(w).target_module, after_once.target_module);
    }

    #[test]
    fn later_files_overwrite_earlier_ones() {
        let (ast, record, _) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);

        let first = parse_config(r#"{"binding_attributes": {"n::A": {"target_module": "one"}}}"#)
            .unwrap();
        let second = parse_config(r#"{"binding_attributes": {"n::A": {"target_module": "two"}}}"#)
            .unwrap();
        apply_configuration(&mut ctx, &[first, second]).unwrap();
        let w = ctx.lookup_decl(record).unwrap();
        assert_eq!(ctx.decl(w).target_module, "two");
    }

    #[test]
    fn unknown_visibility_aborts() {
        let (ast, _, _) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let config =
            parse_config(r#"{"binding_attributes": {"n::A": {"visibility": "sideways"}}}"#)
                .unwrap();
        assert!(apply_configuration(&mut ctx, &[config]).is_err());
    }

    #[test]
    fn replace_strategy_requires_d_decl() {
        let (ast, _, _) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let config =
            parse_config(r#"{"binding_attributes": {"n::A": {"strategy": {"name": "replace"}}}}"#)
                .unwrap();
        assert!(apply_configuration(&mut ctx, &[config]).is_err());
    }

    #[test]
    fn unknown_strategy_name_is_silently_ignored() {
        let (ast, _, ty) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let config = parse_config(
            r#"{"binding_attributes": {"n::A": {"strategy": {"name": "hologram"}}}}"#,
        )
        .unwrap();
        apply_configuration(&mut ctx, &[config]).unwrap();
        let wt = ctx.lookup_type(ty).unwrap();
        assert_eq!(ctx.ty(wt).strategy, None);
    }

    #[test]
    fn names_matching_nothing_only_warn() {
        let (ast, _, _) = small_ast();
        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let config =
            parse_config(r#"{"binding_attributes": {"no::such::thing": {"bound": 1}}}"#).unwrap();
        assert!(apply_configuration(&mut ctx, &[config]).is_ok());
    }

    #[test]
    fn builtin_replacement_names_hit_the_type_index() {
        let mut b = CxxAstBuilder::new();
        let int_ty = b.builtin(BuiltinKind::Int);
        let ast = b.finish();
        let mut ctx = BindingContext::new(&ast);
        let wt = ctx.intern_type(int_ty);

        let config = parse_config(
            r#"{"binding_attributes": {"int": {"target_module": "my.ints",
                "strategy": {"name": "replace", "d_decl": "MyInt"}}}}"#,
        )
        .unwrap();
        apply_configuration(&mut ctx, &[config]).unwrap();
        assert_eq!(ctx.ty(wt).replacement(), Some("MyInt"));
        assert_eq!(ctx.ty(wt).target_module, "my.ints");
    }
}
