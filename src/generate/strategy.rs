//! Deterministic strategy selection for types that configuration left
//! undecided. Idempotent: a type that already holds a strategy is left
//! alone.

use color_eyre::eyre::bail;

use crate::cxx::CxxDeclKind;
use crate::generate::context::{BindingContext, WTypeId};
use crate::generate::ty::{Strategy, TypeVariant};

pub fn determine_strategy(ctx: &mut BindingContext, id: WTypeId) -> color_eyre::Result<()> {
    if ctx.ty(id).strategy.is_some() {
        return Ok(());
    }

    match ctx.ty(id).variant.clone() {
        TypeVariant::Invalid => bail!("cannot choose a strategy for an invalid type"),
        // builtins are assigned their replacement while interning
        TypeVariant::Builtin => bail!("builtin type reached the strategy resolver undecided"),
        TypeVariant::Pointer { .. }
        | TypeVariant::Reference { .. }
        | TypeVariant::Typedef { .. }
        | TypeVariant::Enum { .. }
        | TypeVariant::Function { .. }
        | TypeVariant::Union { .. } => {
            // empty replacement: translate structurally, not by name
            ctx.ty_mut(id).choose_replace_strategy("");
            Ok(())
        }
        TypeVariant::NonTemplateRecord { .. } | TypeVariant::TemplateRecord { .. } => {
            determine_record_strategy(ctx, id)
        }
        TypeVariant::Qualified { unqualified } => determine_strategy(ctx, unqualified),
        // translation fails if these are ever reached
        TypeVariant::ConstantArray { .. }
        | TypeVariant::VariableArray { .. }
        | TypeVariant::DependentLengthArray { .. }
        | TypeVariant::Vector
        | TypeVariant::TemplateArgument { .. }
        | TypeVariant::TemplateSpecialization { .. }
        | TypeVariant::Delayed { .. } => Ok(()),
    }
}

/// Records with any virtual function map to an interface, everything else
/// to a struct. Default constructors and the like are not considered.
pub fn determine_record_strategy(ctx: &mut BindingContext, id: WTypeId) -> color_eyre::Result<()> {
    if ctx.ty(id).strategy.is_some() {
        return Ok(());
    }
    let decl = match &ctx.ty(id).variant {
        TypeVariant::NonTemplateRecord { decl } | TypeVariant::TemplateRecord { decl } => *decl,
        other => bail!("record strategy requested for a non-record type: {other:?}"),
    };
    let strategy = match &ctx.ast.decl(ctx.ast.canonical(decl)).kind {
        CxxDeclKind::Record(record) => {
            if !record.is_cxx {
                Strategy::Struct
            } else if record.is_dynamic {
                Strategy::Interface
            } else {
                Strategy::Struct
            }
        }
        other => bail!("record type declared by a non-record declaration: {other:?}"),
    };
    ctx.ty_mut(id).strategy = Some(strategy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cxx::{BuiltinKind, CxxAstBuilder, RecordTag};
    use crate::generate::walker;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_record_becomes_struct_and_virtual_record_interface() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("r.hpp");
        let loc = b.loc(file, 1, 1);
        let plain = b.record(b.tu(), "Plain", RecordTag::Struct, true, loc);
        let loc = b.loc(file, 5, 1);
        let dynamic = b.record(b.tu(), "Dyn", RecordTag::Class, true, loc);
        let void_ty = b.builtin(BuiltinKind::Void);
        let loc = b.loc(file, 6, 5);
        b.method(dynamic, "f", void_ty, &[], true, loc);
        let plain_ty = b.record_type(plain);
        let dynamic_ty = b.record_type(dynamic);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let plain_w = ctx.lookup_type(plain_ty).unwrap();
        let dynamic_w = ctx.lookup_type(dynamic_ty).unwrap();
        determine_strategy(&mut ctx, plain_w).unwrap();
        determine_strategy(&mut ctx, dynamic_w).unwrap();

        assert_eq!(ctx.ty(plain_w).strategy, Some(Strategy::Struct));
        assert_eq!(ctx.ty(dynamic_w).strategy, Some(Strategy::Interface));
    }

    #[test]
    fn resolver_is_idempotent_and_respects_configuration() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("r.hpp");
        let loc = b.loc(file, 1, 1);
        let record = b.record(b.tu(), "Forced", RecordTag::Struct, true, loc);
        let record_ty = b.record_type(record);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let w = ctx.lookup_type(record_ty).unwrap();
        ctx.ty_mut(w).strategy = Some(Strategy::OpaqueClass);
        determine_strategy(&mut ctx, w).unwrap();
        assert_eq!(ctx.ty(w).strategy, Some(Strategy::OpaqueClass));
    }

    #[test]
    fn pointers_and_enums_translate_structurally() {
        let mut b = CxxAstBuilder::new();
        let file = b.add_file("p.hpp");
        let int_ty = b.builtin(BuiltinKind::Int);
        let ptr = b.pointer_to(int_ty);
        let loc = b.loc(file, 1, 1);
        let enumeration = b.enumeration(b.tu(), "E", int_ty, loc);
        let enum_ty = b.enum_type(enumeration);
        let ast = b.finish();

        let mut ctx = BindingContext::new(&ast);
        walker::walk(&mut ctx);
        let ptr_w = ctx.intern_type(ptr);
        let enum_w = ctx.lookup_type(enum_ty).unwrap();
        determine_strategy(&mut ctx, ptr_w).unwrap();
        determine_strategy(&mut ctx, enum_w).unwrap();

        assert_eq!(ctx.ty(ptr_w).replacement(), Some(""));
        assert_eq!(ctx.ty(enum_w).replacement(), Some(""));
    }
}
