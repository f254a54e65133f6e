//! Wrapped declarations: the pipeline's own node around a parsed C++
//! declaration, carrying the attributes configuration may set and the
//! decisions the walker made.

use crate::cxx::{Access, DeclId};

/// Visibility in the target language, with an unset state so configuration
/// can tell "not specified" apart from an explicit choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Unset,
    Private,
    Package,
    Protected,
    Public,
    Export,
}

impl Visibility {
    pub fn from_access(access: Access) -> Visibility {
        match access {
            Access::Public => Visibility::Public,
            Access::Protected => Visibility::Protected,
            Access::Private => Visibility::Private,
            Access::None => Visibility::Unset,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclVariant {
    Function,
    Namespace,
    Record,
    RecordTemplate,
    SpecializedRecord,
    Typedef,
    Enum,
    EnumConstant,
    Field,
    Union,
    Method,
    Constructor,
    Destructor,
    Argument,
    Variable,
    TemplateTypeArgument,
    TemplateNonTypeArgument,
    UsingAliasTemplate,
    Unwrappable,
}

#[derive(Debug, Clone)]
pub struct WrappedDecl {
    pub source: DeclId,
    pub variant: DeclVariant,
    pub source_name: String,
    /// Explicit rename; wins over prefix stripping when set.
    pub renamed: Option<String>,
    pub remove_prefix: String,
    pub visibility: Visibility,
    /// The `bound` flag: whether this declaration is an emission root.
    pub should_emit: bool,
    pub target_module: String,
    /// Cleared when the walker could not represent this declaration. The
    /// entry stays in the table for referential integrity but is never
    /// emitted.
    pub is_wrappable: bool,
}

impl WrappedDecl {
    pub fn new(source: DeclId, variant: DeclVariant, source_name: String) -> WrappedDecl {
        WrappedDecl {
            source,
            variant,
            source_name,
            renamed: None,
            remove_prefix: String::new(),
            visibility: Visibility::Unset,
            should_emit: false,
            target_module: String::new(),
            is_wrappable: !matches!(variant, DeclVariant::Unwrappable),
        }
    }

    pub fn mark_unwrappable(&mut self) {
        self.is_wrappable = false;
    }

    pub fn is_target_module_set(&self) -> bool {
        !self.target_module.is_empty()
    }

    /// Name to emit: the explicit rename, else the source name with the
    /// configured prefix stripped when it is a proper prefix.
    pub fn target_name(&self) -> String {
        if let Some(renamed) = &self.renamed {
            return renamed.clone();
        }
        if !self.remove_prefix.is_empty() {
            if let Some(stripped) = self.source_name.strip_prefix(&self.remove_prefix) {
                if !stripped.is_empty() {
                    return stripped.to_string();
                }
            }
        }
        self.source_name.clone()
    }
}

/// Attributes parsed out of one `binding_attributes` entry, applied to every
/// declaration the entry's name resolves to. Option-valued so later files
/// can overwrite earlier ones field by field.
#[derive(Debug, Clone, Default)]
pub struct DeclarationAttributes {
    pub bound: Option<bool>,
    pub target_module: Option<String>,
    pub visibility: Option<Visibility>,
    pub remove_prefix: Option<String>,
}

impl DeclarationAttributes {
    pub fn apply_to(&self, decl: &mut WrappedDecl) {
        if let Some(bound) = self.bound {
            decl.should_emit = bound;
        }
        if let Some(target_module) = &self.target_module {
            decl.target_module = target_module.clone();
        }
        if let Some(visibility) = self.visibility {
            decl.visibility = visibility;
        }
        if let Some(remove_prefix) = &self.remove_prefix {
            decl.remove_prefix = remove_prefix.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn target_name_strips_configured_prefix() {
        let mut decl = WrappedDecl::new(DeclId(1), DeclVariant::Enum, "E_VALUE".to_string());
        decl.remove_prefix = "E_".to_string();
        assert_eq!(decl.target_name(), "VALUE");
    }

    #[test]
    fn prefix_that_would_erase_the_name_is_ignored() {
        let mut decl = WrappedDecl::new(DeclId(1), DeclVariant::Enum, "E_".to_string());
        decl.remove_prefix = "E_".to_string();
        assert_eq!(decl.target_name(), "E_");
    }

    #[test]
    fn attributes_only_touch_fields_they_set() {
        let mut decl = WrappedDecl::new(DeclId(1), DeclVariant::Record, "S".to_string());
        decl.should_emit = true;
        let attribs = DeclarationAttributes {
            target_module: Some("pkg.mod".to_string()),
            ..DeclarationAttributes::default()
        };
        attribs.apply_to(&mut decl);
        assert!(decl.should_emit);
        assert_eq!(decl.target_module, "pkg.mod");
        assert_eq!(decl.visibility, Visibility::Unset);
    }
}
