//! Type resolution against the IDL's user-defined type table.

use crate::idl::{IdlDefinedFields, IdlEnumVariant, IdlType, IdlTypeDef, IdlTypeDefTy};

/// Read-only view over the IDL type table.
#[derive(Debug, Clone, Copy)]
pub struct TypeTable<'a> {
    defs: &'a [IdlTypeDef],
}

impl<'a> TypeTable<'a> {
    pub fn new(defs: &'a [IdlTypeDef]) -> Self {
        Self { defs }
    }

    pub fn empty() -> TypeTable<'static> {
        TypeTable { defs: &[] }
    }

    /// First entry whose name matches case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<&'a IdlTypeDef> {
        self.defs.iter().find(|def| def.name.eq_ignore_ascii_case(name))
    }
}

/// Outcome of resolving a declared type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    /// Not a reference; already concrete.
    Concrete(&'a IdlType),
    Struct(&'a IdlDefinedFields),
    Enum(&'a [IdlEnumVariant]),
    /// A reference with no matching entry in the type table.
    Unresolved(&'a str),
}

impl<'a> Resolved<'a> {
    pub fn as_enum(&self) -> Option<&'a [IdlEnumVariant]> {
        match self {
            Resolved::Enum(variants) => Some(variants),
            _ => None,
        }
    }
}

/// Resolve a declared type.
///
/// A single `Option` layer is unwrapped first. Defined references are looked
/// up in `table`; aliases are followed. Lookup failure is reported as
/// [`Resolved::Unresolved`], never as an error.
pub fn resolve<'a>(ty: &'a IdlType, table: &TypeTable<'a>) -> Resolved<'a> {
    let ty = match ty {
        IdlType::Option { option } => option.as_ref(),
        other => other,
    };
    resolve_inner(ty, table, 0)
}

// Alias chains deeper than this are treated as unresolvable.
const MAX_ALIAS_DEPTH: usize = 16;

fn resolve_inner<'a>(ty: &'a IdlType, table: &TypeTable<'a>, depth: usize) -> Resolved<'a> {
    let defined = match ty {
        IdlType::Defined { defined } => defined,
        IdlType::Unknown(raw) => return Resolved::Unresolved(unknown_name(raw)),
        _ => return Resolved::Concrete(ty),
    };
    let name = defined.name();
    match table.lookup(name).map(|def| &def.type_) {
        Some(IdlTypeDefTy::Struct { fields }) => Resolved::Struct(fields),
        Some(IdlTypeDefTy::Enum { variants }) => Resolved::Enum(variants),
        Some(IdlTypeDefTy::Type { alias }) if depth < MAX_ALIAS_DEPTH => {
            resolve_inner(alias, table, depth + 1)
        }
        Some(IdlTypeDefTy::Type { .. }) | None => {
            tracing::debug!(type_name = name, "type reference left unresolved");
            Resolved::Unresolved(name)
        }
    }
}

/// Best label for an unrecognized type: the first string inside it.
fn unknown_name(raw: &serde_json::Value) -> &str {
    raw.as_object()
        .and_then(|map| map.values().find_map(serde_json::Value::as_str))
        .unwrap_or("unknown")
}
