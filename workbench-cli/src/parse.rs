//! IDL type-aware form handling: default form values and conversion of
//! untyped form input into typed argument values.
//!
//! Enum choices travel as single-key objects whose key is the variant name
//! with its first letter lowercased (`Active` -> `{ "active": {} }`). This is
//! the wire convention the encoder matches variants by.

use std::fmt;

use num_bigint::BigInt;
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use workbench_core::error::{WorkbenchError, WorkbenchResult};
use workbench_core::form::is_blank;
use workbench_core::idl::{IdlInstruction, IdlType};
use workbench_core::resolve::{resolve, Resolved, TypeTable};

use crate::hex::parse_address;

/// A processed argument, ready for the wire encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(BigInt),
    Str(String),
    Address(Pubkey),
    /// Chosen variant key plus its field payload (`{}` for unit variants).
    Enum { variant: String, fields: Value },
    List(Vec<Value>),
    /// Passed through unchanged; interpreted by the encoder.
    Raw(Value),
}

impl ArgValue {
    /// JSON view, with integers as decimal strings and addresses in base58.
    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::Null => Value::Null,
            ArgValue::Bool(b) => Value::Bool(*b),
            ArgValue::Int(n) => Value::String(n.to_string()),
            ArgValue::Str(s) => Value::String(s.clone()),
            ArgValue::Address(pk) => Value::String(pk.to_string()),
            ArgValue::Enum { variant, fields } => {
                let mut obj = Map::new();
                obj.insert(variant.clone(), fields.clone());
                Value::Object(obj)
            }
            ArgValue::List(items) => Value::Array(items.clone()),
            ArgValue::Raw(v) => v.clone(),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => write!(f, "None"),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Int(n) => write!(f, "{}", n),
            ArgValue::Str(s) => write!(f, "\"{}\"", s),
            ArgValue::Address(pk) => write!(f, "{}", pk),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

pub const NUMERIC_PRIMITIVES: &[&str] = &[
    "u8", "i8", "u16", "i16", "u32", "i32", "u64", "i64", "u128", "i128", "u256", "i256",
];

pub fn is_numeric(prim: &str) -> bool {
    NUMERIC_PRIMITIVES.contains(&prim)
}

pub fn is_address(prim: &str) -> bool {
    prim == "pubkey" || prim == "publicKey"
}

/// Wire key for an enum variant: first letter lowercased.
pub fn variant_key(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

/// Default form values for an instruction's arguments.
///
/// Enum arguments select their first variant; everything else starts as an
/// empty string.
pub fn initialize_args(ix: &IdlInstruction, table: &TypeTable<'_>) -> Map<String, Value> {
    let mut args = Map::new();
    for arg in &ix.args {
        let default = match resolve(&arg.type_, table) {
            Resolved::Enum(variants) if !variants.is_empty() => {
                let mut choice = Map::new();
                choice.insert(variant_key(&variants[0].name), Value::Object(Map::new()));
                Value::Object(choice)
            }
            _ => Value::String(String::new()),
        };
        args.insert(arg.name.clone(), default);
    }
    args
}

/// Convert form input into typed values, one per declared argument, in
/// declaration order. The form itself is left untouched.
pub fn process_args(
    ix: &IdlInstruction,
    form_args: &Map<String, Value>,
    table: &TypeTable<'_>,
) -> WorkbenchResult<Vec<ArgValue>> {
    ix.args
        .iter()
        .map(|arg| {
            let value = form_args.get(&arg.name);
            let processed = process_arg(&arg.name, &arg.type_, value, table)?;
            tracing::debug!(arg = %arg.name, raw = ?value, processed = %processed, "processed arg");
            Ok(processed)
        })
        .collect()
}

/// Process a single value.
///
/// Check order: enum on the resolved type, then option on the declared
/// type, then primitive, then vector, then passthrough. An option wrapping a
/// defined enum therefore takes the enum branch and needs a variant object.
pub fn process_arg(
    label: &str,
    declared: &IdlType,
    value: Option<&Value>,
    table: &TypeTable<'_>,
) -> WorkbenchResult<ArgValue> {
    if let Resolved::Enum(_) = resolve(declared, table) {
        return enum_value(label, value);
    }

    match declared {
        IdlType::Option { option } => {
            if is_blank(value) {
                return Ok(ArgValue::Null);
            }
            match option.as_ref() {
                IdlType::Primitive(prim) => convert_primitive(label, prim, value),
                _ => Ok(raw(value)),
            }
        }
        IdlType::Primitive(prim) => convert_primitive(label, prim, value),
        IdlType::Vec { .. } => Ok(match value {
            v if is_blank(v) => ArgValue::List(vec![]),
            Some(Value::Array(items)) => ArgValue::List(items.clone()),
            Some(scalar) => ArgValue::List(vec![scalar.clone()]),
            None => ArgValue::List(vec![]),
        }),
        IdlType::Defined { .. } | IdlType::Array { .. } | IdlType::Unknown(_) => Ok(raw(value)),
    }
}

fn raw(value: Option<&Value>) -> ArgValue {
    ArgValue::Raw(value.cloned().unwrap_or(Value::Null))
}

/// A form value naming an enum variant: `{ variant: {fields} }`.
pub(crate) fn enum_value(label: &str, value: Option<&Value>) -> WorkbenchResult<ArgValue> {
    match value {
        Some(Value::Object(obj)) if obj.len() == 1 => {
            let (variant, inner) = obj.iter().next().ok_or_else(|| invalid_enum(label))?;
            let fields = match inner {
                Value::Object(_) | Value::Array(_) => inner.clone(),
                _ => Value::Object(Map::new()),
            };
            Ok(ArgValue::Enum {
                variant: variant.clone(),
                fields,
            })
        }
        _ => Err(invalid_enum(label)),
    }
}

fn invalid_enum(label: &str) -> WorkbenchError {
    WorkbenchError::InvalidEnumValue {
        arg: label.to_string(),
    }
}

/// Primitive conversion shared by top-level args and nested encoder values.
pub(crate) fn convert_primitive(
    label: &str,
    prim: &str,
    value: Option<&Value>,
) -> WorkbenchResult<ArgValue> {
    match prim {
        p if is_numeric(p) => {
            if is_blank(value) {
                return Ok(ArgValue::Int(BigInt::from(0)));
            }
            parse_integer(label, value.unwrap_or(&Value::Null)).map(ArgValue::Int)
        }
        p if is_address(p) => {
            if is_blank(value) {
                return Ok(ArgValue::Null);
            }
            match value {
                Some(Value::String(s)) => parse_address(s)
                    .map(ArgValue::Address)
                    .map_err(|_| WorkbenchError::InvalidAddress {
                        label: label.to_string(),
                        value: s.clone(),
                    }),
                other => Err(WorkbenchError::InvalidAddress {
                    label: label.to_string(),
                    value: other.map(|v| v.to_string()).unwrap_or_default(),
                }),
            }
        }
        "bool" => Ok(ArgValue::Bool(truthy(value))),
        "string" | "String" => Ok(ArgValue::Str(match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })),
        _ => Ok(raw(value)),
    }
}

/// Arbitrary-precision integer from a JSON number or decimal text.
pub fn parse_integer(label: &str, value: &Value) -> WorkbenchResult<BigInt> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<BigInt>()
            .map_err(|e| WorkbenchError::invalid_number(label, s.as_str(), e)),
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(BigInt::from(v))
            } else if let Some(v) = n.as_i64() {
                Ok(BigInt::from(v))
            } else {
                Err(WorkbenchError::invalid_number(label, n.to_string(), "not an integer"))
            }
        }
        other => Err(WorkbenchError::invalid_number(
            label,
            other.to_string(),
            "expected a number",
        )),
    }
}

/// Form truthiness. Text "false" and "0" count as false since checkbox
/// and text inputs both arrive as strings.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
