//! Borsh serialization of instruction data, driven by IDL types.
//!
//! Layout: 8-byte discriminator, then each argument in declaration order.

use borsh::BorshSerialize;
use num_bigint::{BigInt, Sign};
use serde_json::{Map, Value};
use workbench_core::error::{WorkbenchError, WorkbenchResult};
use workbench_core::idl::{IdlDefinedFields, IdlEnumVariant, IdlInstruction, IdlType};
use workbench_core::resolve::{resolve, Resolved, TypeTable};

use crate::hex::{hex_decode, parse_address, strip_hex_prefix};
use crate::parse::{
    convert_primitive, enum_value, is_address, is_numeric, parse_integer, truthy, variant_key,
    ArgValue,
};

/// Serialize a full instruction payload.
pub fn encode_instruction_data(
    ix: &IdlInstruction,
    args: &[ArgValue],
    table: &TypeTable<'_>,
) -> WorkbenchResult<Vec<u8>> {
    if args.len() != ix.args.len() {
        return Err(WorkbenchError::type_mismatch(
            ix.name.as_str(),
            format!("{} arguments", ix.args.len()),
            format!("{} values", args.len()),
        ));
    }
    let mut out = ix.discriminator().to_vec();
    for (arg, value) in ix.args.iter().zip(args) {
        encode_value(&mut out, &arg.name, &arg.type_, value, table)?;
    }
    Ok(out)
}

/// Append the encoding of one processed value.
pub fn encode_value(
    out: &mut Vec<u8>,
    label: &str,
    ty: &IdlType,
    value: &ArgValue,
    table: &TypeTable<'_>,
) -> WorkbenchResult<()> {
    match ty {
        IdlType::Option { option } => {
            if matches!(value, ArgValue::Null | ArgValue::Raw(Value::Null)) {
                out.push(0);
                Ok(())
            } else {
                out.push(1);
                encode_value(out, label, option, value, table)
            }
        }
        IdlType::Primitive(prim) => encode_primitive(out, label, prim, value),
        IdlType::Vec { vec } => {
            let items = match value {
                ArgValue::List(items) | ArgValue::Raw(Value::Array(items)) => items,
                other => return Err(WorkbenchError::type_mismatch(label, "list", other)),
            };
            put(out, label, &(items.len() as u32))?;
            for (i, item) in items.iter().enumerate() {
                encode_json(out, &format!("{}[{}]", label, i), vec, item, table)?;
            }
            Ok(())
        }
        IdlType::Array { array } => encode_array(out, label, &array.0, array.1, value, table),
        IdlType::Defined { defined } => match resolve(ty, table) {
            Resolved::Enum(variants) => encode_enum(out, label, variants, value, table),
            Resolved::Struct(fields) => match value {
                ArgValue::Raw(json) => encode_fields(out, label, fields, json, table),
                other => Err(WorkbenchError::type_mismatch(label, defined.name(), other)),
            },
            Resolved::Concrete(alias) => encode_value(out, label, alias, value, table),
            Resolved::Unresolved(name) => Err(WorkbenchError::type_mismatch(
                label,
                format!("defined type {}", name),
                "no such type in IDL",
            )),
        },
        IdlType::Unknown(raw) => Err(WorkbenchError::type_mismatch(
            label,
            format!("IDL type {}", raw),
            "type shape is not supported",
        )),
    }
}

/// Nested values arrive as raw JSON and get the same conversion as
/// top-level form input before encoding.
fn encode_json(
    out: &mut Vec<u8>,
    label: &str,
    ty: &IdlType,
    json: &Value,
    table: &TypeTable<'_>,
) -> WorkbenchResult<()> {
    let value = coerce_json(label, ty, json, table)?;
    encode_value(out, label, ty, &value, table)
}

fn coerce_json(
    label: &str,
    ty: &IdlType,
    json: &Value,
    table: &TypeTable<'_>,
) -> WorkbenchResult<ArgValue> {
    match ty {
        IdlType::Option { option } => match json {
            Value::Null => Ok(ArgValue::Null),
            _ => coerce_json(label, option, json, table),
        },
        IdlType::Primitive(prim) => convert_primitive(label, prim, Some(json)),
        IdlType::Defined { .. } => match resolve(ty, table) {
            Resolved::Enum(_) => enum_value(label, Some(json)),
            Resolved::Concrete(alias) => coerce_json(label, alias, json, table),
            _ => Ok(ArgValue::Raw(json.clone())),
        },
        IdlType::Vec { .. } | IdlType::Array { .. } | IdlType::Unknown(_) => Ok(ArgValue::Raw(json.clone())),
    }
}

fn encode_primitive(
    out: &mut Vec<u8>,
    label: &str,
    prim: &str,
    value: &ArgValue,
) -> WorkbenchResult<()> {
    match (prim, value) {
        (p, ArgValue::Int(n)) if is_numeric(p) => write_int(out, label, p, n),
        (p, ArgValue::Raw(json)) if is_numeric(p) => {
            let n = parse_integer(label, json)?;
            write_int(out, label, p, &n)
        }
        ("bool", ArgValue::Bool(b)) => put(out, label, b),
        ("bool", ArgValue::Raw(json)) => put(out, label, &truthy(Some(json))),
        ("string" | "String", ArgValue::Str(s)) => put(out, label, s),
        ("string" | "String", ArgValue::Raw(Value::String(s))) => put(out, label, s),
        (p, ArgValue::Address(pk)) if is_address(p) => {
            out.extend_from_slice(pk.as_ref());
            Ok(())
        }
        (p, ArgValue::Raw(Value::String(s))) if is_address(p) => {
            let pk = parse_address(s).map_err(|_| WorkbenchError::InvalidAddress {
                label: label.to_string(),
                value: s.clone(),
            })?;
            out.extend_from_slice(pk.as_ref());
            Ok(())
        }
        ("bytes", ArgValue::Raw(json)) => {
            let bytes = json_bytes(label, json)?;
            put(out, label, &bytes)
        }
        ("bytes", ArgValue::Str(s)) => put(out, label, &s.as_bytes().to_vec()),
        ("f32" | "f64", ArgValue::Raw(json)) => {
            let f = match json {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| WorkbenchError::invalid_number(label, json.to_string(), "expected a float"))?;
            if prim == "f32" {
                put(out, label, &(f as f32))
            } else {
                put(out, label, &f)
            }
        }
        (p, other) => Err(WorkbenchError::type_mismatch(label, p, other)),
    }
}

/// Fixed-width little-endian integer; two's complement for signed kinds.
fn write_int(out: &mut Vec<u8>, label: &str, prim: &str, n: &BigInt) -> WorkbenchResult<()> {
    let bits: usize = prim[1..]
        .parse()
        .map_err(|_| WorkbenchError::type_mismatch(label, prim, "unknown integer width"))?;
    let width = bits / 8;
    let out_of_range = || WorkbenchError::invalid_number(label, n.to_string(), format!("out of range for {}", prim));

    let mut bytes = if prim.starts_with('i') {
        let mut bytes = n.to_signed_bytes_le();
        if bytes.len() > width {
            return Err(out_of_range());
        }
        let fill = if n.sign() == Sign::Minus { 0xff } else { 0x00 };
        bytes.resize(width, fill);
        bytes
    } else {
        if n.sign() == Sign::Minus {
            return Err(out_of_range());
        }
        let (_, bytes) = n.to_bytes_le();
        if bytes.len() > width {
            return Err(out_of_range());
        }
        bytes
    };
    bytes.resize(width, 0);
    out.extend_from_slice(&bytes);
    Ok(())
}

fn encode_array(
    out: &mut Vec<u8>,
    label: &str,
    elem: &IdlType,
    size: usize,
    value: &ArgValue,
    table: &TypeTable<'_>,
) -> WorkbenchResult<()> {
    match value {
        ArgValue::List(items) | ArgValue::Raw(Value::Array(items)) => {
            if items.len() != size {
                return Err(WorkbenchError::type_mismatch(
                    label,
                    format!("{} elements", size),
                    items.len(),
                ));
            }
            for (i, item) in items.iter().enumerate() {
                encode_json(out, &format!("{}[{}]", label, i), elem, item, table)?;
            }
            Ok(())
        }
        ArgValue::Raw(Value::String(s)) | ArgValue::Str(s) if *elem == IdlType::primitive("u8") => {
            let bytes = fixed_bytes(label, s, size)?;
            out.extend_from_slice(&bytes);
            Ok(())
        }
        other => Err(WorkbenchError::type_mismatch(label, format!("[_; {}]", size), other)),
    }
}

/// `[u8; N]` from text: 2N hex digits, `0x` hex, or right-padded UTF-8.
fn fixed_bytes(label: &str, raw: &str, size: usize) -> WorkbenchResult<Vec<u8>> {
    let mismatch = |found: String| WorkbenchError::type_mismatch(label, format!("[u8; {}]", size), found);
    if raw.len() == size * 2 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex_decode(raw).map_err(mismatch);
    }
    if let Some(hex) = strip_hex_prefix(raw) {
        let bytes = hex_decode(hex).map_err(mismatch)?;
        if bytes.len() != size {
            return Err(mismatch(format!("{} bytes from hex", bytes.len())));
        }
        return Ok(bytes);
    }
    let src = raw.as_bytes();
    if src.len() > size {
        return Err(mismatch(format!("'{}' is {} bytes", raw, src.len())));
    }
    let mut bytes = vec![0u8; size];
    bytes[..src.len()].copy_from_slice(src);
    Ok(bytes)
}

fn json_bytes(label: &str, json: &Value) -> WorkbenchResult<Vec<u8>> {
    match json {
        Value::String(s) => match strip_hex_prefix(s) {
            Some(hex) => hex_decode(hex).map_err(|e| WorkbenchError::type_mismatch(label, "bytes", e)),
            None => Ok(s.as_bytes().to_vec()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| WorkbenchError::type_mismatch(label, "byte", item))
            })
            .collect(),
        other => Err(WorkbenchError::type_mismatch(label, "bytes", other)),
    }
}

fn encode_enum(
    out: &mut Vec<u8>,
    label: &str,
    variants: &[IdlEnumVariant],
    value: &ArgValue,
    table: &TypeTable<'_>,
) -> WorkbenchResult<()> {
    let converted;
    let (variant, fields) = match value {
        ArgValue::Enum { variant, fields } => (variant, fields),
        ArgValue::Raw(json) => {
            converted = enum_value(label, Some(json))?;
            match &converted {
                ArgValue::Enum { variant, fields } => (variant, fields),
                _ => return Err(WorkbenchError::InvalidEnumValue { arg: label.to_string() }),
            }
        }
        _ => return Err(WorkbenchError::InvalidEnumValue { arg: label.to_string() }),
    };

    let index = variants
        .iter()
        .position(|v| v.name == *variant || variant_key(&v.name) == *variant)
        .ok_or_else(|| WorkbenchError::type_mismatch(label, "known enum variant", variant))?;
    put(out, label, &(index as u8))?;

    match &variants[index].fields {
        Some(defined) if !defined.is_empty() => {
            encode_fields(out, &format!("{}.{}", label, variant), defined, fields, table)
        }
        _ => Ok(()),
    }
}

fn encode_fields(
    out: &mut Vec<u8>,
    label: &str,
    fields: &IdlDefinedFields,
    json: &Value,
    table: &TypeTable<'_>,
) -> WorkbenchResult<()> {
    match fields {
        IdlDefinedFields::Named(named) => {
            let Value::Object(obj) = json else {
                return Err(WorkbenchError::type_mismatch(label, "object", json));
            };
            for field in named {
                let item = field_value(obj, &field.name).ok_or_else(|| {
                    WorkbenchError::type_mismatch(format!("{}.{}", label, field.name), "a value", "missing")
                })?;
                encode_json(out, &format!("{}.{}", label, field.name), &field.type_, item, table)?;
            }
            Ok(())
        }
        IdlDefinedFields::Tuple(types) => {
            for (i, ty) in types.iter().enumerate() {
                let item = match json {
                    Value::Array(items) => items.get(i),
                    Value::Object(obj) => obj.get(&i.to_string()).or_else(|| obj.get(&format!("_{}", i))),
                    _ => None,
                }
                .ok_or_else(|| WorkbenchError::type_mismatch(format!("{}.{}", label, i), "a value", "missing"))?;
                encode_json(out, &format!("{}.{}", label, i), ty, item, table)?;
            }
            Ok(())
        }
    }
}

/// Field lookup by IDL name, falling back to the camelCase spelling.
fn field_value<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get(name).or_else(|| obj.get(&camel_case(name)))
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn put<T: BorshSerialize + ?Sized>(out: &mut Vec<u8>, label: &str, value: &T) -> WorkbenchResult<()> {
    value
        .serialize(out)
        .map_err(|e| WorkbenchError::type_mismatch(label, "borsh value", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsh::BorshSerialize as _;
    use serde_json::json;
    use solana_sdk::pubkey::Pubkey;
    use workbench_core::idl::{IdlField, IdlTypeDef, IdlTypeDefTy};

    fn encode(ty: &IdlType, value: ArgValue, defs: &[IdlTypeDef]) -> WorkbenchResult<Vec<u8>> {
        let mut out = vec![];
        encode_value(&mut out, "x", ty, &value, &TypeTable::new(defs))?;
        Ok(out)
    }

    #[derive(borsh::BorshSerialize)]
    enum Mode {
        #[allow(dead_code)]
        Open,
        Locked { until: i64, note: String },
    }

    #[derive(borsh::BorshSerialize)]
    struct Expected {
        amount: u64,
        delta: i32,
        flag: bool,
        owner: [u8; 32],
        label: String,
        limit: Option<u16>,
        tags: Vec<u8>,
        mode: Mode,
    }

    fn mode_def() -> IdlTypeDef {
        IdlTypeDef {
            name: "Mode".to_string(),
            docs: vec![],
            type_: IdlTypeDefTy::Enum {
                variants: vec![
                    IdlEnumVariant { name: "Open".to_string(), fields: None },
                    IdlEnumVariant {
                        name: "Locked".to_string(),
                        fields: Some(IdlDefinedFields::Named(vec![
                            IdlField { name: "until".to_string(), docs: vec![], type_: IdlType::primitive("i64") },
                            IdlField { name: "note".to_string(), docs: vec![], type_: IdlType::primitive("string") },
                        ])),
                    },
                ],
            },
        }
    }

    fn field(name: &str, type_: IdlType) -> IdlField {
        IdlField { name: name.to_string(), docs: vec![], type_ }
    }

    #[test]
    fn matches_borsh_derive_layout() {
        let owner = Pubkey::new_from_array([9u8; 32]);
        let expected = Expected {
            amount: 1_000_000,
            delta: -5,
            flag: true,
            owner: owner.to_bytes(),
            label: "vault".to_string(),
            limit: Some(7),
            tags: vec![1, 2, 3],
            mode: Mode::Locked { until: -1, note: "hi".to_string() },
        };
        let ix = IdlInstruction {
            name: "configure".to_string(),
            docs: vec![],
            discriminator: Some(vec![0; 8]),
            accounts: vec![],
            args: vec![
                field("amount", IdlType::primitive("u64")),
                field("delta", IdlType::primitive("i32")),
                field("flag", IdlType::primitive("bool")),
                field("owner", IdlType::primitive("pubkey")),
                field("label", IdlType::primitive("string")),
                field("limit", IdlType::option(IdlType::primitive("u16"))),
                field("tags", IdlType::vec(IdlType::primitive("u8"))),
                field("mode", IdlType::defined("Mode")),
            ],
        };
        let args = vec![
            ArgValue::Int(BigInt::from(1_000_000)),
            ArgValue::Int(BigInt::from(-5)),
            ArgValue::Bool(true),
            ArgValue::Address(owner),
            ArgValue::Str("vault".to_string()),
            ArgValue::Int(BigInt::from(7)),
            ArgValue::List(vec![json!(1), json!("2"), json!(3)]),
            ArgValue::Enum { variant: "locked".to_string(), fields: json!({"until": "-1", "note": "hi"}) },
        ];
        let defs = vec![mode_def()];
        let data = encode_instruction_data(&ix, &args, &TypeTable::new(&defs)).unwrap();

        let mut oracle = vec![0u8; 8];
        expected.serialize(&mut oracle).unwrap();
        assert_eq!(data, oracle);
    }

    #[test]
    fn discriminator_prefixes_payload() {
        let ix = IdlInstruction {
            name: "initialize".to_string(),
            docs: vec![],
            discriminator: None,
            accounts: vec![],
            args: vec![],
        };
        let data = encode_instruction_data(&ix, &[], &TypeTable::empty()).unwrap();
        assert_eq!(data, vec![175, 175, 109, 31, 13, 152, 155, 237]);
    }

    #[test]
    fn unit_variant_writes_only_index() {
        let defs = vec![mode_def()];
        let out = encode(
            &IdlType::defined("Mode"),
            ArgValue::Enum { variant: "open".to_string(), fields: json!({}) },
            &defs,
        )
        .unwrap();
        assert_eq!(out, vec![0]);
        let err = encode(
            &IdlType::defined("Mode"),
            ArgValue::Enum { variant: "closed".to_string(), fields: json!({}) },
            &defs,
        );
        assert!(err.is_err());
    }

    #[test]
    fn wide_and_signed_integers() {
        let out = encode(&IdlType::primitive("i16"), ArgValue::Int(BigInt::from(-2)), &[]).unwrap();
        assert_eq!(out, vec![0xfe, 0xff]);

        let out = encode(&IdlType::primitive("u256"), ArgValue::Int(BigInt::from(1)), &[]).unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 1);
        assert!(out[1..].iter().all(|b| *b == 0));

        assert!(encode(&IdlType::primitive("u8"), ArgValue::Int(BigInt::from(256)), &[]).is_err());
        assert!(encode(&IdlType::primitive("i8"), ArgValue::Int(BigInt::from(128)), &[]).is_err());
        assert!(encode(&IdlType::primitive("u32"), ArgValue::Int(BigInt::from(-1)), &[]).is_err());
        assert_eq!(
            encode(&IdlType::primitive("i8"), ArgValue::Int(BigInt::from(-128)), &[]).unwrap(),
            vec![0x80]
        );
    }

    #[test]
    fn option_tags() {
        let ty = IdlType::option(IdlType::primitive("u8"));
        assert_eq!(encode(&ty, ArgValue::Null, &[]).unwrap(), vec![0]);
        assert_eq!(encode(&ty, ArgValue::Int(BigInt::from(3)), &[]).unwrap(), vec![1, 3]);
    }

    #[test]
    fn fixed_byte_arrays_accept_text() {
        let ty = IdlType::Array { array: (Box::new(IdlType::primitive("u8")), 4) };
        assert_eq!(encode(&ty, ArgValue::Raw(json!("ab")), &[]).unwrap(), vec![b'a', b'b', 0, 0]);
        assert_eq!(encode(&ty, ArgValue::Raw(json!("0a0b0c0d")), &[]).unwrap(), vec![10, 11, 12, 13]);
        assert_eq!(encode(&ty, ArgValue::Raw(json!([1, 2, 3, 4])), &[]).unwrap(), vec![1, 2, 3, 4]);
        assert!(encode(&ty, ArgValue::Raw(json!("too long")), &[]).is_err());
    }

    #[test]
    fn structs_accept_camel_case_keys() {
        let defs = vec![IdlTypeDef {
            name: "Settings".to_string(),
            docs: vec![],
            type_: IdlTypeDefTy::Struct {
                fields: IdlDefinedFields::Named(vec![field("fee_bps", IdlType::primitive("u16"))]),
            },
        }];
        let out = encode(&IdlType::defined("Settings"), ArgValue::Raw(json!({"feeBps": 500})), &defs).unwrap();
        assert_eq!(out, 500u16.to_le_bytes().to_vec());

        let missing = encode(&IdlType::defined("Settings"), ArgValue::Raw(json!({})), &defs);
        assert!(matches!(missing, Err(WorkbenchError::TypeMismatch { .. })));
    }

    #[test]
    fn unresolved_reference_cannot_be_encoded() {
        let err = encode(&IdlType::defined("Ghost"), ArgValue::Raw(json!({})), &[]).unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }
}
