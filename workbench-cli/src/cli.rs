//! CLI helpers: help text, flag parsing, form building, output.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use workbench_core::form::{display_name, FormState};
use workbench_core::idl::{IdlDoc, IdlInstruction, IdlType};
use workbench_core::resolve::{resolve, Resolved, TypeTable};

use crate::hex::hex_encode;
use crate::parse::{initialize_args, is_numeric, variant_key, ArgValue};
use crate::tx::{AccountSource, AssembledTransaction};

/// Print help for all commands derived from the IDL.
pub fn print_help(idl: &IdlDoc, binary_name: &str) {
    println!("🔧 {} v{} — IDL-driven workbench", idl.program_name(), idl.program_version());
    println!();
    println!("USAGE:");
    println!("  {} [OPTIONS] <COMMAND> [ARGS]", binary_name);
    println!();
    println!("OPTIONS:");
    println!("  -i, --idl <FILE>           IDL JSON file");
    println!("  --program-id <ADDR>        Program address (defaults to the IDL address)");
    println!("  -u, --url <URL>            RPC endpoint");
    println!("  -k, --keypair <FILE>       Signing keypair");
    println!("  --store <FILE>             Test suite store");
    println!("  --dry-run                  Print parsed/serialized data without submitting");
    println!();
    println!("COMMANDS:");
    println!("  idl                        Print IDL information");
    println!("  pda <KIND:VALUE>...        Derive a PDA from seeds (string, pubkey, u8, u16, u32, u64)");
    println!("  suite <SUBCOMMAND>         list | create <NAME> | show <ID> | delete <ID>");
    println!("                             add <ID> <NAME> <INSTRUCTION> [ARGS] [--expect success|failure]");
    println!("                             remove-case <ID> <CASE_ID> | run <ID>");

    for ix in &idl.instructions {
        let cmd = snake_to_kebab(&ix.name);
        let args_desc: Vec<String> = ix
            .args
            .iter()
            .map(|a| format!("--{} <{}>", snake_to_kebab(&a.name), idl_type_hint(&a.type_)))
            .collect();
        let acct_desc: Vec<String> = ix
            .accounts
            .iter()
            .filter(|a| !a.is_derivable())
            .map(|a| {
                let flag = format!("--{}-account <BASE58>", snake_to_kebab(&a.name));
                if a.optional { format!("[{}]", flag) } else { flag }
            })
            .collect();
        let all_args: Vec<String> = args_desc.into_iter().chain(acct_desc).collect();
        println!("  {:<26} {}", cmd, all_args.join(" "));
    }
    println!();
    println!("TYPE FORMATS:");
    println!("  u8 .. u256, i8 .. i256  Decimal number");
    println!("  pubkey                  Base58 address or 0x-prefixed hex");
    println!("  [u8; N]                 Hex string (2*N hex chars) or UTF-8 string (≤N chars, right-padded)");
    println!("  Vec<T>                  Comma-separated values or a JSON array");
    println!("  enum                    Variant name, or JSON {{\"variant\": {{fields}}}}");
    println!("  struct                  JSON object");
    println!();
    println!("Auto-generated from IDL. Accounts with a fixed address or PDA seeds are filled in automatically.");
}

/// Print detailed help for a single instruction.
pub fn print_instruction_help(ix: &IdlInstruction, table: &TypeTable<'_>) {
    println!(
        "📋 {} — {} account(s), {} arg(s)",
        display_name(&ix.name),
        ix.accounts.len(),
        ix.args.len()
    );
    for doc in &ix.docs {
        println!("  {}", doc);
    }
    println!();
    println!("ACCOUNTS:");
    for acc in &ix.accounts {
        let mut flags = vec![];
        if acc.writable {
            flags.push("mut");
        }
        if acc.signer {
            flags.push("signer");
        }
        if acc.optional {
            flags.push("optional");
        }
        let flags_str = if flags.is_empty() { String::new() } else { format!(" [{}]", flags.join(", ")) };
        let note = if acc.pda.is_some() {
            " (PDA — auto-computed)"
        } else if acc.address.is_some() {
            " (fixed address)"
        } else {
            ""
        };
        println!("  {}{}{}", acc.name, flags_str, note);
    }
    println!();
    println!("ARGS:");
    for arg in &ix.args {
        let variants = match resolve(&arg.type_, table) {
            Resolved::Enum(variants) => format!(
                " one of: {}",
                variants.iter().map(|v| variant_key(&v.name)).collect::<Vec<_>>().join(", ")
            ),
            _ => String::new(),
        };
        println!(
            "  --{:<25} {} ({}) — format: {}{}",
            snake_to_kebab(&arg.name),
            arg.name,
            idl_type_display(&arg.type_),
            idl_type_hint(&arg.type_),
            variants
        );
    }
    for acc in &ix.accounts {
        if !acc.is_derivable() {
            println!("  --{}-account    Address for '{}'", snake_to_kebab(&acc.name), acc.name);
        }
    }
}

/// Collect `--key value` pairs. A flag without a value is recorded as
/// `"true"`; bare words are returned separately, in order.
pub fn parse_flags(args: &[String]) -> (BTreeMap<String, String>, Vec<String>) {
    let mut map = BTreeMap::new();
    let mut positional = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if let Some(key) = args[i].strip_prefix("--") {
            if i + 1 < args.len() && !args[i + 1].starts_with("--") {
                map.insert(key.to_string(), args[i + 1].clone());
                i += 2;
            } else {
                map.insert(key.to_string(), "true".to_string());
                i += 1;
            }
        } else {
            positional.push(args[i].clone());
            i += 1;
        }
    }
    (map, positional)
}

/// Build a form snapshot for `ix` from parsed flags, starting from the
/// default argument values.
pub fn form_from_flags(ix: &IdlInstruction, flags: &BTreeMap<String, String>, table: &TypeTable<'_>) -> FormState {
    let mut form = FormState {
        args: initialize_args(ix, table),
        accounts: FormState::blank_accounts(ix),
    };
    for arg in &ix.args {
        if let Some(raw) = flags.get(&snake_to_kebab(&arg.name)) {
            form.set_arg(arg.name.clone(), flag_value(raw, &arg.type_, table));
        }
    }
    for acc in &ix.accounts {
        if let Some(raw) = flags.get(&format!("{}-account", snake_to_kebab(&acc.name))) {
            form.set_account(acc.name.clone(), raw.clone());
        }
    }
    form
}

/// Turn flag text into a form value. JSON objects and arrays are taken
/// literally; a bare word for an enum names the variant; vectors split on
/// commas.
pub fn flag_value(raw: &str, ty: &IdlType, table: &TypeTable<'_>) -> Value {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
            return json;
        }
    }
    if let Resolved::Enum(_) = resolve(ty, table) {
        if !trimmed.is_empty() {
            let mut choice = Map::new();
            choice.insert(variant_key(trimmed), Value::Object(Map::new()));
            return Value::Object(choice);
        }
    }
    match ty {
        IdlType::Vec { .. } if !trimmed.is_empty() => Value::Array(
            trimmed
                .split(',')
                .map(|item| Value::String(item.trim().to_string()))
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    }
}

/// Dry-run / pre-submit summary of an assembled transaction.
pub fn print_assembled(ix: &IdlInstruction, args: &[ArgValue], assembled: &AssembledTransaction) {
    println!("Accounts:");
    for acc in &assembled.accounts {
        let note = match acc.source {
            AccountSource::Supplied => String::new(),
            AccountSource::Fixed => " (fixed)".to_string(),
            AccountSource::Derived { bump } => format!(" (PDA, bump {})", bump),
            AccountSource::Omitted => " (omitted)".to_string(),
        };
        println!("  📦 {} → {}{}", acc.name, acc.pubkey, note);
    }
    println!();
    println!("Arguments (parsed):");
    for (arg, val) in ix.args.iter().zip(args) {
        println!("  {} = {}", arg.name, val);
    }
    println!();
    println!("🔧 Transaction:");
    println!("  instruction: {} {{", to_pascal_case(&ix.name));
    for (arg, val) in ix.args.iter().zip(args) {
        println!("    {}: {},", arg.name, val);
    }
    println!("  }}");
    println!("  recent blockhash: {}", assembled.blockhash);
    println!("  last valid block height: {}", assembled.last_valid_block_height);
    println!();
    let data = assembled.instruction_data();
    println!("  Serialized instruction data ({} bytes):", data.len());
    println!("    {}", hex_encode(data));
    println!();
}

// ─── String utilities ────────────────────────────────────────────

pub fn snake_to_kebab(s: &str) -> String {
    s.replace('_', "-")
}

pub fn kebab_to_snake(s: &str) -> String {
    s.replace('-', "_")
}

pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(ch) => ch.to_uppercase().collect::<String>() + c.as_str(),
            }
        })
        .collect()
}

pub fn idl_type_display(ty: &IdlType) -> String {
    match ty {
        IdlType::Primitive(s) => s.clone(),
        IdlType::Vec { vec } => format!("Vec<{}>", idl_type_display(vec)),
        IdlType::Option { option } => format!("Option<{}>", idl_type_display(option)),
        IdlType::Defined { defined } => defined.name().to_string(),
        IdlType::Array { array } => format!("[{}; {}]", idl_type_display(&array.0), array.1),
        IdlType::Unknown(raw) => raw.to_string(),
    }
}

pub fn idl_type_hint(ty: &IdlType) -> String {
    match ty {
        IdlType::Primitive(s) => match s.as_str() {
            p if is_numeric(p) => "NUMBER".to_string(),
            "pubkey" | "publicKey" => "ADDRESS".to_string(),
            "bool" => "true|false".to_string(),
            "bytes" => "0xHEX|STR".to_string(),
            _ => s.to_uppercase(),
        },
        IdlType::Vec { .. } => "LIST".to_string(),
        IdlType::Option { option } => format!("OPT<{}>", idl_type_hint(option)),
        IdlType::Defined { defined } => defined.name().to_string(),
        IdlType::Array { array } => match &*array.0 {
            IdlType::Primitive(p) if p == "u8" => format!("HEX{}|STR≤{}", array.1 * 2, array.1),
            _ => format!("[_; {}]", array.1),
        },
        IdlType::Unknown(_) => "JSON".to_string(),
    }
}
