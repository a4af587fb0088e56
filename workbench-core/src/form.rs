//! Form state for a selected instruction, and completeness checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::idl::IdlInstruction;

/// Untyped user input for one instruction.
///
/// `args` maps argument name to the raw form value (string, number, array,
/// or a single-key object naming an enum variant). `accounts` maps account
/// name to an address string, empty when not filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
}

impl FormState {
    /// Blank account entries for every account the instruction declares.
    pub fn blank_accounts(ix: &IdlInstruction) -> BTreeMap<String, String> {
        ix.accounts
            .iter()
            .map(|acc| (acc.name.clone(), String::new()))
            .collect()
    }

    pub fn set_arg(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }

    pub fn set_account(&mut self, name: impl Into<String>, address: impl Into<String>) {
        self.accounts.insert(name.into(), address.into());
    }

    pub fn account(&self, name: &str) -> Option<&str> {
        self.accounts
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// A form value counts as blank when absent, null, or whitespace-only text.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Arguments with no value entered.
pub fn missing_args(ix: &IdlInstruction, form: &FormState) -> Vec<String> {
    ix.args
        .iter()
        .filter(|arg| is_blank(form.args.get(&arg.name)))
        .map(|arg| arg.name.clone())
        .collect()
}

/// Required accounts with no address entered. Optional accounts and those
/// the IDL can fill in on its own (fixed address or PDA) are skipped.
pub fn missing_accounts(ix: &IdlInstruction, form: &FormState) -> Vec<String> {
    ix.accounts
        .iter()
        .filter(|acc| !acc.optional && !acc.is_derivable())
        .filter(|acc| form.account(&acc.name).is_none())
        .map(|acc| acc.name.clone())
        .collect()
}

pub fn is_complete(ix: &IdlInstruction, form: &FormState) -> bool {
    missing_args(ix, form).is_empty() && missing_accounts(ix, form).is_empty()
}

/// `init_vault` -> `Init vault`.
pub fn display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().replace('_', " "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::{IdlAccountItem, IdlField, IdlType};
    use serde_json::json;

    fn account(name: &str, optional: bool) -> IdlAccountItem {
        IdlAccountItem {
            name: name.to_string(),
            writable: false,
            signer: false,
            optional,
            docs: vec![],
            address: None,
            pda: None,
        }
    }

    fn instruction() -> IdlInstruction {
        let mut system = account("system_program", false);
        system.address = Some("11111111111111111111111111111111".to_string());
        IdlInstruction {
            name: "deposit".to_string(),
            docs: vec![],
            discriminator: None,
            accounts: vec![account("user", false), account("referrer", true), system],
            args: vec![IdlField {
                name: "amount".to_string(),
                docs: vec![],
                type_: IdlType::primitive("u64"),
            }],
        }
    }

    #[test]
    fn blank_form_reports_required_inputs() {
        let ix = instruction();
        let form = FormState {
            args: Map::new(),
            accounts: FormState::blank_accounts(&ix),
        };
        assert_eq!(missing_args(&ix, &form), vec!["amount"]);
        assert_eq!(missing_accounts(&ix, &form), vec!["user"]);
        assert!(!is_complete(&ix, &form));
    }

    #[test]
    fn filled_form_is_complete() {
        let ix = instruction();
        let mut form = FormState::default();
        form.set_arg("amount", json!("10"));
        form.set_account("user", "  So11111111111111111111111111111111111111112 ");
        assert!(is_complete(&ix, &form));
    }

    #[test]
    fn whitespace_counts_as_blank() {
        assert!(is_blank(Some(&json!("   "))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!({"active": {}}))));
    }

    #[test]
    fn display_name_capitalizes_and_spaces() {
        assert_eq!(display_name("init_vault"), "Init vault");
        assert_eq!(display_name(""), "");
    }
}
