//! IDL (Interface Definition Language) types for on-chain programs.
//!
//! Both Anchor IDL layouts are accepted: the legacy one (`isMut`,
//! `publicKey`, `defined: "Name"`, `metadata.address`) and the current one
//! (`writable`, `pubkey`, `defined: { name }`, top-level `address`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::WorkbenchError;

/// Top-level IDL document for a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IdlMetadata>,
    pub instructions: Vec<IdlInstruction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<IdlAccountDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<IdlTypeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IdlErrorCode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdlMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// An instruction in the IDL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlInstruction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Vec<u8>>,
    pub accounts: Vec<IdlAccountItem>,
    pub args: Vec<IdlField>,
}

/// An account expected by an instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlAccountItem {
    pub name: String,
    #[serde(default, alias = "isMut")]
    pub writable: bool,
    #[serde(default, alias = "isSigner")]
    pub signer: bool,
    #[serde(default, alias = "isOptional")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<String>,
    /// Fixed address (system program, sysvars, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pda: Option<IdlPda>,
}

impl IdlAccountItem {
    /// True when the IDL alone is enough to fill in this account.
    pub fn is_derivable(&self) -> bool {
        self.address.is_some() || self.pda.is_some()
    }
}

/// Seeds that derive the account address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlPda {
    pub seeds: Vec<IdlSeed>,
}

/// A seed component for PDA derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IdlSeed {
    #[serde(rename = "const")]
    Const { value: IdlConstValue },
    #[serde(rename = "account")]
    Account { path: String },
    #[serde(rename = "arg")]
    Arg { path: String },
}

/// Const seeds are byte arrays in current IDLs and plain strings in legacy ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdlConstValue {
    Bytes(Vec<u8>),
    Str(String),
}

impl IdlConstValue {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            IdlConstValue::Bytes(bytes) => bytes.clone(),
            IdlConstValue::Str(s) => s.as_bytes().to_vec(),
        }
    }
}

/// A named, typed slot: an instruction argument or a struct field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdlField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<String>,
    #[serde(rename = "type")]
    pub type_: IdlType,
}

/// Type representation in the IDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdlType {
    Primitive(String),
    Vec { vec: Box<IdlType> },
    Option { option: Box<IdlType> },
    Defined { defined: IdlDefined },
    Array { array: (Box<IdlType>, usize) },
    /// Any other shape (`{"generic": "T"}`, newer layouts). Kept verbatim
    /// so one unfamiliar type does not reject the whole document.
    Unknown(serde_json::Value),
}

/// Reference to a user-defined type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdlDefined {
    Name(String),
    Generic {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        generics: Vec<serde_json::Value>,
    },
}

impl IdlDefined {
    pub fn name(&self) -> &str {
        match self {
            IdlDefined::Name(name) => name,
            IdlDefined::Generic { name, .. } => name,
        }
    }
}

impl IdlType {
    pub fn primitive(name: &str) -> Self {
        IdlType::Primitive(name.to_string())
    }

    pub fn option(inner: IdlType) -> Self {
        IdlType::Option { option: Box::new(inner) }
    }

    pub fn vec(inner: IdlType) -> Self {
        IdlType::Vec { vec: Box::new(inner) }
    }

    pub fn defined(name: &str) -> Self {
        IdlType::Defined { defined: IdlDefined::Name(name.to_string()) }
    }
}

/// Named type definition from the IDL type table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlTypeDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<String>,
    #[serde(rename = "type")]
    pub type_: IdlTypeDefTy,
}

/// Shape of a user-defined type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IdlTypeDefTy {
    Struct {
        #[serde(default)]
        fields: IdlDefinedFields,
    },
    Enum { variants: Vec<IdlEnumVariant> },
    Type { alias: IdlType },
}

/// Struct and variant fields are either named or positional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdlDefinedFields {
    Named(Vec<IdlField>),
    Tuple(Vec<IdlType>),
}

impl Default for IdlDefinedFields {
    fn default() -> Self {
        IdlDefinedFields::Named(vec![])
    }
}

impl IdlDefinedFields {
    pub fn is_empty(&self) -> bool {
        match self {
            IdlDefinedFields::Named(fields) => fields.is_empty(),
            IdlDefinedFields::Tuple(types) => types.is_empty(),
        }
    }
}

/// An enum variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdlEnumVariant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<IdlDefinedFields>,
}

/// Account type entry. Legacy IDLs carry the layout inline; current ones
/// only the discriminator and keep the layout in `types`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlAccountDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Vec<u8>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<IdlTypeDefTy>,
}

/// Error definition in the IDL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlErrorCode {
    pub code: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl IdlDoc {
    pub fn from_json(json: &str) -> Result<Self, WorkbenchError> {
        serde_json::from_str(json).map_err(|e| WorkbenchError::Idl {
            message: e.to_string(),
        })
    }

    /// Program name from whichever layout the document uses.
    pub fn program_name(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.name.as_deref()))
            .unwrap_or("program")
    }

    pub fn program_version(&self) -> &str {
        self.version
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.version.as_deref()))
            .unwrap_or("0.0.0")
    }

    /// Declared program address, if the IDL carries one.
    pub fn program_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.address.as_deref()))
    }

    /// Exact match first, then by snake_case spelling (`initVault` finds
    /// `init_vault` and the reverse).
    pub fn instruction(&self, name: &str) -> Option<&IdlInstruction> {
        self.instructions.iter().find(|ix| ix.name == name).or_else(|| {
            let wanted = to_snake_case(name);
            self.instructions
                .iter()
                .find(|ix| to_snake_case(&ix.name) == wanted)
        })
    }

    /// The user-defined type table: `types`, then legacy inline account layouts.
    pub fn type_table(&self) -> Vec<IdlTypeDef> {
        let mut table = self.types.clone();
        for acc in &self.accounts {
            if let Some(ty) = &acc.type_ {
                table.push(IdlTypeDef {
                    name: acc.name.clone(),
                    docs: vec![],
                    type_: ty.clone(),
                });
            }
        }
        table
    }
}

impl IdlInstruction {
    /// The 8-byte instruction discriminator.
    ///
    /// Uses the explicit IDL value when present, otherwise Anchor's
    /// `sha256("global:<snake_case_name>")[..8]`.
    pub fn discriminator(&self) -> [u8; 8] {
        if let Some(explicit) = &self.discriminator {
            if explicit.len() == 8 {
                let mut out = [0u8; 8];
                out.copy_from_slice(explicit);
                return out;
            }
            tracing::warn!(
                instruction = %self.name,
                len = explicit.len(),
                "ignoring discriminator that is not 8 bytes"
            );
        }
        let preimage = format!("global:{}", to_snake_case(&self.name));
        let hash = Sha256::digest(preimage.as_bytes());
        let mut out = [0u8; 8];
        out.copy_from_slice(&hash[..8]);
        out
    }

    pub fn account(&self, name: &str) -> Option<&IdlAccountItem> {
        self.accounts.iter().find(|acc| acc.name == name)
    }
}

/// `initVault` / `init_vault` -> `init_vault`.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
