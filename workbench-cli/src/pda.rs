//! PDA (Program Derived Address) derivation.
//!
//! Two entry points: [`derive_pda`] for explicit typed seed lists entered by
//! the user, and [`derive_from_idl_seeds`] for account PDAs declared in the
//! IDL itself.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use solana_sdk::pubkey::{Pubkey, MAX_SEEDS, MAX_SEED_LEN};
use workbench_core::error::{WorkbenchError, WorkbenchResult};
use workbench_core::idl::{to_snake_case, IdlField, IdlSeed};
use workbench_core::resolve::TypeTable;

use crate::hex::parse_address;
use crate::parse::ArgValue;
use crate::serialize::encode_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKind {
    String,
    /// Address literal, or the name of an account whose address is used
    Address,
    U8,
    U16,
    U32,
    U64,
}

impl FromStr for SeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "str" => Ok(SeedKind::String),
            "pubkey" | "publicKey" | "address" => Ok(SeedKind::Address),
            "u8" => Ok(SeedKind::U8),
            "u16" => Ok(SeedKind::U16),
            "u32" => Ok(SeedKind::U32),
            "u64" => Ok(SeedKind::U64),
            other => Err(format!(
                "Unknown seed kind '{}' (expected string, pubkey, u8, u16, u32 or u64)",
                other
            )),
        }
    }
}

impl fmt::Display for SeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeedKind::String => "string",
            SeedKind::Address => "pubkey",
            SeedKind::U8 => "u8",
            SeedKind::U16 => "u16",
            SeedKind::U32 => "u32",
            SeedKind::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// One user-entered seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInput {
    pub kind: SeedKind,
    pub value: String,
    /// Used in error messages.
    pub label: String,
}

impl SeedInput {
    pub fn new(kind: SeedKind, value: impl Into<String>) -> Self {
        SeedInput {
            kind,
            value: value.into(),
            label: format!("{} seed", kind),
        }
    }
}

/// `kind:value`, e.g. `string:vault` or `u64:42`. The value keeps any
/// further colons.
impl FromStr for SeedInput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("Seed '{}' must look like kind:value", s))?;
        Ok(SeedInput::new(kind.trim().parse()?, value))
    }
}

/// Encode one seed to bytes.
///
/// Address seeds first look the value up as an account name in `accounts`
/// and fall back to parsing it as an address literal.
pub fn encode_seed(seed: &SeedInput, accounts: &BTreeMap<String, String>) -> WorkbenchResult<Vec<u8>> {
    let trimmed = seed.value.trim();
    if trimmed.is_empty() {
        return Err(WorkbenchError::EmptyValue {
            label: seed.label.clone(),
        });
    }

    let number = |e: std::num::ParseIntError| {
        WorkbenchError::invalid_number(seed.label.as_str(), trimmed, format!("{} for {}", e, seed.kind))
    };

    match seed.kind {
        SeedKind::String => Ok(seed.value.as_bytes().to_vec()),
        SeedKind::Address => {
            let address = accounts
                .get(trimmed)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(trimmed);
            let pubkey = parse_address(address).map_err(|_| WorkbenchError::InvalidAddress {
                label: seed.label.clone(),
                value: address.to_string(),
            })?;
            Ok(pubkey.to_bytes().to_vec())
        }
        SeedKind::U8 => Ok(trimmed.parse::<u8>().map_err(number)?.to_le_bytes().to_vec()),
        SeedKind::U16 => Ok(trimmed.parse::<u16>().map_err(number)?.to_le_bytes().to_vec()),
        SeedKind::U32 => Ok(trimmed.parse::<u32>().map_err(number)?.to_le_bytes().to_vec()),
        SeedKind::U64 => Ok(trimmed.parse::<u64>().map_err(number)?.to_le_bytes().to_vec()),
    }
}

/// Derive `(address, bump)` from an ordered seed list.
pub fn derive_pda(
    seeds: &[SeedInput],
    accounts: &BTreeMap<String, String>,
    program_id: &Pubkey,
) -> WorkbenchResult<(Pubkey, u8)> {
    let buffers = seeds
        .iter()
        .map(|seed| encode_seed(seed, accounts))
        .collect::<WorkbenchResult<Vec<_>>>()?;
    find_address(&buffers, program_id)
}

/// Seeds are checked against the runtime limits first so an oversized seed
/// is not reported as a failed bump search. The bump takes one of the
/// `MAX_SEEDS` slots.
fn find_address(buffers: &[Vec<u8>], program_id: &Pubkey) -> WorkbenchResult<(Pubkey, u8)> {
    if buffers.len() >= MAX_SEEDS {
        return Err(WorkbenchError::TooManySeeds {
            count: buffers.len(),
            max: MAX_SEEDS - 1,
        });
    }
    if let Some((index, seed)) = buffers.iter().enumerate().find(|(_, b)| b.len() > MAX_SEED_LEN) {
        return Err(WorkbenchError::SeedTooLong {
            index,
            len: seed.len(),
            max: MAX_SEED_LEN,
        });
    }
    let refs: Vec<&[u8]> = buffers.iter().map(Vec::as_slice).collect();
    Pubkey::try_find_program_address(&refs, program_id).ok_or_else(|| {
        WorkbenchError::DerivationExhausted {
            program_id: program_id.to_string(),
        }
    })
}

/// Inputs an IDL seed can draw on while an instruction is being assembled.
pub struct SeedContext<'a> {
    pub program_id: &'a Pubkey,
    /// Addresses resolved so far, by account name.
    pub accounts: &'a BTreeMap<String, Pubkey>,
    pub arg_defs: &'a [IdlField],
    pub args: &'a [ArgValue],
    pub table: &'a TypeTable<'a>,
}

/// Derive the PDA an IDL account declares.
///
/// Const seeds are used as-is, account seeds take the referenced account's
/// address, and arg seeds take the argument's wire encoding (raw bytes for
/// strings).
pub fn derive_from_idl_seeds(
    account: &str,
    seeds: &[IdlSeed],
    ctx: &SeedContext<'_>,
) -> WorkbenchResult<(Pubkey, u8)> {
    let mut buffers = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let bytes = match seed {
            IdlSeed::Const { value } => value.to_bytes(),
            IdlSeed::Account { path } => lookup_account(ctx, path)
                .map(|pk| pk.to_bytes().to_vec())
                .ok_or_else(|| unresolved(account, path))?,
            IdlSeed::Arg { path } => arg_seed_bytes(account, path, ctx)?,
        };
        buffers.push(bytes);
    }
    let derived = find_address(&buffers, ctx.program_id)?;
    tracing::debug!(account, pda = %derived.0, bump = derived.1, "derived PDA from IDL seeds");
    Ok(derived)
}

fn unresolved(account: &str, path: &str) -> WorkbenchError {
    WorkbenchError::UnresolvedSeed {
        account: account.to_string(),
        reference: path.to_string(),
    }
}

/// Paths into account data (`vault.owner`) are not resolvable offline.
fn lookup_account(ctx: &SeedContext<'_>, path: &str) -> Option<Pubkey> {
    if path.contains('.') {
        return None;
    }
    let snake = to_snake_case(path);
    ctx.accounts
        .get(path)
        .or_else(|| ctx.accounts.get(&snake))
        .copied()
}

fn arg_seed_bytes(account: &str, path: &str, ctx: &SeedContext<'_>) -> WorkbenchResult<Vec<u8>> {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or(path);
    let index = ctx
        .arg_defs
        .iter()
        .position(|arg| arg.name == head || arg.name == to_snake_case(head))
        .ok_or_else(|| unresolved(account, path))?;
    let def = &ctx.arg_defs[index];
    let value = ctx.args.get(index).ok_or_else(|| unresolved(account, path))?;

    if segments.next().is_some() {
        return Err(unresolved(account, path));
    }

    match value {
        ArgValue::Str(s) => Ok(s.as_bytes().to_vec()),
        ArgValue::Null => Err(unresolved(account, path)),
        other => {
            let mut out = Vec::new();
            encode_value(&mut out, &def.name, &def.type_, other, ctx.table)?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use workbench_core::idl::{IdlConstValue, IdlType};

    fn program() -> Pubkey {
        Pubkey::new_from_array([7u8; 32])
    }

    #[test]
    fn integer_seeds_are_little_endian() {
        let none = BTreeMap::new();
        assert_eq!(encode_seed(&SeedInput::new(SeedKind::U32, "1"), &none).unwrap(), vec![1, 0, 0, 0]);
        assert_eq!(
            encode_seed(&SeedInput::new(SeedKind::U64, "4294967296"), &none).unwrap(),
            vec![0, 0, 0, 0, 1, 0, 0, 0]
        );
        assert_eq!(encode_seed(&SeedInput::new(SeedKind::U16, " 258 "), &none).unwrap(), vec![2, 1]);
    }

    #[test]
    fn out_of_range_seeds_fail() {
        let none = BTreeMap::new();
        for (kind, value) in [(SeedKind::U8, "300"), (SeedKind::U16, "-1"), (SeedKind::U64, "18446744073709551616")] {
            let err = encode_seed(&SeedInput::new(kind, value), &none).unwrap_err();
            assert!(matches!(err, WorkbenchError::InvalidNumber { .. }), "{:?}", err);
        }
    }

    #[test]
    fn blank_seeds_are_rejected() {
        let none = BTreeMap::new();
        for kind in [SeedKind::String, SeedKind::Address, SeedKind::U8, SeedKind::U64] {
            let err = encode_seed(&SeedInput::new(kind, "   "), &none).unwrap_err();
            assert!(matches!(err, WorkbenchError::EmptyValue { .. }));
        }
    }

    #[test]
    fn string_seed_keeps_exact_bytes() {
        let none = BTreeMap::new();
        assert_eq!(encode_seed(&SeedInput::new(SeedKind::String, "vault"), &none).unwrap(), b"vault");
    }

    #[test]
    fn address_seed_prefers_account_name() {
        let owner = Pubkey::new_from_array([3u8; 32]);
        let mut accounts = BTreeMap::new();
        accounts.insert("owner".to_string(), owner.to_string());
        let bytes = encode_seed(&SeedInput::new(SeedKind::Address, "owner"), &accounts).unwrap();
        assert_eq!(bytes, owner.to_bytes().to_vec());

        let err = encode_seed(&SeedInput::new(SeedKind::Address, "nobody"), &accounts).unwrap_err();
        assert!(matches!(err, WorkbenchError::InvalidAddress { .. }));
    }

    #[test]
    fn derivation_is_deterministic() {
        let owner = Pubkey::new_from_array([3u8; 32]);
        let seeds = vec![
            SeedInput::new(SeedKind::String, "vault"),
            SeedInput::new(SeedKind::Address, owner.to_string()),
        ];
        let none = BTreeMap::new();
        let first = derive_pda(&seeds, &none, &program()).unwrap();
        let second = derive_pda(&seeds, &none, &program()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Pubkey::find_program_address(&[b"vault", owner.as_ref()], &program()));
    }

    #[test]
    fn oversized_seeds_name_the_limit() {
        let none = BTreeMap::new();
        let long = vec![
            SeedInput::new(SeedKind::String, "vault"),
            SeedInput::new(SeedKind::String, "x".repeat(33)),
        ];
        assert_eq!(
            derive_pda(&long, &none, &program()),
            Err(WorkbenchError::SeedTooLong { index: 1, len: 33, max: 32 })
        );

        let exact = vec![SeedInput::new(SeedKind::String, "x".repeat(32))];
        assert!(derive_pda(&exact, &none, &program()).is_ok());

        let many: Vec<_> = (0..16).map(|i| SeedInput::new(SeedKind::U8, i.to_string())).collect();
        assert_eq!(
            derive_pda(&many, &none, &program()),
            Err(WorkbenchError::TooManySeeds { count: 16, max: 15 })
        );
        assert!(derive_pda(&many[..15], &none, &program()).is_ok());
    }

    #[test]
    fn parses_seed_text() {
        let seed: SeedInput = "string:a:b".parse().unwrap();
        assert_eq!(seed.kind, SeedKind::String);
        assert_eq!(seed.value, "a:b");
        assert!("u128:1".parse::<SeedInput>().is_err());
        assert!("vault".parse::<SeedInput>().is_err());
    }

    #[test]
    fn idl_seeds_combine_const_account_and_arg() {
        let user = Pubkey::new_from_array([5u8; 32]);
        let mut accounts = BTreeMap::new();
        accounts.insert("user".to_string(), user);
        let arg_defs = vec![IdlField {
            name: "vault_id".to_string(),
            docs: vec![],
            type_: IdlType::primitive("u64"),
        }];
        let args = vec![ArgValue::Int(BigInt::from(9))];
        let table = TypeTable::empty();
        let program_id = program();
        let ctx = SeedContext {
            program_id: &program_id,
            accounts: &accounts,
            arg_defs: &arg_defs,
            args: &args,
            table: &table,
        };
        let seeds = vec![
            IdlSeed::Const { value: IdlConstValue::Bytes(b"vault".to_vec()) },
            IdlSeed::Account { path: "user".to_string() },
            IdlSeed::Arg { path: "vaultId".to_string() },
        ];
        let derived = derive_from_idl_seeds("vault", &seeds, &ctx).unwrap();
        let expected = Pubkey::find_program_address(
            &[b"vault", user.as_ref(), &9u64.to_le_bytes()],
            &program_id,
        );
        assert_eq!(derived, expected);

        let missing = vec![IdlSeed::Account { path: "authority".to_string() }];
        assert_eq!(
            derive_from_idl_seeds("vault", &missing, &ctx).unwrap_err(),
            WorkbenchError::UnresolvedSeed {
                account: "vault".to_string(),
                reference: "authority".to_string(),
            }
        );
    }
}
