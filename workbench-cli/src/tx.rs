//! Transaction assembly, submission and confirmation.
//!
//! A submission moves through `Built -> Sent -> {Confirmed, Failed, Expired}`.
//! [`assemble`] produces the built transaction, [`submit_and_confirm`] runs
//! the rest. Nothing is retried: a failed or expired transaction has to be
//! assembled again with a fresh blockhash.

use std::collections::BTreeMap;
use std::time::Duration;

use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use workbench_core::error::{WorkbenchError, WorkbenchResult};
use workbench_core::form::FormState;
use workbench_core::idl::{IdlDoc, IdlInstruction, IdlTypeDef};
use workbench_core::resolve::TypeTable;

use crate::client::{Connection, SendOptions, Wallet};
use crate::hex::parse_address;
use crate::parse::{process_args, ArgValue};
use crate::pda::{derive_from_idl_seeds, SeedContext};
use crate::serialize::encode_instruction_data;

/// The program being exercised. Passed explicitly to everything that needs
/// the IDL or the program id.
#[derive(Debug, Clone)]
pub struct ProgramContext {
    pub idl: IdlDoc,
    pub program_id: Pubkey,
    types: Vec<IdlTypeDef>,
}

impl ProgramContext {
    pub fn new(idl: IdlDoc, program_id: Pubkey) -> Self {
        let types = idl.type_table();
        ProgramContext {
            idl,
            program_id,
            types,
        }
    }

    /// Program id from `program_id`, falling back to the address the IDL
    /// declares.
    pub fn from_idl(idl: IdlDoc, program_id: Option<&str>) -> WorkbenchResult<Self> {
        let raw = program_id
            .or_else(|| idl.program_address())
            .ok_or_else(|| WorkbenchError::Config {
                message: "IDL has no program address; pass --program-id".to_string(),
            })?;
        let program_id = parse_address(raw).map_err(|_| WorkbenchError::InvalidAddress {
            label: "program id".to_string(),
            value: raw.to_string(),
        })?;
        Ok(ProgramContext::new(idl, program_id))
    }

    pub fn table(&self) -> TypeTable<'_> {
        TypeTable::new(&self.types)
    }

    pub fn instruction(&self, name: &str) -> WorkbenchResult<&IdlInstruction> {
        self.idl
            .instruction(name)
            .ok_or_else(|| WorkbenchError::UnknownInstruction {
                name: name.to_string(),
            })
    }
}

/// Where an account address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountSource {
    Supplied,
    /// Fixed address declared in the IDL
    Fixed,
    Derived { bump: u8 },
    /// Optional account left out; the program id stands in for it.
    Omitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub name: String,
    pub pubkey: Pubkey,
    pub source: AccountSource,
}

/// Resolve every account the instruction declares, in IDL order.
///
/// All non-blank supplied values are validated first. Blank accounts are
/// filled from the IDL (fixed address, then PDA seeds); optional accounts
/// fall back to the program id.
pub fn resolve_accounts(
    ctx: &ProgramContext,
    ix: &IdlInstruction,
    args: &[ArgValue],
    supplied: &BTreeMap<String, String>,
) -> WorkbenchResult<Vec<ResolvedAccount>> {
    let mut known: BTreeMap<String, Pubkey> = BTreeMap::new();
    let mut sources: BTreeMap<String, AccountSource> = BTreeMap::new();

    for (name, value) in supplied {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let pubkey = parse_address(value).map_err(|_| WorkbenchError::InvalidAccountAddress {
            name: name.clone(),
            value: value.to_string(),
        })?;
        known.insert(name.clone(), pubkey);
        sources.insert(name.clone(), AccountSource::Supplied);
    }

    for acc in &ix.accounts {
        if known.contains_key(&acc.name) {
            continue;
        }
        if let Some(address) = &acc.address {
            let pubkey = parse_address(address).map_err(|_| WorkbenchError::InvalidAccountAddress {
                name: acc.name.clone(),
                value: address.clone(),
            })?;
            known.insert(acc.name.clone(), pubkey);
            sources.insert(acc.name.clone(), AccountSource::Fixed);
        }
    }

    // PDAs may be seeded by other PDAs, so derive in passes until nothing
    // new resolves.
    let table = ctx.table();
    let mut pending: Vec<_> = ix
        .accounts
        .iter()
        .filter(|acc| !known.contains_key(&acc.name))
        .filter_map(|acc| acc.pda.as_ref().map(|pda| (acc.name.as_str(), pda)))
        .collect();
    let mut seed_errors: BTreeMap<&str, WorkbenchError> = BTreeMap::new();
    while !pending.is_empty() {
        let before = pending.len();
        let mut still_pending = Vec::new();
        for (name, pda) in pending {
            let seed_ctx = SeedContext {
                program_id: &ctx.program_id,
                accounts: &known,
                arg_defs: &ix.args,
                args,
                table: &table,
            };
            match derive_from_idl_seeds(name, &pda.seeds, &seed_ctx) {
                Ok((pubkey, bump)) => {
                    seed_errors.remove(name);
                    known.insert(name.to_string(), pubkey);
                    sources.insert(name.to_string(), AccountSource::Derived { bump });
                }
                Err(err @ WorkbenchError::UnresolvedSeed { .. }) => {
                    seed_errors.insert(name, err);
                    still_pending.push((name, pda));
                }
                Err(err) => return Err(err),
            }
        }
        if still_pending.len() == before {
            break;
        }
        pending = still_pending;
    }

    let mut resolved = Vec::with_capacity(ix.accounts.len());
    for acc in &ix.accounts {
        let entry = match (known.get(&acc.name), sources.get(&acc.name)) {
            (Some(pubkey), Some(source)) => ResolvedAccount {
                name: acc.name.clone(),
                pubkey: *pubkey,
                source: *source,
            },
            _ if acc.optional => ResolvedAccount {
                name: acc.name.clone(),
                pubkey: ctx.program_id,
                source: AccountSource::Omitted,
            },
            _ => {
                return Err(seed_errors.remove(acc.name.as_str()).unwrap_or_else(|| {
                    WorkbenchError::MissingAccount {
                        name: acc.name.clone(),
                    }
                }))
            }
        };
        tracing::debug!(account = %entry.name, pubkey = %entry.pubkey, source = ?entry.source, "resolved account");
        resolved.push(entry);
    }
    Ok(resolved)
}

/// Build the program instruction from processed args and resolved accounts.
pub fn build_instruction(
    ctx: &ProgramContext,
    ix: &IdlInstruction,
    args: &[ArgValue],
    accounts: &[ResolvedAccount],
) -> WorkbenchResult<Instruction> {
    let data = encode_instruction_data(ix, args, &ctx.table())?;
    let metas = ix
        .accounts
        .iter()
        .zip(accounts)
        .map(|(acc, resolved)| match resolved.source {
            AccountSource::Omitted => AccountMeta::new_readonly(resolved.pubkey, false),
            _ if acc.writable => AccountMeta::new(resolved.pubkey, acc.signer),
            _ => AccountMeta::new_readonly(resolved.pubkey, acc.signer),
        })
        .collect();
    Ok(Instruction {
        program_id: ctx.program_id,
        accounts: metas,
        data,
    })
}

/// An unsigned transaction stamped with a recent blockhash.
#[derive(Debug, Clone)]
pub struct AssembledTransaction {
    pub transaction: Transaction,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    pub accounts: Vec<ResolvedAccount>,
}

impl AssembledTransaction {
    pub fn instruction_data(&self) -> &[u8] {
        self.transaction
            .message
            .instructions
            .first()
            .map(|ix| ix.data.as_slice())
            .unwrap_or_default()
    }
}

/// Assemble an unsigned transaction.
///
/// Accounts and arguments are validated and encoded before the one network
/// call (the blockhash fetch), so invalid input never reaches the network.
pub async fn assemble(
    ctx: &ProgramContext,
    ix_name: &str,
    args: &[ArgValue],
    accounts: &BTreeMap<String, String>,
    fee_payer: &Pubkey,
    connection: &dyn Connection,
) -> WorkbenchResult<AssembledTransaction> {
    let ix = ctx.instruction(ix_name)?;
    let resolved = resolve_accounts(ctx, ix, args, accounts)?;
    let instruction = build_instruction(ctx, ix, args, &resolved)?;

    let latest = connection.latest_blockhash().await?;
    let mut transaction = Transaction::new_with_payer(&[instruction], Some(fee_payer));
    transaction.message.recent_blockhash = latest.blockhash;

    tracing::info!(
        instruction = ix_name,
        blockhash = %latest.blockhash,
        last_valid_block_height = latest.last_valid_block_height,
        "assembled transaction"
    );
    Ok(AssembledTransaction {
        transaction,
        blockhash: latest.blockhash,
        last_valid_block_height: latest.last_valid_block_height,
        accounts: resolved,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmOptions {
    pub poll_interval: Duration,
    pub skip_preflight: bool,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        ConfirmOptions {
            poll_interval: Duration::from_millis(500),
            skip_preflight: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub signature: Signature,
}

/// Hand the transaction to the wallet, then wait for it to confirm, fail
/// or expire.
pub async fn submit_and_confirm(
    assembled: AssembledTransaction,
    wallet: &dyn Wallet,
    connection: &dyn Connection,
    opts: ConfirmOptions,
) -> WorkbenchResult<TransactionResult> {
    let send_opts = SendOptions {
        skip_preflight: opts.skip_preflight,
    };
    let signature = wallet
        .send_transaction(assembled.transaction, connection, send_opts)
        .await
        .map_err(|err| match err {
            WorkbenchError::Submission { .. } => err,
            other => WorkbenchError::Submission {
                message: other.to_string(),
            },
        })?;
    tracing::info!(%signature, "transaction sent");

    confirm(
        connection,
        &signature,
        assembled.last_valid_block_height,
        opts.poll_interval,
    )
    .await?;
    tracing::info!(%signature, "transaction confirmed");
    Ok(TransactionResult { signature })
}

/// Consecutive failed polls tolerated before the outcome is reported as
/// unknown.
pub const MAX_POLL_ERRORS: u32 = 10;

enum Poll {
    Pending,
    Done(WorkbenchResult<()>),
}

/// Poll until the signature confirms, lands with an error, or its blockhash
/// window passes.
///
/// RPC errors while polling are retried. After [`MAX_POLL_ERRORS`] in a row
/// the result is [`WorkbenchError::ConfirmationUnknown`], which still
/// carries the signature.
pub async fn confirm(
    connection: &dyn Connection,
    signature: &Signature,
    last_valid_block_height: u64,
    poll_interval: Duration,
) -> WorkbenchResult<()> {
    let mut failures: u32 = 0;
    loop {
        match poll_once(connection, signature, last_valid_block_height).await {
            Ok(Poll::Done(outcome)) => return outcome,
            Ok(Poll::Pending) => failures = 0,
            Err(err) => {
                failures += 1;
                tracing::warn!(%signature, attempt = failures, error = %err, "confirmation poll failed");
                if failures >= MAX_POLL_ERRORS {
                    return Err(WorkbenchError::ConfirmationUnknown {
                        signature: signature.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn poll_once(
    connection: &dyn Connection,
    signature: &Signature,
    last_valid_block_height: u64,
) -> WorkbenchResult<Poll> {
    if let Some(status) = connection.signature_status(signature).await? {
        if let Some(error) = status.err {
            return Ok(Poll::Done(Err(WorkbenchError::ExecutionFailed {
                signature: signature.to_string(),
                error,
            })));
        }
        if status.confirmed {
            return Ok(Poll::Done(Ok(())));
        }
    }
    let height = connection.block_height().await?;
    if height > last_valid_block_height {
        return Ok(Poll::Done(Err(WorkbenchError::Expired {
            signature: signature.to_string(),
            last_valid_block_height,
        })));
    }
    Ok(Poll::Pending)
}

/// Process a form snapshot, assemble, submit and confirm.
pub async fn execute_transaction(
    ctx: &ProgramContext,
    ix_name: &str,
    form: &FormState,
    wallet: &dyn Wallet,
    connection: &dyn Connection,
    opts: ConfirmOptions,
) -> WorkbenchResult<TransactionResult> {
    let ix = ctx.instruction(ix_name)?;
    let args = process_args(ix, &form.args, &ctx.table())?;
    let fee_payer = wallet.pubkey().ok_or_else(|| WorkbenchError::Submission {
        message: "wallet not connected".to_string(),
    })?;
    let assembled = assemble(ctx, ix_name, &args, &form.accounts, &fee_payer, connection).await?;
    submit_and_confirm(assembled, wallet, connection, opts).await
}
