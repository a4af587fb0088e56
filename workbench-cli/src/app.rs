//! The `workbench` command: global options, dispatch, and output.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use solana_sdk::pubkey::Pubkey;
use workbench_core::error::{WorkbenchError, WorkbenchResult};
use workbench_core::form::{missing_accounts, missing_args, FormState};
use workbench_core::idl::{IdlDoc, IdlInstruction, IdlType};

use crate::cli::{
    form_from_flags, kebab_to_snake, parse_flags, print_assembled, print_help, print_instruction_help,
    snake_to_kebab,
};
use crate::client::{Connection, KeypairWallet, ReadOnlyWallet, RpcConnection, Wallet};
use crate::config::Config;
use crate::hex::{hex_encode, parse_address};
use crate::parse::process_args;
use crate::pda::{derive_pda, SeedInput};
use crate::suite::{run_suite, ExpectedOutcome, LiveExecutor, NewTestCase, SuiteStore};
use crate::tx::{assemble, submit_and_confirm, ConfirmOptions, ProgramContext};

const BINARY_NAME: &str = "workbench";

/// Options that precede the command.
#[derive(Debug, Default, PartialEq)]
struct GlobalOptions {
    idl: Option<String>,
    program_id: Option<String>,
    url: Option<String>,
    keypair: Option<String>,
    store: Option<String>,
    dry_run: bool,
    help: bool,
}

fn split_global(args: &[String]) -> WorkbenchResult<(GlobalOptions, Vec<String>)> {
    let mut opts = GlobalOptions::default();
    let mut i = 0;
    while i < args.len() {
        let slot = match args[i].as_str() {
            "-i" | "--idl" => &mut opts.idl,
            "--program-id" => &mut opts.program_id,
            "-u" | "--url" => &mut opts.url,
            "-k" | "--keypair" => &mut opts.keypair,
            "--store" => &mut opts.store,
            "--dry-run" => {
                opts.dry_run = true;
                i += 1;
                continue;
            }
            "-h" | "--help" => {
                opts.help = true;
                i += 1;
                continue;
            }
            _ => break,
        };
        let value = args.get(i + 1).ok_or_else(|| WorkbenchError::Config {
            message: format!("{} requires a value", args[i]),
        })?;
        *slot = Some(value.clone());
        i += 2;
    }
    Ok((opts, args[i..].to_vec()))
}

/// Entry point used by the binary. Errors are printed and end the process
/// with a non-zero status.
pub async fn run() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run_with_args(&args).await {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

pub async fn run_with_args(args: &[String]) -> WorkbenchResult<()> {
    let (opts, rest) = split_global(args)?;

    let mut config = Config::load()?;
    if let Some(url) = &opts.url {
        config.rpc_url = url.clone();
    }
    if let Some(path) = &opts.keypair {
        config.keypair_path = PathBuf::from(path);
    }
    if let Some(path) = &opts.store {
        config.store_path = PathBuf::from(path);
    }
    tracing::debug!(?config, "loaded configuration");

    let Some(idl_path) = &opts.idl else {
        print_usage();
        return if opts.help || rest.is_empty() {
            Ok(())
        } else {
            Err(WorkbenchError::Config {
                message: "--idl <FILE> is required".to_string(),
            })
        };
    };
    let idl_json = fs::read_to_string(idl_path).map_err(|e| WorkbenchError::Config {
        message: format!("Failed to read IDL '{}': {}", idl_path, e),
    })?;
    let idl = IdlDoc::from_json(&idl_json)?;

    let Some(command) = rest.first().filter(|_| !opts.help) else {
        print_help(&idl, BINARY_NAME);
        return Ok(());
    };
    let command_args = &rest[1..];

    match command.as_str() {
        "help" => {
            print_help(&idl, BINARY_NAME);
            Ok(())
        }
        "idl" => {
            print_idl(&idl);
            Ok(())
        }
        "pda" => {
            let ctx = ProgramContext::from_idl(idl, opts.program_id.as_deref())?;
            cmd_pda(&ctx, command_args)
        }
        "suite" => {
            let ctx = ProgramContext::from_idl(idl, opts.program_id.as_deref())?;
            cmd_suite(&ctx, &config, command_args).await
        }
        other => {
            let ctx = ProgramContext::from_idl(idl, opts.program_id.as_deref())?;
            cmd_instruction(&ctx, &config, &kebab_to_snake(other), command_args, opts.dry_run).await
        }
    }
}

fn print_usage() {
    println!("🔧 workbench — IDL-driven program workbench");
    println!();
    println!("USAGE:");
    println!("  {} --idl <FILE> [OPTIONS] <COMMAND> [ARGS]", BINARY_NAME);
    println!();
    println!("Pass --idl to list the commands generated from a program's IDL.");
}

fn print_idl(idl: &IdlDoc) {
    println!("📄 {} v{}", idl.program_name(), idl.program_version());
    if let Some(address) = idl.program_address() {
        println!("   address: {}", address);
    }
    println!();
    println!("Instructions ({}):", idl.instructions.len());
    for ix in &idl.instructions {
        println!(
            "  {:<24} discriminator {}  {} account(s), {} arg(s)",
            ix.name,
            hex_encode(&ix.discriminator()),
            ix.accounts.len(),
            ix.args.len()
        );
    }
    let types = idl.type_table();
    if !types.is_empty() {
        println!();
        println!("Types ({}):", types.len());
        for ty in &types {
            println!("  {}", ty.name);
        }
    }
    if !idl.errors.is_empty() {
        println!();
        println!("Errors:");
        for err in &idl.errors {
            println!("  {:>6} {} {}", err.code, err.name, err.msg.as_deref().unwrap_or(""));
        }
    }
}

fn cmd_pda(ctx: &ProgramContext, args: &[String]) -> WorkbenchResult<()> {
    let (flags, positional) = parse_flags(args);
    if positional.is_empty() {
        return Err(WorkbenchError::Config {
            message: "pda needs at least one seed, e.g. string:vault pubkey:<ADDR> u64:1".to_string(),
        });
    }
    let seeds = positional
        .iter()
        .map(|s| s.parse::<SeedInput>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| WorkbenchError::Config { message })?;
    // `--<name>-account` flags name addresses that pubkey seeds can refer to.
    let accounts: BTreeMap<String, String> = flags
        .iter()
        .filter_map(|(k, v)| k.strip_suffix("-account").map(|name| (kebab_to_snake(name), v.clone())))
        .collect();

    let (address, bump) = derive_pda(&seeds, &accounts, &ctx.program_id)?;
    println!("🔑 PDA: {}", address);
    println!("   bump: {}", bump);
    println!("   program: {}", ctx.program_id);
    Ok(())
}

fn load_wallet(config: &Config) -> Box<dyn Wallet> {
    let path = config.keypair_path.display().to_string();
    match KeypairWallet::from_file(&path) {
        Ok(wallet) => Box::new(wallet),
        Err(e) => {
            tracing::warn!(error = %e, "no signing keypair available, using read-only wallet");
            Box::new(ReadOnlyWallet::new(None))
        }
    }
}

fn connect(config: &Config) -> WorkbenchResult<RpcConnection> {
    Ok(RpcConnection::new(config.rpc_url.clone(), config.commitment_config()?))
}

fn confirm_options(config: &Config) -> ConfirmOptions {
    ConfirmOptions {
        poll_interval: config.poll_interval(),
        skip_preflight: config.skip_preflight,
    }
}

async fn cmd_instruction(
    ctx: &ProgramContext,
    config: &Config,
    ix_name: &str,
    args: &[String],
    dry_run: bool,
) -> WorkbenchResult<()> {
    let ix = ctx.instruction(ix_name)?;
    let table = ctx.table();
    let (flags, _) = parse_flags(args);
    if flags.contains_key("help") || flags.contains_key("h") {
        print_instruction_help(ix, &table);
        return Ok(());
    }

    println!("📋 Instruction: {}", ix.name);
    println!();

    let form = form_from_flags(ix, &flags, &table);
    let missing = missing_flags(ix, &form);
    if !missing.is_empty() {
        return Err(WorkbenchError::Config {
            message: format!("Missing required arguments: {}", missing.join(", ")),
        });
    }

    let processed = process_args(ix, &form.args, &table)?;
    let wallet = load_wallet(config);
    let fee_payer = match wallet.pubkey() {
        Some(pubkey) => pubkey,
        None if dry_run => first_signer(ix, &form.accounts).unwrap_or_default(),
        None => {
            return Err(WorkbenchError::Submission {
                message: format!("no keypair at {}", config.keypair_path.display()),
            })
        }
    };

    let connection = connect(config)?;
    let assembled = assemble(ctx, &ix.name, &processed, &form.accounts, &fee_payer, &connection).await?;
    print_assembled(ix, &processed, &assembled);

    if dry_run {
        println!("⚠️  Dry run — omit --dry-run to submit the transaction.");
        return Ok(());
    }

    println!("📤 Submitting transaction to {}...", connection.url());
    let result = submit_and_confirm(assembled, wallet.as_ref(), &connection, confirm_options(config)).await?;
    println!("✅ Transaction confirmed");
    println!("   signature: {}", result.signature);
    Ok(())
}

/// Flags the command line still needs. Option and vector arguments may be
/// left out: they process to `None` and `[]`.
fn missing_flags(ix: &IdlInstruction, form: &FormState) -> Vec<String> {
    let mut missing: Vec<String> = missing_args(ix, form)
        .into_iter()
        .filter(|name| {
            ix.args.iter().any(|a| {
                &a.name == name && !matches!(a.type_, IdlType::Option { .. } | IdlType::Vec { .. })
            })
        })
        .map(|name| format!("--{}", snake_to_kebab(&name)))
        .collect();
    missing.extend(
        missing_accounts(ix, form)
            .into_iter()
            .map(|name| format!("--{}-account", snake_to_kebab(&name))),
    );
    missing
}

fn first_signer(ix: &IdlInstruction, accounts: &BTreeMap<String, String>) -> Option<Pubkey> {
    ix.accounts
        .iter()
        .filter(|acc| acc.signer)
        .find_map(|acc| accounts.get(&acc.name).and_then(|v| parse_address(v).ok()))
}

async fn cmd_suite(ctx: &ProgramContext, config: &Config, args: &[String]) -> WorkbenchResult<()> {
    let store = SuiteStore::open(&config.store_path)?;
    let program_id = ctx.program_id.to_string();
    let (flags, positional) = parse_flags(args);
    let word = |i: usize, what: &str| {
        positional.get(i).cloned().ok_or_else(|| WorkbenchError::Config {
            message: format!("suite {} requires <{}>", positional.first().map(String::as_str).unwrap_or(""), what),
        })
    };

    match positional.first().map(String::as_str).unwrap_or("list") {
        "list" => {
            let suites = store.suites_for_program(&program_id);
            println!("🧪 Test suites for {} ({}):", program_id, suites.len());
            for suite in suites {
                println!("  {}  {}  ({} case(s))", suite.id, suite.name, suite.test_cases.len());
            }
        }
        "create" => {
            let id = store.create_suite(&word(1, "NAME")?, &program_id)?;
            println!("✅ Created suite {}", id);
        }
        "show" => {
            let id = word(1, "ID")?;
            let suite = store.suite(&id).ok_or(WorkbenchError::SuiteNotFound { id })?;
            println!("🧪 {} ({})", suite.name, suite.id);
            for case in &suite.test_cases {
                let expected = match case.expected() {
                    ExpectedOutcome::Success => "expect success",
                    ExpectedOutcome::Failure => "expect failure",
                };
                println!("  {}  {}  {}  [{}]", case.id, case.name, case.instruction, expected);
                if let Some(description) = &case.description {
                    println!("      {}", description);
                }
            }
        }
        "delete" => {
            let id = word(1, "ID")?;
            store.delete_suite(&id)?;
            println!("🗑️  Deleted suite {}", id);
        }
        "add" => {
            let suite_id = word(1, "ID")?;
            let name = word(2, "NAME")?;
            let instruction = kebab_to_snake(&word(3, "INSTRUCTION")?);
            let ix = ctx.instruction(&instruction)?;
            let form = form_from_flags(ix, &flags, &ctx.table());
            let expected_outcome = match flags.get("expect").map(String::as_str) {
                None => None,
                Some("success") => Some(ExpectedOutcome::Success),
                Some("failure") => Some(ExpectedOutcome::Failure),
                Some(other) => {
                    return Err(WorkbenchError::Config {
                        message: format!("--expect must be success or failure, got '{}'", other),
                    })
                }
            };
            let case_id = store.add_test_case(
                &suite_id,
                NewTestCase {
                    name,
                    instruction: ix.name.clone(),
                    form,
                    expected_outcome,
                    description: flags.get("description").cloned(),
                },
            )?;
            println!("✅ Added test case {} to {}", case_id, suite_id);
        }
        "remove-case" => {
            let suite_id = word(1, "ID")?;
            let case_id = word(2, "CASE_ID")?;
            store.delete_test_case(&suite_id, &case_id)?;
            println!("🗑️  Removed test case {}", case_id);
        }
        "run" => {
            let id = word(1, "ID")?;
            let suite = store.suite(&id).ok_or(WorkbenchError::SuiteNotFound { id })?;
            store.set_current_suite(Some(&suite.id))?;
            let wallet = load_wallet(config);
            let connection = connect(config)?;
            let executor = LiveExecutor {
                ctx,
                wallet: wallet.as_ref(),
                connection: &connection as &dyn Connection,
                opts: confirm_options(config),
            };
            println!("🧪 Running {} test case(s) from '{}'", suite.test_cases.len(), suite.name);
            let report = run_suite(&suite, &executor, config.suite_delay()).await;
            for result in &report.results {
                let mark = if result.passed() { "✅" } else { "❌" };
                let detail = result
                    .signature
                    .clone()
                    .or_else(|| result.error.clone())
                    .unwrap_or_default();
                println!("  {} {} ({} ms) {}", mark, result.name, result.duration.as_millis(), detail);
            }
            println!();
            println!("{} passed, {} failed, {} total", report.passed(), report.failed(), report.total());
            if report.failed() > 0 {
                return Err(WorkbenchError::Submission {
                    message: format!("{} test case(s) did not match their expected outcome", report.failed()),
                });
            }
        }
        other => {
            return Err(WorkbenchError::Config {
                message: format!("Unknown suite command '{}'", other),
            })
        }
    }
    Ok(())
}
