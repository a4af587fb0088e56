mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{confirmed, FakeConnection, LAST_VALID, VAULT_IDL};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use workbench_cli::client::{KeypairWallet, ReadOnlyWallet, SignatureStatus};
use workbench_cli::parse::process_args;
use workbench_cli::tx::{
    assemble, execute_transaction, submit_and_confirm, ConfirmOptions, ProgramContext, MAX_POLL_ERRORS,
};
use workbench_core::error::WorkbenchError;
use workbench_core::form::FormState;
use workbench_core::idl::IdlDoc;

fn context() -> ProgramContext {
    ProgramContext::from_idl(IdlDoc::from_json(VAULT_IDL).unwrap(), None).unwrap()
}

fn fast() -> ConfirmOptions {
    ConfirmOptions {
        poll_interval: Duration::from_millis(1),
        skip_preflight: true,
    }
}

fn deposit_form(user: &Pubkey) -> FormState {
    let mut form = FormState::default();
    form.set_arg("amount", json!("1000"));
    form.set_arg("mode", json!({"delayed": {}}));
    form.set_arg("memo", json!(""));
    form.set_account("user", user.to_string());
    form.set_account("vault", "");
    form
}

#[tokio::test]
async fn invalid_account_fails_before_any_network_call() {
    let ctx = context();
    let ix = ctx.instruction("deposit").unwrap();
    let user = Pubkey::new_unique();
    let mut form = deposit_form(&user);
    form.set_account("vault", "not-a-key");
    let args = process_args(ix, &form.args, &ctx.table()).unwrap();

    let connection = FakeConnection::new();
    let err = assemble(&ctx, "deposit", &args, &form.accounts, &user, &connection)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        WorkbenchError::InvalidAccountAddress {
            name: "vault".to_string(),
            value: "not-a-key".to_string(),
        }
    );
    assert!(connection.calls().is_empty());
}

#[tokio::test]
async fn assembled_transaction_is_stamped_and_complete() {
    let ctx = context();
    let ix = ctx.instruction("deposit").unwrap();
    let user = Pubkey::new_unique();
    let form = deposit_form(&user);
    let args = process_args(ix, &form.args, &ctx.table()).unwrap();

    let connection = FakeConnection::new();
    let assembled = assemble(&ctx, "deposit", &args, &form.accounts, &user, &connection)
        .await
        .unwrap();

    assert_eq!(connection.calls(), vec!["latest_blockhash"]);
    assert_eq!(assembled.blockhash, connection.blockhash);
    assert_eq!(assembled.last_valid_block_height, LAST_VALID);
    assert_eq!(assembled.transaction.message.recent_blockhash, connection.blockhash);
    assert_eq!(assembled.transaction.message.account_keys[0], user);

    let (vault, _) = Pubkey::find_program_address(&[b"vault", user.as_ref()], &ctx.program_id);
    let keys: Vec<_> = assembled.accounts.iter().map(|a| a.pubkey).collect();
    assert_eq!(keys, vec![user, vault, Pubkey::default()]);

    let mut expected = vec![242, 35, 198, 137, 82, 225, 242, 182];
    expected.extend_from_slice(&1000u64.to_le_bytes());
    expected.push(1); // Delayed
    expected.push(0); // memo: None
    assert_eq!(assembled.instruction_data(), expected.as_slice());
}

#[tokio::test]
async fn unknown_instruction_is_rejected() {
    let ctx = context();
    let connection = FakeConnection::new();
    let err = assemble(&ctx, "withdraw", &[], &BTreeMap::new(), &Pubkey::new_unique(), &connection)
        .await
        .unwrap_err();
    assert_eq!(err, WorkbenchError::UnknownInstruction { name: "withdraw".to_string() });
}

#[tokio::test]
async fn confirmed_submission_returns_signature() {
    let ctx = context();
    let payer = Keypair::new();
    let wallet = KeypairWallet::new(payer.insecure_clone());
    let connection = FakeConnection::new().with_statuses(vec![None, Some(SignatureStatus { err: None, confirmed: false }), confirmed()]);

    let result = execute_transaction(&ctx, "deposit", &deposit_form(&payer.pubkey()), &wallet, &connection, fast())
        .await
        .unwrap();

    let sent = connection.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(result.signature, sent[0].signatures[0]);
    assert!(sent[0].verify().is_ok());
}

#[tokio::test]
async fn execution_error_is_surfaced_verbatim() {
    let ctx = context();
    let payer = Keypair::new();
    let wallet = KeypairWallet::new(payer.insecure_clone());
    let payload = r#"{"InstructionError":[0,{"Custom":6001}]}"#.to_string();
    let connection = FakeConnection::new().with_statuses(vec![Some(SignatureStatus {
        err: Some(payload.clone()),
        confirmed: true,
    })]);

    let err = execute_transaction(&ctx, "deposit", &deposit_form(&payer.pubkey()), &wallet, &connection, fast())
        .await
        .unwrap_err();
    match err {
        WorkbenchError::ExecutionFailed { error, .. } => assert_eq!(error, payload),
        other => panic!("expected execution failure, got {:?}", other),
    }
}

#[tokio::test]
async fn passing_the_validity_window_expires() {
    let ctx = context();
    let ix = ctx.instruction("deposit").unwrap();
    let payer = Keypair::new();
    let form = deposit_form(&payer.pubkey());
    let args = process_args(ix, &form.args, &ctx.table()).unwrap();
    let connection = FakeConnection::new().with_height(LAST_VALID + 1);

    let assembled = assemble(&ctx, "deposit", &args, &form.accounts, &payer.pubkey(), &connection)
        .await
        .unwrap();
    let wallet = KeypairWallet::new(payer.insecure_clone());
    let err = submit_and_confirm(assembled, &wallet, &connection, fast()).await.unwrap_err();

    assert!(matches!(err, WorkbenchError::Expired { last_valid_block_height: LAST_VALID, .. }));
    assert!(err.is_submission_failure());
}

#[tokio::test]
async fn declined_signing_never_sends() {
    let ctx = context();
    let user = Pubkey::new_unique();
    let wallet = ReadOnlyWallet::new(Some(user));
    let connection = FakeConnection::new();

    let err = execute_transaction(&ctx, "deposit", &deposit_form(&user), &wallet, &connection, fast())
        .await
        .unwrap_err();

    assert!(matches!(err, WorkbenchError::Submission { .. }));
    assert_eq!(connection.calls(), vec!["latest_blockhash"]);
}

#[tokio::test]
async fn invalid_enum_form_value_aborts_before_network() {
    let ctx = context();
    let payer = Keypair::new();
    let wallet = KeypairWallet::new(payer.insecure_clone());
    let connection = FakeConnection::new();
    let mut form = deposit_form(&payer.pubkey());
    form.set_arg("mode", json!("delayed"));

    let err = execute_transaction(&ctx, "deposit", &form, &wallet, &connection, fast())
        .await
        .unwrap_err();
    assert_eq!(err, WorkbenchError::InvalidEnumValue { arg: "mode".to_string() });
    assert!(connection.calls().is_empty());
}

#[tokio::test]
async fn dropped_status_polls_are_retried_until_confirmed() {
    let ctx = context();
    let payer = Keypair::new();
    let wallet = KeypairWallet::new(payer.insecure_clone());
    let connection = FakeConnection::new()
        .with_status_failures(2)
        .with_statuses(vec![confirmed()]);

    let result = execute_transaction(&ctx, "deposit", &deposit_form(&payer.pubkey()), &wallet, &connection, fast())
        .await
        .unwrap();

    assert_eq!(connection.sent.lock().unwrap().len(), 1);
    assert_eq!(result.signature, connection.sent.lock().unwrap()[0].signatures[0]);
    let polls = connection.calls().iter().filter(|c| **c == "signature_status").count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn unreachable_node_after_send_keeps_the_signature() {
    let ctx = context();
    let payer = Keypair::new();
    let wallet = KeypairWallet::new(payer.insecure_clone());
    let connection = FakeConnection::new().with_status_failures(MAX_POLL_ERRORS + 5);

    let err = execute_transaction(&ctx, "deposit", &deposit_form(&payer.pubkey()), &wallet, &connection, fast())
        .await
        .unwrap_err();

    let sent = connection.sent.lock().unwrap()[0].signatures[0].to_string();
    assert!(err.is_submission_failure());
    assert_eq!(err.signature(), Some(sent.as_str()));
    assert!(matches!(err, WorkbenchError::ConfirmationUnknown { .. }));
    let polls = connection.calls().iter().filter(|c| **c == "signature_status").count();
    assert_eq!(polls, MAX_POLL_ERRORS as usize);
}

/// Two PDAs whose seed accounts are both left blank; only `a` is required.
const TWO_PDA_IDL: &str = r#"{
  "address": "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS",
  "metadata": { "name": "pair", "version": "0.1.0" },
  "instructions": [
    {
      "name": "link",
      "accounts": [
        { "name": "a", "pda": { "seeds": [ { "kind": "account", "path": "alpha" } ] } },
        { "name": "b", "optional": true, "pda": { "seeds": [ { "kind": "account", "path": "beta" } ] } },
        { "name": "alpha", "optional": true },
        { "name": "beta", "optional": true }
      ],
      "args": []
    }
  ]
}"#;

#[tokio::test]
async fn unresolved_pda_error_names_the_failing_account() {
    let ctx = ProgramContext::from_idl(IdlDoc::from_json(TWO_PDA_IDL).unwrap(), None).unwrap();
    let connection = FakeConnection::new();

    let err = assemble(&ctx, "link", &[], &BTreeMap::new(), &Pubkey::new_unique(), &connection)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        WorkbenchError::UnresolvedSeed {
            account: "a".to_string(),
            reference: "alpha".to_string(),
        }
    );
    assert!(connection.calls().is_empty());
}
