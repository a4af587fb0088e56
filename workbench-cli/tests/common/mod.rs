#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use workbench_cli::client::{Connection, LatestBlockhash, SendOptions, SignatureStatus};
use workbench_core::error::{WorkbenchError, WorkbenchResult};

pub const LAST_VALID: u64 = 100;

/// In-memory connection that records every call.
pub struct FakeConnection {
    pub calls: Mutex<Vec<&'static str>>,
    pub sent: Mutex<Vec<Transaction>>,
    pub statuses: Mutex<VecDeque<Option<SignatureStatus>>>,
    pub height: Mutex<u64>,
    /// Status polls left to fail before replies come from `statuses`.
    pub status_failures: Mutex<u32>,
    pub blockhash: Hash,
}

impl FakeConnection {
    pub fn new() -> Self {
        FakeConnection {
            calls: Mutex::new(vec![]),
            sent: Mutex::new(vec![]),
            statuses: Mutex::new(VecDeque::new()),
            height: Mutex::new(90),
            status_failures: Mutex::new(0),
            blockhash: Hash::new_from_array([8u8; 32]),
        }
    }

    /// Status replies, in order. Once exhausted the signature stays unknown.
    pub fn with_statuses(self, statuses: Vec<Option<SignatureStatus>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_height(self, height: u64) -> Self {
        *self.height.lock().unwrap() = height;
        self
    }

    /// The next `count` status polls fail as if the node dropped the
    /// connection.
    pub fn with_status_failures(self, count: u32) -> Self {
        *self.status_failures.lock().unwrap() = count;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn confirmed() -> Option<SignatureStatus> {
    Some(SignatureStatus { err: None, confirmed: true })
}

#[async_trait]
impl Connection for FakeConnection {
    async fn latest_blockhash(&self) -> WorkbenchResult<LatestBlockhash> {
        self.record("latest_blockhash");
        Ok(LatestBlockhash {
            blockhash: self.blockhash,
            last_valid_block_height: LAST_VALID,
        })
    }

    async fn send_transaction(&self, tx: &Transaction, _opts: SendOptions) -> WorkbenchResult<Signature> {
        self.record("send_transaction");
        self.sent.lock().unwrap().push(tx.clone());
        Ok(tx.signatures[0])
    }

    async fn signature_status(&self, _signature: &Signature) -> WorkbenchResult<Option<SignatureStatus>> {
        self.record("signature_status");
        {
            let mut failures = self.status_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(WorkbenchError::rpc("connection reset by peer"));
            }
        }
        Ok(self.statuses.lock().unwrap().pop_front().flatten())
    }

    async fn block_height(&self) -> WorkbenchResult<u64> {
        self.record("block_height");
        Ok(*self.height.lock().unwrap())
    }
}

/// Current-layout IDL with a PDA account, a fixed-address account and an
/// enum argument.
pub const VAULT_IDL: &str = r#"{
  "address": "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS",
  "metadata": { "name": "vault", "version": "0.1.0", "spec": "0.1.0" },
  "instructions": [
    {
      "name": "deposit",
      "discriminator": [242, 35, 198, 137, 82, 225, 242, 182],
      "accounts": [
        { "name": "user", "writable": true, "signer": true },
        {
          "name": "vault",
          "writable": true,
          "pda": { "seeds": [
            { "kind": "const", "value": [118, 97, 117, 108, 116] },
            { "kind": "account", "path": "user" }
          ] }
        },
        { "name": "system_program", "address": "11111111111111111111111111111111" }
      ],
      "args": [
        { "name": "amount", "type": "u64" },
        { "name": "mode", "type": { "defined": { "name": "Mode" } } },
        { "name": "memo", "type": { "option": "string" } }
      ]
    }
  ],
  "types": [
    { "name": "Mode", "type": { "kind": "enum", "variants": [ { "name": "Instant" }, { "name": "Delayed" } ] } }
  ]
}"#;
