//! Network and signing collaborators.
//!
//! The transaction layer only talks to [`Connection`] and [`Wallet`], so it
//! can run against an RPC node or against in-memory fakes.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use workbench_core::error::{WorkbenchError, WorkbenchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    /// Last block height at which a transaction stamped with `blockhash`
    /// can still land.
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
}

/// What the network knows about a sent transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    /// Execution error, serialized as JSON.
    pub err: Option<String>,
    /// Reached the connection's commitment level.
    pub confirmed: bool,
}

#[async_trait]
pub trait Connection: Send + Sync {
    async fn latest_blockhash(&self) -> WorkbenchResult<LatestBlockhash>;

    async fn send_transaction(&self, tx: &Transaction, opts: SendOptions) -> WorkbenchResult<Signature>;

    /// `None` while the network has not seen the signature.
    async fn signature_status(&self, signature: &Signature) -> WorkbenchResult<Option<SignatureStatus>>;

    async fn block_height(&self) -> WorkbenchResult<u64>;
}

#[async_trait]
pub trait Wallet: Send + Sync {
    fn pubkey(&self) -> Option<Pubkey>;

    /// Sign and broadcast. Called once per submission attempt.
    async fn send_transaction(
        &self,
        tx: Transaction,
        connection: &dyn Connection,
        opts: SendOptions,
    ) -> WorkbenchResult<Signature>;
}

pub struct RpcConnection {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcConnection {
    pub fn new(url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        RpcConnection {
            client: RpcClient::new_with_commitment(url.into(), commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl Connection for RpcConnection {
    async fn latest_blockhash(&self) -> WorkbenchResult<LatestBlockhash> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(WorkbenchError::rpc)?;
        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_transaction(&self, tx: &Transaction, opts: SendOptions) -> WorkbenchResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: opts.skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(WorkbenchError::rpc)
    }

    async fn signature_status(&self, signature: &Signature) -> WorkbenchResult<Option<SignatureStatus>> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(WorkbenchError::rpc)?
            .value;
        Ok(statuses.into_iter().next().flatten().map(|status| SignatureStatus {
            confirmed: status.satisfies_commitment(self.commitment),
            err: status
                .err
                .map(|err| serde_json::to_string(&err).unwrap_or_else(|_| err.to_string())),
        }))
    }

    async fn block_height(&self) -> WorkbenchResult<u64> {
        self.client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(WorkbenchError::rpc)
    }
}

/// Signs with a local keypair.
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        KeypairWallet { keypair }
    }

    pub fn from_file(path: &str) -> WorkbenchResult<Self> {
        solana_sdk::signature::read_keypair_file(path)
            .map(KeypairWallet::new)
            .map_err(|e| WorkbenchError::Config {
                message: format!("Failed to read keypair {}: {}", path, e),
            })
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn pubkey(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn send_transaction(
        &self,
        mut tx: Transaction,
        connection: &dyn Connection,
        opts: SendOptions,
    ) -> WorkbenchResult<Signature> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[&self.keypair], blockhash)
            .map_err(|e| WorkbenchError::Submission {
                message: format!("signing failed: {}", e),
            })?;
        connection.send_transaction(&tx, opts).await
    }
}

/// Knows an address but cannot sign. Lets instructions be assembled and
/// inspected without a keypair.
pub struct ReadOnlyWallet {
    pubkey: Option<Pubkey>,
}

impl ReadOnlyWallet {
    pub fn new(pubkey: Option<Pubkey>) -> Self {
        ReadOnlyWallet { pubkey }
    }
}

#[async_trait]
impl Wallet for ReadOnlyWallet {
    fn pubkey(&self) -> Option<Pubkey> {
        self.pubkey
    }

    async fn send_transaction(
        &self,
        _tx: Transaction,
        _connection: &dyn Connection,
        _opts: SendOptions,
    ) -> WorkbenchResult<Signature> {
        Err(WorkbenchError::Submission {
            message: "wallet is read-only and cannot sign".to_string(),
        })
    }
}
