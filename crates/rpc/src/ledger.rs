// rpc/src/ledger.rs
use crate::{InboundMessage, RpcError, RpcResult};
use async_trait::async_trait;
use pool_core::{Amount, ChainConfig, Fees};
use pool_crypto::Address;
use sandbox::{Sandbox, Transaction};
use std::sync::Arc;
use storage::Database;
use tokio::sync::{mpsc, RwLock};
use treasury::{PoolState, Times, Treasury, Wallet, WalletState};

/// Read access to the pool plus a way to enqueue messages
#[async_trait]
pub trait LedgerView: Send + Sync {
    async fn fees(&self) -> Fees;
    async fn times(&self) -> Times;
    async fn max_punishment(&self, stake: &Amount) -> Amount;
    async fn treasury(&self, address: &Address) -> Option<PoolState>;
    async fn wallet(&self, address: &Address) -> Option<WalletState>;
    async fn transactions(&self, from_lt: u64, limit: usize) -> RpcResult<Vec<Transaction>>;
    async fn submit(&self, message: InboundMessage) -> RpcResult<()>;
}

/// `LedgerView` over a shared sandbox, with history from the database
pub struct SandboxLedger {
    sandbox: Arc<RwLock<Sandbox>>,
    database: Option<Arc<Database>>,
    inbox: mpsc::Sender<InboundMessage>,
}

impl SandboxLedger {
    pub fn new(
        sandbox: Arc<RwLock<Sandbox>>,
        database: Option<Arc<Database>>,
        inbox: mpsc::Sender<InboundMessage>,
    ) -> Self {
        Self { sandbox, database, inbox }
    }

    async fn config(&self) -> ChainConfig {
        self.sandbox.read().await.config().clone()
    }
}

#[async_trait]
impl LedgerView for SandboxLedger {
    async fn fees(&self) -> Fees {
        self.sandbox.read().await.fees().fees()
    }

    async fn times(&self) -> Times {
        Times::from_config(&self.config().await)
    }

    async fn max_punishment(&self, stake: &Amount) -> Amount {
        self.sandbox.read().await.config().punishment.max_punishment(stake)
    }

    async fn treasury(&self, address: &Address) -> Option<PoolState> {
        let sandbox = self.sandbox.read().await;
        sandbox.get::<Treasury>(address).map(|t| t.state().clone())
    }

    async fn wallet(&self, address: &Address) -> Option<WalletState> {
        let sandbox = self.sandbox.read().await;
        sandbox.get::<Wallet>(address).map(|w| w.get_wallet_state().clone())
    }

    async fn transactions(&self, from_lt: u64, limit: usize) -> RpcResult<Vec<Transaction>> {
        match &self.database {
            Some(db) => db
                .get_transactions(from_lt, limit)
                .map_err(|e| RpcError::InternalError(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn submit(&self, message: InboundMessage) -> RpcResult<()> {
        self.inbox
            .send(message)
            .await
            .map_err(|e| RpcError::InboxClosed(e.to_string()))
    }
}
