// storage/src/db.rs

use crate::{PruningMode, StorageError, StorageResult};
use pool_core::{ActorKind, Amount, ChainConfig};
use pool_crypto::{Address, ADDRESS_SIZE};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use sandbox::{ConsensusStub, Sandbox, SandboxCounters, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use treasury::{PoolState, Treasury, Wallet, WalletState};

const COUNTERS_KEY: &str = "sandbox_counters";

/// Column families for different data types
#[derive(Debug, Clone, Copy)]
pub enum ColumnFamily {
    Treasury,
    Wallets,
    Consensus,
    Balances,
    Transactions,
    Meta,
}

impl ColumnFamily {
    fn as_str(&self) -> &'static str {
        match self {
            ColumnFamily::Treasury => "treasury",
            ColumnFamily::Wallets => "wallets",
            ColumnFamily::Consensus => "consensus",
            ColumnFamily::Balances => "balances",
            ColumnFamily::Transactions => "transactions",
            ColumnFamily::Meta => "meta",
        }
    }

    fn all() -> Vec<Self> {
        vec![
            Self::Treasury,
            Self::Wallets,
            Self::Consensus,
            Self::Balances,
            Self::Transactions,
            Self::Meta,
        ]
    }

    fn for_actor(kind: ActorKind) -> Self {
        match kind {
            ActorKind::Treasury => Self::Treasury,
            ActorKind::Wallet => Self::Wallets,
            ActorKind::Consensus => Self::Consensus,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub create_if_missing: bool,
    pub max_open_files: i32,
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    pub pruning_mode: PruningMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
            create_if_missing: true,
            max_open_files: 1024,
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            max_write_buffer_number: 3,
            pruning_mode: PruningMode::Pruned { keep_transactions: 100_000 },
        }
    }
}

/// What lives at an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredKind {
    External,
    Uninit,
    Actor(ActorKind),
}

/// Balance record of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub balance: Amount,
    pub kind: StoredKind,
}

/// Main database interface
pub struct Database {
    db: Arc<DB>,
    config: DatabaseConfig,
}

impl Database {
    /// Open or create database
    pub fn open(config: DatabaseConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.increase_parallelism(num_cpus::get() as i32);

        let cfs: Vec<_> = ColumnFamily::all().iter().map(|cf| cf.as_str()).collect();

        let db = DB::open_cf(&opts, &config.path, &cfs)?;

        tracing::info!("Database opened at {}", config.path);

        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    // ==================== ACTOR STATE ====================

    /// Raw actor state as produced by `Actor::save_state`
    pub fn get_actor_state(&self, kind: ActorKind, address: &Address) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(ColumnFamily::for_actor(kind))?;
        Ok(self.db.get_cf(cf, address.as_bytes())?)
    }

    pub fn get_treasury_state(&self, address: &Address) -> StorageResult<Option<PoolState>> {
        self.decode_actor(ActorKind::Treasury, address)
    }

    pub fn get_wallet_state(&self, address: &Address) -> StorageResult<Option<WalletState>> {
        self.decode_actor(ActorKind::Wallet, address)
    }

    /// Every stored wallet
    pub fn wallets(&self) -> StorageResult<Vec<(Address, WalletState)>> {
        let cf = self.cf(ColumnFamily::Wallets)?;
        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            wallets.push((decode_address(&key)?, bincode::deserialize(&value)?));
        }
        Ok(wallets)
    }

    fn decode_actor<T: for<'de> Deserialize<'de>>(&self, kind: ActorKind, address: &Address) -> StorageResult<Option<T>> {
        match self.get_actor_state(kind, address)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // ==================== BALANCES ====================

    pub fn get_account(&self, address: &Address) -> StorageResult<Option<StoredAccount>> {
        let cf = self.cf(ColumnFamily::Balances)?;
        match self.db.get_cf(cf, address.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // ==================== TRANSACTIONS ====================

    /// Store transactions keyed by logical time
    pub fn store_transactions(&self, transactions: &[Transaction]) -> StorageResult<usize> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        let mut batch = WriteBatch::default();
        for tx in transactions {
            batch.put_cf(cf, tx.lt.to_be_bytes(), bincode::serialize(tx)?);
        }
        self.db.write(batch)?;
        tracing::debug!("Stored {} transactions", transactions.len());
        Ok(transactions.len())
    }

    pub fn get_transaction(&self, lt: u64) -> StorageResult<Option<Transaction>> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        match self.db.get_cf(cf, lt.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` transactions starting at `from_lt`
    pub fn get_transactions(&self, from_lt: u64, limit: usize) -> StorageResult<Vec<Transaction>> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        let start = from_lt.to_be_bytes();
        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)).take(limit) {
            let (_, value) = item?;
            transactions.push(bincode::deserialize(&value)?);
        }
        Ok(transactions)
    }

    /// Most recent transactions, newest first
    pub fn latest_transactions(&self, limit: usize) -> StorageResult<Vec<Transaction>> {
        let cf = self.cf(ColumnFamily::Transactions)?;
        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::End).take(limit) {
            let (_, value) = item?;
            transactions.push(bincode::deserialize(&value)?);
        }
        Ok(transactions)
    }

    // ==================== SANDBOX SNAPSHOTS ====================

    /// Write every account of `sandbox` and its counters in one batch
    pub fn save_sandbox(&self, sandbox: &Sandbox) -> StorageResult<usize> {
        let cf_balances = self.cf(ColumnFamily::Balances)?;
        let cf_meta = self.cf(ColumnFamily::Meta)?;
        let mut batch = WriteBatch::default();
        let mut count = 0;

        for account in sandbox.accounts() {
            let kind = match account.actor {
                Some(actor) => {
                    let cf = self.cf(ColumnFamily::for_actor(actor.kind()))?;
                    batch.put_cf(cf, account.address.as_bytes(), actor.save_state()?);
                    StoredKind::Actor(actor.kind())
                }
                None if account.external => StoredKind::External,
                None => StoredKind::Uninit,
            };
            let stored = StoredAccount { balance: account.balance.clone(), kind };
            batch.put_cf(cf_balances, account.address.as_bytes(), bincode::serialize(&stored)?);
            count += 1;
        }
        batch.put_cf(cf_meta, COUNTERS_KEY.as_bytes(), bincode::serialize(&sandbox.counters())?);

        self.db.write(batch)?;
        tracing::debug!("Saved {} accounts", count);
        Ok(count)
    }

    /// Rebuild a sandbox from the last snapshot, if any
    pub fn load_sandbox(&self, config: ChainConfig) -> StorageResult<Option<Sandbox>> {
        let counters: SandboxCounters = match self.get_meta(COUNTERS_KEY)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };

        let mut sandbox = Sandbox::new(config);
        let cf = self.cf(ColumnFamily::Balances)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let address = decode_address(&key)?;
            let stored: StoredAccount = bincode::deserialize(&value)?;

            match stored.kind {
                StoredKind::External => sandbox.install(address, stored.balance, None)?,
                StoredKind::Uninit => sandbox.install_uninit(address, stored.balance)?,
                StoredKind::Actor(kind) => {
                    let bytes = self.get_actor_state(kind, &address)?
                        .ok_or_else(|| StorageError::Corruption(format!("no state for {}", address)))?;
                    let actor: Box<dyn pool_core::Actor> = match kind {
                        ActorKind::Treasury => Box::new(Treasury::from_state(bincode::deserialize(&bytes)?)),
                        ActorKind::Wallet => Box::new(Wallet::from_state(bincode::deserialize(&bytes)?)),
                        ActorKind::Consensus => Box::new(bincode::deserialize::<ConsensusStub>(&bytes)?),
                    };
                    sandbox.install(address, stored.balance, Some(actor))?;
                }
            }
        }
        sandbox.restore_counters(counters);

        tracing::info!("Restored sandbox at lt {}", sandbox.counters().lt);
        Ok(Some(sandbox))
    }

    // ==================== METADATA OPERATIONS ====================

    /// Store metadata
    pub fn store_meta(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let cf = self.cf(ColumnFamily::Meta)?;
        self.db.put_cf(cf, key.as_bytes(), value)?;
        Ok(())
    }

    /// Get metadata
    pub fn get_meta(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(ColumnFamily::Meta)?;
        Ok(self.db.get_cf(cf, key.as_bytes())?)
    }

    // ==================== PRUNING OPERATIONS ====================

    /// Drop old transactions according to the pruning mode
    pub fn prune(&self) -> StorageResult<u64> {
        let keep = match self.config.pruning_mode {
            PruningMode::Archive => {
                tracing::debug!("Archive mode: skipping pruning");
                return Ok(0);
            }
            PruningMode::Pruned { keep_transactions } => keep_transactions,
        };

        let latest = match self.latest_transactions(1)?.first() {
            Some(tx) => tx.lt,
            None => return Ok(0),
        };
        let keep_from = latest.saturating_sub(keep.saturating_sub(1));

        let cf = self.cf(ColumnFamily::Transactions)?;
        let mut batch = WriteBatch::default();
        let mut pruned_count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            let lt = decode_lt(&key)?;
            if lt >= keep_from {
                break;
            }
            batch.delete_cf(cf, key);
            pruned_count += 1;
        }
        self.db.write(batch)?;

        tracing::info!("Pruned {} transactions before lt {}", pruned_count, keep_from);
        Ok(pruned_count)
    }

    // ==================== UTILITY OPERATIONS ====================

    /// Compact database
    pub fn compact(&self) -> StorageResult<()> {
        tracing::info!("Compacting database...");

        for cf_type in ColumnFamily::all() {
            if let Ok(cf) = self.cf(cf_type) {
                self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
            }
        }

        tracing::info!("Database compaction complete");
        Ok(())
    }

    /// Get database statistics
    pub fn stats(&self) -> StorageResult<DatabaseStats> {
        let cf_tx = self.cf(ColumnFamily::Transactions)?;
        let total_transactions = self.db.iterator_cf(cf_tx, IteratorMode::Start).count() as u64;
        let cf_balances = self.cf(ColumnFamily::Balances)?;
        let total_accounts = self.db.iterator_cf(cf_balances, IteratorMode::Start).count() as u64;
        let latest_lt = self.latest_transactions(1)?.first().map(|tx| tx.lt).unwrap_or(0);

        Ok(DatabaseStats {
            latest_lt,
            total_accounts,
            total_transactions,
            pruning_mode: self.config.pruning_mode,
        })
    }

    /// Get column family handle
    fn cf(&self, cf_type: ColumnFamily) -> StorageResult<&rocksdb::ColumnFamily> {
        self.db.cf_handle(cf_type.as_str())
            .ok_or_else(|| StorageError::DatabaseError(format!("{} CF not found", cf_type.as_str())))
    }
}

fn decode_address(key: &[u8]) -> StorageResult<Address> {
    let bytes: [u8; ADDRESS_SIZE] = key.try_into()
        .map_err(|_| StorageError::Corruption(format!("Invalid address key of {} bytes", key.len())))?;
    Ok(Address::new(bytes))
}

fn decode_lt(key: &[u8]) -> StorageResult<u64> {
    let bytes: [u8; 8] = key.try_into()
        .map_err(|_| StorageError::Corruption("Invalid transaction key".into()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub latest_lt: u64,
    pub total_accounts: u64,
    pub total_transactions: u64,
    pub pruning_mode: PruningMode,
}
