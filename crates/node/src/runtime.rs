// node/src/runtime.rs
use crate::NodeConfig;
use pool_core::{Amount, Op, Timestamp, ValidatorSetTiming};
use pool_crypto::{Address, ContractKind};
use rpc::{InboundMessage, RpcConfig as RpcCfg, RpcMethods, RpcServer, SandboxLedger};
use sandbox::{ConsensusStub, Sandbox, SendResult};
use storage::{Database, DatabaseConfig, PruningMode};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, Duration};
use treasury::Treasury;

pub struct Node {
    config: NodeConfig,
    sandbox: Arc<RwLock<Sandbox>>,
    database: Arc<Database>,
    treasury: Address,
    inbox: mpsc::Sender<InboundMessage>,
    receiver: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
}

/// Address of the pool's treasury, derived from the governor and pool name
pub fn treasury_address(config: &NodeConfig) -> Address {
    let governor = Address::from_label(&config.pool.governor);
    Address::derive(ContractKind::Treasury, &governor, &[config.pool.name.as_bytes()])
}

impl Node {
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        tracing::info!("Initializing node components");

        let chain = config.chain_config()?;

        // Initialize database
        let pruning_mode = if config.storage.pruning == "archive" {
            PruningMode::Archive
        } else {
            PruningMode::Pruned {
                keep_transactions: config.storage.keep_transactions,
            }
        };

        let db_config = DatabaseConfig {
            path: format!("{}/db", config.data_dir),
            max_open_files: config.storage.max_open_files,
            pruning_mode,
            ..Default::default()
        };
        let database = Arc::new(Database::open(db_config)?);

        let treasury = treasury_address(&config);
        let mut sandbox = match database.load_sandbox(chain.clone())? {
            Some(sandbox) => sandbox,
            None => {
                let mut sandbox = Sandbox::new(chain);
                bootstrap(&mut sandbox, &config, unix_timestamp())?;
                database.save_sandbox(&sandbox)?;
                sandbox
            }
        };
        let now = sandbox.now().max(unix_timestamp());
        advance_clock(&mut sandbox, now);

        tracing::info!("✓ Treasury at {}", treasury);

        let (inbox, receiver) = mpsc::channel(config.pool.inbox_capacity);

        tracing::info!("Node components initialized");

        Ok(Self {
            config,
            sandbox: Arc::new(RwLock::new(sandbox)),
            database,
            treasury,
            inbox,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    pub async fn start(self: Arc<Self>) -> anyhow::Result<()> {
        tracing::info!("Starting stake pool node");

        let receiver = self.receiver.lock().await.take()
            .ok_or_else(|| anyhow::anyhow!("node already started"))?;
        self.clone().start_message_processor(receiver);
        self.start_clock();
        self.start_snapshots();

        // Start RPC server if enabled
        if self.config.rpc.enabled {
            let rpc_config = RpcCfg {
                listen_addr: self.config.rpc.listen_addr,
                cors_origin: self.config.rpc.cors_origin.clone(),
                ..Default::default()
            };

            let ledger = SandboxLedger::new(
                self.sandbox.clone(),
                Some(self.database.clone()),
                self.inbox.clone(),
            );
            let methods = RpcMethods::new(Arc::new(ledger));

            let rpc_server = Arc::new(RpcServer::new(rpc_config, methods));

            // Spawn RPC server in background
            let rpc_clone = rpc_server.clone();
            tokio::spawn(async move {
                if let Err(e) = rpc_clone.start().await {
                    tracing::error!("RPC server error: {}", e);
                }
            });

            tracing::info!("✓ RPC server started on {}", self.config.rpc.listen_addr);
        }

        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::info!("  Node is fully operational");
        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::info!("  Treasury: {}", self.treasury);
        if self.config.rpc.enabled {
            tracing::info!("  RPC:      {}", self.config.rpc.listen_addr);
        }
        tracing::info!("  Data Dir: {}", self.config.data_dir);
        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!("Shutting down node...");

        tracing::info!("Saving state...");
        let saved = self.database.save_sandbox(&*self.sandbox.read().await)?;
        tracing::info!("Saved {} accounts", saved);
        self.database.compact()?;

        tracing::info!("Node shutdown complete");
        Ok(())
    }

    pub fn sandbox(&self) -> &Arc<RwLock<Sandbox>> {
        &self.sandbox
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    /// Queue a message for the processor task
    pub async fn submit(&self, message: InboundMessage) -> anyhow::Result<()> {
        self.inbox.send(message).await
            .map_err(|e| anyhow::anyhow!("inbox closed: {}", e))
    }

    /// Deliver one inbound message and record its transactions
    pub async fn deliver(&self, message: InboundMessage) -> anyhow::Result<SendResult> {
        let result = {
            let mut sandbox = self.sandbox.write().await;
            if sandbox.open_external(message.from) {
                tracing::info!("Opened external account {}", message.from);
            }
            sandbox.send(message.from, message.to, message.value, message.op)?
        };
        self.database.store_transactions(&result.transactions)?;

        let failed = result.transactions.iter().filter(|tx| !tx.success).count();
        tracing::debug!("Delivered: {} transactions, {} failed", result.len(), failed);
        Ok(result)
    }

    // ==================== BACKGROUND TASKS ====================

    fn start_message_processor(self: Arc<Self>, mut receiver: mpsc::Receiver<InboundMessage>) {
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let name = message.op.name();
                if let Err(e) = self.deliver(message).await {
                    tracing::warn!("Failed to deliver {}: {}", name, e);
                }
            }
            tracing::info!("Inbox closed");
        });

        tracing::info!("✓ Message processor started");
    }

    fn start_clock(&self) {
        let sandbox = self.sandbox.clone();
        let tick = self.config.clock.tick_seconds.max(1);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(tick));
            loop {
                ticker.tick().await;
                let mut sandbox = sandbox.write().await;
                let now = sandbox.now().max(unix_timestamp());
                advance_clock(&mut sandbox, now);
            }
        });

        tracing::info!("✓ Clock started");
    }

    fn start_snapshots(&self) {
        let sandbox = self.sandbox.clone();
        let database = self.database.clone();
        let period = self.config.storage.snapshot_interval_seconds.max(1);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(period));
            loop {
                ticker.tick().await;
                let saved = {
                    let sandbox = sandbox.read().await;
                    database.save_sandbox(&sandbox)
                };
                match saved {
                    Ok(count) => tracing::debug!("Snapshot of {} accounts saved", count),
                    Err(e) => tracing::warn!("Failed to save snapshot: {}", e),
                }
                if let Err(e) = database.prune() {
                    tracing::warn!("Failed to prune transactions: {}", e);
                }
            }
        });

        tracing::info!("✓ Snapshot task started");
    }
}

/// Fund the pool's role accounts and deploy the treasury and the elector
fn bootstrap(sandbox: &mut Sandbox, config: &NodeConfig, now: Timestamp) -> anyhow::Result<()> {
    tracing::info!("Bootstrapping pool {}", config.pool.name);
    advance_clock(sandbox, now);

    let governor = sandbox.treasury(&config.pool.governor);
    let halter = sandbox.treasury(&config.pool.halter);
    let driver = sandbox.treasury(&config.pool.driver);
    let authority = sandbox.treasury(&config.pool.authority);

    let treasury = treasury_address(config);
    let storage = sandbox.fees().treasury_storage();
    let result = sandbox.deploy(
        governor,
        treasury,
        storage,
        Op::TopUp,
        Box::new(Treasury::new(driver, halter, governor)),
    )?;
    if !sandbox.is_deployed(&treasury) {
        anyhow::bail!("treasury deployment failed: {:?}", result.transactions);
    }

    let elector = sandbox.config().elector;
    sandbox.deploy(
        authority,
        elector,
        Amount::from_coins(1),
        Op::TopUp,
        Box::new(ConsensusStub::new(authority)),
    )?;
    if !sandbox.is_deployed(&elector) {
        anyhow::bail!("elector deployment failed");
    }
    Ok(())
}

/// Move the clock to `now`, rolling the validator set when its term ends
fn advance_clock(sandbox: &mut Sandbox, now: Timestamp) {
    sandbox.set_now(now);
    if now >= sandbox.config().validators.until {
        let elected_for = sandbox.config().elections.elected_for;
        let validators = ValidatorSetTiming::at(now, elected_for);
        tracing::info!("Validator set {}..{} in office", validators.since, validators.until);
        sandbox.set_validators(validators);
    }
}

fn unix_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
