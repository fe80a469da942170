// sandbox/src/host.rs

use crate::{transaction::{SendResult, Transaction}, SandboxError, SandboxResult};
use pool_core::{
    actor::{EXIT_ACTION_FAILED, EXIT_OUT_OF_GAS},
    Actor, ActorError, Amount, ChainConfig, Context, FeeModel, Message, Op, Timestamp,
    ValidatorSetTiming,
};
use pool_crypto::Address;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Coins given to every labelled external account
pub const EXTERNAL_INITIAL_BALANCE: u64 = 1_000_000;

/// Guard against message loops
const MAX_TRANSACTIONS_PER_SEND: usize = 10_000;

enum AccountKind {
    /// Wallet of a user; accepts everything, pays nothing to run
    External,
    /// Holds value but no code
    Uninit,
    Contract(Box<dyn Actor>),
}

struct Account {
    balance: Amount,
    kind: AccountKind,
}

/// Read-only view of an account
pub struct AccountInfo<'a> {
    pub address: Address,
    pub balance: &'a Amount,
    pub actor: Option<&'a dyn Actor>,
    pub external: bool,
}

/// Clock and running totals of a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxCounters {
    pub now: Timestamp,
    pub lt: u64,
    pub fees_collected: Amount,
    pub minted: Amount,
}

struct Envelope {
    from: Address,
    to: Address,
    value: Amount,
    op: Op,
    bounce: bool,
    bounced: bool,
    init: Option<Box<dyn Actor>>,
}

/// Single-threaded message-delivery host
pub struct Sandbox {
    config: ChainConfig,
    fees: FeeModel,
    now: Timestamp,
    lt: u64,
    accounts: HashMap<Address, Account>,
    queue: VecDeque<Envelope>,
    /// Compute and forwarding fees taken out of circulation
    fees_collected: Amount,
    /// Value created for external accounts and restored accounts
    minted: Amount,
}

impl Sandbox {
    pub fn new(config: ChainConfig) -> Self {
        let fees = config.fee_model();
        Self {
            config,
            fees,
            now: 0,
            lt: 0,
            accounts: HashMap::new(),
            queue: VecDeque::new(),
            fees_collected: Amount::zero(),
            minted: Amount::zero(),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn fees(&self) -> &FeeModel {
        &self.fees
    }

    /// Replace the elected validator set boundaries
    pub fn set_validators(&mut self, validators: ValidatorSetTiming) {
        self.config.validators = validators;
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn set_now(&mut self, now: Timestamp) {
        self.now = now;
    }

    /// External account named `label`, funded on first use
    pub fn treasury(&mut self, label: &str) -> Address {
        let address = Address::from_label(label);
        self.open_external(address);
        address
    }

    /// Fund `address` as an external account unless something lives there
    pub fn open_external(&mut self, address: Address) -> bool {
        if self.accounts.contains_key(&address) {
            return false;
        }
        let balance = Amount::from_coins(EXTERNAL_INITIAL_BALANCE);
        self.minted = self.minted.clone() + balance.clone();
        self.accounts.insert(address, Account { balance, kind: AccountKind::External });
        true
    }

    /// Place an account directly, e.g. when restoring from storage
    pub fn install(&mut self, address: Address, balance: Amount, actor: Option<Box<dyn Actor>>) -> SandboxResult<()> {
        if self.accounts.contains_key(&address) {
            return Err(SandboxError::AddressInUse(address));
        }
        let kind = match actor {
            Some(actor) => AccountKind::Contract(actor),
            None => AccountKind::External,
        };
        self.minted = self.minted.clone() + balance.clone();
        self.accounts.insert(address, Account { balance, kind });
        Ok(())
    }

    /// Place a code-less account holding `balance`
    pub fn install_uninit(&mut self, address: Address, balance: Amount) -> SandboxResult<()> {
        if self.accounts.contains_key(&address) {
            return Err(SandboxError::AddressInUse(address));
        }
        self.minted = self.minted.clone() + balance.clone();
        self.accounts.insert(address, Account { balance, kind: AccountKind::Uninit });
        Ok(())
    }

    pub fn counters(&self) -> SandboxCounters {
        SandboxCounters {
            now: self.now,
            lt: self.lt,
            fees_collected: self.fees_collected.clone(),
            minted: self.minted.clone(),
        }
    }

    /// Resume clocks and totals after the accounts were installed
    pub fn restore_counters(&mut self, counters: SandboxCounters) {
        self.now = counters.now;
        self.lt = counters.lt;
        self.fees_collected = counters.fees_collected;
        self.minted = counters.minted;
    }

    pub fn balance(&self, address: &Address) -> Amount {
        self.accounts.get(address).map(|a| a.balance.clone()).unwrap_or_else(Amount::zero)
    }

    pub fn is_deployed(&self, address: &Address) -> bool {
        matches!(self.accounts.get(address).map(|a| &a.kind), Some(AccountKind::Contract(_)))
    }

    pub fn actor(&self, address: &Address) -> Option<&dyn Actor> {
        match &self.accounts.get(address)?.kind {
            AccountKind::Contract(actor) => Some(actor.as_ref()),
            _ => None,
        }
    }

    /// Typed access to a deployed actor
    pub fn get<T: 'static>(&self, address: &Address) -> Option<&T> {
        self.actor(address)?.as_any().downcast_ref::<T>()
    }

    pub fn accounts(&self) -> impl Iterator<Item = AccountInfo<'_>> {
        self.accounts.iter().map(|(address, account)| AccountInfo {
            address: *address,
            balance: &account.balance,
            actor: match &account.kind {
                AccountKind::Contract(actor) => Some(actor.as_ref()),
                _ => None,
            },
            external: matches!(account.kind, AccountKind::External),
        })
    }

    pub fn fees_collected(&self) -> &Amount {
        &self.fees_collected
    }

    pub fn minted(&self) -> &Amount {
        &self.minted
    }

    /// Sum of all account balances
    pub fn total_balances(&self) -> Amount {
        self.accounts.values().map(|a| &a.balance).sum()
    }

    /// Send from an external account and run until the queue is empty
    pub fn send(&mut self, from: Address, to: Address, value: Amount, op: Op) -> SandboxResult<SendResult> {
        self.inject(from, to, value, op, None)
    }

    /// Like `send`, deploying `init` at `to` if nothing lives there
    pub fn deploy(
        &mut self,
        from: Address,
        to: Address,
        value: Amount,
        op: Op,
        init: Box<dyn Actor>,
    ) -> SandboxResult<SendResult> {
        self.inject(from, to, value, op, Some(init))
    }

    fn inject(
        &mut self,
        from: Address,
        to: Address,
        value: Amount,
        op: Op,
        init: Option<Box<dyn Actor>>,
    ) -> SandboxResult<SendResult> {
        let fwd = self.fees.forward_fee(&op);
        let account = self.accounts.get_mut(&from).ok_or(SandboxError::AccountNotFound(from))?;
        if !matches!(account.kind, AccountKind::External) {
            return Err(SandboxError::NotExternal(from));
        }

        // External senders pay forwarding on top of the value
        let required = value.clone() + fwd.clone();
        account.balance = account.balance.checked_sub(&required).ok_or_else(|| {
            SandboxError::InsufficientBalance {
                address: from,
                required: required.clone(),
                available: account.balance.clone(),
            }
        })?;
        self.fees_collected = self.fees_collected.clone() + fwd;

        self.lt += 1;
        let mut transactions = vec![Transaction {
            lt: self.lt,
            from: None,
            to: from,
            value: Amount::zero(),
            opcode: op.opcode(),
            op_name: op.name().to_string(),
            deploy: false,
            success: true,
            exit_code: None,
            out_messages_count: 1,
            compute_fee: Amount::zero(),
            now: self.now,
        }];

        self.queue.push_back(Envelope { from, to, value, op, bounce: true, bounced: false, init });
        transactions.extend(self.run_queue()?);
        Ok(SendResult { transactions })
    }

    fn run_queue(&mut self) -> SandboxResult<Vec<Transaction>> {
        let mut transactions = Vec::new();
        while let Some(envelope) = self.queue.pop_front() {
            if transactions.len() >= MAX_TRANSACTIONS_PER_SEND {
                self.queue.clear();
                return Err(SandboxError::TransactionLimit(MAX_TRANSACTIONS_PER_SEND));
            }
            transactions.push(self.process(envelope));
        }
        Ok(transactions)
    }

    fn process(&mut self, envelope: Envelope) -> Transaction {
        self.lt += 1;
        let Envelope { from, to, value, op, bounce, bounced, init } = envelope;
        let msg = Message { from, to, value: value.clone(), op, bounce, bounced };

        let mut tx = Transaction {
            lt: self.lt,
            from: Some(from),
            to,
            value: value.clone(),
            opcode: msg.opcode(),
            op_name: msg.op.name().to_string(),
            deploy: false,
            success: true,
            exit_code: None,
            out_messages_count: 0,
            compute_fee: Amount::zero(),
            now: self.now,
        };

        let mut account = match self.accounts.remove(&to) {
            Some(account) => account,
            None => Account { balance: Amount::zero(), kind: AccountKind::Uninit },
        };

        let uninit = matches!(account.kind, AccountKind::Uninit);
        if let (true, Some(actor)) = (uninit && !bounced, init) {
            account.kind = AccountKind::Contract(actor);
            tx.deploy = true;
        }
        account.balance = account.balance.clone() + value.clone();

        if matches!(account.kind, AccountKind::Contract(_)) {
            self.execute(&mut account, &msg, &mut tx);
        } else if matches!(account.kind, AccountKind::Uninit) && bounce && !bounced {
            tx.success = false;
            tx.out_messages_count = self.bounce_back(&mut account, &msg, &Amount::zero());
        }

        if tx.success {
            tracing::debug!("tx {} {} -> {} {} ok", tx.lt, from, to, tx.op_name);
        } else {
            tracing::debug!("tx {} {} -> {} {} failed: {:?}", tx.lt, from, to, tx.op_name, tx.exit_code);
        }

        self.accounts.insert(to, account);
        tx
    }

    /// Compute phase, then action phase; rolls back on any failure
    fn execute(&mut self, account: &mut Account, msg: &Message, tx: &mut Transaction) {
        let actor = match &mut account.kind {
            AccountKind::Contract(actor) => actor,
            _ => return,
        };

        let gas = self.fees.gas_for(msg);
        let mut compute = self.fees.compute_fee(gas);
        let available = account.balance.clone();

        let outcome = if available < compute {
            compute = Amount::zero();
            Err((ActorError::new(EXIT_OUT_OF_GAS, "balance cannot cover gas"), None))
        } else {
            let snapshot = actor.clone_actor();
            let mut ctx = Context::new(
                msg.to,
                self.now,
                &self.config,
                msg.value.clone(),
                compute.clone(),
                available.saturating_sub(&compute),
            );
            let result = if msg.bounced {
                actor.receive_bounce(&mut ctx, msg)
            } else {
                actor.receive(&mut ctx, msg)
            };
            let result = result.and_then(|_| Self::check_actions(&self.fees, &ctx));
            match result {
                Ok(()) => Ok(ctx.into_outbox()),
                Err(e) => Err((e, Some(snapshot))),
            }
        };

        match outcome {
            Ok((remaining, compute_total, outbox)) => {
                account.balance = remaining;
                self.fees_collected = self.fees_collected.clone() + compute_total.clone();
                tx.compute_fee = compute_total;
                tx.out_messages_count = outbox.len();
                for out in outbox {
                    let fwd = self.fees.forward_fee(&out.op);
                    self.fees_collected = self.fees_collected.clone() + fwd.clone();
                    self.queue.push_back(Envelope {
                        from: msg.to,
                        to: out.to,
                        value: out.value.saturating_sub(&fwd),
                        op: out.op,
                        bounce: out.bounce,
                        bounced: false,
                        init: out.init,
                    });
                }
            }
            Err((error, snapshot)) => {
                if let Some(snapshot) = snapshot {
                    *actor = snapshot;
                }
                if tx.deploy {
                    account.kind = AccountKind::Uninit;
                }
                account.balance = account.balance.saturating_sub(&compute);
                self.fees_collected = self.fees_collected.clone() + compute.clone();
                tx.success = false;
                tx.exit_code = Some(error.code);
                tx.compute_fee = compute.clone();
                tracing::warn!("{} rejected {}: {}", msg.to, msg.op.name(), error);
                if msg.bounce && !msg.bounced {
                    tx.out_messages_count = self.bounce_back(account, msg, &compute);
                }
            }
        }
    }

    /// Every send must be covered by the balance and carry its forwarding fee
    fn check_actions(fees: &FeeModel, ctx: &Context<'_>) -> Result<(), ActorError> {
        if !ctx.actions_fit() {
            return Err(ActorError::new(
                EXIT_ACTION_FAILED,
                format!("sends of {} exceed balance {}", ctx.sent_total(), ctx.balance()),
            ));
        }
        for out in ctx.outbox() {
            if out.value < fees.forward_fee(&out.op) {
                return Err(ActorError::new(
                    EXIT_ACTION_FAILED,
                    format!("{} to {} cannot pay forwarding", out.op.name(), out.to),
                ));
            }
        }
        Ok(())
    }

    /// Return the inbound value minus `spent` and forwarding; count of messages sent
    fn bounce_back(&mut self, account: &mut Account, msg: &Message, spent: &Amount) -> usize {
        let back = msg.value.saturating_sub(spent);
        let fwd = self.fees.forward_fee(&msg.op);
        if back <= fwd || account.balance < back {
            return 0;
        }
        account.balance = account.balance.saturating_sub(&back);
        self.fees_collected = self.fees_collected.clone() + fwd.clone();
        self.queue.push_back(Envelope {
            from: msg.to,
            to: msg.from,
            value: back.saturating_sub(&fwd),
            op: msg.op.clone(),
            bounce: false,
            bounced: true,
            init: None,
        });
        1
    }
}
