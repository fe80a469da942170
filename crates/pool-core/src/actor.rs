// pool-core/src/actor.rs

use crate::{
    config::ChainConfig,
    fees::{FeeModel, Gas},
    message::{Message, Op},
    types::*,
    CoreResult,
};
use pool_crypto::Address;
use std::any::Any;
use std::fmt;

pub use pool_crypto::ContractKind as ActorKind;

/// Result of handling one message
pub type ActorResult = Result<(), ActorError>;

/// Exit code reported when the actor cannot pay for extra gas
pub const EXIT_OUT_OF_GAS: u32 = 13;

/// Exit code reported when queued sends exceed the balance
pub const EXIT_ACTION_FAILED: u32 = 37;

/// Failure of a message handler; the host rolls back and bounces
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("exit code {code}: {reason}")]
pub struct ActorError {
    pub code: u32,
    pub reason: String,
}

impl ActorError {
    pub fn new(code: u32, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }
}

/// A contract-like participant processing one message at a time
pub trait Actor: Send + Sync {
    fn kind(&self) -> ActorKind;

    /// Handle a regular inbound message
    fn receive(&mut self, ctx: &mut Context<'_>, msg: &Message) -> ActorResult;

    /// Handle a message this actor sent that came back bounced
    fn receive_bounce(&mut self, _ctx: &mut Context<'_>, _msg: &Message) -> ActorResult {
        Ok(())
    }

    /// Snapshot used for rollback
    fn clone_actor(&self) -> Box<dyn Actor>;

    /// Durable encoding of the actor state
    fn save_state(&self) -> CoreResult<Vec<u8>>;

    fn as_any(&self) -> &dyn Any;
}

/// Message queued by a handler, delivered after the handler succeeds
pub struct OutMessage {
    pub to: Address,
    /// Value leaving the sender (forwarding fee is taken from it)
    pub value: Amount,
    pub op: Op,
    pub bounce: bool,
    /// Initial state deployed at `to` if nothing lives there yet
    pub init: Option<Box<dyn Actor>>,
}

impl fmt::Debug for OutMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutMessage")
            .field("to", &self.to)
            .field("value", &self.value)
            .field("op", &self.op.name())
            .field("bounce", &self.bounce)
            .field("init", &self.init.as_ref().map(|a| a.kind()))
            .finish()
    }
}

/// Execution context for a single message
pub struct Context<'a> {
    /// Address of the running actor
    pub address: Address,
    pub now: Timestamp,
    pub config: &'a ChainConfig,
    pub fees: FeeModel,
    inbound_value: Amount,
    compute_fee: Amount,
    /// Balance after crediting the inbound value and paying compute
    balance: Amount,
    outbox: Vec<OutMessage>,
    sent_total: Amount,
}

impl<'a> Context<'a> {
    pub fn new(
        address: Address,
        now: Timestamp,
        config: &'a ChainConfig,
        inbound_value: Amount,
        compute_fee: Amount,
        balance: Amount,
    ) -> Self {
        Self {
            address,
            now,
            config,
            fees: config.fee_model(),
            inbound_value,
            compute_fee,
            balance,
            outbox: Vec::new(),
            sent_total: Amount::zero(),
        }
    }

    pub fn inbound_value(&self) -> &Amount {
        &self.inbound_value
    }

    /// Compute fee paid so far in this transaction
    pub fn compute_fee(&self) -> &Amount {
        &self.compute_fee
    }

    pub fn balance(&self) -> &Amount {
        &self.balance
    }

    pub fn sent_total(&self) -> &Amount {
        &self.sent_total
    }

    /// Inbound value not yet spent on compute or sends
    pub fn remaining_value(&self) -> Amount {
        self.inbound_value
            .saturating_sub(&self.compute_fee)
            .saturating_sub(&self.sent_total)
    }

    /// Balance left after queued sends, minus `reserve`
    pub fn free_balance(&self, reserve: &Amount) -> Amount {
        self.balance.saturating_sub(&self.sent_total).saturating_sub(reserve)
    }

    /// Pay for work beyond the per-op gas, out of the actor's own balance
    pub fn charge_gas(&mut self, gas: Gas) -> ActorResult {
        let fee = self.fees.compute_fee(gas);
        self.balance = self.balance.checked_sub(&fee)
            .ok_or_else(|| ActorError::new(EXIT_OUT_OF_GAS, "balance cannot cover gas"))?;
        // Extra gas comes from the actor, not from the caller's value
        self.inbound_value = self.inbound_value.clone() + fee.clone();
        self.compute_fee = self.compute_fee.clone() + fee;
        Ok(())
    }

    pub fn forward_fee(&self, op: &Op) -> Amount {
        self.fees.forward_fee(op)
    }

    fn push(&mut self, to: Address, value: Amount, op: Op, bounce: bool, init: Option<Box<dyn Actor>>) {
        self.sent_total = self.sent_total.clone() + value.clone();
        self.outbox.push(OutMessage { to, value, op, bounce, init });
    }

    pub fn send(&mut self, to: Address, value: Amount, op: Op) {
        self.push(to, value, op, true, None);
    }

    pub fn send_non_bounceable(&mut self, to: Address, value: Amount, op: Op) {
        self.push(to, value, op, false, None);
    }

    pub fn send_with_init(&mut self, to: Address, value: Amount, op: Op, init: Box<dyn Actor>) {
        self.push(to, value, op, true, Some(init));
    }

    /// Return `value` as `GasExcess` unless forwarding would eat all of it
    pub fn send_excess(&mut self, to: Address, value: Amount) {
        if value > self.forward_fee(&Op::GasExcess) {
            self.send_non_bounceable(to, value, Op::GasExcess);
        }
    }

    /// Whether every queued send is covered by the balance
    pub fn actions_fit(&self) -> bool {
        self.sent_total <= self.balance
    }

    pub fn outbox(&self) -> &[OutMessage] {
        &self.outbox
    }

    /// Balance after the queued sends, and the sends themselves
    pub fn into_outbox(self) -> (Amount, Amount, Vec<OutMessage>) {
        let remaining = self.balance.saturating_sub(&self.sent_total);
        (remaining, self.compute_fee, self.outbox)
    }
}
