// treasury/src/wallet.rs

use crate::{sub, TreasuryError, TreasuryResult};
use pool_core::{
    Actor, ActorKind, ActorResult, Amount, Context, CoreResult, Message, Op, Timestamp,
};
use pool_crypto::{Address, ContractKind};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Address of `owner`'s wallet shard under `treasury`
pub fn wallet_address(treasury: &Address, owner: &Address) -> Address {
    Address::derive(ContractKind::Wallet, treasury, &[owner.as_bytes()])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletStatus {
    Uninitialized,
    Active,
}

/// Token holdings of one depositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub treasury: Address,
    pub owner: Address,
    pub token_balance: Amount,
    /// Tokens from deposits whose round has not started yet
    pub staking_pending: Amount,
    pub staking_unlock_at: Timestamp,
    /// Tokens sent for burning and not confirmed yet
    pub unstaking_pending: Amount,
    pub status: WalletStatus,
}

impl WalletState {
    /// Tokens locked by recent deposits at `now`
    pub fn locked(&self, now: Timestamp) -> Amount {
        if now < self.staking_unlock_at {
            self.staking_pending.clone()
        } else {
            Amount::zero()
        }
    }

    /// Tokens the owner may withdraw at `now`
    pub fn available(&self, now: Timestamp) -> Amount {
        self.token_balance
            .saturating_sub(&self.unstaking_pending)
            .saturating_sub(&self.locked(now))
    }
}

/// Wallet shard actor
#[derive(Debug, Clone)]
pub struct Wallet {
    state: WalletState,
}

impl Wallet {
    pub fn new(treasury: Address, owner: Address) -> Self {
        Self {
            state: WalletState {
                treasury,
                owner,
                token_balance: Amount::zero(),
                staking_pending: Amount::zero(),
                staking_unlock_at: 0,
                unstaking_pending: Amount::zero(),
                status: WalletStatus::Uninitialized,
            },
        }
    }

    pub fn from_state(state: WalletState) -> Self {
        Self { state }
    }

    pub fn get_wallet_state(&self) -> &WalletState {
        &self.state
    }

    fn save_coins(
        &mut self,
        ctx: &mut Context<'_>,
        msg: &Message,
        owner: &Address,
        tokens: &Amount,
        unlock_at: Timestamp,
    ) -> TreasuryResult<()> {
        if msg.from != self.state.treasury {
            return Err(TreasuryError::unauthorized(msg.from, "treasury"));
        }
        if owner != &self.state.owner {
            return Err(TreasuryError::InvalidRequest(format!("wallet of {} credited for {}", self.state.owner, owner)));
        }

        let s = &mut self.state;
        if ctx.now >= s.staking_unlock_at {
            s.staking_pending = Amount::zero();
        }
        s.token_balance = s.token_balance.clone() + tokens.clone();
        s.staking_pending = s.staking_pending.clone() + tokens.clone();
        s.staking_unlock_at = s.staking_unlock_at.max(unlock_at);
        s.status = WalletStatus::Active;

        tracing::debug!("Wallet {} credited {} tokens", ctx.address, tokens);

        let excess = ctx.free_balance(&ctx.fees.wallet_storage());
        ctx.send_excess(self.state.owner, excess);
        Ok(())
    }

    fn withdraw(&mut self, ctx: &mut Context<'_>, msg: &Message, tokens: &Amount) -> TreasuryResult<()> {
        if msg.from != self.state.owner {
            return Err(TreasuryError::unauthorized(msg.from, "owner"));
        }
        if tokens.is_zero() {
            return Err(TreasuryError::InvalidRequest("zero tokens".into()));
        }
        let fee = ctx.fees.withdraw_fee();
        if msg.value < fee {
            return Err(TreasuryError::InsufficientValue { required: fee, provided: msg.value.clone() });
        }
        let available = self.state.available(ctx.now);
        if tokens > &available {
            return Err(TreasuryError::InsufficientTokens { requested: tokens.clone(), available });
        }

        self.state.unstaking_pending = self.state.unstaking_pending.clone() + tokens.clone();
        let value = ctx.remaining_value();
        ctx.send(
            self.state.treasury,
            value,
            Op::BurnTokens { owner: self.state.owner, tokens: tokens.clone() },
        );
        tracing::info!("Wallet {} requested burning {} tokens", ctx.address, tokens);
        Ok(())
    }

    fn withdraw_confirmed(&mut self, ctx: &mut Context<'_>, msg: &Message, tokens: &Amount) -> TreasuryResult<()> {
        if msg.from != self.state.treasury {
            return Err(TreasuryError::unauthorized(msg.from, "treasury"));
        }
        self.state.token_balance = sub(&self.state.token_balance, tokens, "token balance")?;
        self.state.unstaking_pending = sub(&self.state.unstaking_pending, tokens, "unstaking pending")?;

        let excess = ctx.free_balance(&ctx.fees.wallet_storage());
        ctx.send_excess(self.state.owner, excess);
        Ok(())
    }
}

impl Actor for Wallet {
    fn kind(&self) -> ActorKind {
        ActorKind::Wallet
    }

    fn receive(&mut self, ctx: &mut Context<'_>, msg: &Message) -> ActorResult {
        match &msg.op {
            Op::TopUp => Ok(()),
            Op::SaveCoins { owner, tokens, unlock_at, .. } => {
                self.save_coins(ctx, msg, owner, tokens, *unlock_at)?;
                Ok(())
            }
            Op::Withdraw { tokens } => Ok(self.withdraw(ctx, msg, tokens)?),
            Op::WithdrawConfirmed { tokens } => Ok(self.withdraw_confirmed(ctx, msg, tokens)?),
            other => Err(TreasuryError::UnknownOp(other.opcode()).into()),
        }
    }

    fn receive_bounce(&mut self, ctx: &mut Context<'_>, msg: &Message) -> ActorResult {
        if let Op::BurnTokens { tokens, .. } = &msg.op {
            self.state.unstaking_pending = sub(&self.state.unstaking_pending, tokens, "unstaking pending")?;
            tracing::warn!("Wallet {}: burning {} tokens was refused", ctx.address, tokens);
            let excess = ctx.free_balance(&ctx.fees.wallet_storage());
            ctx.send_excess(self.state.owner, excess);
        }
        Ok(())
    }

    fn clone_actor(&self) -> Box<dyn Actor> {
        Box::new(self.clone())
    }

    fn save_state(&self) -> CoreResult<Vec<u8>> {
        Ok(bincode::serialize(&self.state)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_core::ChainConfig;

    struct Fixture {
        config: ChainConfig,
        treasury: Address,
        owner: Address,
        wallet: Wallet,
    }

    impl Fixture {
        fn new() -> Self {
            let treasury = Address::from_label("treasury");
            let owner = Address::from_label("staker");
            Self {
                config: ChainConfig::test(),
                treasury,
                owner,
                wallet: Wallet::new(treasury, owner),
            }
        }

        fn deliver(&mut self, from: Address, value: Amount, op: Op, now: Timestamp) -> (ActorResult, Vec<pool_core::OutMessage>) {
            let address = wallet_address(&self.treasury, &self.owner);
            let msg = Message::new(from, address, value.clone(), op);
            let mut ctx = Context::new(address, now, &self.config, value.clone(), Amount::zero(), value);
            let result = self.wallet.receive(&mut ctx, &msg);
            let (_, _, outbox) = ctx.into_outbox();
            (result, outbox)
        }

        fn save(&mut self, tokens: u64, unlock_at: Timestamp) {
            let op = Op::SaveCoins {
                owner: self.owner,
                coins: Amount::from_coins(tokens),
                tokens: Amount::from_coins(tokens),
                unlock_at,
            };
            let (result, _) = self.deliver(self.treasury, Amount::parse_coins("0.05").unwrap(), op, 0);
            result.unwrap();
        }
    }

    #[test]
    fn test_save_coins_activates_wallet() {
        let mut f = Fixture::new();
        assert_eq!(f.wallet.get_wallet_state().status, WalletStatus::Uninitialized);
        f.save(10, 1_024);

        let state = f.wallet.get_wallet_state();
        assert_eq!(state.status, WalletStatus::Active);
        assert_eq!(state.token_balance, Amount::from_coins(10));
        assert_eq!(state.locked(0), Amount::from_coins(10));
        assert!(state.locked(1_024).is_zero());
    }

    #[test]
    fn test_save_coins_only_from_treasury() {
        let mut f = Fixture::new();
        let op = Op::SaveCoins {
            owner: f.owner,
            coins: Amount::from_coins(1),
            tokens: Amount::from_coins(1),
            unlock_at: 0,
        };
        let (result, _) = f.deliver(Address::from_label("mallory"), Amount::from_coins(1), op, 0);
        assert_eq!(result.unwrap_err().code, 105);
        assert!(f.wallet.get_wallet_state().token_balance.is_zero());
    }

    #[test]
    fn test_withdraw_respects_lock() {
        let mut f = Fixture::new();
        f.save(10, 1_024);
        let value = Amount::from_coins(1);

        let op = Op::Withdraw { tokens: Amount::from_coins(5) };
        let (result, _) = f.deliver(f.owner, value.clone(), op.clone(), 100);
        assert_eq!(result.unwrap_err().code, 107);

        let (result, outbox) = f.deliver(f.owner, value, op, 2_000);
        result.unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, f.treasury);
        assert_eq!(f.wallet.get_wallet_state().unstaking_pending, Amount::from_coins(5));
        assert_eq!(f.wallet.get_wallet_state().available(2_000), Amount::from_coins(5));
    }

    #[test]
    fn test_withdraw_confirmed_debits_balance() {
        let mut f = Fixture::new();
        f.save(10, 0);
        let (result, _) = f.deliver(f.owner, Amount::from_coins(1), Op::Withdraw { tokens: Amount::from_coins(4) }, 10);
        result.unwrap();

        let (result, _) = f.deliver(
            f.treasury,
            Amount::parse_coins("0.01").unwrap(),
            Op::WithdrawConfirmed { tokens: Amount::from_coins(4) },
            10,
        );
        result.unwrap();
        let state = f.wallet.get_wallet_state();
        assert_eq!(state.token_balance, Amount::from_coins(6));
        assert!(state.unstaking_pending.is_zero());
    }

    #[test]
    fn test_withdraw_needs_fee() {
        let mut f = Fixture::new();
        f.save(10, 0);
        let (result, _) = f.deliver(f.owner, Amount::from_nano(1_000), Op::Withdraw { tokens: Amount::from_coins(1) }, 10);
        assert_eq!(result.unwrap_err().code, 102);
    }
}
