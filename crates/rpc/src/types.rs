// rpc/src/types.rs
use serde::{Deserialize, Serialize};
use pool_core::{Amount, Fees, Op, RoundResult, Timestamp};
use pool_crypto::Address;
use sandbox::Transaction;
use treasury::{LoanState, ParticipationRecord, PoolState, RewardRecord, RoundState, WalletState, WalletStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorResponse>,
    pub id: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Message handed to the node for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    pub op: Op,
}

/// `treasury_sendMessage` parameter; addresses in hex, value in coins
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageParams {
    pub from: String,
    pub to: String,
    pub value: String,
    pub op: Op,
}

// Responses render amounts as decimal coin strings and addresses as hex

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesResponse {
    pub deposit_coins_fee: String,
    pub withdraw_fee: String,
    pub request_loan_fee: String,
    pub governance_fee: String,
    pub wallet_storage: String,
    pub loan_storage: String,
    pub treasury_storage: String,
    pub new_stake_fee: String,
}

impl From<&Fees> for FeesResponse {
    fn from(fees: &Fees) -> Self {
        Self {
            deposit_coins_fee: fees.deposit_coins_fee.to_string(),
            withdraw_fee: fees.withdraw_fee.to_string(),
            request_loan_fee: fees.request_loan_fee.to_string(),
            governance_fee: fees.governance_fee.to_string(),
            wallet_storage: fees.wallet_storage.to_string(),
            loan_storage: fees.loan_storage.to_string(),
            treasury_storage: fees.treasury_storage.to_string(),
            new_stake_fee: fees.new_stake_fee.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryStateResponse {
    pub total_coins: String,
    pub total_tokens: String,
    pub total_staking: String,
    pub total_unstaking: String,
    pub total_validators_stake: String,
    pub exchange_rate: String,
    pub participations: Vec<Timestamp>,
    pub pending_withdrawals: usize,
    pub stopped: bool,
    pub reward_share: u16,
    pub driver: String,
    pub halter: String,
    pub governor: String,
    pub proposed_governor: Option<String>,
    pub content: String,
}

impl From<&PoolState> for TreasuryStateResponse {
    fn from(state: &PoolState) -> Self {
        let view = state.view();
        Self {
            total_coins: view.total_coins.to_string(),
            total_tokens: view.total_tokens.to_string(),
            total_staking: view.total_staking.to_string(),
            total_unstaking: view.total_unstaking.to_string(),
            total_validators_stake: view.total_validators_stake.to_string(),
            exchange_rate: view.exchange_rate.to_string(),
            participations: view.participations,
            pending_withdrawals: view.pending_withdrawals,
            stopped: view.stopped,
            reward_share: view.reward_share,
            driver: view.driver.to_hex(),
            halter: view.halter.to_hex(),
            governor: view.governor.to_hex(),
            proposed_governor: view.proposed_governor.map(|a| a.to_hex()),
            content: hex::encode(&view.content),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletStateResponse {
    pub treasury: String,
    pub owner: String,
    pub token_balance: String,
    pub staking_pending: String,
    pub staking_unlock_at: Timestamp,
    pub unstaking_pending: String,
    pub status: WalletStatus,
}

impl From<&WalletState> for WalletStateResponse {
    fn from(state: &WalletState) -> Self {
        Self {
            treasury: state.treasury.to_hex(),
            owner: state.owner.to_hex(),
            token_balance: state.token_balance.to_string(),
            staking_pending: state.staking_pending.to_string(),
            staking_unlock_at: state.staking_unlock_at,
            unstaking_pending: state.unstaking_pending.to_string(),
            status: state.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanResponse {
    pub validator: String,
    pub loan_amount: String,
    pub min_payment: String,
    pub max_punishment: String,
    pub validator_reward_share: u8,
    pub escrow: String,
    pub state: LoanState,
    pub outcome: Option<RoundResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipationResponse {
    pub round_since: Timestamp,
    pub state: RoundState,
    pub loans: Vec<LoanResponse>,
    pub total_loan: String,
    pub profit: String,
    pub loss: String,
}

impl From<&ParticipationRecord> for ParticipationResponse {
    fn from(record: &ParticipationRecord) -> Self {
        Self {
            round_since: record.round_since,
            state: record.state,
            loans: record
                .loans
                .values()
                .map(|loan| LoanResponse {
                    validator: loan.validator.to_hex(),
                    loan_amount: loan.loan_amount.to_string(),
                    min_payment: loan.min_payment.to_string(),
                    max_punishment: loan.max_punishment.to_string(),
                    validator_reward_share: loan.validator_reward_share,
                    escrow: loan.escrow.to_string(),
                    state: loan.state,
                    outcome: loan.outcome.clone(),
                })
                .collect(),
            total_loan: record.total_loan.to_string(),
            profit: record.profit.to_string(),
            loss: record.loss.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardResponse {
    pub round_since: Timestamp,
    pub profit: String,
    pub loss: String,
    pub total_coins: String,
    pub total_tokens: String,
    pub published_at: Timestamp,
    /// Profit attributable to the queried token balance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<String>,
}

impl From<&RewardRecord> for RewardResponse {
    fn from(record: &RewardRecord) -> Self {
        Self {
            round_since: record.round_since,
            profit: record.profit.to_string(),
            loss: record.loss.to_string(),
            total_coins: record.total_coins.to_string(),
            total_tokens: record.total_tokens.to_string(),
            published_at: record.published_at,
            share: None,
        }
    }
}

impl RewardResponse {
    pub fn with_share(record: &RewardRecord, tokens: &Amount) -> Self {
        Self {
            share: Some(record.share_for(tokens).to_string()),
            ..Self::from(record)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub lt: u64,
    pub from: Option<String>,
    pub to: String,
    pub value: String,
    pub opcode: String,
    pub op_name: String,
    pub deploy: bool,
    pub success: bool,
    pub exit_code: Option<u32>,
    pub out_messages_count: usize,
    pub compute_fee: String,
    pub now: Timestamp,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            lt: tx.lt,
            from: tx.from.map(|a| a.to_hex()),
            to: tx.to.to_hex(),
            value: tx.value.to_string(),
            opcode: format!("0x{:08x}", tx.opcode),
            op_name: tx.op_name.clone(),
            deploy: tx.deploy,
            success: tx.success,
            exit_code: tx.exit_code,
            out_messages_count: tx.out_messages_count,
            compute_fee: tx.compute_fee.to_string(),
            now: tx.now,
        }
    }
}
