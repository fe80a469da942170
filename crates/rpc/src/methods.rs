// rpc/src/methods.rs
use crate::{
    FeesResponse, InboundMessage, LedgerView, ParticipationResponse, RewardResponse, RpcError,
    RpcResult, SendMessageParams, TransactionResponse, TreasuryStateResponse, WalletStateResponse,
};
use pool_core::Amount;
use pool_crypto::Address;
use std::sync::Arc;
use treasury::wallet_address;

/// Upper bound on `pool_getTransactions` page size
pub const MAX_TRANSACTION_PAGE: usize = 1_000;

pub struct RpcMethods {
    ledger: Arc<dyn LedgerView>,
}

impl RpcMethods {
    pub fn new(ledger: Arc<dyn LedgerView>) -> Self {
        Self { ledger }
    }

    pub async fn handle(&self, method: &str, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        match method {
            // Treasury queries
            "treasury_getFees" => self.treasury_get_fees().await,
            "treasury_getState" => self.treasury_get_state(params).await,
            "treasury_getTimes" => self.treasury_get_times().await,
            "treasury_getWalletAddress" => self.treasury_get_wallet_address(params).await,
            "treasury_getParticipation" => self.treasury_get_participation(params).await,
            "treasury_getRewards" => self.treasury_get_rewards(params).await,
            "treasury_getMaxPunishment" => self.treasury_get_max_punishment(params).await,

            // Wallet queries
            "wallet_getState" => self.wallet_get_state(params).await,

            // History
            "pool_getTransactions" => self.pool_get_transactions(params).await,

            // Inbound messages
            "treasury_sendMessage" => self.treasury_send_message(params).await,

            _ => Err(RpcError::MethodNotFound(method.to_string())),
        }
    }

    // ==================== TREASURY ====================

    async fn treasury_get_fees(&self) -> RpcResult<serde_json::Value> {
        let fees = self.ledger.fees().await;
        to_json(&FeesResponse::from(&fees))
    }

    async fn treasury_get_state(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 1, "treasury address")?;
        let treasury = parse_address(&params[0])?;

        match self.ledger.treasury(&treasury).await {
            Some(state) => to_json(&TreasuryStateResponse::from(&state)),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn treasury_get_times(&self) -> RpcResult<serde_json::Value> {
        to_json(&self.ledger.times().await)
    }

    async fn treasury_get_wallet_address(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 2, "treasury and owner addresses")?;
        let treasury = parse_address(&params[0])?;
        let owner = parse_address(&params[1])?;
        Ok(serde_json::json!(wallet_address(&treasury, &owner).to_hex()))
    }

    async fn treasury_get_participation(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 2, "treasury address and round")?;
        let treasury = parse_address(&params[0])?;
        let round_since = params[1].as_u64()
            .ok_or_else(|| RpcError::InvalidParams("Invalid round".into()))?;

        let state = self.ledger.treasury(&treasury).await
            .ok_or_else(|| RpcError::NotFound(format!("treasury {}", treasury)))?;
        match state.participations.get(&round_since) {
            Some(record) => to_json(&ParticipationResponse::from(record)),
            None => Ok(serde_json::Value::Null),
        }
    }

    async fn treasury_get_rewards(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 1, "treasury address")?;
        let treasury = parse_address(&params[0])?;

        let state = self.ledger.treasury(&treasury).await
            .ok_or_else(|| RpcError::NotFound(format!("treasury {}", treasury)))?;
        // Optional token balance to price each round's share for
        let tokens = match params.get(1) {
            Some(value) => Some(parse_coins(value)?),
            None => None,
        };
        let rewards: Vec<RewardResponse> = state.rewards_history
            .iter()
            .map(|record| match &tokens {
                Some(tokens) => RewardResponse::with_share(record, tokens),
                None => RewardResponse::from(record),
            })
            .collect();
        to_json(&rewards)
    }

    async fn treasury_get_max_punishment(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 1, "stake")?;
        let stake = parse_coins(&params[0])?;
        Ok(serde_json::json!(self.ledger.max_punishment(&stake).await.to_string()))
    }

    // ==================== WALLET ====================

    async fn wallet_get_state(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 1, "wallet address")?;
        let wallet = parse_address(&params[0])?;

        match self.ledger.wallet(&wallet).await {
            Some(state) => to_json(&WalletStateResponse::from(&state)),
            None => Ok(serde_json::Value::Null),
        }
    }

    // ==================== HISTORY ====================

    async fn pool_get_transactions(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 2, "start lt and limit")?;
        let from_lt = params[0].as_u64()
            .ok_or_else(|| RpcError::InvalidParams("Invalid lt".into()))?;
        let limit = params[1].as_u64()
            .ok_or_else(|| RpcError::InvalidParams("Invalid limit".into()))? as usize;
        if limit > MAX_TRANSACTION_PAGE {
            return Err(RpcError::InvalidParams(format!("Limit above {}", MAX_TRANSACTION_PAGE)));
        }

        let transactions = self.ledger.transactions(from_lt, limit).await?;
        let response: Vec<TransactionResponse> = transactions.iter().map(TransactionResponse::from).collect();
        to_json(&response)
    }

    // ==================== MESSAGES ====================

    async fn treasury_send_message(&self, params: serde_json::Value) -> RpcResult<serde_json::Value> {
        let params = param_array(params, 1, "message")?;
        let params: SendMessageParams = serde_json::from_value(params[0].clone())
            .map_err(|e| RpcError::InvalidParams(format!("Invalid message: {}", e)))?;

        let message = InboundMessage {
            from: Address::from_hex(&params.from)
                .map_err(|_| RpcError::InvalidParams("Invalid sender address".into()))?,
            to: Address::from_hex(&params.to)
                .map_err(|_| RpcError::InvalidParams("Invalid recipient address".into()))?,
            value: Amount::parse_coins(&params.value)
                .map_err(|e| RpcError::InvalidParams(e.to_string()))?,
            op: params.op,
        };

        tracing::info!("Queued {} from {} to {}", message.op.name(), message.from, message.to);
        self.ledger.submit(message).await?;
        Ok(serde_json::json!({ "queued": true }))
    }
}

fn param_array(params: serde_json::Value, min: usize, what: &str) -> RpcResult<Vec<serde_json::Value>> {
    let params: Vec<serde_json::Value> = serde_json::from_value(params)
        .map_err(|_| RpcError::InvalidParams("Expected array".into()))?;
    if params.len() < min {
        return Err(RpcError::InvalidParams(format!("Expected {}", what)));
    }
    Ok(params)
}

fn parse_address(value: &serde_json::Value) -> RpcResult<Address> {
    let s = value.as_str()
        .ok_or_else(|| RpcError::InvalidParams("Invalid address".into()))?;
    Address::from_hex(s)
        .map_err(|_| RpcError::InvalidParams("Invalid address format".into()))
}

fn parse_coins(value: &serde_json::Value) -> RpcResult<Amount> {
    let s = value.as_str()
        .ok_or_else(|| RpcError::InvalidParams("Invalid amount".into()))?;
    Amount::parse_coins(s)
        .map_err(|e| RpcError::InvalidParams(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> RpcResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}
