// sandbox/src/transaction.rs

use pool_core::{Amount, Timestamp};
use pool_crypto::Address;
use serde::{Deserialize, Serialize};

/// Processing of one message by its recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Logical time, increasing by one per transaction
    pub lt: u64,
    /// `None` for messages injected from outside
    pub from: Option<Address>,
    pub to: Address,
    /// Value credited by the inbound message
    pub value: Amount,
    pub opcode: u32,
    pub op_name: String,
    /// The inbound message deployed the recipient
    pub deploy: bool,
    pub success: bool,
    pub exit_code: Option<u32>,
    pub out_messages_count: usize,
    pub compute_fee: Amount,
    pub now: Timestamp,
}

/// Transactions caused by one injected message
#[derive(Debug, Clone, Default)]
pub struct SendResult {
    pub transactions: Vec<Transaction>,
}

impl SendResult {
    pub fn has_transaction(&self, pattern: &TxPattern) -> bool {
        self.transactions.iter().any(|tx| pattern.matches(tx))
    }

    pub fn find(&self, pattern: &TxPattern) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| pattern.matches(tx))
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Panics with the transaction list if nothing matches
    pub fn expect_transaction(&self, pattern: &TxPattern) -> &Transaction {
        match self.find(pattern) {
            Some(tx) => tx,
            None => panic!(
                "no transaction matches {:?}\ntransactions:\n{:#?}",
                pattern, self.transactions
            ),
        }
    }
}

/// Parse a `(min, max)` coin range such as `between("9.9", "10")`
pub fn between(min: &str, max: &str) -> (Amount, Amount) {
    let parse = |s: &str| Amount::parse_coins(s).unwrap_or_else(|_| panic!("bad amount {}", s));
    (parse(min), parse(max))
}

/// Partial description of a transaction; unset fields match anything
#[derive(Debug, Clone, Default)]
pub struct TxPattern {
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: Option<Amount>,
    pub value_between: Option<(Amount, Amount)>,
    pub opcode: Option<u32>,
    pub deploy: Option<bool>,
    pub success: Option<bool>,
    pub exit_code: Option<u32>,
    pub out_messages_count: Option<usize>,
}

impl TxPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, address: Address) -> Self {
        self.from = Some(address);
        self
    }

    pub fn to(mut self, address: Address) -> Self {
        self.to = Some(address);
        self
    }

    pub fn value(mut self, value: Amount) -> Self {
        self.value = Some(value);
        self
    }

    /// Inclusive range
    pub fn value_between(mut self, range: (Amount, Amount)) -> Self {
        self.value_between = Some(range);
        self
    }

    pub fn opcode(mut self, opcode: u32) -> Self {
        self.opcode = Some(opcode);
        self
    }

    pub fn deploy(mut self, deploy: bool) -> Self {
        self.deploy = Some(deploy);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn exit_code(mut self, code: u32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn out_messages(mut self, count: usize) -> Self {
        self.out_messages_count = Some(count);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(from) = &self.from {
            if tx.from.as_ref() != Some(from) {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if &tx.to != to {
                return false;
            }
        }
        if let Some(value) = &self.value {
            if &tx.value != value {
                return false;
            }
        }
        if let Some((min, max)) = &self.value_between {
            if &tx.value < min || &tx.value > max {
                return false;
            }
        }
        if let Some(opcode) = self.opcode {
            if tx.opcode != opcode {
                return false;
            }
        }
        if let Some(deploy) = self.deploy {
            if tx.deploy != deploy {
                return false;
            }
        }
        if let Some(success) = self.success {
            if tx.success != success {
                return false;
            }
        }
        if let Some(code) = self.exit_code {
            if tx.exit_code != Some(code) {
                return false;
            }
        }
        if let Some(count) = self.out_messages_count {
            if tx.out_messages_count != count {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Transaction {
        Transaction {
            lt: 1,
            from: Some(Address::from_label("a")),
            to: Address::from_label("b"),
            value: Amount::parse_coins("9.95").unwrap(),
            opcode: 7,
            op_name: "test".into(),
            deploy: false,
            success: true,
            exit_code: None,
            out_messages_count: 1,
            compute_fee: Amount::zero(),
            now: 0,
        }
    }

    #[test]
    fn test_pattern_matching() {
        let t = tx();
        assert!(TxPattern::new().matches(&t));
        assert!(TxPattern::new().from(Address::from_label("a")).opcode(7).success(true).matches(&t));
        assert!(TxPattern::new().value_between(between("9.9", "10")).matches(&t));
        assert!(!TxPattern::new().value_between(between("0", "0.1")).matches(&t));
        assert!(!TxPattern::new().to(Address::from_label("a")).matches(&t));
        assert!(!TxPattern::new().exit_code(101).matches(&t));
        assert!(!TxPattern::new().out_messages(0).matches(&t));
    }
}
