//! The read/submit boundary between the client core and the chain.

use alloy::primitives::{Address, Bytes, Log, B256, U256};
use alloy::sol_types::SolEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Minimal contract access used by the LiquidLong client.
///
/// Calldata and return data cross this boundary ABI-encoded; encoding and
/// decoding are the caller's responsibility. Retries, if any, belong to the
/// implementation. State-changing submissions must never be retried
/// automatically.
#[async_trait]
pub trait ContractBinding: Send + Sync + Debug {
    /// Execute a read-only call against `target` and return the raw result.
    async fn read(&self, target: Address, calldata: Bytes) -> Result<Bytes>;

    /// Submit a state-changing call with `value` wei attached and wait for
    /// its receipt.
    async fn submit(&self, target: Address, calldata: Bytes, value: U256) -> Result<TxReceipt>;
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// `true` if execution succeeded
    pub status: bool,
    /// Block the transaction was included in
    pub block_number: Option<u64>,
    /// Emitted logs, in emission order
    pub logs: Vec<Log>,
}

impl TxReceipt {
    /// Decode the first log matching event `E`.
    ///
    /// Logs whose first topic matches but whose payload fails to decode are
    /// skipped.
    pub fn find_event<E: SolEvent>(&self) -> Option<E> {
        self.logs
            .iter()
            .filter(|log| log.data.topics().first() == Some(&E::SIGNATURE_HASH))
            .find_map(|log| E::decode_log_data(&log.data, true).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ILiquidLong;
    use alloy::primitives::LogData;

    fn receipt_with(logs: Vec<Log>) -> TxReceipt {
        TxReceipt {
            tx_hash: B256::ZERO,
            status: true,
            block_number: Some(1),
            logs,
        }
    }

    #[test]
    fn test_find_event_decodes_matching_log() {
        let event = ILiquidLong::NewCup {
            user: Address::repeat_byte(7),
            cup: U256::from(42u64),
        };
        let log = Log {
            address: Address::repeat_byte(1),
            data: event.encode_log_data(),
        };

        let found = receipt_with(vec![log]).find_event::<ILiquidLong::NewCup>();
        let found = found.expect("NewCup should be found");
        assert_eq!(found.cup, U256::from(42u64));
        assert_eq!(found.user, Address::repeat_byte(7));
    }

    #[test]
    fn test_find_event_ignores_other_events() {
        let close = ILiquidLong::CloseCup {
            user: Address::ZERO,
            cup: U256::from(1u64),
        };
        let unrelated = Log {
            address: Address::ZERO,
            data: LogData::new_unchecked(vec![B256::repeat_byte(9)], Bytes::new()),
        };
        let receipt = receipt_with(vec![
            unrelated,
            Log {
                address: Address::ZERO,
                data: close.encode_log_data(),
            },
        ]);

        assert!(receipt.find_event::<ILiquidLong::NewCup>().is_none());
        assert!(receipt.find_event::<ILiquidLong::CloseCup>().is_some());
    }
}
