use serde::{Deserialize, Serialize};

use crate::models::Log;

/// A log tagged with its originating ledger
///
/// A shared exporter receives items from several ledgers concurrently, so drivers
/// need the ledger name next to every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogWithLedger {
    pub ledger: String,
    #[serde(flatten)]
    pub log: Log,
}

impl LogWithLedger {
    pub fn new(ledger: impl Into<String>, log: Log) -> Self {
        Self {
            ledger: ledger.into(),
            log,
        }
    }

    pub fn id(&self) -> u64 {
        self.log.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_with_ledger_flattens_log_fields() {
        let item = LogWithLedger::new("orders", Log::new(12, "NEW_TRANSACTION", json!({"tx": 1})));
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["ledger"], "orders");
        assert_eq!(value["id"], 12);
        assert_eq!(value["type"], "NEW_TRANSACTION");
        assert_eq!(value["payload"]["tx"], 1);
    }
}
