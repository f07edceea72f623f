/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `exporters`: exporter:{id} -> Exporter (JSON)
/// - `pipelines`: pipeline:{id} -> Pipeline (JSON)
/// - `ledgers`: ledger:{name} -> LedgerInfo (JSON)
/// - `logs`: log:{ledger}:{id:020} -> Log (JSON)
/// - `export_states`: state:{ledger} -> last exported log id (JSON)
///
/// Log ids are zero-padded so lexicographic order is ascending id order.

pub const EXPORTERS: &str = "exporters";
pub const PIPELINES: &str = "pipelines";
pub const LEDGERS: &str = "ledgers";
pub const LOGS: &str = "logs";
pub const EXPORT_STATES: &str = "export_states";

/// Encode an exporter key: exporter:{id}
pub fn encode_exporter_key(id: &str) -> Vec<u8> {
    format!("exporter:{}", id).into_bytes()
}

/// Encode a pipeline key: pipeline:{id}
pub fn encode_pipeline_key(id: &str) -> Vec<u8> {
    format!("pipeline:{}", id).into_bytes()
}

/// Encode a ledger key: ledger:{name}
pub fn encode_ledger_key(name: &str) -> Vec<u8> {
    format!("ledger:{}", name).into_bytes()
}

/// Encode a log key: log:{ledger}:{id:020}
pub fn encode_log_key(ledger: &str, id: u64) -> Vec<u8> {
    format!("log:{}:{:020}", ledger, id).into_bytes()
}

/// Encode a log prefix for range scan: log:{ledger}:
pub fn encode_log_prefix(ledger: &str) -> Vec<u8> {
    format!("log:{}:", ledger).into_bytes()
}

/// Decode a log key: log:{ledger}:{id:020} -> (ledger, id)
pub fn decode_log_key(key: &[u8]) -> Option<(String, u64)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (ledger, id) = key_str.strip_prefix("log:")?.rsplit_once(':')?;
    Some((ledger.to_string(), id.parse().ok()?))
}

/// Encode a global export state key: state:{ledger}
pub fn encode_export_state_key(ledger: &str) -> Vec<u8> {
    format!("state:{}", ledger).into_bytes()
}

pub fn decode_export_state_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("state:").map(str::to_string)
}

/// Ledger names are embedded in log keys, so the separator is forbidden
pub fn is_valid_ledger_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(':')
}
