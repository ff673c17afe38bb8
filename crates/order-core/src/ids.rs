use uuid::Uuid;

/// Longest client order id the futures API accepts.
const MAX_CLIENT_ORDER_ID_LEN: usize = 36;

/// Generate a unique client order ID with a prefix.
///
/// Format: `{prefix}_{uuid}` with the v4 UUID in simple form, truncated to
/// the exchange limit of 36 characters.
pub fn generate_client_order_id(prefix: &str) -> String {
    let mut id = format!("{}_{}", prefix, Uuid::new_v4().as_simple());
    id.truncate(MAX_CLIENT_ORDER_ID_LEN);
    id
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
