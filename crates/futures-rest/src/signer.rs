//! HMAC-SHA256 signing for `USER_DATA`/`TRADE` endpoints.

use crate::credentials::ApiCredentials;
use crate::error::FuturesRestError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// Lowercase hex HMAC-SHA256 of `message` under the secret key.
    pub fn sign(&self, message: &str) -> Result<String, FuturesRestError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .map_err(|e| FuturesRestError::Signing(e.to_string()))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Query string in parameter order, then `recvWindow` (if any) and
    /// `timestamp`, then the signature over everything before it.
    pub fn signed_query(
        &self,
        params: &[(&str, String)],
        recv_window_ms: Option<u64>,
        timestamp_ms: i64,
    ) -> Result<String, FuturesRestError> {
        let mut parts: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        if let Some(window) = recv_window_ms {
            parts.push(format!("recvWindow={}", window));
        }
        parts.push(format!("timestamp={}", timestamp_ms));

        let query = parts.join("&");
        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }
}
