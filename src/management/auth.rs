use chrono::Utc;
use tokio::sync::Mutex;

use crate::types::AccessToken;

/// Seconds before the real expiry at which a cached token is treated as stale.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Caches the client-credentials token used for metadata lookups so that
/// concurrent jobs do not each hit the token endpoint.
#[derive(Debug, Default)]
pub struct TokenManager {
    token: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached access token unless it is about to expire.
    pub async fn get_valid_token(&self) -> Option<String> {
        let token = self.token.lock().await;
        token
            .as_ref()
            .filter(|t| !Self::is_expired(t))
            .map(|t| t.access_token.clone())
    }

    pub async fn store(&self, mut token: AccessToken) {
        if token.obtained_at == 0 {
            token.obtained_at = Utc::now().timestamp() as u64;
        }
        *self.token.lock().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    fn is_expired(token: &AccessToken) -> bool {
        let now = Utc::now().timestamp() as u64;
        now + EXPIRY_MARGIN_SECS >= token.obtained_at + token.expires_in
    }
}
