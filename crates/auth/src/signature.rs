//! Login signature for code-based user lookup
//!
//! `sns/getuserinfo_bycode` is authenticated by the login app rather than by
//! an access token: the request carries `accessKey` (login app id), a
//! millisecond `timestamp`, and `signature = BASE64(HMAC-SHA256(secret, timestamp))`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::credentials::LoginCredentials;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Sign a millisecond timestamp with the login app secret.
pub fn sign(secret: &str, timestamp_millis: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::InvalidCredentials(format!("login secret unusable as HMAC key: {e}")))?;
    mac.update(timestamp_millis.to_string().as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Query parameters authenticating one login-by-code request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSignature {
    pub access_key: String,
    pub timestamp: String,
    pub signature: String,
}

impl LoginSignature {
    pub fn new(login: &LoginCredentials, timestamp_millis: i64) -> Result<Self> {
        Ok(Self {
            access_key: login.app_id.clone(),
            timestamp: timestamp_millis.to_string(),
            signature: sign(login.app_secret.expose(), timestamp_millis)?,
        })
    }

    /// Sign with the current wall-clock time.
    pub fn now(login: &LoginCredentials) -> Result<Self> {
        let now_millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self::new(login, now_millis)
    }

    pub fn query(&self) -> [(&'static str, &str); 3] {
        [
            ("accessKey", self.access_key.as_str()),
            ("timestamp", self.timestamp.as_str()),
            ("signature", self.signature.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_matches_known_vector() {
        let signature = sign("login-secret", 1_546_084_445_901).unwrap();
        assert_eq!(signature, "aoG//CoVnkMwGV+VIhZdz+TdvBuDFWHpGj09z/wZk7M=");
    }

    #[test]
    fn signature_depends_on_timestamp() {
        let a = sign("login-secret", 1).unwrap();
        let b = sign("login-secret", 2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn login_signature_builds_query() {
        let login = LoginCredentials::new("dingoa-login", "login-secret");
        let sig = LoginSignature::new(&login, 1_546_084_445_901).unwrap();
        assert_eq!(
            sig.query(),
            [
                ("accessKey", "dingoa-login"),
                ("timestamp", "1546084445901"),
                ("signature", "aoG//CoVnkMwGV+VIhZdz+TdvBuDFWHpGj09z/wZk7M="),
            ]
        );
    }

    #[test]
    fn now_uses_millisecond_timestamp() {
        let login = LoginCredentials::new("dingoa-login", "login-secret");
        let sig = LoginSignature::now(&login).unwrap();
        // Millisecond epoch timestamps have 13 digits until the year 2286
        assert_eq!(sig.timestamp.len(), 13, "got {}", sig.timestamp);
    }
}
