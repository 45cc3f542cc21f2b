//! Bearer tokens: a signed JSON object `{sub, iat, exp, scopes[]}`. Signed
//! with HMAC-SHA256 via `ring`, the same crate already pulled in for
//! certificate verification, base64url-free for simplicity (hex-encoded
//! end to end).

use chrono::{DateTime, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};

use alicia_core::AliciaError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub scopes: Vec<String>,
}

pub struct TokenIssuer {
    key: hmac::Key,
}

pub struct VerifiedToken {
    pub subject: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenIssuer {
    pub fn new(signing_key: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, signing_key),
        }
    }

    /// Issue a token scoped to `scopes`, valid for `ttl`.
    pub fn issue(&self, subject: &str, scopes: Vec<String>, ttl: chrono::Duration) -> Result<String, AliciaError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            scopes,
        };
        let body = serde_json::to_vec(&claims)?;
        let signature = hmac::sign(&self.key, &body);
        Ok(format!("{}.{}", hex::encode(&body), hex::encode(signature.as_ref())))
    }

    /// Verify the signature and expiry, returning the decoded claims.
    /// Any malformed, mismatched, or expired token is reported uniformly as
    /// `Unauthorized` — never which specific check failed.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, AliciaError> {
        let (body_hex, sig_hex) = token
            .split_once('.')
            .ok_or_else(|| AliciaError::Unauthorized("malformed token".into()))?;
        let body = hex::decode(body_hex).map_err(|_| AliciaError::Unauthorized("malformed token".into()))?;
        let signature = hex::decode(sig_hex).map_err(|_| AliciaError::Unauthorized("malformed token".into()))?;

        hmac::verify(&self.key, &body, &signature)
            .map_err(|_| AliciaError::Unauthorized("invalid token signature".into()))?;

        let claims: Claims = serde_json::from_slice(&body)
            .map_err(|_| AliciaError::Unauthorized("malformed token".into()))?;

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AliciaError::Unauthorized("malformed token".into()))?;
        if expires_at < Utc::now() {
            return Err(AliciaError::Unauthorized("token expired".into()));
        }

        Ok(VerifiedToken {
            subject: claims.sub,
            scopes: claims.scopes,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_and_carries_scopes() {
        let issuer = TokenIssuer::new(b"test-signing-key");
        let token = issuer
            .issue("gateway-client", vec!["voice:*".to_string()], chrono::Duration::minutes(5))
            .unwrap();
        let verified = issuer.verify(&token).unwrap();
        assert_eq!(verified.subject, "gateway-client");
        assert_eq!(verified.scopes, vec!["voice:*".to_string()]);
    }

    #[test]
    fn tampered_token_body_fails_verification() {
        let issuer = TokenIssuer::new(b"test-signing-key");
        let token = issuer
            .issue("gateway-client", vec![], chrono::Duration::minutes(5))
            .unwrap();
        let mut tampered = token.clone();
        tampered.push('0');
        assert!(issuer.verify(&tampered).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new(b"test-signing-key");
        let token = issuer
            .issue("gateway-client", vec![], chrono::Duration::seconds(-1))
            .unwrap();
        assert!(issuer.verify(&token).is_err());
    }
}
