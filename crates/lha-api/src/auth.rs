//! Bearer credential verification.
//!
//! Credentials are HS256 JWTs signed with the shared secret from
//! configuration. The principal is taken from the `user` claim (falling back
//! to `sub`). `exp` is honoured when present; tokens without it do not
//! expire.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lha_api::auth::CredentialVerifier;
//!
//! let verifier = CredentialVerifier::new("shared-secret");
//! let token = verifier.issue("danijel", None)?;
//! let principal = verifier.verify(&token)?;
//! assert_eq!(principal.name, "danijel");
//! ```

use axum::http::HeaderMap;
use base64::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Verified identity attached to the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub name: String,
    /// `iat`, seconds since the epoch.
    pub issued_at: Option<i64>,
    /// `exp`, seconds since the epoch.
    pub expires_at: Option<i64>,
    /// All decoded claims.
    pub claims: Value,
}

/// Credential failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header.
    #[error("Missing bearer token")]
    MissingToken,

    /// Not a well-formed HS256 JWT.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Signature does not match the shared secret.
    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token has expired")]
    Expired,

    /// The secret cannot be used as an HMAC key.
    #[error("Signing error: {0}")]
    Signing(String),
}

/// Verifies and issues credentials with one shared secret.
pub struct CredentialVerifier {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier").finish_non_exhaustive()
    }
}

impl CredentialVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Mint a token for `user`, optionally expiring after `expires_in` seconds.
    pub fn issue(&self, user: &str, expires_in: Option<i64>) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let mut claims = json!({ "user": user, "iat": now });
        if let Some(secs) = expires_in {
            let exp = now
                .checked_add(secs)
                .ok_or_else(|| AuthError::Signing(format!("expiry of {}s is out of range", secs)))?;
            claims["exp"] = json!(exp);
        }

        let header = BASE64_URL_SAFE_NO_PAD.encode(json!({"alg": ALGORITHM, "typ": "JWT"}).to_string());
        let payload = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
        let signature = {
            let mut mac = self.mac()?;
            mac.update(format!("{}.{}", header, payload).as_bytes());
            BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
        };
        Ok(format!("{}.{}.{}", header, payload, signature))
    }

    /// Verify a token and decode its principal.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed("expected three segments".into()));
        };

        let header: Value = decode_segment(header_b64, "header")?;
        if header.get("alg").and_then(Value::as_str) != Some(ALGORITHM) {
            return Err(AuthError::Malformed(format!("algorithm must be {}", ALGORITHM)));
        }

        let signature = BASE64_URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed("invalid signature encoding".into()))?;
        let mut mac = self.mac()?;
        mac.update(format!("{}.{}", header_b64, payload_b64).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let claims: Value = decode_segment(payload_b64, "payload")?;
        if !claims.is_object() {
            return Err(AuthError::Malformed("payload must be a JSON object".into()));
        }

        let expires_at = claims.get("exp").and_then(Value::as_i64);
        if let Some(exp) = expires_at {
            if exp <= chrono::Utc::now().timestamp() {
                return Err(AuthError::Expired);
            }
        }

        let name = claims
            .get("user")
            .or_else(|| claims.get("sub"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Principal {
            name,
            issued_at: claims.get("iat").and_then(Value::as_i64),
            expires_at,
            claims,
        })
    }
}

fn decode_segment(segment: &str, what: &str) -> Result<Value, AuthError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Malformed(format!("invalid {} encoding", what)))?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed(format!("invalid {} JSON", what)))
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or(AuthError::MissingToken)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_issue_and_verify() {
        let verifier = CredentialVerifier::new("secret");
        let token = verifier.issue("danijel", None).unwrap();
        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.name, "danijel");
        assert!(principal.issued_at.is_some());
        assert_eq!(principal.expires_at, None);
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let token = CredentialVerifier::new("one").issue("a", None).unwrap();
        let err = CredentialVerifier::new("two").verify(&token).unwrap_err();
        assert_eq!(err, AuthError::BadSignature);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let verifier = CredentialVerifier::new("secret");
        let token = verifier.issue("alice", None).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = BASE64_URL_SAFE_NO_PAD.encode(r#"{"user":"mallory","iat":0}"#);
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);
        assert_eq!(verifier.verify(&tampered).unwrap_err(), AuthError::BadSignature);
    }

    #[test]
    fn test_none_algorithm_rejected() {
        let verifier = CredentialVerifier::new("secret");
        let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = BASE64_URL_SAFE_NO_PAD.encode(r#"{"user":"x"}"#);
        let token = format!("{}.{}.", header, payload);
        assert!(matches!(verifier.verify(&token), Err(AuthError::Malformed(_))));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let verifier = CredentialVerifier::new("secret");
        assert!(matches!(verifier.verify("not-a-token"), Err(AuthError::Malformed(_))));
        assert!(matches!(verifier.verify("a.b.c.d"), Err(AuthError::Malformed(_))));
    }

    #[test]
    fn test_expired_token() {
        let verifier = CredentialVerifier::new("secret");
        let token = verifier.issue("bob", Some(-10)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn test_out_of_range_expiry_is_rejected() {
        let verifier = CredentialVerifier::new("secret");
        assert!(matches!(verifier.issue("bob", Some(i64::MAX)), Err(AuthError::Signing(_))));

        let token = verifier.issue("bob", Some(3600)).unwrap();
        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.expires_at, principal.issued_at.map(|iat| iat + 3600));
    }

    #[test]
    fn test_sub_claim_fallback() {
        let secret = "secret";
        let verifier = CredentialVerifier::new(secret);
        let header = BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = BASE64_URL_SAFE_NO_PAD.encode(r#"{"sub":"svc-1","iat":1752170520}"#);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", header, payload).as_bytes());
        let sig = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        let principal = verifier.verify(&format!("{}.{}.{}", header, payload, sig)).unwrap();
        assert_eq!(principal.name, "svc-1");
        assert_eq!(principal.issued_at, Some(1752170520));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), Err(AuthError::MissingToken));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), Err(AuthError::MissingToken));

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Ok("abc.def.ghi"));
    }
}
