// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session tokens.
//!
//! Phone-OTP identity verification happens outside the core; once the auth
//! bootstrap has asserted an identity, the core mints an HMAC-SHA256 signed
//! token binding `subject + role + expiry`. Both surfaces verify the same
//! token: REST as a bearer header, the realtime channel during
//! `registerUser` / `registerDriver`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// Who a session token speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    User,
    Admin,
}

/// Signed token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id: driver external id or user internal id.
    pub sub: String,
    pub role: Role,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// Mints and verifies session tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Mint a token valid for `ttl_seconds`.
    pub fn mint(&self, sub: &str, role: Role, ttl_seconds: i64) -> Result<String, CoreError> {
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp: chrono::Utc::now().timestamp() + ttl_seconds,
        };
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let tag = self.sign(body.as_bytes())?;
        Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Verify a token's signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, CoreError> {
        let (body, tag) = token.split_once('.').ok_or(CoreError::Unauthenticated)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| CoreError::Unauthenticated)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| {
            CoreError::Internal {
                details: "token secret unusable".to_string(),
            }
        })?;
        mac.update(body.as_bytes());
        mac.verify_slice(&tag).map_err(|_| CoreError::Unauthenticated)?;

        let claims: Claims = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(body)
                .map_err(|_| CoreError::Unauthenticated)?,
        )
        .map_err(|_| CoreError::Unauthenticated)?;

        if claims.exp < chrono::Utc::now().timestamp() {
            return Err(CoreError::Unauthenticated);
        }
        Ok(claims)
    }

    /// Verify and additionally require a role and subject binding.
    pub fn verify_subject(&self, token: &str, sub: &str, role: Role) -> Result<(), CoreError> {
        let claims = self.verify(token)?;
        if claims.role != role && claims.role != Role::Admin {
            return Err(CoreError::Unauthorized {
                reason: "wrong role for this operation".to_string(),
            });
        }
        if claims.sub != sub && claims.role != Role::Admin {
            return Err(CoreError::Unauthorized {
                reason: "token is bound to a different subject".to_string(),
            });
        }
        Ok(())
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| {
            CoreError::Internal {
                details: "token secret unusable".to_string(),
            }
        })?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_verify_round_trip() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint("DRV001", Role::Driver, 3600).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "DRV001");
        assert_eq!(claims.role, Role::Driver);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint("DRV001", Role::Driver, 3600).unwrap();
        let mut tampered = token.clone();
        tampered.replace_range(0..1, "x");
        assert!(matches!(
            signer.verify(&tampered),
            Err(CoreError::Unauthenticated)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = TokenSigner::new("a").mint("DRV001", Role::Driver, 3600).unwrap();
        assert!(TokenSigner::new("b").verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint("DRV001", Role::Driver, -1).unwrap();
        assert!(matches!(
            signer.verify(&token),
            Err(CoreError::Unauthenticated)
        ));
    }

    #[test]
    fn subject_binding_is_enforced() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint("DRV001", Role::Driver, 3600).unwrap();
        assert!(signer.verify_subject(&token, "DRV001", Role::Driver).is_ok());
        assert!(signer.verify_subject(&token, "DRV002", Role::Driver).is_err());
        assert!(signer.verify_subject(&token, "DRV001", Role::User).is_err());
    }

    #[test]
    fn admin_token_passes_any_subject() {
        let signer = TokenSigner::new("secret");
        let token = signer.mint("admin", Role::Admin, 3600).unwrap();
        assert!(signer.verify_subject(&token, "DRV001", Role::Driver).is_ok());
    }
}
