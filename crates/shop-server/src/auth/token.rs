use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::identity::Identity;
use crate::error::{AppError, AppResult};
use crate::models::Role;

const TOKEN_DURATION_HOURS: i64 = 72;
const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signing and verification keys derived once from the process-wide secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, user_id: i64, role: Role) -> AppResult<IssuedToken> {
        self.issue_at(user_id, role, Utc::now())
    }

    fn issue_at(&self, user_id: i64, role: Role, issued_at: DateTime<Utc>) -> AppResult<IssuedToken> {
        let expires_at = issued_at + Duration::hours(TOKEN_DURATION_HOURS);
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Check signature, algorithm and expiry, then resolve the identity.
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::Malformed)?;

        Ok(Identity {
            user_id,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> TokenKeys {
        TokenKeys::new("unit-test-secret")
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let keys = keys();
        let issued = keys.issue(42, Role::Admin).unwrap();
        let identity = keys.verify(&issued.token).unwrap();
        assert_eq!(identity, Identity { user_id: 42, role: Role::Admin });
    }

    #[test]
    fn expiry_is_seventy_two_hours_after_issue() {
        let now = Utc::now();
        let issued = keys().issue_at(1, Role::User, now).unwrap();
        assert_eq!(issued.expires_at - now, Duration::hours(72));
    }

    #[test]
    fn token_is_valid_until_its_expiry() {
        let keys = keys();
        let issued = keys
            .issue_at(7, Role::User, Utc::now() - Duration::hours(71))
            .unwrap();
        assert_eq!(keys.verify(&issued.token).unwrap().user_id, 7);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let issued = keys
            .issue_at(7, Role::User, Utc::now() - Duration::hours(73))
            .unwrap();
        assert_eq!(keys.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let issued = TokenKeys::new("someone-else").issue(1, Role::Admin).unwrap();
        assert_eq!(keys().verify(&issued.token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn other_algorithm_is_rejected_even_with_the_right_secret() {
        let claims = Claims {
            sub: "1".into(),
            role: Role::Admin,
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();
        assert_eq!(keys().verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn unsigned_token_is_rejected() {
        // {"alg":"none","typ":"JWT"}.{"sub":"1","role":"admin","iat":0,"exp":9999999999}.
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
                     eyJzdWIiOiIxIiwicm9sZSI6ImFkbWluIiwiaWF0IjowLCJleHAiOjk5OTk5OTk5OTl9.";
        assert!(keys().verify(token).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let keys = keys();
        let user_token = keys.issue(5, Role::User).unwrap().token;
        let admin_token = keys.issue(5, Role::Admin).unwrap().token;

        let user_parts: Vec<&str> = user_token.split('.').collect();
        let admin_parts: Vec<&str> = admin_token.split('.').collect();
        let forged = format!("{}.{}.{}", user_parts[0], admin_parts[1], user_parts[2]);

        assert_eq!(keys.verify(&forged), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = keys();
        assert_eq!(keys.verify(""), Err(TokenError::Malformed));
        assert_eq!(keys.verify("not-a-token"), Err(TokenError::Malformed));
    }

    #[test]
    fn non_numeric_subject_is_malformed() {
        let claims = Claims {
            sub: "alice".into(),
            role: Role::User,
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(ALGORITHM),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();
        assert_eq!(keys().verify(&token), Err(TokenError::Malformed));
    }
}
