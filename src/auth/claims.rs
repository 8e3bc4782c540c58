use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Claims the backend puts in its access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>, // account email
    pub user_id: Option<i64>,
    pub exp: Option<i64>, // expires at (unix timestamp)
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp
            .and_then(|exp| OffsetDateTime::from_unix_timestamp(exp).ok())
    }
}

/// Reads the payload without checking the signature. The client never holds
/// the signing secret; this is for display only and the server stays the
/// judge of validity.
pub fn peek_claims(token: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}
