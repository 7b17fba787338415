use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GateError, Result};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    #[serde(default)]
    pub sub: String,
    /// Expiration time (as UTC timestamp). Optional here so a token without
    /// it decodes far enough to be reported as expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at (as UTC timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Token id, keeps tokens issued in the same second distinct
    #[serde(default)]
    pub jti: String,
}

impl Claims {
    pub fn new(subject: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: subject.to_string(),
            exp: Some(expires_at.timestamp()),
            iat: Utc::now().timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Signs and verifies identity tokens with a shared HMAC secret
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        // Only HS256 is accepted; a token announcing any other algorithm is
        // rejected before its signature is looked at
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issues a token for `subject` that expires `ttl` from now
    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| GateError::ValidationError(format!("token ttl out of range: {}", e)))?;
        self.issue_until(subject, Utc::now() + ttl)
    }

    /// Issues a token with an absolute expiry
    pub fn issue_until(&self, subject: &str, expires_at: DateTime<Utc>) -> Result<String> {
        if subject.is_empty() {
            return Err(GateError::MissingSubject);
        }
        self.sign(&Claims::new(subject, expires_at))
    }

    /// Signs arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| GateError::SystemError(format!("Failed to sign token: {}", e)))
    }

    /// Verifies signature, algorithm and expiry and returns the full claims
    pub fn decode_claims(&self, token: &str) -> Result<Claims> {
        if token.is_empty() {
            return Err(GateError::MalformedToken("empty token".to_string()));
        }

        match decode_header(token) {
            Ok(header) if header.alg == Algorithm::HS256 => {}
            Ok(header) => {
                log::debug!("Rejecting token signed with {:?}", header.alg);
                return Err(GateError::BadSignature);
            }
            // A readable header naming an algorithm jsonwebtoken does not know,
            // e.g. "none", is still an algorithm mismatch
            Err(e) => {
                return Err(match announced_algorithm(token) {
                    Some(alg) => {
                        log::debug!("Rejecting token announcing algorithm {:?}", alg);
                        GateError::BadSignature
                    }
                    None => classify(e.kind()),
                })
            }
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| classify(e.kind()))?;
        let claims = data.claims;

        if claims.sub.is_empty() {
            return Err(GateError::MissingSubject);
        }
        // Tokens without exp or past it never pass
        match claims.exp {
            Some(exp) if exp >= Utc::now().timestamp() => Ok(claims),
            _ => Err(GateError::Expired),
        }
    }

    /// Verifies a token and returns its subject
    pub fn verify(&self, token: &str) -> Result<String> {
        self.decode_claims(token).map(|claims| claims.sub)
    }
}

/// The `alg` string of a token header that is base64url JSON
fn announced_algorithm(token: &str) -> Option<String> {
    let segment = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    header.get("alg")?.as_str().map(str::to_string)
}

fn classify(kind: &ErrorKind) -> GateError {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat => GateError::BadSignature,
        ErrorKind::ExpiredSignature => GateError::Expired,
        ErrorKind::MissingRequiredClaim(claim) if claim == "exp" => GateError::Expired,
        ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => GateError::MissingSubject,
        other => GateError::MalformedToken(format!("{:?}", other)),
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
