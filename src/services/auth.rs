use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::models::auth::{SynthesizedIdentity, TokenClaims, TrustLevel};
use crate::models::user::DashboardUser;

/// What a bearer token turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Frontend or website token; no account lookup needed.
    Synthesized(SynthesizedIdentity),
    /// Dashboard token; the `user2` row with this email must still exist.
    Dashboard { email: String },
}

/// Signs and classifies HS256 tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    front_tokens: HashSet<String>,
    access_ttl: Duration,
    fallback_client: String,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        let mut front_tokens: HashSet<String> =
            parse_token_list(&config.front_tokens).into_iter().collect();
        if let Some(legacy) = &config.front_token {
            front_tokens.insert(legacy.clone());
        }
        if !front_tokens.is_empty() {
            tracing::info!(count = front_tokens.len(), "Frontend tokens loaded");
        }

        Self {
            encoding: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret_key.as_bytes()),
            front_tokens,
            access_ttl: Duration::minutes(config.access_token_minutes),
            fallback_client: config.admin_client.clone(),
        }
    }

    /// Dashboard access token; returns the token and its expiry.
    pub fn issue_access_token(&self, user: &DashboardUser) -> anyhow::Result<(String, DateTime<Utc>)> {
        let expires_at = Utc::now() + self.access_ttl;
        let claims = TokenClaims {
            id: Some(serde_json::Value::String(user.id.to_string())),
            full_name: Some(user.full_name.clone()),
            email: Some(user.email.clone()),
            client: user.client.clone(),
            exp: Some(expires_at.timestamp()),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, expires_at))
    }

    /// Expiring token for a tenant's website: carries a client but no email.
    pub fn issue_website_token(&self, client: &str, ttl: Duration) -> anyhow::Result<String> {
        let claims = TokenClaims {
            id: Some(serde_json::Value::String("website".into())),
            full_name: Some(format!("Website - {client}")),
            email: None,
            client: Some(client.to_string()),
            exp: Some((Utc::now() + ttl).timestamp()),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn classify(&self, token: &str) -> Option<TokenKind> {
        if self.front_tokens.contains(token) {
            let identity = match self.decode_unexpiring(token) {
                Some(claims) => SynthesizedIdentity::from_claims(&claims, TrustLevel::Frontend),
                None => {
                    tracing::warn!("Allow-listed frontend token could not be decoded; using fallback tenant");
                    SynthesizedIdentity::fallback(&self.fallback_client)
                }
            };
            return Some(TokenKind::Synthesized(identity));
        }

        let claims = decode::<TokenClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .ok()?
            .claims;
        match (&claims.email, &claims.client) {
            (Some(email), _) => Some(TokenKind::Dashboard { email: email.clone() }),
            (None, Some(_)) => Some(TokenKind::Synthesized(SynthesizedIdentity::from_claims(
                &claims,
                TrustLevel::Website,
            ))),
            (None, None) => None,
        }
    }

    fn decode_unexpiring(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|d| d.claims)
    }
}

/// Frontend allow-list: a JSON array, or a comma-separated list.
pub fn parse_token_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        return match serde_json::from_str::<Vec<String>>(raw) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!("FRONT_TOKENS is not a valid JSON array: {e}");
                Vec::new()
            }
        };
    }
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    Ok(bcrypt::hash(password, 12)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
