use serde::{Deserialize, Serialize};

use super::user::DashboardUser;

/// Claims carried by every token this API signs or accepts. Frontend tokens
/// are minted out of band, so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id as a string for dashboard tokens; anything JSON for frontend tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// How much a caller is trusted, from most to least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// A `user2` account that signed in.
    Dashboard,
    /// A signed, expiring token issued for a tenant's website.
    Website,
    /// A long-lived allow-listed token embedded in a public frontend.
    Frontend,
}

/// Caller identity built from token claims alone (no `user2` row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedIdentity {
    pub id: String,
    pub client: String,
    pub email: String,
    pub full_name: String,
    pub trust: TrustLevel,
}

impl SynthesizedIdentity {
    pub fn from_claims(claims: &TokenClaims, trust: TrustLevel) -> Self {
        let client = claims.client.clone().unwrap_or_else(|| "default".to_string());
        let id = match &claims.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "frontend".to_string(),
        };
        Self {
            id,
            email: claims
                .email
                .clone()
                .unwrap_or_else(|| format!("frontend@{client}.com")),
            full_name: claims
                .full_name
                .clone()
                .unwrap_or_else(|| format!("Frontend User - {client}")),
            client,
            trust,
        }
    }

    /// Identity used when an allow-listed token cannot be decoded.
    pub fn fallback(client: &str) -> Self {
        Self {
            id: "frontend".to_string(),
            client: client.to_string(),
            email: client.to_string(),
            full_name: client.to_string(),
            trust: TrustLevel::Frontend,
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub enum Identity {
    Persisted(DashboardUser),
    Synthesized(SynthesizedIdentity),
}

impl Identity {
    /// Tenant key the caller acts on; empty for an account with no client.
    pub fn tenant_id(&self) -> &str {
        match self {
            Identity::Persisted(u) => u.client.as_deref().unwrap_or(""),
            Identity::Synthesized(s) => &s.client,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Identity::Persisted(u) => &u.full_name,
            Identity::Synthesized(s) => &s.full_name,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Identity::Persisted(u) => &u.email,
            Identity::Synthesized(s) => &s.email,
        }
    }

    pub fn trust_level(&self) -> TrustLevel {
        match self {
            Identity::Persisted(_) => TrustLevel::Dashboard,
            Identity::Synthesized(s) => s.trust,
        }
    }

    pub fn view(&self) -> IdentityView {
        IdentityView {
            tenant: self.tenant_id().to_string(),
            display_name: self.display_name().to_string(),
            email: self.email().to_string(),
            trust_level: self.trust_level(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub tenant: String,
    pub display_name: String,
    pub email: String,
    pub trust_level: TrustLevel,
}

#[derive(Debug, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}
