use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub host: String,
    pub port: u16,
    pub uploads_dir: String,
    pub max_upload_mb: usize,
    pub max_image_dimension: u32,
    /// Empty means any origin is accepted.
    pub cors_allowed_origins: Vec<String>,
    pub access_token_minutes: i64,
    /// Raw value of FRONT_TOKENS (JSON array or comma-separated list).
    pub front_tokens: String,
    /// Legacy single frontend token, appended to the list when set.
    pub front_token: Option<String>,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_client: String,
    // SMTP (optional)
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub receiver_email: Option<String>,
    pub from_name: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: normalize_database_url(&required("DATABASE_URL")?),
            secret_key: required("SECRET_KEY")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .or_else(|_| env::var("SERVER_PORT"))
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".into()),
            max_upload_mb: env::var("MAX_UPLOAD_MB")
                .unwrap_or_else(|_| "50".into())
                .parse()?,
            max_image_dimension: env::var("MAX_IMAGE_DIMENSION")
                .unwrap_or_else(|_| "1920".into())
                .parse()?,
            cors_allowed_origins: split_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default()),
            access_token_minutes: env::var("ACCESS_TOKEN_MINUTES")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            front_tokens: env::var("FRONT_TOKENS").unwrap_or_default(),
            front_token: env::var("FRONT_TOKEN").ok().filter(|s| !s.is_empty()),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@shirkasoft.com".into()),
            admin_password: required("ADMIN_PASSWORD")?,
            admin_client: env::var("ADMIN_CLIENT").unwrap_or_else(|_| "shirkasoft".into()),
            smtp_host: env::var("SMTP_HOST")
                .or_else(|_| env::var("SMTP_SERVER"))
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            smtp_username: env::var("SMTP_USERNAME").ok().filter(|s| !s.is_empty()),
            smtp_password: env::var("SMTP_PASSWORD").ok().filter(|s| !s.is_empty()),
            smtp_from: env::var("SMTP_FROM").ok().filter(|s| !s.is_empty()),
            receiver_email: env::var("RECEIVER_EMAIL").ok().filter(|s| !s.is_empty()),
            from_name: env::var("FROM_NAME").unwrap_or_else(|_| "Sitio Web".into()),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

/// Heroku-style `postgres://` URLs are accepted alongside `postgresql://`.
fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_scheme_is_normalized() {
        assert_eq!(
            normalize_database_url("postgres://u:p@db/site"),
            "postgresql://u:p@db/site"
        );
        assert_eq!(normalize_database_url("sqlite://site.db"), "sqlite://site.db");
    }

    #[test]
    fn origin_list_skips_blanks() {
        assert_eq!(
            split_list(" https://a.example , ,https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(split_list("").is_empty());
    }
}
