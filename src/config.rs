use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// Signing secrets. One per token purpose so a leak of a link-token
    /// secret cannot mint session tokens.
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub verify_email_secret: String,
    pub reset_password_secret: String,
    /// Base URL the verification/reset links point at.
    pub frontend_url: String,
    /// Support address rendered into outgoing mail.
    pub contact_email: String,
    /// HTTP mail API. Unset means mail is logged and dropped (dev mode).
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    /// object_store URL for uploaded assets (s3://bucket, file:///path, memory://).
    pub media_store_url: String,
    /// Public base URL prepended to asset keys.
    pub media_public_url: String,
    /// Directory multipart uploads are spooled to before a job picks them up.
    pub upload_spool_dir: String,
    /// Comma-separated allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Re-queue cap for failed jobs before they are abandoned.
    pub job_max_attempts: u32,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let access_token_secret = std::env::var("JWT_ACCESS_TOKEN_SECRET")
        .unwrap_or_else(|_| "CHANGE_ME_ACCESS_SECRET".into());

    if access_token_secret == "CHANGE_ME_ACCESS_SECRET" {
        let env_mode = std::env::var("INKWELL_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "JWT_ACCESS_TOKEN_SECRET is still the insecure placeholder. \
                 Set proper signing secrets before running in production."
            );
        }
        eprintln!("⚠️  JWT secrets are not set — using insecure placeholders. Set them for production.");
    }

    Ok(Config {
        port: std::env::var("INKWELL_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/inkwell".into()),
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        refresh_token_secret: std::env::var("JWT_REFRESH_TOKEN_SECRET")
            .unwrap_or_else(|_| "CHANGE_ME_REFRESH_SECRET".into()),
        verify_email_secret: std::env::var("JWT_VERIFY_EMAIL_SECRET")
            .unwrap_or_else(|_| "CHANGE_ME_VERIFY_SECRET".into()),
        reset_password_secret: std::env::var("JWT_RESET_PASSWORD_SECRET")
            .unwrap_or_else(|_| "CHANGE_ME_RESET_SECRET".into()),
        access_token_secret,
        frontend_url: std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into()),
        contact_email: std::env::var("CONTACT_EMAIL")
            .unwrap_or_else(|_| "support@localhost".into()),
        mail_api_url: std::env::var("MAIL_API_URL").ok(),
        mail_api_key: std::env::var("MAIL_API_KEY").ok(),
        mail_from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@localhost".into()),
        media_store_url: std::env::var("MEDIA_STORE_URL")
            .unwrap_or_else(|_| "file:///tmp/inkwell-media".into()),
        media_public_url: std::env::var("MEDIA_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080/media".into()),
        upload_spool_dir: std::env::var("UPLOAD_SPOOL_DIR")
            .unwrap_or_else(|_| "/tmp/inkwell-spool".into()),
        cors_origins: std::env::var("CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        job_max_attempts: std::env::var("JOB_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3),
    })
}
