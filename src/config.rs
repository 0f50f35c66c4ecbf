use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub service_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub twilio: TwilioConfig,
    pub session_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let twilio = TwilioConfig {
            account_sid: std::env::var("TWILIO_ACCOUNT_SID")?,
            auth_token: std::env::var("TWILIO_AUTH_TOKEN")?,
            service_id: std::env::var("TWILIO_SERVICE_ID")?,
        };
        let session_ttl_hours = std::env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);
        Ok(Self {
            database_url,
            twilio,
            session_ttl_hours,
        })
    }
}
