use axum::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::TwilioConfig;

/// Outcome reported by the verification provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpStatus {
    /// Code sent, awaiting the user's input.
    Pending,
    /// Code matched.
    Approved,
    /// Any other provider status (canceled, max_attempts_reached, ...).
    Other(String),
}

/// One-time-password delivery and verification, e.g. Twilio Verify.
///
/// Transport failures are errors; a completed exchange with a non-approving
/// status is a normal `OtpStatus` value. Callers decide what each means.
#[async_trait]
pub trait OtpGateway: Send + Sync {
    async fn send_code(&self, phone_number: &str) -> anyhow::Result<OtpStatus>;
    async fn check_code(&self, phone_number: &str, code: &str) -> anyhow::Result<OtpStatus>;
}

/// Twilio Verify v2 client.
pub struct TwilioVerify {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    service_id: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
}

impl TwilioVerify {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            service_id: config.service_id.clone(),
            base_url: "https://verify.twilio.com".into(),
        }
    }

    fn map_status(status: &str) -> OtpStatus {
        match status {
            "pending" => OtpStatus::Pending,
            "approved" => OtpStatus::Approved,
            other => OtpStatus::Other(other.to_string()),
        }
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> anyhow::Result<OtpStatus> {
        let url = format!("{}/v2/Services/{}/{}", self.base_url, self.service_id, path);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        let body: VerifyResponse = response.json().await?;
        debug!(status = %body.status, "verification status from provider");
        Ok(Self::map_status(&body.status))
    }
}

#[async_trait]
impl OtpGateway for TwilioVerify {
    async fn send_code(&self, phone_number: &str) -> anyhow::Result<OtpStatus> {
        self.post_form("Verifications", &[("To", phone_number), ("Channel", "sms")])
            .await
    }

    async fn check_code(&self, phone_number: &str, code: &str) -> anyhow::Result<OtpStatus> {
        self.post_form("VerificationChecks", &[("To", phone_number), ("Code", code)])
            .await
    }
}

/// Gateway double answering every exchange with a fixed status.
#[cfg(test)]
pub struct StaticOtpGateway(pub OtpStatus);

#[cfg(test)]
#[async_trait]
impl OtpGateway for StaticOtpGateway {
    async fn send_code(&self, _phone_number: &str) -> anyhow::Result<OtpStatus> {
        Ok(self.0.clone())
    }

    async fn check_code(&self, _phone_number: &str, _code: &str) -> anyhow::Result<OtpStatus> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_map_onto_otp_status() {
        assert_eq!(TwilioVerify::map_status("pending"), OtpStatus::Pending);
        assert_eq!(TwilioVerify::map_status("approved"), OtpStatus::Approved);
        assert_eq!(
            TwilioVerify::map_status("max_attempts_reached"),
            OtpStatus::Other("max_attempts_reached".into())
        );
        assert_eq!(
            TwilioVerify::map_status("canceled"),
            OtpStatus::Other("canceled".into())
        );
    }
}
