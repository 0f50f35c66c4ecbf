use serde::Deserialize;

/// Body of `POST /otp/verify/{phoneNumber}`.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}
