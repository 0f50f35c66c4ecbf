use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::dto::VerifyOtpRequest;
use crate::auth::session::{
    create_session, delete_session, removal_cookie, session_cookie, SESSION_COOKIE,
};
use crate::error::{ApiError, Json};
use crate::otp::{OtpGateway, OtpStatus};
use crate::state::AppState;
use crate::users::dto::UserView;
use crate::users::repo::User;
use crate::validate::{is_valid_otp, normalize_phone};

pub fn otp_routes() -> Router<AppState> {
    Router::new()
        .route("/otp/send/:phone_number", post(send_otp))
        .route("/otp/verify/:phone_number", post(verify_otp))
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route("/auth/logout", post(logout))
}

/// Send a verification code to an invited phone number.
#[instrument(skip(state, phone_number))]
pub async fn send_otp(
    State(state): State<AppState>,
    Path(phone_number): Path<String>,
) -> Result<StatusCode, ApiError> {
    let Some(phone) = normalize_phone(&phone_number) else {
        warn!("send otp: invalid phone number format");
        return Err(ApiError::BadFormat(
            "Please enter a valid phone number".into(),
        ));
    };

    let user = User::find_by_phone(&state.db, &phone).await?;
    let Some(user) = user else {
        return Err(ApiError::NotFound(
            "This phone number is not in the invitation list".into(),
        ));
    };

    match state.otp.send_code(&phone).await {
        Ok(OtpStatus::Pending) => {
            info!(user_id = %user.id, "verification code sent");
            Ok(StatusCode::OK)
        }
        Ok(status) => {
            warn!(user_id = %user.id, ?status, "unexpected delivery status");
            Err(ApiError::Unavailable(
                "Unable to send verification code. Please try again.".into(),
            ))
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "otp delivery failed");
            Err(ApiError::Unavailable(
                "Unable to send verification code. Please try again later.".into(),
            ))
        }
    }
}

/// Verify a code and establish a session. On success the session cookie is
/// set and the signed-in user is returned with guests expanded.
#[instrument(skip(state, phone_number, jar, body))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Path(phone_number): Path<String>,
    jar: CookieJar,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<(CookieJar, Json<UserView>), ApiError> {
    let Some(phone) = normalize_phone(&phone_number) else {
        warn!("verify otp: invalid phone number format");
        return Err(ApiError::BadFormat(
            "Please enter a valid phone number".into(),
        ));
    };
    if !is_valid_otp(&body.otp) {
        warn!("verify otp: malformed code");
        return Err(ApiError::BadFormat("OTP code must be 6 digits".into()));
    }

    let user = User::find_by_phone(&state.db, &phone).await?;
    let Some(user) = user else {
        return Err(ApiError::NotFound(
            "Phone number not found from invitation list".into(),
        ));
    };

    check_with_gateway(state.otp.as_ref(), user.id, &phone, &body.otp).await?;

    let ttl = Duration::hours(state.config.session_ttl_hours);
    let (token, expires_at) = create_session(&state.db, user.id, ttl).await?;
    let jar = jar.add(session_cookie(token, expires_at));

    info!(user_id = %user.id, "user signed in");
    let populated = User::populate(&state.db, user).await?;
    Ok((jar, Json(UserView::from(populated))))
}

/// Drive the gateway's code check. Only an approving outcome lets the
/// caller go on to establish a session; any other completed exchange is an
/// invalid code, and a transport failure stays generic.
async fn check_with_gateway(
    gateway: &dyn OtpGateway,
    user_id: Uuid,
    phone: &str,
    code: &str,
) -> Result<(), ApiError> {
    match gateway.check_code(phone, code).await {
        Ok(OtpStatus::Approved) => Ok(()),
        Ok(status) => {
            warn!(%user_id, ?status, "otp rejected");
            Err(ApiError::Validation("Invalid OTP code".into()))
        }
        Err(e) => {
            error!(error = %e, %user_id, "otp verification failed");
            Err(ApiError::Unavailable(
                "Service unavailable. Please try again later.".into(),
            ))
        }
    }
}

/// Destroy the current session, if any. Idempotent.
#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let Some(token) = token else {
        return Ok((jar, StatusCode::NO_CONTENT));
    };

    delete_session(&state.db, &token).await?;
    info!("session deleted");
    Ok((jar.remove(removal_cookie()), StatusCode::NO_CONTENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_otp_rejects_bad_number_before_any_lookup() {
        // The fake state has no reachable database; a bad number must fail
        // fast without touching it.
        let state = AppState::fake();
        let result = send_otp(State(state), Path("garbage".into())).await;
        match result {
            Err(ApiError::BadFormat(msg)) => assert!(msg.contains("valid phone number")),
            other => panic!("expected BadFormat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_otp_rejects_bad_code_shape_before_any_lookup() {
        for code in ["12345", "abcdef"] {
            let state = AppState::fake();
            let result = verify_otp(
                State(state),
                Path("+358401234567".into()),
                CookieJar::new(),
                Json(VerifyOtpRequest { otp: code.into() }),
            )
            .await;
            match result {
                Err(ApiError::BadFormat(msg)) => assert!(msg.contains("6 digits")),
                Err(other) => panic!("expected BadFormat for {code:?}, got {other:?}"),
                Ok(_) => panic!("expected BadFormat for {code:?}, got success"),
            }
        }
    }

    #[tokio::test]
    async fn session_is_established_only_on_approval() {
        use crate::otp::StaticOtpGateway;

        let user_id = Uuid::new_v4();
        for status in [
            OtpStatus::Pending,
            OtpStatus::Other("max_attempts_reached".into()),
            OtpStatus::Other("canceled".into()),
        ] {
            let gateway = StaticOtpGateway(status.clone());
            let result = check_with_gateway(&gateway, user_id, "+358401234567", "123456").await;
            assert!(
                matches!(result, Err(ApiError::Validation(ref msg)) if msg == "Invalid OTP code"),
                "status {status:?} must not allow a session"
            );
        }

        let gateway = StaticOtpGateway(OtpStatus::Approved);
        assert!(
            check_with_gateway(&gateway, user_id, "+358401234567", "123456")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn gateway_transport_failure_maps_to_unavailable() {
        use axum::async_trait;

        struct DownGateway;

        #[async_trait]
        impl OtpGateway for DownGateway {
            async fn send_code(&self, _phone_number: &str) -> anyhow::Result<OtpStatus> {
                anyhow::bail!("connection reset")
            }
            async fn check_code(
                &self,
                _phone_number: &str,
                _code: &str,
            ) -> anyhow::Result<OtpStatus> {
                anyhow::bail!("connection reset")
            }
        }

        let result = check_with_gateway(&DownGateway, Uuid::new_v4(), "+358401234567", "123456")
            .await;
        assert!(matches!(result, Err(ApiError::Unavailable(_))));
    }

    #[tokio::test]
    async fn verify_otp_rejects_bad_number_before_any_lookup() {
        let state = AppState::fake();
        let result = verify_otp(
            State(state),
            Path("12345".into()),
            CookieJar::new(),
            Json(VerifyOtpRequest {
                otp: "123456".into(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadFormat(_))));
    }
}
