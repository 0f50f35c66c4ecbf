use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::session::AuthSession;
use crate::error::{ApiError, Json};
use crate::state::AppState;
use crate::users::dto::{UpdateRegistrationRequest, UserView, ValidateQuery};
use crate::users::repo::{RegisterStatus, User};
use crate::validate::{is_valid_allergies, normalize_phone};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id", get(get_user))
        .route("/validate", get(validate_phone))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/users/:user_id", axum::routing::put(update_registration))
}

/// A single validated guest mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GuestChange {
    pub id: Uuid,
    pub status: RegisterStatus,
    pub allergies: Option<String>,
}

/// Validate the update body, resolving status strings into the enum.
/// The first violation wins and names the offending guest where possible.
pub(crate) fn validate_update_body(
    body: &UpdateRegistrationRequest,
) -> Result<(RegisterStatus, Vec<GuestChange>), ApiError> {
    let Some(status) = RegisterStatus::parse(&body.register_status) else {
        return Err(ApiError::Validation(format!(
            "Unknown register status '{}'",
            body.register_status
        )));
    };
    if let Some(allergies) = &body.allergies {
        if !is_valid_allergies(allergies) {
            return Err(ApiError::Validation(
                "Allergies must be at most 500 characters".into(),
            ));
        }
    }

    let mut changes = Vec::new();
    if let Some(guests) = &body.guests {
        for (index, guest) in guests.iter().enumerate() {
            let Some(status) = RegisterStatus::parse(&guest.register_status) else {
                return Err(ApiError::Validation(format!(
                    "Unknown register status '{}' for guest {index}",
                    guest.register_status
                )));
            };
            if let Some(allergies) = &guest.allergies {
                if !is_valid_allergies(allergies) {
                    return Err(ApiError::Validation(format!(
                        "Allergies must be at most 500 characters for guest {index}"
                    )));
                }
            }
            changes.push(GuestChange {
                id: guest.id,
                status,
                allergies: guest.allergies.clone(),
            });
        }
    }
    Ok((status, changes))
}

/// A signed-in user may only ever target their own record, no matter what
/// the body says.
pub(crate) fn authorize_target(caller: &User, target_id: Uuid) -> Result<(), ApiError> {
    if caller.id != target_id {
        warn!(caller = %caller.id, target = %target_id, "registration update denied");
        return Err(ApiError::Unauthorized(
            "You may only update your own registration".into(),
        ));
    }
    Ok(())
}

/// Keep only the changes whose target appears in the caller's guest list as
/// it was resolved at session time. Everything else is dropped, not an error.
pub(crate) fn authorized_changes(
    session_guests: &[Uuid],
    changes: Vec<GuestChange>,
) -> Vec<GuestChange> {
    changes
        .into_iter()
        .filter(|change| session_guests.contains(&change.id))
        .collect()
}

/// Fetch a user with guests expanded.
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserView>, ApiError> {
    let Some(user) = User::find_by_id(&state.db, user_id).await? else {
        return Err(ApiError::NotFound("User not found".into()));
    };
    let populated = User::populate(&state.db, user).await?;
    Ok(Json(UserView::from(populated)))
}

/// Update the caller's registration and, where authorized, their guests'.
///
/// Guest mutations are authorized against the session's guest-list snapshot,
/// not the freshly-loaded record. The self write and each guest write are
/// independent single-row operations; there is no surrounding transaction,
/// and a failure partway leaves earlier writes in place (last-write-wins).
#[instrument(skip(state, session, body))]
pub async fn update_registration(
    State(state): State<AppState>,
    session: AuthSession,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateRegistrationRequest>,
) -> Result<Json<UserView>, ApiError> {
    let caller = &session.0.user.user;

    authorize_target(caller, user_id)?;

    let (status, changes) = validate_update_body(&body)?;

    let Some(target) = User::find_by_id(&state.db, user_id).await? else {
        return Err(ApiError::NotFound("User not found".into()));
    };

    for change in authorized_changes(&caller.guests, changes) {
        // Dangling guest ids resolve to no row and are skipped.
        match User::update_registration(
            &state.db,
            change.id,
            change.status,
            change.allergies.as_deref(),
        )
        .await?
        {
            Some(_) => debug!(guest = %change.id, "guest registration updated"),
            None => debug!(guest = %change.id, "guest not found, skipped"),
        }
    }

    let updated = User::update_registration(&state.db, target.id, status, body.allergies.as_deref())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %updated.id, status = updated.register_status.as_str(), "registration updated");
    let populated = User::populate(&state.db, updated).await?;
    Ok(Json(UserView::from(populated)))
}

/// Check whether a phone number belongs to an invitee.
#[instrument(skip(state, query))]
pub async fn validate_phone(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<StatusCode, ApiError> {
    let Some(raw) = query.phone_number else {
        return Err(ApiError::BadFormat("Phone number is required".into()));
    };
    let Some(phone) = normalize_phone(&raw) else {
        return Err(ApiError::BadFormat(
            "Please enter a valid phone number".into(),
        ));
    };
    match User::find_by_phone(&state.db, &phone).await? {
        Some(_) => Ok(StatusCode::OK),
        None => Err(ApiError::NotFound("User not found".into())),
    }
}
