use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo::{RegisterStatus, User, UserWithGuests};

/// Body of `PUT /users/{userId}`.
///
/// `register_status` fields stay raw strings here so validation can answer
/// with a message naming the offending field instead of a serde rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRegistrationRequest {
    pub register_status: String,
    pub allergies: Option<String>,
    pub guests: Option<Vec<GuestUpdate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestUpdate {
    pub id: Uuid,
    pub register_status: String,
    pub allergies: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    pub phone_number: Option<String>,
}

/// User as returned to clients, guests expanded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub register_status: RegisterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    pub guests: Vec<GuestView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestView {
    pub id: Uuid,
    pub full_name: String,
    pub register_status: RegisterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
}

impl From<User> for GuestView {
    fn from(user: User) -> Self {
        GuestView {
            id: user.id,
            full_name: user.full_name,
            register_status: user.register_status,
            allergies: user.allergies,
        }
    }
}

impl From<UserWithGuests> for UserView {
    fn from(populated: UserWithGuests) -> Self {
        let UserWithGuests { user, guests } = populated;
        UserView {
            id: user.id,
            full_name: user.full_name,
            phone_number: user.phone_number,
            register_status: user.register_status,
            allergies: user.allergies,
            guests: guests.into_iter().map(GuestView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            full_name: "Ada Invitee".into(),
            phone_number: Some("+358401234567".into()),
            register_status: RegisterStatus::Attending,
            allergies: Some("peanuts".into()),
            guests: vec![],
        }
    }

    #[test]
    fn user_view_serializes_camel_case() {
        let view = UserView::from(UserWithGuests {
            user: sample_user(),
            guests: vec![],
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["fullName"], "Ada Invitee");
        assert_eq!(json["registerStatus"], "attending");
        assert_eq!(json["allergies"], "peanuts");
        assert_eq!(json["guests"], serde_json::json!([]));
    }

    #[test]
    fn absent_allergies_are_omitted() {
        let mut user = sample_user();
        user.allergies = None;
        user.phone_number = None;
        let view = UserView::from(UserWithGuests {
            user,
            guests: vec![],
        });
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("allergies").is_none());
        assert!(json.get("phoneNumber").is_none());
    }

    #[test]
    fn update_request_accepts_optional_fields() {
        let body: UpdateRegistrationRequest = serde_json::from_str(
            r#"{"registerStatus": "attending"}"#,
        )
        .unwrap();
        assert_eq!(body.register_status, "attending");
        assert!(body.allergies.is_none());
        assert!(body.guests.is_none());

        let body: UpdateRegistrationRequest = serde_json::from_str(
            r#"{
                "registerStatus": "not_attending",
                "allergies": "shellfish",
                "guests": [{"id": "7f6c2f7e-52b8-4d5a-9d7e-aa2f3f2cbb11", "registerStatus": "attending"}]
            }"#,
        )
        .unwrap();
        assert_eq!(body.guests.unwrap().len(), 1);
    }

    #[test]
    fn guest_update_requires_id() {
        let result: Result<GuestUpdate, _> =
            serde_json::from_str(r#"{"registerStatus": "attending"}"#);
        assert!(result.is_err());
    }
}
