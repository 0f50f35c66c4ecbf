use std::collections::HashMap;

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Attendance answer of an invitee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    Attending,
    NotAttending,
    NotResponded,
}

impl RegisterStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attending" => Some(Self::Attending),
            "not_attending" => Some(Self::NotAttending),
            "not_responded" => Some(Self::NotResponded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attending => "attending",
            Self::NotAttending => "not_attending",
            Self::NotResponded => "not_responded",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    phone_number: Option<String>,
    register_status: String,
    allergies: Option<String>,
    guests: Vec<Uuid>,
}

/// Invitee record, detached from the datastore.
///
/// `guests` holds ids only; [`User::populate`] expands them into records.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub register_status: RegisterStatus,
    pub allergies: Option<String>,
    pub guests: Vec<Uuid>,
}

/// A user together with its guest records, loaded in guest-list order.
#[derive(Debug, Clone)]
pub struct UserWithGuests {
    pub user: User,
    pub guests: Vec<User>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            full_name: row.full_name,
            phone_number: row.phone_number,
            // rows are seeded out-of-band; treat anything unknown as no answer
            register_status: RegisterStatus::parse(&row.register_status)
                .unwrap_or(RegisterStatus::NotResponded),
            allergies: row.allergies,
            guests: row.guests,
        }
    }
}

const USER_COLUMNS: &str = "id, full_name, phone_number, register_status, allergies, guests";

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::from))
    }

    /// Find a user by E.164-normalized phone number.
    pub async fn find_by_phone(db: &PgPool, phone_number: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1"
        ))
        .bind(phone_number)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::from))
    }

    /// Expand this user's guest ids into full records.
    ///
    /// Guest-list order is preserved; ids with no matching row are dropped.
    pub async fn populate(db: &PgPool, user: User) -> anyhow::Result<UserWithGuests> {
        if user.guests.is_empty() {
            return Ok(UserWithGuests {
                user,
                guests: Vec::new(),
            });
        }
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(&user.guests)
        .fetch_all(db)
        .await?;

        let mut by_id: HashMap<Uuid, User> = rows
            .into_iter()
            .map(User::from)
            .map(|u| (u.id, u))
            .collect();
        let guests = user
            .guests
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();
        Ok(UserWithGuests { user, guests })
    }

    /// Write the registration answer. Absent allergies leaves the stored
    /// value untouched. Returns the updated record, or `None` if the user
    /// does not exist.
    pub async fn update_registration(
        db: &PgPool,
        id: Uuid,
        status: RegisterStatus,
        allergies: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET register_status = $2, allergies = COALESCE($3, allergies)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(allergies)
        .fetch_optional(db)
        .await?;
        Ok(row.map(User::from))
    }
}
