use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const PROFILE_COLUMNS: &str =
    "id, email, full_name, department, scholar_id, whatsapp_number, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub department: String,
    pub scholar_id: Option<String>,
    pub whatsapp_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What other users see of a seller.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PublicProfile {
    pub id: Uuid,
    pub full_name: String,
    pub department: String,
    pub whatsapp_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub is_complete: bool,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            is_complete: profile.is_complete(),
            profile,
        }
    }
}

/// Partial profile edit. Absent fields are kept; an empty string clears an optional field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub scholar_id: Option<String>,
    pub whatsapp_number: Option<String>,
}

/// Keeps digits only; accepts spaces, dashes, brackets and one leading `+`.
/// An empty input stays empty and means "clear".
pub fn normalize_whatsapp(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let well_formed = trimmed.char_indices().all(|(i, c)| {
        c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')') || (c == '+' && i == 0)
    });
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if !well_formed || !(10..=15).contains(&digits.len()) {
        return Err("WhatsApp number must have 10 to 15 digits".into());
    }
    Ok(digits)
}

fn bounded(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.chars().count() > max => {
            Err(format!("{field} must be at most {max} characters"))
        }
        other => Ok(other),
    }
}

impl UpdateProfileRequest {
    /// Trims and validates every present field.
    pub fn normalized(self) -> Result<Self, String> {
        let full_name = bounded("Full name", self.full_name, 100)?;
        if full_name.as_deref() == Some("") {
            return Err("Full name cannot be empty".into());
        }
        Ok(Self {
            full_name,
            department: bounded("Department", self.department, 100)?,
            scholar_id: bounded("Scholar ID", self.scholar_id, 32)?,
            whatsapp_number: self
                .whatsapp_number
                .as_deref()
                .map(normalize_whatsapp)
                .transpose()?,
        })
    }
}

impl UserProfile {
    pub fn is_complete(&self) -> bool {
        !self.full_name.trim().is_empty() && !self.department.trim().is_empty()
    }

    /// Returns the profile for a signed-in user, creating the row on first access.
    pub async fn find_or_create(
        pool: &PgPool,
        id: Uuid,
        email: &str,
    ) -> Result<UserProfile, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "INSERT INTO users (id, email) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(id)
        .bind(email)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateProfileRequest,
    ) -> Result<UserProfile, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "UPDATE users SET \
                full_name = COALESCE($2, full_name), \
                department = COALESCE($3, department), \
                scholar_id = CASE WHEN $4::text IS NULL THEN scholar_id ELSE NULLIF($4, '') END, \
                whatsapp_number = CASE WHEN $5::text IS NULL THEN whatsapp_number ELSE NULLIF($5, '') END, \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(id)
        .bind(req.full_name.as_deref())
        .bind(req.department.as_deref())
        .bind(req.scholar_id.as_deref())
        .bind(req.whatsapp_number.as_deref())
        .fetch_one(pool)
        .await
    }
}

impl PublicProfile {
    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<PublicProfile>, sqlx::Error> {
        sqlx::query_as::<_, PublicProfile>(
            "SELECT id, full_name, department, whatsapp_number, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
