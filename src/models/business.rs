//! Business directory models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A business listed in the directory.
///
/// # Database Table
///
/// Maps to the `businesses` table. Each business belongs to one user
/// (`user_id`). Queries from the owner API always filter by `user_id`.
///
/// # Suspension
///
/// When a subscription is downgraded and the owner holds more businesses than
/// the Free plan allows, the newest ones are `suspended`: hidden from the
/// public directory and read-only until the owner upgrades again.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Business {
    pub id: Uuid,
    pub user_id: i64,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or replacing a business.
///
/// ```json
/// {
///   "name": "Lanka Spice House",
///   "category": "restaurants",
///   "city": "Kandy",
///   "website": "https://spicehouse.lk"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct BusinessRequest {
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
}

impl BusinessRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Business name is required".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::InvalidRequest("Category is required".to_string()));
        }
        if let Some(email) = &self.email {
            crate::models::user::validate_email(email)?;
        }
        validate_optional_url("website", self.website.as_deref())?;
        validate_optional_url("logo_url", self.logo_url.as_deref())
    }
}

/// Query string for the public directory.
#[derive(Debug, Default, Deserialize)]
pub struct BusinessSearchQuery {
    pub category: Option<String>,
    pub city: Option<String>,

    /// Case-insensitive match against name and description
    pub search: Option<String>,
}

/// Validate an optional http(s) URL field.
pub fn validate_optional_url(field: &str, value: Option<&str>) -> Result<(), AppError> {
    let Some(value) = value else {
        return Ok(());
    };

    let parsed = url::Url::parse(value)
        .map_err(|_| AppError::InvalidRequest(format!("{field} must be a valid URL")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(AppError::InvalidRequest(format!(
            "{field} must use http or https"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BusinessRequest {
        BusinessRequest {
            name: "Lanka Spice House".to_string(),
            category: "restaurants".to_string(),
            description: None,
            address: None,
            city: Some("Kandy".to_string()),
            phone: None,
            email: None,
            website: Some("https://spicehouse.lk".to_string()),
            logo_url: None,
        }
    }

    #[test]
    fn accepts_complete_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn rejects_blank_category() {
        let mut req = request();
        req.category = " ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut req = request();
        req.website = Some("ftp://spicehouse.lk".to_string());
        assert!(req.validate().is_err());

        req.website = Some("not a url".to_string());
        assert!(req.validate().is_err());
    }
}
