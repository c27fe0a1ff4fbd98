//! Offer models: time-bounded promotions tied to a business.
//!
//! Offers are created `pending`, reviewed by an admin (`approved` or
//! `declined`) and shown publicly only while approved, unsuspended and inside
//! their `[start_date, end_date]` window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::business::validate_optional_url;

/// Review state of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Approved,
    Declined,
}

/// Represents an offer record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Offer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub discount_percent: Option<i32>,
    pub terms: Option<String>,
    pub image_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: OfferStatus,
    pub review_note: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// Counts against the plan's live-offer limit.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status != OfferStatus::Declined && !self.suspended && self.end_date >= now
    }
}

/// Request body for creating or replacing an offer.
///
/// ```json
/// {
///   "business_id": "550e8400-e29b-41d4-a716-446655440000",
///   "title": "20% off all rice & curry",
///   "discount_percent": 20,
///   "start_date": "2025-02-01T00:00:00Z",
///   "end_date": "2025-02-28T23:59:59Z"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub business_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub discount_percent: Option<i32>,
    pub terms: Option<String>,
    pub image_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl OfferRequest {
    /// Validate the request against the current time.
    ///
    /// - title must be non-empty
    /// - `end_date` must be after `start_date` and in the future
    /// - `discount_percent`, when given, must be within 1..=100
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::InvalidRequest("Offer title is required".to_string()));
        }
        if self.end_date <= self.start_date {
            return Err(AppError::InvalidRequest(
                "end_date must be after start_date".to_string(),
            ));
        }
        if self.end_date <= now {
            return Err(AppError::InvalidRequest(
                "end_date must be in the future".to_string(),
            ));
        }
        if let Some(discount) = self.discount_percent {
            if !(1..=100).contains(&discount) {
                return Err(AppError::InvalidRequest(
                    "discount_percent must be between 1 and 100".to_string(),
                ));
            }
        }
        validate_optional_url("image_url", self.image_url.as_deref())
    }
}

/// Query string for `GET /api/v1/offers`.
#[derive(Debug, Default, Deserialize)]
pub struct OfferListQuery {
    pub business_id: Option<Uuid>,
}

/// Query string for the public offer listing.
#[derive(Debug, Default, Deserialize)]
pub struct PublicOfferQuery {
    pub business_id: Option<Uuid>,
    pub category: Option<String>,
}

/// Query string for the admin review queue.
#[derive(Debug, Default, Deserialize)]
pub struct AdminOfferQuery {
    /// Defaults to `pending`
    pub status: Option<OfferStatus>,
}

/// Admin review decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Declined,
}

impl From<ReviewDecision> for OfferStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approved => OfferStatus::Approved,
            ReviewDecision::Declined => OfferStatus::Declined,
        }
    }
}

/// Request body for `POST /api/v1/admin/offers/{id}/review`.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub note: Option<String>,
}

/// Offer joined with its business, for public listings.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PublicOffer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub business_name: String,
    pub category: String,
    pub city: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub discount_percent: Option<i32>,
    pub terms: Option<String>,
    pub image_url: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(now: DateTime<Utc>) -> OfferRequest {
        OfferRequest {
            business_id: Uuid::new_v4(),
            title: "20% off".to_string(),
            description: None,
            discount_percent: Some(20),
            terms: None,
            image_url: None,
            start_date: now,
            end_date: now + Duration::days(30),
        }
    }

    fn offer(now: DateTime<Utc>, status: OfferStatus) -> Offer {
        Offer {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            user_id: 1,
            title: "20% off".to_string(),
            description: None,
            discount_percent: Some(20),
            terms: None,
            image_url: None,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            status,
            review_note: None,
            reviewed_by: None,
            reviewed_at: None,
            suspended: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn end_date_must_follow_start_date() {
        let now = Utc::now();
        let mut req = request(now);
        req.end_date = req.start_date;
        assert!(req.validate(now).is_err());
    }

    #[test]
    fn end_date_must_be_in_future() {
        let now = Utc::now();
        let mut req = request(now);
        req.start_date = now - Duration::days(10);
        req.end_date = now - Duration::days(1);
        assert!(req.validate(now).is_err());
    }

    #[test]
    fn discount_bounds() {
        let now = Utc::now();
        let mut req = request(now);
        req.discount_percent = Some(0);
        assert!(req.validate(now).is_err());
        req.discount_percent = Some(101);
        assert!(req.validate(now).is_err());
        req.discount_percent = Some(100);
        assert!(req.validate(now).is_ok());
    }

    #[test]
    fn declined_and_expired_offers_are_not_live() {
        let now = Utc::now();
        assert!(offer(now, OfferStatus::Pending).is_live(now));
        assert!(!offer(now, OfferStatus::Declined).is_live(now));

        let mut expired = offer(now, OfferStatus::Approved);
        expired.end_date = now - Duration::hours(1);
        assert!(!expired.is_live(now));
    }

    #[test]
    fn review_decision_maps_to_status() {
        assert_eq!(OfferStatus::from(ReviewDecision::Approved), OfferStatus::Approved);
        assert_eq!(OfferStatus::from(ReviewDecision::Declined), OfferStatus::Declined);
    }
}
