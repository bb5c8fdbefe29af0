//! User profile rows and the access-expiration gate.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Row of the profiles table. Column names follow the stored schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    #[serde(rename = "nome", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "telefone", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo_url: Option<String>,

    /// Timestamp after which gated skills are closed to this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expiration: Option<String>,
}

/// Partial write to a profile row; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_photo_url: Option<String>,
}

/// Outcome of checking a profile's access window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessStatus {
    /// No expiration recorded.
    Unrestricted,
    ActiveUntil(DateTime<FixedOffset>),
    Expired(DateTime<FixedOffset>),
    /// The stored value could not be read; access is not blocked on it.
    Unreadable(String),
}

impl AccessStatus {
    pub fn allows_access(&self) -> bool {
        !matches!(self, AccessStatus::Expired(_))
    }
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            phone: None,
            instagram: None,
            profile_photo_url: None,
            access_expiration: None,
        }
    }

    /// Evaluate `access_expiration` at `now`. Values stored without a zone
    /// are read at `naive_offset`.
    pub fn access_status(&self, now: DateTime<Utc>, naive_offset: FixedOffset) -> AccessStatus {
        let Some(raw) = self
            .access_expiration
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
        else {
            return AccessStatus::Unrestricted;
        };

        match parse_expiration(raw, naive_offset) {
            Some(expiration) if now > expiration => AccessStatus::Expired(expiration),
            Some(expiration) => AccessStatus::ActiveUntil(expiration),
            None => AccessStatus::Unreadable(raw.to_string()),
        }
    }
}

const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_expiration(raw: &str, naive_offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed);
    }
    for format in ZONED_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    naive_offset.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn belem() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn profile_expiring(raw: &str) -> UserProfile {
        UserProfile {
            access_expiration: Some(raw.to_string()),
            ..UserProfile::new("user-1")
        }
    }

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn missing_expiration_is_unrestricted() {
        let profile = UserProfile::new("user-1");
        let status = profile.access_status(Utc::now(), belem());
        assert_eq!(status, AccessStatus::Unrestricted);
        assert!(status.allows_access());
    }

    #[test]
    fn zoned_expiration_in_the_past_blocks() {
        let profile = profile_expiring("2024-01-01T00:00:00+00:00");
        let status = profile.access_status(utc("2024-01-01T00:00:01Z"), belem());
        assert!(matches!(status, AccessStatus::Expired(_)));
        assert!(!status.allows_access());
    }

    #[test]
    fn naive_expiration_uses_configured_offset() {
        // Midnight at UTC-3 is 03:00 UTC.
        let profile = profile_expiring("2024-06-01T00:00:00");
        assert!(profile
            .access_status(utc("2024-06-01T02:59:00Z"), belem())
            .allows_access());
        assert!(!profile
            .access_status(utc("2024-06-01T03:01:00Z"), belem())
            .allows_access());
    }

    #[test]
    fn postgres_style_timestamps_parse() {
        let profile = profile_expiring("2030-01-01 10:00:00.123456+00");
        assert!(matches!(
            profile.access_status(utc("2024-01-01T00:00:00Z"), belem()),
            AccessStatus::ActiveUntil(_)
        ));
    }

    #[test]
    fn date_only_expiration_is_midnight() {
        let profile = profile_expiring("2024-06-01");
        assert!(!profile
            .access_status(utc("2024-06-01T04:00:00Z"), belem())
            .allows_access());
    }

    #[test]
    fn unreadable_expiration_does_not_block() {
        let profile = profile_expiring("next tuesday");
        let status = profile.access_status(Utc::now(), belem());
        assert_eq!(status, AccessStatus::Unreadable("next tuesday".to_string()));
        assert!(status.allows_access());
    }

    #[test]
    fn deserializes_stored_column_names() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "id": "u1",
            "nome": "Ana",
            "telefone": "+55 91 0000-0000",
            "instagram": "@ana",
            "access_expiration": null
        }))
        .unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert_eq!(profile.access_expiration, None);
    }
}
