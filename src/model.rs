use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub student_id: String,
    pub is_present: bool,
}

impl Mark {
    pub fn new(student_id: impl Into<String>, is_present: bool) -> Self {
        Self {
            student_id: student_id.into(),
            is_present,
        }
    }
}

/// One attendance record for a subject on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub subject_id: String,
    pub date: NaiveDate,
    pub attendance: Vec<Mark>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Normalizes a client supplied date to its calendar day.
///
/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp; timestamps are truncated
/// to their UTC day so that session lookup and range filters agree.
pub fn parse_day_key(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(t)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}
