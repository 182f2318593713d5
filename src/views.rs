use crate::auth::{AuthenticatedUser, Role};
use crate::error::HandlerErr;
use crate::model::{parse_day_key, Student, Subject};
use crate::store::{self, SessionFilter};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

/// Inclusive calendar-day window; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, HandlerErr> {
        Ok(Self {
            start: parse_bound("startDate", start)?,
            end: parse_bound("endDate", end)?,
        })
    }

    /// `end` is inclusive, so the store is asked for everything before the
    /// following day.
    fn upper_exclusive(&self) -> Option<NaiveDate> {
        self.end.and_then(|d| d.succ_opt())
    }
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, HandlerErr> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => parse_day_key(s).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", name))
                .with_details(json!({ name: s }))
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkView {
    pub student: Option<Student>,
    pub is_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub date: NaiveDate,
    pub subject: Option<Subject>,
    pub attendance: Vec<MarkView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfAttendanceView {
    pub session_id: String,
    pub date: NaiveDate,
    pub subject_name: Option<String>,
    pub is_present: bool,
    pub is_marked: bool,
}

/// Admin and teacher view of sessions with subject and student detail.
pub fn build_roster(
    conn: &Connection,
    requester: &AuthenticatedUser,
    range: &DateRange,
) -> Result<Vec<SessionView>, HandlerErr> {
    let mut subjects: HashMap<String, Option<Subject>> = HashMap::new();
    let subject_ids = match requester.role {
        Role::Admin => None,
        Role::Teacher => {
            let owned = store::subjects_for_teacher(conn, &requester.id)?;
            let ids = owned.iter().map(|s| s.id.clone()).collect::<Vec<_>>();
            for s in owned {
                subjects.insert(s.id.clone(), Some(s));
            }
            Some(ids)
        }
        Role::Student => {
            return Err(HandlerErr::forbidden("roster requires admin or teacher role"));
        }
    };

    let filter = SessionFilter {
        subject_ids,
        from: range.start,
        before: range.upper_exclusive(),
        student_id: None,
    };
    let sessions = store::list_sessions(conn, &filter)?;

    let mut students: HashMap<String, Option<Student>> = HashMap::new();
    let mut out = Vec::with_capacity(sessions.len());
    for session in sessions {
        if !subjects.contains_key(&session.subject_id) {
            let s = store::get_subject(conn, &session.subject_id)?;
            subjects.insert(session.subject_id.clone(), s);
        }
        let subject = subjects.get(&session.subject_id).cloned().flatten();

        let mut attendance = Vec::with_capacity(session.attendance.len());
        for mark in session.attendance {
            if !students.contains_key(&mark.student_id) {
                let s = store::resolve_student(conn, &mark.student_id)?;
                students.insert(mark.student_id.clone(), s);
            }
            attendance.push(MarkView {
                student: students.get(&mark.student_id).cloned().flatten(),
                is_present: mark.is_present,
            });
        }

        out.push(SessionView {
            id: session.id,
            date: session.date,
            subject,
            attendance,
        });
    }
    Ok(out)
}

/// A student's own marks, one entry per session that has a mark for them.
pub fn build_self_view(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<SelfAttendanceView>, HandlerErr> {
    let filter = SessionFilter {
        student_id: Some(student_id.to_string()),
        ..Default::default()
    };
    let sessions = store::list_sessions(conn, &filter)?;

    let mut subject_names: HashMap<String, Option<String>> = HashMap::new();
    let mut out = Vec::with_capacity(sessions.len());
    for session in sessions {
        // Selection and projection use the same predicate.
        let Some(mark) = session
            .attendance
            .iter()
            .find(|m| m.student_id == student_id)
        else {
            continue;
        };
        if !subject_names.contains_key(&session.subject_id) {
            let name = store::get_subject(conn, &session.subject_id)?.map(|s| s.name);
            subject_names.insert(session.subject_id.clone(), name);
        }
        out.push(SelfAttendanceView {
            session_id: session.id.clone(),
            date: session.date,
            subject_name: subject_names.get(&session.subject_id).cloned().flatten(),
            is_present: mark.is_present,
            is_marked: true,
        });
    }
    Ok(out)
}
