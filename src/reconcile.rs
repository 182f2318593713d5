use crate::error::HandlerErr;
use crate::model::{parse_day_key, Mark, Session};
use crate::store;
use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileInput {
    pub subject_id: String,
    pub date: NaiveDate,
    pub marks: Vec<Mark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub session: Session,
    pub outcome: Outcome,
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

impl ReconcileInput {
    /// Validates a `{subjectId, date, attendance: [{studentId, isPresent}]}` body.
    pub fn from_json(body: &serde_json::Value) -> Result<Self, HandlerErr> {
        if !body.is_object() {
            return Err(HandlerErr::bad_params("body must be a JSON object"));
        }
        let subject_id = get_required_str(body, "subjectId")?;
        let raw_date = get_required_str(body, "date")?;
        let date = parse_day_key(&raw_date).ok_or_else(|| {
            HandlerErr::bad_params("date must be YYYY-MM-DD or an RFC 3339 timestamp")
                .with_details(json!({ "date": raw_date }))
        })?;
        let Some(entries) = body.get("attendance").and_then(|v| v.as_array()) else {
            return Err(HandlerErr::bad_params("missing attendance"));
        };

        let mut marks = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let student_id = get_required_str(entry, "studentId").map_err(|_| {
                HandlerErr::bad_params(format!("attendance[{}].studentId is required", index))
                    .with_details(json!({ "index": index }))
            })?;
            let is_present = entry
                .get("isPresent")
                .and_then(|v| v.as_bool())
                .ok_or_else(|| {
                    HandlerErr::bad_params(format!(
                        "attendance[{}].isPresent must be a boolean",
                        index
                    ))
                    .with_details(json!({ "index": index }))
                })?;
            marks.push(Mark {
                student_id,
                is_present,
            });
        }

        Ok(Self {
            subject_id,
            date,
            marks,
        })
    }
}

/// Folds `incoming` into `existing`: a known student has `is_present`
/// overwritten in place, an unknown one is appended. Later entries win.
/// New sessions are built by folding into an empty list, so a stored
/// session never repeats a student.
pub fn merge_marks(existing: &mut Vec<Mark>, incoming: &[Mark]) {
    for mark in incoming {
        match existing
            .iter_mut()
            .find(|m| m.student_id == mark.student_id)
        {
            Some(current) => current.is_present = mark.is_present,
            None => existing.push(mark.clone()),
        }
    }
}

/// Upserts the session for `(subject_id, date)` as one immediate transaction.
pub fn reconcile(conn: &mut Connection, input: &ReconcileInput) -> Result<Reconciled, HandlerErr> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| HandlerErr::store("db_tx_failed", e))?;

    if !store::subject_exists(&tx, &input.subject_id)? {
        return Err(HandlerErr::not_found("subject not found")
            .with_details(json!({ "subjectId": input.subject_id })));
    }
    for mark in &input.marks {
        if !store::student_exists(&tx, &mark.student_id)? {
            return Err(HandlerErr::not_found("student not found")
                .with_details(json!({ "studentId": mark.student_id })));
        }
    }

    let reconciled = match store::find_session(&tx, &input.subject_id, input.date)? {
        Some(mut session) => {
            merge_marks(&mut session.attendance, &input.marks);
            store::replace_marks(&tx, &session.id, &session.attendance)?;
            Reconciled {
                session,
                outcome: Outcome::Updated,
            }
        }
        None => {
            let mut attendance = Vec::with_capacity(input.marks.len());
            merge_marks(&mut attendance, &input.marks);
            let session = Session {
                id: uuid::Uuid::new_v4().to_string(),
                subject_id: input.subject_id.clone(),
                date: input.date,
                attendance,
            };
            store::insert_session(&tx, &session)?;
            Reconciled {
                session,
                outcome: Outcome::Created,
            }
        }
    };

    tx.commit()
        .map_err(|e| HandlerErr::store("db_commit_failed", e))?;
    info!(
        session_id = %reconciled.session.id,
        subject_id = %input.subject_id,
        date = %input.date,
        marks = input.marks.len(),
        outcome = ?reconciled.outcome,
        "attendance reconciled"
    );
    Ok(reconciled)
}
