use crate::error::HandlerErr;
use crate::model::{Mark, Session, Student, Subject};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;

fn query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::store("db_query_failed", e)
}

fn update_failed(table: &str) -> impl FnOnce(rusqlite::Error) -> HandlerErr + '_ {
    move |e: rusqlite::Error| {
        HandlerErr::store("db_update_failed", e).with_details(json!({ "table": table }))
    }
}

pub fn subject_exists(conn: &Connection, subject_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(query_failed)
}

pub fn student_exists(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(query_failed)
}

pub fn upsert_subject(conn: &Connection, subject: &Subject) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO subjects(id, name, code, teacher_id)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           code = excluded.code,
           teacher_id = excluded.teacher_id",
        (
            &subject.id,
            &subject.name,
            &subject.code,
            &subject.teacher_id,
        ),
    )
    .map_err(update_failed("subjects"))?;
    Ok(())
}

pub fn upsert_student(conn: &Connection, student: &Student) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO students(id, name, email)
         VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           email = excluded.email",
        (&student.id, &student.name, &student.email),
    )
    .map_err(update_failed("students"))?;
    Ok(())
}

pub fn get_subject(conn: &Connection, subject_id: &str) -> Result<Option<Subject>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, code, teacher_id FROM subjects WHERE id = ?",
        [subject_id],
        |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
                teacher_id: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(query_failed)
}

pub fn subjects_for_teacher(
    conn: &Connection,
    teacher_id: &str,
) -> Result<Vec<Subject>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, code, teacher_id
             FROM subjects
             WHERE teacher_id = ?
             ORDER BY rowid",
        )
        .map_err(query_failed)?;
    stmt.query_map([teacher_id], |r| {
        Ok(Subject {
            id: r.get(0)?,
            name: r.get(1)?,
            code: r.get(2)?,
            teacher_id: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(query_failed)
}

pub fn resolve_student(conn: &Connection, student_id: &str) -> Result<Option<Student>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, email FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                email: r.get(2)?,
            })
        },
    )
    .optional()
    .map_err(query_failed)
}

fn load_marks(conn: &Connection, session_id: &str) -> Result<Vec<Mark>, HandlerErr> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT student_id, is_present
             FROM attendance_marks
             WHERE session_id = ?
             ORDER BY position",
        )
        .map_err(query_failed)?;
    stmt.query_map([session_id], |r| {
        Ok(Mark {
            student_id: r.get(0)?,
            is_present: r.get::<_, i64>(1)? != 0,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(query_failed)
}

pub fn find_session(
    conn: &Connection,
    subject_id: &str,
    date: NaiveDate,
) -> Result<Option<Session>, HandlerErr> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM attendance_sessions WHERE subject_id = ? AND date = ?",
            (subject_id, date),
            |r| r.get(0),
        )
        .optional()
        .map_err(query_failed)?;
    let Some(id) = id else {
        return Ok(None);
    };
    let attendance = load_marks(conn, &id)?;
    Ok(Some(Session {
        id,
        subject_id: subject_id.to_string(),
        date,
        attendance,
    }))
}

pub fn insert_session(conn: &Connection, session: &Session) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO attendance_sessions(id, subject_id, date) VALUES(?, ?, ?)",
        (&session.id, &session.subject_id, session.date),
    )
    .map_err(update_failed("attendance_sessions"))?;
    replace_marks(conn, &session.id, &session.attendance)
}

/// Rewrites the mark list of a session, keeping list order in `position`.
pub fn replace_marks(conn: &Connection, session_id: &str, marks: &[Mark]) -> Result<(), HandlerErr> {
    conn.execute(
        "DELETE FROM attendance_marks WHERE session_id = ?",
        [session_id],
    )
    .map_err(update_failed("attendance_marks"))?;
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO attendance_marks(session_id, position, student_id, is_present)
             VALUES(?, ?, ?, ?)",
        )
        .map_err(query_failed)?;
    for (position, mark) in marks.iter().enumerate() {
        stmt.execute((
            session_id,
            position as i64,
            &mark.student_id,
            mark.is_present as i64,
        ))
        .map_err(update_failed("attendance_marks"))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// `None` means every subject; an empty list matches nothing.
    pub subject_ids: Option<Vec<String>>,
    pub from: Option<NaiveDate>,
    /// Exclusive upper bound.
    pub before: Option<NaiveDate>,
    pub student_id: Option<String>,
}

/// Sessions in store iteration order (creation order).
pub fn list_sessions(conn: &Connection, filter: &SessionFilter) -> Result<Vec<Session>, HandlerErr> {
    let mut sql = String::from("SELECT id, subject_id, date FROM attendance_sessions");
    let mut clauses: Vec<String> = Vec::new();
    let mut bind: Vec<Value> = Vec::new();

    if let Some(ids) = &filter.subject_ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        clauses.push(format!("subject_id IN ({})", placeholders));
        bind.extend(ids.iter().cloned().map(Value::Text));
    }
    if let Some(from) = filter.from {
        clauses.push("date >= ?".to_string());
        bind.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(before) = filter.before {
        clauses.push("date < ?".to_string());
        bind.push(Value::Text(before.format("%Y-%m-%d").to_string()));
    }
    if let Some(student_id) = &filter.student_id {
        clauses.push(
            "EXISTS (SELECT 1 FROM attendance_marks m
                     WHERE m.session_id = attendance_sessions.id AND m.student_id = ?)"
                .to_string(),
        );
        bind.push(Value::Text(student_id.clone()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
    let heads = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, NaiveDate>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    let mut out = Vec::with_capacity(heads.len());
    for (id, subject_id, date) in heads {
        let attendance = load_marks(conn, &id)?;
        out.push(Session {
            id,
            subject_id,
            date,
            attendance,
        });
    }
    Ok(out)
}
