use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub fn open_db(db_path: &Path) -> anyhow::Result<Connection> {
    let started_at = Instant::now();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = match Connection::open(db_path) {
        Ok(conn) => conn,
        Err(e) => {
            error!(path = %db_path.display(), error = %e, "db open failed");
            return Err(e.into());
        }
    };
    bootstrap(&conn)?;
    info!(
        path = %db_path.display(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "db opened"
    );
    Ok(conn)
}

pub fn open_db_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    bootstrap(&conn)?;
    Ok(conn)
}

fn bootstrap(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            teacher_id TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_teacher ON subjects(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_sessions(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            date TEXT NOT NULL,
            UNIQUE(subject_id, date),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_sessions_date ON attendance_sessions(date)",
        [],
    )?;

    // Uniqueness of student_id within a session is kept by the reconciler.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_marks(
            session_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            is_present INTEGER NOT NULL,
            PRIMARY KEY(session_id, position),
            FOREIGN KEY(session_id) REFERENCES attendance_sessions(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_marks_student ON attendance_marks(student_id)",
        [],
    )?;

    Ok(())
}
