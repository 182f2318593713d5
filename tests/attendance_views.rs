use attendanced::db::open_db_in_memory;
use attendanced::store;
use attendanced::{
    build_roster, build_self_view, reconcile, AuthenticatedUser, DateRange, ErrorKind, Mark,
    ReconcileInput, Role, Student, Subject,
};
use chrono::NaiveDate;
use rusqlite::Connection;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn user(id: &str, role: Role) -> AuthenticatedUser {
    AuthenticatedUser {
        id: id.to_string(),
        role,
    }
}

fn submit(conn: &mut Connection, subject: &str, date: &str, entries: &[(&str, bool)]) -> String {
    reconcile(
        conn,
        &ReconcileInput {
            subject_id: subject.to_string(),
            date: day(date),
            marks: entries.iter().map(|(s, p)| Mark::new(*s, *p)).collect(),
        },
    )
    .expect("reconcile")
    .session
    .id
}

/// math and physics belong to t1, art to t2, pe has no teacher.
fn school() -> Connection {
    let conn = open_db_in_memory().expect("open");
    for (id, name, teacher) in [
        ("math", "Mathematics", Some("t1")),
        ("physics", "Physics", Some("t1")),
        ("art", "Art", Some("t2")),
        ("pe", "Physical Education", None),
    ] {
        store::upsert_subject(
            &conn,
            &Subject {
                id: id.to_string(),
                name: name.to_string(),
                code: id.to_uppercase(),
                teacher_id: teacher.map(str::to_string),
            },
        )
        .expect("subject");
    }
    for (id, name) in [("s1", "Ada"), ("s2", "Grace"), ("s3", "Alan")] {
        store::upsert_student(
            &conn,
            &Student {
                id: id.to_string(),
                name: name.to_string(),
                email: format!("{id}@school.test"),
            },
        )
        .expect("student");
    }
    conn
}

#[test]
fn admin_roster_lists_every_session_with_denormalized_detail() {
    let mut conn = school();
    submit(&mut conn, "math", "2024-01-01", &[("s1", true), ("s2", false)]);
    submit(&mut conn, "art", "2024-01-02", &[("s3", true)]);
    submit(&mut conn, "pe", "2024-01-03", &[]);

    let views = build_roster(&conn, &user("a1", Role::Admin), &DateRange::default())
        .expect("roster");
    assert_eq!(views.len(), 3);

    let math = &views[0];
    assert_eq!(math.date, day("2024-01-01"));
    let subject = math.subject.as_ref().expect("subject resolved");
    assert_eq!(subject.name, "Mathematics");
    assert_eq!(subject.teacher_id.as_deref(), Some("t1"));
    assert_eq!(math.attendance.len(), 2);
    let first = math.attendance[0].student.as_ref().expect("student resolved");
    assert_eq!(first.name, "Ada");
    assert_eq!(first.email, "s1@school.test");
    assert!(math.attendance[0].is_present);
    assert!(!math.attendance[1].is_present);

    let json = serde_json::to_value(&views).expect("serialize");
    assert_eq!(json[0]["subject"]["teacherId"], "t1");
    assert_eq!(json[0]["attendance"][1]["student"]["id"], "s2");
    assert_eq!(json[0]["attendance"][1]["isPresent"], false);
    assert!(json[2]["attendance"].as_array().expect("array").is_empty());
}

#[test]
fn teacher_roster_only_contains_owned_subjects() {
    let mut conn = school();
    submit(&mut conn, "math", "2024-01-01", &[("s1", true)]);
    submit(&mut conn, "art", "2024-01-01", &[("s2", true)]);
    submit(&mut conn, "physics", "2024-01-02", &[("s3", false)]);
    submit(&mut conn, "pe", "2024-01-02", &[("s1", false)]);

    let t1 = build_roster(&conn, &user("t1", Role::Teacher), &DateRange::default())
        .expect("t1 roster");
    assert_eq!(t1.len(), 2);
    for v in &t1 {
        let subject = v.subject.as_ref().expect("subject");
        assert_eq!(subject.teacher_id.as_deref(), Some("t1"));
    }

    let t2 = build_roster(&conn, &user("t2", Role::Teacher), &DateRange::default())
        .expect("t2 roster");
    assert_eq!(t2.len(), 1);
    assert_eq!(t2[0].subject.as_ref().map(|s| s.id.as_str()), Some("art"));

    let nobody = build_roster(&conn, &user("t9", Role::Teacher), &DateRange::default())
        .expect("empty roster");
    assert!(nobody.is_empty());
}

#[test]
fn single_day_range_is_inclusive_of_that_day_only() {
    let mut conn = school();
    submit(&mut conn, "math", "2023-12-31", &[("s1", true)]);
    let jan1 = submit(&mut conn, "math", "2024-01-01", &[("s1", true)]);
    submit(&mut conn, "math", "2024-01-02", &[("s1", false)]);

    let range = DateRange::parse(Some("2024-01-01"), Some("2024-01-01")).expect("range");
    let views = build_roster(&conn, &user("a1", Role::Admin), &range).expect("roster");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, jan1);

    let open_start = DateRange::parse(None, Some("2024-01-01")).expect("range");
    let views = build_roster(&conn, &user("a1", Role::Admin), &open_start).expect("roster");
    assert_eq!(views.len(), 2);

    let open_end = DateRange::parse(Some("2024-01-02"), None).expect("range");
    let views = build_roster(&conn, &user("t1", Role::Teacher), &open_end).expect("roster");
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].date, day("2024-01-02"));
}

#[test]
fn roster_shows_unresolvable_student_as_null() {
    let mut conn = school();
    submit(&mut conn, "math", "2024-01-01", &[("s1", true), ("s2", true)]);
    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         DELETE FROM students WHERE id = 's2';
         PRAGMA foreign_keys = ON;",
    )
    .expect("remove student");

    let views = build_roster(&conn, &user("a1", Role::Admin), &DateRange::default())
        .expect("roster");
    assert!(views[0].attendance[0].student.is_some());
    assert!(views[0].attendance[1].student.is_none());
    let json = serde_json::to_value(&views).expect("serialize");
    assert!(json[0]["attendance"][1]["student"].is_null());
    assert_eq!(json[0]["attendance"][1]["isPresent"], true);
}

#[test]
fn student_role_cannot_build_roster() {
    let conn = school();
    let e = build_roster(&conn, &user("s1", Role::Student), &DateRange::default())
        .expect_err("forbidden");
    assert_eq!(e.kind, ErrorKind::Forbidden);
}

#[test]
fn self_view_returns_exactly_the_sessions_marking_the_student() {
    let mut conn = school();
    let a = submit(&mut conn, "math", "2024-01-01", &[("s1", true), ("s2", false)]);
    submit(&mut conn, "art", "2024-01-01", &[("s2", true)]);
    let c = submit(&mut conn, "physics", "2024-01-03", &[("s3", true), ("s1", false)]);
    submit(&mut conn, "pe", "2024-01-04", &[]);

    let mine = build_self_view(&conn, "s1").expect("self view");
    let ids: Vec<_> = mine.iter().map(|v| v.session_id.clone()).collect();
    assert_eq!(ids, vec![a, c]);
    assert!(mine.iter().all(|v| v.is_marked));
    assert!(mine[0].is_present);
    assert!(!mine[1].is_present);
    assert_eq!(mine[0].subject_name.as_deref(), Some("Mathematics"));
    assert_eq!(mine[1].subject_name.as_deref(), Some("Physics"));
    assert_eq!(mine[1].date, day("2024-01-03"));

    let json = serde_json::to_value(&mine).expect("serialize");
    assert_eq!(json[0]["subjectName"], "Mathematics");
    assert_eq!(json[0]["isMarked"], true);
    assert_eq!(json[0]["date"], "2024-01-01");

    assert!(build_self_view(&conn, "nobody").expect("empty").is_empty());
}

#[test]
fn self_view_follows_latest_reconciled_value() {
    let mut conn = school();
    submit(&mut conn, "math", "2024-01-01", &[("s1", false)]);
    submit(&mut conn, "math", "2024-01-01", &[("s2", true), ("s1", true)]);

    let mine = build_self_view(&conn, "s1").expect("self view");
    assert_eq!(mine.len(), 1);
    assert!(mine[0].is_present);
}
