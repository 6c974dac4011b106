use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "academate.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace directory {}",
            workspace.to_string_lossy()
        )
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            institution TEXT,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            credits INTEGER NOT NULL,
            difficulty TEXT NOT NULL,
            instructor TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_user ON courses(user_id)",
        [],
    )?;

    // sort_order keeps creation order stable; the last semester drives the CGPA change.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semesters_user_sort ON semesters(user_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semester_courses(
            id TEXT PRIMARY KEY,
            semester_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            grade TEXT NOT NULL,
            unit INTEGER NOT NULL,
            difficulty TEXT,
            instructor TEXT,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semester_courses_semester ON semester_courses(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS study_groups(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            course TEXT,
            max_members INTEGER NOT NULL,
            is_private INTEGER NOT NULL,
            access_code TEXT UNIQUE,
            creator_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            FOREIGN KEY(creator_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_study_groups_course ON study_groups(course)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_members(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES study_groups(id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            UNIQUE(group_id, user_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_members_group ON group_members(group_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_members_user ON group_members(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS discussion_messages(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            user_initials TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            seq INTEGER NOT NULL,
            FOREIGN KEY(group_id) REFERENCES study_groups(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_discussion_messages_group_seq ON discussion_messages(group_id, seq)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_resources(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            file_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            content BLOB NOT NULL,
            uploaded_by TEXT NOT NULL,
            uploader_name TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            seq INTEGER NOT NULL,
            FOREIGN KEY(group_id) REFERENCES study_groups(id),
            FOREIGN KEY(uploaded_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_resources_group ON group_resources(group_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_events(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            location TEXT,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            created_by TEXT NOT NULL,
            creator_name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(group_id) REFERENCES study_groups(id),
            FOREIGN KEY(created_by) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_group_events_group_start ON group_events(group_id, start_time)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS group_event_attendees(
            event_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY(event_id, user_id),
            FOREIGN KEY(event_id) REFERENCES group_events(id),
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS study_blocks(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            course_code TEXT,
            day TEXT NOT NULL,
            day_index INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            location TEXT,
            color TEXT,
            notes TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_study_blocks_user ON study_blocks(user_id)",
        [],
    )?;

    Ok(conn)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn open_db_is_idempotent() {
        let ws = temp_dir("academate-db-open");
        drop(open_db(&ws).expect("first open"));
        let conn = open_db(&ws).expect("second open");
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |r| r.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 11);
    }
}
