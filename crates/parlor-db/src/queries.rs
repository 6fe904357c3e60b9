use crate::models::{MessageRow, SessionRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, ErrorCode};

/// Result of inserting a user. Uniqueness is enforced by the schema, so a
/// racing duplicate surfaces here rather than as a second row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewUserOutcome {
    Created,
    UsernameTaken,
    EmailTaken,
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
        created_at: &str,
    ) -> Result<NewUserOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, email, password, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, username, email, password_hash, role, created_at],
            );

            match inserted {
                Ok(_) => Ok(NewUserOutcome::Created),
                Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    if msg.contains("users.username") {
                        Ok(NewUserOutcome::UsernameTaken)
                    } else if msg.contains("users.email") {
                        Ok(NewUserOutcome::EmailTaken)
                    } else {
                        Err(rusqlite::Error::SqliteFailure(err, Some(msg)).into())
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Returns false when no user has that id.
    pub fn update_user_role(&self, id: &str, role: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE users SET role = ?1 WHERE id = ?2", [role, id])?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        text: &str,
        author_json: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, author, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, text, author_json, created_at],
            )?;
            Ok(())
        })
    }

    /// All messages, newest first.
    pub fn get_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(query_messages)
    }

    /// Returns whether a row was removed. Deleting a missing id is not an error.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    pub fn count_messages(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, created_at: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, created_at, expires_at) VALUES (?1, ?2, ?3)",
                [id, created_at, expires_at],
            )?;
            Ok(())
        })
    }

    /// Fetch a session that has not expired as of `now`.
    pub fn get_session(&self, id: &str, now: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, trivia_question, trivia_answer, wrong_answer, flash, created_at, expires_at
                 FROM sessions WHERE id = ?1 AND expires_at > ?2",
            )?;

            let row = stmt
                .query_row([id, now], |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        trivia_question: row.get(2)?,
                        trivia_answer: row.get(3)?,
                        wrong_answer: row.get(4)?,
                        flash: row.get(5)?,
                        created_at: row.get(6)?,
                        expires_at: row.get(7)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    pub fn set_session_user(&self, id: &str, user_id: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET user_id = ?1 WHERE id = ?2",
                rusqlite::params![user_id, id],
            )?;
            Ok(())
        })
    }

    /// Store (or clear, with `None`) the question issued to this session.
    pub fn set_session_trivia(&self, id: &str, trivia: Option<(&str, &str)>) -> Result<()> {
        let (question, answer) = trivia.unzip();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET trivia_question = ?1, trivia_answer = ?2 WHERE id = ?3",
                rusqlite::params![question, answer, id],
            )?;
            Ok(())
        })
    }

    pub fn set_session_wrong_answer(&self, id: &str, wrong: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET wrong_answer = ?1 WHERE id = ?2",
                rusqlite::params![wrong, id],
            )?;
            Ok(())
        })
    }

    pub fn set_session_flash(&self, id: &str, flash: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET flash = ?1 WHERE id = ?2",
                rusqlite::params![flash, id],
            )?;
            Ok(())
        })
    }

    /// Read and clear the flash in one critical section.
    pub fn take_session_flash(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let flash: Option<String> = conn
                .query_row("SELECT flash FROM sessions WHERE id = ?1", [id], |row| row.get(0))
                .optional()?
                .flatten();

            if flash.is_some() {
                conn.execute("UPDATE sessions SET flash = NULL WHERE id = ?1", [id])?;
            }
            Ok(flash)
        })
    }

    /// Drop identity and quiz state, keeping the session row itself.
    pub fn reset_session(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions
                 SET user_id = NULL, trivia_question = NULL, trivia_answer = NULL, wrong_answer = 0
                 WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn delete_expired_sessions(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?;
            Ok(removed)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // column is always one of our own literals, never user input
    let sql = format!(
        "SELECT id, username, email, password, role, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                role: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection) -> Result<Vec<MessageRow>> {
    // rowid breaks ties between messages written in the same microsecond
    let mut stmt = conn.prepare(
        "SELECT id, text, author, created_at
         FROM messages
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                text: row.get(1)?,
                author: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
