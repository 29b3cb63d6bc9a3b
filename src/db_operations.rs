use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::data_types::samad_data_types::Credentials;

/// Samad logins per Telegram chat, in a sqlite file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    db_path: PathBuf,
}

impl CredentialStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        CredentialStore {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open(&self.db_path)
    }

    pub fn check_or_create_db_tables(&self) -> rusqlite::Result<()> {
        let conn = self.connect()?;

        conn.prepare(
            "create table if not exists users (
            chat_id integer not null unique primary key,
            student_id text not null,
            password text not null
            )",
        )?
        .execute([])?;

        Ok(())
    }

    pub fn save_credentials(&self, chat_id: i64, credentials: &Credentials) -> rusqlite::Result<()> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare_cached(
            "replace into users (chat_id, student_id, password)
                values (?1, ?2, ?3)",
        )?;

        stmt.execute(params![
            chat_id,
            credentials.student_id,
            credentials.password
        ])?;

        Ok(())
    }

    pub fn get_credentials(&self, chat_id: i64) -> rusqlite::Result<Option<Credentials>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare_cached("SELECT student_id, password FROM users WHERE chat_id = ?1")?;

        stmt.query_row(params![chat_id], |row| {
            Ok(Credentials {
                student_id: row.get(0)?,
                password: row.get(1)?,
            })
        })
        .optional()
    }

    /// `true` if there was something to delete
    pub fn delete_credentials(&self, chat_id: i64) -> rusqlite::Result<bool> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare_cached("DELETE FROM users WHERE chat_id = ?1")?;

        Ok(stmt.execute(params![chat_id])? > 0)
    }
}
