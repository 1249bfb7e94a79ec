use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use gazette_types::input::{NewUser, ProfileInput};
use gazette_types::models::{Profile, User};

use crate::models::UserRow;
use crate::{Database, parse_timestamp, timestamp};

const USER_COLUMNS: &str =
    "id, email, first_name, last_name, password, is_active, is_staff, date_joined, last_login";

impl Database {
    // -- Users --

    /// Insert a user together with its profile. Returns the new user id.
    pub fn create_user(&self, user: &NewUser, profile: &ProfileInput) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (email, first_name, last_name, password, is_active, is_staff, date_joined)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.password_hash,
                    user.is_active,
                    user.is_staff,
                    timestamp(Utc::now()),
                ],
            )?;
            let user_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO profiles (user_id, about, avatar) VALUES (?1, ?2, ?3)",
                params![user_id, profile.about, profile.avatar],
            )?;
            tx.commit()?;
            info!("Created user {} ({})", user_id, user.email);
            Ok(user_id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], user_row).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM users WHERE email = ?1", [email], |r| r.get(0))?;
            Ok(count > 0)
        })
    }

    /// All users ordered by email.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY email");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.iter().map(UserRow::to_user).collect())
        })
    }

    pub fn set_user_active(&self, id: i64, active: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET is_active = ?1 WHERE id = ?2", params![active, id])?;
            Ok(())
        })
    }

    pub fn set_user_staff(&self, id: i64, staff: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET is_staff = ?1 WHERE id = ?2", params![staff, id])?;
            Ok(())
        })
    }

    pub fn record_login(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                params![timestamp(Utc::now()), id],
            )?;
            Ok(())
        })
    }

    pub fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET password = ?1 WHERE id = ?2", params![password_hash, id])?;
            Ok(())
        })
    }

    /// Delete a user. Their profile goes with them; articles and comments stay
    /// behind with a null owner. Returns the avatar path so the caller can
    /// remove the file.
    pub fn delete_user(&self, id: i64) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let avatar: Option<String> = tx
                .query_row("SELECT avatar FROM profiles WHERE user_id = ?1", [id], |r| r.get(0))
                .optional()?
                .flatten();
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            info!("Deleted user {}", id);
            Ok(avatar)
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: i64) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, about, avatar FROM profiles WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(Profile {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            about: row.get(2)?,
                            avatar: row.get(3)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn update_profile(&self, user_id: i64, profile: &ProfileInput) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET about = ?1, avatar = ?2 WHERE user_id = ?3",
                params![profile.about, profile.avatar, user_id],
            )?;
            Ok(())
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], user_row).optional()?)
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let last_login: Option<String> = row.get(8)?;
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        password: row.get(4)?,
        is_active: row.get(5)?,
        is_staff: row.get(6)?,
        date_joined: parse_timestamp(&row.get::<_, String>(7)?)?,
        last_login: last_login.as_deref().map(parse_timestamp).transpose()?,
    })
}
