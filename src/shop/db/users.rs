use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use serde::Deserialize;
use sportshub_common::{Preferences, Role, User};

use super::{ShopDb, required};
use crate::errors::ShopError;
use crate::shop::auth;

const USER_COLUMNS: &str =
    "id, name, email, role, newsletter, order_updates, promotions, created_at";

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Preference toggles to flip. `None` keeps the stored value.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PreferencesPatch {
    pub newsletter: Option<bool>,
    pub order_updates: Option<bool>,
    pub promotions: Option<bool>,
}

impl PreferencesPatch {
    fn apply(&self, current: Preferences) -> Preferences {
        Preferences {
            newsletter: self.newsletter.unwrap_or(current.newsletter),
            order_updates: self.order_updates.unwrap_or(current.order_updates),
            promotions: self.promotions.unwrap_or(current.promotions),
        }
    }
}

impl ShopDb {
    // ── User CRUD ─────────────────────────────────────────────────────

    pub fn create_user(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let name = required("name", name)?;
        let email = auth::normalize_email(&required("email", email)?);
        if password.is_empty() {
            return Err(ShopError::validation("password is required").into());
        }
        if self.email_exists(&email, None)? {
            return Err(ShopError::EmailTaken { email }.into());
        }

        let salt = auth::new_salt();
        let hash = auth::hash_password(&salt, password);
        self.conn
            .execute(
                "INSERT INTO users (name, email, password_hash, password_salt) VALUES (?1, ?2, ?3, ?4)",
                params![name, email, hash, salt],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    /// Check an email/password pair. Unknown email and wrong password fail
    /// the same way.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let email = auth::normalize_email(email);
        let creds: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT id, password_hash, password_salt FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to query credentials")?;

        match creds {
            Some((id, hash, salt)) if auth::verify_password(&salt, password, &hash) => {
                self.get_user(id)?.context("User vanished during login")
            }
            _ => Err(ShopError::InvalidCredentials.into()),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .context("Failed to prepare list_users")?;
        let rows = stmt
            .query_map([], read_user_row)
            .context("Failed to query users")?;
        let mut users = Vec::new();
        for row in rows {
            let r = row.context("Failed to read user row")?;
            users.push(r.into_user()?);
        }
        Ok(users)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                read_user_row,
            )
            .optional()
            .context("Failed to query user")?;
        row.map(UserRow::into_user).transpose()
    }

    /// Like `get_user`, but a missing user is a `UserNotFound` error.
    pub fn require_user(&self, id: i64) -> Result<User> {
        self.get_user(id)?
            .ok_or_else(|| ShopError::UserNotFound { id }.into())
    }

    pub fn update_user(&self, id: i64, patch: &UserPatch) -> Result<User> {
        self.require_user(id)?;

        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        let email = match patch.email.as_deref() {
            Some(e) => {
                let email = auth::normalize_email(&required("email", e)?);
                if self.email_exists(&email, Some(id))? {
                    return Err(ShopError::EmailTaken { email }.into());
                }
                Some(email)
            }
            None => None,
        };
        if matches!(patch.password.as_deref(), Some("")) {
            return Err(ShopError::validation("password must not be empty").into());
        }

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(n) = &name {
            tx.execute("UPDATE users SET name = ?1 WHERE id = ?2", params![n, id])
                .context("Failed to update user name")?;
        }
        if let Some(e) = &email {
            tx.execute("UPDATE users SET email = ?1 WHERE id = ?2", params![e, id])
                .context("Failed to update user email")?;
        }
        if let Some(p) = &patch.password {
            let salt = auth::new_salt();
            let hash = auth::hash_password(&salt, p);
            tx.execute(
                "UPDATE users SET password_hash = ?1, password_salt = ?2 WHERE id = ?3",
                params![hash, salt, id],
            )
            .context("Failed to update user password")?;
        }

        tx.commit().context("Failed to commit user update")?;
        self.require_user(id)
    }

    pub fn update_preferences(&self, id: i64, patch: &PreferencesPatch) -> Result<User> {
        let user = self.require_user(id)?;
        let prefs = patch.apply(user.preferences);
        self.conn
            .execute(
                "UPDATE users SET newsletter = ?1, order_updates = ?2, promotions = ?3 WHERE id = ?4",
                params![prefs.newsletter, prefs.order_updates, prefs.promotions, id],
            )
            .context("Failed to update preferences")?;
        self.require_user(id)
    }

    pub fn set_role_by_email(&self, email: &str, role: Role) -> Result<User> {
        let email = auth::normalize_email(email);
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up user by email")?;
        let id = id.ok_or_else(|| ShopError::UserEmailNotFound {
            email: email.clone(),
        })?;
        self.conn
            .execute(
                "UPDATE users SET role = ?1 WHERE id = ?2",
                params![role.as_str(), id],
            )
            .context("Failed to update user role")?;
        self.require_user(id)
    }

    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1", params![id])
            .context("Failed to delete user")?;
        Ok(count > 0)
    }

    fn email_exists(&self, email: &str, except_id: Option<i64>) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 AND id != ?2",
                params![email, except_id.unwrap_or(-1)],
                |row| row.get(0),
            )
            .context("Failed to check email uniqueness")
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

struct UserRow {
    id: i64,
    name: String,
    email: String,
    role: String,
    newsletter: bool,
    order_updates: bool,
    promotions: bool,
    created_at: String,
}

fn read_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        newsletter: row.get(4)?,
        order_updates: row.get(5)?,
        promotions: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse user role")?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role,
            preferences: Preferences {
                newsletter: self.newsletter,
                order_updates: self.order_updates,
                promotions: self.promotions,
            },
            created_at: self.created_at,
        })
    }
}
