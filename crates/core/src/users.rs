//! User accounts: registration, login, password changes and role management.

use crate::password::{hash_password, verify_password};
use crate::session::SessionUser;
use crate::store::Database;
use crate::validation::validate_new_password;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use oncobloom_types::{EmailAddress, NonEmptyText, Username};
use rusqlite::{OptionalExtension, Row};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

/// Registration form contents.
#[derive(Clone, Debug)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: Option<&'a str>,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

const USER_COLUMNS: &str = "id, username, email, full_name, is_admin, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        is_admin: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Login identities containing `@` are e-mail addresses (matched case-insensitively);
/// anything else is a username.
enum Identity {
    Email(String),
    Username(String),
}

impl Identity {
    fn parse(raw: &str) -> CoreResult<Self> {
        let raw = NonEmptyText::new(raw)?;
        if raw.as_str().contains('@') {
            Ok(Identity::Email(raw.as_str().to_lowercase()))
        } else {
            Ok(Identity::Username(raw.into_string()))
        }
    }
}

/// An account together with how many patient records it created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSummary {
    pub user: User,
    pub patient_count: i64,
}

/// Everything the administration page shows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserOverview {
    pub users: Vec<UserSummary>,
    pub total_users: i64,
    pub total_patients: i64,
    pub total_admins: i64,
}

#[derive(Clone, Debug)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a regular (non-admin) account.
    ///
    /// # Errors
    ///
    /// `CoreError::Text` / `CoreError::InvalidInput` for malformed fields and
    /// `CoreError::Conflict` if the username or e-mail is taken.
    pub fn register(&self, form: &Registration<'_>) -> CoreResult<User> {
        let username = Username::parse(form.username)?;
        let email = EmailAddress::parse(form.email)?;
        validate_new_password(form.password, form.confirm_password)?;
        let full_name = form
            .full_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);

        self.insert(username.as_str(), email.as_str(), full_name, form.password, false)
    }

    fn insert(
        &self,
        username: &str,
        email: &str,
        full_name: Option<String>,
        password: &str,
        is_admin: bool,
    ) -> CoreResult<User> {
        let password_hash = hash_password(password)?;
        let created_at = Utc::now();

        let conn = self.db.connection()?;
        let taken: Option<String> = conn
            .query_row(
                "SELECT username FROM users WHERE username = ?1 OR email = ?2",
                rusqlite::params![username, email],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = taken {
            let what = if existing == username {
                "username already exists"
            } else {
                "email already registered"
            };
            return Err(CoreError::Conflict(what.into()));
        }

        conn.execute(
            "INSERT INTO users (username, email, full_name, password_hash, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![username, email, full_name, password_hash, is_admin, created_at],
        )
        .map_err(|e| {
            if crate::error::is_unique_violation(&e) {
                CoreError::Conflict("username or email already registered".into())
            } else {
                e.into()
            }
        })?;

        let id = conn.last_insert_rowid();
        tracing::info!("registered user {} (id {})", username, id);

        Ok(User {
            id,
            username: username.to_owned(),
            email: email.to_owned(),
            full_name,
            is_admin,
            created_at,
        })
    }

    /// Creates the `admin` account with the given password unless an account with that
    /// username or e-mail already exists. Returns whether an account was created.
    pub fn ensure_default_admin(&self, email: &str, password: &str) -> CoreResult<bool> {
        let email = EmailAddress::parse(email)?;
        validate_new_password(password, password)?;
        match self.insert("admin", email.as_str(), None, password, true) {
            Ok(_) => Ok(true),
            Err(CoreError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Checks a login attempt.
    ///
    /// Unknown identities and wrong passwords both yield `CoreError::InvalidCredentials`.
    pub fn authenticate(&self, identity: &str, password: &str) -> CoreResult<User> {
        let Some((user, hash)) = self.find_with_hash(identity)? else {
            tracing::warn!("login failed for unknown identity");
            return Err(CoreError::InvalidCredentials);
        };

        if !verify_password(password, &hash) {
            tracing::warn!("login failed for {}", user.username);
            return Err(CoreError::InvalidCredentials);
        }

        tracing::info!("user {} logged in", user.username);
        Ok(user)
    }

    fn find_with_hash(&self, identity: &str) -> CoreResult<Option<(User, String)>> {
        let (column, value) = match Identity::parse(identity)? {
            Identity::Email(email) => ("email", email),
            Identity::Username(username) => ("username", username),
        };
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE {column} = ?1");

        let conn = self.db.connection()?;
        let found = conn
            .query_row(&sql, [value], |row| Ok((user_from_row(row)?, row.get(6)?)))
            .optional()?;
        Ok(found)
    }

    /// Looks a user up by e-mail or username.
    pub fn find_by_identity(&self, identity: &str) -> CoreResult<Option<User>> {
        Ok(self.find_with_hash(identity)?.map(|(user, _)| user))
    }

    pub fn get(&self, id: i64) -> CoreResult<User> {
        let conn = self.db.connection()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?
        .ok_or(CoreError::NotFound("user"))
    }

    /// All users, newest first.
    /// All accounts with their patient counts, plus system totals.
    pub fn overview(&self) -> CoreResult<UserOverview> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS},
                    (SELECT COUNT(*) FROM patients WHERE created_by = users.id)
             FROM users ORDER BY id DESC"
        ))?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    user: user_from_row(row)?,
                    patient_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let count = |sql: &str| -> CoreResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };
        Ok(UserOverview {
            users,
            total_users: count("SELECT COUNT(*) FROM users")?,
            total_patients: count("SELECT COUNT(*) FROM patients")?,
            total_admins: count("SELECT COUNT(*) FROM users WHERE is_admin = 1")?,
        })
    }

    pub fn list_admins(&self) -> CoreResult<Vec<User>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_admin = 1 ORDER BY id"
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Replaces the password without checking the old one. Used by the reset flow.
    pub fn set_password(&self, id: i64, password: &str, confirm: &str) -> CoreResult<()> {
        validate_new_password(password, confirm)?;
        let hash = hash_password(password)?;

        let conn = self.db.connection()?;
        let updated = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            rusqlite::params![hash, id],
        )?;
        if updated == 0 {
            return Err(CoreError::NotFound("user"));
        }
        tracing::info!("password updated for user id {}", id);
        Ok(())
    }

    /// Changes the password of a logged-in user, who must supply the current one.
    pub fn change_password(
        &self,
        actor: &SessionUser,
        current: &str,
        new_password: &str,
        confirm: &str,
    ) -> CoreResult<()> {
        let hash: String = {
            let conn = self.db.connection()?;
            conn.query_row(
                "SELECT password_hash FROM users WHERE id = ?1",
                [actor.id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(CoreError::NotFound("user"))?
        };

        if !verify_password(current, &hash) {
            tracing::warn!("password change rejected for {}", actor.username);
            return Err(CoreError::InvalidCredentials);
        }

        self.set_password(actor.id, new_password, confirm)
    }

    fn set_admin(&self, id: i64, is_admin: bool) -> CoreResult<User> {
        {
            let conn = self.db.connection()?;
            let updated = conn.execute(
                "UPDATE users SET is_admin = ?1 WHERE id = ?2",
                rusqlite::params![is_admin, id],
            )?;
            if updated == 0 {
                return Err(CoreError::NotFound("user"));
            }
        }
        self.get(id)
    }

    pub fn promote(&self, actor: &SessionUser, id: i64) -> CoreResult<User> {
        require_admin(actor)?;
        let user = self.set_admin(id, true)?;
        tracing::info!("{} granted admin to {}", actor.username, user.username);
        Ok(user)
    }

    /// Revokes admin rights. Admins cannot demote themselves.
    pub fn demote(&self, actor: &SessionUser, id: i64) -> CoreResult<User> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(CoreError::Forbidden("cannot remove your own admin rights"));
        }
        let user = self.set_admin(id, false)?;
        tracing::info!("{} revoked admin from {}", actor.username, user.username);
        Ok(user)
    }

    /// Deletes a user and, with them, their ledger entries. Admins cannot delete themselves.
    pub fn delete(&self, actor: &SessionUser, id: i64) -> CoreResult<()> {
        require_admin(actor)?;
        if actor.id == id {
            return Err(CoreError::Forbidden("cannot delete your own account"));
        }

        let mut conn = self.db.connection()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entries WHERE user_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(CoreError::NotFound("user"));
        }
        tx.commit()?;

        tracing::info!("{} deleted user id {}", actor.username, id);
        Ok(())
    }

    /// Grants or revokes admin rights by e-mail. Intended for operator tooling.
    pub fn set_admin_by_email(&self, email: &str, is_admin: bool) -> CoreResult<User> {
        let email = EmailAddress::parse(email)?;
        let id: i64 = {
            let conn = self.db.connection()?;
            conn.query_row(
                "SELECT id FROM users WHERE email = ?1",
                [email.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(CoreError::NotFound("user"))?
        };
        self.set_admin(id, is_admin)
    }
}

fn require_admin(actor: &SessionUser) -> CoreResult<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(CoreError::Forbidden("administrator access required"))
    }
}
