//! Staff accounts and API token lookup.

use crate::db::{fmt_datetime, now, Database};
use crate::error::text_field;
use crate::models::{enum_column, User, UserRole};
use crate::{HmsError, HmsResult};
use api_shared::auth::{generate_api_token, hash_api_token};
use hms_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension};

const USER_COLUMNS: &str = "id, name, email, role, active, created_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<User, rusqlite::Error> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: enum_column(3, &role)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn get_user(conn: &Connection, id: i64) -> HmsResult<User> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        row_to_user,
    )
    .optional()?
    .ok_or_else(|| HmsError::not_found("user", id))
}

/// Loads an active user holding `role`, reporting a validation error against `field` otherwise.
pub fn require_role(conn: &Connection, field: &str, id: i64, role: UserRole) -> HmsResult<User> {
    let user = get_user(conn, id).map_err(|e| match e {
        HmsError::NotFound { .. } => HmsError::validation(field, format!("user {id} does not exist")),
        other => other,
    })?;
    if !user.active || user.role != role {
        return Err(HmsError::validation(
            field,
            format!("user {id} is not an active {role}"),
        ));
    }
    Ok(user)
}

pub fn find_by_email(conn: &Connection, email: &str) -> HmsResult<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        row_to_user,
    )
    .optional()
    .map_err(HmsError::from)
}

/// Inserts a user with a freshly generated API token, returning the plain token.
pub(crate) fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    role: UserRole,
) -> HmsResult<(User, String)> {
    let name = text_field("name", NonEmptyText::new(name))?;
    let email = text_field("email", NonEmptyText::new(email))?;
    if !email.as_str().contains('@') {
        return Err(HmsError::validation("email", "must be an email address"));
    }
    if find_by_email(conn, email.as_str())?.is_some() {
        return Err(HmsError::Conflict(format!(
            "a user with email {email} already exists"
        )));
    }
    let token = generate_api_token();
    conn.execute(
        "INSERT INTO users (name, email, role, token_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            name.as_str(),
            email.as_str(),
            role.as_str(),
            hash_api_token(&token),
            fmt_datetime(&now())
        ],
    )?;
    let user = get_user(conn, conn.last_insert_rowid())?;
    Ok((user, token))
}

#[derive(Clone, Debug)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a user and returns it with its API token.
    ///
    /// The plain token is only available here; the database keeps its digest.
    pub fn create_user(&self, name: &str, email: &str, role: UserRole) -> HmsResult<(User, String)> {
        let (user, token) = self
            .db
            .with_conn(|conn| insert_user(conn, name, email, role))?;
        tracing::info!(user_id = user.id, role = %user.role, "user created");
        Ok((user, token))
    }

    pub fn list_users(&self) -> HmsResult<Vec<User>> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name, id"))?;
            let rows = stmt.query_map([], row_to_user)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(HmsError::from)
        })
    }

    /// Resolves a presented bearer token to an active user.
    pub fn authenticate(&self, token: &str) -> HmsResult<Option<User>> {
        let token_hash = hash_api_token(token);
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE token_hash = ?1 AND active = 1"),
                params![token_hash],
                row_to_user,
            )
            .optional()
            .map_err(HmsError::from)
        })
    }

    pub fn set_active(&self, id: i64, active: bool) -> HmsResult<()> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE users SET active = ?1 WHERE id = ?2",
                params![active, id],
            )?;
            if affected == 0 {
                return Err(HmsError::not_found("user", id));
            }
            Ok(())
        })
    }
}
