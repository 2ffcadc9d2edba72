use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use crate::db::RecordStore;
use crate::error::StoreError;
use crate::users::password::hash_password_blocking;
use crate::users::repo_types::{NewUser, UpdateUser, User};

/// Everything the HTTP layer may ask of a user backend.
#[async_trait]
pub trait UserDatabase: Send + Sync {
    /// All rows in storage order. An empty table is `Ok(vec![])`.
    async fn get_all_users(&self) -> Result<Vec<User>, StoreError>;

    async fn get_user_by_id(&self, id: &str) -> Result<User, StoreError>;

    /// Hashes the password, inserts the row and returns it as stored.
    async fn add_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Read, merge `patch` over the stored row, write back. Not transactional:
    /// concurrent updates to one id race and the last writer wins.
    async fn update_user(&self, id: &str, patch: UpdateUser) -> Result<User, StoreError>;

    /// Zero affected rows is `NotFound`.
    async fn delete_user(&self, id: &str) -> Result<(), StoreError>;

    async fn close(&self);

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Postgres-backed [`UserDatabase`]. Borrows the pool from the store per call.
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    store: Arc<RecordStore>,
}

impl PgUserRepository {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserDatabase for PgUserRepository {
    #[instrument(skip(self))]
    async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, password_hash, firstname, lastname,
                   phonenumber, email, role, status, created_at, updated_at
            FROM users
            "#,
        )
        .fetch_all(&self.store.pool().await)
        .await
        .map_err(|e| StoreError::from_sqlx("get_all_users", e))?;
        debug!(count = users.len(), "users listed");
        Ok(users)
    }

    #[instrument(skip(self))]
    async fn get_user_by_id(&self, id: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, password_hash, firstname, lastname,
                   phonenumber, email, role, status, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.store.pool().await)
        .await
        .map_err(|e| StoreError::from_sqlx("get_user_by_id", e))?
        .ok_or_else(|| StoreError::NotFound { id: id.into() })
    }

    #[instrument(skip(self, new_user))]
    async fn add_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let NewUser {
            username,
            password,
            firstname,
            lastname,
            phonenumber,
            email,
            role,
            status,
        } = new_user;
        let password_hash = hash_password_blocking(password).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, firstname, lastname,
                               phonenumber, email, role, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING user_id, username, password_hash, firstname, lastname,
                      phonenumber, email, role, status, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(firstname)
        .bind(lastname)
        .bind(phonenumber)
        .bind(email)
        .bind(role)
        .bind(status)
        .fetch_one(&self.store.pool().await)
        .await
        .map_err(|e| StoreError::from_sqlx("add_user", e))?;

        info!(user_id = %user.user_id, "user created");
        Ok(user)
    }

    #[instrument(skip(self, patch))]
    async fn update_user(&self, id: &str, patch: UpdateUser) -> Result<User, StoreError> {
        let pool = self.store.pool().await;

        let mut merged = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, username, password_hash, firstname, lastname,
                   phonenumber, email, role, status, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| StoreError::from_sqlx("update_user", e))?
        .ok_or_else(|| StoreError::NotFound { id: id.into() })?;

        if patch.is_empty() {
            debug!("empty patch, only updated_at changes");
        }
        patch.apply(&mut merged);

        // GREATEST keeps updated_at from moving backwards if clocks disagree.
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET username = $1, firstname = $2, lastname = $3, phonenumber = $4,
                email = $5, role = $6, status = $7,
                updated_at = GREATEST(clock_timestamp(), updated_at)
            WHERE user_id = $8
            RETURNING user_id, username, password_hash, firstname, lastname,
                      phonenumber, email, role, status, created_at, updated_at
            "#,
        )
        .bind(&merged.username)
        .bind(&merged.firstname)
        .bind(&merged.lastname)
        .bind(&merged.phonenumber)
        .bind(&merged.email)
        .bind(&merged.role)
        .bind(&merged.status)
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| StoreError::from_sqlx("update_user", e))?
        // deleted between the read and the write
        .ok_or_else(|| StoreError::NotFound { id: id.into() })?;

        info!(user_id = %id, "user updated");
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(id)
            .execute(&self.store.pool().await)
            .await
            .map_err(|e| StoreError::from_sqlx("delete_user", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.into() });
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    async fn close(&self) {
        self.store.close().await;
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
