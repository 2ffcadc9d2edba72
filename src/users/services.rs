use std::sync::Arc;

use crate::error::StoreError;
use crate::users::repo::UserDatabase;
use crate::users::repo_types::{NewUser, UpdateUser, User};

/// Stable entry point for the HTTP layer. Forwards to whichever
/// [`UserDatabase`] it was built with.
#[derive(Clone)]
pub struct UserService {
    db: Arc<dyn UserDatabase>,
}

impl UserService {
    pub fn new(db: Arc<dyn UserDatabase>) -> Self {
        Self { db }
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>, StoreError> {
        self.db.get_all_users().await
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<User, StoreError> {
        self.db.get_user_by_id(id).await
    }

    pub async fn add_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        self.db.add_user(new_user).await
    }

    pub async fn update_user(&self, id: &str, patch: UpdateUser) -> Result<User, StoreError> {
        self.db.update_user(id, patch).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        self.db.delete_user(id).await
    }

    pub async fn close(&self) {
        self.db.close().await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await
    }
}
