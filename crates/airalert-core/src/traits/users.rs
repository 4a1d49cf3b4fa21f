//! User subscription store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{NewUser, PushSubscription, UserId, UserSubscription};

/// Source of truth for subscribed users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<UserId>;

    async fn list_users(&self) -> Result<Vec<UserSubscription>>;

    /// Fails with `LookupFailed` when the user does not exist.
    async fn get_user(&self, id: UserId) -> Result<UserSubscription>;

    /// Delete every user registered with this exact subscription.
    async fn delete_user(&self, subscription: &PushSubscription) -> Result<()>;

    async fn update_last_crossover(&self, id: UserId, crossover: DateTime<Utc>) -> Result<()>;
}
