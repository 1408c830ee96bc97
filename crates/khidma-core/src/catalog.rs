//! Minimal user and service directory
//!
//! The marketplace's full listing/search surfaces live elsewhere; the
//! messaging layer only needs enough to resolve counterpart names and
//! service titles.

use crate::error::Result;
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

/// A marketplace user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: String,
    /// Name shown to counterparts
    pub display_name: String,
    /// When the user was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A posted service offering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Unique service identifier
    pub id: String,
    /// User providing the service
    pub provider_id: String,
    /// Service title shown in listings and toasts
    pub title: String,
    /// When the service was posted
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Create a new service offering for a provider
    pub fn new(provider_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider_id: provider_id.into(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

/// User repository for database operations
pub struct UserRepository<'a> {
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a user
    pub async fn create(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, display_name, created_at) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.display_name)
            .bind(user.created_at)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Get a user by ID
    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, display_name, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|r| User {
            id: r.get("id"),
            display_name: r.get("display_name"),
            created_at: r.get("created_at"),
        }))
    }

    /// Check if a user exists
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.is_some())
    }
}

/// Service repository for database operations
pub struct ServiceRepository<'a> {
    db: &'a Database,
}

impl<'a> ServiceRepository<'a> {
    /// Create a new service repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a service
    pub async fn create(&self, service: &Service) -> Result<()> {
        sqlx::query("INSERT INTO services (id, provider_id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(&service.id)
            .bind(&service.provider_id)
            .bind(&service.title)
            .bind(service.created_at)
            .execute(self.db.pool())
            .await?;

        Ok(())
    }

    /// Get a service by ID
    pub async fn get(&self, id: &str) -> Result<Option<Service>> {
        let row =
            sqlx::query("SELECT id, provider_id, title, created_at FROM services WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;

        Ok(row.map(|r| Service {
            id: r.get("id"),
            provider_id: r.get("provider_id"),
            title: r.get("title"),
            created_at: r.get("created_at"),
        }))
    }

    /// List services posted by a provider
    pub async fn list_by_provider(&self, provider_id: &str) -> Result<Vec<Service>> {
        let rows = sqlx::query(
            "SELECT id, provider_id, title, created_at FROM services WHERE provider_id = ? ORDER BY created_at DESC",
        )
        .bind(provider_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Service {
                id: r.get("id"),
                provider_id: r.get("provider_id"),
                title: r.get("title"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Check if a service exists
    pub async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM services WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.is_some())
    }
}
