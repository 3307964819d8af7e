//! Organizations and users that own every other row

use crate::db::{Database, tables};
use crate::types::{AuditColumns, Owner};
use serde::{Deserialize, Serialize};
use tether_common::Result;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub organization_id: String,
    pub name: String,
    pub audit: AuditColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub organization_id: String,
    pub name: String,
    pub audit: AuditColumns,
}

/// Organization and user rows
#[derive(Clone)]
pub struct Tenancy {
    db: Database,
}

impl Tenancy {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the organization and user rows for `owner` if they are missing
    pub async fn ensure(&self, owner: &Owner) -> Result<()> {
        if self.organization(&owner.organization_id).await?.is_none() {
            let org = Organization {
                organization_id: owner.organization_id.clone(),
                name: owner.organization_id.clone(),
                audit: AuditColumns::created_by(&owner.user_id),
            };
            self.db
                .create(tables::ORGANIZATIONS, "organization", &org.organization_id, &org)
                .await?;
            info!("Created organization {}", org.organization_id);
        }

        if self.user(&owner.user_id).await?.is_none() {
            let user = User {
                user_id: owner.user_id.clone(),
                organization_id: owner.organization_id.clone(),
                name: owner.user_id.clone(),
                audit: AuditColumns::created_by(&owner.user_id),
            };
            self.db
                .create(tables::USERS, "user", &user.user_id, &user)
                .await?;
            info!("Created user {}", user.user_id);
        }

        Ok(())
    }

    pub async fn organization(&self, id: &str) -> Result<Option<Organization>> {
        self.db.fetch(tables::ORGANIZATIONS, id).await
    }

    pub async fn user(&self, id: &str) -> Result<Option<User>> {
        self.db.fetch(tables::USERS, id).await
    }
}
