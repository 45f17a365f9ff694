use crate::error::CoreError;
use crate::models::{Organization, OrganizationMembership, User, UserRole};
use crate::repository::SqliteRepository;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

#[async_trait]
impl super::OrganizationRepository for SqliteRepository {
    async fn create_organization(&self, name: String) -> Result<Organization, CoreError> {
        let organization = Organization {
            id: Uuid::now_v7(),
            name,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO organizations (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(organization.id)
            .bind(&organization.name)
            .bind(organization.created_at)
            .execute(self.pool())
            .await?;

        Ok(organization)
    }

    async fn find_organization_by_id(&self, id: Uuid) -> Result<Option<Organization>, CoreError> {
        let organization = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(organization)
    }

    async fn create_user(&self, name: String, role: UserRole) -> Result<User, CoreError> {
        let user = User {
            id: Uuid::now_v7(),
            name,
            role,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO users (id, name, role, created_at) VALUES ($1, $2, $3, $4)")
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.role)
            .bind(user.created_at)
            .execute(self.pool())
            .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, CoreError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn add_membership(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
        role: UserRole,
    ) -> Result<OrganizationMembership, CoreError> {
        let membership = OrganizationMembership {
            organization_id,
            member_id,
            role,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"INSERT INTO organization_memberships (organization_id, member_id, role, created_at)
            VALUES ($1, $2, $3, $4)"#,
        )
        .bind(membership.organization_id)
        .bind(membership.member_id)
        .bind(&membership.role)
        .bind(membership.created_at)
        .execute(self.pool())
        .await?;

        Ok(membership)
    }

    async fn find_membership(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<OrganizationMembership>, CoreError> {
        let membership = sqlx::query_as(
            "SELECT * FROM organization_memberships WHERE organization_id = $1 AND member_id = $2",
        )
        .bind(organization_id)
        .bind(member_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(membership)
    }
}
