use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{PermissionResolver, RepoError},
    domain::entities::RoleFlags,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SessionRoleRow {
    user_id: Uuid,
    is_admin: bool,
    is_editor: bool,
    is_moderator: bool,
}

#[async_trait]
impl PermissionResolver for PostgresRepositories {
    async fn resolve(&self, session_token: &str) -> Result<RoleFlags, RepoError> {
        let row = sqlx::query_as::<_, SessionRoleRow>(
            r#"
            SELECT u.id AS user_id, u.is_admin, u.is_editor, u.is_moderator
            FROM sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.token = $1 AND s.expires_at > now()
            "#,
        )
        .bind(session_token)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row
            .map(|row| RoleFlags {
                user_id: Some(row.user_id),
                is_admin: row.is_admin,
                is_editor: row.is_editor,
                is_moderator: row.is_moderator,
            })
            .unwrap_or_else(RoleFlags::anonymous))
    }
}
