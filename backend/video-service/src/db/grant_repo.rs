/// Entitlement grant adapter - the single query this service issues against
/// the external ledger
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::GrantStore;
use crate::error::Result;

pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn has_active_grant(&self, user_id: Uuid, course_id: Uuid) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                SELECT 1 FROM entitlement_grants \
                WHERE user_id = $1 AND course_id = $2 AND is_active = TRUE \
             )",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }
}
