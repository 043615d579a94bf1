/// Entitlement gate
///
/// Answers one question: may this user read this lesson's video. Resolves the
/// lesson's owning course through the catalog port and asks the entitlement
/// ledger for an active grant. Lookup failures fold into `false` — a denial,
/// never an error that could bubble past a security check. No side effects.
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::db::{GrantStore, LessonCatalog};

#[derive(Clone)]
pub struct EntitlementGate {
    catalog: Arc<dyn LessonCatalog>,
    grants: Arc<dyn GrantStore>,
}

impl EntitlementGate {
    pub fn new(catalog: Arc<dyn LessonCatalog>, grants: Arc<dyn GrantStore>) -> Self {
        Self { catalog, grants }
    }

    pub async fn has_access(&self, user_id: Uuid, lesson_id: Uuid) -> bool {
        let lesson = match self.catalog.get_lesson(lesson_id).await {
            Ok(Some(lesson)) => lesson,
            Ok(None) => {
                debug!(%lesson_id, "access check: lesson not found");
                return false;
            }
            Err(err) => {
                debug!(%lesson_id, "access check: lesson lookup failed: {}", err);
                return false;
            }
        };

        match self
            .grants
            .has_active_grant(user_id, lesson.course_id)
            .await
        {
            Ok(active) => active,
            Err(err) => {
                debug!(%user_id, %lesson_id, "access check: grant lookup failed: {}", err);
                false
            }
        }
    }
}
