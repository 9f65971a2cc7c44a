pub mod account;
pub mod answer_check;
pub mod auth;
pub mod chat;
pub mod generate;
pub mod goals;
pub mod quiz;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::db::models::DbUser;
use crate::middleware::session::Session;
use crate::service::usage::{QuotaOutcome, UsageKind};
use crate::{NexusError, router::NexusState};

/// The session's user row; a session for a deleted user is a 404.
pub(crate) async fn current_user(
    state: &NexusState,
    session: Session,
) -> Result<DbUser, NexusError> {
    state
        .storage
        .get_user(session.user_id)
        .await?
        .ok_or(NexusError::UserNotFound)
}

/// Take one unit of `kind` on `day`, or fail with the daily-limit error.
/// Unlimited plans are never charged; returns the new count otherwise.
pub(crate) async fn charge_quota(
    state: &NexusState,
    user: &DbUser,
    kind: UsageKind,
    day: NaiveDate,
) -> Result<Option<i64>, NexusError> {
    if user.plan.is_unlimited() {
        return Ok(None);
    }
    let max = state.limits().max_for(kind);
    match state
        .storage
        .consume_quota(user.id, day, kind, max)
        .await?
    {
        QuotaOutcome::Consumed { new_count } => Ok(Some(new_count)),
        QuotaOutcome::Exceeded { current } => {
            info!(user_id = user.id, %kind, current, max, "daily limit reached");
            Err(NexusError::DailyLimitExceeded { kind, current, max })
        }
    }
}

/// Hand back a unit taken by `charge_quota` when the work it paid for failed.
pub(crate) async fn refund_quota(state: &NexusState, user: &DbUser, kind: UsageKind, day: NaiveDate) {
    if user.plan.is_unlimited() {
        return;
    }
    match state.storage.release_quota(user.id, day, kind).await {
        Ok(count) => info!(user_id = user.id, %kind, count, "quota refunded"),
        Err(e) => warn!(user_id = user.id, %kind, error = %e, "quota refund failed"),
    }
}
