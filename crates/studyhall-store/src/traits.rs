//! Store trait definitions

use studyhall_api::StorageStats;
use studyhall_util::{MonthId, UserId};

use crate::{MonthlyAggregate, SessionRecord, StoreResult, UserProfile};

/// Main store trait
pub trait Store: Send + Sync {
    // Session records

    /// Append a settled record. Returns false if the key already exists.
    fn put_session_record(&self, record: &SessionRecord) -> StoreResult<bool>;

    /// Records for a user, optionally restricted to a year and month
    fn get_session_records(
        &self,
        user_id: &UserId,
        year: Option<i32>,
        month: Option<u32>,
    ) -> StoreResult<Vec<SessionRecord>>;

    // Monthly aggregates

    fn get_monthly_aggregate(&self, month: MonthId) -> StoreResult<Option<MonthlyAggregate>>;

    /// Overwrite the month's aggregate. `last_updated` is stored as given,
    /// or stamped with the current time when unset.
    fn put_monthly_aggregate(&self, aggregate: &MonthlyAggregate) -> StoreResult<()>;

    // User profiles

    fn get_user_profile(&self, user_id: &UserId) -> StoreResult<Option<UserProfile>>;

    /// Insert or update a profile. The original join date is kept on update.
    fn put_user_profile(&self, profile: &UserProfile) -> StoreResult<()>;

    // Stats

    fn storage_stats(&self) -> StoreResult<StorageStats>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
