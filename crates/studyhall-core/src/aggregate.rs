//! Monthly aggregation engine
//!
//! Folds settled session records into the month's organization totals and
//! top-individuals leaderboard. Folds of one month are serialized by a
//! per-month async lock; an organization total is incremented at most once
//! per record key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use studyhall_api::{LeaderboardEntry, LeaderboardReport, OrganizationStanding};
use studyhall_config::LeaderboardSettings;
use studyhall_store::{MonthlyAggregate, SessionRecord, Store};
use studyhall_util::MonthId;
use tracing::{debug, info};

use crate::CoreResult;

pub struct Aggregator {
    store: Arc<dyn Store>,
    organizations: Vec<String>,
    settings: LeaderboardSettings,
    month_locks: Mutex<HashMap<MonthId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn Store>,
        organizations: Vec<String>,
        settings: LeaderboardSettings,
    ) -> Self {
        Self {
            store,
            organizations,
            settings,
            month_locks: Mutex::new(HashMap::new()),
        }
    }

    fn month_lock(&self, month: MonthId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .month_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(month).or_default().clone()
    }

    fn load_or_default(&self, month: MonthId) -> CoreResult<MonthlyAggregate> {
        Ok(self
            .store
            .get_monthly_aggregate(month)?
            .unwrap_or_else(|| MonthlyAggregate::new(month, &self.organizations)))
    }

    /// Fold one persisted record into its month's aggregate
    pub async fn fold_session(&self, record: &SessionRecord) -> CoreResult<()> {
        let month = record.month_id();
        let lock = self.month_lock(month);
        let _held = lock.lock().await;

        let mut aggregate = self.load_or_default(month)?;

        if aggregate.folded_records.insert(record.record_key.clone()) {
            *aggregate
                .organization_minutes
                .entry(record.organization.clone())
                .or_insert(0) += record.duration_minutes as u64;
        } else {
            debug!(record_key = %record.record_key, "Record already folded into organization total");
        }

        let user_total: u64 = self
            .store
            .get_session_records(&record.user_id, Some(month.year()), Some(month.month()))?
            .iter()
            .map(|r| r.duration_minutes as u64)
            .sum();

        upsert_individual(
            &mut aggregate.top_individuals,
            LeaderboardEntry {
                user_id: record.user_id.clone(),
                username: record.username.clone(),
                organization: record.organization.clone(),
                minutes: user_total,
            },
            self.settings.capacity,
        );

        aggregate.last_updated = Some(record.recorded_at);
        self.store.put_monthly_aggregate(&aggregate)?;

        info!(
            month = %month,
            user_id = %record.user_id,
            organization = %record.organization,
            minutes = record.duration_minutes,
            user_total,
            "Session folded into monthly aggregate"
        );
        Ok(())
    }

    /// Organization ranking and top individuals for a month
    pub fn leaderboard(&self, month: MonthId) -> CoreResult<LeaderboardReport> {
        let aggregate = self.load_or_default(month)?;

        let mut organizations: Vec<(String, u64)> = aggregate
            .organization_minutes
            .iter()
            .map(|(name, minutes)| (name.clone(), *minutes))
            .collect();
        organizations.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let organizations = organizations
            .into_iter()
            .take(self.settings.report_organizations)
            .enumerate()
            .filter(|(_, (_, minutes))| *minutes > 0)
            .map(|(idx, (organization, total_minutes))| OrganizationStanding {
                rank: idx + 1,
                organization,
                total_minutes,
            })
            .collect();

        let top_individuals = aggregate
            .top_individuals
            .iter()
            .take(self.settings.report_individuals)
            .filter(|e| e.minutes > 0)
            .cloned()
            .collect();

        Ok(LeaderboardReport {
            month,
            organizations,
            top_individuals,
            last_updated: aggregate.last_updated,
        })
    }
}

/// Replace a user's entry, keep the list sorted descending and within capacity
pub fn upsert_individual(list: &mut Vec<LeaderboardEntry>, entry: LeaderboardEntry, capacity: usize) {
    list.retain(|e| e.user_id != entry.user_id);
    list.push(entry);
    list.sort_by(|a, b| b.minutes.cmp(&a.minutes));
    list.truncate(capacity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Local, TimeZone};
    use studyhall_store::{NewSessionRecord, SqliteStore};
    use studyhall_util::{ChannelId, SessionId, UserId};

    fn end() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 12, 15, 0, 0).unwrap()
    }

    fn record(user: &str, org: &str, minutes: u32) -> SessionRecord {
        NewSessionRecord {
            session_id: SessionId::new(),
            user_id: UserId::new(user),
            username: format!("user-{}", user),
            organization: org.into(),
            joined_at: end() - chrono::Duration::minutes(minutes as i64),
            study_end: end(),
            minutes,
            channel_id: ChannelId::new("1"),
            channel_name: "Library".into(),
            late_join: false,
        }
        .into_record(end())
    }

    fn setup(capacity: usize) -> (Arc<SqliteStore>, Aggregator) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let aggregator = Aggregator::new(
            store.clone(),
            vec!["VTK".into(), "Wina".into(), "Medica".into()],
            LeaderboardSettings {
                capacity,
                report_organizations: 10,
                report_individuals: 3,
            },
        );
        (store, aggregator)
    }

    async fn settle(store: &SqliteStore, aggregator: &Aggregator, record: &SessionRecord) {
        store.put_session_record(record).unwrap();
        aggregator.fold_session(record).await.unwrap();
    }

    fn month() -> MonthId {
        MonthId::of(&end())
    }

    #[test]
    fn upsert_keeps_one_entry_per_user() {
        let mut list = Vec::new();
        let entry = |user: &str, minutes| LeaderboardEntry {
            user_id: UserId::new(user),
            username: user.into(),
            organization: "VTK".into(),
            minutes,
        };

        upsert_individual(&mut list, entry("a", 10), 2);
        upsert_individual(&mut list, entry("b", 30), 2);
        upsert_individual(&mut list, entry("a", 40), 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].user_id, UserId::new("a"));
        assert_eq!(list[0].minutes, 40);

        upsert_individual(&mut list, entry("c", 5), 2);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|e| e.user_id.as_str() != "c"));
    }

    #[tokio::test]
    async fn user_total_matches_records() {
        let (store, aggregator) = setup(100);

        settle(&store, &aggregator, &record("1", "VTK", 25)).await;
        settle(&store, &aggregator, &record("1", "VTK", 15)).await;
        settle(&store, &aggregator, &record("2", "Wina", 25)).await;

        let agg = store.get_monthly_aggregate(month()).unwrap().unwrap();
        assert_eq!(agg.organization_minutes["VTK"], 40);
        assert_eq!(agg.organization_minutes["Wina"], 25);
        assert_eq!(agg.organization_minutes["Medica"], 0);

        let top = &agg.top_individuals[0];
        assert_eq!(top.user_id, UserId::new("1"));
        assert_eq!(top.minutes, 40);
        assert_eq!(agg.last_updated, Some(end()));
    }

    #[tokio::test]
    async fn duplicate_fold_counts_once() {
        let (store, aggregator) = setup(100);
        let rec = record("1", "VTK", 25);

        settle(&store, &aggregator, &rec).await;
        aggregator.fold_session(&rec).await.unwrap();

        let agg = store.get_monthly_aggregate(month()).unwrap().unwrap();
        assert_eq!(agg.organization_minutes["VTK"], 25);
        assert_eq!(agg.top_individuals.len(), 1);
        assert_eq!(agg.top_individuals[0].minutes, 25);
    }

    #[tokio::test]
    async fn leaderboard_respects_capacity() {
        let (store, aggregator) = setup(3);

        for (user, minutes) in [("1", 10), ("2", 50), ("3", 30), ("4", 20), ("5", 40)] {
            settle(&store, &aggregator, &record(user, "VTK", minutes)).await;
        }

        let agg = store.get_monthly_aggregate(month()).unwrap().unwrap();
        let minutes: Vec<u64> = agg.top_individuals.iter().map(|e| e.minutes).collect();
        assert_eq!(minutes, vec![50, 40, 30]);
    }

    #[tokio::test]
    async fn concurrent_folds_are_serialized() {
        let (store, aggregator) = setup(100);
        let aggregator = Arc::new(aggregator);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let rec = record(&i.to_string(), "Medica", 10);
            store.put_session_record(&rec).unwrap();
            let aggregator = aggregator.clone();
            tasks.push(tokio::spawn(async move {
                aggregator.fold_session(&rec).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let agg = store.get_monthly_aggregate(month()).unwrap().unwrap();
        assert_eq!(agg.organization_minutes["Medica"], 80);
        assert_eq!(agg.top_individuals.len(), 8);
    }

    #[tokio::test]
    async fn report_ranks_and_trims() {
        let (store, aggregator) = setup(100);

        let empty = aggregator.leaderboard(month()).unwrap();
        assert!(!empty.has_data());
        assert!(empty.organizations.is_empty());
        assert!(empty.last_updated.is_none());

        settle(&store, &aggregator, &record("1", "Wina", 25)).await;
        settle(&store, &aggregator, &record("2", "VTK", 50)).await;
        settle(&store, &aggregator, &record("3", "VTK", 5)).await;
        settle(&store, &aggregator, &record("4", "VTK", 1)).await;

        let report = aggregator.leaderboard(month()).unwrap();
        assert!(report.has_data());
        assert_eq!(report.organizations.len(), 2);
        assert_eq!(report.organizations[0].organization, "VTK");
        assert_eq!(report.organizations[0].total_minutes, 56);
        assert_eq!(report.organizations[0].rank, 1);
        assert_eq!(report.organizations[1].organization, "Wina");

        assert_eq!(report.top_individuals.len(), 3);
        assert_eq!(report.top_individuals[0].minutes, 50);
    }
}
