//! SQLite-based store implementation

use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use studyhall_api::StorageStats;
use studyhall_util::{MonthId, UserId};
use tracing::{debug, warn};

use crate::{MonthlyAggregate, SessionRecord, Store, StoreError, StoreResult, UserProfile};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Settled session records (append-only)
            CREATE TABLE IF NOT EXISTS session_records (
                record_key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            -- Monthly aggregates (one row per YYYY-MM)
            CREATE TABLE IF NOT EXISTS monthly_aggregates (
                month TEXT PRIMARY KEY,
                last_updated TEXT NOT NULL,
                aggregate_json TEXT NOT NULL
            );

            -- Organization choices
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                organization TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_records_user_month
                ON session_records(user_id, year, month);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", s, e)))
}

impl Store for SqliteStore {
    fn put_session_record(&self, record: &SessionRecord) -> StoreResult<bool> {
        let conn = self.conn()?;
        let record_json = serde_json::to_string(record)?;

        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO session_records
                (record_key, user_id, year, month, recorded_at, record_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.record_key,
                record.user_id.as_str(),
                record.year,
                record.month,
                record.recorded_at.to_rfc3339(),
                record_json
            ],
        )? > 0;

        if inserted {
            debug!(
                record_key = %record.record_key,
                minutes = record.duration_minutes,
                "Session record written"
            );
        } else {
            warn!(record_key = %record.record_key, "Session record already exists");
        }
        Ok(inserted)
    }

    fn get_session_records(
        &self,
        user_id: &UserId,
        year: Option<i32>,
        month: Option<u32>,
    ) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT record_json FROM session_records
            WHERE user_id = ?1
              AND (?2 IS NULL OR year = ?2)
              AND (?3 IS NULL OR month = ?3)
            ORDER BY recorded_at
            "#,
        )?;

        let rows = stmt.query_map(params![user_id.as_str(), year, month], |row| {
            row.get::<_, String>(0)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn get_monthly_aggregate(&self, month: MonthId) -> StoreResult<Option<MonthlyAggregate>> {
        let conn = self.conn()?;

        let json: Option<String> = conn
            .query_row(
                "SELECT aggregate_json FROM monthly_aggregates WHERE month = ?",
                [month.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    fn put_monthly_aggregate(&self, aggregate: &MonthlyAggregate) -> StoreResult<()> {
        let mut stamped = aggregate.clone();
        let updated = *stamped.last_updated.get_or_insert_with(studyhall_util::now);

        let conn = self.conn()?;
        let json = serde_json::to_string(&stamped)?;

        conn.execute(
            r#"
            INSERT INTO monthly_aggregates (month, last_updated, aggregate_json)
            VALUES (?, ?, ?)
            ON CONFLICT(month)
            DO UPDATE SET last_updated = excluded.last_updated,
                          aggregate_json = excluded.aggregate_json
            "#,
            params![stamped.month.to_string(), updated.to_rfc3339(), json],
        )?;

        debug!(month = %stamped.month, "Monthly aggregate saved");
        Ok(())
    }

    fn get_user_profile(&self, user_id: &UserId) -> StoreResult<Option<UserProfile>> {
        let conn = self.conn()?;

        let row: Option<(String, String, String, String)> = conn
            .query_row(
                r#"
                SELECT username, organization, joined_at, last_updated
                FROM user_profiles WHERE user_id = ?
                "#,
                [user_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(username, organization, joined_at, last_updated)| -> StoreResult<UserProfile> {
            Ok(UserProfile {
                user_id: user_id.clone(),
                username,
                organization,
                joined_at: parse_timestamp(&joined_at)?,
                last_updated: parse_timestamp(&last_updated)?,
            })
        })
        .transpose()
    }

    fn put_user_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO user_profiles (user_id, username, organization, joined_at, last_updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id)
            DO UPDATE SET username = excluded.username,
                          organization = excluded.organization,
                          last_updated = excluded.last_updated
            "#,
            params![
                profile.user_id.as_str(),
                profile.username,
                profile.organization,
                profile.joined_at.to_rfc3339(),
                profile.last_updated.to_rfc3339()
            ],
        )?;

        debug!(user_id = %profile.user_id, organization = %profile.organization, "User profile saved");
        Ok(())
    }

    fn storage_stats(&self) -> StoreResult<StorageStats> {
        let conn = self.conn()?;

        let total_sessions: i64 =
            conn.query_row("SELECT COUNT(*) FROM session_records", [], |row| row.get(0))?;
        let total_users: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM (
                SELECT user_id FROM session_records
                UNION
                SELECT user_id FROM user_profiles
            )
            "#,
            [],
            |row| row.get(0),
        )?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;

        Ok(StorageStats {
            total_sessions: total_sessions as u64,
            total_users: total_users as u64,
            disk_usage_bytes: (page_count * page_size) as u64,
        })
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewSessionRecord;
    use chrono::TimeZone;
    use studyhall_api::LeaderboardEntry;
    use studyhall_util::{ChannelId, SessionId};

    fn record(user: &str, minutes: u32, end: DateTime<Local>) -> SessionRecord {
        NewSessionRecord {
            session_id: SessionId::new(),
            user_id: UserId::new(user),
            username: format!("user-{}", user),
            organization: "VTK".into(),
            joined_at: end - chrono::Duration::minutes(minutes as i64),
            study_end: end,
            minutes,
            channel_id: ChannelId::new("1"),
            channel_name: "Library".into(),
            late_join: false,
        }
        .into_record(end)
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_session_records() {
        let store = SqliteStore::in_memory().unwrap();
        let march = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let april = Local.with_ymd_and_hms(2025, 4, 2, 12, 0, 0).unwrap();

        store.put_session_record(&record("1", 25, march)).unwrap();
        store.put_session_record(&record("1", 15, april)).unwrap();
        store.put_session_record(&record("2", 25, march)).unwrap();

        let user = UserId::new("1");
        assert_eq!(store.get_session_records(&user, None, None).unwrap().len(), 2);

        let in_march = store.get_session_records(&user, Some(2025), Some(3)).unwrap();
        assert_eq!(in_march.len(), 1);
        assert_eq!(in_march[0].duration_minutes, 25);

        assert!(store.get_session_records(&user, Some(2024), None).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_record_is_ignored() {
        let store = SqliteStore::in_memory().unwrap();
        let end = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let rec = record("1", 25, end);

        assert!(store.put_session_record(&rec).unwrap());
        assert!(!store.put_session_record(&rec).unwrap());

        let records = store.get_session_records(&rec.user_id, None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], rec);
    }

    #[test]
    fn test_monthly_aggregate() {
        let store = SqliteStore::in_memory().unwrap();
        let month = MonthId::new(2025, 3).unwrap();

        assert!(store.get_monthly_aggregate(month).unwrap().is_none());

        let mut agg = MonthlyAggregate::new(month, &["VTK", "Wina"]);
        agg.organization_minutes.insert("VTK".into(), 40);
        agg.top_individuals.push(LeaderboardEntry {
            user_id: UserId::new("1"),
            username: "ada".into(),
            organization: "VTK".into(),
            minutes: 40,
        });

        store.put_monthly_aggregate(&agg).unwrap();
        let loaded = store.get_monthly_aggregate(month).unwrap().unwrap();
        assert_eq!(loaded.organization_minutes["VTK"], 40);
        assert_eq!(loaded.top_individuals.len(), 1);
        assert!(loaded.last_updated.is_some());

        // Full overwrite, keeping the caller's stamp
        let stamp = Local.with_ymd_and_hms(2025, 3, 10, 12, 25, 0).unwrap();
        agg.organization_minutes.insert("VTK".into(), 65);
        agg.last_updated = Some(stamp);
        store.put_monthly_aggregate(&agg).unwrap();
        let loaded = store.get_monthly_aggregate(month).unwrap().unwrap();
        assert_eq!(loaded.organization_minutes["VTK"], 65);
        assert_eq!(loaded.last_updated, Some(stamp));
    }

    #[test]
    fn test_user_profile_keeps_join_date() {
        let store = SqliteStore::in_memory().unwrap();
        let user = UserId::new("9");
        assert!(store.get_user_profile(&user).unwrap().is_none());

        let joined = Local.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let later = Local.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap();

        store
            .put_user_profile(&UserProfile {
                user_id: user.clone(),
                username: "lin".into(),
                organization: "Wina".into(),
                joined_at: joined,
                last_updated: joined,
            })
            .unwrap();
        store
            .put_user_profile(&UserProfile {
                user_id: user.clone(),
                username: "lin".into(),
                organization: "Medica".into(),
                joined_at: later,
                last_updated: later,
            })
            .unwrap();

        let profile = store.get_user_profile(&user).unwrap().unwrap();
        assert_eq!(profile.organization, "Medica");
        assert_eq!(profile.joined_at, joined);
        assert_eq!(profile.last_updated, later);
    }

    #[test]
    fn test_storage_stats() {
        let store = SqliteStore::in_memory().unwrap();
        let end = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        store.put_session_record(&record("1", 25, end)).unwrap();
        store.put_session_record(&record("1", 25, end)).unwrap();
        store.put_session_record(&record("2", 10, end)).unwrap();

        let stats = store.storage_stats().unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.total_users, 2);
        assert!(stats.disk_usage_bytes > 0);
    }

    #[test]
    fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studyhall.db");
        let end = Local.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_session_record(&record("1", 25, end)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let records = store.get_session_records(&UserId::new("1"), None, None).unwrap();
        assert_eq!(records.len(), 1);
    }
}
