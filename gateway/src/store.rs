//! C2: the Credential & Quota Store. Abstracted as a `Store` trait so the
//! hot path never cares whether it's talking to Postgres or an in-memory
//! double -- the same split the teacher draws between `Web3ProxyApp` and
//! its `db_conn: Option<DatabaseConnection>`.

use crate::errors::{GatewayError, GatewayResult};
use async_trait::async_trait;
use chrono::{Local, Utc};
use entities::{app, chain};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, Statement,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Outcome of an admission attempt. `Admitted` always carries the
/// post-increment App; the counters have already moved even when the
/// daily-limit check downstream will reject the request (spec.md §4.3,
/// §7 -- the pre-check increment is an intentional atomicity trade-off).
pub enum AdmitOutcome {
    Admitted(app::Model),
    InvalidOrInactive,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Atomically find the App with `api_key` and `active = true`,
    /// increment `total_requests` by one, and roll `daily_requests` over to
    /// `1` (instead of incrementing it) when `last_reset_date` is not today
    /// (local calendar day) -- the rollover is fused into the same atomic
    /// statement as the increment so a request landing on the day boundary
    /// is never counted against the old day and then wiped by a later,
    /// separate reset (spec.md §4.2/§4.3, §8 scenario 5). Never a
    /// read-then-write: concurrent callers must not observe duplicate
    /// counts or bypass the `active` flag.
    async fn find_and_increment_by_api_key(&self, api_key: Uuid) -> GatewayResult<AdmitOutcome>;

    /// If `app.last_reset_date` is not today (local calendar day), zero
    /// `daily_requests` and advance `last_reset_date`, then persist.
    /// Idempotent under concurrency: last-writer-wins is acceptable.
    /// Returns the row as it stands after the call -- re-read, not assumed.
    /// Not used on the admission hot path (the rollover there is fused into
    /// `find_and_increment_by_api_key`); kept for callers that need to
    /// force a reset without also incrementing, e.g. admin tooling.
    async fn reset_daily_if_needed(&self, app_id: i64) -> GatewayResult<app::Model>;

    async fn find_chain(&self, name: &str) -> GatewayResult<Option<chain::Model>>;

    async fn find_chains(&self) -> GatewayResult<Vec<chain::Model>>;

    async fn save_chain(&self, chain: chain::Model) -> GatewayResult<chain::Model>;

    async fn count_apps_by_owner(&self, owner_user_id: i64) -> GatewayResult<u64>;
}

/// Postgres-backed implementation via sea-orm.
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn find_and_increment_by_api_key(&self, api_key: Uuid) -> GatewayResult<AdmitOutcome> {
        // The Postgres equivalent of a document store's find-and-modify:
        // one round trip, increment and lookup fused, `active` enforced in
        // the WHERE clause so a deactivated key can never be admitted by a
        // race with the flip of that flag (spec.md §4.2, §9). The daily
        // rollover is fused into the same statement: a request on the new
        // local day resets `daily_requests` to 1 in this same round trip
        // instead of incrementing a counter that a later, separate reset
        // would then zero out from under it.
        let today = Local::now().date_naive();

        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            r#"UPDATE apps
               SET total_requests = total_requests + 1,
                   daily_requests = CASE WHEN last_reset_date <> $2 THEN 1 ELSE daily_requests + 1 END,
                   last_reset_date = $2,
                   updated_at = now()
               WHERE api_key = $1 AND active = true
               RETURNING *"#,
            [api_key.into(), today.into()],
        );

        let row = self.db.query_one(stmt).await.map_err(GatewayError::Database)?;

        match row {
            Some(row) => {
                let model = app::Model::from_query_result(&row, "")
                    .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)))?;
                Ok(AdmitOutcome::Admitted(model))
            }
            None => Ok(AdmitOutcome::InvalidOrInactive),
        }
    }

    async fn reset_daily_if_needed(&self, app_id: i64) -> GatewayResult<app::Model> {
        let today = Local::now().date_naive();

        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            r#"UPDATE apps
               SET daily_requests = 0,
                   last_reset_date = $2,
                   updated_at = now()
               WHERE id = $1 AND last_reset_date <> $2
               RETURNING *"#,
            [app_id.into(), today.into()],
        );

        // Idempotent: a concurrent caller that loses the race simply finds
        // `last_reset_date = today` already and the WHERE clause excludes
        // it, so it falls through to the plain re-read below.
        if let Some(row) = self.db.query_one(stmt).await.map_err(GatewayError::Database)? {
            return app::Model::from_query_result(&row, "")
                .map_err(|e| GatewayError::Internal(anyhow::anyhow!(e)));
        }

        app::Entity::find_by_id(app_id)
            .one(&self.db)
            .await
            .map_err(GatewayError::Database)?
            .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("app {app_id} vanished mid-reset")))
    }

    async fn find_chain(&self, name: &str) -> GatewayResult<Option<chain::Model>> {
        chain::Entity::find()
            .filter(chain::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(GatewayError::Database)
    }

    async fn find_chains(&self) -> GatewayResult<Vec<chain::Model>> {
        chain::Entity::find().all(&self.db).await.map_err(GatewayError::Database)
    }

    async fn save_chain(&self, model: chain::Model) -> GatewayResult<chain::Model> {
        use sea_orm::{ActiveModelTrait, IntoActiveModel};

        model
            .into_active_model()
            .save(&self.db)
            .await
            .map_err(GatewayError::Database)
            .and_then(|am| am.try_into_model().map_err(|e| GatewayError::Internal(anyhow::anyhow!(e))))
    }

    async fn count_apps_by_owner(&self, owner_user_id: i64) -> GatewayResult<u64> {
        app::Entity::find()
            .filter(app::Column::OwnerUserId.eq(owner_user_id))
            .count(&self.db)
            .await
            .map_err(GatewayError::Database)
    }
}

/// In-memory double used by the test suite and by `--no-database` mode.
/// Admin CRUD and persistence schema are out of scope for this core, so
/// this stands in for "something owns canonical App/Chain state" without
/// requiring a live Postgres.
pub struct InMemoryStore {
    apps: parking_lot::Mutex<HashMap<Uuid, app::Model>>,
    chains: parking_lot::Mutex<HashMap<String, chain::Model>>,
    next_app_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            apps: parking_lot::Mutex::new(HashMap::new()),
            chains: parking_lot::Mutex::new(HashMap::new()),
            next_app_id: AtomicI64::new(1),
        }
    }

    /// Seed an App. Returns the assigned id.
    pub fn insert_app(&self, mut model: app::Model) -> i64 {
        if model.id == 0 {
            model.id = self.next_app_id.fetch_add(1, Ordering::Relaxed);
        }
        let key = model.api_key;
        let id = model.id;
        self.apps.lock().insert(key, model);
        id
    }

    pub fn insert_chain(&self, model: chain::Model) {
        self.chains.lock().insert(model.name.to_lowercase(), model);
    }

    pub fn app_by_id(&self, id: i64) -> Option<app::Model> {
        self.apps.lock().values().find(|a| a.id == id).cloned()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_and_increment_by_api_key(&self, api_key: Uuid) -> GatewayResult<AdmitOutcome> {
        let today = Local::now().date_naive();
        let mut apps = self.apps.lock();
        match apps.get_mut(&api_key) {
            Some(app) if app.active => {
                app.total_requests += 1;
                if app.last_reset_date != today {
                    app.daily_requests = 1;
                    app.last_reset_date = today;
                } else {
                    app.daily_requests += 1;
                }
                app.updated_at = Utc::now();
                Ok(AdmitOutcome::Admitted(app.clone()))
            }
            _ => Ok(AdmitOutcome::InvalidOrInactive),
        }
    }

    async fn reset_daily_if_needed(&self, app_id: i64) -> GatewayResult<app::Model> {
        let today = Local::now().date_naive();
        let mut apps = self.apps.lock();
        let app = apps
            .values_mut()
            .find(|a| a.id == app_id)
            .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("app {app_id} not found")))?;

        if app.last_reset_date != today {
            app.daily_requests = 0;
            app.last_reset_date = today;
            app.updated_at = Utc::now();
        }

        Ok(app.clone())
    }

    async fn find_chain(&self, name: &str) -> GatewayResult<Option<chain::Model>> {
        Ok(self.chains.lock().get(&name.to_lowercase()).cloned())
    }

    async fn find_chains(&self) -> GatewayResult<Vec<chain::Model>> {
        Ok(self.chains.lock().values().cloned().collect())
    }

    async fn save_chain(&self, model: chain::Model) -> GatewayResult<chain::Model> {
        self.chains.lock().insert(model.name.to_lowercase(), model.clone());
        Ok(model)
    }

    async fn count_apps_by_owner(&self, owner_user_id: i64) -> GatewayResult<u64> {
        Ok(self
            .apps
            .lock()
            .values()
            .filter(|a| a.owner_user_id == owner_user_id)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_app(api_key: Uuid) -> app::Model {
        app::Model {
            id: 0,
            owner_user_id: 1,
            name: "test".into(),
            description: None,
            api_key,
            chain_name: "sepolia".into(),
            chain_id: "11155111".into(),
            max_rps: 10,
            daily_requests_limit: 1000,
            total_requests: 0,
            daily_requests: 0,
            last_reset_date: Local::now().date_naive(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn increment_is_atomic_per_call_and_rejects_inactive() {
        let store = InMemoryStore::new();
        let key = Uuid::new_v4();
        let mut app = sample_app(key);
        app.active = false;
        store.insert_app(app);

        match store.find_and_increment_by_api_key(key).await.unwrap() {
            AdmitOutcome::InvalidOrInactive => {}
            AdmitOutcome::Admitted(_) => panic!("inactive key must not be admitted"),
        }
    }

    #[tokio::test]
    async fn increment_bumps_both_counters_together() {
        let store = InMemoryStore::new();
        let key = Uuid::new_v4();
        store.insert_app(sample_app(key));

        for expected in 1..=3 {
            match store.find_and_increment_by_api_key(key).await.unwrap() {
                AdmitOutcome::Admitted(app) => {
                    assert_eq!(app.total_requests, expected);
                    assert_eq!(app.daily_requests, expected);
                }
                AdmitOutcome::InvalidOrInactive => panic!("active key must be admitted"),
            }
        }
    }

    #[tokio::test]
    async fn increment_rolls_daily_requests_over_to_one_on_a_new_local_day() {
        // spec.md §8 scenario 5: the first request on a new day must
        // observe `dailyRequests == 1`, not `0` then `1` nor `N+1` carried
        // over from the stale day -- the rollover has to be fused into the
        // same atomic step as the increment.
        let store = InMemoryStore::new();
        let key = Uuid::new_v4();
        let mut app = sample_app(key);
        app.daily_requests = 3;
        app.daily_requests_limit = 3;
        app.last_reset_date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().date_naive();
        store.insert_app(app);

        match store.find_and_increment_by_api_key(key).await.unwrap() {
            AdmitOutcome::Admitted(app) => {
                assert_eq!(app.daily_requests, 1);
                assert_eq!(app.total_requests, 1);
                assert_eq!(app.last_reset_date, Local::now().date_naive());
            }
            AdmitOutcome::InvalidOrInactive => panic!("active key must be admitted"),
        }
    }

    #[tokio::test]
    async fn unknown_key_is_invalid_or_inactive() {
        let store = InMemoryStore::new();
        match store.find_and_increment_by_api_key(Uuid::new_v4()).await.unwrap() {
            AdmitOutcome::InvalidOrInactive => {}
            AdmitOutcome::Admitted(_) => panic!("unknown key must not be admitted"),
        }
    }

    #[tokio::test]
    async fn reset_daily_if_needed_is_idempotent_within_a_day() {
        let store = InMemoryStore::new();
        let key = Uuid::new_v4();
        let mut app = sample_app(key);
        app.daily_requests = 42;
        app.last_reset_date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().date_naive();
        let id = store.insert_app(app);

        let after_first = store.reset_daily_if_needed(id).await.unwrap();
        assert_eq!(after_first.daily_requests, 0);
        assert_eq!(after_first.last_reset_date, Local::now().date_naive());

        let after_second = store.reset_daily_if_needed(id).await.unwrap();
        assert_eq!(after_second.daily_requests, 0);
        assert_eq!(after_second.last_reset_date, after_first.last_reset_date);
    }

    #[tokio::test]
    async fn reset_daily_if_needed_leaves_same_day_counters_untouched() {
        let store = InMemoryStore::new();
        let key = Uuid::new_v4();
        let mut app = sample_app(key);
        app.daily_requests = 7;
        let id = store.insert_app(app);

        let after = store.reset_daily_if_needed(id).await.unwrap();
        assert_eq!(after.daily_requests, 7);
    }
}
