use anyhow::{Context, Result};
use async_trait::async_trait;
use repl_schemas::Coordinate;
use sqlx::{PgConnection, PgPool, Row};

use crate::backing::{LoadOutcome, PositionBacking};
use crate::record::{PersistedState, WorkerRecord};

pub const ENV_DB_URL: &str = "MQK_REPL_DATABASE_URL";

/// Postgres-backed `PositionBacking`, one row per configured primary plus
/// one row per worker. Durability comes from the transaction the caller
/// commits, not from this type calling `fsync` itself.
pub struct TableBacking {
    pool: PgPool,
    primary_id: String,
}

impl TableBacking {
    pub fn new(pool: PgPool, primary_id: impl Into<String>) -> Self {
        Self {
            pool,
            primary_id: primary_id.into(),
        }
    }

    pub async fn connect_from_env(primary_id: impl Into<String>) -> Result<Self> {
        let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self::new(pool, primary_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("position store migrate failed")?;
        Ok(())
    }

    /// Save within a transaction the caller owns, so the position update
    /// commits atomically alongside whatever effect produced it.
    pub async fn save_in_tx(&self, conn: &mut PgConnection, state: &PersistedState) -> Result<()> {
        sqlx::query(
            r#"
            insert into repl_position (primary_id, master_log_file, master_log_pos,
                relay_log_file, relay_log_pos, retrieved_gtids, logged_gtids, updated_at_utc)
            values ($1, $2, $3, $4, $5, $6, $7, now())
            on conflict (primary_id) do update set
                master_log_file = excluded.master_log_file,
                master_log_pos = excluded.master_log_pos,
                relay_log_file = excluded.relay_log_file,
                relay_log_pos = excluded.relay_log_pos,
                retrieved_gtids = excluded.retrieved_gtids,
                logged_gtids = excluded.logged_gtids,
                updated_at_utc = now()
            "#,
        )
        .bind(&self.primary_id)
        .bind(&state.master_coord.file_name)
        .bind(state.master_coord.offset as i64)
        .bind(&state.relay_coord.file_name)
        .bind(state.relay_coord.offset as i64)
        .bind(&state.retrieved_gtids_text)
        .bind(&state.logged_gtids_text)
        .execute(&mut *conn)
        .await
        .context("upsert repl_position failed")?;

        for w in &state.workers {
            sqlx::query(
                r#"
                insert into repl_position_worker (primary_id, worker_id,
                    last_committed_master_log_file, last_committed_master_log_pos,
                    last_committed_relay_log_file, last_committed_relay_log_pos,
                    executed_group_bitmap)
                values ($1, $2, $3, $4, $5, $6, $7)
                on conflict (primary_id, worker_id) do update set
                    last_committed_master_log_file = excluded.last_committed_master_log_file,
                    last_committed_master_log_pos = excluded.last_committed_master_log_pos,
                    last_committed_relay_log_file = excluded.last_committed_relay_log_file,
                    last_committed_relay_log_pos = excluded.last_committed_relay_log_pos,
                    executed_group_bitmap = excluded.executed_group_bitmap
                "#,
            )
            .bind(&self.primary_id)
            .bind(w.id as i32)
            .bind(&w.last_committed_group_master_coord.file_name)
            .bind(w.last_committed_group_master_coord.offset as i64)
            .bind(&w.last_committed_group_relay_coord.file_name)
            .bind(w.last_committed_group_relay_coord.offset as i64)
            .bind(&w.executed_group_bitmap)
            .execute(&mut *conn)
            .await
            .context("upsert repl_position_worker failed")?;
        }
        Ok(())
    }
}

#[async_trait]
impl PositionBacking for TableBacking {
    async fn load(&self) -> Result<LoadOutcome> {
        let row = sqlx::query(
            "select master_log_file, master_log_pos, relay_log_file, relay_log_pos, \
             retrieved_gtids, logged_gtids from repl_position where primary_id = $1",
        )
        .bind(&self.primary_id)
        .fetch_optional(&self.pool)
        .await
        .context("load repl_position failed")?;

        let Some(row) = row else {
            return Ok(LoadOutcome::NotFound);
        };

        let master_coord = Coordinate::new(row.get::<String, _>("master_log_file"), row.get::<i64, _>("master_log_pos") as u64);
        let relay_coord = Coordinate::new(row.get::<String, _>("relay_log_file"), row.get::<i64, _>("relay_log_pos") as u64);

        let worker_rows = sqlx::query(
            "select worker_id, last_committed_master_log_file, last_committed_master_log_pos, \
             last_committed_relay_log_file, last_committed_relay_log_pos, executed_group_bitmap \
             from repl_position_worker where primary_id = $1 order by worker_id",
        )
        .bind(&self.primary_id)
        .fetch_all(&self.pool)
        .await
        .context("load repl_position_worker failed")?;

        let mut workers = Vec::with_capacity(worker_rows.len());
        for wr in worker_rows {
            let mut rec = WorkerRecord::new(wr.get::<i32, _>("worker_id") as u32);
            rec.last_committed_group_master_coord = Coordinate::new(
                wr.get::<String, _>("last_committed_master_log_file"),
                wr.get::<i64, _>("last_committed_master_log_pos") as u64,
            );
            rec.last_committed_group_relay_coord = Coordinate::new(
                wr.get::<String, _>("last_committed_relay_log_file"),
                wr.get::<i64, _>("last_committed_relay_log_pos") as u64,
            );
            rec.executed_group_bitmap = wr.get::<Vec<u8>, _>("executed_group_bitmap");
            workers.push(rec);
        }

        Ok(LoadOutcome::Found(PersistedState {
            master_coord,
            relay_coord,
            retrieved_gtids_text: row.get("retrieved_gtids"),
            logged_gtids_text: row.get("logged_gtids"),
            workers,
        }))
    }

    async fn save(&self, state: &PersistedState, _force: bool) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin position tx")?;
        self.save_in_tx(&mut tx, state).await?;
        tx.commit().await.context("commit position tx")?;
        Ok(())
    }
}
