//! Redis-backed queue store.
//!
//! Key scheme: pending jobs are a list at `<namespace>:tasks`, results are
//! single-element lists at `<namespace>:results:<job_id>` with an expiry.
//! The atomic `BLPOP`/`LPOP` pops give the single-delivery guarantee: a job
//! or result handed to one caller is never handed to a second one.

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;

use guildest_common::{AppError, AppResult};

use super::{result_key, tasks_key, QueueStore};
use crate::job::{Job, JobResult};

/// Queue store backed by a shared Redis instance.
#[derive(Clone)]
pub struct RedisQueueStore {
    client: redis::Client,
    conn: ConnectionManager,
}

fn backend_err(e: &redis::RedisError) -> AppError {
    AppError::BackendUnavailable(e.to_string())
}

impl RedisQueueStore {
    /// Connect to the Redis backend at `url`.
    ///
    /// Fails fast (bounded retries, short connect timeout) so startup can
    /// decide on a fallback without stalling.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = redis::Client::open(url).map_err(|e| backend_err(&e))?;

        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(2)
            .set_connection_timeout(Duration::from_secs(2))
            .set_response_timeout(Duration::from_secs(10));

        let conn = ConnectionManager::new_with_config(client.clone(), config)
            .await
            .map_err(|e| backend_err(&e))?;

        Ok(Self { client, conn })
    }
}

#[async_trait::async_trait]
impl QueueStore for RedisQueueStore {
    async fn push(&self, namespace: &str, job: &Job) -> AppResult<()> {
        let raw = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .rpush(tasks_key(namespace), raw)
            .await
            .map_err(|e| backend_err(&e))?;
        Ok(())
    }

    async fn pop(&self, namespace: &str, timeout: Duration) -> AppResult<Option<Job>> {
        // Blocking commands get a dedicated connection: BLPOP on the shared
        // multiplexed connection would stall every other command behind it.
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| backend_err(&e))?;

        let reply: Option<(String, String)> = conn
            .blpop(tasks_key(namespace), timeout.as_secs_f64())
            .await
            .map_err(|e| backend_err(&e))?;

        match reply {
            None => Ok(None),
            Some((_, raw)) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    async fn put_result(
        &self,
        namespace: &str,
        job_id: &str,
        result: &JobResult,
        ttl: Duration,
    ) -> AppResult<()> {
        let raw = serde_json::to_string(result)?;
        let key = result_key(namespace, job_id);
        let ttl_secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .rpush(&key, raw)
            .ignore()
            .expire(&key, ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| backend_err(&e))?;

        Ok(())
    }

    async fn get_result(&self, namespace: &str, job_id: &str) -> AppResult<Option<JobResult>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .lpop(result_key(namespace, job_id), None)
            .await
            .map_err(|e| backend_err(&e))?;

        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| backend_err(&e))?;
        Ok(())
    }
}
