use crate::{JobDelivery, Result, TrackingQueue};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracker_core::TrackingJob;

const QUEUE_KEY: &str = "wallet_track_queue";
const PROCESSING_KEY: &str = "wallet_track_queue:processing";
const DELAYED_KEY: &str = "wallet_track_queue:delayed";

/// Redis-backed tracking job queue.
///
/// Deliveries move from the main list into a processing list atomically, so
/// a consumer crash between delivery and acknowledgement leaves the payload
/// recoverable. Deferred jobs sit in a sorted set scored by their due time
/// and are promoted onto the main list by the consumer loop.
#[derive(Debug, Clone)]
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;

        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Job queue connected to Redis");
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn queue_size(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        let size: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(size)
    }
}

#[async_trait]
impl TrackingQueue for JobQueue {
    async fn publish(&self, job: &TrackingJob) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection().await?;
        let _: () = conn.lpush(QUEUE_KEY, &payload).await?;
        debug!(
            "Published tracking job for {} on {}",
            job.wallet_address, job.blockchain
        );
        Ok(())
    }

    async fn publish_delayed(&self, job: &TrackingJob, delay: Duration) -> Result<()> {
        let payload = serde_json::to_string(job)?;
        let due_at = Utc::now().timestamp() + delay.as_secs() as i64;
        let mut conn = self.connection().await?;
        let _: () = conn.zadd(DELAYED_KEY, &payload, due_at).await?;
        debug!(
            "Scheduled tracking job for {} on {} in {}s",
            job.wallet_address,
            job.blockchain,
            delay.as_secs()
        );
        Ok(())
    }

    async fn next_delivery(&self, timeout: Duration) -> Result<Option<JobDelivery>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(QUEUE_KEY)
            .arg(PROCESSING_KEY)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match serde_json::from_str::<TrackingJob>(&payload) {
            Ok(job) => Ok(Some(JobDelivery { job, payload })),
            Err(e) => {
                // Unparseable payloads are dropped, not redelivered forever.
                warn!("Discarding malformed queue payload: {}", e);
                let _: () = conn.lrem(PROCESSING_KEY, 1, &payload).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &JobDelivery) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.lrem(PROCESSING_KEY, 1, &delivery.payload).await?;
        Ok(())
    }

    async fn nack(&self, delivery: &JobDelivery) -> Result<()> {
        // Remove from processing and put back at the head of the queue in
        // one atomic step, so the payload never exists in both lists.
        let script = redis::Script::new(
            r#"
            redis.call('LREM', KEYS[1], 1, ARGV[1])
            redis.call('RPUSH', KEYS[2], ARGV[1])
            return 1
            "#,
        );
        let mut conn = self.connection().await?;
        let _: i64 = script
            .key(PROCESSING_KEY)
            .key(QUEUE_KEY)
            .arg(&delivery.payload)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn promote_due_jobs(&self) -> Result<u64> {
        let script = redis::Script::new(
            r#"
            local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
            for _, payload in ipairs(due) do
                redis.call('LPUSH', KEYS[2], payload)
                redis.call('ZREM', KEYS[1], payload)
            end
            return #due
            "#,
        );
        let mut conn = self.connection().await?;
        let promoted: u64 = script
            .key(DELAYED_KEY)
            .key(QUEUE_KEY)
            .arg(Utc::now().timestamp())
            .invoke_async(&mut conn)
            .await?;
        if promoted > 0 {
            debug!("Promoted {} due jobs onto the live queue", promoted);
        }
        Ok(promoted)
    }

    async fn recover_stranded(&self) -> Result<u64> {
        let script = redis::Script::new(
            r#"
            local moved = 0
            while true do
                local payload = redis.call('RPOPLPUSH', KEYS[1], KEYS[2])
                if not payload then
                    break
                end
                moved = moved + 1
            end
            return moved
            "#,
        );
        let mut conn = self.connection().await?;
        let recovered: u64 = script
            .key(PROCESSING_KEY)
            .key(QUEUE_KEY)
            .invoke_async(&mut conn)
            .await?;
        if recovered > 0 {
            info!("Recovered {} stranded deliveries from a previous run", recovered);
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::Chain;

    // Queue tests need a live Redis instance; they are skipped unless
    // REDIS_URL is set.
    async fn test_queue() -> Option<JobQueue> {
        let url = std::env::var("REDIS_URL").ok()?;
        JobQueue::new(&url).await.ok()
    }

    #[tokio::test]
    async fn delivery_round_trip_with_ack() {
        let Some(queue) = test_queue().await else {
            return;
        };

        let job = TrackingJob::new(
            format!("0xqueue_test_{}", std::process::id()),
            Chain::Sui,
            Some(42),
        );
        queue.publish(&job).await.unwrap();

        let delivery = queue
            .next_delivery(Duration::from_secs(2))
            .await
            .unwrap()
            .expect("published job should be deliverable");
        assert_eq!(delivery.job.wallet_address, job.wallet_address);
        assert_eq!(delivery.job.from_block, Some(42));

        queue.ack(&delivery).await.unwrap();
    }

    #[tokio::test]
    async fn nacked_delivery_is_redelivered() {
        let Some(queue) = test_queue().await else {
            return;
        };

        let job = TrackingJob::new(
            format!("0xnack_test_{}", std::process::id()),
            Chain::Aptos,
            None,
        );
        queue.publish(&job).await.unwrap();

        let first = queue
            .next_delivery(Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        queue.nack(&first).await.unwrap();

        let second = queue
            .next_delivery(Duration::from_secs(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.job.wallet_address, job.wallet_address);
        queue.ack(&second).await.unwrap();
    }
}
