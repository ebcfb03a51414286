//! Token-bucket rate limiter
//!
//! One limiter instance is shared by every outbound call of a run. The bucket
//! state is owned by a single actor task; callers only hold a cheap handle and
//! talk to the actor over a channel, so grant decisions are serialized without
//! any lock around the token count.
//!
//! Grants are issued strictly in the order `acquire` was called. A caller that
//! gives up while queued (dropped future or cancellation token) never consumes
//! a token.

use crate::error::AppError;
use governor::clock::{Clock, Reference};
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{NotUntil, Quota};
use std::num::NonZeroU32;
use std::ops::Add;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors returned while waiting for a token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The caller's cancellation token fired before a token was granted
    #[error("Token acquisition cancelled")]
    Cancelled,

    /// The limiter was shut down before a token was granted
    #[error("Rate limiter has been shut down")]
    Shutdown,
}

/// Limiter settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Steady refill rate in tokens per second
    pub rate_per_second: u32,
    /// Maximum number of tokens the bucket holds (burst size)
    pub capacity: u32,
    /// Tokens added per refill tick
    pub refill_amount: u32,
}

impl LimiterConfig {
    /// Limiter with the given rate, no burst and one token per tick
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            rate_per_second,
            capacity: 1,
            refill_amount: 1,
        }
    }

    /// Set the bucket capacity
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set how many tokens are added per refill tick
    pub fn with_refill_amount(mut self, refill_amount: u32) -> Self {
        self.refill_amount = refill_amount;
        self
    }

    /// Time between two refill ticks
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refill_amount)) / self.rate_per_second.max(1)
    }

    /// Time in which one token is earned at the steady rate
    fn cell_interval(&self) -> Duration {
        Duration::from_secs(1) / self.rate_per_second.max(1)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), AppError> {
        if self.rate_per_second == 0 {
            return Err(AppError::InvalidConfig(
                "limiter rate must be > 0 tokens per second".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(AppError::InvalidConfig("limiter capacity must be > 0".into()));
        }
        if self.refill_amount == 0 || self.refill_amount > self.capacity {
            return Err(AppError::InvalidConfig(format!(
                "limiter refill amount must be between 1 and the capacity ({})",
                self.capacity
            )));
        }
        if self.cell_interval().is_zero() {
            return Err(AppError::InvalidConfig(
                "limiter rate is too high for nanosecond refill ticks".into(),
            ));
        }
        Ok(())
    }
}

/// Governor clock on tokio's time source, so grants follow a paused test clock
#[derive(Debug, Clone, Copy, Default)]
struct TokioClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TokioInstant(Instant);

impl Add<Nanos> for TokioInstant {
    type Output = Self;

    fn add(self, rhs: Nanos) -> Self {
        TokioInstant(self.0 + Duration::from(rhs))
    }
}

impl Reference for TokioInstant {
    fn duration_since(&self, earlier: Self) -> Nanos {
        self.0.saturating_duration_since(earlier.0).into()
    }

    fn saturating_sub(&self, duration: Nanos) -> Self {
        self.0
            .checked_sub(duration.into())
            .map(TokioInstant)
            .unwrap_or(*self)
    }
}

impl Clock for TokioClock {
    type Instant = TokioInstant;

    fn now(&self) -> Self::Instant {
        TokioInstant(Instant::now())
    }
}

type Cells = governor::RateLimiter<
    NotKeyed,
    InMemoryState,
    TokioClock,
    governor::middleware::NoOpMiddleware<TokioInstant>,
>;

#[derive(Debug)]
struct Waiter {
    reply: oneshot::Sender<()>,
}

/// Owner of the bucket; the only place tokens are counted
struct BucketActor {
    cells: Cells,
    clock: TokioClock,
    started: Instant,
    refill_interval: Duration,
    refill_amount: u32,
    queue: mpsc::UnboundedReceiver<Waiter>,
    shutdown: CancellationToken,
}

impl BucketActor {
    fn new(
        config: &LimiterConfig,
        queue: mpsc::UnboundedReceiver<Waiter>,
        shutdown: CancellationToken,
    ) -> Result<Self, AppError> {
        let invalid = || AppError::InvalidConfig("limiter rate is too high".into());
        let burst = NonZeroU32::new(config.capacity).ok_or_else(invalid)?;
        let quota = Quota::with_period(config.cell_interval())
            .ok_or_else(invalid)?
            .allow_burst(burst);
        let clock = TokioClock;

        Ok(Self {
            cells: governor::RateLimiter::direct_with_clock(quota, clock),
            clock,
            started: Instant::now(),
            refill_interval: config.refill_interval(),
            refill_amount: config.refill_amount,
            queue,
            shutdown,
        })
    }

    /// When a token denied now may be retried
    ///
    /// Tokens refilled in chunks only show up on refill ticks counted from
    /// the limiter start.
    fn retry_at(&self, not_until: &NotUntil<TokioInstant>) -> Instant {
        let ready = Instant::now() + not_until.wait_time_from(self.clock.now());
        if self.refill_amount == 1 {
            return ready;
        }

        let interval = self.refill_interval.as_nanos();
        let elapsed = ready.saturating_duration_since(self.started).as_nanos();
        u64::try_from(elapsed.div_ceil(interval) * interval)
            .map(|nanos| self.started + Duration::from_nanos(nanos))
            .unwrap_or(ready)
    }

    async fn run(mut self) {
        loop {
            let mut waiter = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.queue.recv() => match next {
                    Some(waiter) => waiter,
                    None => break,
                },
            };

            // wait for a token or for the head waiter to go away
            let mut abandoned = false;
            loop {
                if waiter.reply.is_closed() {
                    abandoned = true;
                    break;
                }
                let not_until = match self.cells.check() {
                    Ok(()) => break,
                    Err(not_until) => not_until,
                };
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {
                        self.queue.close();
                        return;
                    }
                    _ = waiter.reply.closed() => {
                        abandoned = true;
                        break;
                    }
                    _ = sleep_until(self.retry_at(&not_until)) => {}
                }
            }

            if abandoned {
                continue;
            }

            // a waiter leaving between the check and the send costs one token
            if waiter.reply.send(()).is_err() {
                debug!("Waiter left after its token was taken");
            }
        }

        self.queue.close();
        debug!("Rate limiter stopped");
    }
}

/// Handle to the shared token bucket
///
/// Cloning the handle is cheap; all clones share one bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    queue: mpsc::UnboundedSender<Waiter>,
    shutdown: CancellationToken,
    config: LimiterConfig,
}

impl RateLimiter {
    /// Start the limiter actor
    ///
    /// Must be called from within a Tokio runtime. The bucket starts full.
    pub fn new(config: LimiterConfig) -> Result<Self, AppError> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let actor = BucketActor::new(&config, rx, shutdown.clone())?;

        debug!(
            rate_per_second = config.rate_per_second,
            capacity = config.capacity,
            refill_amount = config.refill_amount,
            "Starting rate limiter"
        );
        tokio::spawn(actor.run());

        Ok(Self {
            queue: tx,
            shutdown,
            config,
        })
    }

    /// The limiter settings
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Wait until a token is granted, then consume it
    ///
    /// Dropping the returned future before it resolves gives up the place in
    /// the queue without consuming a token.
    pub async fn acquire(&self) -> Result<(), AcquireError> {
        self.enqueue()?
            .await
            .map_err(|_| AcquireError::Shutdown)
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires
    ///
    /// A token granted before the cancellation is observed is kept and
    /// reported as `Ok`.
    pub async fn acquire_with_cancel(&self, cancel: &CancellationToken) -> Result<(), AcquireError> {
        let granted = self.enqueue()?;
        wait_for_grant(granted, cancel).await
    }

    fn enqueue(&self) -> Result<oneshot::Receiver<()>, AcquireError> {
        let (reply, granted) = oneshot::channel();
        self.queue
            .send(Waiter { reply })
            .map_err(|_| AcquireError::Shutdown)?;
        Ok(granted)
    }

    /// Stop granting tokens
    ///
    /// Every queued and future `acquire` resolves with
    /// [`AcquireError::Shutdown`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn wait_for_grant(
    mut granted: oneshot::Receiver<()>,
    cancel: &CancellationToken,
) -> Result<(), AcquireError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        result = &mut granted => return result.map_err(|_| AcquireError::Shutdown),
    }
    granted.try_recv().map_err(|_| AcquireError::Cancelled)
}
