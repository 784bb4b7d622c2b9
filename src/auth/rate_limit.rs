// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-source-address token bucket for the login endpoint.
//!
//! Process-local: state resets on restart and is not shared between
//! instances. Idle entries are pruned by [`RateLimiter::run_pruner`].

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use super::AuthError;
use crate::state::AppState;

/// How often idle buckets are swept.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Buckets untouched for this long are dropped.
pub const IDLE_TTL: Duration = Duration::from_secs(180);

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    /// Bucket capacity
    burst: f64,
    /// Tokens regained per second
    refill_per_sec: f64,
}

impl RateLimiter {
    /// Allow `requests` per `window`, all of which may be spent at once.
    pub fn new(requests: u32, window: Duration) -> Self {
        let window_secs = window.as_secs_f64().max(f64::EPSILON);
        Self {
            buckets: Mutex::new(HashMap::new()),
            burst: f64::from(requests),
            refill_per_sec: f64::from(requests) / window_secs,
        }
    }

    /// Take one token for `ip`. Returns `false` when the bucket is empty.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else {
            // A poisoned limiter fails closed
            return false;
        };
        let bucket = buckets.entry(ip).or_insert(TokenBucket {
            tokens: self.burst,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than [`IDLE_TTL`]. Returns how many were
    /// removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> usize {
        let Ok(mut buckets) = self.buckets.lock() else {
            return 0;
        };
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= IDLE_TTL);
        before - buckets.len()
    }

    pub fn tracked(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Prune every [`PRUNE_INTERVAL`] until `shutdown` fires.
    pub async fn run_pruner(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Rate limiter pruner stopped");
                    return;
                }
                _ = interval.tick() => {
                    let removed = self.prune();
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned idle rate limit buckets");
                    }
                }
            }
        }
    }
}

/// Middleware applying the login limiter.
///
/// The source address comes from the connection; requests without one
/// (in-process tests) share a single bucket.
pub async fn limit_login(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !state.login_limiter.check(ip) {
        tracing::warn!(ip = %ip, "Login rate limit exceeded");
        return AuthError::TooManyRequests.into_response();
    }
    next.run(request).await
}
