//! Weighted sliding-window rate limiting for exchange REST calls.
//!
//! Each connector owns one [`RateLimiter`] sized to its venue's published
//! request-weight budget, kept below the official maximum.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

/// Fraction of the published limit we allow ourselves to use.
const SAFETY_MARGIN: f32 = 0.80;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_weight_per_window: u32,
    pub window_duration: Duration,
    pub max_concurrent: usize,
}

impl RateLimitConfig {
    /// Builds a config at `SAFETY_MARGIN` of an exchange's published limit.
    pub fn for_exchange(published_limit: u32, window: Duration, max_concurrent: usize) -> Self {
        Self {
            max_weight_per_window: ((published_limit as f32 * SAFETY_MARGIN) as u32).max(1),
            window_duration: window,
            max_concurrent,
        }
    }

    pub fn binance() -> Self {
        Self::for_exchange(6000, Duration::from_secs(60), 10)
    }

    pub fn bybit() -> Self {
        Self::for_exchange(600, Duration::from_secs(5), 10)
    }

    pub fn kucoin() -> Self {
        Self::for_exchange(4000, Duration::from_secs(30), 10)
    }

    pub fn oanda() -> Self {
        Self::for_exchange(100, Duration::from_secs(1), 10)
    }

    pub fn mt5_bridge() -> Self {
        Self::for_exchange(50, Duration::from_secs(1), 4)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::for_exchange(1000, Duration::from_secs(30), 20)
    }
}

#[derive(Debug)]
struct RequestLog {
    timestamp: Instant,
    weight: u32,
}

pub struct RateLimiter {
    name: &'static str,
    config: RateLimitConfig,
    request_history: Arc<RwLock<VecDeque<RequestLog>>>,
    semaphore: Arc<Semaphore>,
    total_requests: Arc<RwLock<u64>>,
    throttled: Arc<RwLock<u64>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, config: RateLimitConfig) -> Self {
        tracing::debug!(
            exchange = name,
            max_weight = config.max_weight_per_window,
            window = ?config.window_duration,
            "rate limiter initialized"
        );

        Self {
            name,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            request_history: Arc::new(RwLock::new(VecDeque::new())),
            total_requests: Arc::new(RwLock::new(0)),
            throttled: Arc::new(RwLock::new(0)),
        }
    }

    /// Waits until `weight` fits in the current window, then records it.
    /// The returned guard holds a concurrency permit until dropped.
    pub async fn acquire(&self, endpoint: &str, weight: u32) -> RateLimitGuard {
        let permit = loop {
            // The semaphore is never closed.
            if let Ok(permit) = self.semaphore.clone().acquire_owned().await {
                break permit;
            }
        };

        let weight = weight.min(self.config.max_weight_per_window);
        loop {
            let wait = {
                let mut history = self.request_history.write().await;
                let cutoff = Instant::now().checked_sub(self.config.window_duration);
                while let (Some(front), Some(cutoff)) = (history.front(), cutoff) {
                    if front.timestamp < cutoff {
                        history.pop_front();
                    } else {
                        break;
                    }
                }

                let current: u32 = history.iter().map(|r| r.weight).sum();
                if current + weight <= self.config.max_weight_per_window {
                    history.push_back(RequestLog {
                        timestamp: Instant::now(),
                        weight,
                    });
                    None
                } else {
                    let oldest = history.front().map(|r| r.timestamp.elapsed());
                    Some(match oldest {
                        Some(elapsed) if elapsed < self.config.window_duration => {
                            self.config.window_duration - elapsed + Duration::from_millis(5)
                        }
                        _ => Duration::from_millis(5),
                    })
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    *self.throttled.write().await += 1;
                    tracing::warn!(
                        exchange = self.name,
                        endpoint,
                        weight,
                        ?wait,
                        "rate limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        *self.total_requests.write().await += 1;
        RateLimitGuard { _permit: permit }
    }

    pub async fn get_stats(&self) -> RateLimiterStats {
        let history = self.request_history.read().await;
        let cutoff = Instant::now().checked_sub(self.config.window_duration);
        let current_weight = history
            .iter()
            .filter(|r| cutoff.map_or(true, |c| r.timestamp >= c))
            .map(|r| r.weight)
            .sum();

        RateLimiterStats {
            current_weight,
            max_weight: self.config.max_weight_per_window,
            total_requests: *self.total_requests.read().await,
            throttled: *self.throttled.read().await,
        }
    }
}

/// Releases the concurrency permit when dropped.
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterStats {
    pub current_weight: u32,
    pub max_weight: u32,
    pub total_requests: u64,
    pub throttled: u64,
}

impl RateLimiterStats {
    pub fn usage_percent(&self) -> f32 {
        self.current_weight as f32 / self.max_weight as f32 * 100.0
    }

    pub fn is_healthy(&self) -> bool {
        self.usage_percent() < 80.0 && self.throttled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_margin_applied() {
        let config = RateLimitConfig::for_exchange(1000, Duration::from_secs(30), 5);
        assert_eq!(config.max_weight_per_window, 800);
    }

    #[tokio::test]
    async fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new("test", RateLimitConfig::default());

        let _guard = limiter.acquire("/ticker", 2).await;

        let stats = limiter.get_stats().await;
        assert_eq!(stats.current_weight, 2);
        assert_eq!(stats.total_requests, 1);
        assert!(stats.is_healthy());
    }

    #[tokio::test]
    async fn test_rate_limiter_waits_for_window() {
        let config = RateLimitConfig {
            max_weight_per_window: 10,
            window_duration: Duration::from_millis(50),
            max_concurrent: 4,
        };
        let limiter = RateLimiter::new("test", config);

        let start = Instant::now();
        drop(limiter.acquire("/order", 6).await);
        drop(limiter.acquire("/order", 6).await);

        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(limiter.get_stats().await.throttled, 1);
    }
}
