//! Runtime configuration.
//!
//! All sections deserialize with defaults so a partial TOML document is
//! enough:
//!
//! ```
//! use arbor_pages::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(
//!     r#"
//!     [cache]
//!     ttl_ms = 250
//!
//!     [pool]
//!     max_per_component = 2
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.cache.ttl().as_millis(), 250);
//! assert_eq!(config.pool.max_per_component, 2);
//! assert_eq!(config.router.not_found_path, "/404");
//! ```

use crate::error::ArborError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
	/// Route container cache settings.
	pub cache: CacheConfig,
	/// Recycle pool settings.
	pub pool: PoolConfig,
	/// Throttler defaults.
	pub throttle: ThrottleConfig,
	/// Router settings.
	pub router: RouterConfig,
}

impl RuntimeConfig {
	/// Parses a configuration from a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ArborError> {
		toml::from_str(source).map_err(|e| ArborError::Config(e.to_string()))
	}

	/// Replaces the cache section.
	pub fn with_cache(mut self, cache: CacheConfig) -> Self {
		self.cache = cache;
		self
	}

	/// Replaces the pool section.
	pub fn with_pool(mut self, pool: PoolConfig) -> Self {
		self.pool = pool;
		self
	}

	/// Replaces the throttle section.
	pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
		self.throttle = throttle;
		self
	}

	/// Replaces the router section.
	pub fn with_router(mut self, router: RouterConfig) -> Self {
		self.router = router;
		self
	}
}

/// Settings for [`RouteCache`](crate::router::RouteCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Memo lifetime in milliseconds.
	pub ttl_ms: u64,
	/// Minimum fraction of cached containers that must still be attached.
	pub liveness_threshold: f64,
	/// Entries older than `ttl * sweep_multiplier` are purged by a sweep.
	pub sweep_multiplier: u32,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			ttl_ms: 500,
			liveness_threshold: 0.8,
			sweep_multiplier: 5,
		}
	}
}

impl CacheConfig {
	/// Memo lifetime.
	pub fn ttl(&self) -> Duration {
		Duration::from_millis(self.ttl_ms)
	}

	/// Maximum age before a sweep purges an entry.
	pub fn max_age(&self) -> Duration {
		self.ttl() * self.sweep_multiplier.max(1)
	}

	/// Sets the memo lifetime.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl_ms = ttl.as_millis() as u64;
		self
	}

	/// Sets the liveness threshold, clamped to `0.0..=1.0`.
	pub fn with_liveness_threshold(mut self, threshold: f64) -> Self {
		self.liveness_threshold = threshold.clamp(0.0, 1.0);
		self
	}

	/// Sets the sweep multiplier.
	pub fn with_sweep_multiplier(mut self, multiplier: u32) -> Self {
		self.sweep_multiplier = multiplier;
		self
	}
}

/// Settings for the per-component recycle pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	/// Maximum pooled instances per component name.
	pub max_per_component: usize,
	/// Idle time after which a pooled instance is destroyed, in milliseconds.
	pub idle_ms: u64,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_per_component: 3,
			idle_ms: 30_000,
		}
	}
}

impl PoolConfig {
	/// Idle expiry.
	pub fn idle(&self) -> Duration {
		Duration::from_millis(self.idle_ms)
	}

	/// Sets the per-component capacity.
	pub fn with_max_per_component(mut self, max: usize) -> Self {
		self.max_per_component = max;
		self
	}

	/// Sets the idle expiry.
	pub fn with_idle(mut self, idle: Duration) -> Self {
		self.idle_ms = idle.as_millis() as u64;
		self
	}
}

/// Defaults for [`EventThrottler`](crate::events::EventThrottler) users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
	/// Wait used to coalesce mutation-driven re-renders, in milliseconds.
	pub default_wait_ms: u64,
}

impl Default for ThrottleConfig {
	fn default() -> Self {
		Self {
			default_wait_ms: 16,
		}
	}
}

impl ThrottleConfig {
	/// Default coalescing wait.
	pub fn default_wait(&self) -> Duration {
		Duration::from_millis(self.default_wait_ms)
	}
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
	/// Path of the route rendered when nothing matches.
	pub not_found_path: String,
	/// Initial location.
	pub base_path: String,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			not_found_path: "/404".to_string(),
			base_path: "/".to_string(),
		}
	}
}
