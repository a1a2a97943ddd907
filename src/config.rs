use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::{PartnerMap, VolumeCap};
use crate::utils::{BackoffPolicy, BreakerConfig};

// ============================================================================
// Configuration
// ============================================================================
//
// Everything is read from environment variables once at startup (a .env
// file is honored if present) and is immutable afterwards. Unparseable
// values fall back to the defaults rather than aborting startup.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    /// Unset selects the in-memory counter store.
    pub redis_url: Option<String>,
    pub counter_timeout: Duration,
    pub worker_count: usize,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub dispatch_timeout: Duration,
    pub breaker: BreakerConfig,
    pub endpoints: PartnerMap<String>,
    pub caps: PartnerMap<VolumeCap>,
    pub us_skus: HashSet<String>,
    pub refill_skus: HashSet<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            http_port: parsed("HTTP_PORT", 3000),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            counter_timeout: Duration::from_millis(parsed("COUNTER_TIMEOUT_MS", 5_000)),
            worker_count: parsed("WORKER_COUNT", 4),
            max_attempts: parsed("MAX_ATTEMPTS", 3),
            backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(parsed("RETRY_INITIAL_DELAY_MS", 1_000)),
                max_delay: Duration::from_millis(parsed("RETRY_MAX_DELAY_MS", 30_000)),
                multiplier: 2.0,
            },
            dispatch_timeout: Duration::from_millis(parsed("DISPATCH_TIMEOUT_MS", 5_000)),
            breaker: BreakerConfig::default(),
            endpoints: PartnerMap {
                f1: var_or("PARTNER_F1_URL", "http://localhost:4000/partner-f1"),
                f2: var_or("PARTNER_F2_URL", "http://localhost:4000/partner-f2"),
                f3: var_or("PARTNER_F3_URL", "http://localhost:4000/partner-f3"),
                f_us: var_or("PARTNER_F_US_URL", "http://localhost:4000/partner-f-us"),
            },
            caps: PartnerMap {
                f1: cap("F1_DAILY_CAP", VolumeCap::Unlimited),
                f2: cap("F2_DAILY_CAP", VolumeCap::Limited(100)),
                f3: cap("F3_DAILY_CAP", VolumeCap::Limited(50)),
                f_us: cap("F_US_DAILY_CAP", VolumeCap::Unlimited),
            },
            us_skus: sku_set("US_SKUS", &["US-STARTER-001", "US-REFILL-001"]),
            refill_skus: sku_set(
                "REFILL_SKUS",
                &["REFILL-001", "REFILL-002", "REFILL-003"],
            ),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn cap(key: &str, default: VolumeCap) -> VolumeCap {
    env::var(key)
        .ok()
        .and_then(|v| VolumeCap::parse(&v))
        .unwrap_or(default)
}

fn sku_set(key: &str, defaults: &[&str]) -> HashSet<String> {
    env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<HashSet<_>>()
        })
        .filter(|set| !set.is_empty())
        .unwrap_or_else(|| defaults.iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names; the process environment is
    // shared across the test binary.

    #[test]
    fn test_parsed_falls_back_on_garbage() {
        env::set_var("CONFIG_TEST_PORT", "not-a-number");
        assert_eq!(parsed("CONFIG_TEST_PORT", 3000u16), 3000);

        env::set_var("CONFIG_TEST_PORT_OK", "8080");
        assert_eq!(parsed("CONFIG_TEST_PORT_OK", 3000u16), 8080);
    }

    #[test]
    fn test_cap_accepts_unlimited() {
        env::set_var("CONFIG_TEST_CAP", "unlimited");
        assert_eq!(
            cap("CONFIG_TEST_CAP", VolumeCap::Limited(1)),
            VolumeCap::Unlimited
        );

        env::set_var("CONFIG_TEST_CAP_NUM", "250");
        assert_eq!(
            cap("CONFIG_TEST_CAP_NUM", VolumeCap::Unlimited),
            VolumeCap::Limited(250)
        );
    }

    #[test]
    fn test_sku_set_parses_csv() {
        env::set_var("CONFIG_TEST_SKUS", "A-1, B-2 ,,C-3");
        let set = sku_set("CONFIG_TEST_SKUS", &["DEFAULT"]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("B-2"));
    }

    #[test]
    fn test_sku_set_empty_value_keeps_defaults() {
        env::set_var("CONFIG_TEST_SKUS_EMPTY", " , ");
        let set = sku_set("CONFIG_TEST_SKUS_EMPTY", &["DEFAULT-1", "DEFAULT-2"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("DEFAULT-1"));
    }
}
