//! Harness configuration.

use std::time::Duration;

use cmh_core::{ConfigError, KeyPattern, Strategy};

/// Environment override for the number of writer tasks.
pub const ENV_TASKS: &str = "CMH_TASKS";
/// Environment override for writes per task.
pub const ENV_ITERATIONS: &str = "CMH_ITERATIONS";
/// Environment override for the join timeout, in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "CMH_TIMEOUT_MS";
/// Environment override for the shuffled key pattern's seed.
pub const ENV_SEED: &str = "CMH_SEED";

/// Maximum writer tasks per lane.
const TASKS_COUNT_MAX: usize = 1024;

/// Maximum keys held in memory across all tasks' shuffled visiting orders.
pub const SHUFFLED_KEYS_COUNT_MAX: u64 = 1 << 24;

/// Configuration for one harness run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Number of concurrent writer tasks
    pub tasks: usize,
    /// Writes each task performs
    pub iterations_per_task: u64,
    /// Wall-clock limit for the join phase
    pub timeout: Duration,
    /// Keys to write; `None` picks the strategy's default
    pub key_pattern: Option<KeyPattern>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tasks: 2,
            iterations_per_task: 1000,
            timeout: Duration::from_secs(5),
            key_pattern: None,
        }
    }
}

impl HarnessConfig {
    /// Configuration for quick testing.
    pub fn quick() -> Self {
        Self {
            tasks: 2,
            iterations_per_task: 100,
            timeout: Duration::from_secs(1),
            key_pattern: None,
        }
    }

    /// Configuration for stress testing.
    pub fn stress() -> Self {
        Self {
            tasks: 8,
            iterations_per_task: 100_000,
            timeout: Duration::from_secs(60),
            key_pattern: None,
        }
    }

    /// Key pattern used for `strategy`.
    #[must_use]
    pub fn key_pattern_for(&self, strategy: Strategy) -> KeyPattern {
        self.key_pattern
            .unwrap_or_else(|| KeyPattern::default_for(strategy))
    }

    /// Reject configurations no run can start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks == 0 {
            return Err(ConfigError::NotPositive { field: "tasks" });
        }
        if self.iterations_per_task == 0 {
            return Err(ConfigError::NotPositive {
                field: "iterations_per_task",
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::NotPositive { field: "timeout" });
        }

        let too_many = ConfigError::TooManyWrites {
            tasks: self.tasks,
            iterations: self.iterations_per_task,
        };
        if self.tasks > TASKS_COUNT_MAX {
            return Err(too_many);
        }
        let total = (self.tasks as u64)
            .checked_mul(self.iterations_per_task)
            .ok_or_else(|| too_many.clone())?;
        usize::try_from(total).map_err(|_| too_many)?;

        if matches!(self.key_pattern, Some(KeyPattern::Shuffled { .. }))
            && total > SHUFFLED_KEYS_COUNT_MAX
        {
            return Err(ConfigError::ShuffleTooLarge {
                keys: total,
                max: SHUFFLED_KEYS_COUNT_MAX,
            });
        }
        Ok(())
    }

    /// Apply `CMH_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(tasks) = parse_var(&lookup, ENV_TASKS)? {
            self.tasks = tasks as usize;
        }
        if let Some(iterations) = parse_var(&lookup, ENV_ITERATIONS)? {
            self.iterations_per_task = iterations;
        }
        if let Some(ms) = parse_var(&lookup, ENV_TIMEOUT_MS)? {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(seed) = parse_var(&lookup, ENV_SEED)? {
            self.key_pattern = Some(KeyPattern::Shuffled { seed });
        }
        Ok(self)
    }
}

fn parse_var<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
    }
}

/// Seed from `CMH_SEED`, or a random one.
///
/// Logs the seed so a shuffled run can be reproduced with `CMH_SEED=<seed>`.
pub fn get_or_generate_seed() -> Result<u64, ConfigError> {
    match std::env::var(ENV_SEED) {
        Ok(value) => {
            let seed = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_SEED,
                value: value.clone(),
            })?;
            log::info!("{}={} (from environment)", ENV_SEED, seed);
            Ok(seed)
        }
        Err(_) => {
            let seed = rand::random::<u64>();
            log::info!("{}={} (randomly generated)", ENV_SEED, seed);
            Ok(seed)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_matches_reference_scenario() {
        let config = HarnessConfig::default();
        assert_eq!(config.tasks, 2);
        assert_eq!(config.iterations_per_task, 1000);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let zero_tasks = HarnessConfig {
            tasks: 0,
            ..HarnessConfig::default()
        };
        assert_eq!(
            zero_tasks.validate(),
            Err(ConfigError::NotPositive { field: "tasks" })
        );

        let zero_timeout = HarnessConfig {
            timeout: Duration::ZERO,
            ..HarnessConfig::default()
        };
        assert_eq!(
            zero_timeout.validate(),
            Err(ConfigError::NotPositive { field: "timeout" })
        );
    }

    #[test]
    fn test_validate_rejects_overflowing_runs() {
        let config = HarnessConfig {
            tasks: 16,
            iterations_per_task: u64::MAX / 2,
            ..HarnessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyWrites { .. })
        ));
    }

    #[test]
    fn test_validate_bounds_shuffled_orders() {
        let huge = HarnessConfig {
            tasks: 2,
            iterations_per_task: 1 << 40,
            key_pattern: Some(KeyPattern::Shuffled { seed: 1 }),
            ..HarnessConfig::default()
        };
        assert_eq!(
            huge.validate(),
            Err(ConfigError::ShuffleTooLarge {
                keys: 1 << 41,
                max: SHUFFLED_KEYS_COUNT_MAX
            })
        );

        // The same size is fine when nothing has to be precomputed.
        let sequential = HarnessConfig {
            key_pattern: Some(KeyPattern::Overlapping),
            ..huge
        };
        assert!(sequential.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply() {
        let config = HarnessConfig::default()
            .with_overrides(env(&[
                (ENV_TASKS, "6"),
                (ENV_ITERATIONS, "50"),
                (ENV_TIMEOUT_MS, "250"),
                (ENV_SEED, "7"),
            ]))
            .unwrap();
        assert_eq!(config.tasks, 6);
        assert_eq!(config.iterations_per_task, 50);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.key_pattern, Some(KeyPattern::Shuffled { seed: 7 }));
    }

    #[test]
    fn test_bad_override_is_reported() {
        let err = HarnessConfig::default()
            .with_overrides(env(&[(ENV_TASKS, "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnv {
                name: ENV_TASKS,
                value: "many".to_string()
            }
        );
    }

    #[test]
    fn test_default_key_pattern_depends_on_shape() {
        let config = HarnessConfig::default();
        assert_eq!(config.key_pattern_for(Strategy::CopyOnWrite), KeyPattern::Disjoint);
        assert_eq!(config.key_pattern_for(Strategy::LockFreeMap), KeyPattern::Overlapping);
    }
}
