use std::{
    collections::{BTreeMap, HashMap},
    fs,
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use loadgen_core::{
    RetryPolicy,
    rpc::DEFAULT_RPC_TIMEOUT,
    scenario::{RunnerConfig, WaitBetween},
    transaction::near,
};
use loadgen_workflows::{
    BootstrapConfig, ContractPaths, WorkloadKind, bootstrap::DEFAULT_DEPENDENCY_ACCOUNTS,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use thiserror::Error;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:3030";
const DEFAULT_USERS: usize = 10;
const DEFAULT_RUN_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_CONTRACT_BALANCE_NEAR: u64 = 50_000;
const DEFAULT_USER_BALANCE_NEAR: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{field} must be non-zero")]
    ZeroValue { field: &'static str },
    #[error("invalid url for {field}: '{value}': {message}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        message: String,
    },
    #[error("no funding key configured (set funding_key, --funding-key or LOADGEN_FUNDING_KEY)")]
    MissingFundingKey,
    #[error("workload weights must not all be zero")]
    NoWorkloads,
    #[error("spawn_rate must be a finite, non-negative number (got {0})")]
    InvalidSpawnRate(f64),
    #[error("{field}: minimum {min:?} exceeds maximum {max:?}")]
    InvalidRange {
        field: &'static str,
        min: Duration,
        max: Duration,
    },
    #[error("task weight '{key}' must be named '<workload>.<task>' with a known workload")]
    UnknownTaskWeight { key: String },
}

#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitBetweenConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub min: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max: Duration,
}

impl Default for WaitBetweenConfig {
    fn default() -> Self {
        let pacing = WaitBetween::default();
        Self {
            min: pacing.min,
            max: pacing.max,
        }
    }
}

#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: NonZeroU32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub backoff: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_backoff: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff: policy.backoff,
            max_backoff: policy.max_backoff,
            attempt_timeout: policy.attempt_timeout,
        }
    }
}

/// Load test description, read from YAML. Durations are milliseconds,
/// balances whole NEAR.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub rpc_url: String,
    pub funding_key: Option<PathBuf>,
    pub users: usize,
    /// Users started per second.
    pub spawn_rate: f64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub run_duration: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stop_grace: Duration,
    pub wait_between: WaitBetweenConfig,
    /// Relative share of users per workload.
    pub workloads: BTreeMap<WorkloadKind, u32>,
    /// Overrides keyed `<workload>.<task>`.
    pub task_weights: HashMap<String, u32>,
    pub retry: RetryConfig,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub rpc_timeout: Duration,
    pub contracts: ContractPaths,
    pub contract_balance: u64,
    pub user_balance: u64,
    pub dependency_accounts: usize,
    pub run_id: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            funding_key: None,
            users: DEFAULT_USERS,
            spawn_rate: 1.0,
            run_duration: DEFAULT_RUN_DURATION,
            stop_grace: DEFAULT_STOP_GRACE,
            wait_between: WaitBetweenConfig::default(),
            workloads: BTreeMap::from([(WorkloadKind::Ft, 1)]),
            task_weights: HashMap::new(),
            retry: RetryConfig::default(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            contracts: ContractPaths::default(),
            contract_balance: DEFAULT_CONTRACT_BALANCE_NEAR,
            user_balance: DEFAULT_USER_BALANCE_NEAR,
            dependency_accounts: DEFAULT_DEPENDENCY_ACCOUNTS,
            run_id: String::new(),
        }
    }
}

impl LoadConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Applies `LOADGEN_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(rpc_url) = loadgen_env::loadgen_rpc_url() {
            self.rpc_url = rpc_url;
        }
        if let Some(funding_key) = loadgen_env::loadgen_funding_key() {
            self.funding_key = Some(funding_key);
        }
        if let Some(run_id) = loadgen_env::loadgen_run_id() {
            self.run_id = run_id;
        }
        if let Some(users) = loadgen_env::loadgen_users() {
            self.users = users;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc_url()?;
        self.funding_key()?;
        if self.users == 0 {
            return Err(ConfigError::ZeroValue { field: "users" });
        }
        if self.workloads.values().all(|weight| *weight == 0) {
            return Err(ConfigError::NoWorkloads);
        }
        if !self.spawn_rate.is_finite() || self.spawn_rate < 0.0 {
            return Err(ConfigError::InvalidSpawnRate(self.spawn_rate));
        }
        if self.run_duration.is_zero() {
            return Err(ConfigError::ZeroValue {
                field: "run_duration",
            });
        }
        if self.wait_between.min > self.wait_between.max {
            return Err(ConfigError::InvalidRange {
                field: "wait_between",
                min: self.wait_between.min,
                max: self.wait_between.max,
            });
        }
        if self.retry.backoff > self.retry.max_backoff {
            return Err(ConfigError::InvalidRange {
                field: "retry.backoff",
                min: self.retry.backoff,
                max: self.retry.max_backoff,
            });
        }
        for key in self.task_weights.keys() {
            let known = key
                .split_once('.')
                .is_some_and(|(kind, task)| !task.is_empty() && kind.parse::<WorkloadKind>().is_ok());
            if !known {
                return Err(ConfigError::UnknownTaskWeight { key: key.clone() });
            }
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.rpc_url).map_err(|err| ConfigError::InvalidUrl {
            field: "rpc_url",
            value: self.rpc_url.clone(),
            message: err.to_string(),
        })
    }

    pub fn funding_key(&self) -> Result<&Path, ConfigError> {
        self.funding_key
            .as_deref()
            .ok_or(ConfigError::MissingFundingKey)
    }

    /// Splits `users` across workloads by weight.
    #[must_use]
    pub fn user_counts(&self) -> Vec<(WorkloadKind, usize)> {
        split_by_weight(self.users, &self.workloads)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: self.retry.backoff,
            max_backoff: self.retry.max_backoff,
            attempt_timeout: self.retry.attempt_timeout,
        }
    }

    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            run_duration: self.run_duration,
            spawn_rate: self.spawn_rate,
            wait_between: WaitBetween::new(self.wait_between.min, self.wait_between.max),
            stop_grace: self.stop_grace,
        }
    }

    /// Provisions contracts only for workloads that get users.
    #[must_use]
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            workloads: self
                .user_counts()
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(kind, _)| kind)
                .collect(),
            contracts: self.contracts.clone(),
            contract_balance: near(self.contract_balance),
            user_balance: near(self.user_balance),
            dependency_accounts: self.dependency_accounts,
            run_id: self.run_id.clone(),
        }
    }
}

/// Largest remainder apportionment: floors first, leftovers go to the
/// largest fractional parts, ties to the earlier workload.
fn split_by_weight(users: usize, weights: &BTreeMap<WorkloadKind, u32>) -> Vec<(WorkloadKind, usize)> {
    let total: u128 = weights.values().map(|weight| u128::from(*weight)).sum();
    if total == 0 {
        return Vec::new();
    }

    let users_wide = users as u128;
    let mut shares: Vec<(WorkloadKind, usize, u128)> = weights
        .iter()
        .map(|(kind, weight)| {
            let exact = users_wide * u128::from(*weight);
            (*kind, (exact / total) as usize, exact % total)
        })
        .collect();

    let assigned: usize = shares.iter().map(|(_, count, _)| count).sum();
    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|a, b| shares[*b].2.cmp(&shares[*a].2).then(a.cmp(b)));
    for index in order.into_iter().take(users - assigned) {
        shares[index].1 += 1;
    }

    shares
        .into_iter()
        .map(|(kind, count, _)| (kind, count))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn parses_yaml_with_defaults() {
        let config = LoadConfig::from_yaml_str(
            r"
rpc_url: http://10.0.0.1:3030
funding_key: /keys/funding.json
users: 40
run_duration: 30000
wait_between: { min: 500, max: 1500 }
workloads: { ft: 3, social: 1 }
task_weights: { sweat.record_batch_of_large_batches: 1 }
retry: { max_attempts: 3 }
",
        )
        .unwrap();

        assert_eq!(config.users, 40);
        assert_eq!(config.run_duration, Duration::from_secs(30));
        assert_eq!(config.wait_between.min, Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts.get(), 3);
        assert_eq!(config.retry.backoff, RetryPolicy::default().backoff);
        assert_eq!(config.rpc_timeout, DEFAULT_RPC_TIMEOUT);
        assert_eq!(config.dependency_accounts, 8);
        config.validate().unwrap();
        assert_eq!(
            config.user_counts(),
            vec![(WorkloadKind::Ft, 30), (WorkloadKind::Social, 10)]
        );
    }

    #[test]
    fn rejects_unknown_fields_and_zero_attempts() {
        assert!(LoadConfig::from_yaml_str("userz: 3").is_err());
        assert!(LoadConfig::from_yaml_str("retry: { max_attempts: 0 }").is_err());
    }

    #[test]
    fn validation_reports_the_offending_field() {
        let base = LoadConfig {
            funding_key: Some(PathBuf::from("funding.json")),
            ..LoadConfig::default()
        };
        base.validate().unwrap();

        assert!(matches!(
            LoadConfig { funding_key: None, ..base.clone() }.validate(),
            Err(ConfigError::MissingFundingKey)
        ));
        assert!(matches!(
            LoadConfig { users: 0, ..base.clone() }.validate(),
            Err(ConfigError::ZeroValue { field: "users" })
        ));
        assert!(matches!(
            LoadConfig { rpc_url: "not a url".to_owned(), ..base.clone() }.validate(),
            Err(ConfigError::InvalidUrl { field: "rpc_url", .. })
        ));
        assert!(matches!(
            LoadConfig {
                workloads: BTreeMap::from([(WorkloadKind::Ft, 0)]),
                ..base.clone()
            }
            .validate(),
            Err(ConfigError::NoWorkloads)
        ));
        assert!(matches!(
            LoadConfig {
                task_weights: HashMap::from([("posts.like".to_owned(), 1)]),
                ..base
            }
            .validate(),
            Err(ConfigError::UnknownTaskWeight { .. })
        ));
    }

    #[test]
    fn largest_remainder_hands_out_every_user() {
        let weights = BTreeMap::from([
            (WorkloadKind::Ft, 1),
            (WorkloadKind::Social, 1),
            (WorkloadKind::Sweat, 1),
        ]);
        assert_eq!(
            split_by_weight(10, &weights),
            vec![
                (WorkloadKind::Ft, 4),
                (WorkloadKind::Social, 3),
                (WorkloadKind::Sweat, 3),
            ]
        );

        let weights = BTreeMap::from([(WorkloadKind::Ft, 2), (WorkloadKind::Depend, 1)]);
        assert_eq!(
            split_by_weight(1, &weights),
            vec![(WorkloadKind::Ft, 1), (WorkloadKind::Depend, 0)]
        );
    }

    #[test]
    fn bootstrap_skips_workloads_without_users() {
        let config = LoadConfig {
            users: 1,
            workloads: BTreeMap::from([(WorkloadKind::Ft, 5), (WorkloadKind::Depend, 1)]),
            ..LoadConfig::default()
        };
        let bootstrap = config.bootstrap_config();
        assert_eq!(bootstrap.workloads.len(), 1);
        assert!(bootstrap.workloads.contains(&WorkloadKind::Ft));
        assert_eq!(bootstrap.contract_balance, near(50_000));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "users: 7\nrun_id: \"42\"").unwrap();
        let config = LoadConfig::from_file(file.path()).unwrap();
        assert_eq!(config.users, 7);
        assert_eq!(config.run_id, "42");
    }
}
