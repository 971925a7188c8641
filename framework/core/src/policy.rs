//! Detector policies and how they are resolved for a series.
//!
//! Policies are layered. A benchmark-specific policy overrides its tool's policy, which overrides
//! the default policy. Any field left out at one level is taken from the next.
//!
//! ```toml
//! [default]
//! alertThreshold = 0.5
//! direction = "higherIsWorse"
//!
//! [tools.cargo]
//! rollingWindow = 3
//!
//! [[benchmarks]]
//! tool = "cargo"
//! name = "throughput"
//! direction = "lowerIsWorse"
//! ```

use crate::error::ConfigurationError;
use crate::key::SeriesKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Which way a measurement gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// For example latency or time per iteration
    #[display("higherIsWorse")]
    HigherIsWorse,
    /// For example throughput
    #[display("lowerIsWorse")]
    LowerIsWorse,
}

/// A fully resolved policy for one series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorPolicy {
    /// Deviation from the baseline, in the worse direction, above which a measurement is a
    /// regression. `0.5` means 50% worse.
    pub alert_threshold: f64,
    /// Deviation of the baseline from the new measurement above which it is an improvement.
    pub improvement_threshold: f64,
    pub direction: Direction,
    /// How many preceding measurements are averaged into the baseline
    pub rolling_window: usize,
}

impl DetectorPolicy {
    /// Point-to-point comparison with a symmetric improvement threshold
    pub fn new(alert_threshold: f64, direction: Direction) -> Self {
        Self {
            alert_threshold,
            improvement_threshold: alert_threshold,
            direction,
            rolling_window: 1,
        }
    }

    pub fn with_rolling_window(mut self, rolling_window: usize) -> Self {
        self.rolling_window = rolling_window;
        self
    }

    pub fn with_improvement_threshold(mut self, improvement_threshold: f64) -> Self {
        self.improvement_threshold = improvement_threshold;
        self
    }

    pub fn validate(&self, scope: &str) -> Result<(), ConfigurationError> {
        check_threshold(scope, self.alert_threshold)?;
        check_threshold(scope, self.improvement_threshold)?;
        if self.rolling_window == 0 {
            return Err(ConfigurationError::InvalidRollingWindow {
                scope: scope.to_string(),
            });
        }
        Ok(())
    }
}

/// A partial policy, as configured at one level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_window: Option<usize>,
}

impl PolicyOverride {
    fn layered_over(&self, fallback: &PolicyOverride) -> PolicyOverride {
        PolicyOverride {
            alert_threshold: self.alert_threshold.or(fallback.alert_threshold),
            improvement_threshold: self.improvement_threshold.or(fallback.improvement_threshold),
            direction: self.direction.or(fallback.direction),
            rolling_window: self.rolling_window.or(fallback.rolling_window),
        }
    }

    /// Check the values that are present, without requiring the policy to be complete
    fn validate(&self, scope: &str) -> Result<(), ConfigurationError> {
        if let Some(threshold) = self.alert_threshold {
            check_threshold(scope, threshold)?;
        }
        if let Some(threshold) = self.improvement_threshold {
            check_threshold(scope, threshold)?;
        }
        if self.rolling_window == Some(0) {
            return Err(ConfigurationError::InvalidRollingWindow {
                scope: scope.to_string(),
            });
        }
        Ok(())
    }

    fn complete(&self, scope: &str) -> Result<DetectorPolicy, ConfigurationError> {
        let alert_threshold =
            self.alert_threshold
                .ok_or_else(|| ConfigurationError::MissingThreshold {
                    scope: scope.to_string(),
                })?;
        let direction = self
            .direction
            .ok_or_else(|| ConfigurationError::MissingDirection {
                scope: scope.to_string(),
            })?;

        let policy = DetectorPolicy {
            alert_threshold,
            improvement_threshold: self.improvement_threshold.unwrap_or(alert_threshold),
            direction,
            rolling_window: self.rolling_window.unwrap_or(1),
        };
        policy.validate(scope)?;

        Ok(policy)
    }
}

impl From<DetectorPolicy> for PolicyOverride {
    fn from(policy: DetectorPolicy) -> Self {
        PolicyOverride {
            alert_threshold: Some(policy.alert_threshold),
            improvement_threshold: Some(policy.improvement_threshold),
            direction: Some(policy.direction),
            rolling_window: Some(policy.rolling_window),
        }
    }
}

/// A policy for a single benchmark of a single tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPolicy {
    pub tool: String,
    pub name: String,
    #[serde(flatten)]
    pub policy: PolicyOverride,
}

/// Every configured policy, from which the policy for any series can be resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub default: PolicyOverride,
    #[serde(default)]
    pub tools: BTreeMap<String, PolicyOverride>,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkPolicy>,
}

impl PolicySet {
    /// The same policy for every series
    pub fn uniform(policy: DetectorPolicy) -> Self {
        Self {
            default: policy.into(),
            ..Default::default()
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>, policy: PolicyOverride) -> Self {
        self.tools.insert(tool.into(), policy);
        self
    }

    pub fn with_benchmark(
        mut self,
        tool: impl Into<String>,
        name: impl Into<String>,
        policy: PolicyOverride,
    ) -> Self {
        self.benchmarks.push(BenchmarkPolicy {
            tool: tool.into(),
            name: name.into(),
            policy,
        });
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let policies: PolicySet = toml::from_str(content)?;
        policies.validate()?;
        Ok(policies)
    }

    /// Load and validate policies from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check every configured value
    ///
    /// Completeness is only checked when a policy is resolved for a series, a level may leave
    /// fields out as long as another level provides them.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.default.validate("the default policy")?;
        for (tool, policy) in &self.tools {
            policy.validate(&tool_scope(tool))?;
        }
        for benchmark in &self.benchmarks {
            benchmark
                .policy
                .validate(&benchmark_scope(&benchmark.tool, &benchmark.name))?;
        }
        Ok(())
    }

    /// Resolve the complete policy for a series
    pub fn resolve(&self, key: &SeriesKey) -> Result<DetectorPolicy, ConfigurationError> {
        let mut layered = self.default.clone();
        if let Some(tool_policy) = self.tools.get(&key.tool) {
            layered = tool_policy.layered_over(&layered);
        }
        // Later entries win if the same benchmark is configured twice
        if let Some(benchmark) = self
            .benchmarks
            .iter()
            .rev()
            .find(|b| b.tool == key.tool && b.name == key.name)
        {
            layered = benchmark.policy.layered_over(&layered);
        }

        layered.complete(&benchmark_scope(&key.tool, &key.name))
    }
}

fn tool_scope(tool: &str) -> String {
    format!("tool `{tool}`")
}

fn benchmark_scope(tool: &str, name: &str) -> String {
    format!("benchmark `{tool}/{name}`")
}

fn check_threshold(scope: &str, value: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigurationError::InvalidThreshold {
            scope: scope.to_string(),
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: &str = r#"
[default]
alertThreshold = 0.5
direction = "higherIsWorse"

[tools.cargo]
alertThreshold = 0.2
rollingWindow = 3

[tools.pytest]
improvementThreshold = 0.1

[[benchmarks]]
tool = "cargo"
name = "throughput"
direction = "lowerIsWorse"
"#;

    #[test]
    fn resolve_default_only() {
        let policies = PolicySet::from_toml_str(POLICIES).unwrap();
        let policy = policies.resolve(&SeriesKey::new("go", "parse")).unwrap();
        assert_eq!(policy, DetectorPolicy::new(0.5, Direction::HigherIsWorse));
    }

    #[test]
    fn resolve_tool_over_default() {
        let policies = PolicySet::from_toml_str(POLICIES).unwrap();
        let policy = policies
            .resolve(&SeriesKey::new("cargo", "fibonacci"))
            .unwrap();
        assert_eq!(
            policy,
            DetectorPolicy::new(0.2, Direction::HigherIsWorse).with_rolling_window(3)
        );
    }

    #[test]
    fn improvement_threshold_is_independent_of_alert_threshold() {
        let policies = PolicySet::from_toml_str(POLICIES).unwrap();
        let policy = policies.resolve(&SeriesKey::new("pytest", "x")).unwrap();
        assert_eq!(policy.alert_threshold, 0.5);
        assert_eq!(policy.improvement_threshold, 0.1);
    }

    #[test]
    fn resolve_benchmark_over_tool() {
        let policies = PolicySet::from_toml_str(POLICIES).unwrap();
        let policy = policies
            .resolve(&SeriesKey::new("cargo", "throughput"))
            .unwrap();
        assert_eq!(
            policy,
            DetectorPolicy::new(0.2, Direction::LowerIsWorse).with_rolling_window(3)
        );
    }

    #[test]
    fn missing_direction_is_a_configuration_error() {
        let policies = PolicySet::from_toml_str("[default]\nalertThreshold = 0.5\n").unwrap();
        let err = policies
            .resolve(&SeriesKey::new("cargo", "fibonacci"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingDirection { .. }));
    }

    #[test]
    fn missing_threshold_is_a_configuration_error() {
        let policies = PolicySet::default().with_tool(
            "cargo",
            PolicyOverride {
                direction: Some(Direction::HigherIsWorse),
                ..Default::default()
            },
        );
        let err = policies
            .resolve(&SeriesKey::new("cargo", "fibonacci"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingThreshold { .. }));
    }

    #[test]
    fn negative_threshold_fails_on_load() {
        let err = PolicySet::from_toml_str(
            "[default]\nalertThreshold = -0.5\ndirection = \"higherIsWorse\"\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidThreshold { value, .. } if value == -0.5
        ));
    }

    #[test]
    fn zero_rolling_window_fails_validation() {
        let policies = PolicySet::uniform(
            DetectorPolicy::new(0.5, Direction::HigherIsWorse).with_rolling_window(0),
        );
        assert!(matches!(
            policies.validate(),
            Err(ConfigurationError::InvalidRollingWindow { .. })
        ));
    }

    #[test]
    fn unknown_direction_fails_to_parse() {
        let err =
            PolicySet::from_toml_str("[default]\nalertThreshold = 0.5\ndirection = \"up\"\n")
                .unwrap_err();
        assert!(matches!(err, ConfigurationError::Parse(_)));
    }

    #[test]
    fn later_benchmark_entries_win() {
        let policies = PolicySet::uniform(DetectorPolicy::new(0.5, Direction::HigherIsWorse))
            .with_benchmark(
                "cargo",
                "gcd",
                PolicyOverride {
                    alert_threshold: Some(0.1),
                    ..Default::default()
                },
            )
            .with_benchmark(
                "cargo",
                "gcd",
                PolicyOverride {
                    alert_threshold: Some(0.3),
                    ..Default::default()
                },
            );
        let policy = policies.resolve(&SeriesKey::new("cargo", "gcd")).unwrap();
        assert_eq!(policy.alert_threshold, 0.3);
    }
}
