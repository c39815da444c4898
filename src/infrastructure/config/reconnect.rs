//! `[reconnection]`: backoff, circuit breaker and auth retry limits shared by
//! every venue session.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectionConfig {
    /// Delay before the first reconnect after a healthy session drops.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Ceiling for the exponential backoff, before jitter.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound of random jitter, as a fraction of the base delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    /// Consecutive failed attempts that trip the circuit breaker.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Pause after the breaker trips; backoff restarts afterwards.
    #[serde(default = "default_circuit_breaker_cooldown_ms")]
    pub circuit_breaker_cooldown_ms: u64,
    /// Authentication attempts before the session is closed for good.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.2
}

fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_circuit_breaker_cooldown_ms() -> u64 {
    300_000
}

fn default_max_auth_attempts() -> u32 {
    3
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_ratio: default_jitter_ratio(),
            max_consecutive_failures: default_max_consecutive_failures(),
            circuit_breaker_cooldown_ms: default_circuit_breaker_cooldown_ms(),
            max_auth_attempts: default_max_auth_attempts(),
        }
    }
}
