//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use entqkd_protocol::{SessionMode, SimTiming};

use crate::error::{Result, SessionError};

/// Signal speed in fibre, km/s.
pub const FIBRE_SPEED_KM_PER_S: f64 = 200_000.0;

/// Default round budget per target bit.
pub const ROUNDS_PER_TARGET_BIT: u64 = 64;

/// Configuration for one QKD session.
///
/// The physical parameters only shape the reference substrate; the protocol
/// itself never looks at them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sifted key length both peers must reach.
    pub target_length: usize,
    /// Distance between Alice and Bob, in km.
    pub node_distance_km: f64,
    /// Depolarizing rate of Bob's memory, in Hz.
    pub depolar_rate: f64,
    /// Entangled-pair source frequency, in Hz.
    pub source_frequency: f64,
    /// Classical propagation delay in ns. Derived from the distance if unset.
    pub classical_delay_ns: Option<u64>,
    /// Interactive or batched sifting.
    pub mode: SessionMode,
    /// Maximum rounds per peer. Defaults to 64 per target bit.
    pub max_rounds: Option<u64>,
    /// Stop the session after this much (simulated) time, in ns.
    pub deadline_ns: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_length: 32,
            node_distance_km: 4e-3,
            depolar_rate: 0.0,
            source_frequency: 2e7,
            classical_delay_ns: None,
            mode: SessionMode::Interactive,
            max_rounds: None,
            deadline_ns: None,
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given key length.
    pub fn with_target(target_length: usize) -> Self {
        Self {
            target_length,
            ..Self::default()
        }
    }

    /// Parse from JSON and validate.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field is usable.
    pub fn validate(&self) -> Result<()> {
        if self.target_length == 0 {
            return Err(invalid("target_length must be positive"));
        }
        if !self.node_distance_km.is_finite() || self.node_distance_km < 0.0 {
            return Err(invalid("node_distance_km must be a non-negative number"));
        }
        if !self.depolar_rate.is_finite() || self.depolar_rate < 0.0 {
            return Err(invalid("depolar_rate must be a non-negative number"));
        }
        if !self.source_frequency.is_finite() || self.source_frequency <= 0.0 {
            return Err(invalid("source_frequency must be positive"));
        }
        if let SessionMode::Batched { oversubscription } = self.mode {
            if !oversubscription.is_finite() || oversubscription < 1.0 {
                return Err(invalid("oversubscription must be at least 1.0"));
            }
        }
        if self.max_rounds == Some(0) {
            return Err(invalid("max_rounds must be positive"));
        }
        Ok(())
    }

    pub fn max_rounds(&self) -> u64 {
        self.max_rounds
            .unwrap_or_else(|| (self.target_length as u64).saturating_mul(ROUNDS_PER_TARGET_BIT))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ns.map(Duration::from_nanos)
    }

    /// Source-to-peer delay; the source sits halfway between the nodes.
    pub fn quantum_delay(&self) -> Duration {
        fibre_delay(self.node_distance_km / 2.0)
    }

    /// Peer-to-peer delay on each classical channel.
    pub fn classical_delay(&self) -> Duration {
        match self.classical_delay_ns {
            Some(ns) => Duration::from_nanos(ns),
            None => fibre_delay(self.node_distance_km),
        }
    }

    /// Interval between pair emissions.
    pub fn source_period(&self) -> Duration {
        Duration::from_nanos((1e9 / self.source_frequency).round() as u64)
    }

    /// Timing for the reference substrate.
    pub fn sim_timing(&self) -> SimTiming {
        SimTiming {
            source_period: self.source_period(),
            alice_delay: self.quantum_delay(),
            bob_delay: self.quantum_delay(),
            preparation_time: Duration::ZERO,
        }
    }
}

fn fibre_delay(distance_km: f64) -> Duration {
    Duration::from_nanos((distance_km / FIBRE_SPEED_KM_PER_S * 1e9).round() as u64)
}

fn invalid(reason: &str) -> SessionError {
    SessionError::InvalidConfig(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source_period(), Duration::from_nanos(50));
        assert_eq!(config.quantum_delay(), Duration::from_nanos(10));
        assert_eq!(config.classical_delay(), Duration::from_nanos(20));
        assert_eq!(config.max_rounds(), 32 * 64);
    }

    #[test]
    fn test_classical_delay_override() {
        let config = SessionConfig {
            classical_delay_ns: Some(3),
            ..SessionConfig::default()
        };
        assert_eq!(config.classical_delay(), Duration::from_nanos(3));
    }

    #[test]
    fn test_from_json_partial() {
        let config = SessionConfig::from_json(
            r#"{"target_length": 8, "mode": {"kind": "batched", "oversubscription": 2.0}}"#,
        )
        .unwrap();
        assert_eq!(config.target_length, 8);
        assert_eq!(
            config.mode,
            SessionMode::Batched {
                oversubscription: 2.0
            }
        );
        assert_eq!(config.node_distance_km, 4e-3);
    }

    #[test]
    fn test_validation_rejects() {
        let bad = [
            SessionConfig::with_target(0),
            SessionConfig {
                depolar_rate: -1.0,
                ..SessionConfig::default()
            },
            SessionConfig {
                source_frequency: 0.0,
                ..SessionConfig::default()
            },
            SessionConfig {
                mode: SessionMode::Batched {
                    oversubscription: 0.5,
                },
                ..SessionConfig::default()
            },
            SessionConfig {
                max_rounds: Some(0),
                ..SessionConfig::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(SessionError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            SessionConfig::from_json("{not json"),
            Err(SessionError::ConfigParse(_))
        ));
        assert!(matches!(
            SessionConfig::from_json(r#"{"target_length": 0}"#),
            Err(SessionError::InvalidConfig(_))
        ));
    }
}
