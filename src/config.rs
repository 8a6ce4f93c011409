//! Controller configuration
//!
//! Every parameter has a default, so a parameter file only needs to name the
//! values it overrides. Key names follow the simulator bridge conventions
//! (`Lf`, `N`, ...).

use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::common::{MpcError, MpcResult};

/// What the control loop sends when the optimizer fails to converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Repeat the previously sent command (zero if none was sent yet)
    HoldLast,
    /// Send zero steering and zero throttle
    Zero,
    /// Skip the cycle and report the failure to the caller
    Propagate,
}

impl Default for DivergencePolicy {
    fn default() -> Self {
        DivergencePolicy::HoldLast
    }
}

/// Cost weights of the horizon objective
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub v: f64,
    pub delta: f64,
    pub accel: f64,
    pub delta_rate: f64,
    pub accel_rate: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 2000.0,
            epsi: 2000.0,
            v: 1.0,
            delta: 5.0,
            accel: 5.0,
            delta_rate: 200.0,
            accel_rate: 10.0,
        }
    }
}

/// Iteration and time budget of the nonlinear solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum Levenberg-Marquardt iterations per solve
    pub max_iterations: usize,
    /// Wall-clock budget per solve [ms]
    pub max_solve_time_ms: u64,
    /// Projected gradient norm below which the solve has converged
    pub gradient_tolerance: f64,
    /// Relative cost decrease below which the solve has converged
    pub cost_tolerance: f64,
    /// Relative step size below which the solve has converged
    pub step_tolerance: f64,
    /// Initial damping factor (lambda)
    pub initial_damping: f64,
    /// Factor to scale lambda up (on bad step) or down (on good step)
    pub damping_factor: f64,
    /// Lambda above which no further progress is possible
    pub max_damping: f64,
    /// Seed each solve with the shifted previous solution
    pub warm_start: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_solve_time_ms: 50,
            gradient_tolerance: 1e-6,
            cost_tolerance: 1e-10,
            step_tolerance: 1e-10,
            initial_damping: 1e-3,
            damping_factor: 10.0,
            max_damping: 1e10,
            warm_start: true,
        }
    }
}

impl SolverConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.max_solve_time_ms)
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    /// Listening port of the simulator bridge
    pub port: u16,
    /// Distance between the front axle and the center of gravity [m]
    #[serde(rename = "Lf")]
    pub lf: f64,
    /// Maximum physical steering angle [rad]
    pub max_steer_rad: f64,
    /// Horizon length (number of states)
    #[serde(rename = "N")]
    pub n: usize,
    /// Discretization timestep [s]
    pub dt: f64,
    /// Reference speed
    pub v_ref: f64,
    pub weight_cte: f64,
    pub weight_epsi: f64,
    pub weight_v: f64,
    pub weight_delta: f64,
    pub weight_accel: f64,
    pub weight_delta_rate: f64,
    pub weight_accel_rate: f64,
    /// Maximum degree of the reference polynomial
    pub poly_degree: usize,
    /// Actuation latency [ms]
    pub latency_ms: u64,
    /// Predict the state forward by the latency before solving
    pub latency_compensation: bool,
    pub divergence_policy: DivergencePolicy,
    pub solver: SolverConfig,
}

impl Default for MpcConfig {
    fn default() -> Self {
        let weights = CostWeights::default();
        Self {
            port: 4567,
            lf: 2.67,
            max_steer_rad: 25.0_f64.to_radians(),
            n: 10,
            dt: 0.1,
            v_ref: 40.0,
            weight_cte: weights.cte,
            weight_epsi: weights.epsi,
            weight_v: weights.v,
            weight_delta: weights.delta,
            weight_accel: weights.accel,
            weight_delta_rate: weights.delta_rate,
            weight_accel_rate: weights.accel_rate,
            poly_degree: 3,
            latency_ms: 100,
            latency_compensation: false,
            divergence_policy: DivergencePolicy::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl MpcConfig {
    /// Load and validate a TOML parameter file
    pub fn load<P: AsRef<Path>>(path: P) -> MpcResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> MpcResult<Self> {
        let config: MpcConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every parameter against its allowed range
    pub fn validate(&self) -> MpcResult<()> {
        fn positive(name: &str, value: f64) -> MpcResult<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(MpcError::Config(format!("`{}` must be > 0, got {}", name, value)))
            }
        }

        fn non_negative(name: &str, value: f64) -> MpcResult<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(MpcError::Config(format!("`{}` must be >= 0, got {}", name, value)))
            }
        }

        positive("Lf", self.lf)?;
        positive("max_steer_rad", self.max_steer_rad)?;
        positive("dt", self.dt)?;
        if self.n < 2 {
            return Err(MpcError::Config(format!("`N` must be >= 2, got {}", self.n)));
        }
        if !self.v_ref.is_finite() {
            return Err(MpcError::Config("`v_ref` must be finite".to_string()));
        }
        if self.poly_degree < 1 {
            return Err(MpcError::Config("`poly_degree` must be >= 1".to_string()));
        }

        let w = self.weights();
        non_negative("weight_cte", w.cte)?;
        non_negative("weight_epsi", w.epsi)?;
        non_negative("weight_v", w.v)?;
        non_negative("weight_delta", w.delta)?;
        non_negative("weight_accel", w.accel)?;
        non_negative("weight_delta_rate", w.delta_rate)?;
        non_negative("weight_accel_rate", w.accel_rate)?;

        let s = &self.solver;
        if s.max_iterations == 0 {
            return Err(MpcError::Config("`solver.max_iterations` must be >= 1".to_string()));
        }
        if s.max_solve_time_ms == 0 {
            return Err(MpcError::Config("`solver.max_solve_time_ms` must be >= 1".to_string()));
        }
        positive("solver.gradient_tolerance", s.gradient_tolerance)?;
        positive("solver.cost_tolerance", s.cost_tolerance)?;
        positive("solver.step_tolerance", s.step_tolerance)?;
        positive("solver.initial_damping", s.initial_damping)?;
        positive("solver.max_damping", s.max_damping)?;
        if !(s.damping_factor > 1.0) {
            return Err(MpcError::Config("`solver.damping_factor` must be > 1".to_string()));
        }

        Ok(())
    }

    pub fn weights(&self) -> CostWeights {
        CostWeights {
            cte: self.weight_cte,
            epsi: self.weight_epsi,
            v: self.weight_v,
            delta: self.weight_delta,
            accel: self.weight_accel,
            delta_rate: self.weight_delta_rate,
            accel_rate: self.weight_accel_rate,
        }
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MpcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.n, 10);
        assert!((config.max_steer_rad - 0.436332).abs() < 1e-5);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = MpcConfig::from_toml_str(
            r#"
            Lf = 2.5
            N = 12
            v_ref = 60.0
            divergence_policy = "zero"

            [solver]
            max_iterations = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.lf, 2.5);
        assert_eq!(config.n, 12);
        assert_eq!(config.v_ref, 60.0);
        assert_eq!(config.divergence_policy, DivergencePolicy::Zero);
        assert_eq!(config.solver.max_iterations, 40);
        assert_eq!(config.solver.max_solve_time_ms, 50);
        assert_eq!(config.port, 4567);
    }

    #[test]
    fn test_invalid_horizon_rejected() {
        let result = MpcConfig::from_toml_str("N = 1");
        assert!(matches!(result, Err(MpcError::Config(_))));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = MpcConfig::default();
        config.weight_delta_rate = -1.0;
        assert!(matches!(config.validate(), Err(MpcError::Config(_))));
    }

    #[test]
    fn test_shipped_parameter_file_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/params/mpc.toml");
        let config = MpcConfig::load(path).unwrap();
        assert_eq!(config, MpcConfig::default());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = MpcConfig::from_toml_str("Lf = \"long\"");
        assert!(matches!(result, Err(MpcError::Config(_))));
    }
}
