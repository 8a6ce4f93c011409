//! Nonlinear Model Predictive Control trajectory optimizer
//!
//! The horizon is `N` states `[x, y, psi, v, cte, epsi]` linked by the
//! kinematic bicycle error dynamics, and `N - 1` actuations `(delta, a)`.
//!
//! The dynamics and the initial-state constraints are equality constraints
//! that are eliminated by construction: the actuations are the only decision
//! variables and every state is obtained by rolling the model out from the
//! supplied initial state (single shooting). The objective is a sum of
//! weighted squares, so it is written as a residual vector and minimized with
//! a bounded Levenberg-Marquardt iteration:
//!
//! - residual Jacobian from forward sensitivities of the model
//! - variables pinned at a bound with the gradient pushing outwards are
//!   removed from the step (active set)
//! - steps are projected back onto the actuator bounds
//!
//! The solve is limited by an iteration count and a wall-clock budget. When
//! either runs out before convergence the result is `SolverDivergence`; a
//! partial iterate is never returned.

use std::time::{Duration, Instant};

use log::{debug, trace};
use nalgebra::{DMatrix, DVector, Matrix6xX, Vector6};

use crate::common::{MpcError, MpcResult, VehicleState};
use crate::config::{CostWeights, MpcConfig, SolverConfig};
use crate::path_tracking::bicycle::{Actuation, ErrorDynamics, KinematicBicycle};
use crate::path_tracking::polynomial::Polynomial;

/// Number of state variables per horizon step
pub const STATE_DIM: usize = 6;

/// Bound on the normalized throttle/brake actuation
pub const MAX_ACCEL: f64 = 1.0;

/// Optimizer output in the flattened layout
/// `[x; N] [y; N] [psi; N] [v; N] [cte; N] [epsi; N] [delta; N-1] [a; N-1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Horizon {
    n: usize,
    vars: Vec<f64>,
}

impl Horizon {
    /// Wrap a flattened variable vector for horizon length `n`
    pub fn from_flat(n: usize, vars: Vec<f64>) -> MpcResult<Self> {
        if n < 2 || vars.len() != Self::flat_len(n) {
            return Err(MpcError::invalid_input(format!(
                "horizon of length {} needs {} variables, got {}",
                n,
                Self::flat_len(n),
                vars.len()
            )));
        }
        Ok(Self { n, vars })
    }

    pub fn flat_len(n: usize) -> usize {
        STATE_DIM * n + 2 * n.saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn x_start(&self) -> usize {
        0
    }

    pub fn y_start(&self) -> usize {
        self.n
    }

    pub fn psi_start(&self) -> usize {
        2 * self.n
    }

    pub fn v_start(&self) -> usize {
        3 * self.n
    }

    pub fn cte_start(&self) -> usize {
        4 * self.n
    }

    pub fn epsi_start(&self) -> usize {
        5 * self.n
    }

    pub fn delta_start(&self) -> usize {
        6 * self.n
    }

    pub fn a_start(&self) -> usize {
        self.delta_start() + self.n - 1
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.vars
    }

    pub fn xs(&self) -> &[f64] {
        &self.vars[self.x_start()..self.y_start()]
    }

    pub fn ys(&self) -> &[f64] {
        &self.vars[self.y_start()..self.psi_start()]
    }

    pub fn psis(&self) -> &[f64] {
        &self.vars[self.psi_start()..self.v_start()]
    }

    pub fn vs(&self) -> &[f64] {
        &self.vars[self.v_start()..self.cte_start()]
    }

    pub fn ctes(&self) -> &[f64] {
        &self.vars[self.cte_start()..self.epsi_start()]
    }

    pub fn epsis(&self) -> &[f64] {
        &self.vars[self.epsi_start()..self.delta_start()]
    }

    pub fn deltas(&self) -> &[f64] {
        &self.vars[self.delta_start()..self.a_start()]
    }

    pub fn accels(&self) -> &[f64] {
        &self.vars[self.a_start()..]
    }

    pub fn state(&self, k: usize) -> Option<VehicleState> {
        if k >= self.n {
            return None;
        }
        Some(VehicleState::new(
            self.xs()[k],
            self.ys()[k],
            self.psis()[k],
            self.vs()[k],
            self.ctes()[k],
            self.epsis()[k],
        ))
    }

    /// The actuation applied now; the rest of the horizon is advisory
    pub fn first_actuation(&self) -> Actuation {
        Actuation::new(self.deltas()[0], self.accels()[0])
    }
}

/// Seed for the next solve: the previous actuations shifted by one step
#[derive(Debug, Clone, PartialEq)]
pub struct WarmStart {
    deltas: Vec<f64>,
    accels: Vec<f64>,
}

impl WarmStart {
    pub fn from_horizon(horizon: &Horizon) -> Self {
        fn shift(values: &[f64]) -> Vec<f64> {
            let mut shifted: Vec<f64> = values.iter().skip(1).copied().collect();
            shifted.push(*values.last().unwrap_or(&0.0));
            shifted
        }
        Self {
            deltas: shift(horizon.deltas()),
            accels: shift(horizon.accels()),
        }
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Converged optimizer output
#[derive(Debug, Clone)]
pub struct MpcSolution {
    pub horizon: Horizon,
    pub cost: f64,
    pub iterations: usize,
    pub solve_time: Duration,
}

impl MpcSolution {
    pub fn warm_start(&self) -> WarmStart {
        WarmStart::from_horizon(&self.horizon)
    }
}

/// The optimizer; holds only calibration and tuning, no per-solve state
#[derive(Debug, Clone)]
pub struct TrajectoryOptimizer {
    n: usize,
    dt: f64,
    max_steer: f64,
    v_ref: f64,
    model: KinematicBicycle,
    weights: CostWeights,
    solver: SolverConfig,
}

/// Per-solve problem data
struct Problem<'a> {
    opt: &'a TrajectoryOptimizer,
    dynamics: ErrorDynamics<'a>,
    initial: Vector6<f64>,
}

impl TrajectoryOptimizer {
    /// Build an optimizer from a validated copy of `config`.
    pub fn new(config: &MpcConfig) -> MpcResult<Self> {
        config.validate()?;
        Ok(Self {
            n: config.n,
            dt: config.dt,
            max_steer: config.max_steer_rad,
            v_ref: config.v_ref,
            model: KinematicBicycle::new(config.lf),
            weights: config.weights(),
            solver: config.solver,
        })
    }

    pub fn horizon_len(&self) -> usize {
        self.n
    }

    pub fn max_steer(&self) -> f64 {
        self.max_steer
    }

    /// Number of decision variables (`delta` then `a` for N - 1 steps)
    fn num_controls(&self) -> usize {
        2 * (self.n - 1)
    }

    fn delta_index(&self, k: usize) -> usize {
        k
    }

    fn accel_index(&self, k: usize) -> usize {
        self.n - 1 + k
    }

    fn lower_bound(&self, i: usize) -> f64 {
        if i < self.n - 1 {
            -self.max_steer
        } else {
            -MAX_ACCEL
        }
    }

    fn upper_bound(&self, i: usize) -> f64 {
        if i < self.n - 1 {
            self.max_steer
        } else {
            MAX_ACCEL
        }
    }

    fn clamp_to_bounds(&self, u: &mut DVector<f64>) {
        for i in 0..u.len() {
            u[i] = u[i].clamp(self.lower_bound(i), self.upper_bound(i));
        }
    }

    fn initial_controls(&self, warm_start: Option<&WarmStart>) -> DVector<f64> {
        let mut u = DVector::zeros(self.num_controls());
        match warm_start {
            Some(ws) if ws.len() == self.n - 1 && self.solver.warm_start => {
                for k in 0..self.n - 1 {
                    u[self.delta_index(k)] = ws.deltas[k];
                    u[self.accel_index(k)] = ws.accels[k];
                }
                if u.iter().any(|v| !v.is_finite()) {
                    u.fill(0.0);
                }
            }
            Some(ws) if ws.len() != self.n - 1 => {
                debug!("Ignoring warm start of length {} for horizon {}", ws.len(), self.n);
            }
            _ => {}
        }
        self.clamp_to_bounds(&mut u);
        u
    }

    /// Total horizon cost of an actuation sequence `[delta; N-1] [a; N-1]`
    pub fn cost(
        &self,
        state: &VehicleState,
        reference: &Polynomial,
        controls: &[f64],
    ) -> MpcResult<f64> {
        if controls.len() != self.num_controls() {
            return Err(MpcError::invalid_input(format!(
                "expected {} controls, got {}",
                self.num_controls(),
                controls.len()
            )));
        }
        let problem = self.problem(state, reference);
        let u = DVector::from_column_slice(controls);
        let states = problem.rollout(&u);
        Ok(problem.residuals(&states, &u).norm_squared())
    }

    fn problem<'a>(&'a self, state: &VehicleState, reference: &'a Polynomial) -> Problem<'a> {
        Problem {
            opt: self,
            dynamics: self.model.with_reference(reference),
            initial: state.to_vector(),
        }
    }

    /// Solve the horizon problem from `state` against `reference`.
    pub fn solve(
        &self,
        state: &VehicleState,
        reference: &Polynomial,
        warm_start: Option<&WarmStart>,
    ) -> MpcResult<MpcSolution> {
        if !state.is_finite() {
            return Err(MpcError::invalid_input("initial state is not finite"));
        }
        if reference.coeffs().is_empty() || reference.coeffs().iter().any(|c| !c.is_finite()) {
            return Err(MpcError::invalid_input("reference polynomial is not finite"));
        }

        let started = Instant::now();
        let budget = self.solver.time_budget();
        let problem = self.problem(state, reference);

        let mut u = self.initial_controls(warm_start);
        let mut states = problem.rollout(&u);
        let mut r = problem.residuals(&states, &u);
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Err(MpcError::SolverDivergence {
                iterations: 0,
                reason: "non-finite initial cost".to_string(),
            });
        }

        let mut lambda = self.solver.initial_damping;

        for iteration in 1..=self.solver.max_iterations {
            if started.elapsed() > budget {
                return Err(MpcError::SolverDivergence {
                    iterations: iteration - 1,
                    reason: format!("time budget of {:?} exhausted", budget),
                });
            }

            let jac = problem.jacobian(&states, &u);
            let grad = jac.transpose() * &r;

            let free: Vec<usize> = (0..u.len())
                .filter(|&i| {
                    let at_lower = u[i] <= self.lower_bound(i) && grad[i] > 0.0;
                    let at_upper = u[i] >= self.upper_bound(i) && grad[i] < 0.0;
                    !(at_lower || at_upper)
                })
                .collect();

            let projected_grad = free.iter().map(|&i| grad[i] * grad[i]).sum::<f64>().sqrt();
            trace!(
                "MPC iteration {}: cost {:.6e}, |grad| {:.3e}, lambda {:.1e}",
                iteration,
                cost,
                projected_grad,
                lambda
            );

            if free.is_empty() || projected_grad <= self.solver.gradient_tolerance * (1.0 + r.norm()) {
                return Ok(self.finish(&states, &u, cost, iteration, started));
            }

            let jf = jac.select_columns(free.iter());
            let gf = DVector::from_iterator(free.len(), free.iter().map(|&i| grad[i]));
            let hessian = jf.transpose() * &jf;

            // Increase damping until a step lowers the cost
            loop {
                let mut damped = hessian.clone();
                for i in 0..free.len() {
                    damped[(i, i)] += lambda * hessian[(i, i)].max(1e-9);
                }

                let accepted = match damped.cholesky() {
                    Some(chol) => {
                        let step = -chol.solve(&gf);
                        let mut candidate = u.clone();
                        for (j, &i) in free.iter().enumerate() {
                            candidate[i] += step[j];
                        }
                        self.clamp_to_bounds(&mut candidate);

                        let cand_states = problem.rollout(&candidate);
                        let cand_r = problem.residuals(&cand_states, &candidate);
                        let cand_cost = cand_r.norm_squared();

                        if cand_cost.is_finite() && cand_cost < cost {
                            let decrease = (cost - cand_cost) / cost.max(f64::MIN_POSITIVE);
                            let step_norm = (&candidate - &u).norm();
                            let converged = decrease <= self.solver.cost_tolerance
                                || step_norm <= self.solver.step_tolerance * (u.norm() + self.solver.step_tolerance);

                            u = candidate;
                            states = cand_states;
                            r = cand_r;
                            cost = cand_cost;
                            lambda = (lambda / self.solver.damping_factor).max(1e-12);

                            if converged {
                                return Ok(self.finish(&states, &u, cost, iteration, started));
                            }
                            true
                        } else {
                            false
                        }
                    }
                    None => false,
                };

                if accepted {
                    break;
                }

                lambda *= self.solver.damping_factor;
                if lambda > self.solver.max_damping {
                    // No descent direction left at working precision
                    debug!("MPC stalled at cost {:.6e} after {} iterations", cost, iteration);
                    return Ok(self.finish(&states, &u, cost, iteration, started));
                }
                if started.elapsed() > budget {
                    return Err(MpcError::SolverDivergence {
                        iterations: iteration,
                        reason: format!("time budget of {:?} exhausted", budget),
                    });
                }
            }
        }

        Err(MpcError::SolverDivergence {
            iterations: self.solver.max_iterations,
            reason: "iteration budget exhausted".to_string(),
        })
    }

    fn finish(
        &self,
        states: &[Vector6<f64>],
        u: &DVector<f64>,
        cost: f64,
        iterations: usize,
        started: Instant,
    ) -> MpcSolution {
        let n = self.n;
        let mut vars = vec![0.0; Horizon::flat_len(n)];
        for (k, s) in states.iter().enumerate() {
            for d in 0..STATE_DIM {
                vars[d * n + k] = s[d];
            }
        }
        vars[STATE_DIM * n..].copy_from_slice(u.as_slice());

        let solve_time = started.elapsed();
        debug!(
            "MPC converged in {} iterations ({:?}), cost {:.4e}",
            iterations, solve_time, cost
        );

        MpcSolution {
            horizon: Horizon { n, vars },
            cost,
            iterations,
            solve_time,
        }
    }
}

impl<'a> Problem<'a> {
    fn actuation(&self, u: &DVector<f64>, k: usize) -> Actuation {
        Actuation::new(u[self.opt.delta_index(k)], u[self.opt.accel_index(k)])
    }

    /// States 0..N from the initial state and the actuations
    fn rollout(&self, u: &DVector<f64>) -> Vec<Vector6<f64>> {
        let mut states = Vec::with_capacity(self.opt.n);
        states.push(self.initial);
        for k in 0..self.opt.n - 1 {
            let next = self.dynamics.step(&states[k], &self.actuation(u, k), self.opt.dt);
            states.push(next);
        }
        states
    }

    fn num_residuals(&self) -> usize {
        let n = self.opt.n;
        3 * n + 2 * (n - 1) + 2 * (n - 2)
    }

    /// Weighted residuals whose squared norm is the horizon cost:
    /// reference-state terms per state, actuator magnitude per actuation and
    /// actuator rate per consecutive actuation pair.
    fn residuals(&self, states: &[Vector6<f64>], u: &DVector<f64>) -> DVector<f64> {
        let n = self.opt.n;
        let w = &self.opt.weights;
        let (wc, we, wv) = (w.cte.sqrt(), w.epsi.sqrt(), w.v.sqrt());
        let (wd, wa) = (w.delta.sqrt(), w.accel.sqrt());
        let (wdd, wda) = (w.delta_rate.sqrt(), w.accel_rate.sqrt());

        let mut r = DVector::zeros(self.num_residuals());
        for (k, s) in states.iter().enumerate() {
            r[3 * k] = wc * s[4];
            r[3 * k + 1] = we * s[5];
            r[3 * k + 2] = wv * (s[3] - self.opt.v_ref);
        }

        let base = 3 * n;
        for k in 0..n - 1 {
            let act = self.actuation(u, k);
            r[base + 2 * k] = wd * act.delta;
            r[base + 2 * k + 1] = wa * act.accel;
        }

        let base = 3 * n + 2 * (n - 1);
        for k in 0..n.saturating_sub(2) {
            let cur = self.actuation(u, k);
            let next = self.actuation(u, k + 1);
            r[base + 2 * k] = wdd * (next.delta - cur.delta);
            r[base + 2 * k + 1] = wda * (next.accel - cur.accel);
        }

        r
    }

    /// d(residuals)/d(controls), with state sensitivities propagated forward
    /// through the model Jacobians.
    fn jacobian(&self, states: &[Vector6<f64>], u: &DVector<f64>) -> DMatrix<f64> {
        let n = self.opt.n;
        let m = u.len();
        let dt = self.opt.dt;
        let w = &self.opt.weights;
        let (wc, we, wv) = (w.cte.sqrt(), w.epsi.sqrt(), w.v.sqrt());

        let mut jac = DMatrix::zeros(self.num_residuals(), m);

        // Sensitivity of the current state to every control; zero at step 0
        let mut sens = Matrix6xX::<f64>::zeros(m);
        for k in 0..n {
            if k > 0 {
                let prev = &states[k - 1];
                let act = self.actuation(u, k - 1);
                let a = self.dynamics.state_jacobian(prev, &act, dt);
                let b = self.dynamics.control_jacobian(prev, &act, dt);
                sens = a * sens;
                let di = self.opt.delta_index(k - 1);
                let ai = self.opt.accel_index(k - 1);
                for row in 0..STATE_DIM {
                    sens[(row, di)] += b[(row, 0)];
                    sens[(row, ai)] += b[(row, 1)];
                }
            }
            for col in 0..m {
                jac[(3 * k, col)] = wc * sens[(4, col)];
                jac[(3 * k + 1, col)] = we * sens[(5, col)];
                jac[(3 * k + 2, col)] = wv * sens[(3, col)];
            }
        }

        let (wd, wa) = (w.delta.sqrt(), w.accel.sqrt());
        let base = 3 * n;
        for k in 0..n - 1 {
            jac[(base + 2 * k, self.opt.delta_index(k))] = wd;
            jac[(base + 2 * k + 1, self.opt.accel_index(k))] = wa;
        }

        let (wdd, wda) = (w.delta_rate.sqrt(), w.accel_rate.sqrt());
        let base = 3 * n + 2 * (n - 1);
        for k in 0..n.saturating_sub(2) {
            jac[(base + 2 * k, self.opt.delta_index(k))] = -wdd;
            jac[(base + 2 * k, self.opt.delta_index(k + 1))] = wdd;
            jac[(base + 2 * k + 1, self.opt.accel_index(k))] = -wda;
            jac[(base + 2 * k + 1, self.opt.accel_index(k + 1))] = wda;
        }

        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_tracking::polynomial::polyfit;

    fn test_config() -> MpcConfig {
        let mut config = MpcConfig::default();
        // Generous wall-clock budget so unoptimized test builds never time out
        config.solver.max_solve_time_ms = 5_000;
        config.solver.max_iterations = 500;
        config
    }

    fn straight_reference() -> Polynomial {
        Polynomial::new(vec![0.0, 0.0])
    }

    #[test]
    fn test_horizon_layout() {
        let n = 4;
        let vars: Vec<f64> = (0..Horizon::flat_len(n)).map(|i| i as f64).collect();
        let horizon = Horizon::from_flat(n, vars).unwrap();

        assert_eq!(horizon.xs(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(horizon.ys()[0], 4.0);
        assert_eq!(horizon.epsis()[3], 23.0);
        assert_eq!(horizon.deltas(), &[24.0, 25.0, 26.0]);
        assert_eq!(horizon.accels(), &[27.0, 28.0, 29.0]);
        assert_eq!(horizon.a_start(), 27);
        assert_eq!(horizon.first_actuation(), Actuation::new(24.0, 27.0));
        assert_eq!(horizon.state(1).unwrap().v, 13.0);
        assert!(horizon.state(4).is_none());

        assert!(Horizon::from_flat(n, vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_warm_start_shifts_by_one() {
        let n = 4;
        let mut vars = vec![0.0; Horizon::flat_len(n)];
        vars[24..27].copy_from_slice(&[0.1, 0.2, 0.3]);
        vars[27..30].copy_from_slice(&[1.0, 0.5, 0.25]);
        let ws = WarmStart::from_horizon(&Horizon::from_flat(n, vars).unwrap());
        assert_eq!(ws.deltas, vec![0.2, 0.3, 0.3]);
        assert_eq!(ws.accels, vec![0.5, 0.25, 0.25]);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let opt = TrajectoryOptimizer::new(&test_config()).unwrap();
        let reference = Polynomial::new(vec![1.5, 0.05, -0.002, 0.0001]);
        let state = VehicleState::local(25.0, -1.5, -0.05);
        let problem = opt.problem(&state, &reference);

        let m = opt.num_controls();
        let u = DVector::from_fn(m, |i, _| 0.01 * (i as f64 + 1.0).sin());
        let states = problem.rollout(&u);
        let jac = problem.jacobian(&states, &u);

        let h = 1e-6;
        for col in 0..m {
            let mut up = u.clone();
            let mut um = u.clone();
            up[col] += h;
            um[col] -= h;
            let rp = problem.residuals(&problem.rollout(&up), &up);
            let rm = problem.residuals(&problem.rollout(&um), &um);
            let fd = (rp - rm) / (2.0 * h);
            for row in 0..fd.len() {
                let tol = 1e-4 * (1.0 + fd[row].abs());
                assert!(
                    (jac[(row, col)] - fd[row]).abs() < tol,
                    "J[{},{}] = {} vs {}",
                    row,
                    col,
                    jac[(row, col)],
                    fd[row]
                );
            }
        }
    }

    #[test]
    fn test_trivial_fixed_point() {
        let config = test_config();
        let opt = TrajectoryOptimizer::new(&config).unwrap();
        let state = VehicleState::local(config.v_ref, 0.0, 0.0);

        let solution = opt.solve(&state, &straight_reference(), None).unwrap();
        for (&d, &a) in solution.horizon.deltas().iter().zip(solution.horizon.accels()) {
            assert!(d.abs() < 1e-6, "delta {}", d);
            assert!(a.abs() < 1e-6, "accel {}", a);
        }
        assert!(solution.cost < 1e-9);
    }

    #[test]
    fn test_initial_state_is_kept() {
        let opt = TrajectoryOptimizer::new(&test_config()).unwrap();
        let state = VehicleState::new(0.0, 0.0, 0.0, 20.0, 1.2, -0.1);
        let reference = Polynomial::new(vec![-1.2, 0.1]);
        let solution = opt.solve(&state, &reference, None).unwrap();
        assert_eq!(solution.horizon.state(0).unwrap(), state);
    }

    #[test]
    fn test_dynamics_hold_along_horizon() {
        let config = test_config();
        let opt = TrajectoryOptimizer::new(&config).unwrap();
        let reference = Polynomial::new(vec![2.0, 0.05, 0.001]);
        let state = VehicleState::local(30.0, -2.0, -0.05);
        let solution = opt.solve(&state, &reference, None).unwrap();

        let model = KinematicBicycle::new(config.lf).with_reference(&reference);
        let h = &solution.horizon;
        for k in 0..h.len() - 1 {
            let s = h.state(k).unwrap().to_vector();
            let act = Actuation::new(h.deltas()[k], h.accels()[k]);
            let expected = model.step(&s, &act, config.dt);
            let actual = h.state(k + 1).unwrap().to_vector();
            assert!((expected - actual).norm() < 1e-9, "step {} violates dynamics", k);
        }
    }

    #[test]
    fn test_actuator_bounds_hold() {
        let config = test_config();
        let opt = TrajectoryOptimizer::new(&config).unwrap();
        // Far off a curving path at low speed: steering saturates towards the path
        let reference = Polynomial::new(vec![15.0, 0.8, 0.02]);
        let state = VehicleState::local(5.0, -15.0, -0.67);
        let solution = opt.solve(&state, &reference, None).unwrap();

        for &d in solution.horizon.deltas() {
            assert!(d >= -config.max_steer_rad - 1e-12 && d <= config.max_steer_rad + 1e-12);
        }
        for &a in solution.horizon.accels() {
            assert!((-1.0 - 1e-12..=1.0 + 1e-12).contains(&a));
        }
        assert!((solution.horizon.deltas()[0] - config.max_steer_rad).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.n = 1;
        assert!(matches!(TrajectoryOptimizer::new(&config), Err(MpcError::Config(_))));
        config.n = 0;
        assert!(matches!(TrajectoryOptimizer::new(&config), Err(MpcError::Config(_))));
    }

    #[test]
    fn test_offset_path_steers_towards_it() {
        let config = test_config();
        let opt = TrajectoryOptimizer::new(&config).unwrap();
        let reference = polyfit(&[10.0, 20.0, 30.0, 40.0], &[5.0, 5.0, 5.0, 5.0], 3).unwrap();
        let state = VehicleState::local(20.0, -5.0, 0.0);
        let solution = opt.solve(&state, &reference, None).unwrap();

        let first = solution.horizon.first_actuation();
        assert!(first.delta > 0.0, "expected a left turn, got {}", first.delta);

        // The predicted lateral offset shrinks over the horizon
        let ys = solution.horizon.ys();
        assert!(ys[ys.len() - 1] > ys[0]);
    }

    #[test]
    fn test_warm_start_is_consistent() {
        let opt = TrajectoryOptimizer::new(&test_config()).unwrap();
        let reference = Polynomial::new(vec![1.0, 0.02]);
        let state = VehicleState::local(25.0, -1.0, -0.02);

        let cold = opt.solve(&state, &reference, None).unwrap();
        let warm = opt.solve(&state, &reference, Some(&cold.warm_start())).unwrap();
        let a = cold.horizon.first_actuation();
        let b = warm.horizon.first_actuation();
        assert!((a.delta - b.delta).abs() < 5e-3);
        assert!((a.accel - b.accel).abs() < 5e-3);
    }

    #[test]
    fn test_mismatched_warm_start_is_ignored() {
        let opt = TrajectoryOptimizer::new(&test_config()).unwrap();
        let bogus = WarmStart {
            deltas: vec![0.3; 3],
            accels: vec![1.0; 3],
        };
        let state = VehicleState::local(40.0, 0.0, 0.0);
        let solution = opt.solve(&state, &straight_reference(), Some(&bogus)).unwrap();
        assert!(solution.horizon.first_actuation().delta.abs() < 1e-6);
    }

    #[test]
    fn test_iteration_budget_reports_divergence() {
        let mut config = test_config();
        config.solver.max_iterations = 1;
        config.solver.cost_tolerance = 1e-300;
        config.solver.step_tolerance = 1e-300;
        config.solver.gradient_tolerance = 1e-300;
        let opt = TrajectoryOptimizer::new(&config).unwrap();
        let reference = Polynomial::new(vec![5.0, 0.1, 0.01]);
        let state = VehicleState::local(10.0, -5.0, -0.1);

        let result = opt.solve(&state, &reference, None);
        assert!(matches!(result, Err(MpcError::SolverDivergence { .. })));
    }

    #[test]
    fn test_non_finite_state_rejected() {
        let opt = TrajectoryOptimizer::new(&test_config()).unwrap();
        let state = VehicleState::local(f64::NAN, 0.0, 0.0);
        let result = opt.solve(&state, &straight_reference(), None);
        assert!(matches!(result, Err(MpcError::InvalidInput(_))));
    }

    #[test]
    fn test_cost_prefers_smooth_controls() {
        let opt = TrajectoryOptimizer::new(&test_config()).unwrap();
        let state = VehicleState::local(40.0, 0.0, 0.0);
        let m = 2 * (opt.horizon_len() - 1);

        let zero = opt.cost(&state, &straight_reference(), &vec![0.0; m]).unwrap();
        let mut jerky = vec![0.0; m];
        for (i, v) in jerky.iter_mut().take(m / 2).enumerate() {
            *v = if i % 2 == 0 { 0.01 } else { -0.01 };
        }
        let jerky_cost = opt.cost(&state, &straight_reference(), &jerky).unwrap();
        assert!(zero < 1e-12);
        assert!(jerky_cost > zero);
        assert!(opt.cost(&state, &straight_reference(), &[0.0]).is_err());
    }
}
