//! Reference path polynomial and least-squares fitter
//!
//! The fit is solved through a Householder QR factorization of the
//! (column-scaled) Vandermonde matrix instead of the normal equations.
//! Rank deficiency is detected from the diagonal of R and reported as
//! `FitFailure` rather than returned as garbage coefficients.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::common::{MpcError, MpcResult};

/// Relative size of the smallest admissible diagonal entry of R
const RANK_TOLERANCE: f64 = 1e-10;

/// Polynomial with coefficients in increasing power order
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// f(x), evaluated with Horner's scheme
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
    }

    /// f'(x)
    pub fn derivative(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, &c)| acc * x + i as f64 * c)
    }

    /// f''(x)
    pub fn second_derivative(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (i, &c)| acc * x + (i * (i - 1)) as f64 * c)
    }

    /// Tangent direction of the curve y = f(x) at x, in (-pi/2, pi/2)
    pub fn tangent_heading(&self, x: f64) -> f64 {
        self.derivative(x).atan()
    }
}

/// Least-squares polynomial fitter with a bounded degree
#[derive(Debug, Clone, Copy)]
pub struct PolynomialFitter {
    max_degree: usize,
}

impl PolynomialFitter {
    pub fn new(max_degree: usize) -> Self {
        Self { max_degree }
    }

    /// Fit with the configured maximum degree, clamped to `count - 1`
    pub fn fit(&self, xs: &[f64], ys: &[f64]) -> MpcResult<Polynomial> {
        polyfit(xs, ys, self.max_degree)
    }

    /// Fit, stepping the degree down on `FitFailure` until degree 1.
    ///
    /// If even a line cannot be fitted the last failure is returned.
    pub fn fit_with_fallback(&self, xs: &[f64], ys: &[f64]) -> MpcResult<Polynomial> {
        let mut degree = clamp_degree(self.max_degree, xs.len());
        let mut result = self.fit(xs, ys);
        while let Err(MpcError::FitFailure(reason)) = &result {
            if degree <= 1 {
                break;
            }
            debug!("Degree {} fit failed ({}), retrying with degree {}", degree, reason, degree - 1);
            degree -= 1;
            result = polyfit(xs, ys, degree);
        }
        result
    }
}

fn clamp_degree(requested: usize, count: usize) -> usize {
    requested.min(count.saturating_sub(1))
}

/// Fit `ys ~ f(xs)` with a polynomial of degree `min(degree, count - 1)`.
///
/// Fails with `InvalidInput` for fewer than two points, mismatched lengths,
/// a requested degree of zero or non-finite samples, and with `FitFailure`
/// when the design matrix is rank deficient.
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> MpcResult<Polynomial> {
    if xs.len() != ys.len() {
        return Err(MpcError::invalid_input(format!(
            "polyfit x/y length mismatch ({} vs {})",
            xs.len(),
            ys.len()
        )));
    }
    if xs.len() < 2 {
        return Err(MpcError::invalid_input(format!(
            "polyfit needs at least 2 points, got {}",
            xs.len()
        )));
    }
    if degree < 1 {
        return Err(MpcError::invalid_input("polyfit degree must be >= 1"));
    }
    if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
        return Err(MpcError::invalid_input("polyfit samples must be finite"));
    }

    let degree = clamp_degree(degree, xs.len());
    let rows = xs.len();
    let cols = degree + 1;

    // Scale x into [-1, 1] so the Vandermonde columns have comparable norms
    let scale = xs.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let a = DMatrix::from_fn(rows, cols, |i, j| (xs[i] / scale).powi(j as i32));
    let b = DVector::from_column_slice(ys);

    let qr = a.qr();
    let r = qr.r();
    let qtb = qr.q().transpose() * b;

    let max_diag = r.diagonal().iter().fold(0.0_f64, |m, d| m.max(d.abs()));
    let min_diag = r.diagonal().iter().fold(f64::INFINITY, |m, d| m.min(d.abs()));
    if !(max_diag > 0.0) || min_diag <= RANK_TOLERANCE * max_diag {
        return Err(MpcError::FitFailure(format!(
            "rank deficient design matrix for degree {} (|R| range {:.3e}..{:.3e})",
            degree, min_diag, max_diag
        )));
    }

    let scaled = r
        .solve_upper_triangular(&qtb)
        .ok_or_else(|| MpcError::FitFailure("singular triangular factor".to_string()))?;

    let coeffs: Vec<f64> = scaled
        .iter()
        .enumerate()
        .map(|(j, c)| c / scale.powi(j as i32))
        .collect();

    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(MpcError::FitFailure("non-finite coefficients".to_string()));
    }

    Ok(Polynomial::new(coeffs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_squared_residual(poly: &Polynomial, xs: &[f64], ys: &[f64]) -> f64 {
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| (poly.eval(x) - y).powi(2))
            .sum::<f64>()
            / xs.len() as f64
    }

    #[test]
    fn test_eval_and_derivatives() {
        // f(x) = 1 + 2x + 3x^2 + 4x^3
        let poly = Polynomial::new(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(poly.degree(), 3);
        assert!((poly.eval(2.0) - 49.0).abs() < 1e-12);
        assert!((poly.derivative(2.0) - 62.0).abs() < 1e-12);
        assert!((poly.second_derivative(2.0) - 54.0).abs() < 1e-12);
        assert!((poly.derivative(0.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let poly = polyfit(&xs, &ys, 1).unwrap();
        assert!((poly.coeffs()[0] - 1.0).abs() < 1e-9);
        assert!((poly.coeffs()[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_interpolation() {
        let xs = [10.0, 20.0, 30.0, 40.0];
        let ys = [1.0, -2.0, 0.5, 4.0];
        let poly = polyfit(&xs, &ys, 3).unwrap();
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            assert!((poly.eval(x) - y).abs() < 1e-8, "f({}) = {} != {}", x, poly.eval(x), y);
        }
    }

    #[test]
    fn test_degree_is_clamped() {
        let poly = polyfit(&[0.0, 1.0, 2.0], &[0.0, 1.0, 4.0], 5).unwrap();
        assert_eq!(poly.degree(), 2);
        assert!((poly.coeffs()[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fitter_clamps_to_point_count() {
        let fitter = PolynomialFitter::new(3);
        let line = fitter.fit(&[0.0, 10.0], &[1.0, 6.0]).unwrap();
        assert_eq!(line.degree(), 1);
        assert!((line.coeffs()[1] - 0.5).abs() < 1e-9);

        let cubic = fitter
            .fit(&[0.0, 1.0, 2.0, 3.0, 4.0], &[0.0, 1.0, 8.0, 27.0, 64.0])
            .unwrap();
        assert_eq!(cubic.degree(), 3);
        assert!((cubic.eval(5.0) - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_residual_non_increasing_with_degree() {
        let xs = [-3.0, -1.5, 0.0, 2.0, 4.5, 6.0, 9.0];
        let ys = [2.0, 0.3, -0.4, 1.1, 3.9, 7.5, 12.0];
        let mut prev = f64::INFINITY;
        for degree in 1..=4 {
            let poly = polyfit(&xs, &ys, degree).unwrap();
            let residual = mean_squared_residual(&poly, &xs, &ys);
            assert!(residual <= prev + 1e-9, "degree {} residual {} > {}", degree, residual, prev);
            prev = residual;
        }
    }

    #[test]
    fn test_too_few_points() {
        assert!(matches!(polyfit(&[], &[], 3), Err(MpcError::InvalidInput(_))));
        assert!(matches!(polyfit(&[1.0], &[1.0], 3), Err(MpcError::InvalidInput(_))));
    }

    #[test]
    fn test_length_mismatch() {
        let result = polyfit(&[1.0, 2.0, 3.0], &[1.0, 2.0], 2);
        assert!(matches!(result, Err(MpcError::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_x_is_fit_failure() {
        let result = polyfit(&[1.0, 1.0, 2.0], &[0.0, 1.0, 2.0], 2);
        assert!(matches!(result, Err(MpcError::FitFailure(_))));

        let result = polyfit(&[5.0, 5.0], &[0.0, 1.0], 1);
        assert!(matches!(result, Err(MpcError::FitFailure(_))));
    }

    #[test]
    fn test_fallback_lowers_degree() {
        let fitter = PolynomialFitter::new(3);
        let poly = fitter.fit_with_fallback(&[1.0, 1.0, 2.0], &[0.0, 1.0, 2.0]).unwrap();
        assert_eq!(poly.degree(), 1);
        assert!(poly.coeffs().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_fallback_gives_up_below_degree_one() {
        let fitter = PolynomialFitter::new(3);
        let result = fitter.fit_with_fallback(&[2.0, 2.0, 2.0], &[0.0, 1.0, 2.0]);
        assert!(matches!(result, Err(MpcError::FitFailure(_))));
    }
}
