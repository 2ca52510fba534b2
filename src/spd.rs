//! Geometry of symmetric positive-definite (SPD) matrices.
//!
//! Covariance matrices of EEG trials live on the SPD manifold, so class
//! means and distances are computed under a Riemannian metric instead of
//! Euclidean averaging. Two metrics are provided:
//!
//! - affine-invariant Riemannian: `d(A, B) = sqrt(Σ ln² λ_i(A⁻¹B))`,
//!   mean by fixed-point iteration (no closed form);
//! - log-Euclidean: `d(A, B) = ‖log A − log B‖_F`,
//!   mean in closed form as `exp(Σ w_i log X_i)`.
//!
//! All eigendecompositions go through nalgebra's `SymmetricEigen`.
use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Symmetric eigendecomposition. Returns `(eigenvalues, eigenvectors)`
/// with eigenvectors as columns.
pub fn sym_eig(m: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let eig = SymmetricEigen::new(m.clone());
    (eig.eigenvalues, eig.eigenvectors)
}

/// Apply `f` to the eigenvalues of a symmetric matrix: `V f(Λ) Vᵀ`.
fn eig_map(m: &DMatrix<f64>, f: impl Fn(f64) -> f64) -> DMatrix<f64> {
    let (vals, vecs) = sym_eig(m);
    let mapped = DVector::from_iterator(vals.len(), vals.iter().map(|&v| f(v)));
    &vecs * DMatrix::from_diagonal(&mapped) * vecs.transpose()
}

/// Matrix logarithm of an SPD matrix.
pub fn logm(m: &DMatrix<f64>) -> DMatrix<f64> {
    eig_map(m, f64::ln)
}

/// Matrix exponential of a symmetric matrix.
pub fn expm(m: &DMatrix<f64>) -> DMatrix<f64> {
    eig_map(m, f64::exp)
}

/// Matrix square root of an SPD matrix.
pub fn sqrtm(m: &DMatrix<f64>) -> DMatrix<f64> {
    eig_map(m, f64::sqrt)
}

/// Inverse matrix square root of an SPD matrix.
pub fn invsqrtm(m: &DMatrix<f64>) -> DMatrix<f64> {
    eig_map(m, |v| 1.0 / v.sqrt())
}

/// Check that `m` is symmetric with all eigenvalues > `tol`.
pub fn is_spd(m: &DMatrix<f64>, tol: f64) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let sym_err = (m - m.transpose()).norm();
    if sym_err > tol * m.norm().max(1.0) {
        return false;
    }
    let (vals, _) = sym_eig(m);
    vals.iter().all(|&v| v.is_finite() && v > tol)
}

/// Affine-invariant Riemannian distance:
/// `sqrt(Σ ln² λ_i)` over the eigenvalues of `A^{-1/2} B A^{-1/2}`.
pub fn distance_riemann(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    let a_isq = invsqrtm(a);
    let w = &a_isq * b * &a_isq;
    let (vals, _) = sym_eig(&w);
    vals.iter().map(|&v| v.ln().powi(2)).sum::<f64>().sqrt()
}

/// Log-Euclidean distance: `‖log A − log B‖_F`.
pub fn distance_logeuclid(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (logm(a) - logm(b)).norm()
}

/// Normalise `weights` (uniform when `None`) to sum to 1.
fn normalized_weights(n: usize, weights: Option<&[f64]>) -> Result<Vec<f64>> {
    let w: Vec<f64> = match weights {
        Some(w) => {
            if w.len() != n {
                bail!("expected {n} sample weights, got {}", w.len());
            }
            w.to_vec()
        }
        None => vec![1.0; n],
    };
    let s: f64 = w.iter().sum();
    if !(s.is_finite() && s > 0.0) || w.iter().any(|&v| v < 0.0) {
        bail!("sample weights must be non-negative with a positive sum");
    }
    Ok(w.into_iter().map(|v| v / s).collect())
}

/// Weighted Fréchet mean under the affine-invariant Riemannian metric.
///
/// Standard fixed-point iteration with adaptive step size: starting from
/// the weighted arithmetic mean, repeatedly map all matrices to the
/// tangent space at the current estimate, average, and map back, until
/// the tangent-space mean has Frobenius norm below `tol`.
///
/// Returns the last iterate when `max_iter` is reached (the iteration is
/// a contraction on SPD inputs; non-convergence within 50 steps only
/// happens on near-singular data). Non-finite intermediate values are an
/// error.
pub fn mean_riemann(
    mats: &[DMatrix<f64>],
    weights: Option<&[f64]>,
) -> Result<DMatrix<f64>> {
    mean_riemann_iter(mats, weights, 1e-8, 50)
}

/// [`mean_riemann`] with explicit tolerance and iteration cap.
pub fn mean_riemann_iter(
    mats: &[DMatrix<f64>],
    weights: Option<&[f64]>,
    tol: f64,
    max_iter: usize,
) -> Result<DMatrix<f64>> {
    if mats.is_empty() {
        bail!("cannot compute the mean of zero matrices");
    }
    let w = normalized_weights(mats.len(), weights)?;
    let dim = mats[0].nrows();

    // Init: weighted arithmetic mean.
    let mut c = DMatrix::<f64>::zeros(dim, dim);
    for (x, &wi) in mats.iter().zip(&w) {
        c += x * wi;
    }

    let mut nu = 1.0_f64;
    let mut tau = f64::INFINITY;
    for _ in 0..max_iter {
        let c_sq = sqrtm(&c);
        let c_isq = invsqrtm(&c);

        // Tangent-space mean at the current estimate.
        let mut j = DMatrix::<f64>::zeros(dim, dim);
        for (x, &wi) in mats.iter().zip(&w) {
            j += logm(&(&c_isq * x * &c_isq)) * wi;
        }
        if j.iter().any(|v| !v.is_finite()) {
            bail!("geometric mean iteration produced non-finite values (singular input?)");
        }

        let crit = j.norm();
        if crit < tol || nu < tol {
            break;
        }

        c = &c_sq * expm(&(&j * nu)) * &c_sq;

        // Step-size control: shrink slowly while improving, halve otherwise.
        let h = nu * crit;
        if h < tau {
            nu *= 0.95;
            tau = h;
        } else {
            nu *= 0.5;
        }
    }
    Ok(c)
}

/// Weighted log-Euclidean mean: `exp(Σ w_i log X_i)` (closed form).
pub fn mean_logeuclid(
    mats: &[DMatrix<f64>],
    weights: Option<&[f64]>,
) -> Result<DMatrix<f64>> {
    if mats.is_empty() {
        bail!("cannot compute the mean of zero matrices");
    }
    let w = normalized_weights(mats.len(), weights)?;
    let dim = mats[0].nrows();

    let mut acc = DMatrix::<f64>::zeros(dim, dim);
    for (x, &wi) in mats.iter().zip(&w) {
        acc += logm(x) * wi;
    }
    if acc.iter().any(|v| !v.is_finite()) {
        bail!("log-Euclidean mean produced non-finite values (singular input?)");
    }
    Ok(expm(&acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(vals: &[f64]) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_row_slice(vals))
    }

    #[test]
    fn log_exp_roundtrip() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let back = expm(&logm(&m));
        for (a, b) in m.iter().zip(back.iter()) {
            approx::assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn invsqrtm_whitens() {
        let m = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]);
        let isq = invsqrtm(&m);
        let white = &isq * &m * &isq;
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                approx::assert_abs_diff_eq!(white[(i, j)], expect, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        let m = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]);
        approx::assert_abs_diff_eq!(distance_riemann(&m, &m), 0.0, epsilon = 1e-7);
        approx::assert_abs_diff_eq!(distance_logeuclid(&m, &m), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn riemann_distance_of_scaled_identity() {
        // d(I, e·I) = sqrt(Σ ln² e) = sqrt(dim).
        let dim = 3;
        let a = DMatrix::<f64>::identity(dim, dim);
        let b = &a * std::f64::consts::E;
        approx::assert_abs_diff_eq!(
            distance_riemann(&a, &b),
            (dim as f64).sqrt(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn mean_of_identical_matrices_is_that_matrix() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.5]);
        let mean = mean_riemann(&[m.clone(), m.clone(), m.clone()], None).unwrap();
        for (a, b) in m.iter().zip(mean.iter()) {
            approx::assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn logeuclid_mean_of_diagonals_is_elementwise_geometric() {
        let a = diag(&[1.0, 4.0]);
        let b = diag(&[4.0, 1.0]);
        let mean = mean_logeuclid(&[a, b], None).unwrap();
        approx::assert_abs_diff_eq!(mean[(0, 0)], 2.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(mean[(1, 1)], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn riemann_mean_commuting_case() {
        // For commuting (diagonal) matrices the Riemannian mean equals
        // the elementwise geometric mean.
        let a = diag(&[1.0, 8.0]);
        let b = diag(&[4.0, 2.0]);
        let mean = mean_riemann(&[a, b], None).unwrap();
        approx::assert_abs_diff_eq!(mean[(0, 0)], 2.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(mean[(1, 1)], 4.0, epsilon = 1e-6);
    }

    #[test]
    fn weighted_mean_moves_toward_upweighted_sample() {
        let a = diag(&[1.0, 1.0]);
        let b = diag(&[9.0, 9.0]);
        let even = mean_riemann(&[a.clone(), b.clone()], Some(&[1.0, 1.0])).unwrap();
        let tilted = mean_riemann(&[a, b], Some(&[1.0, 3.0])).unwrap();
        assert!(tilted[(0, 0)] > even[(0, 0)]);
    }

    #[test]
    fn is_spd_rejects_indefinite() {
        let m = diag(&[1.0, -0.5]);
        assert!(!is_spd(&m, 1e-12));
        assert!(is_spd(&diag(&[1.0, 0.5]), 1e-12));
    }

    #[test]
    fn weights_must_be_valid() {
        let m = diag(&[1.0, 1.0]);
        assert!(mean_riemann(&[m.clone()], Some(&[-1.0])).is_err());
        assert!(mean_riemann(&[m], Some(&[1.0, 1.0])).is_err());
    }
}
