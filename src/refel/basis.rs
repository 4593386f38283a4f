//! Legendre bases, Vandermonde matrices and 1D point sets on `[-1, 1]`.

use nalgebra::{DMatrix, SymmetricEigen};

/// Unnormalised Legendre polynomial `P_n(x)` and its derivative.
fn legendre_raw(n: usize, x: f64) -> (f64, f64) {
    let (mut p_prev, mut p) = (0.0, 1.0);
    let mut dp = 0.0;
    for k in 0..n {
        let kf = k as f64;
        let p_next = ((2.0 * kf + 1.0) * x * p - kf * p_prev) / (kf + 1.0);
        // P'_{k+1} = (k + 1) P_k + x P'_k
        let dp_next = (kf + 1.0) * p + x * dp;
        p_prev = p;
        p = p_next;
        dp = dp_next;
    }
    (p, dp)
}

/// Orthonormal Legendre polynomial of degree `n` and its derivative at `x`.
pub fn legendre(n: usize, x: f64) -> (f64, f64) {
    let scale = ((2 * n + 1) as f64 / 2.0).sqrt();
    let (p, dp) = legendre_raw(n, x);
    (p * scale, dp * scale)
}

/// `V[i][j] = P_j(points[i])` for the first `modes` orthonormal polynomials.
pub fn vandermonde(points: &[f64], modes: usize) -> DMatrix<f64> {
    DMatrix::from_fn(points.len(), modes, |i, j| legendre(j, points[i]).0)
}

/// `V'[i][j] = P_j'(points[i])`.
pub fn grad_vandermonde(points: &[f64], modes: usize) -> DMatrix<f64> {
    DMatrix::from_fn(points.len(), modes, |i, j| legendre(j, points[i]).1)
}

/// `order + 1` equally spaced points including both end points.
pub fn equispaced_points(order: usize) -> Vec<f64> {
    (0..=order)
        .map(|i| -1.0 + 2.0 * i as f64 / order as f64)
        .collect()
}

/// Nodes of the two half intervals: `(u - 1) / 2` for child 0 and `(u + 1) / 2` for child 1.
pub fn child_points(parent: &[f64], child: usize) -> Vec<f64> {
    let shift = if child == 0 { -1.0 } else { 1.0 };
    parent.iter().map(|&u| 0.5 * (u + shift)).collect()
}

/// Gauss-Legendre points and weights (Golub-Welsch).
pub fn gauss_points(n: usize) -> (Vec<f64>, Vec<f64>) {
    let betas: Vec<f64> = (1..n)
        .map(|i| 0.5 / (1.0 - (2.0 * i as f64).powi(-2)).sqrt())
        .collect();

    let jacobi: DMatrix<f64> = DMatrix::from_fn(n, n, |r, c| {
        if r == c + 1 {
            betas[c]
        } else if c == r + 1 {
            betas[r]
        } else {
            0.0
        }
    });

    let eigen = SymmetricEigen::new(jacobi);
    let mut xw: Vec<(f64, f64)> = eigen
        .eigenvalues
        .iter()
        .copied()
        .zip(eigen.eigenvectors.row(0).iter().map(|v| v.powi(2) * 2.0))
        .collect();
    xw.sort_by(|a, b| a.0.total_cmp(&b.0));
    xw.into_iter().unzip()
}

/// Gauss-Lobatto-Legendre points and weights for `order + 1` points.
///
/// Interior points are the roots of `P_order'`, i.e. the eigenvalues of the
/// Jacobi matrix of the (1, 1) Jacobi polynomials.
pub fn gauss_lobatto_points(order: usize) -> (Vec<f64>, Vec<f64>) {
    let interior = order.saturating_sub(1);
    let mut points = Vec::with_capacity(order + 1);
    points.push(-1.0);
    if interior > 0 {
        let betas: Vec<f64> = (1..interior)
            .map(|k| {
                let k = k as f64;
                (k * (k + 2.0) / ((2.0 * k + 1.0) * (2.0 * k + 3.0))).sqrt()
            })
            .collect();
        let jacobi = DMatrix::from_fn(interior, interior, |r, c| {
            if r == c + 1 {
                betas[c]
            } else if c == r + 1 {
                betas[r]
            } else {
                0.0
            }
        });
        let mut roots: Vec<f64> = SymmetricEigen::new(jacobi)
            .eigenvalues
            .iter()
            .copied()
            .collect();
        roots.sort_by(|a, b| a.total_cmp(b));
        points.extend(roots);
    }
    points.push(1.0);

    let p = order as f64;
    let weights = points
        .iter()
        .map(|&x| {
            let pn = legendre_raw(order, x).0;
            2.0 / (p * (p + 1.0) * pn * pn)
        })
        .collect();
    (points, weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legendre_low_degrees() {
        let x = 0.3;
        let (p2, dp2) = legendre_raw(2, x);
        assert!((p2 - 0.5 * (3.0 * x * x - 1.0)).abs() < 1e-15);
        assert!((dp2 - 3.0 * x).abs() < 1e-15);
        let (p3, dp3) = legendre_raw(3, x);
        assert!((p3 - 0.5 * (5.0 * x * x * x - 3.0 * x)).abs() < 1e-15);
        assert!((dp3 - 0.5 * (15.0 * x * x - 3.0)).abs() < 1e-15);
    }

    #[test]
    fn gauss_weights_integrate_polynomials() {
        let (x, w) = gauss_points(4);
        assert!((w.iter().sum::<f64>() - 2.0).abs() < 1e-13);
        // exact up to degree 7
        let int: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(6)).sum();
        assert!((int - 2.0 / 7.0).abs() < 1e-13);
    }

    #[test]
    fn gll_points_cubic() {
        let (x, w) = gauss_lobatto_points(3);
        assert_eq!(x.len(), 4);
        assert_eq!(x[0], -1.0);
        assert_eq!(x[3], 1.0);
        assert!((x[1] + 5f64.sqrt().recip()).abs() < 1e-14);
        assert!((x[2] - 5f64.sqrt().recip()).abs() < 1e-14);
        assert!((w[0] - 1.0 / 6.0).abs() < 1e-14);
        assert!((w[1] - 5.0 / 6.0).abs() < 1e-14);
    }

    #[test]
    fn gll_linear_has_only_endpoints() {
        let (x, w) = gauss_lobatto_points(1);
        assert_eq!(x, vec![-1.0, 1.0]);
        assert!((w[0] - 1.0).abs() < 1e-15 && (w[1] - 1.0).abs() < 1e-15);
    }
}
