//! Small dense linear algebra helpers for per-gene model fits
//!
//! Model matrices here have a handful of columns, so plain Cholesky and
//! Gaussian elimination on `ndarray` buffers are sufficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Cholesky factor `L` of a symmetric positive definite matrix (`A = L L'`).
///
/// Non-positive pivots are floored at a tiny value so nearly singular
/// weighted cross-products still produce a usable factor.
pub fn cholesky(a: ArrayView2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                l[[i, j]] = sum.max(1e-12).sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    l
}

/// Solve `A x = b` for symmetric positive definite `A`
pub fn solve_spd(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let l = cholesky(a);
    solve_with_cholesky(&l, b)
}

fn solve_with_cholesky(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * y[j];
        }
        y[i] = sum / l[[i, i]];
    }
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Inverse of a symmetric positive definite matrix
pub fn invert_spd(a: ArrayView2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let l = cholesky(a);
    let mut inv = Array2::zeros((n, n));
    for col in 0..n {
        let mut e = Array1::zeros(n);
        e[col] = 1.0;
        let x = solve_with_cholesky(&l, e.view());
        inv.column_mut(col).assign(&x);
    }
    inv
}

/// `log |A|` for symmetric positive definite `A`; `None` if `A` is numerically singular
pub fn log_det_spd(a: ArrayView2<f64>) -> Option<f64> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    let mut log_det = 0.0;
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 1e-300 {
                    return None;
                }
                l[[i, j]] = sum.sqrt();
                log_det += 2.0 * l[[i, j]].ln();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(log_det)
}

/// `X' diag(w) X`
pub fn weighted_crossprod(x: ArrayView2<f64>, weights: &[f64]) -> Array2<f64> {
    let p = x.ncols();
    let mut out = Array2::zeros((p, p));
    for (i, row) in x.rows().into_iter().enumerate() {
        let w = weights[i];
        for j in 0..p {
            let xj = w * row[j];
            for k in 0..=j {
                out[[j, k]] += xj * row[k];
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            out[[k, j]] = out[[j, k]];
        }
    }
    out
}

/// Quadratic form `c' A c`
pub fn quadratic_form(a: ArrayView2<f64>, c: ArrayView1<f64>) -> f64 {
    c.dot(&a.dot(&c))
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in descending order and the matching eigenvectors as
/// columns.
pub fn symmetric_eigen(a: ArrayView2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut m = a.to_owned();
    let mut v = Array2::eye(n);

    for _sweep in 0..100 {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| m[[i, j]] * m[[i, j]])
            .sum();
        if off < 1e-22 {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                if m[[p, q]].abs() < 1e-300 {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * m[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                for k in 0..n {
                    let (mkp, mkq) = (m[[k, p]], m[[k, q]]);
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let (mpk, mqk) = (m[[p, k]], m[[q, k]]);
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[j, j]].total_cmp(&m[[i, i]]));
    let values = order.iter().map(|&i| m[[i, i]]).collect();
    let mut vectors = Array2::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (values, vectors)
}

/// Numerical rank by Householder QR with column pivoting
pub fn qr_rank(matrix: ArrayView2<f64>) -> usize {
    let (nrow, ncol) = matrix.dim();
    let k = nrow.min(ncol);
    let mut r = matrix.to_owned();

    let mut col_norms: Vec<f64> = (0..ncol)
        .map(|j| r.column(j).iter().map(|v| v * v).sum())
        .collect();
    let mut diag = Vec::with_capacity(k);

    for step in 0..k {
        let best = (step..ncol)
            .max_by(|&a, &b| col_norms[a].total_cmp(&col_norms[b]))
            .unwrap_or(step);
        if best != step {
            for i in 0..nrow {
                r.swap([i, step], [i, best]);
            }
            col_norms.swap(step, best);
        }

        let norm: f64 = (step..nrow).map(|i| r[[i, step]] * r[[i, step]]).sum::<f64>().sqrt();
        if norm == 0.0 {
            diag.push(0.0);
            continue;
        }
        let alpha = if r[[step, step]] > 0.0 { -norm } else { norm };
        let mut v: Vec<f64> = (step..nrow).map(|i| r[[i, step]]).collect();
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();
        if v_norm_sq > 0.0 {
            for j in step..ncol {
                let dot: f64 = (step..nrow).map(|i| v[i - step] * r[[i, j]]).sum();
                let f = 2.0 * dot / v_norm_sq;
                for i in step..nrow {
                    r[[i, j]] -= f * v[i - step];
                }
            }
        }
        diag.push(r[[step, step]].abs());
        for j in (step + 1)..ncol {
            col_norms[j] = (step + 1..nrow).map(|i| r[[i, j]] * r[[i, j]]).sum();
        }
    }

    let max_diag = diag.iter().cloned().fold(0.0, f64::max);
    if max_diag == 0.0 {
        return 0;
    }
    let tol = (nrow.max(ncol) as f64) * f64::EPSILON * max_diag * 1e3;
    diag.iter().filter(|&&d| d > tol).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_spd() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = solve_spd(a.view(), b.view());
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-10);
        assert!((back[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_invert_and_log_det() {
        let a = array![[2.0, 0.5, 0.0], [0.5, 1.0, 0.2], [0.0, 0.2, 3.0]];
        let inv = invert_spd(a.view());
        let eye = a.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((eye[[i, j]] - expected).abs() < 1e-10);
            }
        }
        let det: f64 = 2.0 * (1.0 * 3.0 - 0.04) - 0.5 * (0.5 * 3.0);
        assert!((log_det_spd(a.view()).unwrap() - det.ln()).abs() < 1e-10);
        assert!(log_det_spd(array![[0.0, 0.0], [0.0, 1.0]].view()).is_none());
    }

    #[test]
    fn test_weighted_crossprod() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 1.0]];
        let xtwx = weighted_crossprod(x.view(), &[1.0, 2.0, 3.0]);
        assert_eq!(xtwx, array![[6.0, 5.0], [5.0, 5.0]]);
    }

    #[test]
    fn test_qr_rank() {
        let full = array![[1.0, 0.0], [1.0, 1.0], [1.0, 0.0]];
        assert_eq!(qr_rank(full.view()), 2);

        let collinear = array![[1.0, 1.0, 0.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0], [1.0, 0.0, 1.0]];
        assert_eq!(qr_rank(collinear.view()), 2);

        let zero_col = array![[1.0, 0.0], [1.0, 0.0]];
        assert_eq!(qr_rank(zero_col.view()), 1);
    }

    #[test]
    fn test_symmetric_eigen() {
        let a = array![[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 5.0]];
        let (values, vectors) = symmetric_eigen(a.view());
        assert!((values[0] - 5.0).abs() < 1e-10);
        assert!((values[1] - 3.0).abs() < 1e-10);
        assert!((values[2] - 1.0).abs() < 1e-10);
        for k in 0..3 {
            let v = vectors.column(k);
            let av = a.dot(&v);
            for i in 0..3 {
                assert!((av[i] - values[k] * v[i]).abs() < 1e-10);
            }
        }
    }
}
