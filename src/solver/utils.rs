//! Small dense and sparse linear algebra helpers

use crate::types::DofVector;
use ndarray::Array2;
use sprs::CsMat;

/// Euclidean norm
pub fn l2_norm(v: &DofVector) -> f64 {
    v.dot(v).sqrt()
}

/// Sparse matrix-vector product `dst = a * src`
pub fn spmv(a: &CsMat<f64>, src: &DofVector, dst: &mut DofVector) {
    dst.fill(0.0);
    for (row, vec) in a.outer_iterator().enumerate() {
        let mut s = 0.0;
        for (col, &val) in vec.iter() {
            s += val * src[col];
        }
        dst[row] = s;
    }
}

/// Dense matrix inverse by Gauss-Jordan elimination with partial
/// pivoting.
///
/// # Panics
/// If the matrix is singular to working precision.
pub fn gauss_jordan_inverse(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "matrix must be square");
    let mut work = a.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if work[[row, col]].abs() > work[[pivot, col]].abs() {
                pivot = row;
            }
        }
        let p = work[[pivot, col]];
        assert!(p.abs() > 1e-300, "singular matrix in Gauss-Jordan");
        if pivot != col {
            for j in 0..n {
                work.swap([pivot, j], [col, j]);
                inv.swap([pivot, j], [col, j]);
            }
        }
        for j in 0..n {
            work[[col, j]] /= p;
            inv[[col, j]] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let f = work[[row, col]];
            if f == 0.0 {
                continue;
            }
            for j in 0..n {
                work[[row, j]] -= f * work[[col, j]];
                inv[[row, j]] -= f * inv[[col, j]];
            }
        }
    }
    inv
}
