use nalgebra_sparse::CscMatrix;
use rsparse::{
    data::{Nmrc, Sprs, Symb},
    qr, sqr, usolve,
};

use super::{Solve, ipvec, to_sprs};

/// Sparse Householder QR of a square matrix.
#[derive(Default)]
pub struct QrSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
}

/// Applies the `i`-th Householder reflection `x = (I - beta·v·vᵀ)·x`.
#[inline(always)]
fn happly(v: &Sprs<f64>, i: usize, beta: f64, x: &mut [f64]) {
    let range = v.p[i] as usize..v.p[i + 1] as usize;
    let tau: f64 = range.clone().map(|p| v.x[p] * x[v.i[p]]).sum::<f64>() * beta;
    for p in range {
        x[v.i[p]] -= v.x[p] * tau;
    }
}

impl Solve for QrSolver {
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<(), &'static str> {
        let a = to_sprs(a);
        let s = self.symbolic.get_or_insert_with(|| sqr(&a, 2, true));
        let n = qr(&a, s);
        if (0..a.n).any(|k| {
            let last = n.u.p[k + 1] as usize;
            last == 0 || n.u.x[last - 1].abs() < f64::EPSILON
        }) {
            return Err("QR factorization is rank deficient");
        }
        self.x.resize(s.m2, 0.0);
        self.numeric = Some(n);
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        let (Some(s), Some(n)) = (&self.symbolic, &self.numeric) else {
            return Err("matrix is not factorized");
        };
        let x = &mut self.x[..];
        x.fill(0.0);
        ipvec(&s.pinv, b, x); // x = P*b
        for k in 0..b.len() {
            happly(&n.l, k, n.b[k], x); // apply Householder reflection k
        }
        usolve(&n.u, x); // x = R\x
        let m = b.len();
        ipvec(&s.q, &x[..m], b); // b = Q*x
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.numeric = None;
    }
}
