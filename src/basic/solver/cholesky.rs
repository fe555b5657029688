use nalgebra_sparse::CscMatrix;
use rsparse::{
    chol,
    data::{Nmrc, Symb},
    lsolve, ltsolve, schol,
};

use super::{Solve, ipvec, pvec, to_sprs};

/// Sparse Cholesky `P·A·Pᵀ = L·Lᵀ` for symmetric positive definite matrices.
#[derive(Default)]
pub struct CholeskySolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
}

impl Solve for CholeskySolver {
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<(), &'static str> {
        let a = to_sprs(a);
        let s = self.symbolic.get_or_insert_with(|| schol(&a, 0));
        self.numeric = Some(chol(&a, s).map_err(|_| "Cholesky factorization failed")?);
        self.x.resize(a.n, 0.0);
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        let (Some(s), Some(n)) = (&self.symbolic, &self.numeric) else {
            return Err("matrix is not factorized");
        };
        let x = &mut self.x[..];
        ipvec(&s.pinv, b, x); // x = P*b
        lsolve(&n.l, x); // x = L\x
        ltsolve(&n.l, x); // x = L'\x
        pvec(&s.pinv, x, b); // b = P'*x
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.numeric = None;
    }
}
