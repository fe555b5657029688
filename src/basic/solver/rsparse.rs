use nalgebra_sparse::CscMatrix;
use rsparse::{
    data::{Nmrc, Symb},
    lsolve, lu, sqr, usolve,
};

use super::{Solve, ipvec, to_sprs};

/// Sparse LU from `rsparse` with a fill-reducing column ordering.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
}

impl Solve for RSparseSolver {
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<(), &'static str> {
        let a = to_sprs(a);
        let s = self.symbolic.get_or_insert_with(|| sqr(&a, 1, false));
        self.numeric = Some(lu(&a, s, 1e-6).map_err(|_| "LU factorization failed")?);
        self.x.resize(a.n, 0.0);
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        let (Some(s), Some(n)) = (&self.symbolic, &self.numeric) else {
            return Err("matrix is not factorized");
        };
        let x = &mut self.x[..];
        ipvec(&n.pinv, b, x); // x = P*b
        lsolve(&n.l, x); // x = L\x
        usolve(&n.u, x); // x = U\x
        ipvec(&s.q, x, b); // b = Q*x
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.numeric = None;
    }
}
