use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};
use nalgebra_sparse::CscMatrix;

use super::Solve as PoSolve;

/// Sparse LU from `faer`, enabled with the `faer` feature.
#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    lu: Option<Lu<usize, f64>>,
    symbolic: Option<SymbolicLu<usize>>,
}

impl PoSolve for FaerSolver {
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<(), &'static str> {
        let n = a.ncols();
        let s = SymbolicSparseColMatRef::new_checked(n, n, a.col_offsets(), None, a.row_indices());
        let mat = SparseColMatRef::new(s, a.values());
        let symbolic = match &self.symbolic {
            Some(symbolic) => symbolic.clone(),
            None => {
                let symbolic = SymbolicLu::try_new(s).map_err(|_| "Faer symbolic error")?;
                self.symbolic = Some(symbolic.clone());
                symbolic
            }
        };
        self.lu = Some(
            Lu::try_new_with_symbolic(symbolic, mat).map_err(|_| "Faer numerical error")?,
        );
        self.n = n;
        Ok(())
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        let lu = self.lu.as_ref().ok_or("matrix is not factorized")?;
        let rhs = MatMut::from_column_major_slice_mut(b, self.n, 1);
        lu.solve_in_place(rhs);
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.lu = None;
    }
}
