use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use self::faer::FaerSolver;

mod cholesky;
mod qr;
mod rsparse;
pub use self::cholesky::CholeskySolver;
pub use self::qr::QrSolver;
pub use self::rsparse::RSparseSolver;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(not(feature = "faer"))]
pub type DefaultSolver = RSparseSolver;

/// A trait for solving sparse linear systems.
///
/// Backends keep the symbolic analysis of the first matrix they factorize and
/// reuse it for every later matrix until [`Solve::reset`] is called, so all
/// matrices passed between resets must share one sparsity pattern.
pub trait Solve {
    /// Computes the numeric factorization of `a`.
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<(), &'static str>;

    /// Solves with the last factorization, overwriting `b` with the solution.
    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), &'static str>;

    /// Drops every cached factorization.
    fn reset(&mut self);

    /// Factorizes `a` and solves `a·x = b` in place.
    fn solve(&mut self, a: &CscMatrix<f64>, b: &mut [f64]) -> Result<(), &'static str> {
        self.factorize(a)?;
        self.solve_in_place(b)
    }
}

/// Direct factorization used for the linear systems of the solvers.
///
/// `Ldlt` is a symmetric (Cholesky) factorization and needs a symmetric
/// positive definite matrix, such as the fast-decoupled `B'` and `B''`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Factorization {
    #[default]
    Lu,
    Ldlt,
    Qr,
}

/// Backend selected by [`Factorization`].
pub enum DirectSolver {
    Lu(DefaultSolver),
    Ldlt(CholeskySolver),
    Qr(QrSolver),
}

impl DirectSolver {
    pub fn new(kind: Factorization) -> Self {
        match kind {
            Factorization::Lu => Self::Lu(DefaultSolver::default()),
            Factorization::Ldlt => Self::Ldlt(CholeskySolver::default()),
            Factorization::Qr => Self::Qr(QrSolver::default()),
        }
    }

    fn backend(&mut self) -> &mut dyn Solve {
        match self {
            Self::Lu(s) => s,
            Self::Ldlt(s) => s,
            Self::Qr(s) => s,
        }
    }
}

impl Solve for DirectSolver {
    fn factorize(&mut self, a: &CscMatrix<f64>) -> Result<(), &'static str> {
        if a.nrows() != a.ncols() {
            return Err("matrix is not square");
        }
        if a.nrows() == 0 {
            return Ok(());
        }
        self.backend().factorize(a)
    }

    fn solve_in_place(&mut self, b: &mut [f64]) -> Result<(), &'static str> {
        if b.is_empty() {
            return Ok(());
        }
        self.backend().solve_in_place(b)?;
        if b.iter().all(|x| x.is_finite()) {
            Ok(())
        } else {
            Err("solution is not finite")
        }
    }

    fn reset(&mut self) {
        self.backend().reset()
    }
}

/// Reorders `b` into `x` with `x[p[k]] = b[k]`, or copies when there is no permutation.
#[inline(always)]
pub(crate) fn ipvec(p: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
    match p {
        Some(p) => {
            for k in 0..b.len() {
                x[p[k] as usize] = b[k];
            }
        }
        None => x[..b.len()].copy_from_slice(b),
    }
}

/// Reorders `b` into `x` with `x[k] = b[p[k]]`, or copies when there is no permutation.
#[inline(always)]
pub(crate) fn pvec(p: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
    match p {
        Some(p) => {
            for k in 0..x.len() {
                x[k] = b[p[k] as usize];
            }
        }
        None => {
            let n = x.len();
            x.copy_from_slice(&b[..n]);
        }
    }
}

/// Converts a compressed-column matrix into the layout `rsparse` works on.
pub(crate) fn to_sprs(a: &CscMatrix<f64>) -> ::rsparse::data::Sprs<f64> {
    ::rsparse::data::Sprs {
        m: a.nrows(),
        n: a.ncols(),
        i: a.row_indices().to_vec(),
        p: a.col_offsets().iter().map(|&v| v as isize).collect(),
        x: a.values().to_vec(),
        nzmax: a.nnz(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn spd() -> CscMatrix<f64> {
        let mut a = CooMatrix::new(3, 3);
        a.push(0, 0, 4.0);
        a.push(0, 1, -1.0);
        a.push(1, 0, -1.0);
        a.push(1, 1, 4.0);
        a.push(1, 2, -1.0);
        a.push(2, 1, -1.0);
        a.push(2, 2, 4.0);
        CscMatrix::from(&a)
    }

    fn check(kind: Factorization) {
        let a = spd();
        let mut solver = DirectSolver::new(kind);
        let x = [1.0, -2.0, 0.5];
        let mut b: Vec<f64> = (0..3)
            .map(|i| (0..3).map(|j| nalgebra::DMatrix::from(&a)[(i, j)] * x[j]).sum())
            .collect();
        solver.solve(&a, &mut b).unwrap();
        for k in 0..3 {
            assert!((b[k] - x[k]).abs() < 1e-12, "{kind:?}: {} != {}", b[k], x[k]);
        }
        // reuse the factorization with a second right-hand side
        let mut e = vec![4.0, -1.0, 0.0];
        solver.solve_in_place(&mut e).unwrap();
        assert!((e[0] - 1.0).abs() < 1e-12 && e[1].abs() < 1e-12 && e[2].abs() < 1e-12);
    }

    #[test]
    fn test_lu() {
        check(Factorization::Lu);
    }

    #[test]
    fn test_ldlt() {
        check(Factorization::Ldlt);
    }

    #[test]
    fn test_qr() {
        check(Factorization::Qr);
    }

    #[test]
    fn test_singular_matrix_is_reported() {
        let mut a = CooMatrix::new(2, 2);
        a.push(0, 0, 1.0);
        a.push(0, 1, 1.0);
        a.push(1, 0, 1.0);
        a.push(1, 1, 1.0);
        let a = CscMatrix::from(&a);
        let mut solver = DirectSolver::new(Factorization::Lu);
        let mut b = vec![1.0, 2.0];
        assert!(solver.solve(&a, &mut b).is_err());
    }
}
