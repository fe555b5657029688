use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::basic::{
    error::{ConfigurationError, Result},
    network::NetworkModel,
    sparse::{conj::RealImage, slice::entry_position},
};

/// π-model terms of one in-service branch.
///
/// `ff`, `ft`, `tf`, `tt` relate the terminal currents to the terminal
/// voltages: `I_f = ff·V_f + ft·V_t`, `I_t = tf·V_f + tt·V_t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchAdmittance {
    pub from: usize,
    pub to: usize,
    pub ff: Complex64,
    pub ft: Complex64,
    pub tf: Complex64,
    pub tt: Complex64,
    /// Series admittance `1/(r + jx)`.
    pub series: Complex64,
    /// Complex transformer ratio.
    pub ratio: Complex64,
    /// Total charging susceptance.
    pub charging: f64,
}

impl BranchAdmittance {
    pub fn new(from: usize, to: usize, series: Complex64, charging: f64, ratio: Complex64) -> Self {
        let ych = Complex64::new(0.0, charging / 2.0);
        let tt = series + ych;
        Self {
            from,
            to,
            ff: tt / (ratio * ratio.conj()),
            ft: -series / ratio.conj(),
            tf: -series / ratio,
            tt,
            series,
            ratio,
            charging,
        }
    }
}

/// Nodal admittance matrix `Y` with the views the solvers need.
///
/// `y_bus_t` is the transpose of `y_bus`, so column `i` of it is row `i` of
/// `Y`. `g` and `b` are the real and imaginary parts of `y_bus_t`.
#[derive(Debug, Clone)]
pub struct NodalMatrix {
    y_bus: CscMatrix<Complex64>,
    y_bus_t: CscMatrix<Complex64>,
    g: CscMatrix<f64>,
    b: CscMatrix<f64>,
    diag: Vec<usize>,
    diag_t: Vec<usize>,
    shunts: Vec<Complex64>,
    branches: Vec<Option<BranchAdmittance>>,
}

impl NodalMatrix {
    /// Assembles `Y = Cfᵀ·Yf + Ctᵀ·Yt + diag(Ysh)` from the in-service branches.
    pub fn build(net: &NetworkModel) -> Result<Self> {
        net.validate()?;
        let n = net.bus_count();
        let branches: Vec<Option<BranchAdmittance>> = net
            .branches
            .iter()
            .map(|br| {
                br.in_service.then(|| {
                    BranchAdmittance::new(
                        br.from,
                        br.to,
                        br.series_admittance(),
                        br.susceptance,
                        br.transformer_ratio(),
                    )
                })
            })
            .collect();
        let active: Vec<&BranchAdmittance> = branches.iter().flatten().collect();
        let nl = active.len();

        let mut cf = CooMatrix::new(nl, n);
        let mut ct = CooMatrix::new(nl, n);
        let mut yf = CooMatrix::new(nl, n);
        let mut yt = CooMatrix::new(nl, n);
        for (k, br) in active.iter().enumerate() {
            cf.push(k, br.from, Complex64::one());
            ct.push(k, br.to, Complex64::one());
            yf.push(k, br.from, br.ff);
            yf.push(k, br.to, br.ft);
            yt.push(k, br.from, br.tf);
            yt.push(k, br.to, br.tt);
        }
        let cf = CscMatrix::from(&cf).transpose();
        let ct = CscMatrix::from(&ct).transpose();
        let yf = CscMatrix::from(&yf);
        let yt = CscMatrix::from(&yt);

        let shunts: Vec<Complex64> = net.buses.iter().map(|b| b.shunt_admittance()).collect();
        let mut ysh = CscMatrix::identity(n);
        ysh.values_mut().copy_from_slice(&shunts);

        let y_bus = &(&cf * &yf) + &(&(&ct * &yt) + &ysh);
        Self::from_parts(y_bus, shunts, branches)
    }

    fn from_parts(
        y_bus: CscMatrix<Complex64>,
        shunts: Vec<Complex64>,
        branches: Vec<Option<BranchAdmittance>>,
    ) -> Result<Self> {
        let y_bus_t = y_bus.transpose();
        let (g, b) = y_bus_t.real_imag()?;
        let n = y_bus.ncols();
        let diag = (0..n)
            .map(|i| entry_position(&y_bus, i, i))
            .collect::<Option<Vec<_>>>();
        let diag_t = (0..n)
            .map(|i| entry_position(&y_bus_t, i, i))
            .collect::<Option<Vec<_>>>();
        let (Some(diag), Some(diag_t)) = (diag, diag_t) else {
            return Err(ConfigurationError::UnknownElement {
                kind: "diagonal entry",
                index: n,
            }
            .into());
        };
        Ok(Self {
            y_bus,
            y_bus_t,
            g,
            b,
            diag,
            diag_t,
            shunts,
            branches,
        })
    }

    #[inline(always)]
    pub fn nbus(&self) -> usize {
        self.y_bus.ncols()
    }

    #[inline(always)]
    pub fn y_bus(&self) -> &CscMatrix<Complex64> {
        &self.y_bus
    }

    #[inline(always)]
    pub fn y_bus_t(&self) -> &CscMatrix<Complex64> {
        &self.y_bus_t
    }

    /// Real part of `Yᵗ`, laid out like [`Self::y_bus_t`].
    #[inline(always)]
    pub fn g(&self) -> &[f64] {
        self.g.values()
    }

    /// Imaginary part of `Yᵗ`, laid out like [`Self::y_bus_t`].
    #[inline(always)]
    pub fn b(&self) -> &[f64] {
        self.b.values()
    }

    /// Range of positions in [`Self::g`]/[`Self::b`] holding row `bus` of `Y`.
    #[inline(always)]
    pub fn row_range(&self, bus: usize) -> std::ops::Range<usize> {
        let offs = self.y_bus_t.col_offsets();
        offs[bus]..offs[bus + 1]
    }

    /// Column indices of row `bus` of `Y`.
    #[inline(always)]
    pub fn row_neighbors(&self, bus: usize) -> &[usize] {
        &self.y_bus_t.row_indices()[self.row_range(bus)]
    }

    #[inline(always)]
    pub fn diagonal(&self, bus: usize) -> Complex64 {
        self.y_bus_t.values()[self.diag_t[bus]]
    }

    /// Branch terms, indexed like the network's branches; `None` when out of service.
    #[inline(always)]
    pub fn branches(&self) -> &[Option<BranchAdmittance>] {
        &self.branches
    }

    #[inline(always)]
    pub fn shunt(&self, bus: usize) -> Complex64 {
        self.shunts[bus]
    }

    /// Net current injected into `bus`: `Σ_j Y_ij·V_j`.
    #[inline(always)]
    pub fn bus_current(&self, bus: usize, v: &[Complex64]) -> Complex64 {
        let col = self.y_bus_t.col(bus);
        col.row_indices()
            .iter()
            .zip(col.values())
            .fold(Complex64::zero(), |acc, (&j, y)| acc + y * v[j])
    }

    /// Net current injections `Y·V` for every bus.
    pub fn current(&self, v: &[Complex64]) -> Vec<Complex64> {
        (0..self.nbus()).map(|i| self.bus_current(i, v)).collect()
    }

    /// Complex power injections `V ∘ conj(Y·V)`.
    pub fn power(&self, v: &[Complex64]) -> Vec<Complex64> {
        (0..self.nbus())
            .map(|i| v[i] * self.bus_current(i, v).conj())
            .collect()
    }

    /// Replaces the shunt admittance of `bus` without touching the pattern.
    pub fn set_shunt(&mut self, bus: usize, shunt: Complex64) {
        let delta = shunt - self.shunts[bus];
        self.shunts[bus] = shunt;
        self.y_bus.values_mut()[self.diag[bus]] += delta;
        let pos = self.diag_t[bus];
        self.y_bus_t.values_mut()[pos] += delta;
        self.g.values_mut()[pos] += delta.re;
        self.b.values_mut()[pos] += delta.im;
    }
}
