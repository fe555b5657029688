use nalgebra_sparse::{CooMatrix, CscMatrix};
use serde::{Deserialize, Serialize};

use crate::basic::{
    classify::{BusClassification, StateIndex},
    network::{BusType, NetworkModel},
};

/// Which series term goes into which fast-decoupled matrix.
///
/// * `BX` - `B'` takes `x/(r²+x²)`, `B''` takes `1/x`.
/// * `XB` - `B'` takes `1/x`, `B''` takes `x/(r²+x²)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoupledVariant {
    #[default]
    BX,
    XB,
}

/// Constant matrices of the fast-decoupled method, with `B = -Im(Y)`.
///
/// `b_p` is indexed by the angle unknowns, `b_pp` by the magnitude unknowns.
#[derive(Debug, Clone)]
pub struct DecoupledMatrices {
    pub b_p: CscMatrix<f64>,
    pub b_pp: CscMatrix<f64>,
}

impl DecoupledMatrices {
    pub fn build(
        net: &NetworkModel,
        class: &BusClassification,
        index: &StateIndex,
        variant: DecoupledVariant,
    ) -> Self {
        let mut b_p = CooMatrix::new(index.n_angle(), index.n_angle());
        let mut b_pp = CooMatrix::new(index.n_magnitude(), index.n_magnitude());
        for (k, _) in index.angle_buses.iter().enumerate() {
            b_p.push(k, k, 0.0);
        }
        for (k, _) in index.magnitude_buses.iter().enumerate() {
            b_pp.push(k, k, 0.0);
        }

        let push = |coo: &mut CooMatrix<f64>, map: &[Option<usize>], i: usize, j: usize, v: f64| {
            if let (Some(r), Some(c)) = (map[i], map[j]) {
                coo.push(r, c, v);
            }
        };

        for br in net.branches.iter().filter(|b| b.in_service) {
            let (r, x) = (br.resistance, br.reactance);
            let full = x / (r * r + x * x);
            let simple = 1.0 / x;
            let (bp, bpp) = match variant {
                DecoupledVariant::BX => (full, simple),
                DecoupledVariant::XB => (simple, full),
            };
            let (f, t) = (br.from, br.to);
            let map = &index.angle;
            push(&mut b_p, map, f, f, bp);
            push(&mut b_p, map, t, t, bp);
            push(&mut b_p, map, f, t, -bp);
            push(&mut b_p, map, t, f, -bp);

            let tau = br.turns_ratio();
            let map = &index.magnitude;
            push(&mut b_pp, map, f, f, bpp / (tau * tau));
            push(&mut b_pp, map, t, t, bpp);
            push(&mut b_pp, map, f, t, -bpp / tau);
            push(&mut b_pp, map, t, f, -bpp / tau);

            let half = br.susceptance / 2.0;
            for bus in [f, t] {
                if class.types[bus] == BusType::Demand {
                    push(&mut b_p, &index.angle, bus, bus, -half);
                    push(&mut b_pp, &index.magnitude, bus, bus, -half);
                }
            }
        }

        for bus in class.pq() {
            let bsh = net.buses[bus].shunt_susceptance;
            push(&mut b_p, &index.angle, bus, bus, -bsh);
            push(&mut b_pp, &index.magnitude, bus, bus, -bsh);
        }

        Self {
            b_p: CscMatrix::from(&b_p),
            b_pp: CscMatrix::from(&b_pp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{basic::classify::classify_buses, testcases::five_bus};
    use nalgebra::DMatrix;

    #[test]
    fn test_variants_swap_series_terms() {
        let net = five_bus();
        let class = classify_buses(&net).unwrap();
        let idx = class.state_index();
        let bx = DecoupledMatrices::build(&net, &class, &idx, DecoupledVariant::BX);
        let xb = DecoupledMatrices::build(&net, &class, &idx, DecoupledVariant::XB);
        assert_eq!(bx.b_p.nrows(), idx.n_angle());
        assert_eq!(bx.b_pp.nrows(), idx.n_magnitude());

        // branch 2-3 (r=0.01, x=0.03) couples two demand buses
        let (a2, a3) = (idx.angle[2].unwrap(), idx.angle[3].unwrap());
        let full = 0.03 / (0.01f64.powi(2) + 0.03f64.powi(2));
        let bp = DMatrix::from(&bx.b_p);
        let xb_p = DMatrix::from(&xb.b_p);
        assert!((bp[(a2, a3)] + full).abs() < 1e-12);
        assert!((xb_p[(a2, a3)] + 1.0 / 0.03).abs() < 1e-12);
        assert_eq!(bp, bp.transpose(), "B' must be symmetric");

        let (m2, m3) = (idx.magnitude[2].unwrap(), idx.magnitude[3].unwrap());
        let bpp = DMatrix::from(&bx.b_pp);
        let xb_pp = DMatrix::from(&xb.b_pp);
        assert!((bpp[(m2, m3)] + 1.0 / 0.03).abs() < 1e-12);
        assert!((xb_pp[(m2, m3)] + full).abs() < 1e-12);
    }

    #[test]
    fn test_tap_enters_only_b_double_prime() {
        let net = five_bus();
        let class = classify_buses(&net).unwrap();
        let idx = class.state_index();
        let m = DecoupledMatrices::build(&net, &class, &idx, DecoupledVariant::XB);
        // transformer 3-4: r=0.005, x=0.08, tap 0.98
        let (a3, a4) = (idx.angle[3].unwrap(), idx.angle[4].unwrap());
        let (m3, m4) = (idx.magnitude[3].unwrap(), idx.magnitude[4].unwrap());
        let bp = DMatrix::from(&m.b_p);
        let bpp = DMatrix::from(&m.b_pp);
        assert!((bp[(a3, a4)] + 1.0 / 0.08).abs() < 1e-12);
        let full = 0.08 / (0.005f64.powi(2) + 0.08f64.powi(2));
        assert!((bpp[(m3, m4)] + full / 0.98).abs() < 1e-12);
        assert!((bpp[(m4, m3)] + full / 0.98).abs() < 1e-12);
    }
}
