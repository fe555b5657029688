use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    classify::{BusClassification, classify_buses},
    error::{ConfigurationError, PowerFlowError, RebuildRequired, Result},
    mismatch::power_mismatch,
    network::{Branch, Bus, BusType, Generator, NetworkModel},
    powerflow::{MethodState, PowerFlow, apply_setpoints, initial_voltage},
    system::admittance::NodalMatrix,
};

/// A change to the network held by a [`PowerFlow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Edit {
    BusDemand {
        bus: usize,
        active: f64,
        reactive: f64,
    },
    BusShunt {
        bus: usize,
        conductance: f64,
        susceptance: f64,
    },
    BusType {
        bus: usize,
        bus_type: BusType,
    },
    GeneratorOutput {
        generator: usize,
        active: f64,
        reactive: f64,
    },
    GeneratorSetpoint {
        generator: usize,
        magnitude: f64,
    },
    GeneratorStatus {
        generator: usize,
        in_service: bool,
    },
    AddGenerator(Generator),
    BranchParameters {
        branch: usize,
        resistance: f64,
        reactance: f64,
        susceptance: f64,
        tap_ratio: f64,
        shift_angle: f64,
    },
    BranchStatus {
        branch: usize,
        in_service: bool,
    },
    AddBranch(Branch),
    /// Appends a bus at the next free index.
    AddBus(Bus),
    /// Removes a bus together with its branches and generators. Higher bus
    /// indices shift down by one.
    RemoveBus {
        bus: usize,
    },
}

/// How much of a [`PowerFlow`] an applied edit had to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EditImpact {
    /// Injections, setpoints or a shunt value were patched; every pattern and
    /// factorization is kept.
    NumericOnly,
    /// The bus partition changed: state numbering and the method state were
    /// rebuilt, the admittance matrix kept.
    PatternRebuild,
    /// The admittance matrix and the method state were rebuilt.
    AdmittanceRebuild,
    /// The bus count changed and everything was rebuilt.
    FullRebuild,
}

fn unknown(kind: &'static str, index: usize) -> PowerFlowError {
    ConfigurationError::UnknownElement { kind, index }.into()
}

fn bus_mut(net: &mut NetworkModel, bus: usize) -> Result<&mut Bus> {
    net.buses.get_mut(bus).ok_or_else(|| unknown("bus", bus))
}

fn generator_mut(net: &mut NetworkModel, generator: usize) -> Result<&mut Generator> {
    net.generators
        .get_mut(generator)
        .ok_or_else(|| unknown("generator", generator))
}

fn branch_mut(net: &mut NetworkModel, branch: usize) -> Result<&mut Branch> {
    net.branches
        .get_mut(branch)
        .ok_or_else(|| unknown("branch", branch))
}

impl Edit {
    /// Applies the edit to `net` and returns, for every bus before the edit,
    /// its index afterwards.
    pub fn apply_to(&self, net: &mut NetworkModel) -> Result<Vec<Option<usize>>> {
        let n = net.bus_count();
        let mut survivors: Vec<Option<usize>> = (0..n).map(Some).collect();
        match self {
            Edit::BusDemand {
                bus,
                active,
                reactive,
            } => {
                let b = bus_mut(net, *bus)?;
                b.active_demand = *active;
                b.reactive_demand = *reactive;
            }
            Edit::BusShunt {
                bus,
                conductance,
                susceptance,
            } => {
                let b = bus_mut(net, *bus)?;
                b.shunt_conductance = *conductance;
                b.shunt_susceptance = *susceptance;
            }
            Edit::BusType { bus, bus_type } => bus_mut(net, *bus)?.bus_type = *bus_type,
            Edit::GeneratorOutput {
                generator,
                active,
                reactive,
            } => {
                let g = generator_mut(net, *generator)?;
                g.active = *active;
                g.reactive = *reactive;
            }
            Edit::GeneratorSetpoint {
                generator,
                magnitude,
            } => generator_mut(net, *generator)?.magnitude = *magnitude,
            Edit::GeneratorStatus {
                generator,
                in_service,
            } => generator_mut(net, *generator)?.in_service = *in_service,
            Edit::AddGenerator(g) => net.generators.push(g.clone()),
            Edit::BranchParameters {
                branch,
                resistance,
                reactance,
                susceptance,
                tap_ratio,
                shift_angle,
            } => {
                let br = branch_mut(net, *branch)?;
                br.resistance = *resistance;
                br.reactance = *reactance;
                br.susceptance = *susceptance;
                br.tap_ratio = *tap_ratio;
                br.shift_angle = *shift_angle;
            }
            Edit::BranchStatus { branch, in_service } => {
                branch_mut(net, *branch)?.in_service = *in_service
            }
            Edit::AddBranch(br) => net.branches.push(br.clone()),
            Edit::AddBus(bus) => net.buses.push(bus.clone()),
            Edit::RemoveBus { bus } => {
                let bus = *bus;
                if bus >= n {
                    return Err(unknown("bus", bus));
                }
                net.buses.remove(bus);
                net.branches.retain(|br| br.from != bus && br.to != bus);
                net.generators.retain(|g| g.bus != bus);
                let shift = |k: usize| if k > bus { k - 1 } else { k };
                for br in net.branches.iter_mut() {
                    br.from = shift(br.from);
                    br.to = shift(br.to);
                }
                for g in net.generators.iter_mut() {
                    g.bus = shift(g.bus);
                }
                survivors = (0..n).map(|k| (k != bus).then(|| shift(k))).collect();
            }
        }
        Ok(survivors)
    }

    #[inline(always)]
    fn touches_branches(&self) -> bool {
        matches!(
            self,
            Edit::BranchParameters { .. } | Edit::BranchStatus { .. } | Edit::AddBranch(_)
        )
    }
}

/// Classifies `net` after `edit` and rejects the edit unless the slack stays
/// at `expected`, the new index of the current slack.
fn classify_keeping_slack(
    old: &BusClassification,
    edit: &Edit,
    net: &NetworkModel,
    expected: usize,
) -> Result<BusClassification> {
    let from = old.slack;
    let retyped = match edit {
        Edit::BusType { bus, bus_type } => Some((*bus, *bus_type)),
        _ => None,
    };
    if let Some((bus, BusType::Slack)) = retyped {
        if bus != expected {
            return Err(RebuildRequired::SlackMoved { from, to: bus }.into());
        }
    }
    let lost_generator = net.first_generator(expected).is_none();
    let class = match classify_buses(net) {
        Ok(class) => class,
        Err(PowerFlowError::Configuration(ConfigurationError::NoSlackBus)) => {
            return Err(if lost_generator {
                RebuildRequired::SlackGeneratorRemoved { bus: from }
            } else {
                RebuildRequired::SlackDemoted { bus: from }
            }
            .into());
        }
        Err(e) => return Err(e),
    };
    if class.slack != expected {
        return Err(if lost_generator {
            RebuildRequired::SlackGeneratorRemoved { bus: from }
        } else {
            RebuildRequired::SlackMoved {
                from,
                to: class.slack,
            }
        }
        .into());
    }
    // a retyped slack bus can be promoted straight back by the classifier
    match retyped {
        Some((bus, bus_type)) if bus == expected && bus_type != BusType::Slack => {
            Err(RebuildRequired::SlackDemoted { bus: from }.into())
        }
        _ => Ok(class),
    }
}

impl PowerFlow {
    /// Applies `edit` and rebuilds only what it invalidates.
    ///
    /// The edit is first applied to a copy of the network and reclassified;
    /// when it would move or demote the slack bus it is rejected with
    /// [`PowerFlowError::IncompatibleEdit`] and the handle is left exactly
    /// as it was. The same holds for any other error. Otherwise every stale
    /// pattern and factorization is replaced before returning, and the
    /// iteration count starts again from zero.
    pub fn apply_edit(&mut self, edit: Edit) -> Result<EditImpact> {
        let mut net = self.network.clone();
        let survivors = edit.apply_to(&mut net)?;
        net.validate()?;
        let checked = match survivors[self.class.slack] {
            None => Err(RebuildRequired::SlackRemoved {
                bus: self.class.slack,
            }
            .into()),
            Some(expected) => classify_keeping_slack(&self.class, &edit, &net, expected),
        };
        let class = match checked {
            Ok(class) => class,
            Err(e) => {
                warn!(?edit, "edit rejected: {e}");
                return Err(e);
            }
        };

        let impact = if net.bus_count() != self.network.bus_count() {
            EditImpact::FullRebuild
        } else if edit.touches_branches() {
            EditImpact::AdmittanceRebuild
        } else if !class.same_partition(&self.class) {
            EditImpact::PatternRebuild
        } else {
            EditImpact::NumericOnly
        };

        if impact == EditImpact::FullRebuild {
            for (old, new) in survivors.iter().enumerate() {
                if let Some(new) = *new {
                    net.buses[new].magnitude = self.v.magnitude[old];
                    net.buses[new].angle = self.v.angle[old];
                }
            }
            let v = initial_voltage(&net, &class);
            *self = PowerFlow::assemble(net, class, self.method, self.config.clone(), v)?;
            debug!(?impact, "edit applied");
            return Ok(impact);
        }

        let mut v = self.v.clone();
        apply_setpoints(&net, &class, &mut v);
        let y = match impact {
            EditImpact::AdmittanceRebuild => Some(NodalMatrix::build(&net)?),
            _ => None,
        };
        let index = class.state_index();
        let state = match impact {
            EditImpact::NumericOnly => None,
            _ => Some(MethodState::new(
                self.method,
                &net,
                &class,
                &index,
                y.as_ref().unwrap_or(&self.y),
                &v,
                self.config.factorization,
            )?),
        };

        // commit
        if let Some(y) = y {
            self.y = y;
        } else if let Edit::BusShunt { bus, .. } = edit {
            self.y.set_shunt(bus, net.buses[bus].shunt_admittance());
        }
        match state {
            Some(state) => self.state = state,
            None => {
                if let MethodState::Seidel(gs) = &mut self.state {
                    gs.sync(&v);
                }
            }
        }
        self.spec = net.injection();
        self.network = net;
        self.class = class;
        self.index = index;
        self.v = v;
        self.mismatch = power_mismatch(&self.y, &self.v, &self.index, &self.spec);
        self.monitor.restart();
        self.monitor.observe(&self.mismatch);
        debug!(?impact, "edit applied");
        Ok(impact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        basic::powerflow::{Method, PowerFlowConfig},
        testcases::{five_bus, three_bus},
    };
    use approx::assert_relative_eq;

    const ALL: [Method; 4] = [
        Method::NewtonRaphson,
        Method::FastDecoupledBX,
        Method::FastDecoupledXB,
        Method::GaussSeidel,
    ];

    fn config() -> PowerFlowConfig {
        PowerFlowConfig {
            max_it: Some(1000),
            ..Default::default()
        }
    }

    fn solved(net: &NetworkModel, method: Method) -> PowerFlow {
        let mut pf = PowerFlow::build(net, method, config()).unwrap();
        assert!(pf.solve().unwrap().converged);
        pf
    }

    fn assert_matches_fresh(pf: &PowerFlow, method: Method) {
        let fresh = solved(pf.network(), method);
        for (a, b) in pf.voltage().iter().zip(fresh.voltage()) {
            assert_relative_eq!(a.magnitude, b.magnitude, epsilon = 1e-7);
            assert_relative_eq!(a.angle, b.angle, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_numeric_edit_matches_rebuild() {
        for method in ALL {
            let mut pf = solved(&five_bus(), method);
            let edits = [
                Edit::BusDemand {
                    bus: 2,
                    active: 0.7,
                    reactive: 0.25,
                },
                Edit::BusShunt {
                    bus: 4,
                    conductance: 0.0,
                    susceptance: 0.1,
                },
                Edit::GeneratorOutput {
                    generator: 1,
                    active: 0.5,
                    reactive: 0.0,
                },
                Edit::GeneratorSetpoint {
                    generator: 1,
                    magnitude: 1.03,
                },
            ];
            for edit in edits {
                assert_eq!(pf.apply_edit(edit).unwrap(), EditImpact::NumericOnly);
                assert_eq!(pf.convergence().iterations, 0);
                assert!(pf.solve().unwrap().converged);
                assert_matches_fresh(&pf, method);
            }
            assert_relative_eq!(pf.voltage()[1].magnitude, 1.03, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_numeric_edit_keeps_newton_pattern() {
        let mut pf = solved(&five_bus(), Method::NewtonRaphson);
        let pattern = pf.admittance().y_bus().pattern().clone();
        pf.apply_edit(Edit::BusShunt {
            bus: 2,
            conductance: 0.02,
            susceptance: 0.0,
        })
        .unwrap();
        assert_eq!(pf.admittance().y_bus().pattern(), &pattern);
        let fresh = NodalMatrix::build(pf.network()).unwrap();
        for (a, b) in pf.admittance().y_bus().values().iter().zip(fresh.y_bus().values()) {
            assert!((a - b).norm() < 1e-14);
        }
    }

    #[test]
    fn test_partition_change_rebuilds_pattern() {
        for method in ALL {
            let mut pf = solved(&five_bus(), method);
            let impact = pf
                .apply_edit(Edit::BusType {
                    bus: 1,
                    bus_type: BusType::Demand,
                })
                .unwrap();
            assert_eq!(impact, EditImpact::PatternRebuild);
            assert_eq!(pf.classification().bus_type(1), BusType::Demand);
            assert!(pf.solve().unwrap().converged);
            assert_matches_fresh(&pf, method);
        }
    }

    #[test]
    fn test_branch_edits_rebuild_admittance() {
        for method in ALL {
            let mut pf = solved(&five_bus(), method);
            let impact = pf
                .apply_edit(Edit::BranchStatus {
                    branch: 6,
                    in_service: false,
                })
                .unwrap();
            assert_eq!(impact, EditImpact::AdmittanceRebuild);
            assert!(pf.admittance().branches()[6].is_none());
            let impact = pf
                .apply_edit(Edit::AddBranch(Branch::line(1, 4, 0.05, 0.2, 0.03)))
                .unwrap();
            assert_eq!(impact, EditImpact::AdmittanceRebuild);
            assert!(pf.solve().unwrap().converged);
            assert_matches_fresh(&pf, method);
        }
    }

    #[test]
    fn test_bus_count_change_rebuilds_everything() {
        let mut pf = solved(&five_bus(), Method::NewtonRaphson);
        let before = pf.voltage();
        let impact = pf
            .apply_edit(Edit::AddBus(Bus::default().with_demand(0.05, 0.01)))
            .unwrap();
        assert_eq!(impact, EditImpact::FullRebuild);
        // the new bus is islanded until a branch reaches it
        pf.apply_edit(Edit::AddBranch(Branch::line(4, 5, 0.01, 0.05, 0.0)))
            .unwrap();
        assert_eq!(pf.voltage()[2], before[2], "survivors keep their voltage");
        assert!(pf.solve().unwrap().converged);
        assert_matches_fresh(&pf, Method::NewtonRaphson);

        let impact = pf.apply_edit(Edit::RemoveBus { bus: 5 }).unwrap();
        assert_eq!(impact, EditImpact::FullRebuild);
        assert_eq!(pf.network().bus_count(), 5);
        assert_eq!(pf.network().branches.len(), 7);
        assert!(pf.solve().unwrap().converged);
        assert_matches_fresh(&pf, Method::NewtonRaphson);
    }

    #[test]
    fn test_remove_bus_renumbers() {
        let mut net = five_bus();
        let survivors = Edit::RemoveBus { bus: 2 }.apply_to(&mut net).unwrap();
        assert_eq!(survivors, vec![Some(0), Some(1), None, Some(2), Some(3)]);
        assert_eq!(net.bus_count(), 4);
        assert!(net.branches.iter().all(|br| br.from < 4 && br.to < 4));
        // 0-2, 1-2, 2-3 and 2-4 are gone
        assert_eq!(net.branches.len(), 3);
        assert_eq!((net.branches[2].from, net.branches[2].to), (2, 3));
    }

    #[test]
    fn test_slack_move_is_rejected() {
        let mut pf = solved(&five_bus(), Method::NewtonRaphson);
        let before = pf.voltage();
        let cases = [
            (
                Edit::BusType {
                    bus: 0,
                    bus_type: BusType::Demand,
                },
                RebuildRequired::SlackMoved { from: 0, to: 1 },
            ),
            (
                Edit::GeneratorStatus {
                    generator: 0,
                    in_service: false,
                },
                RebuildRequired::SlackGeneratorRemoved { bus: 0 },
            ),
            (
                Edit::RemoveBus { bus: 0 },
                RebuildRequired::SlackRemoved { bus: 0 },
            ),
        ];
        for (edit, expected) in cases {
            match pf.apply_edit(edit) {
                Err(PowerFlowError::IncompatibleEdit(e)) => assert_eq!(e, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
            assert_eq!(pf.voltage(), before);
            assert!(pf.convergence().converged());
            assert_eq!(pf.classification().slack, 0);
        }
        // the handle is still usable
        pf.apply_edit(Edit::BusDemand {
            bus: 3,
            active: 0.35,
            reactive: 0.1,
        })
        .unwrap();
        assert!(pf.solve().unwrap().converged);
    }

    fn assert_rejected(pf: &mut PowerFlow, edit: Edit, expected: RebuildRequired) {
        let before = pf.voltage();
        let net = pf.network().clone();
        match pf.apply_edit(edit) {
            Err(PowerFlowError::IncompatibleEdit(e)) => assert_eq!(e, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
        assert_eq!(pf.voltage(), before);
        assert_eq!(pf.network(), &net);
        assert!(pf.convergence().converged());
    }

    #[test]
    fn test_slack_loss_without_replacement_is_rejected() {
        // no generator bus can take over the slack in this network
        let mut pf = solved(&three_bus(), Method::NewtonRaphson);
        assert_rejected(
            &mut pf,
            Edit::GeneratorStatus {
                generator: 0,
                in_service: false,
            },
            RebuildRequired::SlackGeneratorRemoved { bus: 0 },
        );
        assert_rejected(
            &mut pf,
            Edit::BusType {
                bus: 0,
                bus_type: BusType::Demand,
            },
            RebuildRequired::SlackDemoted { bus: 0 },
        );
        assert_eq!(pf.classification().slack, 0);
    }

    #[test]
    fn test_slack_retype_is_rejected() {
        let mut pf = solved(&five_bus(), Method::NewtonRaphson);
        assert_rejected(
            &mut pf,
            Edit::BusType {
                bus: 1,
                bus_type: BusType::Slack,
            },
            RebuildRequired::SlackMoved { from: 0, to: 1 },
        );
        assert_eq!(pf.network().buses[1].bus_type, BusType::Generator);
        assert_eq!(pf.classification().bus_type(1), BusType::Generator);
        // the classifier would promote bus 0 straight back
        assert_rejected(
            &mut pf,
            Edit::BusType {
                bus: 0,
                bus_type: BusType::Generator,
            },
            RebuildRequired::SlackDemoted { bus: 0 },
        );
        let impact = pf
            .apply_edit(Edit::BusType {
                bus: 0,
                bus_type: BusType::Slack,
            })
            .unwrap();
        assert_eq!(impact, EditImpact::NumericOnly);
    }

    #[test]
    fn test_second_slack_generator_keeps_slack() {
        let mut pf = solved(&three_bus(), Method::NewtonRaphson);
        let impact = pf
            .apply_edit(Edit::AddGenerator(Generator::new(0, 0.0, 1.0)))
            .unwrap();
        assert_eq!(impact, EditImpact::NumericOnly);
        let impact = pf
            .apply_edit(Edit::GeneratorStatus {
                generator: 0,
                in_service: false,
            })
            .unwrap();
        assert_eq!(impact, EditImpact::NumericOnly);
        assert_eq!(pf.classification().slack, 0);
    }

    #[test]
    fn test_bad_index_leaves_handle_untouched() {
        let mut pf = solved(&three_bus(), Method::FastDecoupledBX);
        let err = pf.apply_edit(Edit::BranchStatus {
            branch: 9,
            in_service: false,
        });
        assert!(matches!(
            err,
            Err(PowerFlowError::Configuration(ConfigurationError::UnknownElement {
                kind: "branch",
                index: 9
            }))
        ));
        assert!(pf.convergence().converged());
    }
}
