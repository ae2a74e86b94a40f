use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use good_lp::solvers::SolutionStatus;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    variable,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{Constraint, Domain, Index, LinearExpr, ObjectiveSense, PackingModel, Sense};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pure-Rust simplex with branch and bound.
    #[default]
    MicroLp,
    #[cfg(feature = "highs")]
    Highs,
}

/// Per-call solver options. Backends that cannot honour an option ignore
/// it.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub backend: Backend,
    pub threads: usize,
    pub time_limit: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            threads: 6,
            time_limit: None,
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    /// Anything else the backend reported, kept verbatim.
    Other(String),
}

impl SolveStatus {
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Optimal => f.write_str("optimal"),
            SolveStatus::Infeasible => f.write_str("infeasible"),
            SolveStatus::Other(raw) => write!(f, "other ({raw})"),
        }
    }
}

/// Solved values grouped by variable family, then index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<AssignedValue>", into = "Vec<AssignedValue>")]
pub struct Assignment {
    values: BTreeMap<String, BTreeMap<Index, f64>>,
}

/// Flat form of one assignment entry, used for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedValue {
    pub variable: String,
    pub index: Index,
    pub value: f64,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary values are rounded to 0 or 1 to drop solver noise.
    pub fn from_values(model: &PackingModel, values: &[f64]) -> Self {
        let mut assignment = Self::new();
        for (def, &value) in model.variables().iter().zip(values) {
            let value = match def.domain {
                Domain::Binary => value.round(),
                Domain::NonNegativeReal => value,
            };
            assignment.insert(def.family, def.index.clone(), value);
        }
        assignment
    }

    pub fn insert(&mut self, family: &str, index: Index, value: f64) {
        self.values
            .entry(family.to_string())
            .or_default()
            .insert(index, value);
    }

    pub fn get(&self, family: &str, index: &Index) -> Option<f64> {
        self.values.get(family)?.get(index).copied()
    }

    pub fn family<'a>(&'a self, family: &str) -> impl Iterator<Item = (&'a Index, f64)> + 'a {
        self.values
            .get(family)
            .into_iter()
            .flatten()
            .map(|(index, &value)| (index, value))
    }

    pub fn len(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<AssignedValue>> for Assignment {
    fn from(entries: Vec<AssignedValue>) -> Self {
        let mut assignment = Self::new();
        for e in entries {
            assignment.insert(&e.variable, e.index, e.value);
        }
        assignment
    }
}

impl From<Assignment> for Vec<AssignedValue> {
    fn from(assignment: Assignment) -> Self {
        assignment
            .values
            .into_iter()
            .flat_map(|(variable, values)| {
                values.into_iter().map(move |(index, value)| AssignedValue {
                    variable: variable.clone(),
                    index,
                    value,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: SolveStatus,
    pub objective_value: Option<f64>,
    pub assignment: Assignment,
    pub elapsed: Duration,
}

impl SolveResult {
    pub fn is_solved(&self) -> bool {
        self.status.is_solved()
    }
}

/// Hands a [`PackingModel`] to a MIP solver. Failures to solve are reported
/// through [`SolveStatus`], never as errors.
pub trait SolverAdapter {
    fn solve(&self, model: &PackingModel, config: &SolverConfig) -> SolveResult;
}

/// Adapter over the `good_lp` modelling layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl SolverAdapter for GoodLpSolver {
    fn solve(&self, model: &PackingModel, config: &SolverConfig) -> SolveResult {
        let start = Instant::now();

        let mut problem_vars = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .variables()
            .iter()
            .map(|def| {
                let mut definition = match def.domain {
                    Domain::Binary => variable().binary(),
                    Domain::NonNegativeReal => variable().min(0.0),
                };
                if let Some(upper) = def.upper {
                    definition = definition.max(upper);
                }
                problem_vars.add(definition.name(def.to_string()))
            })
            .collect();

        let objective = to_expression(&model.objective().expr, &vars);
        let unsolved = match model.objective().sense {
            ObjectiveSense::Maximize => problem_vars.maximise(objective),
            ObjectiveSense::Minimize => problem_vars.minimise(objective),
        };

        info!(
            model = model.name(),
            backend = ?config.backend,
            variables = vars.len(),
            constraints = model.constraints().len(),
            "solving"
        );

        let outcome = match config.backend {
            Backend::MicroLp => {
                if config.threads > 1 || config.time_limit.is_some() {
                    debug!(
                        threads = config.threads,
                        time_limit = ?config.time_limit,
                        "microlp runs single-threaded without a time limit"
                    );
                }
                let problem = unsolved.using(good_lp::solvers::microlp::microlp);
                run(problem, model, &vars)
            }
            #[cfg(feature = "highs")]
            Backend::Highs => {
                let threads = i32::try_from(config.threads).unwrap_or(i32::MAX);
                let mut problem = unsolved
                    .using(good_lp::solvers::highs::highs)
                    .set_option("threads", threads);
                if let Some(limit) = config.time_limit {
                    problem = problem.set_option("time_limit", limit.as_secs_f64());
                }
                run(problem, model, &vars)
            }
        };

        let result = to_result(model, outcome, start.elapsed());
        let elapsed = result.elapsed;

        match &result.status {
            SolveStatus::Optimal => info!(
                objective = result.objective_value,
                elapsed_ms = elapsed.as_millis() as u64,
                "feasible and optimal solution found"
            ),
            SolveStatus::Infeasible => info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "no feasible solution found"
            ),
            SolveStatus::Other(raw) => warn!(status = %raw, "solver finished without a usable solution"),
        }
        result
    }
}

type Outcome = Result<(SolutionStatus, Vec<f64>), ResolutionError>;

fn run<M>(problem: M, model: &PackingModel, vars: &[Variable]) -> Outcome
where
    M: SolverModel<Error = ResolutionError>,
{
    let problem = model
        .constraints()
        .iter()
        .fold(problem, |problem, c| problem.with(to_constraint(c, vars)));
    let solution = problem.solve()?;
    Ok((
        solution.status(),
        vars.iter().map(|&v| solution.value(v)).collect(),
    ))
}

/// Only a proven optimum carries values. A run stopped by a time or gap
/// limit is reported as `Other` and its incumbent dropped.
fn to_result(model: &PackingModel, outcome: Outcome, elapsed: Duration) -> SolveResult {
    let unsolved = |status| SolveResult {
        status,
        objective_value: None,
        assignment: Assignment::new(),
        elapsed,
    };
    match outcome {
        Ok((SolutionStatus::Optimal, values)) => SolveResult {
            status: SolveStatus::Optimal,
            objective_value: Some(model.objective().expr.evaluate(&values)),
            assignment: Assignment::from_values(model, &values),
            elapsed,
        },
        Ok((stopped, _)) => unsolved(SolveStatus::Other(format!("{stopped:?}").to_lowercase())),
        Err(ResolutionError::Infeasible) => unsolved(SolveStatus::Infeasible),
        Err(e) => unsolved(SolveStatus::Other(e.to_string())),
    }
}

fn to_expression(expr: &LinearExpr, vars: &[Variable]) -> Expression {
    expr.terms()
        .iter()
        .map(|&(var, coef)| coef * vars[var.position()])
        .fold(Expression::from(expr.constant()), |acc, term| acc + term)
}

fn to_constraint(c: &Constraint, vars: &[Variable]) -> good_lp::Constraint {
    let lhs = to_expression(&c.expr, vars);
    let rhs = c.rhs;
    match c.sense {
        Sense::Le => constraint!(lhs <= rhs),
        Sense::Ge => constraint!(lhs >= rhs),
        Sense::Eq => constraint!(lhs == rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Strategy, build_model};
    use crate::inventory::InventoryIndex;
    use crate::model::idx;
    use crate::types::Inventory;

    fn solve(pairs: &[(i64, i64)], strategy: Strategy) -> SolveResult {
        let inv: Inventory = pairs.iter().copied().collect();
        let inventory = InventoryIndex::build(&inv).unwrap();
        let model = build_model(strategy, "test", &inventory);
        GoodLpSolver.solve(&model, &SolverConfig::default())
    }

    #[test]
    fn test_grid_four_equal_tiles() {
        let result = solve(&[(1, 0), (2, 4)], Strategy::Grid);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.objective_value.unwrap() - 4.0).abs() < 1e-6);
        let placed = result.assignment.family("x").filter(|(_, v)| *v > 0.5).count();
        assert_eq!(placed, 4);
    }

    #[test]
    fn test_geometric_four_equal_tiles() {
        let result = solve(&[(1, 0), (2, 4)], Strategy::Geometric);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!((result.objective_value.unwrap() - 4.0).abs() < 1e-6);
        assert_eq!(result.assignment.get("theta", &idx![4u32]), Some(1.0));
        assert_eq!(result.assignment.get("area", &idx![]).map(f64::round), Some(16.0));
    }

    #[test]
    fn test_leftover_tile_is_not_used() {
        // Area 5: only the 2x2 tile can form a square of side 2.
        for strategy in [Strategy::Grid, Strategy::Geometric] {
            let result = solve(&[(1, 1), (2, 1)], strategy);
            assert!(result.is_solved(), "{strategy}: {}", result.status);
            assert!((result.objective_value.unwrap() - 2.0).abs() < 1e-6, "{strategy}");
        }
    }

    #[test]
    fn test_infeasible_model() {
        let mut model = PackingModel::new("infeasible", Strategy::Grid);
        let b = model.add_variable("b", idx![], Domain::Binary);
        model.add_constraint(Constraint::new(
            "impossible_c",
            idx![],
            LinearExpr::from(b),
            Sense::Ge,
            LinearExpr::from_constant(2.0),
        ));
        model.maximize(LinearExpr::from(b));
        let result = GoodLpSolver.solve(&model, &SolverConfig::default());
        assert_eq!(result.status, SolveStatus::Infeasible);
        assert!(!result.is_solved());
        assert!(result.objective_value.is_none());
        assert!(result.assignment.is_empty());
    }

    #[test]
    fn test_stopped_run_is_not_optimal() {
        let mut model = PackingModel::new("limits", Strategy::Grid);
        let w = model.add_variable("w", idx![], Domain::NonNegativeReal);
        model.maximize(LinearExpr::from(w));
        let elapsed = Duration::from_millis(5);

        let result = to_result(&model, Ok((SolutionStatus::Optimal, vec![3.0])), elapsed);
        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.objective_value, Some(3.0));
        assert_eq!(result.assignment.get("w", &idx![]), Some(3.0));

        for stopped in [SolutionStatus::TimeLimit, SolutionStatus::GapLimit] {
            let label = format!("{stopped:?}");
            let result = to_result(&model, Ok((stopped, vec![2.0])), elapsed);
            assert!(
                matches!(result.status, SolveStatus::Other(_)),
                "{label} reported as {}",
                result.status
            );
            assert!(!result.is_solved());
            assert!(result.objective_value.is_none());
            assert!(result.assignment.is_empty(), "incumbent must be dropped");
        }

        let result = to_result(&model, Err(ResolutionError::Unbounded), elapsed);
        assert!(matches!(result.status, SolveStatus::Other(_)));
        let result = to_result(&model, Err(ResolutionError::Infeasible), elapsed);
        assert_eq!(result.status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_config_builder() {
        let config = SolverConfig::new()
            .with_threads(2)
            .with_time_limit(Duration::from_secs(5));
        assert_eq!(config.backend, Backend::MicroLp);
        assert_eq!(config.threads, 2);
        assert_eq!(config.time_limit, Some(Duration::from_secs(5)));
        assert_eq!(SolverConfig::default().threads, 6);
    }

    #[test]
    fn test_assignment_serializes_flat() {
        let mut assignment = Assignment::new();
        assignment.insert("x", idx![1u32, 2u32, 3u32], 1.0);
        assignment.insert("w", idx![], 4.0);
        let json = serde_json::to_value(&assignment).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"variable": "w", "index": [], "value": 4.0},
                {"variable": "x", "index": [1, 2, 3], "value": 1.0},
            ])
        );
        let back: Assignment = serde_json::from_value(json).unwrap();
        assert_eq!(back, assignment);
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SolveStatus::Other("time limit".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"other","detail":"time limit"}"#);
        assert_eq!(serde_json::to_string(&SolveStatus::Optimal).unwrap(), r#"{"status":"optimal"}"#);
    }
}
