//! The unbiasedness linear program behind optimized interleaving.
//!
//! One variable `p_L ∈ [0, 1]` per candidate list, `Σ p_L = 1`, and one equality row per
//! constraint (`Σ_L row[L]·p_L = 0`); the objective maximizes `Σ_L p_L·sensitivity[L]`.
//!
//! Degenerate candidate sets can make the equalities infeasible. The program is then solved in
//! two phases: first minimize the total slack needed to satisfy the rows, then maximize
//! sensitivity among distributions that use no more than that minimal slack. The result is
//! flagged as relaxed.

use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};
use tracing::warn;

use crate::alloc::normalize;
use crate::error::ComparisonError;

/// Coefficients below this magnitude are dropped.
const COEFFICIENT_EPS: f64 = 1e-12;
/// Extra slack allowed in phase two on top of the phase-one optimum.
const SLACK_TOLERANCE: f64 = 1e-9;

/// Solved distribution over candidate lists.
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub probabilities: Vec<f64>,
    /// The unbiasedness rows only hold up to minimal slack.
    pub relaxed: bool,
}

fn expr(vars: &[Variable], row: &[f64]) -> LinearExpr {
    let mut e = LinearExpr::empty();
    for (v, c) in vars.iter().zip(row) {
        if c.abs() > COEFFICIENT_EPS {
            e.add(*v, *c);
        }
    }
    e
}

fn add_simplex(problem: &mut Problem, vars: &[Variable]) {
    let mut sum = LinearExpr::empty();
    for v in vars {
        sum.add(*v, 1.0);
    }
    problem.add_constraint(sum, ComparisonOp::Eq, 1.0);
}

fn solver_error(e: minilp::Error) -> ComparisonError {
    ComparisonError::Solver(e.to_string())
}

fn exact(rows: &[&[f64]], sensitivity: &[f64]) -> Result<Vec<f64>, minilp::Error> {
    let mut problem = Problem::new(OptimizationDirection::Maximize);
    let vars: Vec<Variable> = sensitivity
        .iter()
        .map(|&s| problem.add_var(s, (0.0, 1.0)))
        .collect();
    add_simplex(&mut problem, &vars);
    for row in rows {
        problem.add_constraint(expr(&vars, row), ComparisonOp::Eq, 0.0);
    }
    let solution = problem.solve()?;
    Ok(vars.iter().map(|v| solution[*v]).collect())
}

/// Adds `row·p + s⁺ − s⁻ = 0` for every row; returns the slack variables.
fn add_slack_rows(
    problem: &mut Problem,
    vars: &[Variable],
    rows: &[&[f64]],
    slack_cost: f64,
) -> Vec<Variable> {
    let mut slacks = Vec::with_capacity(2 * rows.len());
    for row in rows {
        let plus = problem.add_var(slack_cost, (0.0, f64::INFINITY));
        let minus = problem.add_var(slack_cost, (0.0, f64::INFINITY));
        let mut e = expr(vars, row);
        e.add(plus, 1.0);
        e.add(minus, -1.0);
        problem.add_constraint(e, ComparisonOp::Eq, 0.0);
        slacks.push(plus);
        slacks.push(minus);
    }
    slacks
}

fn relaxed(rows: &[&[f64]], sensitivity: &[f64]) -> Result<Vec<f64>, ComparisonError> {
    // Phase one: least total slack.
    let mut problem = Problem::new(OptimizationDirection::Minimize);
    let vars: Vec<Variable> = sensitivity
        .iter()
        .map(|_| problem.add_var(0.0, (0.0, 1.0)))
        .collect();
    add_simplex(&mut problem, &vars);
    add_slack_rows(&mut problem, &vars, rows, 1.0);
    let phase_one = problem.solve().map_err(solver_error)?;
    let min_slack = phase_one.objective();
    let fallback: Vec<f64> = vars.iter().map(|v| phase_one[*v]).collect();

    // Phase two: best sensitivity within that slack.
    let mut problem = Problem::new(OptimizationDirection::Maximize);
    let vars: Vec<Variable> = sensitivity
        .iter()
        .map(|&s| problem.add_var(s, (0.0, 1.0)))
        .collect();
    add_simplex(&mut problem, &vars);
    let slacks = add_slack_rows(&mut problem, &vars, rows, 0.0);
    let mut budget = LinearExpr::empty();
    for s in &slacks {
        budget.add(*s, 1.0);
    }
    let tolerance = SLACK_TOLERANCE.max(min_slack * 1e-6);
    problem.add_constraint(budget, ComparisonOp::Le, min_slack + tolerance);

    warn!(
        target: "multileave.lp",
        lists = sensitivity.len(),
        rows = rows.len(),
        min_slack,
        "unbiasedness constraints infeasible; relaxing"
    );
    match problem.solve() {
        Ok(solution) => Ok(vars.iter().map(|v| solution[*v]).collect()),
        Err(e) => {
            warn!(
                target: "multileave.lp",
                error = %e,
                "sensitivity phase failed; using the minimal-slack distribution"
            );
            Ok(fallback)
        }
    }
}

/// Maximize expected sensitivity subject to every row having zero expectation.
pub fn solve_unbiased(
    rows: &[Vec<f64>],
    sensitivity: &[f64],
) -> Result<LpSolution, ComparisonError> {
    if sensitivity.is_empty() {
        return Err(ComparisonError::Solver(
            "no candidate lists to distribute over".to_string(),
        ));
    }
    let rows: Vec<&[f64]> = rows
        .iter()
        .map(Vec::as_slice)
        .filter(|r| r.iter().any(|c| c.abs() > COEFFICIENT_EPS))
        .collect();
    let (raw, relaxed_flag) = match exact(&rows, sensitivity) {
        Ok(p) => (p, false),
        Err(minilp::Error::Infeasible) => (relaxed(&rows, sensitivity)?, true),
        Err(e) => return Err(solver_error(e)),
    };
    let clamped: Vec<f64> = raw.iter().map(|p| p.clamp(0.0, 1.0)).collect();
    Ok(LpSolution {
        probabilities: normalize(&clamped),
        relaxed: relaxed_flag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_pair_splits_evenly() {
        // Two lists with opposite credit at the first position.
        let rows = vec![vec![-0.5, 0.5], vec![0.0, 0.0]];
        let sol = solve_unbiased(&rows, &[1.0, 1.0]).unwrap();
        assert!(!sol.relaxed);
        assert!((sol.probabilities[0] - 0.5).abs() < 1e-6);
        assert!((sol.probabilities[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sensitivity_breaks_ties_among_unbiased_solutions() {
        // Lists 0 and 1 cancel each other, list 2 is neutral but worthless.
        let rows = vec![vec![1.0, -1.0, 0.0]];
        let sol = solve_unbiased(&rows, &[0.8, 0.8, 0.1]).unwrap();
        assert!(!sol.relaxed);
        assert!(sol.probabilities[2] < 1e-6);
        assert!((sol.probabilities[0] - sol.probabilities[1]).abs() < 1e-6);
    }

    #[test]
    fn one_sided_credit_is_relaxed() {
        let rows = vec![vec![1.0, 2.0]];
        let sol = solve_unbiased(&rows, &[1.0, 0.5]).unwrap();
        assert!(sol.relaxed);
        let total: f64 = sol.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        // The least biased distribution puts everything on the smaller credit.
        assert!(sol.probabilities[0] > 1.0 - 1e-6);
    }

    #[test]
    fn empty_candidate_set_is_an_error() {
        assert!(matches!(
            solve_unbiased(&[], &[]),
            Err(ComparisonError::Solver(_))
        ));
    }
}
