//! Random benchmark formula generation
//!
//! Formulas are built as a small syntax tree ([`Formula`]) whose `Display`
//! output is the textual input language of the external solver. Generation
//! never touches global randomness: every sampling operation goes through the
//! randomness source owned by a [`FormulaGenerator`].
//!
//! # Example
//!
//! ```
//! use fplbench::formula::{FormulaGenerator, ProbabilityOperand, apply_probability_operator};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut generator = FormulaGenerator::new(StdRng::seed_from_u64(7));
//! let cnf = generator.cnf(4, 2).unwrap();
//! let atom = apply_probability_operator(ProbabilityOperand::Cnf(cnf)).unwrap();
//! assert!(atom.to_string().starts_with("P(("));
//! ```

pub mod ast;
pub mod generator;
pub mod template;

pub use ast::{Clause, Cnf, Formula, Literal, Variable, conjoin};
pub use generator::{DEFAULT_MAX_IMPLICATION_ATTEMPTS, FormulaGenerator};
pub use template::LTemplate;

use thiserror::Error;

/// Error type for formula generation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// The variable pool is empty
    #[error("Variable pool is empty (n must be at least 1)")]
    NoVariables,
    /// The probability operator was applied to a CNF without clauses
    #[error("Cannot apply the probability operator to an empty CNF")]
    EmptyCnf,
    /// A simple L-clause was requested with no modal atoms
    #[error("A simple L-clause needs at least one modal atom")]
    NoModalAtoms,
    /// Rejection sampling of a classical implication did not terminate
    #[error("Classical implication sampling rejected {attempts} consecutive draws")]
    RejectionLimit {
        /// Number of draws made before giving up
        attempts: usize,
    },
}

/// Result type for formula generation
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Operand of the probability operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbabilityOperand {
    /// A clause sequence, conjoined left-associatively before wrapping
    Cnf(Cnf),
    /// A single formula, wrapped as is
    Formula(Formula),
}

impl From<Cnf> for ProbabilityOperand {
    fn from(cnf: Cnf) -> Self {
        Self::Cnf(cnf)
    }
}

impl From<Formula> for ProbabilityOperand {
    fn from(formula: Formula) -> Self {
        Self::Formula(formula)
    }
}

/// Wrap an operand in `P(...)`
///
/// A CNF of clauses `c1..cj` becomes `P((((c1 ∧ c2) ∧ ...) ∧ cj))`, with
/// exactly `j - 1` conjunctions. An empty CNF is rejected.
pub fn apply_probability_operator(
    operand: impl Into<ProbabilityOperand>,
) -> GenerateResult<Formula> {
    match operand.into() {
        ProbabilityOperand::Cnf(cnf) => {
            let conjunction = conjoin(cnf.into_iter().map(Formula::from))
                .ok_or(GenerateError::EmptyCnf)?;
            Ok(Formula::prob(conjunction))
        }
        ProbabilityOperand::Formula(formula) => Ok(Formula::prob(formula)),
    }
}

/// Weak conjunction of top-level clauses, `None` when there are none
#[must_use]
pub fn combine_top_level(clauses: Vec<Formula>) -> Option<Formula> {
    conjoin(clauses)
}

/// Render the weak conjunction of top-level clauses; empty input renders as
/// the empty string
#[must_use]
pub fn render_top_level(clauses: Vec<Formula>) -> String {
    combine_top_level(clauses)
        .map(|f| f.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(vars: [u32; 3]) -> Clause {
        Clause(vars.map(|v| Literal::pos(Variable::new(v))))
    }

    #[test]
    fn test_probability_over_cnf() {
        let cnf = vec![clause([1, 2, 3]), clause([2, 3, 4])];
        let atom = apply_probability_operator(cnf).unwrap();
        assert_eq!(
            atom.to_string(),
            "P((((X1 ∨ X2) ∨ X3) ∧ ((X2 ∨ X3) ∨ X4)))"
        );
    }

    #[test]
    fn test_probability_over_single_clause() {
        let atom = apply_probability_operator(vec![clause([1, 1, 1])]).unwrap();
        assert_eq!(atom.to_string(), "P(((X1 ∨ X1) ∨ X1))");
    }

    #[test]
    fn test_probability_over_formula() {
        let f = Formula::not(Formula::Var(Variable::new(5)));
        let atom = apply_probability_operator(f).unwrap();
        assert_eq!(atom.to_string(), "P(¬X5)");
    }

    #[test]
    fn test_probability_over_empty_cnf() {
        assert_eq!(
            apply_probability_operator(Cnf::new()),
            Err(GenerateError::EmptyCnf)
        );
    }

    #[test]
    fn test_render_top_level() {
        assert_eq!(render_top_level(Vec::new()), "");

        let clauses = vec![
            Formula::prob(Formula::Var(Variable::new(1))),
            Formula::prob(Formula::Var(Variable::new(2))),
            Formula::prob(Formula::Var(Variable::new(3))),
        ];
        assert_eq!(
            render_top_level(clauses),
            "((P(X1) ∧ P(X2)) ∧ P(X3))"
        );
    }
}
