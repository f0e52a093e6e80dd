//! Random formula generator
//!
//! [`FormulaGenerator`] owns its randomness source, so independent generators
//! can run concurrently without sharing state, and a seeded source makes a
//! generation run reproducible.

use super::ast::{Clause, Cnf, Formula, Literal, Variable};
use super::template::LTemplate;
use super::{GenerateError, GenerateResult, ProbabilityOperand, apply_probability_operator};
use rand::Rng;

/// Default cap on rejected draws in [`FormulaGenerator::classical_implication`]
///
/// With uniform weights the degenerate pair has probability `1/(n+1)^2`, so
/// hitting this cap means the sampling weights are broken.
pub const DEFAULT_MAX_IMPLICATION_ATTEMPTS: usize = 10_000;

/// Generator for CNF formulas, classical implications and Łukasiewicz clauses
#[derive(Debug, Clone)]
pub struct FormulaGenerator<R> {
    rng: R,
    max_implication_attempts: usize,
}

impl<R: Rng> FormulaGenerator<R> {
    /// Create a generator drawing from `rng`
    #[must_use]
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            max_implication_attempts: DEFAULT_MAX_IMPLICATION_ATTEMPTS,
        }
    }

    /// Set the rejection-sampling cap for classical implications
    #[must_use]
    pub fn with_max_implication_attempts(mut self, attempts: usize) -> Self {
        self.max_implication_attempts = attempts.max(1);
        self
    }

    fn variable(&mut self, n: u32) -> Variable {
        Variable::new(self.rng.random_range(1..=n))
    }

    /// Sample a classical "polynomial" formula over `n` variables
    ///
    /// Antecedent is drawn from `{X1..Xn, TOP}`, consequent from
    /// `{X1..Xn, BOT}`. The pair `(TOP, BOT)` is rejected and redrawn. A `TOP`
    /// antecedent yields the bare consequent, a `BOT` consequent yields the
    /// negated antecedent, anything else yields `(ant → cons)`.
    pub fn classical_implication(&mut self, n: u32) -> GenerateResult<Formula> {
        if n == 0 {
            return Err(GenerateError::NoVariables);
        }

        // Index n + 1 stands for TOP (antecedent) or BOT (consequent)
        for _ in 0..self.max_implication_attempts {
            let ant = self.rng.random_range(1..=n + 1);
            let cons = self.rng.random_range(1..=n + 1);
            let ant_top = ant == n + 1;
            let cons_bot = cons == n + 1;

            match (ant_top, cons_bot) {
                (true, true) => continue,
                (true, false) => return Ok(Formula::Var(Variable::new(cons))),
                (false, true) => return Ok(Formula::not(Formula::Var(Variable::new(ant)))),
                (false, false) => {
                    return Ok(Formula::implies(
                        Formula::Var(Variable::new(ant)),
                        Formula::Var(Variable::new(cons)),
                    ));
                }
            }
        }

        Err(GenerateError::RejectionLimit {
            attempts: self.max_implication_attempts,
        })
    }

    /// Sample `m` random 3-literal clauses over `n` variables
    ///
    /// Variables are drawn uniformly with replacement; each literal is negated
    /// with probability 0.5.
    pub fn cnf(&mut self, n: u32, m: usize) -> GenerateResult<Cnf> {
        if n == 0 {
            return Err(GenerateError::NoVariables);
        }

        let mut clauses = Vec::with_capacity(m);
        for _ in 0..m {
            let vars = [self.variable(n), self.variable(n), self.variable(n)];
            let literals = vars.map(|v| {
                if self.rng.random_bool(0.5) {
                    Literal::neg(v)
                } else {
                    Literal::pos(v)
                }
            });
            clauses.push(Clause(literals));
        }
        Ok(clauses)
    }

    /// Fresh modal atom `P(...)` over a new CNF
    pub fn cnf_atom(&mut self, n: u32, m: usize) -> GenerateResult<Formula> {
        let cnf = self.cnf(n, m)?;
        apply_probability_operator(ProbabilityOperand::Cnf(cnf))
    }

    /// Fresh modal atom `P(...)` over a new classical implication
    pub fn implication_atom(&mut self, n: u32) -> GenerateResult<Formula> {
        let formula = self.classical_implication(n)?;
        apply_probability_operator(ProbabilityOperand::Formula(formula))
    }

    /// Pick one of the 11 templates uniformly
    pub fn template(&mut self) -> LTemplate {
        LTemplate::ALL[self.rng.random_range(0..LTemplate::ALL.len())]
    }

    /// Instantiate a uniformly chosen template with `atoms`
    ///
    /// Returns the chosen template alongside the clause.
    pub fn l_clause(&mut self, atoms: [Formula; 3]) -> (LTemplate, Formula) {
        let template = self.template();
        (template, template.instantiate(atoms))
    }

    /// `k` L-clauses whose atoms each wrap a fresh CNF of `m` clauses
    pub fn l_clauses(&mut self, k: usize, n: u32, m: usize) -> GenerateResult<Vec<Formula>> {
        (0..k)
            .map(|_| -> GenerateResult<Formula> {
                let atoms = [
                    self.cnf_atom(n, m)?,
                    self.cnf_atom(n, m)?,
                    self.cnf_atom(n, m)?,
                ];
                Ok(self.l_clause(atoms).1)
            })
            .collect()
    }

    /// `k` L-clauses whose atoms each wrap a fresh classical implication
    pub fn l_clauses_modal(&mut self, k: usize, n: u32) -> GenerateResult<Vec<Formula>> {
        (0..k)
            .map(|_| -> GenerateResult<Formula> {
                let atoms = [
                    self.implication_atom(n)?,
                    self.implication_atom(n)?,
                    self.implication_atom(n)?,
                ];
                Ok(self.l_clause(atoms).1)
            })
            .collect()
    }

    /// `l2` simple L-clauses, each folding `l1` fresh CNF atoms
    pub fn simple_l_clauses(
        &mut self,
        m: usize,
        n: u32,
        l1: usize,
        l2: usize,
    ) -> GenerateResult<Vec<Formula>> {
        (0..l2)
            .map(|_| -> GenerateResult<Formula> {
                let atoms = (0..l1)
                    .map(|_| self.cnf_atom(n, m))
                    .collect::<GenerateResult<Vec<_>>>()?;
                self.combine_modal_atoms(atoms)
                    .ok_or(GenerateError::NoModalAtoms)
            })
            .collect()
    }

    /// Fold modal atoms into a simple L-clause
    ///
    /// The first atom is negated with probability 0.5; every following atom
    /// is joined with `⊕` and negated with probability 0.5.
    pub fn combine_modal_atoms(&mut self, atoms: Vec<Formula>) -> Option<Formula> {
        let mut atoms = atoms.into_iter();
        let first = atoms.next()?;
        let mut expr = first.negate_if(self.rng.random_bool(0.5));
        for atom in atoms {
            expr = Formula::oplus(expr, atom.negate_if(self.rng.random_bool(0.5)));
        }
        Some(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn generator(seed: u64) -> FormulaGenerator<StdRng> {
        FormulaGenerator::new(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_cnf_shape() {
        let mut g = generator(1);
        let cnf = g.cnf(4, 2).unwrap();
        assert_eq!(cnf.len(), 2);
        for clause in &cnf {
            for lit in clause.literals() {
                assert!((1..=4).contains(&lit.var.index()));
            }
        }
        assert!(g.cnf(4, 0).unwrap().is_empty());
    }

    #[test]
    fn test_cnf_requires_variables() {
        let mut g = generator(1);
        assert_eq!(g.cnf(0, 3), Err(GenerateError::NoVariables));
        assert_eq!(g.classical_implication(0), Err(GenerateError::NoVariables));
    }

    #[test]
    fn test_implication_never_degenerate() {
        let mut g = generator(2);
        for _ in 0..2000 {
            let f = g.classical_implication(1).unwrap();
            let text = f.to_string();
            assert!(!text.contains("TOP"));
            assert!(!text.contains("BOT"));
            match f {
                Formula::Var(_) => {}
                Formula::Not(inner) => assert!(matches!(*inner, Formula::Var(_))),
                Formula::Implies(a, b) => {
                    assert!(matches!(*a, Formula::Var(_)));
                    assert!(matches!(*b, Formula::Var(_)));
                }
                other => panic!("unexpected shape: {other}"),
            }
        }
    }

    #[test]
    fn test_implication_case_frequencies() {
        // n = 1: each of the 3 accepted pairs has probability 1/3
        let mut g = generator(3);
        let samples = 9000;
        let (mut bare, mut negated, mut implication) = (0, 0, 0);
        for _ in 0..samples {
            match g.classical_implication(1).unwrap() {
                Formula::Var(_) => bare += 1,
                Formula::Not(_) => negated += 1,
                Formula::Implies(..) => implication += 1,
                _ => unreachable!(),
            }
        }
        for count in [bare, negated, implication] {
            assert!((2700..=3300).contains(&count), "count {count} out of range");
        }
    }

    #[test]
    fn test_rejection_cap() {
        // Single-draw cap with n = 1 fails whenever the first draw is (TOP, BOT)
        let mut failures = 0;
        let mut g = generator(4).with_max_implication_attempts(1);
        for _ in 0..400 {
            if let Err(e) = g.classical_implication(1) {
                assert_eq!(e, GenerateError::RejectionLimit { attempts: 1 });
                failures += 1;
            }
        }
        assert!(failures > 0);
    }

    #[test]
    fn test_l_clauses_use_three_atoms() {
        let mut g = generator(5);
        let clauses = g.l_clauses(3, 5, 2).unwrap();
        assert_eq!(clauses.len(), 3);
        for clause in &clauses {
            assert_eq!(clause.modal_atom_count(), 3);
        }

        let modal = g.l_clauses_modal(4, 5).unwrap();
        assert_eq!(modal.len(), 4);
        assert!(modal.iter().all(|c| c.modal_atom_count() == 3));

        assert!(g.l_clauses(0, 5, 2).unwrap().is_empty());
    }

    #[test]
    fn test_simple_l_clauses() {
        let mut g = generator(6);
        let clauses = g.simple_l_clauses(2, 5, 4, 3).unwrap();
        assert_eq!(clauses.len(), 3);
        for clause in &clauses {
            assert_eq!(clause.modal_atom_count(), 4);
            assert_eq!(clause.to_string().matches('⊕').count(), 3);
        }
        assert_eq!(
            g.simple_l_clauses(2, 5, 0, 1),
            Err(GenerateError::NoModalAtoms)
        );
    }

    #[test]
    fn test_combine_modal_atoms() {
        let mut g = generator(7);
        assert!(g.combine_modal_atoms(Vec::new()).is_none());

        let atom = Formula::prob(Formula::Var(Variable::new(1)));
        let single = g.combine_modal_atoms(vec![atom.clone()]).unwrap();
        assert!(single == atom || single == Formula::not(atom));
    }

    #[test]
    fn test_same_seed_same_formula() {
        let a = generator(42).l_clauses(2, 10, 3).unwrap();
        let b = generator(42).l_clauses(2, 10, 3).unwrap();
        assert_eq!(a, b);
    }
}
