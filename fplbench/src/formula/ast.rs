//! Formula syntax tree and its textual rendering
//!
//! The rendering produced by [`Display`](std::fmt::Display) is the exact
//! input language of the external solver: every binary connective is fully
//! parenthesized, negation is a prefix `¬` without parentheses, and the
//! probability operator is written `P(...)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A classical propositional variable, rendered `X<index>` (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(u32);

impl Variable {
    /// Create a variable from its 1-based index
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the 1-based index
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.0)
    }
}

/// A variable or its negation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// Underlying variable
    pub var: Variable,
    /// Whether the literal is negated
    pub negated: bool,
}

impl Literal {
    /// Positive literal
    #[must_use]
    pub fn pos(var: Variable) -> Self {
        Self {
            var,
            negated: false,
        }
    }

    /// Negative literal
    #[must_use]
    pub fn neg(var: Variable) -> Self {
        Self { var, negated: true }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "¬{}", self.var)
        } else {
            write!(f, "{}", self.var)
        }
    }
}

impl From<Literal> for Formula {
    fn from(lit: Literal) -> Self {
        let var = Formula::Var(lit.var);
        if lit.negated { Formula::not(var) } else { var }
    }
}

/// A disjunction of exactly three literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clause(pub [Literal; 3]);

impl Clause {
    /// The three literals in order
    #[must_use]
    pub fn literals(&self) -> &[Literal; 3] {
        &self.0
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = &self.0;
        write!(f, "(({a} ∨ {b}) ∨ {c})")
    }
}

impl From<Clause> for Formula {
    fn from(clause: Clause) -> Self {
        let [a, b, c] = clause.0;
        Formula::or(Formula::or(a.into(), b.into()), c.into())
    }
}

/// An ordered sequence of clauses; conjunction is applied by the caller
pub type Cnf = Vec<Clause>;

/// Propositional and modal formula
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    /// Classical variable
    Var(Variable),
    /// Constant true (only ever appears as an implication antecedent)
    Top,
    /// Constant false (only ever appears as an implication consequent)
    Bot,
    /// Negation
    Not(Box<Formula>),
    /// Classical disjunction `∨`
    Or(Box<Formula>, Box<Formula>),
    /// Weak conjunction `∧`
    And(Box<Formula>, Box<Formula>),
    /// Classical implication `→`
    Implies(Box<Formula>, Box<Formula>),
    /// Łukasiewicz strong disjunction `⊕`
    Oplus(Box<Formula>, Box<Formula>),
    /// Probability operator `P(φ)`
    Prob(Box<Formula>),
}

impl Formula {
    /// `¬f`
    #[must_use]
    pub fn not(f: Formula) -> Self {
        Self::Not(Box::new(f))
    }

    /// `(a ∨ b)`
    #[must_use]
    pub fn or(a: Formula, b: Formula) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// `(a ∧ b)`
    #[must_use]
    pub fn and(a: Formula, b: Formula) -> Self {
        Self::And(Box::new(a), Box::new(b))
    }

    /// `(a → b)`
    #[must_use]
    pub fn implies(a: Formula, b: Formula) -> Self {
        Self::Implies(Box::new(a), Box::new(b))
    }

    /// `(a ⊕ b)`
    #[must_use]
    pub fn oplus(a: Formula, b: Formula) -> Self {
        Self::Oplus(Box::new(a), Box::new(b))
    }

    /// `P(f)`
    #[must_use]
    pub fn prob(f: Formula) -> Self {
        Self::Prob(Box::new(f))
    }

    /// Negate when `negate` is set, otherwise return `self` unchanged
    #[must_use]
    pub fn negate_if(self, negate: bool) -> Self {
        if negate { Self::not(self) } else { self }
    }

    /// Check whether this is a probability-operator application
    #[must_use]
    pub fn is_modal_atom(&self) -> bool {
        matches!(self, Self::Prob(_))
    }

    /// Number of `P(...)` applications in the formula
    #[must_use]
    pub fn modal_atom_count(&self) -> usize {
        match self {
            Self::Var(_) | Self::Top | Self::Bot => 0,
            Self::Not(f) => f.modal_atom_count(),
            Self::Prob(f) => 1 + f.modal_atom_count(),
            Self::Or(a, b) | Self::And(a, b) | Self::Implies(a, b) | Self::Oplus(a, b) => {
                a.modal_atom_count() + b.modal_atom_count()
            }
        }
    }

    /// Outermost `P(...)` subformulas, left to right
    #[must_use]
    pub fn modal_atoms(&self) -> Vec<&Formula> {
        let mut atoms = Vec::new();
        self.collect_modal_atoms(&mut atoms);
        atoms
    }

    fn collect_modal_atoms<'a>(&'a self, atoms: &mut Vec<&'a Formula>) {
        match self {
            Self::Prob(_) => atoms.push(self),
            Self::Var(_) | Self::Top | Self::Bot => {}
            Self::Not(f) => f.collect_modal_atoms(atoms),
            Self::Or(a, b) | Self::And(a, b) | Self::Implies(a, b) | Self::Oplus(a, b) => {
                a.collect_modal_atoms(atoms);
                b.collect_modal_atoms(atoms);
            }
        }
    }

    /// Connective structure with every outermost `P(...)` replaced by `P(TOP)`
    ///
    /// Two formulas have equal skeletons when they differ only in the
    /// contents of their modal atoms.
    #[must_use]
    pub fn skeleton(&self) -> Formula {
        match self {
            Self::Prob(_) => Self::prob(Self::Top),
            Self::Var(_) | Self::Top | Self::Bot => self.clone(),
            Self::Not(f) => Self::not(f.skeleton()),
            Self::Or(a, b) => Self::or(a.skeleton(), b.skeleton()),
            Self::And(a, b) => Self::and(a.skeleton(), b.skeleton()),
            Self::Implies(a, b) => Self::implies(a.skeleton(), b.skeleton()),
            Self::Oplus(a, b) => Self::oplus(a.skeleton(), b.skeleton()),
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(v) => write!(f, "{v}"),
            Self::Top => f.write_str("TOP"),
            Self::Bot => f.write_str("BOT"),
            Self::Not(x) => write!(f, "¬{x}"),
            Self::Or(a, b) => write!(f, "({a} ∨ {b})"),
            Self::And(a, b) => write!(f, "({a} ∧ {b})"),
            Self::Implies(a, b) => write!(f, "({a} → {b})"),
            Self::Oplus(a, b) => write!(f, "({a} ⊕ {b})"),
            Self::Prob(x) => write!(f, "P({x})"),
        }
    }
}

/// Left-associative `∧` fold: `[a, b, c]` becomes `((a ∧ b) ∧ c)`
///
/// Returns `None` for an empty input.
#[must_use]
pub fn conjoin<I>(items: I) -> Option<Formula>
where
    I: IntoIterator<Item = Formula>,
{
    items.into_iter().reduce(Formula::and)
}
