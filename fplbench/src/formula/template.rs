//! The fixed Łukasiewicz clause templates
//!
//! Each template combines three modal atoms with `⊕` and negation. The
//! placeholder order `{0}`, `{1}`, `{2}` is positional.
//!
//! Templates are recognized by shape, with the atom contents abstracted
//! away. [`LTemplate::NegPairFirstSecond`] and [`LTemplate::NegPairFirstThird`]
//! produce the same shape `(¬(_ ⊕ _) ⊕ _)` and only differ in which atom
//! lands in which slot, so a clause of that shape matches both.

use super::ast::Formula;
use serde::{Deserialize, Serialize};

/// One of the 11 L-clause templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LTemplate {
    /// `(({0} ⊕ {1}) ⊕ {2})`
    Plain,
    /// `((¬{0} ⊕ {1}) ⊕ {2})`
    NegFirst,
    /// `(({0} ⊕ ¬{1}) ⊕ {2})`
    NegSecond,
    /// `(({0} ⊕ {1}) ⊕ ¬{2})`
    NegThird,
    /// `((¬{0} ⊕ ¬{1}) ⊕ {2})`
    NegFirstSecond,
    /// `((¬{0} ⊕ {1}) ⊕ ¬{2})`
    NegFirstThird,
    /// `(({0} ⊕ ¬{1}) ⊕ ¬{2})`
    NegSecondThird,
    /// `((¬{0} ⊕ ¬{1}) ⊕ ¬{2})`
    NegAll,
    /// `(¬({0} ⊕ {1}) ⊕ {2})`
    NegPairFirstSecond,
    /// `(¬({0} ⊕ {2}) ⊕ {1})`
    ///
    /// Same shape as [`LTemplate::NegPairFirstSecond`].
    NegPairFirstThird,
    /// `({0} ⊕ ¬({1} ⊕ {2}))`
    NegPairSecondThird,
}

impl LTemplate {
    /// All templates, in canonical order
    pub const ALL: [LTemplate; 11] = [
        Self::Plain,
        Self::NegFirst,
        Self::NegSecond,
        Self::NegThird,
        Self::NegFirstSecond,
        Self::NegFirstThird,
        Self::NegSecondThird,
        Self::NegAll,
        Self::NegPairFirstSecond,
        Self::NegPairFirstThird,
        Self::NegPairSecondThird,
    ];

    /// Textual pattern with `{0}`, `{1}`, `{2}` placeholders
    #[must_use]
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Plain => "(({0} ⊕ {1}) ⊕ {2})",
            Self::NegFirst => "((¬{0} ⊕ {1}) ⊕ {2})",
            Self::NegSecond => "(({0} ⊕ ¬{1}) ⊕ {2})",
            Self::NegThird => "(({0} ⊕ {1}) ⊕ ¬{2})",
            Self::NegFirstSecond => "((¬{0} ⊕ ¬{1}) ⊕ {2})",
            Self::NegFirstThird => "((¬{0} ⊕ {1}) ⊕ ¬{2})",
            Self::NegSecondThird => "(({0} ⊕ ¬{1}) ⊕ ¬{2})",
            Self::NegAll => "((¬{0} ⊕ ¬{1}) ⊕ ¬{2})",
            Self::NegPairFirstSecond => "(¬({0} ⊕ {1}) ⊕ {2})",
            Self::NegPairFirstThird => "(¬({0} ⊕ {2}) ⊕ {1})",
            Self::NegPairSecondThird => "({0} ⊕ ¬({1} ⊕ {2}))",
        }
    }

    /// Substitute the three atoms positionally
    #[must_use]
    pub fn instantiate(self, atoms: [Formula; 3]) -> Formula {
        let [a, b, c] = atoms;
        match self {
            Self::Plain => Formula::oplus(Formula::oplus(a, b), c),
            Self::NegFirst => Formula::oplus(Formula::oplus(Formula::not(a), b), c),
            Self::NegSecond => Formula::oplus(Formula::oplus(a, Formula::not(b)), c),
            Self::NegThird => Formula::oplus(Formula::oplus(a, b), Formula::not(c)),
            Self::NegFirstSecond => {
                Formula::oplus(Formula::oplus(Formula::not(a), Formula::not(b)), c)
            }
            Self::NegFirstThird => {
                Formula::oplus(Formula::oplus(Formula::not(a), b), Formula::not(c))
            }
            Self::NegSecondThird => {
                Formula::oplus(Formula::oplus(a, Formula::not(b)), Formula::not(c))
            }
            Self::NegAll => Formula::oplus(
                Formula::oplus(Formula::not(a), Formula::not(b)),
                Formula::not(c),
            ),
            Self::NegPairFirstSecond => Formula::oplus(Formula::not(Formula::oplus(a, b)), c),
            Self::NegPairFirstThird => Formula::oplus(Formula::not(Formula::oplus(a, c)), b),
            Self::NegPairSecondThird => Formula::oplus(a, Formula::not(Formula::oplus(b, c))),
        }
    }

    /// Formula shape of this template, with `P(TOP)` in every atom slot
    #[must_use]
    pub fn shape(self) -> Formula {
        let hole = Formula::prob(Formula::Top);
        self.instantiate([hole.clone(), hole.clone(), hole])
    }

    /// Check whether `formula` has the shape of this template over three
    /// modal atoms
    #[must_use]
    pub fn matches(self, formula: &Formula) -> bool {
        formula.modal_atoms().len() == 3 && formula.skeleton() == self.shape()
    }

    /// Shape class of `formula`: every template it is an instance of
    ///
    /// Holds one template, except for the `(¬(_ ⊕ _) ⊕ _)` shape shared by
    /// [`LTemplate::NegPairFirstSecond`] and [`LTemplate::NegPairFirstThird`].
    /// Empty when `formula` is not an L-clause.
    #[must_use]
    pub fn matching(formula: &Formula) -> Vec<LTemplate> {
        if formula.modal_atoms().len() != 3 {
            return Vec::new();
        }
        let skeleton = formula.skeleton();
        Self::ALL
            .into_iter()
            .filter(|t| t.shape() == skeleton)
            .collect()
    }
}
