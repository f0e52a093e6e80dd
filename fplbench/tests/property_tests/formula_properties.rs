//! Property-based tests for formula generation

use fplbench::formula::{
    Formula, FormulaGenerator, LTemplate, ProbabilityOperand, apply_probability_operator,
    render_top_level,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn generator(seed: u64) -> FormulaGenerator<StdRng> {
    FormulaGenerator::new(StdRng::seed_from_u64(seed))
}

/// Variable indices mentioned in rendered text
fn variable_indices(text: &str) -> Vec<u32> {
    text.split('X')
        .skip(1)
        .map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap()
        })
        .collect()
}

proptest! {
    /// A CNF has exactly m clauses of three literals over X1..Xn
    #[test]
    fn cnf_shape(seed in any::<u64>(), n in 1u32..50, m in 0usize..40) {
        let cnf = generator(seed).cnf(n, m).unwrap();
        prop_assert_eq!(cnf.len(), m);
        for clause in &cnf {
            prop_assert_eq!(clause.literals().len(), 3);
            for literal in clause.literals() {
                prop_assert!((1..=n).contains(&literal.var.index()));
            }
            let text = clause.to_string();
            prop_assert_eq!(text.matches('∨').count(), 2);
        }
    }

    /// Wrapping j clauses yields j - 1 conjunctions inside one P(...)
    #[test]
    fn probability_operator_conjunctions(seed in any::<u64>(), n in 1u32..20, m in 1usize..30) {
        let cnf = generator(seed).cnf(n, m).unwrap();
        let atom = apply_probability_operator(ProbabilityOperand::Cnf(cnf)).unwrap();
        let text = atom.to_string();

        prop_assert!(atom.is_modal_atom());
        prop_assert!(text.starts_with("P("));
        prop_assert!(text.ends_with(')'));
        prop_assert_eq!(text.matches("P(").count(), 1);
        prop_assert_eq!(text.matches('∧').count(), m - 1);
    }

    /// Classical implications never mention TOP or BOT and stay within X1..Xn
    #[test]
    fn classical_implication_is_never_degenerate(seed in any::<u64>(), n in 1u32..10) {
        let mut g = generator(seed);
        for _ in 0..20 {
            let f = g.classical_implication(n).unwrap();
            let text = f.to_string();
            prop_assert!(!text.contains("TOP"));
            prop_assert!(!text.contains("BOT"));
            prop_assert!(matches!(f, Formula::Var(_) | Formula::Not(_) | Formula::Implies(_, _)));
            for index in variable_indices(&text) {
                prop_assert!((1..=n).contains(&index));
            }
        }
    }

    /// Every L-clause has a template shape over exactly three modal atoms
    #[test]
    fn l_clauses_follow_templates(seed in any::<u64>(), k in 0usize..8, n in 1u32..30, m in 1usize..5) {
        let clauses = generator(seed).l_clauses(k, n, m).unwrap();
        prop_assert_eq!(clauses.len(), k);
        for clause in &clauses {
            prop_assert_eq!(clause.modal_atom_count(), 3);
            let matching = LTemplate::matching(clause);
            prop_assert!(!matching.is_empty());
            prop_assert!(matching.len() <= 2);
        }
    }

    /// The shape class of a modal L-clause contains the template it was built from
    #[test]
    fn l_clauses_modal_match_their_template(seed in any::<u64>(), k in 1usize..8, n in 1u32..50) {
        let clauses = generator(seed).l_clauses_modal(k, n).unwrap();
        prop_assert_eq!(clauses.len(), k);

        // Replays the same draws, keeping the chosen templates
        let mut g = generator(seed);
        for clause in &clauses {
            let atoms = [
                g.implication_atom(n).unwrap(),
                g.implication_atom(n).unwrap(),
                g.implication_atom(n).unwrap(),
            ];
            let (template, replayed) = g.l_clause(atoms);
            prop_assert_eq!(&replayed, clause);
            prop_assert_eq!(clause.modal_atoms().len(), 3);
            prop_assert!(template.matches(clause));
            prop_assert!(LTemplate::matching(clause).contains(&template));
        }
    }

    /// Simple L-clauses fold l1 atoms with l1 - 1 strong disjunctions
    #[test]
    fn simple_l_clauses_shape(
        seed in any::<u64>(),
        m in 1usize..4,
        n in 1u32..20,
        l1 in 1usize..6,
        l2 in 0usize..5,
    ) {
        let clauses = generator(seed).simple_l_clauses(m, n, l1, l2).unwrap();
        prop_assert_eq!(clauses.len(), l2);
        for clause in &clauses {
            prop_assert_eq!(clause.modal_atom_count(), l1);
            prop_assert_eq!(clause.to_string().matches('⊕').count(), l1 - 1);
        }
    }

    /// Top-level rendering joins k modal clauses with k - 1 conjunctions
    #[test]
    fn top_level_conjunctions(seed in any::<u64>(), k in 0usize..10, n in 1u32..10) {
        let clauses = generator(seed).l_clauses_modal(k, n).unwrap();
        let text = render_top_level(clauses);
        if k == 0 {
            prop_assert_eq!(text, "");
        } else {
            prop_assert_eq!(text.matches('∧').count(), k - 1);
            prop_assert_eq!(text.matches("P(").count(), 3 * k);
        }
    }

    /// The same seed reproduces the same formula
    #[test]
    fn generation_is_reproducible(seed in any::<u64>(), k in 1usize..5) {
        let a = generator(seed).l_clauses(k, 8, 2).unwrap();
        let b = generator(seed).l_clauses(k, 8, 2).unwrap();
        prop_assert_eq!(a, b);
    }
}
