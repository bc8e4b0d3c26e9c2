use core::fmt;

/// Counts of the rewrites applied by one optimization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Literal-only operations replaced by their result.
    pub constants_folded: usize,
    /// Variable references replaced by a known literal.
    pub constants_propagated: usize,
    /// Variable references replaced by the root of their copy chain.
    pub copies_propagated: usize,
    /// Algebraic and self-operand identities applied.
    pub identities_simplified: usize,
    pub subexpressions_eliminated: usize,
    pub invariants_hoisted: usize,
    pub strength_reductions: usize,
    /// Unreachable statements dropped after a `return`.
    pub dead_statements_removed: usize,
    /// Branches dropped because their condition folded to a constant.
    pub dead_branches_removed: usize,
    /// Self-assignments and overwritten stores removed.
    pub redundant_stores_removed: usize,
}

impl OptimizationStats {
    pub fn total(&self) -> usize {
        self.constants_folded
            + self.constants_propagated
            + self.copies_propagated
            + self.identities_simplified
            + self.subexpressions_eliminated
            + self.invariants_hoisted
            + self.strength_reductions
            + self.dead_statements_removed
            + self.dead_branches_removed
            + self.redundant_stores_removed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for OptimizationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "folded={} propagated={} copies={} identities={} cse={} hoisted={} \
             strength={} dead_stmts={} dead_branches={} stores={}",
            self.constants_folded,
            self.constants_propagated,
            self.copies_propagated,
            self.identities_simplified,
            self.subexpressions_eliminated,
            self.invariants_hoisted,
            self.strength_reductions,
            self.dead_statements_removed,
            self.dead_branches_removed,
            self.redundant_stores_removed,
        )
    }
}
