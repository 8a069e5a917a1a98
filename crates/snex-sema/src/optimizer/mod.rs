// src/optimizer/mod.rs
//! AST rewriting over resolved function bodies.
//!
//! Nodes are visited children first. Each node is offered to the rules
//! enabled by the [`OptimizationLevel`](crate::OptimizationLevel); a rule
//! either leaves the node alone or hands back its replacement, which is
//! spliced into the tree and offered to the rules again. A node that no
//! rule changes is marked [`Pass::Optimize`] and never revisited, so a
//! second sweep over an optimized unit does nothing.
//!
//! Rules by level:
//!
//! | level             | rules                                              |
//! |-------------------|----------------------------------------------------|
//! | `None`            | high-level inliners                                |
//! | `ConstantFolding` | + constant folding and propagation                 |
//! | `Full`            | + binary simplification, dead code, loop unrolling |

mod branches;
mod fold;
mod inline;
mod simplify;
mod unroll;

#[cfg(test)]
mod tests;

use snex_frontend::{NodeId, NodeKind};
use snex_identity::Span;

use crate::compilation::{Compilation, OptimizationLevel, Pass};
use crate::errors::SemaError;
use crate::sema_err;
use crate::types::{ConstValue, TypeInfo};

/// Rewrites of a single node before the optimizer gives up on it.
pub const MAX_REWRITES_PER_NODE: usize = 32;
/// Default cap on rewrites across the whole unit.
pub const MAX_REWRITES: usize = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizerStats {
    pub rewrites: usize,
    pub inlined: usize,
    pub folded: usize,
    pub simplified: usize,
    pub branches_removed: usize,
    pub loops_unrolled: usize,
}

/// Result of offering a node to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Unchanged,
    /// The node was rewritten. The id may be the node itself when it was
    /// changed in place.
    Replaced(NodeId),
}

type Rule = fn(&mut Compilation, NodeId) -> Result<Outcome, SemaError>;

const INLINE_RULES: &[Rule] = &[Compilation::inline_call];
const FOLDING_RULES: &[Rule] = &[Compilation::inline_call, Compilation::fold_constant];
const FULL_RULES: &[Rule] = &[
    Compilation::inline_call,
    Compilation::fold_constant,
    Compilation::simplify_binary,
    Compilation::remove_dead_code,
    Compilation::unroll_loop,
];

fn rules(level: OptimizationLevel) -> &'static [Rule] {
    match level {
        OptimizationLevel::None => INLINE_RULES,
        OptimizationLevel::ConstantFolding => FOLDING_RULES,
        OptimizationLevel::Full => FULL_RULES,
    }
}

impl Compilation {
    pub(crate) fn optimize(&mut self) -> Result<(), SemaError> {
        for (_, def) in self.user_functions() {
            let NodeKind::FunctionDef(f) = self.ast.kind(def) else {
                continue;
            };
            let body = f.body;
            self.optimize_node(body)?;
            self.nodes.mark(def, Pass::Optimize);
        }
        tracing::debug!(stats = ?self.stats, "optimizer finished");
        Ok(())
    }

    /// Run the optimizer again over every function body, ignoring the
    /// markers left by earlier runs. Returns the number of rewrites made.
    pub fn optimize_sweep(&mut self) -> Result<usize, SemaError> {
        let before = self.stats.rewrites;
        for (_, def) in self.user_functions() {
            let NodeKind::FunctionDef(f) = self.ast.kind(def) else {
                continue;
            };
            let body = f.body;
            self.reset_optimized(body);
            self.optimize_node(body)?;
        }
        Ok(self.stats.rewrites - before)
    }

    fn reset_optimized(&mut self, node: NodeId) {
        self.nodes.reset_to(node, Pass::Optimize);
        for child in self.ast.children(node) {
            self.reset_optimized(child);
        }
    }

    /// Optimize the subtree at `node`; returns the node now in its place.
    fn optimize_node(&mut self, node: NodeId) -> Result<NodeId, SemaError> {
        if self.nodes.pass(node) >= Some(Pass::Optimize) {
            return Ok(node);
        }
        let span = self.ast.span(node);
        self.options.abort.check(span)?;
        for child in self.ast.children(node) {
            self.optimize_node(child)?;
        }

        let mut current = node;
        let mut rewrites = 0;
        'fixpoint: loop {
            for rule in rules(self.options.optimization) {
                if let Outcome::Replaced(new) = rule(self, current)? {
                    if new != current {
                        self.ast.replace(current, new);
                    }
                    rewrites += 1;
                    self.stats.rewrites += 1;
                    if rewrites > MAX_REWRITES_PER_NODE || self.stats.rewrites > self.options.max_rewrites {
                        return Err(sema_err!(
                            RewriteLimit {
                                rewrites: self.stats.rewrites,
                            },
                            span
                        ));
                    }
                    // Replacements are built from fresh or copied nodes.
                    for child in self.ast.children(new) {
                        self.optimize_node(child)?;
                    }
                    current = new;
                    continue 'fixpoint;
                }
            }
            self.nodes.mark(current, Pass::Optimize);
            return Ok(current);
        }
    }

    // -----------------------------------------------------------------------
    // Node construction shared by the rules

    /// Push a resolved node of type `ty`.
    pub(crate) fn make_node(&mut self, kind: NodeKind, span: Span, ty: TypeInfo) -> NodeId {
        let node = self.ast.push(kind, span);
        self.set_type(node, ty);
        node
    }

    pub(crate) fn make_literal(&mut self, value: ConstValue, span: Span) -> NodeId {
        let node = self.make_node(
            NodeKind::Literal(crate::const_eval::value_literal(value)),
            span,
            TypeInfo::new(value.ty()),
        );
        self.nodes.get_mut(node).constant = Some(value);
        node
    }

    pub(crate) fn make_empty(&mut self, span: Span) -> NodeId {
        self.make_node(NodeKind::Empty, span, TypeInfo::new(crate::types::TypeId::VOID))
    }

    /// Deep copy of a resolved subtree, resolution results included.
    pub(crate) fn copy_resolved(&mut self, node: NodeId) -> NodeId {
        let mut pairs = Vec::new();
        let copy = self
            .ast
            .clone_subtree_mapped(node, &mut |old, new| pairs.push((old, new)));
        for (old, new) in pairs {
            let mut info = self.nodes.get(old).cloned().unwrap_or_default();
            info.pass = info.pass.map(|_| Pass::Resolve);
            *self.nodes.get_mut(new) = info;
        }
        copy
    }

    /// True when evaluating `node` has no side effects, so it may be
    /// duplicated or dropped.
    pub(crate) fn is_pure(&self, node: NodeId) -> bool {
        match self.ast.kind(node) {
            NodeKind::Assign { .. } | NodeKind::IncDec { .. } => false,
            NodeKind::Call { .. } => {
                let inlined = self
                    .nodes
                    .get(node)
                    .and_then(|i| i.call)
                    .is_some_and(|f| self.functions.get(f).inliner().is_some());
                inlined && self.ast.children(node).iter().all(|c| self.is_pure(*c))
            }
            _ => self.ast.children(node).iter().all(|c| self.is_pure(*c)),
        }
    }
}
