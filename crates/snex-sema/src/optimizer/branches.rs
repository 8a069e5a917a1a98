// src/optimizer/branches.rs
//
// Dead code: branches on constant conditions, loops that never run and
// statements after an unconditional jump.

use snex_frontend::{NodeId, NodeKind};

use super::Outcome;
use crate::compilation::Compilation;
use crate::errors::SemaError;
use crate::types::{TypeId, TypeInfo};

impl Compilation {
    pub(crate) fn remove_dead_code(&mut self, node: NodeId) -> Result<Outcome, SemaError> {
        let span = self.ast.span(node);
        let replacement = match self.ast.kind(node).clone() {
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let Some(value) = self.literal_of(cond) else {
                    return Ok(Outcome::Unchanged);
                };
                match (value.is_truthy(), else_branch) {
                    (true, _) => self.scoped(then_branch),
                    (false, Some(else_branch)) => self.scoped(else_branch),
                    (false, None) => self.make_empty(span),
                }
            }
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => match self.literal_of(cond) {
                Some(value) if value.is_truthy() => then_expr,
                Some(_) => else_expr,
                None => return Ok(Outcome::Unchanged),
            },
            NodeKind::While { cond, .. } if self.literal_of(cond).is_some_and(|v| !v.is_truthy()) => {
                self.make_empty(span)
            }
            NodeKind::For { init, cond: Some(cond), .. }
                if self.literal_of(cond).is_some_and(|v| !v.is_truthy()) =>
            {
                match init {
                    Some(init) => self.make_node(NodeKind::Block(vec![init]), span, TypeInfo::new(TypeId::VOID)),
                    None => self.make_empty(span),
                }
            }
            NodeKind::Block(items) => {
                let Some(last) = items.iter().position(|s| {
                    matches!(
                        self.ast.kind(*s),
                        NodeKind::Return(_) | NodeKind::Break | NodeKind::Continue
                    )
                }) else {
                    return Ok(Outcome::Unchanged);
                };
                if last + 1 == items.len() {
                    return Ok(Outcome::Unchanged);
                }
                self.ast.set_kind(node, NodeKind::Block(items[..=last].to_vec()));
                node
            }
            _ => return Ok(Outcome::Unchanged),
        };
        self.stats.branches_removed += 1;
        Ok(Outcome::Replaced(replacement))
    }

    /// A surviving branch keeps its own scope when it is a bare declaration.
    fn scoped(&mut self, branch: NodeId) -> NodeId {
        if matches!(self.ast.kind(branch), NodeKind::VarDecl(_)) {
            let span = self.ast.span(branch);
            return self.make_node(NodeKind::Block(vec![branch]), span, TypeInfo::new(TypeId::VOID));
        }
        branch
    }
}
