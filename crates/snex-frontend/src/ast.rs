// src/ast.rs
//
// Arena-allocated syntax tree. Nodes are addressed by `NodeId`; parent links
// live in a side array so passes can walk upward without owning cycles.

use smallvec::SmallVec;

pub use snex_identity::{NamespacedIdentifier, Span, Symbol};

/// Index of a node in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Operators only defined on integers.
    pub fn is_integer_only(self) -> bool {
        matches!(
            self,
            Self::Mod | Self::BitAnd | Self::BitOr | Self::BitXor | Self::Shl | Self::Shr
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Mul
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
                | Self::Eq
                | Self::Ne
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

/// Syntactic type name before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeName {
    Void,
    Int,
    Float,
    Double,
    Bool,
    Auto,
    /// `block`, shorthand for `dyn<float>`.
    Block,
    Span,
    Dyn,
    Named(NamespacedIdentifier),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateArgExpr {
    Type(TypeExpr),
    /// Integer argument; evaluated by the constant evaluator, never lowered.
    Const(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub name: TypeName,
    pub args: Vec<TemplateArgExpr>,
    pub is_const: bool,
    pub is_ref: bool,
    pub is_static: bool,
    pub span: Span,
}

impl TypeExpr {
    pub fn simple(name: TypeName, span: Span) -> Self {
        Self {
            name,
            args: Vec::new(),
            is_const: false,
            is_ref: false,
            is_static: false,
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub ty: TypeExpr,
    pub name: Symbol,
    pub init: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeExpr,
    pub name: Symbol,
    pub default: Option<NodeId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateParam {
    Type {
        name: Symbol,
        default: Option<TypeExpr>,
    },
    Int {
        name: Symbol,
        default: Option<NodeId>,
    },
}

impl TemplateParam {
    pub fn name(&self) -> Symbol {
        match self {
            TemplateParam::Type { name, .. } | TemplateParam::Int { name, .. } => *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub ret: TypeExpr,
    pub name: Symbol,
    pub params: Vec<Param>,
    pub body: NodeId,
    pub template_params: Vec<TemplateParam>,
    pub is_destructor: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: Symbol,
    /// `VarDecl` and `FunctionDef` nodes in declaration order.
    pub members: Vec<NodeId>,
    pub template_params: Vec<TemplateParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub value: Option<NodeId>,
    pub body: Vec<NodeId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    pub var_ty: TypeExpr,
    pub var: Symbol,
    pub iterable: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// `f(x)`, `Ns::f(x)`, `f<int>(x)`.
    Path {
        path: NamespacedIdentifier,
        template_args: Vec<TemplateArgExpr>,
    },
    /// `obj.f(x)`, `Math.sin(x)`.
    Method { receiver: NodeId, name: Symbol },
}

/// Closed set of node kinds for statements and expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program(Vec<NodeId>),

    // Statements
    Block(Vec<NodeId>),
    VarDecl(Box<VarDecl>),
    If {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        cond: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        cond: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        step: Option<NodeId>,
        body: NodeId,
    },
    ForEach(Box<ForEach>),
    Switch {
        scrutinee: NodeId,
        cases: Vec<SwitchCase>,
    },
    Return(Option<NodeId>),
    Break,
    Continue,
    ExprStmt(NodeId),
    Empty,
    StructDef(Box<StructDef>),
    FunctionDef(Box<FunctionDef>),
    Namespace {
        name: Symbol,
        items: Vec<NodeId>,
    },
    Using {
        name: Symbol,
        ty: TypeExpr,
    },
    /// Marks a concrete copy of a template made during resolution.
    TemplateInstance {
        template: NodeId,
        label: String,
        item: NodeId,
    },

    // Expressions
    Literal(Literal),
    Identifier(NamespacedIdentifier),
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    IncDec {
        increment: bool,
        prefix: bool,
        target: NodeId,
    },
    Assign {
        op: Option<BinaryOp>,
        target: NodeId,
        value: NodeId,
    },
    Ternary {
        cond: NodeId,
        then_expr: NodeId,
        else_expr: NodeId,
    },
    Cast {
        ty: TypeExpr,
        expr: NodeId,
    },
    Call {
        callee: Callee,
        args: Vec<NodeId>,
    },
    Subscript {
        base: NodeId,
        index: NodeId,
    },
    Member {
        base: NodeId,
        field: Symbol,
    },
    InitList(Vec<NodeId>),
}

impl NodeKind {
    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::Literal(_)
                | NodeKind::Identifier(_)
                | NodeKind::Binary { .. }
                | NodeKind::Unary { .. }
                | NodeKind::IncDec { .. }
                | NodeKind::Assign { .. }
                | NodeKind::Ternary { .. }
                | NodeKind::Cast { .. }
                | NodeKind::Call { .. }
                | NodeKind::Subscript { .. }
                | NodeKind::Member { .. }
                | NodeKind::InitList(_)
        )
    }

    /// Child nodes in evaluation order.
    pub fn children(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Program(items)
            | NodeKind::Block(items)
            | NodeKind::InitList(items)
            | NodeKind::Namespace { items, .. } => out.extend(items.iter().copied()),
            NodeKind::VarDecl(decl) => out.extend(decl.init),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push(*cond);
                out.push(*then_branch);
                out.extend(*else_branch);
            }
            NodeKind::While { cond, body } => {
                out.push(*cond);
                out.push(*body);
            }
            NodeKind::DoWhile { body, cond } => {
                out.push(*body);
                out.push(*cond);
            }
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                out.extend(*init);
                out.extend(*cond);
                out.extend(*step);
                out.push(*body);
            }
            NodeKind::ForEach(each) => {
                out.push(each.iterable);
                out.push(each.body);
            }
            NodeKind::Switch { scrutinee, cases } => {
                out.push(*scrutinee);
                for case in cases {
                    out.extend(case.value);
                    out.extend(case.body.iter().copied());
                }
            }
            NodeKind::Return(value) => out.extend(*value),
            NodeKind::ExprStmt(expr) => out.push(*expr),
            NodeKind::StructDef(def) => out.extend(def.members.iter().copied()),
            NodeKind::FunctionDef(def) => {
                out.extend(def.params.iter().filter_map(|p| p.default));
                out.push(def.body);
            }
            NodeKind::TemplateInstance { item, .. } => out.push(*item),
            NodeKind::Binary { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            NodeKind::Unary { operand, .. } => out.push(*operand),
            NodeKind::IncDec { target, .. } => out.push(*target),
            NodeKind::Assign { target, value, .. } => {
                out.push(*target);
                out.push(*value);
            }
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                out.push(*cond);
                out.push(*then_expr);
                out.push(*else_expr);
            }
            NodeKind::Cast { expr, .. } => out.push(*expr),
            NodeKind::Call { callee, args } => {
                if let Callee::Method { receiver, .. } = callee {
                    out.push(*receiver);
                }
                out.extend(args.iter().copied());
            }
            NodeKind::Subscript { base, index } => {
                out.push(*base);
                out.push(*index);
            }
            NodeKind::Member { base, .. } => out.push(*base),
            NodeKind::Literal(_)
            | NodeKind::Identifier(_)
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Empty
            | NodeKind::Using { .. } => {}
        }
        out
    }

    /// Mutable references to every child slot, in the same order as `children`.
    pub fn child_slots_mut(&mut self) -> SmallVec<[&mut NodeId; 4]> {
        let mut out: SmallVec<[&mut NodeId; 4]> = SmallVec::new();
        match self {
            NodeKind::Program(items)
            | NodeKind::Block(items)
            | NodeKind::InitList(items)
            | NodeKind::Namespace { items, .. } => out.extend(items.iter_mut()),
            NodeKind::VarDecl(decl) => out.extend(decl.init.as_mut()),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push(cond);
                out.push(then_branch);
                out.extend(else_branch.as_mut());
            }
            NodeKind::While { cond, body } => {
                out.push(cond);
                out.push(body);
            }
            NodeKind::DoWhile { body, cond } => {
                out.push(body);
                out.push(cond);
            }
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                out.extend(init.as_mut());
                out.extend(cond.as_mut());
                out.extend(step.as_mut());
                out.push(body);
            }
            NodeKind::ForEach(each) => {
                let each = &mut **each;
                out.push(&mut each.iterable);
                out.push(&mut each.body);
            }
            NodeKind::Switch { scrutinee, cases } => {
                out.push(scrutinee);
                for case in cases.iter_mut() {
                    out.extend(case.value.as_mut());
                    out.extend(case.body.iter_mut());
                }
            }
            NodeKind::Return(value) => out.extend(value.as_mut()),
            NodeKind::ExprStmt(expr) => out.push(expr),
            NodeKind::StructDef(def) => out.extend(def.members.iter_mut()),
            NodeKind::FunctionDef(def) => {
                let def = &mut **def;
                out.extend(def.params.iter_mut().filter_map(|p| p.default.as_mut()));
                out.push(&mut def.body);
            }
            NodeKind::TemplateInstance { item, .. } => out.push(item),
            NodeKind::Binary { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            NodeKind::Unary { operand, .. } => out.push(operand),
            NodeKind::IncDec { target, .. } => out.push(target),
            NodeKind::Assign { target, value, .. } => {
                out.push(target);
                out.push(value);
            }
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                out.push(cond);
                out.push(then_expr);
                out.push(else_expr);
            }
            NodeKind::Cast { expr, .. } => out.push(expr),
            NodeKind::Call { callee, args } => {
                if let Callee::Method { receiver, .. } = callee {
                    out.push(receiver);
                }
                out.extend(args.iter_mut());
            }
            NodeKind::Subscript { base, index } => {
                out.push(base);
                out.push(index);
            }
            NodeKind::Member { base, .. } => out.push(base),
            NodeKind::Literal(_)
            | NodeKind::Identifier(_)
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Empty
            | NodeKind::Using { .. } => {}
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// Node arena with a parallel parent-index array.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and adopt its children.
    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        for child in kind.children() {
            self.parents[child.index()] = Some(id);
        }
        self.nodes.push(Node { kind, span });
        self.parents.push(None);
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Root `Program` node. Panics if no program was parsed into this arena.
    pub fn root(&self) -> NodeId {
        self.root.expect("ast has no root program")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    pub fn children(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        self.kind(id).children()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.index()]
    }

    /// Walk from `id`'s parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    /// Nearest ancestor that satisfies `pred`.
    pub fn enclosing(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        self.ancestors(id).find(|&n| pred(self.kind(n)))
    }

    /// Swap `old` for `new` in `old`'s parent. The old subtree stays in the
    /// arena but is detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.parents[old.index()] else {
            return;
        };
        for slot in self.nodes[parent.index()].kind.child_slots_mut() {
            if *slot == old {
                *slot = new;
            }
        }
        self.parents[new.index()] = Some(parent);
        self.parents[old.index()] = None;
    }

    /// Insert a new node between `id` and its parent. `make` receives `id`
    /// and builds the wrapper, e.g. an implicit cast.
    pub fn wrap(&mut self, id: NodeId, make: impl FnOnce(NodeId) -> NodeKind) -> NodeId {
        let parent = self.parents[id.index()];
        let span = self.span(id);
        let wrapper = self.push(make(id), span);
        if let Some(parent) = parent {
            for slot in self.nodes[parent.index()].kind.child_slots_mut() {
                if *slot == id {
                    *slot = wrapper;
                }
            }
            self.parents[wrapper.index()] = Some(parent);
        }
        wrapper
    }

    /// Overwrite a node's kind in place, adopting the new children.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        for child in kind.children() {
            self.parents[child.index()] = Some(id);
        }
        self.nodes[id.index()].kind = kind;
    }

    /// Append a child to a list-shaped node (`Program`, `Block`, `Namespace`).
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        match &mut self.nodes[parent.index()].kind {
            NodeKind::Program(items) | NodeKind::Block(items) | NodeKind::Namespace { items, .. } => {
                items.push(child);
                self.parents[child.index()] = Some(parent);
            }
            _ => {}
        }
    }

    /// Deep copy of a subtree. Returns the new root, detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        self.clone_subtree_mapped(id, &mut |_, _| {})
    }

    /// Deep copy that reports every `(original, copy)` pair to `on_copy`, so
    /// side tables keyed by node can be carried over.
    pub fn clone_subtree_mapped(
        &mut self,
        id: NodeId,
        on_copy: &mut dyn FnMut(NodeId, NodeId),
    ) -> NodeId {
        let Node { kind, span } = self.nodes[id.index()].clone();
        let mut kind = kind;
        for slot in kind.child_slots_mut() {
            *slot = self.clone_subtree_mapped(*slot, on_copy);
        }
        let copy = self.push(kind, span);
        on_copy(id, copy);
        copy
    }

    /// Drop nodes pushed after a saved length; used to undo speculative parses.
    pub(crate) fn truncate(&mut self, len: usize) {
        for dropped in self.nodes.get(len..).unwrap_or_default() {
            for child in dropped.kind.children() {
                if child.index() < len {
                    self.parents[child.index()] = None;
                }
            }
        }
        self.nodes.truncate(len);
        self.parents.truncate(len);
    }

    /// Number of nodes reachable from `id` (inclusive).
    pub fn subtree_size(&self, id: NodeId) -> usize {
        1 + self
            .children(id)
            .into_iter()
            .map(|c| self.subtree_size(c))
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(ast: &mut Ast, v: i32) -> NodeId {
        ast.push(NodeKind::Literal(Literal::Int(v)), Span::default())
    }

    #[test]
    fn push_links_parents() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 1);
        let b = lit(&mut ast, 2);
        let sum = ast.push(
            NodeKind::Binary {
                op: BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            Span::default(),
        );
        assert_eq!(ast.parent(a), Some(sum));
        assert_eq!(ast.parent(b), Some(sum));
        assert_eq!(ast.parent(sum), None);
        assert_eq!(ast.children(sum).as_slice(), &[a, b]);
    }

    #[test]
    fn replace_swaps_child_slot() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 1);
        let b = lit(&mut ast, 2);
        let sum = ast.push(
            NodeKind::Binary {
                op: BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            Span::default(),
        );
        let c = lit(&mut ast, 3);
        ast.replace(b, c);
        assert_eq!(ast.children(sum).as_slice(), &[a, c]);
        assert_eq!(ast.parent(c), Some(sum));
        assert_eq!(ast.parent(b), None);
    }

    #[test]
    fn wrap_inserts_between_parent_and_child() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 1);
        let stmt = ast.push(NodeKind::Return(Some(a)), Span::default());
        let cast = ast.wrap(a, |inner| NodeKind::Cast {
            ty: TypeExpr::simple(TypeName::Float, Span::default()),
            expr: inner,
        });
        assert_eq!(ast.children(stmt).as_slice(), &[cast]);
        assert_eq!(ast.parent(cast), Some(stmt));
        assert_eq!(ast.parent(a), Some(cast));
    }

    #[test]
    fn clone_is_deep_and_detached() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 1);
        let neg = ast.push(
            NodeKind::Unary {
                op: UnaryOp::Neg,
                operand: a,
            },
            Span::default(),
        );
        let stmt = ast.push(NodeKind::ExprStmt(neg), Span::default());
        let block = ast.push(NodeKind::Block(vec![stmt]), Span::default());

        let mut pairs = Vec::new();
        let copy = ast.clone_subtree_mapped(block, &mut |old, new| pairs.push((old, new)));
        assert_ne!(copy, block);
        assert_eq!(pairs.len(), 4);
        assert_eq!(ast.parent(copy), None);
        assert_eq!(ast.subtree_size(copy), 4);

        let copied_stmt = ast.children(copy)[0];
        assert_ne!(copied_stmt, stmt);
        assert_eq!(ast.parent(copied_stmt), Some(copy));
        // The original keeps its links
        assert_eq!(ast.parent(stmt), Some(block));
    }

    #[test]
    fn ancestors_walk_to_root() {
        let mut ast = Ast::new();
        let a = lit(&mut ast, 7);
        let stmt = ast.push(NodeKind::Return(Some(a)), Span::default());
        let block = ast.push(NodeKind::Block(vec![stmt]), Span::default());
        let program = ast.push(NodeKind::Program(vec![block]), Span::default());
        ast.set_root(program);

        let chain: Vec<_> = ast.ancestors(a).collect();
        assert_eq!(chain, vec![stmt, block, program]);
        assert_eq!(
            ast.enclosing(a, |k| matches!(k, NodeKind::Block(_))),
            Some(block)
        );
    }
}
