// src/ast_display.rs
//! Pretty-printing for arena AST nodes with symbol resolution.

use std::fmt::Write;

use crate::ast::*;
use crate::Interner;

/// Pretty-printer for AST nodes that resolves symbols via an Interner.
pub struct AstPrinter<'a> {
    ast: &'a Ast,
    interner: &'a Interner,
}

impl<'a> AstPrinter<'a> {
    pub fn new(ast: &'a Ast, interner: &'a Interner) -> Self {
        Self { ast, interner }
    }

    /// Print the subtree rooted at `id`, one node per line.
    pub fn print(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(&mut out, id, 0);
        out
    }

    fn name(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    pub fn type_expr(&self, ty: &TypeExpr) -> String {
        let mut out = String::new();
        if ty.is_static {
            out.push_str("static ");
        }
        if ty.is_const {
            out.push_str("const ");
        }
        match &ty.name {
            TypeName::Void => out.push_str("void"),
            TypeName::Int => out.push_str("int"),
            TypeName::Float => out.push_str("float"),
            TypeName::Double => out.push_str("double"),
            TypeName::Bool => out.push_str("bool"),
            TypeName::Auto => out.push_str("auto"),
            TypeName::Block => out.push_str("block"),
            TypeName::Span => out.push_str("span"),
            TypeName::Dyn => out.push_str("dyn"),
            TypeName::Named(path) => out.push_str(&path.display(self.interner)),
        }
        if !ty.args.is_empty() {
            let args: Vec<String> = ty
                .args
                .iter()
                .map(|arg| match arg {
                    TemplateArgExpr::Type(t) => self.type_expr(t),
                    TemplateArgExpr::Const(node) => self.inline_expr(*node),
                })
                .collect();
            let _ = write!(out, "<{}>", args.join(", "));
        }
        if ty.is_ref {
            out.push('&');
        }
        out
    }

    /// Single-line rendering of an expression.
    pub fn inline_expr(&self, id: NodeId) -> String {
        match self.ast.kind(id) {
            NodeKind::Literal(Literal::Int(v)) => v.to_string(),
            NodeKind::Literal(Literal::Float(v)) => format!("{v:?}f"),
            NodeKind::Literal(Literal::Double(v)) => format!("{v:?}"),
            NodeKind::Literal(Literal::Bool(v)) => v.to_string(),
            NodeKind::Identifier(path) => path.display(self.interner),
            NodeKind::Binary { op, lhs, rhs } => format!(
                "({} {} {})",
                self.inline_expr(*lhs),
                op.as_str(),
                self.inline_expr(*rhs)
            ),
            NodeKind::Unary { op, operand } => {
                format!("{}{}", op.as_str(), self.inline_expr(*operand))
            }
            NodeKind::IncDec {
                increment,
                prefix,
                target,
            } => {
                let op = if *increment { "++" } else { "--" };
                if *prefix {
                    format!("{op}{}", self.inline_expr(*target))
                } else {
                    format!("{}{op}", self.inline_expr(*target))
                }
            }
            NodeKind::Assign { op, target, value } => format!(
                "{} {}= {}",
                self.inline_expr(*target),
                op.map(|o| o.as_str()).unwrap_or(""),
                self.inline_expr(*value)
            ),
            NodeKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => format!(
                "({} ? {} : {})",
                self.inline_expr(*cond),
                self.inline_expr(*then_expr),
                self.inline_expr(*else_expr)
            ),
            NodeKind::Cast { ty, expr } => {
                format!("({}){}", self.type_expr(ty), self.inline_expr(*expr))
            }
            NodeKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| self.inline_expr(*a)).collect();
                match callee {
                    Callee::Path { path, .. } => {
                        format!("{}({})", path.display(self.interner), args.join(", "))
                    }
                    Callee::Method { receiver, name } => format!(
                        "{}.{}({})",
                        self.inline_expr(*receiver),
                        self.name(*name),
                        args.join(", ")
                    ),
                }
            }
            NodeKind::Subscript { base, index } => {
                format!("{}[{}]", self.inline_expr(*base), self.inline_expr(*index))
            }
            NodeKind::Member { base, field } => {
                format!("{}.{}", self.inline_expr(*base), self.name(*field))
            }
            NodeKind::InitList(items) => {
                let items: Vec<String> = items.iter().map(|a| self.inline_expr(*a)).collect();
                format!("{{{}}}", items.join(", "))
            }
            _ => String::from("<stmt>"),
        }
    }

    fn write_node(&self, out: &mut String, id: NodeId, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        let kind = self.ast.kind(id);
        if kind.is_expression() {
            let _ = writeln!(out, "{}", self.inline_expr(id));
            return;
        }
        match kind {
            NodeKind::Program(items) => {
                out.push_str("Program\n");
                self.write_all(out, items, depth + 1);
            }
            NodeKind::Block(items) => {
                out.push_str("Block\n");
                self.write_all(out, items, depth + 1);
            }
            NodeKind::Namespace { name, items } => {
                let _ = writeln!(out, "Namespace {}", self.name(*name));
                self.write_all(out, items, depth + 1);
            }
            NodeKind::VarDecl(decl) => {
                let _ = write!(out, "VarDecl {} {}", self.type_expr(&decl.ty), self.name(decl.name));
                if let Some(init) = decl.init {
                    let _ = write!(out, " = {}", self.inline_expr(init));
                }
                out.push('\n');
            }
            NodeKind::FunctionDef(def) => {
                let params: Vec<String> = def
                    .params
                    .iter()
                    .map(|p| format!("{} {}", self.type_expr(&p.ty), self.name(p.name)))
                    .collect();
                let prefix = if def.is_destructor { "~" } else { "" };
                let _ = writeln!(
                    out,
                    "Function {} {prefix}{}({})",
                    self.type_expr(&def.ret),
                    self.name(def.name),
                    params.join(", ")
                );
                self.write_node(out, def.body, depth + 1);
            }
            NodeKind::StructDef(def) => {
                let _ = writeln!(out, "Struct {}", self.name(def.name));
                self.write_all(out, &def.members, depth + 1);
            }
            NodeKind::Using { name, ty } => {
                let _ = writeln!(out, "Using {} = {}", self.name(*name), self.type_expr(ty));
            }
            NodeKind::TemplateInstance { label, item, .. } => {
                let _ = writeln!(out, "TemplateInstance {label}");
                self.write_node(out, *item, depth + 1);
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let _ = writeln!(out, "If {}", self.inline_expr(*cond));
                self.write_node(out, *then_branch, depth + 1);
                if let Some(else_branch) = else_branch {
                    self.write_node(out, *else_branch, depth + 1);
                }
            }
            NodeKind::While { cond, body } => {
                let _ = writeln!(out, "While {}", self.inline_expr(*cond));
                self.write_node(out, *body, depth + 1);
            }
            NodeKind::DoWhile { body, cond } => {
                let _ = writeln!(out, "DoWhile {}", self.inline_expr(*cond));
                self.write_node(out, *body, depth + 1);
            }
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => {
                out.push_str("For\n");
                for part in [init, cond, step].into_iter().flatten() {
                    self.write_node(out, *part, depth + 1);
                }
                self.write_node(out, *body, depth + 1);
            }
            NodeKind::ForEach(each) => {
                let _ = writeln!(
                    out,
                    "ForEach {} {} : {}",
                    self.type_expr(&each.var_ty),
                    self.name(each.var),
                    self.inline_expr(each.iterable)
                );
                self.write_node(out, each.body, depth + 1);
            }
            NodeKind::Switch { scrutinee, cases } => {
                let _ = writeln!(out, "Switch {}", self.inline_expr(*scrutinee));
                for case in cases {
                    for _ in 0..=depth {
                        out.push_str("  ");
                    }
                    match case.value {
                        Some(v) => {
                            let _ = writeln!(out, "Case {}", self.inline_expr(v));
                        }
                        None => out.push_str("Default\n"),
                    }
                    self.write_all(out, &case.body, depth + 2);
                }
            }
            NodeKind::Return(value) => match value {
                Some(v) => {
                    let _ = writeln!(out, "Return {}", self.inline_expr(*v));
                }
                None => out.push_str("Return\n"),
            },
            NodeKind::Break => out.push_str("Break\n"),
            NodeKind::Continue => out.push_str("Continue\n"),
            NodeKind::Empty => out.push_str("Empty\n"),
            NodeKind::ExprStmt(expr) => {
                let _ = writeln!(out, "Expr {}", self.inline_expr(*expr));
            }
            _ => out.push_str("?\n"),
        }
    }

    fn write_all(&self, out: &mut String, items: &[NodeId], depth: usize) {
        for &item in items {
            self.write_node(out, item, depth);
        }
    }
}
