//! Expression AST.
//!
//! The parser accepts a small Python-like expression language. Some nodes
//! (`List`, `Subscript`, `Conditional`, keyword arguments, membership and
//! identity comparisons) are parsed only so the evaluator can reject them
//! explicitly; see [`crate::domain::expr_eval`].

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    List(Vec<Expr>),
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}

impl Expr {
    /// Pre-order walk over this node and all of its children, in source order.
    pub fn walk<'e>(&'e self, visit: &mut dyn FnMut(&'e Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Name(_) => {}
            Expr::Attribute { value, .. } => value.walk(visit),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                func.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
                for (_, kw) in keywords {
                    kw.walk(visit);
                }
            }
            Expr::Compare { left, ops } => {
                left.walk(visit);
                for (_, operand) in ops {
                    operand.walk(visit);
                }
            }
            Expr::BoolOp { values, .. } | Expr::List(values) => {
                for v in values {
                    v.walk(visit);
                }
            }
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Unary { operand, .. } => operand.walk(visit),
            Expr::Subscript { value, index } => {
                value.walk(visit);
                index.walk(visit);
            }
            Expr::Conditional { test, body, orelse } => {
                body.walk(visit);
                test.walk(visit);
                orelse.walk(visit);
            }
        }
    }

    /// Callee name when this is a call to a bare name.
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Name(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// First string literal among this call's positional arguments.
    pub fn first_str_arg(&self) -> Option<&str> {
        match self {
            Expr::Call { args, .. } => args.iter().find_map(|a| match a {
                Expr::Literal(Literal::Str(s)) => Some(s.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Calls anywhere in the tree, in source order.
    pub fn calls(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if matches!(e, Expr::Call { .. }) {
                out.push(e);
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            func: Box::new(Expr::Name(name.into())),
            args,
            keywords: vec![],
        }
    }

    fn s(v: &str) -> Expr {
        Expr::Literal(Literal::Str(v.into()))
    }

    #[test]
    fn call_name_only_for_bare_names() {
        assert_eq!(call("exists", vec![]).call_name(), Some("exists"));
        let attr_call = Expr::Call {
            func: Box::new(Expr::Attribute {
                value: Box::new(Expr::Name("current".into())),
                attr: "foo".into(),
            }),
            args: vec![],
            keywords: vec![],
        };
        assert_eq!(attr_call.call_name(), None);
        assert_eq!(Expr::Name("x".into()).call_name(), None);
    }

    #[test]
    fn first_str_arg_skips_non_strings() {
        let c = call(
            "is_spot_candidate",
            vec![Expr::Literal(Literal::Int(1)), s("block1"), s("block2")],
        );
        assert_eq!(c.first_str_arg(), Some("block1"));
    }

    #[test]
    fn calls_are_collected_in_source_order() {
        let e = Expr::BoolOp {
            op: BoolOp::And,
            values: vec![
                call("exists", vec![s("a")]),
                call("max", vec![call("abs", vec![])]),
            ],
        };
        let names: Vec<&str> = e.calls().iter().filter_map(|c| c.call_name()).collect();
        assert_eq!(names, vec!["exists", "max", "abs"]);
    }
}
