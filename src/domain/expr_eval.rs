//! Sandboxed expression evaluation.
//!
//! Only the constructs matched explicitly below are evaluated. Anything else
//! the parser accepts (lists, subscripts, conditional expressions, keyword
//! arguments, `in`/`is`, method calls) fails with
//! [`ExprError::UnsupportedConstruct`].
//!
//! # Evaluation Semantics
//!
//! - `and`/`or` short-circuit and return the deciding operand
//! - Chained comparisons stop at the first false link
//! - Calls are resolved through the [`FunctionRegistry`] and receive the
//!   positional arguments plus the context; failures are wrapped with the
//!   source text of the expression

use crate::domain::context::Context;
use crate::domain::error::ExprError;
use crate::domain::expr::{BoolOp, CmpOp, Expr, Literal, UnaryOp};
use crate::domain::expr_parser;
use crate::domain::registry::FunctionRegistry;
use crate::domain::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct ExpressionEngine {
    registry: FunctionRegistry,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(FunctionRegistry::with_builtins())
    }
}

impl ExpressionEngine {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Parse and evaluate `text` against `ctx`.
    pub fn evaluate<'a>(&self, text: &str, ctx: &Context<'a>) -> Result<Value<'a>, ExprError> {
        let expr = expr_parser::parse(text)?;
        self.evaluate_expr(&expr, ctx, text)
    }

    /// Evaluate an already parsed expression. `source` is only used for
    /// error messages.
    pub fn evaluate_expr<'a>(
        &self,
        expr: &Expr,
        ctx: &Context<'a>,
        source: &str,
    ) -> Result<Value<'a>, ExprError> {
        match expr {
            Expr::Literal(lit) => Ok(literal(lit)),
            Expr::Name(name) => ctx
                .lookup(name)
                .ok_or_else(|| ExprError::UnknownVariable { name: name.clone() }),
            Expr::Attribute { value, attr } => {
                self.evaluate_expr(value, ctx, source)?.attribute(attr)
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => self.call(func, args, keywords, ctx, source),
            Expr::Compare { left, ops } => self.compare_chain(left, ops, ctx, source),
            Expr::BoolOp { op, values } => {
                let mut last = Value::Bool(*op == BoolOp::And);
                for operand in values {
                    last = self.evaluate_expr(operand, ctx, source)?;
                    let decisive = match op {
                        BoolOp::And => !last.truthy(),
                        BoolOp::Or => last.truthy(),
                    };
                    if decisive {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Binary { op, left, right } => {
                let lhs = self.evaluate_expr(left, ctx, source)?;
                let rhs = self.evaluate_expr(right, ctx, source)?;
                lhs.binary(*op, &rhs)
            }
            Expr::Unary { op, operand } => {
                let value = self.evaluate_expr(operand, ctx, source)?;
                unary(*op, value)
            }
            Expr::List(_) => Err(ExprError::unsupported("list literal")),
            Expr::Subscript { .. } => Err(ExprError::unsupported("subscript")),
            Expr::Conditional { .. } => Err(ExprError::unsupported("conditional expression")),
        }
    }

    fn call<'a>(
        &self,
        func: &Expr,
        args: &[Expr],
        keywords: &[(String, Expr)],
        ctx: &Context<'a>,
        source: &str,
    ) -> Result<Value<'a>, ExprError> {
        let Expr::Name(name) = func else {
            return Err(ExprError::unsupported("call on a non-name callee"));
        };
        if !keywords.is_empty() {
            return Err(ExprError::unsupported("keyword arguments"));
        }
        let spec = self.registry.get(name)?;

        let values = args
            .iter()
            .map(|arg| self.evaluate_expr(arg, ctx, source))
            .collect::<Result<Vec<_>, _>>()?;

        (spec.func)(&values, ctx).map_err(|message| ExprError::Runtime {
            function: spec.name.clone(),
            expression: source.to_string(),
            message,
        })
    }

    fn compare_chain<'a>(
        &self,
        left: &Expr,
        ops: &[(CmpOp, Expr)],
        ctx: &Context<'a>,
        source: &str,
    ) -> Result<Value<'a>, ExprError> {
        let mut lhs = self.evaluate_expr(left, ctx, source)?;
        for (op, operand) in ops {
            let rhs = self.evaluate_expr(operand, ctx, source)?;
            let holds = match op {
                CmpOp::Eq => lhs.equals(&rhs),
                CmpOp::Ne => !lhs.equals(&rhs),
                CmpOp::Lt => lhs.compare(&rhs)? == Ordering::Less,
                CmpOp::Le => lhs.compare(&rhs)? != Ordering::Greater,
                CmpOp::Gt => lhs.compare(&rhs)? == Ordering::Greater,
                CmpOp::Ge => lhs.compare(&rhs)? != Ordering::Less,
                CmpOp::In | CmpOp::NotIn | CmpOp::Is | CmpOp::IsNot => {
                    return Err(ExprError::unsupported(format!(
                        "'{}' comparison",
                        op.symbol()
                    )));
                }
            };
            if !holds {
                return Ok(Value::Bool(false));
            }
            lhs = rhs;
        }
        Ok(Value::Bool(true))
    }
}

fn literal<'a>(lit: &Literal) -> Value<'a> {
    match lit {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(v) => Value::Int(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

fn unary(op: UnaryOp, value: Value<'_>) -> Result<Value<'_>, ExprError> {
    match (op, &value) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!value.truthy())),
        (UnaryOp::Plus, Value::Float(_) | Value::Int(_)) => Ok(value),
        (UnaryOp::Plus, Value::Bool(b)) => Ok(Value::Int(i64::from(*b))),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Neg, Value::Int(v)) => v
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| ExprError::type_error("integer overflow")),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(*b))),
        _ => Err(ExprError::type_error(format!(
            "bad operand type for unary {}: {}",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}
