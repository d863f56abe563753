//! Named, pre-parsed conditions.

use crate::domain::builtins::EXISTENCE_FUNCTIONS;
use crate::domain::context::Context;
use crate::domain::error::{ExprError, ParseError};
use crate::domain::expr::Expr;
use crate::domain::expr_eval::ExpressionEngine;
use crate::domain::expr_parser;
use log::warn;

/// How a satisfied exit condition assigns the end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationKind {
    /// Depends on a sibling block being present.
    ExistsBased,
    /// Depends on a price or indicator value.
    ValueBased,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub name: String,
    pub expression: String,
    pub description: String,
    ast: Expr,
    termination: TerminationKind,
    referenced_blocks: Vec<String>,
}

impl Condition {
    /// Parse `expression` once and classify it.
    pub fn new(name: &str, expression: &str) -> Result<Self, ParseError> {
        let ast = expr_parser::parse(expression)?;

        let mut referenced_blocks: Vec<String> = Vec::new();
        let mut exists_based = false;
        for call in ast.calls() {
            let Some(callee) = call.call_name() else {
                continue;
            };
            if EXISTENCE_FUNCTIONS
                .iter()
                .any(|f| f.eq_ignore_ascii_case(callee))
            {
                exists_based = true;
                if let Some(id) = call.first_str_arg()
                    && !referenced_blocks.iter().any(|b| b == id)
                {
                    referenced_blocks.push(id.to_string());
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            expression: expression.to_string(),
            description: String::new(),
            ast,
            termination: if exists_based {
                TerminationKind::ExistsBased
            } else {
                TerminationKind::ValueBased
            },
            referenced_blocks,
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    pub fn termination(&self) -> TerminationKind {
        self.termination
    }

    /// Block ids named by existence calls, in source order.
    pub fn referenced_blocks(&self) -> &[String] {
        &self.referenced_blocks
    }

    pub fn evaluate(
        &self,
        engine: &ExpressionEngine,
        ctx: &Context<'_>,
    ) -> Result<bool, ExprError> {
        engine
            .evaluate_expr(&self.ast, ctx, &self.expression)
            .map(|v| v.truthy())
    }

    /// Evaluate, downgrading any error to "not satisfied".
    pub fn holds(&self, engine: &ExpressionEngine, ctx: &Context<'_>, block_id: &str) -> bool {
        match self.evaluate(engine, ctx) {
            Ok(satisfied) => satisfied,
            Err(err) => {
                let day = ctx.current();
                warn!(
                    "{} {} [{}] condition '{}' failed: {}",
                    day.ticker, day.date, block_id, self.name, err
                );
                false
            }
        }
    }
}
