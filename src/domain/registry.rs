//! Function registry for expression calls.
//!
//! Functions are registered explicitly at startup with their metadata.
//! Lookup is case-insensitive so `EXISTS('b')` and `exists('b')` resolve
//! to the same entry.

use crate::domain::context::Context;
use crate::domain::error::{ExprError, ParseError, RegistryError};
use crate::domain::expr_parser;
use crate::domain::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Signature shared by every registered function: positional arguments plus
/// the evaluation context.
pub type FunctionImpl = for<'a> fn(&[Value<'a>], &Context<'a>) -> Result<Value<'a>, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunctionCategory {
    Existence,
    Block,
    Spot,
    Math,
    Price,
    Series,
}

impl fmt::Display for FunctionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCategory::Existence => "existence",
            FunctionCategory::Block => "block",
            FunctionCategory::Spot => "spot",
            FunctionCategory::Math => "math",
            FunctionCategory::Price => "price",
            FunctionCategory::Series => "series",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    Integer,
    Text,
}

impl ParamKind {
    fn accepts(self, value: &Value<'_>) -> bool {
        match self {
            ParamKind::Number => value.as_f64().is_some(),
            ParamKind::Integer => matches!(value, Value::Int(_) | Value::Bool(_)),
            ParamKind::Text => value.as_str().is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub func: FunctionImpl,
    pub category: FunctionCategory,
    pub description: String,
    pub params: Vec<ParamSpec>,
    /// Accepts any number of trailing arguments of the last param's kind.
    pub variadic: bool,
    pub enabled: bool,
    pub version: &'static str,
}

impl FunctionSpec {
    pub fn new(
        name: &str,
        func: FunctionImpl,
        category: FunctionCategory,
        description: &str,
        params: Vec<ParamSpec>,
    ) -> Self {
        Self {
            name: name.to_lowercase(),
            func,
            category,
            description: description.to_string(),
            params,
            variadic: false,
            enabled: true,
            version: "1.0",
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("[{}]", p.name)
                }
            })
            .collect();
        let tail = if self.variadic { ", ..." } else { "" };
        format!("{}({}{})", self.name, params.join(", "), tail)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        if let Err(e) = crate::domain::builtins::register_all(&mut registry) {
            log::error!("built-in registration failed: {}", e);
        }
        registry
    }

    pub fn register(&mut self, spec: FunctionSpec) -> Result<(), RegistryError> {
        if self.functions.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        self.functions.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let spec = self
            .functions
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        spec.enabled = enabled;
        Ok(())
    }

    /// Resolve an enabled function by name.
    pub fn get(&self, name: &str) -> Result<&FunctionSpec, ExprError> {
        match self.functions.get(&name.to_lowercase()) {
            Some(spec) if spec.enabled => Ok(spec),
            Some(_) => Err(ExprError::FunctionLookup {
                name: name.to_string(),
                reason: "function is disabled".to_string(),
            }),
            None => Err(ExprError::FunctionLookup {
                name: name.to_string(),
                reason: "function is not registered".to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_lowercase())
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.functions.values()
    }

    pub fn by_category(&self, category: FunctionCategory) -> Vec<&FunctionSpec> {
        self.functions
            .values()
            .filter(|f| f.category == category)
            .collect()
    }

    /// Check arguments against the declared parameter schema. Evaluation does
    /// not call this; it is an opt-in check for tooling and tests.
    pub fn validate_params(&self, name: &str, args: &[Value<'_>]) -> Result<(), ExprError> {
        let spec = self.get(name)?;
        let invalid = |message: String| ExprError::Runtime {
            function: spec.name.clone(),
            expression: spec.signature(),
            message,
        };

        let required = spec.params.iter().filter(|p| p.required).count();
        if args.len() < required {
            return Err(invalid(format!(
                "expected at least {} argument(s), got {}",
                required,
                args.len()
            )));
        }
        if !spec.variadic && args.len() > spec.params.len() {
            return Err(invalid(format!(
                "expected at most {} argument(s), got {}",
                spec.params.len(),
                args.len()
            )));
        }

        for (i, arg) in args.iter().enumerate() {
            let Some(param) = spec.params.get(i).or(spec.params.last()) else {
                continue;
            };
            if !param.kind.accepts(arg) {
                return Err(invalid(format!(
                    "argument '{}' expects {:?}, got {}",
                    param.name,
                    param.kind,
                    arg.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Syntax-only validation of expression text.
    pub fn validate_expression(&self, text: &str) -> Result<(), ParseError> {
        expr_parser::parse(text).map(|_| ())
    }
}
