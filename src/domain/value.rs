//! Dynamic values produced while evaluating expressions.
//!
//! Stock rows and block instances are borrowed from the evaluation
//! [`Context`](crate::domain::context::Context), so a value never outlives
//! the day it was computed for.

use crate::domain::block::DynamicBlockDetection;
use crate::domain::error::ExprError;
use crate::domain::expr::BinaryOp;
use crate::domain::stock::Stock;
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Stock(&'a Stock),
    Stocks(&'a [Stock]),
    Block(&'a DynamicBlockDetection),
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Stock(s) => write!(f, "<stock {} {}>", s.ticker, s.date),
            Value::Stocks(s) => write!(f, "<{} stocks>", s.len()),
            Value::Block(b) => write!(f, "<block {}>", b.block_id),
        }
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(&self) -> f64 {
        match self {
            Num::Int(v) => *v as f64,
            Num::Float(v) => *v,
        }
    }
}

impl<'a> Value<'a> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::Stock(_) => "stock",
            Value::Stocks(_) => "stocks",
            Value::Block(_) => "block",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Stocks(s) => !s.is_empty(),
            Value::Date(_) | Value::Stock(_) | Value::Block(_) => true,
        }
    }

    fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(v) => Some(Num::Int(*v)),
            Value::Float(v) => Some(Num::Float(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_num().map(|n| n.as_f64())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn from_f64_option(value: Option<f64>) -> Self {
        value.map(Value::Float).unwrap_or(Value::None)
    }

    /// Attribute lookup: direct fields first, then the object's nested mapping
    /// (`indicators` on stocks, `metadata` on blocks).
    pub fn attribute(&self, attr: &str) -> Result<Value<'a>, ExprError> {
        let found = match self {
            Value::Stock(s) => stock_attribute(s, attr),
            Value::Block(b) => block_attribute(b, attr),
            Value::Date(d) => match attr {
                "year" => Some(Value::Int(i64::from(d.year()))),
                "month" => Some(Value::Int(i64::from(d.month()))),
                "day" => Some(Value::Int(i64::from(d.day()))),
                _ => None,
            },
            _ => None,
        };
        found.ok_or_else(|| ExprError::UnknownAttribute {
            target: self.type_name().to_string(),
            attribute: attr.to_string(),
        })
    }

    pub fn binary(
        &self,
        op: BinaryOp,
        rhs: &Value<'a>,
    ) -> Result<Value<'a>, ExprError> {
        if let (BinaryOp::Add, Value::Str(a), Value::Str(b)) = (op, self, rhs) {
            return Ok(Value::Str(format!("{}{}", a, b)));
        }
        if let (BinaryOp::Sub, Value::Date(a), Value::Date(b)) = (op, self, rhs) {
            return Ok(Value::Int((*a - *b).num_days()));
        }

        let (Some(a), Some(b)) = (self.as_num(), rhs.as_num()) else {
            return Err(ExprError::type_error(format!(
                "unsupported operand types for {:?}: {} and {}",
                op,
                self.type_name(),
                rhs.type_name()
            )));
        };

        match (op, a, b) {
            (BinaryOp::Div, a, b) => {
                let divisor = b.as_f64();
                if divisor == 0.0 {
                    return Err(ExprError::type_error("division by zero"));
                }
                Ok(Value::Float(a.as_f64() / divisor))
            }
            (BinaryOp::Pow, Num::Int(a), Num::Int(b)) if b >= 0 => u32::try_from(b)
                .ok()
                .and_then(|e| a.checked_pow(e))
                .map(Value::Int)
                .ok_or_else(|| ExprError::type_error("integer power overflow")),
            (BinaryOp::Pow, a, b) => Ok(Value::Float(a.as_f64().powf(b.as_f64()))),
            (op, Num::Int(a), Num::Int(b)) => int_arith(op, a, b),
            (op, a, b) => float_arith(op, a.as_f64(), b.as_f64()),
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`.
    pub fn compare(&self, rhs: &Value<'a>) -> Result<Ordering, ExprError> {
        let ordering = match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => match (self.as_num(), rhs.as_num()) {
                (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()),
                _ => None,
            },
        };
        ordering.ok_or_else(|| {
            ExprError::type_error(format!(
                "'<' not supported between {} and {}",
                self.type_name(),
                rhs.type_name()
            ))
        })
    }

    /// Equality used by `==` and `!=`; mismatched types are simply unequal.
    pub fn equals(&self, rhs: &Value<'a>) -> bool {
        match (self.as_num(), rhs.as_num()) {
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ => self == rhs,
        }
    }
}

fn int_arith<'a>(
    op: BinaryOp,
    a: i64,
    b: i64,
) -> Result<Value<'a>, ExprError> {
    let overflow = || ExprError::type_error("integer overflow");
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::FloorDiv | BinaryOp::Mod if b == 0 => {
            Err(ExprError::type_error("integer division or modulo by zero"))
        }
        // Floor semantics: the remainder takes the sign of the divisor.
        BinaryOp::FloorDiv => {
            let q = a.checked_div_euclid(b).ok_or_else(overflow)?;
            Ok(Value::Int(q - i64::from(b < 0 && a.rem_euclid(b) != 0)))
        }
        BinaryOp::Mod => {
            let r = a.checked_rem_euclid(b).ok_or_else(overflow)?;
            Ok(Value::Int(if b < 0 && r != 0 { r + b } else { r }))
        }
        BinaryOp::Div | BinaryOp::Pow => float_arith(op, a as f64, b as f64),
    }
}

fn float_arith<'a>(
    op: BinaryOp,
    a: f64,
    b: f64,
) -> Result<Value<'a>, ExprError> {
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Pow => Ok(Value::Float(a.powf(b))),
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            Err(ExprError::type_error("float division by zero"))
        }
        BinaryOp::Div => Ok(Value::Float(a / b)),
        BinaryOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        BinaryOp::Mod => Ok(Value::Float(a - b * (a / b).floor())),
    }
}

fn stock_attribute<'a>(stock: &'a Stock, attr: &str) -> Option<Value<'a>> {
    let value = match attr {
        "ticker" => Value::Str(stock.ticker.clone()),
        "date" => Value::Date(stock.date),
        "open" => Value::Float(stock.open),
        "high" => Value::Float(stock.high),
        "low" => Value::Float(stock.low),
        "close" => Value::Float(stock.close),
        "volume" => Value::Int(stock.volume),
        "trading_value" => Value::from_f64_option(stock.trading_value),
        "market_cap" => Value::from_f64_option(stock.market_cap),
        _ => return stock.indicators.get(attr).map(|v| Value::Float(*v)),
    };
    Some(value)
}

fn block_attribute<'a>(block: &'a DynamicBlockDetection, attr: &str) -> Option<Value<'a>> {
    let date = |d: Option<NaiveDate>| d.map(Value::Date).unwrap_or(Value::None);
    let value = match attr {
        "block_id" => Value::Str(block.block_id.clone()),
        "block_type" => Value::Int(i64::from(block.block_type)),
        "ticker" => Value::Str(block.ticker.clone()),
        "status" => Value::Str(block.status.as_str().to_string()),
        "is_active" => Value::Bool(block.is_active()),
        "started_at" => date(block.started_at),
        "ended_at" => date(block.ended_at),
        "peak_price" => Value::Float(block.peak_price),
        "peak_date" => date(block.peak_date),
        "peak_volume" => Value::Int(block.peak_volume),
        "prev_close" => Value::from_f64_option(block.prev_close),
        "spot_count" => Value::Int(block.spots.len() as i64),
        "is_virtual" => Value::Bool(block.is_virtual),
        _ => return block.metadata.get(attr).map(|v| Value::Str(v.clone())),
    };
    Some(value)
}
