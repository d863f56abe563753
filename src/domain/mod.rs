//! Core domain types and logic.

pub mod block;
pub mod builtins;
pub mod condition;
pub mod config_validation;
pub mod context;
pub mod detector;
pub mod error;
pub mod expr;
pub mod expr_eval;
pub mod expr_parser;
pub mod graph;
pub mod registry;
pub mod scan;
pub mod spot;
pub mod stock;
pub mod value;
