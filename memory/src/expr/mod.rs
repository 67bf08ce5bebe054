//! Expression language of the in-memory dialect.
//!
//! Conditions, filters, key conditions, update and projection expressions
//! are tokenized, parsed into a small AST and evaluated against one item at a
//! time. Attribute paths are top-level names or `#name` placeholders; values
//! are always `:value` placeholders.

pub mod ast;
pub mod eval;
pub mod parser;

pub use ast::{CompareOp, Condition, Operand, SetOperand, SetValue, Update, UpdateAction};
pub use eval::EvalContext;
pub use parser::{parse_condition, parse_projection, parse_update, ExpressionError};
