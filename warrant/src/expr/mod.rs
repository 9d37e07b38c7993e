//! Expression evaluator for matcher and effect expressions.
//!
//! Self-contained and swappable: the rest of the crate only uses
//! [`compile`] to turn an expression string into an immutable [`Program`]
//! and [`Program::eval`] to run it against a per-request environment and a
//! function table. Programs are safe to share across requests.

mod eval;
mod lex;
mod parse;

use std::collections::HashMap;
use std::fmt;

use crate::error::EvalError;

pub use eval::Functions;

/// A dynamically typed value flowing through the evaluator.
///
/// Request and policy fields are strings; ABAC requests carry structured
/// records whose attributes are resolved with `.` access in the matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Record(serde_json::Map<String, serde_json::Value>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Record(_) => "record",
        }
    }

    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Record(_) => write!(f, "<record>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Object(m) => Value::Record(m),
            other => Value::Str(other.to_string()),
        }
    }
}

/// The variable environment for one evaluation.
pub type Env = HashMap<String, Value>;

/// A compiled expression. Immutable; share between requests freely.
#[derive(Debug, Clone)]
pub struct Program {
    ast: Ast,
}

impl Program {
    /// Evaluate against an environment and a function table.
    pub fn eval(&self, env: &Env, fns: &Functions<'_>) -> Result<Value, EvalError> {
        eval::eval(&self.ast, env, fns)
    }
}

/// Compile an expression string into a [`Program`].
pub fn compile(text: &str) -> Result<Program, EvalError> {
    let tokens = lex::tokenize(text)?;
    let ast = parse::parse(&tokens)?;
    Ok(Program { ast })
}

/// Rewrite dotted section access (`r.sub` -> `r_sub`, `p2.eft` -> `p2_eft`)
/// so the evaluator sees flat identifiers.
///
/// Only identifiers of the form `r`/`p` with an optional numeric suffix are
/// rewritten, and only their first dot: `r.sub.Age` becomes `r_sub.Age`
/// (attribute access on a record), while `foo.bar(x)` is left untouched.
/// String literals are skipped entirely.
pub fn rewrite_qualified(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' || c == '"' {
            // Copy the whole string literal verbatim.
            out.push(c);
            i += 1;
            while i < chars.len() {
                out.push(chars[i]);
                if chars[i] == c {
                    i += 1;
                    break;
                }
                i += 1;
            }
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if is_section_key(&word) && i < chars.len() && chars[i] == '.' {
                out.push_str(&word);
                out.push('_');
                i += 1; // swallow the dot
            } else {
                out.push_str(&word);
            }
        } else {
            out.push(c);
            i += 1;
        }
    }

    out
}

/// `r`, `p`, `r2`, `p3`, ... are section keys subject to rewriting.
fn is_section_key(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some('r') | Some('p')) && chars.all(|c| c.is_ascii_digit())
}

/// The expression AST. Internal to this module; the outside world only
/// sees [`Program`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Attr(Box<Ast>, String),
    Call(String, Vec<Ast>),
    Not(Box<Ast>),
    Neg(Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Cmp(CmpOp, Box<Ast>, Box<Ast>),
    Arith(ArithOp, Box<Ast>, Box<Ast>),
    In(Box<Ast>, Vec<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}
