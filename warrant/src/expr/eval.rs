//! Tree-walking interpreter over an environment and a function table.

use std::collections::HashMap;

use crate::error::EvalError;

use super::{ArithOp, Ast, CmpOp, Env, Value};

/// The function table for one evaluation.
///
/// Built per enforcement call: builtins plus user functions plus the
/// `g`-family closures, which borrow the enforcer's role managers for the
/// duration of the call.
#[derive(Default)]
pub struct Functions<'a> {
    map: HashMap<String, Box<dyn Fn(&[Value]) -> Result<Value, EvalError> + 'a>>,
}

impl<'a> Functions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + 'a,
    {
        self.map.insert(name.into(), Box::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&(dyn Fn(&[Value]) -> Result<Value, EvalError> + 'a)> {
        self.map.get(name).map(|b| b.as_ref())
    }
}

pub(crate) fn eval(ast: &Ast, env: &Env, fns: &Functions<'_>) -> Result<Value, EvalError> {
    match ast {
        Ast::Bool(b) => Ok(Value::Bool(*b)),
        Ast::Int(n) => Ok(Value::Int(*n)),
        Ast::Float(n) => Ok(Value::Float(*n)),
        Ast::Str(s) => Ok(Value::Str(s.clone())),

        Ast::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),

        Ast::Attr(base, attr) => {
            let base_val = eval(base, env, fns)?;
            match base_val {
                Value::Record(map) => map
                    .get(attr)
                    .map(|v| Value::from(v.clone()))
                    .ok_or_else(|| EvalError::UnknownAttribute {
                        base: describe(base),
                        attr: attr.clone(),
                    }),
                other => Err(EvalError::TypeMismatch {
                    op: "attribute access",
                    expected: "record",
                    got: other.type_name(),
                }),
            }
        }

        Ast::Call(name, args) => {
            // `eval` is a special form: its argument is an expression held
            // in a policy or request value, compiled against the same
            // environment.
            if name == "eval" {
                return eval_special_form(args, env, fns);
            }
            let f = fns
                .get(name)
                .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval(a, env, fns)?);
            }
            f(&vals)
        }

        Ast::Not(inner) => match eval(inner, env, fns)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(EvalError::TypeMismatch {
                op: "!",
                expected: "bool",
                got: other.type_name(),
            }),
        },

        Ast::Neg(inner) => match eval(inner, env, fns)? {
            Value::Int(n) => Ok(Value::Int(-n)),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(EvalError::TypeMismatch {
                op: "unary -",
                expected: "number",
                got: other.type_name(),
            }),
        },

        Ast::And(left, right) => match eval(left, env, fns)? {
            Value::Bool(false) => Ok(Value::Bool(false)),
            Value::Bool(true) => expect_bool("&&", eval(right, env, fns)?),
            other => Err(EvalError::TypeMismatch {
                op: "&&",
                expected: "bool",
                got: other.type_name(),
            }),
        },

        Ast::Or(left, right) => match eval(left, env, fns)? {
            Value::Bool(true) => Ok(Value::Bool(true)),
            Value::Bool(false) => expect_bool("||", eval(right, env, fns)?),
            other => Err(EvalError::TypeMismatch {
                op: "||",
                expected: "bool",
                got: other.type_name(),
            }),
        },

        Ast::Cmp(op, left, right) => {
            let l = eval(left, env, fns)?;
            let r = eval(right, env, fns)?;
            Ok(Value::Bool(compare(*op, &l, &r)?))
        }

        Ast::Arith(op, left, right) => {
            let l = eval(left, env, fns)?;
            let r = eval(right, env, fns)?;
            arith(*op, l, r)
        }

        Ast::In(needle, haystack) => {
            let n = eval(needle, env, fns)?;
            for item in haystack {
                let v = eval(item, env, fns)?;
                if values_equal(&n, &v) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
    }
}

/// `eval(expr)`: treat a string value as an expression and evaluate it in
/// the current environment. Used for rule-in-policy models where the policy
/// subject is itself a predicate over the request.
fn eval_special_form(args: &[Ast], env: &Env, fns: &Functions<'_>) -> Result<Value, EvalError> {
    if args.len() != 1 {
        return Err(EvalError::ArgCount {
            func: "eval",
            expected: 1,
            got: args.len(),
        });
    }
    let text = match eval(&args[0], env, fns)? {
        Value::Str(s) => s,
        other => {
            return Err(EvalError::TypeMismatch {
                op: "eval",
                expected: "string",
                got: other.type_name(),
            })
        }
    };
    let program = super::compile(&super::rewrite_qualified(&text))?;
    program.eval(env, fns)
}

fn expect_bool(op: &'static str, v: Value) -> Result<Value, EvalError> {
    match v {
        Value::Bool(_) => Ok(v),
        other => Err(EvalError::TypeMismatch {
            op,
            expected: "bool",
            got: other.type_name(),
        }),
    }
}

/// Equality across the value kinds: numbers coerce, anything else must
/// match on type or the answer is simply `false`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        _ => false,
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq => return Ok(values_equal(l, r)),
        CmpOp::Ne => return Ok(!values_equal(l, r)),
        _ => {}
    }
    let ord = match (l, r) {
        (Value::Int(x), Value::Int(y)) => x.partial_cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => {
            return Err(EvalError::TypeMismatch {
                op: "comparison",
                expected: "two numbers or two strings",
                got: l.type_name(),
            })
        }
    };
    let ord = ord.ok_or(EvalError::TypeMismatch {
        op: "comparison",
        expected: "comparable numbers",
        got: "NaN",
    })?;
    Ok(match op {
        CmpOp::Lt => ord.is_lt(),
        CmpOp::Le => ord.is_le(),
        CmpOp::Gt => ord.is_gt(),
        CmpOp::Ge => ord.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}

fn arith(op: ArithOp, l: Value, r: Value) -> Result<Value, EvalError> {
    // String concatenation is the one non-numeric case.
    if op == ArithOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (&l, &r) {
            return Ok(Value::Str(format!("{}{}", a, b)));
        }
    }
    let as_float = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    };
    match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => Ok(match op {
            ArithOp::Add => Value::Int(a + b),
            ArithOp::Sub => Value::Int(a - b),
            ArithOp::Mul => Value::Int(a * b),
            ArithOp::Rem => {
                if *b == 0 {
                    return Err(EvalError::Function {
                        func: "%",
                        message: "division by zero".into(),
                    });
                }
                Value::Int(a % b)
            }
            ArithOp::Div => {
                if *b == 0 {
                    return Err(EvalError::Function {
                        func: "/",
                        message: "division by zero".into(),
                    });
                }
                Value::Float(*a as f64 / *b as f64)
            }
        }),
        _ => {
            let (a, b) = match (as_float(&l), as_float(&r)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(EvalError::TypeMismatch {
                        op: "arithmetic",
                        expected: "numbers",
                        got: l.type_name(),
                    })
                }
            };
            Ok(Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            }))
        }
    }
}

fn describe(ast: &Ast) -> String {
    match ast {
        Ast::Ident(name) => name.clone(),
        Ast::Attr(base, attr) => format!("{}.{}", describe(base), attr),
        _ => "<expression>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{compile, Env, Value};
    use super::*;

    fn env_of(pairs: &[(&str, Value)]) -> Env {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn run(text: &str, env: &Env) -> Value {
        compile(text).unwrap().eval(env, &Functions::new()).unwrap()
    }

    #[test]
    fn string_equality() {
        let env = env_of(&[
            ("r_sub", "alice".into()),
            ("p_sub", "alice".into()),
        ]);
        assert_eq!(run("r_sub == p_sub", &env), Value::Bool(true));
    }

    #[test]
    fn boolean_connectives_short_circuit() {
        let env = env_of(&[("a", Value::Bool(false))]);
        // `missing` is unbound; short-circuit must keep it unevaluated.
        assert_eq!(run("a && missing", &env), Value::Bool(false));
        let env = env_of(&[("a", Value::Bool(true))]);
        assert_eq!(run("a || missing", &env), Value::Bool(true));
    }

    #[test]
    fn unknown_identifier_is_named() {
        let env = Env::new();
        let err = compile("ghost == 'x'")
            .unwrap()
            .eval(&env, &Functions::new())
            .unwrap_err();
        assert!(matches!(err, EvalError::UnknownIdentifier(name) if name == "ghost"));
    }

    #[test]
    fn record_attribute_access() {
        let sub = serde_json::json!({"Age": 25, "Name": "alice"});
        let env = env_of(&[("r_sub", Value::from(sub))]);
        assert_eq!(run("r_sub.Age > 18", &env), Value::Bool(true));
        assert_eq!(run("r_sub.Name == 'alice'", &env), Value::Bool(true));
    }

    #[test]
    fn missing_attribute_errors() {
        let sub = serde_json::json!({"Age": 25});
        let env = env_of(&[("r_sub", Value::from(sub))]);
        let err = compile("r_sub.Owner == 'x'")
            .unwrap()
            .eval(&env, &Functions::new())
            .unwrap_err();
        assert!(matches!(err, EvalError::UnknownAttribute { .. }));
    }

    #[test]
    fn in_operator() {
        let env = env_of(&[("r_sub", "bob".into())]);
        assert_eq!(run("r_sub in ('alice', 'bob')", &env), Value::Bool(true));
        assert_eq!(run("r_sub in ['carol']", &env), Value::Bool(false));
    }

    #[test]
    fn mixed_type_equality_is_false() {
        let env = env_of(&[("x", Value::Int(1)), ("y", "1".into())]);
        assert_eq!(run("x == y", &env), Value::Bool(false));
        assert_eq!(run("x != y", &env), Value::Bool(true));
    }

    #[test]
    fn int_float_coercion() {
        let env = Env::new();
        assert_eq!(run("1 == 1.0", &env), Value::Bool(true));
        assert_eq!(run("3 / 2 == 1.5", &env), Value::Bool(true));
        assert_eq!(run("7 % 3 == 1", &env), Value::Bool(true));
    }

    #[test]
    fn numeric_weight_result() {
        let env = env_of(&[("w", Value::Int(3))]);
        assert_eq!(run("w * 2", &env), Value::Int(6));
    }

    #[test]
    fn function_calls() {
        let mut fns = Functions::new();
        fns.insert("shout", |args: &[Value]| {
            Ok(Value::Str(format!("{}!", args[0])))
        });
        let env = env_of(&[("x", "hey".into())]);
        let out = compile("shout(x) == 'hey!'")
            .unwrap()
            .eval(&env, &fns)
            .unwrap();
        assert_eq!(out, Value::Bool(true));
    }

    #[test]
    fn unknown_function_is_named() {
        let env = Env::new();
        let err = compile("nope(1)")
            .unwrap()
            .eval(&env, &Functions::new())
            .unwrap_err();
        assert!(matches!(err, EvalError::UnknownFunction(name) if name == "nope"));
    }

    #[test]
    fn eval_special_form_runs_stored_expression() {
        let sub = serde_json::json!({"Age": 70});
        let env = env_of(&[
            ("r_sub", Value::from(sub)),
            ("p_sub_rule", "r.sub.Age > 60".into()),
        ]);
        assert_eq!(run("eval(p_sub_rule)", &env), Value::Bool(true));
    }

    #[test]
    fn string_concat() {
        let env = Env::new();
        assert_eq!(run("'a' + 'b' == 'ab'", &env), Value::Bool(true));
    }
}
