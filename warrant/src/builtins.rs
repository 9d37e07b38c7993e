//! Built-in matcher functions: RESTful path matching, regex, CIDR, globs,
//! wall-clock windows, and the `g`-family reachability functions.
//!
//! Compiled regexes and globs are memoized in concurrent maps shared by all
//! enforcers; entries are pure, so the caches never need invalidation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::IpAddr;

use chrono::NaiveDateTime;
use dashmap::DashMap;
use globset::{GlobBuilder, GlobMatcher};
use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::EvalError;
use crate::expr::{Functions, Value};
use crate::rbac::{ConditionalRoleManager, RoleManager};

static REGEX_CACHE: Lazy<DashMap<String, Regex>> = Lazy::new(DashMap::new);
static GLOB_CACHE: Lazy<DashMap<String, GlobMatcher>> = Lazy::new(DashMap::new);

static KEY_MATCH2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":[^/]+").unwrap());
static KEY_MATCH3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^/]+\}").unwrap());
static KEY_MATCH4_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^/]+)\}").unwrap());
static KEY_GET3_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^/]+?\}").unwrap());

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn cached_regex(func: &'static str, pattern: &str) -> Result<Regex, EvalError> {
    if let Some(re) = REGEX_CACHE.get(pattern) {
        return Ok(re.value().clone());
    }
    let re = Regex::new(pattern).map_err(|e| EvalError::Function {
        func,
        message: e.to_string(),
    })?;
    REGEX_CACHE.insert(pattern.to_string(), re.clone());
    Ok(re)
}

// ---------------------------------------------------------------------------
// Path matching
// ---------------------------------------------------------------------------

/// `key2` may end in `*`: prefix match up to the `*`.
/// `key_match("/foo/bar", "/foo/*")` holds.
pub fn key_match(key1: &str, key2: &str) -> bool {
    match key2.find('*') {
        None => key1 == key2,
        Some(i) => {
            if key1.len() > i {
                key1.as_bytes()[..i] == key2.as_bytes()[..i]
            } else {
                key1.as_bytes() == &key2.as_bytes()[..i]
            }
        }
    }
}

/// The part of `key1` matched by the `*` of `key2`, or the empty string.
pub fn key_get(key1: &str, key2: &str) -> String {
    let Some(i) = key2.find('*') else {
        return String::new();
    };
    if key1.len() > i && key1.as_bytes()[..i] == key2.as_bytes()[..i] {
        return key1[i..].to_string();
    }
    String::new()
}

/// `key2` may contain `:name` placeholders matching one path segment.
/// `key_match2("/resource1", "/:resource")` holds.
pub fn key_match2(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let pattern = KEY_MATCH2_RE.replace_all(&pattern, "[^/]+");
    anchored_match("keyMatch2", key1, &pattern)
}

/// The segment of `key1` captured by the `:path_var` placeholder of `key2`.
pub fn key_get2(key1: &str, key2: &str, path_var: &str) -> String {
    let pattern = key2.replace("/*", "/.*");
    let names: Vec<String> = KEY_MATCH2_RE
        .find_iter(&pattern)
        .map(|m| m.as_str().to_string())
        .collect();
    let replaced = KEY_MATCH2_RE.replace_all(&pattern, "([^/]+)");
    let Ok(re) = cached_regex("keyGet2", &format!("^{}$", replaced)) else {
        return String::new();
    };
    let Some(caps) = re.captures(key1) else {
        return String::new();
    };
    for (i, name) in names.iter().enumerate() {
        if path_var == &name[1..] {
            return caps
                .get(i + 1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
        }
    }
    String::new()
}

/// Like [`key_match2`] but with `{name}` placeholders.
pub fn key_match3(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let pattern = KEY_MATCH3_RE.replace_all(&pattern, "[^/]+");
    anchored_match("keyMatch3", key1, &pattern)
}

/// The segment of `key1` captured by the `{path_var}` placeholder of `key2`.
pub fn key_get3(key1: &str, key2: &str, path_var: &str) -> String {
    let pattern = key2.replace("/*", "/.*");
    let names: Vec<String> = KEY_GET3_RE
        .find_iter(&pattern)
        .map(|m| m.as_str().to_string())
        .collect();
    let replaced = KEY_GET3_RE.replace_all(&pattern, "([^/]+?)");
    let Ok(re) = cached_regex("keyGet3", &format!("^{}$", replaced)) else {
        return String::new();
    };
    let Some(caps) = re.captures(key1) else {
        return String::new();
    };
    for (i, name) in names.iter().enumerate() {
        if path_var == &name[1..name.len() - 1] {
            return caps
                .get(i + 1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
        }
    }
    String::new()
}

/// Like [`key_match3`], but a placeholder name appearing in several
/// positions must capture the same substring:
/// `/parent/123/child/123` matches `/parent/{id}/child/{id}`,
/// `/parent/123/child/456` does not.
pub fn key_match4(key1: &str, key2: &str) -> bool {
    let pattern = key2.replace("/*", "/.*");
    let mut names: Vec<String> = Vec::new();
    let replaced = KEY_MATCH4_RE.replace_all(&pattern, |caps: &regex::Captures<'_>| {
        names.push(caps[1].to_string());
        "([^/]+)".to_string()
    });
    let Ok(re) = cached_regex("keyMatch4", &format!("^{}$", replaced)) else {
        return false;
    };
    let Some(caps) = re.captures(key1) else {
        return false;
    };
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        let Some(m) = caps.get(i + 1) else {
            return false;
        };
        match seen.get(name.as_str()) {
            Some(prev) => {
                if *prev != m.as_str() {
                    return false;
                }
            }
            None => {
                seen.insert(name, m.as_str());
            }
        }
    }
    true
}

/// Strip a `?query` suffix from `key1`, then match like [`key_match3`].
pub fn key_match5(key1: &str, key2: &str) -> bool {
    let key1 = key1.split('?').next().unwrap_or(key1);
    let pattern = key2.replace("/*", "/.*");
    let pattern = KEY_MATCH3_RE.replace_all(&pattern, "[^/]+");
    anchored_match("keyMatch5", key1, &pattern)
}

fn anchored_match(func: &'static str, key1: &str, pattern: &str) -> bool {
    cached_regex(func, &format!("^{}$", pattern))
        .map(|re| re.is_match(key1))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Regex / CIDR / glob / time
// ---------------------------------------------------------------------------

/// Unanchored regex search of `key2` against `key1`.
pub fn regex_match(key1: &str, key2: &str) -> Result<bool, EvalError> {
    Ok(cached_regex("regexMatch", key2)?.is_match(key1))
}

/// `ip2` is an IP address or a CIDR pattern:
/// `ip_match("192.168.2.123", "192.168.2.0/24")` holds.
pub fn ip_match(ip1: &str, ip2: &str) -> Result<bool, EvalError> {
    let addr: IpAddr = ip1.parse().map_err(|_| EvalError::Function {
        func: "ipMatch",
        message: format!("'{}' is not an IP address", ip1),
    })?;
    if let Ok(net) = ip2.parse::<IpNet>() {
        return Ok(net.contains(&addr));
    }
    match ip2.parse::<IpAddr>() {
        Ok(other) => Ok(addr == other),
        Err(_) => Err(EvalError::Function {
            func: "ipMatch",
            message: format!("'{}' is neither an IP address nor a CIDR", ip2),
        }),
    }
}

/// Doublestar glob semantics: `*` stays within one path segment, `**`
/// crosses separators.
pub fn glob_match(key1: &str, key2: &str) -> Result<bool, EvalError> {
    if let Some(matcher) = GLOB_CACHE.get(key2) {
        return Ok(matcher.is_match(key1));
    }
    let matcher = GlobBuilder::new(key2)
        .literal_separator(true)
        .build()
        .map_err(|e| EvalError::Function {
            func: "globMatch",
            message: e.to_string(),
        })?
        .compile_matcher();
    let result = matcher.is_match(key1);
    GLOB_CACHE.insert(key2.to_string(), matcher);
    Ok(result)
}

/// Whether the current wall-clock time lies between `start` and `end`
/// (format `2006-01-02 15:04:05`-style, `_` for unbounded).
pub fn time_match(start: &str, end: &str) -> Result<bool, EvalError> {
    let now = chrono::Local::now().naive_local();
    if start != "_" {
        let start = NaiveDateTime::parse_from_str(start, TIME_FORMAT).map_err(|e| {
            EvalError::Function {
                func: "timeMatch",
                message: format!("bad start time '{}': {}", start, e),
            }
        })?;
        if now <= start {
            return Ok(false);
        }
    }
    if end != "_" {
        let end = NaiveDateTime::parse_from_str(end, TIME_FORMAT).map_err(|e| {
            EvalError::Function {
                func: "timeMatch",
                message: format!("bad end time '{}': {}", end, e),
            }
        })?;
        if now >= end {
            return Ok(false);
        }
    }
    Ok(true)
}

/// [`time_match`] in link-condition form, for temporal role edges with
/// `(start, end)` parameter vectors.
pub fn time_match_condition(params: &[String]) -> Result<bool, String> {
    if params.len() != 2 {
        return Err(format!("timeMatch: expected 2 parameters, got {}", params.len()));
    }
    time_match(&params[0], &params[1]).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

fn str_args<'v>(
    func: &'static str,
    args: &'v [Value],
    expected: usize,
) -> Result<Vec<&'v str>, EvalError> {
    if args.len() != expected {
        return Err(EvalError::ArgCount {
            func,
            expected,
            got: args.len(),
        });
    }
    args.iter()
        .map(|v| {
            v.as_str().ok_or(EvalError::TypeMismatch {
                op: func,
                expected: "string",
                got: v.type_name(),
            })
        })
        .collect()
}

/// Register every built-in under its matcher-visible name.
pub(crate) fn register_defaults(fns: &mut Functions<'_>) {
    fns.insert("keyMatch", |args: &[Value]| {
        let a = str_args("keyMatch", args, 2)?;
        Ok(Value::Bool(key_match(a[0], a[1])))
    });
    fns.insert("keyGet", |args: &[Value]| {
        let a = str_args("keyGet", args, 2)?;
        Ok(Value::Str(key_get(a[0], a[1])))
    });
    fns.insert("keyMatch2", |args: &[Value]| {
        let a = str_args("keyMatch2", args, 2)?;
        Ok(Value::Bool(key_match2(a[0], a[1])))
    });
    fns.insert("keyGet2", |args: &[Value]| {
        let a = str_args("keyGet2", args, 3)?;
        Ok(Value::Str(key_get2(a[0], a[1], a[2])))
    });
    fns.insert("keyMatch3", |args: &[Value]| {
        let a = str_args("keyMatch3", args, 2)?;
        Ok(Value::Bool(key_match3(a[0], a[1])))
    });
    fns.insert("keyGet3", |args: &[Value]| {
        let a = str_args("keyGet3", args, 3)?;
        Ok(Value::Str(key_get3(a[0], a[1], a[2])))
    });
    fns.insert("keyMatch4", |args: &[Value]| {
        let a = str_args("keyMatch4", args, 2)?;
        Ok(Value::Bool(key_match4(a[0], a[1])))
    });
    fns.insert("keyMatch5", |args: &[Value]| {
        let a = str_args("keyMatch5", args, 2)?;
        Ok(Value::Bool(key_match5(a[0], a[1])))
    });
    fns.insert("regexMatch", |args: &[Value]| {
        let a = str_args("regexMatch", args, 2)?;
        Ok(Value::Bool(regex_match(a[0], a[1])?))
    });
    fns.insert("ipMatch", |args: &[Value]| {
        let a = str_args("ipMatch", args, 2)?;
        Ok(Value::Bool(ip_match(a[0], a[1])?))
    });
    fns.insert("globMatch", |args: &[Value]| {
        let a = str_args("globMatch", args, 2)?;
        Ok(Value::Bool(glob_match(a[0], a[1])?))
    });
    fns.insert("timeMatch", |args: &[Value]| {
        let a = str_args("timeMatch", args, 2)?;
        Ok(Value::Bool(time_match(a[0], a[1])?))
    });
}

/// Build the `g`-family function for a role manager. Results are memoized
/// per argument tuple for the duration of one enforcement call; the memo
/// dies with the closure, so role-graph rebuilds can never serve stale
/// answers.
pub(crate) fn make_g_function<'a>(
    name: String,
    rm: &'a dyn RoleManager,
) -> impl Fn(&[Value]) -> Result<Value, EvalError> + 'a {
    let memo: RefCell<HashMap<String, bool>> = RefCell::new(HashMap::new());
    move |args: &[Value]| {
        let strs = g_args(args)?;
        let key = strs.join("\u{0}");
        if let Some(&hit) = memo.borrow().get(&key) {
            return Ok(Value::Bool(hit));
        }
        let result = rm
            .has_link(strs[0], strs[1], strs.get(2).copied())
            .map_err(|e| EvalError::Function {
                func: "g",
                message: format!("{}: {}", name, e),
            })?;
        memo.borrow_mut().insert(key, result);
        Ok(Value::Bool(result))
    }
}

/// The conditional flavor is never memoized: predicates may depend on the
/// clock.
pub(crate) fn make_conditional_g_function<'a>(
    name: String,
    crm: &'a ConditionalRoleManager,
) -> impl Fn(&[Value]) -> Result<Value, EvalError> + 'a {
    move |args: &[Value]| {
        let strs = g_args(args)?;
        let result = crm
            .has_link(strs[0], strs[1], strs.get(2).copied())
            .map_err(|e| EvalError::Function {
                func: "g",
                message: format!("{}: {}", name, e),
            })?;
        Ok(Value::Bool(result))
    }
}

fn g_args<'v>(args: &'v [Value]) -> Result<Vec<&'v str>, EvalError> {
    if args.len() != 2 && args.len() != 3 {
        return Err(EvalError::ArgCount {
            func: "g",
            expected: 2,
            got: args.len(),
        });
    }
    str_args("g", args, args.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_match_star_suffix() {
        assert!(key_match("/foo/bar", "/foo/*"));
        assert!(key_match("/foo", "/foo"));
        assert!(key_match("/foo", "/foo/*"));
        assert!(!key_match("/bar/foo", "/foo/*"));
    }

    #[test]
    fn key_get_returns_star_capture() {
        assert_eq!(key_get("/foo/bar/foo", "/foo/*"), "bar/foo");
        assert_eq!(key_get("/foo/bar", "/bar/*"), "");
        assert_eq!(key_get("/foo/bar", "/foo/bar"), "");
    }

    #[test]
    fn key_match2_named_segments() {
        assert!(key_match2("/foo/bar", "/foo/*"));
        assert!(key_match2("/resource1", "/:resource"));
        assert!(key_match2("/foo/resource1", "/foo/:resource"));
        assert!(!key_match2("/foo/a/b", "/foo/:resource"));
        assert!(!key_match2("/resource1", "/resource"));
    }

    #[test]
    fn key_get2_named_capture() {
        assert_eq!(key_get2("/resource1", "/:resource", "resource"), "resource1");
        assert_eq!(key_get2("/foo/b", "/foo/:bar", "bar"), "b");
        assert_eq!(key_get2("/foo/b", "/foo/:bar", "other"), "");
        assert_eq!(key_get2("/nope", "/foo/:bar", "bar"), "");
    }

    #[test]
    fn key_match3_brace_segments() {
        assert!(key_match3("/foo/bar", "/foo/*"));
        assert!(key_match3("/resource1", "/{resource}"));
        assert!(key_match3("/foo/a", "/foo/{bar}"));
        assert!(!key_match3("/foo/a/b", "/foo/{bar}"));
    }

    #[test]
    fn key_get3_brace_capture() {
        assert_eq!(
            key_get3("project/proj_project1_admin/", "project/proj_{project}_admin/", "project"),
            "project1"
        );
        assert_eq!(key_get3("/v1/user7", "/v1/{id}", "id"), "user7");
        assert_eq!(key_get3("/v1/user7", "/v1/{id}", "other"), "");
    }

    #[test]
    fn key_match4_repeated_placeholders_must_agree() {
        assert!(key_match4("/parent/123/child/123", "/parent/{id}/child/{id}"));
        assert!(!key_match4("/parent/123/child/456", "/parent/{id}/child/{id}"));
        assert!(key_match4("/parent/123/child/456", "/parent/{id}/child/{cid}"));
    }

    #[test]
    fn key_match5_strips_query() {
        assert!(key_match5("/foo/bar?status=1&type=2", "/foo/bar"));
        assert!(key_match5("/parent/child1?status=1", "/parent/*"));
        assert!(key_match5("/parent/child1", "/parent/*"));
        assert!(!key_match5("/other/child1?x=1", "/parent/*"));
    }

    #[test]
    fn regex_match_is_a_search() {
        assert!(regex_match("/topic/create/123", "/topic/create").unwrap());
        assert!(!regex_match("/topic/edit", "^/topic/create$").unwrap());
        assert!(regex_match("GET", "(GET)|(POST)").unwrap());
        assert!(regex_match_err("[").is_err());
    }

    fn regex_match_err(pat: &str) -> Result<bool, EvalError> {
        regex_match("x", pat)
    }

    #[test]
    fn ip_match_cidr_and_exact() {
        assert!(ip_match("192.168.2.123", "192.168.2.0/24").unwrap());
        assert!(!ip_match("192.168.3.1", "192.168.2.0/24").unwrap());
        assert!(ip_match("10.0.0.1", "10.0.0.1").unwrap());
        assert!(!ip_match("10.0.0.2", "10.0.0.1").unwrap());
        assert!(ip_match("::1", "::1/128").unwrap());
        assert!(ip_match("not-an-ip", "10.0.0.1").is_err());
        assert!(ip_match("10.0.0.1", "not-an-ip").is_err());
    }

    #[test]
    fn glob_match_doublestar() {
        assert!(glob_match("/foo/bar", "/foo/*").unwrap());
        assert!(!glob_match("/foo/bar/baz", "/foo/*").unwrap());
        assert!(glob_match("/foo/bar/baz", "/foo/**").unwrap());
        assert!(glob_match("data1", "data*").unwrap());
    }

    #[test]
    fn time_match_window() {
        assert!(time_match("_", "_").unwrap());
        assert!(time_match("2000-01-01 00:00:00", "_").unwrap());
        assert!(!time_match("_", "2000-01-01 00:00:00").unwrap());
        assert!(time_match("2000-01-01 00:00:00", "2999-12-31 23:59:59").unwrap());
        assert!(time_match("bad", "_").is_err());
    }

    #[test]
    fn time_match_condition_arity() {
        assert!(time_match_condition(&["_".into()]).is_err());
        assert!(time_match_condition(&["_".into(), "_".into()]).unwrap());
    }

    #[test]
    fn g_function_memoizes_within_call() {
        use crate::rbac::DefaultRoleManager;
        let mut rm = DefaultRoleManager::new(10);
        rm.add_link("alice", "admin", None);
        let g = make_g_function("g".to_string(), &rm);
        let args = [Value::from("alice"), Value::from("admin")];
        assert_eq!(g(&args).unwrap(), Value::Bool(true));
        assert_eq!(g(&args).unwrap(), Value::Bool(true));
        let miss = [Value::from("bob"), Value::from("admin")];
        assert_eq!(g(&miss).unwrap(), Value::Bool(false));
    }

    #[test]
    fn registered_wrappers_validate_arity() {
        let mut fns = Functions::new();
        register_defaults(&mut fns);
        let f = fns.get("keyMatch").unwrap();
        assert!(f(&[Value::from("/a")]).is_err());
        assert!(f(&[Value::from("/a"), Value::Int(3)]).is_err());
    }
}
