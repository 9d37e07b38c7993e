//! Unified error types for the engine.

/// Error while parsing or validating a model configuration.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("missing required section '{0}'")]
    MissingSection(&'static str),

    #[error("duplicate section '[{0}]'")]
    DuplicateSection(String),

    #[error("malformed model line {line}: '{text}'")]
    MalformedLine { line: usize, text: String },

    #[error("unsupported effect expression '{0}'")]
    UnsupportedEffect(String),

    #[error("role definition '{key}' must declare at least two '_' positions, got {count}")]
    RoleDefinition { key: String, count: usize },

    #[error("io error reading model: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            ModelError::MissingSection(sec) => Some(format!(
                "a model needs [request_definition], [policy_definition], [policy_effect] \
                 and [matchers]; '{}' was not found",
                sec
            )),
            ModelError::UnsupportedEffect(_) => Some(
                "supported effects: some(where (p.eft == allow)), !some(where (p.eft == deny)), \
                 some(where (p.eft == allow)) && !some(where (p.eft == deny)), \
                 priority(p.eft) || deny, subjectPriority(p.eft) || deny"
                    .into(),
            ),
            ModelError::MalformedLine { .. } => {
                Some("expected '[section]' or 'key = value'".into())
            }
            _ => None,
        }
    }
}

/// Error from a policy rule that does not fit its assertion.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("malformed policy line: '{0}'")]
    ParseLine(String),

    #[error("unknown policy type '{ptype}' in section '{sec}'")]
    UnknownPolicyType { sec: String, ptype: String },

    #[error("rule has {got} fields but '{ptype}' declares {expected}")]
    RuleTooShort {
        ptype: String,
        expected: usize,
        got: usize,
    },

    #[error("rule priority '{0}' is not an integer")]
    InvalidPriority(String),
}

/// Error while compiling or evaluating a matcher expression.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("parse error in expression: {0}")]
    Parse(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("no attribute '{attr}' on '{base}'")]
    UnknownAttribute { base: String, attr: String },

    #[error("{op} expects {expected}, got {got}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        got: &'static str,
    },

    #[error("{func}: expected {expected} arguments, got {got}")]
    ArgCount {
        func: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{func}: {message}")]
    Function { func: &'static str, message: String },

    #[error("matcher returned {0}, expected a boolean or a numeric weight")]
    NotBoolean(&'static str),
}

/// Error from a role-graph query or rebuild.
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("link condition failed for {name1} -> {name2}: {message}")]
    LinkCondition {
        name1: String,
        name2: String,
        message: String,
    },
}

/// Error from a policy storage adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid file path, file path cannot be empty")]
    InvalidPath,

    #[error("no adapter is set")]
    NoAdapter,

    #[error("adapter does not implement '{0}'")]
    NotImplemented(&'static str),

    #[error("cannot save a filtered policy")]
    FilteredSaveRefused,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Unified error surfaced by the enforcer.
#[derive(Debug, thiserror::Error)]
pub enum EnforceError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Role(#[from] RoleError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("request has {got} values but '{rtype}' declares {expected}")]
    ArityMismatch {
        rtype: String,
        expected: usize,
        got: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EnforceError>;
