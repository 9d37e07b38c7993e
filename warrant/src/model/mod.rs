//! The model: sections of assertions describing request shape, policy
//! shape, role graphs, matchers and effect aggregation.

mod assertion;
mod parse;
mod policy;

pub use assertion::Assertion;
pub(crate) use assertion::{canonical, PolicyOp};

use std::collections::HashMap;
use std::path::Path;

use crate::error::ModelError;
use crate::expr;

/// Sections a model may contain, mapped from their INI header names.
const SECTION_NAMES: &[(&str, &str)] = &[
    ("request_definition", "r"),
    ("policy_definition", "p"),
    ("role_definition", "g"),
    ("policy_effect", "e"),
    ("matchers", "m"),
];

/// Sections every model must define.
const REQUIRED_SECTIONS: &[&str] = &["r", "p", "e", "m"];

/// A parsed model: `section -> key -> assertion`.
///
/// The policy store is embedded here: every `p`/`g` assertion owns its rules
/// and their uniqueness index. Mutations go through the policy operations in
/// [`Model`]'s impl (see `policy.rs`).
#[derive(Debug, Clone, Default)]
pub struct Model {
    sections: HashMap<String, HashMap<String, Assertion>>,
}

impl Model {
    /// Create an empty model; populate with [`Model::add_def`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a model from configuration text.
    pub fn from_text(text: &str) -> Result<Self, ModelError> {
        let mut model = Model::new();
        for section in parse::parse_sections(text)? {
            let Some(sec) = section_short_name(&section.name) else {
                // Unknown sections are opaque to the engine.
                continue;
            };
            for (key, value) in &section.entries {
                if !key.starts_with(sec) {
                    return Err(ModelError::MalformedLine {
                        line: 0,
                        text: format!("key '{}' does not belong in [{}]", key, section.name),
                    });
                }
                model.add_def(sec, key, value);
            }
        }
        for required in REQUIRED_SECTIONS {
            if !model.sections.contains_key(*required) {
                return Err(ModelError::MissingSection(required_name(required)));
            }
        }
        Ok(model)
    }

    /// Parse a model from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    /// Add one assertion. Returns `false` (and stores nothing) for an empty
    /// value.
    ///
    /// Matcher and effect values are rewritten here so the evaluator sees
    /// flat `r_sub`/`p_sub` identifiers.
    pub fn add_def(&mut self, sec: &str, key: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            return false;
        }
        let stored = match sec {
            "m" | "e" => expr::rewrite_qualified(value.trim()),
            _ => value.trim().to_string(),
        };
        let assertion = Assertion::new(sec, key, &stored);
        self.sections
            .entry(sec.to_string())
            .or_default()
            .insert(key.to_string(), assertion);
        true
    }

    /// Look up one assertion.
    pub fn get_assertion(&self, sec: &str, key: &str) -> Option<&Assertion> {
        self.sections.get(sec)?.get(key)
    }

    pub(crate) fn get_assertion_mut(&mut self, sec: &str, key: &str) -> Option<&mut Assertion> {
        self.sections.get_mut(sec)?.get_mut(key)
    }

    /// All keys of a section, sorted (`p`, `p2`, ...).
    pub fn keys(&self, sec: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .sections
            .get(sec)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Whether the model has any `g` assertions.
    pub fn has_role_definitions(&self) -> bool {
        self.sections
            .get("g")
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }
}

fn section_short_name(header: &str) -> Option<&'static str> {
    SECTION_NAMES
        .iter()
        .find(|(name, _)| *name == header)
        .map(|(_, sec)| *sec)
}

fn required_name(sec: &str) -> &'static str {
    SECTION_NAMES
        .iter()
        .find(|(_, s)| *s == sec)
        .map(|(name, _)| *name)
        .unwrap_or("request_definition")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_MODEL: &str = "
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
";

    #[test]
    fn loads_basic_model() {
        let m = Model::from_text(BASIC_MODEL).unwrap();
        let r = m.get_assertion("r", "r").unwrap();
        assert_eq!(r.tokens, vec!["r_sub", "r_obj", "r_act"]);
        let matcher = m.get_assertion("m", "m").unwrap();
        assert_eq!(
            matcher.value,
            "r_sub == p_sub && r_obj == p_obj && r_act == p_act"
        );
        let e = m.get_assertion("e", "e").unwrap();
        assert_eq!(e.value, "some(where (p_eft == allow))");
    }

    #[test]
    fn missing_matchers_section_fails() {
        let text = "
[request_definition]
r = sub, obj, act
[policy_definition]
p = sub, obj, act
[policy_effect]
e = some(where (p.eft == allow))
";
        assert!(matches!(
            Model::from_text(text),
            Err(ModelError::MissingSection("matchers"))
        ));
    }

    #[test]
    fn add_def_rejects_empty_value() {
        let mut m = Model::new();
        assert!(!m.add_def("r", "r", "  "));
        assert!(m.get_assertion("r", "r").is_none());
    }

    #[test]
    fn key_must_match_section() {
        let text = "
[request_definition]
x = sub
";
        assert!(Model::from_text(text).is_err());
    }

    #[test]
    fn multiple_policy_definitions() {
        let text = "
[request_definition]
r = sub, obj, act
r2 = sub, obj, act

[policy_definition]
p = sub, obj, act
p2 = sub, obj, act, eft

[policy_effect]
e = some(where (p.eft == allow))
e2 = !some(where (p.eft == deny))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
m2 = r2.sub == p2.sub
";
        let m = Model::from_text(text).unwrap();
        assert_eq!(m.keys("p"), vec!["p", "p2"]);
        assert_eq!(
            m.get_assertion("p", "p2").unwrap().field_index("eft"),
            Some(3)
        );
        assert_eq!(m.get_assertion("m", "m2").unwrap().value, "r2_sub == p2_sub");
    }

    #[test]
    fn role_definitions_detected() {
        let mut m = Model::from_text(BASIC_MODEL).unwrap();
        assert!(!m.has_role_definitions());
        m.add_def("g", "g", "_, _");
        assert!(m.has_role_definitions());
    }
}
