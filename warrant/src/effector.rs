//! Effect aggregation: folds per-rule effects into one decision.
//!
//! The effector is detected from the canonical form of the model's `e`
//! expression; a small fixed set covers allow-override, deny-override,
//! allow-and-deny, and the two priority forms.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The effect one matched rule contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The rule grants access.
    Allow,
    /// The rule refuses access.
    Deny,
    /// The rule does not apply (no match, or an unrecognized `eft` value).
    Indeterminate,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
            Effect::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// The aggregation rule configured by the model's `e` assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effector {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
    /// `priority(p.eft) || deny`
    Priority,
    /// `subjectPriority(p.eft) || deny`
    SubjectPriority,
}

static P_EFT_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"p[0-9]+_eft").unwrap());

impl Effector {
    /// Detect the effector from the (rewritten) `e` expression.
    pub fn from_expr(value: &str) -> Result<Self, ModelError> {
        // Whitespace and the exact policy key are presentation details.
        let canon: String = P_EFT_KEY
            .replace_all(value, "p_eft")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match canon.as_str() {
            "some(where (p_eft == allow))" => Ok(Effector::AllowOverride),
            "!some(where (p_eft == deny))" => Ok(Effector::DenyOverride),
            "some(where (p_eft == allow)) && !some(where (p_eft == deny))" => {
                Ok(Effector::AllowAndDeny)
            }
            "priority(p_eft) || deny" => Ok(Effector::Priority),
            "subjectPriority(p_eft) || deny" => Ok(Effector::SubjectPriority),
            _ => Err(ModelError::UnsupportedEffect(value.to_string())),
        }
    }

    pub(crate) fn stream(self) -> EffectStream {
        EffectStream {
            effector: self,
            idx: 0,
            decided: None,
            explain: None,
            allow_idx: None,
            deny_idx: None,
        }
    }
}

/// Streaming fold over per-rule effects. `push` returns `true` once the
/// decision can no longer change, so the caller may stop iterating.
pub(crate) struct EffectStream {
    effector: Effector,
    idx: usize,
    decided: Option<bool>,
    explain: Option<usize>,
    allow_idx: Option<usize>,
    deny_idx: Option<usize>,
}

impl EffectStream {
    pub fn push(&mut self, eft: Effect) -> bool {
        let idx = self.idx;
        self.idx += 1;
        match self.effector {
            Effector::AllowOverride => {
                if eft == Effect::Allow {
                    self.decided = Some(true);
                    self.explain = Some(idx);
                    return true;
                }
            }
            Effector::DenyOverride => {
                if eft == Effect::Deny {
                    self.decided = Some(false);
                    self.explain = Some(idx);
                    return true;
                }
            }
            Effector::AllowAndDeny => {
                // No short-circuit: a later deny can still flip an allow.
                match eft {
                    Effect::Allow => {
                        if self.allow_idx.is_none() {
                            self.allow_idx = Some(idx);
                        }
                    }
                    Effect::Deny => {
                        if self.deny_idx.is_none() {
                            self.deny_idx = Some(idx);
                        }
                    }
                    Effect::Indeterminate => {}
                }
            }
            Effector::Priority | Effector::SubjectPriority => match eft {
                Effect::Allow => {
                    self.decided = Some(true);
                    self.explain = Some(idx);
                    return true;
                }
                Effect::Deny => {
                    self.decided = Some(false);
                    self.explain = Some(idx);
                    return true;
                }
                Effect::Indeterminate => {}
            },
        }
        false
    }

    /// The final decision and the position of the deciding rule, if any.
    pub fn conclude(self) -> (bool, Option<usize>) {
        match self.effector {
            Effector::AllowOverride => match self.decided {
                Some(true) => (true, self.explain),
                _ => (false, None),
            },
            Effector::DenyOverride => match self.decided {
                Some(false) => (false, self.explain),
                _ => (true, None),
            },
            Effector::AllowAndDeny => {
                if let Some(deny) = self.deny_idx {
                    (false, Some(deny))
                } else if let Some(allow) = self.allow_idx {
                    (true, Some(allow))
                } else {
                    (false, None)
                }
            }
            Effector::Priority | Effector::SubjectPriority => match self.decided {
                Some(decision) => (decision, self.explain),
                None => (false, None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(effector: Effector, effects: &[Effect]) -> (bool, Option<usize>) {
        let mut stream = effector.stream();
        for &eft in effects {
            if stream.push(eft) {
                break;
            }
        }
        stream.conclude()
    }

    use super::Effect::{Allow, Deny, Indeterminate as Ind};

    #[test]
    fn detects_all_forms() {
        assert_eq!(
            Effector::from_expr("some(where (p_eft == allow))").unwrap(),
            Effector::AllowOverride
        );
        assert_eq!(
            Effector::from_expr("!some(where (p_eft == deny))").unwrap(),
            Effector::DenyOverride
        );
        assert_eq!(
            Effector::from_expr("some(where (p_eft == allow)) && !some(where (p_eft == deny))")
                .unwrap(),
            Effector::AllowAndDeny
        );
        assert_eq!(
            Effector::from_expr("priority(p_eft) || deny").unwrap(),
            Effector::Priority
        );
        assert_eq!(
            Effector::from_expr("subjectPriority(p_eft) || deny").unwrap(),
            Effector::SubjectPriority
        );
    }

    #[test]
    fn detects_numbered_policy_keys() {
        assert_eq!(
            Effector::from_expr("!some(where (p2_eft == deny))").unwrap(),
            Effector::DenyOverride
        );
    }

    #[test]
    fn rejects_unknown_expression() {
        assert!(matches!(
            Effector::from_expr("max(p_eft)"),
            Err(ModelError::UnsupportedEffect(_))
        ));
    }

    #[test]
    fn allow_override_first_allow_wins() {
        assert_eq!(fold(Effector::AllowOverride, &[Ind, Allow, Allow]), (true, Some(1)));
        assert_eq!(fold(Effector::AllowOverride, &[Ind, Deny]), (false, None));
        assert_eq!(fold(Effector::AllowOverride, &[]), (false, None));
    }

    #[test]
    fn deny_override_true_unless_denied() {
        assert_eq!(fold(Effector::DenyOverride, &[Ind, Ind]), (true, None));
        assert_eq!(fold(Effector::DenyOverride, &[Allow, Deny]), (false, Some(1)));
        assert_eq!(fold(Effector::DenyOverride, &[]), (true, None));
    }

    #[test]
    fn allow_and_deny_needs_allow_and_no_deny() {
        assert_eq!(fold(Effector::AllowAndDeny, &[Allow, Ind]), (true, Some(0)));
        assert_eq!(fold(Effector::AllowAndDeny, &[Allow, Deny]), (false, Some(1)));
        assert_eq!(fold(Effector::AllowAndDeny, &[Deny, Allow]), (false, Some(0)));
        assert_eq!(fold(Effector::AllowAndDeny, &[Ind]), (false, None));
    }

    #[test]
    fn priority_first_match_wins() {
        assert_eq!(fold(Effector::Priority, &[Ind, Deny, Allow]), (false, Some(1)));
        assert_eq!(fold(Effector::Priority, &[Allow, Deny]), (true, Some(0)));
        assert_eq!(fold(Effector::Priority, &[Ind, Ind]), (false, None));
    }

    #[test]
    fn push_signals_short_circuit() {
        let mut s = Effector::AllowOverride.stream();
        assert!(!s.push(Ind));
        assert!(s.push(Allow));

        let mut s = Effector::AllowAndDeny.stream();
        assert!(!s.push(Allow));
        assert!(!s.push(Deny));
    }
}
