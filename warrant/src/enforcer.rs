//! The enforcer: wires model, policy store, role managers and the function
//! table, and decides requests.
//!
//! # Concurrency
//!
//! Readers (`enforce`, `batch_enforce`, `enforce_ex`, the `get_*`/`has_*`
//! queries) take `&self`; writers (everything that mutates policy, model,
//! adapter or toggles) take `&mut self`. Sharing an enforcer between
//! threads therefore means wrapping it in an `RwLock`, which gives exactly
//! the readers-writer discipline the engine needs: readers are wait-free
//! against each other, writers exclude everyone. The compiled-matcher cache
//! is a concurrent map so readers can extend it without exclusive access.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::adapter::{Adapter, FileAdapter, Filter};
use crate::builtins;
use crate::effector::{Effect, Effector};
use crate::error::{AdapterError, EnforceError, EvalError, PolicyError, Result};
use crate::expr::{self, Env, Functions, Program, Value};
use crate::model::{Assertion, Model, PolicyOp};
use crate::rbac::{ConditionalRoleManager, DefaultRoleManager, LinkConditionFn, RoleManager};

const DEFAULT_HIERARCHY_LEVEL: usize = 10;

/// Selects which assertion keys one enforcement uses, for models with
/// multiple request/policy/effect/matcher definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforceContext {
    pub rtype: String,
    pub ptype: String,
    pub etype: String,
    pub mtype: String,
}

impl EnforceContext {
    /// Keys with a common suffix: `new("2")` selects `r2`/`p2`/`e2`/`m2`.
    pub fn new(suffix: &str) -> Self {
        Self {
            rtype: format!("r{}", suffix),
            ptype: format!("p{}", suffix),
            etype: format!("e{}", suffix),
            mtype: format!("m{}", suffix),
        }
    }
}

impl Default for EnforceContext {
    fn default() -> Self {
        Self::new("")
    }
}

type UserFn = Arc<dyn Fn(&[Value]) -> std::result::Result<Value, EvalError> + Send + Sync>;

pub struct Enforcer {
    model: Model,
    adapter: Option<Box<dyn Adapter>>,
    rm_map: HashMap<String, Box<dyn RoleManager>>,
    cond_rm_map: HashMap<String, ConditionalRoleManager>,
    functions: HashMap<String, UserFn>,
    matcher_cache: DashMap<String, Arc<Program>>,
    enabled: bool,
    auto_save: bool,
    auto_build_role_links: bool,
    filtered: bool,
}

impl Enforcer {
    /// Create an enforcer over a model, with no adapter.
    pub fn new(model: Model) -> Result<Self> {
        let mut e = Enforcer {
            model,
            adapter: None,
            rm_map: HashMap::new(),
            cond_rm_map: HashMap::new(),
            functions: HashMap::new(),
            matcher_cache: DashMap::new(),
            enabled: true,
            auto_save: true,
            auto_build_role_links: true,
            filtered: false,
        };
        e.init_role_managers();
        e.build_role_links()?;
        Ok(e)
    }

    /// Create an enforcer and load policy through the adapter.
    pub fn with_adapter<A: Adapter + 'static>(model: Model, adapter: A) -> Result<Self> {
        let mut e = Self::new(model)?;
        e.adapter = Some(Box::new(adapter));
        e.load_policy()?;
        Ok(e)
    }

    /// Convenience constructor from a model file and a policy file.
    pub fn from_files(
        model_path: impl AsRef<Path>,
        policy_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let model = Model::from_file(model_path)?;
        Self::with_adapter(model, FileAdapter::new(policy_path.as_ref()))
    }

    // ── Enforcement ─────────────────────────────────────────────────────

    /// Decide one request. One value per token of the `r` assertion.
    pub fn enforce(&self, rvals: &[Value]) -> Result<bool> {
        self.enforce_internal(&EnforceContext::default(), rvals)
            .map(|(decision, _)| decision)
    }

    /// Like [`Enforcer::enforce`], also returning the field values of the
    /// deciding rule (empty when no rule decided).
    pub fn enforce_ex(&self, rvals: &[Value]) -> Result<(bool, Vec<String>)> {
        self.enforce_ex_with_context(&EnforceContext::default(), rvals)
    }

    /// Decide one request under explicit assertion keys.
    pub fn enforce_with_context(&self, ctx: &EnforceContext, rvals: &[Value]) -> Result<bool> {
        self.enforce_internal(ctx, rvals)
            .map(|(decision, _)| decision)
    }

    pub fn enforce_ex_with_context(
        &self,
        ctx: &EnforceContext,
        rvals: &[Value],
    ) -> Result<(bool, Vec<String>)> {
        let (decision, explain) = self.enforce_internal(ctx, rvals)?;
        let rule = explain
            .and_then(|i| {
                self.model
                    .get_assertion("p", &ctx.ptype)
                    .and_then(|ast| ast.policy.get(i))
                    .cloned()
            })
            .unwrap_or_default();
        Ok((decision, rule))
    }

    /// Decide a batch of independent requests. Fail-fast: the first failing
    /// request aborts the batch and surfaces its error.
    pub fn batch_enforce(&self, requests: &[Vec<Value>]) -> Result<Vec<bool>> {
        requests.iter().map(|rvals| self.enforce(rvals)).collect()
    }

    fn enforce_internal(
        &self,
        ctx: &EnforceContext,
        rvals: &[Value],
    ) -> Result<(bool, Option<usize>)> {
        if !self.enabled {
            return Ok((true, None));
        }

        let r_ast = self.assertion("r", &ctx.rtype)?;
        let p_ast = self.assertion("p", &ctx.ptype)?;
        let e_ast = self.assertion("e", &ctx.etype)?;
        let m_ast = self.assertion("m", &ctx.mtype)?;

        if rvals.len() != r_ast.tokens.len() {
            return Err(EnforceError::ArityMismatch {
                rtype: ctx.rtype.clone(),
                expected: r_ast.tokens.len(),
                got: rvals.len(),
            });
        }

        let program = self.compiled_matcher(&m_ast.value)?;
        let effector = Effector::from_expr(&e_ast.value)?;

        let mut env: Env = Env::with_capacity(r_ast.tokens.len() + p_ast.tokens.len());
        for (token, value) in r_ast.tokens.iter().zip(rvals) {
            env.insert(token.clone(), value.clone());
        }

        let mut fns = Functions::new();
        builtins::register_defaults(&mut fns);
        for (name, f) in &self.functions {
            let f = Arc::clone(f);
            fns.insert(name.clone(), move |args: &[Value]| f(args));
        }
        for (ptype, rm) in &self.rm_map {
            fns.insert(
                ptype.clone(),
                builtins::make_g_function(ptype.clone(), rm.as_ref()),
            );
        }
        for (ptype, crm) in &self.cond_rm_map {
            fns.insert(
                ptype.clone(),
                builtins::make_conditional_g_function(ptype.clone(), crm),
            );
        }

        let mut stream = effector.stream();

        if p_ast.policy.is_empty() {
            // No rules: evaluate the matcher once with empty policy values
            // so purely request-driven matchers still decide.
            for token in &p_ast.tokens {
                env.insert(token.clone(), Value::Str(String::new()));
            }
            let matched = Self::matched(program.eval(&env, &fns)?)?;
            stream.push(if matched {
                Effect::Allow
            } else {
                Effect::Indeterminate
            });
            let (decision, _) = stream.conclude();
            debug!(decision, "enforced with empty policy");
            return Ok((decision, None));
        }

        let order = self.candidate_order(p_ast, effector)?;
        let eft_index = p_ast.field_index("eft");
        for &orig in &order {
            let rule = &p_ast.policy[orig];
            if rule.len() < p_ast.tokens.len() {
                return Err(PolicyError::RuleTooShort {
                    ptype: ctx.ptype.clone(),
                    expected: p_ast.tokens.len(),
                    got: rule.len(),
                }
                .into());
            }
            for (i, token) in p_ast.tokens.iter().enumerate() {
                env.insert(token.clone(), Value::Str(rule[i].clone()));
            }
            let matched = Self::matched(program.eval(&env, &fns)?)?;
            let eft = if !matched {
                Effect::Indeterminate
            } else {
                match eft_index.and_then(|i| rule.get(i)) {
                    None => Effect::Allow,
                    Some(v) if v == "allow" => Effect::Allow,
                    Some(v) if v == "deny" => Effect::Deny,
                    Some(_) => Effect::Indeterminate,
                }
            };
            if stream.push(eft) {
                break;
            }
        }

        let (decision, explain_pos) = stream.conclude();
        let explain = explain_pos.map(|pos| order[pos]);
        debug!(decision, ?explain, "enforced");
        Ok((decision, explain))
    }

    /// Interpret a matcher result: booleans decide directly, numbers are
    /// weights (zero means no match), anything else is a matcher error.
    fn matched(value: Value) -> Result<bool> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(n) => Ok(n != 0),
            Value::Float(n) => Ok(n != 0.0),
            other => Err(EvalError::NotBoolean(other.type_name()).into()),
        }
    }

    fn assertion(&self, sec: &'static str, key: &str) -> Result<&Assertion> {
        self.model.get_assertion(sec, key).ok_or_else(|| {
            EnforceError::Policy(PolicyError::UnknownPolicyType {
                sec: sec.to_string(),
                ptype: key.to_string(),
            })
        })
    }

    fn compiled_matcher(&self, text: &str) -> Result<Arc<Program>> {
        if let Some(program) = self.matcher_cache.get(text) {
            return Ok(program.value().clone());
        }
        let program = Arc::new(expr::compile(text)?);
        self.matcher_cache.insert(text.to_string(), program.clone());
        Ok(program)
    }

    // ── Candidate ordering ──────────────────────────────────────────────

    /// The order rules are tried in: ascending explicit priority, subject
    /// hierarchy depth, or insertion order. Stable in all cases.
    fn candidate_order(&self, p_ast: &Assertion, effector: Effector) -> Result<Vec<usize>> {
        let mut order: Vec<usize> = (0..p_ast.policy.len()).collect();
        if effector == Effector::SubjectPriority {
            let Some(sub_index) = p_ast.field_index("sub") else {
                return Ok(order);
            };
            let dom_index = p_ast.field_index("dom");
            let depths = self.subject_depths();
            let keys: Vec<i64> = p_ast
                .policy
                .iter()
                .map(|rule| {
                    let dom = dom_index
                        .and_then(|i| rule.get(i))
                        .map(|s| s.as_str())
                        .unwrap_or("");
                    let sub = rule.get(sub_index).map(|s| s.as_str()).unwrap_or("");
                    let depth = depths
                        .get(&domain_qualified(dom, sub))
                        .copied()
                        .unwrap_or(0);
                    // Deeper subjects (more derived) come first.
                    -(depth as i64)
                })
                .collect();
            order.sort_by_key(|&i| keys[i]);
        } else if let Some(pri_index) = p_ast.field_index("priority") {
            let mut keys = Vec::with_capacity(p_ast.policy.len());
            for rule in &p_ast.policy {
                let text = rule.get(pri_index).map(|s| s.as_str()).unwrap_or("");
                let value: i64 = text
                    .parse()
                    .map_err(|_| PolicyError::InvalidPriority(text.to_string()))?;
                keys.push(value);
            }
            order.sort_by_key(|&i| keys[i]);
        }
        Ok(order)
    }

    /// Level-order depth of every subject in the `g` graph, per domain.
    /// Roots sit at depth 0; members inherit depth parent+1.
    fn subject_depths(&self) -> HashMap<String, usize> {
        let mut members_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut has_role: HashSet<String> = HashSet::new();
        let mut nodes: HashSet<String> = HashSet::new();
        if let Some(g_ast) = self.model.get_assertion("g", "g") {
            for rule in &g_ast.policy {
                if rule.len() < 2 {
                    continue;
                }
                let dom = rule.get(2).map(|s| s.as_str()).unwrap_or("");
                let member = domain_qualified(dom, &rule[0]);
                let role = domain_qualified(dom, &rule[1]);
                members_of
                    .entry(role.clone())
                    .or_default()
                    .push(member.clone());
                has_role.insert(member.clone());
                nodes.insert(member);
                nodes.insert(role);
            }
        }
        let mut depths: HashMap<String, usize> = HashMap::new();
        let mut queue: VecDeque<(String, usize)> = nodes
            .iter()
            .filter(|node| !has_role.contains(*node))
            .map(|node| (node.clone(), 0))
            .collect();
        while let Some((node, level)) = queue.pop_front() {
            if depths.contains_key(&node) {
                continue;
            }
            depths.insert(node.clone(), level);
            if let Some(members) = members_of.get(&node) {
                for member in members {
                    if !depths.contains_key(member) {
                        queue.push_back((member.clone(), level + 1));
                    }
                }
            }
        }
        depths
    }

    // ── Role links ──────────────────────────────────────────────────────

    /// Create one role manager per `g` assertion: conditional when the
    /// definition declares predicate parameters, default otherwise.
    fn init_role_managers(&mut self) {
        self.rm_map.clear();
        self.cond_rm_map.clear();
        for key in self.model.keys("g") {
            let Some(ast) = self.model.get_assertion("g", &key) else {
                continue;
            };
            if ast.is_conditional() {
                self.cond_rm_map
                    .insert(key, ConditionalRoleManager::new(DEFAULT_HIERARCHY_LEVEL));
            } else {
                self.rm_map.insert(
                    key,
                    Box::new(DefaultRoleManager::new(DEFAULT_HIERARCHY_LEVEL)),
                );
            }
        }
    }

    /// Rebuild every role graph from the grouping policies. Appears atomic
    /// to readers because it requires exclusive access.
    pub fn build_role_links(&mut self) -> Result<()> {
        for (ptype, rm) in self.rm_map.iter_mut() {
            rm.clear();
            if let Some(ast) = self.model.get_assertion("g", ptype) {
                ast.build_role_links(rm.as_mut())?;
            }
        }
        for (ptype, crm) in self.cond_rm_map.iter_mut() {
            crm.clear();
            if let Some(ast) = self.model.get_assertion("g", ptype) {
                ast.build_conditional_role_links(crm)?;
            }
        }
        debug!("role links rebuilt");
        Ok(())
    }

    fn build_incremental(
        &mut self,
        ptype: &str,
        op: PolicyOp,
        rules: &[Vec<String>],
    ) -> Result<()> {
        if let Some(rm) = self.rm_map.get_mut(ptype) {
            if let Some(ast) = self.model.get_assertion("g", ptype) {
                ast.build_incremental_role_links(rm.as_mut(), op, rules)?;
            }
        } else if let Some(crm) = self.cond_rm_map.get_mut(ptype) {
            if let Some(ast) = self.model.get_assertion("g", ptype) {
                ast.build_incremental_conditional_role_links(crm, op, rules)?;
            }
        }
        Ok(())
    }

    // ── Policy store mutations (backing the management shell) ───────────

    pub(crate) fn add_policy_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> Result<bool> {
        self.assertion(if sec == "g" { "g" } else { "p" }, ptype)?;
        if self.model.has_policy(sec, ptype, &rule) {
            return Ok(false);
        }
        if self.auto_save {
            if let Some(adapter) = self.adapter.as_mut() {
                ignore_not_implemented(adapter.add_policy(sec, ptype, &rule))?;
            }
        }
        self.model.add_policy(sec, ptype, rule.clone());
        if sec == "g" && self.auto_build_role_links {
            self.build_incremental(ptype, PolicyOp::Add, std::slice::from_ref(&rule))?;
        }
        Ok(true)
    }

    pub(crate) fn add_policies_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool> {
        self.assertion(if sec == "g" { "g" } else { "p" }, ptype)?;
        if !self.model.add_policies(sec, ptype, &rules) {
            return Ok(false);
        }
        if sec == "g" && self.auto_build_role_links {
            self.build_incremental(ptype, PolicyOp::Add, &rules)?;
        }
        Ok(true)
    }

    pub(crate) fn remove_policy_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> Result<bool> {
        if !self.model.has_policy(sec, ptype, &rule) {
            return Ok(false);
        }
        if self.auto_save {
            if let Some(adapter) = self.adapter.as_mut() {
                ignore_not_implemented(adapter.remove_policy(sec, ptype, &rule))?;
            }
        }
        self.model.remove_policy(sec, ptype, &rule);
        if sec == "g" && self.auto_build_role_links {
            self.build_incremental(ptype, PolicyOp::Remove, std::slice::from_ref(&rule))?;
        }
        Ok(true)
    }

    pub(crate) fn remove_policies_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> Result<bool> {
        if !self.model.remove_policies(sec, ptype, &rules) {
            return Ok(false);
        }
        if sec == "g" && self.auto_build_role_links {
            self.build_incremental(ptype, PolicyOp::Remove, &rules)?;
        }
        Ok(true)
    }

    pub(crate) fn remove_filtered_policy_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> Result<bool> {
        if self.auto_save {
            if let Some(adapter) = self.adapter.as_mut() {
                ignore_not_implemented(adapter.remove_filtered_policy(
                    sec,
                    ptype,
                    field_index,
                    &field_values,
                ))?;
            }
        }
        let (changed, removed) =
            self.model
                .remove_filtered_policy(sec, ptype, field_index, &field_values);
        if sec == "g" && changed && self.auto_build_role_links {
            self.build_incremental(ptype, PolicyOp::Remove, &removed)?;
        }
        Ok(changed)
    }

    pub(crate) fn update_policy_internal(
        &mut self,
        sec: &str,
        ptype: &str,
        old: Vec<String>,
        new: Vec<String>,
    ) -> Result<bool> {
        if !self.model.update_policy(sec, ptype, &old, new.clone()) {
            return Ok(false);
        }
        if sec == "g" && self.auto_build_role_links {
            self.build_incremental(ptype, PolicyOp::Remove, std::slice::from_ref(&old))?;
            self.build_incremental(ptype, PolicyOp::Add, std::slice::from_ref(&new))?;
        }
        Ok(true)
    }

    // ── Adapter plumbing ────────────────────────────────────────────────

    /// Reload all policy through the adapter. The adapter fills a fresh
    /// copy of the model; the stored model is only swapped in on success,
    /// so a failing load leaves the enforcer untouched.
    pub fn load_policy(&mut self) -> Result<()> {
        let mut new_model = self.model.clone();
        new_model.clear_policy();
        {
            let adapter = self.adapter.as_mut().ok_or(AdapterError::NoAdapter)?;
            adapter.load_policy(&mut new_model)?;
        }
        self.swap_in(new_model)
    }

    /// Replace the store with the subset selected by `filter`. The
    /// enforcer is then read-only against the adapter.
    pub fn load_filtered_policy(&mut self, filter: &Filter) -> Result<()> {
        let mut new_model = self.model.clone();
        new_model.clear_policy();
        self.load_filtered_into(new_model, filter)
    }

    /// Union a further filtered subset into the current store.
    pub fn load_incremental_filtered_policy(&mut self, filter: &Filter) -> Result<()> {
        let new_model = self.model.clone();
        self.load_filtered_into(new_model, filter)
    }

    fn load_filtered_into(&mut self, mut new_model: Model, filter: &Filter) -> Result<()> {
        {
            let adapter = self.adapter.as_mut().ok_or(AdapterError::NoAdapter)?;
            adapter.load_filtered_policy(&mut new_model, filter)?;
        }
        self.swap_in(new_model)
    }

    fn swap_in(&mut self, new_model: Model) -> Result<()> {
        self.model = new_model;
        self.filtered = self
            .adapter
            .as_ref()
            .map(|a| a.is_filtered())
            .unwrap_or(false);
        self.matcher_cache.clear();
        if self.auto_build_role_links {
            self.build_role_links()?;
        }
        Ok(())
    }

    /// Persist the whole store. Refused after a filtered load.
    pub fn save_policy(&mut self) -> Result<()> {
        if self.filtered {
            return Err(AdapterError::FilteredSaveRefused.into());
        }
        let adapter = self.adapter.as_mut().ok_or(AdapterError::NoAdapter)?;
        adapter.save_policy(&self.model)?;
        Ok(())
    }

    /// Drop every stored rule and clear the role graphs.
    pub fn clear_policy(&mut self) {
        self.model.clear_policy();
        for rm in self.rm_map.values_mut() {
            rm.clear();
        }
        for crm in self.cond_rm_map.values_mut() {
            crm.clear();
        }
    }

    /// Whether the store holds a filtered subset.
    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn set_adapter<A: Adapter + 'static>(&mut self, adapter: A) {
        self.adapter = Some(Box::new(adapter));
        self.filtered = false;
    }

    /// Replace the model (including its embedded policy store) and rebuild
    /// role managers and caches.
    pub fn set_model(&mut self, model: Model) -> Result<()> {
        self.model = model;
        self.matcher_cache.clear();
        self.init_role_managers();
        self.build_role_links()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    // ── Runtime toggles ─────────────────────────────────────────────────

    /// `false` short-circuits every request to `true`.
    pub fn enable_enforce(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Forward single-rule mutations to the adapter. Adapters that do not
    /// implement auto-save are silently left unchanged.
    pub fn enable_auto_save(&mut self, auto_save: bool) {
        self.auto_save = auto_save;
    }

    /// Maintain role graphs incrementally on grouping-policy mutations.
    pub fn enable_auto_build_role_links(&mut self, auto_build: bool) {
        self.auto_build_role_links = auto_build;
    }

    // ── Function and role-manager registration ──────────────────────────

    /// Register a custom matcher function.
    pub fn add_function<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    /// Use `f` as pattern-equivalence between role names of the named role
    /// manager. Takes effect on the next query; no rebuild required.
    pub fn add_named_matching_func<F>(&mut self, ptype: &str, f: F) -> bool
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        match self.rm_map.get_mut(ptype) {
            Some(rm) => {
                rm.add_matching_func(Arc::new(f));
                true
            }
            None => false,
        }
    }

    /// Use `f` as pattern-equivalence between domain names.
    pub fn add_named_domain_matching_func<F>(&mut self, ptype: &str, f: F) -> bool
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        match self.rm_map.get_mut(ptype) {
            Some(rm) => {
                rm.add_domain_matching_func(Arc::new(f));
                true
            }
            None => false,
        }
    }

    /// Attach a link-condition predicate to a domainless grouping edge.
    pub fn add_named_link_condition_func<F>(
        &mut self,
        ptype: &str,
        user: &str,
        role: &str,
        f: F,
    ) -> bool
    where
        F: Fn(&[String]) -> std::result::Result<bool, String> + Send + Sync + 'static,
    {
        match self.cond_rm_map.get_mut(ptype) {
            Some(crm) => {
                let f: LinkConditionFn = Arc::new(f);
                crm.set_link_condition_fn(user, role, f);
                true
            }
            None => false,
        }
    }

    /// Attach a link-condition predicate to a domain-qualified edge.
    pub fn add_named_domain_link_condition_func<F>(
        &mut self,
        ptype: &str,
        user: &str,
        role: &str,
        domain: &str,
        f: F,
    ) -> bool
    where
        F: Fn(&[String]) -> std::result::Result<bool, String> + Send + Sync + 'static,
    {
        match self.cond_rm_map.get_mut(ptype) {
            Some(crm) => {
                let f: LinkConditionFn = Arc::new(f);
                crm.set_domain_link_condition_fn(user, role, domain, f);
                true
            }
            None => false,
        }
    }

    /// Replace the parameter vector of a domainless edge's predicate.
    pub fn set_named_link_condition_func_params(
        &mut self,
        ptype: &str,
        user: &str,
        role: &str,
        params: &[&str],
    ) -> bool {
        match self.cond_rm_map.get_mut(ptype) {
            Some(crm) => {
                crm.set_link_condition_params(
                    user,
                    role,
                    params.iter().map(|s| s.to_string()).collect(),
                );
                true
            }
            None => false,
        }
    }

    /// Replace the parameter vector of a domain-qualified edge's predicate.
    pub fn set_named_domain_link_condition_func_params(
        &mut self,
        ptype: &str,
        user: &str,
        role: &str,
        domain: &str,
        params: &[&str],
    ) -> bool {
        match self.cond_rm_map.get_mut(ptype) {
            Some(crm) => {
                crm.set_domain_link_condition_params(
                    user,
                    role,
                    domain,
                    params.iter().map(|s| s.to_string()).collect(),
                );
                true
            }
            None => false,
        }
    }

    /// Reachability through a named role manager (conditional or not).
    pub(crate) fn role_manager_has_link(
        &self,
        ptype: &str,
        name1: &str,
        name2: &str,
        domain: Option<&str>,
    ) -> Result<bool> {
        if let Some(rm) = self.rm_map.get(ptype) {
            return Ok(rm.has_link(name1, name2, domain)?);
        }
        if let Some(crm) = self.cond_rm_map.get(ptype) {
            return Ok(crm.has_link(name1, name2, domain)?);
        }
        Ok(false)
    }

    pub(crate) fn role_manager_roles(
        &self,
        ptype: &str,
        name: &str,
        domain: Option<&str>,
    ) -> Vec<String> {
        if let Some(rm) = self.rm_map.get(ptype) {
            return rm.get_roles(name, domain);
        }
        if let Some(crm) = self.cond_rm_map.get(ptype) {
            return crm.get_roles(name, domain);
        }
        Vec::new()
    }

    pub(crate) fn role_manager_users(
        &self,
        ptype: &str,
        name: &str,
        domain: Option<&str>,
    ) -> Vec<String> {
        if let Some(rm) = self.rm_map.get(ptype) {
            return rm.get_users(name, domain);
        }
        if let Some(crm) = self.cond_rm_map.get(ptype) {
            return crm.get_users(name, domain);
        }
        Vec::new()
    }
}

fn ignore_not_implemented(result: std::result::Result<(), AdapterError>) -> Result<()> {
    match result {
        Ok(()) | Err(AdapterError::NotImplemented(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn domain_qualified(domain: &str, name: &str) -> String {
    format!("{}::{}", domain, name)
}
