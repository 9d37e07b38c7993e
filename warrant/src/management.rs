//! Management shell: CRUD over the policy store, named and default-key
//! variants, plus the RBAC conveniences. Thin by design; the semantics
//! live in the policy store and the role managers.

use crate::enforcer::Enforcer;
use crate::error::Result;

fn to_rule<I, S>(rule: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    rule.into_iter().map(Into::into).collect()
}

fn to_rules<I, R, S>(rules: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: Into<String>,
{
    rules.into_iter().map(to_rule).collect()
}

impl Enforcer {
    // ── Reads ───────────────────────────────────────────────────────────

    pub fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy("p")
    }

    pub fn get_named_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.model().get_policy("p", ptype)
    }

    pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_named_grouping_policy("g")
    }

    pub fn get_named_grouping_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.model().get_policy("g", ptype)
    }

    pub fn get_filtered_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Vec<Vec<String>> {
        self.model()
            .get_filtered_policy("p", "p", field_index, &to_rule(field_values.iter().copied()))
    }

    pub fn get_filtered_grouping_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Vec<Vec<String>> {
        self.model()
            .get_filtered_policy("g", "g", field_index, &to_rule(field_values.iter().copied()))
    }

    pub fn has_policy<I, S>(&self, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.has_named_policy("p", rule)
    }

    pub fn has_named_policy<I, S>(&self, ptype: &str, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model().has_policy("p", ptype, &to_rule(rule))
    }

    pub fn has_grouping_policy<I, S>(&self, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.has_named_grouping_policy("g", rule)
    }

    pub fn has_named_grouping_policy<I, S>(&self, ptype: &str, rule: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model().has_policy("g", ptype, &to_rule(rule))
    }

    // ── Policy writes ───────────────────────────────────────────────────

    pub fn add_policy<I, S>(&mut self, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_policy("p", rule)
    }

    pub fn add_named_policy<I, S>(&mut self, ptype: &str, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_policy_internal("p", ptype, to_rule(rule))
    }

    pub fn add_policies<I, R, S>(&mut self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_policies("p", rules)
    }

    pub fn add_named_policies<I, R, S>(&mut self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_policies_internal("p", ptype, to_rules(rules))
    }

    pub fn remove_policy<I, S>(&mut self, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_policy("p", rule)
    }

    pub fn remove_named_policy<I, S>(&mut self, ptype: &str, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_policy_internal("p", ptype, to_rule(rule))
    }

    pub fn remove_policies<I, R, S>(&mut self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_policies("p", rules)
    }

    pub fn remove_named_policies<I, R, S>(&mut self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_policies_internal("p", ptype, to_rules(rules))
    }

    pub fn remove_filtered_policy(
        &mut self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.remove_filtered_named_policy("p", field_index, field_values)
    }

    pub fn remove_filtered_named_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.remove_filtered_policy_internal(
            "p",
            ptype,
            field_index,
            to_rule(field_values.iter().copied()),
        )
    }

    pub fn update_policy<I, S>(&mut self, old: I, new: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_named_policy("p", old, new)
    }

    pub fn update_named_policy<I, S>(&mut self, ptype: &str, old: I, new: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_policy_internal("p", ptype, to_rule(old), to_rule(new))
    }

    // ── Grouping writes ─────────────────────────────────────────────────

    pub fn add_grouping_policy<I, S>(&mut self, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_grouping_policy("g", rule)
    }

    pub fn add_named_grouping_policy<I, S>(&mut self, ptype: &str, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_policy_internal("g", ptype, to_rule(rule))
    }

    pub fn add_grouping_policies<I, R, S>(&mut self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_named_grouping_policies("g", rules)
    }

    pub fn add_named_grouping_policies<I, R, S>(&mut self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_policies_internal("g", ptype, to_rules(rules))
    }

    pub fn remove_grouping_policy<I, S>(&mut self, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_grouping_policy("g", rule)
    }

    pub fn remove_named_grouping_policy<I, S>(&mut self, ptype: &str, rule: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_policy_internal("g", ptype, to_rule(rule))
    }

    pub fn remove_grouping_policies<I, R, S>(&mut self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_named_grouping_policies("g", rules)
    }

    pub fn remove_named_grouping_policies<I, R, S>(&mut self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_policies_internal("g", ptype, to_rules(rules))
    }

    pub fn update_grouping_policy<I, S>(&mut self, old: I, new: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_named_grouping_policy("g", old, new)
    }

    pub fn update_named_grouping_policy<I, S>(
        &mut self,
        ptype: &str,
        old: I,
        new: I,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_policy_internal("g", ptype, to_rule(old), to_rule(new))
    }

    pub fn remove_filtered_grouping_policy(
        &mut self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.remove_filtered_named_grouping_policy("g", field_index, field_values)
    }

    pub fn remove_filtered_named_grouping_policy(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.remove_filtered_policy_internal(
            "g",
            ptype,
            field_index,
            to_rule(field_values.iter().copied()),
        )
    }

    // ── RBAC conveniences ───────────────────────────────────────────────

    /// Grant `role` to `user` (a `g` rule).
    pub fn add_role_for_user(&mut self, user: &str, role: &str) -> Result<bool> {
        self.add_grouping_policy([user, role])
    }

    pub fn delete_role_for_user(&mut self, user: &str, role: &str) -> Result<bool> {
        self.remove_grouping_policy([user, role])
    }

    /// Direct roles of `user` through the default role manager.
    pub fn get_roles_for_user(&self, user: &str, domain: Option<&str>) -> Vec<String> {
        self.role_manager_roles("g", user, domain)
    }

    /// Direct members of `role` through the default role manager.
    pub fn get_users_for_role(&self, role: &str, domain: Option<&str>) -> Vec<String> {
        self.role_manager_users("g", role, domain)
    }

    /// Transitive role check through the `g` role manager.
    pub fn has_role_for_user(
        &self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> Result<bool> {
        self.role_manager_has_link("g", user, role, domain)
    }

    /// Grant a permission (a `p` rule headed by `user`).
    pub fn add_permission_for_user<I, S>(&mut self, user: &str, permission: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.into_iter().map(Into::into));
        self.add_policy_internal("p", "p", rule)
    }

    pub fn delete_permission_for_user<I, S>(&mut self, user: &str, permission: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rule = vec![user.to_string()];
        rule.extend(permission.into_iter().map(Into::into));
        self.remove_policy_internal("p", "p", rule)
    }
}

#[cfg(test)]
mod tests {
    use crate::adapter::MemoryAdapter;
    use crate::model::Model;
    use crate::Enforcer;

    fn rbac_model() -> Model {
        let mut m = Model::new();
        m.add_def("r", "r", "sub, obj, act");
        m.add_def("p", "p", "sub, obj, act");
        m.add_def("g", "g", "_, _");
        m.add_def("e", "e", "some(where (p.eft == allow))");
        m.add_def("m", "m", "g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act");
        m
    }

    #[test]
    fn add_has_remove_policy() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        assert!(e.add_policy(["alice", "data1", "read"]).unwrap());
        assert!(!e.add_policy(["alice", "data1", "read"]).unwrap());
        assert!(e.has_policy(["alice", "data1", "read"]));
        assert!(e.remove_policy(["alice", "data1", "read"]).unwrap());
        assert!(!e.has_policy(["alice", "data1", "read"]));
        assert!(!e.remove_policy(["alice", "data1", "read"]).unwrap());
    }

    #[test]
    fn grouping_mutations_update_role_graph() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        e.add_role_for_user("alice", "admin").unwrap();
        assert!(e.has_role_for_user("alice", "admin", None).unwrap());
        assert_eq!(e.get_roles_for_user("alice", None), vec!["admin"]);
        assert_eq!(e.get_users_for_role("admin", None), vec!["alice"]);

        e.delete_role_for_user("alice", "admin").unwrap();
        assert!(!e.has_role_for_user("alice", "admin", None).unwrap());
    }

    #[test]
    fn filtered_grouping_removal_updates_graph() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        e.add_grouping_policy(["alice", "admin"]).unwrap();
        e.add_grouping_policy(["bob", "admin"]).unwrap();
        assert!(e.remove_filtered_grouping_policy(0, &["alice"]).unwrap());
        assert!(!e.has_role_for_user("alice", "admin", None).unwrap());
        assert!(e.has_role_for_user("bob", "admin", None).unwrap());
    }

    #[test]
    fn batch_grouping_policies_update_graph_atomically() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        assert!(e
            .add_grouping_policies([["alice", "admin"], ["bob", "admin"]])
            .unwrap());
        assert!(e.has_role_for_user("bob", "admin", None).unwrap());

        // One member of the batch already exists: nothing changes.
        assert!(!e
            .add_grouping_policies([["carol", "admin"], ["alice", "admin"]])
            .unwrap());
        assert!(!e.has_role_for_user("carol", "admin", None).unwrap());

        assert!(e
            .remove_grouping_policies([["alice", "admin"], ["bob", "admin"]])
            .unwrap());
        assert!(!e.has_role_for_user("alice", "admin", None).unwrap());
    }

    #[test]
    fn update_grouping_policy_rewires_graph() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        e.add_grouping_policy(["alice", "admin"]).unwrap();
        assert!(e
            .update_grouping_policy(["alice", "admin"], ["alice", "auditor"])
            .unwrap());
        assert!(!e.has_role_for_user("alice", "admin", None).unwrap());
        assert!(e.has_role_for_user("alice", "auditor", None).unwrap());
    }

    #[test]
    fn update_policy_in_place() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        e.add_policy(["alice", "data1", "read"]).unwrap();
        assert!(e
            .update_policy(["alice", "data1", "read"], ["alice", "data1", "write"])
            .unwrap());
        assert!(e.has_policy(["alice", "data1", "write"]));
        assert!(!e.has_policy(["alice", "data1", "read"]));
    }

    #[test]
    fn auto_save_forwards_to_memory_adapter() {
        let mut e = Enforcer::with_adapter(rbac_model(), MemoryAdapter::new()).unwrap();
        e.add_policy(["alice", "data1", "read"]).unwrap();
        // Reloading from the adapter keeps the auto-saved rule.
        e.load_policy().unwrap();
        assert!(e.has_policy(["alice", "data1", "read"]));

        e.enable_auto_save(false);
        e.add_policy(["bob", "data2", "write"]).unwrap();
        e.load_policy().unwrap();
        assert!(!e.has_policy(["bob", "data2", "write"]));
    }

    #[test]
    fn filtered_policy_queries() {
        let mut e = Enforcer::new(rbac_model()).unwrap();
        e.add_policy(["alice", "data1", "read"]).unwrap();
        e.add_policy(["alice", "data2", "write"]).unwrap();
        e.add_policy(["bob", "data2", "write"]).unwrap();
        assert_eq!(e.get_filtered_policy(0, &["alice"]).len(), 2);
        assert_eq!(e.get_filtered_policy(1, &["data2"]).len(), 2);
        assert_eq!(e.get_filtered_policy(2, &["write"]).len(), 2);
    }
}
