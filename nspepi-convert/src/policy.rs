use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::error::ConvertError;
use crate::modules::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Classic,
    Advanced,
}

/// A policy as seen by bind handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Lowercased policy name.
    pub name: String,
    /// Module that converted the `add` command, [`ModuleId::External`] for
    /// policies no module handles.
    pub module: ModuleId,
    pub kind: Option<PolicyKind>,
}

/// Where a policy is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Global,
    Vserver,
    User,
    Group,
    Service,
}

impl EntityKind {
    /// Emission order of the non-global scopes.
    pub const ENTITY_ORDER: [EntityKind; 4] = [
        EntityKind::Vserver,
        EntityKind::User,
        EntityKind::Group,
        EntityKind::Service,
    ];

    pub fn from_object_type(object_type: &str) -> Option<Self> {
        match object_type.to_ascii_lowercase().as_str() {
            "global" => Some(Self::Global),
            "vserver" => Some(Self::Vserver),
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

/// Bind point chosen for a global classic bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalType {
    Default,
    Override,
}

impl GlobalType {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalType::Default => "DEFAULT",
            GlobalType::Override => "OVERRIDE",
        }
    }
}

impl Display for GlobalType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bind command as written in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub entity: EntityKind,
    pub entity_name: Option<String>,
    pub policy: String,
    pub module: ModuleId,
    /// Normalized flow type (`REQUEST`, `RESPONSE`, ...), empty when absent.
    pub bind_type: String,
    /// Declared priority, 0 when absent.
    pub priority: u32,
    pub original_line: String,
}

/// Policies by name plus every original bind.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: HashMap<String, Policy>,
    binds: Vec<Bind>,
    skip_global_override: HashSet<ModuleId>,
}

impl PolicyRegistry {
    /// Add or replace a policy. A policy already known to be classic stays
    /// classic.
    pub fn store(&mut self, name: &str, module: ModuleId, kind: Option<PolicyKind>) {
        let key = name.to_lowercase();
        let kind = match self.policies.get(&key) {
            Some(existing) if existing.kind == Some(PolicyKind::Classic) => existing.kind,
            _ => kind,
        };
        self.policies.insert(
            key.clone(),
            Policy {
                name: key,
                module,
                kind,
            },
        );
    }

    /// Set the kind of a stored policy. Classic is never downgraded.
    pub fn classify(&mut self, name: &str, kind: PolicyKind) {
        if let Some(policy) = self.policies.get_mut(&name.to_lowercase()) {
            if policy.kind != Some(PolicyKind::Classic) {
                policy.kind = Some(kind);
            }
        }
    }

    /// Record a policy that no module converts, unless it is already known.
    pub fn register_external(&mut self, name: &str) {
        let key = name.to_lowercase();
        self.policies.entry(key.clone()).or_insert(Policy {
            name: key,
            module: ModuleId::External,
            kind: Some(PolicyKind::Advanced),
        });
    }

    pub fn lookup(&self, name: &str) -> Option<&Policy> {
        self.policies.get(&name.to_lowercase())
    }

    pub fn get_policy(&self, name: &str) -> Result<&Policy, ConvertError> {
        self.lookup(name)
            .ok_or_else(|| ConvertError::PolicyLookup(name.to_string()))
    }

    pub fn kind_of(&self, name: &str) -> Option<PolicyKind> {
        self.lookup(name).and_then(|p| p.kind)
    }

    /// Global classic binds of `module` always go to the default bind point.
    pub fn skip_global_override(&mut self, module: ModuleId) {
        self.skip_global_override.insert(module);
    }

    pub fn store_original_bind(&mut self, bind: Bind) {
        self.binds.push(bind);
    }

    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    fn find_bind(&self, original_line: &str) -> Option<&Bind> {
        self.binds.iter().find(|b| b.original_line == original_line)
    }

    /// Bind point for a global bind: `OVERRIDE` when it outranks every
    /// entity bind of the same module and flow, `DEFAULT` otherwise.
    pub fn global_type_for_bind(&self, original_line: &str) -> Option<GlobalType> {
        let bind = self.find_bind(original_line)?;
        (bind.entity == EntityKind::Global).then(|| self.placement(bind).0)
    }

    /// A global bind whose priority falls between entity bind priorities
    /// cannot keep its evaluation order under advanced bind points.
    pub fn is_bind_unsupported(&self, original_line: &str) -> bool {
        self.find_bind(original_line)
            .is_some_and(|bind| bind.entity == EntityKind::Global && self.placement(bind).1)
    }

    fn placement(&self, bind: &Bind) -> (GlobalType, bool) {
        if bind.priority == 0 || self.skip_global_override.contains(&bind.module) {
            return (GlobalType::Default, false);
        }
        let priorities: Vec<u32> = self
            .binds
            .iter()
            .filter(|b| {
                b.entity != EntityKind::Global
                    && b.module == bind.module
                    && b.bind_type == bind.bind_type
                    && b.priority > 0
            })
            .map(|b| b.priority)
            .collect();
        let (Some(&min), Some(&max)) = (priorities.iter().min(), priorities.iter().max()) else {
            return (GlobalType::Default, false);
        };
        if bind.priority < min {
            (GlobalType::Override, false)
        } else if bind.priority > max {
            (GlobalType::Default, false)
        } else {
            (GlobalType::Default, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Bind, EntityKind, GlobalType, PolicyKind, PolicyRegistry};
    use crate::modules::ModuleId;

    fn bind(entity: EntityKind, priority: u32, line: &str) -> Bind {
        Bind {
            entity,
            entity_name: None,
            policy: "p".into(),
            module: ModuleId::Rewrite,
            bind_type: "REQUEST".into(),
            priority,
            original_line: line.into(),
        }
    }

    #[test]
    fn classic_is_never_downgraded() {
        let mut registry = PolicyRegistry::default();
        registry.store("P1", ModuleId::ContentSwitching, Some(PolicyKind::Classic));
        registry.classify("p1", PolicyKind::Advanced);
        registry.store("p1", ModuleId::ContentSwitching, None);
        assert_eq!(registry.kind_of("P1"), Some(PolicyKind::Classic));
    }

    #[test]
    fn external_policies_do_not_replace_known_ones() {
        let mut registry = PolicyRegistry::default();
        registry.store("cr1", ModuleId::CacheRedirection, None);
        registry.register_external("CR1");
        registry.register_external("other");
        assert_eq!(
            registry.lookup("cr1").map(|p| p.module),
            Some(ModuleId::CacheRedirection)
        );
        assert_eq!(
            registry.lookup("OTHER").map(|p| p.module),
            Some(ModuleId::External)
        );
        assert!(registry.get_policy("missing").is_err());
    }

    #[test]
    fn global_placement_follows_entity_priorities() {
        let mut registry = PolicyRegistry::default();
        registry.store_original_bind(bind(EntityKind::Vserver, 100, "v100"));
        registry.store_original_bind(bind(EntityKind::Vserver, 200, "v200"));
        registry.store_original_bind(bind(EntityKind::Global, 50, "g50"));
        registry.store_original_bind(bind(EntityKind::Global, 150, "g150"));
        registry.store_original_bind(bind(EntityKind::Global, 300, "g300"));

        assert_eq!(registry.global_type_for_bind("g50"), Some(GlobalType::Override));
        assert_eq!(registry.global_type_for_bind("g300"), Some(GlobalType::Default));
        assert!(registry.is_bind_unsupported("g150"));
        assert!(!registry.is_bind_unsupported("g50"));
        assert!(!registry.is_bind_unsupported("v100"));
        assert_eq!(registry.global_type_for_bind("v100"), None);
    }

    #[test]
    fn skipped_modules_stay_default() {
        let mut registry = PolicyRegistry::default();
        registry.skip_global_override(ModuleId::Rewrite);
        registry.store_original_bind(bind(EntityKind::Vserver, 100, "v100"));
        registry.store_original_bind(bind(EntityKind::Global, 50, "g50"));
        assert_eq!(registry.global_type_for_bind("g50"), Some(GlobalType::Default));
    }
}
