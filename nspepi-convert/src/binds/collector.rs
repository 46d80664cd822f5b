use indexmap::IndexMap;
use ns_config_core::ArgRef;

use super::{reprioritize, BindInfo};
use crate::diagnostics::{codes, Diagnostics};
use crate::modules::ModuleId;
use crate::output::Output;
use crate::policy::{EntityKind, PolicyKind, PolicyRegistry};

/// Binds of one module, keyed by lowercased bind type ("" when absent).
type TypeBuckets = IndexMap<String, Vec<BindInfo>>;
type ModuleBuckets = IndexMap<ModuleId, TypeBuckets>;
/// Entity subtype (`lb`, `cs`, `aaa`, ...) → entity name → module buckets.
type NamedBuckets = IndexMap<String, IndexMap<String, ModuleBuckets>>;

/// Deferred binds grouped by bind point.
#[derive(Debug, Default)]
pub struct BindCollector {
    global: ModuleBuckets,
    entities: IndexMap<EntityKind, NamedBuckets>,
}

impl BindCollector {
    pub fn save_global(&mut self, module: ModuleId, bind_type: &str, info: BindInfo) {
        self.global
            .entry(module)
            .or_default()
            .entry(bind_type.to_string())
            .or_default()
            .push(info);
    }

    pub fn save_entity(
        &mut self,
        entity: EntityKind,
        subtype: &str,
        name: &str,
        module: ModuleId,
        bind_type: &str,
        info: BindInfo,
    ) {
        self.entities
            .entry(entity)
            .or_default()
            .entry(subtype.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .entry(module)
            .or_default()
            .entry(bind_type.to_string())
            .or_default()
            .push(info);
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.entities.is_empty()
    }

    /// Renumber every bind point and render the binds: global first, then
    /// vservers, users, groups and services.
    pub fn emit(self, policies: &PolicyRegistry, diagnostics: &mut Diagnostics) -> Vec<Output> {
        let mut out = Vec::new();

        for (module, buckets) in self.global {
            for binds in buckets.into_values() {
                for mut info in reprioritize(binds, diagnostics) {
                    if policies.is_bind_unsupported(&info.original_line) {
                        out.push(unsupported(info, diagnostics));
                        continue;
                    }
                    let classic = info.policy_kind == Some(PolicyKind::Classic);
                    if classic && module != ModuleId::Ssl {
                        let global_type = policies.global_type_for_bind(&info.original_line);
                        if let (Some(flow), Some(global_type)) = (info.flow, global_type) {
                            info.tree.set_arg(
                                &ArgRef::keyword("type"),
                                format!("{}_{}", flow.global_prefix(), global_type.as_str()),
                            );
                        }
                    }
                    out.push(Output::Tree(info.tree));
                }
            }
        }

        let mut entities = self.entities;
        for kind in EntityKind::ENTITY_ORDER {
            let Some(named) = entities.shift_remove(&kind) else {
                continue;
            };
            for modules in named.into_values().flat_map(IndexMap::into_values) {
                for buckets in modules.into_values() {
                    for binds in buckets.into_values() {
                        for mut info in reprioritize(binds, diagnostics) {
                            if info.policy_kind == Some(PolicyKind::Classic) {
                                if let Some(flow) = info.flow {
                                    info.tree.set_arg(&ArgRef::keyword("type"), flow.as_str());
                                }
                            }
                            if policies.is_bind_unsupported(&info.original_line) {
                                out.push(unsupported(info, diagnostics));
                            } else {
                                out.push(Output::Tree(info.tree));
                            }
                        }
                    }
                }
            }
        }

        out
    }
}

fn unsupported(info: BindInfo, diagnostics: &mut Diagnostics) -> Output {
    diagnostics.error(
        codes::UNSUPPORTED_BIND,
        info.tree.lineno,
        format!(
            "Bind command [{}] is commented out because it can't be converted to be under a valid advanced bindpoint as priority needs to be changed manually. However, the command is partially converted as [{}]. If the command is required please take a backup because comments are not saved in ns.conf after triggering 'save ns config'.",
            info.original_line, info.tree
        ),
    );
    Output::Commented(info.tree)
}

#[cfg(test)]
mod tests {
    use ns_config_core::parse_line;

    use super::BindCollector;
    use crate::binds::{BindInfo, BindSlots, FlowDirection, Position};
    use crate::diagnostics::Diagnostics;
    use crate::modules::ModuleId;
    use crate::output::Output;
    use crate::policy::{Bind, EntityKind, PolicyKind, PolicyRegistry};

    fn info(line: &str, priority: u32, kind: PolicyKind, slots: BindSlots) -> BindInfo {
        BindInfo {
            original_line: line.to_string(),
            tree: parse_line(line, 1).expect("parse").expect("command"),
            position: Position::Inplace,
            priority,
            goto: None,
            slots,
            policy_kind: Some(kind),
            flow: Some(FlowDirection::Request),
        }
    }

    fn record(registry: &mut PolicyRegistry, entity: EntityKind, priority: u32, line: &str) {
        registry.store_original_bind(Bind {
            entity,
            entity_name: None,
            policy: "p".into(),
            module: ModuleId::Rewrite,
            bind_type: "REQUEST".into(),
            priority,
            original_line: line.into(),
        });
    }

    #[test]
    fn global_binds_come_first_with_computed_type() {
        let global = "bind rewrite global g1 10 END -type REQ_DEFAULT";
        let vserver = "bind lb vserver v1 -policyName p1 -priority 100 -type REQUEST";
        let mut registry = PolicyRegistry::default();
        record(&mut registry, EntityKind::Global, 10, global);
        record(&mut registry, EntityKind::Vserver, 100, vserver);

        let mut collector = BindCollector::default();
        collector.save_entity(
            EntityKind::Vserver,
            "lb",
            "v1",
            ModuleId::Rewrite,
            "request",
            info(vserver, 100, PolicyKind::Classic, BindSlots::keywords()),
        );
        collector.save_global(
            ModuleId::Rewrite,
            "request",
            info(global, 10, PolicyKind::Classic, BindSlots::positional(1, 2)),
        );

        let mut diags = Diagnostics::default();
        let lines: Vec<String> = collector
            .emit(&registry, &mut diags)
            .iter()
            .map(Output::render)
            .collect();
        assert_eq!(
            lines,
            vec![
                "bind rewrite global g1 10 END -type REQ_OVERRIDE".to_string(),
                "bind lb vserver v1 -policyName p1 -priority 100 -type REQUEST".to_string(),
            ]
        );
    }

    #[test]
    fn interleaved_global_bind_is_commented() {
        let global = "bind rewrite global g1 150 END -type REQ_DEFAULT";
        let mut registry = PolicyRegistry::default();
        record(&mut registry, EntityKind::Vserver, 100, "a");
        record(&mut registry, EntityKind::Vserver, 200, "b");
        record(&mut registry, EntityKind::Global, 150, global);

        let mut collector = BindCollector::default();
        collector.save_global(
            ModuleId::Rewrite,
            "request",
            info(global, 150, PolicyKind::Classic, BindSlots::positional(1, 2)),
        );

        let mut diags = Diagnostics::default();
        let out = collector.emit(&registry, &mut diags);
        assert!(matches!(out[0], Output::Commented(_)));
        assert_eq!(diags.entries()[0].code, "unsupported_bind");
    }
}
