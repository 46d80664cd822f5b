use std::collections::HashSet;

use indexmap::IndexMap;
use ns_config_core::{ArgRef, CommandTree};
use tracing::debug;

use super::{policy_name, FeatureModule, Handled, ModuleId};
use crate::binds::{BindDefaults, BindSlots, Position};
use crate::context::{ConversionContext, VserverKind};
use crate::diagnostics::codes;
use crate::error::ConvertError;
use crate::output::Output;
use crate::policy::PolicyKind;

const RULE: &str = "rule";
/// Bind point key of `bind ssl global`.
const GLOBAL: &str = "";

const GLOBAL_TYPES: &[&str] = &[
    "CONTROL_OVERRIDE",
    "CONTROL_DEFAULT",
    "DATA_OVERRIDE",
    "DATA_DEFAULT",
];

const SSL_VSERVER_KINDS: &[VserverKind] = &[
    VserverKind::Lb,
    VserverKind::Cs,
    VserverKind::Cr,
    VserverKind::Gslb,
    VserverKind::Vpn,
    VserverKind::Authentication,
];

#[derive(Debug, Default)]
struct BindPoint {
    classic: Vec<CommandTree>,
    advanced: Vec<CommandTree>,
}

/// SSL policies and their vserver and global binds.
///
/// Classic SSL policies evaluate every matching policy while advanced ones
/// stop at the first match unless told to continue. Binds are therefore
/// held until the end and rewritten with `NEXT` gotos (`END` for policies
/// whose action controls client authentication), depending on which mix
/// of classic and advanced binds the configuration has.
#[derive(Debug)]
pub struct Ssl {
    classic_exists: bool,
    classic_bound: bool,
    advanced_bound: bool,
    global_override: bool,
    bind_points: IndexMap<String, BindPoint>,
    control_actions: HashSet<String>,
    control_policies: HashSet<String>,
}

impl Default for Ssl {
    fn default() -> Self {
        Self {
            classic_exists: false,
            classic_bound: false,
            advanced_bound: false,
            global_override: false,
            bind_points: IndexMap::new(),
            control_actions: ["clientauth", "noclientauth"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            control_policies: HashSet::new(),
        }
    }
}

impl FeatureModule for Ssl {
    fn id(&self) -> ModuleId {
        ModuleId::Ssl
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "add ssl action",
            "add ssl policy",
            "bind ssl vserver",
            "bind ssl global",
        ]
    }

    fn bind_defaults(&self) -> BindDefaults {
        BindDefaults {
            goto: Some("NEXT"),
            flow: None,
        }
    }

    fn collect(
        &mut self,
        ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        if tree.key() == "add ssl policy" {
            ctx.mark_rule_references(tree, &ArgRef::keyword(RULE));
        }
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        match tree.key().as_str() {
            "add ssl action" => {
                if tree.keyword_exists("clientAuth") {
                    if let Some(name) = tree.positional_value(0) {
                        self.control_actions.insert(name.to_lowercase());
                    }
                }
                Ok(Handled::tree(tree))
            }
            "add ssl policy" => Ok(self.convert_policy(ctx, tree)),
            "bind ssl vserver" => Ok(self.hold_vserver_bind(ctx, tree)),
            _ => Ok(self.hold_global_bind(ctx, tree)),
        }
    }

    fn final_call(&mut self, ctx: &mut ConversionContext) -> Result<Vec<Output>, ConvertError> {
        let bind_points = std::mem::take(&mut self.bind_points);
        match (self.classic_bound, self.advanced_bound) {
            (false, _) => Ok(bind_points
                .into_values()
                .flat_map(|point| point.advanced)
                .map(Output::Tree)
                .collect()),
            (true, false) => Ok(self.renumber_classic_only(bind_points)),
            (true, true) => self.convert_mixed(ctx, bind_points),
        }
    }
}

impl Ssl {
    fn convert_policy(&mut self, ctx: &mut ConversionContext, mut tree: CommandTree) -> Handled {
        let Some(name) = tree.positional_value(0).map(str::to_lowercase) else {
            return Handled::tree(tree);
        };
        ctx.policies.store(&name, ModuleId::Ssl, None);
        ctx.convert_expression(&mut tree, &ArgRef::keyword(RULE), false);
        if tree.upgraded {
            ctx.policies.classify(&name, PolicyKind::Classic);
            self.classic_exists = true;
        } else {
            ctx.policies.classify(&name, PolicyKind::Advanced);
        }
        if tree
            .keyword_value("action")
            .is_some_and(|action| self.control_actions.contains(&action.to_lowercase()))
        {
            self.control_policies.insert(name);
        }
        Handled::tree(tree)
    }

    fn hold_vserver_bind(&mut self, ctx: &ConversionContext, tree: CommandTree) -> Handled {
        if !self.classic_exists || !tree.keyword_exists("policyName") {
            return Handled::tree(tree);
        }
        // other bind types only exist for advanced policies
        if tree
            .keyword_value("type")
            .is_some_and(|t| !t.eq_ignore_ascii_case("REQUEST"))
        {
            return Handled::tree(tree);
        }
        let Some(vserver) = tree.positional_value(0).map(str::to_lowercase) else {
            return Handled::tree(tree);
        };
        self.hold(ctx, vserver, tree);
        Handled::suppressed()
    }

    fn hold_global_bind(&mut self, ctx: &ConversionContext, tree: CommandTree) -> Handled {
        if !self.classic_exists || !tree.keyword_exists("policyName") {
            return Handled::tree(tree);
        }
        if let Some(bind_type) = tree.keyword_value("type").map(str::to_ascii_uppercase) {
            if !GLOBAL_TYPES.contains(&bind_type.as_str()) {
                return Handled::tree(tree);
            }
            if bind_type.ends_with("_OVERRIDE") {
                self.global_override = true;
            }
        }
        self.hold(ctx, GLOBAL.to_string(), tree);
        Handled::suppressed()
    }

    fn hold(&mut self, ctx: &ConversionContext, bind_point: String, tree: CommandTree) {
        let classic = policy_name(&tree, "policyName")
            .is_some_and(|policy| ctx.policies.kind_of(&policy) == Some(PolicyKind::Classic));
        let point = self.bind_points.entry(bind_point).or_default();
        if classic {
            point.classic.push(tree);
            self.classic_bound = true;
        } else {
            point.advanced.push(tree);
            self.advanced_bound = true;
        }
    }

    fn is_control(&self, tree: &CommandTree) -> bool {
        policy_name(tree, "policyName").is_some_and(|p| self.control_policies.contains(&p))
    }

    fn goto_for(&self, tree: &CommandTree) -> &'static str {
        if self.is_control(tree) {
            "END"
        } else {
            "NEXT"
        }
    }

    fn global_type_for(&self, tree: &CommandTree, level: &str) -> String {
        let kind = if self.is_control(tree) { "CONTROL" } else { "DATA" };
        format!("{kind}_{level}")
    }

    /// Only classic policies are bound: number each bind point from 100 and
    /// let every policy fall through to the next.
    fn renumber_classic_only(&self, bind_points: IndexMap<String, BindPoint>) -> Vec<Output> {
        let mut out = Vec::new();
        for (bind_point, point) in bind_points {
            let mut priority = 100;
            for mut tree in point.classic {
                tree.set_arg(&ArgRef::keyword("priority"), priority.to_string());
                priority += 100;
                tree.set_arg(
                    &ArgRef::keyword("gotoPriorityExpression"),
                    self.goto_for(&tree),
                );
                if bind_point == GLOBAL {
                    let bind_type = self.global_type_for(&tree, "DEFAULT");
                    tree.set_arg(&ArgRef::keyword("type"), bind_type);
                }
                out.push(Output::Tree(tree));
            }
        }
        out
    }

    fn convert_mixed(
        &self,
        ctx: &mut ConversionContext,
        bind_points: IndexMap<String, BindPoint>,
    ) -> Result<Vec<Output>, ConvertError> {
        let only_global = bind_points.keys().all(|k| k == GLOBAL);
        let vservers: Vec<&String> = bind_points.keys().filter(|k| *k != GLOBAL).collect();
        let one_ssl_kind = !vservers.is_empty()
            && SSL_VSERVER_KINDS
                .iter()
                .any(|kind| vservers.iter().all(|v| ctx.vservers.is_ssl(*kind, v)));
        let only_vservers = one_ssl_kind && !bind_points.contains_key(GLOBAL);
        let classic_vservers_with_global_default = one_ssl_kind
            && !self.global_override
            && bind_points
                .iter()
                .filter(|(k, _)| *k != GLOBAL)
                .all(|(_, point)| point.advanced.is_empty());

        let mut out = Vec::new();
        if only_global {
            debug!("ssl: classic and advanced global binds");
            let level = if self.global_override {
                "OVERRIDE"
            } else {
                "DEFAULT"
            };
            for point in bind_points.into_values() {
                for mut tree in point.classic {
                    let bind_type = self.global_type_for(&tree, level);
                    tree.set_arg(&ArgRef::keyword("type"), bind_type);
                    self.defer_global(ctx, tree, Position::Before)?;
                }
                for tree in point.advanced {
                    self.defer_global(ctx, tree, Position::Inplace)?;
                }
            }
        } else if only_vservers {
            debug!("ssl: classic and advanced vserver binds");
            for point in bind_points.into_values() {
                let classic_count = point.classic.len();
                for tree in point.classic {
                    self.defer_entity(ctx, tree, false)?;
                }
                for tree in point.advanced {
                    if classic_count == 0 {
                        out.push(Output::Tree(tree));
                    } else {
                        self.defer_entity(ctx, tree, true)?;
                    }
                }
            }
        } else if classic_vservers_with_global_default {
            debug!("ssl: classic vserver binds with global default binds");
            let mut global = None;
            for (bind_point, point) in bind_points {
                if bind_point == GLOBAL {
                    global = Some(point);
                    continue;
                }
                for tree in point.classic {
                    self.defer_entity(ctx, tree, false)?;
                }
            }
            if let Some(point) = global {
                for mut tree in point.classic {
                    let bind_type = self.global_type_for(&tree, "DEFAULT");
                    tree.set_arg(&ArgRef::keyword("type"), bind_type);
                    self.defer_global(ctx, tree, Position::Inplace)?;
                }
                for tree in point.advanced {
                    self.defer_global(ctx, tree, Position::Inplace)?;
                }
            }
        } else {
            for point in bind_points.into_values() {
                for tree in point.classic {
                    ctx.diagnostics.error(
                        codes::MIXED_SSL_BINDS,
                        tree.lineno,
                        format!(
                            "Conversion is not supported when both classic and advanced SSL policies are bound: [{tree}]"
                        ),
                    );
                    out.push(Output::Commented(tree));
                }
                out.extend(point.advanced.into_iter().map(Output::Tree));
            }
        }
        Ok(out)
    }

    fn defaults_for(&self, tree: &CommandTree, advanced: bool) -> BindDefaults {
        BindDefaults {
            goto: Some(if advanced { "END" } else { self.goto_for(tree) }),
            flow: None,
        }
    }

    fn defer_global(
        &self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
        position: Position,
    ) -> Result<(), ConvertError> {
        let advanced = position != Position::Before;
        let defaults = self.defaults_for(&tree, advanced);
        let Some(policy) = policy_name(&tree, "policyName") else {
            return Ok(());
        };
        tree.remove_keyword("priority");
        ctx.convert_global_bind(
            tree,
            &policy,
            ModuleId::Ssl,
            defaults,
            BindSlots::keywords(),
            position,
        )
    }

    fn defer_entity(
        &self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
        advanced: bool,
    ) -> Result<(), ConvertError> {
        let defaults = self.defaults_for(&tree, advanced);
        let Some(policy) = policy_name(&tree, "policyName") else {
            return Ok(());
        };
        tree.remove_keyword("priority");
        ctx.convert_entity_bind(tree, &policy, ModuleId::Ssl, defaults, BindSlots::keywords())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::convert_str;

    const POLICIES: &str = "add ssl action act_auth -clientAuth DOCLIENTAUTH\n\
                            add ssl policy classic1 -rule \"REQ.HTTP.URL == /a\" -action act_auth\n\
                            add ssl policy classic2 -rule \"REQ.HTTP.URL == /b\" -action act_other\n\
                            add ssl policy adv1 -rule HTTP.REQ.IS_VALID -action act_other\n";

    fn binds(lines: &[String]) -> Vec<&str> {
        lines
            .iter()
            .map(String::as_str)
            .filter(|l| l.starts_with("bind"))
            .collect()
    }

    #[test]
    fn classic_only_binds_are_renumbered_with_fallthrough() {
        let input = format!(
            "{POLICIES}bind ssl vserver v1 -policyName classic2 -priority 5\n\
             bind ssl vserver v1 -policyName classic1 -priority 1\n\
             bind ssl global -policyName classic2 -priority 3\n"
        );
        let outcome = convert_str(&input).expect("convert");
        assert_eq!(
            binds(&outcome.lines),
            vec![
                "bind ssl vserver v1 -policyName classic2 -priority 100 -gotoPriorityExpression NEXT",
                "bind ssl vserver v1 -policyName classic1 -priority 200 -gotoPriorityExpression END",
                "bind ssl global -policyName classic2 -priority 100 -gotoPriorityExpression NEXT -type DATA_DEFAULT",
            ]
        );
    }

    #[test]
    fn mixed_global_binds_put_classic_first() {
        let input = format!(
            "{POLICIES}bind ssl global -policyName adv1 -priority 1 -type DATA_DEFAULT\n\
             bind ssl global -policyName classic2 -priority 10 -type DATA_DEFAULT\n"
        );
        let outcome = convert_str(&input).expect("convert");
        assert_eq!(
            binds(&outcome.lines),
            vec![
                "bind ssl global -policyName classic2 -type DATA_DEFAULT -priority 100 -gotoPriorityExpression NEXT",
                "bind ssl global -policyName adv1 -type DATA_DEFAULT -priority 200 -gotoPriorityExpression END",
            ]
        );
    }

    #[test]
    fn mixed_binds_on_unknown_vservers_are_commented_out() {
        let input = format!(
            "{POLICIES}bind ssl vserver v1 -policyName classic2 -priority 10\n\
             bind ssl vserver v1 -policyName adv1 -priority 20\n"
        );
        let outcome = convert_str(&input).expect("convert");
        assert_eq!(
            binds(&outcome.lines),
            vec!["bind ssl vserver v1 -policyName adv1 -priority 20"]
        );
        assert!(outcome
            .lines
            .contains(&"# bind ssl vserver v1 -policyName classic2 -priority 10".to_string()));
        assert!(outcome
            .diagnostics
            .iter()
            .any(|d| d.code == "mixed_ssl_binds"));
    }

    #[test]
    fn mixed_binds_on_one_ssl_vserver_kind_are_merged() {
        let input = format!(
            "add lb vserver v1 SSL 10.0.0.1 443\n{POLICIES}\
             bind ssl vserver v1 -policyName classic2 -priority 10\n\
             bind ssl vserver v1 -policyName adv1 -priority 20\n"
        );
        let outcome = convert_str(&input).expect("convert");
        assert_eq!(
            binds(&outcome.lines),
            vec![
                "bind ssl vserver v1 -policyName classic2 -priority 100 -gotoPriorityExpression NEXT",
                "bind ssl vserver v1 -policyName adv1 -priority 200 -gotoPriorityExpression END",
            ]
        );
    }
}
