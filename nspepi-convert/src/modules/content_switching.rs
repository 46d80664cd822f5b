use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use ns_config_core::{ArgRef, CommandTree};
use tracing::debug;

use super::cs_precedence::{
    convert_url, hostname_rule, precedence_bucket, shape_slot, NameShortener, PolicyShape,
    BUCKETS, URL_SHAPES,
};
use super::{policy_name, BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::binds::{BindDefaults, BindSlots, FlowDirection};
use crate::context::{ConversionContext, VserverKind};
use crate::error::ConvertError;
use crate::output::Output;
use crate::policy::PolicyKind;

const RULE: &str = "rule";

/// How a classic policy is bound across the configuration.
#[derive(Debug, Clone)]
struct Bindings {
    target: String,
    case_insensitive: bool,
    multiple: bool,
    multiple_targets: bool,
    mixed_case: bool,
}

/// A classic CS policy held back until every bind has been seen.
#[derive(Debug)]
struct HeldPolicy {
    tree: CommandTree,
    /// The converted policy before any bind touched `tree`; split copies
    /// start from here.
    base: CommandTree,
    shape: PolicyShape,
    /// Rule for vservers with `-caseSensitive OFF`.
    case_insensitive_rule: Option<String>,
    bindings: Option<Bindings>,
}

/// A bind of a held policy, waiting for the final call.
#[derive(Debug)]
struct HeldBind {
    tree: CommandTree,
    policy: String,
    target: String,
    on_cs: bool,
}

enum PolicyOut {
    Held(String),
    Synthesized(CommandTree),
}

type Buckets = [[Vec<(CommandTree, String)>; URL_SHAPES]; BUCKETS];

/// Content switching vservers, policies and binds.
///
/// Classic CS policies have no action: the target LB vserver is named by
/// the bind. Advanced policies must carry an action and can only have one
/// bind point without one, so policies bound more than once get a
/// synthesized `nspepi_adv_cs_act_<target>` action, and policies bound to
/// several targets get one `nspepi_adv_<policy>_<target>` copy per target.
#[derive(Debug, Default)]
pub struct ContentSwitching {
    classic_exists: bool,
    case_insensitive_vservers: HashSet<String>,
    policies: IndexMap<String, HeldPolicy>,
    /// Keyed by the lowercased CS or CR vserver name.
    binds: IndexMap<String, Vec<HeldBind>>,
}

impl FeatureModule for ContentSwitching {
    fn id(&self) -> ModuleId {
        ModuleId::ContentSwitching
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add cs vserver", "add cs policy", "bind cs vserver"]
    }

    fn bind_categories(&self) -> &'static [BindCategory] {
        &[BindCategory::CacheRedirection]
    }

    fn bind_defaults(&self) -> BindDefaults {
        BindDefaults {
            goto: None,
            flow: Some(FlowDirection::Request),
        }
    }

    fn collect(
        &mut self,
        ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        if tree.key() == "add cs policy" && tree.keyword_exists(RULE) {
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
            "add cs vserver" => Ok(Handled::tree(self.convert_vserver(ctx, tree))),
            "add cs policy" => Ok(self.convert_policy(ctx, tree)),
            _ => self.route_bind(ctx, tree),
        }
    }

    /// A CS policy bound to a CR vserver: `bind cr vserver <cr> -policyName
    /// <policy> <target>`.
    fn convert_bind(
        &mut self,
        ctx: &mut ConversionContext,
        request: BindRequest,
    ) -> Result<Vec<Output>, ConvertError> {
        if !self.classic_exists {
            return Ok(vec![Output::Tree(request.tree)]);
        }
        let target = request
            .tree
            .keyword_values("policyName")
            .get(1)
            .map(|v| v.text.clone());
        match target {
            Some(target) if self.policies.contains_key(&request.policy) => {
                self.hold_bind(request.tree, request.policy, target, false, false);
            }
            _ => self.defer(ctx, request.tree, &request.policy)?,
        }
        Ok(Vec::new())
    }

    fn final_call(&mut self, ctx: &mut ConversionContext) -> Result<Vec<Output>, ConvertError> {
        let mut actions: Vec<CommandTree> = Vec::new();
        let mut added_actions: IndexSet<String> = IndexSet::new();
        let mut added_policies: IndexSet<String> = IndexSet::new();
        let mut policy_out: Vec<PolicyOut> = Vec::new();
        let mut used: IndexSet<String> = IndexSet::new();
        let mut action_names = NameShortener::default();
        let mut policy_names = NameShortener::default();
        let mut buckets: IndexMap<String, Buckets> = IndexMap::new();

        for (vserver, held) in std::mem::take(&mut self.binds) {
            for HeldBind {
                mut tree,
                policy,
                target,
                on_cs,
            } in held
            {
                let Some(held_policy) = self.policies.get_mut(&policy) else {
                    continue;
                };
                used.insert(policy.clone());
                let Some(bindings) = held_policy.bindings.clone() else {
                    continue;
                };

                let set_ci = on_cs
                    && self.case_insensitive_vservers.contains(&vserver)
                    && held_policy.case_insensitive_rule.is_some();
                let need_action = bindings.multiple;
                let need_policy =
                    need_action && (bindings.multiple_targets || (bindings.mixed_case && set_ci));

                let mut action_name = String::new();
                if need_action {
                    let full = format!("nspepi_adv_cs_act_{target}");
                    action_name = action_names.name_for(&full);
                    if added_actions.insert(full) {
                        let mut action = CommandTree::new("add", "cs", "action");
                        action.add_positional(action_name.clone());
                        action.add_keyword("targetLBVserver", [target.clone()]);
                        actions.push(action);
                    }
                }

                if need_policy {
                    let display = tree
                        .keyword_value("policyName")
                        .unwrap_or(policy.as_str())
                        .to_string();
                    let mut full = format!("nspepi_adv_{display}_{target}");
                    if set_ci {
                        full.push_str("_ci");
                    }
                    let new_name = policy_names.name_for(&full);
                    if added_policies.insert(full) {
                        let mut copy = held_policy.base.clone();
                        copy.set_arg(&ArgRef::Positional(0), new_name.clone());
                        if set_ci {
                            if let Some(rule) = &held_policy.case_insensitive_rule {
                                copy.set_arg(&ArgRef::keyword(RULE), rule.clone());
                            }
                        }
                        copy.set_arg(&ArgRef::keyword("action"), action_name.clone());
                        copy.remove_keyword("devno");
                        policy_out.push(PolicyOut::Synthesized(copy));
                    }
                    tree.set_arg(&ArgRef::keyword("policyName"), new_name);
                } else {
                    if set_ci {
                        if let Some(rule) = held_policy.case_insensitive_rule.clone() {
                            held_policy.tree.set_arg(&ArgRef::keyword(RULE), rule);
                        }
                    }
                    if need_action {
                        held_policy
                            .tree
                            .set_arg(&ArgRef::keyword("action"), action_name.clone());
                    }
                    if !policy_out
                        .iter()
                        .any(|out| matches!(out, PolicyOut::Held(name) if *name == policy))
                    {
                        policy_out.push(PolicyOut::Held(policy.clone()));
                    }
                }

                if need_action {
                    if on_cs {
                        if tree.remove_keyword("targetLBVserver").is_none() {
                            tree.remove_positional(1);
                        }
                    } else {
                        tree.remove_keyword_value("policyName", 1);
                    }
                }

                let url_first = if on_cs {
                    ctx.vservers.has_url_precedence(VserverKind::Cs, &vserver)
                } else {
                    ctx.vservers.has_url_precedence(VserverKind::Cr, &vserver)
                };
                let shape = held_policy.shape;
                buckets.entry(vserver.clone()).or_default()
                    [precedence_bucket(shape, url_first)][shape_slot(shape)]
                    .push((tree, policy));
            }
        }

        for name in self.policies.keys() {
            if !used.contains(name) {
                policy_out.push(PolicyOut::Held(name.clone()));
            }
        }

        for vserver_buckets in buckets.into_values() {
            for (tree, policy) in vserver_buckets.into_iter().flatten().flatten() {
                self.defer(ctx, tree, &policy)?;
            }
        }
        debug!(
            actions = actions.len(),
            policies = policy_out.len(),
            "content switching policies resolved"
        );

        let mut out: Vec<Output> = actions.into_iter().map(Output::Tree).collect();
        for entry in policy_out {
            let tree = match entry {
                PolicyOut::Synthesized(tree) => tree,
                PolicyOut::Held(name) => match self.policies.get(&name) {
                    Some(held) => held.tree.clone(),
                    None => continue,
                },
            };
            out.push(Output::Tree(tree));
        }
        Ok(out)
    }
}

impl ContentSwitching {
    fn convert_vserver(&mut self, ctx: &mut ConversionContext, mut tree: CommandTree) -> CommandTree {
        let protocol = tree
            .keyword_values("td")
            .get(1)
            .map(|v| v.text.clone())
            .or_else(|| tree.positional_value(1).map(str::to_string));
        if let Some(name) = tree.positional_value(0).map(str::to_lowercase) {
            if let Some(protocol) = protocol {
                ctx.vservers.record(VserverKind::Cs, &name, &protocol);
            }
            // neither setting exists for advanced policies
            if tree.remove_keyword("caseSensitive").is_some() {
                self.case_insensitive_vservers.insert(name.clone());
            }
            if tree.remove_keyword("precedence").is_some() {
                ctx.vservers.set_url_precedence(VserverKind::Cs, &name);
            }
        }
        ctx.convert_advanced_slots(
            tree,
            &[ArgRef::keyword("Listenpolicy"), ArgRef::keyword("pushLabel")],
        )
    }

    fn convert_policy(&mut self, ctx: &mut ConversionContext, mut tree: CommandTree) -> Handled {
        let Some(name) = tree.positional_value(0).map(str::to_lowercase) else {
            return Handled::tree(tree);
        };
        ctx.policies.store(&name, ModuleId::ContentSwitching, None);

        if tree.keyword_exists("action") {
            ctx.policies.classify(&name, PolicyKind::Advanced);
            return Handled::tree(ctx.convert_advanced_slots(tree, &[ArgRef::keyword(RULE)]));
        }

        let domain = tree.keyword_value("domain").map(str::to_string);
        let mut shape = PolicyShape {
            domain: domain.is_some(),
            ..PolicyShape::default()
        };
        let mut case_insensitive_rule = None;

        if let Some(rule) = tree.keyword_value(RULE).map(str::to_string) {
            shape.rule = true;
            match &domain {
                Some(domain) => {
                    let Some(converted) = ctx.rewrite(&rule) else {
                        ctx.report_conversion_failure(&tree);
                        return Handled::tree(tree);
                    };
                    tree.remove_keyword("domain");
                    tree.replace_arg(
                        &ArgRef::keyword(RULE),
                        format!("({converted}) && {}", hostname_rule(domain)),
                    );
                    tree.set_upgraded();
                }
                None => {
                    ctx.convert_expression(&mut tree, &ArgRef::keyword(RULE), false);
                }
            }
        } else if let Some(url) = tree.keyword_value("url").map(str::to_string) {
            let converted = convert_url(&url, domain.as_deref());
            shape.url = Some(converted.shape);
            case_insensitive_rule = converted.case_insensitive;
            tree.remove_keyword("domain");
            tree.remove_keyword("url");
            tree.add_keyword(RULE, [converted.expr]);
        } else if let Some(domain) = &domain {
            let rule = hostname_rule(domain);
            tree.remove_keyword("domain");
            tree.add_keyword(RULE, [rule]);
        }

        if !tree.upgraded {
            ctx.policies.classify(&name, PolicyKind::Advanced);
            return Handled::tree(tree);
        }
        ctx.policies.classify(&name, PolicyKind::Classic);
        self.classic_exists = true;
        self.policies.insert(
            name,
            HeldPolicy {
                base: tree.clone(),
                tree,
                shape,
                case_insensitive_rule,
                bindings: None,
            },
        );
        Handled::suppressed()
    }

    fn route_bind(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let Some(policy) = policy_name(&tree, "policyName") else {
            return Ok(Handled::tree(tree));
        };
        let owner = ctx.policies.get_policy(&policy)?.module;
        if owner != ModuleId::ContentSwitching {
            return Ok(Handled::Delegate(BindRequest {
                category: BindCategory::ContentSwitching,
                owner,
                policy,
                tree,
            }));
        }
        if !self.classic_exists {
            return Ok(Handled::tree(tree));
        }

        let target = tree
            .keyword_value("targetLBVserver")
            .or_else(|| tree.positional_value(1))
            .map(str::to_string);
        match target {
            Some(target) if self.policies.contains_key(&policy) => {
                let case_insensitive = tree
                    .positional_value(0)
                    .is_some_and(|cs| self.case_insensitive_vservers.contains(&cs.to_lowercase()));
                self.hold_bind(tree, policy, target, true, case_insensitive);
            }
            _ => self.defer(ctx, tree, &policy)?,
        }
        Ok(Handled::suppressed())
    }

    fn hold_bind(
        &mut self,
        tree: CommandTree,
        policy: String,
        target: String,
        on_cs: bool,
        case_insensitive: bool,
    ) {
        let Some(vserver) = tree.positional_value(0).map(str::to_lowercase) else {
            return;
        };
        if let Some(held) = self.policies.get_mut(&policy) {
            match &mut held.bindings {
                None => {
                    held.bindings = Some(Bindings {
                        target: target.clone(),
                        case_insensitive,
                        multiple: false,
                        multiple_targets: false,
                        mixed_case: false,
                    });
                }
                Some(bindings) => {
                    bindings.multiple = true;
                    if bindings.target != target {
                        bindings.multiple_targets = true;
                    }
                    if on_cs && bindings.case_insensitive != case_insensitive {
                        bindings.mixed_case = true;
                    }
                }
            }
        }
        self.binds.entry(vserver).or_default().push(HeldBind {
            tree,
            policy,
            target,
            on_cs,
        });
    }

    fn defer(
        &self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
        policy: &str,
    ) -> Result<(), ConvertError> {
        ctx.convert_entity_bind(
            tree,
            policy,
            ModuleId::ContentSwitching,
            self.bind_defaults(),
            BindSlots::keywords(),
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::convert_str;

    #[test]
    fn domain_policy_becomes_hostname_rule() {
        let input = "add cs vserver csv1 HTTP 10.0.0.1 80\n\
                     add cs policy p1 -domain example.com\n\
                     bind cs vserver csv1 lb1 -policyName p1 -priority 10\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(
            outcome.lines,
            vec![
                "add cs vserver csv1 HTTP 10.0.0.1 80",
                "add cs policy p1 -rule \"HTTP.REQ.HOSTNAME.EQ(\\\"example.com\\\")\"",
                "bind cs vserver csv1 lb1 -policyName p1 -priority 10 -type REQUEST",
            ]
        );
    }

    #[test]
    fn advanced_policies_pass_through() {
        let input = "add cs policy p1 -rule HTTP.REQ.IS_VALID -action act1\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(outcome.lines, vec!["add cs policy p1 -rule HTTP.REQ.IS_VALID -action act1"]);
    }

    #[test]
    fn unbound_classic_policies_are_still_written() {
        let outcome = convert_str("add cs policy p1 -url /a/b.html\n").expect("convert");
        assert_eq!(
            outcome.lines,
            vec!["add cs policy p1 -rule \"HTTP.REQ.URL.PATH.EQ(\\\"/a/b.html\\\")\""]
        );
    }

    #[test]
    fn rule_policies_are_evaluated_before_url_policies() {
        let input = "add cs vserver csv1 HTTP 10.0.0.1 80\n\
                     add cs policy purl -url /a/b.html\n\
                     add cs policy prule -rule \"REQ.HTTP.METHOD == GET\"\n\
                     bind cs vserver csv1 lb1 -policyName purl -priority 10\n\
                     bind cs vserver csv1 lb2 -policyName prule -priority 20\n";
        let outcome = convert_str(input).expect("convert");
        let binds: Vec<&String> = outcome
            .lines
            .iter()
            .filter(|l| l.starts_with("bind"))
            .collect();
        assert_eq!(
            binds,
            vec![
                "bind cs vserver csv1 lb2 -policyName prule -priority 100 -type REQUEST",
                "bind cs vserver csv1 lb1 -policyName purl -priority 200 -type REQUEST",
            ]
        );
    }

    const SENSITIVE_RULE: &str = "-rule \"HTTP.REQ.URL.PATH.STARTSWITH(\\\"/a/\\\")\"";
    const INSENSITIVE_RULE: &str =
        "-rule \"HTTP.REQ.URL.PATH.SET_TEXT_MODE(IGNORECASE).STARTSWITH(\\\"/a/\\\")\"";

    fn mixed_case_input(first: &str, second: &str) -> String {
        format!(
            "add cs vserver cs1 HTTP 10.0.0.1 80\n\
             add cs vserver cs2 HTTP 10.0.0.2 80 -caseSensitive OFF\n\
             add cs policy p1 -url /a/*\n\
             bind cs vserver {first} -policyName p1 -targetLBVserver lb1 -priority 10\n\
             bind cs vserver {second} -policyName p1 -targetLBVserver lb1 -priority 10\n"
        )
    }

    #[test]
    fn case_insensitive_copy_after_case_sensitive_bind() {
        let outcome = convert_str(&mixed_case_input("cs1", "cs2")).expect("convert");
        assert_eq!(
            outcome.lines,
            vec![
                "add cs vserver cs1 HTTP 10.0.0.1 80".to_string(),
                "add cs vserver cs2 HTTP 10.0.0.2 80".to_string(),
                "add cs action nspepi_adv_cs_act_lb1 -targetLBVserver lb1".to_string(),
                format!("add cs policy p1 {SENSITIVE_RULE} -action nspepi_adv_cs_act_lb1"),
                format!(
                    "add cs policy nspepi_adv_p1_lb1_ci {INSENSITIVE_RULE} -action nspepi_adv_cs_act_lb1"
                ),
                "bind cs vserver cs1 -policyName p1 -priority 10 -type REQUEST".to_string(),
                "bind cs vserver cs2 -policyName nspepi_adv_p1_lb1_ci -priority 10 -type REQUEST"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn case_insensitive_copy_before_case_sensitive_bind() {
        let outcome = convert_str(&mixed_case_input("cs2", "cs1")).expect("convert");
        assert_eq!(
            outcome.lines,
            vec![
                "add cs vserver cs1 HTTP 10.0.0.1 80".to_string(),
                "add cs vserver cs2 HTTP 10.0.0.2 80".to_string(),
                "add cs action nspepi_adv_cs_act_lb1 -targetLBVserver lb1".to_string(),
                format!(
                    "add cs policy nspepi_adv_p1_lb1_ci {INSENSITIVE_RULE} -action nspepi_adv_cs_act_lb1"
                ),
                format!("add cs policy p1 {SENSITIVE_RULE} -action nspepi_adv_cs_act_lb1"),
                "bind cs vserver cs2 -policyName nspepi_adv_p1_lb1_ci -priority 10 -type REQUEST"
                    .to_string(),
                "bind cs vserver cs1 -policyName p1 -priority 10 -type REQUEST".to_string(),
            ]
        );
    }
}
