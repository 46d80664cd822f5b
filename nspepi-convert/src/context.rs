use std::collections::{HashMap, HashSet};

use ns_config_core::{ArgRef, CommandTree};
use tracing::debug;

use crate::binds::{normalize_bind_type, BindCollector, BindDefaults, BindInfo, BindSlots, Position};
use crate::builtins::BuiltinTables;
use crate::diagnostics::{codes, Diagnostics};
use crate::error::ConvertError;
use crate::expr::{ExprTranslator, ExpressionRegistry, RewriteOutcome, Rewriter};
use crate::modules::ModuleId;
use crate::policy::{Bind, EntityKind, PolicyRegistry};

/// Kinds of virtual server whose protocol the converter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VserverKind {
    Lb,
    Cs,
    Cr,
    Gslb,
    Vpn,
    Authentication,
}

/// Protocols and flags recorded from `add ... vserver` commands.
#[derive(Debug, Default)]
pub struct VserverRegistry {
    protocols: HashMap<String, String>,
    ssl: HashSet<(VserverKind, String)>,
    url_precedence: HashSet<(VserverKind, String)>,
}

impl VserverRegistry {
    pub fn record(&mut self, kind: VserverKind, name: &str, protocol: &str) {
        let name = name.to_lowercase();
        let protocol = protocol.to_uppercase();
        if protocol == "SSL" {
            self.ssl.insert((kind, name.clone()));
        }
        self.protocols.insert(name, protocol);
    }

    /// Uppercased protocol of any recorded vserver.
    pub fn protocol(&self, name: &str) -> Option<&str> {
        self.protocols.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_ssl(&self, kind: VserverKind, name: &str) -> bool {
        self.ssl.contains(&(kind, name.to_lowercase()))
    }

    /// The vserver evaluates URL policies before rule policies.
    pub fn set_url_precedence(&mut self, kind: VserverKind, name: &str) {
        self.url_precedence.insert((kind, name.to_lowercase()));
    }

    pub fn has_url_precedence(&self, kind: VserverKind, name: &str) -> bool {
        self.url_precedence.contains(&(kind, name.to_lowercase()))
    }
}

/// State shared by every module during one conversion run.
pub struct ConversionContext {
    pub expressions: ExpressionRegistry,
    pub policies: PolicyRegistry,
    pub binds: BindCollector,
    pub vservers: VserverRegistry,
    pub diagnostics: Diagnostics,
    translator: Box<dyn ExprTranslator>,
}

impl ConversionContext {
    pub fn new(builtins: &BuiltinTables, translator: Box<dyn ExprTranslator>) -> Self {
        Self {
            expressions: ExpressionRegistry::new(builtins),
            policies: PolicyRegistry::default(),
            binds: BindCollector::default(),
            vservers: VserverRegistry::default(),
            diagnostics: Diagnostics::default(),
            translator,
        }
    }

    pub fn rewriter(&self) -> Rewriter<'_> {
        Rewriter::new(&self.expressions, self.translator.as_ref())
    }

    /// Rewrite classic text, `None` when it cannot be converted.
    pub fn rewrite(&self, expr: &str) -> Option<String> {
        self.rewriter().rewrite(expr, false)
    }

    pub fn report_conversion_failure(&mut self, tree: &CommandTree) {
        self.diagnostics.error(
            codes::CONVERSION_FAILED,
            tree.lineno,
            format!("Error in converting command : {tree}"),
        );
    }

    /// Convert the expression in `slot` in place.
    ///
    /// A classic expression is rewritten and the tree marked `upgraded`; an
    /// advanced one only gets its advanced cleanup. Unconvertible text is
    /// reported and left alone. Returns the classic names the rewritten
    /// expression references.
    pub fn convert_expression(
        &mut self,
        tree: &mut CommandTree,
        slot: &ArgRef,
        ignore_security: bool,
    ) -> Vec<String> {
        let Some(expr) = tree.arg(slot).map(str::to_string) else {
            return Vec::new();
        };

        let outcome = self.rewriter().rewrite_detailed(&expr, ignore_security);
        match outcome {
            RewriteOutcome::SecurityReference(names) => {
                for name in names {
                    self.report_security(&name, tree.lineno);
                }
                self.report_conversion_failure(tree);
                Vec::new()
            }
            RewriteOutcome::Unresolved => {
                self.report_conversion_failure(tree);
                Vec::new()
            }
            RewriteOutcome::SecurityExpression => {
                tree.has_security_expr = true;
                Vec::new()
            }
            RewriteOutcome::Rewritten { text, references } if text != expr => {
                tree.replace_arg(slot, text);
                tree.set_upgraded();
                references
            }
            RewriteOutcome::Rewritten { .. } => {
                *tree = self.convert_advanced_slots(tree.clone(), std::slice::from_ref(slot));
                Vec::new()
            }
        }
    }

    /// Collect pass: mark the classic named expressions a policy rule
    /// references as in use, so advanced copies get written for them.
    pub fn mark_rule_references(&mut self, tree: &CommandTree, slot: &ArgRef) {
        let mut probe = tree.clone();
        let references = self.convert_expression(&mut probe, slot, false);
        if probe.upgraded {
            self.expressions.mark_in_use(references);
        }
    }

    fn report_security(&mut self, name: &str, lineno: usize) {
        if self.diagnostics.is_muted() {
            return;
        }
        if let Some(command) = self.expressions.take_unreported_security(name) {
            self.diagnostics.error(
                codes::SECURITY_EXPRESSION,
                lineno,
                format!(
                    "Conversion of clientSecurityMessage based expression [{command}] is not supported, please do the conversion manually."
                ),
            );
        }
    }

    /// Clean up advanced expressions in `slots`. On failure the command is
    /// reported and returned unchanged.
    pub fn convert_advanced_slots(&mut self, tree: CommandTree, slots: &[ArgRef]) -> CommandTree {
        let original = tree.clone();
        let mut tree = tree;
        for slot in slots {
            let Some(expr) = tree.arg(slot).map(str::to_string) else {
                continue;
            };
            let converted = self.rewriter().rewrite_advanced(&expr);
            match converted {
                None => {
                    self.report_conversion_failure(&original);
                    return original;
                }
                Some(converted) if converted != expr => {
                    tree.replace_arg(slot, converted);
                    tree.adv_upgraded = true;
                }
                Some(_) => {}
            }
        }
        tree
    }

    /// Priority, goto and normalized bind type of a bind. A missing priority
    /// is written as 0 and a missing goto as `default_goto`.
    pub fn bind_common_info(
        &self,
        tree: &mut CommandTree,
        slots: &BindSlots,
        default_goto: Option<&str>,
    ) -> Result<(u32, Option<String>, Option<String>), ConvertError> {
        let priority = match tree.arg(&slots.priority) {
            Some(value) => value
                .parse::<u32>()
                .map_err(|_| ConvertError::InvalidPriority {
                    lineno: tree.lineno,
                    value: value.to_string(),
                })?,
            None => {
                tree.set_arg(&slots.priority, "0");
                0
            }
        };
        let goto = match tree.arg(&slots.goto) {
            Some(goto) => Some(goto.to_string()),
            None => default_goto.map(|goto| {
                tree.set_arg(&slots.goto, goto);
                goto.to_string()
            }),
        };
        let bind_type = tree.keyword_value("type").map(normalize_bind_type);
        Ok((priority, goto, bind_type))
    }

    /// Defer a global bind.
    pub fn convert_global_bind(
        &mut self,
        mut tree: CommandTree,
        policy: &str,
        module: ModuleId,
        defaults: BindDefaults,
        slots: BindSlots,
        position: Position,
    ) -> Result<(), ConvertError> {
        let (priority, goto, bind_type) = self.bind_common_info(&mut tree, &slots, defaults.goto)?;
        let bind_type = bind_type.unwrap_or_default();
        self.policies.store_original_bind(Bind {
            entity: EntityKind::Global,
            entity_name: None,
            policy: policy.to_lowercase(),
            module,
            bind_type: bind_type.clone(),
            priority,
            original_line: tree.original_line.clone(),
        });
        debug!(module = %module, policy, priority, "deferred global bind");

        let info = self.bind_info(tree, policy, priority, goto, slots, position, defaults);
        self.binds
            .save_global(module, &bind_type.to_lowercase(), info);
        Ok(())
    }

    /// Defer a bind to a vserver, user, group or service.
    pub fn convert_entity_bind(
        &mut self,
        mut tree: CommandTree,
        policy: &str,
        module: ModuleId,
        defaults: BindDefaults,
        slots: BindSlots,
    ) -> Result<(), ConvertError> {
        let entity = match EntityKind::from_object_type(tree.object_type()) {
            Some(EntityKind::Global) | None => {
                return Err(ConvertError::structural(
                    tree.lineno,
                    format!("cannot bind to {}: {tree}", tree.object_type()),
                ))
            }
            Some(entity) => entity,
        };
        let subtype = tree.group().to_lowercase();
        let name = tree
            .positional_value(0)
            .ok_or_else(|| ConvertError::structural(tree.lineno, format!("missing bind target: {tree}")))?
            .to_string();

        let (priority, goto, bind_type) = self.bind_common_info(&mut tree, &slots, defaults.goto)?;
        let bind_type = bind_type.unwrap_or_default();
        self.policies.store_original_bind(Bind {
            entity,
            entity_name: Some(name.clone()),
            policy: policy.to_lowercase(),
            module,
            bind_type: bind_type.clone(),
            priority,
            original_line: tree.original_line.clone(),
        });
        debug!(module = %module, policy, entity = %name, priority, "deferred bind");

        let info = self.bind_info(tree, policy, priority, goto, slots, Position::Inplace, defaults);
        self.binds.save_entity(
            entity,
            &subtype,
            &name,
            module,
            &bind_type.to_lowercase(),
            info,
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_info(
        &self,
        tree: CommandTree,
        policy: &str,
        priority: u32,
        goto: Option<String>,
        slots: BindSlots,
        position: Position,
        defaults: BindDefaults,
    ) -> BindInfo {
        BindInfo {
            original_line: tree.original_line.clone(),
            tree,
            position,
            priority,
            goto,
            slots,
            policy_kind: self.policies.kind_of(policy),
            flow: defaults.flow,
        }
    }
}

#[cfg(test)]
mod tests {
    use ns_config_core::{parse_line, ArgRef};

    use super::{ConversionContext, VserverKind};
    use crate::binds::{BindDefaults, BindSlots};
    use crate::builtins::default_builtins;
    use crate::error::ConvertError;
    use crate::expr::RuleTranslator;
    use crate::modules::ModuleId;

    fn context() -> ConversionContext {
        ConversionContext::new(
            &default_builtins(),
            Box::new(RuleTranslator::new().expect("patterns")),
        )
    }

    #[test]
    fn classic_expression_marks_tree_upgraded() {
        let mut ctx = context();
        let mut tree = parse_line(r#"add cs policy p1 -rule "REQ.HTTP.URL == /a""#, 1)
            .expect("parse")
            .expect("command");
        ctx.convert_expression(&mut tree, &ArgRef::keyword("rule"), false);
        assert!(tree.upgraded);
        assert_eq!(tree.keyword_value("rule"), Some(r#"HTTP.REQ.URL.EQ("/a")"#));
    }

    #[test]
    fn advanced_expression_gets_cleanup_only() {
        let mut ctx = context();
        let mut tree = parse_line(r#"add cs policy p1 -rule "Q.URL.EQ(\"/a\")""#, 1)
            .expect("parse")
            .expect("command");
        ctx.convert_expression(&mut tree, &ArgRef::keyword("rule"), false);
        assert!(!tree.upgraded);
        assert!(tree.adv_upgraded);
        assert_eq!(tree.keyword_value("rule"), Some(r#"HTTP.REQ.URL.EQ("/a")"#));
    }

    #[test]
    fn failures_are_reported_and_left_alone() {
        let mut ctx = context();
        let mut tree = parse_line("add cs policy p1 -rule \"REQ.HTTP.NOPE == 1\"", 4)
            .expect("parse")
            .expect("command");
        ctx.convert_expression(&mut tree, &ArgRef::keyword("rule"), false);
        assert!(!tree.is_modified());
        assert_eq!(ctx.diagnostics.entries()[0].lineno, 4);
    }

    #[test]
    fn bind_without_priority_gets_zero_and_default_goto() {
        let ctx = context();
        let mut tree = parse_line("bind lb vserver v1 -policyName p1", 1)
            .expect("parse")
            .expect("command");
        let (priority, goto, bind_type) = ctx
            .bind_common_info(&mut tree, &BindSlots::keywords(), Some("END"))
            .expect("info");
        assert_eq!(priority, 0);
        assert_eq!(goto.as_deref(), Some("END"));
        assert_eq!(bind_type, None);
        assert_eq!(
            tree.to_string(),
            "bind lb vserver v1 -policyName p1 -priority 0 -gotoPriorityExpression END"
        );
    }

    #[test]
    fn non_numeric_priority_is_fatal() {
        let ctx = context();
        let mut tree = parse_line("bind lb vserver v1 -policyName p1 -priority high", 2)
            .expect("parse")
            .expect("command");
        let err = ctx
            .bind_common_info(&mut tree, &BindSlots::keywords(), None)
            .expect_err("must fail");
        assert!(matches!(err, ConvertError::InvalidPriority { lineno: 2, .. }));
    }

    #[test]
    fn entity_bind_rejects_unknown_entities() {
        let mut ctx = context();
        let tree = parse_line("bind lb monitor m1 -policyName p1", 1)
            .expect("parse")
            .expect("command");
        let err = ctx
            .convert_entity_bind(
                tree,
                "p1",
                ModuleId::Rewrite,
                BindDefaults::default(),
                BindSlots::keywords(),
            )
            .expect_err("must fail");
        assert!(matches!(err, ConvertError::Structural { .. }));
    }

    #[test]
    fn vserver_registry_tracks_ssl() {
        let mut ctx = context();
        ctx.vservers.record(VserverKind::Lb, "Web", "ssl");
        assert_eq!(ctx.vservers.protocol("web"), Some("SSL"));
        assert!(ctx.vservers.is_ssl(VserverKind::Lb, "WEB"));
        assert!(!ctx.vservers.is_ssl(VserverKind::Cs, "web"));
    }
}
