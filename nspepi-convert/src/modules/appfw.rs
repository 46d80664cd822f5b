use ns_config_core::{ArgRef, CommandTree};

use super::{BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::binds::{BindSlots, Position};
use crate::context::ConversionContext;
use crate::diagnostics::codes;
use crate::error::ConvertError;
use crate::output::Output;
use crate::policy::PolicyKind;

const RULE: ArgRef = ArgRef::Positional(1);

/// Application firewall policies. Binds are only rewritten once a classic
/// policy has been seen.
#[derive(Debug, Default)]
pub struct AppFw {
    classic_exists: bool,
}

impl FeatureModule for AppFw {
    fn id(&self) -> ModuleId {
        ModuleId::AppFw
    }

    fn commands(&self) -> &'static [&'static str] {
        &["add appfw policy", "bind appfw global"]
    }

    fn bind_categories(&self) -> &'static [BindCategory] {
        &[BindCategory::Lb]
    }

    fn collect(
        &mut self,
        ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        if tree.key() == "add appfw policy" {
            ctx.mark_rule_references(tree, &RULE);
        }
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        mut tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        if tree.key() == "bind appfw global" {
            return self.convert_global(ctx, tree);
        }

        let Some(name) = tree.positional_value(0).map(str::to_string) else {
            return Ok(Handled::tree(tree));
        };
        ctx.policies.store(&name, ModuleId::AppFw, None);
        ctx.convert_expression(&mut tree, &RULE, false);
        if tree.upgraded {
            ctx.policies.classify(&name, PolicyKind::Classic);
            self.classic_exists = true;
        } else {
            ctx.policies.classify(&name, PolicyKind::Advanced);
        }
        Ok(Handled::tree(tree))
    }

    fn convert_bind(
        &mut self,
        ctx: &mut ConversionContext,
        request: BindRequest,
    ) -> Result<Vec<Output>, ConvertError> {
        if !self.classic_exists {
            return Ok(vec![Output::Tree(request.tree)]);
        }
        ctx.convert_entity_bind(
            request.tree,
            &request.policy,
            ModuleId::AppFw,
            self.bind_defaults(),
            BindSlots::keywords(),
        )?;
        Ok(Vec::new())
    }
}

impl AppFw {
    fn convert_global(
        &self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        if !self.classic_exists {
            return Ok(Handled::tree(tree));
        }
        if tree
            .keyword_value("state")
            .is_some_and(|state| state.eq_ignore_ascii_case("disabled"))
        {
            ctx.diagnostics.warning(
                codes::DISABLED_BIND,
                tree.lineno,
                format!(
                    "Following bind command is commented out because state is disabled. If state is disabled, then command is not in use. Since state parameter is not supported with the advanced configuration, so if we convert this config then functionality will change. If command is required please take a backup because comments will not be saved in ns.conf after triggering 'save ns config': {tree}"
                ),
            );
            return Ok(Handled::Emit(vec![Output::Commented(tree)]));
        }

        let Some(policy) = tree.positional_value(0).map(str::to_string) else {
            return Ok(Handled::tree(tree));
        };
        ctx.convert_global_bind(
            tree,
            &policy,
            ModuleId::AppFw,
            self.bind_defaults(),
            BindSlots::positional(1, 2),
            Position::Inplace,
        )?;
        Ok(Handled::suppressed())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::pipeline::convert_str;

    const POLICY: &str = "add appfw policy afp1 \"REQ.HTTP.URL == /a\" prof1\n";

    #[test]
    fn disabled_global_bind_is_commented_out() {
        let input = format!("{POLICY}bind appfw global afp1 10 -state DISABLED\n");
        let outcome = convert_str(&input).expect("convert");
        assert_eq!(outcome.lines[1], "# bind appfw global afp1 10 -state DISABLED");
        assert_eq!(outcome.diagnostics[0].code, "disabled_bind");
    }

    #[test]
    fn global_bind_gets_request_default_type() {
        let input = format!("{POLICY}bind appfw global afp1 10\n");
        let outcome = convert_str(&input).expect("convert");
        assert_eq!(outcome.lines[1], "bind appfw global afp1 10 END -type REQ_DEFAULT");
    }

    #[test]
    fn binds_pass_through_without_classic_policies() {
        let input = "add appfw policy afp1 HTTP.REQ.IS_VALID prof1\n\
                     bind appfw global afp1 10\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(outcome.lines[1], "bind appfw global afp1 10");
    }
}
