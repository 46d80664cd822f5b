use ns_config_core::{ArgRef, CommandTree};

use super::{FeatureModule, Handled, ModuleId};
use crate::context::ConversionContext;
use crate::error::ConvertError;

#[derive(Debug, Clone, Copy)]
enum Slot {
    Keyword(&'static str),
    Positional(usize),
}

impl Slot {
    fn arg(self) -> ArgRef {
        match self {
            Slot::Keyword(name) => ArgRef::keyword(name),
            Slot::Positional(idx) => ArgRef::Positional(idx),
        }
    }
}

use Slot::{Keyword as K, Positional as P};

const RULE: &[Slot] = &[K("rule")];
const FIRST: &[Slot] = &[P(1)];

/// Commands that only accept advanced expressions, and where those
/// expressions are.
const ADVANCED_ONLY: &[(&str, &[Slot])] = &[
    ("add videooptimization detectionpolicy", RULE),
    ("add videooptimization pacingpolicy", RULE),
    ("add dns policy", FIRST),
    (
        "add cache selector",
        &[P(1), P(2), P(3), P(4), P(5), P(6), P(7), P(8)],
    ),
    ("add cs action", &[K("targetVserverExpr")]),
    ("add vpn clientlessaccesspolicy", FIRST),
    ("add authentication webauthaction", &[K("fullReqExpr"), K("successRule")]),
    ("set authentication webauthaction", &[K("fullReqExpr"), K("successRule")]),
    ("add tm trafficpolicy", FIRST),
    ("add authentication samlidppolicy", RULE),
    ("add feo policy", FIRST),
    ("add cache policy", RULE),
    ("add transform policy", FIRST),
    ("add appqoe action", &[K("dosTrigExpression")]),
    ("add appqoe policy", RULE),
    ("add appflow policy", FIRST),
    ("add autoscale policy", RULE),
    ("add authentication policy", RULE),
    ("add authentication loginschemapolicy", RULE),
    ("add authentication loginschema", &[K("userExpression"), K("passwdExpression")]),
    ("add gslb vserver", RULE),
    ("add ns assignment", &[K("set"), K("append"), K("add"), K("sub")]),
    ("add dns action64", &[K("mappedRule"), K("excludeRule")]),
    ("add dns policy64", RULE),
    ("add authentication oauthidppolicy", RULE),
    ("add authentication samlidpprofile", &[K("NameIDExpr"), K("acsUrlRule")]),
    ("add contentinspection policy", RULE),
    ("add ica policy", RULE),
    ("add lb group", RULE),
    ("add audit messageaction", &[P(2)]),
    ("add spillover policy", RULE),
    ("add stream selector", &[P(1), P(2), P(3), P(4), P(5)]),
    ("add tm formssoaction", &[K("ssoSuccessRule")]),
    ("add tm samlssoprofile", &[K("relaystateRule"), K("NameIDExpr")]),
    ("add vpn sessionpolicy", FIRST),
    ("add vpn trafficaction", &[K("userExpression"), K("passwdExpression")]),
    ("add vpn vserver", &[K("Listenpolicy")]),
    ("add audit syslogpolicy", FIRST),
    ("add audit nslogpolicy", FIRST),
    ("add authorization policy", FIRST),
    ("add vpn trafficpolicy", FIRST),
    ("add tunnel trafficpolicy", FIRST),
    ("set uiinternal expression", RULE),
];

const COMMANDS: &[&str] = &[
    "add videooptimization detectionpolicy",
    "add videooptimization pacingpolicy",
    "add dns policy",
    "add cache selector",
    "add cs action",
    "add vpn clientlessaccesspolicy",
    "add authentication webauthaction",
    "set authentication webauthaction",
    "add tm trafficpolicy",
    "add authentication samlidppolicy",
    "add feo policy",
    "add cache policy",
    "add transform policy",
    "add appqoe action",
    "add appqoe policy",
    "add appflow policy",
    "add autoscale policy",
    "add authentication policy",
    "add authentication loginschemapolicy",
    "add authentication loginschema",
    "add gslb vserver",
    "add ns assignment",
    "add dns action64",
    "add dns policy64",
    "add authentication oauthidppolicy",
    "add authentication samlidpprofile",
    "add contentinspection policy",
    "add ica policy",
    "add lb group",
    "add audit messageaction",
    "add spillover policy",
    "add stream selector",
    "add tm formssoaction",
    "add tm samlssoprofile",
    "add vpn sessionpolicy",
    "add vpn trafficaction",
    "add vpn vserver",
    "add audit syslogpolicy",
    "add audit nslogpolicy",
    "add authorization policy",
    "add vpn trafficpolicy",
    "add tunnel trafficpolicy",
    "set uiinternal expression",
];

/// Cleanup of advanced expressions (`Q.`/`S.` prefixes, embedded classic
/// text) in commands that accept nothing else.
pub struct AdvExpression;

impl FeatureModule for AdvExpression {
    fn id(&self) -> ModuleId {
        ModuleId::AdvExpression
    }

    fn commands(&self) -> &'static [&'static str] {
        COMMANDS
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        let key = tree.key();
        let Some((_, slots)) = ADVANCED_ONLY.iter().find(|(cmd, _)| *cmd == key) else {
            return Ok(Handled::tree(tree));
        };
        let slots: Vec<ArgRef> = slots.iter().map(|s| s.arg()).collect();
        Ok(Handled::tree(ctx.convert_advanced_slots(tree, &slots)))
    }
}

#[cfg(test)]
mod tests {
    use super::{ADVANCED_ONLY, COMMANDS};

    #[test]
    fn every_command_has_slots() {
        assert_eq!(ADVANCED_ONLY.len(), COMMANDS.len());
        for (cmd, _) in ADVANCED_ONLY {
            assert!(COMMANDS.contains(cmd), "{cmd} is not registered");
        }
    }
}
