use ns_config_core::{ArgRef, CommandTree};

use super::{BindCategory, BindRequest, FeatureModule, Handled, ModuleId};
use crate::binds::{BindSlots, Position};
use crate::context::ConversionContext;
use crate::error::ConvertError;
use crate::output::Output;
use crate::policy::PolicyKind;

const GLOBAL_TYPES: &[&str] = &["REQ_OVERRIDE", "REQ_DEFAULT", "RES_OVERRIDE", "RES_DEFAULT"];

/// Rewrite actions and policies.
///
/// Rewrite policies are advanced already. Their binds only join the
/// renumbering when the configuration also has filter policies, whose
/// replacements are bound next to them.
#[derive(Debug, Default)]
pub struct Rewrite {
    filter_policies: bool,
}

impl FeatureModule for Rewrite {
    fn id(&self) -> ModuleId {
        ModuleId::Rewrite
    }

    fn commands(&self) -> &'static [&'static str] {
        &[
            "add rewrite action",
            "add rewrite policy",
            "bind rewrite global",
            "add filter policy",
        ]
    }

    fn bind_categories(&self) -> &'static [BindCategory] {
        &[
            BindCategory::Lb,
            BindCategory::ContentSwitching,
            BindCategory::CacheRedirection,
        ]
    }

    fn collect(
        &mut self,
        _ctx: &mut ConversionContext,
        tree: &CommandTree,
    ) -> Result<(), ConvertError> {
        if tree.key() == "add filter policy" {
            self.filter_policies = true;
        }
        Ok(())
    }

    fn convert(
        &mut self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        match tree.key().as_str() {
            "add rewrite action" => Ok(Handled::tree(convert_action(ctx, tree))),
            "add rewrite policy" => {
                if let Some(name) = tree.positional_value(0) {
                    ctx.policies
                        .store(name, ModuleId::Rewrite, Some(PolicyKind::Advanced));
                }
                Ok(Handled::tree(
                    ctx.convert_advanced_slots(tree, &[ArgRef::Positional(1)]),
                ))
            }
            "bind rewrite global" => self.convert_global(ctx, tree),
            _ => Ok(Handled::tree(tree)),
        }
    }

    fn convert_bind(
        &mut self,
        ctx: &mut ConversionContext,
        request: BindRequest,
    ) -> Result<Vec<Output>, ConvertError> {
        let http = request
            .tree
            .positional_value(0)
            .and_then(|vserver| ctx.vservers.protocol(vserver))
            .is_some_and(|protocol| protocol == "HTTP" || protocol == "SSL");
        if !self.filter_policies || !http {
            return Ok(vec![Output::Tree(request.tree)]);
        }
        ctx.convert_entity_bind(
            request.tree,
            &request.policy,
            ModuleId::Rewrite,
            self.bind_defaults(),
            BindSlots::keywords(),
        )?;
        Ok(Vec::new())
    }
}

impl Rewrite {
    fn convert_global(
        &self,
        ctx: &mut ConversionContext,
        tree: CommandTree,
    ) -> Result<Handled, ConvertError> {
        if !self.filter_policies {
            return Ok(Handled::tree(tree));
        }
        let global_type = tree
            .keyword_value("type")
            .is_some_and(|t| GLOBAL_TYPES.iter().any(|g| t.eq_ignore_ascii_case(g)));
        let Some(policy) = tree.positional_value(0).map(str::to_string) else {
            return Ok(Handled::tree(tree));
        };
        if !global_type {
            return Ok(Handled::tree(tree));
        }
        ctx.convert_global_bind(
            tree,
            &policy,
            ModuleId::Rewrite,
            self.bind_defaults(),
            BindSlots::positional(1, 2),
            Position::Inplace,
        )?;
        Ok(Handled::suppressed())
    }
}

/// `-pattern` was replaced by `-search`, which takes `regex(...)` for
/// `re<d>...<d>` patterns and `text("...")` for everything else.
fn convert_action(ctx: &mut ConversionContext, mut tree: CommandTree) -> CommandTree {
    if let Some(pattern) = tree
        .remove_keyword("pattern")
        .and_then(|k| k.first().map(str::to_string))
    {
        let search = if is_pattern_regex(&pattern) {
            format!("regex({pattern})")
        } else {
            format!("text(\"{}\")", escape_text(&pattern))
        };
        tree.add_keyword("search", [search]);
    }
    tree.remove_keyword("bypassSafetyCheck");
    ctx.convert_advanced_slots(
        tree,
        &[
            ArgRef::Positional(2),
            ArgRef::Positional(3),
            ArgRef::keyword("refineSearch"),
        ],
    )
}

/// `re/abc/`, `RE|a.b|`: at least five characters, a delimiter that cannot
/// appear in an identifier and that closes the pattern.
pub fn is_pattern_regex(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let [r, e, delimiter, .., last] = chars.as_slice() else {
        return false;
    };
    chars.len() >= 5
        && r.eq_ignore_ascii_case(&'r')
        && e.eq_ignore_ascii_case(&'e')
        && last == delimiter
        && !(delimiter.is_ascii_alphanumeric() || *delimiter == '_')
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::is_pattern_regex;
    use crate::pipeline::convert_str;

    #[test]
    fn regex_patterns_need_a_closing_delimiter() {
        assert!(is_pattern_regex("re/abc/"));
        assert!(is_pattern_regex("RE|a.b|"));
        assert!(!is_pattern_regex("re/a"));
        assert!(!is_pattern_regex("re/abc"));
        assert!(!is_pattern_regex("reaabca"));
        assert!(!is_pattern_regex("abc/def/"));
    }

    #[test]
    fn pattern_becomes_search() {
        let outcome = convert_str(
            "add rewrite action a1 replace_all HTTP.REQ.URL.PATH \"\\\"/new\\\"\" -pattern old -bypassSafetyCheck YES\n\
             add rewrite action a2 replace_all HTTP.REQ.URL.PATH \"\\\"/new\\\"\" -pattern re/o+ld/\n",
        )
        .expect("convert");
        assert_eq!(
            outcome.lines,
            vec![
                "add rewrite action a1 replace_all HTTP.REQ.URL.PATH \"\\\"/new\\\"\" -search \"text(\\\"old\\\")\"",
                "add rewrite action a2 replace_all HTTP.REQ.URL.PATH \"\\\"/new\\\"\" -search regex(re/o+ld/)",
            ]
        );
    }

    #[test]
    fn binds_pass_through_without_filter_policies() {
        let input = "add rewrite policy rw1 true NOREWRITE\n\
                     bind rewrite global rw1 100 END -type REQ_DEFAULT\n\
                     bind rewrite global rw1 50 END -type REQ_DEFAULT\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(outcome.lines[2], "bind rewrite global rw1 50 END -type REQ_DEFAULT");
    }

    #[test]
    fn global_binds_are_renumbered_next_to_filter_policies() {
        let input = "add filter policy fp1 -rule \"REQ.HTTP.URL == /x\" -reqAction DROP\n\
                     add rewrite policy rw1 true NOREWRITE\n\
                     add rewrite policy rw2 true NOREWRITE\n\
                     bind rewrite global rw1 100 END -type REQ_DEFAULT\n\
                     bind rewrite global rw2 50 END -type REQ_DEFAULT\n\
                     bind rewrite global rw2 60 END -type RES_OVERRIDE\n";
        let outcome = convert_str(input).expect("convert");
        let binds: Vec<&str> = outcome
            .lines
            .iter()
            .map(String::as_str)
            .filter(|l| l.starts_with("bind"))
            .collect();
        assert_eq!(
            binds,
            vec![
                "bind rewrite global rw1 100 END -type REQ_DEFAULT",
                "bind rewrite global rw2 200 END -type REQ_DEFAULT",
                "bind rewrite global rw2 60 END -type RES_OVERRIDE",
            ]
        );
    }
}
