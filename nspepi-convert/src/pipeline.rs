//! Two-pass conversion of a whole configuration.
//!
//! The input is parsed once and replayed twice. The collect pass lets every
//! module record names, policies and expression references with diagnostics
//! muted; the convert pass produces output. Binds and anything else a module
//! defers are written after the last input line: final calls in module
//! order, then every collected bind, renumbered per bind point.

use std::collections::{BTreeSet, HashMap, HashSet};

use ns_config_core::{parse, CommandTree, ParsedLine};
use serde::Serialize;
use tracing::{debug, info};

use crate::builtins::{default_builtins, BuiltinTables};
use crate::context::ConversionContext;
use crate::diagnostics::{codes, Diagnostic, Severity};
use crate::error::ConvertError;
use crate::expr::RuleTranslator;
use crate::modules::{default_modules, BindCategory, FeatureModule, Handled, ModuleId};
use crate::output::Output;

/// Counters shown in the conversion summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// Command lines read; blank lines and comments are not counted.
    pub commands: usize,
    /// Command lines whose output differs from the input.
    pub converted: usize,
    /// Commands held back by a module and written at the end.
    pub deferred: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutcome {
    pub lines: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ConversionStats,
    /// Input line numbers that were changed, dropped or reported.
    pub touched_lines: Vec<usize>,
}

/// Runs the modules over one configuration. A converter is consumed by a
/// run; convert another file with a new one.
pub struct Converter {
    ctx: ConversionContext,
    modules: Vec<Box<dyn FeatureModule>>,
    /// Command key → indexes into `modules`, in registration order.
    handlers: HashMap<&'static str, Vec<usize>>,
    bind_handlers: HashMap<(BindCategory, ModuleId), usize>,
}

impl Converter {
    pub fn new(builtins: &BuiltinTables) -> Result<Self, ConvertError> {
        Self::with_modules(builtins, default_modules())
    }

    pub fn with_modules(
        builtins: &BuiltinTables,
        mut modules: Vec<Box<dyn FeatureModule>>,
    ) -> Result<Self, ConvertError> {
        let translator = RuleTranslator::new()?;
        let mut ctx = ConversionContext::new(builtins, Box::new(translator));

        let mut handlers: HashMap<&'static str, Vec<usize>> = HashMap::new();
        let mut bind_handlers = HashMap::new();
        for (idx, module) in modules.iter_mut().enumerate() {
            module.init(&mut ctx);
            for key in module.commands() {
                handlers.entry(*key).or_default().push(idx);
            }
            for category in module.bind_categories() {
                bind_handlers.insert((*category, module.id()), idx);
            }
        }

        Ok(Self {
            ctx,
            modules,
            handlers,
            bind_handlers,
        })
    }

    pub fn convert_str(self, input: &str) -> Result<ConversionOutcome, ConvertError> {
        self.convert_lines(parse(input))
    }

    pub fn convert_lines(mut self, parsed: Vec<ParsedLine>) -> Result<ConversionOutcome, ConvertError> {
        self.collect(&parsed)?;

        let mut stats = ConversionStats::default();
        let mut outputs = Vec::new();
        let mut command_lines = Vec::new();
        for line in parsed {
            match line {
                ParsedLine::Passthrough { text, .. } => outputs.push(Output::Text(text)),
                ParsedLine::Invalid {
                    lineno,
                    text,
                    error,
                } => {
                    self.ctx.diagnostics.warning(
                        codes::TOKENIZE_FAILED,
                        lineno,
                        format!("{error}; line copied unchanged"),
                    );
                    outputs.push(Output::Text(text));
                }
                ParsedLine::Command(tree) => {
                    stats.commands += 1;
                    command_lines.push(tree.lineno);
                    let converted = self.convert_command(tree)?;
                    if converted.is_empty() {
                        stats.deferred += 1;
                    }
                    outputs.extend(converted);
                }
            }
        }

        for module in &mut self.modules {
            outputs.extend(module.final_call(&mut self.ctx)?);
        }
        let binds = std::mem::take(&mut self.ctx.binds);
        outputs.extend(binds.emit(&self.ctx.policies, &mut self.ctx.diagnostics));

        let diagnostics = self.ctx.diagnostics.into_entries();
        let touched_lines = touched_lines(&outputs, &command_lines, &diagnostics);
        stats.converted = converted_count(&outputs, &command_lines);
        stats.errors = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        stats.warnings = diagnostics.len() - stats.errors;
        info!(
            commands = stats.commands,
            converted = stats.converted,
            errors = stats.errors,
            warnings = stats.warnings,
            "conversion finished"
        );

        Ok(ConversionOutcome {
            lines: outputs.iter().map(Output::render).collect(),
            diagnostics,
            stats,
            touched_lines,
        })
    }

    fn collect(&mut self, parsed: &[ParsedLine]) -> Result<(), ConvertError> {
        self.ctx.diagnostics.set_muted(true);
        for line in parsed {
            let ParsedLine::Command(tree) = line else {
                continue;
            };
            if tree.op().eq_ignore_ascii_case("add")
                && tree.object_type().to_lowercase().ends_with("policy")
            {
                if let Some(name) = tree.positional_value(0) {
                    self.ctx.policies.register_external(name);
                }
            }
            let Some(handlers) = self.handlers.get(tree.key().as_str()) else {
                continue;
            };
            for &idx in handlers {
                self.modules[idx].collect(&mut self.ctx, tree)?;
            }
        }
        self.ctx.diagnostics.set_muted(false);
        self.ctx.expressions.expand_in_use();
        debug!("collect pass finished");
        Ok(())
    }

    /// Run every module registered for the command's key. A tree produced by
    /// one module is the input of the next.
    fn convert_command(&mut self, tree: CommandTree) -> Result<Vec<Output>, ConvertError> {
        let Some(handlers) = self.handlers.get(tree.key().as_str()).cloned() else {
            return Ok(vec![Output::Tree(tree)]);
        };
        let mut current = vec![Output::Tree(tree)];
        for idx in handlers {
            let mut next = Vec::with_capacity(current.len());
            for output in current {
                match output {
                    Output::Tree(tree) => {
                        let handled = self.modules[idx].convert(&mut self.ctx, tree)?;
                        next.extend(self.resolve(handled)?);
                    }
                    other => next.push(other),
                }
            }
            current = next;
        }
        Ok(current)
    }

    fn resolve(&mut self, handled: Handled) -> Result<Vec<Output>, ConvertError> {
        match handled {
            Handled::Emit(outputs) => Ok(outputs),
            Handled::Delegate(request) => {
                match self.bind_handlers.get(&(request.category, request.owner)) {
                    Some(&idx) => self.modules[idx].convert_bind(&mut self.ctx, request),
                    None => Ok(vec![Output::Tree(request.tree)]),
                }
            }
        }
    }
}

/// Convert a configuration with the shipped built-in tables.
pub fn convert_str(input: &str) -> Result<ConversionOutcome, ConvertError> {
    Converter::new(&default_builtins())?.convert_str(input)
}

fn changed_lines(outputs: &[Output], command_lines: &[usize]) -> BTreeSet<usize> {
    let mut emitted = HashSet::new();
    let mut changed = BTreeSet::new();
    for output in outputs {
        let (tree, commented) = match output {
            Output::Tree(tree) => (tree, false),
            Output::Commented(tree) => (tree, true),
            Output::Text(_) => continue,
        };
        emitted.insert(tree.lineno);
        if (commented || tree.is_modified()) && tree.lineno > 0 {
            changed.insert(tree.lineno);
        }
    }
    changed.extend(command_lines.iter().filter(|l| !emitted.contains(*l)));
    changed
}

fn converted_count(outputs: &[Output], command_lines: &[usize]) -> usize {
    changed_lines(outputs, command_lines).len()
}

fn touched_lines(
    outputs: &[Output],
    command_lines: &[usize],
    diagnostics: &[Diagnostic],
) -> Vec<usize> {
    let mut touched = changed_lines(outputs, command_lines);
    touched.extend(diagnostics.iter().map(|d| d.lineno).filter(|l| *l > 0));
    touched.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::convert_str;

    #[test]
    fn comments_and_unknown_commands_pass_through() {
        let input = "# saved config\n\nset ns param -timezone GMT\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(
            outcome.lines,
            vec!["# saved config", "", "set ns param -timezone GMT"]
        );
        assert_eq!(outcome.stats.commands, 1);
        assert_eq!(outcome.stats.converted, 0);
        assert!(outcome.touched_lines.is_empty());
    }

    #[test]
    fn untokenizable_lines_are_copied_with_a_warning() {
        let outcome = convert_str("add lb vserver v1 HTTP \"unterminated\n").expect("convert");
        assert_eq!(outcome.lines, vec!["add lb vserver v1 HTTP \"unterminated"]);
        assert_eq!(outcome.diagnostics[0].code, "tokenize_failed");
        assert_eq!(outcome.stats.warnings, 1);
        assert_eq!(outcome.touched_lines, vec![1]);
    }

    #[test]
    fn binds_are_written_after_other_commands() {
        let input = "add cs vserver cs1 HTTP 10.0.0.1 80\n\
                     add cs policy p1 -rule \"REQ.HTTP.URL == /a\"\n\
                     bind cs vserver cs1 -policyName p1 -priority 10\n\
                     add lb vserver lb1 HTTP 10.0.0.2 80\n";
        let outcome = convert_str(input).expect("convert");
        assert_eq!(outcome.lines[1], "add lb vserver lb1 HTTP 10.0.0.2 80");
        assert!(outcome
            .lines
            .last()
            .is_some_and(|l| l.starts_with("bind cs vserver cs1 -policyName p1")));
        assert_eq!(outcome.stats.deferred, 2);
    }

    #[test]
    fn unknown_policy_on_cs_bind_is_fatal() {
        let input = "add cs vserver cs1 HTTP 10.0.0.1 80\n\
                     bind cs vserver cs1 -policyName missing -priority 10\n";
        assert!(convert_str(input).is_err());
    }
}
