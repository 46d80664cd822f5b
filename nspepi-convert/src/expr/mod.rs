//! Expression rewriting: classic text translation, named-expression
//! references and the registry that tracks which names exist on which side.

pub mod names;
pub mod registry;
pub mod rewriter;
pub mod scan;
pub mod translator;

pub use names::{advanced_name, is_valid_expression_name, ADVANCED_PREFIX};
pub use registry::ExpressionRegistry;
pub use rewriter::{RewriteOutcome, Rewriter};
pub use translator::{string_literal, ExprTranslator, RuleTranslator, Translation};
