//! Conversion of classic policy configuration to advanced policy syntax.
//!
//! A saved appliance configuration mixes classic policies (rules written in
//! the classic expression language, evaluated by fixed precedence) with
//! advanced ones (advanced expressions, explicit priorities and goto
//! expressions). This crate rewrites the classic parts so the result only
//! uses the advanced model while keeping the evaluation order.
//!
//! # Architecture
//!
//! - [`expr`]: classic expression translation and named-expression
//!   references
//! - [`policy`]: every policy and original bind seen in the input
//! - [`binds`]: deferred binds, renumbered per bind point
//! - [`modules`]: one handler set per feature (content switching, SSL,
//!   rewrite, ...)
//! - [`pipeline`]: the two passes over the input and output assembly
//! - [`diagnostics`] and [`report`]: what needs manual attention
//!
//! # Examples
//!
//! ```ignore
//! use nspepi_convert::pipeline::convert_str;
//!
//! let outcome = convert_str("add cs policy p1 -rule \"REQ.HTTP.URL == /a\"\n")?;
//! for line in &outcome.lines {
//!     println!("{line}");
//! }
//! ```
//!
//! Parsing and writing of command lines lives in `ns-config-core`; nothing
//! there knows what a policy is.

pub mod binds;
pub mod builtins;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod modules;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod report;
