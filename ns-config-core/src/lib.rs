//! Generic parsing and writing primitives for line-oriented appliance CLI
//! configuration files (`ns.conf` style).
//!
//! A command line such as
//!
//! ```text
//! bind cs vserver web_vs -policyName p1 -priority 10
//! ```
//!
//! is split into its command type (`bind cs vserver`), ordered positional
//! values (`web_vs`) and keyword parameters (`-policyName p1`, `-priority 10`).
//! The resulting [`CommandTree`] can be edited and rendered back to a single
//! command line. Nothing in this crate knows what the commands mean.

pub mod lexer;
pub mod parser;
pub mod tree;
pub mod writer;

pub use lexer::{tokenize, LexError, Token};
pub use parser::{parse, parse_file, parse_line, ParseError, ParsedLine};
pub use tree::{ArgRef, CommandTree, Keyword, Value};
pub use writer::{render_value, write_file, write_lines, WriteError};
