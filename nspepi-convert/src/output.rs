use ns_config_core::CommandTree;

/// One line of converted output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Tree(CommandTree),
    /// A command written as a comment because it needs manual work.
    Commented(CommandTree),
    /// Raw text such as blank lines and comments.
    Text(String),
}

impl Output {
    /// Render as a configuration line. Unmodified parsed commands keep their
    /// original text.
    pub fn render(&self) -> String {
        match self {
            Output::Tree(tree) => render_tree(tree),
            Output::Commented(tree) => format!("# {tree}"),
            Output::Text(text) => text.clone(),
        }
    }

    pub fn tree(&self) -> Option<&CommandTree> {
        match self {
            Output::Tree(tree) | Output::Commented(tree) => Some(tree),
            Output::Text(_) => None,
        }
    }
}

fn render_tree(tree: &CommandTree) -> String {
    if tree.is_modified() || tree.original_line.is_empty() {
        tree.to_string()
    } else {
        tree.original_line.clone()
    }
}
