use ns_config_core::{parse_line, write_file, ArgRef};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn reparse(line: &str) -> ns_config_core::CommandTree {
    parse_line(line, 1)
        .expect("parse should succeed")
        .expect("line should hold a command")
}

#[test]
fn edited_tree_renders_and_parses_back() {
    let mut tree = reparse(r#"add cs policy p1 -rule "REQ.HTTP.URL == /x" -devno 12"#);
    tree.replace_arg(&ArgRef::keyword("rule"), r#"HTTP.REQ.URL.EQ("/x")"#);
    tree.remove_keyword("devno");

    let rendered = tree.to_string();
    assert_eq!(rendered, r#"add cs policy p1 -rule "HTTP.REQ.URL.EQ(\"/x\")""#);

    let again = reparse(&rendered);
    assert_eq!(again.keyword_value("rule"), Some(r#"HTTP.REQ.URL.EQ("/x")"#));
    assert_eq!(again.positionals, tree.positionals);
}

#[test]
fn untouched_tree_keeps_original_line() {
    let line = "bind lb vserver  lb1   -policyName p1";
    let tree = reparse(line);
    assert!(!tree.is_modified());
    assert_eq!(tree.original_line, line);
    assert_eq!(tree.to_string(), "bind lb vserver lb1 -policyName p1");
}

#[test]
fn writes_lines_to_file() {
    let dir = tempdir().expect("tempdir");
    let out = dir.path().join("out.conf");
    write_file(&["add lb vserver a HTTP", "# note"], &out).expect("write");
    let raw = std::fs::read_to_string(&out).expect("read");
    assert_eq!(raw, "add lb vserver a HTTP\n# note\n");
}
