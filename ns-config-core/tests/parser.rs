use std::path::PathBuf;

use ns_config_core::{parse, parse_file, ParsedLine};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn parses_fixture_commands_and_comments() {
    let lines = parse_file(&fixture("fixtures/classic_cs.conf")).expect("parse should succeed");
    assert_eq!(lines.len(), 13);
    assert!(matches!(lines[0], ParsedLine::Passthrough { lineno: 1, .. }));

    let ParsedLine::Command(cs_vserver) = &lines[3] else {
        panic!("line 4 should be a command");
    };
    assert_eq!(cs_vserver.key(), "add cs vserver");
    assert_eq!(cs_vserver.positional_value(1), Some("HTTP"));
    assert_eq!(cs_vserver.keyword_value("casesensitive"), Some("OFF"));

    let ParsedLine::Command(expr) = &lines[4] else {
        panic!("line 5 should be a command");
    };
    let rule = expr.positional(1).expect("rule");
    assert!(rule.quoted);
    assert_eq!(rule.text, "REQ.HTTP.URL CONTAINS /img");
}

#[test]
fn keeps_invalid_lines_with_their_error() {
    let lines = parse("add lb vserver v1 HTTP\nadd policy expression e \"unterminated\n");
    assert_eq!(lines.len(), 2);
    match &lines[1] {
        ParsedLine::Invalid { lineno, text, error } => {
            assert_eq!(*lineno, 2);
            assert!(text.starts_with("add policy expression"));
            assert!(error.to_string().starts_with("line 2:"));
        }
        other => panic!("expected invalid line, got {other:?}"),
    }
}

#[test]
fn short_command_types_are_accepted() {
    let lines = parse("enable ns feature LB CS REWRITE\nsave config\n");
    let ParsedLine::Command(enable) = &lines[0] else {
        panic!("expected command");
    };
    assert_eq!(enable.key(), "enable ns feature");
    assert_eq!(enable.positionals.len(), 3);

    let ParsedLine::Command(save) = &lines[1] else {
        panic!("expected command");
    };
    assert_eq!(save.key(), "save config");
    assert_eq!(save.object_type(), "");
}
