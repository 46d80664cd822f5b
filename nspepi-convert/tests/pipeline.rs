use nspepi_convert::pipeline::convert_str;
use pretty_assertions::assert_eq;

fn binds(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(String::as_str)
        .filter(|l| l.starts_with("bind"))
        .collect()
}

#[test]
fn converted_output_is_stable_on_a_second_run() {
    let input = "add lb vserver lb1 HTTP 10.0.0.10 80\n\
                 add lb vserver lb2 HTTP 10.0.0.11 80\n\
                 add cs vserver cs1 HTTP 10.0.0.1 80\n\
                 add cs policy purl -url /img/*\n\
                 add cs policy prule -rule \"REQ.HTTP.METHOD == POST\"\n\
                 bind cs vserver cs1 -policyName purl -targetLBVserver lb1 -priority 10\n\
                 bind cs vserver cs1 -policyName prule -targetLBVserver lb2 -priority 20\n";
    let first = convert_str(input).expect("first run");
    let second = convert_str(&(first.lines.join("\n") + "\n")).expect("second run");
    assert_eq!(second.lines, first.lines);
    assert_eq!(second.stats.converted, 0);
}

#[test]
fn missing_and_unordered_priorities_are_renumbered() {
    let input = "add cr vserver cr1 HTTP 10.0.0.2 80\n\
                 add cr policy c0 -rule \"REQ.HTTP.URL == /a\"\n\
                 add cr policy c1 -rule \"REQ.HTTP.URL == /b\"\n\
                 add cr policy c2 -rule \"REQ.HTTP.URL == /c\"\n\
                 bind cr vserver cr1 -policyName c0\n\
                 bind cr vserver cr1 -policyName c1 -priority 50\n\
                 bind cr vserver cr1 -policyName c2 -priority 200\n";
    let outcome = convert_str(input).expect("convert");
    assert_eq!(
        binds(&outcome.lines),
        vec![
            "bind cr vserver cr1 -policyName c0 -priority 100 -gotoPriorityExpression END -type REQUEST",
            "bind cr vserver cr1 -policyName c1 -priority 200 -gotoPriorityExpression END -type REQUEST",
            "bind cr vserver cr1 -policyName c2 -priority 300 -gotoPriorityExpression END -type REQUEST",
        ]
    );
}

#[test]
fn policy_bound_to_two_targets_is_split() {
    let input = "add cs vserver cs1 HTTP 10.0.0.1 80\n\
                 add cs vserver cs2 HTTP 10.0.0.2 80\n\
                 add cs policy p1 -rule \"REQ.HTTP.URL == /a\"\n\
                 bind cs vserver cs1 -policyName p1 -targetLBVserver lb1 -priority 10\n\
                 bind cs vserver cs2 -policyName p1 -targetLBVserver lb2 -priority 10\n";
    let outcome = convert_str(input).expect("convert");
    assert_eq!(
        outcome.lines,
        vec![
            "add cs vserver cs1 HTTP 10.0.0.1 80",
            "add cs vserver cs2 HTTP 10.0.0.2 80",
            "add cs action nspepi_adv_cs_act_lb1 -targetLBVserver lb1",
            "add cs action nspepi_adv_cs_act_lb2 -targetLBVserver lb2",
            "add cs policy nspepi_adv_p1_lb1 -rule \"HTTP.REQ.URL.EQ(\\\"/a\\\")\" -action nspepi_adv_cs_act_lb1",
            "add cs policy nspepi_adv_p1_lb2 -rule \"HTTP.REQ.URL.EQ(\\\"/a\\\")\" -action nspepi_adv_cs_act_lb2",
            "bind cs vserver cs1 -policyName nspepi_adv_p1_lb1 -priority 10 -type REQUEST",
            "bind cs vserver cs2 -policyName nspepi_adv_p1_lb2 -priority 10 -type REQUEST",
        ]
    );
}

#[test]
fn expressions_referenced_indirectly_get_advanced_copies() {
    let input = "add policy expression e_b \"REQ.HTTP.URL == /b\"\n\
                 add policy expression e_a \"REQ.HTTP.METHOD == GET && e_b\"\n\
                 add policy expression e_unused \"REQ.HTTP.URL == /c\"\n\
                 add cs policy p1 -rule e_a\n";
    let outcome = convert_str(input).expect("convert");
    let copy_of = |name: &str| {
        outcome
            .lines
            .iter()
            .find(|l| l.starts_with(&format!("add policy expression nspepi_adv_{name} ")))
            .cloned()
    };
    assert!(copy_of("e_b").is_some());
    assert!(copy_of("e_a").is_some_and(|l| l.contains("nspepi_adv_e_b")));
    assert!(copy_of("e_unused").is_none());
    assert!(outcome
        .lines
        .iter()
        .any(|l| l.starts_with("add cs policy p1 -rule nspepi_adv_e_a")));
}

#[test]
fn diagnostics_keep_input_order_and_line_numbers() {
    let input = "add sc policy sc1 -rule \"REQ.HTTP.URL == /a\"\n\
                 enable ns feature LB SC\n";
    let outcome = convert_str(input).expect("convert");
    let lines: Vec<usize> = outcome.diagnostics.iter().map(|d| d.lineno).collect();
    assert_eq!(lines, vec![1, 2]);
    assert_eq!(outcome.stats.errors, 2);
}
