use sim_core::analysis::{AnalysisCmd, AnalysisParams, AnalysisType, ParamValue};
use sim_core::netlist::{has_directive, prepare_netlist, print_width, probe_netlist};

const DIVIDER: &str = "V1 in 0 DC 5\nR1 in out 1k\nR2 out 0 2k\n";

fn tran() -> AnalysisCmd {
    AnalysisCmd::Tran {
        step: "1us".to_string(),
        stop: "1ms".to_string(),
    }
}

fn count_directive(text: &str, keyword: &str) -> usize {
    text.lines()
        .filter(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(keyword))
        })
        .count()
}

#[test]
fn probe_collects_nodes_and_sources_in_order() {
    let probe = probe_netlist(DIVIDER);
    assert_eq!(probe.nodes, vec!["in".to_string(), "out".to_string()]);
    assert_eq!(probe.sources, vec!["V1".to_string()]);
    assert!(probe.has_ground);
}

#[test]
fn probe_ground_aliases_are_case_sensitive() {
    let probe = probe_netlist("V1 a gnd 1\nR1 a GND 1k\n");
    assert_eq!(probe.nodes, vec!["a".to_string(), "GND".to_string()]);
    assert!(probe.has_ground);

    let probe = probe_netlist("R1 a b 1k\n");
    assert!(!probe.has_ground);
}

#[test]
fn probe_skips_directives_comments_and_blocks() {
    let body = "* V9 x y 1\n\
                .subckt inner a b\n\
                R1 a mid 1k\n\
                .ends\n\
                .control\n\
                run\n\
                .endc\n\
                X1 in out inner\n\
                + extra\n\
                v2 out 0 AC 1\n";
    let probe = probe_netlist(body);
    assert_eq!(probe.nodes, vec!["in".to_string(), "out".to_string()]);
    assert_eq!(probe.sources, vec!["v2".to_string()]);
}

#[test]
fn prepare_adds_title_directive_print_and_end() {
    let prepared = prepare_netlist(DIVIDER, &tran(), "divider");
    let lines: Vec<&str> = prepared.text.lines().collect();
    assert_eq!(lines[0], ".title divider");
    assert_eq!(lines[lines.len() - 1], ".end");
    assert!(lines.contains(&".tran 1us 1ms"));
    assert!(lines.contains(&".print tran v(in) v(out) i(V1)"));
    assert!(prepared.print_synthesized);
    assert!(prepared.text.ends_with(".end\n"));
}

#[test]
fn prepare_inserts_before_existing_end() {
    let body = format!("{}.end\n* trailing\nR9 x y 1\n", DIVIDER);
    let prepared = prepare_netlist(&body, &AnalysisCmd::Op, "divider");
    let lines: Vec<&str> = prepared.text.lines().collect();
    assert_eq!(lines.last(), Some(&".end"));
    assert_eq!(lines[lines.len() - 2], ".op");
    assert!(!prepared.text.contains("R9"));
}

#[test]
fn prepare_is_idempotent() {
    let once = prepare_netlist(DIVIDER, &tran(), "divider");
    let twice = prepare_netlist(&once.text, &tran(), "divider");
    assert_eq!(once.text, twice.text);
    assert_eq!(count_directive(&twice.text, ".title"), 1);
    assert_eq!(count_directive(&twice.text, ".tran"), 1);
    assert_eq!(count_directive(&twice.text, ".print"), 1);
    assert_eq!(count_directive(&twice.text, ".width"), 1);
    assert_eq!(count_directive(&twice.text, ".end"), 1);
}

#[test]
fn prepare_keeps_existing_directives() {
    let body = ".TITLE my own\nV1 in 0 1\nR1 in 0 1k\n.TRAN 1n 10n\n.print tran v(in)\n.END\n";
    let prepared = prepare_netlist(body, &tran(), "ignored");
    assert!(prepared.text.starts_with(".TITLE my own\n"));
    assert_eq!(count_directive(&prepared.text, ".tran"), 1);
    assert_eq!(count_directive(&prepared.text, ".print"), 1);
    assert!(!prepared.print_synthesized);
}

#[test]
fn synthesized_print_is_preceded_by_width() {
    let prepared = prepare_netlist(DIVIDER, &tran(), "divider");
    let lines: Vec<&str> = prepared.text.lines().collect();
    let print = lines
        .iter()
        .position(|line| line.starts_with(".print"))
        .unwrap();
    assert_eq!(lines[print - 1], ".width out=120");
}

#[test]
fn existing_width_is_kept() {
    let body = format!(".width out=300\n{}", DIVIDER);
    let prepared = prepare_netlist(&body, &tran(), "divider");
    assert_eq!(count_directive(&prepared.text, ".width"), 1);
    assert!(prepared.text.contains(".width out=300\n"));
    assert!(prepared.print_synthesized);
}

#[test]
fn print_width_grows_with_columns() {
    assert_eq!(print_width(1, false), 80);
    assert_eq!(print_width(3, false), 120);
    assert_eq!(print_width(40, false), 1008);
    assert_eq!(print_width(2, true), 144);
}

#[test]
fn options_line_does_not_count_as_op() {
    let body = ".options reltol=1e-4\nV1 in 0 1\nR1 in 0 1k\n";
    let prepared = prepare_netlist(body, &AnalysisCmd::Op, "opts");
    assert_eq!(count_directive(&prepared.text, ".op"), 1);
    assert_eq!(count_directive(&prepared.text, ".options"), 1);
}

#[test]
fn operating_point_gets_no_print() {
    let prepared = prepare_netlist(DIVIDER, &AnalysisCmd::Op, "divider");
    assert!(!has_directive(&prepared.text.lines().collect::<Vec<_>>(), ".print"));
    assert!(!has_directive(&prepared.text.lines().collect::<Vec<_>>(), ".width"));
    assert!(!prepared.print_synthesized);
    assert_eq!(prepared.nodes, vec!["in".to_string(), "out".to_string()]);
}

#[test]
fn ac_print_lists_node_voltages_only() {
    let mut params = AnalysisParams::new();
    params.insert("number_of_points".to_string(), ParamValue::from(10.0));
    params.insert("start_frequency".to_string(), ParamValue::from("1"));
    params.insert("stop_frequency".to_string(), ParamValue::from("1meg"));
    let cmd = AnalysisCmd::from_request(AnalysisType::Ac, &params).unwrap();
    let prepared = prepare_netlist(DIVIDER, &cmd, "divider");
    assert!(prepared.text.contains(".ac dec 10 1 1meg\n"));
    assert!(prepared.text.contains(".width out=144\n.print ac v(in) v(out)\n"));
}

#[test]
fn empty_netlist_gets_no_print() {
    let prepared = prepare_netlist("* nothing here\n", &tran(), "empty");
    assert!(!prepared.print_synthesized);
    assert_eq!(
        prepared.text,
        ".title empty\n* nothing here\n.tran 1us 1ms\n.end\n"
    );
}
