//! Netlist preprocessing: make a raw component list runnable in batch mode.
//!
//! The body handed in by callers is usually just component and source
//! lines. `prepare_netlist` adds whatever is missing (`.title`, the analysis
//! directive, a `.print` covering every node and a `.width` wide enough for
//! it, `.end`) without ever
//! duplicating a directive that is already there, so running it on its own
//! output is a no-op.

use crate::analysis::AnalysisCmd;

/// Node names that never get a `v(...)` print column.
pub const GROUND_ALIASES: &[&str] = &["0", "gnd", "ground"];

/// ngspice's default `.print` line width; wider tables wrap into blocks.
const DEFAULT_PRINT_WIDTH: usize = 80;
/// Room for one real column, tab and sign included.
const PRINT_COLUMN_WIDTH: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedNetlist {
    pub text: String,
    /// Non-ground nodes in first-seen order.
    pub nodes: Vec<String>,
    /// Voltage source names in first-seen order.
    pub sources: Vec<String>,
    /// True when the `.print` directive was generated here, which means the
    /// simulator's table columns follow `nodes` then `sources` exactly
    /// (`nodes` only for `.ac`).
    pub print_synthesized: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetlistProbe {
    pub nodes: Vec<String>,
    pub sources: Vec<String>,
    pub has_ground: bool,
}

pub fn prepare_netlist(body: &str, cmd: &AnalysisCmd, circuit_name: &str) -> PreparedNetlist {
    let probe = probe_netlist(body);
    if !probe.has_ground {
        log::warn!("netlist for '{}' has no ground node", circuit_name);
    }

    let mut lines: Vec<String> = body.lines().map(|line| line.trim_end().to_string()).collect();

    let has_title = lines
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map(|line| line.to_ascii_lowercase().starts_with(".title"))
        .unwrap_or(false);
    if !has_title {
        let title = circuit_name.replace(['\r', '\n'], " ");
        lines.insert(0, format!(".title {}", title.trim()));
    }

    if !has_directive(&lines, cmd.keyword()) {
        insert_before_end(&mut lines, cmd.directive());
    }

    let mut print_synthesized = false;
    if let Some(target) = cmd.print_target() {
        if !has_directive(&lines, ".print") {
            let complex = matches!(cmd, AnalysisCmd::Ac { .. });
            let mut items: Vec<String> =
                probe.nodes.iter().map(|node| format!("v({})", node)).collect();
            if !complex {
                items.extend(probe.sources.iter().map(|source| format!("i({})", source)));
            }
            if !items.is_empty() {
                if !has_directive(&lines, ".width") {
                    let width = print_width(items.len(), complex);
                    insert_before_end(&mut lines, format!(".width out={}", width));
                }
                insert_before_end(&mut lines, format!(".print {} {}", target, items.join(" ")));
                print_synthesized = true;
            }
        }
    }

    match find_last_directive(&lines, ".end") {
        Some(index) => {
            let dropped = lines.split_off(index + 1);
            if dropped.iter().any(|line| !line.trim().is_empty()) {
                log::debug!("dropping {} line(s) after .end", dropped.len());
            }
        }
        None => lines.push(".end".to_string()),
    }

    let mut text = lines.join("\n");
    text.push('\n');

    PreparedNetlist {
        text,
        nodes: probe.nodes,
        sources: probe.sources,
        print_synthesized,
    }
}

/// Collects the nodes and voltage sources referenced by component lines.
///
/// A component line has at least three tokens, `<name> <node1> <node2> ...`.
/// Directives, comments, continuations and the bodies of `.subckt` and
/// `.control` blocks are not component lines.
pub fn probe_netlist(body: &str) -> NetlistProbe {
    let mut probe = NetlistProbe::default();
    let mut in_subckt = false;
    let mut in_control = false;

    for raw_line in body.lines() {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') || trimmed.starts_with('+') {
            continue;
        }

        if trimmed.starts_with('.') {
            let command = first_token(trimmed);
            match command.as_str() {
                ".subckt" => in_subckt = true,
                ".ends" => in_subckt = false,
                ".control" => in_control = true,
                ".endc" => in_control = false,
                _ => {}
            }
            continue;
        }

        if in_subckt || in_control {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        for node in &parts[1..3] {
            if GROUND_ALIASES.contains(node) {
                probe.has_ground = true;
                continue;
            }
            if !probe.nodes.iter().any(|known| known == node) {
                probe.nodes.push(node.to_string());
            }
        }

        let name = parts[0];
        if name.starts_with(['V', 'v']) && !probe.sources.iter().any(|known| known == name) {
            probe.sources.push(name.to_string());
        }
    }

    probe
}

/// True if some non-comment line starts with `keyword` (lowercase, with dot).
pub fn has_directive<S: AsRef<str>>(lines: &[S], keyword: &str) -> bool {
    find_last_directive(lines, keyword).is_some()
}

fn find_last_directive<S: AsRef<str>>(lines: &[S], keyword: &str) -> Option<usize> {
    lines.iter().rposition(|line| {
        let trimmed = line.as_ref().trim();
        !trimmed.starts_with('*') && first_token(trimmed) == keyword
    })
}

/// `.width out=` value that keeps one row of `columns` values (plus index
/// and axis) on a single line. AC cells print as `re, im` pairs.
pub fn print_width(columns: usize, complex: bool) -> usize {
    let per_column = if complex {
        2 * PRINT_COLUMN_WIDTH
    } else {
        PRINT_COLUMN_WIDTH
    };
    (2 * PRINT_COLUMN_WIDTH + columns * per_column).max(DEFAULT_PRINT_WIDTH)
}

fn insert_before_end(lines: &mut Vec<String>, directive: String) {
    match find_last_directive(lines.as_slice(), ".end") {
        Some(index) => lines.insert(index, directive),
        None => lines.push(directive),
    }
}

fn first_token(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}
