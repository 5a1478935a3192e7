//! Parsing of the simulator's console output.
//!
//! ngspice prints results as loosely aligned text whose layout depends on
//! the analysis and on who wrote the `.print` directive. Two strategies are
//! supported:
//!
//! * [`ParseStrategy::Columnar`]: the `.print` line was generated by
//!   [`crate::netlist::prepare_netlist`], so every data row is
//!   `index axis v_1 .. v_n i_1 .. i_m` in a known order.
//! * [`ParseStrategy::Heuristic`]: the netlist brought its own output
//!   directives and the table layout is sniffed from its header line.
//!
//! Operating-point output has a single layout and ignores the strategy.
//!
//! Any line whose lowercase form contains "error" or "fatal" marks the run
//! as failed and is never read as data, but the scan always continues.
//! Rows that do not convert cleanly are skipped whole, so every series stays
//! as long as its axis. Tables that ngspice wrapped into several blocks are
//! stitched back together by row index.

use std::collections::{BTreeMap, HashMap};

use crate::analysis::{AnalysisType, Waveform};

/// Simulator banner lines that can follow a transient table. Matched by
/// substring, exactly as listed.
pub const BANNER_MARKERS: &[&str] = &[
    "Total", "DRAM", "Maximum", "Current", "Shared", "Text", "Stack", "Library",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSimulationOutput {
    pub node_voltages: HashMap<String, Waveform>,
    pub branch_currents: HashMap<String, Waveform>,
    pub success: bool,
    /// First error/fatal line, verbatim.
    pub error: Option<String>,
    pub time_axis: Option<Vec<f64>>,
    pub frequency_axis: Option<Vec<f64>>,
    pub sweep_axis: Option<Vec<f64>>,
}

impl Default for ParsedSimulationOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl ParsedSimulationOutput {
    pub fn new() -> Self {
        Self {
            node_voltages: HashMap::new(),
            branch_currents: HashMap::new(),
            success: true,
            error: None,
            time_axis: None,
            frequency_axis: None,
            sweep_axis: None,
        }
    }

    fn record_error(&mut self, line: &str) {
        self.success = false;
        if self.error.is_none() {
            self.error = Some(line.to_string());
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut Vec<f64> {
        let slot = match axis {
            Axis::Time => &mut self.time_axis,
            Axis::Frequency => &mut self.frequency_axis,
            Axis::Sweep => &mut self.sweep_axis,
        };
        slot.get_or_insert_with(Vec::new)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseStrategy {
    Columnar {
        nodes: Vec<String>,
        sources: Vec<String>,
    },
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Time,
    Frequency,
    Sweep,
}

/// Shape of a `.print` table written for a known column list.
#[derive(Debug, Clone, Copy)]
struct TableLayout {
    axis: Axis,
    /// Case-sensitive; the header line also contains "Index".
    header_keyword: &'static str,
    /// AC values print as `re, im` pairs.
    complex_cells: bool,
    skip_banner: bool,
}

const TRAN_TABLE: TableLayout = TableLayout {
    axis: Axis::Time,
    header_keyword: "time",
    complex_cells: false,
    skip_banner: true,
};

const AC_TABLE: TableLayout = TableLayout {
    axis: Axis::Frequency,
    header_keyword: "frequency",
    complex_cells: true,
    skip_banner: false,
};

const DC_TABLE: TableLayout = TableLayout {
    axis: Axis::Sweep,
    header_keyword: "sweep",
    complex_cells: false,
    skip_banner: true,
};

pub fn parse_output(
    raw: &str,
    analysis: AnalysisType,
    strategy: &ParseStrategy,
) -> ParsedSimulationOutput {
    match (analysis, strategy) {
        (AnalysisType::OperatingPoint, _) => parse_op(raw),
        (AnalysisType::Transient, ParseStrategy::Columnar { nodes, sources }) => {
            parse_columnar(raw, &TRAN_TABLE, nodes, sources)
        }
        (AnalysisType::Ac, ParseStrategy::Columnar { nodes, .. }) => {
            parse_columnar(raw, &AC_TABLE, nodes, &[])
        }
        (AnalysisType::Dc, ParseStrategy::Columnar { nodes, sources }) => {
            parse_columnar(raw, &DC_TABLE, nodes, sources)
        }
        (AnalysisType::Transient, ParseStrategy::Heuristic) => {
            parse_heuristic_table(raw, Axis::Time, "time")
        }
        (AnalysisType::Dc, ParseStrategy::Heuristic) => {
            parse_heuristic_table(raw, Axis::Sweep, "sweep")
        }
        (AnalysisType::Ac, ParseStrategy::Heuristic) => parse_heuristic_ac(raw),
        (AnalysisType::Noise | AnalysisType::Fourier, _) => {
            let mut out = ParsedSimulationOutput::new();
            out.success = false;
            out.error = Some(format!("unsupported analysis type: {}", analysis));
            out
        }
    }
}

pub fn is_error_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("error") || lower.contains("fatal")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpSection {
    None,
    Voltage,
    Current,
}

fn parse_op(raw: &str) -> ParsedSimulationOutput {
    let mut out = ParsedSimulationOutput::new();
    let mut section = OpSection::None;

    for raw_line in raw.lines() {
        if is_error_line(raw_line) {
            out.record_error(raw_line);
            continue;
        }
        let line = raw_line.trim();

        if line.contains("Node") && line.contains("Voltage") {
            section = OpSection::Voltage;
            continue;
        }
        if line.contains("Source") && line.contains("Current") {
            section = OpSection::Current;
            continue;
        }
        if line.is_empty() || line.starts_with("----") {
            continue;
        }

        let Some((name, value)) = split_name_value(line) else {
            continue;
        };
        match section {
            OpSection::Voltage => {
                out.node_voltages
                    .insert(name.to_string(), Waveform::Scalar(value));
            }
            OpSection::Current => {
                out.branch_currents
                    .insert(name.to_string(), Waveform::Scalar(value));
            }
            OpSection::None => {}
        }
    }

    out
}

/// `<name><whitespace><number>...`; anything after the number is ignored.
fn split_name_value(line: &str) -> Option<(&str, f64)> {
    let name_end = line.find(char::is_whitespace)?;
    let (name, rest) = line.split_at(name_end);
    let number = scan_number(rest.trim_start())?;
    number.parse::<f64>().ok().map(|value| (name, value))
}

/// Longest prefix of `s` matching `[+-]?\d+\.?\d*[eE]?[+-]?\d*`.
fn scan_number(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let skip_digits = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let digits_start = i;
    i = skip_digits(i);
    if i == digits_start {
        return None;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
    }
    i = skip_digits(i);
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        i += 1;
    }
    if matches!(bytes.get(i), Some(b'+' | b'-')) {
        i += 1;
    }
    i = skip_digits(i);
    Some(&s[..i])
}

fn parse_heuristic_ac(raw: &str) -> ParsedSimulationOutput {
    let mut out = ParsedSimulationOutput::new();
    out.frequency_axis = Some(Vec::new());
    let mut data_started = false;

    for raw_line in raw.lines() {
        if is_error_line(raw_line) {
            out.record_error(raw_line);
            continue;
        }
        let line = raw_line.trim();

        let lower = line.to_ascii_lowercase();
        if lower.contains("frequency") && lower.contains("magnitude") {
            data_started = true;
            continue;
        }
        if !data_started || line.is_empty() || line.starts_with("----") {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(freq), Some(magnitude)) = (parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(freq), Ok(magnitude)) = (freq.parse::<f64>(), magnitude.parse::<f64>()) else {
            skip_row(line);
            continue;
        };
        out.axis_mut(Axis::Frequency).push(freq);
        push_sample(&mut out.node_voltages, "magnitude", magnitude);
    }

    out
}

#[derive(Debug, Clone, PartialEq)]
enum Column {
    Node(String),
    Branch(String),
    Ignored,
}

fn classify_column(name: &str) -> Column {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("v(") && lower.ends_with(')') && name.len() > 3 {
        Column::Node(name[2..name.len() - 1].to_string())
    } else if lower.contains("#branch") {
        Column::Branch(name.to_string())
    } else {
        Column::Ignored
    }
}

/// Tables whose header names the columns, e.g.
/// `Index  time  v(in)  v(out)  v1#branch`.
fn parse_heuristic_table(raw: &str, axis: Axis, axis_keyword: &str) -> ParsedSimulationOutput {
    let mut out = ParsedSimulationOutput::new();
    out.axis_mut(axis);
    let mut columns: Vec<Column> = Vec::new();
    let mut has_index = false;
    let mut data_started = false;

    for raw_line in raw.lines() {
        if is_error_line(raw_line) {
            out.record_error(raw_line);
            continue;
        }
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_ascii_lowercase();
        if lower.contains(axis_keyword) && (lower.contains("v(") || lower.contains("i(")) {
            let mut header = line.split_whitespace();
            let mut first = header.next();
            has_index = first.is_some_and(|token| token.eq_ignore_ascii_case("index"));
            if has_index {
                first = header.next();
            }
            if first.is_none() {
                continue;
            }
            columns = header.map(classify_column).collect();
            data_started = true;
            continue;
        }
        if !data_started || line.starts_with("----") {
            continue;
        }

        let mut parts = line.split_whitespace();
        if has_index {
            parts.next();
        }
        let Some(axis_value) = parts.next() else {
            continue;
        };
        let Ok(axis_value) = axis_value.parse::<f64>() else {
            skip_row(line);
            continue;
        };
        let values: Result<Vec<f64>, _> = parts.map(str::parse::<f64>).collect();
        let Ok(values) = values else {
            skip_row(line);
            continue;
        };
        if values.is_empty() || values.len() < columns.len() {
            skip_row(line);
            continue;
        }

        out.axis_mut(axis).push(axis_value);
        for (column, value) in columns.iter().zip(values) {
            match column {
                Column::Node(node) => push_sample(&mut out.node_voltages, node, value),
                Column::Branch(branch) => push_sample(&mut out.branch_currents, branch, value),
                Column::Ignored => {}
            }
        }
    }

    out
}

/// One table row, possibly spread over several wrapped blocks.
#[derive(Debug)]
struct PendingRow {
    axis: Option<f64>,
    values: Vec<Option<f64>>,
    broken: bool,
}

impl PendingRow {
    fn new(columns: usize) -> Self {
        Self {
            axis: None,
            values: vec![None; columns],
            broken: false,
        }
    }
}

/// Tables printed for a known column list: `index axis v_1..v_n i_1..i_m`.
/// Branch currents are keyed `<source lowercase>#branch`, the name the
/// simulator itself uses.
///
/// A table too wide for the output line is printed as consecutive blocks,
/// each with its own header and the same row indices. A header that differs
/// from the previous one starts the next run of columns; a repeated header
/// is a page break within the current block. Rows are committed after the
/// scan, in index order, once every block has filled them.
fn parse_columnar(
    raw: &str,
    layout: &TableLayout,
    nodes: &[String],
    sources: &[String],
) -> ParsedSimulationOutput {
    let mut out = ParsedSimulationOutput::new();
    out.axis_mut(layout.axis);

    for node in nodes {
        out.node_voltages
            .insert(node.clone(), Waveform::Series(Vec::new()));
    }
    let branch_keys: Vec<String> = sources
        .iter()
        .map(|source| format!("{}#branch", source.to_lowercase()))
        .collect();
    for key in &branch_keys {
        out.branch_currents
            .insert(key.clone(), Waveform::Series(Vec::new()));
    }

    let total = nodes.len() + branch_keys.len();
    let mut rows: BTreeMap<u64, PendingRow> = BTreeMap::new();
    let mut block_header: Option<String> = None;
    let mut offset = 0;
    let mut width = total;
    let mut in_data = false;

    for raw_line in raw.lines() {
        if is_error_line(raw_line) {
            out.record_error(raw_line);
            continue;
        }
        let line = raw_line.trim();

        if line.contains("Index") && line.contains(layout.header_keyword) {
            let columns: Vec<&str> = line.split_whitespace().skip(2).collect();
            let key = columns.join(" ");
            if block_header.as_ref().is_some_and(|previous| *previous != key) {
                offset += width;
            }
            let remaining = total.saturating_sub(offset);
            width = if columns.is_empty() {
                remaining
            } else {
                columns.len().min(remaining)
            };
            block_header = Some(key);
            in_data = true;
            continue;
        }
        if !in_data || line.is_empty() || line.starts_with('-') {
            continue;
        }
        if layout.skip_banner && BANNER_MARKERS.iter().any(|marker| line.contains(marker)) {
            continue;
        }

        let cells = if layout.complex_cells {
            complex_cells(line)
        } else {
            line.split_whitespace().collect()
        };
        if cells.len() < 3 {
            continue;
        }
        let Ok(index) = cells[0].parse::<u64>() else {
            skip_row(line);
            continue;
        };

        let row = rows.entry(index).or_insert_with(|| PendingRow::new(total));
        if width == 0 || cells.len() < 2 + width {
            row.broken = true;
            skip_row(line);
            continue;
        }
        let axis_value = cells[1].parse::<f64>();
        let values: Result<Vec<f64>, _> = cells[2..2 + width]
            .iter()
            .map(|cell| cell.parse::<f64>())
            .collect();
        let (Ok(axis_value), Ok(values)) = (axis_value, values) else {
            row.broken = true;
            skip_row(line);
            continue;
        };

        row.axis.get_or_insert(axis_value);
        for (slot, value) in row.values[offset..offset + width].iter_mut().zip(values) {
            *slot = Some(value);
        }
    }

    for (index, row) in rows {
        if row.broken {
            continue;
        }
        let values: Option<Vec<f64>> = row.values.into_iter().collect();
        let (Some(axis_value), Some(values)) = (row.axis, values) else {
            log::debug!("dropping row {} with missing columns", index);
            continue;
        };

        out.axis_mut(layout.axis).push(axis_value);
        let (node_values, branch_values) = values.split_at(nodes.len());
        for (node, value) in nodes.iter().zip(node_values) {
            push_sample(&mut out.node_voltages, node, *value);
        }
        for (key, value) in branch_keys.iter().zip(branch_values) {
            push_sample(&mut out.branch_currents, key, *value);
        }
    }

    out
}

/// Splits an AC row into cells, keeping only the leading component of each
/// complex value. `1.0, 2.0` (trailing comma) and `1.0,2.0` are one cell.
fn complex_cells(line: &str) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if let Some(leading) = token.strip_suffix(',') {
            tokens.next();
            cells.push(leading);
        } else if let Some((leading, _)) = token.split_once(',') {
            cells.push(leading);
        } else {
            cells.push(token);
        }
    }
    cells
}

fn push_sample(series: &mut HashMap<String, Waveform>, key: &str, value: f64) {
    match series.get_mut(key) {
        Some(waveform) => waveform.push(value),
        None => {
            series.insert(key.to_string(), Waveform::Series(vec![value]));
        }
    }
}

fn skip_row(line: &str) {
    log::debug!("skipping unparsable row: {}", line);
}
