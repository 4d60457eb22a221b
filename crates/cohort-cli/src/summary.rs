use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use cohort_cli::types::CommandSummary;
use cohort_model::{DriftSummary, Severity};

pub fn print_summary(summary: &CommandSummary) {
    println!("Command: {}", summary.command);
    let mut table = Table::new();
    table.set_header(vec![header_cell("Measure"), header_cell("Count")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![
        Cell::new("records").add_attribute(Attribute::Bold),
        Cell::new(summary.records).add_attribute(Attribute::Bold),
    ]);
    for (label, value) in &summary.counts {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    table.add_row(vec![
        Cell::new("warnings"),
        count_cell(summary.diagnostics.warning_count(), Color::Yellow),
    ]);
    println!("{table}");

    if !summary.outputs.is_empty() {
        println!("Outputs:");
        for path in &summary.outputs {
            println!("  {}", path.display());
        }
    }
    if let Some(drift) = &summary.drift {
        print_drift(drift);
    }
    print_diagnostics(summary);
}

fn print_drift(drift: &DriftSummary<u32>) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Items"),
        header_cell("Count"),
        header_cell("Examples"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![
        Cell::new("in both"),
        Cell::new(drift.both.len()),
        dim_cell("-"),
    ]);
    table.add_row(vec![
        Cell::new("data only"),
        count_cell(drift.data_only.len(), Color::Yellow),
        Cell::new(examples(&drift.data_only)),
    ]);
    table.add_row(vec![
        Cell::new("dictionary only"),
        count_cell(drift.dictionary_only.len(), Color::Yellow),
        Cell::new(examples(&drift.dictionary_only)),
    ]);
    println!("Reference drift (data {} / dictionary {}):", drift.data_qty, drift.dictionary_qty);
    println!("{table}");
}

fn print_diagnostics(summary: &CommandSummary) {
    if summary.diagnostics.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Severity"),
        header_cell("Stage"),
        header_cell("Count"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);
    for diagnostic in summary.diagnostics.iter() {
        table.add_row(vec![
            severity_cell(diagnostic.severity),
            Cell::new(&diagnostic.stage),
            Cell::new(diagnostic.count),
            Cell::new(&diagnostic.message),
        ]);
    }
    println!("{table}");
}

/// First few items, comma separated.
fn examples(items: &std::collections::BTreeSet<u32>) -> String {
    const LIMIT: usize = 8;
    if items.is_empty() {
        return "-".to_string();
    }
    let mut shown: Vec<String> = items.iter().take(LIMIT).map(ToString::to_string).collect();
    if items.len() > LIMIT {
        shown.push("...".to_string());
    }
    shown.join(", ")
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
        Severity::Info => dim_cell("INFO"),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count == 0 {
        dim_cell(count)
    } else {
        Cell::new(count).fg(color)
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
