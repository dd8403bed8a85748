use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use svy_cli::commands::{
    CategoryRow, CountReport, ExportSummary, JoinPathReport, MergeOutcome, VariableListing,
};
use svy_ddf::{ConnectionDescriptor, ExtractOutcome, MergeReport, SplitReport};

pub fn print_count(report: &CountReport) {
    println!("Schema: {}", report.schema.display());
    println!("Store: {}", report.store.display());
    if let Some(filter) = &report.filter {
        println!("Filter: {filter}");
    }
    println!("Respondents: {}", report.respondents);
}

pub fn print_variables(listing: &VariableListing) {
    match listing {
        VariableListing::Names(names) => {
            let mut table = Table::new();
            table.set_header(vec![header_cell("Variable")]);
            apply_table_style(&mut table);
            for name in names {
                table.add_row(vec![Cell::new(name)]);
            }
            println!("{table}");
            println!("{} variables", names.len());
        }
        VariableListing::Instances(instances) => {
            let mut table = Table::new();
            table.set_header(vec![
                header_cell("Variable"),
                header_cell("Type"),
                header_cell("Level"),
                header_cell("Max"),
                header_cell("Export"),
            ]);
            apply_table_style(&mut table);
            align_column(&mut table, 3, CellAlignment::Right);
            align_column(&mut table, 4, CellAlignment::Center);
            for instance in instances {
                let name = if instance.is_system {
                    dim_cell(&instance.name)
                } else {
                    Cell::new(&instance.name)
                };
                table.add_row(vec![
                    name,
                    Cell::new(format!("{:?}", instance.data_type)),
                    instance
                        .level
                        .as_deref()
                        .map_or_else(|| dim_cell("-"), Cell::new),
                    Cell::new(instance.max_responses),
                    flag_cell(instance.exportable),
                ]);
            }
            println!("{table}");
        }
    }
}

pub fn print_categories(rows: &[CategoryRow]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Category"),
        header_cell("Value"),
        header_cell("Label"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.name).fg(Color::Blue),
            row.value.map_or_else(|| dim_cell("-"), Cell::new),
            Cell::new(&row.label),
        ]);
    }
    println!("{table}");
}

pub fn print_join_path(report: &JoinPathReport) {
    let path = &report.path;
    println!("Variable: {}", path.name);
    println!("Generic: {}", path.generic_name);
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Table"),
        header_cell("Parent"),
        header_cell("Group"),
        header_cell("Filter"),
    ]);
    apply_table_style(&mut table);
    table.add_row(vec![
        Cell::new("L1").add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("(respondent)"),
        dim_cell("-"),
    ]);
    for step in &path.steps {
        let filter = match &step.filter {
            Some(filter) => match &filter.category {
                Some(category) => Cell::new(format!("{category} = {}", filter.value)),
                None => Cell::new(filter.value),
            },
            None => dim_cell("all"),
        };
        table.add_row(vec![
            Cell::new(&step.table).add_attribute(Attribute::Bold),
            Cell::new(&step.parent),
            Cell::new(&step.group),
            filter,
        ]);
    }
    println!("{table}");
    println!(
        "Column: {}.{} ({:?})",
        path.leaf.table, path.leaf.column, path.leaf.data_type
    );
    println!("SQL: {}", report.sql);
}

pub fn print_split(report: &SplitReport) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Part"),
        header_cell("Respondents"),
        header_cell("Store"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for shard in &report.shards {
        table.add_row(vec![
            Cell::new(&shard.part).fg(Color::Blue),
            count_cell(shard.respondents),
            Cell::new(shard.store_path.display()),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(report.total_respondents()).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");
}

pub fn print_merge(outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::Compatible { stores } => {
            println!("{stores} stores are schema-identical and can be merged");
        }
        MergeOutcome::Merged(report) => print_merge_report(report),
    }
}

fn print_merge_report(report: &MergeReport) {
    println!("Schema: {}", report.schema_path.display());
    println!("Store: {}", report.store_path.display());
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Source"),
        header_cell("Respondents"),
        header_cell("Key shift"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    for source in &report.sources {
        table.add_row(vec![
            Cell::new(source.store_path.display()),
            count_cell(source.respondents as usize),
            if source.shift == 0 {
                dim_cell(0)
            } else {
                Cell::new(format!("+{}", source.shift)).fg(Color::Yellow)
            },
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(report.respondents).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    println!("{table}");
}

pub fn print_export(summary: &ExportSummary) {
    println!(
        "Wrote {} rows x {} columns to {}",
        summary.rows,
        summary.columns,
        summary.output.display()
    );
}

pub fn print_extract(outcome: &ExtractOutcome) {
    match outcome {
        ExtractOutcome::Written { rows } => println!("Wrote {rows} values"),
        ExtractOutcome::Skipped { reason } => eprintln!("Skipped: {reason}"),
    }
}

pub fn print_connection(descriptor: &ConnectionDescriptor) {
    println!("{descriptor}");
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
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

fn count_cell(count: usize) -> Cell {
    if count == 0 {
        Cell::new(count).fg(Color::Yellow)
    } else {
        Cell::new(count)
    }
}

fn flag_cell(value: bool) -> Cell {
    if value {
        Cell::new("✓").fg(Color::Green)
    } else {
        dim_cell("-")
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
