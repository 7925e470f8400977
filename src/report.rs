use crate::config::AppConfig;
use crate::core::SummaryTable;
use chrono::NaiveDate;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table,
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_BORDERS_ONLY,
};

fn get_visibility_ratio(current: f64, top: f64) -> f64 {
    if top <= 0.0 {
        1.0
    } else {
        (0.4 + 0.6 * (current / top)).max(0.4)
    }
}

fn pct_cell(value: f64, intensity: u8) -> Cell {
    let color = if value < 0.0 {
        Color::Rgb { r: intensity, g: 0, b: 0 }
    } else {
        Color::Rgb { r: 0, g: intensity, b: 0 }
    };
    Cell::new(format!("{:+.2}%", value))
        .fg(color)
        .set_alignment(CellAlignment::Right)
}

/// Renders the ranked summary to stdout. Pure presentation: everything
/// numeric was decided by the analyzer.
pub fn print_report(summary: &SummaryTable, config: &AppConfig, as_of: Option<NaiveDate>) {
    let ranked = summary.ranked();
    if ranked.is_empty() {
        println!("No data found.");
        return;
    }

    let title = match as_of {
        Some(date) => format!("PRE-MARKET SCANNER (close of {})", date.format("%d-%m-%Y")),
        None => "PRE-MARKET SCANNER".to_string(),
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Rank").add_attribute(Attribute::Bold),
            Cell::new("Symbol").add_attribute(Attribute::Bold),
            Cell::new("Group").add_attribute(Attribute::Bold),
            Cell::new("Price ($)")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Day %")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
            Cell::new("Rel Strength")
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        ]);

    let top_strength = ranked[0].1.rel_strength;
    let safe_top = if top_strength == 0.0 { 1.0 } else { top_strength };

    for (rank, (symbol, raw_row)) in ranked.iter().enumerate() {
        let row = raw_row.rounded();
        let ratio = get_visibility_ratio(row.rel_strength, safe_top);
        let cyan_val = (255.0 * ratio) as u8;
        let green_val = (255.0 * ratio) as u8;
        let gray_val = (150.0 * ratio) as u8;

        table.add_row(vec![
            Cell::new(rank + 1).fg(Color::DarkGrey),
            Cell::new(symbol).fg(Color::Rgb { r: 0, g: cyan_val, b: cyan_val }),
            Cell::new(config.group_of(symbol)).fg(Color::Rgb {
                r: gray_val,
                g: gray_val,
                b: gray_val,
            }),
            Cell::new(format!("{:.2}", row.price)).set_alignment(CellAlignment::Right),
            pct_cell(row.day_pct, green_val),
            pct_cell(row.rel_strength, green_val),
        ]);
    }

    println!("\n{}\n{}", title, table);

    if let Some(benchmark_pct) = summary.benchmark_day_pct() {
        println!(
            "{} benchmark move: {:+.2}%",
            summary.benchmark, benchmark_pct
        );
    }
}
