use anyhow::{Error, ensure};
use charming::{
    Chart, ImageFormat, ImageRenderer,
    component::{Axis, Legend, Title},
    element::{AxisLabel, AxisType, ItemStyle, LineStyle, SplitLine, TextStyle},
    series::Bar,
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tabled::{Table, Tabled, settings::Style};

use crate::delta::Delta;
use crate::engine::ReportRow;

#[derive(Tabled)]
struct TableLine {
    #[tabled(rename = "Ticker")]
    symbol: String,
    #[tabled(rename = "Book Cost")]
    book_cost: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "")]
    total_icon: &'static str,
    #[tabled(rename = "Δ Total")]
    total_amount: String,
    #[tabled(rename = "% Total")]
    total_pct: String,
    #[tabled(rename = "")]
    week_icon: &'static str,
    #[tabled(rename = "Δ Week")]
    week_amount: String,
    #[tabled(rename = "% Week")]
    week_pct: String,
}

fn signed(value: Decimal) -> String {
    if value > Decimal::ZERO {
        format!("+{:.2}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn line(row: &ReportRow) -> TableLine {
    let Delta {
        amount: total_amount,
        pct: total_pct,
        indicator: total,
    } = row.since_inception;
    let Delta {
        amount: week_amount,
        pct: week_pct,
        indicator: week,
    } = row.since_week;

    TableLine {
        symbol: row.symbol.clone(),
        book_cost: format!("{:.2}", row.book_cost),
        current: format!("{:.2}", row.current_price),
        total_icon: total.glyph(),
        total_amount: signed(total_amount),
        total_pct: format!("{}%", signed(total_pct)),
        week_icon: week.glyph(),
        week_amount: signed(week_amount),
        week_pct: format!("{}%", signed(week_pct)),
    }
}

/// Monospaced table of a report, one line per row in report order.
pub fn table(rows: &[ReportRow]) -> String {
    let mut table = Table::new(rows.iter().map(line));
    table.with(Style::psql());
    table.to_string()
}

/// PNG bar chart of the total and weekly percentage change per symbol.
pub fn chart(rows: &[ReportRow]) -> Result<Vec<u8>, Error> {
    ensure!(!rows.is_empty(), "rows is empty");

    const WIDTH: u32 = 1200;
    const HEIGHT: u32 = 600;

    let symbols: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
    let total: Vec<f64> = rows
        .iter()
        .map(|r| r.since_inception.pct.to_f64().unwrap_or(0.0))
        .collect();
    let week: Vec<f64> = rows
        .iter()
        .map(|r| r.since_week.pct.to_f64().unwrap_or(0.0))
        .collect();

    let chart = Chart::new()
        .background_color("#0b0c17")
        .title(
            Title::new()
                .text("% change")
                .left("center")
                .top("2%")
                .text_style(TextStyle::new().color("#ffffff").font_size(14)),
        )
        .legend(Legend::new().top("8%"))
        .x_axis(
            Axis::new()
                .type_(AxisType::Category)
                .data(symbols)
                .axis_label(AxisLabel::new().color("#a0a0a0")),
        )
        .y_axis(
            Axis::new()
                .type_(AxisType::Value)
                .axis_label(AxisLabel::new().color("#a0a0a0"))
                .split_line(SplitLine::new().line_style(LineStyle::new().color("#2d2f45"))),
        )
        .series(
            Bar::new()
                .name("Since book cost")
                .data(total)
                .item_style(ItemStyle::new().color("#0064FF")),
        )
        .series(
            Bar::new()
                .name("Since last week")
                .data(week)
                .item_style(ItemStyle::new().color("#FF6400")),
        );

    let mut renderer = ImageRenderer::new(WIDTH, HEIGHT);
    let png_bytes = renderer.render_format(ImageFormat::Png, &chart)?;
    Ok(png_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PriceSource;
    use rust_decimal_macros::dec;

    fn row(symbol: &str, book: Decimal, current: Decimal, week_ago: Decimal) -> ReportRow {
        ReportRow {
            symbol: symbol.to_string(),
            book_cost: book,
            current_price: current,
            since_inception: Delta::between(current, book),
            since_week: Delta::between(current, week_ago),
            source: PriceSource::Batch,
        }
    }

    #[test]
    fn table_keeps_row_order_and_signs() {
        let rows = vec![
            row("BBB", dec!(50.00), dec!(45.00), dec!(48.00)),
            row("AAA", dec!(100.00), dec!(110.00), dec!(105.00)),
        ];

        let out = table(&rows);

        assert!(out.contains("Ticker"));
        assert!(out.find("BBB").unwrap() < out.find("AAA").unwrap());
        assert!(out.contains("+10.00%"));
        assert!(out.contains("-6.25%"));
        assert!(out.contains("🟥"));
        assert!(out.contains("🟩"));
    }

    #[test]
    fn neutral_values_have_no_sign() {
        let rows = vec![row("FLAT", dec!(10.00), dec!(10.00), dec!(10.00))];
        let out = table(&rows);

        assert!(out.contains("0.00%"));
        assert!(!out.contains("+0.00"));
        assert!(out.contains("➖"));
    }

    #[test]
    fn chart_requires_rows() {
        assert!(chart(&[]).is_err());
    }
}
