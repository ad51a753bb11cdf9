//! Offline risk calculation for a single position.

use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{output, RiskArgs};
use crate::domain::{MarginType, PositionSnapshot, Symbol};
use crate::risk::{compute_risk_metrics, RiskMetrics, MAINTENANCE_MARGIN_RATE};
use crate::store::PositionRisk;

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct PositionRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Mark")]
    mark: String,
    #[tabled(rename = "Liq. Price")]
    liquidation: String,
    #[tabled(rename = "Margin Ratio")]
    margin_ratio: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "ROE")]
    roe: String,
    #[tabled(rename = "Level")]
    level: String,
}

/// Build the position described by `args`.
pub(crate) fn position_from_args(args: &RiskArgs) -> PositionSnapshot {
    let mark = args.mark.unwrap_or(args.entry);
    let isolated_margin = args.isolated_margin.unwrap_or(0.0);
    PositionSnapshot {
        symbol: Symbol::new(&args.symbol),
        position_amount: args.amount,
        entry_price: args.entry,
        mark_price: mark,
        leverage: args.leverage,
        margin_type: if args.isolated_margin.is_some() {
            MarginType::Isolated
        } else {
            MarginType::Cross
        },
        isolated_margin,
        unrealized_profit: args
            .pnl
            .unwrap_or(args.amount * (mark - args.entry)),
        ..PositionSnapshot::default()
    }
}

/// Compute and print metrics for the position described on the command line.
pub fn execute(args: &RiskArgs) {
    let position = position_from_args(args);
    let balance = if position.is_isolated() {
        position.isolated_margin
    } else {
        args.balance
    };
    let metrics = compute_risk_metrics(&position, balance);
    let level = metrics.level();

    if args.json {
        output::json_output(json!({
            "symbol": position.symbol,
            "marginType": position.margin_type.to_string(),
            "metrics": metrics,
            "level": level,
        }));
        return;
    }

    output::header(env!("CARGO_PKG_VERSION"));
    output::section("Position");
    output::field("Symbol", &position.symbol);
    output::field("Side", side(&position));
    output::field("Size", format!("{:.4}", position.size()));
    output::field("Entry", format!("{:.4}", position.entry_price));
    output::field("Mark", format!("{:.4}", position.mark_price));
    output::field("Leverage", format!("{}x", position.leverage));
    output::field("Margin", &position.margin_type);
    output::field("Margin pool", format!("{balance:.2}"));

    output::section("Risk");
    let mut table = Table::new(metric_rows(&metrics));
    table.with(Style::rounded());
    output::lines(&table.to_string());
    output::field("Level", output::level(level));
    output::note(&format!(
        "Maintenance margin rate {:.2}% (flat approximation)",
        MAINTENANCE_MARGIN_RATE * 100.0
    ));
}

fn side(position: &PositionSnapshot) -> &'static str {
    if position.is_long() {
        "long"
    } else if position.is_short() {
        "short"
    } else {
        "flat"
    }
}

fn metric_rows(metrics: &RiskMetrics) -> Vec<MetricRow> {
    vec![
        MetricRow {
            metric: "Notional",
            value: format!("{:.2}", metrics.notional_value),
        },
        MetricRow {
            metric: "Initial margin",
            value: format!("{:.2}", metrics.initial_margin),
        },
        MetricRow {
            metric: "Maintenance margin",
            value: format!("{:.2}", metrics.maintenance_margin),
        },
        MetricRow {
            metric: "Liquidation price",
            value: format!("{:.2}", metrics.liquidation_price),
        },
        MetricRow {
            metric: "Margin ratio",
            value: format!("{:.2}%", metrics.margin_ratio_percent),
        },
        MetricRow {
            metric: "ROI",
            value: output::signed(metrics.roi_percent, format!("{:.2}%", metrics.roi_percent)),
        },
        MetricRow {
            metric: "ROE",
            value: output::signed(metrics.roe_percent, format!("{:.2}%", metrics.roe_percent)),
        },
        MetricRow {
            metric: "Distance to liq.",
            value: format!("{:.2}%", metrics.distance_to_liquidation_percent),
        },
    ]
}

/// Render a multi-position risk report as a table.
pub fn render_report(report: &[PositionRisk]) -> String {
    let rows: Vec<PositionRow> = report
        .iter()
        .map(|r| PositionRow {
            symbol: r.symbol.to_string(),
            size: format!("{:.4}", r.position.position_amount),
            mark: format!("{:.4}", r.position.mark_price),
            liquidation: format!("{:.4}", r.metrics.liquidation_price),
            margin_ratio: format!("{:.2}%", r.metrics.margin_ratio_percent),
            distance: format!("{:.2}%", r.metrics.distance_to_liquidation_percent),
            roe: output::signed(r.metrics.roe_percent, format!("{:.2}%", r.metrics.roe_percent)),
            level: output::level(r.level),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}
