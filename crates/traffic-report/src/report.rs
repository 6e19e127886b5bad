//! Text and JSON renderings of an aggregation result.

use traffic_core::formatting::{format_bytes, format_count, percentage};
use traffic_core::models::AggregationResult;
use traffic_runtime::messages::{RequestId, WorkerResponse};
use unicode_width::UnicodeWidthStr;

const LABEL_WIDTH: usize = 18;
const BYTES_WIDTH: usize = 12;

/// Render `result` as the `DATA_PROCESSED` message a chart front end consumes.
pub fn render_json(id: RequestId, result: AggregationResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&WorkerResponse::DataProcessed { id, result })
}

/// Render `result` as a plain-text report: summary, charted users, trend.
pub fn render_table(result: &AggregationResult) -> String {
    let mut out = String::new();

    out.push_str("Traffic usage\n");
    summary_line(&mut out, "Total usage", &format_bytes(result.total_usage));
    summary_line(
        &mut out,
        "Users",
        &format!(
            "{} ({} significant, {} charted)",
            format_count(result.user_count as u64),
            format_count(result.significant_user_count as u64),
            format_count(result.displayed_user_count as u64),
        ),
    );
    if result.dropped_record_count > 0 {
        summary_line(
            &mut out,
            "Dropped records",
            &format_count(result.dropped_record_count as u64),
        );
    }
    if !result.top_users.is_empty() {
        summary_line(&mut out, "Top users", &result.top_users.join(", "));
    }

    if result.is_empty() {
        out.push_str("\nNo usage data.\n");
        return out;
    }

    if !result.series.is_empty() {
        let name_width = result
            .series
            .iter()
            .map(|s| s.name.width())
            .max()
            .unwrap_or(0)
            .max("User".len());

        out.push('\n');
        out.push_str(&format!(
            "{} {:>bw$} {:>7}\n",
            pad_right("User", name_width),
            "Total",
            "Share",
            bw = BYTES_WIDTH
        ));
        for series in &result.series {
            let share = percentage(series.total as f64, result.total_usage as f64, 1);
            out.push_str(&format!(
                "{} {:>bw$} {:>6.1}%\n",
                pad_right(&series.name, name_width),
                format_bytes(series.total),
                share,
                bw = BYTES_WIDTH
            ));
        }
    }

    let date_width = result
        .trend_data
        .iter()
        .map(|p| p.date.width())
        .max()
        .unwrap_or(0)
        .max("Date".len());

    out.push('\n');
    out.push_str(&format!(
        "{} {:>bw$}\n",
        pad_right("Date", date_width),
        "Usage",
        bw = BYTES_WIDTH
    ));
    for point in &result.trend_data {
        out.push_str(&format!(
            "{} {:>bw$}\n",
            pad_right(&point.date, date_width),
            format_bytes(point.value),
            bw = BYTES_WIDTH
        ));
    }

    out
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn summary_line(out: &mut String, label: &str, value: &str) {
    out.push_str("  ");
    out.push_str(&pad_right(&format!("{label}:"), LABEL_WIDTH));
    out.push_str(value);
    out.push('\n');
}

/// Pad `s` with spaces to `width` terminal columns.
fn pad_right(s: &str, width: usize) -> String {
    let padding = width.saturating_sub(s.width());
    format!("{}{}", s, " ".repeat(padding))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
