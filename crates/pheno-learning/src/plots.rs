//! Plain-text charts for terminal output.
//!
//! Every renderer returns a `String` so the CLI can print it and tests can
//! inspect it.

use crate::coefficients::CoefficientTable;
use crate::metrics::{ClassScores, ConfusionMatrix};
use std::fmt::Write;
use tracing::warn;

const SHADES: [char; 5] = [' ', '░', '▒', '▓', '█'];
const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Default bar width in characters.
pub const DEFAULT_BAR_WIDTH: usize = 40;

fn render_bar(value: f64, max: f64, width: usize) -> String {
    let ratio = if max > 0.0 { value / max } else { 0.0 };
    let filled = ((ratio * width as f64) as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn label_width<'a>(labels: impl Iterator<Item = &'a str>) -> usize {
    labels.map(|l| l.chars().count()).max().unwrap_or(0).min(32)
}

/// Horizontal bar chart of `(label, value)` pairs, scaled to the largest value.
pub fn bar_chart(title: &str, entries: &[(String, f64)], width: usize) -> String {
    let mut out = format!("{title}\n");
    let max = entries.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let pad = label_width(entries.iter().map(|(l, _)| l.as_str()));

    for (label, value) in entries {
        let _ = writeln!(
            out,
            "  {:<pad$} {} {:.4}",
            truncate(label, pad),
            render_bar(*value, max, width),
            value
        );
    }
    out
}

/// Bar chart of per-class scores on a fixed `[0, 1]` scale.
pub fn scores_chart(title: &str, scores: &ClassScores, width: usize) -> String {
    let mut out = format!("{title}\n");
    let pad = label_width(scores.labels.iter().map(String::as_str));
    for (label, score) in scores.iter() {
        let _ = writeln!(
            out,
            "  {:<pad$} {} {:.3}",
            truncate(label, pad),
            render_bar(score, 1.0, width),
            score
        );
    }
    out
}

/// Confusion matrix with counts, shaded by row share.
///
/// Rows are true labels, columns predicted labels.
pub fn confusion_heatmap(cm: &ConfusionMatrix) -> String {
    let pad = label_width(cm.labels.iter().map(String::as_str)).max(4);
    let cell = cm
        .counts
        .iter()
        .map(|c| c.to_string().len())
        .max()
        .unwrap_or(1)
        .max(3)
        + 2;

    let mut out = format!("{:<pad$} │", "true");
    for j in 0..cm.labels.len() {
        let _ = write!(out, "{:>cell$}", format!("p{j}"));
    }
    out.push('\n');

    for (i, label) in cm.labels.iter().enumerate() {
        let row = cm.counts.row(i);
        let row_total: usize = row.iter().sum();
        let _ = write!(out, "{:<pad$} │", truncate(label, pad));
        for &count in row.iter() {
            let share = if row_total > 0 {
                count as f64 / row_total as f64
            } else {
                0.0
            };
            let _ = write!(out, "{:>w$}{}", count, shade(share), w = cell - 1);
        }
        out.push('\n');
    }

    out.push_str("columns: ");
    let legend: Vec<String> = cm
        .labels
        .iter()
        .enumerate()
        .map(|(j, l)| format!("p{j}={l}"))
        .collect();
    out.push_str(&legend.join(", "));
    out.push('\n');
    out
}

fn shade(ratio: f64) -> char {
    let idx = (ratio.clamp(0.0, 1.0) * (SHADES.len() - 1) as f64).round() as usize;
    SHADES[idx]
}

/// Shaded heatmap of the coefficient table, scaled to its largest value.
pub fn coefficient_heatmap(title: &str, table: &CoefficientTable) -> String {
    let max = table.values.iter().copied().fold(0.0, f64::max);
    let pad = label_width(table.feature_names.iter().map(String::as_str));

    let mut out = format!("{title}\n");
    let _ = writeln!(
        out,
        "  {:<pad$} │{}",
        "",
        (0..table.n_classes()).map(|j| format!("{:>2}", j % 100)).collect::<String>()
    );
    for (i, feature) in table.feature_names.iter().enumerate() {
        let cells: String = table
            .values
            .row(i)
            .iter()
            .map(|&v| {
                let c = shade(if max > 0.0 { v / max } else { 0.0 });
                format!("{c}{c}")
            })
            .collect();
        let _ = writeln!(out, "  {:<pad$} │{}", truncate(feature, pad), cells);
    }

    let legend: Vec<String> = table
        .classes
        .iter()
        .enumerate()
        .map(|(j, c)| format!("{j}={c}"))
        .collect();
    let _ = writeln!(out, "  classes: {}", legend.join(", "));
    out
}

/// Heatmap with features and classes in average-linkage leaf order.
pub fn clustered_heatmap(title: &str, table: &CoefficientTable) -> String {
    let (rows, cols) = table.cluster_order();
    coefficient_heatmap(title, &table.reordered(&rows, &cols))
}

/// Sparkline of a density curve.
pub fn sparkline(values: &[f64]) -> String {
    let max = values.iter().copied().fold(0.0, f64::max);
    values
        .iter()
        .map(|&v| {
            let ratio = if max > 0.0 { v / max } else { 0.0 };
            let idx = (ratio.clamp(0.0, 1.0) * (SPARKS.len() - 1) as f64).round() as usize;
            SPARKS[idx]
        })
        .collect()
}

/// One density sparkline per class over a shared value grid.
///
/// Classes whose coefficients cannot be smoothed (fewer than two features,
/// or no spread) are listed as constant.
pub fn density_plot(title: &str, table: &CoefficientTable, points: usize) -> String {
    let grid = table.value_grid(points);
    let pad = label_width(table.classes.iter().map(String::as_str));
    let mut out = format!("{title}\n");

    for class in &table.classes {
        match table.density(class, &grid) {
            Ok(density) => {
                let _ = writeln!(out, "  {:<pad$} {}", truncate(class, pad), sparkline(&density));
            }
            Err(e) => {
                warn!("No density for '{}': {}", class, e);
                let _ = writeln!(out, "  {:<pad$} (constant)", truncate(class, pad));
            }
        }
    }
    if let (Some(first), Some(last)) = (grid.first(), grid.last()) {
        let _ = writeln!(out, "  {:<pad$} {:.4} .. {:.4}", "", first, last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn table() -> CoefficientTable {
        CoefficientTable {
            feature_names: strings(&["f1", "f2", "f3"]),
            classes: strings(&["a", "b"]),
            values: array![[0.0, 1.0], [0.5, 0.2], [0.9, 0.1]],
        }
    }

    #[test]
    fn test_bar_scaled_to_max() {
        assert_eq!(render_bar(5.0, 10.0, 4), "██░░");
        assert_eq!(render_bar(10.0, 10.0, 4), "████");
        assert_eq!(render_bar(1.0, 0.0, 3), "░░░");
    }

    #[test]
    fn test_bar_chart_lists_entries_in_order() {
        let chart = bar_chart(
            "weights",
            &[("first".to_string(), 2.0), ("second".to_string(), 1.0)],
            10,
        );
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines[0], "weights");
        assert!(lines[1].contains("first") && lines[1].contains("██████████"));
        assert!(lines[2].contains("second") && lines[2].contains("█████░░░░░"));
    }

    #[test]
    fn test_confusion_heatmap_counts() {
        let cm = ConfusionMatrix {
            labels: strings(&["a", "b"]),
            counts: array![[3, 1], [0, 4]],
        };
        let rendered = confusion_heatmap(&cm);
        assert_eq!(rendered.lines().count(), 4);
        assert!(rendered.contains("p0=a, p1=b"));
        assert!(rendered.lines().nth(2).is_some_and(|l| l.contains('4') && l.contains('█')));
    }

    #[test]
    fn test_sparkline_peaks_at_max() {
        assert_eq!(sparkline(&[0.0, 0.5, 1.0]), "▁▅█");
        assert_eq!(sparkline(&[0.0, 0.0]), "▁▁");
    }

    #[test]
    fn test_clustered_heatmap_keeps_every_feature() {
        let rendered = clustered_heatmap("clustered", &table());
        for feature in ["f1", "f2", "f3"] {
            assert!(rendered.contains(feature));
        }
        assert!(rendered.contains("classes:"));
    }

    #[test]
    fn test_density_plot_marks_constant_classes() {
        let constant = CoefficientTable {
            feature_names: strings(&["f1", "f2"]),
            classes: strings(&["flat", "spread"]),
            values: array![[0.3, 0.0], [0.3, 1.0]],
        };
        let rendered = density_plot("density", &constant, 16);
        assert!(rendered.contains("(constant)"));
        let spread = rendered.lines().find(|l| l.contains("spread")).unwrap();
        assert_eq!(spread.chars().filter(|c| SPARKS.contains(c)).count(), 16);
    }
}
