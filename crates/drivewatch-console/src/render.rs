/// Plain-text and JSON rendering of the drive table.
use crate::state::{ConsoleRow, ReconcileSummary};
use drivewatch_core::model::size::{format_size, format_space, usage_percent};

const HEADERS: [&str; 5] = ["Type", "Path", "Label", "Capacity", "Used"];

/// Render `rows` as an aligned table with a header line.
pub fn render_rows(rows: &[ConsoleRow]) -> String {
    let cells: Vec<[String; 5]> = rows.iter().map(row_cells).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &HEADERS.map(str::to_owned)[..], &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule[..], &widths);
    for row in &cells {
        push_line(&mut out, &row[..], &widths);
    }
    if rows.is_empty() {
        out.push_str("(no drives)\n");
    }
    out
}

fn row_cells(row: &ConsoleRow) -> [String; 5] {
    let (capacity, used) = match &row.space {
        Some(space) => (format_space(space), format!("{:.0}%", usage_percent(space))),
        None => ("-".to_owned(), "-".to_owned()),
    };
    [
        row.drive_type.label().to_owned(),
        row.path.clone(),
        row.label.clone(),
        capacity,
        used,
    ]
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<w$}", cell.as_ref(), w = *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// One-line description of a reconcile pass.
pub fn render_summary(summary: &ReconcileSummary, total: usize) -> String {
    format!(
        "{total} drives ({} added, {} removed, {} updated)",
        summary.added, summary.removed, summary.updated
    )
}

/// Total capacity across all rows that report one.
pub fn render_total(rows: &[ConsoleRow]) -> String {
    let total: u64 = rows
        .iter()
        .filter_map(|r| r.space.map(|s| s.total_bytes))
        .sum();
    format!("Total capacity: {}", format_size(total))
}

/// Rows as a pretty-printed JSON array.
pub fn render_json(rows: &[ConsoleRow]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use drivewatch_core::model::VolumeSpace;
    use drivewatch_core::{DriveKey, DriveType};

    fn row(path: &str, label: &str, space: Option<VolumeSpace>) -> ConsoleRow {
        ConsoleRow {
            key: DriveKey(1),
            drive_type: DriveType::Fixed,
            path: path.to_owned(),
            label: label.to_owned(),
            device_id: None,
            space,
            updated_at: Local::now(),
        }
    }

    #[test]
    fn test_render_rows_aligns_columns() {
        let rows = vec![
            row(
                "C:",
                "Local Disk (C:)",
                Some(VolumeSpace {
                    total_bytes: 2 * 1_073_741_824,
                    free_bytes: 1_073_741_824,
                }),
            ),
            row("E:", "E:", None),
        ];
        let table = render_rows(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Type"));
        assert!(lines[2].contains("1.00 GB free of 2.00 GB"));
        assert!(lines[2].ends_with("50%"));
        assert!(lines[3].ends_with('-'));
        // Path column starts at the same offset on every line.
        let offset = lines[0].find("Path").unwrap();
        assert_eq!(&lines[2][offset..offset + 2], "C:");
        assert_eq!(&lines[3][offset..offset + 2], "E:");
    }

    #[test]
    fn test_render_empty() {
        assert!(render_rows(&[]).ends_with("(no drives)\n"));
    }

    #[test]
    fn test_render_json_skips_key() {
        let json = render_json(&[row("C:", "Local Disk (C:)", None)]).unwrap();
        assert!(json.contains("\"path\": \"C:\""));
        assert!(!json.contains("\"key\""));
    }

    #[test]
    fn test_render_total() {
        let rows = vec![row(
            "C:",
            "C:",
            Some(VolumeSpace {
                total_bytes: 1_048_576,
                free_bytes: 0,
            }),
        )];
        assert_eq!(render_total(&rows), "Total capacity: 1.0 MB");
    }
}
