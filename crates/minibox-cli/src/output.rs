//! Formatted output helpers for CLI commands.

use std::process::ExitCode;

/// Spaces between table columns.
const COLUMN_GAP: usize = 3;

/// Lays out `rows` under `headers` as left-aligned columns, each as wide as
/// its widest cell.
#[must_use]
pub fn format_table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) -> String {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &widths, headers.iter().copied());
    for row in rows {
        push_row(&mut out, &widths, row.iter().map(String::as_str));
    }
    out
}

fn push_row<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let mut line = String::new();
    for (cell, width) in cells.zip(widths) {
        line.push_str(cell);
        let pad = width - cell.chars().count() + COLUMN_GAP;
        line.extend(std::iter::repeat_n(' ', pad));
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Converts a container exit status into the process exit code.
#[must_use]
pub fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(exit_status(code))
}

fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_widen_to_the_longest_cell() {
        let table = format_table(
            ["ID", "NAME"],
            &[
                ["1234567890".to_string(), "web".to_string()],
                ["1".to_string(), "database".to_string()],
            ],
        );
        assert_eq!(
            table,
            "ID           NAME\n1234567890   web\n1            database\n"
        );
    }

    #[test]
    fn header_only_when_empty() {
        assert_eq!(format_table(["NAME", "DRIVER"], &[]), "NAME   DRIVER\n");
    }

    #[test]
    fn out_of_range_status_fails() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(137), 137);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }
}
