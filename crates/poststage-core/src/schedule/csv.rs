use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::{ScheduleRow, COLUMNS};

pub fn schedule_file_name(prefix: &str, written: NaiveDateTime) -> String {
    format!("{}_{}.csv", prefix, written.format("%Y-%m-%d-%H-%M-%S"))
}

/// Write the header and rows to `<dir>/<prefix>_<timestamp>.csv`.
pub fn write_schedule(dir: &Path, prefix: &str, written: NaiveDateTime, rows: &[ScheduleRow]) -> io::Result<PathBuf> {
    let path = dir.join(schedule_file_name(prefix, written));
    let mut out = BufWriter::new(File::create(&path)?);
    write_rows(&mut out, rows)?;
    out.flush()?;
    Ok(path)
}

pub fn write_rows<W: Write>(out: &mut W, rows: &[ScheduleRow]) -> io::Result<()> {
    write_record(out, COLUMNS.iter().copied())?;
    for row in rows {
        write_record(out, row.values.iter().map(String::as_str))?;
    }
    Ok(())
}

fn write_record<'a, W: Write>(out: &mut W, fields: impl Iterator<Item = &'a str>) -> io::Result<()> {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        out.write_all(quote(field).as_bytes())?;
    }
    out.write_all(b"\n")
}

fn quote(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn row(values: &[&str]) -> ScheduleRow {
        let mut values: Vec<String> = values.iter().map(|s| s.to_string()).collect();
        values.resize(COLUMNS.len(), String::new());
        ScheduleRow {
            key: "k".to_string(),
            values,
        }
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a, b"), "\"a, b\"");
        assert_eq!(quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(quote("line one\nline two"), "\"line one\nline two\"");
    }

    #[test]
    fn test_header_and_rows() {
        let mut out = Vec::new();
        write_rows(&mut out, &[row(&["Beach, day one", "2024-01-01", "19:00:00"])]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        let first = lines.next().unwrap();
        assert!(first.starts_with("\"Beach, day one\",2024-01-01,19:00:00,"));
        // separators plus the quoted comma in the caption
        assert_eq!(first.matches(',').count(), COLUMNS.len());
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_file_name() {
        let dir = tempdir().unwrap();
        let at = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        let path = write_schedule(dir.path(), "metricool", at, &[]).unwrap();
        assert_eq!(path, dir.path().join("metricool_2024-01-02-03-04-05.csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), format!("{}\n", COLUMNS.join(",")));
    }
}
