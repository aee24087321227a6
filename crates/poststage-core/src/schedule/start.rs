use std::io::{self, BufRead, Write};

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// First post slot: `post_hour` today, or tomorrow once that hour has been reached.
pub fn default_start(now: NaiveDateTime, post_hour: u32) -> NaiveDateTime {
    let slot = NaiveTime::from_hms_opt(post_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let day = if now.hour() >= post_hour {
        now.date().checked_add_days(Days::new(1)).unwrap_or(now.date())
    } else {
        now.date()
    };
    day.and_time(slot)
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD HH:MM`, the `T`-separated forms, or a bare
/// date (midnight).
pub fn parse_start(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Ask the operator to confirm `proposed`, or to enter a replacement. A replacement is
/// re-requested until it parses, then offered for confirmation again.
pub fn confirm_start<R: BufRead, W: Write>(
    proposed: NaiveDateTime,
    input: &mut R,
    output: &mut W,
) -> io::Result<NaiveDateTime> {
    let mut current = proposed;
    loop {
        write!(output, "Starting: {}. Happy (Y/n)?", current.format(DISPLAY_FORMAT))?;
        output.flush()?;
        let answer = read_answer(input)?;
        if answer.is_empty() || answer.eq_ignore_ascii_case("y") {
            return Ok(current);
        }
        current = ask_start(input, output)?;
    }
}

fn ask_start<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<NaiveDateTime> {
    loop {
        write!(output, "First post date and time (YYYY-MM-DD HH:MM:SS)")?;
        output.flush()?;
        if let Some(dt) = parse_start(&read_answer(input)?) {
            return Ok(dt);
        }
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before a start date was confirmed",
        ));
    }
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DISPLAY_FORMAT).unwrap()
    }

    #[test]
    fn test_default_start_before_hour() {
        assert_eq!(default_start(dt("2024-05-10 08:15:00"), 19), dt("2024-05-10 19:00:00"));
    }

    #[test]
    fn test_default_start_at_or_after_hour() {
        assert_eq!(default_start(dt("2024-05-10 19:00:00"), 19), dt("2024-05-11 19:00:00"));
        assert_eq!(default_start(dt("2024-12-31 23:59:59"), 19), dt("2025-01-01 19:00:00"));
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_start("2024-01-01 19:00:00"), Some(dt("2024-01-01 19:00:00")));
        assert_eq!(parse_start(" 2024-01-01 19:00 "), Some(dt("2024-01-01 19:00:00")));
        assert_eq!(parse_start("2024-01-01T07:05:09"), Some(dt("2024-01-01 07:05:09")));
        assert_eq!(parse_start("2024-01-01"), Some(dt("2024-01-01 00:00:00")));
        assert_eq!(parse_start("tomorrow"), None);
        assert_eq!(parse_start("2024-13-01 19:00:00"), None);
    }

    #[test]
    fn test_confirm_default() {
        let mut out = Vec::new();
        let start = dt("2024-01-01 19:00:00");
        assert_eq!(confirm_start(start, &mut "\n".as_bytes(), &mut out).unwrap(), start);
        assert_eq!(confirm_start(start, &mut "Y\n".as_bytes(), &mut out).unwrap(), start);
        assert!(String::from_utf8(out).unwrap().starts_with("Starting: 2024-01-01 19:00:00. Happy (Y/n)?"));
    }

    #[test]
    fn test_override_retries_until_valid() {
        let mut out = Vec::new();
        let input = "n\nnot a date\n2024-02-29 18:30\ny\n";
        let chosen = confirm_start(dt("2024-01-01 19:00:00"), &mut input.as_bytes(), &mut out).unwrap();
        assert_eq!(chosen, dt("2024-02-29 18:30:00"));
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("First post date and time").count(), 2);
        assert!(shown.contains("Starting: 2024-02-29 18:30:00"));
    }

    #[test]
    fn test_eof_is_error() {
        let mut out = Vec::new();
        let err = confirm_start(dt("2024-01-01 19:00:00"), &mut "n\n".as_bytes(), &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
