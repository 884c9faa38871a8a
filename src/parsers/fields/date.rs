/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::DateTime;

pub static MONTH: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Obsolete named zones from RFC 5322 §4.3 plus the North American
/// abbreviations seen in legacy mail. Offsets are minutes from GMT.
static ZONES: &[(&str, i32)] = &[
    ("ut", 0),
    ("gmt", 0),
    ("est", -5 * 60),
    ("edt", -4 * 60),
    ("cst", -6 * 60),
    ("cdt", -5 * 60),
    ("mst", -7 * 60),
    ("mdt", -6 * 60),
    ("pst", -8 * 60),
    ("pdt", -7 * 60),
];

/// Parses an RFC 5322 date-time, tolerating the common deviations:
/// missing day-of-week, two-digit years, missing seconds, named or
/// missing timezones (missing means UTC), and comments.
pub fn parse_date(value: &[u8]) -> Option<DateTime> {
    let mut tokens = Vec::with_capacity(8);
    let mut token_start = None;
    let mut depth = 0usize;

    for (index, &ch) in value.iter().enumerate() {
        match ch {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth > 0 => (),
            b' ' | b'\t' | b'\r' | b'\n' | b',' => {
                if let Some(start) = token_start.take() {
                    tokens.push(&value[start..index]);
                }
            }
            _ => {
                if token_start.is_none() {
                    token_start = Some(index);
                }
            }
        }
    }
    if let Some(start) = token_start {
        tokens.push(&value[start..]);
    }

    let mut day = None;
    let mut month = None;
    let mut year = None;
    let mut time: Option<(u8, u8, u8)> = None;
    let mut zone: Option<(bool, u8, u8)> = None;

    for token in tokens {
        let text = std::str::from_utf8(token).ok()?;
        let lower = text.to_ascii_lowercase();

        if month.is_none() {
            if let Some(index) = MONTH.iter().position(|name| lower.starts_with(name)) {
                month = Some(index as u8 + 1);
                continue;
            }
        }
        if time.is_none() && text.contains(':') {
            let mut parts = text.split(':');
            let hour = parts.next()?.parse().ok()?;
            let minute = parts.next()?.parse().ok()?;
            let second = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            time = Some((hour, minute, second));
            continue;
        }
        if zone.is_none() && (text.starts_with('+') || text.starts_with('-')) && text.len() >= 3 {
            if let Ok(parsed) = text[1..].parse::<u32>() {
                zone = Some((
                    text.starts_with('-'),
                    (parsed / 100) as u8,
                    (parsed % 100) as u8,
                ));
                continue;
            }
        }
        if let Ok(number) = text.parse::<u32>() {
            if day.is_none() && number <= 31 {
                day = Some(number as u8);
            } else if year.is_none() {
                // Two-digit years per the obsolete syntax.
                year = Some(match number {
                    0..=49 => number + 2000,
                    50..=99 => number + 1900,
                    _ => number,
                } as u16);
            }
            continue;
        }
        if zone.is_none() {
            if let Some((_, offset)) = ZONES.iter().find(|(name, _)| *name == lower) {
                let minutes = offset.unsigned_abs();
                zone = Some((*offset < 0, (minutes / 60) as u8, (minutes % 60) as u8));
            }
        }
        // Day names and unknown zones are ignored.
    }

    let (hour, minute, second) = time?;
    let (tz_before_gmt, tz_hour, tz_minute) = zone.unwrap_or((false, 0, 0));
    let datetime = DateTime {
        year: year?,
        month: month?,
        day: day?,
        hour,
        minute,
        second,
        tz_before_gmt,
        tz_hour,
        tz_minute,
    };

    if datetime.month >= 1
        && datetime.month <= 12
        && datetime.day >= 1
        && datetime.day <= 31
        && datetime.hour <= 23
        && datetime.minute <= 59
        && datetime.second <= 60
    {
        Some(datetime)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rfc5322_dates() {
        for (input, expected) in [
            ("Sat, 20 Nov 2021 14:22:01 -0800", "2021-11-20T14:22:01-08:00"),
            ("Fri, 21 Nov 1997 09:55:06 -0600", "1997-11-21T09:55:06-06:00"),
            ("Tue, 1 Jul 2003 10:52:37 +0200", "2003-07-01T10:52:37+02:00"),
            ("21 Nov 97 09:55:06 GMT", "1997-11-21T09:55:06+00:00"),
            ("Nov 21 97 09:55:06 GMT", "1997-11-21T09:55:06+00:00"),
            ("Thu, 13 Feb 1969 23:32 -0330", "1969-02-13T23:32:00-03:30"),
            (
                "Thu,\r\n 13\r\n Feb\r\n 1969\r\n 23:32\r\n -0330 (Newfoundland Time)",
                "1969-02-13T23:32:00-03:30",
            ),
            ("1 Jan 2020 00:00:00 EST", "2020-01-01T00:00:00-05:00"),
            ("1 Jan 2020 00:00:00 PDT", "2020-01-01T00:00:00-07:00"),
            // Missing zone is UTC.
            ("1 Jan 2020 12:30:45", "2020-01-01T12:30:45+00:00"),
        ] {
            assert_eq!(
                parse_date(input.as_bytes()).map(|datetime| datetime.to_string()),
                Some(expected.to_string()),
                "failed for {input:?}"
            );
        }
    }

    #[test]
    fn reject_invalid_dates() {
        for input in [
            "",
            "not a date",
            "32 Jan 2020 10:00:00 +0000",
            "1 Jan 2020",
            "Jan 2020 10:00:00",
        ] {
            assert_eq!(parse_date(input.as_bytes()), None, "accepted {input:?}");
        }
    }

    #[test]
    fn two_digit_years() {
        assert_eq!(parse_date(b"1 Jan 99 10:00:00 +0000").unwrap().year, 1999);
        assert_eq!(parse_date(b"1 Jan 20 10:00:00 +0000").unwrap().year, 2020);
    }
}
