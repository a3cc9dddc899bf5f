//! Front matter date parsing.
//!
//! Accepts the shapes generators accept in practice:
//!
//! - `2024-06-15`
//! - `2024-06-15T14:30` / `2024-06-15 14:30:45`
//! - `2024-06-15T14:30:45.123Z` / `2024-06-15T14:30:45+02:00`
//!
//! Only the calendar fields are kept; the offset is checked for shape and
//! range but not applied.

use anyhow::{Result, bail};

/// A validated calendar date with optional time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontMatterDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl FrontMatterDate {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Parse a date or datetime string.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = s.trim().as_bytes();
        if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            bail!("expected YYYY-MM-DD");
        }

        let (Some(year), Some(month), Some(day)) = (
            parse_u16(&bytes[0..4]),
            parse_u8(&bytes[5..7]),
            parse_u8(&bytes[8..10]),
        ) else {
            bail!("expected YYYY-MM-DD");
        };

        let (hour, minute, second) = match bytes.get(10) {
            None => (0, 0, 0),
            Some(b'T' | b't' | b' ') => parse_time(&bytes[11..])?,
            Some(_) => bail!("unexpected text after the date"),
        };

        let date = Self::new(year, month, day, hour, minute, second);
        date.validate()?;
        Ok(date)
    }

    pub fn validate(self) -> Result<()> {
        let Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        } = self;

        if !(1..=12).contains(&month) {
            bail!("month is invalid: {month}");
        }
        let max_days = Self::days_in_month(year, month);
        if day == 0 || day > max_days {
            bail!("day is invalid: {day}");
        }
        if hour > 23 {
            bail!("hour is invalid: {hour}");
        }
        if minute > 59 {
            bail!("minute is invalid: {minute}");
        }
        // 60 allows a leap second
        if second > 60 {
            bail!("second is invalid: {second}");
        }
        Ok(())
    }

    #[inline]
    #[allow(clippy::manual_is_multiple_of)] // Manual impl for const fn
    const fn is_leap_year(year: u16) -> bool {
        year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
    }

    #[inline]
    const fn days_in_month(year: u16, month: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if Self::is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }
}

/// Parse `HH:MM[:SS[.fff]][Z|±HH:MM|±HHMM]`.
fn parse_time(bytes: &[u8]) -> Result<(u8, u8, u8)> {
    if bytes.len() < 5 || bytes[2] != b':' {
        bail!("expected HH:MM after the date");
    }
    let (Some(hour), Some(minute)) = (parse_u8(&bytes[0..2]), parse_u8(&bytes[3..5])) else {
        bail!("expected HH:MM after the date");
    };

    let mut rest = &bytes[5..];
    let mut second = 0;
    if let [b':', a, b, tail @ ..] = rest {
        second = parse_u8(&[*a, *b]).ok_or_else(|| anyhow::anyhow!("seconds are invalid"))?;
        rest = tail;
    }
    if let [b'.', tail @ ..] = rest {
        let digits = tail.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            bail!("fractional seconds are empty");
        }
        rest = &tail[digits..];
    }

    match rest {
        [] | [b'Z' | b'z'] => {}
        [b'+' | b'-', h1, h2, b':', m1, m2] | [b'+' | b'-', h1, h2, m1, m2] => {
            let (Some(oh), Some(om)) = (parse_u8(&[*h1, *h2]), parse_u8(&[*m1, *m2])) else {
                bail!("offset is invalid");
            };
            if oh > 23 || om > 59 {
                bail!("offset is invalid");
            }
        }
        _ => bail!("unexpected text after the time"),
    }

    Ok((hour, minute, second))
}

/// Parse 2-digit ASCII number
#[inline]
fn parse_u8(bytes: &[u8]) -> Option<u8> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = bytes[0].wrapping_sub(b'0');
    let d2 = bytes[1].wrapping_sub(b'0');
    if d1 > 9 || d2 > 9 {
        return None;
    }
    Some(d1 * 10 + d2)
}

/// Parse 4-digit ASCII number
#[inline]
fn parse_u16(bytes: &[u8]) -> Option<u16> {
    if bytes.len() != 4 {
        return None;
    }
    let mut result = 0u16;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        result = result * 10 + u16::from(d);
    }
    Some(result)
}
