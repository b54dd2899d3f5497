//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Temporal datatypes: `time`, `date`, `dateTime` and the two XML
//! Schema duration types.
//!
//! Duration arithmetic follows the XML Schema algorithm: year/month
//! components are applied field-wise with end-of-month clamping, never
//! as a fixed number of seconds.  Values without a timezone compare as
//! if they were UTC, which keeps the order total (see DESIGN.md).

use super::LexicalError;
use crate::errors::{EvalResult, Indeterminate};
use chrono::{Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Split a trailing timezone designator off a lexical form.
fn split_offset(lexical: &str) -> Result<(&str, Option<FixedOffset>), LexicalError> {
    if let Some(body) = lexical.strip_suffix('Z') {
        let utc = FixedOffset::east_opt(0).expect("zero offset");
        return Ok((body, Some(utc)));
    }
    let bytes = lexical.as_bytes();
    if bytes.len() >= 6 {
        let sign_pos = bytes.len() - 6;
        let sign = bytes[sign_pos];
        if (sign == b'+' || sign == b'-') && bytes[bytes.len() - 3] == b':' {
            let body = &lexical[..sign_pos];
            let hh: i32 = lexical[sign_pos + 1..sign_pos + 3]
                .parse()
                .map_err(|_| LexicalError::new("timezone", lexical))?;
            let mm: i32 = lexical[bytes.len() - 2..]
                .parse()
                .map_err(|_| LexicalError::new("timezone", lexical))?;
            if hh > 14 || mm > 59 {
                return Err(LexicalError::new("timezone", lexical));
            }
            let mut secs = (hh * 60 + mm) * 60;
            if sign == b'-' {
                secs = -secs;
            }
            let offset = FixedOffset::east_opt(secs)
                .ok_or_else(|| LexicalError::new("timezone", lexical))?;
            return Ok((body, Some(offset)));
        }
    }
    Ok((lexical, None))
}

fn print_offset(offset: Option<FixedOffset>) -> String {
    match offset {
        None => String::new(),
        Some(o) => {
            let secs = o.local_minus_utc();
            if secs == 0 {
                "Z".to_string()
            } else {
                let sign = if secs < 0 { '-' } else { '+' };
                let abs = secs.abs();
                format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}

fn print_fraction(nanos: u32) -> String {
    if nanos == 0 {
        String::new()
    } else {
        let mut frac = format!(".{nanos:09}");
        while frac.ends_with('0') {
            frac.pop();
        }
        frac
    }
}

/// An `xs:dateTime` with optional timezone.
#[derive(Debug, Clone)]
pub struct XDateTime {
    dt: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl XDateTime {
    /// Parse an XML Schema dateTime lexical form.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on malformed input.
    pub fn parse(lexical: &str) -> Result<XDateTime, LexicalError> {
        let (body, offset) = split_offset(lexical)?;
        let dt = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|_| LexicalError::new("dateTime", lexical))?;
        Ok(XDateTime { dt, offset })
    }

    #[must_use]
    pub fn new(dt: NaiveDateTime, offset: Option<FixedOffset>) -> XDateTime {
        XDateTime { dt, offset }
    }

    #[must_use]
    pub fn naive(&self) -> NaiveDateTime {
        self.dt
    }

    #[must_use]
    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// The instant this value denotes, with unzoned values read as
    /// UTC: (seconds, subsecond nanos).
    fn instant(&self) -> (i64, u32) {
        let utc = self.dt.and_utc();
        let shift = self.offset.map_or(0, |o| i64::from(o.local_minus_utc()));
        (utc.timestamp() - shift, utc.timestamp_subsec_nanos())
    }

    #[must_use]
    pub fn compare(&self, other: &XDateTime) -> Ordering {
        self.instant().cmp(&other.instant())
    }

    /// Add (or with `negate`, subtract) a day/time duration.
    ///
    /// # Errors
    ///
    /// `ProcessingError` if the result is outside the representable
    /// range.
    pub fn add_day_time(&self, d: &DayTimeDuration, negate: bool) -> EvalResult<XDateTime> {
        let millis = if negate { -d.millis() } else { d.millis() };
        self.dt
            .checked_add_signed(Duration::milliseconds(millis))
            .map(|dt| XDateTime {
                dt,
                offset: self.offset,
            })
            .ok_or_else(|| Indeterminate::processing("dateTime arithmetic overflow"))
    }

    /// Add (or with `negate`, subtract) a year/month duration using
    /// the field-wise XML Schema algorithm.
    ///
    /// # Errors
    ///
    /// `ProcessingError` if the result is outside the representable
    /// range.
    pub fn add_year_month(&self, d: &YearMonthDuration, negate: bool) -> EvalResult<XDateTime> {
        let months = if negate { -d.months() } else { d.months() };
        let magnitude = u32::try_from(months.unsigned_abs())
            .map_err(|_| Indeterminate::processing("yearMonthDuration out of range"))?;
        let shifted = if months >= 0 {
            self.dt.checked_add_months(Months::new(magnitude))
        } else {
            self.dt.checked_sub_months(Months::new(magnitude))
        };
        shifted
            .map(|dt| XDateTime {
                dt,
                offset: self.offset,
            })
            .ok_or_else(|| Indeterminate::processing("dateTime arithmetic overflow"))
    }
}

impl PartialEq for XDateTime {
    fn eq(&self, other: &Self) -> bool {
        self.instant() == other.instant()
    }
}
impl Eq for XDateTime {}

impl Hash for XDateTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant().hash(state);
    }
}

impl fmt::Display for XDateTime {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.dt.format("%Y-%m-%dT%H:%M:%S"),
            print_fraction(self.dt.time().nanosecond()),
            print_offset(self.offset)
        )
    }
}

/// An `xs:date` with optional timezone.
#[derive(Debug, Clone)]
pub struct XDate {
    date: NaiveDate,
    offset: Option<FixedOffset>,
}

impl XDate {
    /// Parse an XML Schema date lexical form.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on malformed input.
    pub fn parse(lexical: &str) -> Result<XDate, LexicalError> {
        let (body, offset) = split_offset(lexical)?;
        let date = NaiveDate::parse_from_str(body, "%Y-%m-%d")
            .map_err(|_| LexicalError::new("date", lexical))?;
        Ok(XDate { date, offset })
    }

    #[must_use]
    pub fn new(date: NaiveDate, offset: Option<FixedOffset>) -> XDate {
        XDate { date, offset }
    }

    #[must_use]
    pub fn naive(&self) -> NaiveDate {
        self.date
    }

    fn instant(&self) -> i64 {
        let midnight = self.date.and_time(NaiveTime::MIN).and_utc().timestamp();
        midnight - self.offset.map_or(0, |o| i64::from(o.local_minus_utc()))
    }

    #[must_use]
    pub fn compare(&self, other: &XDate) -> Ordering {
        self.instant().cmp(&other.instant())
    }

    /// Add (or with `negate`, subtract) a year/month duration.
    ///
    /// # Errors
    ///
    /// `ProcessingError` if the result is outside the representable
    /// range.
    pub fn add_year_month(&self, d: &YearMonthDuration, negate: bool) -> EvalResult<XDate> {
        let months = if negate { -d.months() } else { d.months() };
        let magnitude = u32::try_from(months.unsigned_abs())
            .map_err(|_| Indeterminate::processing("yearMonthDuration out of range"))?;
        let shifted = if months >= 0 {
            self.date.checked_add_months(Months::new(magnitude))
        } else {
            self.date.checked_sub_months(Months::new(magnitude))
        };
        shifted
            .map(|date| XDate {
                date,
                offset: self.offset,
            })
            .ok_or_else(|| Indeterminate::processing("date arithmetic overflow"))
    }
}

impl PartialEq for XDate {
    fn eq(&self, other: &Self) -> bool {
        self.instant() == other.instant()
    }
}
impl Eq for XDate {}

impl Hash for XDate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant().hash(state);
    }
}

impl fmt::Display for XDate {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.date.format("%Y-%m-%d"),
            print_offset(self.offset)
        )
    }
}

/// An `xs:time` with optional timezone.
#[derive(Debug, Clone)]
pub struct XTime {
    time: NaiveTime,
    offset: Option<FixedOffset>,
}

impl XTime {
    /// Parse an XML Schema time lexical form.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on malformed input.
    pub fn parse(lexical: &str) -> Result<XTime, LexicalError> {
        let (body, offset) = split_offset(lexical)?;
        let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f")
            .map_err(|_| LexicalError::new("time", lexical))?;
        Ok(XTime { time, offset })
    }

    #[must_use]
    pub fn new(time: NaiveTime, offset: Option<FixedOffset>) -> XTime {
        XTime { time, offset }
    }

    #[must_use]
    pub fn naive(&self) -> NaiveTime {
        self.time
    }

    /// Nanoseconds since a fictive midnight, timezone applied.  May be
    /// negative or beyond one day; callers that need a clock position
    /// reduce it modulo 24 hours.
    #[must_use]
    pub fn normalized_nanos(&self) -> i64 {
        let base = i64::from(self.time.num_seconds_from_midnight()) * NANOS_PER_SEC
            + i64::from(self.time.nanosecond());
        base - self.offset.map_or(0, |o| i64::from(o.local_minus_utc())) * NANOS_PER_SEC
    }

    #[must_use]
    pub fn compare(&self, other: &XTime) -> Ordering {
        self.normalized_nanos().cmp(&other.normalized_nanos())
    }
}

impl PartialEq for XTime {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_nanos() == other.normalized_nanos()
    }
}
impl Eq for XTime {}

impl Hash for XTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized_nanos().hash(state);
    }
}

impl fmt::Display for XTime {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.time.format("%H:%M:%S"),
            print_fraction(self.time.nanosecond()),
            print_offset(self.offset)
        )
    }
}

/// An `xs:dayTimeDuration`, stored as signed milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayTimeDuration {
    millis: i64,
}

impl DayTimeDuration {
    /// Parse a `-?PnDTnHnMn(.nnn)?S` lexical form.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on malformed input.
    pub fn parse(lexical: &str) -> Result<DayTimeDuration, LexicalError> {
        let err = || LexicalError::new("dayTimeDuration", lexical);
        let (negative, rest) = match lexical.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, lexical),
        };
        let rest = rest.strip_prefix('P').ok_or_else(err)?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (rest, None),
        };
        if time_part == Some("") || (date_part.is_empty() && time_part.is_none()) {
            return Err(err());
        }
        let mut millis: i64 = 0;
        if !date_part.is_empty() {
            let days = date_part.strip_suffix('D').ok_or_else(err)?;
            let days: i64 = days.parse().map_err(|_| err())?;
            millis += days * 86_400_000;
        }
        if let Some(t) = time_part {
            let mut remaining = t;
            for (designator, scale) in [('H', 3_600_000i64), ('M', 60_000)] {
                if let Some(pos) = remaining.find(designator) {
                    let n: i64 = remaining[..pos].parse().map_err(|_| err())?;
                    millis += n * scale;
                    remaining = &remaining[pos + 1..];
                }
            }
            if let Some(secs) = remaining.strip_suffix('S') {
                let s: f64 = secs.parse().map_err(|_| err())?;
                if s < 0.0 {
                    return Err(err());
                }
                millis += (s * 1000.0).round() as i64;
            } else if !remaining.is_empty() {
                return Err(err());
            }
        }
        Ok(DayTimeDuration {
            millis: if negative { -millis } else { millis },
        })
    }

    #[must_use]
    pub fn from_millis(millis: i64) -> DayTimeDuration {
        DayTimeDuration { millis }
    }

    #[must_use]
    pub fn millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for DayTimeDuration {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.millis == 0 {
            return write!(f, "PT0S");
        }
        let mut rest = self.millis.unsigned_abs();
        if self.millis < 0 {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        let days = rest / 86_400_000;
        rest %= 86_400_000;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if rest > 0 {
            write!(f, "T")?;
            let hours = rest / 3_600_000;
            rest %= 3_600_000;
            let minutes = rest / 60_000;
            rest %= 60_000;
            let secs = rest / 1000;
            let ms = rest % 1000;
            if hours > 0 {
                write!(f, "{hours}H")?;
            }
            if minutes > 0 {
                write!(f, "{minutes}M")?;
            }
            if secs > 0 || ms > 0 {
                if ms > 0 {
                    let mut frac = format!("{ms:03}");
                    while frac.ends_with('0') {
                        frac.pop();
                    }
                    write!(f, "{secs}.{frac}S")?;
                } else {
                    write!(f, "{secs}S")?;
                }
            }
        }
        Ok(())
    }
}

/// An `xs:yearMonthDuration`, stored as signed months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonthDuration {
    months: i64,
}

impl YearMonthDuration {
    /// Parse a `-?PnYnM` lexical form.
    ///
    /// # Errors
    ///
    /// Returns a `LexicalError` on malformed input.
    pub fn parse(lexical: &str) -> Result<YearMonthDuration, LexicalError> {
        let err = || LexicalError::new("yearMonthDuration", lexical);
        let (negative, rest) = match lexical.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, lexical),
        };
        let mut remaining = rest.strip_prefix('P').ok_or_else(err)?;
        if remaining.is_empty() {
            return Err(err());
        }
        let mut months: i64 = 0;
        if let Some(pos) = remaining.find('Y') {
            let y: i64 = remaining[..pos].parse().map_err(|_| err())?;
            months += y * 12;
            remaining = &remaining[pos + 1..];
        }
        if let Some(m) = remaining.strip_suffix('M') {
            let m: i64 = m.parse().map_err(|_| err())?;
            months += m;
        } else if !remaining.is_empty() {
            return Err(err());
        }
        Ok(YearMonthDuration {
            months: if negative { -months } else { months },
        })
    }

    #[must_use]
    pub fn from_months(months: i64) -> YearMonthDuration {
        YearMonthDuration { months }
    }

    #[must_use]
    pub fn months(&self) -> i64 {
        self.months
    }
}

impl fmt::Display for YearMonthDuration {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.months == 0 {
            return write!(f, "P0M");
        }
        if self.months < 0 {
            write!(f, "-")?;
        }
        let abs = self.months.unsigned_abs();
        let years = abs / 12;
        let months = abs % 12;
        write!(f, "P")?;
        if years > 0 {
            write!(f, "{years}Y")?;
        }
        if months > 0 {
            write!(f, "{months}M")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_parse_print_roundtrip() {
        for lex in [
            "2002-03-22T08:23:47-05:00",
            "2002-03-22T08:23:47Z",
            "2002-03-22T08:23:47",
            "2002-03-22T08:23:47.5Z",
        ] {
            let v = XDateTime::parse(lex).unwrap();
            assert_eq!(v.to_string(), lex);
        }
        assert!(XDateTime::parse("2002-03-22").is_err());
    }

    #[test]
    fn test_datetime_zone_equality() {
        let a = XDateTime::parse("2002-03-22T13:23:47Z").unwrap();
        let b = XDateTime::parse("2002-03-22T08:23:47-05:00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_date_ordering() {
        let a = XDate::parse("2002-03-22").unwrap();
        let b = XDate::parse("2002-03-23").unwrap();
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn test_time_offset_comparison() {
        let a = XTime::parse("08:00:00-05:00").unwrap();
        let b = XTime::parse("13:00:00Z").unwrap();
        assert_eq!(a.compare(&b), Ordering::Equal);
    }

    #[test]
    fn test_daytime_duration_roundtrip() {
        for lex in ["P1DT2H3M4S", "PT0S", "-PT36H", "PT1.5S", "P3D"] {
            let d = DayTimeDuration::parse(lex).unwrap();
            let reparsed = DayTimeDuration::parse(&d.to_string()).unwrap();
            assert_eq!(d, reparsed);
        }
        assert!(DayTimeDuration::parse("P").is_err());
        assert!(DayTimeDuration::parse("P1Y").is_err());
    }

    #[test]
    fn test_yearmonth_duration_parse() {
        assert_eq!(
            YearMonthDuration::parse("P1Y6M").unwrap(),
            YearMonthDuration::from_months(18)
        );
        assert_eq!(
            YearMonthDuration::parse("-P2M").unwrap(),
            YearMonthDuration::from_months(-2)
        );
        assert_eq!(YearMonthDuration::from_months(0).to_string(), "P0M");
    }

    #[test]
    fn test_month_arithmetic_clamps_to_end_of_month() {
        // Jan 31 + P1M lands on the last day of February.
        let d = XDate::parse("2001-01-31").unwrap();
        let shifted = d
            .add_year_month(&YearMonthDuration::from_months(1), false)
            .unwrap();
        assert_eq!(shifted.to_string(), "2001-02-28");
    }

    #[test]
    fn test_datetime_day_arithmetic() {
        let dt = XDateTime::parse("2002-03-22T08:23:47Z").unwrap();
        let plus = dt
            .add_day_time(&DayTimeDuration::parse("P1DT1H").unwrap(), false)
            .unwrap();
        assert_eq!(plus.to_string(), "2002-03-23T09:23:47Z");
    }
}
