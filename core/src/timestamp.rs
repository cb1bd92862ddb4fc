//! Parsing of wall-clock timestamps found in dive exports and camera EXIF.
//!
//! Accepted shapes:
//!
//! - `2024-03-15 09:12:33` (dive computer exports)
//! - `2024:03:15 09:12:33` (EXIF `DateTimeOriginal`)
//! - `2024-03-15T09:12:33.250` with optional fractional seconds
//! - `2024-03-15` (date only, midnight)
//!
//! A trailing `Z` is tolerated and ignored; all times are local wall-clock.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use nom::{
    bytes::complete::take_while_m_n,
    character::complete::{char, digit1, one_of},
    combinator::{map_res, opt},
    sequence::preceded,
    IResult, Parser,
};

use crate::error::TimestampError;

type DateParts = (i32, u32, u32);
type TimeParts = (u32, u32, u32, u32);

/// Parse a timestamp string into a naive local date-time.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, TimestampError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TimestampError::Empty);
    }

    match timestamp(input) {
        Ok((remaining, (date_parts, time_parts))) => {
            if !remaining.trim().is_empty() {
                return Err(TimestampError::Unrecognized {
                    input: input.to_string(),
                    position: input.len() - remaining.len(),
                });
            }
            build(input, date_parts, time_parts)
        }
        Err(_) => Err(TimestampError::Unrecognized {
            input: input.to_string(),
            position: 0,
        }),
    }
}

fn build(
    input: &str,
    (year, month, day): DateParts,
    time: Option<TimeParts>,
) -> Result<NaiveDateTime, TimestampError> {
    let out_of_range = || TimestampError::OutOfRange(input.to_string());
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(out_of_range)?;
    let time = match time {
        Some((h, m, s, nanos)) => {
            NaiveTime::from_hms_nano_opt(h, m, s, nanos).ok_or_else(out_of_range)?
        }
        None => NaiveTime::MIN,
    };
    Ok(date.and_time(time))
}

fn timestamp(input: &str) -> IResult<&str, (DateParts, Option<TimeParts>)> {
    let (input, date_parts) = date(input)?;
    let (input, time_parts) = opt(preceded(one_of(" T"), time)).parse(input)?;
    let (input, _) = opt(char::<&str, nom::error::Error<&str>>('Z')).parse(input)?;
    Ok((input, (date_parts, time_parts)))
}

fn date(input: &str) -> IResult<&str, DateParts> {
    let (input, (y, _, m, _, d)) =
        (year, one_of("-:/"), two_digits, one_of("-:/"), two_digits).parse(input)?;
    Ok((input, (y, m, d)))
}

fn time(input: &str) -> IResult<&str, TimeParts> {
    let (input, (hour, _, minute, _, second, fraction)) = (
        two_digits,
        char(':'),
        two_digits,
        char(':'),
        two_digits,
        opt(preceded(char('.'), digit1)),
    )
        .parse(input)?;
    let nanos = fraction.map(fraction_to_nanos).unwrap_or(0);
    Ok((input, (hour, minute, second, nanos)))
}

fn year(input: &str) -> IResult<&str, i32> {
    map_res(take_while_m_n(4, 4, is_digit), |s: &str| s.parse::<i32>()).parse(input)
}

fn two_digits(input: &str) -> IResult<&str, u32> {
    map_res(take_while_m_n(2, 2, is_digit), |s: &str| s.parse::<u32>()).parse(input)
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// `"25"` → 250_000_000. Digits past nanosecond precision are dropped.
fn fraction_to_nanos(digits: &str) -> u32 {
    let mut nanos: u32 = 0;
    for (i, c) in digits.chars().take(9).enumerate() {
        let digit = c.to_digit(10).unwrap_or(0);
        nanos += digit * 10u32.pow(8 - i as u32);
    }
    nanos
}
