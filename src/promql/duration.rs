//! Prometheus-style durations
//!
//! Durations are written as a sequence of `<integer><unit>` terms in
//! decreasing unit order, e.g. `1h30m` or `90d`. Units: `y`, `w`, `d`, `h`,
//! `m`, `s`, `ms`. Values are handled in milliseconds.

use super::error::{PromqlError, PromqlResult};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{map_res, value},
    error::{FromExternalError, ParseError},
    multi::many1,
    sequence::pair,
    IResult,
};

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;
const WEEK_MS: i64 = 7 * DAY_MS;
const YEAR_MS: i64 = 365 * DAY_MS;

/// Unit multipliers, largest first. The index doubles as the ordering rank.
const UNITS: [(&str, i64); 7] = [
    ("y", YEAR_MS),
    ("w", WEEK_MS),
    ("d", DAY_MS),
    ("h", HOUR_MS),
    ("m", MINUTE_MS),
    ("s", SECOND_MS),
    ("ms", 1),
];

fn unit<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, usize, E> {
    alt((
        // "ms" must win over "m"
        value(6, tag("ms")),
        value(0, tag("y")),
        value(1, tag("w")),
        value(2, tag("d")),
        value(3, tag("h")),
        value(4, tag("m")),
        value(5, tag("s")),
    ))(input)
}

/// nom parser for a duration literal, yielding milliseconds
///
/// Units must appear in strictly decreasing order and at most once each.
pub fn duration_ms<'a, E>(input: &'a str) -> IResult<&'a str, i64, E>
where
    E: ParseError<&'a str> + FromExternalError<&'a str, String>,
{
    map_res(
        many1(pair(
            map_res(digit1, |s: &str| s.parse::<i64>().map_err(|e| e.to_string())),
            unit,
        )),
        |terms: Vec<(i64, usize)>| {
            let mut total: i64 = 0;
            let mut last_rank: Option<usize> = None;

            for (amount, rank) in terms {
                if last_rank.map_or(false, |last| rank <= last) {
                    return Err("duration units must be in decreasing order".to_string());
                }
                last_rank = Some(rank);

                let term = amount
                    .checked_mul(UNITS[rank].1)
                    .ok_or_else(|| "duration out of range".to_string())?;
                total = total
                    .checked_add(term)
                    .ok_or_else(|| "duration out of range".to_string())?;
            }

            Ok(total)
        },
    )(input)
}

/// Parse a complete duration string such as `"5m"` or `"1h30m"`
pub fn parse_duration(input: &str) -> PromqlResult<i64> {
    if input == "0" {
        return Ok(0);
    }

    match duration_ms::<nom::error::Error<&str>>(input) {
        Ok(("", ms)) => Ok(ms),
        _ => Err(PromqlError::Parse(format!(
            "not a valid duration string: {:?}",
            input
        ))),
    }
}

/// Format milliseconds the way Prometheus prints durations
///
/// Years and weeks are only used when they divide the value exactly, so 90
/// days prints as `90d` rather than `12w6d`.
pub fn format_duration(ms: i64) -> String {
    if ms == 0 {
        return "0s".to_string();
    }

    let (sign, mut rest) = if ms < 0 { ("-", -ms) } else { ("", ms) };
    let mut out = String::from(sign);

    for (name, mult) in UNITS {
        let exact_only = mult == YEAR_MS || mult == WEEK_MS;
        if exact_only && rest % mult != 0 {
            continue;
        }

        let amount = rest / mult;
        if amount > 0 {
            out.push_str(&format!("{}{}", amount, name));
            rest -= amount * mult;
        }
    }

    out
}
