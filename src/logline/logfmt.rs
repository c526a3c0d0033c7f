//! logfmt record parser
//!
//! Parses `key=value key2="quoted value" flag` records into ordered pairs.
//!
//! - Keys run up to `=`, whitespace or a quote
//! - Values are bare (up to whitespace) or double-quoted with `\"`, `\\`,
//!   `\n`, `\r`, `\t` and `\uXXXX` escapes
//! - A key without `=` has an empty value

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, take_while, take_while1, take_while_m_n},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_opt, opt, value},
    multi::many0,
    sequence::{delimited, preceded, terminated},
    IResult,
};

/// Parse one logfmt record
pub fn parse_record(input: &str) -> Result<Vec<(String, String)>, String> {
    match all_consuming(terminated(many0(preceded(multispace0, pair_parser)), multispace0))(input) {
        Ok((_, pairs)) => Ok(pairs),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(format!(
            "unexpected input at position {}",
            input.len() - e.input.len()
        )),
        Err(nom::Err::Incomplete(_)) => Err("incomplete record".to_string()),
    }
}

fn pair_parser(input: &str) -> IResult<&str, (String, String)> {
    let (input, key) = parse_key(input)?;
    let (input, val) = opt(preceded(char('='), parse_value))(input)?;
    Ok((input, (key.to_string(), val.unwrap_or_default())))
}

fn parse_key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c > ' ' && c != '=' && c != '"')(input)
}

fn parse_value(input: &str) -> IResult<&str, String> {
    alt((
        quoted,
        map(take_while(|c: char| !c.is_whitespace() && c != '"'), str::to_string),
    ))(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value('"', char('"')),
                    value('\\', char('\\')),
                    value('/', char('/')),
                    value('\n', char('n')),
                    value('\r', char('r')),
                    value('\t', char('t')),
                    unicode_escape,
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)
}

fn unicode_escape(input: &str) -> IResult<&str, char> {
    map_opt(
        preceded(char('u'), take_while_m_n(4, 4, |c: char| c.is_ascii_hexdigit())),
        |hex: &str| u32::from_str_radix(hex, 16).ok().and_then(char::from_u32),
    )(input)
}
