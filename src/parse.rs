// src/parse.rs
//
// Human-readable event grammar, used for import/export only.
//
//   <time> <name> <value> [<curve> [<duration>]]
//   <time> <name> <value> <value2>
//
// e.g. "0 gain 0", "8.012 gain 0.5 target 3", "1 start 69 1".
// The name token may carry a dotted route prefix: "2.1.gain".

use thiserror::Error;

use crate::address::{Address, AddressError, CurveType, Name};
use crate::event::Event;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty event")]
    Empty,

    #[error("invalid time {0:?}")]
    InvalidTime(String),

    #[error("unknown name {0:?}")]
    UnknownName(String),

    #[error("invalid route segment {0:?}")]
    InvalidRoute(String),

    #[error("missing value")]
    MissingValue,

    #[error("invalid value {0:?}")]
    InvalidValue(String),

    #[error("unexpected trailing input {0:?}")]
    Trailing(String),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        source: Box<ParseError>,
    },
}

fn parse_number(token: &str) -> Result<f64, ParseError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidValue(token.to_string()))
}

/// Parse a dotted `route.name[.curve]` token.
fn parse_path(token: &str) -> Result<(Vec<u16>, Name, Option<CurveType>), ParseError> {
    let mut parts: Vec<&str> = token.split('.').collect();

    let curve = match parts.as_slice() {
        [.., _, last] => CurveType::parse(last),
        _ => None,
    };
    if curve.is_some() {
        parts.pop();
    }

    let name_part = parts.pop().ok_or(ParseError::Empty)?;
    let name = Name::parse(name_part).ok_or_else(|| ParseError::UnknownName(name_part.to_string()))?;

    let route = parts
        .iter()
        .map(|part| {
            part.parse::<u16>()
                .map_err(|_| ParseError::InvalidRoute(part.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((route, name, curve))
}

/// Parse a single event.
pub fn parse_event(line: &str) -> Result<Event, ParseError> {
    let mut tokens = line.split_whitespace();

    let time_token = tokens.next().ok_or(ParseError::Empty)?;
    let time = time_token
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| ParseError::InvalidTime(time_token.to_string()))?;

    let path = tokens.next().ok_or(ParseError::MissingValue)?;
    let (route, name, mut curve) = parse_path(path)?;

    let value1 = parse_number(tokens.next().ok_or(ParseError::MissingValue)?)?;
    let mut value2 = 0.0;

    if let Some(token) = tokens.next() {
        match CurveType::parse(token) {
            Some(c) => {
                curve = Some(c);
                if let Some(duration) = tokens.next() {
                    value2 = parse_number(duration)?;
                }
            }
            None => value2 = parse_number(token)?,
        }
    }

    let rest: Vec<&str> = tokens.collect();
    if !rest.is_empty() {
        return Err(ParseError::Trailing(rest.join(" ")));
    }

    let address = Address::encode(&route, name, curve.unwrap_or(CurveType::Set))?;
    Ok(Event::new(time, address, value1, value2))
}

/// Parse one event per line. Blank lines and `#` comments are skipped.
pub fn parse_events(text: &str) -> Result<Vec<Event>, ParseError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, text)| {
            parse_event(text).map_err(|e| ParseError::AtLine {
                line,
                source: Box::new(e),
            })
        })
        .collect()
}
