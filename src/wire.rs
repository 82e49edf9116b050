//! Decoder for the server's `session-data` response.
//!
//! A response is a `|`-separated list of `key:value` fields. `coord` fields carry
//! a comma-separated tuple `[timestamp, id, name:value..., performance]`, or
//! `[best, ...]` for the current best point.

use std::fmt;

pub const FIELD_SEP: char = '|';
pub const KEY_SEP: char = ':';
pub const TUPLE_SEP: char = ',';
pub const BEST_TAG: &str = "best";
pub const UNKNOWN_VALUE: &str = "?";

/// One slot between the id and the performance of a coord tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Named { name: String, value: String },
    Positional(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub timestamp: i64,
    pub id: String,
    pub values: Vec<(String, String)>,
    pub performance: f64,
}

impl RawRecord {
    /// Identity used to drop records a server resends: every field of the tuple.
    pub fn dedup_key(&self) -> String {
        let mut key = format!("{}{}{}", self.timestamp, TUPLE_SEP, self.id);
        for (name, value) in &self.values {
            key.push(TUPLE_SEP);
            key.push_str(name);
            key.push(KEY_SEP);
            key.push_str(value);
        }
        key.push(TUPLE_SEP);
        key.push_str(&self.performance.to_bits().to_string());
        key
    }
}

/// A best-point tuple. The server may omit names (and the id), so slots are kept
/// raw until they can be bound against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBest {
    pub slots: Vec<RawValue>,
    pub performance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    ServerTime(i64),
    AppName(String),
    VarList(String),
    Record(RawRecord),
    /// `None` when the server has no best point yet.
    Best(Option<RawBest>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeWarning {
    UnknownKey { field: String },
    MalformedCoord { field: String, reason: &'static str },
    BadServerTime { value: String },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeWarning::UnknownKey { field } => {
                write!(f, "unknown key in data pair: [{}]", field)
            }
            DecodeWarning::MalformedCoord { field, reason } => {
                write!(f, "malformed coord ({}): [{}]", reason, field)
            }
            DecodeWarning::BadServerTime { value } => {
                write!(f, "server time is not an integer: [{}]", value)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub tokens: Vec<Token>,
    pub warnings: Vec<DecodeWarning>,
}

pub fn decode(text: &str) -> Decoded {
    let mut out = Decoded::default();

    for field in text.split(FIELD_SEP) {
        let Some((key, value)) = field.split_once(KEY_SEP) else {
            continue;
        };

        match key {
            "time" => match value.trim().parse::<i64>() {
                Ok(ms) => out.tokens.push(Token::ServerTime(ms)),
                Err(_) => out.warnings.push(DecodeWarning::BadServerTime {
                    value: value.to_string(),
                }),
            },
            "app" => out.tokens.push(Token::AppName(value.to_string())),
            "var" => out.tokens.push(Token::VarList(value.to_string())),
            "coord" => match decode_coord(value) {
                Ok(token) => out.tokens.push(token),
                Err(reason) => out.warnings.push(DecodeWarning::MalformedCoord {
                    field: field.to_string(),
                    reason,
                }),
            },
            _ => out.warnings.push(DecodeWarning::UnknownKey {
                field: field.to_string(),
            }),
        }
    }

    out
}

fn decode_coord(value: &str) -> Result<Token, &'static str> {
    let parts: Vec<&str> = value.split(TUPLE_SEP).map(str::trim).collect();
    if parts.len() < 3 {
        return Err("fewer than 3 components");
    }
    let last = parts[parts.len() - 1];
    let middle = &parts[1..parts.len() - 1];

    if parts[0] == BEST_TAG {
        if last == UNKNOWN_VALUE {
            return Ok(Token::Best(None));
        }
        let performance = last.parse::<f64>().map_err(|_| "performance is not a number")?;
        let slots = middle
            .iter()
            .map(|slot| match slot.split_once(KEY_SEP) {
                Some((name, value)) => RawValue::Named {
                    name: name.to_string(),
                    value: value.to_string(),
                },
                None => RawValue::Positional(slot.to_string()),
            })
            .collect();
        return Ok(Token::Best(Some(RawBest { slots, performance })));
    }

    let timestamp = parts[0].parse::<i64>().map_err(|_| "timestamp is not an integer")?;
    let performance = last.parse::<f64>().map_err(|_| "performance is not a number")?;
    let values = middle[1..]
        .iter()
        .filter_map(|slot| slot.split_once(KEY_SEP))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    Ok(Token::Record(RawRecord {
        timestamp,
        id: middle[0].to_string(),
        values,
        performance,
    }))
}
