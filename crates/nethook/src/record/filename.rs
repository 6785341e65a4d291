//! Dump filename convention: `<sequence>_<direction>_<type>[_<name>]`.
//!
//! Sequence and direction are mandatory; without them the file is not a dump
//! record. A bad or missing type keeps the record with a
//! [`MalformedFilename`] note.

use crate::error::MalformedFilename;

use super::Direction;

const SEPARATOR: char = '_';
const EXTENSION: &str = ".bin";
const NAME_PREFIX: &str = "k_EMsg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub sequence: u64,
    pub direction: Direction,
    pub type_discriminator: Option<u32>,
    pub name: Option<String>,
    pub issue: Option<MalformedFilename>,
}

/// Parses a dump filename, or `None` when it does not follow the convention.
pub fn parse_file_name(file_name: &str) -> Option<ParsedName> {
    let stem = file_name.strip_suffix(EXTENSION).unwrap_or(file_name);
    let mut parts = stem.splitn(4, SEPARATOR);

    let sequence = parts.next()?.parse::<u64>().ok()?;
    let direction = Direction::parse(parts.next()?)?;

    let (type_discriminator, issue) = match parts.next() {
        None | Some("") => (None, Some(MalformedFilename::MissingType)),
        Some(raw) => match raw.parse::<u32>() {
            Ok(v) => (Some(v), None),
            Err(_) => (None, Some(MalformedFilename::InvalidType(raw.to_string()))),
        },
    };

    let name = parts
        .next()
        .map(|n| n.strip_prefix(NAME_PREFIX).unwrap_or(n))
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Some(ParsedName {
        sequence,
        direction,
        type_discriminator,
        name,
        issue,
    })
}
