//! Sequence metadata.
//!
//! Each sequence directory holds a `metadata.toml` with a flat table of
//! keys. The table is read into a key to string mapping first; parsing that
//! mapping into typed sequences is where validation happens, and every
//! failure is reported as a [`MalformedSequence`] naming the offending
//! subject, what is wrong with it, and how to fix it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::clock::MAX_RATE;
use crate::core::sequence::{FileFrameSequence, SequenceCursor, SequenceError};
use crate::playback::freeze::FreezeIntervals;

/// Name of the metadata file inside a sequence directory
pub const METADATA_FILE: &str = "metadata.toml";

/// Key holding the comma-separated freeze interval boundaries
pub const FREEZE_POINTS_KEY: &str = "freeze_points";

/// Resolved metadata keys and their values
pub type Metadata = HashMap<String, String>;

/// A sequence definition that cannot be played
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{subject}: {problem}")]
pub struct MalformedSequence {
    pub subject: String,
    pub problem: String,
    pub remedy: String,
}

impl MalformedSequence {
    pub fn new(
        subject: impl Into<String>,
        problem: impl Into<String>,
        remedy: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            problem: problem.into(),
            remedy: remedy.into(),
        }
    }

    /// A key is missing or its value is not in the expected format
    pub fn bad_metadata(key: Option<&str>) -> Self {
        let subject = match key {
            Some(key) => format!("Sequence metadata file - {}", key),
            None => "Sequence metadata file".to_string(),
        };
        Self::new(
            subject,
            "It is incomplete or contains values that are incorrectly formatted.",
            "Complete, review, or replace the metadata file, depending on the situation.",
        )
    }

    /// Values parse but describe an impossible sequence
    pub fn bad_parameter(cause: &SequenceError) -> Self {
        Self::new(
            "Sequence parameters",
            format!("The sequence cannot be built: {}.", cause),
            "Check the metadata file and correct any other offending parameters.",
        )
    }

    /// A freeze point goes backward or leaves the sequence
    pub fn bad_freeze_point(point: i32) -> Self {
        Self::new(
            format!("Freezing point: {}", point),
            "This freezing point is either smaller than the previous point, or it is \
             outside the bounds of its sequence.",
            "Check the sequence metadata file and correct this and any other offending \
             freezing points.",
        )
    }
}

/// Read `metadata.toml` from a sequence directory.
///
/// Scalars are stringified; arrays are joined with commas so that freeze
/// points may be written either as a string or as a TOML array.
pub fn read_metadata(dir: &Path) -> io::Result<Result<Metadata, MalformedSequence>> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        ));
    }
    let content = fs::read_to_string(dir.join(METADATA_FILE))?;
    Ok(parse_metadata(&content))
}

/// Parse metadata text into a key to string mapping
pub fn parse_metadata(content: &str) -> Result<Metadata, MalformedSequence> {
    let table: toml::Table = content
        .parse()
        .map_err(|_| MalformedSequence::bad_metadata(None))?;

    Ok(table
        .into_iter()
        .filter_map(|(key, value)| stringify(&value).map(|v| (key, v)))
        .collect())
}

fn stringify(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Array(items) => {
            let parts: Option<Vec<String>> = items.iter().map(stringify).collect();
            parts.map(|p| p.join(","))
        }
        _ => None,
    }
}

fn text<'a>(map: &'a Metadata, key: &str) -> Result<&'a str, MalformedSequence> {
    map.get(key)
        .map(|s| s.trim())
        .ok_or_else(|| MalformedSequence::bad_metadata(Some(key)))
}

fn number(map: &Metadata, key: &str) -> Result<i32, MalformedSequence> {
    text(map, key)?
        .parse()
        .map_err(|_| MalformedSequence::bad_metadata(Some(key)))
}

fn validate_rate(rate: i32) -> Result<(), MalformedSequence> {
    if rate <= 0 {
        return Err(MalformedSequence::bad_parameter(&SequenceError::NonPositiveRate));
    }
    if rate as u32 > MAX_RATE {
        return Err(MalformedSequence::new(
            "Sequence parameters",
            format!("The rate {} is above the maximum of {}.", rate, MAX_RATE),
            "Check the metadata file and correct any other offending parameters.",
        ));
    }
    Ok(())
}

/// Parse a file-per-frame sequence (`name`, `start`, `end`, `rate`,
/// `width`, `height`, `extension`)
pub fn parse_file_sequence(map: &Metadata) -> Result<FileFrameSequence, MalformedSequence> {
    let name = text(map, "name")?;
    let start = number(map, "start")?;
    let end = number(map, "end")?;
    let rate = number(map, "rate")?;
    let width = number(map, "width")?;
    let height = number(map, "height")?;
    let extension = text(map, "extension")?;

    validate_rate(rate)?;
    FileFrameSequence::new(name, start, end, rate, width, height, extension)
        .map_err(|e| MalformedSequence::bad_parameter(&e))
}

/// Parse a bare sequence (`name`, `start`, `end`, `rate`)
pub fn parse_cursor(map: &Metadata) -> Result<SequenceCursor, MalformedSequence> {
    let name = text(map, "name")?;
    let start = number(map, "start")?;
    let end = number(map, "end")?;
    let rate = number(map, "rate")?;

    if end <= start {
        return Err(MalformedSequence::bad_parameter(&SequenceError::EmptyRange {
            start,
            end,
        }));
    }
    validate_rate(rate)?;
    Ok(SequenceCursor::new(name, start, end, rate as u32))
}

/// Parse the freeze interval boundaries for `sequence`.
///
/// Points must not decrease and must lie inside the sequence. An odd count
/// is closed with the sequence end.
pub fn parse_freeze_points(
    map: &Metadata,
    sequence: &SequenceCursor,
) -> Result<FreezeIntervals, MalformedSequence> {
    let raw = text(map, FREEZE_POINTS_KEY)?;
    let mut tokens: Vec<&str> = raw.split(',').map(str::trim).collect();
    if tokens.last() == Some(&"") {
        tokens.pop();
    }

    let mut points = Vec::with_capacity(tokens.len() + 1);
    for token in tokens {
        let point: i32 = token
            .parse()
            .map_err(|_| MalformedSequence::bad_metadata(Some(token)))?;
        let backward = points.last().is_some_and(|&last| point < last);
        if backward || !sequence.is_valid_point(point) {
            return Err(MalformedSequence::bad_freeze_point(point));
        }
        points.push(point);
    }
    if points.len() % 2 != 0 {
        points.push(sequence.end());
    }
    Ok(FreezeIntervals::from_sorted(points))
}
