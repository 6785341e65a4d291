//! Raw dump records and directory loading.

mod filename;
mod loader;

use std::sync::Arc;

use serde::Serialize;

use crate::error::MalformedFilename;

pub use filename::{parse_file_name, ParsedName};
pub use loader::{load_directory, CancelToken, Dump, LoadOptions, SkipReason, SkippedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Parses the direction marker used in dump filenames.
    pub fn parse(marker: &str) -> Option<Self> {
        if marker.eq_ignore_ascii_case("in") {
            Some(Direction::Inbound)
        } else if marker.eq_ignore_ascii_case("out") {
            Some(Direction::Outbound)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        }
    }
}

/// One dump file. Never modified after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub sequence: u64,
    pub direction: Direction,
    /// Discriminator read from the first four payload bytes, or the filename
    /// value when the payload is shorter than that.
    pub type_discriminator: Option<u32>,
    /// Discriminator as written in the filename. Display-only.
    pub filename_discriminator: Option<u32>,
    /// Name fragment from the filename.
    pub name: Option<String>,
    /// Bound schema or layout name for `type_discriminator`.
    pub inner_type_name: Option<String>,
    pub file_name: String,
    pub payload: Arc<[u8]>,
    pub filename_issue: Option<MalformedFilename>,
}

impl RawRecord {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Best available label: the filename fragment, else the discriminator.
    pub fn label(&self) -> String {
        match (&self.name, self.type_discriminator) {
            (Some(name), _) => name.clone(),
            (None, Some(emsg)) => emsg.to_string(),
            (None, None) => self.file_name.clone(),
        }
    }
}
