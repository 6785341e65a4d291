use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nethook_buffers::Reader;

use crate::emsg;
use crate::error::DumpError;
use crate::registry::Registry;

use super::filename::{parse_file_name, ParsedName};
use super::RawRecord;

/// Cooperative cancellation flag for a directory load.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Files not yet read when this passes are abandoned.
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
}

impl LoadOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn interrupted(&self) -> Option<&'static str> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            Some("cancelled")
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some("deadline reached")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Name does not follow the dump convention.
    NotADumpName,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: SkipReason,
}

/// Records of one dump directory in ascending sequence order.
#[derive(Debug, Clone, Default)]
pub struct Dump {
    pub directory: PathBuf,
    pub records: Vec<RawRecord>,
    pub skipped: Vec<SkippedFile>,
    /// False when the load was cancelled or ran past its deadline.
    pub complete: bool,
}

impl Dump {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawRecord> {
        self.records.iter()
    }

    /// First record with the given sequence number.
    pub fn get(&self, sequence: u64) -> Option<&RawRecord> {
        let start = self.records.partition_point(|r| r.sequence < sequence);
        self.records.get(start).filter(|r| r.sequence == sequence)
    }
}

impl<'a> IntoIterator for &'a Dump {
    type Item = &'a RawRecord;
    type IntoIter = std::slice::Iter<'a, RawRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Lists and reads every dump record in `path`.
///
/// Only an unreadable directory fails the whole load. Files that do not
/// follow the naming convention or cannot be read end up in
/// [`Dump::skipped`].
pub fn load_directory(
    path: impl AsRef<Path>,
    registry: &Registry,
    options: &LoadOptions,
) -> Result<Dump, DumpError> {
    let path = path.as_ref();
    let unreadable = |source| DumpError::DirectoryUnreadable {
        path: path.to_path_buf(),
        source,
    };

    let mut dump = Dump {
        directory: path.to_path_buf(),
        complete: true,
        ..Dump::default()
    };
    let mut candidates: Vec<(ParsedName, String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(path).map_err(unreadable)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %path.display(), %err, "cannot read directory entry");
                continue;
            }
        };
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().is_ok_and(|t| t.is_dir()) {
            tracing::debug!(%file_name, "skipping subdirectory");
            continue;
        }
        match parse_file_name(&file_name) {
            Some(parsed) => candidates.push((parsed, file_name, entry.path())),
            None => {
                tracing::debug!(%file_name, "not a dump file name");
                dump.skipped.push(SkippedFile {
                    file_name,
                    reason: SkipReason::NotADumpName,
                });
            }
        }
    }

    candidates.sort_by(|(a, a_name, _), (b, b_name, _)| {
        a.sequence.cmp(&b.sequence).then_with(|| a_name.cmp(b_name))
    });

    for (parsed, file_name, file_path) in candidates {
        if let Some(why) = options.interrupted() {
            tracing::warn!(dir = %path.display(), loaded = dump.records.len(), "load {why}");
            dump.complete = false;
            break;
        }
        let payload = match fs::read(&file_path) {
            Ok(bytes) => Arc::<[u8]>::from(bytes),
            Err(err) => {
                tracing::warn!(%file_name, %err, "cannot read dump file");
                dump.skipped.push(SkippedFile {
                    file_name,
                    reason: SkipReason::Unreadable(err.to_string()),
                });
                continue;
            }
        };
        if let Some(issue) = &parsed.issue {
            tracing::debug!(%file_name, %issue, "malformed file name metadata");
        }
        let type_discriminator = match wire_discriminator(&payload) {
            Some(emsg) => {
                if parsed.type_discriminator.is_some_and(|named| named != emsg) {
                    tracing::debug!(
                        %file_name,
                        named = ?parsed.type_discriminator,
                        wire = emsg,
                        "file name disagrees with header"
                    );
                }
                Some(emsg)
            }
            None => parsed.type_discriminator,
        };
        let inner_type_name = type_discriminator
            .and_then(|emsg| registry.inner_type_name(emsg))
            .map(str::to_string);
        dump.records.push(RawRecord {
            sequence: parsed.sequence,
            direction: parsed.direction,
            type_discriminator,
            filename_discriminator: parsed.type_discriminator,
            name: parsed.name,
            inner_type_name,
            file_name,
            payload,
            filename_issue: parsed.issue,
        });
    }

    tracing::info!(
        dir = %path.display(),
        records = dump.records.len(),
        skipped = dump.skipped.len(),
        complete = dump.complete,
        "loaded dump"
    );
    Ok(dump)
}

/// Message type from the leading little-endian `u32` of a payload.
fn wire_discriminator(payload: &[u8]) -> Option<u32> {
    let raw = Reader::new(payload).u32().ok()?;
    Some(emsg::strip_proto_mask(raw))
}
