//! Typed decoding and tree projection for captured nethook dumps.
//!
//! A dump directory holds one file per captured packet, named
//! `<sequence>_<in|out>_<message type>[_<name>]`. [`load_directory`] turns it
//! into a [`Dump`] of [`RawRecord`]s; decoding happens per record on demand:
//!
//! ```no_run
//! use nethook_analyzer::{get_tree, load_directory, LoadOptions, ProjectionConfig, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::builtin()?;
//! let dump = load_directory("dumps/session-1", &registry, &LoadOptions::default())?;
//! for record in &dump {
//!     let tree = get_tree(record, &registry, &ProjectionConfig::default());
//!     println!("{}", tree.render());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod inspect;

pub mod body;
pub mod config;
pub mod emsg;
pub mod header;
pub mod packet;
pub mod record;
pub mod registry;
pub mod tree;
pub mod value;
pub mod wire;

pub use body::{
    decode_body, DecodedBody, DecodedField, DecodedMessage, Defect, DefectKind, FieldValue,
};
pub use config::{ConfigError, InspectorConfig};
pub use error::{DumpError, HeaderError, MalformedFilename};
pub use header::{decode_header, Correlation, DecodedHeader, HeaderKind, JobRole};
pub use inspect::Inspector;
pub use packet::{decode_packet, DecodedPacket};
pub use record::{load_directory, CancelToken, Direction, Dump, LoadOptions, RawRecord};
pub use registry::{Registry, RegistryError, Strategy};
pub use tree::{get_tree, project, NodeKind, NodeValue, ProjectionConfig, TreeNode};
pub use value::Scalar;
