//! Cue sheet parsing, rendering and structural comparison.

pub mod compare;
pub mod model;
mod parser;

pub use compare::{compare, Comparison, Difference, FieldKind, EXCLUDED_FIELDS};
pub use model::{
    CueFile, CueIndex, CueMeta, CueSheet, CueTrack, FileType, LineEnding, MetaKeyword, Msf,
    TrackEntry, TrackType,
};
