//! Structural comparison of two cue sheets.
//!
//! chdman only writes `FILE`, `TRACK`, `INDEX`, `PREGAP` and `POSTGAP`, and
//! the conversion tooling renames the referenced files after the dump. A
//! reconstructed cue therefore rarely matches the Datfile byte-for-byte even
//! when the disc layout is identical. Every field is compared, and the
//! differences that the format cannot carry are set aside through
//! [`EXCLUDED_FIELDS`].

use super::model::{CueFile, CueMeta, CueSheet, CueTrack, MetaKeyword};
use std::fmt;

/// Every field the comparator looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    FileCount,
    FileBaseName,
    FileExtension,
    FileType,
    TrackCount,
    TrackNumber,
    TrackType,
    IndexCount,
    IndexNumber,
    IndexPosition,
    Pregap,
    Postgap,
    Flags,
    Isrc,
    CdText,
    Catalog,
    CdTextFile,
    Remark,
}

/// Fields that cannot survive a round trip through the compressed image.
pub const EXCLUDED_FIELDS: &[(FieldKind, &str)] = &[
    (
        FieldKind::FileBaseName,
        "referenced files are renamed after the dump during conversion",
    ),
    (FieldKind::CdText, "CD-TEXT is not stored in the image"),
    (FieldKind::Isrc, "ISRC codes are not stored in the image"),
    (FieldKind::Flags, "subchannel flags are not written back"),
    (FieldKind::Catalog, "the media catalog number is not stored in the image"),
    (FieldKind::CdTextFile, "CD-TEXT files are not stored in the image"),
    (FieldKind::Remark, "remarks are free-form comments"),
];

impl FieldKind {
    pub fn is_excluded(&self) -> bool {
        EXCLUDED_FIELDS.iter().any(|(kind, _)| kind == self)
    }

    pub fn exclusion_reason(&self) -> Option<&'static str> {
        EXCLUDED_FIELDS
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, reason)| *reason)
    }

    fn for_meta(keyword: MetaKeyword) -> Self {
        match keyword {
            MetaKeyword::Performer | MetaKeyword::Title | MetaKeyword::Songwriter => {
                FieldKind::CdText
            }
            MetaKeyword::Catalog => FieldKind::Catalog,
            MetaKeyword::CdTextFile => FieldKind::CdTextFile,
            MetaKeyword::Rem => FieldKind::Remark,
        }
    }
}

/// One field whose value differs between the two sheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub field: FieldKind,
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, found {}",
            self.path, self.expected, self.actual
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Differences that change the disc layout.
    pub mismatches: Vec<Difference>,
    /// Differences confined to excluded fields.
    pub ignored: Vec<Difference>,
}

impl Comparison {
    pub fn matches(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn is_identical(&self) -> bool {
        self.mismatches.is_empty() && self.ignored.is_empty()
    }
}

/// Compares a generated cue sheet against the authoritative one.
pub fn compare(generated: &CueSheet, authoritative: &CueSheet) -> Comparison {
    let mut walk = Walk::default();
    walk.meta("preamble", &authoritative.preamble, &generated.preamble);
    walk.count(
        FieldKind::FileCount,
        "files".into(),
        authoritative.files.len(),
        generated.files.len(),
    );
    for (idx, (want, got)) in authoritative.files.iter().zip(&generated.files).enumerate() {
        walk.file(&format!("files[{idx}]"), want, got);
    }

    let mut comparison = Comparison::default();
    for difference in walk.differences {
        if difference.field.is_excluded() {
            comparison.ignored.push(difference);
        } else {
            comparison.mismatches.push(difference);
        }
    }
    comparison
}

#[derive(Default)]
struct Walk {
    differences: Vec<Difference>,
}

impl Walk {
    fn record(&mut self, field: FieldKind, path: String, expected: String, actual: String) {
        if expected != actual {
            self.differences.push(Difference {
                field,
                path,
                expected,
                actual,
            });
        }
    }

    fn count(&mut self, field: FieldKind, path: String, expected: usize, actual: usize) {
        self.record(field, path, expected.to_string(), actual.to_string());
    }

    fn file(&mut self, path: &str, want: &CueFile, got: &CueFile) {
        self.record(
            FieldKind::FileBaseName,
            format!("{path}.name"),
            base_name(&want.path),
            base_name(&got.path),
        );
        self.record(
            FieldKind::FileExtension,
            format!("{path}.extension"),
            want.extension(),
            got.extension(),
        );
        self.record(
            FieldKind::FileType,
            format!("{path}.type"),
            want.file_type.as_str().into(),
            got.file_type.as_str().into(),
        );
        self.meta(&format!("{path}.metadata"), &want.metadata, &got.metadata);
        self.count(
            FieldKind::TrackCount,
            format!("{path}.tracks"),
            want.tracks.len(),
            got.tracks.len(),
        );
        for (idx, (want, got)) in want.tracks.iter().zip(&got.tracks).enumerate() {
            self.track(&format!("{path}.tracks[{idx}]"), want, got);
        }
    }

    fn track(&mut self, path: &str, want: &CueTrack, got: &CueTrack) {
        self.record(
            FieldKind::TrackNumber,
            format!("{path}.number"),
            format!("{:02}", want.number),
            format!("{:02}", got.number),
        );
        self.record(
            FieldKind::TrackType,
            format!("{path}.type"),
            want.track_type.as_str().into(),
            got.track_type.as_str().into(),
        );

        let want_indices: Vec<_> = want.indices().collect();
        let got_indices: Vec<_> = got.indices().collect();
        self.count(
            FieldKind::IndexCount,
            format!("{path}.indices"),
            want_indices.len(),
            got_indices.len(),
        );
        for (idx, (w, g)) in want_indices.iter().zip(&got_indices).enumerate() {
            self.record(
                FieldKind::IndexNumber,
                format!("{path}.indices[{idx}].number"),
                format!("{:02}", w.number),
                format!("{:02}", g.number),
            );
            self.record(
                FieldKind::IndexPosition,
                format!("{path}.indices[{idx}].position"),
                w.position.to_string(),
                g.position.to_string(),
            );
        }

        self.record(
            FieldKind::Pregap,
            format!("{path}.pregap"),
            optional(want.pregap()),
            optional(got.pregap()),
        );
        self.record(
            FieldKind::Postgap,
            format!("{path}.postgap"),
            optional(want.postgap()),
            optional(got.postgap()),
        );
        self.record(
            FieldKind::Flags,
            format!("{path}.flags"),
            want.flags().join(" "),
            got.flags().join(" "),
        );
        self.record(
            FieldKind::Isrc,
            format!("{path}.isrc"),
            optional(want.isrc()),
            optional(got.isrc()),
        );
        let want_meta: Vec<CueMeta> = want.metadata().cloned().collect();
        let got_meta: Vec<CueMeta> = got.metadata().cloned().collect();
        self.meta(&format!("{path}.metadata"), &want_meta, &got_meta);
    }

    /// Metadata is compared per keyword, in order of appearance.
    fn meta(&mut self, path: &str, want: &[CueMeta], got: &[CueMeta]) {
        for keyword in [
            MetaKeyword::Performer,
            MetaKeyword::Title,
            MetaKeyword::Songwriter,
            MetaKeyword::Catalog,
            MetaKeyword::CdTextFile,
            MetaKeyword::Rem,
        ] {
            let values = |items: &[CueMeta]| {
                items
                    .iter()
                    .filter(|meta| meta.keyword == keyword)
                    .map(|meta| meta.value.clone())
                    .collect::<Vec<_>>()
                    .join(" | ")
            };
            self.record(
                FieldKind::for_meta(keyword),
                format!("{path}.{}", keyword.as_str().to_ascii_lowercase()),
                values(want),
                values(got),
            );
        }
    }
}

fn base_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
        .to_string()
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "none".into())
}
