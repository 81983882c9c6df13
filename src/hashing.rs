//! Single-pass checksum verification for dump files.
//!
//! Redump Datfiles carry CRC32, MD5 and SHA-1 for every file. A payload can be
//! several gigabytes, so every algorithm the manifest names is fed from the
//! same read buffer instead of re-reading the file once per algorithm.

use crate::dat::ManifestFile;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// The checksum algorithms a Datfile can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    Crc32,
    Md5,
    Sha1,
}

impl ChecksumKind {
    pub const ALL: [ChecksumKind; 3] = [ChecksumKind::Crc32, ChecksumKind::Md5, ChecksumKind::Sha1];

    /// Attribute name used for this algorithm in Logiqx/Redump XML.
    pub fn dat_attribute(&self) -> &'static str {
        match self {
            ChecksumKind::Crc32 => "crc",
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumKind::Crc32 => 8,
            ChecksumKind::Md5 => 32,
            ChecksumKind::Sha1 => 40,
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChecksumKind::Crc32 => "CRC32",
            ChecksumKind::Md5 => "MD5",
            ChecksumKind::Sha1 => "SHA-1",
        };
        f.write_str(label)
    }
}

/// Lowercase hex digests keyed by algorithm.
pub type Digests = BTreeMap<ChecksumKind, String>;

/// Feeds one byte stream to several hash states at once.
pub struct MultiHasher {
    crc32: Option<crc32fast::Hasher>,
    md5: Option<md5::Context>,
    sha1: Option<Sha1>,
}

impl MultiHasher {
    pub fn new<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = ChecksumKind>,
    {
        let mut hasher = Self {
            crc32: None,
            md5: None,
            sha1: None,
        };
        for kind in kinds {
            match kind {
                ChecksumKind::Crc32 => hasher.crc32 = Some(crc32fast::Hasher::new()),
                ChecksumKind::Md5 => hasher.md5 = Some(md5::Context::new()),
                ChecksumKind::Sha1 => hasher.sha1 = Some(Sha1::new()),
            }
        }
        hasher
    }

    pub fn update(&mut self, bytes: &[u8]) {
        if let Some(crc) = self.crc32.as_mut() {
            crc.update(bytes);
        }
        if let Some(md5) = self.md5.as_mut() {
            md5.consume(bytes);
        }
        if let Some(sha1) = self.sha1.as_mut() {
            sha1.update(bytes);
        }
    }

    pub fn finalize(self) -> Digests {
        let mut digests = Digests::new();
        if let Some(crc) = self.crc32 {
            digests.insert(ChecksumKind::Crc32, format!("{:08x}", crc.finalize()));
        }
        if let Some(md5) = self.md5 {
            digests.insert(ChecksumKind::Md5, format!("{:x}", md5.compute()));
        }
        if let Some(sha1) = self.sha1 {
            digests.insert(ChecksumKind::Sha1, format!("{:x}", sha1.finalize()));
        }
        digests
    }
}

/// Streams a reader through the requested algorithms, returning the byte
/// count alongside the digests.
pub fn digest_reader<R, I>(mut reader: R, kinds: I) -> io::Result<(u64, Digests)>
where
    R: Read,
    I: IntoIterator<Item = ChecksumKind>,
{
    let mut hasher = MultiHasher::new(kinds);
    let mut buf = vec![0_u8; READ_BUFFER_BYTES];
    let mut total = 0_u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..read]);
        total += read as u64;
    }
    Ok((total, hasher.finalize()))
}

pub fn digest_file<I>(path: &Path, kinds: I) -> io::Result<(u64, Digests)>
where
    I: IntoIterator<Item = ChecksumKind>,
{
    digest_reader(File::open(path)?, kinds)
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

/// What a file looked like compared with its manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashVerdict {
    /// Size and every declared checksum agree.
    Matched(Vec<ChecksumKind>),
    SizeMismatch,
    ChecksumMismatch {
        algorithm: ChecksumKind,
        expected: String,
        actual: String,
    },
    /// The manifest entry declares no checksum the verifier could compare.
    NoAlgorithmMatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResult {
    pub expected_size: u64,
    pub actual_size: u64,
    pub verdict: HashVerdict,
}

impl HashResult {
    pub fn size_matches(&self) -> bool {
        self.expected_size == self.actual_size
    }

    pub fn is_match(&self) -> bool {
        matches!(self.verdict, HashVerdict::Matched(_))
    }

    /// Converts a failed comparison into the error reported for `name`.
    pub fn into_error(self, name: &str) -> Option<crate::VerifyError> {
        use crate::VerifyError;
        match self.verdict {
            HashVerdict::Matched(_) => None,
            HashVerdict::SizeMismatch => Some(VerifyError::SizeMismatch {
                name: name.to_string(),
                expected: self.expected_size,
                actual: self.actual_size,
            }),
            HashVerdict::ChecksumMismatch {
                algorithm,
                expected,
                actual,
            } => Some(VerifyError::ChecksumMismatch {
                name: name.to_string(),
                algorithm,
                expected,
                actual,
            }),
            HashVerdict::NoAlgorithmMatched => Some(VerifyError::ConfigurationError(format!(
                "Datfile entry for \"{name}\" has no checksum to compare against"
            ))),
        }
    }
}

/// Verifies a file on disk against its manifest entry.
pub fn verify(path: &Path, expected: &ManifestFile) -> io::Result<HashResult> {
    let on_disk = std::fs::metadata(path)?.len();
    if on_disk != expected.size {
        return Ok(HashResult {
            expected_size: expected.size,
            actual_size: on_disk,
            verdict: HashVerdict::SizeMismatch,
        });
    }
    let (actual_size, digests) = digest_file(path, expected.checksums.keys().copied())?;
    Ok(judge(expected, actual_size, &digests))
}

/// Verifies an in-memory buffer (e.g. a cue sheet) against its manifest entry.
pub fn verify_bytes(bytes: &[u8], expected: &ManifestFile) -> HashResult {
    let actual_size = bytes.len() as u64;
    if actual_size != expected.size {
        return HashResult {
            expected_size: expected.size,
            actual_size,
            verdict: HashVerdict::SizeMismatch,
        };
    }
    let mut hasher = MultiHasher::new(expected.checksums.keys().copied());
    hasher.update(bytes);
    judge(expected, actual_size, &hasher.finalize())
}

fn judge(expected: &ManifestFile, actual_size: u64, digests: &Digests) -> HashResult {
    let verdict = if actual_size != expected.size {
        HashVerdict::SizeMismatch
    } else if expected.checksums.is_empty() {
        HashVerdict::NoAlgorithmMatched
    } else {
        let mismatch = expected.checksums.iter().find_map(|(kind, want)| {
            let got = digests.get(kind).map(String::as_str).unwrap_or_default();
            (!got.eq_ignore_ascii_case(want)).then(|| HashVerdict::ChecksumMismatch {
                algorithm: *kind,
                expected: want.clone(),
                actual: got.to_string(),
            })
        });
        mismatch.unwrap_or_else(|| {
            HashVerdict::Matched(expected.checksums.keys().copied().collect())
        })
    };
    HashResult {
        expected_size: expected.size,
        actual_size,
        verdict,
    }
}
