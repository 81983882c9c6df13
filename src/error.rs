use std::path::PathBuf;

use thiserror::Error;

use crate::hashing::ChecksumKind;

pub type VerifyResult<T> = Result<T, VerifyError>;

/// Everything that can go wrong while verifying a dump.
///
/// Per-dump variants are folded into that dump's verdict by the pipeline;
/// only `ManifestParse` (and I/O while reading the manifest) aborts a run.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Datfile could not be parsed: {0}")]
    ManifestParse(String),

    #[error("line {line}: {message}")]
    CueParse { line: usize, message: String },

    #[error("game file \"{name}\" is missing in dump")]
    MissingFile { name: String },

    #[error("dump file \"{name}\" is {actual} bytes but the Datfile expects {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("dump file \"{name}\" has {algorithm} {actual}, the Datfile expects {expected}")]
    ChecksumMismatch {
        name: String,
        algorithm: ChecksumKind,
        expected: String,
        actual: String,
    },

    #[error("\"{name}\" does not match the essential structure of the extra .cue: {}", .fields.join("; "))]
    StructuralCueMismatch { name: String, fields: Vec<String> },

    #[error("{message}{}", tool_output_suffix(.tool_output))]
    ConversionToolFailure {
        message: String,
        tool_output: Option<String>,
    },

    #[error("{0}")]
    ConfigurationError(String),

    #[error("dump has extra file \"{name}\" that isn't part of \"{game}\" in the Datfile")]
    UnexpectedFile { name: String, game: String },

    #[error("dump file \"{name}\" doesn't match any file in the Datfile")]
    UnknownDump { name: String },

    #[error("dump file \"{name}\" found in the Datfile, but it should be named {expected}")]
    Misnamed { name: String, expected: String },

    #[error("don't know how to handle \"{extension}\" dumps")]
    UnsupportedFormat { extension: String },

    #[error("verification cancelled")]
    Cancelled,

    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tool output exactly as captured; whitespace-only output is left out.
fn tool_output_suffix(output: &Option<String>) -> String {
    match output.as_deref() {
        Some(text) if !text.trim().is_empty() => format!("\n{text}"),
        _ => String::new(),
    }
}

impl VerifyError {
    /// Stable taxonomy name, used to prefix verdict detail lines.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::ManifestParse(_) => "ManifestParseError",
            VerifyError::CueParse { .. } => "CueParseError",
            VerifyError::MissingFile { .. } => "MissingFile",
            VerifyError::SizeMismatch { .. } => "SizeMismatch",
            VerifyError::ChecksumMismatch { .. } => "ChecksumMismatch",
            VerifyError::StructuralCueMismatch { .. } => "StructuralCueMismatch",
            VerifyError::ConversionToolFailure { .. } => "ConversionToolFailure",
            VerifyError::ConfigurationError(_) => "ConfigurationError",
            VerifyError::UnexpectedFile { .. } => "UnexpectedFile",
            VerifyError::UnknownDump { .. } => "UnknownDump",
            VerifyError::Misnamed { .. } => "Misnamed",
            VerifyError::UnsupportedFormat { .. } => "UnsupportedFormat",
            VerifyError::Cancelled => "Cancelled",
            VerifyError::Io { .. } => "IoError",
        }
    }

    /// Formats the error as a verdict detail line.
    pub fn as_finding(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    pub(crate) fn io(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        VerifyError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn cue(line: usize, message: impl Into<String>) -> Self {
        VerifyError::CueParse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn tool(message: impl Into<String>, tool_output: Option<String>) -> Self {
        VerifyError::ConversionToolFailure {
            message: message.into(),
            tool_output,
        }
    }
}
