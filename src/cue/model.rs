use std::fmt;
use std::str::FromStr;

/// A position on the disc in minutes, seconds and frames (75 per second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Msf {
    pub minutes: u32,
    pub seconds: u8,
    pub frames: u8,
}

pub const FRAMES_PER_SECOND: u32 = 75;

impl Msf {
    pub const ZERO: Msf = Msf {
        minutes: 0,
        seconds: 0,
        frames: 0,
    };

    pub fn new(minutes: u32, seconds: u8, frames: u8) -> Self {
        Self {
            minutes,
            seconds,
            frames,
        }
    }

    pub fn total_frames(&self) -> u64 {
        (u64::from(self.minutes) * 60 + u64::from(self.seconds)) * u64::from(FRAMES_PER_SECOND)
            + u64::from(self.frames)
    }
}

impl FromStr for Msf {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = text.split(':').collect();
        let [minutes, seconds, frames] = parts[..] else {
            return Err(format!("expected mm:ss:ff, found \"{text}\""));
        };
        let field = |value: &str, what: &str| {
            value
                .parse::<u32>()
                .map_err(|_| format!("invalid {what} \"{value}\" in \"{text}\""))
        };
        let minutes = field(minutes, "minutes")?;
        let seconds = field(seconds, "seconds")?;
        let frames = field(frames, "frames")?;
        if seconds >= 60 {
            return Err(format!("seconds out of range in \"{text}\""));
        }
        if frames >= FRAMES_PER_SECOND {
            return Err(format!("frames out of range in \"{text}\""));
        }
        Ok(Msf::new(minutes, seconds as u8, frames as u8))
    }
}

impl fmt::Display for Msf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.minutes, self.seconds, self.frames)
    }
}

/// Storage type of a `FILE` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Binary,
    Motorola,
    Aiff,
    Wave,
    Mp3,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Binary => "BINARY",
            FileType::Motorola => "MOTOROLA",
            FileType::Aiff => "AIFF",
            FileType::Wave => "WAVE",
            FileType::Mp3 => "MP3",
        }
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text.to_ascii_uppercase().as_str() {
            "BINARY" => Ok(FileType::Binary),
            "MOTOROLA" => Ok(FileType::Motorola),
            "AIFF" => Ok(FileType::Aiff),
            "WAVE" => Ok(FileType::Wave),
            "MP3" => Ok(FileType::Mp3),
            _ => Err(format!("unknown file type \"{text}\"")),
        }
    }
}

/// Sector layout of a `TRACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Audio,
    Cdg,
    Mode1_2048,
    Mode1_2352,
    Mode2_2048,
    Mode2_2324,
    Mode2_2336,
    Mode2_2352,
    Cdi2336,
    Cdi2352,
}

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Audio => "AUDIO",
            TrackType::Cdg => "CDG",
            TrackType::Mode1_2048 => "MODE1/2048",
            TrackType::Mode1_2352 => "MODE1/2352",
            TrackType::Mode2_2048 => "MODE2/2048",
            TrackType::Mode2_2324 => "MODE2/2324",
            TrackType::Mode2_2336 => "MODE2/2336",
            TrackType::Mode2_2352 => "MODE2/2352",
            TrackType::Cdi2336 => "CDI/2336",
            TrackType::Cdi2352 => "CDI/2352",
        }
    }
}

impl FromStr for TrackType {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let track_type = match text.to_ascii_uppercase().as_str() {
            "AUDIO" => TrackType::Audio,
            "CDG" => TrackType::Cdg,
            "MODE1/2048" => TrackType::Mode1_2048,
            "MODE1/2352" => TrackType::Mode1_2352,
            "MODE2/2048" => TrackType::Mode2_2048,
            "MODE2/2324" => TrackType::Mode2_2324,
            "MODE2/2336" => TrackType::Mode2_2336,
            "MODE2/2352" => TrackType::Mode2_2352,
            "CDI/2336" => TrackType::Cdi2336,
            "CDI/2352" => TrackType::Cdi2352,
            _ => return Err(format!("unknown track type \"{text}\"")),
        };
        Ok(track_type)
    }
}

/// Commands that are kept in position but carry no disc layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKeyword {
    Rem,
    Catalog,
    CdTextFile,
    Performer,
    Title,
    Songwriter,
}

impl MetaKeyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKeyword::Rem => "REM",
            MetaKeyword::Catalog => "CATALOG",
            MetaKeyword::CdTextFile => "CDTEXTFILE",
            MetaKeyword::Performer => "PERFORMER",
            MetaKeyword::Title => "TITLE",
            MetaKeyword::Songwriter => "SONGWRITER",
        }
    }

    pub(crate) fn from_keyword(keyword: &str) -> Option<Self> {
        let meta = match keyword {
            "REM" => MetaKeyword::Rem,
            "CATALOG" => MetaKeyword::Catalog,
            "CDTEXTFILE" => MetaKeyword::CdTextFile,
            "PERFORMER" => MetaKeyword::Performer,
            "TITLE" => MetaKeyword::Title,
            "SONGWRITER" => MetaKeyword::Songwriter,
            _ => return None,
        };
        Some(meta)
    }

    /// CD-TEXT strings are rendered quoted.
    fn quoted(&self) -> bool {
        matches!(
            self,
            MetaKeyword::Performer
                | MetaKeyword::Title
                | MetaKeyword::Songwriter
                | MetaKeyword::CdTextFile
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueMeta {
    pub keyword: MetaKeyword,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueIndex {
    pub number: u8,
    pub position: Msf,
}

/// A line inside a `TRACK`, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEntry {
    Index(CueIndex),
    Pregap(Msf),
    Postgap(Msf),
    Flags(Vec<String>),
    Isrc(String),
    Meta(CueMeta),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueTrack {
    pub number: u8,
    pub track_type: TrackType,
    pub entries: Vec<TrackEntry>,
}

impl CueTrack {
    pub fn new(number: u8, track_type: TrackType) -> Self {
        Self {
            number,
            track_type,
            entries: Vec::new(),
        }
    }

    pub fn indices(&self) -> impl Iterator<Item = &CueIndex> {
        self.entries.iter().filter_map(|entry| match entry {
            TrackEntry::Index(index) => Some(index),
            _ => None,
        })
    }

    pub fn pregap(&self) -> Option<Msf> {
        self.entries.iter().find_map(|entry| match entry {
            TrackEntry::Pregap(msf) => Some(*msf),
            _ => None,
        })
    }

    pub fn postgap(&self) -> Option<Msf> {
        self.entries.iter().find_map(|entry| match entry {
            TrackEntry::Postgap(msf) => Some(*msf),
            _ => None,
        })
    }

    pub fn flags(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                TrackEntry::Flags(flags) => Some(flags),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn isrc(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            TrackEntry::Isrc(code) => Some(code.as_str()),
            _ => None,
        })
    }

    pub fn metadata(&self) -> impl Iterator<Item = &CueMeta> {
        self.entries.iter().filter_map(|entry| match entry {
            TrackEntry::Meta(meta) => Some(meta),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueFile {
    pub path: String,
    pub file_type: FileType,
    /// Metadata between the `FILE` line and its first `TRACK`.
    pub metadata: Vec<CueMeta>,
    pub tracks: Vec<CueTrack>,
}

impl CueFile {
    pub fn new(path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
            metadata: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// Extension of the referenced file, lowercased, without the dot.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// A parsed cue sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CueSheet {
    /// Disc-level metadata before the first `FILE`.
    pub preamble: Vec<CueMeta>,
    pub files: Vec<CueFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl CueSheet {
    pub fn tracks(&self) -> impl Iterator<Item = &CueTrack> {
        self.files.iter().flat_map(|file| file.tracks.iter())
    }

    /// Canonical cue text. Redump cue sheets use CRLF line endings.
    pub fn render(&self, ending: LineEnding) -> String {
        let eol = ending.as_str();
        let mut out = String::new();
        for meta in &self.preamble {
            push_meta(&mut out, 0, meta, eol);
        }
        for file in &self.files {
            out.push_str(&format!("FILE \"{}\" {}{eol}", file.path, file.file_type.as_str()));
            for meta in &file.metadata {
                push_meta(&mut out, 1, meta, eol);
            }
            for track in &file.tracks {
                out.push_str(&format!(
                    "  TRACK {:02} {}{eol}",
                    track.number,
                    track.track_type.as_str()
                ));
                for entry in &track.entries {
                    let line = match entry {
                        TrackEntry::Index(index) => {
                            format!("INDEX {:02} {}", index.number, index.position)
                        }
                        TrackEntry::Pregap(msf) => format!("PREGAP {msf}"),
                        TrackEntry::Postgap(msf) => format!("POSTGAP {msf}"),
                        TrackEntry::Flags(flags) => format!("FLAGS {}", flags.join(" ")),
                        TrackEntry::Isrc(code) => format!("ISRC {code}"),
                        TrackEntry::Meta(meta) => {
                            push_meta(&mut out, 2, meta, eol);
                            continue;
                        }
                    };
                    out.push_str(&format!("    {line}{eol}"));
                }
            }
        }
        out
    }
}

fn push_meta(out: &mut String, depth: usize, meta: &CueMeta, eol: &str) {
    // Remarks always start at column 0, wherever they appear.
    let indent = match meta.keyword {
        MetaKeyword::Rem => String::new(),
        _ => "  ".repeat(depth),
    };
    if meta.keyword.quoted() {
        out.push_str(&format!("{indent}{} \"{}\"{eol}", meta.keyword.as_str(), meta.value));
    } else {
        out.push_str(&format!("{indent}{} {}{eol}", meta.keyword.as_str(), meta.value));
    }
}

impl fmt::Display for CueSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(LineEnding::Lf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msf_parses_and_formats() {
        let msf: Msf = "12:34:56".parse().unwrap();
        assert_eq!(msf, Msf::new(12, 34, 56));
        assert_eq!(msf.to_string(), "12:34:56");
        assert_eq!(Msf::new(0, 2, 0).total_frames(), 150);
        assert!("00:60:00".parse::<Msf>().is_err());
        assert!("00:00:75".parse::<Msf>().is_err());
        assert!("00:00".parse::<Msf>().is_err());
    }

    #[test]
    fn types_are_case_insensitive() {
        assert_eq!("mode2/2352".parse::<TrackType>(), Ok(TrackType::Mode2_2352));
        assert_eq!("Binary".parse::<FileType>(), Ok(FileType::Binary));
        assert!("MODE3/2352".parse::<TrackType>().is_err());
    }
}
