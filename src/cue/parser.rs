use super::model::{
    CueFile, CueIndex, CueMeta, CueSheet, CueTrack, FileType, MetaKeyword, Msf, TrackEntry,
    TrackType,
};
use crate::error::{VerifyError, VerifyResult};

const MAX_NUMBER: u8 = 99;

impl CueSheet {
    /// Parses cue sheet text.
    ///
    /// Keyword case and indentation vary between producers and are ignored;
    /// numbering is not: tracks must increase within a file and indices
    /// within a track.
    pub fn parse(text: &str) -> VerifyResult<CueSheet> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut sheet = CueSheet::default();
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let (keyword, rest) = match line.split_once(char::is_whitespace) {
                Some((keyword, rest)) => (keyword, rest.trim()),
                None => (line, ""),
            };
            let keyword = keyword.to_ascii_uppercase();
            match keyword.as_str() {
                "FILE" => {
                    let (path, file_type) =
                        parse_file_args(rest).map_err(|msg| VerifyError::cue(line_no, msg))?;
                    sheet.files.push(CueFile::new(path, file_type));
                }
                "TRACK" => parse_track(&mut sheet, rest, line_no)?,
                "INDEX" => {
                    let (number, position) = split_two(rest, "INDEX <number> <mm:ss:ff>")
                        .and_then(|(n, p)| Ok((parse_number(n, 0)?, parse_msf(p)?)))
                        .map_err(|msg| VerifyError::cue(line_no, msg))?;
                    let track = current_track(&mut sheet, "INDEX", line_no)?;
                    if let Some(last) = track.indices().last() {
                        if number <= last.number {
                            return Err(VerifyError::cue(
                                line_no,
                                format!(
                                    "INDEX {number:02} follows INDEX {:02} in TRACK {:02}",
                                    last.number, track.number
                                ),
                            ));
                        }
                    }
                    track.entries.push(TrackEntry::Index(CueIndex { number, position }));
                }
                "PREGAP" | "POSTGAP" => {
                    let msf = parse_msf(rest).map_err(|msg| VerifyError::cue(line_no, msg))?;
                    let track = current_track(&mut sheet, &keyword, line_no)?;
                    track.entries.push(if keyword == "PREGAP" {
                        TrackEntry::Pregap(msf)
                    } else {
                        TrackEntry::Postgap(msf)
                    });
                }
                "FLAGS" => {
                    let flags = rest
                        .split_whitespace()
                        .map(|flag| flag.to_ascii_uppercase())
                        .collect();
                    current_track(&mut sheet, "FLAGS", line_no)?
                        .entries
                        .push(TrackEntry::Flags(flags));
                }
                "ISRC" => {
                    if rest.is_empty() {
                        return Err(VerifyError::cue(line_no, "ISRC without a code"));
                    }
                    current_track(&mut sheet, "ISRC", line_no)?
                        .entries
                        .push(TrackEntry::Isrc(rest.to_string()));
                }
                other => match MetaKeyword::from_keyword(other) {
                    Some(keyword) => push_meta(&mut sheet, keyword, rest),
                    None => {
                        return Err(VerifyError::cue(
                            line_no,
                            format!("unknown command \"{other}\""),
                        ))
                    }
                },
            }
        }
        Ok(sheet)
    }
}

fn parse_track(sheet: &mut CueSheet, rest: &str, line_no: usize) -> VerifyResult<()> {
    let (number, track_type) = split_two(rest, "TRACK <number> <type>")
        .and_then(|(n, t)| Ok((parse_number(n, 1)?, t.parse::<TrackType>()?)))
        .map_err(|msg| VerifyError::cue(line_no, msg))?;
    let file = sheet.files.last_mut().ok_or_else(|| {
        VerifyError::cue(
            line_no,
            format!("TRACK {number:02} is not inside a FILE (reference to an undeclared file)"),
        )
    })?;
    if let Some(last) = file.tracks.last() {
        if number <= last.number {
            return Err(VerifyError::cue(
                line_no,
                format!(
                    "TRACK {number:02} follows TRACK {:02} in FILE \"{}\"",
                    last.number, file.path
                ),
            ));
        }
    }
    file.tracks.push(CueTrack::new(number, track_type));
    Ok(())
}

fn current_track<'a>(
    sheet: &'a mut CueSheet,
    keyword: &str,
    line_no: usize,
) -> VerifyResult<&'a mut CueTrack> {
    sheet
        .files
        .last_mut()
        .and_then(|file| file.tracks.last_mut())
        .ok_or_else(|| VerifyError::cue(line_no, format!("{keyword} appears before any TRACK")))
}

fn push_meta(sheet: &mut CueSheet, keyword: MetaKeyword, rest: &str) {
    let value = if keyword == MetaKeyword::Rem {
        rest.to_string()
    } else {
        unquote(rest).to_string()
    };
    let meta = CueMeta { keyword, value };
    match sheet.files.last_mut() {
        None => sheet.preamble.push(meta),
        Some(file) => match file.tracks.last_mut() {
            None => file.metadata.push(meta),
            Some(track) => track.entries.push(TrackEntry::Meta(meta)),
        },
    }
}

/// `FILE "name with spaces.bin" BINARY` or `FILE name.bin BINARY`.
fn parse_file_args(rest: &str) -> Result<(String, FileType), String> {
    let (path, remainder) = if let Some(quoted) = rest.strip_prefix('"') {
        let end = quoted
            .find('"')
            .ok_or_else(|| "unterminated file name".to_string())?;
        (&quoted[..end], quoted[end + 1..].trim())
    } else {
        match rest.rsplit_once(char::is_whitespace) {
            Some((path, file_type)) => (path.trim(), file_type),
            None => return Err("FILE needs a name and a type".into()),
        }
    };
    if path.is_empty() {
        return Err("FILE with an empty name".into());
    }
    if remainder.is_empty() {
        return Err(format!("FILE \"{path}\" has no type"));
    }
    Ok((path.to_string(), remainder.parse()?))
}

fn split_two<'a>(rest: &'a str, usage: &str) -> Result<(&'a str, &'a str), String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => Ok((first, second)),
        _ => Err(format!("expected {usage}, found \"{rest}\"")),
    }
}

fn parse_number(text: &str, min: u8) -> Result<u8, String> {
    match text.parse::<u8>() {
        Ok(number) if (min..=MAX_NUMBER).contains(&number) => Ok(number),
        _ => Err(format!("number \"{text}\" is outside {min}..={MAX_NUMBER}")),
    }
}

fn parse_msf(text: &str) -> Result<Msf, String> {
    text.trim().parse()
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}
