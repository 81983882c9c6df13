//! `.chd` images, rebuilt with chdman and split with binmerge.

use super::{ConversionRequest, DumpConverter, Reconstruction};
use crate::config::ToolBinary;
use crate::cue::{
    CueFile, CueIndex, CueMeta, CueSheet, CueTrack, FileType, LineEnding, MetaKeyword, Msf,
    TrackEntry, TrackType,
};
use crate::error::{VerifyError, VerifyResult};
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Systems whose discs are GD-ROMs. chdman only converts those correctly to
/// `.gdi`, never to `.cue`.
const GDROM_SYSTEMS: &[&str] = &[
    "sega - dreamcast",
    "dc",
    "arcade - sega - chihiro",
    "chihiro",
    "arcade - sega - naomi",
    "naomi",
    "arcade - sega - naomi 2",
    "naomi2",
    "arcade - namco - sega - nintendo - triforce",
    "trf",
];

/// LBA at which the high-density area of a GD-ROM starts.
const HIGH_DENSITY_LBA: u64 = 45000;

pub fn is_gdrom_system(system: &str) -> bool {
    let system = system.trim().to_lowercase();
    GDROM_SYSTEMS.contains(&system.as_str())
}

#[derive(Debug, Clone)]
pub struct ChdConverter {
    chdman: ToolBinary,
    binmerge: ToolBinary,
}

impl ChdConverter {
    pub fn new(chdman: ToolBinary, binmerge: ToolBinary) -> Self {
        Self { chdman, binmerge }
    }

    fn extract_bincue(&self, request: &ConversionRequest<'_>, name: &str) -> VerifyResult<()> {
        // chdman output stays in scratch so only binmerge's files land in the dump folder.
        let chdman_cue = request.scratch_dir.join(format!("{name}.cue"));
        debug!("Converting \"{}\" to .bin/.cue format", request.source.display());
        request.runner.run_checked(
            &self.chdman,
            [
                OsStr::new("extractcd"),
                OsStr::new("--input"),
                request.source.as_os_str(),
                OsStr::new("--output"),
                chdman_cue.as_os_str(),
            ],
            "Failed to convert .chd using chdman",
        )?;

        debug!("Splitting \"{name}.cue\" to use separate tracks if necessary");
        request.runner.run_checked(
            &self.binmerge,
            [
                OsStr::new("--split"),
                OsStr::new("-o"),
                request.output_dir.as_os_str(),
                chdman_cue.as_os_str(),
                OsStr::new(name),
            ],
            "Failed to split .bin into separate tracks using binmerge",
        )?;
        Ok(())
    }

    fn extract_gdi(&self, request: &ConversionRequest<'_>, name: &str) -> VerifyResult<()> {
        let gdi = request.output_dir.join(format!("{name}.gdi"));
        debug!("Converting \"{}\" to .bin/.gdi format", request.source.display());
        request.runner.run_checked(
            &self.chdman,
            [
                OsStr::new("extractcd"),
                OsStr::new("--input"),
                request.source.as_os_str(),
                OsStr::new("--output"),
                gdi.as_os_str(),
            ],
            "Failed to convert .chd to .bin/.gdi using chdman",
        )?;
        Ok(())
    }
}

impl DumpConverter for ChdConverter {
    fn extensions(&self) -> &[&'static str] {
        &["chd"]
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> VerifyResult<Reconstruction> {
        let name = request.dump_name();
        if request.system.is_some_and(is_gdrom_system) {
            self.extract_gdi(request, &name)?;
            normalize_gdi_dump(request.output_dir, &name)?;
        } else {
            self.extract_bincue(request, &name)?;
            normalize_bincue_dump(request.output_dir, &name)?;
        }
        Ok(Reconstruction::Files)
    }
}

/// Renames binmerge output to Redump conventions.
///
/// A single track is stored as `<name>.bin` and the cue is rewritten with
/// CRLF line endings. A single MODE1/2048 track starting at 00:00:00 is an
/// `.iso` dump, so the image is renamed and the cue dropped.
pub fn normalize_bincue_dump(dir: &Path, name: &str) -> VerifyResult<()> {
    let track_files = list_files(dir)?
        .iter()
        .filter(|file| bincue_track_number(file, name).is_some())
        .count();
    if track_files > 1 {
        return Ok(());
    }

    let cue_path = dir.join(format!("{name}.cue"));
    let track_bin = format!("{name} (Track 1).bin");
    let single_bin = format!("{name}.bin");
    debug!("Renaming \"{track_bin}\" to \"{single_bin}\" because there is only one .bin file in the dump");
    fs::rename(dir.join(&track_bin), dir.join(&single_bin))
        .map_err(|err| VerifyError::io("Failed to rename track file", dir.join(&track_bin), err))?;

    let text = fs::read_to_string(&cue_path)
        .map_err(|err| VerifyError::io("Failed to read generated cue", &cue_path, err))?;
    let text = text
        .replace("\r\n", "\n")
        .replace(
            &format!("FILE \"{track_bin}\""),
            &format!("FILE \"{single_bin}\""),
        )
        .replace('\n', "\r\n");
    fs::write(&cue_path, &text)
        .map_err(|err| VerifyError::io("Failed to write generated cue", &cue_path, err))?;

    let iso_compatible = CueSheet::parse(&text)
        .map(|sheet| is_iso_compatible(&sheet, &single_bin))
        .unwrap_or(false);
    if iso_compatible {
        debug!("\"{name}.cue\" is .iso compatible so converting dump to .iso and discarding .cue");
        let iso_path = dir.join(format!("{name}.iso"));
        fs::rename(dir.join(&single_bin), &iso_path)
            .map_err(|err| VerifyError::io("Failed to rename image to .iso", &iso_path, err))?;
        fs::remove_file(&cue_path)
            .map_err(|err| VerifyError::io("Failed to remove generated cue", &cue_path, err))?;
    }
    Ok(())
}

fn is_iso_compatible(sheet: &CueSheet, bin_name: &str) -> bool {
    let [file] = sheet.files.as_slice() else {
        return false;
    };
    let [track] = file.tracks.as_slice() else {
        return false;
    };
    sheet.preamble.is_empty()
        && file.metadata.is_empty()
        && file.path == bin_name
        && file.file_type == FileType::Binary
        && track.number == 1
        && track.track_type == TrackType::Mode1_2048
        && track.entries
            == [TrackEntry::Index(CueIndex {
                number: 1,
                position: Msf::ZERO,
            })]
}

/// Renames chdman's `.gdi` track files to Redump names and replaces the
/// `.gdi` with the equivalent `.cue`.
pub fn normalize_gdi_dump(dir: &Path, name: &str) -> VerifyResult<()> {
    let track_files: Vec<(String, u32)> = list_files(dir)?
        .into_iter()
        .filter_map(|file| gdi_track_number(&file, name).map(|number| (file, number)))
        .collect();
    let track_count = track_files.len();

    for (file, number) in &track_files {
        let number = *number;
        let renamed = redump_track_name(name, number, track_count);
        debug!("Renaming \"{file}\" to \"{renamed}\"");
        fs::rename(dir.join(file), dir.join(&renamed))
            .map_err(|err| VerifyError::io("Failed to rename track file", dir.join(file), err))?;
    }

    let gdi_path = dir.join(format!("{name}.gdi"));
    let gdi = fs::read_to_string(&gdi_path)
        .map_err(|err| VerifyError::io("Failed to read .gdi", &gdi_path, err))?;
    let sheet = gdi_to_cue(&gdi, name)?;
    let cue_path = dir.join(format!("{name}.cue"));
    fs::write(&cue_path, sheet.render(LineEnding::CrLf))
        .map_err(|err| VerifyError::io("Failed to write generated cue", &cue_path, err))?;
    fs::remove_file(&gdi_path)
        .map_err(|err| VerifyError::io("Failed to remove .gdi", &gdi_path, err))
}

/// Track number of a binmerge `<name> (Track N).bin` file.
fn bincue_track_number(file: &str, name: &str) -> Option<u32> {
    let digits = file
        .strip_prefix(name)?
        .strip_prefix(" (Track ")?
        .strip_suffix(").bin")?;
    parse_digits(digits)
}

/// Track number of a chdman `<name>NN.bin` or `<name>NN.raw` file.
fn gdi_track_number(file: &str, name: &str) -> Option<u32> {
    let rest = file.strip_prefix(name)?;
    let digits = rest
        .strip_suffix(".bin")
        .or_else(|| rest.strip_suffix(".raw"))?;
    parse_digits(digits)
}

fn parse_digits(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `<name> (Track N).bin`, zero-padded to two digits on discs with ten or
/// more tracks.
pub fn redump_track_name(name: &str, number: u32, track_count: usize) -> String {
    if track_count >= 10 {
        format!("{name} (Track {number:02}).bin")
    } else {
        format!("{name} (Track {number}).bin")
    }
}

struct GdiTrack {
    number: u8,
    lba: u64,
    mode: u32,
    sector_size: u32,
}

fn parse_gdi_line(line: &str) -> Option<GdiTrack> {
    let mut rest = line.trim();
    let mut numbers = [0u64; 4];
    for slot in numbers.iter_mut() {
        let end = rest.find(char::is_whitespace)?;
        *slot = rest[..end].parse().ok()?;
        rest = rest[end..].trim_start();
    }
    // File name, quoted when it contains spaces, then the disc offset.
    let after_name = match rest.strip_prefix('"') {
        Some(quoted) => &quoted[quoted.find('"')? + 1..],
        None => &rest[rest.find(char::is_whitespace)?..],
    };
    after_name.trim().parse::<u64>().ok()?;
    let [number, lba, mode, sector_size] = numbers;
    Some(GdiTrack {
        number: u8::try_from(number).ok()?,
        lba,
        mode: u32::try_from(mode).ok()?,
        sector_size: u32::try_from(sector_size).ok()?,
    })
}

/// Builds the Redump `.cue` for a GD-ROM from chdman's `.gdi`.
///
/// The `.gdi` carries no pregap information, but GD-ROM discs follow a
/// fixed pattern, so indices are recreated from track position.
pub fn gdi_to_cue(gdi: &str, name: &str) -> VerifyResult<CueSheet> {
    // First line is the track count.
    let lines: Vec<&str> = gdi
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .collect();
    let track_count = lines.len();
    let mut sheet = CueSheet::default();

    for line in lines {
        let track = parse_gdi_line(line).ok_or_else(|| {
            VerifyError::tool(
                format!("Line in .gdi file didn't match expected format: {line}"),
                None,
            )
        })?;

        match track.number {
            1 if track.lba != 0 => {
                return Err(VerifyError::tool(
                    format!("Unexpected LBA of first track: {}", track.lba),
                    None,
                ))
            }
            1 => sheet.preamble.push(remark("SINGLE-DENSITY AREA")),
            3 if track.lba != HIGH_DENSITY_LBA => {
                return Err(VerifyError::tool(
                    format!("Unexpected LBA of track 3: {}", track.lba),
                    None,
                ))
            }
            3 => {
                let area = remark("HIGH-DENSITY AREA");
                match sheet.files.last_mut().and_then(|file| file.tracks.last_mut()) {
                    Some(previous) => previous.entries.push(TrackEntry::Meta(area)),
                    None => sheet.preamble.push(area),
                }
            }
            _ => {}
        }

        let track_type = match (track.mode, track.sector_size) {
            (0, _) => TrackType::Audio,
            (4, size @ (2048 | 2352)) => format!("MODE1/{size:04}")
                .parse()
                .map_err(|err: String| VerifyError::tool(err, None))?,
            (4, size) => format!("MODE2/{size:04}")
                .parse()
                .map_err(|err: String| VerifyError::tool(err, None))?,
            (mode, _) => {
                return Err(VerifyError::tool(
                    format!("Unexpected .gdi track mode: {mode}"),
                    None,
                ))
            }
        };

        let mut cue_track = CueTrack::new(track.number, track_type);
        let pregap_index = match track_type {
            TrackType::Audio => Some(Msf::new(0, 2, 0)),
            // First track of the single-density or high-density area.
            _ if track.number == 1 || track.number == 3 => None,
            _ if usize::from(track.number) == track_count => Some(Msf::new(0, 3, 0)),
            _ => Some(Msf::new(0, 2, 0)),
        };
        match pregap_index {
            Some(start) => {
                cue_track.entries.push(index(0, Msf::ZERO));
                cue_track.entries.push(index(1, start));
            }
            None => cue_track.entries.push(index(1, Msf::ZERO)),
        }

        let mut file = CueFile::new(
            redump_track_name(name, u32::from(track.number), track_count),
            FileType::Binary,
        );
        file.tracks.push(cue_track);
        sheet.files.push(file);
    }
    Ok(sheet)
}

fn remark(text: &str) -> CueMeta {
    CueMeta {
        keyword: MetaKeyword::Rem,
        value: text.to_string(),
    }
}

fn index(number: u8, position: Msf) -> TrackEntry {
    TrackEntry::Index(CueIndex { number, position })
}

fn list_files(dir: &Path) -> VerifyResult<Vec<String>> {
    let entries =
        fs::read_dir(dir).map_err(|err| VerifyError::io("Failed to list dump folder", dir, err))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| VerifyError::io("Failed to list dump folder", dir, err))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
