use super::{ManifestFile, ManifestGame};
use crate::error::{VerifyError, VerifyResult};
use crate::hashing::ChecksumKind;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashSet};

pub(super) struct ParsedDatfile {
    pub system: Option<String>,
    pub games: Vec<ManifestGame>,
}

/// Streaming parse of a Logiqx-style `<datafile>`.
pub(super) fn parse_datfile(raw: &[u8]) -> VerifyResult<ParsedDatfile> {
    let mut reader = Reader::from_reader(raw);
    reader.trim_text(true);

    let mut state = DatParser::default();
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).map_err(|err| {
            VerifyError::ManifestParse(format!(
                "malformed XML at byte {}: {err}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(tag) => state.start(&tag)?,
            Event::Empty(tag) => {
                state.start(&tag)?;
                state.end();
            }
            Event::End(_) => state.end(),
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|err| VerifyError::ManifestParse(err.to_string()))?;
                state.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if state.path.first().is_some() {
        return Err(VerifyError::ManifestParse(format!(
            "unexpected end of file inside <{}>",
            state.path.join("><")
        )));
    }
    if !state.saw_root {
        return Err(VerifyError::ManifestParse(
            "no <datafile> root element".into(),
        ));
    }
    Ok(ParsedDatfile {
        system: state.system,
        games: state.games,
    })
}

#[derive(Default)]
struct DatParser {
    path: Vec<String>,
    saw_root: bool,
    system: Option<String>,
    games: Vec<ManifestGame>,
    game_names: HashSet<String>,
    current: Option<ManifestGame>,
}

impl DatParser {
    fn start(&mut self, tag: &BytesStart<'_>) -> VerifyResult<()> {
        let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
        self.path.push(name);
        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        match path.as_slice() {
            ["datafile"] => self.saw_root = true,
            ["datafile", "game"] => {
                let game_name = required_attribute(tag, "game", "name")?;
                if !self.game_names.insert(game_name.clone()) {
                    return Err(VerifyError::ManifestParse(format!(
                        "duplicate game name \"{game_name}\""
                    )));
                }
                self.current = Some(ManifestGame {
                    name: game_name,
                    files: Vec::new(),
                });
            }
            ["datafile", "game", "rom"] => {
                let rom = parse_rom(tag)?;
                let game = self.current.as_mut().ok_or_else(|| {
                    VerifyError::ManifestParse("found a <rom> that was not within a <game>".into())
                })?;
                if game.files.iter().any(|file| file.name == rom.name) {
                    return Err(VerifyError::ManifestParse(format!(
                        "game \"{}\" lists \"{}\" more than once",
                        game.name, rom.name
                    )));
                }
                game.files.push(rom);
            }
            [.., "game", "game"] => {
                return Err(VerifyError::ManifestParse(
                    "found a <game> within another <game>".into(),
                ));
            }
            [.., "rom"] if !path.contains(&"game") => {
                return Err(VerifyError::ManifestParse(
                    "found a <rom> that was not within a <game>".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self) {
        if self.path.len() == 2 && self.path[1] == "game" {
            if let Some(game) = self.current.take() {
                self.games.push(game);
            }
        }
        self.path.pop();
    }

    fn text(&mut self, text: &str) {
        if self.path == ["datafile", "header", "name"] {
            self.system = Some(text.trim().to_string());
        }
    }
}

fn parse_rom(tag: &BytesStart<'_>) -> VerifyResult<ManifestFile> {
    let name = required_attribute(tag, "rom", "name")?;
    let size_text = required_attribute(tag, "rom", "size")?;
    let size = size_text.trim().parse::<u64>().map_err(|_| {
        VerifyError::ManifestParse(format!(
            "<rom name=\"{name}\"> has size attribute that is not an integer: {size_text}"
        ))
    })?;

    let mut checksums = BTreeMap::new();
    for kind in ChecksumKind::ALL {
        if let Some(hex) = attribute(tag, kind.dat_attribute())? {
            let hex = hex.trim().to_ascii_lowercase();
            if hex.is_empty() {
                continue;
            }
            if hex.len() != kind.hex_len() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(VerifyError::ManifestParse(format!(
                    "<rom name=\"{name}\"> has an invalid {kind} value: {hex}"
                )));
            }
            checksums.insert(kind, hex);
        }
    }
    if checksums.is_empty() {
        return Err(VerifyError::ManifestParse(format!(
            "<rom name=\"{name}\"> has no crc, md5 or sha1 attribute"
        )));
    }
    Ok(ManifestFile {
        name,
        size,
        checksums,
    })
}

fn attribute(tag: &BytesStart<'_>, key: &str) -> VerifyResult<Option<String>> {
    for attr in tag.attributes() {
        let attr = attr.map_err(|err| VerifyError::ManifestParse(err.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| VerifyError::ManifestParse(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attribute(tag: &BytesStart<'_>, element: &str, key: &str) -> VerifyResult<String> {
    match attribute(tag, key)? {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(VerifyError::ManifestParse(format!(
            "found a <{element}> without a {key} attribute"
        ))),
    }
}
