use std::collections::HashMap;
use std::fs;
use verifydump::config::ToolBinary;
use verifydump::convert::{ConversionRequest, DumpConverter, Reconstruction};
use verifydump::hashing::{ChecksumKind, MultiHasher};
use verifydump::{Manifest, VerifyError, VerifyResult};

/// Builds Redump-style Datfile XML with real checksums.
pub struct DatBuilder {
    system: Option<String>,
    games: Vec<(String, Vec<(String, Vec<u8>)>)>,
}

impl DatBuilder {
    pub fn new(system: Option<&str>) -> Self {
        Self {
            system: system.map(str::to_string),
            games: Vec::new(),
        }
    }

    pub fn game(mut self, name: &str, files: &[(&str, &[u8])]) -> Self {
        let files = files
            .iter()
            .map(|(file, body)| (file.to_string(), body.to_vec()))
            .collect();
        self.games.push((name.to_string(), files));
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\"?>\n<datafile>\n");
        if let Some(system) = &self.system {
            xml.push_str(&format!("\t<header>\n\t\t<name>{system}</name>\n\t</header>\n"));
        }
        for (game, files) in &self.games {
            xml.push_str(&format!("\t<game name=\"{game}\">\n\t\t<category>Games</category>\n"));
            for (name, body) in files {
                let mut hasher = MultiHasher::new(ChecksumKind::ALL);
                hasher.update(body);
                let digests = hasher.finalize();
                xml.push_str(&format!(
                    "\t\t<rom name=\"{name}\" size=\"{}\" crc=\"{}\" md5=\"{}\" sha1=\"{}\"/>\n",
                    body.len(),
                    digests[&ChecksumKind::Crc32],
                    digests[&ChecksumKind::Md5],
                    digests[&ChecksumKind::Sha1],
                ));
            }
            xml.push_str("\t</game>\n");
        }
        xml.push_str("</datafile>\n");
        xml
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::load(self.to_xml().as_bytes()).expect("test Datfile should parse")
    }
}

/// What the fake converter does for one dump.
#[derive(Clone)]
pub enum Script {
    /// Writes these files into the output folder.
    Files(Vec<(String, Vec<u8>)>),
    /// Fails the way chdman does, with this text on stderr.
    Fail(String),
    /// Reports the SHA-1 of a single `.iso`.
    Digest(String),
    /// Runs `sh -c` through the real tool runner.
    Shell(String),
}

/// Stands in for chdman/binmerge/DolphinTool, keyed by dump file stem.
#[derive(Default)]
pub struct FakeConverter {
    scripts: HashMap<String, Script>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, dump_stem: &str, script: Script) -> Self {
        self.scripts.insert(dump_stem.to_string(), script);
        self
    }

    pub fn files(self, dump_stem: &str, files: &[(&str, &[u8])]) -> Self {
        let files = files
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_vec()))
            .collect();
        self.script(dump_stem, Script::Files(files))
    }
}

impl DumpConverter for FakeConverter {
    fn extensions(&self) -> &[&'static str] {
        &["chd", "rvz"]
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> VerifyResult<Reconstruction> {
        let name = request.dump_name();
        match self.scripts.get(&name) {
            Some(Script::Files(files)) => {
                for (file, body) in files {
                    let path = request.output_dir.join(file);
                    fs::write(&path, body).map_err(|err| VerifyError::Io {
                        context: "writing fake dump file",
                        path,
                        source: err,
                    })?;
                }
                Ok(Reconstruction::Files)
            }
            Some(Script::Fail(stderr)) => Err(VerifyError::ConversionToolFailure {
                message: "Failed to convert .chd using chdman".into(),
                tool_output: Some(stderr.clone()),
            }),
            Some(Script::Digest(hex)) => Ok(Reconstruction::Digest {
                file_name: format!("{name}.iso"),
                algorithm: ChecksumKind::Sha1,
                hex: hex.clone(),
            }),
            Some(Script::Shell(script)) => {
                let sh = ToolBinary {
                    command: "sh".into(),
                    args: vec!["-c".into(), script.clone()],
                };
                request
                    .runner
                    .run_checked(&sh, Vec::<String>::new(), "Failed to convert .chd using chdman")?;
                Ok(Reconstruction::Files)
            }
            None => Err(VerifyError::ConversionToolFailure {
                message: format!("no script for \"{name}\""),
                tool_output: None,
            }),
        }
    }
}

/// A cue sheet the way Redump writes it, CRLF line endings included.
pub fn redump_cue(lines: &[&str]) -> Vec<u8> {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text.into_bytes()
}
