use super::support::{redump_cue, DatBuilder, FakeConverter, Script};
use super::IntegrationHarness;
use verifydump::verify::{PipelineOptions, Stage};
use verifydump::VerdictStatus;

pub(crate) const AUTHORITATIVE_CUE: &[&str] = &[
    "PERFORMER \"Gamma Band\"",
    "FILE \"Gamma (Track 1).bin\" BINARY",
    "  TRACK 01 MODE2/2352",
    "    INDEX 01 00:00:00",
    "FILE \"Gamma (Track 2).bin\" BINARY",
    "  TRACK 02 AUDIO",
    "    INDEX 00 00:00:00",
    "    INDEX 01 00:02:00",
];

pub(crate) const TRACK_1: &[u8] = b"data track sectors";
pub(crate) const TRACK_2: &[u8] = b"audio track samples";

pub(crate) fn gamma_dat() -> DatBuilder {
    DatBuilder::new(Some("Sony - PlayStation")).game(
        "Gamma",
        &[
            ("Gamma (Track 1).bin", TRACK_1),
            ("Gamma (Track 2).bin", TRACK_2),
            ("Gamma.cue", &redump_cue(AUTHORITATIVE_CUE)),
        ],
    )
}

/// chdman drops CD-TEXT, so the generated cue lacks the PERFORMER line.
pub(crate) fn generated_cue() -> Vec<u8> {
    redump_cue(&AUTHORITATIVE_CUE[1..])
}

pub(crate) fn gamma_files(cue: &[u8]) -> FakeConverter {
    FakeConverter::new().files(
        "Gamma",
        &[
            ("Gamma (Track 1).bin", TRACK_1),
            ("Gamma (Track 2).bin", TRACK_2),
            ("Gamma.cue", cue),
        ],
    )
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn exact_payload_is_verified() {
    let harness = IntegrationHarness::new();
    let body = payload(100);
    let manifest = DatBuilder::new(None).game("Game", &[("game.bin", &body)]).manifest();
    let dump = harness.dump("Game.chd");

    let verdicts = harness.verify(
        &manifest,
        FakeConverter::new().files("Game", &[("game.bin", &body)]),
        PipelineOptions::default(),
        &[dump],
    );

    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].status, VerdictStatus::Verified);
    assert_eq!(verdicts[0].stage, Stage::Hashing);
    assert_eq!(verdicts[0].game_name.as_deref(), Some("Game"));
    assert_eq!(harness.leftover_work_dirs(), 0);
}

#[test]
fn one_extra_byte_is_a_size_mismatch() {
    let harness = IntegrationHarness::new();
    let manifest = DatBuilder::new(None).game("Game", &[("game.bin", &payload(100))]).manifest();
    let dump = harness.dump("Game.chd");

    let verdicts = harness.verify(
        &manifest,
        FakeConverter::new().files("Game", &[("game.bin", &payload(101))]),
        PipelineOptions::default(),
        &[dump],
    );

    assert_eq!(verdicts[0].status, VerdictStatus::Failed);
    assert_eq!(verdicts[0].stage, Stage::Hashing);
    assert!(
        verdicts[0].detail[0].starts_with("SizeMismatch: "),
        "{:?}",
        verdicts[0].detail
    );
}

#[test]
fn same_size_different_content_names_the_algorithm() {
    let harness = IntegrationHarness::new();
    let manifest = DatBuilder::new(None).game("Game", &[("game.bin", &payload(100))]).manifest();
    let mut corrupted = payload(100);
    corrupted[40] ^= 0xff;
    let dump = harness.dump("Game.chd");

    let verdicts = harness.verify(
        &manifest,
        FakeConverter::new().files("Game", &[("game.bin", &corrupted)]),
        PipelineOptions::default(),
        &[dump],
    );

    let detail = &verdicts[0].detail[0];
    assert!(detail.starts_with("ChecksumMismatch: "), "{detail}");
    assert!(detail.contains("CRC32"), "{detail}");
}

#[test]
fn absent_track_is_a_missing_file() {
    let harness = IntegrationHarness::new();
    let dump = harness.dump("Gamma.chd");

    let verdicts = harness.verify(
        &gamma_dat().manifest(),
        FakeConverter::new().files(
            "Gamma",
            &[
                ("Gamma (Track 1).bin", TRACK_1),
                ("Gamma.cue", &redump_cue(AUTHORITATIVE_CUE)),
            ],
        ),
        PipelineOptions::default(),
        &[dump],
    );

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Failed);
    assert_eq!(verdict.stage, Stage::Hashing);
    assert_eq!(verdict.game_name.as_deref(), Some("Gamma"));
    assert!(
        verdict.detail[0].starts_with("MissingFile: "),
        "{:?}",
        verdict.detail
    );
    assert!(verdict.detail[0].contains("Gamma (Track 2).bin"));
}

#[test]
fn hashing_stops_at_first_bad_track() {
    let harness = IntegrationHarness::new();
    let mut corrupt = TRACK_1.to_vec();
    corrupt[0] ^= 0x55;
    let dump = harness.dump("Gamma.chd");

    let verdicts = harness.verify(
        &gamma_dat().manifest(),
        FakeConverter::new().files(
            "Gamma",
            &[
                ("Gamma (Track 1).bin", &corrupt),
                ("Gamma (Track 2).bin", b"also wrong, and a different size"),
                ("Gamma.cue", &redump_cue(AUTHORITATIVE_CUE)),
            ],
        ),
        PipelineOptions::default(),
        &[dump],
    );

    let detail = &verdicts[0].detail;
    assert_eq!(detail.len(), 1, "{detail:?}");
    assert!(detail[0].starts_with("ChecksumMismatch: "), "{detail:?}");
    assert!(detail[0].contains("Gamma (Track 1).bin"), "{detail:?}");
}

#[test]
fn missing_cd_text_is_a_caveat_with_extra_cue() {
    let harness = IntegrationHarness::new();
    let manifest = gamma_dat().manifest();
    let extra = harness.workspace_path().join("cues");
    std::fs::create_dir_all(&extra).unwrap();
    std::fs::write(extra.join("Gamma.cue"), redump_cue(AUTHORITATIVE_CUE)).unwrap();
    let dump = harness.dump("Gamma.chd");

    let verdicts = harness.verify(
        &manifest,
        gamma_files(&generated_cue()),
        PipelineOptions {
            extra_cue_source: Some(extra),
            ..Default::default()
        },
        &[dump],
    );

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Caveat, "{:?}", verdict.detail);
    assert_eq!(verdict.stage, Stage::CueCheck);
    assert!(verdict.detail.iter().any(|d| d.contains("preamble.performer")));
}

#[test]
fn swapped_tracks_fail_structurally() {
    let harness = IntegrationHarness::new();
    let manifest = gamma_dat().manifest();
    let extra = harness.workspace_path().join("Gamma.cue");
    std::fs::write(&extra, redump_cue(AUTHORITATIVE_CUE)).unwrap();
    let swapped = redump_cue(&[
        "FILE \"Gamma (Track 2).bin\" BINARY",
        "  TRACK 02 AUDIO",
        "    INDEX 00 00:00:00",
        "    INDEX 01 00:02:00",
        "FILE \"Gamma (Track 1).bin\" BINARY",
        "  TRACK 01 MODE2/2352",
        "    INDEX 01 00:00:00",
    ]);
    let dump = harness.dump("Gamma.chd");

    let verdicts = harness.verify(
        &manifest,
        gamma_files(&swapped),
        PipelineOptions {
            extra_cue_source: Some(extra),
            ..Default::default()
        },
        &[dump],
    );

    let verdict = &verdicts[0];
    assert_eq!(verdict.status, VerdictStatus::Failed);
    let finding = verdict
        .detail
        .iter()
        .find(|d| d.starts_with("StructuralCueMismatch: "))
        .expect("structural finding");
    assert!(finding.contains("files[0].tracks[0].number"), "{finding}");
}

#[test]
fn tool_failure_fails_only_that_dump() {
    let harness = IntegrationHarness::new();
    let body = payload(64);
    let manifest = DatBuilder::new(None)
        .game("Broken", &[("Broken.iso", &body)])
        .game("Fine", &[("Fine.iso", &body[..32])])
        .manifest();
    let dumps = vec![harness.dump("Broken.chd"), harness.dump("Fine.chd")];

    let verdicts = harness.verify(
        &manifest,
        FakeConverter::new()
            .script("Broken", Script::Fail("Error: file is not a valid CHD\n".into()))
            .files("Fine", &[("Fine.iso", &body[..32])]),
        PipelineOptions::default(),
        &dumps,
    );

    assert_eq!(verdicts.len(), 2);
    let fine = verdicts.iter().find(|v| v.game_name.as_deref() == Some("Fine")).unwrap();
    assert_eq!(fine.status, VerdictStatus::Verified);
    let broken = verdicts.iter().find(|v| v.dump_path == dumps[0]).unwrap();
    assert_eq!(broken.status, VerdictStatus::Failed);
    assert_eq!(broken.stage, Stage::Converting);
    assert!(broken.detail[0].starts_with("ConversionToolFailure: "));
    assert!(broken.detail[0].contains("Error: file is not a valid CHD"));
    assert_eq!(harness.leftover_work_dirs(), 0);
}

#[cfg(unix)]
#[test]
fn real_process_stderr_is_captured() {
    let harness = IntegrationHarness::new();
    let manifest = DatBuilder::new(None).game("Game", &[("Game.iso", b"x")]).manifest();
    let dump = harness.dump("Game.chd");

    let verdicts = harness.verify(
        &manifest,
        FakeConverter::new().script(
            "Game",
            Script::Shell("echo 'chdman: corrupt hunk map' >&2; exit 1".into()),
        ),
        PipelineOptions::default(),
        &[dump],
    );

    assert_eq!(verdicts[0].status, VerdictStatus::Failed);
    assert!(verdicts[0].detail[0].contains("chdman: corrupt hunk map"));
}
