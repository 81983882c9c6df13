use super::scenarios::{gamma_dat, gamma_files, generated_cue, AUTHORITATIVE_CUE};
use super::support::redump_cue;
use super::IntegrationHarness;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use verifydump::verify::{CueStatus, PipelineOptions, Verdict};
use verifydump::VerdictStatus;
use zip::write::FileOptions;

fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, body) in members {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

fn verify_gamma(harness: &IntegrationHarness, cue: &[u8], options: PipelineOptions) -> Verdict {
    let dump = harness.dump("Gamma.chd");
    let mut verdicts = harness.verify(&gamma_dat().manifest(), gamma_files(cue), options, &[dump]);
    verdicts.remove(0)
}

fn with_source(source: &Path) -> PipelineOptions {
    PipelineOptions {
        extra_cue_source: Some(source.to_path_buf()),
        ..Default::default()
    }
}

#[test]
fn exact_cue_needs_no_extra_source() {
    let harness = IntegrationHarness::new();
    let verdict = verify_gamma(
        &harness,
        &redump_cue(AUTHORITATIVE_CUE),
        PipelineOptions::default(),
    );
    assert_eq!(verdict.status, VerdictStatus::Verified);
    assert_eq!(verdict.cue, Some(CueStatus::ExactMatch));
}

#[test]
fn mismatch_without_source_points_at_both_options() {
    let harness = IntegrationHarness::new();
    let verdict = verify_gamma(&harness, &generated_cue(), PipelineOptions::default());
    assert_eq!(verdict.status, VerdictStatus::Failed);
    let text = verdict.detail.join("\n");
    assert!(text.contains("--extra-cue-source"), "{text}");
    assert!(text.contains("--allow-cue-file-mismatches"), "{text}");
}

#[test]
fn allow_flag_downgrades_missing_source_to_caveat() {
    let harness = IntegrationHarness::new();
    let verdict = verify_gamma(
        &harness,
        &generated_cue(),
        PipelineOptions {
            allow_cue_file_mismatches: true,
            ..Default::default()
        },
    );
    assert_eq!(verdict.status, VerdictStatus::Caveat);
    assert_eq!(verdict.cue, Some(CueStatus::NoExtraCue));
}

#[test]
fn single_cue_file_is_used_as_source() {
    let harness = IntegrationHarness::new();
    let source = harness.workspace_path().join("original.cue");
    fs::write(&source, redump_cue(AUTHORITATIVE_CUE)).unwrap();

    let verdict = verify_gamma(&harness, &generated_cue(), with_source(&source));
    assert_eq!(verdict.status, VerdictStatus::Caveat);
    assert_eq!(verdict.cue, Some(CueStatus::EssentialsMatch));
}

#[test]
fn zip_of_cues_is_searched_by_name() {
    let harness = IntegrationHarness::new();
    let source = harness.workspace_path().join("cuesheets.zip");
    let authoritative = redump_cue(AUTHORITATIVE_CUE);
    write_zip(
        &source,
        &[("Other.cue", b"REM nothing\r\n"), ("Gamma.cue", &authoritative)],
    );

    let verdict = verify_gamma(&harness, &generated_cue(), with_source(&source));
    assert_eq!(verdict.status, VerdictStatus::Caveat, "{:?}", verdict.detail);
}

#[test]
fn zip_without_this_cue_counts_as_no_source() {
    let harness = IntegrationHarness::new();
    let source = harness.workspace_path().join("cuesheets.zip");
    write_zip(&source, &[("Other.cue", b"REM nothing\r\n")]);

    let verdict = verify_gamma(&harness, &generated_cue(), with_source(&source));
    assert_eq!(verdict.status, VerdictStatus::Failed);
    assert_eq!(verdict.stage, verifydump::verify::Stage::CueCheck);
    assert!(verdict.detail.join("\n").contains("--extra-cue-source"));
}

#[test]
fn source_not_matching_datfile_is_a_configuration_error() {
    let harness = IntegrationHarness::new();
    let folder = harness.workspace_path().join("cues");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("Gamma.cue"), generated_cue()).unwrap();

    let verdict = verify_gamma(&harness, &generated_cue(), with_source(&folder));
    assert_eq!(verdict.status, VerdictStatus::Failed);
    assert!(
        verdict.detail[0].starts_with("ConfigurationError: "),
        "{:?}",
        verdict.detail
    );
}

#[test]
fn allow_flag_downgrades_structural_mismatch() {
    let harness = IntegrationHarness::new();
    let source = harness.workspace_path().join("Gamma.cue");
    fs::write(&source, redump_cue(AUTHORITATIVE_CUE)).unwrap();
    let wrong_type = redump_cue(&[
        "FILE \"Gamma (Track 1).bin\" BINARY",
        "  TRACK 01 MODE1/2352",
        "    INDEX 01 00:00:00",
        "FILE \"Gamma (Track 2).bin\" BINARY",
        "  TRACK 02 AUDIO",
        "    INDEX 00 00:00:00",
        "    INDEX 01 00:02:00",
    ]);

    let verdict = verify_gamma(
        &harness,
        &wrong_type,
        PipelineOptions {
            allow_cue_file_mismatches: true,
            extra_cue_source: Some(source),
        },
    );
    assert_eq!(verdict.status, VerdictStatus::Caveat);
    assert_eq!(verdict.cue, Some(CueStatus::Mismatch));
    assert!(verdict
        .detail
        .iter()
        .any(|d| d.contains("files[0].tracks[0].type")));
}
