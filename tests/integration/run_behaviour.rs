use super::support::{DatBuilder, FakeConverter, Script};
use super::IntegrationHarness;
use std::fs::{self, File};
use std::io::Write;
use verifydump::cache::VerificationCache;
use verifydump::config::ToolSettings;
use verifydump::convert::ConverterSet;
use verifydump::hashing::sha1_hex;
use verifydump::verify::{collect_dumps, PipelineOptions};
use verifydump::{load_manifest, VerdictStatus};
use zip::write::FileOptions;

fn three_games() -> DatBuilder {
    DatBuilder::new(None)
        .game("Charlie", &[("Charlie.iso", b"charlie")])
        .game("Alpha", &[("Alpha.iso", b"alpha")])
        .game("Bravo", &[("Bravo.iso", b"bravo")])
}

fn three_converters() -> FakeConverter {
    FakeConverter::new()
        .files("Alpha", &[("Alpha.iso", b"alpha")])
        .files("Bravo", &[("Bravo.iso", b"bravo")])
        .files("Charlie", &[("Charlie.iso", b"charlie")])
        .files("Stranger", &[("Stranger.iso", b"not in the datfile")])
}

#[test]
fn verdicts_follow_datfile_order() {
    let harness = IntegrationHarness::new();
    let manifest = three_games().manifest();
    let dumps = vec![
        harness.dump("Stranger.chd"),
        harness.dump("Alpha.chd"),
        harness.dump("Bravo.chd"),
        harness.dump("Charlie.chd"),
    ];

    let verdicts = harness.verify(
        &manifest,
        three_converters(),
        PipelineOptions::default(),
        &dumps,
    );

    let order: Vec<String> = verdicts.iter().map(|v| v.label()).collect();
    assert_eq!(order[..3], ["Charlie", "Alpha", "Bravo"]);
    assert_eq!(verdicts[3].status, VerdictStatus::Failed);
    assert!(verdicts[3].detail[0].starts_with("UnknownDump: "));
}

#[test]
fn repeated_runs_give_identical_verdicts() {
    let harness = IntegrationHarness::new();
    let manifest = three_games().manifest();
    let dumps = vec![harness.dump("Bravo.chd"), harness.dump("Stranger.chd")];

    let first = harness.verify(&manifest, three_converters(), PipelineOptions::default(), &dumps);
    let second = harness.verify(&manifest, three_converters(), PipelineOptions::default(), &dumps);
    assert_eq!(first, second);
    assert_eq!(harness.leftover_work_dirs(), 0);
}

#[test]
fn unchanged_dump_is_answered_from_cache() {
    let harness = IntegrationHarness::new();
    let manifest = three_games().manifest();
    let dump = harness.dump("Alpha.chd");
    let mut cache = VerificationCache::default();

    let fresh = harness.verify(
        &manifest,
        three_converters(),
        PipelineOptions::default(),
        &[dump.clone()],
    );
    assert_eq!(cache.remember(&fresh, &manifest), 1);

    // No script for Alpha: a cache miss would fail the conversion.
    let cached = harness.verify_with_cache(
        &manifest,
        FakeConverter::new(),
        PipelineOptions::default(),
        &[dump.clone()],
        Some(&cache),
    );
    assert_eq!(cached[0].status, VerdictStatus::Verified);
    assert!(cached[0].from_cache);

    fs::write(&dump, b"re-compressed with different settings").unwrap();
    let changed = harness.verify_with_cache(
        &manifest,
        FakeConverter::new(),
        PipelineOptions::default(),
        &[dump],
        Some(&cache),
    );
    assert_eq!(changed[0].status, VerdictStatus::Failed);
    assert!(!changed[0].from_cache);
}

#[test]
fn dump_replaced_during_run_is_not_cached_as_verified() {
    let harness = IntegrationHarness::new();
    let manifest = three_games().manifest();
    let dump = harness.dump("Alpha.chd");

    let fresh = harness.verify(
        &manifest,
        three_converters(),
        PipelineOptions::default(),
        &[dump.clone()],
    );
    assert_eq!(fresh[0].status, VerdictStatus::Verified);

    // Replaced after verifying but before the run saved its results.
    fs::write(&dump, b"a different, never verified dump").unwrap();
    let mut cache = VerificationCache::default();
    cache.remember(&fresh, &manifest);

    let next = harness.verify_with_cache(
        &manifest,
        FakeConverter::new(),
        PipelineOptions::default(),
        &[dump],
        Some(&cache),
    );
    assert!(!next[0].from_cache);
    assert_eq!(next[0].status, VerdictStatus::Failed);
}

#[test]
fn rvz_digest_is_matched_by_name_and_sha1() {
    let harness = IntegrationHarness::new();
    let iso = b"gamecube disc image".to_vec();
    let manifest = DatBuilder::new(Some("Nintendo - GameCube"))
        .game("Metroid Prime (USA)", &[("Metroid Prime (USA).iso", &iso)])
        .manifest();
    let good = harness.dump("Metroid Prime (USA).rvz");
    let renamed = harness.dump("metroid.rvz");

    let verdicts = harness.verify(
        &manifest,
        FakeConverter::new()
            .script("Metroid Prime (USA)", Script::Digest(sha1_hex(&iso)))
            .script("metroid", Script::Digest(sha1_hex(&iso))),
        PipelineOptions::default(),
        &[good, renamed],
    );

    assert_eq!(verdicts[0].status, VerdictStatus::Verified);
    assert_eq!(verdicts[0].game_name.as_deref(), Some("Metroid Prime (USA)"));
    assert_eq!(verdicts[1].status, VerdictStatus::Failed);
    assert!(
        verdicts[1].detail[0].contains("should be named \"Metroid Prime (USA).rvz\""),
        "{:?}",
        verdicts[1].detail
    );
}

#[test]
fn folders_are_searched_and_unsupported_files_rejected() {
    let harness = IntegrationHarness::new();
    harness.dump("Alpha.chd");
    harness.dump("notes.txt");
    let nested = harness.workspace_path().join("dumps/more");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("Bravo.rvz"), b"").unwrap();
    let explicit = harness.dump("Charlie.cso");

    let converters = ConverterSet::standard(&ToolSettings::default());
    let found = collect_dumps(
        &[harness.workspace_path().join("dumps"), explicit.clone()],
        &converters,
    );

    assert_eq!(
        found.dumps,
        vec![
            harness.workspace_path().join("dumps/Alpha.chd"),
            nested.join("Bravo.rvz"),
        ]
    );
    assert_eq!(found.rejected.len(), 1);
    assert_eq!(found.rejected[0].0, explicit);
    assert_eq!(found.rejected[0].1.kind(), "UnsupportedFormat");
}

#[test]
fn zipped_datfile_loads_like_plain_one() {
    let harness = IntegrationHarness::new();
    let xml = three_games().to_xml();
    let path = harness.workspace_path().join("Redump.zip");
    let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("Redump (2024-01-01).dat", FileOptions::default()).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap();

    let manifest = load_manifest(&path).unwrap();
    assert_eq!(manifest.game_count(), 3);
    let alpha = manifest.lookup("Alpha").unwrap();
    assert_eq!(alpha.files[0].name, "Alpha.iso");
    assert_eq!(alpha.files[0].size, 5);
}
