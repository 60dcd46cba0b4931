mod common;

use common::{
    app_map, bundle_hash, bundle_source, entity, line_per_line_map, script, submission,
    BUNDLE_URL,
};
use probecov::error::ProbecovError;
use probecov::ingest;
use probecov::processor::{ProcessorConfig, SkipReason};

fn register_bundle(conn: &mut rusqlite::Connection, agent: &str, source: &str) {
    ingest::register(
        conn,
        agent,
        &[("main.js.map".to_string(), line_per_line_map(5))],
        &[bundle_hash(source)],
    )
    .unwrap();
}

/// Line 3 sits in a block that never ran; lines 2 and 4 did.
#[test]
fn uncovered_block_marks_its_probe_false() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let sub = submission(
        vec![script(
            BUNDLE_URL,
            &[&[(0, 55, 1)], &[(0, 55, 1), (22, 33, 0)]],
        )],
        &source,
        "cart › adds item",
    );
    let ast = vec![entity("src/app.js", &[("fn", &[2, 3, 4])])];

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    assert_eq!(out.classes.len(), 1);
    assert_eq!(out.classes[0].class_name, "src/app.js");
    assert_eq!(out.classes[0].probes, vec![true, false, true]);
    assert_eq!(out.classes[0].test_name, "cart › adds item");
}

/// Line 2 holds an indented statement that never ran. Only its
/// indentation and trailing newline belong to covered ranges.
#[test]
fn never_run_indented_line_is_not_covered() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = "aaaaaaaaa\n  bbbbbbb\n";
    ingest::register(
        &mut conn,
        "agent",
        &[("main.js.map".to_string(), app_map(&[(1, 0, 1, 0), (2, 2, 2, 2)]))],
        &[bundle_hash(source)],
    )
    .unwrap();

    let sub = submission(
        vec![script(BUNDLE_URL, &[&[(0, 20, 1)], &[(12, 19, 0)]])],
        source,
        "t",
    );
    let ast = vec![entity("src/app.js", &[("fn", &[1, 2])])];

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    assert_eq!(out.classes[0].probes, vec![true, false]);
}

/// `  bb; cccc;` where only `cccc;` never ran: the line still executed.
#[test]
fn untaken_code_after_executed_code_leaves_line_covered() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = "aaaaaaaaa\n  bb; cccc;\n";
    ingest::register(
        &mut conn,
        "agent",
        &[(
            "main.js.map".to_string(),
            app_map(&[(1, 0, 1, 0), (2, 2, 2, 2), (2, 6, 2, 6)]),
        )],
        &[bundle_hash(source)],
    )
    .unwrap();

    let sub = submission(
        vec![script(BUNDLE_URL, &[&[(0, 22, 1)], &[(16, 20, 0)]])],
        source,
        "t",
    );
    let ast = vec![entity("src/app.js", &[("fn", &[1, 2])])];

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    assert_eq!(out.classes[0].probes, vec![true, true]);
}

#[test]
fn coverage_before_registration_fails() {
    let (conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    let sub = submission(vec![script(BUNDLE_URL, &[&[(0, 55, 1)]])], &source, "t");
    let ast = vec![entity("src/app.js", &[("fn", &[1])])];

    let err = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap_err();
    assert!(matches!(err, ProbecovError::NoBundleMetadata { agent_id } if agent_id == "agent"));
}

#[test]
fn isolates_are_combined_with_or() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let sub = submission(
        vec![
            // Isolate A ran everything.
            script(BUNDLE_URL, &[&[(0, 55, 1)]]),
            // Isolate B never reached line 5.
            script(
                "http://localhost:8080/static/main.js?worker=1",
                &[&[(0, 55, 1), (44, 55, 0)]],
            ),
        ],
        &source,
        "t",
    );
    let ast = vec![entity("src/app.js", &[("a", &[4]), ("b", &[5])])];

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    assert_eq!(out.classes[0].probes, vec![true, true]);
}

#[test]
fn same_class_with_different_probe_counts_is_rejected() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let sub = submission(vec![script(BUNDLE_URL, &[&[(0, 55, 1)]])], &source, "t");
    // Two AST versions of the same file disagree on the probe layout.
    let ast = vec![
        entity("src/app.js", &[("fn", &[1, 2])]),
        entity("./src/app.js", &[("fn", &[1, 2, 3])]),
    ];

    let err = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        ProbecovError::ProbeVectorLengthMismatch {
            expected: 2,
            actual: 3,
            ..
        }
    ));
}

#[test]
fn changed_bundle_is_rejected_or_skipped() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let mut changed = source.clone();
    changed.replace_range(0..1, "L");
    let sub = submission(vec![script(BUNDLE_URL, &[&[(0, 55, 1)]])], &changed, "t");
    let ast = vec![entity("src/app.js", &[("fn", &[1])])];

    let err = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap_err();
    assert!(matches!(err, ProbecovError::BundleMismatch { .. }));

    let lenient = ProcessorConfig::default().with_strict_bundle_check(false);
    let out = ingest::convert(&conn, "agent", &sub, &ast, &lenient).unwrap();
    assert!(out.classes.is_empty());
    assert_eq!(out.skipped[0].reason, SkipReason::BundleMismatch);
}

#[test]
fn crlf_bundle_matches_lf_hash() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    // Same text served with CRLF line endings: still the registered bundle.
    let crlf = source.replace('\n', "\r\n");
    let sub = submission(vec![script(BUNDLE_URL, &[&[(0, 60, 1)]])], &crlf, "t");
    let ast = vec![entity("src/app.js", &[("fn", &[1])])];

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    assert!(out.skipped.is_empty());
    assert_eq!(out.classes[0].probes, vec![true]);
}

#[test]
fn vendor_scripts_are_filtered() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let sub = submission(
        vec![
            script("http://localhost:8080/node_modules/react/index.js", &[&[(0, 55, 0)]]),
            script("", &[&[(0, 55, 0)]]),
            script(BUNDLE_URL, &[&[(0, 55, 1)]]),
        ],
        &source,
        "t",
    );
    let ast = vec![entity("src/app.js", &[("fn", &[1, 5])])];

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    let reasons: Vec<SkipReason> = out.skipped.iter().map(|s| s.reason).collect();
    assert_eq!(reasons, vec![SkipReason::UnknownScript, SkipReason::EmptyUrl]);
    assert_eq!(out.classes[0].probes, vec![true, true]);
}

#[test]
fn strip_prefix_aligns_monorepo_paths() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let sub = submission(vec![script(BUNDLE_URL, &[&[(0, 55, 0)]])], &source, "t");
    let mut ast = vec![entity("packages/web/src/app.js", &[("fn", &[1])])];
    ast[0].suffix = Some("App".to_string());

    let config = ProcessorConfig::default().with_strip_prefix("packages/web/");
    let out = ingest::convert(&conn, "agent", &sub, &ast, &config).unwrap();
    assert_eq!(out.classes[0].class_name, "src/app.js.App");
    assert_eq!(out.classes[0].probes, vec![false]);
}

#[test]
fn results_follow_ast_order() {
    let (mut conn, _dir, _) = common::setup_db();
    let source = bundle_source(5);
    register_bundle(&mut conn, "agent", &source);

    let sub = submission(vec![script(BUNDLE_URL, &[&[(0, 55, 1)]])], &source, "t");
    let mut ast = Vec::new();
    for suffix in ["Zeta", "Alpha", "Mid"] {
        let mut e = entity("src/app.js", &[("fn", &[1])]);
        e.suffix = Some(suffix.to_string());
        ast.push(e);
    }

    let out = ingest::convert(&conn, "agent", &sub, &ast, &ProcessorConfig::default()).unwrap();
    let names: Vec<&str> = out.classes.iter().map(|c| c.class_name.as_str()).collect();
    assert_eq!(names, vec!["src/app.js.Zeta", "src/app.js.Alpha", "src/app.js.Mid"]);
}
