use std::fs;
use std::path::Path;
use tppa_tally::{
    Aggregator, EngineOptions,
    error::{AggregateError, ScanErrorKind},
    scan::{FileCountRecord, MarkerSet, Markers, scan_file},
};

fn engine(workers: usize) -> Aggregator {
    Aggregator::new(&EngineOptions {
        max_workers: workers,
        markers: Markers::default(),
    })
    .unwrap()
}

fn write_log(dir: &Path, name: &str, received: usize, redirects: usize) {
    let mut body = String::new();
    for i in 0..received {
        let evt = if i % 2 == 0 { 1 } else { 5 };
        body.push_str(&format!("GET /p?tppa_pxl_rcvd&evt={evt}\n"));
    }
    for _ in 0..redirects {
        body.push_str("GET /r?tppa_redirect_pxl&evt=1\n");
    }
    body.push_str("GET /healthz\n");
    fs::write(dir.join(name), body).unwrap();
}

fn sorted_records(report: &tppa_tally::AggregateReport) -> Vec<FileCountRecord> {
    let mut v: Vec<_> = report.entries.iter().map(|e| e.record.clone()).collect();
    v.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    v
}

#[test]
fn collects_exactly_one_entry_per_file() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..40 {
        write_log(dir.path(), &format!("log-{i:02}"), i, i % 3);
    }

    for workers in [1, 4, 64] {
        let mut seen = Vec::new();
        let report = engine(workers)
            .aggregate_with(dir.path(), |e| seen.push(e.file_name().to_string()))
            .unwrap();

        assert_eq!(report.entries.len(), 40);
        assert_eq!(seen.len(), 40);
        assert_eq!(report.files_counted, 40);
        assert_eq!(report.files_failed, 0);

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 40);

        let expected_received: u64 = (0..40u64).sum();
        let expected_redirects: u64 = (0..40u64).map(|i| i % 3).sum();
        assert_eq!(report.totals.received_total, expected_received);
        assert_eq!(report.totals.redirect_total, expected_redirects);
        assert_eq!(
            report.totals.received_impression + report.totals.received_landing_page,
            expected_received
        );
    }
}

#[test]
fn rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_log(dir.path(), "a", 5, 2);
    write_log(dir.path(), "b", 0, 7);
    write_log(dir.path(), "c", 3, 0);

    let first = engine(3).aggregate(dir.path()).unwrap();
    let second = engine(2).aggregate(dir.path()).unwrap();

    assert_eq!(sorted_records(&first), sorted_records(&second));
    assert_eq!(first.totals, second.totals);
    assert_eq!(first.batch_id, second.batch_id);
}

#[test]
fn concurrent_scans_stay_isolated() {
    let dir = tempfile::tempdir().unwrap();
    write_log(dir.path(), "busy", 1000, 1000);
    fs::write(dir.path().join("quiet"), "nothing to see\n".repeat(1000)).unwrap();

    let report = engine(2).aggregate(dir.path()).unwrap();

    let quiet = report.get("quiet").unwrap();
    assert!(quiet.failure.is_none());
    assert!(quiet.record.counts.is_zero());

    let busy = report.get("busy").unwrap();
    assert_eq!(busy.record.counts.received_total, 1000);
    assert_eq!(busy.record.counts.redirect_total, 1000);
    assert_eq!(report.totals, busy.record.counts);
}

#[test]
fn unreadable_file_is_flagged_and_left_out_of_totals() {
    let dir = tempfile::tempdir().unwrap();
    write_log(dir.path(), "ok-1", 2, 1);
    write_log(dir.path(), "ok-2", 4, 3);
    // A directory entry opens but can't be read as a log.
    fs::create_dir(dir.path().join("broken")).unwrap();

    let report = engine(4).aggregate(dir.path()).unwrap();

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_counted, 2);

    let broken = report.get("broken").unwrap();
    assert!(broken.is_failed());
    assert!(broken.record.counts.is_zero());

    assert_eq!(report.totals.received_total, 6);
    assert_eq!(report.totals.redirect_total, 4);

    let failed: Vec<_> = report.failed().map(|e| e.file_name()).collect();
    assert_eq!(failed, vec!["broken"]);
    assert!(report.render_text().contains("file: broken\n [FAILED]"));
}

#[cfg(unix)]
#[test]
fn dangling_symlink_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("link")).unwrap();

    let report = engine(1).aggregate(dir.path()).unwrap();
    let entry = report.get("link").unwrap();
    assert_eq!(entry.failure.as_ref().unwrap().kind, ScanErrorKind::NotFound);
}

#[test]
fn empty_directory_gives_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let report = engine(0).aggregate(dir.path()).unwrap();
    assert!(report.entries.is_empty());
    assert!(report.totals.is_zero());
}

#[test]
fn missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine(1).aggregate(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, AggregateError::DirectoryUnreadable { .. }));
}

#[test]
fn json_report_marks_failures_only_on_failed_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_log(dir.path(), "good", 1, 0);
    fs::create_dir(dir.path().join("bad")).unwrap();

    let report = engine(2).aggregate(dir.path()).unwrap();
    let json = serde_json::to_value(&report).unwrap();
    let entries = json["entries"].as_array().unwrap();
    for entry in entries {
        let failed = entry.get("failure").is_some();
        assert_eq!(failed, entry["file_name"] == "bad");
        assert!(entry.get("received_total").is_some());
    }
    assert_eq!(json["totals"]["received_total"], 1);
}

#[test]
fn panicking_scan_still_yields_one_entry_per_file() {
    let dir = tempfile::tempdir().unwrap();
    write_log(dir.path(), "keep-1", 1, 0);
    write_log(dir.path(), "keep-2", 1, 0);
    write_log(dir.path(), "boom-1", 9, 9);
    write_log(dir.path(), "boom-2", 9, 9);

    for workers in [1, 4] {
        let mut seen = 0;
        let report = engine(workers)
            .aggregate_with_scanner(
                dir.path(),
                |path: &Path, markers: &MarkerSet| {
                    let name = path.file_name().unwrap().to_string_lossy();
                    if name.starts_with("boom") {
                        panic!("scanner blew up on {name}");
                    }
                    scan_file(path, markers)
                },
                |_| seen += 1,
            )
            .unwrap();

        assert_eq!(report.entries.len(), 4);
        assert_eq!(seen, 4);
        assert_eq!(report.files_failed, 2);
        assert_eq!(report.files_counted, 2);
        assert_eq!(report.totals.received_total, 2);
        for name in ["boom-1", "boom-2"] {
            let entry = report.get(name).unwrap();
            assert_eq!(entry.failure.as_ref().unwrap().kind, ScanErrorKind::Io);
            assert!(entry.record.counts.is_zero());
        }
    }
}

#[cfg(target_os = "linux")]
#[test]
fn lossy_name_collisions_get_distinct_slots() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    for raw in [&b"log\xff"[..], &b"log\xfe"[..]] {
        let path = dir.path().join(OsStr::from_bytes(raw));
        fs::write(path, "tppa_pxl_rcvd evt=1\n").unwrap();
    }

    let report = engine(2).aggregate(dir.path()).unwrap();
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.files_counted, 2);
    assert_eq!(report.totals.received_total, 2);

    let mut names: Vec<_> = report.entries.iter().map(|e| e.file_name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["log\u{FFFD}".to_string(), "log\u{FFFD}#2".to_string()]);
}
