use std::fs;
use tppa_tally::{
    error::ScanErrorKind,
    scan::{Counts, MarkerSet, Markers, scan_file, scan_reader},
};

fn default_set() -> MarkerSet {
    MarkerSet::new(&Markers::default())
}

#[test]
fn empty_file_has_zero_counters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty");
    fs::write(&path, "").unwrap();

    let record = scan_file(&path, &default_set()).unwrap();
    assert_eq!(record.file_name, "empty");
    assert!(record.counts.is_zero());
}

#[test]
fn mixed_lines_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host-a");
    fs::write(
        &path,
        "GET /p?tppa_pxl_rcvd&evt=1 200\n\
         GET /p?tppa_pxl_rcvd&evt=5 200\n\
         GET /r?tppa_redirect_pxl&evt=1 302\n\
         GET /favicon.ico 404\n",
    )
    .unwrap();

    let record = scan_file(&path, &default_set()).unwrap();
    assert_eq!(
        record.counts,
        Counts {
            received_total: 2,
            received_impression: 1,
            received_landing_page: 1,
            redirect_total: 1,
            redirect_impression: 1,
            redirect_landing_page: 0,
        }
    );
}

#[test]
fn unterminated_last_line_and_crlf_are_counted() {
    let input = "tppa_pxl_rcvd evt=5\r\nnoise\r\ntppa_redirect_pxl evt=5";
    let c = scan_reader("x", input.as_bytes(), &default_set()).unwrap().counts;
    assert_eq!(c.received_total, 1);
    assert_eq!(c.received_landing_page, 1);
    assert_eq!(c.redirect_total, 1);
    assert_eq!(c.redirect_landing_page, 1);
}

#[test]
fn marker_without_sub_type_counts_total_only() {
    let c = scan_reader("x", "tppa_pxl_rcvd evt=3\n".as_bytes(), &default_set())
        .unwrap()
        .counts;
    assert_eq!(c.received_total, 1);
    assert_eq!(c.received_impression + c.received_landing_page, 0);
}

#[test]
fn sub_types_never_exceed_total() {
    let lines = [
        "tppa_pxl_rcvd evt=1",
        "tppa_pxl_rcvd evt=1 evt=5",
        "evt=1 evt=5",
        "tppa_redirect_pxl",
        "tppa_redirect_pxl evt=5 tppa_pxl_rcvd",
        "",
        "TPPA_PXL_RCVD evt=1",
    ];
    let c = scan_reader("x", lines.join("\n").as_bytes(), &default_set())
        .unwrap()
        .counts;
    assert!(c.received_impression + c.received_landing_page <= c.received_total);
    assert!(c.redirect_impression + c.redirect_landing_page <= c.redirect_total);
    // matching is case-sensitive
    assert_eq!(c.received_total, 3);
    assert_eq!(c.redirect_total, 2);
}

#[test]
fn non_utf8_bytes_do_not_fail_the_scan() {
    let mut input = b"\xff\xfe tppa_pxl_rcvd evt=1\n".to_vec();
    input.extend_from_slice(b"\xc3\x28\n");
    let c = scan_reader("x", input.as_slice(), &default_set())
        .unwrap()
        .counts;
    assert_eq!(c.received_impression, 1);
}

#[test]
fn markers_are_injectable() {
    let markers = Markers {
        received: "seen".into(),
        redirect: "bounce".into(),
        impression: "imp".into(),
        landing_page: "lp".into(),
    };
    let set = MarkerSet::new(&markers);
    let c = scan_reader("x", "seen imp\nbounce lp\ntppa_pxl_rcvd evt=1\n".as_bytes(), &set)
        .unwrap()
        .counts;
    assert_eq!(c.received_total, 1);
    assert_eq!(c.received_impression, 1);
    assert_eq!(c.redirect_landing_page, 1);
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = scan_file(&dir.path().join("nope"), &default_set()).unwrap_err();
    assert_eq!(err.kind, ScanErrorKind::NotFound);
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_permission_denied() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked");
    fs::write(&path, "tppa_pxl_rcvd\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

    // root ignores mode bits
    if fs::File::open(&path).is_ok() {
        return;
    }

    let err = scan_file(&path, &default_set()).unwrap_err();
    assert_eq!(err.kind, ScanErrorKind::PermissionDenied);

    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
}
