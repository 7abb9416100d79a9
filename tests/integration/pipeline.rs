//! End-to-end runs of the refresh pipeline against a local download server.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use geoip_refresh::refresh::{JobRequest, RefreshSettings, Refresher, Stage};
use geoip_refresh::test_utils::{ArchiveBuilder, gzip};
use sha2::{Digest, Sha256};

use crate::common::{ArchiveServer, Behavior, TestDir, VALID_KEY, test_settings, truncating_server};

const COUNTRY: &str = "GeoLite2-Country";
const CITY: &str = "GeoLite2-City";
const ASN: &str = "GeoLite2-ASN";

fn archive(edition: &str, payload: &[u8]) -> Vec<u8> {
    ArchiveBuilder::publisher_layout(edition, "20240102", payload).build_tar_gz()
}

fn request(dir: &TestDir, edition: &str) -> JobRequest {
    JobRequest::new(edition, dir.dest(edition), VALID_KEY)
}

fn refresher(settings: RefreshSettings) -> Refresher {
    Refresher::new(settings).unwrap()
}

#[tokio::test]
async fn test_successful_refresh_installs_payload_and_leaves_no_temporaries() {
    let server =
        ArchiveServer::start(vec![(COUNTRY, Behavior::Archive(archive(COUNTRY, b"country-v2")))])
            .await;
    let dir = TestDir::new();

    let report = refresher(test_settings(&server.url_template())).run(vec![request(&dir, COUNTRY)]).await;

    assert!(report.succeeded(), "{:?}", report.outcomes);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"country-v2");
    assert_eq!(dir.entries(), vec![format!("{COUNTRY}.mmdb")]);

    let installed = report.outcomes[0].installed.as_ref().unwrap();
    assert_eq!(installed.bytes, 10);
    assert_eq!(installed.sha256, hex::encode(Sha256::digest(b"country-v2")));
}

#[tokio::test]
async fn test_existing_database_is_replaced() {
    let server =
        ArchiveServer::start(vec![(CITY, Behavior::Archive(archive(CITY, b"city-new")))]).await;
    let dir = TestDir::new();
    std::fs::write(dir.dest(CITY), b"city-old").unwrap();

    let report = refresher(test_settings(&server.url_template())).run(vec![request(&dir, CITY)]).await;

    assert!(report.succeeded());
    assert_eq!(std::fs::read(dir.dest(CITY)).unwrap(), b"city-new");
    assert_eq!(dir.entries(), vec![format!("{CITY}.mmdb")]);
}

#[tokio::test]
async fn test_repeated_runs_converge() {
    let server =
        ArchiveServer::start(vec![(COUNTRY, Behavior::Archive(archive(COUNTRY, b"same")))]).await;
    let dir = TestDir::new();
    let refresher = refresher(test_settings(&server.url_template()));

    let first = refresher.run(vec![request(&dir, COUNTRY)]).await;
    let second = refresher.run(vec![request(&dir, COUNTRY)]).await;

    assert!(first.succeeded() && second.succeeded());
    assert_eq!(
        first.outcomes[0].installed.as_ref().unwrap().sha256,
        second.outcomes[0].installed.as_ref().unwrap().sha256
    );
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"same");
    assert_eq!(dir.entries(), vec![format!("{COUNTRY}.mmdb")]);
    assert_eq!(server.hits(COUNTRY), 2);
}

#[tokio::test]
async fn test_missing_destination_directory_is_created() {
    let server =
        ArchiveServer::start(vec![(ASN, Behavior::Archive(archive(ASN, b"asn")))]).await;
    let dir = TestDir::new();
    let dest = dir.path().join("var").join("lib").join("GeoIP").join("GeoLite2-ASN.mmdb");

    let report = refresher(test_settings(&server.url_template()))
        .run(vec![JobRequest::new(ASN, &dest, VALID_KEY)])
        .await;

    assert!(report.succeeded(), "{:?}", report.outcomes);
    assert_eq!(std::fs::read(&dest).unwrap(), b"asn");
    assert_eq!(std::fs::read_dir(dest.parent().unwrap()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_failures_are_isolated_per_database() {
    let server = ArchiveServer::start(vec![
        (COUNTRY, Behavior::Archive(archive(COUNTRY, b"country"))),
        (CITY, Behavior::Status(StatusCode::NOT_FOUND, "Database edition not found")),
        (ASN, Behavior::Archive(b"definitely not gzip".to_vec())),
    ])
    .await;
    let dir = TestDir::new();
    std::fs::write(dir.dest(CITY), b"city-old").unwrap();
    std::fs::write(dir.dest(ASN), b"asn-old").unwrap();

    let report = refresher(test_settings(&server.url_template()))
        .run(vec![request(&dir, COUNTRY), request(&dir, CITY), request(&dir, ASN)])
        .await;

    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.identifier.as_str()).collect();
    assert_eq!(ids, vec![COUNTRY, CITY, ASN]);
    assert!(report.outcomes[0].succeeded);
    assert_eq!(report.outcomes[1].stage, Some(Stage::Fetch));
    assert!(report.outcomes[1].error_message.as_deref().unwrap().contains("404"));
    assert_eq!(report.outcomes[2].stage, Some(Stage::Decompress));
    assert_eq!(report.exit_code(), 1);

    // Failed databases keep their previous content
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"country");
    assert_eq!(std::fs::read(dir.dest(CITY)).unwrap(), b"city-old");
    assert_eq!(std::fs::read(dir.dest(ASN)).unwrap(), b"asn-old");

    let mut expected = vec![
        format!("{ASN}.mmdb"),
        format!("{CITY}.mmdb"),
        format!("{COUNTRY}.mmdb"),
    ];
    expected.sort();
    assert_eq!(dir.entries(), expected);
}

#[tokio::test]
async fn test_parallel_run_reports_in_request_order() {
    let server = ArchiveServer::start(vec![
        (COUNTRY, Behavior::Archive(archive(COUNTRY, b"c"))),
        (CITY, Behavior::Archive(archive(CITY, &vec![7u8; 256 * 1024]))),
        (ASN, Behavior::Archive(archive(ASN, b"a"))),
    ])
    .await;
    let dir = TestDir::new();

    let settings = RefreshSettings {
        max_parallel: 3,
        ..test_settings(&server.url_template())
    };
    let report = refresher(settings)
        .run(vec![request(&dir, CITY), request(&dir, ASN), request(&dir, COUNTRY)])
        .await;

    assert!(report.succeeded(), "{:?}", report.outcomes);
    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.identifier.as_str()).collect();
    assert_eq!(ids, vec![CITY, ASN, COUNTRY]);
    assert_eq!(std::fs::metadata(dir.dest(CITY)).unwrap().len(), 256 * 1024);
    assert_eq!(dir.entries().len(), 3);
}

#[tokio::test]
async fn test_rejected_license_key_is_not_leaked() {
    let server =
        ArchiveServer::start(vec![(CITY, Behavior::Archive(archive(CITY, b"x")))]).await;
    let dir = TestDir::new();

    let report = refresher(test_settings(&server.url_template()))
        .run(vec![JobRequest::new(CITY, dir.dest(CITY), "wrong-key-9876")])
        .await;

    let outcome = &report.outcomes[0];
    let message = outcome.error_message.as_deref().unwrap();
    assert_eq!(outcome.stage, Some(Stage::Fetch));
    assert!(message.contains("401"));
    assert!(message.contains("Invalid license key"));
    assert!(!message.contains("wrong-key-9876"));
    assert!(dir.entries().is_empty());
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = ArchiveServer::start(vec![(
        COUNTRY,
        Behavior::FlakyThenArchive {
            failures: 1,
            archive: archive(COUNTRY, b"after-retry"),
        },
    )])
    .await;
    let dir = TestDir::new();

    let settings = RefreshSettings {
        retries: 2,
        ..test_settings(&server.url_template())
    };
    let report = refresher(settings).run(vec![request(&dir, COUNTRY)]).await;

    assert!(report.succeeded(), "{:?}", report.outcomes);
    assert_eq!(server.hits(COUNTRY), 2);
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"after-retry");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = ArchiveServer::start(vec![(
        ASN,
        Behavior::Status(StatusCode::FORBIDDEN, "Subscription expired"),
    )])
    .await;
    let dir = TestDir::new();

    let settings = RefreshSettings {
        retries: 3,
        ..test_settings(&server.url_template())
    };
    let report = refresher(settings).run(vec![request(&dir, ASN)]).await;

    assert!(!report.succeeded());
    assert_eq!(server.hits(ASN), 1);
}

#[tokio::test]
async fn test_truncated_download_fails_and_cleans_up() {
    let full = archive(COUNTRY, &vec![1u8; 64 * 1024]);
    let (template, handle) = truncating_server(full.len(), full[..full.len() / 2].to_vec()).await;
    let dir = TestDir::new();
    std::fs::write(dir.dest(COUNTRY), b"previous").unwrap();

    let report = refresher(test_settings(&template)).run(vec![request(&dir, COUNTRY)]).await;
    handle.abort();

    assert_eq!(report.outcomes[0].stage, Some(Stage::Fetch), "{:?}", report.outcomes);
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"previous");
    assert_eq!(dir.entries(), vec![format!("{COUNTRY}.mmdb")]);
}

#[tokio::test]
async fn test_archive_without_payload_fails_at_locate() {
    let bytes = ArchiveBuilder::new()
        .dir("GeoLite2-City_20240102")
        .file("GeoLite2-City_20240102/LICENSE.txt", b"license")
        .build_tar_gz();
    let server = ArchiveServer::start(vec![(CITY, Behavior::Archive(bytes))]).await;
    let dir = TestDir::new();

    let report = refresher(test_settings(&server.url_template())).run(vec![request(&dir, CITY)]).await;

    assert_eq!(report.outcomes[0].stage, Some(Stage::Locate));
    assert!(dir.entries().is_empty(), "left behind: {:?}", dir.entries());
}

#[tokio::test]
async fn test_gzip_of_non_tar_fails_at_extract() {
    let server =
        ArchiveServer::start(vec![(CITY, Behavior::Archive(gzip(&[b'z'; 2048])))]).await;
    let dir = TestDir::new();

    let report = refresher(test_settings(&server.url_template())).run(vec![request(&dir, CITY)]).await;

    assert_eq!(report.outcomes[0].stage, Some(Stage::Extract));
    assert!(dir.entries().is_empty());
}

#[tokio::test]
async fn test_stale_extraction_directory_fails_loudly() {
    let server =
        ArchiveServer::start(vec![(CITY, Behavior::Archive(archive(CITY, b"new")))]).await;
    let dir = TestDir::new();
    let stale = dir.path().join("GeoLite2-City_20231201");
    std::fs::create_dir(&stale).unwrap();
    std::fs::write(dir.dest(CITY), b"old").unwrap();

    let report = refresher(test_settings(&server.url_template())).run(vec![request(&dir, CITY)]).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.stage, Some(Stage::Locate));
    assert!(outcome.error_message.as_deref().unwrap().contains("2 directories match"));
    assert_eq!(std::fs::read(dir.dest(CITY)).unwrap(), b"old");
    // Only the directory this job created is swept
    assert!(stale.is_dir());
    assert!(!dir.path().join("GeoLite2-City_20240102").exists());
}

#[tokio::test]
async fn test_jobs_in_same_directory_do_not_interfere() {
    let server = ArchiveServer::start(vec![
        (COUNTRY, Behavior::Archive(archive(COUNTRY, b"country"))),
        (CITY, Behavior::Archive(archive(CITY, b"city"))),
    ])
    .await;
    let dir = TestDir::new();

    let settings = RefreshSettings {
        max_parallel: 2,
        ..test_settings(&server.url_template())
    };
    let report = refresher(settings).run(vec![request(&dir, COUNTRY), request(&dir, CITY)]).await;

    assert!(report.succeeded(), "{:?}", report.outcomes);
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"country");
    assert_eq!(std::fs::read(dir.dest(CITY)).unwrap(), b"city");
}

#[tokio::test]
async fn test_cancelled_run_touches_nothing() {
    let server =
        ArchiveServer::start(vec![(ASN, Behavior::Archive(archive(ASN, b"asn")))]).await;
    let dir = TestDir::new();

    let refresher = refresher(test_settings(&server.url_template()));
    refresher.cancel();
    let report = refresher.run(vec![request(&dir, ASN)]).await;

    assert_eq!(report.outcomes[0].stage, Some(Stage::Pending));
    assert_eq!(server.hits(ASN), 0);
    assert!(dir.entries().is_empty());
}

#[tokio::test]
async fn test_cancellation_lets_running_job_finish() {
    let server = ArchiveServer::start(vec![
        (
            COUNTRY,
            Behavior::SlowArchive {
                delay: Duration::from_millis(500),
                archive: archive(COUNTRY, b"country"),
            },
        ),
        (CITY, Behavior::Archive(archive(CITY, b"city"))),
    ])
    .await;
    let dir = TestDir::new();
    let refresher = refresher(test_settings(&server.url_template()));
    let flag = refresher.cancellation_flag();

    let cancel_while_downloading = async {
        while server.hits(COUNTRY) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        flag.store(true, Ordering::SeqCst);
    };
    let (report, ()) = tokio::join!(
        refresher.run(vec![request(&dir, COUNTRY), request(&dir, CITY)]),
        cancel_while_downloading
    );

    assert!(report.outcomes[0].succeeded, "{:?}", report.outcomes);
    assert_eq!(std::fs::read(dir.dest(COUNTRY)).unwrap(), b"country");
    assert_eq!(report.outcomes[1].stage, Some(Stage::Pending));
    assert!(report.outcomes[1].error_message.as_deref().unwrap().contains("cancelled"));
    assert_eq!(server.hits(CITY), 0);
    assert_eq!(dir.entries(), vec![format!("{COUNTRY}.mmdb")]);
}

#[tokio::test]
async fn test_install_failure_keeps_destination_and_cleans_up() {
    let server =
        ArchiveServer::start(vec![(CITY, Behavior::Archive(archive(CITY, b"city")))]).await;
    let dir = TestDir::new();
    // A directory where the database file should be cannot be replaced by rename
    let blocked = dir.dest(CITY);
    std::fs::create_dir(&blocked).unwrap();
    std::fs::write(blocked.join("keep.txt"), b"untouched").unwrap();

    let report = refresher(test_settings(&server.url_template())).run(vec![request(&dir, CITY)]).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.stage, Some(Stage::Install), "{:?}", report.outcomes);
    assert!(!report.succeeded());
    assert!(blocked.is_dir());
    assert_eq!(std::fs::read(blocked.join("keep.txt")).unwrap(), b"untouched");
    assert_eq!(dir.entries(), vec![format!("{CITY}.mmdb")]);
}
