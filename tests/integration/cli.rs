//! The `geoip-refresh` binary, driven through `assert_cmd`.

use std::path::Path;

use assert_cmd::Command;
use geoip_refresh::test_utils::ArchiveBuilder;
use predicates::prelude::*;

use crate::common::{ArchiveServer, Behavior, TestDir, VALID_KEY};

fn geoip_refresh(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("geoip-refresh").unwrap();
    cmd.arg("--config")
        .arg(config)
        .env("NO_COLOR", "1")
        .env("GEOIP_REFRESH_NO_PROGRESS", "1")
        .env_remove("MAXMIND_LICENSE_KEY")
        .env_remove("GEOIP_REFRESH_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

/// Run a blocking command without stalling the server's runtime.
async fn run(mut cmd: Command) -> assert_cmd::assert::Assert {
    tokio::task::spawn_blocking(move || cmd.assert()).await.unwrap()
}

fn config_for(server: &ArchiveServer, dir: &TestDir, editions: &[&str]) -> std::path::PathBuf {
    let mut content = format!(
        "license_key = \"{VALID_KEY}\"\ndownload_url = \"{}\"\nretries = 0\ntimeout_secs = 10\n",
        server.url_template()
    );
    for edition in editions {
        content.push_str(&format!(
            "\n[[databases]]\nedition = \"{edition}\"\npath = \"{}\"\n",
            dir.dest(edition).display().to_string().replace('\\', "\\\\")
        ));
    }
    dir.write_config(&content)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_success() {
    let server = ArchiveServer::start(vec![(
        "GeoLite2-Country",
        Behavior::Archive(
            ArchiveBuilder::publisher_layout("GeoLite2-Country", "20240102", b"db").build_tar_gz(),
        ),
    )])
    .await;
    let dir = TestDir::new();
    let config = config_for(&server, &dir, &["GeoLite2-Country"]);

    let mut cmd = geoip_refresh(&config);
    cmd.arg("update");
    run(cmd)
        .await
        .success()
        .stdout(predicate::str::contains("Updating: GeoLite2-Country"))
        .stdout(predicate::str::contains("GeoLite2-Country updated."))
        .stdout(predicate::str::contains("1 updated, 0 failed"));

    assert_eq!(std::fs::read(dir.dest("GeoLite2-Country")).unwrap(), b"db");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_partial_failure_exits_nonzero() {
    let server = ArchiveServer::start(vec![(
        "GeoLite2-ASN",
        Behavior::Archive(
            ArchiveBuilder::publisher_layout("GeoLite2-ASN", "20240102", b"asn").build_tar_gz(),
        ),
    )])
    .await;
    let dir = TestDir::new();
    let config = config_for(&server, &dir, &["GeoLite2-City", "GeoLite2-ASN"]);

    let mut cmd = geoip_refresh(&config);
    cmd.arg("update");
    run(cmd)
        .await
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Error: Failed to download GeoLite2-City"))
        .stdout(predicate::str::contains("GeoLite2-ASN updated."))
        .stderr(predicate::str::contains("1 of 2 database(s) failed to update"));

    assert!(dir.dest("GeoLite2-ASN").exists());
    assert!(!dir.dest("GeoLite2-City").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_json_report() {
    let server = ArchiveServer::start(Vec::new()).await;
    let dir = TestDir::new();
    let config = config_for(&server, &dir, &["GeoLite2-City"]);

    let mut cmd = geoip_refresh(&config);
    cmd.args(["update", "--format", "json"]);
    let assert = run(cmd).await.failure();

    let report: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["outcomes"][0]["identifier"], "GeoLite2-City");
    assert_eq!(report["outcomes"][0]["succeeded"], false);
    assert_eq!(report["outcomes"][0]["stage"], "fetch");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_only_unknown_edition() {
    let server = ArchiveServer::start(Vec::new()).await;
    let dir = TestDir::new();
    let config = config_for(&server, &dir, &["GeoLite2-City"]);

    let mut cmd = geoip_refresh(&config);
    cmd.args(["update", "--only", "GeoIP2-Enterprise"]);
    run(cmd)
        .await
        .failure()
        .stderr(predicate::str::contains("Database 'GeoIP2-Enterprise' is not configured"));
    assert_eq!(server.hits("GeoIP2-Enterprise"), 0);
}

#[test]
fn test_update_without_paths_reports_configuration_errors() {
    let dir = TestDir::new();
    // No config file: defaults list three editions without paths
    let config = dir.path().join("absent.toml");

    geoip_refresh(&config)
        .args(["update", "--license-key", "k"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("no destination path configured"))
        .stderr(predicate::str::contains("3 of 3 database(s) failed to update"));
    assert!(dir.entries().is_empty());
}

#[test]
fn test_config_init_show_path() {
    let dir = TestDir::new();
    let config = dir.path().join("geoip").join("config.toml");

    geoip_refresh(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(config.display().to_string()));

    geoip_refresh(&config).args(["config", "init"]).assert().success();
    assert!(config.exists());

    geoip_refresh(&config)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    geoip_refresh(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GeoLite2-City"))
        .stdout(predicate::str::contains("***"))
        .stdout(predicate::str::contains("YOUR_LICENSE_KEY").not());
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TestDir::new();
    let config = dir.write_config("max_parallel = \"many\"\n");

    geoip_refresh(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse configuration file"));
}

#[test]
fn test_list_json() {
    let dir = TestDir::new();
    let installed = dir.dest("GeoLite2-ASN");
    std::fs::write(&installed, b"asn").unwrap();
    let config = dir.write_config(&format!(
        "[[databases]]\nedition = \"GeoLite2-ASN\"\npath = \"{}\"\n\n[[databases]]\nedition = \"GeoLite2-City\"\n",
        installed.display().to_string().replace('\\', "\\\\")
    ));

    let assert = geoip_refresh(&config).args(["list", "--format", "json"]).assert().success();
    let listing: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

    assert_eq!(listing[0]["edition"], "GeoLite2-ASN");
    assert_eq!(listing[0]["installed"], true);
    assert_eq!(listing[0]["size"], 3);
    assert_eq!(listing[1]["installed"], false);
}
