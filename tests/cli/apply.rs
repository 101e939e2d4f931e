use std::path::{Path, PathBuf};

use hostconverge::app::{EXIT_CONFIGURATION, execute, exit_code_for};
use hostconverge::cli::{Commands, OutputFormat};
use hostconverge::config::Config;
use hostconverge::error::ConvergeError;
use tempfile::TempDir;

use crate::host_harness::{RecordingShell, exited};

fn write_manifest(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("plan.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn apply(manifest: PathBuf, format: OutputFormat) -> Commands {
    Commands::Apply {
        manifest,
        format,
        parallel: None,
        timeout: None,
    }
}

const SITE_PLAN: &str = r#"
[[step]]
id = "site-dir"
kind = "directory"
path = "www"

[[step]]
id = "index"
kind = "file"
path = "www/index.html"
content = "<h1>hello</h1>\n"
requires = ["site-dir"]
"#;

#[tokio::test]
async fn apply_converges_then_reports_satisfied() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(dir.path(), SITE_PLAN);
    let config = Config::default();

    let mut out = Vec::<u8>::new();
    let code = execute(
        apply(manifest.clone(), OutputFormat::Text),
        &config,
        RecordingShell::new(),
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(code, 0, "{text}");
    assert!(text.contains("++ site-dir"), "{text}");
    assert!(text.contains("0 already satisfied, 2 converged, 0 failed, 0 skipped"));
    assert!(text.contains("host converged"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("www/index.html")).unwrap(),
        "<h1>hello</h1>\n"
    );

    let mut out = Vec::<u8>::new();
    let code = execute(
        apply(manifest, OutputFormat::Text),
        &config,
        RecordingShell::new(),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(code, 0);
    assert!(
        String::from_utf8(out)
            .unwrap()
            .contains("2 already satisfied, 0 converged")
    );
}

#[tokio::test]
async fn fatal_service_failure_exits_three() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[[step]]
id = "svc-postgres"
kind = "service"
name = "postgresql"
fatal = true

[[step]]
id = "conf"
kind = "file"
path = "pg.conf"
content = "listen_addresses = 'localhost'\n"
requires = ["svc-postgres"]
"#,
    );
    let shell = RecordingShell::new();
    shell.on("systemctl is-active", vec![exited(3, "inactive\n", "")]);
    shell.on(
        "systemctl enable",
        vec![exited(1, "", "Failed to enable unit: Unit file postgresql.service does not exist.")],
    );

    let mut out = Vec::<u8>::new();
    let code = execute(
        apply(manifest, OutputFormat::Json),
        &Config::default(),
        shell.clone(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(code, 3);
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["status"], "halted_on_fatal");
    assert_eq!(json["steps"][0]["id"], "svc-postgres");
    assert_eq!(json["steps"][0]["outcome"]["status"], "failed");
    assert_eq!(json["steps"][0]["outcome"]["reason"]["kind"], "execution");
    assert_eq!(json["steps"][1]["outcome"]["status"], "skipped_due_to_dependency");
    assert_eq!(json["summary"]["skipped"], 1);
    assert!(!dir.path().join("pg.conf").exists());
    assert_eq!(
        shell.calls(),
        vec![
            "systemctl is-active postgresql",
            "systemctl enable --now postgresql"
        ]
    );
}

#[tokio::test]
async fn non_fatal_failure_exits_two() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[[step]]
id = "pkg-redis"
kind = "package"
name = "redis-server"

[[step]]
id = "motd"
kind = "file"
path = "motd"
content = "managed host\n"
"#,
    );
    let shell = RecordingShell::new();
    shell.on("dpkg-query", vec![exited(1, "", "no packages found")]);
    shell.on("apt-get install", vec![exited(100, "", "E: Could not get lock")]);

    let mut out = Vec::<u8>::new();
    let code = execute(
        apply(manifest, OutputFormat::Text),
        &Config::default(),
        shell,
        &mut out,
    )
    .await
    .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(code, 2, "{text}");
    assert!(text.contains("!! pkg-redis"), "{text}");
    assert!(text.contains("Could not get lock"), "{text}");
    assert!(text.contains("++ motd"), "{text}");
    assert!(text.contains("partial failure: 1 step(s) failed"));
}

#[tokio::test]
async fn cyclic_manifest_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[[step]]
id = "a"
kind = "directory"
path = "a"
requires = ["b"]

[[step]]
id = "b"
kind = "directory"
path = "b"
requires = ["a"]
"#,
    );

    let mut out = Vec::<u8>::new();
    let err = execute(
        apply(manifest, OutputFormat::Text),
        &Config::default(),
        RecordingShell::new(),
        &mut out,
    )
    .await
    .unwrap_err();

    assert_eq!(exit_code_for(&err), EXIT_CONFIGURATION);
    assert!(format!("{err:#}").contains("cycle detected: a -> b -> a"));
    assert!(out.is_empty());
    assert!(!dir.path().join("a").exists());
    assert!(!dir.path().join("b").exists());
}

#[tokio::test]
async fn missing_manifest_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let err = execute(
        apply(dir.path().join("nope.toml"), OutputFormat::Text),
        &Config::default(),
        RecordingShell::new(),
        &mut Vec::<u8>::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(exit_code_for(&err), EXIT_CONFIGURATION);
    assert!(matches!(err, ConvergeError::Manifest { .. }));
}

#[tokio::test]
async fn misspelt_step_key_fails_before_anything_runs() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[[step]]
id = "a"
kind = "directory"
path = "a"

[[step]]
id = "b"
kind = "directory"
path = "b"
requries = ["a"]
fatl = true
"#,
    );

    let mut out = Vec::<u8>::new();
    let err = execute(
        apply(manifest, OutputFormat::Text),
        &Config::default(),
        RecordingShell::new(),
        &mut out,
    )
    .await
    .unwrap_err();

    assert_eq!(exit_code_for(&err), EXIT_CONFIGURATION);
    assert!(err.to_string().contains("step b: unknown key `requries`"), "{err}");
    assert!(out.is_empty());
    assert!(!dir.path().join("a").exists());
}

#[tokio::test]
async fn forward_dependency_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[[step]]
id = "site"
kind = "file"
path = "www/index.html"
content = "hi"
requires = ["site-dir"]

[[step]]
id = "site-dir"
kind = "directory"
path = "www"
"#,
    );

    let err = execute(
        apply(manifest, OutputFormat::Text),
        &Config::default(),
        RecordingShell::new(),
        &mut Vec::<u8>::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(exit_code_for(&err), EXIT_CONFIGURATION);
    assert!(
        err.to_string()
            .contains("step site requires site-dir, which is declared after it"),
        "{err}"
    );
    assert!(!dir.path().join("www").exists());
}

#[tokio::test]
async fn timeout_flag_overrides_config() {
    let dir = TempDir::new().unwrap();
    let manifest = write_manifest(
        dir.path(),
        r#"
[[step]]
id = "slow"
kind = "command"
command = "sleep 30"
unless = "sleep 30"
"#,
    );

    // Scripted answers are instant; only the flag plumbing is exercised.
    let shell = RecordingShell::new();
    shell.on("sh -c", vec![exited(0, "", "")]);

    let mut out = Vec::<u8>::new();
    let code = execute(
        Commands::Apply {
            manifest,
            format: OutputFormat::Text,
            parallel: Some(2),
            timeout: Some(1),
        },
        &Config::default(),
        shell.clone(),
        &mut out,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    assert_eq!(shell.calls(), vec!["sh -c \"sleep 30\""]);
}
