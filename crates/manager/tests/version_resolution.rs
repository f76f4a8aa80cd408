//! Shortened-version resolution scenarios (spec.md §8 scenarios 1-2):
//! a `vMAJOR` or `vMAJOR.MINOR` request resolves to the semver-max matching
//! candidate, not simply the first or last listed.

use plugin_manager::catalog::Catalog;
use plugin_manager::config::InMemoryConfigurationService;
use plugin_manager::discovery::local::LocalDiscovery;
use plugin_manager::discovery::DiscoverySource;
use plugin_manager::identity::{Target, VersionRequest};
use plugin_manager::progress::SilentProgress;
use plugin_manager::resolver::{BinaryStore, Resolver};
use plugin_manager::telemetry::NoopTelemetry;
use plugin_manager::trust::TrustVerifier;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

fn write_fake_plugin_binary(path: &std::path::Path, version: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(
        file,
        "echo '{{\"name\":\"login\",\"description\":\"d\",\"version\":\"{version}\",\"defaultFeatureFlags\":{{}}}}'"
    )
    .unwrap();
    drop(file);
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn build_multi_version_source(root: &std::path::Path, versions: &[&str]) {
    std::fs::write(root.join("manifest.yaml"), "plugins:\n  - login\n").unwrap();
    std::fs::create_dir_all(root.join("login")).unwrap();
    let versions_yaml: String = versions.iter().map(|v| format!("  - \"{v}\"\n")).collect();
    std::fs::write(
        root.join("login").join("plugin.yaml"),
        format!("name: login\ntarget: global\nversions:\n{versions_yaml}"),
    )
    .unwrap();

    for version in versions {
        let binary_path = root.join("global").join("login").join(version).join(format!(
            "tanzu-login-{}_{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        write_fake_plugin_binary(&binary_path, version.trim_start_matches('v'));
    }
}

fn resolver(source_root: std::path::PathBuf) -> Resolver {
    let local = DiscoverySource::Local(LocalDiscovery::new(source_root));
    Resolver::new(
        vec![local],
        TrustVerifier::new(vec![], vec![]),
        Catalog::new(tempfile::tempdir().unwrap().into_path()),
        BinaryStore::new(tempfile::tempdir().unwrap().into_path()),
        Arc::new(InMemoryConfigurationService::default()),
        Arc::new(NoopTelemetry),
        Arc::new(SilentProgress),
    )
}

#[tokio::test]
async fn shortened_major_picks_semver_max_within_major() {
    let source_dir = tempfile::tempdir().unwrap();
    build_multi_version_source(
        source_dir.path(),
        &["v0.2.0-beta.1", "v0.2.0", "v0.20.0"],
    );
    let resolver = resolver(source_dir.path().to_path_buf());

    let version_req = VersionRequest::parse("v0").unwrap();
    resolver
        .install_standalone("login", &version_req, Some(Target::Global))
        .await
        .unwrap();

    let described = resolver.describe("login", Some(Target::Global)).await.unwrap();
    assert_eq!(described.version, "0.20.0");
}

#[tokio::test]
async fn shortened_major_minor_picks_exact_minor_match() {
    let source_dir = tempfile::tempdir().unwrap();
    build_multi_version_source(
        source_dir.path(),
        &["v0.2.0-beta.1", "v0.2.0", "v0.20.0"],
    );
    let resolver = resolver(source_dir.path().to_path_buf());

    let version_req = VersionRequest::parse("v0.2").unwrap();
    resolver
        .install_standalone("login", &version_req, Some(Target::Global))
        .await
        .unwrap();

    let described = resolver.describe("login", Some(Target::Global)).await.unwrap();
    assert_eq!(described.version, "0.2.0");
}
