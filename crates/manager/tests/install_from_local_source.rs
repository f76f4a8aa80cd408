//! End-to-end exercise of local discovery → trust → content-addressed
//! install → catalog, using a manifest-based local source directory
//! (spec.md §8 scenario family, adapted to a filesystem-only fixture so the
//! test needs no network or registry).

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

fn write_fake_plugin_binary(path: &std::path::Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(
        file,
        "echo '{{\"name\":\"login\",\"description\":\"d\",\"version\":\"1.0.0\",\"defaultFeatureFlags\":{{}}}}'"
    )
    .unwrap();
    drop(file);
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn build_manifest_source(root: &std::path::Path) {
    std::fs::write(root.join("manifest.yaml"), "plugins:\n  - login\n").unwrap();
    std::fs::create_dir_all(root.join("login")).unwrap();
    std::fs::write(
        root.join("login").join("plugin.yaml"),
        "name: login\ntarget: global\nversions:\n  - \"1.0.0\"\n",
    )
    .unwrap();

    let binary_path = root
        .join("global")
        .join("login")
        .join("1.0.0")
        .join(format!(
            "tanzu-login-{}_{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
    write_fake_plugin_binary(&binary_path);
}

fn resolver(source_root: std::path::PathBuf, store_root: std::path::PathBuf, catalog_root: std::path::PathBuf) -> Resolver {
    let local = DiscoverySource::Local(LocalDiscovery::new(source_root));
    Resolver::new(
        vec![local],
        TrustVerifier::new(vec![], vec![]),
        Catalog::new(catalog_root),
        BinaryStore::new(store_root),
        Arc::new(InMemoryConfigurationService::default()),
        Arc::new(NoopTelemetry),
        Arc::new(SilentProgress),
    )
}

#[tokio::test]
async fn install_standalone_from_local_manifest_source() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let catalog_dir = tempfile::tempdir().unwrap();
    build_manifest_source(source_dir.path());

    let resolver = resolver(
        source_dir.path().to_path_buf(),
        store_dir.path().to_path_buf(),
        catalog_dir.path().to_path_buf(),
    );

    let identifier = resolver
        .install_standalone("login", &VersionRequest::Latest, Some(Target::Global))
        .await
        .expect("install should succeed from a well-formed local source");
    assert_eq!(identifier.version, "1.0.0");

    let described = resolver
        .describe("login", Some(Target::Global))
        .await
        .expect("installed plugin should be describable");
    assert_eq!(described.version, "1.0.0");
    assert!(described.installation_path.exists());
    assert!(described.installation_path.starts_with(store_dir.path()));
}

#[tokio::test]
async fn reinstalling_same_version_is_a_no_op_short_circuit() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let catalog_dir = tempfile::tempdir().unwrap();
    build_manifest_source(source_dir.path());

    let resolver = resolver(
        source_dir.path().to_path_buf(),
        store_dir.path().to_path_buf(),
        catalog_dir.path().to_path_buf(),
    );

    resolver
        .install_standalone("login", &VersionRequest::Latest, Some(Target::Global))
        .await
        .unwrap();
    let second = resolver
        .install_standalone("login", &VersionRequest::Latest, Some(Target::Global))
        .await
        .expect("second install of the same version should short-circuit, not error");
    assert_eq!(second.version, "1.0.0");
}

#[tokio::test]
async fn delete_removes_plugin_from_every_catalog() {
    let source_dir = tempfile::tempdir().unwrap();
    let store_dir = tempfile::tempdir().unwrap();
    let catalog_dir = tempfile::tempdir().unwrap();
    build_manifest_source(source_dir.path());

    let resolver = resolver(
        source_dir.path().to_path_buf(),
        store_dir.path().to_path_buf(),
        catalog_dir.path().to_path_buf(),
    );

    resolver
        .install_standalone("login", &VersionRequest::Latest, Some(Target::Global))
        .await
        .unwrap();
    resolver.delete_plugin("login", Some(Target::Global), true).await.unwrap();

    let err = resolver.describe("login", Some(Target::Global)).await.unwrap_err();
    assert!(matches!(err, plugin_manager::Error::NotFound(_)));
}
