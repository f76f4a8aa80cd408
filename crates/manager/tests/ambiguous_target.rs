//! Ambiguous-target scenario (spec.md §8 scenario 3): a plugin discovered
//! under two distinct targets with no target specified must error rather
//! than silently pick one, and must leave the catalog untouched.

use plugin_manager::catalog::Catalog;
use plugin_manager::config::InMemoryConfigurationService;
use plugin_manager::discovery::local::LocalDiscovery;
use plugin_manager::discovery::DiscoverySource;
use plugin_manager::identity::VersionRequest;
use plugin_manager::progress::SilentProgress;
use plugin_manager::resolver::{BinaryStore, Resolver};
use plugin_manager::telemetry::NoopTelemetry;
use plugin_manager::{Error, Result};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

fn write_fake_plugin_binary(path: &std::path::Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(
        file,
        "echo '{{\"name\":\"myplugin\",\"description\":\"d\",\"version\":\"1.0.0\",\"defaultFeatureFlags\":{{}}}}'"
    )
    .unwrap();
    drop(file);
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn build_two_target_source(root: &std::path::Path, target: &str) {
    let plugin_dir_name = format!("myplugin-{target}");
    std::fs::write(
        root.join("manifest.yaml"),
        format!("plugins:\n  - {plugin_dir_name}\n"),
    )
    .unwrap();
    std::fs::create_dir_all(root.join(&plugin_dir_name)).unwrap();
    std::fs::write(
        root.join(&plugin_dir_name).join("plugin.yaml"),
        format!("name: myplugin\ntarget: {target}\nversions:\n  - \"1.0.0\"\n"),
    )
    .unwrap();

    let binary_path = root.join(target).join("myplugin").join("1.0.0").join(format!(
        "tanzu-myplugin-{}_{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    write_fake_plugin_binary(&binary_path);
}

#[tokio::test]
async fn install_without_target_errors_when_two_targets_exist() {
    let kubernetes_root = tempfile::tempdir().unwrap();
    let mission_control_root = tempfile::tempdir().unwrap();
    build_two_target_source(kubernetes_root.path(), "kubernetes");
    build_two_target_source(mission_control_root.path(), "mission-control");

    let sources = vec![
        DiscoverySource::Local(LocalDiscovery::new(kubernetes_root.path().to_path_buf())),
        DiscoverySource::Local(LocalDiscovery::new(mission_control_root.path().to_path_buf())),
    ];
    let catalog_dir = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(
        sources,
        plugin_manager::trust::TrustVerifier::new(vec![], vec![]),
        Catalog::new(catalog_dir.path().to_path_buf()),
        BinaryStore::new(tempfile::tempdir().unwrap().into_path()),
        Arc::new(InMemoryConfigurationService::default()),
        Arc::new(NoopTelemetry),
        Arc::new(SilentProgress),
    );

    let result: Result<_> = resolver
        .install_standalone("myplugin", &VersionRequest::Latest, None)
        .await;

    assert!(matches!(result, Err(Error::AmbiguousTarget(_))), "expected AmbiguousTarget, got {result:?}");
    assert!(
        std::fs::read_to_string(catalog_dir.path().join("standalone.yaml")).is_err(),
        "catalog must remain untouched on ambiguous-target failure"
    );
}
