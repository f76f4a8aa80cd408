//! Delete-all-for-target scenario (spec.md §8 scenario 6): `DeletePlugin`
//! with name `"all"` and a target removes exactly the entries for that
//! target, leaving other targets' entries untouched, and a second `"all"`
//! pass with no matches errors.

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

fn write_fake_plugin_binary(path: &std::path::Path, name: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(
        file,
        "echo '{{\"name\":\"{name}\",\"description\":\"d\",\"version\":\"1.0.0\",\"defaultFeatureFlags\":{{}}}}'"
    )
    .unwrap();
    drop(file);
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

fn add_plugin(root: &std::path::Path, name: &str, target: &str, manifest_plugins: &mut Vec<String>) {
    manifest_plugins.push(name.to_owned());
    std::fs::create_dir_all(root.join(name)).unwrap();
    std::fs::write(
        root.join(name).join("plugin.yaml"),
        format!("name: {name}\ntarget: {target}\nversions:\n  - \"1.0.0\"\n"),
    )
    .unwrap();
    let binary_path = root.join(target).join(name).join("1.0.0").join(format!(
        "tanzu-{name}-{}_{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));
    write_fake_plugin_binary(&binary_path, name);
}

#[tokio::test]
async fn delete_all_removes_only_the_requested_target() {
    let source_dir = tempfile::tempdir().unwrap();
    let mut manifest_plugins = Vec::new();
    add_plugin(source_dir.path(), "cluster", "kubernetes", &mut manifest_plugins);
    add_plugin(source_dir.path(), "cluster-tmc", "mission-control", &mut manifest_plugins);
    add_plugin(source_dir.path(), "secret", "kubernetes", &mut manifest_plugins);
    add_plugin(source_dir.path(), "management-cluster", "kubernetes", &mut manifest_plugins);
    add_plugin(source_dir.path(), "management-cluster-tmc", "mission-control", &mut manifest_plugins);
    let manifest_yaml = format!(
        "plugins:\n{}",
        manifest_plugins.iter().map(|p| format!("  - {p}\n")).collect::<String>()
    );
    std::fs::write(source_dir.path().join("manifest.yaml"), manifest_yaml).unwrap();

    let local = DiscoverySource::Local(LocalDiscovery::new(source_dir.path().to_path_buf()));
    let resolver = Resolver::new(
        vec![local],
        TrustVerifier::new(vec![], vec![]),
        Catalog::new(tempfile::tempdir().unwrap().into_path()),
        BinaryStore::new(tempfile::tempdir().unwrap().into_path()),
        Arc::new(InMemoryConfigurationService::default()),
        Arc::new(NoopTelemetry),
        Arc::new(SilentProgress),
    );

    for name in ["cluster", "cluster-tmc", "secret", "management-cluster", "management-cluster-tmc"] {
        let target = if name.ends_with("-tmc") { Target::MissionControl } else { Target::Kubernetes };
        resolver
            .install_standalone(name, &VersionRequest::Latest, Some(target))
            .await
            .unwrap_or_else(|e| panic!("install of {name} failed: {e}"));
    }

    resolver.delete_plugin("all", Some(Target::Kubernetes), true).await.unwrap();

    assert!(resolver.describe("cluster", Some(Target::Kubernetes)).await.is_err());
    assert!(resolver.describe("secret", Some(Target::Kubernetes)).await.is_err());
    assert!(resolver.describe("management-cluster", Some(Target::Kubernetes)).await.is_err());
    assert!(resolver.describe("cluster-tmc", Some(Target::MissionControl)).await.is_ok());
    assert!(resolver.describe("management-cluster-tmc", Some(Target::MissionControl)).await.is_ok());

    resolver.delete_plugin("all", Some(Target::MissionControl), true).await.unwrap();
    assert!(resolver.describe("cluster-tmc", Some(Target::MissionControl)).await.is_err());

    let second_pass = resolver.delete_plugin("all", Some(Target::MissionControl), true).await;
    assert!(
        matches!(second_pass, Err(plugin_manager::Error::NoInstalledPluginsMatch)),
        "expected NoInstalledPluginsMatch, got {second_pass:?}"
    );
}
