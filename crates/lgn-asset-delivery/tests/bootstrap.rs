mod common;

use std::path::Path;

use common::{sample_manifest, ScriptedPackService};
use lgn_asset_delivery::{
    AssetDeliveryConfig, Bootstrap, BundleToPackEntry, DeliveryType, Manifest, PackError,
    Residency, RuntimeEnvironment,
};

fn player_config(streaming_assets: &Path) -> AssetDeliveryConfig {
    AssetDeliveryConfig {
        streaming_assets_dir: streaming_assets.to_owned(),
        ..AssetDeliveryConfig::default()
    }
}

fn editor_config(project: &Path) -> AssetDeliveryConfig {
    let defaults = AssetDeliveryConfig::default();
    AssetDeliveryConfig {
        environment: RuntimeEnvironment::Editor,
        editor_manifest_paths: defaults
            .editor_manifest_paths
            .iter()
            .map(|path| project.join(path))
            .collect(),
        editor_pack_content_root: project.join(&defaults.editor_pack_content_root),
        ..defaults
    }
}

#[tokio::test]
async fn missing_manifest_disables_asset_packs() {
    let streaming_assets = tempfile::tempdir().unwrap();
    let service = ScriptedPackService::new();

    let delivery = Bootstrap::new(player_config(streaming_assets.path()))
        .run(service.clone())
        .await;

    assert!(delivery.is_degraded());
    assert!(delivery.pack_index().is_none());
    assert!(delivery.subscribe_to_pack_events().is_none());
    assert_eq!(
        delivery.resolve_bundle_location("tex_atlas.bundle"),
        "tex_atlas.bundle"
    );
    assert_eq!(
        delivery.ensure_pack_resident("tex_atlas.bundle").await,
        Ok(Residency::NotOwned)
    );
    assert_eq!(service.download_requests(), 0);
}

#[tokio::test]
async fn corrupt_manifest_disables_asset_packs() {
    let streaming_assets = tempfile::tempdir().unwrap();
    let config = AssetDeliveryConfig {
        log_warnings: false,
        ..player_config(streaming_assets.path())
    };
    std::fs::write(config.player_manifest_path(), "{\"Entries\": [").unwrap();

    let delivery = Bootstrap::new(config)
        .run(ScriptedPackService::new())
        .await;

    assert!(delivery.is_degraded());
    assert_eq!(
        delivery.location_resolver().resolve("ui.bundle"),
        "ui.bundle"
    );
}

#[tokio::test]
async fn duplicate_bundle_ownership_disables_asset_packs() {
    let streaming_assets = tempfile::tempdir().unwrap();
    let config = player_config(streaming_assets.path());
    let manifest = Manifest::new(vec![
        BundleToPackEntry::new("Gfx", DeliveryType::FastFollow, ["tex_atlas"]),
        BundleToPackEntry::new("Extra", DeliveryType::OnDemand, ["tex_atlas"]),
    ]);
    std::fs::write(
        config.player_manifest_path(),
        manifest.to_json_pretty().unwrap(),
    )
    .unwrap();

    let delivery = Bootstrap::new(config)
        .run(ScriptedPackService::new())
        .await;

    assert!(delivery.is_degraded());
}

#[tokio::test]
async fn probing_can_be_disabled() {
    let streaming_assets = tempfile::tempdir().unwrap();
    let config = AssetDeliveryConfig {
        probe_resident_packs: false,
        ..player_config(streaming_assets.path())
    };
    std::fs::write(
        config.player_manifest_path(),
        sample_manifest().to_json_pretty().unwrap(),
    )
    .unwrap();
    let service = ScriptedPackService::new().with_location("Base", "/data/packs/Base");

    let delivery = Bootstrap::new(config).run(service.clone()).await;

    let index = delivery.pack_index().unwrap();
    assert!(!index.is_resolved("Base"));
    assert_eq!(
        delivery.resolve_bundle_location("core_shaders.bundle"),
        "core_shaders.bundle"
    );

    // Found on first use instead.
    assert_eq!(
        delivery.ensure_pack_resident("core_shaders.bundle").await,
        Ok(Residency::Resident {
            pack_name: "Base".to_owned(),
            path: "/data/packs/Base".into(),
        })
    );
    assert!(index.is_resolved("Base"));
    assert_eq!(service.download_requests(), 0);
}

#[tokio::test]
async fn editor_falls_back_to_streaming_assets_manifest() {
    let project = tempfile::tempdir().unwrap();
    let config = editor_config(project.path());

    let fallback = &config.editor_manifest_paths[1];
    std::fs::create_dir_all(fallback.parent().unwrap()).unwrap();
    std::fs::write(fallback, sample_manifest().to_json_pretty().unwrap()).unwrap();

    // Only the Gfx pack has been built.
    let gfx_root = config
        .editor_pack_content_root
        .join("Gfx.androidpack")
        .join("src/main/assets");
    std::fs::create_dir_all(&gfx_root).unwrap();

    // The platform service is not used in the editor.
    let unused = ScriptedPackService::new();
    let delivery = Bootstrap::new(config).run(unused.clone()).await;
    assert!(!delivery.is_degraded());

    assert_eq!(
        delivery.ensure_pack_resident("tex_atlas.bundle").await,
        Ok(Residency::Resident {
            pack_name: "Gfx".to_owned(),
            path: gfx_root.clone(),
        })
    );
    assert_eq!(
        delivery.ensure_pack_resident("music.bundle").await,
        Err(PackError::PackUnknown {
            pack_name: "Audio".to_owned()
        })
    );
    assert_eq!(
        Path::new(&delivery.resolve_bundle_location("tex_atlas.bundle")),
        gfx_root.join("Android").join("tex_atlas.bundle")
    );
    assert_eq!(
        delivery.resolve_bundle_location("unpacked.bundle"),
        "unpacked.bundle"
    );
    assert_eq!(unused.download_requests(), 0);
}

#[tokio::test]
async fn editor_prefers_build_output_manifest() {
    let project = tempfile::tempdir().unwrap();
    let config = editor_config(project.path());

    let build_output = Manifest::new(vec![BundleToPackEntry::new(
        "Levels",
        DeliveryType::OnDemand,
        ["level_1"],
    )]);
    for (path, manifest) in config
        .editor_manifest_paths
        .iter()
        .zip([build_output, sample_manifest()])
    {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, manifest.to_json_pretty().unwrap()).unwrap();
    }

    let delivery = Bootstrap::new(config)
        .run(ScriptedPackService::new())
        .await;

    let index = delivery.pack_index().unwrap();
    assert!(index.pack("Levels").is_some());
    assert!(index.pack("Gfx").is_none());
}
