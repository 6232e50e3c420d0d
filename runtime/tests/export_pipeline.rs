//! End-to-end build over OCI image layouts on disk.

use std::fs;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use layerforge_core::config::ForgeConfig;
use layerforge_core::error::ForgeError;
use layerforge_runtime::{list_layer_entries, BuildPipeline, EntryKind, LayoutEngine};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

fn gzip_layer(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn write_blob(root: &Path, data: &[u8]) -> String {
    let hex = hex::encode(Sha256::digest(data));
    fs::write(root.join("blobs/sha256").join(&hex), data).unwrap();
    format!("sha256:{}", hex)
}

/// Write an OCI image layout and return the layer digests.
fn write_layout(root: &Path, layers: &[Vec<u8>]) -> Vec<String> {
    fs::create_dir_all(root.join("blobs/sha256")).unwrap();
    fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

    let config = br#"{"architecture":"amd64","os":"linux","config":{"Cmd":["/app"]},"rootfs":{"type":"layers","diff_ids":[]}}"#;
    let config_digest = write_blob(root, config);

    let digests: Vec<String> = layers.iter().map(|l| write_blob(root, l)).collect();
    let descriptors: Vec<serde_json::Value> = digests
        .iter()
        .zip(layers)
        .map(|(digest, data)| {
            serde_json::json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": digest,
                "size": data.len()
            })
        })
        .collect();

    let manifest = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config_digest,
            "size": config.len()
        },
        "layers": descriptors
    }))
    .unwrap();
    let manifest_digest = write_blob(root, &manifest);

    let index = serde_json::json!({
        "schemaVersion": 2,
        "manifests": [{
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": manifest_digest,
            "size": manifest.len()
        }]
    });
    fs::write(root.join("index.json"), index.to_string()).unwrap();
    digests
}

struct Fixture {
    tmp: TempDir,
    layer_digests: Vec<String>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let context = tmp.path().join("context");
        fs::create_dir_all(&context).unwrap();
        fs::write(
            context.join("Dockerfile"),
            "ARG ALPINE=3.19\n\
             FROM alpine:${ALPINE} AS base\n\
             RUN apk add curl\n\
             \n\
             FROM base AS release\n\
             COPY app /app\n",
        )
        .unwrap();

        let base_layer = gzip_layer(&[("etc/alpine-release", b"3.19.1\n")]);
        write_layout(
            &tmp.path().join("base-images/alpine_3.19"),
            &[base_layer.clone()],
        );

        let app_layer = gzip_layer(&[("app", b"#!/bin/sh\necho hi\n")]);
        let layer_digests = write_layout(&tmp.path().join("built"), &[base_layer, app_layer]);

        Self { tmp, layer_digests }
    }

    fn config(&self) -> ForgeConfig {
        let root = self.tmp.path();
        ForgeConfig {
            context_dir: root.join("context"),
            output_dir: root.join("kaniko"),
            cache_dir: root.join("cache"),
            image_layout: root.join("built"),
            base_images_dir: Some(root.join("base-images")),
            verify_digests: true,
            ..Default::default()
        }
    }
}

#[tokio::test]
async fn test_build_exports_and_materializes() {
    let fixture = Fixture::new();
    let config = fixture.config();

    let report = BuildPipeline::new(LayoutEngine::new(), config.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.target.name, "release");
    assert_eq!(report.plan.retained(), vec![0]);
    assert_eq!(report.plan.dependency_chain(1), vec![1, 0]);
    assert_eq!(report.export.layer_count(), 2);
    assert!(report.cache.is_complete());

    // Output directory: config and layers
    let config_json: serde_json::Value =
        serde_json::from_slice(&fs::read(config.output_dir.join("config.json")).unwrap()).unwrap();
    assert_eq!(config_json["config"]["Cmd"][0], "/app");
    for digest in &fixture.layer_digests {
        assert!(config.output_dir.join(format!("{}.tgz", digest)).exists());
    }

    // Cache directory: manifest plus the mirrored output tree
    let manifest: serde_json::Value =
        serde_json::from_slice(&fs::read(config.cache_dir.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["layers"].as_array().unwrap().len(), 2);
    assert_eq!(
        fs::read(config.output_dir.join("config.json")).unwrap(),
        fs::read(config.cache_dir.join("config.json")).unwrap()
    );

    let app_layer = config
        .cache_dir
        .join(format!("{}.tgz", fixture.layer_digests[1]));
    let entries = list_layer_entries(&app_layer).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, Path::new("app"));
    assert_eq!(entries[0].kind, EntryKind::File);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let fixture = Fixture::new();
    let config = fixture.config();

    BuildPipeline::new(LayoutEngine::new(), config.clone())
        .run()
        .await
        .unwrap();
    let first = fs::read(config.output_dir.join("config.json")).unwrap();

    BuildPipeline::new(LayoutEngine::new(), config.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(fs::read(config.output_dir.join("config.json")).unwrap(), first);
}

#[tokio::test]
async fn test_build_intermediate_target() {
    let fixture = Fixture::new();
    let config = ForgeConfig {
        target: Some("base".to_string()),
        ..fixture.config()
    };

    let report = BuildPipeline::new(LayoutEngine::new(), config)
        .run()
        .await
        .unwrap();
    assert_eq!(report.target.index, 0);
    assert_eq!(report.plan.stages.len(), 1);
}

#[tokio::test]
async fn test_unknown_target_fails_before_output() {
    let fixture = Fixture::new();
    let config = ForgeConfig {
        target: Some("debug".to_string()),
        ..fixture.config()
    };

    let err = BuildPipeline::new(LayoutEngine::new(), config.clone())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::InvalidTarget { .. }));
    assert!(!config.output_dir.exists());
}

#[tokio::test]
async fn test_missing_base_image_fails() {
    let fixture = Fixture::new();
    fs::remove_dir_all(fixture.tmp.path().join("base-images/alpine_3.19")).unwrap();

    let err = BuildPipeline::new(LayoutEngine::new(), fixture.config())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::BuildFailure(_)));
}

#[tokio::test]
async fn test_build_arg_overrides_base_reference() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config
        .build_args
        .insert("ALPINE".to_string(), "3.20".to_string());

    // No layout for alpine:3.20
    let err = BuildPipeline::new(LayoutEngine::new(), config)
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("alpine:3.20"));
}
