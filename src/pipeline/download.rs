//! Pipeline selection: pattern construction, format fallback and
//! completeness verification.

use super::types::{DownloadOptions, ModelIndex};
use crate::error::{HubError, Result};
use crate::{Client, DownloadParams, Repo};
use futures::future::BoxFuture;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Weight formats in order of preference.
const WEIGHT_FORMATS: &[&str] = &[".safetensors", ".ckpt", ".bin"];

/// Weight file base names used across the ecosystem.
const WEIGHT_BASE_NAMES: &[&str] = &["diffusion_pytorch_model", "model", "pytorch_model"];

/// Canonical five-digit shard suffix, e.g. `-00001-of-00005`.
const SHARD_SUFFIX: &str = "-[0-9][0-9][0-9][0-9][0-9]-of-[0-9][0-9][0-9][0-9][0-9]";

/// Components that carry no weights of their own and are skipped by
/// completeness verification.
const UNWEIGHTED_COMPONENTS: &[&str] = &[
    "scheduler",
    "feature_extractor",
    "safety_checker",
    "image_encoder",
];

fn is_unweighted_component(name: &str) -> bool {
    name.starts_with("tokenizer") || UNWEIGHTED_COMPONENTS.contains(&name)
}

/// Downloader for multi-component pipeline repositories.
pub struct PipelineDownloader {
    client: Client,
}

impl PipelineDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Materialize a pipeline snapshot for a repo, trying weight
    /// formats in preference order (or `.safetensors` only), and
    /// recursing into connected sub-pipelines with the same variant.
    ///
    /// Returns the snapshot root path.
    ///
    /// Boxed because this recurses into itself (via
    /// `download_connected`) to materialize connected sub-pipelines;
    /// an `async fn` cannot describe its own return type recursively.
    pub fn download<'a>(
        &'a self,
        repo_id: &'a str,
        variant: Option<&'a str>,
        opts: Option<DownloadOptions>,
    ) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let opts = opts.unwrap_or_default();

            let index_params = DownloadParams {
                repo: Repo::model(repo_id),
                filename: Some("model_index.json".to_string()),
                ..Default::default()
            };
            let index_path = self.client.download(&index_params).await?;

            let data = tokio::fs::read(&index_path)
                .await
                .map_err(|e| HubError::io_with_path(e, &index_path))?;
            let index: ModelIndex = serde_json::from_slice(&data)?;

            info!(
                "pipeline {} has {} components",
                repo_id,
                index.components.len()
            );

            if opts.use_safetensors {
                return self
                    .try_format(repo_id, &index, variant, ".safetensors")
                    .await
                    .map_err(|e| HubError::NoCompatibleFormat {
                        message: format!("safetensors required but not available: {}", e),
                    });
            }

            let mut last_error = None;
            for format in WEIGHT_FORMATS {
                match self.try_format(repo_id, &index, variant, format).await {
                    Ok(snapshot) => return Ok(snapshot),
                    Err(e) => {
                        debug!("format {} unavailable for {}: {}", format, repo_id, e);
                        last_error = Some(e);
                    }
                }
            }

            Err(HubError::NoCompatibleFormat {
                message: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no weight formats attempted".to_string()),
            })
        })
    }

    async fn try_format(
        &self,
        repo_id: &str,
        index: &ModelIndex,
        variant: Option<&str>,
        format: &str,
    ) -> Result<PathBuf> {
        let patterns = build_download_patterns(index, variant, format);

        let params = DownloadParams {
            repo: Repo::model(repo_id),
            allow_patterns: patterns,
            ..Default::default()
        };
        let snapshot = self.client.download(&params).await?;

        verify_components(&snapshot, index, variant, format)?;

        self.download_connected(index, variant).await?;

        Ok(snapshot)
    }

    async fn download_connected(&self, index: &ModelIndex, variant: Option<&str>) -> Result<()> {
        for connected in &index.connected_pipes {
            info!("downloading connected pipeline {}", connected);
            let fut: BoxFuture<'_, Result<PathBuf>> =
                Box::pin(self.download(connected, variant, None));
            fut.await.map_err(|e| {
                warn!("connected pipeline {} failed: {}", connected, e);
                e
            })?;
        }
        Ok(())
    }
}

/// Build the allow-pattern set for one (variant, format) attempt.
fn build_download_patterns(
    index: &ModelIndex,
    variant: Option<&str>,
    format: &str,
) -> Vec<String> {
    let mut patterns = Vec::new();

    for component in index.components.keys() {
        // Component configuration always comes along.
        patterns.push(format!("{}/*.json", component));

        // Tokenizers and schedulers are small and have bespoke file
        // sets; take the whole directory.
        if component.contains("tokenizer") || component.contains("scheduler") {
            patterns.push(format!("{}/*", component));
            continue;
        }

        for base in WEIGHT_BASE_NAMES {
            match variant {
                None => {
                    patterns.push(format!("{}/{}{}", component, base, format));
                    patterns.push(format!("{}/{}{}{}", component, base, SHARD_SUFFIX, format));
                }
                Some(variant) => {
                    patterns.push(format!("{}/{}.{}{}", component, base, variant, format));
                    patterns.push(format!(
                        "{}/{}.{}{}{}",
                        component, base, variant, SHARD_SUFFIX, format
                    ));
                    // Deprecated shard naming put the variant after the
                    // shard counter.
                    patterns.push(format!(
                        "{}/{}{}.{}{}",
                        component, base, SHARD_SUFFIX, variant, format
                    ));
                }
            }
        }
    }

    patterns
}

/// Require a weight file in every component that carries weights.
fn verify_components(
    snapshot: &Path,
    index: &ModelIndex,
    variant: Option<&str>,
    format: &str,
) -> Result<()> {
    let pattern = match variant {
        Some(variant) => format!("*.{}{}", variant, format),
        None => format!("*{}", format),
    };
    let matcher = Pattern::new(&pattern).map_err(|e| HubError::Config {
        message: format!("invalid weight pattern {}: {}", pattern, e),
    })?;

    let mut missing = Vec::new();

    for component in index.components.keys() {
        if is_unweighted_component(component) {
            continue;
        }

        let dir = snapshot.join(component);
        let has_weights = std::fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .any(|entry| matcher.matches(&entry.file_name().to_string_lossy()))
            })
            .unwrap_or(false);

        if !has_weights {
            missing.push(component.clone());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HubError::MissingWeights {
            format: format.to_string(),
            components: missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn index_with(components: &[&str]) -> ModelIndex {
        let mut map = BTreeMap::new();
        for name in components {
            map.insert(
                name.to_string(),
                vec!["diffusers".to_string(), "SomeClass".to_string()],
            );
        }
        ModelIndex {
            components: map,
            ..Default::default()
        }
    }

    #[test]
    fn test_patterns_without_variant() {
        let index = index_with(&["unet"]);
        let patterns = build_download_patterns(&index, None, ".safetensors");

        assert!(patterns.contains(&"unet/*.json".to_string()));
        assert!(patterns.contains(&"unet/diffusion_pytorch_model.safetensors".to_string()));
        assert!(patterns.contains(&format!(
            "unet/diffusion_pytorch_model{}.safetensors",
            SHARD_SUFFIX
        )));
        // No variant means no dotted-variant patterns.
        assert!(!patterns.iter().any(|p| p.contains(".fp16")));
    }

    #[test]
    fn test_patterns_with_variant_include_deprecated_shards() {
        let index = index_with(&["unet"]);
        let patterns = build_download_patterns(&index, Some("fp16"), ".safetensors");

        assert!(patterns.contains(&"unet/diffusion_pytorch_model.fp16.safetensors".to_string()));
        assert!(patterns.contains(&format!(
            "unet/diffusion_pytorch_model.fp16{}.safetensors",
            SHARD_SUFFIX
        )));
        assert!(patterns.contains(&format!(
            "unet/diffusion_pytorch_model{}.fp16.safetensors",
            SHARD_SUFFIX
        )));
    }

    #[test]
    fn test_patterns_tokenizer_and_scheduler_take_everything() {
        let index = index_with(&["tokenizer", "scheduler"]);
        let patterns = build_download_patterns(&index, None, ".bin");

        assert!(patterns.contains(&"tokenizer/*".to_string()));
        assert!(patterns.contains(&"scheduler/*".to_string()));
        assert!(!patterns.iter().any(|p| p.contains("pytorch_model")));
    }

    #[test]
    fn test_verify_accepts_complete_snapshot() {
        let temp = TempDir::new().unwrap();
        let index = index_with(&["unet", "vae", "scheduler", "tokenizer"]);

        for component in ["unet", "vae"] {
            let dir = temp.path().join(component);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("diffusion_pytorch_model.fp16.safetensors"), b"w").unwrap();
        }
        // scheduler/tokenizer have no weights and are not verified.
        fs::create_dir_all(temp.path().join("scheduler")).unwrap();

        verify_components(temp.path(), &index, Some("fp16"), ".safetensors").unwrap();
    }

    #[test]
    fn test_verify_reports_missing_component() {
        let temp = TempDir::new().unwrap();
        let index = index_with(&["unet", "vae"]);

        let unet = temp.path().join("unet");
        fs::create_dir_all(&unet).unwrap();
        fs::write(unet.join("diffusion_pytorch_model.fp16.safetensors"), b"w").unwrap();
        // vae has a file in the wrong variant.
        let vae = temp.path().join("vae");
        fs::create_dir_all(&vae).unwrap();
        fs::write(vae.join("diffusion_pytorch_model.safetensors"), b"w").unwrap();

        let err = verify_components(temp.path(), &index, Some("fp16"), ".safetensors").unwrap_err();
        match err {
            HubError::MissingWeights { format, components } => {
                assert_eq!(format, ".safetensors");
                assert_eq!(components, vec!["vae".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_verify_without_variant_matches_plain_weights() {
        let temp = TempDir::new().unwrap();
        let index = index_with(&["unet"]);

        let unet = temp.path().join("unet");
        fs::create_dir_all(&unet).unwrap();
        fs::write(unet.join("model-00001-of-00002.ckpt"), b"w").unwrap();

        verify_components(temp.path(), &index, None, ".ckpt").unwrap();
    }
}
