/// Image Provisioner - lazy, single-flight sandbox image builds
///
/// The first execution for a language makes sure its image exists, building
/// it from `<dockerfiles>/<language>/Dockerfile` when it doesn't. Concurrent
/// first uses of the same tag share one check-and-build: every caller gets the
/// same `OnceCell` for the tag and waits on whichever caller is initializing
/// it. A successful result is remembered for the lifetime of the process.
///
/// A failed build is not remembered and is never retried here; the error goes
/// back to the caller and the next request for the tag starts over.

use crate::error::Result;
use crate::isolation::Isolation;
use coderun_common::{naming, Language};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

pub struct ImageProvisioner {
    isolation: Arc<dyn Isolation>,
    dockerfiles_dir: PathBuf,
    ready: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl ImageProvisioner {
    pub fn new(isolation: Arc<dyn Isolation>, dockerfiles_dir: impl Into<PathBuf>) -> Self {
        Self {
            isolation,
            dockerfiles_dir: dockerfiles_dir.into(),
            ready: Mutex::new(HashMap::new()),
        }
    }

    pub fn dockerfiles_dir(&self) -> &Path {
        &self.dockerfiles_dir
    }

    /// Make sure the sandbox image for `language` exists
    pub async fn ensure(&self, language: Language) -> Result<()> {
        let tag = naming::image_tag(&language);

        // The map lock is only held long enough to fetch the tag's cell
        let cell = {
            let mut ready = self.ready.lock().await;
            ready.entry(tag.clone()).or_default().clone()
        };

        cell.get_or_try_init(|| self.check_or_build(language, &tag))
            .await
            .map(|_| ())
    }

    /// Build the image even if it already exists, then mark it ready
    pub async fn rebuild(&self, language: Language) -> Result<()> {
        let tag = naming::image_tag(&language);
        self.build(language, &tag).await?;

        let cell = {
            let mut ready = self.ready.lock().await;
            ready.entry(tag).or_default().clone()
        };
        // Already-initialized cells keep their value
        let _ = cell.set(());
        Ok(())
    }

    async fn check_or_build(&self, language: Language, tag: &str) -> Result<()> {
        if self.isolation.image_exists(tag).await? {
            debug!(image = tag, "sandbox image present");
            return Ok(());
        }

        info!(image = tag, language = %language, "sandbox image missing, building");
        self.build(language, tag).await
    }

    async fn build(&self, language: Language, tag: &str) -> Result<()> {
        let dockerfile = naming::dockerfile_path(&self.dockerfiles_dir, &language);
        let context = naming::recipe_dir(&self.dockerfiles_dir, &language);
        self.isolation.build_image(tag, &dockerfile, &context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedIsolation;
    use std::time::Duration;

    #[tokio::test]
    async fn test_existing_image_is_not_built() {
        let isolation = Arc::new(ScriptedIsolation::new().with_image("coderun-python:v1"));
        let provisioner = ImageProvisioner::new(isolation.clone(), "dockerfiles");

        provisioner.ensure(Language::Python).await.unwrap();

        assert_eq!(isolation.build_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_image_is_built_once() {
        let isolation = Arc::new(ScriptedIsolation::new());
        let provisioner = ImageProvisioner::new(isolation.clone(), "dockerfiles");

        provisioner.ensure(Language::Rust).await.unwrap();
        provisioner.ensure(Language::Rust).await.unwrap();

        assert_eq!(isolation.build_count(), 1);
        assert_eq!(
            isolation.built_recipes(),
            vec![PathBuf::from("dockerfiles/rust/Dockerfile")]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_builds_once() {
        let isolation =
            Arc::new(ScriptedIsolation::new().with_build_delay(Duration::from_millis(100)));
        let provisioner = Arc::new(ImageProvisioner::new(isolation.clone(), "dockerfiles"));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provisioner = provisioner.clone();
                tokio::spawn(async move { provisioner.ensure(Language::Haskell).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(isolation.build_count(), 1);
    }

    #[tokio::test]
    async fn test_different_languages_build_independently() {
        let isolation = Arc::new(ScriptedIsolation::new());
        let provisioner = ImageProvisioner::new(isolation.clone(), "dockerfiles");

        provisioner.ensure(Language::C).await.unwrap();
        provisioner.ensure(Language::Cpp).await.unwrap();

        assert_eq!(isolation.build_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_build_is_reported_and_not_cached() {
        let isolation = Arc::new(ScriptedIsolation::new().with_failing_builds());
        let provisioner = ImageProvisioner::new(isolation.clone(), "dockerfiles");

        let err = provisioner.ensure(Language::Swift).await.unwrap_err();
        assert!(err.to_string().contains("coderun-swift:v1"));

        assert!(provisioner.ensure(Language::Swift).await.is_err());
        assert_eq!(isolation.build_count(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_forces_build() {
        let isolation = Arc::new(ScriptedIsolation::new().with_image("coderun-go:v1"));
        let provisioner = ImageProvisioner::new(isolation.clone(), "dockerfiles");

        provisioner.rebuild(Language::Go).await.unwrap();
        provisioner.ensure(Language::Go).await.unwrap();

        assert_eq!(isolation.build_count(), 1);
    }
}
