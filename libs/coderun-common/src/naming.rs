use crate::types::Language;
use std::path::{Path, PathBuf};

/// Docker naming semantics - defines only naming, not runtime logic
/// Keeps image tags, build recipes and container names deterministic so the
/// API, the CLI and the provisioner never drift apart

pub const IMAGE_PREFIX: &str = "coderun";
pub const IMAGE_VERSION: &str = "v1";
pub const WORKSPACE_PREFIX: &str = "exec";

/// Deterministic sandbox image tag for a language
pub fn image_tag(language: &Language) -> String {
    format!("{}-{}:{}", IMAGE_PREFIX, language, IMAGE_VERSION)
}

/// Build context directory for a language's sandbox image
pub fn recipe_dir(dockerfiles_dir: &Path, language: &Language) -> PathBuf {
    dockerfiles_dir.join(language.id())
}

/// Dockerfile path for a language's sandbox image
pub fn dockerfile_path(dockerfiles_dir: &Path, language: &Language) -> PathBuf {
    recipe_dir(dockerfiles_dir, language).join("Dockerfile")
}

/// Directory name for one execution's workspace
pub fn workspace_dir_name(id: &uuid::Uuid) -> String {
    format!("{}-{}", WORKSPACE_PREFIX, id)
}

/// Container name for one phase (compile/run) of one execution
pub fn container_name(workspace_id: &uuid::Uuid, phase: &str) -> String {
    format!("{}-{}-{}", IMAGE_PREFIX, workspace_id, phase)
}
