// CLI commands for running code and managing sandbox images
use anyhow::{bail, Context, Result};
use coderun_common::{language, naming, Config, ExecutionRequest, Language};
use coderun_engine::Executor;
use std::fs;
use std::path::Path;

/// Build an execution request from a source file and an optional stdin file
fn load_request(language: &str, file: &Path, stdin: Option<&Path>) -> Result<ExecutionRequest> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file {}", file.display()))?;

    let mut request = ExecutionRequest::new(language, code);
    if let Some(path) = stdin {
        let input = fs::read_to_string(path)
            .with_context(|| format!("Failed to read stdin file {}", path.display()))?;
        request = request.with_stdin(input);
    }

    Ok(request)
}

fn parse_language(name: &str) -> Result<Language> {
    Ok(name.parse::<Language>()?)
}

/// Execute one program and print the result as JSON
pub async fn run(language: &str, file: &Path, stdin: Option<&Path>) -> Result<()> {
    let request = load_request(language, file, stdin)?;
    let executor = Executor::with_docker(Config::from_env())
        .context("Failed to connect to Docker. Is it installed and running?")?;

    let result = executor.execute(&request).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(message) = &result.system_error {
        bail!("Execution failed: {}", message);
    }

    Ok(())
}

/// List all supported languages
pub async fn list_languages() -> Result<()> {
    println!("📋 Supported Languages:\n");
    println!(
        "{:<12} {:<10} {:<10} {:<24} {:<30}",
        "Name", "Ext", "Compiled", "Image", "Run"
    );
    println!("{}", "─".repeat(90));

    for l in Language::all_variants() {
        let profile = language::profile(*l);
        println!(
            "{:<12} {:<10} {:<10} {:<24} {:<30}",
            l.id(),
            profile.file_extension,
            if profile.is_compiled() { "yes" } else { "no" },
            profile.image_tag(),
            profile.run_argv().join(" ")
        );
    }

    println!("\n✅ Total: {} language(s)", Language::all_variants().len());

    Ok(())
}

/// Build the sandbox image for one language
pub async fn build_image(name: &str, force: bool) -> Result<()> {
    let language = parse_language(name)?;
    let config = Config::from_env();
    let executor =
        Executor::with_docker(config).context("Failed to connect to Docker. Is it installed and running?")?;

    build_one(&executor, language, force).await
}

/// Build the sandbox image for every language, one after another
pub async fn build_images(force: bool) -> Result<()> {
    let executor = Executor::with_docker(Config::from_env())
        .context("Failed to connect to Docker. Is it installed and running?")?;

    let mut failed = Vec::new();
    for language in Language::all_variants() {
        if let Err(e) = build_one(&executor, *language, force).await {
            eprintln!("❌ {}: {:#}", language, e);
            failed.push(language.id());
        }
    }

    if !failed.is_empty() {
        bail!("Failed to build images for: {}", failed.join(", "));
    }

    println!("\n✅ All {} images ready", Language::all_variants().len());
    Ok(())
}

async fn build_one(executor: &Executor, language: Language, force: bool) -> Result<()> {
    let provisioner = executor.provisioner();
    let tag = naming::image_tag(&language);
    let dockerfile = naming::dockerfile_path(provisioner.dockerfiles_dir(), &language);

    println!("🐳 {} → {}", language, tag);
    println!("📄 Dockerfile: {}", dockerfile.display());

    if force {
        provisioner.rebuild(language).await?;
    } else {
        provisioner.ensure(language).await?;
    }

    println!("✅ {} ready", tag);
    Ok(())
}
