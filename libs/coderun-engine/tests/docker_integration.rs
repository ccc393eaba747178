//! End-to-end tests against a real Docker daemon.
//!
//! Ignored by default; run with `cargo test -p coderun-engine -- --ignored`.
//! The first run builds every sandbox image and takes a while.

use coderun_common::{Config, ExecutionRequest};
use coderun_engine::{ExecError, Executor};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn dockerfiles_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../dockerfiles")
}

fn executor(scratch: &Path) -> Executor {
    let config = Config {
        scratch_root: scratch.to_path_buf(),
        dockerfiles_dir: dockerfiles_dir(),
        run_timeout_ms: 5_000,
        compile_timeout_ms: 60_000,
        memory_limit_mb: 128,
        ..Config::default()
    };
    Executor::with_docker(config).expect("docker daemon reachable")
}

fn assert_no_workspaces(scratch: &Path) {
    let leftover = std::fs::read_dir(scratch).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftover, 0, "workspace directories leaked");
}

const HELLO: &[(&str, &str)] = &[
    ("javascript", "console.log('Hello, World!');"),
    ("python", "print('Hello, World!')"),
    ("c", "#include <stdio.h>\nint main() { printf(\"Hello, World!\\n\"); return 0; }"),
    (
        "cpp",
        "#include <iostream>\nint main() { std::cout << \"Hello, World!\" << std::endl; }",
    ),
    (
        "java",
        "public class Main { public static void main(String[] a) { System.out.println(\"Hello, World!\"); } }",
    ),
    (
        "go",
        "package main\nimport \"fmt\"\nfunc main() { fmt.Println(\"Hello, World!\") }",
    ),
    ("rust", "fn main() { println!(\"Hello, World!\"); }"),
    ("ruby", "puts 'Hello, World!'"),
    ("php", "<?php echo \"Hello, World!\\n\";"),
    ("perl", "print \"Hello, World!\\n\";"),
    ("swift", "print(\"Hello, World!\")"),
    ("haskell", "main = putStrLn \"Hello, World!\""),
    ("r", "cat('Hello, World!\\n')"),
];

const ECHO: &[(&str, &str)] = &[
    ("python", "import sys\nsys.stdout.write(sys.stdin.read())"),
    ("javascript", "process.stdin.pipe(process.stdout);"),
    ("ruby", "STDOUT.write(STDIN.read)"),
    (
        "c",
        "#include <stdio.h>\nint main() { int c; while ((c = getchar()) != EOF) putchar(c); return 0; }",
    ),
    ("perl", "print while <STDIN>;"),
    (
        "cpp",
        "#include <iostream>\nint main() { std::cout << std::cin.rdbuf(); }",
    ),
    (
        "java",
        "public class Main { public static void main(String[] a) throws Exception { System.out.write(System.in.readAllBytes()); System.out.flush(); } }",
    ),
    (
        "go",
        "package main\nimport (\n\"io\"\n\"os\"\n)\nfunc main() { io.Copy(os.Stdout, os.Stdin) }",
    ),
    (
        "rust",
        "use std::io::{self, Read, Write};\nfn main() { let mut s = Vec::new(); io::stdin().read_to_end(&mut s).unwrap(); io::stdout().write_all(&s).unwrap(); }",
    ),
    ("php", "<?php echo stream_get_contents(STDIN);"),
    (
        "swift",
        "while let line = readLine(strippingNewline: false) { print(line, terminator: \"\") }",
    ),
    ("haskell", "main = interact id"),
    ("r", "writeLines(readLines(file('stdin')))"),
];

#[test]
fn every_language_has_hello_and_echo_programs() {
    for language in coderun_common::Language::all_variants() {
        assert!(
            HELLO.iter().any(|(id, _)| *id == language.id()),
            "no hello program for {}",
            language
        );
        assert!(
            ECHO.iter().any(|(id, _)| *id == language.id()),
            "no echo program for {}",
            language
        );
    }
}

#[tokio::test]
#[ignore]
async fn hello_world_in_every_language() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());

    for (language, code) in HELLO {
        let result = executor
            .execute(&ExecutionRequest::new(*language, *code))
            .await
            .unwrap();

        assert!(
            result.system_error.is_none(),
            "{}: {:?}",
            language,
            result.system_error
        );
        assert_eq!(
            result.stdout.as_deref().map(str::trim_end),
            Some("Hello, World!"),
            "{}: stderr {:?}",
            language,
            result.stderr
        );
        assert_eq!(result.exit_code, Some(0), "{}", language);
        assert_no_workspaces(scratch.path());
    }
}

#[tokio::test]
#[ignore]
async fn stdin_is_echoed_byte_for_byte() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());
    let input = "first line\nsecond line\n  spaced  \n";

    for (language, code) in ECHO {
        let result = executor
            .execute(&ExecutionRequest::new(*language, *code).with_stdin(input))
            .await
            .unwrap();

        assert!(
            result.system_error.is_none(),
            "{}: {:?}",
            language,
            result.system_error
        );
        assert_eq!(
            result.stdout.as_deref(),
            Some(input),
            "{}: stderr {:?}",
            language,
            result.stderr
        );
    }
    assert_no_workspaces(scratch.path());
}

#[tokio::test]
#[ignore]
async fn compile_error_reports_diagnostics() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());

    let result = executor
        .execute(&ExecutionRequest::new("c", "int main() { return 0 }"))
        .await
        .unwrap();

    assert!(result.system_error.is_none());
    assert_eq!(result.stdout, None);
    assert!(!result.stderr.unwrap_or_default().is_empty());
    assert_ne!(result.exit_code, Some(0));
    assert_no_workspaces(scratch.path());
}

#[tokio::test]
#[ignore]
async fn infinite_loop_is_killed_at_deadline() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());

    // Warm the image so the timing below only covers the run
    executor
        .execute(&ExecutionRequest::new("python", "pass"))
        .await
        .unwrap();

    let started = Instant::now();
    let result = executor
        .execute(&ExecutionRequest::new(
            "python",
            "print('before', flush=True)\nwhile True:\n    pass",
        ))
        .await
        .unwrap();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.stdout.as_deref(), Some("before\n"));
    assert!(started.elapsed() < Duration::from_secs(5 + 10));
    assert_no_workspaces(scratch.path());
}

#[tokio::test]
#[ignore]
async fn memory_hog_is_flagged() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());

    let result = executor
        .execute(&ExecutionRequest::new(
            "python",
            "chunks = []\nwhile True:\n    chunks.append(bytearray(16 * 1024 * 1024))",
        ))
        .await
        .unwrap();

    assert!(result.exceeded_memory, "{:?}", result);
    assert!(result.system_error.is_none());
    assert_no_workspaces(scratch.path());
}

#[tokio::test]
#[ignore]
async fn runtime_error_is_an_ordinary_result() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());

    let result = executor
        .execute(&ExecutionRequest::new("python", "raise ValueError('boom')"))
        .await
        .unwrap();

    assert!(result.system_error.is_none());
    assert_eq!(result.exit_code, Some(1));
    assert!(result.stderr.unwrap().contains("ValueError: boom"));
}

#[tokio::test]
#[ignore]
async fn unsupported_language_is_rejected() {
    let scratch = tempfile::tempdir().unwrap();
    let executor = executor(scratch.path());

    let err = executor
        .execute(&ExecutionRequest::new("fortran", "PRINT *, 'hi'"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::UnsupportedLanguage(_)));
    assert_no_workspaces(scratch.path());
}
