/// Result Assembler - Sandbox-Agnostic Normalization
///
/// **Core Responsibility:**
/// Turn a raw run outcome into the uniform `ExecutionResult` record.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about language runtimes
/// - Pure function: RawRunOutcome → ExecutionResult, never panics
///
/// **Normalization Rules:**
/// - Captured bytes are decoded as UTF-8, invalid sequences replaced
/// - A timed-out run has no exit code
/// - `exceeded_memory` mirrors the isolation layer's OOM flag
/// - Truncation of either stream sets `output_truncated`
/// - A failed compile keeps the compiler's diagnostics and exit code

use crate::runner::RawRunOutcome;
use crate::workspace::Capture;
use coderun_common::ExecutionResult;

fn decode(capture: Option<&Capture>) -> Option<String> {
    capture.map(|c| String::from_utf8_lossy(&c.bytes).into_owned())
}

fn truncated(capture: Option<&Capture>) -> bool {
    capture.map_or(false, |c| c.truncated)
}

pub fn assemble(raw: RawRunOutcome) -> ExecutionResult {
    let stdout = raw.stdout.as_ref();
    let stderr = raw.stderr.as_ref();

    ExecutionResult {
        stdout: decode(stdout),
        stderr: decode(stderr),
        timed_out: raw.timed_out,
        exceeded_memory: raw.oom_killed,
        exit_code: if raw.timed_out { None } else { raw.exit_code },
        system_error: raw.system_error,
        output_truncated: truncated(stdout) || truncated(stderr),
        execution_time_ms: raw.elapsed.as_millis().min(u64::MAX as u128) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn capture(text: &str) -> Option<Capture> {
        Some(Capture {
            bytes: text.as_bytes().to_vec(),
            truncated: false,
        })
    }

    #[test]
    fn test_successful_run() {
        let raw = RawRunOutcome {
            exit_code: Some(0),
            stdout: capture("Hello, World!\n"),
            stderr: capture(""),
            elapsed: Duration::from_millis(120),
            ..Default::default()
        };

        let result = assemble(raw);

        assert_eq!(result.stdout.as_deref(), Some("Hello, World!\n"));
        assert_eq!(result.stderr.as_deref(), Some(""));
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.execution_time_ms, 120);
        assert!(!result.timed_out);
        assert!(!result.exceeded_memory);
        assert!(!result.output_truncated);
        assert!(result.succeeded());
    }

    #[test]
    fn test_timeout_drops_exit_code() {
        let raw = RawRunOutcome {
            exit_code: Some(137),
            stdout: capture("partial"),
            timed_out: true,
            ..Default::default()
        };

        let result = assemble(raw);

        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.stdout.as_deref(), Some("partial"));
        assert_eq!(result.outcome(), "timed_out");
    }

    #[test]
    fn test_oom_sets_exceeded_memory() {
        let raw = RawRunOutcome {
            exit_code: Some(137),
            oom_killed: true,
            ..Default::default()
        };

        let result = assemble(raw);

        assert!(result.exceeded_memory);
        assert_eq!(result.exit_code, Some(137));
        assert_eq!(result.outcome(), "memory_exceeded");
    }

    #[test]
    fn test_compile_failure_keeps_diagnostics() {
        let raw = RawRunOutcome {
            exit_code: Some(1),
            stderr: capture("main.rs:1:1: error: expected item\n"),
            compile_failed: true,
            ..Default::default()
        };

        let result = assemble(raw);

        assert_eq!(result.stdout, None);
        assert_eq!(
            result.stderr.as_deref(),
            Some("main.rs:1:1: error: expected item\n")
        );
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.outcome(), "program_error");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let raw = RawRunOutcome {
            exit_code: Some(0),
            stdout: Some(Capture {
                bytes: vec![b'o', b'k', 0xff, 0xfe],
                truncated: false,
            }),
            ..Default::default()
        };

        let result = assemble(raw);

        assert_eq!(result.stdout.as_deref(), Some("ok\u{fffd}\u{fffd}"));
    }

    #[test]
    fn test_truncation_from_either_stream() {
        let raw = RawRunOutcome {
            exit_code: Some(0),
            stdout: capture("short"),
            stderr: Some(Capture {
                bytes: b"noisy".to_vec(),
                truncated: true,
            }),
            ..Default::default()
        };

        assert!(assemble(raw).output_truncated);
    }

    #[test]
    fn test_system_error_survives_with_partial_output() {
        let mut raw = RawRunOutcome::failed("docker error: connection refused");
        raw.stdout = capture("half");

        let result = assemble(raw);

        assert_eq!(
            result.system_error.as_deref(),
            Some("docker error: connection refused")
        );
        assert_eq!(result.stdout.as_deref(), Some("half"));
        assert_eq!(result.outcome(), "system_error");
    }
}
