//! Test-script parsing: executor tagging, humantime durations, validation,
//! and the CLI error paths for broken scripts.

use assert_cmd::Command;
use predicates::prelude::*;
use stampede::config::{ScriptConfig, script_into_parts};
use stampede::types::ScenarioOptions;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

fn stampede() -> Command {
    Command::cargo_bin("stampede").unwrap()
}

fn parse(script: &str) -> ScriptConfig {
    toml::from_str(script).unwrap()
}

mod parsing {
    use super::*;

    #[test]
    fn all_three_executors_parse() {
        let script = parse(
            r#"
[scenarios.warm]
executor = "per-vu-iterations"
vus = 4
iterations = 10
max_duration = "1m 30s"

[scenarios.burst]
executor = "shared-iterations"
vus = 16
iterations = 100

[scenarios.soak]
executor = "constant-vus"
vus = 8
duration = "2m"
graceful_stop = "10s"

[[requests]]
url = "http://localhost:8080/health"
"#,
        );

        match &script.scenarios["warm"] {
            ScenarioOptions::PerVuIterations {
                vus,
                iterations,
                max_duration,
                graceful_stop,
            } => {
                assert_eq!(*vus, 4);
                assert_eq!(*iterations, 10);
                assert_eq!(*max_duration, Duration::from_secs(90));
                assert_eq!(*graceful_stop, Duration::from_secs(30), "default graceful stop");
            }
            other => panic!("wrong executor: {other:?}"),
        }

        match &script.scenarios["burst"] {
            ScenarioOptions::SharedIterations { max_duration, .. } => {
                assert_eq!(*max_duration, Duration::from_secs(600), "default max duration");
            }
            other => panic!("wrong executor: {other:?}"),
        }

        match &script.scenarios["soak"] {
            ScenarioOptions::ConstantVus {
                vus,
                duration,
                graceful_stop,
            } => {
                assert_eq!(*vus, 8);
                assert_eq!(*duration, Duration::from_secs(120));
                assert_eq!(*graceful_stop, Duration::from_secs(10));
            }
            other => panic!("wrong executor: {other:?}"),
        }
    }

    #[test]
    fn unknown_executor_is_rejected() {
        let error = toml::from_str::<ScriptConfig>(
            r#"
[scenarios.bad]
executor = "ramping-arrival-rate"
vus = 1

[[requests]]
url = "http://localhost/"
"#,
        )
        .unwrap_err();
        assert!(error.to_string().contains("ramping-arrival-rate"));
    }

    #[test]
    fn constant_vus_requires_duration() {
        let result = toml::from_str::<ScriptConfig>(
            r#"
[scenarios.bad]
executor = "constant-vus"
vus = 2

[[requests]]
url = "http://localhost/"
"#,
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("duration"), "message: {message}");
    }

    #[test]
    fn zero_vus_fail_validation() {
        let script = parse(
            r#"
[scenarios.bad]
executor = "per-vu-iterations"
vus = 0
iterations = 10

[[requests]]
url = "http://localhost/"
"#,
        );
        let error = script_into_parts(script).unwrap_err();
        assert!(error.to_string().contains("vus must be at least 1"));
    }

    #[test]
    fn scripts_need_at_least_one_request() {
        let script = parse(
            r#"
[scenarios.lonely]
executor = "per-vu-iterations"
vus = 1
iterations = 1
"#,
        );
        let error = script_into_parts(script).unwrap_err();
        assert!(error.to_string().contains("no requests"));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let script = parse(
            r#"
[scenarios.main]
executor = "per-vu-iterations"
vus = 1
iterations = 1

[[requests]]
method = "FE TCH"
url = "http://localhost/"
"#,
        );
        let error = script_into_parts(script).unwrap_err();
        assert!(error.to_string().contains("invalid HTTP method"));
    }

    #[test]
    fn thresholds_and_http_settings_parse() {
        let script = parse(
            r#"
[scenarios.main]
executor = "per-vu-iterations"
vus = 1
iterations = 1

[[requests]]
method = "post"
url = "http://localhost/submit"
body = "payload"
[requests.headers]
Content-Type = "text/plain"

[[thresholds]]
metric = "fetch"
stat = "p95"
op = "<"
value = 250.0

[http]
timeout = "5s"
connect_timeout = "2s"
"#,
        );
        assert_eq!(script.thresholds.len(), 1);
        assert_eq!(script.http.timeout, Duration::from_secs(5));

        let (options, _plan, http) = script_into_parts(script).unwrap();
        assert!(options.threshold.is_some());
        assert_eq!(http.connect_timeout, Duration::from_secs(2));
    }
}

mod cli {
    use super::*;

    #[test]
    fn missing_script_exits_one() {
        stampede()
            .args(["run", "/definitely/not/a/script.toml", "-q"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("failed to load test script"));
    }

    #[test]
    fn malformed_script_exits_one() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("broken.toml");
        fs::write(&script, "[scenarios.x\nexecutor = ").unwrap();

        stampede()
            .args(["run", script.to_str().unwrap(), "-q"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("configuration error"));
    }

    #[test]
    fn init_writes_a_runnable_scaffold() {
        let dir = tempdir().unwrap();
        let script = dir.path().join("stampede.toml");

        stampede()
            .args(["init", script.to_str().unwrap()])
            .assert()
            .success();

        let content = fs::read_to_string(&script).unwrap();
        assert!(content.contains("[scenarios.smoke]"));
        assert!(content.contains("[[requests]]"));

        // The scaffold parses as a valid script.
        toml::from_str::<ScriptConfig>(&content).unwrap();

        // Refuses to clobber without --force.
        stampede()
            .args(["init", script.to_str().unwrap()])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("already exists"));
    }
}
