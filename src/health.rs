//! Service health probing through `compose ps --format json`.

use crate::compose::{compose_ps, ProjectContext};
use crate::process::CommandRunner;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    /// The container exists but reports no health signal.
    None,
    /// Absent, or the reply could not be understood.
    NotFound,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Starting => "starting",
            Self::None => "none",
            Self::NotFound => "not_found",
        }
    }

    /// `healthy` and `none` both let a waiting caller proceed.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Healthy | Self::None)
    }

    fn from_field(value: Option<&Value>) -> Self {
        let text = match value {
            None | Some(Value::Null) => return Self::None,
            Some(Value::String(text)) => text.trim().to_ascii_lowercase(),
            Some(other) => {
                debug!(health = %other, "non-string health field");
                return Self::NotFound;
            }
        };
        match text.as_str() {
            "" => Self::None,
            "healthy" => Self::Healthy,
            "unhealthy" => Self::Unhealthy,
            "starting" => Self::Starting,
            unknown => {
                debug!(health = unknown, "unrecognized health value, treating as starting");
                Self::Starting
            }
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a `ps` reply.
#[derive(Debug, Clone, PartialEq)]
pub enum PsEntry {
    Record(Map<String, Value>),
    /// Only the container name came back, no metadata.
    Name(String),
    Unrecognized(Value),
}

impl PsEntry {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Record(map),
            Value::String(name) => Self::Name(name),
            other => Self::Unrecognized(other),
        }
    }

    pub fn status(&self) -> HealthStatus {
        match self {
            Self::Record(map) => HealthStatus::from_field(map.get("Health")),
            Self::Name(_) => HealthStatus::None,
            Self::Unrecognized(_) => HealthStatus::NotFound,
        }
    }
}

/// The shapes `compose ps --format json` has been seen to produce.
#[derive(Debug, Clone, PartialEq)]
pub enum PsReply {
    SingleRecord(Map<String, Value>),
    /// Records keyed by service name.
    RecordMap(Vec<(String, PsEntry)>),
    /// An array of records or bare container names.
    List(Vec<PsEntry>),
}

impl PsReply {
    /// Normalizes raw stdout. `None` means the text was not a usable reply.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(value),
            // Newer compose versions print one JSON object per line.
            Err(_) => {
                let mut entries = Vec::new();
                for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    let value = serde_json::from_str::<Value>(line).ok()?;
                    entries.push(PsEntry::from_value(value));
                }
                Some(Self::List(entries))
            }
        }
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::List(
                items.into_iter().map(PsEntry::from_value).collect(),
            )),
            Value::Object(map) if map.values().all(Value::is_object) => Some(Self::RecordMap(
                map.into_iter()
                    .map(|(name, record)| (name, PsEntry::from_value(record)))
                    .collect(),
            )),
            Value::Object(map) => Some(Self::SingleRecord(map)),
            _ => None,
        }
    }

    pub fn first_status(&self) -> HealthStatus {
        match self {
            Self::SingleRecord(map) => HealthStatus::from_field(map.get("Health")),
            Self::RecordMap(entries) => entries
                .first()
                .map_or(HealthStatus::NotFound, |(_, entry)| entry.status()),
            Self::List(entries) => entries
                .first()
                .map_or(HealthStatus::NotFound, PsEntry::status),
        }
    }
}

/// Health of `service`. Never fails: every error path reads as `NotFound`.
pub fn probe<R: CommandRunner>(ctx: &ProjectContext, runner: &R, service: &str) -> HealthStatus {
    let result = compose_ps(ctx, runner, service);
    if !result.ok {
        debug!(service, exit_code = result.exit_code, stderr = %result.stderr, "ps query failed");
        return HealthStatus::NotFound;
    }
    match PsReply::parse(&result.stdout) {
        Some(reply) => {
            let status = reply.first_status();
            debug!(service, %status, "probed service health");
            status
        }
        None => {
            debug!(service, stdout = %result.stdout, "unusable ps reply");
            HealthStatus::NotFound
        }
    }
}

/// Polls `service` until it is ready or `timeout` elapses. Blocks the caller.
pub fn wait_until_healthy<R: CommandRunner>(
    ctx: &ProjectContext,
    runner: &R,
    service: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    // A timeout too large to represent as an instant means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    while deadline.map_or(true, |deadline| Instant::now() < deadline) {
        let status = probe(ctx, runner, service);
        if status.is_ready() {
            if status == HealthStatus::None {
                warn!(service, "service has no healthcheck; not waiting on it");
            }
            return true;
        }
        let pause = match deadline {
            Some(deadline) => poll_interval.min(deadline.saturating_duration_since(Instant::now())),
            None => poll_interval,
        };
        thread::sleep(pause);
    }
    warn!(service, timeout_secs = timeout.as_secs(), "service did not become healthy");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::process::CommandResult;
    use crate::testing::ScriptedRunner;

    fn ctx() -> ProjectContext {
        ProjectContext::new("/srv/shop", Config::default())
    }

    fn probe_reply(stdout: &str) -> HealthStatus {
        let runner = ScriptedRunner::with_results([CommandResult::success(stdout)]);
        probe(&ctx(), &runner, "mysql")
    }

    #[test]
    fn bare_name_reports_none() {
        assert_eq!(probe_reply(r#"["shop-mysql"]"#), HealthStatus::None);
    }

    #[test]
    fn empty_or_malformed_reply_is_not_found() {
        assert_eq!(probe_reply("[]"), HealthStatus::NotFound);
        assert_eq!(probe_reply("{not json"), HealthStatus::NotFound);
        assert_eq!(probe_reply(""), HealthStatus::NotFound);
        assert_eq!(probe_reply("null"), HealthStatus::NotFound);
        assert_eq!(probe_reply("{}"), HealthStatus::NotFound);
        assert_eq!(probe_reply("[42]"), HealthStatus::NotFound);
    }

    #[test]
    fn record_list_reads_health_field() {
        assert_eq!(probe_reply(r#"[{"Health":"healthy"}]"#), HealthStatus::Healthy);
        assert_eq!(
            probe_reply(r#"[{"Name":"shop-mysql","Health":"starting"}]"#),
            HealthStatus::Starting
        );
        assert_eq!(
            probe_reply(r#"[{"Name":"shop-mysql","Health":"unhealthy"}]"#),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn missing_or_empty_health_field_is_none() {
        assert_eq!(probe_reply(r#"[{"Name":"shop-mysql"}]"#), HealthStatus::None);
        assert_eq!(
            probe_reply(r#"{"Name":"shop-mysql","Health":""}"#),
            HealthStatus::None
        );
    }

    #[test]
    fn single_object_and_service_map_are_normalized() {
        assert_eq!(
            probe_reply(r#"{"Name":"shop-mysql","Health":"healthy"}"#),
            HealthStatus::Healthy
        );
        assert_eq!(
            probe_reply(r#"{"mysql":{"Name":"shop-mysql","Health":"starting"}}"#),
            HealthStatus::Starting
        );
    }

    #[test]
    fn line_delimited_records_use_the_first_line() {
        let stdout = "{\"Service\":\"mysql\",\"Health\":\"healthy\"}\n{\"Service\":\"app\",\"Health\":\"\"}";
        assert_eq!(probe_reply(stdout), HealthStatus::Healthy);
    }

    #[test]
    fn failed_ps_command_is_not_found() {
        let runner =
            ScriptedRunner::with_results([CommandResult::exited(1, r#"[{"Health":"healthy"}]"#, "boom")]);
        assert_eq!(probe(&ctx(), &runner, "mysql"), HealthStatus::NotFound);
    }

    #[test]
    fn parse_distinguishes_shapes() {
        assert!(matches!(
            PsReply::parse(r#"{"Health":"healthy"}"#),
            Some(PsReply::SingleRecord(_))
        ));
        assert!(matches!(
            PsReply::parse(r#"{"mysql":{"Health":"healthy"}}"#),
            Some(PsReply::RecordMap(_))
        ));
        assert!(matches!(
            PsReply::parse(r#"["shop-mysql"]"#),
            Some(PsReply::List(ref entries)) if entries == &vec![PsEntry::Name("shop-mysql".to_string())]
        ));
        assert!(PsReply::parse("\"just a string\"").is_none());
    }

    #[test]
    fn wait_returns_once_service_becomes_healthy() {
        let runner = ScriptedRunner::with_results([
            CommandResult::success(r#"[{"Health":"starting"}]"#),
            CommandResult::success(r#"[{"Health":"healthy"}]"#),
        ]);
        let ready = wait_until_healthy(
            &ctx(),
            &runner,
            "mysql",
            Duration::from_secs(5),
            Duration::from_millis(1),
        );
        assert!(ready);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn wait_treats_missing_healthcheck_as_ready() {
        let runner = ScriptedRunner::with_results([CommandResult::success(r#"["shop-mysql"]"#)]);
        assert!(wait_until_healthy(
            &ctx(),
            &runner,
            "mysql",
            Duration::from_secs(5),
            Duration::from_millis(1),
        ));
    }

    #[test]
    fn wait_gives_up_after_timeout() {
        let runner = ScriptedRunner::default();
        for _ in 0..1000 {
            runner.push(CommandResult::success(r#"[{"Health":"unhealthy"}]"#));
        }
        let started = Instant::now();
        let ready = wait_until_healthy(
            &ctx(),
            &runner,
            "mysql",
            Duration::from_millis(60),
            Duration::from_millis(10),
        );
        assert!(!ready);
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(!runner.calls().is_empty());
    }

    #[test]
    fn zero_timeout_never_probes() {
        let runner = ScriptedRunner::default();
        assert!(!wait_until_healthy(
            &ctx(),
            &runner,
            "mysql",
            Duration::ZERO,
            Duration::from_millis(1),
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn unrepresentable_timeout_waits_without_deadline() {
        let runner = ScriptedRunner::with_results([
            CommandResult::success(r#"[{"Health":"starting"}]"#),
            CommandResult::success(r#"[{"Health":"healthy"}]"#),
        ]);
        let ready = wait_until_healthy(
            &ctx(),
            &runner,
            "mysql",
            Duration::from_secs(u64::MAX),
            Duration::from_millis(1),
        );
        assert!(ready);
        assert_eq!(runner.calls().len(), 2);
    }
}
