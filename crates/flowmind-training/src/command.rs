//! Subprocess training backend.
//!
//! Runs an external trainer CLI (Ultralytics `key=value` arguments) and collects
//! the result either from a JSON line on stdout or from the conventional
//! `<output_dir>/exp/weights/best.pt` location, with metrics read from the run's
//! `results.csv`.

use crate::backend::{Metrics, TrainingBackend, TrainingInput, TrainingOutput};
use crate::error::{TrainingError, TrainingResult};
use crate::job::JobId;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Run name passed to the trainer; results land in `<output_dir>/<RUN_NAME>`.
const RUN_NAME: &str = "exp";

/// Stderr lines kept for failure reporting.
const STDERR_TAIL_LINES: usize = 32;

/// A [`TrainingBackend`] that shells out to a trainer program.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    base_args: Vec<String>,
}

/// Result line a trainer may print as the last JSON line on stdout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportedResult {
    artifact_path: String,
    #[serde(default)]
    metrics: Metrics,
}

impl CommandBackend {
    #[must_use]
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self { program: program.into(), base_args }
    }

    /// Job-specific `key=value` arguments appended after the configured base arguments.
    #[must_use]
    pub fn job_args(input: &TrainingInput) -> Vec<String> {
        let hp = &input.hyperparams;
        vec![
            format!("model={}", input.checkpoint),
            format!("data={}", input.dataset_path.display()),
            format!("epochs={}", hp.epochs),
            format!("batch={}", hp.batch_size),
            format!("lr0={}", hp.learning_rate),
            format!("optimizer={}", hp.optimizer.to_lowercase()),
            format!("project={}", input.output_dir.display()),
            format!("name={RUN_NAME}"),
            "exist_ok=True".to_string(),
        ]
    }

    fn run_dir(input: &TrainingInput) -> PathBuf {
        input.output_dir.join(RUN_NAME)
    }
}

fn parse_result_line(line: &str) -> Option<ReportedResult> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Feed each line of `reader` to `f`, lossily decoded and without its terminator.
async fn for_each_line<R, F>(reader: R, mut f: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        f(line.trim_end_matches(['\r', '\n']));
    }
}

/// Log stdout as it arrives and keep the last reported result.
async fn watch_stdout<R: AsyncRead + Unpin>(job_id: JobId, stdout: R) -> std::io::Result<Option<ReportedResult>> {
    let mut reported = None;
    for_each_line(stdout, |line| {
        debug!(job_id = %job_id, stream = "stdout", "{line}");
        if let Some(result) = parse_result_line(line) {
            reported = Some(result);
        }
    })
    .await?;
    Ok(reported)
}

/// Log stderr as it arrives and keep its last non-empty lines.
async fn watch_stderr<R: AsyncRead + Unpin>(job_id: JobId, stderr: R) -> std::io::Result<VecDeque<String>> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for_each_line(stderr, |line| {
        debug!(job_id = %job_id, stream = "stderr", "{line}");
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    })
    .await?;
    Ok(tail)
}

/// Exception class name of a `pkg.module.SomeError: message` line.
fn exception_kind(line: &str) -> Option<(&str, &str)> {
    let (qualified, message) = line.split_once(": ")?;
    let kind = qualified.rsplit_once('.').map_or(qualified, |(_, name)| name);
    let is_ident = !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    (is_ident && (kind.ends_with("Error") || kind.ends_with("Exception"))).then_some((kind, message))
}

/// Turn the tail of a failed trainer's stderr into a `TrainingError`.
///
/// The last line naming an exception, e.g. `torch.cuda.OutOfMemoryError: ...`,
/// keeps its class name as the kind.
fn failure_from_stderr<S: AsRef<str>>(program: &str, status: ExitStatus, tail: &[S]) -> TrainingError {
    if let Some((kind, message)) = tail.iter().rev().find_map(|l| exception_kind(l.as_ref())) {
        return TrainingError::backend(kind, message);
    }

    match tail.last() {
        Some(line) => TrainingError::Process(format!("{program} exited with {status}: {}", line.as_ref())),
        None => TrainingError::Process(format!("{program} exited with {status}")),
    }
}

/// Final-epoch row of an Ultralytics `results.csv`, keyed by column name.
fn parse_results_csv(data: &[u8]) -> Result<Metrics, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(data);
    let headers = reader.headers()?.clone();

    let mut last = None;
    for record in reader.records() {
        last = Some(record?);
    }

    let Some(row) = last else {
        return Ok(Metrics::new());
    };
    Ok(headers
        .iter()
        .zip(row.iter())
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| {
            let value = value
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| serde_json::Value::String(value.to_string()), serde_json::Value::Number);
            (name.to_string(), value)
        })
        .collect())
}

async fn read_run_metrics(job_id: JobId, run_dir: &Path) -> Metrics {
    let path = run_dir.join("results.csv");
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) => {
            debug!(job_id = %job_id, path = %path.display(), error = %e, "No results.csv, reporting no metrics");
            return Metrics::new();
        }
    };
    parse_results_csv(&data).unwrap_or_else(|e| {
        warn!(job_id = %job_id, path = %path.display(), error = %e, "Unreadable results.csv, reporting no metrics");
        Metrics::new()
    })
}

#[async_trait]
impl TrainingBackend for CommandBackend {
    fn id(&self) -> &'static str {
        "command"
    }

    async fn train(&self, input: &TrainingInput) -> TrainingResult<TrainingOutput> {
        let args = Self::job_args(input);
        info!(job_id = %input.job_id, program = %self.program, "Launching trainer process");
        debug!(job_id = %input.job_id, base_args = ?self.base_args, args = ?args, "Trainer arguments");

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TrainingError::Process(format!("failed to launch {}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TrainingError::Process("failed to capture trainer stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TrainingError::Process("failed to capture trainer stderr".to_string()))?;

        let (reported, tail) =
            tokio::join!(watch_stdout(input.job_id, stdout), watch_stderr(input.job_id, stderr));
        let status = child.wait().await?;
        let (reported, tail) = (reported?, Vec::from(tail?));

        if !status.success() {
            return Err(failure_from_stderr(&self.program, status, &tail));
        }

        if let Some(reported) = reported {
            return Ok(TrainingOutput { artifact_path: reported.artifact_path, metrics: reported.metrics });
        }

        let run_dir = Self::run_dir(input);
        let best = run_dir.join("weights").join("best.pt");
        if !tokio::fs::try_exists(&best).await.unwrap_or(false) {
            return Err(TrainingError::Artifact(format!(
                "trainer finished but produced no weights at {}",
                best.display()
            )));
        }

        let metrics = read_run_metrics(input.job_id, &run_dir).await;
        Ok(TrainingOutput { artifact_path: best.display().to_string(), metrics })
    }
}
