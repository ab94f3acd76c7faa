//! External scorer invocation (Rust -> Python runner).
//!
//! One process per invocation, gated by a semaphore so a burst of requests
//! cannot fan out unbounded. Both output streams are captured in full before
//! success is judged: exit 0 plus parseable JSON on stdout is the only
//! success path.

use crate::domain::error::{AppError, Result};
use crate::domain::model::FeatureMap;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Arbitrary JSON object returned by the scorer for one input; the core
/// passes these fields through untouched.
pub type ScoreFields = serde_json::Map<String, JsonValue>;

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, model_path: &Path, features: &FeatureMap) -> Result<ScoreFields>;

    /// Batch scoring. The returned list corresponds positionally to the
    /// input list; that correspondence is a hard contract with the scorer.
    async fn score_batch(
        &self,
        model_path: &Path,
        features: &[FeatureMap],
    ) -> Result<Vec<ScoreFields>>;
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Interpreter binary, e.g. `python3`.
    pub python_bin: String,
    /// Path to the prediction script.
    pub script: PathBuf,
    pub timeout: Duration,
    pub max_concurrent: usize,
}

pub struct PythonScorer {
    config: ScorerConfig,
    gate: Arc<Semaphore>,
}

impl PythonScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            config,
            gate: Arc::new(Semaphore::new(permits)),
        }
    }

    async fn run(&self, model_path: &Path, features_json: String, batch: bool) -> Result<JsonValue> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AppError::Internal(format!("Scorer gate closed: {e}")))?;

        let mut cmd = TokioCommand::new(&self.config.python_bin);
        cmd.arg(&self.config.script)
            .arg("--model")
            .arg(model_path)
            .arg("--features")
            .arg(&features_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if batch {
            cmd.arg("--batch");
        }

        debug!(
            script = %self.config.script.display(),
            model = %model_path.display(),
            batch,
            "Spawning scorer"
        );

        let child = cmd
            .spawn()
            .map_err(|e| AppError::ScorerProcess(format!("Failed to spawn scorer: {e}")))?;

        // kill_on_drop reaps the child if the deadline fires.
        let output = match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AppError::ScorerProcess(format!(
                    "Failed to wait for scorer: {e}"
                )))
            }
            Err(_) => {
                warn!(timeout_secs = self.config.timeout.as_secs(), "Scorer timed out");
                return Err(AppError::ScorerTimeout(format!(
                    "Scorer exceeded {}s",
                    self.config.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = first_non_empty(&[stderr.trim(), stdout.trim()])
                .unwrap_or("scorer process failed");
            return Err(AppError::ScorerProcess(truncated(detail, 2000)));
        }

        serde_json::from_str(stdout.trim())
            .map_err(|e| AppError::ScorerParse(format!("Invalid scorer output: {e}")))
    }
}

#[async_trait]
impl Scorer for PythonScorer {
    async fn score(&self, model_path: &Path, features: &FeatureMap) -> Result<ScoreFields> {
        let payload = serde_json::to_string(features)
            .map_err(|e| AppError::Internal(format!("Failed to encode features: {e}")))?;
        let value = self.run(model_path, payload, false).await?;
        match value {
            JsonValue::Object(fields) => Ok(fields),
            other => Err(AppError::ScorerParse(format!(
                "Expected a JSON object from scorer, got: {}",
                other
            ))),
        }
    }

    async fn score_batch(
        &self,
        model_path: &Path,
        features: &[FeatureMap],
    ) -> Result<Vec<ScoreFields>> {
        let payload = serde_json::to_string(features)
            .map_err(|e| AppError::Internal(format!("Failed to encode features: {e}")))?;
        let value = self.run(model_path, payload, true).await?;
        let JsonValue::Array(rows) = value else {
            return Err(AppError::ScorerParse(format!(
                "Expected a JSON array from scorer, got: {}",
                value
            )));
        };
        if rows.len() != features.len() {
            return Err(AppError::ScorerParse(format!(
                "Scorer returned {} results for {} inputs",
                rows.len(),
                features.len()
            )));
        }
        rows.into_iter()
            .map(|row| match row {
                JsonValue::Object(fields) => Ok(fields),
                other => Err(AppError::ScorerParse(format!(
                    "Expected JSON objects in scorer batch output, got: {}",
                    other
                ))),
            })
            .collect()
    }
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|s| !s.is_empty())
}

fn truncated(text: &str, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    // The scorer contract only cares about argv, exit code, and the output
    // streams, so a shell script stands in for the Python runner.
    fn shell_scorer(body: &str, timeout_secs: u64) -> PythonScorer {
        let script = std::env::temp_dir().join(format!("scorer_test_{}.sh", uuid::Uuid::new_v4()));
        fs::write(&script, body).unwrap();
        PythonScorer::new(ScorerConfig {
            python_bin: "sh".to_string(),
            script,
            timeout: Duration::from_secs(timeout_secs),
            max_concurrent: 2,
        })
    }

    fn features(pairs: &[(&str, f64)]) -> FeatureMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[tokio::test]
    async fn test_score_parses_json_stdout() {
        let scorer = shell_scorer("echo '{\"pred\": 1, \"proba\": 0.75}'\n", 10);
        let fields = scorer
            .score(Path::new("/tmp/model_1.pkl"), &features(&[("Q1_score", 3.0)]))
            .await
            .unwrap();
        assert_eq!(fields.get("pred"), Some(&serde_json::json!(1)));
        assert_eq!(fields.get("proba"), Some(&serde_json::json!(0.75)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_stderr() {
        let scorer = shell_scorer("echo 'model file missing' >&2\nexit 3\n", 10);
        match scorer
            .score(Path::new("/tmp/model_1.pkl"), &FeatureMap::new())
            .await
        {
            Err(AppError::ScorerProcess(msg)) => assert!(msg.contains("model file missing")),
            other => panic!("expected ScorerProcess, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_falls_back_to_stdout_then_generic() {
        let scorer = shell_scorer("echo 'stdout detail'\nexit 1\n", 10);
        match scorer
            .score(Path::new("/tmp/m.pkl"), &FeatureMap::new())
            .await
        {
            Err(AppError::ScorerProcess(msg)) => assert!(msg.contains("stdout detail")),
            other => panic!("expected ScorerProcess, got {:?}", other),
        }

        let silent = shell_scorer("exit 1\n", 10);
        match silent
            .score(Path::new("/tmp/m.pkl"), &FeatureMap::new())
            .await
        {
            Err(AppError::ScorerProcess(msg)) => assert!(msg.contains("scorer process failed")),
            other => panic!("expected ScorerProcess, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clean_exit_with_garbage_is_parse_error() {
        let scorer = shell_scorer("echo 'not json at all'\n", 10);
        match scorer
            .score(Path::new("/tmp/m.pkl"), &FeatureMap::new())
            .await
        {
            Err(AppError::ScorerParse(_)) => {}
            other => panic!("expected ScorerParse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_requires_positional_correspondence() {
        let scorer = shell_scorer("echo '[{\"pred\": 0}, {\"pred\": 1}]'\n", 10);
        let rows = scorer
            .score_batch(
                Path::new("/tmp/m.pkl"),
                &[features(&[("Q1_score", 1.0)]), features(&[("Q1_score", 2.0)])],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("pred"), Some(&serde_json::json!(1)));

        // One result for two inputs breaks the contract.
        match scorer
            .score_batch(
                Path::new("/tmp/m.pkl"),
                &[FeatureMap::new(), FeatureMap::new(), FeatureMap::new()],
            )
            .await
        {
            Err(AppError::ScorerParse(msg)) => assert!(msg.contains("2 results for 3 inputs")),
            other => panic!("expected ScorerParse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_scorer_times_out() {
        let scorer = shell_scorer("sleep 30\n", 1);
        match scorer
            .score(Path::new("/tmp/m.pkl"), &FeatureMap::new())
            .await
        {
            Err(AppError::ScorerTimeout(_)) => {}
            other => panic!("expected ScorerTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_arguments_reach_the_scorer() {
        // The stand-in verifies its own argv and only answers when the
        // expected flags arrive in order.
        let body = "case \"$*\" in\n\
                    *'--model /tmp/model_9.pkl --features '*Q2_score*'--batch') \
                    echo '[{\"pred\": 1}]' ;;\n\
                    *) echo \"unexpected argv: $*\" >&2; exit 1 ;;\n\
                    esac\n";
        let scorer = shell_scorer(body, 10);
        let rows = scorer
            .score_batch(
                Path::new("/tmp/model_9.pkl"),
                &[features(&[("Q2_score", 5.0)])],
            )
            .await
            .unwrap();
        assert_eq!(rows[0].get("pred"), Some(&serde_json::json!(1)));
    }
}
