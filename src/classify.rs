// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The external URL-reputation collaborator named at the spec's
//! interface: a single synchronous call made before dispatch. The
//! default, unconfigured behavior treats every URL as safe; when a
//! classifier command is configured, it is invoked once per request and
//! its stdout is parsed as `KEY: value` lines, the same line protocol an
//! external checker process is expected to emit.

use tokio::process::Command;
use tracing::warn;

use crate::config::ClassifierConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Safe,
    Blocked {
        label: String,
        score: f32,
        reason: String,
    },
}

/// Calls the configured classifier (if any) for `url`. Any failure to
/// launch or parse the classifier is treated as safe, matching the
/// external checker's own fail-open default.
pub async fn classify(url: &str, classifier: Option<&ClassifierConfig>) -> ClassifyOutcome {
    let Some(cfg) = classifier else {
        return ClassifyOutcome::Safe;
    };

    match run_checker(url, cfg).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("classifier invocation failed, defaulting to safe: {e}");
            ClassifyOutcome::Safe
        }
    }
}

async fn run_checker(url: &str, cfg: &ClassifierConfig) -> Result<ClassifyOutcome, std::io::Error> {
    let output = Command::new(&cfg.command)
        .args(&cfg.args)
        .arg(url)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_checker_output(&stdout))
}

fn extract_value<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    let prefix = format!("{key}: ");
    output
        .lines()
        .find(|l| l.starts_with(&prefix))
        .map(|l| &l[prefix.len()..])
}

fn parse_checker_output(output: &str) -> ClassifyOutcome {
    let is_safe = extract_value(output, "RESULT")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|v| v == 0)
        .unwrap_or(true);

    if is_safe {
        return ClassifyOutcome::Safe;
    }

    let label = extract_value(output, "PREDICTION")
        .unwrap_or("unknown")
        .trim()
        .to_string();
    let score = extract_value(output, "SCORE")
        .and_then(|v| v.trim().parse::<f32>().ok())
        .unwrap_or(0.0);
    let reason = extract_value(output, "EXPLANATION")
        .unwrap_or("no explanation provided")
        .trim()
        .to_string();

    ClassifyOutcome::Blocked {
        label,
        score,
        reason,
    }
}
