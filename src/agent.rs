use async_trait::async_trait;
use chrono::Local;
use nanoid::nanoid;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs as async_fs;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, Settings};
use crate::workflow::{build_prompt, WorkflowParams};

// ========================= Core Types =========================

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

/// One request submitted to the hosted agent loop. The loop runs remotely;
/// these knobs bound it (step budget, token budget) but nothing here drives
/// the browser locally.
#[derive(Clone, Debug, Serialize)]
pub struct TaskRequest {
    pub instruction: String,
    pub model: String,
    pub display_width: u32,
    pub display_height: u32,
    pub thinking_enabled: bool,
    pub thinking_budget: u32,
    pub max_iterations: u32,
    pub max_tokens: u32,
}

/// Progress emitted by the external loop, one event per internal step.
/// Consumed for logging only and discarded.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Text(String),
    ToolUse {
        action: String,
        coordinate: Option<(i64, i64)>,
    },
    Thinking(String),
    Error(String),
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub computer_id: String,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("computer error: {0}")]
    Computer(String),
    #[error("interrupted by operator")]
    Interrupted,
}

// ========================= Computer Seam =========================

/// A provisioned cloud desktop. Implementations forward to the remote
/// service; the trait exists so the orchestrator can be exercised against a
/// fake.
#[async_trait]
pub trait Computer: Send + Sync {
    fn id(&self) -> &str;

    fn view_url(&self) -> Option<String> {
        None
    }

    /// Run one instruction through the hosted agent loop, invoking `on_event`
    /// once per internal step. Returns only after the loop halts. The
    /// callback is observation-only and cannot steer the loop.
    async fn run_task(
        &self,
        request: &TaskRequest,
        on_event: &(dyn for<'a> Fn(&'a ProgressEvent) + Send + Sync),
    ) -> Result<(), AgentError>;

    /// Synchronous screenshot of the desktop, decoded PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError>;
}

// ========================= Agent Core =========================

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: String,
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub thinking_enabled: bool,
    pub thinking_budget: u32,
    pub dry_run: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_iterations: 50,
            max_tokens: 8192,
            thinking_enabled: true,
            thinking_budget: 1024,
            dry_run: false,
        }
    }
}

/// Owns one remote session for the process lifetime and drives exactly one
/// external agent invocation. The session is never torn down here: the
/// computer keeps running so a later run (or a human) can reconnect.
pub struct Agent<C: Computer> {
    computer: C,
    settings: Settings,
    params: WorkflowParams,
    cfg: AgentConfig,
    diagnostics_dir: PathBuf,
}

impl<C: Computer> Agent<C> {
    pub fn new(computer: C, settings: Settings, params: WorkflowParams, cfg: AgentConfig) -> Self {
        Self {
            computer,
            settings,
            params,
            cfg,
            diagnostics_dir: PathBuf::from("diagnostics"),
        }
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = dir.into();
        self
    }

    pub async fn run(&self) -> Result<RunSummary, AgentError> {
        self.params.validate()?;
        let run_id = nanoid!();

        info!(
            run_id = %run_id,
            dry_run = self.cfg.dry_run,
            email_service = %self.params.email_service,
            payment_service = %self.params.payment_service,
            "starting workflow"
        );

        let instruction = build_prompt(
            &self.params,
            &self.settings.email_login,
            &self.settings.payment_login,
            Local::now().naive_local(),
            self.cfg.dry_run,
        );
        debug!(instruction = %instruction, "workflow instruction");

        let request = TaskRequest {
            instruction,
            model: self.cfg.model.clone(),
            display_width: self.settings.display_width,
            display_height: self.settings.display_height,
            thinking_enabled: self.cfg.thinking_enabled,
            thinking_budget: self.cfg.thinking_budget,
            max_iterations: self.cfg.max_iterations,
            max_tokens: self.cfg.max_tokens,
        };

        info!("sending workflow to the agent loop");
        let on_event = |event: &ProgressEvent| log_event(event);

        let outcome = tokio::select! {
            res = self.computer.run_task(&request, &on_event) => res,
            _ = signal::ctrl_c() => {
                warn!("workflow interrupted by operator");
                return Err(AgentError::Interrupted);
            }
        };

        if let Err(err) = outcome {
            error!(error = %err, "workflow failed");
            self.capture_diagnostics(&run_id).await;
            return Err(err);
        }

        info!(
            computer_id = %self.computer.id(),
            url = self.computer.view_url().as_deref().unwrap_or("-"),
            dry_run = self.cfg.dry_run,
            "workflow complete; computer remains running for reuse"
        );
        Ok(RunSummary {
            run_id,
            computer_id: self.computer.id().to_string(),
            dry_run: self.cfg.dry_run,
        })
    }

    /// Best-effort screenshot through the still-open session after a failure.
    /// Its own failure is swallowed so it never masks the original error.
    async fn capture_diagnostics(&self, run_id: &str) {
        match self.computer.screenshot().await {
            Ok(png) => match save_diagnostic(&self.diagnostics_dir, run_id, &png).await {
                Ok(path) => info!(path = %path.display(), "debug screenshot captured"),
                Err(err) => debug!(error = %err, "failed to persist debug screenshot"),
            },
            Err(err) => debug!(error = %err, "failed to capture debug screenshot"),
        }
    }
}

// ========================= Event Logging =========================

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Text(text) => info!("agent: {}", text),
        ProgressEvent::ToolUse { action, coordinate } => {
            info!("action: {}", action);
            if let Some((x, y)) = coordinate {
                debug!("  at: ({}, {})", x, y);
            }
        }
        ProgressEvent::Thinking(text) => debug!("thinking: {}...", truncate(text, 200)),
        ProgressEvent::Error(text) => error!("agent error: {}", text),
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

async fn save_diagnostic(dir: &Path, run_id: &str, png: &[u8]) -> std::io::Result<PathBuf> {
    async_fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{run_id}.png"));
    async_fs::write(&path, png).await?;
    Ok(path)
}
