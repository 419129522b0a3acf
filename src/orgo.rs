use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::env;
use tracing::{debug, error, info};

use crate::agent::{AgentError, Computer, ProgressEvent, TaskRequest};

#[derive(Clone)]
pub struct OrgoConfig {
    pub api_base: String,      // e.g. "https://www.orgo.ai/api/v1"
    pub api_key: String,       // env ORGO_API_KEY
    pub anthropic_key: String, // env ANTHROPIC_API_KEY, forwarded to the hosted loop
}

impl Default for OrgoConfig {
    fn default() -> Self {
        Self {
            api_base: env::var("ORGO_BASE_URL")
                .unwrap_or_else(|_| "https://www.orgo.ai/api/v1".into()),
            api_key: env::var("ORGO_API_KEY").unwrap_or_default(),
            anthropic_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct OrgoClient {
    http: Client,
    cfg: OrgoConfig,
}

impl OrgoClient {
    pub fn new(cfg: OrgoConfig) -> Result<Self> {
        if cfg.api_key.is_empty() {
            bail!("ORGO_API_KEY missing");
        }
        Ok(Self {
            http: Client::new(),
            cfg,
        })
    }

    pub async fn create_computer(&self) -> Result<String> {
        let url = format!("{}/computers", self.cfg.api_base);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            bail!("Orgo error {}: {}", status, text);
        }
        let v: Value = serde_json::from_str(&text).context("failed to parse Orgo response JSON")?;
        let id = v
            .get("id")
            .and_then(|x| x.as_str())
            .context("missing computer id")?;
        Ok(id.to_string())
    }

    pub async fn get_computer(&self, id: &str) -> Result<()> {
        let url = format!("{}/computers/{}", self.cfg.api_base, id);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Orgo error {}: {}", status, text);
        }
        Ok(())
    }

    pub async fn screenshot(&self, id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/computers/{}/screenshot", self.cfg.api_base, id);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            bail!("Orgo error {}: {}", status, text);
        }
        let v: Value = serde_json::from_str(&text).context("failed to parse Orgo response JSON")?;
        let b64 = v
            .get("image")
            .and_then(|x| x.as_str())
            .context("missing screenshot image")?;
        let png = B64.decode(b64).context("screenshot b64 decode")?;
        Ok(png)
    }

    /// Submit one instruction and consume the newline-delimited JSON event
    /// stream until the hosted loop halts. `on_event` fires once per parsed
    /// event; unknown event kinds are skipped.
    pub async fn run_task(
        &self,
        id: &str,
        request: &TaskRequest,
        on_event: &(dyn Fn(&ProgressEvent) + Send + Sync),
    ) -> Result<()> {
        let url = format!("{}/computers/{}/prompt", self.cfg.api_base, id);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.cfg.api_key)
            .header("x-anthropic-api-key", &self.cfg.anthropic_key)
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Orgo error {}: {}", status, text);
        }

        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("event stream read")?;
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                dispatch_line(&line, on_event);
            }
        }
        // the stream may end without a trailing newline
        dispatch_line(&buf, on_event);
        Ok(())
    }
}

fn dispatch_line(line: &[u8], on_event: &(dyn Fn(&ProgressEvent) + Send + Sync)) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(v) => {
            if let Some(event) = parse_event(&v) {
                on_event(&event);
            }
        }
        Err(err) => debug!(error = %err, "skipping malformed event line"),
    }
}

fn parse_event(v: &Value) -> Option<ProgressEvent> {
    let kind = v.get("type").and_then(|x| x.as_str()).unwrap_or("unknown");
    let event = match kind {
        "text" => ProgressEvent::Text(
            v.get("data")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
        ),
        "tool_use" => {
            let action = v
                .pointer("/data/action")
                .and_then(|x| x.as_str())
                .unwrap_or("unknown")
                .to_string();
            let coordinate = v.pointer("/data/coordinate").and_then(|c| {
                let arr = c.as_array()?;
                Some((arr.first()?.as_i64()?, arr.get(1)?.as_i64()?))
            });
            ProgressEvent::ToolUse { action, coordinate }
        }
        "thinking" => ProgressEvent::Thinking(
            v.get("data")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
        ),
        "error" => ProgressEvent::Error(
            v.get("data")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
        ),
        _ => return None,
    };
    Some(event)
}

// ========================= Session Handle =========================

/// How to obtain the remote session for this run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionPlan {
    Attach(String),
    Create,
}

/// An explicit identifier wins over the configured one; an empty final
/// identifier means provision a new computer.
pub fn resolve_session(explicit: Option<&str>, configured: &str) -> SessionPlan {
    let id = explicit.unwrap_or(configured).trim();
    if id.is_empty() {
        SessionPlan::Create
    } else {
        SessionPlan::Attach(id.to_string())
    }
}

/// A provisioned Orgo cloud desktop. Holds the assigned identifier for the
/// process lifetime; never deprovisions it.
pub struct OrgoComputer {
    client: OrgoClient,
    id: String,
}

impl OrgoComputer {
    pub async fn connect(client: OrgoClient, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        info!(computer_id = %id, "connecting to existing computer");
        client.get_computer(&id).await?;
        Ok(Self { client, id })
    }

    pub async fn provision(client: OrgoClient) -> Result<Self> {
        info!("creating new computer instance");
        let id = client.create_computer().await?;
        Ok(Self { client, id })
    }

    /// Attach or create per the plan. Acquisition failures are logged with
    /// their cause and propagated; no retry is attempted.
    pub async fn acquire(client: OrgoClient, plan: SessionPlan) -> Result<Self> {
        let result = match plan {
            SessionPlan::Attach(id) => Self::connect(client, id).await,
            SessionPlan::Create => Self::provision(client).await,
        };
        match result {
            Ok(computer) => {
                info!(
                    computer_id = %computer.id,
                    url = %computer.console_url(),
                    "computer ready"
                );
                Ok(computer)
            }
            Err(err) => {
                error!(error = %err, "failed to initialize computer");
                Err(err)
            }
        }
    }

    pub fn console_url(&self) -> String {
        format!("https://orgo-{}.orgo.dev", self.id)
    }
}

#[async_trait]
impl Computer for OrgoComputer {
    fn id(&self) -> &str {
        &self.id
    }

    fn view_url(&self) -> Option<String> {
        Some(self.console_url())
    }

    async fn run_task(
        &self,
        request: &TaskRequest,
        on_event: &(dyn for<'a> Fn(&'a ProgressEvent) + Send + Sync),
    ) -> Result<(), AgentError> {
        self.client
            .run_task(&self.id, request, on_event)
            .await
            .map_err(|e| AgentError::Computer(e.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        self.client
            .screenshot(&self.id)
            .await
            .map_err(|e| AgentError::Computer(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_id_wins_over_configured() {
        assert_eq!(
            resolve_session(Some("cli-id"), "env-id"),
            SessionPlan::Attach("cli-id".into())
        );
    }

    #[test]
    fn configured_id_used_when_no_explicit() {
        assert_eq!(
            resolve_session(None, "env-id"),
            SessionPlan::Attach("env-id".into())
        );
    }

    #[test]
    fn empty_everywhere_means_create() {
        assert_eq!(resolve_session(None, ""), SessionPlan::Create);
        assert_eq!(resolve_session(Some("  "), ""), SessionPlan::Create);
    }

    #[test]
    fn parse_text_event() {
        let v = json!({"type": "text", "data": "opening the inbox"});
        match parse_event(&v) {
            Some(ProgressEvent::Text(text)) => assert_eq!(text, "opening the inbox"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_tool_use_with_coordinate() {
        let v = json!({"type": "tool_use", "data": {"action": "left_click", "coordinate": [640, 400]}});
        match parse_event(&v) {
            Some(ProgressEvent::ToolUse { action, coordinate }) => {
                assert_eq!(action, "left_click");
                assert_eq!(coordinate, Some((640, 400)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_tool_use_without_coordinate() {
        let v = json!({"type": "tool_use", "data": {"action": "screenshot"}});
        match parse_event(&v) {
            Some(ProgressEvent::ToolUse { action, coordinate }) => {
                assert_eq!(action, "screenshot");
                assert_eq!(coordinate, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_thinking_and_error_events() {
        let thinking = json!({"type": "thinking", "data": "the inbox is empty"});
        assert!(matches!(
            parse_event(&thinking),
            Some(ProgressEvent::Thinking(_))
        ));
        let error = json!({"type": "error", "data": "rate limited"});
        assert!(matches!(parse_event(&error), Some(ProgressEvent::Error(_))));
    }

    #[test]
    fn unknown_event_kind_is_skipped() {
        assert!(parse_event(&json!({"type": "heartbeat"})).is_none());
        assert!(parse_event(&json!({"data": "no type"})).is_none());
    }
}
