//! JSON request/response envelope in front of the registry.
//!
//! This is the seam a route layer calls into: one [`Request`] in, one
//! [`Response`] out. Every failure is reported inside the response; nothing
//! here tears down the registry.

use serde::{Deserialize, Serialize};

use crate::toolbox::{ErrorKind, Phase, RunReport, ToolController, ToolParams, ToolRegistry, ToolboxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Run,
    Status,
    Results,
    Stop,
    Rulesets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub op: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool options with camelCase keys; only read by `run`.
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rulesets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn ok() -> Self {
        Self {
            ok: true,
            phase: None,
            report: None,
            rulesets: None,
            error: None,
        }
    }

    fn with_phase(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::ok()
        }
    }

    fn with_report(report: RunReport) -> Self {
        Self {
            report: Some(report),
            ..Self::ok()
        }
    }

    fn with_rulesets(rulesets: Vec<String>) -> Self {
        Self {
            rulesets: Some(rulesets),
            ..Self::ok()
        }
    }

    pub fn from_error(err: &ToolboxError) -> Self {
        Self {
            ok: false,
            error: Some(ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
            }),
            ..Self::ok()
        }
    }

    /// Envelope for a line that was not a valid request at all.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::from_error(&ToolboxError::invalid(message))
    }
}

/// Routes requests to the registry's controllers.
pub struct Dispatcher {
    registry: ToolRegistry,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn handle(&self, request: Request) -> Response {
        tracing::debug!(op = ?request.op, tool = ?request.tool, "dispatch");
        match self.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(kind = ?err.kind(), error = %err, "request failed");
                Response::from_error(&err)
            }
        }
    }

    /// Decode one JSON line, dispatch it and encode the response.
    pub async fn handle_line(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(err) => Response::malformed(format!("malformed request: {err}")),
        };
        serde_json::to_string(&response).unwrap_or_else(|err| encode_failure(&err.to_string()))
    }

    async fn execute(&self, request: Request) -> Result<Response, ToolboxError> {
        let Request { op, tool, params } = request;
        match op {
            Operation::Rulesets => Ok(Response::with_rulesets(self.registry.rulesets())),
            Operation::Run => {
                let controller = self.controller(tool.as_deref())?;
                let params = ToolParams::from_json(controller.tool(), params)?;
                controller.configure(params).await;
                controller.start().await?;
                Ok(Response::ok())
            }
            Operation::Status => {
                let controller = self.controller(tool.as_deref())?;
                Ok(Response::with_phase(controller.status().await))
            }
            Operation::Results => {
                let controller = self.controller(tool.as_deref())?;
                Ok(Response::with_report(controller.results().await?))
            }
            Operation::Stop => {
                self.controller(tool.as_deref())?.stop().await?;
                Ok(Response::ok())
            }
        }
    }

    fn controller(&self, tool: Option<&str>) -> Result<std::sync::Arc<ToolController>, ToolboxError> {
        let tool = tool.ok_or_else(|| ToolboxError::invalid("missing `tool`"))?;
        self.registry.resolve(tool)
    }
}

/// Hand-built error envelope for when a response cannot be serialized.
fn encode_failure(message: &str) -> String {
    serde_json::json!({
        "ok": false,
        "error": {"kind": ErrorKind::InvalidParameters, "message": message},
    })
    .to_string()
}
