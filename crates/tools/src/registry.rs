//! Tool registry — maps a tool name to its LLM-facing definition, the
//! capability string the permission policy evaluates, and the executor
//! that actually runs it.
//!
//! The registry owns no policy decisions itself; callers ask
//! [`ToolRegistry::capability_for`] for the effective capability (accounting
//! for argument-based escalation) and evaluate it against a [`crate::ToolPolicy`]
//! before calling [`ToolRegistry::execute`].

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use sa_domain::error::{Error, Result};
use sa_domain::tool::ToolDefinition;

use crate::exec::{self, ExecRequest};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest,
    FileReadRequest, FileWriteRequest,
};
use crate::manager::ProcessManager;
use crate::process::{self, ProcessRequest};

/// A single registered tool: its LLM-facing shape plus the metadata the
/// permission bridge needs to gate it.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub definition: ToolDefinition,
    /// Base capability string, e.g. `"shell.run"`. May be escalated per
    /// invocation — see [`ToolRegistry::capability_for`].
    pub capability: String,
    /// Argument names the tool requires to run at all.
    pub required: &'static [&'static str],
}

/// Maps tool names to their definitions and executors.
///
/// Built once at startup from the exec/process/file-op tools this crate
/// already implements; the gateway's agent loop is the only caller.
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    process_manager: Arc<ProcessManager>,
    workspace_root: PathBuf,
}

impl ToolRegistry {
    pub fn new(process_manager: Arc<ProcessManager>, workspace_root: PathBuf) -> Self {
        Self {
            specs: builtin_specs(),
            process_manager,
            workspace_root,
        }
    }

    /// The manifest handed to the LLM as `ChatRequest.tools`.
    pub fn manifest(&self) -> Vec<ToolDefinition> {
        self.specs.iter().map(|s| s.definition.clone()).collect()
    }

    /// The workspace root file tools are sandboxed to, for callers that
    /// need to build their own preview of a pending file operation (e.g.
    /// a diff against the file's current content) ahead of execution.
    pub fn workspace_root(&self) -> &std::path::Path {
        &self.workspace_root
    }

    /// Look up a tool's spec by name.
    pub fn get(&self, name: &str) -> Result<&ToolSpec> {
        self.specs
            .iter()
            .find(|s| s.definition.name == name)
            .ok_or_else(|| Error::UnknownTool(name.to_owned()))
    }

    /// Argument names required by `name` but absent from `args`. Empty if
    /// `name` is unregistered (the caller should have already called
    /// [`Self::get`] to produce the `unknown_tool` error in that case).
    pub fn missing_args(&self, name: &str, args: &Value) -> Vec<String> {
        let Ok(spec) = self.get(name) else {
            return Vec::new();
        };
        spec.required
            .iter()
            .filter(|field| args.get(**field).is_none())
            .map(|field| field.to_string())
            .collect()
    }

    /// The capability to evaluate against policy for this invocation.
    /// Some tools escalate based on arguments — a shell command containing
    /// a redirection writes to the filesystem even though `exec` itself is
    /// read-agnostic, so it escalates `shell.run` to `shell.write`.
    pub fn capability_for(&self, name: &str, args: &Value) -> Option<String> {
        let spec = self.specs.iter().find(|s| s.definition.name == name)?;
        if name == "exec" {
            if let Some(command) = args.get("command").and_then(Value::as_str) {
                if command_has_redirection(command) {
                    return Some("shell.write".to_string());
                }
            }
        }
        Some(spec.capability.clone())
    }

    /// Execute a registered tool with a plain JSON argument map.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        match name {
            "exec" => {
                let req: ExecRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                let resp = exec::exec(&self.process_manager, req).await;
                serde_json::to_value(resp).map_err(|e| tool_execution_error(name, e))
            }
            "process" => {
                let req: ProcessRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                let resp = process::handle_process(&self.process_manager, req).await;
                serde_json::to_value(resp).map_err(|e| tool_execution_error(name, e))
            }
            "file_read" => {
                let req: FileReadRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                file_ops::file_read(&self.workspace_root, req)
                    .await
                    .map_err(|msg| tool_execution_message(name, msg))
            }
            "file_write" => {
                let req: FileWriteRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                file_ops::file_write(&self.workspace_root, req)
                    .await
                    .map_err(|msg| tool_execution_message(name, msg))
            }
            "file_append" => {
                let req: FileAppendRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                file_ops::file_append(&self.workspace_root, req)
                    .await
                    .map_err(|msg| tool_execution_message(name, msg))
            }
            "file_move" => {
                let req: FileMoveRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                file_ops::file_move(&self.workspace_root, req)
                    .await
                    .map_err(|msg| tool_execution_message(name, msg))
            }
            "file_delete" => {
                let req: FileDeleteRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                file_ops::file_delete(&self.workspace_root, req)
                    .await
                    .map_err(|msg| tool_execution_message(name, msg))
            }
            "file_list" => {
                let req: FileListRequest = serde_json::from_value(args)
                    .map_err(|e| tool_execution_error(name, e))?;
                file_ops::file_list(&self.workspace_root, req)
                    .await
                    .map_err(|msg| tool_execution_message(name, msg))
            }
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}

fn tool_execution_error(tool: &str, e: impl std::fmt::Display) -> Error {
    Error::ToolExecution {
        tool: tool.to_string(),
        message: e.to_string(),
    }
}

fn tool_execution_message(tool: &str, message: String) -> Error {
    Error::ToolExecution {
        tool: tool.to_string(),
        message,
    }
}

/// Whether a shell command redirects output to the filesystem, pipes to a
/// file-writing command, or otherwise mutates state beyond reading it.
fn command_has_redirection(command: &str) -> bool {
    const MARKERS: &[&str] = &[">", ">>", "tee ", "rm ", "mv ", "cp ", "mkdir ", "| tee"];
    MARKERS.iter().any(|m| command.contains(m))
}

fn builtin_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            definition: ToolDefinition {
                name: "exec".into(),
                description: "Run a shell command, waiting briefly for it to finish before \
                    auto-backgrounding. Returns a session id for long-running commands."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": { "type": "string", "description": "Shell command to run." },
                        "background": { "type": "boolean", "description": "Start backgrounded immediately." },
                        "yield_ms": { "type": "integer", "description": "Milliseconds to wait before auto-backgrounding." },
                        "timeout_sec": { "type": "integer", "description": "Hard timeout in seconds." },
                        "workdir": { "type": "string", "description": "Working directory for the command." },
                        "env": {
                            "type": "object",
                            "additionalProperties": { "type": "string" },
                            "description": "Extra environment variables."
                        }
                    },
                    "required": ["command"]
                }),
            },
            capability: "shell.run".into(),
            required: &["command"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "process".into(),
                description: "Manage a background process session started by `exec` \
                    (list, poll, log, write stdin, kill, clear, remove)."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]
                        },
                        "session_id": { "type": "string" },
                        "offset": { "type": "integer" },
                        "limit": { "type": "integer" },
                        "tail_lines": { "type": "integer" },
                        "data": { "type": "string" },
                        "eof": { "type": "boolean" }
                    },
                    "required": ["action"]
                }),
            },
            capability: "process.manage".into(),
            required: &["action"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "file_read".into(),
                description: "Read a file's contents, optionally a line range.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "offset": { "type": "integer", "description": "0-indexed line to start from." },
                        "limit": { "type": "integer", "description": "Max lines to return." }
                    },
                    "required": ["path"]
                }),
            },
            capability: "filesystem.read".into(),
            required: &["path"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "file_write".into(),
                description: "Create or overwrite a file with the given content.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }),
            },
            capability: "filesystem.write".into(),
            required: &["path", "content"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "file_append".into(),
                description: "Append content to the end of an existing (or new) file.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }),
            },
            capability: "filesystem.write".into(),
            required: &["path", "content"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "file_move".into(),
                description: "Move or rename a file or directory.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "destination": { "type": "string" }
                    },
                    "required": ["source", "destination"]
                }),
            },
            capability: "filesystem.write".into(),
            required: &["source", "destination"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "file_delete".into(),
                description: "Delete a file or empty directory.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" }
                    },
                    "required": ["path"]
                }),
            },
            capability: "filesystem.write".into(),
            required: &["path"],
        },
        ToolSpec {
            definition: ToolDefinition {
                name: "file_list".into(),
                description: "List directory entries with size/modified-time metadata.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Defaults to the workspace root." }
                    }
                }),
            },
            capability: "filesystem.list".into(),
            required: &[],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::ExecConfig;

    fn registry() -> (ToolRegistry, tempfile::TempDir) {
        let ws = tempfile::TempDir::new().expect("tempdir");
        let manager = Arc::new(ProcessManager::new(ExecConfig::default()));
        (ToolRegistry::new(manager, ws.path().to_path_buf()), ws)
    }

    #[test]
    fn manifest_lists_all_builtin_tools() {
        let (registry, _ws) = registry();
        let names: Vec<&str> = registry
            .manifest()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert!(names.contains(&"exec"));
        assert!(names.contains(&"file_read"));
        assert!(names.contains(&"file_write"));
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn get_unknown_tool_errors() {
        let (registry, _ws) = registry();
        let err = registry.get("does_not_exist").unwrap_err();
        assert_eq!(err.as_wire_code(), "unknown_tool");
    }

    #[test]
    fn missing_args_reports_absent_required_fields() {
        let (registry, _ws) = registry();
        let missing = registry.missing_args("file_write", &serde_json::json!({ "path": "a.txt" }));
        assert_eq!(missing, vec!["content".to_string()]);
    }

    #[test]
    fn missing_args_empty_when_all_present() {
        let (registry, _ws) = registry();
        let missing = registry.missing_args(
            "file_write",
            &serde_json::json!({ "path": "a.txt", "content": "hi" }),
        );
        assert!(missing.is_empty());
    }

    #[test]
    fn capability_for_exec_escalates_on_redirection() {
        let (registry, _ws) = registry();
        let plain = registry
            .capability_for("exec", &serde_json::json!({ "command": "ls -la" }))
            .unwrap();
        assert_eq!(plain, "shell.run");

        let redirect = registry
            .capability_for("exec", &serde_json::json!({ "command": "echo hi > out.txt" }))
            .unwrap();
        assert_eq!(redirect, "shell.write");
    }

    #[test]
    fn capability_for_file_read_is_stable() {
        let (registry, _ws) = registry();
        let cap = registry
            .capability_for("file_read", &serde_json::json!({ "path": "a.txt" }))
            .unwrap();
        assert_eq!(cap, "filesystem.read");
    }

    #[tokio::test]
    async fn execute_file_write_then_read_roundtrip() {
        let (registry, _ws) = registry();
        registry
            .execute(
                "file_write",
                serde_json::json!({ "path": "note.txt", "content": "hello" }),
            )
            .await
            .expect("write failed");

        let result = registry
            .execute("file_read", serde_json::json!({ "path": "note.txt" }))
            .await
            .expect("read failed");
        assert_eq!(result["content"], "hello");
    }

    #[tokio::test]
    async fn execute_unknown_tool_errors() {
        let (registry, _ws) = registry();
        let err = registry
            .execute("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.as_wire_code(), "unknown_tool");
    }
}
