//! MCP server over stdio: newline-delimited JSON-RPC 2.0 on stdin/stdout.

mod message;
mod tools;

use apprev_scraper::ReviewFetcher;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use self::message::{JsonRpcRequest, JsonRpcResponse, McpError, McpResult, RequestId, JSONRPC_VERSION};
use self::tools::ToolCallParams;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "apprev";

pub(crate) struct McpServer {
    fetcher: ReviewFetcher,
    cancel: CancellationToken,
}

impl McpServer {
    pub(crate) fn new(fetcher: ReviewFetcher, cancel: CancellationToken) -> Self {
        Self { fetcher, cancel }
    }

    /// Serve until stdin closes or the cancel token fires. Requests are
    /// handled one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin or stdout fails.
    pub(crate) async fn serve_stdio(&self) -> anyhow::Result<()> {
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        tracing::info!("MCP stdio server started");

        loop {
            line.clear();
            let bytes_read = tokio::select! {
                () = self.cancel.cancelled() => break,
                read = reader.read_line(&mut line) => read?,
            };
            if bytes_read == 0 {
                tracing::info!("EOF on stdin, shutting down");
                break;
            }

            if let Some(response) = self.handle_line(&line).await {
                let mut framed = serde_json::to_string(&response)?;
                framed.push('\n');
                stdout.write_all(framed.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one framed message. Returns the response to write, if any.
    pub(crate) async fn handle_line(&self, line: &str) -> Option<Value> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable message");
                return Some(error_value(RequestId::Null, &McpError::ParseError(e.to_string())));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(error_value(RequestId::Null, &McpError::InvalidRequest(e.to_string())));
            }
        };

        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "notification");
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            let err = McpError::InvalidRequest(format!("unsupported jsonrpc version {}", request.jsonrpc));
            return Some(error_value(id, &err));
        }

        Some(match self.dispatch(request).await {
            Ok(result) => serde_json::to_value(JsonRpcResponse::new(id, result)).unwrap_or_default(),
            Err(err) => error_value(id, &err),
        })
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::list_tools() })),
            "tools/call" => {
                let params: ToolCallParams = request
                    .params
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| McpError::InvalidParams(e.to_string()))?
                    .ok_or_else(|| McpError::InvalidParams("tool call params required".to_owned()))?;
                let result = tools::call(&self.fetcher, params, &self.cancel).await?;
                serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
            }
            other => Err(McpError::MethodNotFound(other.to_owned())),
        }
    }
}

fn error_value(id: RequestId, err: &McpError) -> Value {
    serde_json::to_value(err.to_json_rpc_error(id)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use apprev_scraper::RateLimiter;

    use super::*;

    fn server() -> McpServer {
        McpServer::new(
            ReviewFetcher::new(Arc::new(RateLimiter::new())),
            CancellationToken::new(),
        )
    }

    async fn roundtrip(line: &str) -> Value {
        server().handle_line(line).await.expect("expected a response")
    }

    #[tokio::test]
    async fn initialize_reports_tool_capability() {
        let response = roundtrip(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#).await;
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"]["serverInfo"]["name"], json!("apprev"));
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn lists_search_reviews_tool() {
        let response = roundtrip(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], json!("search_reviews"));
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["app_id", "store"]));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
        assert!(server().handle_line("   ").await.is_none());
    }

    #[tokio::test]
    async fn protocol_errors_use_json_rpc_codes() {
        let parse = roundtrip("{not json").await;
        assert_eq!(parse["error"]["code"], json!(-32700));
        assert_eq!(parse["id"], Value::Null);

        let unknown = roundtrip(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#).await;
        assert_eq!(unknown["error"]["code"], json!(-32601));

        let missing = roundtrip(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#).await;
        assert_eq!(missing["error"]["code"], json!(-32602));

        let bad_args = roundtrip(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"search_reviews","arguments":{"store":"android"}}}"#,
        )
        .await;
        assert_eq!(bad_args["error"]["code"], json!(-32602));

        let bad_date = roundtrip(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"search_reviews","arguments":{"app_id":"com.example.app","store":"android","date_from":"March 1"}}}"#,
        )
        .await;
        assert_eq!(bad_date["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn fetch_failures_become_error_results() {
        let response = roundtrip(
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"search_reviews","arguments":{"app_id":"com.example.app","store":"ios","limit":5}}}"#,
        )
        .await;
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], json!(true));
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("no source adapter registered for ios"), "{text}");
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let response = roundtrip(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).await;
        assert_eq!(response["result"], json!({}));
    }
}
