// Script debugger MCP server
//
// Exposes the debugger engine as Model Context Protocol tools over stdio,
// one JSON-RPC message per line

use anyhow::Result;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

mod handlers;
mod protocol;
mod session;
mod tools;

use handlers::RequestHandler;
use protocol::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Tracing to stderr only - stdout is reserved for JSON-RPC protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug_mcp=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting script debugger MCP server...");

    let handler = RequestHandler::new();

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    info!("Server ready, waiting for requests...");

    // Single-threaded message loop; debuggees run on their own threads
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!("Client disconnected");
                break;
            }
            Ok(_) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                debug!("Received: {}", line);

                let value = match serde_json::from_str::<Value>(line) {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Parse error: {}", e);
                        let response = JsonRpcResponse::failure(
                            Value::Null,
                            JsonRpcError::new(PARSE_ERROR, "Parse error"),
                        );
                        write_response(&mut stdout, &response).await?;
                        continue;
                    }
                };

                // Discriminate by id field
                if value.get("id").is_some() {
                    let response = match serde_json::from_value::<JsonRpcRequest>(value) {
                        Ok(request) => handler.handle_request(request).await,
                        Err(e) => {
                            error!("Invalid request: {}", e);
                            JsonRpcResponse::failure(
                                Value::Null,
                                JsonRpcError::new(INVALID_REQUEST, "Invalid request"),
                            )
                        }
                    };
                    write_response(&mut stdout, &response).await?;
                } else {
                    match serde_json::from_value::<JsonRpcNotification>(value) {
                        Ok(notification) => handler.handle_notification(notification).await,
                        Err(e) => error!("Invalid notification: {}", e),
                    }
                }
            }
            Err(e) => {
                error!("Read error: {}", e);
                break;
            }
        }
    }

    info!("Script debugger MCP server shutting down");
    Ok(())
}

async fn write_response<W>(out: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let text = serde_json::to_string(response)?;
    debug!("Sending: {}", text);
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
