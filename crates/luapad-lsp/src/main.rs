mod commands;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use commands::{surface_id, Command};
use luapad_eval::{Config, LineBuffer, Scratchpad};
use serde_json::json;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{self, ErrorCode};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct Backend {
    client: Client,
    documents: Arc<RwLock<HashMap<Url, String>>>,
    scratchpad: Arc<Mutex<Scratchpad>>,
}

impl Backend {
    fn new(client: Client, scratchpad: Scratchpad) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(HashMap::new())),
            scratchpad: Arc::new(Mutex::new(scratchpad)),
        }
    }

    // The guard is never held across an await point.
    fn lock_pad(&self) -> jsonrpc::Result<MutexGuard<'_, Scratchpad>> {
        self.scratchpad
            .lock()
            .map_err(|_| internal_error("scratchpad lock poisoned"))
    }

    async fn document(&self, uri: &Url) -> jsonrpc::Result<String> {
        let docs = self.documents.read().await;
        docs.get(uri)
            .cloned()
            .ok_or_else(|| jsonrpc::Error::invalid_params(format!("document not open: {}", uri)))
    }

    /// Run an evaluating command on a blocking thread and replace the whole
    /// document with the result.
    async fn run_command(&self, command: Command) -> jsonrpc::Result<usize> {
        let uri = command.uri().clone();
        let text = self.document(&uri).await?;

        let scratchpad = Arc::clone(&self.scratchpad);
        let task = tokio::task::spawn_blocking(move || {
            let mut pad = scratchpad
                .lock()
                .map_err(|_| "scratchpad lock poisoned".to_string())?;
            let mut buffer = LineBuffer::from_text(&text);
            let inserted = command.run(&mut pad, &mut buffer).map_err(|e| e.to_string())?;
            Ok::<_, String>((text, buffer.to_text(), inserted))
        });
        let (old_text, new_text, inserted) = task
            .await
            .map_err(|e| internal_error(format!("evaluation task failed: {}", e)))?
            .map_err(internal_error)?;

        if new_text != old_text {
            let edit = TextEdit {
                range: whole_document_range(&old_text),
                new_text: new_text.clone(),
            };
            let workspace_edit = WorkspaceEdit {
                changes: Some(HashMap::from([(uri.clone(), vec![edit])])),
                ..WorkspaceEdit::default()
            };
            let response = self.client.apply_edit(workspace_edit).await?;
            if !response.applied {
                tracing::warn!(%uri, reason = ?response.failure_reason, "edit rejected by client");
                return Ok(0);
            }
            self.documents.write().await.insert(uri, new_text);
        }
        Ok(inserted)
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        if let Some(options) = params.initialization_options {
            let config = Config::from_json_value(options)
                .map_err(|e| jsonrpc::Error::invalid_params(e.to_string()))?;
            let scratchpad = Scratchpad::new(config).map_err(|e| internal_error(e.to_string()))?;
            *self.lock_pad()? = scratchpad;
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions::default()),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: commands::ALL.iter().map(|name| name.to_string()).collect(),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                ..ServerCapabilities::default()
            },
            server_info: Some(ServerInfo {
                name: "luapad-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let _ = self.client.log_message(MessageType::INFO, "Luapad LSP ready").await;
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        {
            let mut docs = self.documents.write().await;
            docs.insert(uri.clone(), params.text_document.text);
        }
        if let Ok(mut pad) = self.lock_pad() {
            if pad.config().persist_environments {
                if let Err(e) = pad.open_or_create_surface_state(&surface_id(&uri)) {
                    tracing::warn!(%uri, "could not create environment: {}", e);
                }
            }
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params
            .content_changes
            .into_iter()
            .last()
            .map(|c| c.text)
            .unwrap_or_default();
        let mut docs = self.documents.write().await;
        docs.insert(uri, text);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.write().await.remove(&uri);
        if let Ok(mut pad) = self.lock_pad() {
            pad.discard_surface(&surface_id(&uri));
        }
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> jsonrpc::Result<Option<serde_json::Value>> {
        let command = Command::parse(&params.command, &params.arguments)
            .map_err(jsonrpc::Error::invalid_params)?;
        tracing::debug!(?command, "execute command");

        let inserted = if command.edits_document() {
            self.run_command(command).await?
        } else {
            let mut pad = self.lock_pad()?;
            let mut scratch = LineBuffer::new();
            command
                .run(&mut pad, &mut scratch)
                .map_err(|e| internal_error(e.to_string()))?
        };
        Ok(Some(json!({ "inserted": inserted })))
    }

    /// Show the value a name currently has in the document's environment.
    async fn hover(&self, params: HoverParams) -> jsonrpc::Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let text = {
            let docs = self.documents.read().await;
            match docs.get(&uri) {
                Some(text) => text.clone(),
                None => return Ok(None),
            }
        };
        let Some((range, word)) = word_at_position(&text, position) else {
            return Ok(None);
        };

        let pad = self.lock_pad()?;
        let Some(env) = pad.environment(&surface_id(&uri)) else {
            return Ok(None);
        };
        let value = env
            .lookup(&word, pad.config().max_depth)
            .map_err(|e| internal_error(e.to_string()))?;
        if value.is_nil() {
            return Ok(None);
        }

        Ok(Some(Hover {
            contents: HoverContents::Scalar(MarkedString::LanguageString(LanguageString {
                language: "lua".to_string(),
                value: format!("{} = {}", word, value.inspect()),
            })),
            range: Some(range),
        }))
    }

    /// Offer the names bound in the document's environment.
    async fn completion(
        &self,
        params: CompletionParams,
    ) -> jsonrpc::Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let pad = self.lock_pad()?;
        let Some(env) = pad.environment(&surface_id(&uri)) else {
            return Ok(Some(CompletionResponse::Array(Vec::new())));
        };
        let names = env.bindings().map_err(|e| internal_error(e.to_string()))?;
        let items = names
            .into_iter()
            .map(|name| CompletionItem {
                label: name,
                kind: Some(CompletionItemKind::VARIABLE),
                ..CompletionItem::default()
            })
            .collect();
        Ok(Some(CompletionResponse::Array(items)))
    }
}

fn internal_error(message: impl Into<String>) -> jsonrpc::Error {
    let message: String = message.into();
    jsonrpc::Error {
        code: ErrorCode::InternalError,
        message: message.into(),
        data: None,
    }
}

fn whole_document_range(text: &str) -> Range {
    Range {
        start: Position::new(0, 0),
        end: byte_offset_to_position(text, text.len()),
    }
}

/// Line and column (in chars) of a byte offset. Offsets past the end clamp
/// to the end of the text.
fn byte_offset_to_position(text: &str, byte_offset: usize) -> Position {
    let mut line = 0;
    let mut col = 0;

    for (idx, ch) in text.char_indices() {
        if idx >= byte_offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }

    Position::new(line as u32, col as u32)
}

fn word_at_position(text: &str, position: Position) -> Option<(Range, String)> {
    let Position { line, character } = position;
    let line = line as usize;
    let character = character as usize;

    let line_str = text.lines().nth(line)?;
    if character > line_str.len() {
        return None;
    }

    let bytes = line_str.as_bytes();
    let mut start = character;
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = character;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }

    if start == end || bytes[start].is_ascii_digit() {
        return None;
    }

    let word = line_str[start..end].to_string();
    let range = Range {
        start: Position::new(line as u32, start as u32),
        end: Position::new(line as u32, end as u32),
    };
    Some((range, word))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let scratchpad = Scratchpad::new(Config::default())?;
    let (stdin, stdout) = (tokio::io::stdin(), tokio::io::stdout());
    let (service, socket) = LspService::new(|client| Backend::new(client, scratchpad));
    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_offset_to_position() {
        let text = "a = 1\nbb = 2\n";
        assert_eq!(byte_offset_to_position(text, 0), Position::new(0, 0));
        assert_eq!(byte_offset_to_position(text, 4), Position::new(0, 4));
        assert_eq!(byte_offset_to_position(text, 6), Position::new(1, 0));
        assert_eq!(byte_offset_to_position(text, text.len()), Position::new(2, 0));
        assert_eq!(byte_offset_to_position(text, 100), Position::new(2, 0));
    }

    #[test]
    fn test_whole_document_range_without_trailing_newline() {
        let range = whole_document_range("x = 1\nprint(x)");
        assert_eq!(range.start, Position::new(0, 0));
        assert_eq!(range.end, Position::new(1, 8));
    }

    #[test]
    fn test_word_at_position() {
        let text = "local total = count + 1";
        let (range, word) = word_at_position(text, Position::new(0, 16)).unwrap();
        assert_eq!(word, "count");
        assert_eq!(range.start, Position::new(0, 14));
        assert_eq!(range.end, Position::new(0, 19));

        assert!(word_at_position(text, Position::new(0, 22)).is_none());
        assert!(word_at_position(text, Position::new(3, 0)).is_none());
    }
}
