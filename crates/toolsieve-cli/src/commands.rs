//! Subcommand handlers.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use toolsieve_config::Config;
use toolsieve_core::{extract_tool_names, inject_tool_prompt, parse_tool_calls, Channel, StreamPart, ToolCallStream};

use crate::cli_args::{ParseArgs, ParseFormat, PromptArgs, StreamArgs, ToolArgs};
use crate::input::{split_chars, TextReader};
use crate::render::{openai_completion, EventRenderer};

pub async fn run_stream(args: StreamArgs, config: &Config) -> Result<()> {
    let tool_names = resolve_tool_names(&args.tool_args).await?;
    let policy = config.tool_call_policy()?;
    debug!(
        "Streaming with {} tool name(s), policy {:?}, chunk size {}",
        tool_names.len(),
        policy,
        args.chunk_size
    );

    let mut stream = ToolCallStream::with_options(tool_names, policy, config.sieve_options());
    let mut renderer = EventRenderer::new(args.format);
    let mut reader = TextReader::open(args.input.as_deref()).await?;
    let channel = Channel::from(args.channel);

    while let Some(text) = reader.next_text().await? {
        for piece in split_chars(&text, args.chunk_size) {
            let part = StreamPart {
                channel,
                text: piece.to_string(),
            };
            for event in stream.push(&part) {
                if let Some(line) = renderer.render(&event)? {
                    println!("{}", line);
                }
            }
        }
    }

    let finished = stream.finish();
    for event in &finished.events {
        if let Some(line) = renderer.render(event)? {
            println!("{}", line);
        }
    }
    for line in renderer.finish(finished.finish_reason)? {
        println!("{}", line);
    }
    info!("Stream finished: {}", finished.finish_reason.as_str());
    Ok(())
}

pub async fn run_parse(args: ParseArgs, config: &Config) -> Result<()> {
    let tool_names = resolve_tool_names(&args.tool_args).await?;
    let policy = config.tool_call_policy()?;
    let text = TextReader::open(args.input.as_deref()).await?.read_all().await?;

    let calls = if policy.enabled && !tool_names.is_empty() {
        parse_tool_calls(&text, &tool_names)
    } else {
        debug!("Tool call detection disabled; treating input as plain text");
        Vec::new()
    };
    info!("Found {} tool call(s)", calls.len());

    let output = match args.format {
        ParseFormat::Json => serde_json::to_value(&calls)?,
        ParseFormat::Openai => openai_completion(&text, &calls),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn run_prompt(args: PromptArgs) -> Result<()> {
    let tools = read_tools_file(&args.tools_file).await?;
    let mut messages = match &args.messages {
        Some(path) => match read_json(path).await? {
            Value::Array(messages) => messages,
            _ => bail!("{} must hold a JSON array of messages", path.display()),
        },
        None => Vec::new(),
    };

    let tool_names = inject_tool_prompt(&mut messages, &tools);
    let output = json!({
        "messages": messages,
        "tool_names": tool_names,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Allow-list from `--tools-file` followed by `--tool` flags, without duplicates.
pub async fn resolve_tool_names(args: &ToolArgs) -> Result<Vec<String>> {
    let mut names = match &args.tools_file {
        Some(path) => extract_tool_names(&read_tools_file(path).await?),
        None => Vec::new(),
    };
    for name in &args.tools {
        let name = name.trim();
        if !name.is_empty() && !names.iter().any(|known| known == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// A tools file holds either the `tools` array itself or a request body with one.
async fn read_tools_file(path: &Path) -> Result<Vec<Value>> {
    match read_json(path).await? {
        Value::Array(tools) => Ok(tools),
        Value::Object(mut body) => match body.remove("tools") {
            Some(Value::Array(tools)) => Ok(tools),
            _ => bail!("{} has no `tools` array", path.display()),
        },
        _ => bail!("{} must hold a JSON array of tools", path.display()),
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {} as JSON", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_tool_names_merges_file_and_flags() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tools.json");
        fs::write(
            &path,
            r#"{"model":"x","tools":[{"type":"function","function":{"name":"search"}},{"name":"read"}]}"#,
        )
        .unwrap();

        let args = ToolArgs {
            tools: vec!["read".to_string(), " shell ".to_string(), String::new()],
            tools_file: Some(path),
        };
        let names = resolve_tool_names(&args).await.unwrap();
        assert_eq!(names, vec!["search", "read", "shell"]);
    }

    #[tokio::test]
    async fn test_tools_file_must_be_array_or_request() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tools.json");
        fs::write(&path, "42").unwrap();
        assert!(read_tools_file(&path).await.is_err());
    }
}
