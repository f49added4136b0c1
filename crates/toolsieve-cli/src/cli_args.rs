//! CLI argument parsing for toolsieve.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use toolsieve_core::Channel;

#[derive(Parser, Clone, Debug)]
#[command(name = "toolsieve")]
#[command(about = "Separate tool-call JSON from prose in streamed LLM output")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Replay model output through the streaming sieve and print its events
    Stream(StreamArgs),
    /// Extract tool calls from a complete response
    Parse(ParseArgs),
    /// Print a request's messages with the tool instruction prompt injected
    Prompt(PromptArgs),
}

/// Where the allow-list of tool names comes from.
#[derive(Args, Clone, Debug, Default)]
pub struct ToolArgs {
    /// Allowed tool name (repeatable)
    #[arg(short, long = "tool", value_name = "NAME")]
    pub tools: Vec<String>,

    /// JSON file holding the request's `tools` array
    #[arg(long, value_name = "PATH")]
    pub tools_file: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct StreamArgs {
    /// Input file ("-" or omitted for stdin)
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub tool_args: ToolArgs,

    /// Re-split input into chunks of this many characters (0 keeps read sizes)
    #[arg(long, default_value_t = 0)]
    pub chunk_size: usize,

    /// Channel the input text arrives on
    #[arg(long, value_enum, default_value_t = ChannelArg::Content)]
    pub channel: ChannelArg,

    /// Output format
    #[arg(long, value_enum, default_value_t = StreamFormat::Jsonl)]
    pub format: StreamFormat,

    /// Override toolcall.mode (feature_match | off)
    #[arg(long, value_name = "MODE")]
    pub toolcall_mode: Option<String>,

    /// Override toolcall.early_emit_confidence (high | low | off)
    #[arg(long, value_name = "LEVEL")]
    pub early_emit: Option<String>,

    /// Override sieve.capture_limit
    #[arg(long, value_name = "BYTES")]
    pub capture_limit: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct ParseArgs {
    /// Input file ("-" or omitted for stdin)
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub tool_args: ToolArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = ParseFormat::Json)]
    pub format: ParseFormat,
}

#[derive(Args, Clone, Debug)]
pub struct PromptArgs {
    /// JSON file holding the request's `tools` array
    #[arg(long, value_name = "PATH")]
    pub tools_file: PathBuf,

    /// JSON file holding the request's `messages` array
    #[arg(long, value_name = "PATH")]
    pub messages: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelArg {
    Content,
    Thinking,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Content => Channel::Content,
            ChannelArg::Thinking => Channel::Thinking,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamFormat {
    /// One sieve event per line
    Jsonl,
    /// OpenAI chat.completion.chunk server-sent events
    Openai,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseFormat {
    /// Parsed calls as a JSON array
    Json,
    /// OpenAI chat.completion message
    Openai,
}
