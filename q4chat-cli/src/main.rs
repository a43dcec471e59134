mod chat;
mod prompt;
mod storage;

use std::path::Path;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use log::error;
use q4chat_inference::GenerationConfig;
use q4chat_quant::export_model;

use crate::chat::{ChatOptions, run_chat, run_chats, run_generate};
use crate::prompt::PromptTemplate;

/// Define the convert subcommand.
fn convert_subcommand() -> Command {
    Command::new("convert")
        .about("Convert a dense SafeTensors checkpoint to the packed 4-bit model format")
        .arg(Arg::new("MODEL_PATH")
            .help("Path to the dense model directory (containing config.json and *.safetensors)")
            .required(true)
            .index(1))
        .arg(Arg::new("OUTPUT_PATH")
            .help("Output path for the packed model file")
            .required(true)
            .index(2))
        .arg(Arg::new("group-size")
            .long("group-size")
            .short('g')
            .help("Quantization group size")
            .value_name("SIZE")
            .default_value("128"))
}

fn sampling_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("checkpoint")
                .help("Packed model file produced by convert")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("temperature")
                .short('t')
                .long("temperature")
                .value_name("FLOAT")
                .help("Temperature for sampling in [0, inf], 0 = greedy [default: 0.7]")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("top-p")
                .short('p')
                .long("top-p")
                .value_name("FLOAT")
                .help("Top-p for nucleus sampling in (0,1] [default: 0.95]")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("top-k")
                .short('k')
                .long("top-k")
                .value_name("INT")
                .help("Top-k candidates kept per step [default: 40]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("max-tokens")
                .short('n')
                .long("max-tokens")
                .value_name("INT")
                .help("Maximum new tokens per turn [default: 1024]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_name("INT")
                .help("Random seed")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Define the chat subcommand.
fn chat_subcommand() -> Command {
    sampling_args(Command::new("chat").about("Interactive streaming chat"))
        .arg(
            Arg::new("system")
                .short('y')
                .long("system")
                .value_name("STRING")
                .help("System prompt"),
        )
        .arg(
            Arg::new("chats-dir")
                .long("chats-dir")
                .value_name("DIR")
                .help("Directory for stored conversations")
                .default_value("data/chats"),
        )
        .arg(
            Arg::new("chat")
                .long("chat")
                .value_name("ID")
                .help("Resume a stored conversation by id"),
        )
        .arg(
            Arg::new("template")
                .long("template")
                .value_name("NAME")
                .help("Prompt template: default|simple")
                .default_value("default"),
        )
}

/// Define the chats subcommand.
fn chats_subcommand() -> Command {
    Command::new("chats")
        .about("List stored conversations, or delete one")
        .arg(
            Arg::new("chats-dir")
                .long("chats-dir")
                .value_name("DIR")
                .help("Directory for stored conversations")
                .default_value("data/chats"),
        )
        .arg(
            Arg::new("delete")
                .long("delete")
                .value_name("ID")
                .help("Delete the conversation with this id"),
        )
}

/// Define the generate subcommand.
fn generate_subcommand() -> Command {
    sampling_args(Command::new("generate").about("One-shot streaming completion")).arg(
        Arg::new("input")
            .short('i')
            .long("input")
            .value_name("STRING")
            .help("Input prompt")
            .required(true),
    )
}

/// Run the convert command with the provided arguments
fn run_convert_command(matches: &ArgMatches) -> Result<()> {
    let model_path = matches.get_one::<String>("MODEL_PATH").unwrap();
    let output_path = matches.get_one::<String>("OUTPUT_PATH").unwrap();
    let group_size: usize = matches
        .get_one::<String>("group-size")
        .unwrap()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid group size"))?;

    let model_dir = Path::new(model_path);
    if !model_dir.exists() {
        anyhow::bail!("Model directory does not exist: {model_path}");
    }
    if !model_dir.join("config.json").exists() {
        anyhow::bail!("config.json not found in model directory");
    }

    let has_safetensors = std::fs::read_dir(model_dir)?.any(|entry| {
        entry.is_ok_and(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "safetensors")
        })
    });
    if !has_safetensors {
        anyhow::bail!("No .safetensors files found in model directory");
    }

    export_model(model_dir, Path::new(output_path), group_size)
}

/// Builds the generation config shared by the chat and generate commands.
fn generation_config(matches: &ArgMatches, eos_token_id: usize) -> Result<GenerationConfig> {
    GenerationConfig::builder()
        .temperature(matches.get_one::<f32>("temperature").copied())
        .top_p(matches.get_one::<f32>("top-p").copied())
        .top_k(matches.get_one::<usize>("top-k").copied())
        .max_new_tokens(matches.get_one::<usize>("max-tokens").copied())
        .seed(matches.get_one::<u64>("seed").copied())
        .eos_token_id(eos_token_id)
        .build()
        .map_err(|e| anyhow::anyhow!(e))
}

fn run_chat_command(matches: &ArgMatches) -> Result<()> {
    let config = generation_config(matches, q4chat_quant::EOS_TOKEN_ID)?;

    let template = match matches.get_one::<String>("template").unwrap().as_str() {
        "default" => PromptTemplate::default(),
        "simple" => PromptTemplate::simple(),
        other => anyhow::bail!("Unknown prompt template: {other}"),
    };

    run_chat(ChatOptions {
        model_path: Path::new(matches.get_one::<String>("checkpoint").unwrap()),
        config,
        template,
        system_prompt: matches.get_one::<String>("system").map(String::as_str),
        chats_dir: Path::new(matches.get_one::<String>("chats-dir").unwrap()),
        chat_id: matches.get_one::<String>("chat").map(String::as_str),
    })
}

fn run_chats_command(matches: &ArgMatches) -> Result<()> {
    run_chats(
        Path::new(matches.get_one::<String>("chats-dir").unwrap()),
        matches.get_one::<String>("delete").map(String::as_str),
    )
}

fn run_generate_command(matches: &ArgMatches) -> Result<()> {
    let config = generation_config(matches, q4chat_quant::EOS_TOKEN_ID)?;
    let checkpoint = matches.get_one::<String>("checkpoint").unwrap();
    let input = matches.get_one::<String>("input").unwrap();

    run_generate(Path::new(checkpoint), config, input)
}

fn execute_commands() -> Result<()> {
    // Initialize logger with clean format (no timestamp/module prefix)
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "{}", record.args())
        })
        .init();

    let matches = Command::new("q4chat")
        .about("q4chat: a terminal chat client for 4-bit quantized language models")
        .subcommand(convert_subcommand())
        .subcommand(chat_subcommand())
        .subcommand(generate_subcommand())
        .subcommand(chats_subcommand())
        .get_matches();

    match matches.subcommand() {
        Some(("convert", matches)) => run_convert_command(matches),
        Some(("chat", matches)) => run_chat_command(matches),
        Some(("generate", matches)) => run_generate_command(matches),
        Some(("chats", matches)) => run_chats_command(matches),
        _ => anyhow::bail!("No subcommand specified. Use -h to print help information."),
    }
}

fn main() {
    if let Err(e) = execute_commands() {
        error!("Error: {e}");
        std::process::exit(1);
    }
}
