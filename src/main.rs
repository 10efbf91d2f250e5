use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod io;
mod llm;
mod ops;
mod render;
mod session;

use anyhow::Context as _;
use config::Credentials;
use llm::{RouteMode, Router};

const SYSTEM_PROMPT: &str = "\
You are an autonomous coding architect for Flutter/Dart projects.
Your duties: writing Dart code, managing project files, and debugging.
You may act on the file system by emitting these tags:
1. Write or update a file: [WRITE_FILE: path/file.dart] code [/WRITE_FILE]
2. Remove a file or folder: [REMOVE: path/to/target]
3. Rename or move: [RENAME: old_path -> new_path]
4. Create a folder: [CREATE_FOLDER: path/folder]
Give a short [LOG: reason] before acting.";

#[derive(Parser, Debug, Clone)]
#[command(name = "ds", version, about = "Chat-driven project assistant with provider failover", long_about = None)]
struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long = "json", global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Timeout (seconds) for network requests
    #[arg(long = "timeout", global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Ask one question and apply any file actions from the reply
    Ask(AskArgs),

    /// Interactive multi-turn chat
    Chat(ChatArgs),

    /// Parse and apply command tags from a file or stdin (no provider call)
    Apply(ApplyArgs),

    /// Print the project tree snapshot sent to the model
    Context(ContextArgs),

    /// Run the syntax validator on one file
    Check(CheckArgs),

    /// Inspect or clear the conversation history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// Stage, commit, and push the working tree
    Push(PushArgs),
}

#[derive(Args, Debug, Clone)]
struct AskArgs {
    /// The prompt; `@file` mentions pull file contents into context
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Provider routing: auto, gemini, or speed
    #[arg(long)]
    mode: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ChatArgs {
    /// Provider routing: auto, gemini, or speed
    #[arg(long)]
    mode: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ApplyArgs {
    /// File with tagged commands; stdin when omitted
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ContextArgs {
    /// Maximum folder depth to descend
    #[arg(long)]
    depth: Option<usize>,

    /// Maximum number of listing lines
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct CheckArgs {
    file: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
enum HistoryCommands {
    /// Print the stored turns
    Show,
    /// Delete the history file
    Clear,
}

#[derive(Args, Debug, Clone)]
struct PushArgs {
    /// Commit message
    #[arg(short = 'm', long = "message")]
    message: Option<String>,
}

#[derive(Debug, Clone)]
struct GlobalOpts {
    json: bool,
    verbose: u8,
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Cli { json, verbose, timeout_secs, command } = cli;
    let globals = GlobalOpts { json, verbose, timeout_secs };

    let result = match command {
        Commands::Ask(args) => cmd_ask(&globals, args).await,
        Commands::Chat(args) => cmd_chat(&globals, args).await,
        Commands::Apply(args) => cmd_apply(&globals, args).await,
        Commands::Context(args) => cmd_context(&globals, args).await,
        Commands::Check(args) => cmd_check(&globals, args).await,
        Commands::History { command } => cmd_history(&globals, command).await,
        Commands::Push(args) => cmd_push(&globals, args).await,
    };

    if let Err(e) = result {
        if globals.json {
            let (code, hint) = classify_error(&e);
            render::print_json_error(&code, &e.to_string(), hint.as_deref());
        } else {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn classify_error(e: &anyhow::Error) -> (String, Option<String>) {
    let msg = e.to_string().to_lowercase();
    if msg.contains("file not found") || msg.contains("no such file") {
        return ("file_not_found".to_string(), Some("check the file path".to_string()));
    }
    if msg.contains("unknown mode") {
        return ("invalid_args".to_string(), Some("expected auto, gemini, or speed".to_string()));
    }
    if msg.contains("timed out") || msg.contains("timeout") {
        return ("timeout".to_string(), Some("try increasing --timeout or check network".to_string()));
    }
    if msg.contains("git ") {
        return ("git_failed".to_string(), None);
    }
    ("unknown".to_string(), None)
}

fn resolve_mode(arg: Option<&str>) -> anyhow::Result<RouteMode> {
    match arg {
        None => Ok(RouteMode::Auto),
        Some(s) => RouteMode::from_str(s)
            .with_context(|| format!("unknown mode: {}", s)),
    }
}

fn build_router(cfg: &config::AppConfig, globals: &GlobalOpts) -> anyhow::Result<Router> {
    // Offline seam for tests and demos.
    if let Ok(reply) = std::env::var("DS_MOCK_REPLY") {
        return Ok(Router::mock(reply));
    }
    Router::new(
        Credentials::from_env(),
        cfg.models.clone(),
        SYSTEM_PROMPT.to_string(),
        globals.timeout_secs.map(Duration::from_secs),
    )
}

/// One full chat turn: context assembly, routing, action application,
/// presentation, and history persistence.
async fn run_turn(
    globals: &GlobalOpts,
    cfg: &config::AppConfig,
    router: &Router,
    prompt: &str,
    mode: RouteMode,
) -> anyhow::Result<()> {
    let root = std::env::current_dir().context("resolving working directory")?;

    let tree = io::project_tree(&root, cfg.tree.max_depth, cfg.tree.max_entries);
    let mentions = io::read_mentioned_files(prompt, &root);
    let full_prompt = format!("[PROJECT TREE]\n{}\n\n{}{}", tree, prompt, mentions);
    if globals.verbose > 0 {
        eprintln!("context: {} tree lines, {} mention bytes", tree.lines().count(), mentions.len());
    }

    let history_path = session::history_path(&root);
    let mut history = session::load(&history_path)?;

    let reply = router.complete(&full_prompt, &history, mode).await;

    let operations = ops::parse(&reply.text);
    let runner = io::ActionRunner::new(
        root,
        cfg.protected_paths(),
        Some(io::SyntaxValidator::default()),
    );
    let actions = runner.apply(&operations).await;
    let display = ops::strip_actions(&reply.text);

    // History keeps the raw exchange, not the augmented prompt.
    session::append_exchange(&mut history, prompt, &reply.text, cfg.history.window);
    session::save(&history_path, &history)?;

    render::print_turn(globals.json, &display, &actions, &reply.model_id);
    Ok(())
}

async fn cmd_ask(globals: &GlobalOpts, args: AskArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("empty prompt; provide text, e.g. ds ask \"add a settings screen\"");
    }
    let mode = resolve_mode(args.mode.as_deref())?;
    let cfg = config::load_config()?;
    let router = build_router(&cfg, globals)?;
    run_turn(globals, &cfg, &router, &prompt, mode).await
}

async fn cmd_chat(globals: &GlobalOpts, args: ChatArgs) -> anyhow::Result<()> {
    use std::io::Write as _;
    dotenvy::dotenv().ok();

    let mode = resolve_mode(args.mode.as_deref())?;
    let cfg = config::load_config()?;
    let router = build_router(&cfg, globals)?;

    println!("chatting (Ctrl+C or /exit to leave)");
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut input = String::new();
        let n = std::io::stdin().read_line(&mut input)?;
        if n == 0 {
            eprintln!("exiting chat");
            break;
        }
        let prompt = input.trim().to_string();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt.as_str(), "/exit" | "exit" | "/quit" | "quit") {
            eprintln!("bye");
            break;
        }
        run_turn(globals, &cfg, &router, &prompt, mode).await?;
    }
    Ok(())
}

async fn cmd_apply(globals: &GlobalOpts, args: ApplyArgs) -> anyhow::Result<()> {
    let text = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("file not found: {}", path.display()))?,
        None => {
            use std::io::Read as _;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let cfg = config::load_config()?;
    let root = std::env::current_dir().context("resolving working directory")?;
    let runner = io::ActionRunner::new(
        root,
        cfg.protected_paths(),
        Some(io::SyntaxValidator::default()),
    );
    let actions = runner.apply(&ops::parse(&text)).await;
    render::print_actions(globals.json, &actions);
    Ok(())
}

async fn cmd_context(globals: &GlobalOpts, args: ContextArgs) -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    let root = std::env::current_dir().context("resolving working directory")?;
    let depth = args.depth.unwrap_or(cfg.tree.max_depth);
    let limit = args.limit.unwrap_or(cfg.tree.max_entries);
    let tree = io::project_tree(&root, depth, limit);
    if globals.json {
        #[derive(serde::Serialize)]
        struct Out<'a> {
            tree: &'a str,
        }
        render::print_json(&Out { tree: &tree });
    } else {
        println!("{}", tree);
    }
    Ok(())
}

async fn cmd_check(globals: &GlobalOpts, args: CheckArgs) -> anyhow::Result<()> {
    let validator = io::SyntaxValidator::default();
    let (passed, msg) = validator.check(&args.file).await;
    if globals.json {
        #[derive(serde::Serialize)]
        struct Out<'a> {
            passed: bool,
            message: &'a str,
        }
        render::print_json(&Out { passed, message: &msg });
    } else {
        let marker = if passed { "✅" } else { "❌" };
        println!("{} {} ({})", marker, args.file.display(), msg);
    }
    Ok(())
}

async fn cmd_history(globals: &GlobalOpts, command: HistoryCommands) -> anyhow::Result<()> {
    let root = std::env::current_dir().context("resolving working directory")?;
    let path = session::history_path(&root);
    match command {
        HistoryCommands::Show => {
            let turns = session::load(&path)?;
            if globals.json {
                render::print_json(&turns);
            } else if turns.is_empty() {
                println!("history is empty");
            } else {
                for turn in &turns {
                    println!("[{}] {}", turn.role, turn.text);
                }
            }
        }
        HistoryCommands::Clear => {
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("removing history file: {}", path.display()))?;
            }
            println!("history cleared");
        }
    }
    Ok(())
}

async fn cmd_push(globals: &GlobalOpts, args: PushArgs) -> anyhow::Result<()> {
    let message = args.message.unwrap_or_else(|| "Automated update from ds-assistant".to_string());
    let log = io::git::commit_and_push(&message)?;
    if globals.json {
        #[derive(serde::Serialize)]
        struct Out<'a> {
            log: &'a str,
        }
        render::print_json(&Out { log: &log });
    } else {
        println!("🚀 {}", log);
    }
    Ok(())
}
