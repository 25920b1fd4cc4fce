use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use scene_agent::agent::SceneAgent;
use scene_agent::cancel::CancelFlag;
use scene_agent::conversation::Message;
use scene_agent::events::{AgentEvent, TurnOutcome};
use scene_agent::llm::ProviderRegistry;
use scene_agent::settings::{self, AgentSettings};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "scene-agent-cli", about = "Build ray-tracer scenes by talking to an LLM", version)]
struct Cli {
    /// Settings file (JSON). Missing file = defaults.
    #[arg(long, default_value = "scene-agent.json")]
    config: PathBuf,

    /// Provider name from the registry (defaults to the `llm` entry)
    #[arg(long)]
    provider: Option<String>,

    /// Model override for the default provider
    #[arg(long)]
    model: Option<String>,

    /// Model round trips allowed per prompt
    #[arg(long)]
    max_turns: Option<usize>,

    /// Print events as JSON lines instead of formatted text
    #[arg(long)]
    json: bool,

    /// Run a single prompt instead of reading prompts from stdin
    #[arg(long)]
    prompt: Option<String>,

    /// Print the final scene as JSON on exit
    #[arg(long)]
    dump_scene: bool,
}

fn load(cli: &Cli) -> Result<AgentSettings, String> {
    let mut settings = settings::load_settings(&cli.config).map_err(|e| format!("{}: {e}", cli.config.display()))?;
    if let Some(model) = &cli.model {
        settings.llm.model = Some(model.clone());
    }
    if let Some(max_turns) = cli.max_turns {
        settings.max_turns = max_turns;
    }
    settings.validate().map_err(|e| e.to_string())?;
    Ok(settings)
}

fn print_event(event: &AgentEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    match event {
        AgentEvent::Text { text, thought: true } => println!("(thinking) {text}"),
        AgentEvent::Text { text, thought: false } => println!("{text}"),
        AgentEvent::ToolStarted { tool, .. } => println!("  > {tool}..."),
        AgentEvent::ToolCompleted(c) if c.success => {
            let target = c.request.target_id().map(|id| format!(" {id}")).unwrap_or_default();
            println!("  ✓ {}{target} ({} ms)", c.request.name(), c.duration_ms);
        }
        AgentEvent::ToolCompleted(c) => {
            println!("  ✗ {}: {}", c.request.name(), c.errors.join("; "));
        }
        AgentEvent::UnknownTool { name, .. } => println!("  ✗ unknown tool {name}"),
        AgentEvent::SceneChanged { scene, .. } => {
            println!("  scene: {} shapes, {} lights", scene.shapes.len(), scene.lights.len());
        }
        AgentEvent::Error { message } => eprintln!("Error: {message}"),
        AgentEvent::Finished { outcome: TurnOutcome::TurnLimitReached, turns } => {
            eprintln!("[scene-agent] stopped after {turns} turns");
        }
        AgentEvent::Finished { .. } => {}
    }
}

fn print_received(received: Result<AgentEvent, RecvError>, json: bool) {
    match received {
        Ok(event) => print_event(&event, json),
        Err(RecvError::Lagged(n)) => eprintln!("[scene-agent] {n} events dropped"),
        Err(RecvError::Closed) => {}
    }
}

async fn run_prompt(
    agent: &mut SceneAgent,
    rx: &mut broadcast::Receiver<AgentEvent>,
    conversation: &mut Vec<Message>,
    cancel: &CancelFlag,
    json: bool,
) {
    let turn = agent.process_turn(conversation, cancel);
    tokio::pin!(turn);
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            received = rx.recv() => print_received(received, json),
        }
    };
    while let Ok(event) = rx.try_recv() {
        print_event(&event, json);
    }
    if let Err(e) = result {
        tracing::debug!(error = %e, "prompt ended with an error");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "scene_agent=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match load(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let registry = match ProviderRegistry::from_settings(&settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Set an API key in {} or SCENE_AGENT_API_KEY.", cli.config.display());
            process::exit(1);
        }
    };
    let provider = match &cli.provider {
        Some(name) => registry.get(name),
        None => registry.default_provider(),
    };
    let Some(provider) = provider else {
        eprintln!("Error: unknown provider. Available: {}", registry.names().join(", "));
        process::exit(1);
    };

    let mut agent = SceneAgent::new(provider, &settings);
    let mut rx = agent.events().subscribe();
    let mut conversation = Vec::new();

    // Ctrl-C cancels the prompt in flight.
    let current = Arc::new(Mutex::new(CancelFlag::new()));
    {
        let current = Arc::clone(&current);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                current.lock().cancel();
            }
        });
    }

    let mut prompts: Vec<String> = cli.prompt.iter().cloned().collect();
    let mut stdin = (prompts.is_empty()).then(|| BufReader::new(tokio::io::stdin()).lines());

    loop {
        let prompt = if let Some(lines) = stdin.as_mut() {
            match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    eprintln!("Error: {e}");
                    break;
                }
            }
        } else if let Some(p) = prompts.pop() {
            p
        } else {
            break;
        };
        let prompt = prompt.trim();
        if prompt.is_empty() {
            continue;
        }

        let cancel = CancelFlag::new();
        *current.lock() = cancel.clone();
        conversation.push(Message::user(prompt));
        run_prompt(&mut agent, &mut rx, &mut conversation, &cancel, cli.json).await;
    }

    if cli.dump_scene {
        match serde_json::to_string_pretty(&agent.snapshot()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}
