//! policy-pilot: command-line client for the PolicyPilot service.
//! Default mode is an interactive chat REPL over the streaming WebSocket;
//! `categories` and `upload <category> <file.pdf>` talk to the HTTP API.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use policy_pilot_client::{config, ApiClient, Role, Session, SessionPhase};
use tokio::sync::watch;

fn resolve_config_path(args: &[String]) -> PathBuf {
    // 1. --config <path> flag
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(pos + 1) {
            return PathBuf::from(path);
        }
    }
    // 2. POLICY_PILOT_CONFIG env var
    if let Ok(val) = std::env::var("POLICY_PILOT_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.policy-pilot/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or POLICY_PILOT_CONFIG)");
        process::exit(1);
    })
}

/// Positional arguments with the `--config <path>` pair stripped out.
fn positional_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in &args[1..] {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--config" {
            skip = true;
            continue;
        }
        out.push(arg.clone());
    }
    out
}

fn load_config(path: &PathBuf) -> config::Config {
    if !path.exists() {
        // Missing config is fine: everything has a default.
        return config::Config::default();
    }
    match config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to load config from {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = resolve_config_path(&args);
    let cfg = load_config(&config_path);
    let positionals = positional_args(&args);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    match positionals.first().map(String::as_str) {
        None => run_chat(&rt, &cfg),
        Some("categories") => run_categories(&rt, &cfg),
        Some("upload") => {
            let (category, file) = match (positionals.get(1), positionals.get(2)) {
                (Some(c), Some(f)) => (c.clone(), PathBuf::from(f)),
                _ => {
                    eprintln!("Usage: policy-pilot upload <category> <file.pdf>");
                    process::exit(2);
                }
            };
            run_upload(&rt, &cfg, &category, &file)
        }
        Some(other) => {
            eprintln!("Error: unknown command: {}", other);
            eprintln!("Usage: policy-pilot [--config <path>] [categories | upload <category> <file.pdf>]");
            process::exit(2);
        }
    }
}

// ── HTTP commands ───────────────────────────────────────────────────────

fn run_categories(rt: &tokio::runtime::Runtime, cfg: &config::Config) {
    let api = ApiClient::new(&cfg.api_base_url());
    match rt.block_on(api.list_categories()) {
        Ok(categories) => {
            for category in categories {
                println!("{}", category);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_upload(
    rt: &tokio::runtime::Runtime,
    cfg: &config::Config,
    category: &str,
    file: &std::path::Path,
) {
    let api = ApiClient::new(&cfg.api_base_url());
    match rt.block_on(api.upload_document(category, file)) {
        Ok(receipt) => {
            println!("{} ({} -> {})", receipt.message, receipt.filename, receipt.category);
        }
        Err(e) => {
            eprintln!("Error: upload failed: {}", e);
            process::exit(1);
        }
    }
}

// ── Chat REPL ───────────────────────────────────────────────────────────

fn run_chat(rt: &tokio::runtime::Runtime, cfg: &config::Config) {
    let url = cfg.ws_url();
    // Session::start spawns tasks, so it needs the runtime context; the
    // guard must not outlive this block or block_on below would panic.
    let session = {
        let _guard = rt.enter();
        Session::start(&url)
    };
    let mut updates = session.updates();

    let connected = rt.block_on(wait_for_phase(
        &session,
        &mut updates,
        SessionPhase::Ready,
        Duration::from_secs(5),
    ));
    if !connected {
        eprintln!("Error: connection failed: {} is not reachable", url);
        process::exit(1);
    }

    println!("{}", "=".repeat(60));
    println!("  PolicyPilot - Policy Assistant");
    println!("{}", "=".repeat(60));
    println!("\nHi. I'm PolicyPilot. Ask me about the policies you have uploaded.");
    println!("Type 'quit' to exit.\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("You: ");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break, // EOF
            Ok(_) => {}
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if let Err(e) = session.submit(question) {
            eprintln!("Error: {}", e);
            continue;
        }
        rt.block_on(stream_answer(&session, &mut updates));
    }

    session.stop();
}

/// Await `wanted` phase, bounded by `limit`. Reconnect attempts bump the
/// update channel, so this wakes on every transition.
async fn wait_for_phase(
    session: &Session,
    updates: &mut watch::Receiver<u64>,
    wanted: SessionPhase,
    limit: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if session.phase() == wanted {
            return true;
        }
        let wait = tokio::time::timeout_at(deadline, updates.changed());
        match wait.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => return session.phase() == wanted,
        }
    }
}

/// Print the streamed answer token-by-token until the stream closes, the
/// server reports an error, or the connection drops mid-stream. Called
/// right after `submit`, so the first trailing assistant turn seen here is
/// this question's answer.
async fn stream_answer(session: &Session, updates: &mut watch::Receiver<u64>) {
    let mut printed = 0usize;
    let mut prefixed = false;
    loop {
        let snapshot = session.snapshot();
        let mut answered = false;
        if let Some(last) = snapshot.last() {
            match last.role {
                Role::Assistant => {
                    answered = true;
                    if !prefixed {
                        print!("\nPolicyPilot: ");
                        prefixed = true;
                    }
                    // Tokens only append, so the printed prefix is stable.
                    if last.content.len() > printed {
                        print!("{}", &last.content[printed..]);
                        let _ = io::stdout().flush();
                        printed = last.content.len();
                    }
                }
                Role::Error => {
                    eprintln!("\nServer error: {}", last.content);
                    return;
                }
                Role::User => {}
            }
        }
        match session.phase() {
            // Idle again with an assistant turn at the tail: answer done.
            SessionPhase::Ready if answered => {
                println!("\n");
                return;
            }
            SessionPhase::Offline => {
                if prefixed {
                    eprintln!("\nConnection lost; partial answer shown.");
                } else {
                    eprintln!("Connection lost before the answer started.");
                }
                return;
            }
            _ => {}
        }
        if updates.changed().await.is_err() {
            return;
        }
    }
}
