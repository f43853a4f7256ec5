use clap::Parser;
use playground_client::config::ClientConfig;
use playground_client::{Command, HttpRelayApi, PlaygroundClient, TerminalView, View};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "playground", about = "Chat with an agent through the playground relay")]
struct Args {
    /// Relay base URL
    #[arg(long)]
    server: Option<String>,
    /// Model for new sessions
    #[arg(long)]
    model: Option<String>,
    /// System message for new sessions
    #[arg(long)]
    system_message: Option<String>,
}

const HELP: &str = "type a prompt, or /new [model], /sessions, /use <id>, /delete [id], /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is the conversation
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::load()?;
    if let Some(url) = args.server {
        config.server.url = Some(url);
    }
    if let Some(model) = args.model {
        config.session.model = Some(model);
    }
    if let Some(system_message) = args.system_message {
        config.session.system_message = Some(system_message);
    }

    let api = HttpRelayApi::new(config.server_url())?;
    tracing::info!(server = %api.base_url(), "playground client starting");

    let mut view = TerminalView::new(std::io::stdout());
    let mut client = PlaygroundClient::new(api, config.session_defaults());

    match client.check_status().await {
        Ok(_) if client.active_session().is_none() => {
            if let Err(e) = client.create_session(None, None, None).await {
                view.notice(&format!("could not create a session: {}", e));
            }
        }
        Ok(_) => {}
        Err(e) => view.notice(&format!("relay unreachable ({}), retrying", e)),
    }
    view.notice(HELP);
    let updates = client.drain_updates();
    view.render(client.conversation(), &updates);

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(read_commands(tx));

    client.run(rx, &mut view).await;
    Ok(())
}

/// Forward stdin lines as commands until EOF or `/quit`.
async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read stdin");
                break;
            }
        };
        match Command::parse(&line) {
            None => continue,
            Some(Ok(command)) => {
                let quit = command == Command::Quit;
                if tx.send(command).await.is_err() || quit {
                    return;
                }
            }
            Some(Err(e)) => eprintln!("* {}", e),
        }
    }
    let _ = tx.send(Command::Quit).await;
}
