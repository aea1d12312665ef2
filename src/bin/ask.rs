use anyhow::{bail, Result};
use asktext::api::ApiClient;
use asktext::app::App;
use asktext::config::Config;
use asktext::types::{ChatRequest, LifecycleEvent};
use std::io::Write;
use tokio::io::AsyncReadExt;

const USAGE: &str = "\
Usage: ask [OPTIONS] <question>
       ask --health

Ask a question about a text selection. The selection is read from stdin
unless --file is given.

Options:
  --file <path>   Read the selection from a file instead of stdin
  --url <url>     Override the backend base URL for this run
  --health        Check backend health and exit
";

struct CliArgs {
    question: Option<String>,
    file: Option<String>,
    url: Option<String>,
    health: bool,
}

fn parse_args(mut args: std::env::Args) -> Result<CliArgs> {
    // No CLI framework: the surface is three flags and a question.
    let mut parsed = CliArgs {
        question: None,
        file: None,
        url: None,
        health: false,
    };

    args.next(); // program name
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--file" => match args.next() {
                Some(path) => parsed.file = Some(path),
                None => bail!("--file requires a path"),
            },
            "--url" => match args.next() {
                Some(url) => parsed.url = Some(url),
                None => bail!("--url requires a URL"),
            },
            "--health" => parsed.health = true,
            "--help" | "-h" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            _ if parsed.question.is_none() => parsed.question = Some(arg),
            _ => bail!("unexpected argument '{}'", arg),
        }
    }

    Ok(parsed)
}

async fn read_selection(file: Option<&str>) -> Result<String> {
    match file {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => {
            let mut selection = String::new();
            tokio::io::stdin().read_to_string(&mut selection).await?;
            Ok(selection)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args())?;

    let config = Config::load()?;
    config.validate()?;

    if args.health {
        // Same flow as the extension popup: resolve the configured URL
        // first, then probe the health endpoint.
        let app = App::new(config);
        if let Some(url) = &args.url {
            app.set_api_url(url.clone()).await?;
        }
        let api_url = app.api_url().await?;
        let status = ApiClient::new(api_url.clone()).health().await?;
        println!("{} is healthy at {}", status.service, api_url);
        return Ok(());
    }

    let question = match args.question {
        Some(question) => question,
        None => {
            eprint!("{USAGE}");
            std::process::exit(2);
        }
    };

    let selection = read_selection(args.file.as_deref()).await?;
    let context_url = args.file.clone().unwrap_or_else(|| "stdin".to_string());
    let request = ChatRequest::new(selection, question, context_url)?;

    let mut app = App::new(config);
    if let Some(url) = args.url {
        app.set_api_url(url).await?;
    }

    app.submit(request)?;
    while let Some(event) = app.next_event().await {
        match event {
            LifecycleEvent::Start => {}
            LifecycleEvent::Chunk { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            LifecycleEvent::Complete => {
                println!();
                return Ok(());
            }
            LifecycleEvent::Error { message } => bail!(message),
        }
    }

    bail!("stream ended without a terminal event")
}
