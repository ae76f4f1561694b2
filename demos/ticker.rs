//! Stream ticker messages from a JForex bridge
//!
//! Usage:
//!   cargo run --example ticker -- [--ws URL] [--topOfBook N] [--instIDs LIST]
//!                                 [--count N] [--duration SECS] [--pretty]
//!
//! `--ws` defaults to `$JFOREX_WS`, then `ws://localhost:7081/ticker`.
//! Without `--count` or `--duration` it runs until the server closes.
//! Set `RUST_LOG=jforex_ws=debug` to see the connection lifecycle.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use jforex_ws::{
    Config, DEFAULT_TICKER_URL, Endpoint, Event, TICKER_URL_ENV, connect_with_config,
};

#[derive(Debug, Default)]
struct Args {
    ws: Option<String>,
    top_of_book: Option<String>,
    inst_ids: Option<String>,
    count: u64,
    duration: u64,
    pretty: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = Args::default();
        let mut iter = std::env::args().skip(1);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--pretty" => args.pretty = true,
                "--ws" => args.ws = iter.next(),
                "--topOfBook" | "--top" => args.top_of_book = iter.next(),
                "--instIDs" | "--instruments" => args.inst_ids = iter.next(),
                "--count" => args.count = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
                "--duration" => {
                    args.duration = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0)
                }
                other => eprintln!("ignoring unknown argument: {}", other),
            }
        }
        args
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let base = args
        .ws
        .clone()
        .or_else(|| std::env::var(TICKER_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_TICKER_URL.to_string());

    let endpoint = Endpoint::parse(&base)?.with_query([
        ("topOfBook", args.top_of_book.as_deref()),
        ("instIDs", args.inst_ids.as_deref()),
    ]);
    println!("CONNECT {}", endpoint);

    let config = Config::builder()
        .handshake_timeout(Duration::from_secs(10))
        .build();
    let (conn, mut events) = connect_with_config(&endpoint.to_string(), config).await?;

    let deadline = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    let mut received = 0u64;
    loop {
        tokio::select! {
            _ = &mut deadline => {
                conn.close();
                break;
            }
            event = events.recv() => match event {
                Some(Event::Message(text)) => {
                    received += 1;
                    if args.pretty {
                        println!("#{}", received);
                        println!("{}", pretty(&text));
                    } else {
                        println!("{}", text);
                    }
                    if args.count > 0 && received >= args.count {
                        conn.close();
                        break;
                    }
                }
                Some(Event::Error(e)) => {
                    eprintln!("websocket error: {}", e);
                    break;
                }
                Some(Event::Close) | None => {
                    println!("websocket closed");
                    break;
                }
                Some(Event::Connect) | Some(Event::Handshake(_)) => {}
            },
        }
    }

    conn.closed().await;
    Ok(())
}

/// Pretty-print JSON, falling back to the raw text
fn pretty(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| text.to_string())
}
