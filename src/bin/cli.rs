//! Consumer CLI: opens concurrent random-lookup streams and prints results

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use stampede::Resolved;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stampede")]
#[command(about = "stampede lookup client")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(long, default_value = "http://localhost:5300")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open concurrent /random streams and print every message
    Stream {
        /// Number of concurrent streams
        #[arg(long, default_value = "100")]
        streams: usize,

        /// Print the full JSON line instead of just the value
        #[arg(long)]
        json: bool,
    },

    /// Resolve a single key
    Resolve {
        /// Key (must be part of the server's keyspace)
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let base = cli.server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Stream { streams, json } => {
            let start = Instant::now();
            let mut handles = Vec::with_capacity(streams);
            for _ in 0..streams {
                let client = client.clone();
                let url = format!("{}/random", base);
                handles.push(tokio::spawn(async move { read_stream(&client, &url, json).await }));
            }

            let mut total = 0usize;
            let mut hits = 0usize;
            for handle in handles {
                let (received, cache_hits) = handle.await??;
                total += received;
                hits += cache_hits;
            }
            eprintln!(
                "Done: {} messages over {} streams ({} cache hits) in {:?}",
                total,
                streams,
                hits,
                start.elapsed()
            );
        }
        Commands::Resolve { key } => {
            let resp = client
                .get(format!("{}/resolve", base))
                .query(&[("key", key.as_str())])
                .send()
                .await?;
            if !resp.status().is_success() {
                anyhow::bail!("resolve failed: {} {}", resp.status(), resp.text().await?);
            }
            let resolved: Resolved = resp.json().await?;
            println!("{} ({})", resolved.value, resolved.provenance);
        }
    }

    Ok(())
}

/// Read one NDJSON stream to the end, printing each message.
/// Returns `(messages, cache_hits)`.
async fn read_stream(
    client: &reqwest::Client,
    url: &str,
    json: bool,
) -> anyhow::Result<(usize, usize)> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let mut body = resp.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    let mut received = 0;
    let mut hits = 0;

    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            let resolved: Resolved = serde_json::from_slice(line)?;
            if resolved.provenance == stampede::Provenance::CacheHit {
                hits += 1;
            }
            received += 1;
            if json {
                println!("{}", String::from_utf8_lossy(line));
            } else {
                println!("{}", resolved.value);
            }
        }
    }

    Ok((received, hits))
}
