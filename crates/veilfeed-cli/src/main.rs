//! veilfeed command-line client.
//!
//! # Usage
//!
//! ```bash
//! export VEILFEED_SECRET_KEY=nsec1...
//!
//! # Create the view key once; it is stored on the relay as a self-share
//! veilfeed keygen
//!
//! # Share it with a friend, then post
//! veilfeed add-friend npub1...
//! veilfeed post "hello"
//!
//! # Read own posts and those of friends who shared their key
//! veilfeed feed --friend npub1... --wait 10
//! ```

mod format;

use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use veilfeed_client::{
    Client, ClientConfig, DEFAULT_RELAY_URL, RelayConfig, SystemEnv, transport::WebSocketRelay,
};
use veilfeed_core::LocalKeyOracle;
use veilfeed_crypto::Keys;
use veilfeed_proto::{decode_nsec, encode_npub, parse_public_key};

/// Private feeds over public relays
#[derive(Parser, Debug)]
#[command(name = "veilfeed")]
#[command(about = "Share a view key with friends and read their encrypted posts")]
#[command(version)]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, global = true, default_value = DEFAULT_RELAY_URL)]
    relay: String,

    /// Identity secret key (nsec or hex)
    #[arg(long, global = true, env = "VEILFEED_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Seconds to wait for the relay to acknowledge a publish
    #[arg(long, global = true, default_value_t = 10)]
    publish_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the identity's npub
    Npub,
    /// Print the hex form of an npub or hex public key
    Decode {
        /// npub or 64-character hex
        key: String,
    },
    /// Generate the view key and store it as a self-share
    Keygen,
    /// Share the view key with a friend
    AddFriend {
        /// Friend's npub or hex public key
        friend: String,
    },
    /// Publish an encrypted post
    Post {
        /// Post text
        text: String,
    },
    /// Print own and friends' posts
    Feed {
        /// Include posts by this friend (repeatable)
        #[arg(long = "friend")]
        friends: Vec<String>,

        /// Seconds to collect posts and keys before printing
        #[arg(long, default_value_t = 5)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let mut out = io::stdout().lock();

    match args.command {
        Command::Decode { ref key } => {
            writeln!(out, "{}", parse_public_key(key)?.to_hex())?;
            return Ok(());
        },
        Command::Npub => {
            let keys = secret_keys(args.secret_key.as_deref())?;
            writeln!(out, "{}", encode_npub(&keys.public_key())?)?;
            return Ok(());
        },
        _ => {},
    }

    let keys = secret_keys(args.secret_key.as_deref())?;
    let config = ClientConfig {
        relay: RelayConfig {
            url: args.relay.clone(),
            publish_timeout: Duration::from_secs(args.publish_timeout),
        },
        ..ClientConfig::default()
    };

    let relay = WebSocketRelay::connect(config.relay.clone()).await?;
    let oracle = LocalKeyOracle::new(keys, SystemEnv);
    let mut client = Client::new(SystemEnv, Arc::new(oracle), Arc::new(relay), config).await?;

    tracing::info!(local = %client.local_pubkey(), "session ready");
    client.sync_inbox().await?;

    match args.command {
        Command::Keygen => {
            let view_key = client.generate_view_key().await?;
            writeln!(out, "{}", view_key.to_hex())?;
        },
        Command::AddFriend { friend } => {
            let friend = client.add_friend(&friend).await?;
            writeln!(out, "shared view key with {}", encode_npub(&friend)?)?;
        },
        Command::Post { text } => {
            let post = client.publish_post(&text).await?;
            writeln!(out, "{}", post.id)?;
        },
        Command::Feed { friends, wait } => {
            for friend in &friends {
                client.insert_friend(parse_public_key(friend)?);
            }
            run_feed(&client, Duration::from_secs(wait), &mut out).await?;
        },
        Command::Npub | Command::Decode { .. } => {},
    }

    Ok(())
}

async fn run_feed(
    client: &Client<SystemEnv>,
    wait: Duration,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let inbox = client.start_inbox().await?;
    let (feed, timeline) = client.start_feed().await?;

    tokio::select! {
        () = tokio::time::sleep(wait) => {},
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    let snapshot = timeline.borrow().clone();
    inbox.join().await;
    feed.join().await;

    if snapshot.is_empty() {
        writeln!(out, "no posts")?;
    }
    for entry in snapshot.iter() {
        writeln!(out, "{}", format::feed_line(entry, &client.local_pubkey()))?;
    }
    Ok(())
}

fn secret_keys(text: Option<&str>) -> Result<Keys, Box<dyn std::error::Error>> {
    let text = text.ok_or("no secret key: pass --secret-key or set VEILFEED_SECRET_KEY")?.trim();

    if text.starts_with("nsec1") {
        Ok(decode_nsec(text)?)
    } else {
        Ok(Keys::from_secret_hex(text)?)
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_feed_friends() {
        let args = Args::try_parse_from([
            "veilfeed",
            "feed",
            "--friend",
            "npub1a",
            "--friend",
            "npub1b",
            "--wait",
            "2",
        ])
        .unwrap();

        let Command::Feed { friends, wait } = args.command else {
            panic!("expected feed command");
        };
        assert_eq!(friends, ["npub1a", "npub1b"]);
        assert_eq!(wait, 2);
        assert_eq!(args.relay, "wss://relay.damus.io");
    }

    #[test]
    fn secret_key_parsing() {
        let hex = "0101010101010101010101010101010101010101010101010101010101010101";
        let from_hex = secret_keys(Some(hex)).unwrap();
        assert_eq!(
            from_hex.public_key().to_hex(),
            "1b84c5567b126440995d3ed5aaba0565d71e1834604819ff9c17f5e9d5dd078f"
        );

        assert!(secret_keys(None).is_err());
        assert!(secret_keys(Some("nsec1garbage")).is_err());
    }
}
