//! `ternd`: the tern command line node.
//!
//! Publishes the local identity's document to an on-disk store, follows
//! remote identities through it and rescues identities whose newest
//! editions are missing or corrupt.
//!
//! # Usage
//!
//! ```text
//! ternd init                                # create identity.key
//! ternd post "hello"                        # publish a post
//! ternd post --to <identity> "hi"           # post directed at someone
//! ternd reply <post-id> "agreed"            # reply to a known post
//! ternd refresh <identity>                  # pick up newer editions
//! ternd rescue <identity> --edition 12      # walk back from edition 12
//! ternd show <identity>                     # list visible posts
//! ternd status                              # identity statuses
//! ```

mod config;
mod telemetry;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use tern_codec::{generate_signing_key, identity_of};
use tern_engine::TernNode;
use tern_rescue::RescueError;
use tern_store::FileStore;
use tern_types::{Edition, IdentityId, PostId};
use tern_visibility::SystemClock;
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ternd", version, about = "tern command line node")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "TERN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local identity key.
    Init {
        /// Replace an existing key.
        #[arg(long)]
        force: bool,
    },

    /// Publish a post.
    Post {
        text: String,

        /// Identity the post is directed at.
        #[arg(long)]
        to: Option<String>,
    },

    /// Reply to a post of a tracked identity.
    Reply { post: String, text: String },

    /// Fetch editions newer than the one loaded.
    Refresh { identity: String },

    /// Walk back through editions until one can be recovered.
    Rescue {
        identity: String,

        /// Edition to start from. Defaults to the newest known edition.
        #[arg(short, long)]
        edition: Option<Edition>,

        /// Maximum number of editions to try.
        #[arg(short, long, default_value = "16")]
        steps: u32,
    },

    /// List the visible posts of an identity.
    Show { identity: String },

    /// Print the status of every tracked identity.
    Status,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }

    telemetry::init(&config.log.level);

    let mut out = std::io::stdout().lock();
    match cli.command {
        Commands::Init { force } => cmd_init(&config, force, &mut out),
        Commands::Post { text, to } => cmd_post(&config, &text, to.as_deref(), &mut out).await,
        Commands::Reply { post, text } => cmd_reply(&config, &post, &text, &mut out).await,
        Commands::Refresh { identity } => cmd_refresh(&config, &identity, &mut out).await,
        Commands::Rescue {
            identity,
            edition,
            steps,
        } => cmd_rescue(&config, &identity, edition, steps, &mut out).await,
        Commands::Show { identity } => cmd_show(&config, &identity, &mut out).await,
        Commands::Status => cmd_status(&config, &mut out).await,
    }
}

// -----------------------------------------------------------------------
// Node setup
// -----------------------------------------------------------------------

/// A node on the configured data directory with its local identity, if any.
struct Session {
    node: Arc<TernNode>,
    me: Option<IdentityId>,
}

impl Session {
    fn me(&self) -> Result<IdentityId> {
        self.me.context("no local identity, run `ternd init` first")
    }
}

/// Open the store, load the local identity and every tracked identity, and
/// refresh them all.
async fn open_session(config: &CliConfig) -> Result<Session> {
    let store = FileStore::new(config.store_dir()).with_context(|| {
        format!("failed to open store at {}", config.store_dir().display())
    })?;
    let node = Arc::new(TernNode::new(
        config.node_config(),
        Arc::new(store),
        Arc::new(SystemClock),
    ));

    let me = match load_signing_key(&config.key_path())? {
        Some(key) => {
            let me = node.create_local_identity(key);
            node.refresh(&me).await?;
            Some(me)
        }
        None => None,
    };

    for identity in load_tracked(&config.identities_path())? {
        if Some(identity) != me {
            node.add_remote_identity(identity, 0);
        }
    }
    node.refresh_all().await;

    Ok(Session { node, me })
}

/// Start tracking a remote identity in this session and in later ones.
fn track(config: &CliConfig, session: &Session, identity: IdentityId) -> Result<()> {
    if Some(identity) == session.me {
        return Ok(());
    }
    session.node.add_remote_identity(identity, 0);

    let path = config.identities_path();
    let mut tracked = load_tracked(&path)?;
    if !tracked.contains(&identity) {
        tracked.push(identity);
        let content: String = tracked.iter().map(|id| format!("{id}\n")).collect();
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn load_tracked(path: &Path) -> Result<Vec<IdentityId>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut identities = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match IdentityId::from_hex(line) {
            Some(id) => identities.push(id),
            None => warn!(path = %path.display(), line, "ignoring malformed identity"),
        }
    }
    Ok(identities)
}

fn parse_identity(s: &str) -> Result<IdentityId> {
    let s = s.trim();
    let hex = s.strip_prefix("identity://").unwrap_or(s);
    IdentityId::from_hex(hex).with_context(|| format!("not an identity: {s}"))
}

fn parse_post(s: &str) -> Result<PostId> {
    let s = s.trim();
    let hex = s.strip_prefix("post://").unwrap_or(s);
    PostId::from_hex(hex).with_context(|| format!("not a post ID: {s}"))
}

// -----------------------------------------------------------------------
// Identity key
// -----------------------------------------------------------------------

fn load_signing_key(path: &Path) -> Result<Option<SigningKey>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let secret = IdentityId::from_hex(content.trim())
        .context("identity.key must hold 64 hex characters")?;
    Ok(Some(SigningKey::from_bytes(secret.as_bytes())))
}

fn create_signing_key(path: &Path) -> Result<SigningKey> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let key = generate_signing_key();
    let secret: String = key.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
    std::fs::write(path, format!("{secret}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), identity = %identity_of(&key), "generated identity key");
    Ok(key)
}

// -----------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------

fn cmd_init(config: &CliConfig, force: bool, out: &mut impl Write) -> Result<()> {
    let path = config.key_path();
    if !force && let Some(key) = load_signing_key(&path)? {
        writeln!(out, "identity already exists: {}", identity_of(&key))?;
        return Ok(());
    }
    let key = create_signing_key(&path)?;
    writeln!(out, "created identity {}", identity_of(&key))?;
    Ok(())
}

async fn cmd_post(
    config: &CliConfig,
    text: &str,
    to: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let session = open_session(config).await?;
    let me = session.me()?;
    let recipient = to.map(parse_identity).transpose()?;
    if let Some(recipient) = recipient {
        track(config, &session, recipient)?;
    }

    let post = session.node.create_post(&me, recipient, text).await?;
    let edition = session
        .node
        .insert(&me)
        .await?
        .context("identity is locked")?;
    writeln!(out, "post://{post} (edition {edition})")?;
    Ok(())
}

async fn cmd_reply(config: &CliConfig, post: &str, text: &str, out: &mut impl Write) -> Result<()> {
    let session = open_session(config).await?;
    let me = session.me()?;
    let post = parse_post(post)?;

    let reply = session.node.create_reply(&me, &post, text).await?;
    let edition = session
        .node
        .insert(&me)
        .await?
        .context("identity is locked")?;
    writeln!(out, "reply://{reply} (edition {edition})")?;
    Ok(())
}

async fn cmd_refresh(config: &CliConfig, identity: &str, out: &mut impl Write) -> Result<()> {
    let session = open_session(config).await?;
    let identity = parse_identity(identity)?;
    track(config, &session, identity)?;

    match session.node.refresh(&identity).await? {
        Some(edition) => writeln!(out, "{identity}: now at edition {edition}")?,
        None => {
            let info = session.node.status(&identity)?;
            if info.loaded {
                writeln!(out, "{identity}: no newer edition than {}", info.edition)?;
            } else {
                writeln!(out, "{identity}: no edition found")?;
            }
        }
    }
    Ok(())
}

async fn cmd_rescue(
    config: &CliConfig,
    identity: &str,
    edition: Option<Edition>,
    steps: u32,
    out: &mut impl Write,
) -> Result<()> {
    let session = open_session(config).await?;
    let identity = parse_identity(identity)?;
    track(config, &session, identity)?;

    let result = rescue(&session.node, identity, edition, steps, out).await;
    session.node.shutdown().await;
    result.map(|_| ())
}

/// Walk back from `edition` (or the newest known edition) until one is
/// recovered, no edition is left or `steps` editions were tried.
async fn rescue(
    node: &TernNode,
    identity: IdentityId,
    edition: Option<Edition>,
    steps: u32,
    out: &mut impl Write,
) -> Result<Option<Edition>> {
    let rescuer = node.rescuer(&identity)?;
    if let Some(edition) = edition {
        rescuer.set_edition(edition);
    }

    for _ in 0..steps {
        match rescuer.start_next_fetch() {
            Ok(_) => {}
            Err(RescueError::Exhausted { .. }) => {
                writeln!(out, "no older edition left to try")?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let session = rescuer.finished().await;
        if session.last_fetch_successful {
            writeln!(out, "recovered edition {}", session.target_edition)?;
            return Ok(Some(session.target_edition));
        }
        writeln!(out, "last fetch unsuccessful, edition {}", session.target_edition)?;
        match rescuer.next_edition() {
            Some(next) => rescuer.set_edition(next),
            None => {
                writeln!(out, "no older edition left to try")?;
                return Ok(None);
            }
        }
    }

    writeln!(
        out,
        "gave up after {steps} editions, next would be {}",
        rescuer.current_edition()
    )?;
    Ok(None)
}

async fn cmd_show(config: &CliConfig, identity: &str, out: &mut impl Write) -> Result<()> {
    let session = open_session(config).await?;
    let identity = parse_identity(identity)?;
    track(config, &session, identity)?;
    session.node.refresh(&identity).await?;

    show(&session.node, identity, session.me, out)
}

fn show(
    node: &TernNode,
    identity: IdentityId,
    viewer: Option<IdentityId>,
    out: &mut impl Write,
) -> Result<()> {
    let snapshot = node
        .identity(&identity)
        .with_context(|| format!("unknown identity {identity}"))?;
    let Some(document) = &snapshot.document else {
        writeln!(out, "{identity}: not loaded")?;
        return Ok(());
    };

    let name = document
        .profile
        .display_name()
        .unwrap_or_else(|| identity.short());
    writeln!(out, "{name} (edition {})", snapshot.edition)?;

    for post in node.posts_of(&identity, viewer) {
        let replies = node.replies_to(&post.id, viewer).len();
        writeln!(
            out,
            "  [{}] {} ({} replies)",
            post.id.short(),
            post.text,
            replies
        )?;
    }
    Ok(())
}

async fn cmd_status(config: &CliConfig, out: &mut impl Write) -> Result<()> {
    let session = open_session(config).await?;
    for info in session.node.statuses() {
        let mut flags = Vec::new();
        if info.local {
            flags.push("local");
        }
        if info.locked {
            flags.push("locked");
        }
        if info.modified {
            flags.push("modified");
        }
        if !info.loaded {
            flags.push("unloaded");
        }
        writeln!(
            out,
            "{} {} edition={} {}",
            info.identity,
            info.status,
            info.edition,
            flags.join(",")
        )?;
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
