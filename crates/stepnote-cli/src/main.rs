//! StepNote command-line front end.
//!
//! Opens a store from a RON config (plus `STEPNOTE_*` overrides) and runs
//! one command against it.
//!
//! ## Usage
//!
//! ```bash
//! # Create the demo user, workspace, and "Getting Started" document
//! stepnote --database notes.db seed
//!
//! # Seed, then delete it all again and check nothing is left behind
//! stepnote seed --verify-cascade
//!
//! # Browse
//! stepnote --database notes.db tree --user user_test_001
//! stepnote --database notes.db blocks --user user_test_001 --document <uuid>
//!
//! # Append a block after another one
//! stepnote --database notes.db add --user user_test_001 --document <uuid> --after <uuid> "text"
//!
//! # Show the effective configuration
//! stepnote --config stepnote.ron config
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use stepnote_store::{ErrorKind, Notebook, StoreConfig};
use stepnote_types::{
    Block, BlockId, BlockPayload, BlockType, DocumentId, DocumentNode, Position, User, UserId,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const SEED_USER: &str = "user_test_001";
const SEED_EMAIL: &str = "test@stepnote.com";

/// Block-based notes, stored in SQLite.
#[derive(Parser, Debug)]
#[command(name = "stepnote")]
#[command(about = "StepNote block-tree store")]
struct Args {
    /// RON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config and environment)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the demo user, workspace, document, and blocks
    Seed {
        /// Delete the seeded blocks and document afterwards and check the cascade
        #[arg(long)]
        verify_cascade: bool,
    },
    /// Print a user's workspaces and document trees
    Tree {
        #[arg(short, long, default_value = SEED_USER)]
        user: String,
    },
    /// Print a document's blocks as an outline
    Blocks {
        #[arg(short, long, default_value = SEED_USER)]
        user: String,
        #[arg(long)]
        document: DocumentId,
    },
    /// Insert a block
    Add {
        #[arg(short, long, default_value = SEED_USER)]
        user: String,
        #[arg(long)]
        document: DocumentId,
        /// Parent block; top level when omitted
        #[arg(long)]
        parent: Option<BlockId>,
        /// Sibling to insert after; appends when omitted
        #[arg(long, conflicts_with = "before")]
        after: Option<BlockId>,
        /// Sibling to insert before
        #[arg(long)]
        before: Option<BlockId>,
        /// Block type (paragraph, heading, bullet, todo, ...)
        #[arg(long = "type", default_value = "paragraph")]
        block_type: String,
        text: String,
    },
    /// Print the effective configuration as RON
    Config,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Config => {
            let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default())
                .context("serializing config")?;
            println!("{text}");
            Ok(())
        }
        Command::Seed { verify_cascade } => {
            let notebook = Notebook::open(&config)?;
            cmd_seed(&notebook, verify_cascade)
        }
        Command::Tree { user } => cmd_tree(&Notebook::open(&config)?, &UserId::new(user)),
        Command::Blocks { user, document } => {
            cmd_blocks(&Notebook::open(&config)?, &UserId::new(user), document)
        }
        Command::Add {
            user,
            document,
            parent,
            after,
            before,
            block_type,
            text,
        } => {
            let Some(block_type) = BlockType::from_str(&block_type) else {
                bail!("unknown block type {block_type:?}");
            };
            let position = match (after, before) {
                (Some(anchor), _) => Position::After(anchor),
                (None, Some(anchor)) => Position::Before(anchor),
                (None, None) => Position::End,
            };
            let notebook = Notebook::open(&config)?;
            let block = notebook.insert_block(
                &UserId::new(user),
                document,
                parent,
                position,
                &BlockPayload::text(block_type, text),
            )?;
            println!("{} {}", block.id, block.rank);
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<StoreConfig> {
    let config = match &args.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(path) = &args.database {
        config.database_path = Some(path.clone());
    }
    config.validate()?;
    Ok(config)
}

fn cmd_seed(notebook: &Notebook, verify_cascade: bool) -> Result<()> {
    let user_id = UserId::new(SEED_USER);
    let user = match notebook.get_user(&user_id) {
        Ok(user) => user,
        Err(e) if e.kind() == ErrorKind::NotFound => notebook.create_user(
            &User::new(SEED_USER, SEED_EMAIL)
                .with_display_name("Test User")
                .with_avatar_url("https://github.com/shadcn.png"),
        )?,
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user = %user.id, "seed user ready");

    let workspace = notebook.create_workspace(&user.id, "My First Workspace")?;
    notebook.set_last_active_workspace(&user.id, workspace.id)?;

    let document =
        notebook.create_document(&user.id, workspace.id, None, "Getting Started with StepNote")?;

    let intro = notebook.insert_block(
        &user.id,
        document.id,
        None,
        Position::End,
        &BlockPayload::text(BlockType::Paragraph, "Welcome to StepNote! This is your first document."),
    )?;
    let toggle = notebook.insert_block(
        &user.id,
        document.id,
        None,
        Position::After(intro.id),
        &BlockPayload::text(BlockType::Toggle, "Click to expand").with_properties(json!({"collapsed": false})),
    )?;
    let bullet = notebook.insert_block(
        &user.id,
        document.id,
        Some(toggle.id),
        Position::End,
        &BlockPayload::text(BlockType::Bullet, "Blocks can nest inside toggles"),
    )?;

    println!("workspace {} ({})", workspace.name, workspace.id);
    println!("document  {} ({})", document.title, document.id);
    print_outline(&notebook.list_children(&user.id, document.id, None)?, notebook, &user.id, 1)?;

    if !verify_cascade {
        return Ok(());
    }

    let removed = notebook.delete_block(&user.id, toggle.id)?;
    if removed != 2 {
        bail!("deleting the toggle removed {removed} blocks, expected 2");
    }
    match notebook.get_block(&user.id, bullet.id) {
        Err(e) if e.kind() == ErrorKind::NotFound => println!("block cascade ok"),
        Ok(_) => bail!("child block {} survived its parent", bullet.id),
        Err(e) => return Err(e.into()),
    }

    let deleted = notebook.delete_document(&user.id, document.id)?;
    match notebook.get_block(&user.id, intro.id) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            println!(
                "document cascade ok ({} document, {} block)",
                deleted.documents, deleted.blocks
            );
        }
        Ok(_) => bail!("block {} survived its document", intro.id),
        Err(e) => return Err(e.into()),
    }

    notebook.delete_workspace(&user.id, workspace.id)?;
    Ok(())
}

fn cmd_tree(notebook: &Notebook, user: &UserId) -> Result<()> {
    let workspaces = notebook.list_workspaces(user)?;
    if workspaces.is_empty() {
        println!("{user} has no workspaces");
    }
    for workspace in workspaces {
        println!("{} ({})", workspace.name, workspace.id);
        for node in notebook.list_document_tree(user, workspace.id)? {
            print_document(&node, 1);
        }
    }
    Ok(())
}

fn print_document(node: &DocumentNode, depth: usize) {
    let doc = &node.document;
    let archived = if doc.is_archived { " [archived]" } else { "" };
    println!("{}{} ({}){archived}", "  ".repeat(depth), doc.title, doc.id);
    for child in &node.children {
        print_document(child, depth + 1);
    }
}

fn cmd_blocks(notebook: &Notebook, user: &UserId, document: DocumentId) -> Result<()> {
    let doc = notebook.get_document(user, document)?;
    println!("{} ({})", doc.title, doc.id);
    print_outline(&notebook.list_children(user, document, None)?, notebook, user, 1)
}

fn print_outline(blocks: &[Block], notebook: &Notebook, user: &UserId, depth: usize) -> Result<()> {
    for block in blocks {
        let text = block.content.get("text").and_then(|t| t.as_str()).unwrap_or("");
        println!(
            "{}[{}] {:<10} {} ({})",
            "  ".repeat(depth),
            block.rank,
            block.block_type.as_str(),
            text,
            block.id.short()
        );
        let children = notebook.list_children(user, block.document_id, Some(block.id))?;
        print_outline(&children, notebook, user, depth + 1)?;
    }
    Ok(())
}
