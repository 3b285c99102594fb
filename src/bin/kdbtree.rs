//! kdbtree CLI
//!
//! Command-line interface for inspecting and editing a kdbtree database.

use clap::{Parser, Subcommand};
use kdbtree::{options, Backend, Config, Identity, Key, KeySet, SystemIdentity};
use tracing_subscriber::{fmt, EnvFilter};

/// kdbtree CLI
#[derive(Parser, Debug)]
#[command(name = "kdbtree")]
#[command(about = "Hierarchical configuration key database")]
#[command(version)]
struct Args {
    /// Directory of the system domain
    #[arg(long, default_value = "/etc/kdbtree")]
    system_dir: String,

    /// Resolve user homes as HOME_ROOT/<user> instead of passwd
    #[arg(long)]
    home_root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a key's value
    Get {
        /// The key name, e.g. user/app/color
        name: String,
    },

    /// Set a key's value, creating missing parents
    Set {
        /// The key name
        name: String,

        /// The value to store
        value: String,

        /// Comment attached to the key
        #[arg(short, long)]
        comment: Option<String>,

        /// Permission bits in octal, e.g. 600
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Print a key's metadata
    Stat {
        /// The key name
        name: String,
    },

    /// List the children of a key
    Ls {
        /// The parent key name
        name: String,

        /// Include all descendants
        #[arg(short, long)]
        recursive: bool,

        /// Include keys starting with a dot
        #[arg(short, long)]
        all: bool,
    },

    /// Remove a key
    Rm {
        /// The key name
        name: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,kdbtree=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("kdbtree: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> kdbtree::Result<()> {
    let mut builder = Config::builder().system_dir(&args.system_dir);
    if let Some(home_root) = &args.home_root {
        builder = builder.home_root(home_root);
    }

    let mut backend = Backend::open(builder.build())?;
    tracing::debug!("kdbtree v{}", kdbtree::VERSION);

    match args.command {
        Commands::Get { name } => {
            let mut key = Key::new(&name)?;
            backend.get(&mut key)?;
            println!("{}", String::from_utf8_lossy(key.value()));
        }
        Commands::Set {
            name,
            value,
            comment,
            mode,
        } => {
            let mut key = Key::new(&name)?.with_string(&value);
            let credentials = SystemIdentity.credentials();
            key.set_owner_ids(credentials.uid, credentials.gid);
            if let Some(comment) = comment {
                key.set_comment(comment);
            }
            if let Some(mode) = mode {
                let mode = u32::from_str_radix(&mode, 8)
                    .map_err(|_| kdbtree::KdbError::Config(format!("invalid mode {:?}", mode)))?;
                key.set_mode(mode);
            }
            backend.set(&mut key)?;
        }
        Commands::Stat { name } => {
            let mut key = Key::new(&name)?;
            backend.stat(&mut key)?;
            print_stat(&key);
        }
        Commands::Ls {
            name,
            recursive,
            all,
        } => {
            let parent = Key::new(&name)?;
            let mut flags = 0;
            if recursive {
                flags |= options::RECURSIVE;
            }
            if all {
                flags |= options::INACTIVE;
            }

            let mut children = KeySet::new();
            backend.enumerate_children(&parent, &mut children, flags)?;
            for child in &children {
                let suffix = if child.is_dir() { "/" } else { "" };
                println!("{}{}", child.name(), suffix);
            }
        }
        Commands::Rm { name } => {
            let key = Key::new(&name)?;
            backend.remove(&key)?;
        }
    }

    backend.close()
}

fn print_stat(key: &Key) {
    println!("name:  {}", key.name());
    println!("type:  {}", key.key_type().0);
    println!("owner: {}:{}", key.uid(), key.gid());
    println!("mode:  {:o}", key.mode());
    println!("atime: {}", key.atime());
    println!("mtime: {}", key.mtime());
    println!("ctime: {}", key.ctime());
}
