use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gitgate::cli::{
    AdminCommands, KeyCommands, MemberCommands, RepoCommands, UserCommands, config_for,
    run_key_add, run_key_list, run_key_remove, run_member_list, run_member_remove,
    run_member_set, run_repo_create, run_repo_delete, run_repo_rename, run_user_add,
    run_user_passwd, run_user_remove,
};
use gitgate::config::ServerConfig;
use gitgate::git::GitRunner;
use gitgate::hooks::RefArtifacts;
use gitgate::server::{AppState, create_router};
use gitgate::ssh::start_ssh_server;
use gitgate::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "gitgate")]
#[command(about = "Serve git repositories over smart HTTP and SSH", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the HTTP and SSH listeners
    Serve {
        /// TOML config file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// HTTP port
        #[arg(long)]
        http_port: Option<u16>,

        /// SSH port
        #[arg(long)]
        ssh_port: Option<u16>,

        /// Data directory for database and repositories
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Manage repository members
    Member {
        #[command(subcommand)]
        command: MemberCommands,
    },

    /// Manage SSH keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

fn run_init(data_dir: PathBuf) -> anyhow::Result<()> {
    let config = config_for(&data_dir);
    fs::create_dir_all(config.repo_root())?;

    let db_path = config.db_path();
    let existed = db_path.exists();

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    if existed {
        println!("Database already initialized at {}", db_path.display());
    } else {
        println!("Initialized gitgate in {}", data_dir.display());
        println!("  database:     {}", db_path.display());
        println!("  repositories: {}", config.repo_root().display());
    }

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let db_path = config.db_path();
    if !db_path.exists() {
        bail!("Server not initialized. Run 'gitgate admin init' first to create the database.");
    }

    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let git = GitRunner::new(&config.git_bin, config.git_timeout());
    let observer = RefArtifacts::new(git.clone(), config.repo_root(), config.refs_dir());

    let state = Arc::new(AppState::new(
        Arc::new(store),
        git,
        config.repo_root(),
        Arc::new(observer),
    ));

    let http_addr = config.http_addr().await?;
    let ssh_addr = config.ssh_addr().await?;

    let app = create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!("HTTP listening on {}", http_addr);

    let http = async {
        axum::serve(listener, app).await?;
        anyhow::Ok(())
    };
    let host_key_path = config.host_key_path();
    let ssh = start_ssh_server(state, ssh_addr, &host_key_path);

    tokio::try_join!(http, ssh)?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gitgate=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => run_init(data_dir)?,
        },
        Commands::Serve {
            config,
            host,
            http_port,
            ssh_port,
            data_dir,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = http_port {
                config.http_port = port;
            }
            if let Some(port) = ssh_port {
                config.ssh_port = port;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }

            run_serve(config).await?;
        }
        Commands::User { command } => match command {
            UserCommands::Add {
                data_dir,
                username,
                password,
                admin,
                can_create_repo,
                non_interactive,
            } => run_user_add(
                &data_dir,
                username,
                password,
                admin,
                can_create_repo,
                non_interactive,
            )?,
            UserCommands::Passwd {
                data_dir,
                username,
                password,
                non_interactive,
            } => run_user_passwd(&data_dir, username, password, non_interactive)?,
            UserCommands::Remove {
                data_dir,
                username,
                yes,
            } => run_user_remove(&data_dir, username, yes)?,
        },
        Commands::Repo { command } => match command {
            RepoCommands::Create {
                data_dir,
                owner,
                name,
                private,
                description,
            } => run_repo_create(&data_dir, owner, name, private, description).await?,
            RepoCommands::Rename { data_dir, old, new } => {
                run_repo_rename(&data_dir, old, new).await?
            }
            RepoCommands::Delete {
                data_dir,
                name,
                yes,
            } => run_repo_delete(&data_dir, name, yes).await?,
        },
        Commands::Member { command } => match command {
            MemberCommands::Set {
                data_dir,
                repo,
                username,
                permission,
            } => run_member_set(&data_dir, repo, username, permission)?,
            MemberCommands::Remove {
                data_dir,
                repo,
                username,
            } => run_member_remove(&data_dir, repo, username)?,
            MemberCommands::List { data_dir, repo } => run_member_list(&data_dir, repo)?,
        },
        Commands::Key { command } => match command {
            KeyCommands::Add {
                data_dir,
                username,
                title,
                key_file,
            } => run_key_add(&data_dir, username, title, &key_file)?,
            KeyCommands::List { data_dir, username } => run_key_list(&data_dir, username)?,
            KeyCommands::Remove {
                data_dir,
                username,
                fingerprint,
            } => run_key_remove(&data_dir, username, fingerprint)?,
        },
    }

    Ok(())
}
