use anyhow::Result;
use clap::{Parser, Subcommand};
use itd_audit::{verify_hash_chain, VerifyResult};
use itd_cli::{render_exclusions, DaemonClient, DEFAULT_DAEMON_URL};

#[derive(Parser)]
#[command(name = "itd")]
#[command(about = "Intraday trade desk operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base first)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Trade log utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Manage excluded symbols on a running daemon
    Exclusions {
        /// Daemon base URL
        #[arg(long, env = "ITD_DAEMON_URL", default_value = DEFAULT_DAEMON_URL)]
        daemon: String,

        #[command(subcommand)]
        cmd: ExclusionsCmd,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a trade log. Exits non-zero when broken.
    Verify { path: String },
}

#[derive(Subcommand)]
enum ExclusionsCmd {
    List,
    Exclude {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    Include {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = itd_config::load_layered_yaml(&path_refs)?;
            // fail on a config the daemon would refuse
            loaded.desk()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit {
            cmd: AuditCmd::Verify { path },
        } => match verify_hash_chain(&path)? {
            VerifyResult::Valid { lines } => println!("chain=valid lines={lines}"),
            VerifyResult::Broken { line, reason } => {
                println!("chain=broken line={line} reason={reason}");
                std::process::exit(2);
            }
        },

        Commands::Exclusions { daemon, cmd } => {
            let client = DaemonClient::new(daemon)?;
            let resp = match cmd {
                ExclusionsCmd::List => client.list_exclusions().await?,
                ExclusionsCmd::Exclude { symbols } => client.exclude(&symbols).await?,
                ExclusionsCmd::Include { symbols } => client.include(&symbols).await?,
            };
            println!("{}", render_exclusions(&resp));
        }
    }

    Ok(())
}
