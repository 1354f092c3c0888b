use anyhow::Context;
use clap::{Parser, Subcommand};
use hms_core::db::{current_schema_version, latest_schema_version, now};
use hms_core::jobs::{default_jobs, find_job};
use hms_core::seed::{apply_seed, load_seed};
use hms_core::{
    BedService, CacheService, CoreConfig, Database, EnvValues, MasterDataService, UserRole,
    UserService,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hms")]
#[command(about = "Hospital management system maintenance CLI")]
struct Cli {
    /// SQLite database file (overrides HMS_DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database if needed and apply pending migrations
    Migrate,
    /// Load reference data, staff and report schedules from a YAML file
    Seed {
        /// Seed file path
        file: PathBuf,
    },
    /// Inspect or maintain the database-backed cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Manage staff accounts
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Bed maintenance
    Beds {
        #[command(subcommand)]
        command: BedCommands,
    },
    /// Background jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Remove cached entries
    Clear {
        /// Only remove keys starting with this prefix (e.g. "master:")
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Recompute master-data options and dashboard aggregates
    Warm,
    /// Show entry counts and keys
    Stats,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a user and print its API token (shown once)
    CreateUser {
        /// Display name
        name: String,
        /// Login email
        email: String,
        /// admin, doctor, nurse, cashier, pharmacist or receptionist
        #[arg(long, default_value = "admin")]
        role: String,
    },
    /// List all users
    ListUsers,
}

#[derive(Subcommand)]
enum BedCommands {
    /// Realign stored bed status with active inpatient admissions
    Reconcile,
}

#[derive(Subcommand)]
enum JobCommands {
    /// Run one job now
    Run {
        /// Job name, see `hms jobs list`
        name: String,
    },
    /// List available jobs
    List,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hms_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'hms --help' for commands");
        return Ok(());
    };

    let mut env = EnvValues::from_process_env();
    if let Some(path) = cli.database {
        env.database_path = Some(path.display().to_string());
    }
    let cfg = CoreConfig::from_env_values(env)?;
    let db = Database::open(cfg.database_path())
        .with_context(|| format!("opening {}", cfg.database_path().display()))?;

    match command {
        Commands::Migrate => {
            let version = db.with_conn(|conn| Ok(current_schema_version(conn)))?;
            println!(
                "Database {} at schema version {} (latest {})",
                cfg.database_path().display(),
                version,
                latest_schema_version()
            );
        }
        Commands::Seed { file } => {
            let seed = load_seed(&file).with_context(|| format!("loading {}", file.display()))?;
            let summary = apply_seed(&db, &seed)?;
            println!(
                "Seeded {} branches, {} departments, {} wards, {} beds, {} lab tests, {} drugs, {} report schedules",
                summary.branches,
                summary.departments,
                summary.wards,
                summary.beds,
                summary.lab_tests,
                summary.drugs,
                summary.report_schedules
            );
            for (email, token) in summary.user_tokens {
                println!("Created user {email} with API token: {token}");
            }
        }
        Commands::Cache { command } => {
            let cache = CacheService::new(db.clone(), cfg.cache_ttl());
            match command {
                CacheCommands::Clear { prefix } => {
                    let removed = cache.clear(prefix.as_deref())?;
                    println!("Removed {removed} cache entries");
                }
                CacheCommands::Warm => {
                    let warmed = MasterDataService::new(db, cache).warm()?;
                    for key in warmed {
                        println!("Warmed {key}");
                    }
                }
                CacheCommands::Stats => {
                    let stats = cache.stats()?;
                    println!("Entries: {}, expired: {}", stats.entries, stats.expired);
                    for key in stats.keys {
                        println!("  {key}");
                    }
                }
            }
        }
        Commands::Admin { command } => {
            let users = UserService::new(db);
            match command {
                AdminCommands::CreateUser { name, email, role } => {
                    let role = UserRole::parse_field("role", &role)?;
                    let (user, token) = users.create_user(&name, &email, role)?;
                    println!("Created {} user {} (ID: {})", user.role, user.email, user.id);
                    println!("API token (store it now, it is not shown again): {token}");
                }
                AdminCommands::ListUsers => {
                    let all = users.list_users()?;
                    if all.is_empty() {
                        println!("No users found.");
                    }
                    for user in all {
                        println!(
                            "ID: {}, Name: {}, Email: {}, Role: {}, Active: {}, Created: {}",
                            user.id, user.name, user.email, user.role, user.active, user.created_at
                        );
                    }
                }
            }
        }
        Commands::Beds {
            command: BedCommands::Reconcile,
        } => {
            let cache = CacheService::new(db.clone(), cfg.cache_ttl());
            let report = BedService::new(db, cache).reconcile()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Jobs { command } => {
            let jobs = default_jobs(&db, &cfg);
            match command {
                JobCommands::List => {
                    for job in &jobs {
                        println!("{:<28} {}", job.name(), job.description());
                    }
                }
                JobCommands::Run { name } => {
                    let job = find_job(&jobs, &name)
                        .with_context(|| format!("unknown job '{name}', see 'hms jobs list'"))?;
                    let report = job.run(now())?;
                    println!(
                        "{}: processed {}, failed {}",
                        report.job, report.processed, report.failed
                    );
                }
            }
        }
    }

    Ok(())
}
