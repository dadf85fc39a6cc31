use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use oncobloom_core::config::{database_path_from_env_value, patient_id_prefix_from_env_value};
use oncobloom_core::patients::{PatientListFilter, PatientService};
use oncobloom_core::users::UserService;
use oncobloom_core::{CoreConfig, Database, IdAllocator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "oncobloom")]
#[command(about = "Oncobloom patient management CLI")]
struct Cli {
    /// SQLite database file (defaults to $ONCOBLOOM_DATABASE, then oncology_system.db)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database tables, and optionally the default `admin` account
    InitDb {
        /// Password for the default admin account; no account is created without it
        #[arg(long)]
        admin_password: Option<String>,
        /// E-mail address for the default admin account
        #[arg(long, default_value = "admin@oncology.com")]
        admin_email: String,
    },
    /// Grant admin rights to the user with this e-mail address
    MakeAdmin { email: String },
    /// Revoke admin rights from the user with this e-mail address
    RemoveAdmin { email: String },
    /// List administrators
    ListAdmins,
    /// List patients, newest first
    ListPatients {
        /// Exact current status
        #[arg(long)]
        status: Option<String>,
        /// Exact cancer type
        #[arg(long)]
        cancer_type: Option<String>,
        /// Exact cancer stage
        #[arg(long)]
        cancer_stage: Option<String>,
        /// Substring matched against name, identifier, cancer, doctor and status
        #[arg(long)]
        search: Option<String>,
    },
    /// Reserve the next patient identifier without creating a record
    AllocateId {
        /// Identifier prefix (defaults to $ONCOBLOOM_PATIENT_ID_PREFIX, then ONC)
        #[arg(long)]
        prefix: Option<String>,
        /// Year (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'oncobloom --help' for commands");
        return Ok(());
    };

    let database_path = cli
        .database
        .unwrap_or_else(|| database_path_from_env_value(std::env::var("ONCOBLOOM_DATABASE").ok()));
    let db = Database::open(&database_path)?;
    let users = UserService::new(db.clone());

    match command {
        Commands::InitDb {
            admin_password,
            admin_email,
        } => {
            println!("Database ready at {}", database_path.display());
            match admin_password {
                Some(password) => match users.ensure_default_admin(&admin_email, &password) {
                    Ok(true) => println!("Created admin account 'admin' <{}>", admin_email),
                    Ok(false) => println!("Admin account already exists"),
                    Err(e) => eprintln!("Error creating admin account: {}", e),
                },
                None => println!("No admin password given; skipping default admin account"),
            }
        }
        Commands::MakeAdmin { email } => match users.set_admin_by_email(&email, true) {
            Ok(user) => println!("{} ({}) is now an admin", user.username, user.email),
            Err(e) => eprintln!("Error granting admin rights: {}", e),
        },
        Commands::RemoveAdmin { email } => match users.set_admin_by_email(&email, false) {
            Ok(user) => println!("{} ({}) is no longer an admin", user.username, user.email),
            Err(e) => eprintln!("Error revoking admin rights: {}", e),
        },
        Commands::ListAdmins => {
            let admins = users.list_admins()?;
            if admins.is_empty() {
                println!("No administrators found.");
            } else {
                for user in admins {
                    println!(
                        "ID: {}, Username: {}, Email: {}, Created: {}",
                        user.id,
                        user.username,
                        user.email,
                        user.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }
        Commands::ListPatients {
            status,
            cancer_type,
            cancer_stage,
            search,
        } => {
            let cfg = Arc::new(CoreConfig::with_database(database_path.clone()));
            let service = PatientService::new(db, cfg);
            let filter = PatientListFilter {
                status,
                cancer_type,
                cancer_stage,
                search,
            };
            let patients = service.list(&filter)?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!(
                        "{}  {} ({}), {} {}, {}",
                        patient.patient_id,
                        patient.details.full_name,
                        patient.details.age,
                        patient.details.cancer_type,
                        patient.details.cancer_stage,
                        patient.details.current_status
                    );
                }
            }
        }
        Commands::AllocateId { prefix, year } => {
            let prefix = patient_id_prefix_from_env_value(
                prefix.or_else(|| std::env::var("ONCOBLOOM_PATIENT_ID_PREFIX").ok()),
            );
            let year = year.unwrap_or_else(|| Utc::now().year());
            let id = IdAllocator::new(db).allocate(&prefix, year)?;
            println!("{}", id);
        }
    }

    Ok(())
}
