//! `medicine` CLI: manage the medicine list read by the reminder.

use anyhow::Result;
use clap::{Parser, Subcommand};
use medicine_robot::config::Config;
use medicine_robot::medicine::{Medicine, MedicineStore, MedicineUpdate, NewMedicine, SortKey};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medicine", version = env!("GIT_VERSION"), about = "Manage the medicine schedule")]
struct Cli {
    /// 設定ファイル（medicine.data_path を使う）
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// データファイルを直接指定
    #[arg(long)]
    data: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all medicines.
    List {
        #[arg(long, value_enum, default_value_t = SortKey::Time)]
        sort: SortKey,
    },
    /// Add a medicine.
    Add {
        name: String,
        /// Time to take it, HH:MM
        time: String,
        #[arg(long, default_value = "")]
        dosage: String,
        /// Comma separated
        #[arg(long, value_delimiter = ',')]
        uses: Vec<String>,
        /// Comma separated
        #[arg(long, value_delimiter = ',')]
        side_effects: Vec<String>,
    },
    /// Remove a medicine by id.
    Remove { id: u32 },
    /// Update fields of a medicine; omitted fields are kept.
    Update {
        id: u32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        dosage: Option<String>,
        #[arg(long, value_delimiter = ',')]
        uses: Option<Vec<String>>,
        #[arg(long, value_delimiter = ',')]
        side_effects: Option<Vec<String>>,
    },
    /// Search by name, dosage or use.
    Search { query: String },
    /// Show medicines due at a time (HH:MM).
    Due { time: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let data_path = match cli.data {
        Some(path) => path,
        None => Config::load_or_default(&cli.config).medicine.data_path,
    };
    let mut store = MedicineStore::open(&data_path);

    match cli.command {
        Commands::List { sort } => print_table(&store.sorted(sort)),
        Commands::Add {
            name,
            time,
            dosage,
            uses,
            side_effects,
        } => {
            let added = store.add(NewMedicine {
                name,
                taken_time: time,
                dosage,
                uses,
                side_effects,
            })?;
            println!("Added '{}' (id {}) at {}", added.name, added.id, added.taken_time);
        }
        Commands::Remove { id } => {
            let removed = store.remove(id)?;
            println!("Removed '{}'", removed.name);
        }
        Commands::Update {
            id,
            name,
            time,
            dosage,
            uses,
            side_effects,
        } => {
            let updated = store.update(
                id,
                MedicineUpdate {
                    name,
                    taken_time: time,
                    dosage,
                    uses,
                    side_effects,
                },
            )?;
            print_table(&[&updated]);
        }
        Commands::Search { query } => print_table(&store.search(&query)),
        Commands::Due { time } => {
            let time = medicine_robot::medicine::normalize_time(&time)?;
            print_table(&store.due_at(&time));
        }
    }

    Ok(())
}

fn print_table(medicines: &[&Medicine]) {
    if medicines.is_empty() {
        println!("(no medicines)");
        return;
    }
    println!("{:>4}  {:<5}  {:<24} {:<16} {}", "ID", "TIME", "NAME", "DOSAGE", "USES");
    for m in medicines {
        println!(
            "{:>4}  {:<5}  {:<24} {:<16} {}",
            m.id,
            m.taken_time,
            m.name,
            m.dosage,
            m.uses.join(", ")
        );
    }
}
