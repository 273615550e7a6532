use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};

use kennel_core::{Pet, PetInput, PetService, Settings, SqliteConnectionProvider};

#[derive(Parser)]
#[command(
    name = "kennel",
    version,
    about = "Pet catalog with database storage and a local backup file"
)]
struct Cli {
    /// Path to the JSON backup file (overrides KENNEL_BACKUP_FILE)
    #[arg(long, global = true)]
    backup: Option<PathBuf>,

    /// Database data source name (overrides KENNEL_DB_DSN)
    #[arg(long, global = true)]
    dsn: Option<String>,

    /// Skip the database and use only the backup file
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all pets
    List,
    /// Show one pet
    Show {
        /// Pet id
        id: i64,
    },
    /// Register a new pet
    Create {
        #[command(flatten)]
        fields: PetFields,
    },
    /// Update a pet; fields not given keep their current value
    Update {
        /// Pet id
        id: i64,
        #[command(flatten)]
        fields: PetFields,
    },
    /// Delete a pet
    Delete {
        /// Pet id
        id: i64,
    },
    /// Find pets by exact name
    Search {
        /// Name to match (case-sensitive)
        name: String,
    },
    /// Show which storage backend is active
    Status,
    /// Create the database file and the pets table
    InitDb,
}

#[derive(Args)]
struct PetFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    species: Option<String>,
    #[arg(long)]
    breed: Option<String>,
    /// Age in years
    #[arg(long)]
    age: Option<i64>,
    /// Weight in kg
    #[arg(long)]
    weight: Option<f64>,
    #[arg(long)]
    notes: Option<String>,
}

impl PetFields {
    fn into_input(self) -> PetInput {
        PetInput {
            name: self.name,
            species: self.species,
            breed: self.breed,
            age: self.age,
            weight: self.weight,
            notes: self.notes,
        }
    }

    /// Overlay the given fields on an existing pet.
    fn merge_into(self, current: &Pet) -> PetInput {
        let base = PetInput::from(current);
        PetInput {
            name: self.name.or(base.name),
            species: self.species.or(base.species),
            breed: self.breed.or(base.breed),
            age: self.age.or(base.age),
            weight: self.weight.or(base.weight),
            notes: self.notes.or(base.notes),
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> kennel_core::Result<()> {
    let mut settings = Settings::from_env();
    if let Some(backup) = cli.backup {
        settings.backup_file = backup;
    }
    if let Some(dsn) = cli.dsn {
        settings.db_dsn = Some(dsn);
    }

    let offline = cli.offline;
    match cli.command {
        Commands::InitDb => cmd_init_db(&settings),
        Commands::List => cmd_list(&mut open_service(&settings, offline)?),
        Commands::Show { id } => cmd_show(&mut open_service(&settings, offline)?, id),
        Commands::Create { fields } => {
            cmd_create(&mut open_service(&settings, offline)?, fields)
        }
        Commands::Update { id, fields } => {
            cmd_update(&mut open_service(&settings, offline)?, id, fields)
        }
        Commands::Delete { id } => cmd_delete(&mut open_service(&settings, offline)?, id),
        Commands::Search { name } => cmd_search(&mut open_service(&settings, offline)?, &name),
        Commands::Status => cmd_status(&open_service(&settings, offline)?, &settings),
    }
}

type Service = PetService<SqliteConnectionProvider>;

fn open_service(settings: &Settings, offline: bool) -> kennel_core::Result<Service> {
    let svc = if offline {
        PetService::offline(settings.backup_file.clone())?
    } else {
        PetService::from_settings(settings)?
    };
    log::info!("Using {} storage", svc.backend_mode());
    Ok(svc)
}

fn cmd_init_db(settings: &Settings) -> kennel_core::Result<()> {
    SqliteConnectionProvider::from_settings(settings).initialize()?;
    println!("Database ready.");
    Ok(())
}

fn cmd_list(svc: &mut Service) -> kennel_core::Result<()> {
    let pets = svc.list_pets();
    if pets.is_empty() {
        println!("No pets registered.");
        return Ok(());
    }
    println!("{}", pet_table(&pets));
    Ok(())
}

fn cmd_show(svc: &mut Service, id: i64) -> kennel_core::Result<()> {
    match svc.find_by_id(id) {
        Some(p) => {
            println!("=== [{}] {} ===", id, p.name);
            println!("Species:      {}", text(&p.species));
            println!("Breed:        {}", text(&p.breed));
            println!("Age:          {}", number(p.age));
            println!("Weight (kg):  {}", number(p.weight));
            println!("Intake date:  {}", intake(&p));
            println!("Notes:        {}", text(&p.notes));
        }
        None => println!("Pet {} not found.", id),
    }
    Ok(())
}

fn cmd_create(svc: &mut Service, fields: PetFields) -> kennel_core::Result<()> {
    let pet = svc.create_pet(fields.into_input())?;
    println!("Pet created (id={}).", pet.id.unwrap_or_default());
    Ok(())
}

fn cmd_update(svc: &mut Service, id: i64, fields: PetFields) -> kennel_core::Result<()> {
    let Some(current) = svc.find_by_id(id) else {
        println!("Pet {} not found.", id);
        return Ok(());
    };

    if svc.update_pet(id, fields.merge_into(&current))? {
        println!("Pet {} updated.", id);
    } else {
        println!("Pet {} could not be updated.", id);
    }
    Ok(())
}

fn cmd_delete(svc: &mut Service, id: i64) -> kennel_core::Result<()> {
    if svc.delete_pet(id)? {
        println!("Deleted.");
    } else {
        println!("Pet {} not found.", id);
    }
    Ok(())
}

fn cmd_search(svc: &mut Service, name: &str) -> kennel_core::Result<()> {
    let pets = svc.search_by_name(name);
    if pets.is_empty() {
        println!("No pets named '{}'.", name);
        return Ok(());
    }
    println!("{}", pet_table(&pets));
    Ok(())
}

fn cmd_status(svc: &Service, settings: &Settings) -> kennel_core::Result<()> {
    println!("Backend:      {}", svc.backend_mode());
    println!(
        "Database:     {}",
        settings.db_dsn.as_deref().unwrap_or("(not configured)")
    );
    println!("Backup file:  {}", settings.backup_file.display());
    Ok(())
}

fn pet_table(pets: &[Pet]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Name", "Species", "Breed", "Age", "Weight", "Intake date"]);

    for p in pets {
        table.add_row(vec![
            p.id.map(|id| id.to_string()).unwrap_or_default(),
            p.name.clone(),
            text(&p.species),
            text(&p.breed),
            number(p.age),
            number(p.weight),
            intake(p),
        ]);
    }
    table
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn intake(p: &Pet) -> String {
    p.intake_date
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}
