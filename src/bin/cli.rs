use anyhow::Context;
use clap::{Parser, Subcommand};
use rango::config::get_configuration;
use rango::db::queries::categories::{get_all_categories, import_categories};
use rango::db::queries::pages::{get_page_listings, import_pages};
use rango::db::queries::users::{create_user, NewUser, UserProfile};
use rango::db::{self, populate::populate, Category, PageListing};
use rango::server::auth::hash_password;
use rango::telemetry::init_tracing;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Database path, overrides the configured one
    #[clap(long)]
    db_path: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Fill the database with the tutorial categories, pages and a poll
    Populate,
    /// Import categories.csv and pages.csv from a directory
    Import { path: PathBuf },
    /// Export categories.csv and pages.csv into a directory
    Export { path: PathBuf },
    /// Create a staff account, the password is read from RANGO_PASSWORD
    CreateSuperuser { username: String, email: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let db_path = match cli.db_path {
        Some(path) => path,
        None => get_configuration()?.database.path,
    };
    let pool = db::establish_connection(&db_path)
        .await
        .with_context(|| format!("Cannot connect to DB {db_path}"))?;
    db::run_migrations(&pool).await?;

    match cli.command {
        Commands::Migrate => tracing::info!("Database is up to date"),
        Commands::Populate => populate(&pool).await.context("Cannot populate")?,
        Commands::Export { path } => export_data(&pool, path).await.context("Cannot export")?,
        Commands::Import { path } => import_data(&pool, path).await.context("Cannot import")?,
        Commands::CreateSuperuser { username, email } => {
            let password: SecretString = dotenv::var("RANGO_PASSWORD")
                .context("RANGO_PASSWORD must be set")?
                .into();
            create_superuser(&pool, &username, &email, &password).await?
        }
    }
    Ok(())
}

fn write_to(path: PathBuf, data: Vec<impl Serialize>) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut wtr = csv::Writer::from_writer(file);
    for line in data {
        wtr.serialize(line)?;
    }
    wtr.flush()?;
    Ok(())
}

fn read_from<T: DeserializeOwned>(path: PathBuf) -> anyhow::Result<Vec<T>> {
    let file = std::fs::File::open(&path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut out = Vec::new();
    for record in rdr.deserialize() {
        let record: T = record?;
        out.push(record);
    }
    Ok(out)
}

async fn export_data(pool: &SqlitePool, path: PathBuf) -> anyhow::Result<()> {
    let categories = get_all_categories(pool).await?;
    let pages = get_page_listings(pool).await?;
    if !path.exists() {
        std::fs::create_dir_all(&path)?
    }
    tracing::info!(categories = categories.len(), pages = pages.len(), "Exporting");
    write_to(path.join("categories.csv"), categories)?;
    write_to(path.join("pages.csv"), pages)?;
    Ok(())
}

async fn import_data(pool: &SqlitePool, path: PathBuf) -> anyhow::Result<()> {
    let categories: Vec<Category> = read_from(path.join("categories.csv"))?;
    let pages: Vec<PageListing> = read_from(path.join("pages.csv"))?;
    import_categories(pool, categories).await?;
    let imported = import_pages(pool, pages).await?;
    tracing::info!(pages = imported, "Import finished");
    Ok(())
}

async fn create_superuser(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password: &SecretString,
) -> anyhow::Result<()> {
    if password.expose_secret().chars().count() < 8 {
        anyhow::bail!("The password must be at least 8 characters long");
    }
    let password_hash = hash_password(password)?;
    let user = NewUser {
        username,
        email,
        password_hash: &password_hash,
        is_staff: true,
    };
    let id = create_user(pool, user, &UserProfile::default())
        .await
        .with_context(|| format!("Cannot create user {username}"))?;
    tracing::info!(id, username, "Superuser created");
    Ok(())
}
