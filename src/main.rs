use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use gfeed::catalog::read_snapshot;
use gfeed::config::Config;
use gfeed::feed::{self, contains_shortcode, expand_shortcodes};
use gfeed::meta::{keys, ProductForm};
use gfeed::storage::{Database, DatabaseError};
use gfeed::util::strip_attribute_prefix;

/// Get the config directory path (~/.config/gfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gfeed"))
}

#[derive(Parser, Debug)]
#[command(name = "gfeed", about = "Google Merchant Center product feed generator")]
struct Args {
    /// Config file (default: ~/.config/gfeed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Catalog database (overrides the config file)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the feed document
    Generate {
        /// Write to FILE atomically instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Import a catalog snapshot (JSON)
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Show or change feed defaults
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Show or change per-product feed metadata
    Meta {
        #[command(subcommand)]
        action: MetaAction,
    },
    /// Replace [gfeed-xml] shortcodes in a template with the feed
    Render {
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,
        /// Write to FILE atomically instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print all settings
    Show,
    /// Set one setting; an empty value clears it
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
enum MetaAction {
    /// Print a product's stored metadata
    Show { id: i64 },
    /// Set one field; an empty value deletes it
    Set { id: i64, key: String, value: String },
    /// Apply a full form submission (JSON file); absent fields are deleted
    Save {
        id: i64,
        #[arg(value_name = "FORM_JSON")]
        form: PathBuf,
    },
}

/// Writes to `output` atomically, or to stdout.
fn emit(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            feed::write_atomic(path, content)?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        }
    }
    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn render_feed(db: &Database, config: &Config) -> Result<String> {
    let settings = db.load_settings().await.context("Failed to load settings")?;
    let catalog = db
        .load_catalog(&settings)
        .await
        .context("Failed to load catalog")?;
    let ctx = config.feed_context(Local::now().fixed_offset());
    feed::render(&ctx, &settings, &catalog)
}

fn print_meta(id: i64, rows: &[(String, String)]) {
    if rows.is_empty() {
        println!("Product {id} has no feed metadata");
        return;
    }
    for (key, value) in rows {
        if key == keys::ATTRIBUTE_MAP {
            let map: std::collections::BTreeMap<String, String> =
                serde_json::from_str(value).unwrap_or_default();
            for (google, catalog) in map {
                println!("{key}.{google} = {}", strip_attribute_prefix(&catalog));
            }
        } else {
            println!("{key} = {value}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the feed.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        eprintln!("Created config directory: {}", config_dir.display());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
            {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to set config directory permissions to 0700"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.database_path(&config_dir));
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Generate { output } => {
            let xml = render_feed(&db, &config).await?;
            emit(&xml, output.as_deref())?;
        }
        Command::Import { file } => {
            let canonical = file
                .canonicalize()
                .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
            if !std::fs::metadata(&canonical)?.is_file() {
                anyhow::bail!("Import path must be a regular file");
            }
            let snapshot = read_snapshot(&canonical).await?;
            let report = db
                .import_snapshot(&snapshot)
                .await
                .context("Failed to import catalog")?;
            println!(
                "Imported {} products, {} variations, {} images ({} metadata fields, {} rejected)",
                report.products,
                report.variations,
                report.images,
                report.meta_fields,
                report.rejected_meta
            );
            let (products, variations) = db.catalog_counts().await?;
            println!("Catalog: {products} published products, {variations} variations");
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = db.load_settings().await?;
                for (key, value) in settings.to_pairs() {
                    println!("{key} = {value}");
                }
            }
            SettingsAction::Set { key, value } => {
                let stored = db.set_setting(&key, &value).await?;
                if stored.is_empty() {
                    println!("Cleared {key}");
                } else {
                    println!("{key} = {stored}");
                }
            }
        },
        Command::Meta { action } => match action {
            MetaAction::Show { id } => {
                if !db.product_exists(id).await? {
                    return Err(DatabaseError::ProductNotFound(id).into());
                }
                let rows = db.get_product_meta_raw(id).await?;
                print_meta(id, &rows);
            }
            MetaAction::Set { id, key, value } => match db.set_product_meta(id, &key, &value).await? {
                Some(stored) => println!("{key} = {stored}"),
                None => println!("Deleted {key}"),
            },
            MetaAction::Save { id, form: form_path } => {
                let content = tokio::fs::read_to_string(&form_path)
                    .await
                    .with_context(|| format!("Failed to read form: {}", form_path.display()))?;
                let form: ProductForm = serde_json::from_str(&content)
                    .with_context(|| format!("Invalid form JSON: {}", form_path.display()))?;
                let changes = db.save_product_form(id, form).await?;
                println!(
                    "Saved product {id}: {} set, {} deleted",
                    changes.set.len(),
                    changes.delete.len()
                );
            }
        },
        Command::Render { template, output } => {
            let content = tokio::fs::read_to_string(&template)
                .await
                .with_context(|| format!("Failed to read template: {}", template.display()))?;
            // The catalog is only loaded when the template asks for the feed.
            let xml = if contains_shortcode(&content) {
                Some(render_feed(&db, &config).await?)
            } else {
                None
            };
            let page = expand_shortcodes(&content, || {
                xml.ok_or_else(|| anyhow::anyhow!("Feed was not rendered"))
            })?;
            emit(&page, output.as_deref())?;
        }
    }

    Ok(())
}
