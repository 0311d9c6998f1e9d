use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, MultiSelect, Password};
use harcama::config::{default_config_path, Config};
use harcama::credentials::EnvCredentialStore;
use harcama::dashboard::{
    export_file_name, render_detail, render_list, render_summary, Dashboard, DashboardState,
};
use harcama::format::format_signed_amount;
use harcama::ingest::{SingleEntryFlow, StatementImportFlow};
use harcama::models::{
    category_label, is_suggested_category, parse_occurrence_date, Id, TransactionType, Upload,
};
use harcama::session::AppSession;
use secrecy::SecretString;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PASSWORD_ENV: &str = "HARCAMA_PASSWORD";
const DELETE_PROMPT: &str = "Bu işlemi silmek istediğinize emin misiniz?";

#[derive(Parser)]
#[command(name = "harcama")]
#[command(about = "Personal income and expense tracker")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Use the demo account with sample data
    #[arg(long, conflicts_with = "email")]
    demo: bool,

    /// Sign in with this email (password from HARCAMA_PASSWORD or a prompt)
    #[arg(long)]
    email: Option<String>,

    /// Print machine-readable JSON where supported
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Balance, category breakdown and the last six months
    Summary,

    /// List transactions, newest first
    List,

    /// Show one transaction
    Show { id: String },

    /// Add a transaction, optionally scanning a receipt
    Add {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        /// income or expense
        #[arg(long = "type", default_value = "expense")]
        kind: String,
        #[arg(long)]
        category: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// Attach a receipt without scanning it
        #[arg(long, conflicts_with = "scan")]
        receipt: Option<PathBuf>,
        /// Scan a receipt and fill empty fields from it
        #[arg(long)]
        scan: Option<PathBuf>,
    },

    /// Extract transactions from a bank statement and save them together
    ImportStatement {
        file: PathBuf,
        /// Save every extracted entry without reviewing
        #[arg(long)]
        yes: bool,
    },

    /// Delete a transaction
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },

    /// Write all transactions to a CSV file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

async fn sign_in(app: &AppSession, cli: &Cli) -> Result<()> {
    match &cli.email {
        Some(email) if !cli.demo => {
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(value) if !value.is_empty() => value,
                _ => Password::new()
                    .with_prompt("Şifre")
                    .interact()
                    .context("Failed to read password")?,
            };
            let session = app
                .login(email, &SecretString::new(password.into()))
                .await?;
            eprintln!("Giriş yapıldı: {}", session.user.label());
        }
        _ => {
            app.login_demo();
            eprintln!("Demo modu");
        }
    }
    Ok(())
}

async fn loaded_dashboard(app: &AppSession) -> Result<Dashboard> {
    let mut dashboard = app.open_dashboard().await?;
    if let DashboardState::Failed(message) = dashboard.load().await {
        anyhow::bail!("{message}");
    }
    Ok(dashboard)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    if let Command::Config = cli.command {
        println!("Config file: {}", cli.config.display());
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let app = AppSession::new(config, Arc::new(EnvCredentialStore::with_prefix("HARCAMA_")))
        .await?;
    sign_in(&app, &cli).await?;
    let symbol = app.config().display.currency_symbol.clone();
    let today = app.clock().today();

    match cli.command {
        Command::Summary => {
            let dashboard = loaded_dashboard(&app).await?;
            let totals = dashboard.totals();
            let categories = dashboard.category_breakdown();
            let months = dashboard.monthly_summary(today);
            if cli.json {
                print_json(&serde_json::json!({
                    "totals": totals,
                    "categories": categories,
                    "months": months,
                }))?;
            } else {
                println!("{}", render_summary(&totals, &categories, &months, &symbol));
            }
        }
        Command::List => {
            let dashboard = loaded_dashboard(&app).await?;
            if cli.json {
                print_json(&dashboard.transactions())?;
            } else {
                println!("{}", render_list(dashboard.transactions(), &symbol));
            }
        }
        Command::Show { id } => {
            let dashboard = loaded_dashboard(&app).await?;
            let txn = dashboard
                .find(&Id::from_string_checked(id.as_str())?)
                .with_context(|| format!("Transaction not found: {id}"))?;
            if cli.json {
                print_json(txn)?;
            } else {
                println!("{}", render_detail(txn, &symbol));
            }
        }
        Command::Add {
            title,
            amount,
            kind,
            category,
            date,
            receipt,
            scan,
        } => {
            let mut flow = SingleEntryFlow::new(app.flow_context().await?);
            if let Some(title) = title {
                flow.set_title(title)?;
            }
            if let Some(amount) = amount {
                flow.set_amount(amount)?;
            }
            let kind = TransactionType::from_str(&kind)?;
            flow.set_kind(kind)?;
            if let Some(category) = category {
                if !is_suggested_category(&category) {
                    flow.set_custom_category(true)?;
                }
                flow.set_category(category)?;
            }
            if let Some(date) = date {
                let date = parse_occurrence_date(&date)
                    .with_context(|| format!("Invalid date: {date} (expected YYYY-MM-DD)"))?;
                flow.set_date(date)?;
            }
            if let Some(path) = receipt {
                flow.attach_receipt(Upload::from_path(&path)?)?;
            }
            if let Some(path) = scan {
                flow.scan(Upload::from_path(&path)?).await?;
                let form = flow.form();
                eprintln!(
                    "Fiş okundu: {} / {} / {}",
                    form.title.value(),
                    form.amount.value().as_str(),
                    category_label(form.category.value())
                );
            }

            let txn = flow.submit().await?;
            println!(
                "Kaydedildi: {} {} [{}]",
                txn.title,
                format_signed_amount(&txn, &symbol),
                txn.id
            );
        }
        Command::ImportStatement { file, yes } => {
            let mut flow = StatementImportFlow::new(app.flow_context().await?);
            let found = flow.upload(Upload::from_path(&file)?).await?;
            eprintln!("{found} işlem bulundu");

            if !yes {
                let items: Vec<String> = flow
                    .drafts()
                    .iter()
                    .map(|d| {
                        format!(
                            "{}  {}  {}",
                            d.date,
                            d.title,
                            format_signed_amount(d, &symbol)
                        )
                    })
                    .collect();
                let defaults = vec![true; items.len()];
                let keep = MultiSelect::new()
                    .with_prompt("Kaydedilecek işlemler")
                    .items(&items)
                    .defaults(&defaults)
                    .interact()?;
                for index in (0..items.len()).rev() {
                    if !keep.contains(&index) {
                        flow.remove(index)?;
                    }
                }
                let proceed = Confirm::new()
                    .with_prompt(format!("{} işlem kaydedilsin mi?", flow.drafts().len()))
                    .default(true)
                    .interact()?;
                if !proceed {
                    flow.discard();
                    eprintln!("İçe aktarma iptal edildi");
                    return Ok(());
                }
            }

            let created = flow.commit().await?;
            println!("{} işlem kaydedildi", created.len());
        }
        Command::Delete { id, yes } => {
            let mut dashboard = loaded_dashboard(&app).await?;
            let deleted = dashboard
                .delete(&Id::from_string_checked(id.as_str())?, |txn| {
                    if yes {
                        return true;
                    }
                    eprintln!("{}", render_detail(txn, &symbol));
                    Confirm::new()
                        .with_prompt(DELETE_PROMPT)
                        .default(false)
                        .interact()
                        .unwrap_or(false)
                })
                .await?;
            if deleted {
                println!("Silindi: {id}");
            }
        }
        Command::Export { output } => {
            let dashboard = loaded_dashboard(&app).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(today)));
            std::fs::write(&path, dashboard.export_csv())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} işlem dışa aktarıldı: {}",
                dashboard.transactions().len(),
                path.display()
            );
        }
        Command::Config => {}
    }

    app.logout().await?;
    Ok(())
}
