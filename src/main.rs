use std::io::{self, BufRead, Write};

use log::{error, info};
use tracing_subscriber::EnvFilter;

use powerbi_metadata_extractor::auth::credentials::fetch_client_credentials_token;
use powerbi_metadata_extractor::config::{ApiConstants, Config};
use powerbi_metadata_extractor::powerbi::extractor::MetadataExtractor;
use powerbi_metadata_extractor::powerbi::fetcher::PaginatedFetcher;
use powerbi_metadata_extractor::warehouse::{JsonLinesSession, save_snapshot};
use powerbi_metadata_extractor::{ExtractError, LogLevel, Result};

const WAREHOUSE_SCHEMA: &str = "powerbi_metadata";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("An error occurred during the process: {}", e);
        error!("Please check your configuration, permissions and network access.");
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<()> {
    info!("1. Loading configuration...");
    let config = Config::load(&Config::default_path()?)?;
    let constants = ApiConstants::for_tenant(&config.tenant_id);

    info!("2. Authenticating with service principal...");
    let token = fetch_client_credentials_token(
        &config.client_id,
        &config.client_secret,
        &constants.authority,
        &constants.scope,
        config.verify_ssl,
    )
    .await?;

    let include_user_detail = prompt_yes_no("Do you want to pull in Report and App users? (yes/no): ")?;

    info!("3. Starting metadata extraction...");
    let fetcher = PaginatedFetcher::new(&token, config.verify_ssl, LogLevel::Information)?;
    let extractor = MetadataExtractor::new(fetcher, &constants.base_url, &constants.admin_base_url);
    let snapshot = extractor.extract_all(include_user_detail).await?;

    let session = JsonLinesSession::new(JsonLinesSession::default_root()?);
    info!(
        "4. Saving extracted metadata under {}...",
        session.root().display()
    );
    save_snapshot(&snapshot, WAREHOUSE_SCHEMA, &session).await?;

    info!("5. Metadata extraction and saving completed.");
    Ok(())
}

fn prompt_yes_no(question: &str) -> Result<bool> {
    let stdin = io::stdin();
    let mut input = String::new();
    loop {
        print!("{}", question);
        io::stdout().flush()?;

        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            return Err(ExtractError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stdin closed before an answer was given",
            )));
        }

        match input.trim().to_lowercase().as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" => return Ok(false),
            _ => println!("Invalid input. Please enter 'yes' or 'no'."),
        }
    }
}
