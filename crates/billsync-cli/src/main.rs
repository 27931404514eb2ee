use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use billsync_cli::{Command, Config, ReportCache};
use billsync_client::DataverseClient;
use billsync_core::dates::parse_canonical;
use billsync_core::{
    map_record, read_source_file, AppError, DateWindow, HttpConfig, Reconciler, RemoteFilter,
    SourceRecord, SyncConfig, SyncRun, TargetConfig,
};

/// Records shown by preview-delete.
const PREVIEW_SAMPLE_SIZE: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Parse command line arguments
    let config = Config::parse();

    // Setup logging (stderr to keep stdout clean for summaries)
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    if let Some(url) = &config.unanet.unanet_url {
        info!(
            "Report source: {} (report {}, user {})",
            url,
            config.unanet.unanet_report_id,
            config.unanet.unanet_username.as_deref().unwrap_or("<unset>")
        );
    }

    let target = config.target();
    let sync = config.sync();
    let today = Local::now().date_naive();

    match config.command {
        Command::Sync { csv, days } => {
            let path = match csv {
                Some(path) => path,
                None => ReportCache::new(&config.reports_dir).todays_report(today)?,
            };
            let rows = read_rows(&path)?;

            if let Err(e) = target.validate() {
                if matches!(e, AppError::ConfigIncomplete(_)) {
                    warn!("{}", e.user_message());
                    warn!("Skipping Dataverse upload");
                    return Ok(());
                }
                bail!(e.user_message());
            }

            let window = DateWindow::trailing_days(today, days)?;
            let client = connect(&target)?;
            info!("Syncing {} rows for {}", rows.len(), window);
            let run = Reconciler::new(&client, &target, &sync)
                .reconcile(&rows, window)
                .await
                .map_err(fatal)?;
            print_summary("Sync", &run);
        }
        Command::Upload { csv, start, end } => {
            let window = match (start, end) {
                (Some(start), Some(end)) => Some(DateWindow::parse(&start, &end)?),
                _ => None,
            };
            let rows = read_rows(&csv)?;
            let client = validated_client(&target)?;
            let run = Reconciler::new(&client, &target, &sync)
                .upload(&rows, window)
                .await
                .map_err(fatal)?;
            print_summary("Upload", &run);
        }
        Command::DeleteRange { start, end } => {
            let window = DateWindow::parse(&start, &end)?;
            let client = validated_client(&target)?;
            let run = Reconciler::new(&client, &target, &sync)
                .delete_range(window)
                .await
                .map_err(fatal)?;
            print_summary("Delete", &run);
        }
        Command::DeleteAfter { date, yes } => {
            let cutoff = parse_day(&date)?;
            if !yes && !confirm_delete_after(cutoff)? {
                println!("Aborted, nothing was deleted.");
                return Ok(());
            }
            let client = validated_client(&target)?;
            delete_after(&client, &target, &sync, cutoff).await?;
        }
        Command::PreviewDelete { date } => {
            let cutoff = parse_day(&date)?;
            let client = validated_client(&target)?;
            preview_delete(&client, cutoff).await?;
        }
        Command::UploadSample { csv, limit } => {
            let rows = read_rows(&csv)?;
            let client = validated_client(&target)?;
            upload_sample(&client, &rows, limit).await?;
        }
    }

    Ok(())
}

fn connect(target: &TargetConfig) -> anyhow::Result<DataverseClient> {
    DataverseClient::new(target.clone(), HttpConfig::default())
        .context("Failed to create Dataverse client")
}

fn validated_client(target: &TargetConfig) -> anyhow::Result<DataverseClient> {
    if let Err(e) = target.validate() {
        bail!(e.user_message());
    }
    connect(target)
}

fn fatal(e: AppError) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

fn read_rows(path: &Path) -> anyhow::Result<Vec<SourceRecord>> {
    let rows = read_source_file(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn parse_day(text: &str) -> anyhow::Result<NaiveDate> {
    parse_canonical(text).with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", text))
}

/// Asks for a literal "yes" on stdin.
fn confirm_delete_after(cutoff: NaiveDate) -> anyhow::Result<bool> {
    print!(
        "This will permanently delete every record dated after {}.\nType 'yes' to continue: ",
        cutoff
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

async fn delete_after(
    client: &DataverseClient,
    target: &TargetConfig,
    sync: &SyncConfig,
    cutoff: NaiveDate,
) -> anyhow::Result<()> {
    info!("Deleting records dated after {}", cutoff);
    let run = Reconciler::new(client, target, sync)
        .delete_after(cutoff)
        .await
        .map_err(fatal)?;
    print_summary("Delete", &run);
    Ok(())
}

async fn preview_delete(client: &DataverseClient, cutoff: NaiveDate) -> anyhow::Result<()> {
    let filter = RemoteFilter::After(cutoff);
    client.authenticate().await.map_err(fatal)?;

    let total = client.count_matching(&filter).await.map_err(fatal)?;
    let sample = client
        .sample_matching(&filter, PREVIEW_SAMPLE_SIZE)
        .await
        .map_err(fatal)?;

    println!("\nRecords dated after {}: {}\n", cutoff, total);
    if sample.is_empty() {
        println!("  Nothing would be deleted.");
    } else {
        for record in &sample {
            println!(
                "  {}  {}",
                record.date.as_deref().unwrap_or("(no date)"),
                record.id
            );
        }
        if total > sample.len() as u64 {
            println!("  ... and {} more", total - sample.len() as u64);
        }
    }
    println!();

    Ok(())
}

async fn upload_sample(
    client: &DataverseClient,
    rows: &[SourceRecord],
    limit: usize,
) -> anyhow::Result<()> {
    client.authenticate().await.map_err(fatal)?;

    let sample = &rows[..rows.len().min(limit)];
    let mut succeeded = 0;
    for (i, row) in sample.iter().enumerate() {
        let outcome = client.create_record(&map_record(row)).await;
        if outcome.is_success() {
            succeeded += 1;
            info!("[{}/{}] Uploaded", i + 1, sample.len());
        } else {
            error!("[{}/{}] Upload failed: {:?}", i + 1, sample.len(), outcome);
        }
    }

    println!("\nUploaded {}/{} sample records\n", succeeded, sample.len());
    Ok(())
}

fn print_summary(label: &str, run: &SyncRun) {
    println!("\n{} complete\n", label);
    println!("{}", run);
    println!();

    if run.has_failures() {
        warn!(
            "Run finished with failures ({} failed batches); rerun the same command to reconcile",
            run.failed_batches()
        );
    }
}
