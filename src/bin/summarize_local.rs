use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use drive_digest::{
    config::Config,
    drive::{DocumentFormat, RemoteFile},
    extract::extract_text,
    processing::{ChunkedSummarizer, FileStatus, ProcessedFile, ProcessingError, RunResult},
    render::{results_csv, results_pdf},
    summarization::{GroqSummarizationClient, SummarizationClient},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "summarize-local",
    about = "Summarize local PDF, DOCX, and TXT files with the configured backend"
)]
struct Cli {
    /// Files or directories to summarize.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Write the CSV export here instead of printing a table.
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Write the PDF export here instead of printing a table.
    #[arg(long)]
    pdf: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;

    let (files, truncated) = collect_files(&cli.paths, config.max_files_cap)?;
    if files.is_empty() {
        bail!("no supported files found");
    }
    if truncated {
        eprintln!(
            "note: only the first {} files will be summarized",
            config.max_files_cap
        );
    }

    let client: Arc<dyn SummarizationClient> = Arc::new(
        GroqSummarizationClient::from_config(&config)
            .context("failed to initialize summarization client")?,
    );
    let summarizer = ChunkedSummarizer::from_config(client, &config)
        .context("failed to initialize summarizer")?;

    let mut result = RunResult {
        files_seen: files.len(),
        truncated,
        ..RunResult::default()
    };
    for (path, format) in &files {
        eprintln!("summarizing {}", path.display());
        let row = summarize_file(&summarizer, path, *format).await;
        result.files.push(row);
    }
    result.files_processed = result.files.len();

    if let Some(output) = &cli.csv {
        let csv = results_csv(&result).context("failed to render CSV")?;
        write_export(output, &csv)?;
    }
    if let Some(output) = &cli.pdf {
        let pdf = results_pdf(&result).context("failed to render PDF")?;
        write_export(output, &pdf)?;
    }
    if cli.csv.is_none() && cli.pdf.is_none() {
        print_table(&result);
    }

    if result
        .files
        .iter()
        .all(|file| file.status == FileStatus::Error)
    {
        bail!("every file failed");
    }
    Ok(())
}

/// Walk `paths` in name order and keep supported files, at most `cap` of them.
fn collect_files(paths: &[PathBuf], cap: usize) -> Result<(Vec<(PathBuf, DocumentFormat)>, bool)> {
    let mut files = Vec::new();
    for root in paths {
        if !root.exists() {
            bail!("{} does not exist", root.display());
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(format) = entry
                .file_name()
                .to_str()
                .and_then(DocumentFormat::from_file_name)
            else {
                continue;
            };
            if files.len() == cap {
                return Ok((files, true));
            }
            files.push((entry.into_path(), format));
        }
    }
    Ok((files, false))
}

async fn summarize_file(
    summarizer: &ChunkedSummarizer,
    path: &Path,
    format: DocumentFormat,
) -> ProcessedFile {
    let file = RemoteFile {
        id: path.display().to_string(),
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        format,
    };

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            return ProcessedFile {
                id: file.id,
                name: file.name,
                format,
                extracted_text: String::new(),
                summary: format!("Error: failed to read file: {error}"),
                status: FileStatus::Error,
                backend_calls: 0,
                failed_chunks: 0,
            };
        }
    };
    let text = match extract_text(format, &bytes) {
        Ok(text) => text,
        Err(error) => {
            return ProcessedFile::failed(&file, String::new(), &ProcessingError::from(error));
        }
    };
    match summarizer.summarize(&text).await {
        Ok(outcome) => ProcessedFile::summarized(&file, text, outcome),
        Err(error) => ProcessedFile::failed(&file, text, &ProcessingError::from(error)),
    }
}

fn write_export(output: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(output, bytes).with_context(|| format!("failed to write {}", output.display()))?;
    eprintln!("wrote {}", output.display());
    Ok(())
}

fn print_table(result: &RunResult) {
    for (index, file) in result.files.iter().enumerate() {
        println!("{}. {} [{}]", index + 1, file.name, file.status);
        for line in file.summary.lines() {
            println!("   {line}");
        }
        println!();
    }
}
