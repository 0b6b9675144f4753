//! blockport
//!
//! Migrates page-builder block content between environments. Export turns
//! local asset IDs into portable image locators; import downloads the
//! locators into a media library and turns them back into local IDs.

use anyhow::{anyhow, Context, Result};
use blockport::cli::{Cli, Commands, LibraryCommands};
use blockport::config::BlockportConfig;
use blockport::errors::{
    control_endpoint_failed, no_id_source, no_library_configured, ActionableError,
};
use blockport::output::{ErrorCode, ExitCode, JsonError, JsonOutput, OutputContext};
use blockport::resolver::{export_content, ExportReport, LocatorResolver};
use blockport::storage::{AssetLookup, AssetUploader, ControlClient, MediaLibrary};
use blockport::sync::{AssetSyncPipeline, ContentWriter, WriteBack};
use blockport::{scan_locators, scan_references};
use clap::Parser;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Helper to classify an error from its source or message
fn error_code(error: &anyhow::Error) -> &'static str {
    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::NOT_FOUND,
            _ => ErrorCode::IO_ERROR,
        };
    }

    let error_msg = format!("{:#}", error).to_lowercase();
    if error_msg.contains("control endpoint") || error_msg.contains("unreachable") {
        ErrorCode::EXTERNAL_ERROR
    } else if error_msg.contains("not found")
        || error_msg.contains("no such file")
        || error_msg.contains("no media library")
    {
        ErrorCode::NOT_FOUND
    } else if error_msg.contains("invalid") || error_msg.contains("no asset source") {
        ErrorCode::INVALID_ARGUMENT
    } else {
        ErrorCode::GENERIC_ERROR
    }
}

/// JSON error carrying the causes and remedies of an actionable error.
fn json_error(error: &anyhow::Error, command_name: &str) -> JsonError {
    let json_error = JsonError::new(error_code(error), format!("{:#}", error), command_name);
    match error.downcast_ref::<ActionableError>() {
        Some(actionable) => {
            let with_causes = if actionable.causes().is_empty() {
                json_error
            } else {
                json_error.with_details(json!({ "causes": actionable.causes() }))
            };
            actionable
                .remedies()
                .iter()
                .fold(with_causes, |acc, remedy| acc.with_suggestion(remedy.as_str()))
        }
        None => json_error,
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let output = OutputContext::new(cli.quiet, cli.json);
    let command_name = command_name(&cli.command);

    let exit_code = match run(cli, &output) {
        Ok(code) => code,
        Err(e) => {
            let error = json_error(&e, command_name);
            if output.is_json() {
                match error.to_json_string() {
                    Ok(json) => println!("{}", json),
                    Err(_) => eprintln!("Error: {:#}", e),
                }
            } else if let Some(actionable) = e.downcast_ref::<ActionableError>() {
                eprint!("Error: {}", actionable);
            } else {
                let _ = output.print_error(format!("{:#}", e));
            }
            error.exit_code()
        }
    };

    if exit_code != ExitCode::Success {
        std::process::exit(exit_code.code());
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Scan { .. } => "scan",
        Commands::Export { .. } => "export",
        Commands::Import { .. } => "import",
        Commands::Library(LibraryCommands::Init { .. }) => "library init",
        Commands::Library(LibraryCommands::Add { .. }) => "library add",
        Commands::Library(LibraryCommands::List { .. }) => "library list",
    }
}

fn run(cli: Cli, output: &OutputContext) -> Result<ExitCode> {
    let config = BlockportConfig::discover(cli.config.as_deref())?;
    let command_name = command_name(&cli.command);

    match cli.command {
        Commands::Scan { file, locators } => {
            let text = read_content(&file)?;
            if locators {
                let found: Vec<String> =
                    scan_locators(&text).iter().map(|l| l.to_string()).collect();
                if output.is_json() {
                    let data = json!({ "locators": found, "count": found.len() });
                    println!("{}", JsonOutput::success(data, command_name).to_json_string()?);
                } else {
                    for locator in &found {
                        output.print_data(locator)?;
                    }
                }
            } else {
                let found = scan_references(&text);
                if output.is_json() {
                    let data = json!({ "ids": found, "count": found.len() });
                    println!("{}", JsonOutput::success(data, command_name).to_json_string()?);
                } else {
                    for id in &found {
                        output.print_data(id)?;
                    }
                }
            }
            Ok(ExitCode::Success)
        }

        Commands::Export {
            file,
            endpoint,
            token,
            library,
            output: out_path,
        } => {
            let text = read_content(&file)?;

            let report = if let Some(endpoint) = endpoint {
                let client = ControlClient::new(endpoint, token, CONTROL_TIMEOUT);
                export_content(&text, &LocatorResolver::new(&client)).map_err(|e| {
                    anyhow::Error::new(control_endpoint_failed(client.endpoint(), &format!("{:#}", e)))
                })?
            } else {
                let root = library
                    .or_else(|| config.library_root())
                    .ok_or_else(no_id_source)?;
                export_content(&text, &LocatorResolver::new(MediaLibrary::open(&root)?))?
            };

            if let Some(path) = &out_path {
                fs::write(path, &report.content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }

            print_export(output, &report, out_path.as_deref(), command_name)?;
            Ok(ExitCode::Success)
        }

        Commands::Import {
            file,
            library,
            output: out_path,
        } => {
            let text = read_content(&file)?;
            let root = library
                .or_else(|| config.library_root())
                .ok_or_else(no_library_configured)?;
            let media = MediaLibrary::open(&root)?;

            let pipeline = AssetSyncPipeline::from_config(&config.sync(), Arc::new(media));
            let target = out_path.unwrap_or_else(|| file.clone());
            let writer = FileWriter {
                path: target.clone(),
            };

            let content_id = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "content".to_string());
            let report = pipeline.process(&content_id, &text, &writer)?;

            if !report.persisted() && target != file {
                writer.write_back(&content_id, &text, &text)?;
            }

            let partial = !report.failed.is_empty();
            if output.is_json() {
                let json = if partial {
                    JsonOutput::partial(&report, command_name)
                } else {
                    JsonOutput::success(&report, command_name)
                };
                println!("{}", json.to_json_string()?);
            } else {
                output.print_info(format!(
                    "Imported {} locator(s) ({} uploaded, {} from cache) into {}",
                    report.resolved.len(),
                    report.uploads,
                    report.cache_hits,
                    target.display()
                ))?;
                for failure in &report.failed {
                    output.print_warning(format!("{}: {}", failure.locator, failure.error))?;
                }
            }

            Ok(if partial {
                ExitCode::PartialFailure
            } else {
                ExitCode::Success
            })
        }

        Commands::Library(LibraryCommands::Init { dir, base_url }) => {
            let base_url = base_url
                .or_else(|| config.public_base_url())
                .ok_or_else(|| anyhow!("Invalid arguments: --base-url is required (or set [library].public_base_url)"))?;
            let media = MediaLibrary::init(&dir, &base_url)?;

            if output.is_json() {
                let data = json!({
                    "root": media.root(),
                    "public_base_url": media.public_base_url()?,
                });
                println!("{}", JsonOutput::success(data, command_name).to_json_string()?);
            } else {
                output.print_info(format!("Initialized media library at {}", dir.display()))?;
            }
            Ok(ExitCode::Success)
        }

        Commands::Library(LibraryCommands::Add {
            file,
            library,
            name,
        }) => {
            let root = library
                .or_else(|| config.library_root())
                .ok_or_else(no_library_configured)?;
            let media = MediaLibrary::open(&root)?;

            let bytes = fs::read(&file)
                .with_context(|| format!("File not found: {}", file.display()))?;
            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "asset".to_string())
            });

            let id = media.upload(&bytes, &name)?;
            let url = media.url_for_id(id)?.unwrap_or_default();

            if output.is_json() {
                let data = json!({ "id": id, "url": url });
                println!("{}", JsonOutput::success(data, command_name).to_json_string()?);
            } else {
                output.print_data(format!("{}\t{}", id, url))?;
            }
            Ok(ExitCode::Success)
        }

        Commands::Library(LibraryCommands::List { library }) => {
            let root = library
                .or_else(|| config.library_root())
                .ok_or_else(no_library_configured)?;
            let media = MediaLibrary::open(&root)?;
            let entries = media.entries()?;

            if output.is_json() {
                let data = json!({ "assets": entries, "count": entries.len() });
                println!("{}", JsonOutput::success(data, command_name).to_json_string()?);
            } else {
                for (id, entry) in &entries {
                    output.print_data(format!("{}\t{}\t{} bytes", id, entry.file, entry.size))?;
                }
            }
            Ok(ExitCode::Success)
        }
    }
}

fn read_content(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Content file not found: {}", path.display()))
}

fn print_export(
    output: &OutputContext,
    report: &ExportReport,
    out_path: Option<&Path>,
    command_name: &str,
) -> Result<()> {
    if output.is_json() {
        let mut data = serde_json::to_value(report)?;
        match out_path {
            Some(path) => data["output"] = json!(path),
            None => data["content"] = json!(report.content),
        }
        println!("{}", JsonOutput::success(data, command_name).to_json_string()?);
        return Ok(());
    }

    if out_path.is_none() {
        output.print_data(&report.content)?;
    }
    output.print_info(format!(
        "Exported {} of {} reference(s)",
        report.resolved.len(),
        report.found.len()
    ))?;
    if !report.unresolved.is_empty() {
        let ids: Vec<String> = report.unresolved.iter().map(|id| id.to_string()).collect();
        output.print_warning(format!("Left unresolved: {}", ids.join(", ")))?;
    }
    Ok(())
}

/// Writes the imported document to a file.
struct FileWriter {
    path: PathBuf,
}

impl ContentWriter for FileWriter {
    fn write_back(&self, _content_id: &str, _original: &str, rewritten: &str) -> Result<WriteBack> {
        fs::write(&self.path, rewritten)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(WriteBack::Written)
    }
}
