use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use manifester::cancel::CancelToken;
use manifester::config::{load_config, load_config_or_default, resolve_config_path, AppConfig};
use manifester::kube::{apply_manifest, resolve_connection, ApplySummary, HttpClusterClient};
use manifester::manifest::{GenerateOptions, GeneratedDocument, ManifestStatus, Manifester};
use serde::Serialize;
use std::io::{self, BufRead, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{ApplyArgs, Command, GenerateArgs, GlobalArgs, RootArgs};

const LOG_ENV: &str = "MANIFESTER_LOG";

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);

    let config = load_app_config(&args.global)?;
    match args.command {
        Command::Generate(generate) => cmd_generate(&args.global, &config, generate),
        Command::Apply(apply) => cmd_apply(&args.global, &config, apply),
    }
}

/// Logs go to stderr so stdout carries only manifests and reports.
fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "manifester=debug"
    } else {
        "manifester=info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn load_app_config(global: &GlobalArgs) -> Result<AppConfig> {
    // An explicit --config must exist; the implicit locations are optional.
    match &global.config {
        Some(path) => load_config(path),
        None => load_config_or_default(resolve_config_path(None).as_deref()),
    }
}

#[derive(Serialize)]
struct GenerateReport {
    #[serde(flatten)]
    document: GeneratedDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<ApplySummary>,
}

fn cmd_generate(global: &GlobalArgs, config: &AppConfig, args: GenerateArgs) -> Result<()> {
    let requirement = args.requirement_text();
    if requirement.trim().is_empty() {
        bail!("requirement must not be empty");
    }
    let options = GenerateOptions {
        language: args
            .language
            .clone()
            .unwrap_or_else(|| config.language().to_string()),
        no_cache: args.no_cache,
        store_results: !args.no_store,
    };
    let generator = Manifester::from_config(config, options)?;

    let root = CancelToken::new();
    let handler_token = root.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("install Ctrl-C handler")?;
    let cancel = match args.timeout_secs {
        Some(secs) => root.child_with_timeout(Duration::from_secs(secs)),
        None => root,
    };

    tracing::info!(provider = generator.provider_name(), "generating manifest");
    let document = generator.generate_document(&cancel, &requirement);
    drop(generator);

    if document.status == ManifestStatus::Failed {
        if args.json {
            print_json(&GenerateReport {
                document,
                applied: None,
            })?;
            bail!("manifest generation failed");
        }
        bail!("manifest generation failed: {}", document.errors.join(": "));
    }

    if !args.json {
        println!("{}", document.yaml);
    }

    let applied = if args.apply {
        if !args.yes && !confirm("Apply this manifest to the cluster?")? {
            eprintln!("apply skipped");
            None
        } else {
            Some(apply_text(global, config, &document.yaml)?)
        }
    } else {
        None
    };

    if args.json {
        print_json(&GenerateReport { document, applied })?;
    } else if let Some(summary) = &applied {
        print_summary(summary);
    }
    Ok(())
}

fn cmd_apply(global: &GlobalArgs, config: &AppConfig, args: ApplyArgs) -> Result<()> {
    let text = read_manifest(&args.file)?;
    let summary = apply_text(global, config, &text)?;
    if args.json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn apply_text(global: &GlobalArgs, config: &AppConfig, text: &str) -> Result<ApplySummary> {
    let connection = resolve_connection(&config.cluster)?;
    let namespace = global
        .namespace
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| connection.default_namespace())
        .to_string();
    let client = HttpClusterClient::new(&connection)?;
    tracing::info!(server = %connection.server, namespace = %namespace, "applying manifest");
    Ok(apply_manifest(&client, text, &namespace)?)
}

fn read_manifest(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("read manifest from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush().context("flush prompt")?;
    let mut answer = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("read confirmation")?;
    if read == 0 {
        return Err(anyhow!("no confirmation on stdin; pass --yes to apply"));
    }
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_summary(summary: &ApplySummary) {
    for applied in &summary.applied {
        eprintln!("{applied} applied");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
