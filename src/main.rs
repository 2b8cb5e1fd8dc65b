use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docanchor::{
    algorithms::similarity::TransformSummary,
    projection::{FieldProjector, ProjectedField},
    EngineConfig, MatchStrategy, TemplateCache, TemplateStore, VendorIdentifier,
};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Identify invoice vendors from learned page templates")]
struct Cli {
    /// TOML engine configuration. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Overrides the templates directory from the configuration.
    #[arg(long, value_name = "DIR", global = true)]
    templates_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the templates that load into the cache.
    Templates,
    /// Identify each page and print the projected field boxes as JSON.
    Classify {
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct TemplateEntry<'a> {
    vendor_name: &'a str,
    match_strategy: MatchStrategy,
}

#[derive(Debug, Serialize)]
struct Classification {
    image: PathBuf,
    vendor_name: Option<String>,
    match_strategy: Option<MatchStrategy>,
    transform: Option<TransformSummary>,
    fields: Vec<ProjectedField>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("docanchor=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = cli.templates_dir {
        config.templates_dir = dir;
    }

    let store = TemplateStore::new(&config.templates_dir);
    let (cache, _) = TemplateCache::load(&store, &config);

    match cli.command {
        Command::Templates => {
            let templates: Vec<_> = cache.templates().collect();
            let entries: Vec<_> = templates
                .iter()
                .map(|t| TemplateEntry {
                    vendor_name: t.vendor_name(),
                    match_strategy: t.match_strategy(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Classify { images } => {
            let identifier = VendorIdentifier::new(&config);
            let projector = FieldProjector;
            let mut output = Vec::with_capacity(images.len());
            for path in images {
                let page = match image::open(&path) {
                    Ok(page) => page.to_luma8(),
                    Err(e) => {
                        warn!(image = %path.display(), error = %e, "unreadable image skipped");
                        continue;
                    }
                };
                let classification = match identifier.identify(&cache, &page) {
                    Some(result) => Classification {
                        fields: projector.project_match(&result),
                        vendor_name: Some(result.vendor_name),
                        match_strategy: Some(result.template.match_strategy()),
                        transform: result
                            .lock
                            .as_ref()
                            .map(|lock| TransformSummary::from(&lock.transform)),
                        image: path,
                    },
                    None => Classification {
                        image: path,
                        vendor_name: None,
                        match_strategy: None,
                        transform: None,
                        fields: Vec::new(),
                    },
                };
                output.push(classification);
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
