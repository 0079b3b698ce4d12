use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use docanalyzer::analysis::pipeline::{DirectiveKind, SideReport};
use docanalyzer::models::{Document, ItemBatch, ItemKind};
use docanalyzer::{
    AnalysisPipeline, Config, Directives, ExtractionDirective, ItemStore, LlmGateway,
    OutputFormat, PipelineConfig, PromptSet, ProviderRegistry, Report,
};
use docanalyzer::server::{self, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExtractOnly {
    Conditions,
    Facts,
    Both,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the analysis over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
}

#[derive(Parser, Debug)]
#[command(name = "docanalyzer")]
#[command(version)]
#[command(about = "Check whether a document satisfies the requirements of a reference text")]
#[command(subcommand_negates_reqs = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Reference document holding the requirements
    #[arg(short, long, required = true)]
    source: Option<PathBuf>,

    /// Document to check against the reference
    #[arg(short, long, required_unless_present = "extract_only")]
    target: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// LLM provider (claude, gemini, openai)
    #[arg(short = 'm', long, global = true)]
    llm: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "markdown")]
    format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only extract items and save them, without judging
    #[arg(long, value_enum)]
    extract_only: Option<ExtractOnly>,

    /// Reuse conditions saved by an earlier run
    #[arg(long, conflicts_with_all = ["skip_condition_extraction", "force_condition_extraction"])]
    use_existing_conditions: bool,

    /// Reuse facts saved by an earlier run
    #[arg(long, conflicts_with_all = ["skip_fact_extraction", "force_fact_extraction"])]
    use_existing_facts: bool,

    /// Where extracted conditions are saved and reused from
    #[arg(long, default_value = "conditions_output.json")]
    conditions_output: PathBuf,

    /// Where extracted facts are saved and reused from
    #[arg(long, default_value = "facts_output.json")]
    facts_output: PathBuf,

    /// Never extract conditions
    #[arg(long, conflicts_with = "force_condition_extraction")]
    skip_condition_extraction: bool,

    /// Never extract facts
    #[arg(long, conflicts_with = "force_fact_extraction")]
    skip_fact_extraction: bool,

    /// Always extract conditions, without asking the classifier
    #[arg(long)]
    force_condition_extraction: bool,

    /// Always extract facts, without asking the classifier
    #[arg(long)]
    force_fact_extraction: bool,
}

const FATAL_EXIT_CODE: i32 = -1;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(FATAL_EXIT_CODE);
        }
        Err(e) => e.exit(),
    };

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("Error: invalid log filter: {}", e);
        std::process::exit(FATAL_EXIT_CODE);
    }

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(FATAL_EXIT_CODE);
        }
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = std::env::var("LOG_LEVEL")
        .map(|l| l.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());

    let mut filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("docanalyzer={},reqwest=warn", level))
    })?;
    if verbose {
        filter = filter.add_directive("docanalyzer=debug".parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<i32> {
    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(llm) = &args.llm {
        config.default_llm = llm.clone();
    }

    let prompts = PromptSet::load(&config.prompts)?;
    let registry = ProviderRegistry::from_config(&config)?;

    if let Some(Command::Serve { host, port }) = &args.command {
        // Fail at startup rather than on the first request
        registry.get(&config.default_llm)?;
        let addr = format!("{}:{}", host, port);
        server::serve(AppState::new(registry, config, prompts), &addr).await?;
        return Ok(0);
    }

    // Initialize the LLM gateway
    let gateway = LlmGateway::from_config(&registry, &config, &config.default_llm)?;
    tracing::info!(
        "Using {} ({})",
        gateway.provider_name(),
        gateway.options().model_name
    );

    let pipeline = AnalysisPipeline::new(gateway, &prompts, PipelineConfig::from(&config));
    let conditions_store = ItemStore::new(&args.conditions_output);
    let facts_store = ItemStore::new(&args.facts_output);

    let source_path = args.source.as_deref().context("--source is required")?;
    let source = load_document(source_path)?;

    if let Some(mode) = args.extract_only {
        return extract_only(&args, mode, &pipeline, &source, &conditions_store, &facts_store)
            .await;
    }

    let target_path = args
        .target
        .as_deref()
        .context("--target is required for analysis")?;
    let target = load_document(target_path)?;

    let directives = Directives {
        conditions: directive(
            args.use_existing_conditions,
            args.skip_condition_extraction,
            args.force_condition_extraction,
            &conditions_store,
            ItemKind::Condition,
        )?,
        facts: directive(
            args.use_existing_facts,
            args.skip_fact_extraction,
            args.force_fact_extraction,
            &facts_store,
            ItemKind::Fact,
        )?,
    };

    // Run analysis
    tracing::info!(
        "Analyzing {} against {}",
        target.display_path(),
        source.display_path()
    );
    let run = pipeline.run(&source, &target, &directives).await?;

    save_extracted(&run.conditions, &conditions_store)?;
    save_extracted(&run.facts, &facts_store)?;

    // Output results
    let output = Report::new(&run, &source, &target).render(args.format)?;
    write_output(&output, args.output.as_deref())?;

    Ok(run.result.verdict.exit_code())
}

async fn extract_only(
    args: &Args,
    mode: ExtractOnly,
    pipeline: &AnalysisPipeline,
    source: &Document,
    conditions_store: &ItemStore,
    facts_store: &ItemStore,
) -> anyhow::Result<i32> {
    let mut summary = Vec::new();

    let conditions: Option<ItemBatch> = match mode {
        ExtractOnly::Conditions | ExtractOnly::Both => {
            let batch = pipeline.extract_conditions(source).await?;
            conditions_store.save(&batch)?;
            summary.push(format!(
                "Extracted {} conditions -> {}",
                batch.len(),
                conditions_store.path().display()
            ));
            Some(batch)
        }
        ExtractOnly::Facts if args.use_existing_conditions => {
            Some(conditions_store.load(ItemKind::Condition)?)
        }
        ExtractOnly::Facts => None,
    };

    if matches!(mode, ExtractOnly::Facts | ExtractOnly::Both) {
        let target_path = args
            .target
            .as_deref()
            .context("--target is required to extract facts")?;
        let target = load_document(target_path)?;
        let batch = pipeline.extract_facts(&target, conditions.as_ref()).await?;
        facts_store.save(&batch)?;
        summary.push(format!(
            "Extracted {} facts -> {}",
            batch.len(),
            facts_store.path().display()
        ));
    }

    write_output(&summary.join("\n"), args.output.as_deref())?;
    Ok(0)
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    Document::load(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn directive(
    use_existing: bool,
    skip: bool,
    force: bool,
    store: &ItemStore,
    kind: ItemKind,
) -> anyhow::Result<ExtractionDirective> {
    Ok(if use_existing {
        ExtractionDirective::UseExisting(store.load(kind)?)
    } else if skip {
        ExtractionDirective::Skip
    } else if force {
        ExtractionDirective::Force
    } else {
        ExtractionDirective::Auto
    })
}

/// Persists batches this run extracted; reused batches are left alone.
fn save_extracted(side: &SideReport, store: &ItemStore) -> anyhow::Result<()> {
    if side.directive == DirectiveKind::UseExisting {
        return Ok(());
    }
    if let Some(batch) = &side.batch {
        store.save(batch)?;
    }
    Ok(())
}

fn write_output(output: &str, path: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = path {
        std::fs::write(path, output)?;
        tracing::info!("Output written to: {}", path.display());
    } else {
        println!("{}", output);
    }
    Ok(())
}
