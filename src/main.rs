use paperfuse::cli::{Cli, Commands, ConfigAction};
use paperfuse::config::Config;
use paperfuse::corpus::read_corpus;
use paperfuse::error::{PaperfuseError, Result};
use paperfuse::evaluation::{read_queries, EvaluationReport, Evaluator};
use paperfuse::pipeline::Pipeline;
use paperfuse::retrieval::RetrievalError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PREVIEW_CHARS: usize = 160;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Index { corpus, rebuild } => {
            cmd_index(cli.config, &corpus, rebuild)?;
        }
        Commands::Query {
            query,
            k,
            strategy,
            json,
        } => {
            cmd_query(cli.config, &query, k, strategy, json)?;
        }
        Commands::Evaluate { queries, json } => {
            cmd_evaluate(cli.config, &queries, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "paperfuse=debug" } else { "paperfuse=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_index(config_path: Option<PathBuf>, corpus: &Path, rebuild: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let entries = read_corpus(corpus)?;

    let pipeline = Pipeline::new(config);
    let report = pipeline.index(&entries, rebuild)?;

    println!(
        "✓ Indexed {} documents into {}",
        report.indexed,
        pipeline.layout().base_path().display()
    );
    println!("  Dense:  {}", report.dense);
    println!("  Sparse: {}", report.sparse);
    println!("  Time:   {}ms", report.duration_ms);

    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    query: &str,
    k: usize,
    strategy: Option<String>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let retriever = Pipeline::new(config).connect()?;

    if let Some(name) = strategy {
        let strategy = retriever.strategy(&name).ok_or_else(|| {
            RetrievalError::Configuration(format!("No strategy named '{}'", name))
        })?;
        let top = strategy.top_k(query, k)?;

        if json {
            println!("{}", to_json(&top)?);
            return Ok(());
        }

        println!("Top {} from '{}':", top.len(), name);
        for (i, ((id, document), score)) in top
            .document_ids
            .iter()
            .zip(&top.documents)
            .zip(&top.scores)
            .enumerate()
        {
            println!("{:>3}. {} (score {:.4})", i + 1, id, score);
            println!("     {}", preview(document));
        }
        return Ok(());
    }

    let results = retriever.retrieve(query, k)?;

    if json {
        println!("{}", to_json(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No documents indexed");
        return Ok(());
    }

    for hit in results.hits() {
        println!("{:>3}. {} (rrf {:.5})", hit.rank, hit.document_id, hit.score);
        if let Some(title) = hit.metadata.get("title") {
            println!("     {}", title);
        }
        println!("     {}", hit.preview(PREVIEW_CHARS));
    }

    Ok(())
}

fn cmd_evaluate(config_path: Option<PathBuf>, queries_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let queries = read_queries(queries_path)?;

    let evaluator = Evaluator::new(Arc::new(Pipeline::new(config.clone()).connect()?))
        .max_concurrent(config.evaluation.max_concurrent)
        .hit_cutoff(config.evaluation.hit_cutoff);

    let runtime = tokio::runtime::Runtime::new().map_err(|e| PaperfuseError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let report = runtime.block_on(evaluator.evaluate(queries))?;

    if json {
        println!("{}", to_json(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &EvaluationReport) {
    println!(
        "✓ Evaluated {} queries in {}ms",
        report.outcomes.len(),
        report.duration_ms
    );
    println!();
    println!(
        "{:<16} {:>8} {:>10} {:>8} {:>8}",
        "method",
        "missing",
        "mean pos",
        "mrr",
        format!("hit@{}", report.hit_cutoff)
    );

    for method in &report.methods {
        let mean = method
            .mean_position
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<16} {:>8} {:>10} {:>8.4} {:>8.4}",
            method.method, method.missing, mean, method.mrr, method.hit_rate
        );
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", to_json(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Strategies: {}", config.strategies.len());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    Config::load_or_default(config_path.as_deref())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| PaperfuseError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}

fn preview(document: &str) -> String {
    let flat = document.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}
