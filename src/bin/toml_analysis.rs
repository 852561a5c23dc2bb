use algolife::core::ConfigProvider;
use algolife::rules::table::{resolve_sheet, SheetKind};
use algolife::rules::{FlexibleRulesEngine, RulesEngine};
use algolife::utils::error::ErrorSeverity;
use algolife::utils::{logger, validation::Validate};
use algolife::{AnalysisEngine, AnalysisPipeline, LocalStorage, TomlConfig};
use clap::Parser;
use std::path::Path;

#[derive(Parser)]
#[command(name = "toml-analysis")]
#[command(about = "Functional biology analysis driven by a TOML configuration")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "algolife.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Check inputs and rule files without running the analysis
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    match config.log_level() {
        Some("json") => logger::init_json_logger(),
        level => logger::init_cli_logger(args.verbose || level == Some("debug")),
    }

    tracing::info!("🚀 Starting TOML-based analysis");
    tracing::info!("📁 Configuration loaded from: {}", args.config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration validated");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - no analysis will be run");
        perform_dry_run(&config);
        return Ok(());
    }

    let monitor_enabled = args
        .monitor
        .unwrap_or_else(|| config.system_stats_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::current_dir();
    let pipeline = AnalysisPipeline::new(storage, config);
    let engine = AnalysisEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Analysis completed successfully!");
            println!("✅ Analysis completed successfully!");
            println!("📁 Report saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Analysis failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Analysis: {} v{}",
        config.analysis.name,
        config.analysis.version.as_deref().unwrap_or("-")
    );
    println!("  Patient: {}", config.patient().display_name());
    println!("  Biology inputs: {}", config.inputs.biology.len());
    println!("  Microbiome inputs: {}", config.inputs.microbiome.len());
    println!("  Output: {}", config.output_path());
    println!(
        "  Model: seed {}, {} synthetic individuals",
        config.model.seed, config.model.population_size
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn mark(exists: bool) -> &'static str {
    if exists {
        "✅"
    } else {
        "❌"
    }
}

fn perform_dry_run(config: &TomlConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📄 Inputs:");
    for path in config.biology_inputs() {
        println!("  {} biology    {}", mark(Path::new(path).is_file()), path);
    }
    for path in config.microbiome_inputs() {
        println!("  {} microbiome {}", mark(Path::new(path).is_file()), path);
    }

    if let Some(dir) = config.rules_dir() {
        println!();
        println!("📚 Rule sheets in {}:", dir);
        let dir = Path::new(dir);
        for kind in SheetKind::ALL {
            match resolve_sheet(dir, kind) {
                Some(path) => println!("  ✅ {} -> {}", kind.summary_key(), path.display()),
                None => println!("  ➖ {} (absent)", kind.summary_key()),
            }
        }
        match RulesEngine::load(dir) {
            Ok(engine) => {
                for (sheet, count) in engine.summary() {
                    println!("  {}: {} rules", sheet, count);
                }
            }
            Err(e) => println!("  ❌ {}", e),
        }
    }

    if let Some(file) = config.flexible_rules() {
        println!();
        println!("🧩 Flexible rules: {}", file);
        match FlexibleRulesEngine::load(Path::new(file)) {
            Ok(engine) => {
                for (logical, header) in engine.column_map() {
                    println!("  {} <- {}", logical, header);
                }
            }
            Err(e) => println!("  ❌ {}", e),
        }
    }

    println!();
    println!("🧬 Biomarker catalogue: {} entries", config.catalog().len());
    if !config.lifestyle.is_empty() {
        println!("🏃 Lifestyle scores: {}", config.lifestyle.len());
    }

    println!();
    println!("✅ Dry run complete. Use --verbose for more details during the actual run.");
}
