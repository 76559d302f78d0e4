use clap::Parser;
use opposition_etl::core::summary::CaseSummary;
use opposition_etl::domain::model::BatchResult;
use opposition_etl::utils::{logger, validation::Validate};
use opposition_etl::{AppConfig, BatchInput, CliArgs, PipelineError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting opposition-etl");
    if let Some(path) = &args.config {
        tracing::info!("📁 Loading configuration from: {}", path);
    }

    let (config, input) = match args.load_config().and_then(|config| {
        config.validate()?;
        Ok((config, args.batch_input()?))
    }) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &input, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No requests will be sent");
        println!("✅ Dry run complete. Remove --dry-run to fetch the cases.");
        return Ok(());
    }

    let engine = config.build_engine()?;

    match engine.run(&input).await {
        Ok(outcome) => {
            print_batch_summary(&outcome.result);
            for file in &outcome.files {
                println!("📁 Output saved to: {}/{}", config.output.directory, file);
            }

            if outcome.result.aborted {
                let e = PipelineError::Aborted {
                    message: "batch deadline reached".to_string(),
                };
                eprintln!("⏰ {}", e.user_friendly_message());
                eprintln!("💡 建議: {}", e.recovery_suggestion());
                std::process::exit(e.exit_code());
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &AppConfig, input: &BatchInput, args: &CliArgs) {
    println!("📋 Configuration Summary:");
    match input {
        BatchInput::Proceedings(ids) => println!("  Proceedings: {}", ids.join(", ")),
        BatchInput::Party { name, range } => {
            println!("  Party search: {}", name);
            println!("  Filed between: {:?} .. {:?}", range.start, range.end);
        }
        BatchInput::SearchUrl { url, range } => {
            println!("  Search URL: {}", url);
            println!("  Filed between: {:?} .. {:?}", range.start, range.end);
        }
    }
    println!("  TTABVue: {}", config.sources.ttabvue_url);
    println!("  TSDR: {}", config.sources.tsdr_status_url);
    println!(
        "  Vision classification: {}",
        if config.vision_api_key().is_some() {
            config.vision.model.as_str()
        } else {
            "disabled (text heuristic only)"
        }
    );
    println!("  Output: {}", config.output.directory);
    println!("  Formats: {}", config.output.formats.join(", "));
    println!(
        "  Retries: {} (timeout {}s), rate limit {}ms",
        config.http.max_retries, config.http.timeout_seconds, config.rate_limit.interval_ms
    );
    println!("  Concurrent cases: {}", config.batch.max_concurrent_cases);

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn print_batch_summary(result: &BatchResult) {
    let party = result.searched_party();
    println!("📊 Batch Summary:");
    for case in result.cases() {
        let summary = CaseSummary::from_case(case, party);
        println!(
            "  {} {:?}: {} marks, US [{}], Intl [{}]",
            summary.proceeding_number,
            summary.result,
            summary.marks,
            summary.us_classes,
            summary.international_classes
        );
    }
    for failure in result.failures() {
        println!("  ❌ {}", failure);
    }
    println!(
        "  Cases: {}, failed: {}, errors logged: {}",
        result.cases().count(),
        result.failures().count(),
        result.errors.len()
    );
    println!();
}
