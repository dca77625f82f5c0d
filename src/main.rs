use std::{io::Read, path::Path, sync::Arc};

use clap::Parser;
use docsplit::{
    DataDir, Error, FeedbackStore, PageObservation, Result, Splitter,
    SplitterConfig,
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSPLIT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => SplitterConfig::load(path)?,
        None => SplitterConfig::default(),
    };
    let data_dir = DataDir::resolve(cli.config_dir.as_deref())?;
    let feedback = Arc::new(FeedbackStore::open(data_dir.feedback_file()));
    let splitter = Splitter::new(&config, feedback);

    match cli.command {
        Command::Split(args) => cmd_split(&splitter, &args)?,
        Command::Classify(args) => cmd_classify(&splitter, &args)?,
        Command::Correct(args) => {
            splitter.classifier().record_correction(
                args.from,
                args.to,
                args.confidence,
                &args.sample,
            );
            println!("Recorded correction {} -> {}", args.from, args.to);
        }
        Command::Report(args) => {
            let report = splitter.classifier().feedback_report();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_empty() {
                println!("No classifications recorded.");
            } else {
                for (label, entry) in &report {
                    print!(
                        "{label}\tclassified {}\tcorrected {}\taccuracy {:.1}%",
                        entry.total_classifications,
                        entry.total_corrections,
                        entry.accuracy_rate * 100.0
                    );
                    if let Some(target) = entry.most_corrected_to {
                        print!("\tmostly -> {target}");
                    }
                    println!();
                }
            }
        }
        Command::Suggest(args) => {
            let suggestions = splitter
                .classifier()
                .suggest_pattern_improvements(args.min_corrections);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else if suggestions.is_empty() {
                println!("No suggestions.");
            } else {
                for (label, patterns) in &suggestions {
                    for pattern in patterns {
                        println!("{label}\t{pattern}");
                    }
                }
            }
        }
        Command::Patterns(args) => {
            let patterns = splitter.patterns();
            let boundary = patterns.boundary().pattern_counts();
            let classification = patterns.classification().pattern_counts();
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "boundary": boundary,
                        "classification": classification,
                    }))?
                );
            } else {
                println!("Boundary patterns:");
                for (label, count) in &boundary {
                    println!("  {label}: {count}");
                }
                println!("Classification patterns:");
                for (label, count) in &classification {
                    println!("  {label}: {count}");
                }
            }
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })
    }
}

fn load_pages(path: &Path) -> Result<Vec<PageObservation>> {
    let mut pages: Vec<PageObservation> =
        serde_json::from_str(&read_input(path)?)?;
    pages.sort_by_key(|p| p.index);
    Ok(pages)
}

fn cmd_split(splitter: &Splitter, args: &cli::SplitArgs) -> Result<()> {
    let pages = load_pages(&args.pages)?;

    if args.explain {
        for score in splitter.explain(&pages) {
            eprintln!(
                "page {}: total {:.2} (pattern {:.1}, font {:.1}, \
                 layout {:.1}, large {:.1}, header {:.1})",
                score.page,
                score.total(),
                score.pattern,
                score.font_change,
                score.layout_shift,
                score.large_font,
                score.header_change
            );
        }
    }

    let documents = splitter.split(&pages);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
    } else if documents.is_empty() {
        println!("No pages.");
    } else {
        for doc in &documents {
            print!(
                "{}-{}\t{}\t{:.2}\t{}",
                doc.segment.start_page,
                doc.segment.end_page,
                doc.classification.document_type(),
                doc.classification.confidence(),
                doc.classification.method()
            );
            for alt in &doc.alternatives {
                print!(
                    "\t(or {} {:.0}%)",
                    alt.document_type,
                    alt.probability * 100.0
                );
            }
            println!();
        }
    }
    Ok(())
}

fn cmd_classify(splitter: &Splitter, args: &cli::ClassifyArgs) -> Result<()> {
    let text = read_input(&args.input)?;
    let result = splitter
        .classifier()
        .classify(&text, splitter.patterns().classification())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{}\t{:.2}\t{}",
            result.document_type(),
            result.confidence(),
            result.method()
        );
    }
    Ok(())
}
