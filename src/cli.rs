use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docsplit::DocumentType;

#[derive(Debug, Parser)]
#[command(
    name = "docsplit",
    about = "Split multi-document PDFs into logical documents and classify them"
)]
pub struct Cli {
    /// Override the XDG config directory holding feedback data
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// JSON file with detector, classifier and pattern settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split extracted pages into classified documents
    Split(SplitArgs),
    /// Classify a single document's text
    Classify(ClassifyArgs),
    /// Record a user correction of a classification
    Correct(CorrectArgs),
    /// Show per-label accuracy learned from corrections
    Report(ReportArgs),
    /// Suggest new classification patterns from corrections
    Suggest(SuggestArgs),
    /// List the number of loaded patterns per label
    Patterns(PatternsArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Split --

#[derive(Debug, Parser)]
pub struct SplitArgs {
    /// JSON array of page observations, or "-" for stdin
    pub pages: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Print per-page boundary scores
    #[arg(long)]
    pub explain: bool,
}

// -- Classify --

#[derive(Debug, Parser)]
pub struct ClassifyArgs {
    /// Text file to classify, or "-" for stdin
    pub input: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Correct --

#[derive(Debug, Parser)]
pub struct CorrectArgs {
    /// Label the classifier assigned
    #[arg(long)]
    pub from: DocumentType,

    /// Label the document actually has
    #[arg(long)]
    pub to: DocumentType,

    /// Confidence the classifier reported
    #[arg(long, default_value_t = 0.0)]
    pub confidence: f32,

    /// Text of the misclassified document
    #[arg(long, default_value = "")]
    pub sample: String,
}

// -- Report --

#[derive(Debug, Parser)]
pub struct ReportArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Suggest --

#[derive(Debug, Parser)]
pub struct SuggestArgs {
    /// Minimum corrections for a label pair to produce suggestions
    #[arg(long, default_value_t = 5)]
    pub min_corrections: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Patterns --

#[derive(Debug, Parser)]
pub struct PatternsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docsplit",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_split_with_globals() {
        let cli = Cli::try_parse_from([
            "docsplit",
            "-vv",
            "--config-dir",
            "/tmp/ds",
            "split",
            "pages.json",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/ds")));
        match cli.command {
            Command::Split(args) => {
                assert_eq!(args.pages, PathBuf::from("pages.json"));
                assert!(args.json);
                assert!(!args.explain);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parse_correct_labels() {
        let cli = Cli::try_parse_from([
            "docsplit",
            "correct",
            "--from",
            "rfi",
            "--to",
            "rfi_response",
            "--confidence",
            "0.75",
        ])
        .unwrap();
        match cli.command {
            Command::Correct(args) => {
                assert_eq!(args.from, DocumentType::Rfi);
                assert_eq!(args.to, DocumentType::RfiResponse);
                assert_eq!(args.confidence, 0.75);
                assert!(args.sample.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(
            Cli::try_parse_from([
                "docsplit", "correct", "--from", "invoice", "--to", "rfi",
            ])
            .is_err()
        );
    }

    #[test]
    fn suggest_defaults_to_five() {
        let cli = Cli::try_parse_from(["docsplit", "suggest"]).unwrap();
        match cli.command {
            Command::Suggest(args) => assert_eq!(args.min_corrections, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
