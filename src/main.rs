use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use coach_feedback::{
    AnthropicClient, AnthropicConfig, CommandTranscriber, Engine, FeedbackReport, GeneratorConfig, HttpPublisher,
    JsonFileStore, Language, LlmScoringBackend, ParallelScorer, PipelineConfig, PipelineOrchestrator, PublishConfig,
    RetryPolicy, Rubric, RubricStep, RunMode, RunOptions, ScorerConfig, TranscriptSource, classify_transcript,
    read_transcript_file, select_by_vote, select_from_labels, select_from_table, write_feedback_json,
};

#[derive(Parser)]
#[command(name = "coach-feedback")]
#[command(author, version, about = "Instructional-coaching feedback from classroom transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select a rubric step and generate feedback for a transcript
    Run {
        /// Transcript file (JSON chunk array or plain text)
        #[arg(short, long, conflicts_with = "audio")]
        input: Option<PathBuf>,

        /// Audio file to transcribe
        #[arg(long, requires = "transcriber")]
        audio: Option<PathBuf>,

        /// Transcription command; the audio path is appended as its last argument
        #[arg(long)]
        transcriber: Option<String>,

        /// Execution mode (local or cloud)
        #[arg(long, default_value = "local")]
        mode: RunMode,

        /// Force the rubric step (1-12) instead of selecting one
        #[arg(long, value_parser = parse_step)]
        step: Option<RubricStep>,

        /// Feedback language (ko or en)
        #[arg(long, default_value = "ko")]
        language: Language,

        /// Fall back to the built-in sample transcript (local mode)
        #[arg(long)]
        sample: bool,

        /// Rubric override (TOML)
        #[arg(long)]
        rubric: Option<PathBuf>,

        #[command(flatten)]
        scorer: ScorerArgs,

        /// Output file for the feedback JSON (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output file for a human-readable report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Directory for session records
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Event server base URL; enables publishing
        #[arg(long)]
        publish_url: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print heuristic step labels for a transcript
    Classify {
        /// Transcript file (JSON chunk array or plain text)
        #[arg(short, long)]
        input: PathBuf,

        /// Rubric override (TOML)
        #[arg(long)]
        rubric: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Score every chunk against every step with the hosted model
    Score {
        /// Transcript file (JSON chunk array or plain text)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        scorer: ScorerArgs,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct ScorerArgs {
    /// Scoring calls allowed in flight
    #[arg(long, default_value = "24")]
    workers: usize,

    /// Global backend call rate
    #[arg(long, default_value = "8.0")]
    calls_per_sec: f64,

    /// Timeout for each backend call in seconds
    #[arg(long, default_value = "20")]
    call_timeout_secs: u64,

    /// Retries after a failed backend call
    #[arg(long, default_value = "2")]
    retries: u32,
}

impl ScorerArgs {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retries,
            ..RetryPolicy::default()
        }
    }

    fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            max_workers: self.workers.max(1),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            retry: self.retry_policy(),
            ..ScorerConfig::default()
        }
        .with_calls_per_sec(self.calls_per_sec)
    }
}

fn parse_step(value: &str) -> std::result::Result<RubricStep, String> {
    let id: u8 = value.trim().parse().map_err(|_| format!("{:?} is not a step id", value))?;
    RubricStep::from_id(id).ok_or_else(|| format!("step id {} is outside 1-12", id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            audio,
            transcriber,
            mode,
            step,
            language,
            sample,
            rubric,
            scorer,
            output,
            report,
            store_dir,
            publish_url,
            verbose,
        } => {
            setup_logging(verbose);
            let source = transcript_source(input, audio, sample)?;
            let orchestrator = build_orchestrator(mode, rubric, &scorer, transcriber, store_dir, publish_url)?;
            let options = RunOptions {
                forced_step: step,
                language,
                allow_sample: sample,
                metadata: None,
            };
            run_pipeline(&orchestrator, source, &options, output, report).await
        }
        Commands::Classify { input, rubric, verbose } => {
            setup_logging(verbose);
            classify(input, rubric)
        }
        Commands::Score { input, scorer, verbose } => {
            setup_logging(verbose);
            score(input, &scorer).await
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_rubric(path: Option<PathBuf>) -> Result<Rubric> {
    match path {
        Some(path) => {
            info!("Loading rubric from {:?}", path);
            Rubric::from_file(&path).with_context(|| format!("Failed to load rubric {:?}", path))
        }
        None => Ok(Rubric::default()),
    }
}

fn transcript_source(input: Option<PathBuf>, audio: Option<PathBuf>, sample: bool) -> Result<TranscriptSource> {
    match (input, audio) {
        (Some(input), _) => {
            info!("Loading transcript from {:?}", input);
            let chunks = read_transcript_file(&input).context("Failed to parse input transcript")?;
            Ok(TranscriptSource::Chunks(chunks))
        }
        (None, Some(audio)) => Ok(TranscriptSource::Audio(audio)),
        (None, None) if sample => Ok(TranscriptSource::Chunks(Vec::new())),
        (None, None) => bail!("one of --input, --audio or --sample is required"),
    }
}

fn cloud_client() -> Result<AnthropicClient> {
    let config = AnthropicConfig::from_env()?;
    info!("Using model {}", config.model);
    Ok(AnthropicClient::new(config)?)
}

fn build_orchestrator(
    mode: RunMode,
    rubric: Option<PathBuf>,
    scorer: &ScorerArgs,
    transcriber: Option<String>,
    store_dir: Option<PathBuf>,
    publish_url: Option<String>,
) -> Result<PipelineOrchestrator> {
    let engine = match mode {
        RunMode::Local => Engine::local(load_rubric(rubric)?),
        RunMode::Cloud => {
            if rubric.is_some() {
                info!("--rubric only affects local mode, ignoring it");
            }
            let config = PipelineConfig {
                scorer: scorer.scorer_config(),
                generator: GeneratorConfig {
                    retry: scorer.retry_policy(),
                    ..GeneratorConfig::default()
                },
            };
            Engine::cloud(cloud_client()?, config)
        }
    };

    let mut orchestrator = PipelineOrchestrator::new(engine);

    if let Some(command) = transcriber {
        orchestrator = orchestrator.with_transcriber(Arc::new(CommandTranscriber::from_command_line(&command)?));
    }
    if let Some(dir) = store_dir {
        orchestrator = orchestrator.with_store(Arc::new(JsonFileStore::new(dir)));
    }

    let mut publish = PublishConfig::from_env();
    if let Some(url) = publish_url {
        publish.enabled = true;
        publish.server_url = url;
    }
    if publish.enabled {
        info!("Publishing events to {}", publish.server_url);
        orchestrator = orchestrator.with_publisher(Arc::new(HttpPublisher::new(&publish)?));
    }

    Ok(orchestrator)
}

async fn run_pipeline(
    orchestrator: &PipelineOrchestrator,
    source: TranscriptSource,
    options: &RunOptions,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
) -> Result<()> {
    let result = orchestrator.run(source, options).await?;
    let feedback = &result.feedback;

    match &output {
        Some(path) => {
            write_feedback_json(feedback, path)?;
            info!("Feedback written to {:?}", path);
        }
        None => println!("{}", feedback.to_json()?),
    }

    if let Some(path) = &report {
        FeedbackReport::new(feedback).write_file(path)?;
        info!("Report written to {:?}", path);
    }

    info!(
        "Complete: session {}, step {}, confidence {:.2}{}",
        result.session_id,
        feedback.step_focus,
        feedback.confidence,
        if result.used_sample { " (sample transcript)" } else { "" }
    );
    if let Some(stored) = &result.stored {
        info!("Session record at {}", stored.location);
    }

    Ok(())
}

fn classify(input: PathBuf, rubric: Option<PathBuf>) -> Result<()> {
    let rubric = load_rubric(rubric)?;
    let chunks = read_transcript_file(&input).context("Failed to parse input transcript")?;

    let classification = classify_transcript(&chunks, &rubric);
    let selected = select_from_labels(&classification.labels);

    let out = json!({
        "labels": classification.labels,
        "notes": classification.notes,
        "selected_step": selected,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    info!("Selected step {}", selected);
    Ok(())
}

async fn score(input: PathBuf, scorer_args: &ScorerArgs) -> Result<()> {
    let chunks = read_transcript_file(&input).context("Failed to parse input transcript")?;
    if chunks.is_empty() {
        bail!("transcript {:?} has no chunks", input);
    }

    let backend = LlmScoringBackend::new(cloud_client()?);
    let scorer = ParallelScorer::new(Arc::new(backend), scorer_args.scorer_config());
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    let tables = scorer.score_all_steps(&texts).await.context("Scoring failed")?;
    let voted = select_by_vote(&tables);

    let per_chunk: Vec<_> = chunks
        .iter()
        .zip(&tables)
        .map(|(chunk, table)| {
            json!({
                "id": chunk.id,
                "scores": table,
                "top_step": select_from_table(table),
            })
        })
        .collect();

    let out = json!({ "chunks": per_chunk, "voted_step": voted });
    println!("{}", serde_json::to_string_pretty(&out)?);
    info!("Voted step {}", voted);
    Ok(())
}
