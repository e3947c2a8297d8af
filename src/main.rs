use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use narrai::{OpenAiEngine, Pipeline, Style, TemplateSet};

#[derive(Parser)]
#[command(name = "narrai")]
#[command(about = "Turn videos into narrated, TTS-ready scripts using OpenAI's GPT-4o", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: analyze the video, then generate narration
    Run {
        input_file: PathBuf,
        /// Narration template id (see `templates`)
        #[arg(short, long, default_value = "room-tour")]
        template: String,
        /// Seconds between sampled frames
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        interval: u32,
        /// Directory that receives the run's output directories
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        /// JSON file with custom prompt overrides
        #[arg(long, default_value = "custom_prompts.json")]
        prompts_file: PathBuf,
    },
    /// Sample and describe frames only, producing an analysis record
    Analyze {
        input_file: PathBuf,
        #[arg(short, long, default_value = "room-tour")]
        template: String,
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        interval: u32,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        #[arg(long, default_value = "custom_prompts.json")]
        prompts_file: PathBuf,
    },
    /// Generate narration and timing from a saved analysis record
    Narrate {
        analysis_file: PathBuf,
        #[arg(short, long, default_value = "room-tour")]
        template: String,
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
        #[arg(long, default_value = "custom_prompts.json")]
        prompts_file: PathBuf,
    },
    /// List the available narration templates
    Templates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            input_file,
            template,
            interval,
            output,
            prompts_file,
        } => {
            let style = resolve_style(&template, &prompts_file)?;
            let engine = OpenAiEngine::new();
            let pipeline = Pipeline {
                describer: &engine,
                generator: &engine,
                style,
                cancel: cancel_on_ctrl_c(),
            };
            let (analysis, narration) = pipeline
                .run(&input_file, &output, interval, &mut |_| {})
                .await?;
            println!("Analysis: {}", analysis.record_path.display());
            println!("Narration: {}", narration.narration_path.display());
            println!("Timing: {}", narration.timing_path.display());
        }
        Commands::Analyze {
            input_file,
            template,
            interval,
            output,
            prompts_file,
        } => {
            let style = resolve_style(&template, &prompts_file)?;
            let engine = OpenAiEngine::new();
            let pipeline = Pipeline {
                describer: &engine,
                generator: &engine,
                style,
                cancel: cancel_on_ctrl_c(),
            };
            let analysis = pipeline
                .analyze(&input_file, &output, interval, &mut |_| {})
                .await?;
            println!("Analysis: {}", analysis.record_path.display());
        }
        Commands::Narrate {
            analysis_file,
            template,
            output,
            prompts_file,
        } => {
            let style = resolve_style(&template, &prompts_file)?;
            let engine = OpenAiEngine::new();
            let pipeline = Pipeline {
                describer: &engine,
                generator: &engine,
                style,
                cancel: cancel_on_ctrl_c(),
            };
            let narration = pipeline
                .narrate_file(&analysis_file, &output, &mut |_| {})
                .await?;
            println!("Narration: {}", narration.narration_path.display());
            println!("Timing: {}", narration.timing_path.display());
        }
        Commands::Templates => {
            for template in TemplateSet::builtin().iter() {
                println!(
                    "{:<18} {} - {}",
                    template.id, template.name, template.description
                );
            }
        }
    }

    Ok(())
}

fn resolve_style(template_id: &str, prompts_file: &Path) -> anyhow::Result<Style> {
    let mut templates = TemplateSet::builtin();
    templates.load_overrides(prompts_file);
    let template = templates.get(template_id).ok_or_else(|| {
        let known: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        anyhow::anyhow!(
            "unknown template '{}' (available: {})",
            template_id,
            known.join(", ")
        )
    })?;
    Ok(template.style())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, stopping after the current step");
            handle.cancel();
        }
    });
    token
}
