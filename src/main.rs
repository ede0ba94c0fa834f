use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use contentpublisher::{
    analysis::{load_posts_csv, AnalysisEvent, AnalysisOptions, AnalysisReport},
    compliance::BrandGuidelines,
    design::DesignCodeGenerator,
    logging,
    utils::{image_mime_for_path, normalize_user_input_path},
    Config, Services,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Content publisher add-on tools from the command line", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyse past posts listed in a CSV and write the report
    Analyze(AnalyzeArgs),
    /// Generate add-on sandbox code for a design request
    Design {
        /// What to draw
        #[arg(required = true)]
        prompt: Vec<String>,

        /// Where to write the code (defaults to the configured output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check an image against brand guidelines
    Compliance {
        /// Image to check
        image: PathBuf,

        /// Guidelines document (text or PDF)
        #[arg(short, long)]
        guidelines: PathBuf,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// CSV with `image` and `likes` columns
    #[arg(long)]
    csv: PathBuf,

    /// Folder holding the images (defaults to the CSV's folder)
    #[arg(long)]
    images: Option<PathBuf>,

    /// Share of posts counted as popular
    #[arg(long)]
    top: Option<f64>,

    /// Minimum share of posts a feature must appear in
    #[arg(long)]
    threshold: Option<f64>,

    /// Report file (defaults to analysis.json in the uploads folder)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let log_level = cli.log_level.clone().unwrap_or_else(|| "warn".to_string());
    logging::init(&log_level)?;
    config.validate().await?;

    let services = Services::from_config(config)?;

    let result = match cli.command {
        Command::Analyze(args) => run_analyze(&services, args).await,
        Command::Design { prompt, output } => run_design(&services, &prompt.join(" "), output).await,
        Command::Compliance { image, guidelines } => run_compliance(&services, &image, &guidelines).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "[ERROR]".bright_red(), format!("{:#}", e).bright_red());
        std::process::exit(1);
    }
    Ok(())
}

async fn run_analyze(services: &Services, args: AnalyzeArgs) -> anyhow::Result<()> {
    let csv = normalize_user_input_path(&args.csv.to_string_lossy());
    let images = match args.images {
        Some(dir) => normalize_user_input_path(&dir.to_string_lossy()),
        None => csv.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let options = AnalysisOptions {
        top_percentage: args.top.unwrap_or(services.config.analysis.top_percentage),
        feature_threshold: args.threshold.unwrap_or(services.config.analysis.feature_threshold),
    };
    options.validate()?;

    let manifest = load_posts_csv(&csv, &images)
        .await
        .with_context(|| format!("Failed to read {}", csv.display()))?;
    println!(
        "{} {} posts from {} ({} rows)",
        "Loaded".bright_green(),
        manifest.posts.len().to_string().bright_white(),
        csv.display().to_string().bright_blue(),
        manifest.total_rows
    );
    for missing in &manifest.missing {
        println!("{} image not found: {}", "[SKIP]".bright_yellow(), missing);
    }
    if manifest.posts.is_empty() {
        anyhow::bail!("None of the images listed in {} exist in {}", csv.display(), images.display());
    }

    let pb = create_progress_bar(manifest.posts.len() as u64);
    let bar = pb.clone();
    let analyzer = services.analyzer().with_progress(Arc::new(move |event: &AnalysisEvent| match event {
        AnalysisEvent::Phase(phase) => bar.set_message(phase.label()),
        AnalysisEvent::PostStarted { path, .. } => bar.set_message(format!(
            "Analyzing {}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        )),
        AnalysisEvent::PostAnalyzed { .. } => bar.inc(1),
        AnalysisEvent::PostSkipped { path, error, .. } => {
            bar.println(format!("{} {}: {}", "[SKIP]".bright_yellow(), path.display(), error));
            bar.inc(1);
        }
        AnalysisEvent::Categorized { .. } => {}
    }));

    let report = analyzer.run_complete_analysis(&manifest.posts, options).await?;
    pb.finish_with_message(format!("{}", "Analysis complete".bright_green()));

    let saved_to = match args.output {
        Some(path) => {
            tokio::fs::write(&path, serde_json::to_vec_pretty(&report)?).await?;
            path
        }
        None => services.store.write_analysis(&report).await?,
    };

    print_report(&report);
    println!("{} {}", "[SAVED]".bright_blue(), saved_to.display().to_string().bright_white());
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    for (title, group) in [
        ("Popular posts", &report.popular_posts),
        ("Less popular posts", &report.less_popular_posts),
    ] {
        println!(
            "\n{} ({} of {} analyzed)",
            title.bright_white().bold(),
            group.analyzed,
            group.count
        );
        for (category, features) in &group.common_features {
            if features.is_empty() {
                continue;
            }
            let listed: Vec<String> = features
                .iter()
                .take(5)
                .map(|f| format!("{} ({}%)", f.feature, f.percentage))
                .collect();
            println!("  {} {}", format!("{}:", category).bright_cyan(), listed.join(", "));
        }
    }
    println!("\n{}\n{}", "Insights".bright_white().bold(), report.insights);
}

async fn run_design(services: &Services, prompt: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let generator = match output {
        Some(path) => DesignCodeGenerator::new(Arc::clone(&services.model), path),
        None => services.design_generator(),
    };

    let pb = create_spinner();
    pb.set_message(format!("Generating code for \"{}\"", prompt));
    let design = generator.generate(prompt).await;
    pb.finish_and_clear();

    let design = design?;
    println!("{}", design.code);
    println!("\n{} {}", "[SAVED]".bright_blue(), design.saved_to.display().to_string().bright_white());
    Ok(())
}

async fn run_compliance(services: &Services, image: &Path, guidelines: &Path) -> anyhow::Result<()> {
    let image = normalize_user_input_path(&image.to_string_lossy());
    let guidelines = BrandGuidelines::load(&normalize_user_input_path(&guidelines.to_string_lossy())).await?;
    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;

    let pb = create_spinner();
    pb.set_message(format!("Checking {} against {}", image.display(), guidelines.file_name()));
    let verdict = services
        .compliance_checker()
        .check(bytes, image_mime_for_path(&image).essence_str(), &guidelines)
        .await;
    pb.finish_and_clear();

    let verdict = verdict?;
    if verdict.compliant {
        println!("{} {}", "[PASSED]".bright_green().bold(), "Image meets brand guidelines".bright_white());
    } else {
        println!("{} {}", "[FAILED]".bright_red().bold(), "Image violates brand guidelines".bright_white());
    }
    if let Some(score) = verdict.score {
        println!("{} {}/10", "Score:".bright_cyan(), score);
    }
    println!("\n{}", verdict.raw_analysis);
    Ok(())
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["-", "\\", "|", "/", "-", "\\", "|", "/"]),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
