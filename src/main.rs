mod ai;
mod browser;
mod config;
mod db;
mod extract;
mod letter;
mod models;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::Settings;
use db::Database;
use letter::LetterComposer;
use models::{
    parse_skills, ApplicantProfile, ComposeMode, CoverLetterRequest, ExperienceBand, JobRecord,
};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jobhunt")]
#[command(about = "Scrape job listings, keep them in a local database, and draft cover letters")]
struct Cli {
    /// Path to a config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database
    Init,

    /// Scrape listings and save the new ones
    Search {
        /// Job title or keywords
        query: String,

        /// City, state, or "remote"
        #[arg(short, long)]
        location: Option<String>,

        /// Maximum number of cards to process
        #[arg(short = 'n', long)]
        max: Option<usize>,
    },

    /// List saved jobs
    List {
        /// Only jobs not yet applied to
        #[arg(long)]
        unapplied: bool,

        /// Only jobs whose title or company contains this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Sort order
        #[arg(short, long, value_enum, default_value_t = SortOrder::Recent)]
        sort: SortOrder,
    },

    /// Show one saved job
    Show {
        /// Job ID
        id: i64,
    },

    /// Mark a job as applied
    Apply {
        /// Job ID
        id: i64,
    },

    /// Delete all saved jobs
    Clear,

    /// Draft a cover letter for a saved job
    Letter {
        /// Job ID
        id: i64,

        /// Use the text-generation service (falls back to the template)
        #[arg(long)]
        ai: bool,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Years of experience (0-1, 2-3, 4-5, 6-10, 10+)
        #[arg(long)]
        experience: Option<ExperienceBand>,

        /// Comma-separated skills
        #[arg(long)]
        skills: Option<String>,

        /// Write the letter to this file (or into this directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SortOrder {
    /// Most recently scraped first
    Recent,
    /// Company A-Z
    Company,
    /// Title A-Z
    Title,
}

/// Apply the `list` filters to jobs already ordered newest first.
fn select_jobs(
    jobs: Vec<JobRecord>,
    unapplied: bool,
    filter: Option<&str>,
    sort: SortOrder,
) -> Vec<JobRecord> {
    let needle = filter
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());
    let mut selected: Vec<_> = jobs
        .into_iter()
        .filter(|j| !unapplied || !j.applied)
        .filter(|j| match &needle {
            Some(n) => j.title.to_lowercase().contains(n) || j.company.to_lowercase().contains(n),
            None => true,
        })
        .collect();

    match sort {
        SortOrder::Recent => {}
        SortOrder::Company => selected.sort_by(|a, b| a.company.cmp(&b.company)),
        SortOrder::Title => selected.sort_by(|a, b| a.title.cmp(&b.title)),
    }
    selected
}

/// "Total jobs: N | Companies: M" over every stored job.
fn summary(jobs: &[JobRecord]) -> String {
    let companies: HashSet<&str> = jobs.iter().map(|j| j.company.as_str()).collect();
    format!("Total jobs: {} | Companies: {}", jobs.len(), companies.len())
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "jobhunt=warn",
        1 => "jobhunt=info",
        _ => "jobhunt=debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    let mut db = Database::open(&settings.database_path())?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Search {
            query,
            location,
            max,
        } => {
            let location = location.unwrap_or_else(|| settings.search.location.clone());
            let max = max.unwrap_or(settings.search.max_results);

            println!("Searching for '{}' in '{}'...", query, location);
            let searcher = browser::JobSearcher::new(settings.browser.clone());
            let jobs = searcher.search(&query, &location, max);

            if jobs.is_empty() {
                println!("No jobs found - the site may be blocking automated access or its layout changed.");
                println!("Re-run with -v for details.");
            } else {
                let saved = db.persist(&jobs)?;
                println!("Found {} jobs, saved {} new ones.", jobs.len(), saved);
                for (i, job) in jobs.iter().enumerate() {
                    println!("{:>3}. {} @ {} ({})", i + 1, truncate(&job.title, 50), job.company, job.location);
                }
            }
        }

        Commands::List {
            unapplied,
            filter,
            sort,
        } => {
            let all = db.list_all()?;
            println!("{}", summary(&all));
            let jobs = select_jobs(all, unapplied, filter.as_deref(), sort);
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<6} {:<8} {:<32} {:<22} {:<20} {:<16}",
                    "ID", "APPLIED", "TITLE", "COMPANY", "LOCATION", "SCRAPED"
                );
                println!("{}", "-".repeat(108));
                for job in jobs {
                    println!(
                        "{:<6} {:<8} {:<32} {:<22} {:<20} {:<16}",
                        job.id,
                        if job.applied { "yes" } else { "-" },
                        truncate(&job.title, 30),
                        truncate(&job.company, 20),
                        truncate(&job.location, 18),
                        job.scraped_at
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Commands::Show { id } => match db.get_job(id)? {
            Some(job) => {
                println!("Job #{}", job.id);
                println!("Title: {}", job.title);
                println!("Company: {}", job.company);
                println!("Location: {}", job.location);
                println!("Applied: {}", if job.applied { "yes" } else { "no" });
                println!(
                    "Scraped: {}",
                    job.scraped_at
                        .with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M:%S")
                );
            }
            None => {
                println!("Job #{} not found.", id);
            }
        },

        Commands::Apply { id } => {
            if !db.mark_applied(id)? {
                return Err(anyhow!("Job #{} not found", id));
            }
            println!("Marked job #{} as applied.", id);
        }

        Commands::Clear => {
            db.clear()?;
            println!("Database cleared.");
        }

        Commands::Letter {
            id,
            ai,
            name,
            email,
            phone,
            experience,
            skills,
            output,
        } => {
            let job = db
                .get_job(id)?
                .ok_or_else(|| anyhow!("Job #{} not found", id))?;

            let applicant = ApplicantProfile {
                name,
                email,
                phone,
                experience,
                skills: skills.as_deref().map(parse_skills).unwrap_or_default(),
            };
            let applicant = (!applicant.is_empty()).then_some(applicant);
            let mode = if ai {
                ComposeMode::AiAssisted
            } else {
                ComposeMode::Deterministic
            };

            let composer = LetterComposer::from_settings(&settings)?;
            if ai && !composer.can_generate() {
                eprintln!("No OPENAI_API_KEY configured; using the template letter.");
            }
            let request = CoverLetterRequest::for_job(&job, applicant, mode);
            let text = composer.compose(&request);

            match output {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(letter::letter_file_name(&job.company, &job.title))
                    } else {
                        path
                    };
                    std::fs::write(&path, &text)
                        .with_context(|| format!("Failed to write to {}", path.display()))?;
                    println!("Cover letter saved to: {}", path.display());
                }
                None => println!("{}", text),
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
