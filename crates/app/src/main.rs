mod config;
mod demo;

use std::fmt;
use std::sync::Arc;

use dotenv::dotenv;
use lms_core::model::{CourseId, Principal, UserId};
use services::collaborators::{
    Collaborators, HttpMediaConfig, HttpMediaSource, NoCertificateUrl, UrlCertificateRenderer,
};
use services::{AppServices, Clock};
use storage::repository::Storage;
use tracing::{info, warn};
use url::Url;

use crate::config::AppConfig;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    Required { flag: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::Required { flag } => write!(f, "{flag} is required"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<u64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- migrate [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- recalc  [--db <sqlite_url>] [--course <id>]");
    eprintln!("  cargo run -p app -- report  [--db <sqlite_url>] --student <id> --course <id>");
    eprintln!("  cargo run -p app -- demo");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  config.toml, config.{{APP_ENV}}.toml, LMS_DATABASE__URL, LMS_LOG_LEVEL,");
    eprintln!("  LMS_MEDIA__BASE_URL, LMS_MEDIA__API_KEY, LMS_CERTIFICATES__BASE_URL");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    Recalc,
    Report,
    Demo,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "migrate" => Some(Self::Migrate),
            "recalc" => Some(Self::Recalc),
            "report" => Some(Self::Report),
            "demo" => Some(Self::Demo),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: Option<String>,
    course: Option<CourseId>,
    student: Option<UserId>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(value);
                }
                "--course" => parsed.course = Some(CourseId::new(parse_id(args, "--course")?)),
                "--student" => parsed.student = Some(UserId::new(parse_id(args, "--student")?)),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(parsed)
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// sqlx does not create missing database files for plain `sqlite://` URLs.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::new(&config.log_level);
    let tracing_format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_ansi(true);

    // stdout carries command output; logs go to stderr.
    let tracing_builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .event_format(tracing_format);

    if config.is_production() {
        tracing_builder.json().init();
    } else {
        tracing_builder
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

/// Remote media and certificate URLs when configured, in-process stand-ins otherwise.
fn collaborators(config: &AppConfig) -> Result<Collaborators, Box<dyn std::error::Error>> {
    let mut collaborators = Collaborators::in_memory();
    if let Some(base_url) = config.media.base_url.clone() {
        collaborators.media = Arc::new(HttpMediaSource::new(Some(HttpMediaConfig {
            base_url,
            api_key: config.media.api_key.clone(),
        })));
    }
    collaborators.certificates = match &config.certificates.base_url {
        Some(base) => Arc::new(UrlCertificateRenderer::new(Url::parse(base)?)),
        None => Arc::new(NoCertificateUrl),
    };
    Ok(collaborators)
}

async fn open_services(
    config: &AppConfig,
    args: &Args,
) -> Result<AppServices, Box<dyn std::error::Error>> {
    let db_url = normalize_sqlite_url(
        args.db_url
            .clone()
            .unwrap_or_else(|| config.database.url.clone()),
    );
    prepare_sqlite_file(&db_url)?;
    info!(db = %db_url, "opening database");
    Ok(AppServices::new_sqlite(&db_url, Clock::system(), collaborators(config)?).await?)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let config = AppConfig::init()?;
    init_tracing(config);

    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    match cmd {
        Command::Migrate => {
            let db_url = normalize_sqlite_url(
                args.db_url
                    .unwrap_or_else(|| config.database.url.clone()),
            );
            prepare_sqlite_file(&db_url)?;
            Storage::sqlite(&db_url).await?;
            info!(db = %db_url, "schema up to date");
        }
        Command::Recalc => {
            let app = open_services(config, &args).await?;
            let report = match args.course {
                Some(course) => app.recalc().recalculate_course(course).await?,
                None => app.recalc().recalculate_all().await?,
            };
            if report.failed > 0 {
                warn!(failed = report.failed, "some enrollments were not recalculated");
            }
            print_json(&report)?;
        }
        Command::Report => {
            let student = args.student.ok_or(ArgsError::Required { flag: "--student" })?;
            let course = args.course.ok_or(ArgsError::Required { flag: "--course" })?;
            let app = open_services(config, &args).await?;
            let operator = Principal::admin(UserId::new(0));
            let report = app
                .enrollments()
                .progress_report(&operator, student, course)
                .await?;
            print_json(&report)?;
        }
        Command::Demo => {
            let app = AppServices::in_memory(Clock::system());
            let summary = demo::run_demo(&app).await?;
            print_json(&summary)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = raw.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn parses_ids_and_db() {
        let args = parse(&["--db", "sqlite:lms.db", "--course", "3", "--student", "7"]).unwrap();
        assert_eq!(args.db_url.as_deref(), Some("sqlite:lms.db"));
        assert_eq!(args.course, Some(CourseId::new(3)));
        assert_eq!(args.student, Some(UserId::new(7)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            parse(&["--course", "x"]),
            Err(ArgsError::InvalidId { flag: "--course", .. })
        ));
        assert!(matches!(
            parse(&["--db"]),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
        assert!(matches!(parse(&["--db", " "]), Err(ArgsError::InvalidDbUrl { .. })));
        assert!(matches!(parse(&["--verbose"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn sqlite_urls_become_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/lms.sqlite3".into()),
            "sqlite:///tmp/lms.sqlite3"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:/tmp/lms.sqlite3".into()),
            "sqlite:///tmp/lms.sqlite3"
        );
    }
}
