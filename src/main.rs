use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::error;

use reserva_engine::config::Config;
use reserva_engine::domain::QuotePhase;
use reserva_engine::infra::http_client::ReqwestHttp;
use reserva_engine::logging;
use reserva_engine::ports::HttpClientPort;
use reserva_engine::reconciler::SelectionReconciler;
use reserva_engine::submission::{ContactFields, SubmissionCoordinator};

#[derive(Parser)]
#[command(name = "reserva_engine")]
#[command(about = "Course booking reservation and pricing engine")]
#[command(version = "0.1.0")]
struct Cli {
    /// School identifier; falls back to the configured default school
    #[arg(long)]
    school: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and print the option catalogs for a course
    Catalogs {
        /// Course key; defaults to the first course the school offers
        #[arg(long)]
        course: Option<String>,
    },
    /// Run the reconciliation flow and print the resulting quote
    Quote {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        weeks: Option<u32>,
        #[arg(long)]
        schedule: Option<String>,
    },
    /// Quote and submit a reservation
    Book {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        weeks: Option<u32>,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        country: String,
    },
}

fn print_phase(phase: &QuotePhase) {
    match phase {
        QuotePhase::Idle => println!("⏸  No quote requested yet"),
        QuotePhase::Loading => println!("⏳ Quote still loading"),
        QuotePhase::Quoted(r) => {
            println!("💶 Quote for {} ({}):", r.course_label, r.course_key);
            println!("   School: {} ({})", r.school_name, r.city);
            println!("   Schedule: {} · Weeks: {}", r.schedule, r.weeks);
            match r.offer_price {
                Some(offer) => println!("   Price: {:.2} (offer {:.2})", r.base_price, offer),
                None => println!("   Price: {:.2}", r.base_price),
            }
            if let Some(deadline) = r.booking_deadline {
                println!("   Book before: {deadline}");
            }
        }
        QuotePhase::AdvisorRequired(notice) => {
            println!("📞 Instant booking is not available for this country");
            println!("   Contact: {}", notice.advisor_contact);
            if !notice.message.is_empty() {
                println!("   {}", notice.message);
            }
        }
        QuotePhase::Failed(message) => println!("❌ Quote failed: {message}"),
    }
}

async fn run_quote_flow(
    engine: &SelectionReconciler,
    course: Option<&str>,
    weeks: Option<u32>,
    schedule: Option<&str>,
) {
    let mut snapshot = engine.init(course).await;
    if let Some(weeks) = weeks {
        snapshot = engine.select_weeks(weeks).await;
    }
    if let Some(schedule) = schedule {
        snapshot = engine.select_schedule(schedule).await;
    }
    print_phase(&snapshot.phase);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_or_env()?;

    let school = cli
        .school
        .or_else(|| config.api.default_school.clone())
        .context("No school given and no default_school configured")?;

    let http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new(config.api.timeout_seconds));
    let engine = SelectionReconciler::new(
        school.clone(),
        http.clone(),
        config.api.base_url.clone(),
        None,
    );

    match cli.command {
        Commands::Catalogs { course } => {
            println!("🔄 Loading catalogs for school {school}...");
            let snapshot = engine.init(course.as_deref()).await;
            println!(
                "\n📚 Courses ({}):",
                if snapshot.courses.error { "stale" } else { "fresh" }
            );
            for option in &snapshot.courses.items {
                println!("   - {}", option.code);
            }
            if let Some(course) = &snapshot.selection.course_key {
                println!("\n🕑 Schedules for {course}:");
                for option in &snapshot.schedules.items {
                    println!("   - {} (from {:.2})", option.code, option.min_price);
                }
                println!("\n📅 Weeks:");
                for option in &snapshot.weeks.items {
                    println!("   - {}", option.code);
                }
            }
        }
        Commands::Quote {
            course,
            weeks,
            schedule,
        } => {
            println!("🔄 Quoting for school {school}...");
            run_quote_flow(&engine, course.as_deref(), weeks, schedule.as_deref()).await;
        }
        Commands::Book {
            course,
            weeks,
            schedule,
            first_name,
            last_name,
            email,
            phone,
            country,
        } => {
            println!("🔄 Quoting for school {school}...");
            run_quote_flow(&engine, course.as_deref(), weeks, schedule.as_deref()).await;

            let Some(reservation) = engine.reservation() else {
                error!("no reservation available; cannot submit");
                println!("❌ Booking aborted: no instant quote available");
                engine.shutdown();
                return Ok(());
            };

            let contact = ContactFields {
                first_name,
                last_name,
                email,
                phone,
                country,
                notes: None,
            };
            let coordinator = SubmissionCoordinator::new(http, config.api.base_url.clone());
            let snapshot = engine.snapshot();
            let receipt = coordinator
                .submit(Some(&reservation), &snapshot.selection, &contact)
                .await;
            if receipt.success {
                println!("✅ Reservation submitted!");
                if let Some(message) = receipt.message {
                    println!("   {message}");
                }
            } else {
                println!(
                    "❌ Submission failed: {}",
                    receipt.message.unwrap_or_else(|| "unknown error".to_string())
                );
            }
        }
    }

    engine.shutdown();
    Ok(())
}
