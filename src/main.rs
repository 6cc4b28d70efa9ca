//! DonorSync CLI: availability, slot ranking, booking, and donor outreach
//! against the personal-data platform.
//!
//! Config: `~/.donorsync/config.json` (defaults when absent).
//! Logging: `RUST_LOG`, default `info`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use donorsync_lib::booking::BookingOrchestrator;
use donorsync_lib::config::{load_config_or_default, EngineConfig};
use donorsync_lib::error::{EngineError, ErrorReport};
use donorsync_lib::generation::StructuredGenerationAdapter;
use donorsync_lib::invitations::InvitationOrchestrator;
use donorsync_lib::platform::calendar::{CalendarPort, HttpCalendar};
use donorsync_lib::platform::documents::HttpDocumentStore;
use donorsync_lib::platform::llm::{HttpGenerative, PromptOptions};
use donorsync_lib::platform::PlatformClient;
use donorsync_lib::preferences::PreferenceSource;
use donorsync_lib::ranking::OptimalSlotRanker;
use donorsync_lib::types::{InvitationRequest, Urgency};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bearer token to use instead of the cached one
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bookable slots for a donor on a date (YYYY-MM-DD)
    Availability {
        #[arg(long)]
        donor: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Up to three recommended slots for a donor on a date
    Rank {
        #[arg(long)]
        donor: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Book the slot starting at an RFC 3339 instant
    Book {
        #[arg(long)]
        donor: String,
        #[arg(long)]
        hospital: String,
        #[arg(long)]
        purpose: String,
        #[arg(long)]
        start: DateTime<Utc>,
        /// Minutes; defaults to booking.defaultDurationMinutes
        #[arg(long)]
        duration: Option<u32>,
    },
    /// Generate pending invitations for one or more donors
    Invite {
        #[arg(long)]
        hospital: String,
        #[arg(long = "donor", required = true)]
        donors: Vec<String>,
        #[arg(long)]
        purpose: String,
        #[arg(long, value_enum, default_value_t = UrgencyArg::Normal)]
        urgency: UrgencyArg,
        #[arg(long)]
        compensation: Option<u64>,
        #[arg(long = "requirement")]
        requirements: Vec<String>,
    },
    /// Deliver a pending invitation and mark it sent
    SendInvitation {
        #[arg(long)]
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UrgencyArg {
    Low,
    Normal,
    High,
}

impl From<UrgencyArg> for Urgency {
    fn from(arg: UrgencyArg) -> Self {
        match arg {
            UrgencyArg::Low => Urgency::Low,
            UrgencyArg::Normal => Urgency::Normal,
            UrgencyArg::High => Urgency::High,
        }
    }
}

/// Every adapter shares one platform client and one token slot.
struct Engine {
    booking: BookingOrchestrator,
    ranker: OptimalSlotRanker,
    invitations: InvitationOrchestrator,
}

impl Engine {
    fn build(config: &EngineConfig, token: Option<&str>) -> Result<Self, EngineError> {
        let mut client = PlatformClient::new(&config.platform)
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        if let Some(token) = token {
            client = client.with_token(token);
        }
        let client = Arc::new(client);

        let calendar: Arc<dyn CalendarPort> = Arc::new(HttpCalendar::new(
            client.clone(),
            &config.platform.schemas.calendar_event,
        ));
        let documents = Arc::new(HttpDocumentStore::new(
            client.clone(),
            config.platform.schemas.clone(),
        ));
        let generative = Arc::new(HttpGenerative::new(client));
        let options = PromptOptions::from(&config.generation);

        let booking = BookingOrchestrator::new(
            calendar.clone(),
            config.business_hours.clone(),
            &config.booking,
        )?;
        let ranker = OptimalSlotRanker::new(StructuredGenerationAdapter::new(
            generative.clone(),
            options.clone(),
        ));
        let invitations = InvitationOrchestrator::new(
            documents.clone(),
            documents,
            PreferenceSource::new(
                calendar,
                &config.invitations.preference_query,
                config.invitations.search_limit,
            ),
            StructuredGenerationAdapter::new(generative, options),
            &config.invitations,
        );

        Ok(Self {
            booking,
            ranker,
            invitations,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args, config: EngineConfig) -> anyhow::Result<()> {
    let engine = Engine::build(&config, args.token.as_deref())?;

    match args.command {
        Command::Availability { donor, date } => {
            let availability = engine.booking.availability(&donor, date).await;
            if availability.is_degraded() {
                log::warn!("Calendar unavailable; every slot is shown as open");
            }
            print_json(&availability)
        }
        Command::Rank { donor, date } => {
            let ranked = engine
                .ranker
                .rank_for_date(engine.booking.calculator(), &donor, date)
                .await;
            print_json(&ranked)
        }
        Command::Book {
            donor,
            hospital,
            purpose,
            start,
            duration,
        } => {
            let date = engine.booking.calculator().local_date(start);
            let mut wizard = engine.booking.start(&donor, date).await?;
            wizard.select_slot(start)?;
            wizard.enter_details(engine.booking.request(&donor, &hospital, &purpose, duration))?;
            let record = engine.booking.confirm(&mut wizard).await?;
            print_json(&record)
        }
        Command::Invite {
            hospital,
            donors,
            purpose,
            urgency,
            compensation,
            requirements,
        } => {
            let request = InvitationRequest {
                hospital_id: hospital,
                donor_ids: donors,
                purpose,
                urgency: urgency.into(),
                compensation,
                additional_requirements: requirements,
            };
            let records = engine.invitations.generate_invitations(&request).await?;
            print_json(&records)
        }
        Command::SendInvitation { id } => {
            let record = engine.invitations.send_invitation(&id).await?;
            print_json(&record)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let result = match load_config_or_default() {
        Ok(config) => run(args, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(err) = result {
        match err.downcast_ref::<EngineError>() {
            Some(engine_err) => {
                let report = ErrorReport::from(engine_err);
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.message.clone())
                );
            }
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }
}
