use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use kerbside_billing::config::BillingConfig;
use kerbside_billing::domain::types::{HandlerId, RateId};
use kerbside_billing::domain::VehicleSession;
use kerbside_billing::reports::Reporting;
use kerbside_billing::service::{ensure_default_rate, SessionLifecycle};
use kerbside_billing::storage::{
    DatabaseConnection, RateRepository, SqlRateRepository, SqlSessionRepository,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "kerbside-billing")]
#[command(about = "Kerbside parking lot attendant tool - check-in, checkout and billing")]
struct Args {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Generate sample configuration file")]
    gen_config: bool,

    #[clap(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a vehicle in and print its ticket
    Checkin {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        handler: String,
        #[arg(long, default_value = "cash")]
        mode: String,
    },
    /// Check a vehicle out and print the charge
    Checkout {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        handler: String,
        #[arg(long, help = "Payment mode for the overage, if different")]
        additional_mode: Option<String>,
    },
    /// Show what checking out now would cost, without committing
    Preview {
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        handler: String,
    },
    /// List active sessions
    Active {
        #[arg(long)]
        handler: Option<String>,
    },
    /// Suggest active vehicle numbers by prefix
    Suggest {
        #[arg(long)]
        handler: String,
        #[arg(long)]
        prefix: String,
    },
    /// Daily financial summary for a handler
    Report {
        #[arg(long)]
        handler: String,
        #[arg(long, help = "Day to report, defaults to today (UTC)")]
        date: Option<NaiveDate>,
        #[arg(long, help = "Emit the summary as JSON")]
        json: bool,
    },
    /// Run migrations and seed the default rate
    Init,
    /// List configured rates
    Rates,
    /// Assign a rate to a handler
    Assign {
        #[arg(long)]
        handler: String,
        #[arg(long)]
        rate: String,
    },
}

struct Context {
    lifecycle: SessionLifecycle,
    reporting: Reporting,
    rates: Arc<SqlRateRepository>,
}

async fn connect(config: &BillingConfig) -> Result<(DatabaseConnection, Context)> {
    let connection = DatabaseConnection::connect(&config.database).await?;
    let sessions = Arc::new(SqlSessionRepository::new(connection.pool().clone()));
    let rates = Arc::new(SqlRateRepository::new(connection.pool().clone()));

    let context = Context {
        lifecycle: SessionLifecycle::new(sessions.clone(), rates.clone()),
        reporting: Reporting::new(sessions, rates.clone()),
        rates,
    };
    Ok((connection, context))
}

fn print_ticket(session: &VehicleSession) {
    println!("---- PARKING TICKET ----");
    println!("Vehicle: {}", session.vehicle_number);
    println!("In:      {}", session.checkin_time.format("%H:%M %d/%m/%Y"));
    println!("Mode:    {}", session.payment_mode);
    println!("Staff:   {}", session.handled_by);
    println!("------------------------");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    kerbside_common::logging::init_logging(&args.verbosity, "kerbside_billing=info")?;

    if args.gen_config {
        let config = BillingConfig::default();
        let toml = toml::to_string_pretty(&config)?;
        println!("{}", toml);
        return Ok(());
    }

    let config = BillingConfig::load(args.config)?;

    let Some(command) = args.command else {
        anyhow::bail!("no command given; see --help");
    };

    let (connection, context) = connect(&config).await?;

    if config.database.run_migrations {
        connection.run_migrations().await?;
    }

    match command {
        Command::Init => {
            let rate_id = ensure_default_rate(context.rates.as_ref(), &config.default_rate).await?;
            info!("Default rate ready: {}", rate_id);
            println!("initialized (default rate {})", rate_id);
        }
        Command::Checkin {
            vehicle,
            handler,
            mode,
        } => {
            let handler = HandlerId::new(handler);
            let session = context
                .lifecycle
                .open_session(&vehicle, &handler, &mode)
                .await?;
            print_ticket(&session);
        }
        Command::Checkout {
            vehicle,
            handler,
            additional_mode,
        } => {
            let handler = HandlerId::new(handler);
            let (session, breakdown) = context
                .lifecycle
                .close_session(&vehicle, &handler, additional_mode.as_deref())
                .await?;

            println!("---- CHECKOUT ----");
            println!("Vehicle:    {}", session.vehicle_number);
            println!("In:         {}", session.checkin_time.format("%H:%M %d/%m/%Y"));
            if let Some(out) = session.checkout_time {
                println!("Out:        {}", out.format("%H:%M %d/%m/%Y"));
            }
            println!("Initial:    {} ({})", breakdown.initial_payment, session.payment_mode);
            if let Some(charge) = &session.charge {
                if let Some(mode) = &charge.additional_payment_mode {
                    println!(
                        "Additional: {} ({}, {} extra unit(s))",
                        breakdown.additional_charge, mode, breakdown.extra_units
                    );
                }
            }
            println!("Total:      {}", breakdown.total_charge);
        }
        Command::Preview { vehicle, handler } => {
            let handler = HandlerId::new(handler);
            let breakdown = context
                .lifecycle
                .preview_charge(&vehicle, &handler, Utc::now())
                .await?;
            println!(
                "{} due so far ({} initial + {} for {} extra unit(s))",
                breakdown.total_charge,
                breakdown.initial_payment,
                breakdown.additional_charge,
                breakdown.extra_units
            );
        }
        Command::Active { handler } => {
            let handler = handler.map(HandlerId::new);
            let sessions = context.lifecycle.active_sessions(handler.as_ref()).await?;
            for session in &sessions {
                println!(
                    "{}  {}  in since {}  ({})",
                    session.vehicle_number,
                    session.handled_by,
                    session.checkin_time.format("%H:%M %d/%m/%Y"),
                    session.payment_mode
                );
            }
            println!("{} active session(s)", sessions.len());
        }
        Command::Suggest { handler, prefix } => {
            let handler = HandlerId::new(handler);
            for vehicle in context.lifecycle.suggest_vehicles(&handler, &prefix).await? {
                println!("{}", vehicle);
            }
        }
        Command::Report {
            handler,
            date,
            json,
        } => {
            let handler = HandlerId::new(handler);
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let summary = context
                .reporting
                .daily_financial_summary(&handler, date)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!("Summary for {} on {}", summary.handler, summary.date);
            println!(
                "Check-ins:  {} vehicle(s), {} collected",
                summary.checkins.total_count, summary.checkins.total_amount
            );
            println!(
                "Check-outs: {} vehicle(s), {} overage collected",
                summary.checkouts.total_count, summary.checkouts.total_additional
            );
            for (mode, amount) in summary.collected_by_mode() {
                println!("  {}: {}", mode, amount);
            }
            println!("Collected total: {}", summary.collected_total());
        }
        Command::Rates => {
            for rate in context.rates.list_rates().await? {
                println!(
                    "{}  {}  {} for first {}, then {} per {}",
                    rate.id,
                    rate.label,
                    rate.initial_amount,
                    rate.initial_duration,
                    rate.extra_charge,
                    rate.extra_charge_duration
                );
            }
        }
        Command::Assign { handler, rate } => {
            let handler = HandlerId::new(handler);
            let rate_id = RateId::from_str(&rate)?;
            context.rates.assign_handler(&handler, &rate_id).await?;
            println!("assigned {} to {}", rate_id, handler);
        }
    }

    Ok(())
}
