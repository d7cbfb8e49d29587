use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use clap::{Parser, Subcommand};

use cambio_client::api::{AlertRequest, RateBoard, Simulation};
use cambio_client::config::load_config;
use cambio_client::lifecycle::signals::shutdown_signal;
use cambio_client::observability::{logging, metrics};
use cambio_client::{ApiError, Services, UserHint};

#[derive(Parser)]
#[command(name = "cambio")]
#[command(about = "Command-line client for the Cambio Angola exchange-rate service", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every endpoint and show the ranking
    Endpoints,
    /// Keep probing endpoints until Ctrl+C
    Watch {
        /// Serve Prometheus metrics on the configured address
        #[arg(long)]
        metrics: bool,
    },
    /// Show published rates, newest first
    Rates {
        #[arg(short, long, default_value_t = 1)]
        days: usize,
    },
    /// Rate statistics
    Stats,
    /// Convert an amount between currencies (aoa, usd, eur, zar, cad)
    Simulate { amount: f64, from: String, to: String },
    /// Log in; prompts for the password when not given
    Login {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Check the stored session with the backend
    Validate,
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Save an Angolan mobile number for SMS alerts
    Phone { number: String },
    /// Manage rate alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },
    /// Administrator commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Download the rates workbook
    Export {
        /// Output path; defaults to taxas_cambio_<date>.xlsx
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    List,
    Create {
        /// usd, eur, zar or cad
        currency: String,
        value: f64,
        /// buy or sell
        rate_type: String,
        /// Fire when the rate falls below the value
        #[arg(long)]
        below: bool,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List every user
    Users,
    /// Show one user by email
    User { email: String },
    /// Grant or revoke premium by user id or email
    SetPremium {
        user: String,
        #[arg(long)]
        revoke: bool,
    },
    /// Publish today's rates
    UpdateRates {
        usd_buy: f64,
        usd_sell: f64,
        eur_buy: f64,
        eur_sell: f64,
        zar_buy: f64,
        zar_sell: f64,
        cad_buy: f64,
        cad_sell: f64,
    },
    /// List every user's alerts
    Alerts,
}

impl Commands {
    fn needs_backend(&self) -> bool {
        !matches!(self, Commands::Logout | Commands::Whoami | Commands::Watch { .. })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    logging::init_logging(&config.observability);

    let services = Services::bootstrap(config)?;
    if cli.command.needs_backend() {
        services.prober.refresh().await;
    }

    if let Err(e) = run(cli.command, &services).await {
        eprintln!("Error: {}", e);
        if let Some(api_error) = e.downcast_ref::<ApiError>() {
            match api_error.user_hint() {
                UserHint::Retry => eprintln!("The service may be temporarily unavailable, try again shortly."),
                UserHint::Reauthenticate => eprintln!("Run `cambio login <email>` and try again."),
                UserHint::FixInput | UserHint::Report => {}
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, services: &Services) -> Result<(), Box<dyn std::error::Error>> {
    let api = &services.api;

    match command {
        Commands::Endpoints => {
            let ranked = services.prober.snapshot();
            for endpoint in &ranked {
                println!(
                    "{:<60} {:<8} {:>8} {}",
                    endpoint.url,
                    endpoint.status.as_str(),
                    endpoint
                        .last_latency_ms
                        .map(|ms| format!("{} ms", ms))
                        .unwrap_or_else(|| "-".to_string()),
                    services.breakers.state(&endpoint.url).as_str(),
                );
            }
            match services.prober.best_endpoint() {
                Some(best) => println!("best: {}", best.url),
                None => println!("best: none configured"),
            }
        }
        Commands::Watch { metrics: serve_metrics } => {
            let observability = &services.config.observability;
            if serve_metrics || observability.metrics_enabled {
                metrics::init_metrics(observability.metrics_address.parse()?);
            }
            let handle = services.spawn_prober();
            shutdown_signal().await;
            services.shutdown.trigger();
            handle.await?;
            let breakers = services.breakers.stats();
            if !breakers.is_empty() {
                println!("{}", serde_json::to_string_pretty(&breakers)?);
            }
        }
        Commands::Rates { days } => {
            let rates = api.fetch_rates().await?;
            for rate in rates.iter().take(days.max(1)) {
                println!("{}", rate.date.as_deref().unwrap_or("-"));
                for (field, value) in rate.board.fields() {
                    println!("  {:<8} {:>10.2} Kz", field, value);
                }
            }
        }
        Commands::Stats => print_json(&api.fetch_rate_stats().await?)?,
        Commands::Simulate { amount, from, to } => {
            let request = Simulation {
                amount,
                from_currency: from,
                to_currency: to,
            };
            print_json(&api.simulate_exchange(&request).await?)?;
        }
        Commands::Login { email, password } => {
            let password = password_or_prompt(password)?;
            let outcome = api.login(&email, &password).await?;
            report_auth(outcome.session_started, outcome.response.message.as_deref());
        }
        Commands::Register { email, password } => {
            let password = password_or_prompt(password)?;
            let outcome = api.register(&email, &password).await?;
            report_auth(outcome.session_started, outcome.response.message.as_deref());
        }
        Commands::Validate => {
            let outcome = api.validate_session().await?;
            println!(
                "session valid{}",
                if outcome.session_started { ", token refreshed" } else { "" }
            );
        }
        Commands::Logout => {
            api.logout()?;
            println!("logged out");
        }
        Commands::Whoami => match api.current_user() {
            Some(user) => println!(
                "{} ({}){}{}",
                user.email,
                user.id,
                if user.is_premium { " premium" } else { "" },
                if user.is_admin { " admin" } else { "" },
            ),
            None => println!("not logged in"),
        },
        Commands::Phone { number } => print_message(api.save_phone_number(&number).await?.message),
        Commands::Alerts { command } => match command {
            AlertCommands::List => {
                for alert in api.fetch_user_alerts().await? {
                    println!(
                        "{}  {} {} {:?} {}",
                        alert.id, alert.currency, alert.rate_type, alert.direction, alert.value
                    );
                }
            }
            AlertCommands::Create {
                currency,
                value,
                rate_type,
                below,
            } => {
                let request = AlertRequest {
                    currency,
                    value,
                    rate_type,
                    direction: Some(if below { "below" } else { "above" }.to_string()),
                };
                print_message(api.create_alert(&request).await?.message);
            }
            AlertCommands::Delete { id } => print_message(api.delete_alert(&id).await?.message),
        },
        Commands::Admin { command } => match command {
            AdminCommands::Users => {
                for user in api.admin_list_users().await? {
                    println!(
                        "{}  {:<40} premium={} admin={} alerts={}",
                        user.id,
                        user.email,
                        user.is_premium,
                        user.is_admin,
                        user.alerts_count.unwrap_or(0)
                    );
                }
            }
            AdminCommands::User { email } => match api.admin_find_user_by_email(&email).await? {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
                None => println!("no user with email {}", email),
            },
            AdminCommands::SetPremium { user, revoke } => {
                let result = if user.contains('@') {
                    api.admin_set_premium_by_email(&user, !revoke).await?
                } else {
                    api.admin_set_premium(&user, !revoke).await?
                };
                print_message(result.message);
            }
            AdminCommands::UpdateRates {
                usd_buy,
                usd_sell,
                eur_buy,
                eur_sell,
                zar_buy,
                zar_sell,
                cad_buy,
                cad_sell,
            } => {
                let board = RateBoard {
                    usd_buy,
                    usd_sell,
                    eur_buy,
                    eur_sell,
                    zar_buy,
                    zar_sell,
                    cad_buy,
                    cad_sell,
                };
                print_message(api.admin_update_rates(&board).await?.message);
            }
            AdminCommands::Alerts => {
                for alert in api.admin_list_alerts().await? {
                    println!(
                        "{}  {:<32} {} {} {:?} {}",
                        alert.id,
                        alert.user_email.as_deref().unwrap_or("-"),
                        alert.currency,
                        alert.rate_type,
                        alert.direction,
                        alert.value
                    );
                }
            }
        },
        Commands::Export { output } => {
            let export = api.export_rates().await?;
            let path = output.unwrap_or_else(|| PathBuf::from(&export.file_name));
            tokio::fs::write(&path, &export.bytes).await?;
            println!("wrote {} ({} bytes)", path.display(), export.bytes.len());
        }
    }

    Ok(())
}

fn password_or_prompt(password: Option<String>) -> io::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn report_auth(session_started: bool, message: Option<&str>) {
    if let Some(message) = message {
        println!("{}", message);
    }
    if session_started {
        println!("logged in");
    } else {
        println!("no session started");
    }
}

fn print_message(message: Option<String>) {
    println!("{}", message.unwrap_or_else(|| "ok".to_string()));
}

fn print_json(value: &serde_json::Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
