use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use tokio::signal;
use tracing::{error, info};

use salon_inventory as app;
use app::entities::UserRole;
use app::services::{NewProduct, NewUser};

#[derive(Parser, Debug)]
#[command(name = "salon-inventory", version, about = "Salon inventory and point-of-sale service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Default)]
enum Command {
    /// Run the HTTP API (default)
    #[default]
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Create the default accounts and sample products
    Seed {
        /// Password given to the seeded accounts
        #[arg(long, default_value = "changeme123")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = app::config::load_config().context("failed to load configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;

    match cli.command.unwrap_or_default() {
        Command::Migrate => {
            app::db::run_migrations(&db).await?;
            Ok(())
        }
        Command::Seed { password } => {
            app::db::run_migrations(&db).await?;
            seed(Arc::new(db), cfg, &password).await
        }
        Command::Serve => {
            if cfg.auto_migrate {
                app::db::run_migrations(&db).await.map_err(|e| {
                    error!("Failed running migrations: {}", e);
                    e
                })?;
            }
            serve(Arc::new(db), cfg).await
        }
    }
}

async fn serve(db: Arc<sea_orm::DatabaseConnection>, cfg: app::config::AppConfig) -> anyhow::Result<()> {
    app::handlers::health::init_start_time();

    let (event_sender, event_rx) = app::events::EventSender::channel(cfg.event_channel_capacity);
    tokio::spawn(app::events::process_events(event_rx));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid listen address")?;
    let state = app::AppState::new(db, cfg, event_sender);
    let router = app::build_router(state);

    info!("salon-inventory listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

/// Idempotent: existing accounts are kept and products are only added to an
/// empty catalog.
async fn seed(
    db: Arc<sea_orm::DatabaseConnection>,
    cfg: app::config::AppConfig,
    password: &str,
) -> anyhow::Result<()> {
    let (event_sender, _event_rx) = app::events::EventSender::channel(cfg.event_channel_capacity);
    let state = app::AppState::new(db, cfg, event_sender);

    let accounts = [
        ("admin", "Salon Admin", UserRole::Admin),
        ("seller", "Front Desk", UserRole::Seller),
    ];
    let mut admin_id = None;
    for (username, name, role) in accounts {
        let user = match state.users.find_by_username(username).await? {
            Some(existing) => {
                info!(username, "Account already present");
                existing
            }
            None => {
                state
                    .users
                    .create_user(NewUser {
                        username: username.to_string(),
                        password: password.to_string(),
                        name: name.to_string(),
                        role,
                    })
                    .await?
            }
        };
        if role == UserRole::Admin {
            admin_id = Some(user.id);
        }
    }

    if !state.services.catalog.list().await?.is_empty() {
        info!("Catalog already has products; skipping sample products");
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let samples = [
        ("Argan Oil Shampoo", "Hair Care", "Moroccanoil", dec!(9.80), dec!(18.50), 24, 5, Some(365)),
        ("Keratin Mask", "Hair Care", "Kerastase", dec!(14.00), dec!(29.90), 12, 4, Some(90)),
        ("Gel Polish Base Coat", "Nails", "OPI", dec!(5.20), dec!(11.00), 30, 8, Some(540)),
        ("Cuticle Nippers", "Tools", "Tweezerman", dec!(7.50), dec!(16.00), 6, 2, None),
        ("Hydrating Face Serum", "Skin Care", "The Ordinary", dec!(6.10), dec!(14.50), 3, 5, Some(30)),
    ];
    for (name, category, brand, buy, sell, stock, min_stock, shelf_days) in samples {
        let input = NewProduct {
            name: name.to_string(),
            category: category.to_string(),
            brand: Some(brand.to_string()),
            buy_price: buy,
            sell_price: sell,
            stock,
            min_stock,
            expiry_date: shelf_days.map(|days| today + ChronoDuration::days(days)),
            barcode: None,
            description: None,
        };
        let created = state.services.catalog.create(input, admin_id).await?;
        info!(product_id = %created.id, name, "Sample product created");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
