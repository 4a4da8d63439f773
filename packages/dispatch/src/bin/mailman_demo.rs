//! Demo binary: publishes a small car catalogue through a generic router.
//!
//! Usage: mailman-demo [--rounds <n>] [--interval-ms <ms>] [--json]

use std::time::Duration;

use clap::Parser;
use mailman_dispatch::{
    handler_fn, Dispatcher, GenericRouter, HandlerError, Invocation, Outcome, Publisher, RouterConfig,
    TraceLayer,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Mailman demo: dispatches car listings to a slow handler.
#[derive(Parser, Debug)]
#[command(name = "mailman-demo")]
#[command(about = "Publishes car listings through a mailman pipeline")]
struct Args {
    /// Number of times the catalogue is published.
    #[arg(long, env = "MAILMAN_ROUNDS", default_value = "3")]
    rounds: u32,

    /// Pause between rounds, in milliseconds.
    #[arg(
        long,
        env = "MAILMAN_INTERVAL_MS",
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval_ms: u64,

    /// How long the handler works on each car, in milliseconds.
    #[arg(long, env = "MAILMAN_HANDLER_DELAY_MS", default_value = "1000")]
    handler_delay_ms: u64,

    /// Buffer capacity and worker count.
    #[arg(long, env = "MAILMAN_BUFFER_SIZE", default_value = "10")]
    buffer_size: usize,

    /// Per-event deadline, in milliseconds.
    #[arg(long, env = "MAILMAN_TIMEOUT_MS", default_value = "30000")]
    timeout_ms: u64,

    /// Resubmissions allowed per event.
    #[arg(long, env = "MAILMAN_MAX_RETRIES", default_value = "5")]
    max_retries: u32,

    /// Emit logs as JSON lines.
    #[arg(long, env = "MAILMAN_JSON")]
    json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Car {
    mark: String,
    model: String,
    year: u16,
    price: f64,
    top_speed: String,
}

fn catalogue() -> Vec<Car> {
    let car = |mark: &str, model: &str, year, price, top_speed: &str| Car {
        mark: mark.to_string(),
        model: model.to_string(),
        year,
        price,
        top_speed: top_speed.to_string(),
    };
    vec![
        car("BYD", "Dolphin Mini", 2025, 115_000.0, "150 km/h"),
        car("BYD", "Seal", 2025, 230_000.0, "250 km/h"),
        car("Volkswagen", "Polo GTI", 2024, 110_000.0, "180 km/h"),
    ]
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn publish(publisher: Publisher<Car>, rounds: u32, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    for round in 1..=rounds {
        ticker.tick().await;
        for car in catalogue() {
            if publisher.send(car).await.is_err() {
                warn!(round = round, "router stopped accepting cars");
                return;
            }
        }
        info!(round = round, "catalogue published");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let delay = Duration::from_millis(args.handler_delay_ms);
    let handler = handler_fn(move |inv: Invocation| async move {
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = inv.ctx.cancelled() => return Err(HandlerError::rejected("deadline passed")),
        }

        let car: Car = inv.event.bind()?;
        info!(
            mark = %car.mark,
            model = %car.model,
            year = car.year,
            price = car.price,
            top_speed = %car.top_speed,
            attempt = inv.ctx.attempt,
            "car received"
        );
        Ok(Outcome::Handled)
    });

    let config = RouterConfig {
        buffer_size: args.buffer_size,
        timeout: Duration::from_millis(args.timeout_ms),
        max_retries: args.max_retries,
    };
    let (router, publisher) = GenericRouter::new(handler, config);

    let dispatcher = Dispatcher::default();
    dispatcher.layer(TraceLayer)?;
    dispatcher.register("show-cars-handler", router)?;

    tokio::spawn(publish(
        publisher,
        args.rounds,
        Duration::from_millis(args.interval_ms),
    ));

    tokio::select! {
        result = dispatcher.run() => {
            let report = result?;
            info!(router = %report.router, "all cars delivered");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}
