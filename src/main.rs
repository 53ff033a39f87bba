mod api;
mod cli;
mod normalize;
mod poll;
mod prelude;
mod reading;
mod sensor;
mod tables;

use clap::Parser;
use serde_json::Value;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::{
    api::solark::Error as ApiError,
    cli::{Args, Command, DebugCommand},
    normalize::normalize,
    poll::Poller,
    prelude::*,
    reading::Reading,
};

#[tokio::main]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).compact().init();

    match Args::parse().command {
        Command::Poll(args) => {
            let api = args.connection.try_new_client()?;
            let poller = Poller::new(api, args.connection.plant_id.clone(), args.interval());
            let (publisher, mut observer) = watch::channel::<Option<Reading>>(None);

            let printer = tokio::spawn(async move {
                while observer.changed().await.is_ok() {
                    let Some(reading) = observer.borrow_and_update().clone() else {
                        continue;
                    };
                    match serde_json::to_string(&reading) {
                        Ok(line) => println!("{line}"),
                        Err(error) => warn!(%error, "failed to serialize the reading"),
                    }
                }
            });

            let outcome = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    Ok(())
                }
                outcome = poller.run(&publisher) => outcome,
            };
            drop(publisher);
            let _ = printer.await;
            outcome
        }

        Command::Fetch(args) => {
            let api = args.connection.try_new_client()?;
            let record = api.fetch_telemetry(&args.connection.plant_id).await?;
            let reading = normalize(&record);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&reading)?);
            } else {
                println!("{}", tables::build_reading_table(&reading));
            }
            Ok(())
        }

        Command::Validate(args) => {
            let api = args.connection.try_new_client()?;
            match api.validate(&args.connection.plant_id).await {
                Ok(plant_name) => {
                    info!(plant_name = %plant_name, "connection OK");
                    Ok(())
                }
                Err(error) => {
                    let advice = match &error {
                        ApiError::Auth(_) => "invalid credentials",
                        ApiError::Connection(_) | ApiError::RateLimit(_) => {
                            "cannot connect to Sol-Ark Cloud"
                        }
                        ApiError::Api(_) => "invalid plant identifier",
                    };
                    Err(error).context(advice)
                }
            }
        }

        Command::Debug(args) => {
            let api = args.connection.try_new_client()?;
            match args.command {
                DebugCommand::Login => {
                    api.authenticate().await?;
                    info!("authenticated");
                }
                DebugCommand::PlantData => {
                    let plant = api.get_plant_data(&args.connection.plant_id).await?;
                    println!("{}", serde_json::to_string_pretty(&Value::Object(plant))?);
                }
                DebugCommand::Telemetry => {
                    let record = api.fetch_telemetry(&args.connection.plant_id).await?;
                    println!("{}", serde_json::to_string_pretty(&Value::Object(record))?);
                }
            }
            Ok(())
        }
    }
}
