//! Event Publishing Tool
//!
//! Run with: cargo run --bin enqueue_events -- --account ACC-1 --kind Credit --amount 100 --count 10

use std::str::FromStr;
use std::time::{Duration, Instant};

use banking_event_receiver::queue::PgMessageQueue;
use banking_event_receiver::{Event, EventKind};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;

fn arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let account = arg(&args, "--account")
        .ok_or_else(|| anyhow::anyhow!("--account is required"))?
        .to_string();
    let kind = EventKind::from(arg(&args, "--kind").unwrap_or("Credit").to_string());
    let amount = Decimal::from_str(arg(&args, "--amount").unwrap_or("1"))?;
    let count: u64 = arg(&args, "--count").unwrap_or("1").parse()?;

    let database_url = std::env::var("DATABASE_URL")?;

    println!("Enqueueing {} {} event(s) of {} for {}", count, kind, amount, account);

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    // Lock duration is irrelevant for publishing
    let queue = PgMessageQueue::new(pool, Duration::from_secs(300));

    let start = Instant::now();
    for i in 0..count {
        let event = Event::new(kind.clone(), amount, account.clone());
        let id = queue.enqueue(&event.to_json()?).await?;

        if (i + 1) % 100 == 0 || i + 1 == count {
            println!("Enqueued {} (last message {})", i + 1, id);
        }
    }

    println!("Done in {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
