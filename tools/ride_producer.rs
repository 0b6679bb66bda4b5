//! Ride Event Producer
//!
//! Serves newline-delimited JSON ride events over TCP for the fare stream
//! to consume. Fares follow a noisy linear relationship with distance, and a
//! configurable share of lines is deliberately malformed.
//!
//! Usage: `ride-producer [bind-addr] [count] [delay-ms] [malformed-rate]`
//! (`count` 0 streams forever)

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Ride event as written to the wire
#[derive(Debug, Serialize)]
struct RideMessage {
    ride_id: String,
    driver_id: u32,
    timestamp: String,
    distance_km: f64,
    fare_amount: f64,
}

/// Ride generator with a fixed fare structure
struct RideGenerator {
    rng: StdRng,
    base_fare: f64,
    per_km: f64,
}

impl RideGenerator {
    fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            base_fare: 3.0,
            per_km: 2.5,
        }
    }

    fn generate(&mut self) -> RideMessage {
        let distance_km = round2(self.rng.gen_range(0.5..50.0));
        let noise = self.rng.gen_range(-4.0..4.0);
        let fare_amount = round2((self.base_fare + self.per_km * distance_km + noise).max(0.0));

        RideMessage {
            ride_id: uuid::Uuid::new_v4().to_string(),
            driver_id: self.rng.gen_range(1..200),
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            distance_km,
            fare_amount,
        }
    }

    /// A line the fare stream must drop
    fn generate_malformed(&mut self) -> String {
        let ride = self.generate();
        match self.rng.gen_range(0..3) {
            0 => format!(
                r#"{{"ride_id":"{}","timestamp":"{}","fare_amount":{}}}"#,
                ride.ride_id, ride.timestamp, ride.fare_amount
            ),
            1 => format!(
                r#"{{"ride_id":"{}","timestamp":"{}","distance_km":"unknown","fare_amount":{}}}"#,
                ride.ride_id, ride.timestamp, ride.fare_amount
            ),
            _ => format!(r#"{{"ride_id":"{}","distance_km":"#, ride.ride_id),
        }
    }
}

/// Share of malformed lines, clamped to [0, 1]; unparsable or non-finite input means 5%
fn parse_malformed_rate(arg: Option<&str>) -> f64 {
    arg.and_then(|s| s.parse::<f64>().ok())
        .filter(|rate| rate.is_finite())
        .map_or(0.05, |rate| rate.clamp(0.0, 1.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn stream_rides(
    mut socket: TcpStream,
    count: u64,
    delay: Duration,
    malformed_rate: f64,
) -> anyhow::Result<u64> {
    let mut generator = RideGenerator::new();
    let mut sent = 0u64;
    let mut malformed = 0u64;

    while count == 0 || sent < count {
        let line = if generator.rng.gen_bool(malformed_rate) {
            malformed += 1;
            generator.generate_malformed()
        } else {
            serde_json::to_string(&generator.generate())?
        };

        socket.write_all(line.as_bytes()).await?;
        socket.write_all(b"\n").await?;
        sent += 1;

        if sent % 10 == 0 {
            info!(sent, malformed, "Published rides");
        }

        tokio::time::sleep(delay).await;
    }

    Ok(sent)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ride_producer=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let addr = args.get(1).map(|s| s.as_str()).unwrap_or("localhost:9999");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
    let delay_ms: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let malformed_rate = parse_malformed_rate(args.get(4).map(String::as_str));

    let listener = TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        count,
        delay_ms,
        malformed_rate,
        "Waiting for fare stream to connect"
    );

    loop {
        let (socket, peer) = listener.accept().await?;
        info!(peer = %peer, "Client connected");

        match stream_rides(socket, count, Duration::from_millis(delay_ms), malformed_rate).await {
            Ok(sent) => {
                info!(sent, "Finished streaming rides");
                return Ok(());
            }
            Err(e) => warn!(peer = %peer, error = %e, "Client disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_rate_parsing() {
        assert_eq!(parse_malformed_rate(None), 0.05);
        assert_eq!(parse_malformed_rate(Some("0.2")), 0.2);
        assert_eq!(parse_malformed_rate(Some("7")), 1.0);
        assert_eq!(parse_malformed_rate(Some("NaN")), 0.05);
        assert_eq!(parse_malformed_rate(Some("inf")), 0.05);
        assert_eq!(parse_malformed_rate(Some("often")), 0.05);
    }

    #[test]
    fn test_generated_fares_follow_distance() {
        let mut generator = RideGenerator::new();
        for _ in 0..50 {
            let ride = generator.generate();
            assert!(ride.fare_amount >= 0.0);
            assert!((ride.fare_amount - (3.0 + 2.5 * ride.distance_km)).abs() <= 4.01);
        }
    }
}
