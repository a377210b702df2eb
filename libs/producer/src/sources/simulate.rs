use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;
use tokio::time::{Interval, MissedTickBehavior};

use relay_api::{PacketStream, SourceError, TelemetryPacket, TelemetrySource};

const MIN_SPEED: f64 = 60.0;
const MAX_SPEED: f64 = 340.0;
const IDLE_RPM: f64 = 4_000.0;
const MAX_RPM: f64 = 13_000.0;
const TOP_GEAR: i64 = 8;
const SPEED_PER_GEAR: f64 = (MAX_SPEED - MIN_SPEED) / TOP_GEAR as f64;

// ═══════════════════════════════════════════════════════════════
//  Car
// ═══════════════════════════════════════════════════════════════

/// Состояние одной машины: random walk педалей → скорость → передача/обороты.
struct Car {
    index: u32,
    speed: f64,
    throttle: f64,
    brake: f64,
}

impl Car {
    fn new(index: u32, rng: &mut Rng) -> Self {
        Self {
            index,
            speed: MIN_SPEED + rng.next_f64() * (MAX_SPEED - MIN_SPEED),
            throttle: rng.next_f64(),
            brake: 0.0,
        }
    }

    fn tick(&mut self, rng: &mut Rng) {
        self.throttle = (self.throttle + (rng.next_f64() * 2.0 - 1.0) * 0.25).clamp(0.0, 1.0);
        self.brake = if self.throttle < 0.2 {
            rng.next_f64()
        } else {
            0.0
        };
        let accel = self.throttle * 8.0 - self.brake * 15.0 - 1.0;
        self.speed = (self.speed + accel).clamp(MIN_SPEED, MAX_SPEED);
    }

    fn gear(&self) -> i64 {
        (((self.speed - MIN_SPEED) / SPEED_PER_GEAR) as i64 + 1).min(TOP_GEAR)
    }

    fn rpm(&self) -> f64 {
        let in_gear = ((self.speed - MIN_SPEED) % SPEED_PER_GEAR) / SPEED_PER_GEAR;
        let rpm = if self.gear() == TOP_GEAR && self.speed >= MAX_SPEED {
            MAX_RPM
        } else {
            IDLE_RPM + in_gear * (MAX_RPM - IDLE_RPM)
        };
        rpm.clamp(IDLE_RPM, MAX_RPM)
    }

    fn to_packet(&self, frame: u64, session_time: f64) -> TelemetryPacket {
        TelemetryPacket::new(json!({
            "m_header": {
                "m_playerCarIndex": self.index,
                "m_frameIdentifier": frame,
                "m_sessionTime": session_time,
            },
            "m_carTelemetryData": {
                "m_speed": self.speed.round() as u64,
                "m_engineRPM": self.rpm().round() as u64,
                "m_gear": self.gear(),
                "m_throttle": round3(self.throttle),
                "m_brake": round3(self.brake),
                "m_drs": u8::from(self.speed > 290.0 && self.throttle > 0.95),
            },
        }))
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub(crate) struct Rng {
    state: u64,
}

impl Rng {
    pub(crate) fn new(seed: i64) -> Self {
        let state = if seed == 0 {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64
                | 1 // ensure non-zero
        } else {
            seed as u64
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns f64 in [0, 1)
    pub(crate) fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }
}

// ═══════════════════════════════════════════════════════════════
//  SimulateSource
// ═══════════════════════════════════════════════════════════════

/// Synthetic session: `cars` cars visited round-robin, one packet per
/// interval. Never fails and never ends.
pub struct SimulateSource {
    cars: u32,
    interval: Duration,
    seed: i64,
}

impl SimulateSource {
    pub fn new(cars: u32, interval: Duration, seed: i64) -> Self {
        Self {
            cars,
            interval,
            seed,
        }
    }
}

impl TelemetrySource for SimulateSource {
    fn name(&self) -> &str {
        "simulate"
    }

    fn open(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn PacketStream>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let mut rng = Rng::new(self.seed);
            let cars = (0..self.cars.max(1)).map(|i| Car::new(i, &mut rng)).collect();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(source = "simulate", cars = self.cars, interval_ms = self.interval.as_millis() as u64, "simulation started");
            Ok(Box::new(SimulateStream {
                cars,
                rng,
                next: 0,
                emitted: 0,
                interval: self.interval,
                ticker,
            }) as Box<dyn PacketStream>)
        })
    }
}

struct SimulateStream {
    cars: Vec<Car>,
    rng: Rng,
    next: usize,
    emitted: u64,
    interval: Duration,
    ticker: Interval,
}

impl PacketStream for SimulateStream {
    fn next_packet(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Option<Result<TelemetryPacket, SourceError>>> + Send + '_>> {
        Box::pin(async move {
            self.ticker.tick().await;

            let frame = self.emitted / self.cars.len() as u64;
            // Session clock derived from packet count keeps seeded runs reproducible.
            let session_time = round3(self.emitted as f64 * self.interval.as_secs_f64());

            let car = &mut self.cars[self.next];
            car.tick(&mut self.rng);
            let packet = car.to_packet(frame, session_time);

            self.next = (self.next + 1) % self.cars.len();
            self.emitted += 1;
            Some(Ok(packet))
        })
    }
}
