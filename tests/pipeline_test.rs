//! Pipeline Integration Tests
//!
//! End-to-end checks across the public surface: ingest parsing through the
//! tick bus into sliding windows, scheduled analysis, snapshot persistence
//! and the wire contract of everything stored or pushed to clients.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use finstream::analytics::{AbcAnalyzer, AnalysisService, MonteCarloSimulator};
use finstream::bus::{InMemoryTickBus, TickBus, TickHandler, MARKET_STREAM_CHANNEL};
use finstream::config::Config;
use finstream::model::{scaled, MarketRegime, MarketSnapshot, Tick, SCALE};
use finstream::store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
use finstream::window::{WindowStore, MAX_WINDOW_SIZE};

const SEED: u64 = 20_240_601;

fn tick(symbol: &str, price: Decimal) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        price,
        volume: 25,
        timestamp: Utc::now(),
        exchange: "BINANCE".to_string(),
        bid: None,
        ask: None,
        high: None,
        low: None,
        open: None,
    }
}

fn geometric_prices(n: usize, ratio: f64) -> Vec<f64> {
    (0..n).map(|i| 100.0 * ratio.powi(i as i32)).collect()
}

fn analyzer() -> AbcAnalyzer {
    AbcAnalyzer::new(MonteCarloSimulator::new(2_000, 7))
}

fn seeded() -> StdRng {
    StdRng::seed_from_u64(SEED)
}

fn test_service(store: Arc<MemorySnapshotStore>) -> AnalysisService {
    let config = Config {
        monte_carlo_simulations: 1_000,
        ..Default::default()
    };
    AnalysisService::new(Arc::new(WindowStore::new()), store, &config)
}

// === Streaming flow ===

#[tokio::test]
async fn ticks_flow_from_bus_to_snapshot() {
    let bus = InMemoryTickBus::new();
    let store = Arc::new(MemorySnapshotStore::new());
    let service = Arc::new(test_service(store.clone()));

    let sink = service.clone();
    let handler: TickHandler = Arc::new(move |t| sink.record_tick(t));
    bus.subscribe(MARKET_STREAM_CHANNEL, handler).await.unwrap();

    for i in 0..80i64 {
        let price = dec!(64000) + Decimal::from(i * 3);
        bus.publish(MARKET_STREAM_CHANNEL, &tick("BTC", price))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = service.generate_snapshot("BTC").await;
    assert_eq!(snapshot.symbol, "BTC");
    assert_eq!(snapshot.current_price, dec!(64237));
    assert!(snapshot.abc_analysis.is_some());
    assert_ne!(snapshot.market_state, MarketRegime::Unknown);

    // The stored value is the wire JSON of the same snapshot
    let stored = store.find_latest("BTC").await.unwrap().unwrap();
    assert_eq!(stored.current_price, snapshot.current_price);
    assert_eq!(stored.market_state, snapshot.market_state);
}

#[test]
fn window_eviction_keeps_most_recent_five_hundred() {
    let windows = WindowStore::new();

    for i in 1..=750i64 {
        windows.append(tick("BTC", Decimal::from(i)));
    }

    let window = windows.snapshot("BTC");
    assert_eq!(window.len(), MAX_WINDOW_SIZE);
    assert_eq!(window[0].price, dec!(251));
    assert_eq!(window[MAX_WINDOW_SIZE - 1].price, dec!(750));
}

// === Analyzer end-to-end scenarios ===

#[test]
fn upward_trend_scenario() {
    let prices = geometric_prices(200, 1.001);
    let current = scaled(*prices.last().unwrap(), SCALE);
    let result = analyzer().analyze_with(&mut seeded(), &prices, current);

    assert!(result.arima_signal.trend_percentage > Decimal::ZERO);
    assert!(result.momentum_metrics.drift > Decimal::ZERO);
    assert!(result.market_prediction.probability_up > dec!(0.5));
    assert!(result.momentum_metrics.volatility >= Decimal::ZERO);
}

#[test]
fn downward_trend_scenario() {
    let prices = geometric_prices(200, 0.999);
    let current = scaled(*prices.last().unwrap(), SCALE);
    let result = analyzer().analyze_with(&mut seeded(), &prices, current);

    assert!(result.arima_signal.trend_percentage < Decimal::ZERO);
    assert!(result.momentum_metrics.drift < Decimal::ZERO);
    assert!(result.market_prediction.probability_up < dec!(0.5));
}

#[test]
fn level_step_scenario_flags_regime_change() {
    let mut prices: Vec<f64> = (0..140)
        .map(|i| 100.0 + 0.05 * (((i * 37) % 17) as f64 / 8.0 - 1.0))
        .collect();
    prices.extend((0..60).map(|i| 130.0 + 0.05 * (((i * 37) % 17) as f64 / 8.0 - 1.0)));

    let result = analyzer().analyze_with(&mut seeded(), &prices, dec!(130));
    assert!(result.arima_signal.structural_break_detected);
    assert_eq!(result.market_regime, MarketRegime::RegimeChange);
    assert!(result.needs_recalibration);
}

#[test]
fn insufficient_data_scenario() {
    let prices = geometric_prices(10, 1.001);
    let result = analyzer().analyze_with(&mut seeded(), &prices, dec!(100));

    assert_eq!(result.market_regime, MarketRegime::Unknown);
    assert_eq!(result.arima_signal.trend, Decimal::ZERO);
    assert_eq!(result.arima_signal.description, "Insufficient data");
    assert_eq!(result.momentum_metrics.drift, Decimal::ZERO);
    assert_eq!(result.momentum_metrics.prior_variance, dec!(0.01));
    assert_eq!(result.market_prediction.probability_up, dec!(0.5));
    assert_eq!(result.market_prediction.probability_down, dec!(0.5));
    assert_eq!(result.abc_integration_confidence, Decimal::ZERO);
    assert!(!result.needs_recalibration);
    assert!(result.market_prediction.price_targets.is_empty());
}

#[test]
fn prediction_invariants_hold_across_inputs() {
    for ratio in [1.002, 1.0, 0.998] {
        let prices = geometric_prices(120, ratio);
        let current = scaled(*prices.last().unwrap(), SCALE);
        let result = analyzer().analyze_with(&mut seeded(), &prices, current);
        let prediction = &result.market_prediction;

        let up = prediction.probability_up.to_f64().unwrap();
        let down = prediction.probability_down.to_f64().unwrap();
        let neutral = prediction.probability_neutral.to_f64().unwrap();
        assert!((0.0..=1.0).contains(&(up + down)));
        assert!((neutral - (1.0 - up - down).max(0.0)).abs() < 1e-9);

        let levels: Vec<u32> = prediction.price_targets.iter().map(|t| t.percentile).collect();
        assert_eq!(levels, vec![5, 25, 50, 75, 95]);

        let volatility = result.momentum_metrics.volatility.to_f64().unwrap();
        let expected_flag =
            result.arima_signal.structural_break_detected || volatility > 0.50;
        assert_eq!(result.needs_recalibration, expected_flag);
    }
}

#[test]
fn seeded_analysis_is_fully_deterministic() {
    let prices = geometric_prices(150, 1.0007);
    let first = analyzer().analyze_with(&mut seeded(), &prices, dec!(110));
    let second = analyzer().analyze_with(&mut seeded(), &prices, dec!(110));
    assert_eq!(first, second);
}

// === Wire contract ===

#[test]
fn tick_encode_decode_is_identity() {
    let original = Tick {
        symbol: "BTC".to_string(),
        price: dec!(64250.55),
        volume: 35_029,
        timestamp: Utc::now(),
        exchange: "BINANCE".to_string(),
        bid: Some(dec!(64250.00)),
        ask: Some(dec!(64251.00)),
        high: Some(dec!(66000.00)),
        low: Some(dec!(63500.00)),
        open: Some(dec!(64000.00)),
    };

    let json = serde_json::to_string(&original).unwrap();
    let decoded: Tick = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, original);
}

#[tokio::test]
async fn stored_snapshot_round_trips_byte_for_byte() {
    let store = Arc::new(MemorySnapshotStore::new());
    let service = Arc::new(test_service(store.clone()));

    for i in 0..100i64 {
        service.record_tick(tick("ETH", dec!(3000) + Decimal::from(i)));
    }
    service.generate_snapshot("ETH").await;

    let stored_json = store.find_latest_json("ETH").await.unwrap().unwrap();
    let decoded: MarketSnapshot = serde_json::from_str(&stored_json).unwrap();
    let re_encoded = serde_json::to_string(&decoded).unwrap();
    assert_eq!(re_encoded, stored_json);
}

#[tokio::test]
async fn sqlite_snapshot_round_trips_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("snapshots.db");
    let store = Arc::new(
        SqliteSnapshotStore::open(db_path.to_str().unwrap())
            .await
            .unwrap(),
    );

    let snapshot = MarketSnapshot::default_for("SOL");
    store.save(&snapshot).await.unwrap();

    let stored_json = store.find_latest_json("SOL").await.unwrap().unwrap();
    let decoded: MarketSnapshot = serde_json::from_str(&stored_json).unwrap();
    assert_eq!(serde_json::to_string(&decoded).unwrap(), stored_json);
    assert_eq!(decoded, snapshot);
}

#[tokio::test]
async fn default_snapshot_wire_shape() {
    let store = Arc::new(MemorySnapshotStore::new());
    let service = test_service(store.clone());

    // Window stays below the minimum, so the default snapshot is produced
    for i in 0..5i64 {
        service.record_tick(tick("XRP", dec!(1) + Decimal::new(i, 2)));
    }
    let snapshot = service.generate_snapshot("XRP").await;
    assert_eq!(snapshot.market_state, MarketRegime::Unknown);

    let stored_json = store.find_latest_json("XRP").await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&stored_json).unwrap();
    assert_eq!(value["symbol"], "XRP");
    assert_eq!(value["marketState"], "UNKNOWN");
    assert_eq!(value["currentPrice"], 0.0);
    assert!(value["abcAnalysis"].is_null());
}
