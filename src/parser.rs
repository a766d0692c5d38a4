//! Binance stream frame decoding
//!
//! Inbound frames are either a combined-stream envelope
//! `{"stream":"btcusdt@ticker","data":{...}}` or a bare event object. The
//! event discriminator is the `"e"` field; supported kinds are `24hrTicker`,
//! `trade` and `kline`. Numeric fields arrive as JSON strings.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use crate::error::{FeedError, Result};
use crate::model::Tick;

const EXCHANGE: &str = "BINANCE";

/// 24hr rolling-window ticker event
#[derive(Debug, Deserialize)]
struct TickerEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "E")]
    event_time: i64,
}

/// Individual trade event
#[derive(Debug, Deserialize)]
struct TradeEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Candlestick event; the payload of interest sits under `k`
#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "T")]
    close_time: i64,
}

/// Decode one inbound frame into a normalized tick.
///
/// Returns `Ok(None)` for frames that are valid JSON but not tick events
/// (subscription acks, unsupported event kinds).
pub fn parse_frame(payload: &str) -> Result<Option<Tick>> {
    let root: Value = serde_json::from_str(payload)?;

    // Combined-stream envelope vs direct event
    let event = match (root.get("stream"), root.get("data")) {
        (Some(_), Some(data)) => data,
        _ => &root,
    };

    let kind = match event.get("e").and_then(Value::as_str) {
        Some(kind) => kind,
        None => return Ok(None),
    };

    match kind {
        "24hrTicker" => {
            let ticker: TickerEvent = serde_json::from_value(event.clone())?;
            decode_ticker(ticker).map(Some)
        }
        "trade" => {
            let trade: TradeEvent = serde_json::from_value(event.clone())?;
            decode_trade(trade).map(Some)
        }
        "kline" => {
            let kline: KlineEvent = serde_json::from_value(event.clone())?;
            decode_kline(kline).map(Some)
        }
        _ => Ok(None),
    }
}

fn decode_ticker(event: TickerEvent) -> Result<Tick> {
    Ok(Tick {
        symbol: clean_symbol(&event.symbol),
        price: parse_decimal(&event.last_price)?,
        volume: parse_volume(&event.volume)?,
        timestamp: epoch_millis(event.event_time),
        exchange: EXCHANGE.to_string(),
        bid: None,
        ask: None,
        open: Some(parse_decimal(&event.open)?),
        high: Some(parse_decimal(&event.high)?),
        low: Some(parse_decimal(&event.low)?),
    })
}

fn decode_trade(event: TradeEvent) -> Result<Tick> {
    Ok(Tick {
        symbol: clean_symbol(&event.symbol),
        price: parse_decimal(&event.price)?,
        volume: parse_volume(&event.quantity)?,
        timestamp: epoch_millis(event.trade_time),
        exchange: EXCHANGE.to_string(),
        bid: None,
        ask: None,
        open: None,
        high: None,
        low: None,
    })
}

fn decode_kline(event: KlineEvent) -> Result<Tick> {
    let k = event.kline;
    Ok(Tick {
        symbol: clean_symbol(&event.symbol),
        price: parse_decimal(&k.close)?,
        volume: parse_volume(&k.volume)?,
        timestamp: epoch_millis(k.close_time),
        exchange: EXCHANGE.to_string(),
        bid: None,
        ask: None,
        open: Some(parse_decimal(&k.open)?),
        high: Some(parse_decimal(&k.high)?),
        low: Some(parse_decimal(&k.low)?),
    })
}

/// Map an exchange pair to the canonical symbol: `BTCUSDT` -> `BTC`
pub fn clean_symbol(symbol: &str) -> String {
    for suffix in ["USDT", "BUSD"] {
        if let Some(base) = symbol.strip_suffix(suffix) {
            return base.to_string();
        }
    }
    symbol.to_string()
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| FeedError::Decode(format!("bad decimal {raw:?}: {e}")))
}

fn parse_volume(raw: &str) -> Result<u64> {
    use rust_decimal::prelude::ToPrimitive;
    let value = parse_decimal(raw)?;
    Ok(value.trunc().to_u64().unwrap_or_default())
}

fn epoch_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
