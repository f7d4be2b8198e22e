use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use itd_config::DeskConfig;
use itd_schemas::{GlobalContext, Indicators, MarketTick};
use itd_strategy::Inference;

/// Sane OHLCV with the two indicators scenarios care about.
pub fn tick(symbol: &str, rsi: f64, macd: f64) -> MarketTick {
    MarketTick::new(symbol, 100.0, 102.0, 99.0, 101.0, 50_000.0).with_indicators(Indicators {
        ema_fast: Some(100.5),
        ema_slow: Some(100.0),
        macd: Some(macd),
        rsi: Some(rsi),
        atr: Some(1.2),
    })
}

/// A context that passes every market condition, with `leading` as the
/// strongest sectors (in order).
pub fn calm_context(leading: &[&str]) -> GlobalContext {
    let mut strength: BTreeMap<String, f64> = BTreeMap::from([
        ("NIFTY FMCG".to_string(), -0.004),
        ("NIFTY ENERGY".to_string(), -0.002),
        ("NIFTY BANK".to_string(), -0.001),
        ("NIFTY IT".to_string(), -0.003),
    ]);
    for (i, sector) in leading.iter().enumerate() {
        strength.insert(sector.to_string(), 0.02 - i as f64 * 0.001);
    }
    GlobalContext {
        volatility_index: 14.0,
        reference_change: 0.003,
        foreign_futures_changes: BTreeMap::from([
            ("S&P 500".to_string(), 0.002),
            ("Nasdaq".to_string(), 0.003),
            ("Dow".to_string(), 0.001),
        ]),
        asian_markets_changes: BTreeMap::from([("Nikkei".to_string(), 0.001), ("Hang Seng".to_string(), 0.002)]),
        currency_change: 0.0005,
        ..GlobalContext::default()
    }
    .with_sector_strength(strength, leading.len().max(1))
}

/// `h:m` IST on the given date, as UTC.
pub fn ist(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    let naive = date.and_hms_opt(h, m, 0).unwrap_or_default();
    Kolkata
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

pub fn sell_inference(confidence: f64) -> Inference {
    let rest = (1.0 - confidence) / 2.0;
    Inference {
        action_class: 2,
        probabilities: vec![rest, rest, confidence],
    }
}

/// Default desk config with no model file.
pub fn desk_config() -> DeskConfig {
    let mut cfg = DeskConfig::default();
    cfg.model.path = None;
    cfg
}

/// Replace universe and sector map with `symbols`, all in `sector`.
pub fn universe_of(cfg: &mut DeskConfig, symbols: &[&str], sector: &str) {
    cfg.universe = symbols.iter().map(|s| s.to_string()).collect();
    cfg.sectors = symbols.iter().map(|s| (s.to_string(), sector.to_string())).collect();
}
