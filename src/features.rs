use crate::indicators::{
    calculate_ema_adjusted, calculate_macd_histogram, calculate_pct_change, calculate_rsi,
    calculate_sma,
};
use crate::models::Candle;

pub const FEATURE_NAMES: [&str; 6] = ["sma_10", "sma_50", "ema_10", "rsi_14", "macd", "return_1"];

pub const SMA_FAST_INDEX: usize = 0;
pub const SMA_SLOW_INDEX: usize = 1;
pub const MACD_INDEX: usize = 4;

pub type FeatureRow = [f64; 6];

/// Candles aligned row-for-row with their feature vectors and direction labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub candles: Vec<Candle>,
    pub features: Vec<FeatureRow>,
    pub labels: Vec<bool>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

/// Builds the feature matrix and labels, dropping rows still in indicator
/// warm-up and the trailing rows whose future return is unknown.
pub fn prepare_dataset(candles: &[Candle], predict_horizon: usize) -> Dataset {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let sma_10 = calculate_sma(&closes, 10);
    let sma_50 = calculate_sma(&closes, 50);
    let ema_10 = calculate_ema_adjusted(&closes, 10);
    let rsi_14 = calculate_rsi(&closes, 14);
    let macd = calculate_macd_histogram(&closes, 12, 26, 9);
    let return_1 = calculate_pct_change(&closes, 1);
    let horizon_returns = calculate_pct_change(&closes, predict_horizon);

    let mut dataset = Dataset {
        candles: Vec::new(),
        features: Vec::new(),
        labels: Vec::new(),
    };

    for (i, candle) in candles.iter().enumerate() {
        let future_return = horizon_returns.get(i + predict_horizon).copied().flatten();
        let row = (
            sma_10[i], sma_50[i], rsi_14[i], macd[i], return_1[i], future_return,
        );
        let (Some(sma_fast), Some(sma_slow), Some(rsi), Some(macd_diff), Some(ret), Some(future)) =
            row
        else {
            continue;
        };

        dataset.candles.push(candle.clone());
        dataset
            .features
            .push([sma_fast, sma_slow, ema_10[i], rsi, macd_diff, ret]);
        dataset.labels.push(future > 0.0);
    }

    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn build_candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|idx| {
                let t = idx as f64;
                let close = 100.0 + t * 0.1 + (t / 5.0).sin() * 2.0;
                Candle {
                    timestamp: start + Duration::hours(idx as i64),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn drops_warmup_and_unlabelled_tail() {
        let candles = build_candles(100);
        let dataset = prepare_dataset(&candles, 1);

        // sma_50 is the longest warm-up (first value at index 49), the last row has no future.
        assert_eq!(dataset.len(), 100 - 49 - 1);
        assert_eq!(dataset.features.len(), dataset.len());
        assert_eq!(dataset.labels.len(), dataset.len());
        assert_eq!(dataset.candles[0].timestamp, candles[49].timestamp);
        assert_eq!(dataset.candles.last().unwrap().timestamp, candles[98].timestamp);

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let ema_10 = calculate_ema_adjusted(&closes, 10);
        assert_eq!(dataset.features[0][2], ema_10[49]);
    }

    #[test]
    fn labels_follow_future_direction() {
        let candles = build_candles(80);
        let dataset = prepare_dataset(&candles, 2);
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        for (row, candle) in dataset.candles.iter().enumerate() {
            let idx = candles
                .iter()
                .position(|c| c.timestamp == candle.timestamp)
                .unwrap();
            assert_eq!(dataset.labels[row], closes[idx + 2] > closes[idx]);
        }
        assert_eq!(dataset.len(), 80 - 49 - 2);
    }

    #[test]
    fn short_history_yields_empty_dataset() {
        assert!(prepare_dataset(&build_candles(30), 1).is_empty());
    }
}
