//! Close-price indicators. Values are `None` until the lookback window is full.

pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut sma_values = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return sma_values;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values[period - 1] = Some(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values[i] = Some(window_sum / period as f64);
    }

    sma_values
}

/// Recursive EMA seeded with the first price.
pub fn calculate_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema_values = Vec::with_capacity(prices.len());
    ema_values.push(prices[0]);

    for i in 1..prices.len() {
        let ema = (prices[i] * multiplier) + (ema_values[i - 1] * (1.0 - multiplier));
        ema_values.push(ema);
    }

    ema_values
}

/// EMA with adjusted weighting: each value is the weighted mean of every price
/// so far, with weights `(1 - alpha)^k` for the price `k` bars back.
pub fn calculate_ema_adjusted(prices: &[f64], period: usize) -> Vec<f64> {
    let decay = 1.0 - 2.0 / (period as f64 + 1.0);
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    prices
        .iter()
        .map(|&price| {
            weighted_sum = price + decay * weighted_sum;
            weight_total = 1.0 + decay * weight_total;
            weighted_sum / weight_total
        })
        .collect()
}

/// MACD histogram (MACD line minus its signal line).
///
/// Defined once both the slow EMA and the signal EMA have a full window. The
/// signal EMA starts at the first bar where the MACD line itself is defined.
pub fn calculate_macd_histogram(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Vec<Option<f64>> {
    let mut histogram = vec![None; prices.len()];
    let line_start = slow_period.max(fast_period).saturating_sub(1);
    if prices.len() <= line_start {
        return histogram;
    }

    let fast_ema = calculate_ema(prices, fast_period);
    let slow_ema = calculate_ema(prices, slow_period);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(fast, slow)| fast - slow)
        .collect();
    let signal_line = calculate_ema(&macd_line[line_start..], signal_period);

    let first_value = signal_period.saturating_sub(1);
    for (offset, signal) in signal_line.iter().enumerate().skip(first_value) {
        let i = line_start + offset;
        histogram[i] = Some(macd_line[i] - signal);
    }

    histogram
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Wilder-smoothed RSI; the first value appears at index `period`.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut rsi_values = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return rsi_values;
    }

    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    rsi_values[period] = Some(rsi_from_avgs(avg_gain, avg_loss));

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        rsi_values[i] = Some(rsi_from_avgs(avg_gain, avg_loss));
    }

    rsi_values
}

/// Simple return over `periods` bars ending at each index.
pub fn calculate_pct_change(prices: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| {
            if periods == 0 || i < periods {
                return None;
            }
            let base = prices[i - periods];
            if base == 0.0 {
                None
            } else {
                Some(prices[i] / base - 1.0)
            }
        })
        .collect()
}
