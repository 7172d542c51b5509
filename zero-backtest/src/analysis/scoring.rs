//! Additive point systems for the technical, momentum and risk scores.
//!
//! Each score starts from a base and adds or subtracts fixed bands of points;
//! the result is clamped to [0, 100].

use crate::config::ScoringConfig;

use super::{MarketAnalysis, TrendDirection};

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// Trend-structure quality: MA stacking, RSI band, MACD cross, band position.
pub fn technical_score(a: &MarketAnalysis, cfg: &ScoringConfig) -> f64 {
    let mut score = cfg.technical_base;

    // MA stacking
    let bullish_stack = a.ma_short > a.ma_medium && a.ma_medium > a.ma_long;
    let bearish_stack = a.ma_short < a.ma_medium && a.ma_medium < a.ma_long;
    if bullish_stack && a.current_price > a.ma_short {
        score += cfg.ma_alignment_points;
    } else if bullish_stack {
        score += cfg.ma_alignment_points / 2.0;
    } else if bearish_stack && a.current_price < a.ma_short {
        score -= cfg.ma_alignment_points;
    } else if bearish_stack {
        score -= cfg.ma_alignment_points / 2.0;
    }

    // RSI band
    if a.rsi >= cfg.rsi_band_low && a.rsi <= cfg.rsi_band_high {
        score += cfg.rsi_band_points;
    } else if a.rsi >= cfg.rsi_overbought || a.rsi <= cfg.rsi_oversold {
        score -= cfg.rsi_band_points;
    }

    // MACD cross state
    if a.macd > a.macd_signal {
        score += if a.macd > 0.0 {
            cfg.macd_cross_points
        } else {
            cfg.macd_cross_points / 2.0
        };
    } else if a.macd < a.macd_signal {
        score -= if a.macd < 0.0 {
            cfg.macd_cross_points
        } else {
            cfg.macd_cross_points / 2.0
        };
    }

    // Bollinger position sanity
    if (cfg.bollinger_sane_low..=cfg.bollinger_sane_high).contains(&a.bollinger_position) {
        score += cfg.bollinger_points;
    } else if a.bollinger_position > cfg.bollinger_upper_extreme {
        score -= cfg.bollinger_points;
    } else if a.bollinger_position < cfg.bollinger_lower_extreme {
        score -= cfg.bollinger_points / 2.0;
    }

    clamp_score(score)
}

/// Speed of the move: price change, RSI distance from 50, histogram slope,
/// volume confirmation.
pub fn momentum_score(a: &MarketAnalysis, cfg: &ScoringConfig) -> f64 {
    let mut score = cfg.momentum_base;

    score += (a.change_short * cfg.short_change_points / cfg.short_change_full)
        .clamp(-cfg.short_change_points, cfg.short_change_points);
    score += (a.change_medium * cfg.medium_change_points / cfg.medium_change_full)
        .clamp(-cfg.medium_change_points, cfg.medium_change_points);

    score += ((a.rsi - 50.0) / cfg.rsi_momentum_scale)
        .clamp(-cfg.rsi_momentum_points, cfg.rsi_momentum_points);

    let h = a.macd_histogram;
    let prev = a.macd_histogram_prev;
    if h > 0.0 && h > prev {
        score += cfg.histogram_points;
    } else if h > 0.0 {
        score += cfg.histogram_points / 2.0;
    } else if h < 0.0 && h < prev {
        score -= cfg.histogram_points;
    } else if h < 0.0 {
        score -= cfg.histogram_points / 2.0;
    }

    if a.volume_ratio > cfg.volume_confirm_ratio {
        if a.change_short > 0.0 {
            score += cfg.volume_confirm_points;
        } else if a.change_short < 0.0 {
            score -= cfg.volume_confirm_points;
        }
    }

    clamp_score(score)
}

/// Exposure to adverse moves: volatility, RSI extremes, band extremes,
/// distance below resistance, long-term downtrend. Higher is riskier.
pub fn risk_score(a: &MarketAnalysis, cfg: &ScoringConfig) -> f64 {
    let mut score = cfg.risk_base;

    if a.volatility > cfg.volatility_high {
        score += cfg.volatility_points;
    } else if a.volatility > cfg.volatility_elevated {
        score += cfg.volatility_points * 0.6;
    } else if a.volatility > cfg.volatility_mild {
        score += cfg.volatility_points * 0.2;
    }

    if a.rsi >= cfg.rsi_overbought || a.rsi <= cfg.rsi_oversold {
        score += cfg.rsi_extreme_points;
    } else if a.rsi > cfg.rsi_band_high || a.rsi < cfg.rsi_band_low {
        score += cfg.rsi_extreme_points / 2.0;
    }

    if a.bollinger_position > cfg.bollinger_upper_extreme || a.bollinger_position < cfg.bollinger_lower_extreme {
        score += cfg.band_extreme_points;
    }

    let drawdown = if a.resistance > 0.0 {
        (a.resistance - a.current_price) / a.resistance
    } else {
        0.0
    };
    if drawdown > cfg.drawdown_deep {
        score += cfg.drawdown_points;
    } else if drawdown > cfg.drawdown_moderate {
        score += cfg.drawdown_points / 2.0;
    }

    if a.long_trend == TrendDirection::StrongDown {
        score += cfg.downtrend_points;
    }

    clamp_score(score)
}
