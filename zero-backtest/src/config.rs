//! Simulation configuration.
//!
//! Every field has a default matching a typical A-share account, so a
//! config file only needs to name what it changes. Files are merged with
//! [`zero_common::config_loader`] and then overridden by
//! `ZERO_BACKTEST__SECTION__FIELD` environment variables.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use zero_common::config_loader::{apply_env_overrides, load_layered};
use zero_common::{ResultExt, Validate, ValidationResult, Validator};

use crate::capability::ExecutionWindow;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "ZERO_BACKTEST";

/// Complete simulation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub portfolio: PortfolioConfig,
    pub market_impact: MarketImpactConfig,
    pub analyzer: AnalyzerConfig,
    pub decision: DecisionConfig,
    pub execution: ExecutionConfig,
    pub cache: CacheConfig,
    pub run: RunConfig,
}

impl SimulationConfig {
    /// Load from layered JSON files plus environment overrides, then validate.
    pub fn load(paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut value = load_layered(paths)?;
        apply_env_overrides(&mut value, ENV_PREFIX);
        Ok(Self::from_value(value)?)
    }

    /// Deserialize and validate an already-merged JSON value.
    pub fn from_value(value: Value) -> zero_common::Result<Self> {
        let config: Self = serde_json::from_value(value).context("parsing simulation config")?;
        config
            .validate()
            .map_err(zero_common::Error::from)
            .context("validating simulation config")?;
        Ok(config)
    }
}

impl Validate for SimulationConfig {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .section(&self.portfolio)
            .section(&self.market_impact)
            .section(&self.analyzer)
            .section(&self.decision)
            .section(&self.execution)
            .finish()
    }
}

// ============================================================================
// Portfolio
// ============================================================================

/// Capital, sizing and fee parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Starting cash
    pub initial_capital: f64,
    /// Largest fraction of total assets a single BUY may target
    pub max_position_size: f64,
    /// Largest fraction of total assets held in positions after any BUY
    pub max_total_position: f64,
    /// Commission as a fraction of trade value
    pub commission_rate: f64,
    /// Minimum commission per fill
    pub min_commission: f64,
    /// Smallest BUY trade value accepted
    pub min_trade_amount: f64,
    /// Share increment (A-share board lot)
    pub lot_size: u32,
    /// Average into an open position instead of rejecting a second BUY
    pub allow_position_scaling: bool,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            max_position_size: 0.2,
            max_total_position: 0.8,
            commission_rate: 0.0003, // 0.03% (typical A-share)
            min_commission: 5.0,
            min_trade_amount: 1_000.0,
            lot_size: 100,
            allow_position_scaling: false,
        }
    }
}

impl Validate for PortfolioConfig {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .positive("portfolio.initial_capital", self.initial_capital)
            .in_range("portfolio.max_position_size", self.max_position_size, f64::MIN_POSITIVE, 1.0)
            .in_range("portfolio.max_total_position", self.max_total_position, f64::MIN_POSITIVE, 1.0)
            .in_range("portfolio.commission_rate", self.commission_rate, 0.0, 0.1)
            .non_negative("portfolio.min_commission", self.min_commission)
            .non_negative("portfolio.min_trade_amount", self.min_trade_amount)
            .check(self.lot_size > 0, "portfolio.lot_size", "must be at least 1")
            .conflict(
                self.max_position_size <= self.max_total_position,
                "portfolio.max_position_size exceeds portfolio.max_total_position",
            )
            .finish()
    }
}

// ============================================================================
// Market impact
// ============================================================================

/// Slippage coefficients. All costs are fractions of price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketImpactConfig {
    /// Cost per unit of volume ratio
    pub linear_cost: f64,
    /// Cost per unit of sqrt(volume ratio)
    pub sqrt_cost: f64,
    /// Constant cost per fill
    pub fixed_cost: f64,
    /// Full quoted spread; half is paid per fill
    pub bid_ask_spread: f64,
    /// Weight of the bar's high-low range in the volatility adjustment
    pub volatility_weight: f64,
    /// Upper bound of the volatility adjustment
    pub volatility_cap: f64,
    /// Upper bound of total slippage
    pub max_slippage: f64,
}

impl Default for MarketImpactConfig {
    fn default() -> Self {
        Self {
            linear_cost: 0.1,
            sqrt_cost: 0.01,
            fixed_cost: 0.0001,
            bid_ask_spread: 0.001,
            volatility_weight: 0.5,
            volatility_cap: 0.01,
            max_slippage: 0.05,
        }
    }
}

impl Validate for MarketImpactConfig {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .non_negative("market_impact.linear_cost", self.linear_cost)
            .non_negative("market_impact.sqrt_cost", self.sqrt_cost)
            .non_negative("market_impact.fixed_cost", self.fixed_cost)
            .non_negative("market_impact.bid_ask_spread", self.bid_ask_spread)
            .non_negative("market_impact.volatility_weight", self.volatility_weight)
            .non_negative("market_impact.volatility_cap", self.volatility_cap)
            .in_range("market_impact.max_slippage", self.max_slippage, 0.0, 1.0)
            .finish()
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Indicator periods, trend thresholds and scoring bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Bars required before a symbol can be scored
    pub min_history: usize,
    pub ma_short: usize,
    pub ma_medium: usize,
    pub ma_long: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
    /// Lookbacks for short/medium/long trend classification
    pub trend_short: usize,
    pub trend_medium: usize,
    pub trend_long: usize,
    /// Percent change beyond which a trend is strong
    pub strong_trend_pct: f64,
    /// Percent change beyond which a trend is weak rather than sideways
    pub weak_trend_pct: f64,
    /// Lookback for support/resistance levels
    pub level_lookback: usize,
    /// Bars averaged for the volume ratio denominator
    pub volume_lookback: usize,
    pub scoring: ScoringConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_history: 20,
            ma_short: 5,
            ma_medium: 10,
            ma_long: 20,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_k: 2.0,
            trend_short: 5,
            trend_medium: 10,
            trend_long: 20,
            strong_trend_pct: 0.05,
            weak_trend_pct: 0.02,
            level_lookback: 20,
            volume_lookback: 5,
            scoring: ScoringConfig::default(),
        }
    }
}

impl Validate for AnalyzerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let longest_ma = self.ma_short.max(self.ma_medium).max(self.ma_long);
        Validator::new()
            .check(self.min_history >= 2, "analyzer.min_history", "must be at least 2")
            .check(
                self.ma_short > 0 && self.ma_medium > 0 && self.ma_long > 0,
                "analyzer.ma_*",
                "moving average periods must be positive",
            )
            .check(
                self.rsi_period > 0 && self.bollinger_period > 1,
                "analyzer.rsi_period/bollinger_period",
                "periods must be positive (bollinger at least 2)",
            )
            .check(
                self.macd_fast > 0 && self.macd_fast < self.macd_slow && self.macd_signal > 0,
                "analyzer.macd_*",
                "require 0 < fast < slow and signal > 0",
            )
            .check(
                self.weak_trend_pct > 0.0 && self.weak_trend_pct < self.strong_trend_pct,
                "analyzer.weak_trend_pct",
                "require 0 < weak_trend_pct < strong_trend_pct",
            )
            .conflict(
                self.min_history >= longest_ma && self.min_history >= self.bollinger_period,
                "analyzer.min_history is shorter than the longest indicator period",
            )
            .section(&self.scoring)
            .finish()
    }
}

/// Point bands for the technical, momentum and risk scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub technical_base: f64,
    pub ma_alignment_points: f64,
    pub rsi_band_points: f64,
    pub rsi_band_low: f64,
    pub rsi_band_high: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_cross_points: f64,
    pub bollinger_points: f64,
    /// Band positions in `[sane_low, sane_high]` earn the Bollinger points
    pub bollinger_sane_low: f64,
    pub bollinger_sane_high: f64,
    /// Band positions above/below these are extremes
    pub bollinger_upper_extreme: f64,
    pub bollinger_lower_extreme: f64,
    pub momentum_base: f64,
    pub short_change_points: f64,
    /// Short-lookback change that earns the full short-change band
    pub short_change_full: f64,
    pub medium_change_points: f64,
    /// Medium-lookback change that earns the full medium-change band
    pub medium_change_full: f64,
    pub rsi_momentum_points: f64,
    /// RSI points above 50 per momentum point
    pub rsi_momentum_scale: f64,
    pub histogram_points: f64,
    pub volume_confirm_points: f64,
    /// Volume ratio above which the short move counts as confirmed
    pub volume_confirm_ratio: f64,
    pub risk_base: f64,
    pub volatility_points: f64,
    /// Daily-return volatility bands: full, 60% and 20% of the points
    pub volatility_high: f64,
    pub volatility_elevated: f64,
    pub volatility_mild: f64,
    pub rsi_extreme_points: f64,
    pub band_extreme_points: f64,
    pub drawdown_points: f64,
    /// Distance below resistance earning full and half drawdown points
    pub drawdown_deep: f64,
    pub drawdown_moderate: f64,
    pub downtrend_points: f64,
    /// Volume ratio bounds of the expanding/contracting volume trend
    pub volume_expanding_ratio: f64,
    pub volume_contracting_ratio: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            technical_base: 50.0,
            ma_alignment_points: 20.0,
            rsi_band_points: 10.0,
            rsi_band_low: 40.0,
            rsi_band_high: 70.0,
            rsi_overbought: 80.0,
            rsi_oversold: 20.0,
            macd_cross_points: 15.0,
            bollinger_points: 10.0,
            bollinger_sane_low: 0.2,
            bollinger_sane_high: 0.8,
            bollinger_upper_extreme: 0.95,
            bollinger_lower_extreme: 0.05,
            momentum_base: 50.0,
            short_change_points: 20.0,
            short_change_full: 0.05,
            medium_change_points: 15.0,
            medium_change_full: 0.10,
            rsi_momentum_points: 10.0,
            rsi_momentum_scale: 2.0,
            histogram_points: 10.0,
            volume_confirm_points: 5.0,
            volume_confirm_ratio: 1.2,
            risk_base: 30.0,
            volatility_points: 25.0,
            volatility_high: 0.04,
            volatility_elevated: 0.025,
            volatility_mild: 0.015,
            rsi_extreme_points: 15.0,
            band_extreme_points: 10.0,
            drawdown_points: 15.0,
            drawdown_deep: 0.15,
            drawdown_moderate: 0.08,
            downtrend_points: 10.0,
            volume_expanding_ratio: 1.5,
            volume_contracting_ratio: 0.7,
        }
    }
}

impl Validate for ScoringConfig {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .positive("analyzer.scoring.short_change_full", self.short_change_full)
            .positive("analyzer.scoring.medium_change_full", self.medium_change_full)
            .positive("analyzer.scoring.rsi_momentum_scale", self.rsi_momentum_scale)
            .check(
                self.bollinger_lower_extreme <= self.bollinger_sane_low
                    && self.bollinger_sane_low <= self.bollinger_sane_high
                    && self.bollinger_sane_high <= self.bollinger_upper_extreme,
                "analyzer.scoring.bollinger_*",
                "require lower_extreme <= sane_low <= sane_high <= upper_extreme",
            )
            .check(
                self.volatility_mild <= self.volatility_elevated
                    && self.volatility_elevated <= self.volatility_high,
                "analyzer.scoring.volatility_*",
                "require mild <= elevated <= high",
            )
            .check(
                self.drawdown_moderate <= self.drawdown_deep,
                "analyzer.scoring.drawdown_*",
                "require moderate <= deep",
            )
            .check(
                self.volume_contracting_ratio <= self.volume_expanding_ratio,
                "analyzer.scoring.volume_*_ratio",
                "require contracting <= expanding",
            )
            .finish()
    }
}

// ============================================================================
// Decision policy
// ============================================================================

/// Thresholds and confidences of the daily decision table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub buy_min_technical: f64,
    pub buy_min_momentum: f64,
    pub buy_max_risk: f64,
    pub buy_confidence: f64,
    pub watch_min_technical: f64,
    pub watch_min_momentum: f64,
    pub watch_max_risk: f64,
    pub watch_confidence: f64,
    pub observe_confidence: f64,
    pub lock_confidence: f64,
    /// Unrealized return at or above which a position is closed
    pub take_profit_rate: f64,
    pub take_profit_confidence: f64,
    /// Unrealized return at or below which a position is closed
    pub stop_loss_rate: f64,
    pub stop_loss_confidence: f64,
    pub exit_max_risk: f64,
    pub risk_exit_confidence: f64,
    pub weak_max_technical: f64,
    pub weak_max_momentum: f64,
    pub weak_exit_confidence: f64,
    pub hold_confidence: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            buy_min_technical: 70.0,
            buy_min_momentum: 60.0,
            buy_max_risk: 60.0,
            buy_confidence: 0.8,
            watch_min_technical: 60.0,
            watch_min_momentum: 55.0,
            watch_max_risk: 70.0,
            watch_confidence: 0.6,
            observe_confidence: 0.4,
            lock_confidence: 0.9,
            take_profit_rate: 0.15,
            take_profit_confidence: 0.9,
            stop_loss_rate: -0.08,
            stop_loss_confidence: 0.8,
            exit_max_risk: 80.0,
            risk_exit_confidence: 0.7,
            weak_max_technical: 40.0,
            weak_max_momentum: 40.0,
            weak_exit_confidence: 0.6,
            hold_confidence: 0.5,
        }
    }
}

impl Validate for DecisionConfig {
    fn validate(&self) -> ValidationResult<()> {
        let confidences = [
            ("decision.buy_confidence", self.buy_confidence),
            ("decision.watch_confidence", self.watch_confidence),
            ("decision.observe_confidence", self.observe_confidence),
            ("decision.lock_confidence", self.lock_confidence),
            ("decision.take_profit_confidence", self.take_profit_confidence),
            ("decision.stop_loss_confidence", self.stop_loss_confidence),
            ("decision.risk_exit_confidence", self.risk_exit_confidence),
            ("decision.weak_exit_confidence", self.weak_exit_confidence),
            ("decision.hold_confidence", self.hold_confidence),
        ];

        let mut v = Validator::new();
        for (field, value) in confidences {
            v.in_range(field, value, 0.0, 1.0);
        }
        v.check(self.take_profit_rate > 0.0, "decision.take_profit_rate", "must be positive")
            .check(self.stop_loss_rate < 0.0, "decision.stop_loss_rate", "must be negative")
            .finish()
    }
}

// ============================================================================
// Execution windows
// ============================================================================

/// Window catalogue and sizing for execution capability analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Variants enumerated per simulated signal pair, in tie-break order
    pub windows: Vec<ExecutionWindow>,
    /// Trade value used to size simulated fills
    pub analysis_notional: f64,
    /// Bars in the trailing average volume used by the liquidity score
    pub liquidity_lookback: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            windows: ExecutionWindow::default_catalogue(),
            analysis_notional: 100_000.0,
            liquidity_lookback: 10,
        }
    }
}

impl Validate for ExecutionConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut v = Validator::new();
        v.check(!self.windows.is_empty(), "execution.windows", "catalogue is empty")
            .positive("execution.analysis_notional", self.analysis_notional)
            .check(self.liquidity_lookback > 0, "execution.liquidity_lookback", "must be at least 1");
        for window in &self.windows {
            v.section(window);
        }
        v.finish()
    }
}

// ============================================================================
// Cache and run options
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_age_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Analyze symbols on the rayon pool each day
    pub parallel_analysis: bool,
    /// Re-evaluate closed trades across the window catalogue after the run
    pub analyze_execution_capability: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallel_analysis: true,
            analyze_execution_capability: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.portfolio.lot_size, 100);
        assert!((config.decision.take_profit_rate - 0.15).abs() < 1e-12);
        assert!(!config.execution.windows.is_empty());
    }

    #[test]
    fn test_partial_value_keeps_defaults() {
        let config = SimulationConfig::from_value(json!({
            "portfolio": { "commission_rate": 0.0005 },
            "decision": { "take_profit_rate": 0.2 }
        }))
        .unwrap();

        assert!((config.portfolio.commission_rate - 0.0005).abs() < 1e-12);
        assert!((config.portfolio.initial_capital - 100_000.0).abs() < 1e-9);
        assert!((config.decision.take_profit_rate - 0.2).abs() < 1e-12);
        assert!((config.decision.stop_loss_rate + 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_values_are_all_reported() {
        let err = SimulationConfig::from_value(json!({
            "portfolio": { "lot_size": 0, "max_position_size": 0.9, "max_total_position": 0.5 },
            "market_impact": { "fixed_cost": -1.0 }
        }))
        .unwrap_err();

        assert!(err.is_validation());
        let message = err.to_string();
        assert!(message.contains("portfolio.lot_size"));
        assert!(message.contains("market_impact.fixed_cost"));
        assert!(message.contains("max_total_position"));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backtest.json");
        std::fs::write(
            &path,
            r#"{"portfolio": {"initial_capital": 500000}, "run": {"parallel_analysis": false}}"#,
        )
        .unwrap();

        let config = SimulationConfig::load(&[path]).unwrap();

        assert!((config.portfolio.initial_capital - 500_000.0).abs() < 1e-9);
        assert!(!config.run.parallel_analysis);
    }

    #[test]
    fn test_empty_window_catalogue_rejected() {
        let err = SimulationConfig::from_value(json!({ "execution": { "windows": [] } })).unwrap_err();
        assert!(err.to_string().contains("execution.windows"));
    }
}
