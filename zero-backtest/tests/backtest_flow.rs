//! End-to-end flows across analysis, decisions, settlement and reporting.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::io::Write;

use zero_backtest::analysis::{MarketAnalysis, TrendDirection, VolumeTrend};
use zero_backtest::backtest::{max_drawdown, BacktestOrchestrator, BacktestReport, SignalStatus, SimulationState};
use zero_backtest::capability::{ExecutionWindow, MultiWindowExecutionSimulator};
use zero_backtest::config::{PortfolioConfig, SimulationConfig};
use zero_backtest::data::{Candle, MarketData, PriceHistory};
use zero_backtest::execution::PortfolioState;
use zero_backtest::strategy::{DecisionPolicy, SignalAction, TradingSignal};

fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + Duration::days(i as i64)
}

fn signal(symbol: &str, date: NaiveDate, action: SignalAction, price: f64, size: f64) -> TradingSignal {
    TradingSignal {
        symbol: symbol.to_string(),
        date,
        action,
        price,
        confidence: 0.8,
        trend_expectation: TrendDirection::Sideways,
        reason: "test".to_string(),
        risk_level: 0.3,
        suggested_position_size: size,
    }
}

/// Neutral analysis: no entry setup, no exit trigger besides P&L
fn neutral_analysis(symbol: &str, as_of: NaiveDate, price: f64) -> MarketAnalysis {
    MarketAnalysis {
        symbol: symbol.to_string(),
        as_of,
        current_price: price,
        ma_short: price,
        ma_medium: price,
        ma_long: price,
        rsi: 50.0,
        macd: 0.0,
        macd_signal: 0.0,
        macd_histogram: 0.0,
        macd_histogram_prev: 0.0,
        bollinger_upper: price * 1.05,
        bollinger_middle: price,
        bollinger_lower: price * 0.95,
        bollinger_position: 0.5,
        change_short: 0.0,
        change_medium: 0.0,
        change_long: 0.0,
        short_trend: TrendDirection::Sideways,
        medium_trend: TrendDirection::Sideways,
        long_trend: TrendDirection::Sideways,
        trend_expectation: TrendDirection::Sideways,
        support: price * 0.95,
        resistance: price * 1.05,
        volume_ratio: 1.0,
        volume_trend: VolumeTrend::Normal,
        volatility: 0.01,
        technical_score: 50.0,
        momentum_score: 50.0,
        risk_score: 30.0,
    }
}

/// Oscillating trend with steady volume
fn wave_history(symbol: &str, bars: usize, phase: f64) -> PriceHistory {
    let candles = (0..bars)
        .map(|i| {
            let t = i as f64;
            let close = 10.0 + 1.5 * (t / 6.0 + phase).sin() + 0.02 * t;
            let open = close * 0.998;
            Candle::new(day(i), open, close * 1.01, open * 0.99, close, 2_000_000.0)
        })
        .collect();
    PriceHistory::new(symbol, candles).unwrap()
}

fn prices(symbol: &str, price: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([(symbol.to_string(), price)])
}

#[test]
fn test_take_profit_round_trip_scenario() {
    let mut portfolio = PortfolioState::new(PortfolioConfig::default());
    let policy = DecisionPolicy::default();

    let fill = portfolio
        .submit(&signal("SYM", day(0), SignalAction::Buy, 10.0, 0.2))
        .unwrap();
    assert_eq!(fill.shares, 2000);
    assert!((fill.commission - 6.0).abs() < 1e-9);
    assert!((portfolio.cash() - 79_994.0).abs() < 1e-9);
    assert!(!portfolio.position("SYM").unwrap().can_sell);

    portfolio.mark_to_market(day(1), &prices("SYM", 11.5));
    let position = portfolio.position("SYM").unwrap();
    assert!(position.can_sell);

    let exit = policy.decide(&neutral_analysis("SYM", day(1), 11.5), Some(position));
    assert_eq!(exit.action, SignalAction::Sell);
    assert!(exit.reason.contains("take profit"));

    let cash_before = portfolio.cash();
    portfolio.submit(&exit).unwrap();
    assert!((portfolio.cash() - (cash_before + 23_000.0 - 6.9)).abs() < 1e-9);
    assert!(portfolio.position("SYM").is_none());

    let trade = &portfolio.trades()[0];
    assert!((trade.net_pnl - (3_000.0 - 12.9)).abs() < 1e-9);
    assert_eq!(trade.holding_days(), 1);
}

#[test]
fn test_same_day_sell_is_held_without_state_change() {
    let mut portfolio = PortfolioState::new(PortfolioConfig::default());
    let policy = DecisionPolicy::default();
    portfolio
        .submit(&signal("SYM", day(0), SignalAction::Buy, 10.0, 0.2))
        .unwrap();
    portfolio.mark_to_market(day(0), &prices("SYM", 9.0));

    let before = serde_json::to_string(&portfolio).unwrap();

    let sell = signal("SYM", day(0), SignalAction::Sell, 9.0, 0.0);
    let guarded = policy.enforce_settlement(sell, portfolio.position("SYM"));
    assert_eq!(guarded.action, SignalAction::Hold);
    assert!(guarded.reason.contains("T+1"));
    assert!(!portfolio.execute(&guarded));

    // Even an unguarded SELL is refused by the portfolio itself
    let raw = signal("SYM", day(0), SignalAction::Sell, 9.0, 0.0);
    assert!(!portfolio.execute(&raw));

    assert_eq!(serde_json::to_string(&portfolio).unwrap(), before);
}

#[test]
fn test_nav_drawdown_running_peak() {
    let dd = max_drawdown(&[1.0, 1.1, 0.9, 1.2]);
    assert!((dd - 0.1818).abs() < 1e-4);
}

#[test]
fn test_sell_frees_cash_for_same_day_buy() {
    let orchestrator = BacktestOrchestrator::default();
    let config = PortfolioConfig {
        max_position_size: 0.8,
        ..PortfolioConfig::default()
    };
    let mut state = SimulationState::new(orchestrator.config());
    state.portfolio = PortfolioState::new(config);
    state
        .portfolio
        .submit(&signal("OLD", day(0), SignalAction::Buy, 10.0, 0.8))
        .unwrap();
    state.portfolio.mark_to_market(day(1), &BTreeMap::new());

    orchestrator.execute_batch(
        &mut state,
        vec![
            signal("NEW", day(1), SignalAction::Buy, 10.0, 0.2),
            signal("OLD", day(1), SignalAction::Sell, 10.0, 0.0),
        ],
    );

    assert!(state.signals.iter().all(|e| e.status == SignalStatus::Executed));
    assert!(state.portfolio.position("OLD").is_none());
    assert_eq!(state.portfolio.position("NEW").unwrap().shares, 1900);
}

#[test]
fn test_full_run_invariants() {
    zero_common::logging::init_logging("warn", "pretty");

    let market: MarketData = [
        wave_history("600000.SH", 120, 0.0),
        wave_history("000001.SZ", 120, 1.3),
        wave_history("300750.SZ", 90, 2.6),
    ]
    .into_iter()
    .collect();

    let mut config = SimulationConfig::default();
    config.run.analyze_execution_capability = true;
    let orchestrator = BacktestOrchestrator::new(config);

    let result = orchestrator.run(&market, day(0), day(119)).unwrap();
    let summary = &result.summary;

    assert_eq!(result.nav.len(), 120);
    assert_eq!(summary.initial_capital, 100_000.0);
    assert_eq!(summary.trade_count, result.trades.len());
    assert_eq!(summary.fill_count, result.fills.len());
    assert!((result.nav.last().unwrap().cash - result.final_cash).abs() < 1e-9);
    assert!(summary.max_drawdown >= 0.0 && summary.max_drawdown < 1.0);
    assert!(result.final_cash >= 0.0);

    // No round trip closes on its entry date
    for trade in &result.trades {
        assert!(trade.exit_date > trade.entry_date, "{} closed on its buy date", trade.symbol);
    }
    assert_eq!(result.capability.len(), result.trades.len());

    // Every signal before the warm-up completes is an observation
    let first_signals: Vec<_> = result.signals.iter().filter(|e| e.signal.date == day(0)).collect();
    assert_eq!(first_signals.len(), 3);
    assert!(first_signals
        .iter()
        .all(|e| e.signal.action == SignalAction::Observe && e.status == SignalStatus::NotActionable));

    let report = BacktestReport::generate(&result);
    assert!(report.text_report.contains("收益概要"));
    assert_eq!(report.signal_stats.total, result.signals.len());
}

#[test]
fn test_capability_is_separate_from_decisions() {
    let history = wave_history("600000.SH", 60, 0.0);
    let simulator = MultiWindowExecutionSimulator::from_config(
        &Default::default(),
        &PortfolioConfig::default(),
        &Default::default(),
    );
    let windows = ExecutionWindow::default_catalogue();

    let report = simulator.analyze_capability(&history, day(10), day(20), &windows);
    assert_eq!(report.trades.len() + report.skipped.len(), windows.len());

    let best = report.optimal.as_ref().unwrap();
    let picked = MultiWindowExecutionSimulator::select_optimal(&report.trades).unwrap();
    assert_eq!(best, picked);
}

#[test]
fn test_config_load_from_layered_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.json");
    let local = dir.path().join("local.json");

    let mut f = std::fs::File::create(&base).unwrap();
    writeln!(f, r#"{{"portfolio": {{"initial_capital": 50000, "lot_size": 100}}, "run": {{"parallel_analysis": false}}}}"#).unwrap();
    let mut f = std::fs::File::create(&local).unwrap();
    writeln!(f, r#"{{"portfolio": {{"initial_capital": 80000}}}}"#).unwrap();

    let config = SimulationConfig::load(&[base, local, dir.path().join("missing.json")]).unwrap();
    assert_eq!(config.portfolio.initial_capital, 80_000.0);
    assert_eq!(config.portfolio.max_position_size, 0.2);
    assert!(!config.run.parallel_analysis);
}

#[test]
fn test_config_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"portfolio": {"lot_size": 0}}"#).unwrap();

    assert!(SimulationConfig::load(&[path]).is_err());
}
