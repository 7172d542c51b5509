//! Backtest report generation.

use chrono::NaiveDate;
use serde::Serialize;

use super::engine::{BacktestResult, NavPoint, SignalLogEntry, SignalStatus};
use super::metrics::{PerformanceSummary, TradeRecord};
use crate::capability::RealisticTrade;
use crate::execution::Position;

/// Serializable backtest report
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub title: String,
    pub period: String,
    pub summary: PerformanceSummary,
    /// Open at the end, not liquidated
    pub open_positions: Vec<Position>,
    pub unrealized_pnl: f64,
    pub signal_stats: SignalStats,
    /// Text report (formatted)
    pub text_report: String,
}

/// Signal counts by outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalStats {
    pub total: usize,
    pub executed: usize,
    pub rejected: usize,
    pub not_actionable: usize,
}

impl SignalStats {
    fn from_log(log: &[SignalLogEntry]) -> Self {
        log.iter().fold(Self::default(), |mut stats, entry| {
            stats.total += 1;
            match entry.status {
                SignalStatus::Executed => stats.executed += 1,
                SignalStatus::Rejected(_) => stats.rejected += 1,
                SignalStatus::NotActionable => stats.not_actionable += 1,
            }
            stats
        })
    }
}

impl BacktestReport {
    pub fn generate(result: &BacktestResult) -> Self {
        let signal_stats = SignalStats::from_log(&result.signals);
        let text_report = Self::format_text_report(result, &signal_stats);

        Self {
            title: "T+1 模拟回测报告".to_string(),
            period: format!("{} 至 {}", result.start_date, result.end_date),
            summary: result.summary.clone(),
            open_positions: result.open_positions.clone(),
            unrealized_pnl: result.unrealized_pnl(),
            signal_stats,
            text_report,
        }
    }

    /// Report record as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn format_text_report(result: &BacktestResult, signals: &SignalStats) -> String {
        let s = &result.summary;
        let mut report = String::new();

        report.push_str("═══════════════════════════════════════════════════════════════\n");
        report.push_str("                      T+1 模拟回测报告\n");
        report.push_str("═══════════════════════════════════════════════════════════════\n\n");

        report.push_str(&format!("📅 测试周期: {} 至 {}\n\n", result.start_date, result.end_date));

        report.push_str("📊 收益概要\n");
        report.push_str("───────────────────────────────────────────────────────────────\n");
        report.push_str(&format!("  初始资金:       ¥{:>12.2}\n", s.initial_capital));
        report.push_str(&format!("  最终净值:       ¥{:>12.2}\n", s.final_nav));
        report.push_str(&format!("  已实现盈亏:     ¥{:>12.2}\n", s.net_profit));
        report.push_str(&format!("  未实现盈亏:     ¥{:>12.2}\n", result.unrealized_pnl()));
        report.push_str(&format!("  总收益率:       {:>12.2}%\n", s.total_return * 100.0));
        report.push_str(&format!("  完成交易:       {:>12}\n", s.trade_count));
        report.push_str(&format!("  成交笔数:       {:>12}\n", s.fill_count));
        report.push_str(&format!("  胜率:           {:>12.2}%\n\n", s.win_rate * 100.0));

        report.push_str("⚠️ 风险指标\n");
        report.push_str("───────────────────────────────────────────────────────────────\n");
        report.push_str(&format!("  最大回撤:       {:>12.2}%\n", s.max_drawdown * 100.0));
        report.push_str(&format!("  夏普比率:       {:>12.2}\n", s.sharpe_ratio));
        report.push_str(&format!("  盈利因子:       {:>12.2}\n", s.profit_factor));
        report.push_str(&format!("  平均持仓天数:   {:>12.1}\n", s.avg_holding_days));
        report.push_str(&format!("  总手续费:       ¥{:>12.2}\n\n", s.total_commission));

        report.push_str("🔔 信号统计\n");
        report.push_str("───────────────────────────────────────────────────────────────\n");
        report.push_str(&format!(
            "  共 {} 条 | 成交 {} | 拒绝 {} | 观望/持有 {}\n\n",
            signals.total, signals.executed, signals.rejected, signals.not_actionable
        ));

        if !result.open_positions.is_empty() {
            report.push_str("📌 期末持仓 (未平仓)\n");
            report.push_str("───────────────────────────────────────────────────────────────\n");
            for position in &result.open_positions {
                report.push_str(&format!("  {}\n", position.summary()));
            }
            report.push('\n');
        }

        if !result.trades.is_empty() {
            report.push_str("📝 最近交易\n");
            report.push_str("───────────────────────────────────────────────────────────────\n");
            for trade in result.trades.iter().rev().take(10) {
                report.push_str(&format!("  {}\n", format_trade(trade)));
            }
        }

        if !result.capability.is_empty() {
            report.push_str("\n🔍 执行能力分析 (事后最优窗口)\n");
            report.push_str("───────────────────────────────────────────────────────────────\n");
            for cap in result.capability.iter().rev().take(10) {
                match &cap.optimal {
                    Some(best) => report.push_str(&format!(
                        "  {} {} → {} | {}\n",
                        cap.symbol,
                        cap.signal_date,
                        cap.exit_signal_date,
                        format_realistic(best)
                    )),
                    None => report.push_str(&format!(
                        "  {} {} → {} | 无可执行窗口\n",
                        cap.symbol, cap.signal_date, cap.exit_signal_date
                    )),
                }
            }
        }

        report.push_str("\n═══════════════════════════════════════════════════════════════\n");

        report
    }
}

fn format_trade(trade: &TradeRecord) -> String {
    let result = if trade.is_winner() { "✅" } else { "❌" };
    format!(
        "{} {} | {} → {} | P&L: ¥{:.2} ({:+.1}%) | {}",
        result,
        trade.symbol,
        trade.entry_date,
        trade.exit_date,
        trade.net_pnl,
        trade.return_rate() * 100.0,
        trade.exit_reason
    )
}

fn format_realistic(trade: &RealisticTrade) -> String {
    format!(
        "{}: 毛收益 {:+.2}% 净收益 {:+.2}% 质量 {:.2} 流动性 {:.2}",
        trade.window,
        trade.gross_return_rate * 100.0,
        trade.net_return_rate * 100.0,
        trade.execution_quality,
        trade.liquidity_score
    )
}

/// Flat JSON array of round trips
pub fn trades_to_json(trades: &[TradeRecord]) -> serde_json::Result<String> {
    serde_json::to_string(trades)
}

/// Flat JSON array of realized window variants, one object per trade
pub fn realistic_trades_to_json(trades: &[RealisticTrade]) -> serde_json::Result<String> {
    serde_json::to_string(trades)
}

/// `(date, nav)` pairs for charting
pub fn nav_curve(points: &[NavPoint]) -> Vec<(NaiveDate, f64)> {
    points.iter().map(|p| (p.date, p.nav)).collect()
}

// ============================================================================
// Tests
// ============================================================================
