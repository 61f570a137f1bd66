//! Plain-text risk report

use chrono::{DateTime, Utc};
use std::fmt::Write;

use super::{RiskLimits, RiskState};

const RECENT_EVENTS: usize = 10;

pub fn render(state: &RiskState, limits: &RiskLimits, now: DateTime<Utc>) -> String {
    if state.events.is_empty() && state.history.is_empty() {
        return "📊 Risk Report\n\nNo data available.".to_string();
    }

    let (trades_24h, wins_24h, pnl_24h) = state
        .recent_trades(now)
        .fold((0usize, 0usize, 0.0f64), |(n, wins, pnl), t| {
            (n + 1, wins + usize::from(t.success), pnl + t.pnl)
        });

    let mut out = String::new();
    // writing into a String cannot fail
    let _ = writeln!(out, "📊 Risk Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "🎯 Performance:");
    let _ = writeln!(out, "• Total trades: {}", state.metrics.total_trades);
    let _ = writeln!(out, "• Win rate: {:.1}%", state.metrics.win_rate * 100.0);
    let _ = writeln!(out, "• Profit factor: {:.2}", state.metrics.profit_factor);
    let _ = writeln!(out, "• Realized PnL: {:.4} ETH", state.realized_pnl);
    let _ = writeln!(out, "• Max drawdown: {:.4} ETH", state.metrics.max_drawdown);
    let _ = writeln!(out);
    let _ = writeln!(out, "📈 Last 24h:");
    let _ = writeln!(out, "• Trades: {}", trades_24h);
    let _ = writeln!(out, "• Successes: {}", wins_24h);
    let _ = writeln!(out, "• PnL: {:.4} ETH", pnl_24h);
    let _ = writeln!(out);
    let _ = writeln!(out, "⚠️ Risk status:");
    let _ = writeln!(out, "• Level: {}", state.risk_level);
    let _ = writeln!(out, "• Loss streak: {}", state.loss_streak);
    let _ = writeln!(out, "• Trades today: {}/{}", state.trades_today, limits.max_trades_per_day);
    let _ = writeln!(out, "• Total exposure: {:.4} ETH", state.total_exposure);
    let _ = writeln!(out);
    let _ = write!(out, "🔍 Recent events:");

    let skip = state.events.len().saturating_sub(RECENT_EVENTS);
    for event in state.events.iter().skip(skip) {
        let _ = write!(
            out,
            "\n{} {} - {}",
            event.kind.emoji(),
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.message
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::{Address, TradeDirection};
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_empty_report() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let state = RiskState::new(now);
        assert!(render(&state, &RiskLimits::default(), now).contains("No data available"));
    }

    #[test]
    fn test_report_sections() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let limits = RiskLimits::default();
        let mut state = RiskState::new(now - Duration::days(2));
        let token = Address::repeat_byte(9);
        state.record(&limits, true, TradeDirection::Sell, token, 0.5, now - Duration::days(2));
        state.record(&limits, false, TradeDirection::Sell, token, -0.1, now - Duration::hours(1));

        let report = render(&state, &limits, now);
        assert!(report.contains("Total trades: 2"));
        assert!(report.contains("Win rate: 50.0%"));
        assert!(report.contains("Last 24h:\n• Trades: 1\n• Successes: 0\n• PnL: -0.1000 ETH"));
        assert!(report.contains("Level: LOW"));
        assert!(report.contains("Trades today: 1/10"));
        assert!(report.contains("❌"));
    }
}
