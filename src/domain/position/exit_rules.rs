//! Per-tick exit evaluation, free of I/O

use chrono::{DateTime, Utc};

use crate::shared::utils::calculate_percentage_change;

use super::{ExitReason, Position, PositionConfig, Strategy};

/// What one tick decided for one position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitAction {
    /// Sell everything
    Full(ExitReason),
    /// Sell `fraction` of the current holding and consume ladder `level`
    Partial { level: f64, fraction: f64 },
}

/// Mark the position at `price` and ratchet the trailing stop.
///
/// Returns true when the high-water mark moved.
pub fn update_price(position: &mut Position, price: f64, config: &PositionConfig) -> bool {
    position.current_price = price;
    position.current_value = price * position.entry_amount;
    position.pnl = position.current_value - position.cost_basis;
    position.pnl_percent = calculate_percentage_change(position.entry_price, price);

    if price <= position.high_water_mark {
        return false;
    }
    position.high_water_mark = price;
    let candidate = price * (1.0 - config.trailing_stop);
    if candidate > position.trailing_stop_price {
        position.trailing_stop_price = candidate;
    }
    true
}

/// At most one action, in priority order: stop loss, trailing stop, one
/// ladder level, then strategy target and timeout.
pub fn evaluate(position: &Position, config: &PositionConfig, now: DateTime<Utc>) -> Option<ExitAction> {
    let price = position.current_price;

    if price <= position.stop_loss_price {
        return Some(ExitAction::Full(ExitReason::StopLoss));
    }

    if position.trailing_stop_price > 0.0 && price <= position.trailing_stop_price {
        return Some(ExitAction::Full(ExitReason::TrailingStop));
    }

    if let Some(level) = position
        .take_profit_levels
        .iter()
        .copied()
        .find(|level| position.pnl_percent >= level * 100.0)
    {
        return Some(ExitAction::Partial {
            level,
            fraction: config.partial_exit_fraction,
        });
    }

    let age = position.age_hours(now);
    match position.strategy {
        Strategy::Memecoin => {
            let rules = &config.memecoin;
            if position.pnl_percent >= rules.profit_target_percent {
                return Some(ExitAction::Full(ExitReason::TargetReached));
            }
            if age > rules.max_age_hours && position.pnl_percent < rules.timeout_min_pnl_percent {
                return Some(ExitAction::Full(ExitReason::Timeout));
            }
        }
        Strategy::Altcoin => {
            let rules = &config.altcoin;
            if age > rules.max_age_hours && position.pnl_percent < rules.timeout_min_pnl_percent {
                return Some(ExitAction::Full(ExitReason::Timeout));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::tests::{buy_result, token_info};
    use crate::domain::position::PositionStatus;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn position(strategy: Strategy) -> (Position, PositionConfig, DateTime<Utc>) {
        let config = PositionConfig::default();
        let now = Utc::now();
        let p = Position::open(&token_info(), strategy, &buy_result(), &config, now).unwrap();
        (p, config, now)
    }

    #[test]
    fn test_stop_loss_fires_below_fixed_stop() {
        let (mut p, config, now) = position(Strategy::Memecoin);
        assert!((p.stop_loss_price - 0.85).abs() < 1e-12);

        update_price(&mut p, 0.80, &config);
        assert_eq!(evaluate(&p, &config, now), Some(ExitAction::Full(ExitReason::StopLoss)));
    }

    #[test]
    fn test_first_ladder_level_fires_alone() {
        let (mut p, config, now) = position(Strategy::Memecoin);
        update_price(&mut p, 1.30, &config);
        assert!((p.pnl_percent - 30.0).abs() < 1e-9);

        let action = evaluate(&p, &config, now);
        assert_eq!(action, Some(ExitAction::Partial { level: 0.25, fraction: 0.25 }));

        p.apply_partial_exit(0.25, p.amount_raw / 4, 0.0);
        assert_eq!(p.take_profit_levels, vec![0.5, 1.0, 2.0]);
        assert_eq!(p.status, PositionStatus::TakingProfit);
        // 30% does not reach the next level
        assert_eq!(evaluate(&p, &config, now), None);
    }

    #[test]
    fn test_one_level_per_tick_on_gap_up() {
        let (mut p, config, now) = position(Strategy::Altcoin);
        update_price(&mut p, 2.5, &config);
        assert_eq!(evaluate(&p, &config, now), Some(ExitAction::Partial { level: 0.25, fraction: 0.25 }));
    }

    #[test]
    fn test_trailing_stop_activates_only_above_entry() {
        let (mut p, config, now) = position(Strategy::Memecoin);
        update_price(&mut p, 0.95, &config);
        assert_eq!(p.trailing_stop_price, 0.0);
        assert_eq!(evaluate(&p, &config, now), None);

        update_price(&mut p, 1.2, &config);
        assert!((p.trailing_stop_price - 1.056).abs() < 1e-12);

        update_price(&mut p, 1.05, &config);
        assert_eq!(evaluate(&p, &config, now), Some(ExitAction::Full(ExitReason::TrailingStop)));
    }

    #[test]
    fn test_stop_loss_outranks_trailing_stop() {
        let (mut p, config, now) = position(Strategy::Memecoin);
        update_price(&mut p, 1.1, &config);
        update_price(&mut p, 0.5, &config);
        assert_eq!(evaluate(&p, &config, now), Some(ExitAction::Full(ExitReason::StopLoss)));
    }

    #[test]
    fn test_memecoin_target_after_ladder() {
        let (mut p, config, now) = position(Strategy::Memecoin);
        p.take_profit_levels.clear();
        update_price(&mut p, 3.1, &config);
        assert_eq!(evaluate(&p, &config, now), Some(ExitAction::Full(ExitReason::TargetReached)));
    }

    #[test]
    fn test_strategy_timeouts() {
        let (mut meme, config, now) = position(Strategy::Memecoin);
        update_price(&mut meme, 1.1, &config);
        assert_eq!(evaluate(&meme, &config, now + Duration::hours(23)), None);
        assert_eq!(
            evaluate(&meme, &config, now + Duration::hours(25)),
            Some(ExitAction::Full(ExitReason::Timeout))
        );

        let (mut alt, config, now) = position(Strategy::Altcoin);
        update_price(&mut alt, 1.1, &config);
        assert_eq!(evaluate(&alt, &config, now + Duration::hours(100)), None);
        assert_eq!(
            evaluate(&alt, &config, now + Duration::hours(169)),
            Some(ExitAction::Full(ExitReason::Timeout))
        );

        // a winner past its age is left alone
        let (mut alt, config, now) = position(Strategy::Altcoin);
        alt.take_profit_levels.clear();
        update_price(&mut alt, 1.5, &config);
        assert_eq!(evaluate(&alt, &config, now + Duration::hours(200)), None);
    }

    #[test]
    fn test_trailing_stop_never_decreases_and_ladder_never_grows() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (mut p, config, now) = position(Strategy::Altcoin);
            let mut price: f64 = 1.0;
            let mut last_stop = p.trailing_stop_price;
            let mut last_len = p.take_profit_levels.len();

            for _ in 0..200 {
                price = (price * rng.gen_range(0.9..1.12)).max(0.01);
                update_price(&mut p, price, &config);
                assert!(p.trailing_stop_price >= last_stop);
                last_stop = p.trailing_stop_price;

                match evaluate(&p, &config, now) {
                    Some(ExitAction::Partial { level, fraction }) => {
                        let sold = (p.amount_raw as f64 * fraction) as u128;
                        p.apply_partial_exit(level, sold, 0.0);
                    }
                    Some(ExitAction::Full(_)) => break,
                    None => {}
                }
                assert!(p.take_profit_levels.len() <= last_len);
                last_len = p.take_profit_levels.len();
            }
        }
    }
}
