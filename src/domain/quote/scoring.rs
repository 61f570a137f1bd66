//! Quote filtering and efficiency scoring

use super::{AggregatorConfig, BestQuote, Quote};

/// Liquidity above this many base units earns no extra score
pub const LIQUIDITY_SCORE_CAP: f64 = 10.0;
/// Gas estimates above this earn the minimum gas score
pub const GAS_SCORE_CAP: f64 = 500_000.0;

const WEIGHT_NET: f64 = 0.4;
const WEIGHT_LIQUIDITY: f64 = 0.2;
const WEIGHT_IMPACT: f64 = 0.3;
const WEIGHT_GAS: f64 = 0.1;

const SCORE_EPSILON: f64 = 1e-12;

/// A quote takes part in selection only if it is available, shallow enough and deep enough
pub fn is_eligible(quote: &Quote, config: &AggregatorConfig) -> bool {
    quote.available
        && quote.amount_out > 0
        && quote.price_impact <= config.max_price_impact
        && quote.liquidity >= config.min_liquidity
}

fn capped(value: f64, cap: f64) -> f64 {
    (value / cap).clamp(0.0, 1.0)
}

/// Cost figures and score for one eligible quote.
///
/// `max_net` is the largest net amount among the candidates; net output is
/// normalized against it so the score is independent of the token's decimals.
pub fn score_quote(quote: &Quote, gas_price: u128, max_net: u128) -> BestQuote {
    let slippage_cost = (quote.amount_out as f64 * quote.slippage.clamp(0.0, 1.0)) as u128;
    let net_amount = quote.amount_out.saturating_sub(slippage_cost);
    let gas_cost = (quote.gas_estimate as u128).saturating_mul(gas_price);
    let total_cost = gas_cost.saturating_add(slippage_cost);

    let net_norm = if max_net > 0 {
        net_amount as f64 / max_net as f64
    } else {
        0.0
    };

    let efficiency_score = WEIGHT_NET * net_norm
        + WEIGHT_LIQUIDITY * capped(quote.liquidity, LIQUIDITY_SCORE_CAP)
        + WEIGHT_IMPACT * (1.0 - quote.price_impact.clamp(0.0, 1.0))
        + WEIGHT_GAS * (1.0 - capped(quote.gas_estimate as f64, GAS_SCORE_CAP));

    BestQuote {
        quote: quote.clone(),
        net_amount,
        slippage_cost,
        gas_cost,
        total_cost,
        efficiency_score,
    }
}

/// Score every eligible quote
pub fn score_candidates(quotes: &[Quote], gas_price: u128, config: &AggregatorConfig) -> Vec<BestQuote> {
    let eligible: Vec<&Quote> = quotes.iter().filter(|q| is_eligible(q, config)).collect();

    let max_net = eligible
        .iter()
        .map(|q| {
            let slip = (q.amount_out as f64 * q.slippage.clamp(0.0, 1.0)) as u128;
            q.amount_out.saturating_sub(slip)
        })
        .max()
        .unwrap_or(0);

    eligible
        .into_iter()
        .map(|q| score_quote(q, gas_price, max_net))
        .collect()
}

/// Highest efficiency score wins; equal scores go to the lower total cost
pub fn select_best(quotes: &[Quote], gas_price: u128, config: &AggregatorConfig) -> Option<BestQuote> {
    score_candidates(quotes, gas_price, config)
        .into_iter()
        .fold(None, |best: Option<BestQuote>, candidate| match best {
            None => Some(candidate),
            Some(current) => {
                let diff = candidate.efficiency_score - current.efficiency_score;
                if diff > SCORE_EPSILON
                    || (diff.abs() <= SCORE_EPSILON && candidate.total_cost < current.total_cost)
                {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        })
}
