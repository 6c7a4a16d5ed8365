use crate::error::{EngineError, Result};
use trading::{Allocation, Candidate};

/// Splits `total_capital` across `candidates` in inverse proportion to their
/// volatility scores. The output preserves candidate order.
pub fn allocate(candidates: &[Candidate], total_capital: f64) -> Result<Vec<Allocation>> {
    if candidates.is_empty() {
        return Err(EngineError::invalid("cannot allocate capital to an empty basket"));
    }
    if !(total_capital.is_finite() && total_capital > 0.0) {
        return Err(EngineError::invalid(format!(
            "total capital must be positive, got {}",
            total_capital
        )));
    }
    if let Some(bad) = candidates
        .iter()
        .find(|c| !(c.volatility_score.is_finite() && c.volatility_score > 0.0))
    {
        return Err(EngineError::DivisionByZero(format!(
            "{} has volatility score {}",
            bad.symbol, bad.volatility_score
        )));
    }

    // Weights relative to the calmest candidate stay in (0, 1], so neither
    // the inverse nor the sum can overflow for tiny scores.
    let min_vol = candidates
        .iter()
        .map(|c| c.volatility_score)
        .fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = candidates.iter().map(|c| min_vol / c.volatility_score).collect();
    let weight_sum: f64 = weights.iter().sum();

    let mut allocations = Vec::with_capacity(candidates.len());
    for (candidate, weight) in candidates.iter().zip(&weights) {
        let capital = weight / weight_sum * total_capital;
        if !(capital.is_finite() && capital > 0.0) {
            return Err(EngineError::DivisionByZero(format!(
                "{} would receive capital {} (volatility score {})",
                candidate.symbol, capital, candidate.volatility_score
            )));
        }
        allocations.push(Allocation::new(candidate.symbol.clone(), capital));
    }
    Ok(allocations)
}

/// Whole shares affordable with `capital` at `price`.
pub fn quantity_for(capital: f64, price: f64) -> Result<u64> {
    if !(price.is_finite() && price > 0.0) {
        return Err(EngineError::invalid(format!("price must be positive, got {}", price)));
    }
    if !(capital.is_finite() && capital >= 0.0) {
        return Err(EngineError::invalid(format!(
            "capital must be non-negative, got {}",
            capital
        )));
    }
    Ok((capital / price).floor() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(symbol: &str, vol: f64) -> Candidate {
        Candidate::new(symbol, 1, 150.0, vol)
    }

    #[test]
    fn test_inverse_volatility_split() {
        let basket = vec![candidate("A", 1.0), candidate("B", 2.0), candidate("C", 4.0)];
        let allocations = allocate(&basket, 700.0).unwrap();

        let capitals: Vec<f64> = allocations.iter().map(|a| a.capital).collect();
        assert!((capitals[0] - 400.0).abs() < 1e-9);
        assert!((capitals[1] - 200.0).abs() < 1e-9);
        assert!((capitals[2] - 100.0).abs() < 1e-9);
        assert_eq!(allocations[0].symbol, "A");
        assert_eq!(allocations[2].symbol, "C");
    }

    #[test]
    fn test_allocations_sum_to_total() {
        let basket = vec![
            candidate("A", 2.3),
            candidate("B", 7.1),
            candidate("C", 3.05),
            candidate("D", 12.9),
            candidate("E", 2.01),
        ];
        let allocations = allocate(&basket, 100_000.0).unwrap();
        let total: f64 = allocations.iter().map(|a| a.capital).sum();
        assert!((total - 100_000.0).abs() < 1e-6);
        assert!(allocations.iter().all(|a| a.capital > 0.0));
    }

    #[test]
    fn test_single_candidate_gets_everything() {
        let allocations = allocate(&[candidate("ONLY", 5.0)], 20_000.0).unwrap();
        assert_eq!(allocations.len(), 1);
        assert!((allocations[0].capital - 20_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_volatility_rejected() {
        let basket = vec![candidate("A", 1.0), candidate("B", 0.0)];
        assert!(matches!(allocate(&basket, 700.0), Err(EngineError::DivisionByZero(_))));
        let basket = vec![candidate("A", f64::NAN)];
        assert!(matches!(allocate(&basket, 700.0), Err(EngineError::DivisionByZero(_))));
    }

    #[test]
    fn test_subnormal_volatility_stays_finite() {
        let basket = vec![candidate("A", 1e-320), candidate("B", 3.0)];
        let allocations = allocate(&basket, 700.0).unwrap();
        assert!(allocations.iter().all(|a| a.capital.is_finite()));
        assert!(allocations[0].capital > 699.0);
        let total: f64 = allocations.iter().map(|a| a.capital).sum();
        assert!((total - 700.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrepresentable_share_rejected() {
        // B's share underflows to zero next to a subnormal score.
        let basket = vec![candidate("A", 1e-320), candidate("B", 1e300)];
        assert!(matches!(allocate(&basket, 700.0), Err(EngineError::DivisionByZero(_))));
    }

    #[test]
    fn test_empty_basket_and_bad_capital() {
        assert!(matches!(allocate(&[], 700.0), Err(EngineError::InvalidInput(_))));
        assert!(matches!(
            allocate(&[candidate("A", 1.0)], 0.0),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            allocate(&[candidate("A", 1.0)], -10.0),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_quantity_floors() {
        assert_eq!(quantity_for(1000.0, 300.0).unwrap(), 3);
        assert_eq!(quantity_for(299.0, 300.0).unwrap(), 0);
        assert_eq!(quantity_for(0.0, 300.0).unwrap(), 0);
        assert!(quantity_for(1000.0, 0.0).is_err());
    }
}
