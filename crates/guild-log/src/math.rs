//! Checked arithmetic for payout composition. An operation whose combined
//! payout would leave the signed domain must fail before anything is
//! logged; partial logging of an overflowing operation is forbidden.

use crate::error::{LogError, Result};

/// Sum payout components with overflow detection.
pub fn combine_payouts(components: &[i128]) -> Result<i128> {
    components.iter().try_fold(0i128, |acc, &c| {
        acc.checked_add(c).ok_or_else(|| {
            LogError::ArithmeticFault(format!(
                "payout combination overflowed adding {} to {}",
                c, acc
            ))
        })
    })
}

/// Scale a payout by `numerator / denominator` with overflow detection,
/// as used when a work rating adjusts the base payout.
pub fn scale_payout(amount: i128, numerator: i128, denominator: i128) -> Result<i128> {
    if denominator == 0 {
        return Err(LogError::ArithmeticFault(
            "payout scale denominator is zero".to_string(),
        ));
    }
    let scaled = amount.checked_mul(numerator).ok_or_else(|| {
        LogError::ArithmeticFault(format!(
            "payout scaling overflowed: {} * {}",
            amount, numerator
        ))
    })?;
    Ok(scaled / denominator)
}
