//! Promo code validation.
//!
//! Pure functions over the code's reference data, the cohort, the learner's
//! current usage and the clock. Nothing here mutates anything.

use crate::error::PromoRejection;
use crate::types::{Cohort, Discount, DiscountRule, Money, PromoCode, PromoUsage};
use chrono::{DateTime, Utc};

/// Longest code accepted as input
pub const MAX_CODE_LEN: usize = 32;

/// Trim and upper-case a user-supplied code. Blank means "no code".
#[must_use]
pub fn normalize(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_uppercase)
}

/// Check `promo` against the cohort, the learner's usage and `now`.
///
/// `promo` is `None` when the catalog has no such code.
///
/// # Errors
///
/// The first rule the code fails, checked in this order: existence,
/// validity window, applicability, usage limits.
pub fn validate(
    promo: Option<&PromoCode>,
    cohort: &Cohort,
    usage: PromoUsage,
    now: DateTime<Utc>,
) -> Result<Discount, PromoRejection> {
    let promo = promo.ok_or(PromoRejection::NotFound)?;

    if now < promo.valid_from {
        return Err(PromoRejection::NotYetActive);
    }
    if promo.valid_until.is_some_and(|until| now >= until) {
        return Err(PromoRejection::Expired);
    }

    let cohort_ok = promo.cohort_ids.is_empty() || promo.cohort_ids.contains(&cohort.id);
    let program_ok = promo.program_ids.is_empty() || promo.program_ids.contains(&cohort.program_id);
    if !(cohort_ok && program_ok) {
        return Err(PromoRejection::NotApplicableToCohort);
    }

    let over_total = promo.max_uses.is_some_and(|max| usage.total >= max);
    let over_user = promo.max_uses_per_user.is_some_and(|max| usage.by_user >= max);
    if over_total || over_user {
        return Err(PromoRejection::UsageLimitExceeded);
    }

    let amount_off = amount_off(&promo.rule, cohort.price);
    Ok(Discount {
        code: promo.code.clone(),
        amount_off,
        final_price: cohort.price.saturating_sub(amount_off),
    })
}

/// Amount `rule` takes off `price`, never more than the price itself.
#[must_use]
pub fn amount_off(rule: &DiscountRule, price: Money) -> Money {
    match rule {
        DiscountRule::Percentage { percent } => {
            let percent = u128::from((*percent).min(100));
            let off = u128::from(price.minor()) * percent / 100;
            Money::from_minor(u64::try_from(off).unwrap_or(u64::MAX))
        },
        DiscountRule::Fixed { amount } => (*amount).min(price),
    }
}
