//! Markup arithmetic and operator config patches.

use pricesync_common::Markup;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

/// Apply `markup` to `base`.
///
/// Percentage: `base * (1 + value / 100)`. Flat: `base + value`.
/// The result is not rounded.
pub fn effective_value(base: Decimal, markup: &Markup) -> FxResult<Decimal> {
    let result = if markup.is_percentage {
        let factor = Decimal::ONE
            .checked_add(markup.value / Decimal::ONE_HUNDRED)
            .ok_or_else(|| FxError::Validation("markup percentage overflows".to_string()))?;
        base.checked_mul(factor)
    } else {
        base.checked_add(markup.value)
    };

    result.ok_or_else(|| {
        FxError::Validation(format!(
            "markup {} on base {} overflows",
            markup.value, base
        ))
    })
}

/// Operator change to the markup configuration. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupPatch {
    #[serde(default, rename = "addedValue")]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub is_percentage: Option<bool>,
}

impl MarkupPatch {
    /// Set both fields.
    pub fn new(value: Decimal, is_percentage: bool) -> Self {
        Self {
            value: Some(value),
            is_percentage: Some(is_percentage),
        }
    }

    /// Reject negative markups and patches that change nothing.
    pub fn validate(&self) -> FxResult<()> {
        if self.value.is_none() && self.is_percentage.is_none() {
            return Err(FxError::Validation(
                "markup patch must set addedValue or isPercentage".to_string(),
            ));
        }
        if let Some(value) = self.value {
            if value < Decimal::ZERO {
                return Err(FxError::Validation(format!(
                    "markup value must be >= 0, got {}",
                    value
                )));
            }
        }
        Ok(())
    }

    /// Merge onto the current configuration.
    pub fn apply_to(&self, current: Markup) -> Markup {
        Markup {
            value: self.value.unwrap_or(current.value),
            is_percentage: self.is_percentage.unwrap_or(current.is_percentage),
        }
    }
}
