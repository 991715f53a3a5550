// Pricing engine.
//
// quote() is a pure function of the loaded rules and the subject's recorded
// attributes. Time-limited discounts are evaluated against the moment the
// application was submitted, never the current clock, so re-quoting on a later
// payment attempt yields the same amount.

use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};
use crate::modules::students::Student;

/// Promotional rules, loaded from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRules {
    pub currency: Currency,
    pub base_amount_minor: i64,
    #[serde(default)]
    pub discounts: Vec<DiscountRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub name: String,
    /// Percentage off the base amount, 0 < percent <= 100
    pub percent: Decimal,
    /// Restrict to these cohorts; empty means any cohort
    #[serde(default)]
    pub cohorts: Vec<String>,
    /// Restrict to applications submitted inside this window
    #[serde(default)]
    pub window: Option<DiscountWindow>,
}

/// Half-open interval `[starts_at, ends_at)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl DiscountRule {
    fn applies_to(&self, subject: &PricingSubject) -> bool {
        let cohort_ok = self.cohorts.is_empty()
            || subject
                .cohort
                .as_deref()
                .map(|c| self.cohorts.iter().any(|allowed| allowed.eq_ignore_ascii_case(c)))
                .unwrap_or(false);

        let window_ok = self
            .window
            .as_ref()
            .map(|w| subject.applied_at >= w.starts_at && subject.applied_at < w.ends_at)
            .unwrap_or(true);

        cohort_ok && window_ok
    }
}

impl PricingRules {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let rules: PricingRules = serde_yaml::from_str(yaml)
            .map_err(|e| AppError::Configuration(format!("Invalid pricing rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "Cannot read pricing rules '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Flat price with no promotions
    pub fn flat(currency: Currency, base_amount_minor: i64) -> Self {
        Self {
            currency,
            base_amount_minor,
            discounts: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_amount_minor <= 0 {
            return Err(AppError::Configuration(
                "Pricing base amount must be greater than 0".to_string(),
            ));
        }

        for rule in &self.discounts {
            if rule.percent <= Decimal::ZERO || rule.percent >= Decimal::ONE_HUNDRED {
                return Err(AppError::Configuration(format!(
                    "Discount '{}' percent must be in (0, 100), got {}",
                    rule.name, rule.percent
                )));
            }

            // Gateways cannot charge zero; a waiver is not a discount
            if self.base_amount_minor - discount_minor(self.base_amount_minor, rule.percent) <= 0 {
                return Err(AppError::Configuration(format!(
                    "Discount '{}' reduces the base amount {} to zero",
                    rule.name, self.base_amount_minor
                )));
            }

            if let Some(window) = &rule.window {
                if window.starts_at >= window.ends_at {
                    return Err(AppError::Configuration(format!(
                        "Discount '{}' window must start before it ends",
                        rule.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Attributes of the person being charged that pricing may depend on
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSubject {
    pub cohort: Option<String>,
    pub applied_at: DateTime<Utc>,
}

impl From<&Student> for PricingSubject {
    fn from(student: &Student) -> Self {
        Self {
            cohort: student.cohort.clone(),
            applied_at: student.applied_at,
        }
    }
}

/// Amount due for one charge attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub amount_minor: i64,
    pub base_amount_minor: i64,
    pub currency: Currency,
    pub discount_applied: bool,
    pub discount_percent: Decimal,
    pub discount_name: Option<String>,
}

pub struct PricingEngine {
    rules: PricingRules,
}

impl PricingEngine {
    pub fn new(rules: PricingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &PricingRules {
        &self.rules
    }

    /// Compute the amount due; the highest eligible discount wins
    pub fn quote(&self, subject: &PricingSubject) -> Quote {
        let base = self.rules.base_amount_minor;

        // Ties resolve to the first rule declared
        let best = self
            .rules
            .discounts
            .iter()
            .filter(|rule| rule.applies_to(subject))
            .fold(None::<&DiscountRule>, |best, rule| match best {
                Some(b) if b.percent >= rule.percent => Some(b),
                _ => Some(rule),
            });

        match best {
            Some(rule) => {
                let discount = discount_minor(base, rule.percent);
                Quote {
                    amount_minor: base - discount,
                    base_amount_minor: base,
                    currency: self.rules.currency,
                    discount_applied: true,
                    discount_percent: rule.percent,
                    discount_name: Some(rule.name.clone()),
                }
            }
            None => Quote {
                amount_minor: base,
                base_amount_minor: base,
                currency: self.rules.currency,
                discount_applied: false,
                discount_percent: Decimal::ZERO,
                discount_name: None,
            },
        }
    }
}

/// `base * percent / 100`, rounded half away from zero to a whole minor unit
pub fn discount_minor(base_amount_minor: i64, percent: Decimal) -> i64 {
    let raw = Decimal::from(base_amount_minor) * percent / Decimal::ONE_HUNDRED;
    raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
        .clamp(0, base_amount_minor)
}
