use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies accepted by the payment gateway
///
/// All amounts in this crate are integers in the currency's minor unit
/// (kobo, pesewas, cents), which is what the gateway expects on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(3)", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Nigerian Naira
    NGN,
    /// Ghanaian Cedi
    GHS,
    /// South African Rand
    ZAR,
    /// Kenyan Shilling
    KES,
    /// US Dollar
    USD,
}

impl Currency {
    /// Number of decimal places between the major and minor unit
    pub fn exponent(&self) -> u32 {
        match self {
            Currency::NGN | Currency::GHS | Currency::ZAR | Currency::KES | Currency::USD => 2,
        }
    }

    /// Formats a minor-unit amount for display, e.g. `NGN 150.00`
    pub fn format_minor(&self, amount_minor: i64) -> String {
        let divisor = 10_i64.pow(self.exponent());
        let sign = if amount_minor < 0 { "-" } else { "" };
        let abs = amount_minor.unsigned_abs();
        let divisor = divisor.unsigned_abs();
        format!(
            "{} {}{}.{:0width$}",
            self,
            sign,
            abs / divisor,
            abs % divisor,
            width = self.exponent() as usize
        )
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::NGN => write!(f, "NGN"),
            Currency::GHS => write!(f, "GHS"),
            Currency::ZAR => write!(f, "ZAR"),
            Currency::KES => write!(f, "KES"),
            Currency::USD => write!(f, "USD"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NGN" => Ok(Currency::NGN),
            "GHS" => Ok(Currency::GHS),
            "ZAR" => Ok(Currency::ZAR),
            "KES" => Ok(Currency::KES),
            "USD" => Ok(Currency::USD),
            _ => Err(format!("Unsupported currency: {}", s)),
        }
    }
}
