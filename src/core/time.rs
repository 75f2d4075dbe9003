use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

pub fn now_utc() -> DateTime<Utc> {
    if let Ok(value) = std::env::var("ORGLENS_FIXED_TIME") {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
            return dt.with_timezone(&Utc);
        }
    }
    Utc::now()
}

/// Lookback window for usage/activity probes, named the way product
/// definitions spell them ("last30Days").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    pub days: u32,
}

impl Timeframe {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let days = match trimmed {
            "last7Days" => 7,
            "last30Days" => 30,
            "last90Days" => 90,
            "last180Days" => 180,
            "lastYear" => 365,
            other => {
                return Err(anyhow!("invalid timeframe: {}", other));
            }
        };
        Ok(Self { days })
    }

    /// SOQL date literal equivalent, e.g. `LAST_N_DAYS:30`.
    pub fn soql_literal(&self) -> String {
        format!("LAST_N_DAYS:{}", self.days)
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self { days: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_windows() {
        assert_eq!(Timeframe::parse("last7Days").unwrap().days, 7);
        assert_eq!(Timeframe::parse("last30Days").unwrap().days, 30);
        assert_eq!(Timeframe::parse("last90Days").unwrap().days, 90);
        assert!(Timeframe::parse("lastDecade").is_err());
    }

    #[test]
    fn soql_literal_shape() {
        let tf = Timeframe::parse("last30Days").unwrap();
        assert_eq!(tf.soql_literal(), "LAST_N_DAYS:30");
    }
}
