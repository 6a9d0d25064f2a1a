use crate::errors::SpikeError;
use std::fmt;
use std::str::FromStr;

/// A unit label, `<session>-<unit number>`.
///
/// Session names may contain dashes; the unit number follows the last one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitLabel {
    pub session: String,
    pub unit: u32,
}

impl UnitLabel {
    pub fn parse(s: &str) -> Result<Self, SpikeError> {
        let bad = || SpikeError::BadLabel(s.to_string());
        let (session, unit) = s.rsplit_once('-').ok_or_else(bad)?;
        if session.is_empty() {
            return Err(bad());
        }
        Ok(Self {
            session: session.to_string(),
            unit: unit.parse().map_err(|_| bad())?,
        })
    }
}

impl FromStr for UnitLabel {
    type Err = SpikeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UnitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.session, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_at_last_dash() {
        let label = UnitLabel::parse("CR20B_120613_001_behaving-417").unwrap();
        assert_eq!(label.session, "CR20B_120613_001_behaving");
        assert_eq!(label.unit, 417);

        let dashed = UnitLabel::parse("YT6A-0202-behaving-12").unwrap();
        assert_eq!(dashed.session, "YT6A-0202-behaving");
        assert_eq!(dashed.to_string(), "YT6A-0202-behaving-12");
    }

    #[test]
    fn test_bad_labels() {
        for s in ["nodash", "-5", "session-", "session-x1"] {
            assert!(matches!(UnitLabel::parse(s), Err(SpikeError::BadLabel(_))), "{}", s);
        }
    }
}
