use chrono::{DateTime, Utc};

use crate::error::CineError;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Seconds since the unix epoch plus a fraction of a second in units of 1/2^32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time64 {
    pub fractions: u32,
    pub seconds: u32,
}

impl Time64 {
    pub fn nanos(&self) -> u32 {
        ((self.fractions as u64 * NANOS_PER_SEC) >> 32) as u32
    }

    pub fn to_datetime(&self) -> Result<DateTime<Utc>, CineError> {
        DateTime::<Utc>::from_timestamp(self.seconds as i64, self.nanos())
            .ok_or_else(|| CineError::invalid(format!("timestamp out of range: {self:?}")))
    }

    pub fn from_datetime(t: &DateTime<Utc>) -> Result<Self, CineError> {
        let seconds = u32::try_from(t.timestamp())
            .map_err(|_| CineError::invalid(format!("{t} cannot be stored as a CINE time")))?;
        // Round up so that `nanos()` gives back exactly the same value
        let nanos = t.timestamp_subsec_nanos() as u64;
        let fractions = ((nanos << 32) + NANOS_PER_SEC - 1) / NANOS_PER_SEC;

        Ok(Time64 { fractions: fractions as u32, seconds })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn half_second_fraction() {
        let t = Time64 { fractions: 1 << 31, seconds: 10 };
        assert_eq!(t.nanos(), 500_000_000);
        assert_eq!(t.to_datetime().unwrap(), Utc.timestamp_opt(10, 500_000_000).unwrap());
    }

    #[test]
    fn datetime_survives_conversion() {
        let t = Utc.timestamp_opt(1_695_230_058, 123_456_789).unwrap();
        let back = Time64::from_datetime(&t).unwrap().to_datetime().unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn pre_epoch_is_rejected() {
        let t = Utc.timestamp_opt(-5, 0).unwrap();
        assert!(matches!(Time64::from_datetime(&t), Err(CineError::InvalidFormat(_))));
    }
}
