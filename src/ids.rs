use rusty_ulid::Ulid;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Identity of a stored match, a ULID string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct MatchId(String);

impl Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = rusty_ulid::DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_str(s.trim())?;
        Ok(MatchId(ulid.to_string()))
    }
}

impl Deref for MatchId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MatchId {
    #[inline]
    pub fn new() -> MatchId {
        MatchId(Ulid::generate().to_string())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique_and_parse_back() {
        let a = MatchId::new();
        let b = MatchId::new();
        assert_ne!(a, b);
        assert_eq!(a.len(), 26);
        assert_eq!(a.to_string().parse::<MatchId>().unwrap(), a);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-ulid".parse::<MatchId>().is_err());
        assert!("".parse::<MatchId>().is_err());
    }
}
