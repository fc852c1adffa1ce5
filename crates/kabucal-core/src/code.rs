use serde::{Deserialize, Serialize};

use crate::error::InvalidCode;

/// A 4-character alphanumeric exchange code such as `7203` or `130A`.
///
/// Construction validates but never corrects: `"7203 "` and `"720"` are
/// rejected rather than trimmed or padded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyCode(String);

impl CompanyCode {
    /// Validates `raw` against `^[0-9A-Za-z]{4}$`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCode`] when `raw` is not exactly four ASCII
    /// alphanumeric characters.
    pub fn parse(raw: &str) -> Result<Self, InvalidCode> {
        if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidCode(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CompanyCode {
    type Error = InvalidCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CompanyCode> for String {
    fn from(code: CompanyCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CompanyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_and_alphanumeric_codes() {
        assert!(CompanyCode::parse("7203").is_ok());
        assert!(CompanyCode::parse("130A").is_ok());
        assert!(CompanyCode::parse("285a").is_ok());
    }

    #[test]
    fn rejects_wrong_length_and_symbols() {
        for raw in ["", "720", "72030", "72-3", "7203 ", " 720", "７２０３"] {
            assert!(CompanyCode::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn deserialize_rejects_invalid_code() {
        let ok: Result<CompanyCode, _> = serde_json::from_str("\"6758\"");
        assert_eq!(ok.unwrap().as_str(), "6758");
        let bad: Result<CompanyCode, _> = serde_json::from_str("\"67580\"");
        assert!(bad.is_err());
    }
}
