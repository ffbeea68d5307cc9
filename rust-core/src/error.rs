use thiserror::Error;

/// Rejections for a user-supplied currency amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is missing")]
    Missing,
    #[error("amount is not a whole number: {0}")]
    NotANumber(String),
    #[error("amount must be positive, got {0}")]
    NotPositive(i64),
}

/// Settings file failures. Callers fall back to defaults on load and
/// log-and-continue on save; none of these reach chat.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("settings json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a positive whole amount from a chat param.
pub fn parse_amount(raw: &str) -> Result<i64, AmountError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AmountError::Missing);
    }
    let value = raw
        .parse::<i64>()
        .map_err(|_| AmountError::NotANumber(raw.to_string()))?;
    if value <= 0 {
        return Err(AmountError::NotPositive(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_accepts_positive_integers() {
        assert_eq!(parse_amount("100"), Ok(100));
        assert_eq!(parse_amount(" 7 "), Ok(7));
    }

    #[test]
    fn parse_amount_rejects_bad_input() {
        assert_eq!(parse_amount(""), Err(AmountError::Missing));
        assert_eq!(parse_amount("abc"), Err(AmountError::NotANumber("abc".into())));
        assert_eq!(parse_amount("1.5"), Err(AmountError::NotANumber("1.5".into())));
        assert_eq!(parse_amount("0"), Err(AmountError::NotPositive(0)));
        assert_eq!(parse_amount("-3"), Err(AmountError::NotPositive(-3)));
    }
}
