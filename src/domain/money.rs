use thiserror::Error;

/// Money is held as integer cents, so €150.00 is 15000.
pub type Cents = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format: {0:?}")]
    InvalidFormat(String),
    #[error("amount out of range: {0:?}")]
    OutOfRange(String),
}

/// Format cents as a two-decimal string.
/// Example: 15000 -> "150.00", -1 -> "-0.01"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal string into cents. Digits past the second decimal place
/// are truncated.
/// Example: "50" -> 5000, "12.5" -> 1250, ".75" -> 75
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let trimmed = input.trim();
    let invalid = || ParseCentsError::InvalidFormat(input.to_string());
    let overflow = || ParseCentsError::OutOfRange(input.to_string());

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (units_str, decimal_str) = digits.split_once('.').unwrap_or((digits, ""));
    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(invalid());
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(units_str) || !all_digits(decimal_str) {
        return Err(invalid());
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| overflow())?
    };

    let fraction: i64 = match decimal_str.len() {
        0 => 0,
        1 => decimal_str.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => decimal_str[..2].parse().map_err(|_| invalid())?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or_else(overflow)?;
    Ok(if negative { -cents } else { cents })
}

/// One month of interest on `balance` at the annual nominal `annual_rate`,
/// rounded to the nearest cent (half away from zero).
pub fn monthly_interest(balance: Cents, annual_rate: f64) -> Cents {
    (balance as f64 * (annual_rate / 12.0)).round() as Cents
}
