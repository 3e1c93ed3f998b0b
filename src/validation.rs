//! Validators shared by configuration loading.
use std::ops::RangeInclusive;

/// Validates if a given u16 value is a valid port number.
/// By type, the port is already within the 0-65535 range.
/// This function checks that the port is not 0, which is reserved.
///
/// # Returns
///
/// * `Ok(())` if the port is valid.
/// * `Err(&'static str)` if the port is invalid.
pub fn is_valid_port(port: u16) -> Result<(), &'static str> {
    if port > 0 {
        Ok(())
    } else {
        Err("Port number must be greater than 0")
    }
}

/// Validates that a host name or address is usable for a TCP connection.
///
/// Accepts IP literals and host names; rejects empty strings and embedded whitespace.
pub fn is_valid_host(host: &str) -> Result<(), &'static str> {
    if host.trim().is_empty() {
        return Err("Host cannot be empty");
    }
    if host.chars().any(char::is_whitespace) {
        return Err("Host cannot contain whitespace");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(s: &str) -> Result<(), &'static str> {
    if s.is_empty() {
        Err("String cannot be empty")
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_port() {
        assert!(is_valid_port(59000).is_ok());
        assert!(is_valid_port(0).is_err());
    }

    #[test]
    fn test_is_valid_host() {
        assert!(is_valid_host("127.0.0.1").is_ok());
        assert!(is_valid_host("lab-server.local").is_ok());
        assert!(is_valid_host("").is_err());
        assert!(is_valid_host("two words").is_err());
    }

    #[test]
    fn test_is_in_range() {
        assert!(is_in_range(5, 1..=10).is_ok());
        assert!(is_in_range(11, 1..=10).is_err());
    }

    #[test]
    fn test_is_not_empty() {
        assert!(is_not_empty("hello").is_ok());
        assert!(is_not_empty("").is_err());
    }
}
