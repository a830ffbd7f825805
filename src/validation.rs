//! Small validators used by [`crate::config::CampaignConfig::validate`].
use std::net::IpAddr;
use std::ops::RangeInclusive;

/// Validates if a given u16 value is a usable port number.
///
/// Port 0 is reserved and cannot be dialled.
pub fn is_valid_port(port: u16) -> Result<(), &'static str> {
    if port > 0 {
        Ok(())
    } else {
        Err("Port number must be greater than 0")
    }
}

/// Validates an instrument host: either an IP address or a DNS name.
///
/// Host names are checked for the characters RFC 1123 allows; nothing is resolved.
pub fn is_valid_host(host: &str) -> Result<(), &'static str> {
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if host.is_empty() || host.len() > 253 {
        return Err("Host must be an IP address or a host name");
    }
    let labels_ok = host.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    // An all-numeric dotted name is a mistyped IP address, not a host name.
    let looks_numeric = host.chars().all(|c| c.is_ascii_digit() || c == '.');
    if labels_ok && !looks_numeric {
        Ok(())
    } else {
        Err("Host must be an IP address or a host name")
    }
}

/// Validates if a given string is a usable file or folder path.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates a strictly positive, finite quantity (currents, thresholds).
pub fn is_positive_finite(value: f64) -> Result<(), &'static str> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err("Value must be a positive, finite number")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}
