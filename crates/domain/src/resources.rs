use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use slotgate_core::{AppError, AppResult};

const MEBIBYTE: i64 = 1024 * 1024;

/// Cpu and memory amounts in the units schedulers account in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    /// Cpu in millicores.
    pub cpu_millis: i64,
    /// Memory in bytes.
    pub memory_bytes: i64,
}

impl ResourceQuantity {
    /// Creates a quantity from raw units.
    #[must_use]
    pub fn new(cpu_millis: i64, memory_bytes: i64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
        }
    }

    /// Parses a quantity from Kubernetes-style cpu and memory strings.
    pub fn parse(cpu: &str, memory: &str) -> AppResult<Self> {
        Ok(Self {
            cpu_millis: parse_cpu_millis(cpu)?,
            memory_bytes: parse_memory_bytes(memory)?,
        })
    }

    /// Adds two quantities, saturating on overflow.
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            cpu_millis: self.cpu_millis.saturating_add(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
        }
    }

    /// Subtracts `other`, saturating on overflow. Results may be negative.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
        }
    }

    /// Multiplies both dimensions by `factor`, saturating on overflow.
    #[must_use]
    pub fn saturating_mul(self, factor: i64) -> Self {
        Self {
            cpu_millis: self.cpu_millis.saturating_mul(factor),
            memory_bytes: self.memory_bytes.saturating_mul(factor),
        }
    }

    /// Returns the per-dimension maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            cpu_millis: self.cpu_millis.max(other.cpu_millis),
            memory_bytes: self.memory_bytes.max(other.memory_bytes),
        }
    }

    /// Returns true when both dimensions are at least as large as `required`.
    #[must_use]
    pub fn covers(&self, required: &Self) -> bool {
        self.cpu_millis >= required.cpu_millis && self.memory_bytes >= required.memory_bytes
    }
}

impl Display for ResourceQuantity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "cpu={}m memory={}Mi",
            self.cpu_millis,
            self.memory_bytes / MEBIBYTE
        )
    }
}

/// Parses a cpu quantity (`250m`, `2`, `1.5`) into millicores.
pub fn parse_cpu_millis(value: &str) -> AppResult<i64> {
    let cores = parse_quantity(value)?;
    to_i64((cores * 1000.0).ceil(), value)
}

/// Parses a memory quantity (`16Gi`, `512M`, `1e9`, `1024`) into bytes.
pub fn parse_memory_bytes(value: &str) -> AppResult<i64> {
    let bytes = parse_quantity(value)?;
    to_i64(bytes.ceil(), value)
}

fn to_i64(value: f64, original: &str) -> AppResult<i64> {
    if !value.is_finite() || value.abs() > 9.0e18 {
        return Err(AppError::Validation(format!(
            "quantity '{original}' is out of range"
        )));
    }

    // Bounds checked above.
    #[allow(clippy::cast_possible_truncation)]
    Ok(value as i64)
}

fn parse_quantity(value: &str) -> AppResult<f64> {
    let trimmed = value.trim();
    let split_at = trimmed
        .find(|character: char| {
            !(character.is_ascii_digit() || character == '.' || character == '+' || character == '-')
        })
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split_at);

    let number = number.parse::<f64>().map_err(|error| {
        AppError::Validation(format!("invalid quantity '{trimmed}': {error}"))
    })?;

    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0_f64.powi(2),
        "Gi" => 1024.0_f64.powi(3),
        "Ti" => 1024.0_f64.powi(4),
        "Pi" => 1024.0_f64.powi(5),
        "Ei" => 1024.0_f64.powi(6),
        exponent if exponent.starts_with(['e', 'E']) => {
            let power = exponent[1..].parse::<i32>().map_err(|_| {
                AppError::Validation(format!("invalid quantity suffix '{suffix}' in '{trimmed}'"))
            })?;
            10.0_f64.powi(power)
        }
        other => {
            return Err(AppError::Validation(format!(
                "invalid quantity suffix '{other}' in '{trimmed}'"
            )));
        }
    };

    Ok(number * multiplier)
}

#[cfg(test)]
mod tests {
    use super::{ResourceQuantity, parse_cpu_millis, parse_memory_bytes};

    #[test]
    fn cpu_accepts_millicores_and_fractions() {
        assert_eq!(parse_cpu_millis("250m").unwrap_or_default(), 250);
        assert_eq!(parse_cpu_millis("2").unwrap_or_default(), 2000);
        assert_eq!(parse_cpu_millis("1.5").unwrap_or_default(), 1500);
    }

    #[test]
    fn memory_accepts_binary_decimal_and_exponent_forms() {
        assert_eq!(
            parse_memory_bytes("16Gi").unwrap_or_default(),
            16 * 1024 * 1024 * 1024
        );
        assert_eq!(parse_memory_bytes("512M").unwrap_or_default(), 512_000_000);
        assert_eq!(parse_memory_bytes("1e9").unwrap_or_default(), 1_000_000_000);
        assert_eq!(parse_memory_bytes("128974848").unwrap_or_default(), 128_974_848);
    }

    #[test]
    fn exa_suffix_is_not_an_exponent() {
        assert_eq!(
            parse_memory_bytes("1E").unwrap_or_default(),
            1_000_000_000_000_000_000
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_cpu_millis("lots").is_err());
        assert!(parse_memory_bytes("4Qi").is_err());
        assert!(parse_memory_bytes("").is_err());
    }

    #[test]
    fn covers_requires_both_dimensions() {
        let available = ResourceQuantity::new(8000, 1024);
        assert!(available.covers(&ResourceQuantity::new(4000, 512)));
        assert!(!available.covers(&ResourceQuantity::new(4000, 2048)));
        assert!(!available.covers(&ResourceQuantity::new(9000, 512)));
    }
}
