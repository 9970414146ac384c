/// Parsing of Kubernetes resource quantities ("500m", "512Mi", "1.5", "2e3")
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::Error;

/// Nano units per base unit; quantities finer than this round up.
const NANOS_PER_UNIT: i32 = 9;

/// A quantity string together with its exact value in nano base units
/// (nanocores or nanobytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuantity {
    pub raw: String,
    pub nanos: i128,
}

impl ParsedQuantity {
    /// Parse `raw`, naming `field` in the error.
    pub fn parse(field: &'static str, raw: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidResourceQuantity {
            field,
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let text = raw.trim();
        if text.is_empty() {
            return Err(invalid("empty quantity"));
        }

        let split = text
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
            .unwrap_or(text.len());
        let (number, suffix) = text.split_at(split);

        if number.is_empty() || number.matches('.').count() > 1 {
            return Err(invalid("missing or malformed number"));
        }
        if number[1..].contains(['+', '-']) {
            return Err(invalid("sign must lead the number"));
        }

        let (negative, digits) = match number.as_bytes()[0] {
            b'-' => (true, &number[1..]),
            b'+' => (false, &number[1..]),
            _ => (false, number),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("malformed number"));
        }

        let significant = format!("{}{}", whole, fraction);
        let significant = significant.trim_start_matches('0');
        if significant.len() > 30 {
            return Err(invalid("out of range"));
        }
        let mantissa: i128 = if significant.is_empty() {
            0
        } else {
            significant.parse().map_err(|_| invalid("malformed number"))?
        };
        if negative && mantissa != 0 {
            return Err(invalid("must not be negative"));
        }

        let scale = Scale::of(suffix).ok_or_else(|| invalid("unknown suffix"))?;
        let fraction_digits =
            i32::try_from(fraction.len()).map_err(|_| invalid("out of range"))?;
        let exponent = scale
            .decimal
            .checked_add(NANOS_PER_UNIT - fraction_digits)
            .ok_or_else(|| invalid("out of range"))?;

        let nanos = scale_exact(mantissa, scale.binary, exponent)
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Self {
            raw: text.to_string(),
            nanos,
        })
    }

    pub fn to_quantity(&self) -> Quantity {
        Quantity(self.raw.clone())
    }
}

/// `value * 2^binary * 10^decimal`, rounded up when `decimal` is negative.
fn scale_exact(value: i128, binary: u32, decimal: i32) -> Option<i128> {
    let value = value.checked_mul(2i128.checked_pow(binary)?)?;
    if decimal >= 0 {
        return value.checked_mul(10i128.checked_pow(decimal.unsigned_abs())?);
    }

    match 10i128.checked_pow(decimal.unsigned_abs()) {
        Some(divisor) => Some(value / divisor + i128::from(value % divisor != 0)),
        // Anything positive below one nano unit still counts as one
        None => Some(i128::from(value > 0)),
    }
}

/// Power-of-two and power-of-ten factors a suffix stands for.
struct Scale {
    binary: u32,
    decimal: i32,
}

impl Scale {
    fn of(suffix: &str) -> Option<Self> {
        let binary = |power: u32| Some(Scale { binary: power * 10, decimal: 0 });
        let decimal = |exponent: i32| Some(Scale { binary: 0, decimal: exponent });

        match suffix {
            "" => decimal(0),
            "n" => decimal(-9),
            "u" => decimal(-6),
            "m" => decimal(-3),
            "k" => decimal(3),
            "M" => decimal(6),
            "G" => decimal(9),
            "T" => decimal(12),
            "P" => decimal(15),
            "E" => decimal(18),
            "Ki" => binary(1),
            "Mi" => binary(2),
            "Gi" => binary(3),
            "Ti" => binary(4),
            "Pi" => binary(5),
            "Ei" => binary(6),
            exp if exp.starts_with(['e', 'E']) => {
                let exponent: i32 = exp[1..].parse().ok()?;
                decimal(exponent)
            }
            _ => None,
        }
    }
}

/// A request/limit pair that has been checked for `request <= limit`.
#[derive(Debug, Clone)]
pub struct Bounds {
    pub request: ParsedQuantity,
    pub limit: ParsedQuantity,
}

impl Bounds {
    pub fn parse(
        request_field: &'static str,
        request: &str,
        limit_field: &'static str,
        limit: &str,
    ) -> Result<Self, Error> {
        let request = ParsedQuantity::parse(request_field, request)?;
        let limit = ParsedQuantity::parse(limit_field, limit)?;

        if request.nanos > limit.nanos {
            return Err(Error::InvalidResourceQuantity {
                field: request_field,
                value: request.raw.clone(),
                reason: format!("request exceeds {} {}", limit_field, limit.raw),
            });
        }

        Ok(Self { request, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: i128 = 1 << 30;
    const NANO: i128 = 1_000_000_000;

    fn nanos(raw: &str) -> i128 {
        ParsedQuantity::parse("cpu_limit", raw).unwrap().nanos
    }

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(nanos("500m"), 500_000_000);
        assert_eq!(nanos("2"), 2 * NANO);
        assert_eq!(nanos("0.25"), 250_000_000);
        assert_eq!(nanos("1500m"), 1_500_000_000);
        assert_eq!(nanos("+1"), NANO);
        assert_eq!(nanos("0"), 0);
    }

    #[test]
    fn test_memory_quantities() {
        assert_eq!(nanos("512Mi"), 512 * (1 << 20) * NANO);
        assert_eq!(nanos("1Gi"), GIB * NANO);
        assert_eq!(nanos("128M"), 128_000_000 * NANO);
        assert_eq!(nanos("2e3"), 2000 * NANO);
        assert_eq!(nanos("64Ki"), 65536 * NANO);
    }

    #[test]
    fn test_sub_nano_values_round_up() {
        assert_eq!(nanos("1n"), 1);
        assert_eq!(nanos("0.1n"), 1);
        assert_eq!(nanos("1e-40"), 1);
    }

    #[test]
    fn test_unparsable_quantities() {
        for raw in ["", "abc", "12Qi", "1.2.3", "-1", "5-", "Mi", "1e", ".", "1e40E"] {
            let err = ParsedQuantity::parse("memory_limit", raw).unwrap_err();
            assert!(
                matches!(err, Error::InvalidResourceQuantity { field: "memory_limit", .. }),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_huge_quantities_are_out_of_range() {
        let err = ParsedQuantity::parse("memory_limit", "1e40").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidResourceQuantity { ref reason, .. } if reason == "out of range"
        ));
    }

    #[test]
    fn test_request_above_limit_is_rejected() {
        let err = Bounds::parse("cpu_request", "1", "cpu_limit", "500m").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidResourceQuantity { field: "cpu_request", .. }
        ));

        let err = Bounds::parse("cpu_request", "1000000001n", "cpu_limit", "1").unwrap_err();
        assert!(matches!(err, Error::InvalidResourceQuantity { .. }));

        let bounds = Bounds::parse("memory_request", "256Mi", "memory_limit", "1Gi").unwrap();
        assert_eq!(bounds.request.to_quantity().0, "256Mi");
        assert_eq!(bounds.limit.to_quantity().0, "1Gi");
    }

    #[test]
    fn test_equal_request_and_limit_across_suffixes() {
        let pairs = [
            ("700m", "0.7"),
            ("300m", "0.3"),
            ("100m", "0.1"),
            ("1", "1000m"),
            ("0.001", "1m"),
            ("1u", "1000n"),
            ("1k", "1000"),
            ("1M", "1000k"),
            ("1G", "1e9"),
            ("2e3", "2k"),
            ("1Ki", "1024"),
            ("1Gi", "1024Mi"),
            ("1.5Gi", "1536Mi"),
            ("0.5Gi", "512Mi"),
            ("1Ti", "1024Gi"),
        ];

        for (request, limit) in pairs {
            let bounds = Bounds::parse("cpu_request", request, "cpu_limit", limit);
            assert!(bounds.is_ok(), "{} <= {} should hold", request, limit);
            let bounds = Bounds::parse("cpu_request", limit, "cpu_limit", request);
            assert!(bounds.is_ok(), "{} <= {} should hold", limit, request);
        }
    }
}
