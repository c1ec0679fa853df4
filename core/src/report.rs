//! Presentation helpers for summary tables.

/// `$1,234.56`; negative values render as `$-1,234.56`.
pub fn format_currency(value: f64) -> String {
    format!("${}", group_thousands(&format!("{value:.2}")))
}

/// `12.34%`.
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

/// Insert `,` every three digits of the integer part of a decimal string.
fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None       => ("", number),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None         => (unsigned, None),
    };
    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return number.to_string();
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(frac) => format!("{sign}{grouped}.{frac}"),
        None       => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_groups_thousands() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-4200.5), "$-4,200.50");
    }

    #[test]
    fn percent_has_two_decimals() {
        assert_eq!(format_percent(12.346), "12.35%");
        assert_eq!(format_percent(100.0), "100.00%");
    }

    #[test]
    fn non_finite_values_pass_through() {
        assert_eq!(format_currency(f64::INFINITY), "$inf");
    }
}
