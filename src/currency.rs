//! Formatting of monetary amounts as Brazilian reais.

use std::sync::OnceLock;

use numfmt::{Formatter, Precision};

/// Format an amount as Brazilian reais, e.g. `R$ 1.234,56`.
///
/// Notification messages embed these strings, so the output must match what
/// the web client renders.
pub fn format_brl(amount: f64) -> String {
    static POSITIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let positive_fmt = POSITIVE_FMT.get_or_init(|| {
        Formatter::currency("R$ ")
            .unwrap()
            .precision(Precision::Decimals(2))
    });

    static NEGATIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let negative_fmt = NEGATIVE_FMT.get_or_init(|| {
        Formatter::currency("-R$ ")
            .unwrap()
            .precision(Precision::Decimals(2))
    });

    let mut formatted_string = if amount < 0.0 {
        negative_fmt.fmt_string(amount.abs())
    } else if amount > 0.0 {
        positive_fmt.fmt_string(amount)
    } else {
        // Zero is hardcoded as "0", so we must specify the formatted string for zero
        return "R$ 0,00".to_owned();
    };

    // numfmt omits the last trailing zero, so we must add it ourselves
    // For example, "12.30" is rendered as "12.3" so we append "0".
    if formatted_string.as_bytes()[formatted_string.len() - 3] != b'.' {
        formatted_string = format!("{formatted_string}0");
    }

    // numfmt only knows the en-US separators, so swap them for the pt-BR ones.
    formatted_string
        .chars()
        .map(|character| match character {
            '.' => ',',
            ',' => '.',
            other => other,
        })
        .collect()
}
