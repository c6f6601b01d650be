//! Shared text canonicalization.
//!
//! Every caller that compares, fingerprints, or matches free text must go
//! through this module. Two implementations of "the same" folding is how the
//! same merchant ends up compared unequal, so there is exactly one.

/// Canonicalize text for display and storage: full-width digits, Latin
/// letters, and punctuation become their ASCII equivalents, the ideographic
/// space (U+3000) becomes a plain space, and runs of whitespace collapse to a
/// single space with the ends trimmed. Letter case is preserved.
///
/// Total and idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut started = false;

    for ch in text.chars() {
        let ch = to_halfwidth(ch);
        if ch.is_whitespace() {
            pending_space = started;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
        started = true;
    }

    out
}

/// The matching form: [`normalize`] plus lowercase. Used by the rule engine
/// and by fingerprinting, so that `ＡＭＡＺＯＮ` / `Amazon` / `amazon` all
/// compare equal.
pub fn fold(text: &str) -> String {
    normalize(text).to_lowercase()
}

/// Map a full-width character (U+FF01..=U+FF5E) to its half-width ASCII
/// counterpart, and the ideographic space to ' '. Everything else passes
/// through unchanged.
fn to_halfwidth(ch: char) -> char {
    match ch {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => {
            // Full-width block is a constant offset from printable ASCII.
            char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch)
        }
        _ => ch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullwidth_latin_becomes_ascii() {
        assert_eq!(normalize("ＡＭＡＺＯＮ．ＣＯ．ＪＰ"), "AMAZON.CO.JP");
    }

    #[test]
    fn fullwidth_digits_become_ascii() {
        assert_eq!(normalize("１２３４５"), "12345");
        assert_eq!(normalize("￥ is outside the block"), "￥ is outside the block");
    }

    #[test]
    fn ideographic_space_collapses() {
        assert_eq!(normalize("セブン　イレブン"), "セブン イレブン");
    }

    #[test]
    fn whitespace_trims_and_collapses() {
        assert_eq!(normalize("  AEON \t MALL  "), "AEON MALL");
        assert_eq!(normalize("a\r\nb"), "a b");
    }

    #[test]
    fn normalize_preserves_case() {
        assert_eq!(normalize("Suica Charge"), "Suica Charge");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = ["ＡＭＡＺＯＮ．ＣＯ．ＪＰ", "  foo　 bar ", "ローソン"];
        for s in inputs {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn normalize_is_total_on_odd_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \t\u{3000} "), "");
    }

    #[test]
    fn fold_lowercases_after_width_folding() {
        assert_eq!(fold("ＡＭＡＺＯＮ．ＣＯ．ＪＰ"), "amazon.co.jp");
        assert_eq!(fold("Amazon.co.jp"), "amazon.co.jp");
    }

    #[test]
    fn fullwidth_punctuation_folds() {
        assert_eq!(normalize("（株）テスト！"), "(株)テスト!");
    }
}
