//! # Normalizer
//!
//! Pure functions turning raw name, address and phone fields into comparable forms.
//! Every function returns `None` when the input is missing or cleans down to nothing,
//! which callers treat as "exclude this record".

use regex::{Captures, Regex};
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Administrative-unit and venue words removed from addresses before comparison.
///
/// Matched as whole words on the accent-folded text. Longer phrases come first so the
/// alternation prefers them.
const ADDRESS_NOISE_PHRASES: &[&str] = &[
    "khu cong nghiep",
    "khu dan cu",
    "nha van hoa",
    "hoi truong",
    "chi nhanh",
    "cong vien",
    "thanh pho",
    "khu pho",
    "so nha",
    "toa nha",
    "cong ty",
    "chi cuc",
    "township",
    "district",
    "village",
    "hamlet",
    "street",
    "house",
    "huyen",
    "tinh",
    "thon",
    "ward",
    "xom",
    "ngo",
    "kdc",
    "kcn",
    "cty",
    "kho",
    "ap",
    "kp",
];

fn house_number_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:so|s)\s+\d+[a-z]?\s*,?\s*").expect("static regex"))
}

fn parenthetical() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)").expect("static regex"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.,;]").expect("static regex"))
}

fn unit_abbreviations() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(phuong|quan|duong)\b").expect("static regex"))
}

fn noise_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = ADDRESS_NOISE_PHRASES
            .iter()
            .map(|phrase| phrase.split(' ').collect::<Vec<_>>().join(r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b(?:{alternation})\b")).expect("static regex")
    })
}

/// Lowercase, decompose, drop combining marks and anything left outside ASCII.
///
/// `đ` has no decomposition, so it is mapped to `d` by hand.
pub fn remove_diacritics(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace('đ', "d");
    lowered
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(char::is_ascii)
        .collect()
}

/// Keep `[a-z0-9]` and single spaces.
fn alphanumeric_words(text: &str) -> String {
    let kept: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect();
    collapse_whitespace(&kept)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Canonical recipient name: folded case, no diacritics, alphanumerics and single spaces.
pub fn normalize_name(raw: Option<&str>) -> Option<String> {
    let folded = remove_diacritics(raw?);
    non_empty(alphanumeric_words(&folded))
}

/// Canonical address for fuzzy comparison.
///
/// On top of the name folding this abbreviates ward and district units, strips a leading
/// house number (`so 42,` / `s 8a`), parenthetical asides, separators and noise words.
pub fn normalize_address(raw: Option<&str>) -> Option<String> {
    let folded = remove_diacritics(raw?);
    let text = unit_abbreviations().replace_all(&folded, |caps: &Captures| match &caps[1] {
        "phuong" => "p",
        "quan" => "q",
        _ => "",
    });
    let text = house_number_prefix().replace(&text, "");
    let text = parenthetical().replace_all(&text, "");
    let text = separators().replace_all(&text, "");
    let text = noise_words().replace_all(&text, " ");
    non_empty(alphanumeric_words(&text))
}

/// Digits only.
pub fn normalize_phone(raw: Option<&str>) -> Option<String> {
    let digits: String = raw?.chars().filter(char::is_ascii_digit).collect();
    non_empty(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_diacritics() {
        assert_eq!(remove_diacritics("Nguyễn Văn Đức"), "nguyen van duc");
        assert_eq!(remove_diacritics("Lê Lợi"), "le loi");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(
            normalize_name(Some("  Trần   Thị-Hoa!! ")).as_deref(),
            Some("tran thihoa")
        );
        assert_eq!(normalize_name(Some("***")), None);
        assert_eq!(normalize_name(Some("")), None);
        assert_eq!(normalize_name(None), None);
    }

    #[test]
    fn test_normalize_address_strips_house_number() {
        assert_eq!(normalize_address(Some("Số 5 Lê Lợi")).as_deref(), Some("le loi"));
        assert_eq!(normalize_address(Some("so 5, le loi")).as_deref(), Some("le loi"));
        assert_eq!(
            normalize_address(Some("s 8a Hai Bà Trưng")).as_deref(),
            Some("hai ba trung")
        );
    }

    #[test]
    fn test_normalize_address_abbreviates_units() {
        assert_eq!(
            normalize_address(Some("12 Đường Nguyễn Trãi, Phường 5, Quận 3")).as_deref(),
            Some("12 nguyen trai p 5 q 3")
        );
    }

    #[test]
    fn test_normalize_address_drops_asides_and_noise() {
        assert_eq!(
            normalize_address(Some("Thôn Đông (gần chợ), Huyện Mê Linh; Village 2")).as_deref(),
            Some("dong me linh 2")
        );
        assert_eq!(
            normalize_address(Some("Khu Công Nghiệp Tân Bình, Street 9")).as_deref(),
            Some("tan binh 9")
        );
    }

    #[test]
    fn test_normalize_address_empty_after_cleaning() {
        assert_eq!(normalize_address(Some("(không rõ)")), None);
        assert_eq!(normalize_address(Some("Street, Ward")), None);
        assert_eq!(normalize_address(None), None);
    }

    #[test]
    fn test_noise_words_match_whole_words_only() {
        assert_eq!(
            normalize_address(Some("Apartment Kho Vang")).as_deref(),
            Some("apartment vang")
        );
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone(Some("+84 (90) 000-0001")).as_deref(),
            Some("84900000001")
        );
        assert_eq!(normalize_phone(Some("n/a")), None);
        assert_eq!(normalize_phone(None), None);
    }
}
