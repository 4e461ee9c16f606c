//! Validated value types shared across the flatshop crates.
//!
//! Values in this crate are checked once at construction and can be passed around afterwards
//! without re-validating:
//! - [`NonEmptyText`] for required free-text fields (names, emails, address lines)
//! - [`Cpf`] for the 11-digit Brazilian national identifier used as the user key
//!
//! [`digits_only`] is the normalisation applied to every externally supplied CPF and postal
//! code before it is validated or stored.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input is not a valid CPF
    #[error("invalid CPF: {0}")]
    InvalidCpf(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Strips every non-digit character from `input`.
///
/// `"529.982.247-25"` becomes `"52998224725"`, `"01310-100"` becomes `"01310100"`.
pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Number of digits in a CPF.
pub const CPF_LEN: usize = 11;

/// A CPF whose length and both check digits have been verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cpf(String);

impl Cpf {
    /// Parses an already-normalised CPF (digits only).
    ///
    /// # Errors
    ///
    /// Returns `TextError::InvalidCpf` if [`Cpf::is_valid`] rejects the input.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        if Self::is_valid(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(TextError::InvalidCpf(input.to_owned()))
    }

    /// Returns true if `input` is an 11-digit CPF with matching check digits.
    ///
    /// The ten strings made of a single repeated digit pass the checksum but are never issued,
    /// so they are rejected explicitly.
    pub fn is_valid(input: &str) -> bool {
        if input.len() != CPF_LEN || !input.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let digits: Vec<u32> = input.bytes().map(|b| u32::from(b - b'0')).collect();
        if digits.iter().all(|&d| d == digits[0]) {
            return false;
        }

        check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Weighted-sum mod 11 check digit over `prefix`.
///
/// Weights run from `prefix.len() + 1` down to 2. A result of 10 or 11 maps to 0.
fn check_digit(prefix: &[u32]) -> u32 {
    let top_weight = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (top_weight - i as u32))
        .sum();
    let rev = 11 - sum % 11;
    if rev >= 10 {
        0
    } else {
        rev
    }
}

impl std::fmt::Display for Cpf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims() {
        let text = NonEmptyText::new("  Ana  ").unwrap();
        assert_eq!(text.into_inner(), "Ana");
    }

    #[test]
    fn test_non_empty_text_rejects_blank() {
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
        assert_eq!(NonEmptyText::new(""), Err(TextError::Empty));
    }

    #[test]
    fn test_digits_only() {
        assert_eq!(digits_only("529.982.247-25"), "52998224725");
        assert_eq!(digits_only("01310-100"), "01310100");
        assert_eq!(digits_only("abc"), "");
    }

    #[test]
    fn test_cpf_accepts_valid_numbers() {
        assert!(Cpf::is_valid("52998224725"));
        assert!(Cpf::is_valid("11144477735"));
        assert_eq!(Cpf::parse("52998224725").unwrap().as_str(), "52998224725");
    }

    #[test]
    fn test_cpf_rejects_wrong_check_digits() {
        assert!(!Cpf::is_valid("52998224724"));
        assert!(!Cpf::is_valid("52998224715"));
        assert!(!Cpf::is_valid("11144477736"));
    }

    #[test]
    fn test_cpf_rejects_repeated_digits() {
        for d in 0..=9 {
            let repeated = d.to_string().repeat(CPF_LEN);
            assert!(!Cpf::is_valid(&repeated), "{repeated} should be rejected");
        }
    }

    #[test]
    fn test_cpf_rejects_bad_length_and_characters() {
        assert!(!Cpf::is_valid(""));
        assert!(!Cpf::is_valid("5299822472"));
        assert!(!Cpf::is_valid("529982247250"));
        assert!(!Cpf::is_valid("529.982.247"));
        assert!(matches!(
            Cpf::parse("123"),
            Err(TextError::InvalidCpf(s)) if s == "123"
        ));
    }

    #[test]
    fn test_check_digit_maps_ten_and_eleven_to_zero() {
        // 9 zeros then a 1: sum is 2, so 11 - 2 = 9
        assert_eq!(check_digit(&[0, 0, 0, 0, 0, 0, 0, 0, 1]), 9);
        // sum % 11 == 0 gives 11, which maps to 0
        assert_eq!(check_digit(&[0; 9]), 0);
        // sum % 11 == 1 gives 10, which maps to 0 (weight 2 on the last digit, 6*2 = 12)
        assert_eq!(check_digit(&[0, 0, 0, 0, 0, 0, 0, 0, 6]), 0);
    }
}
