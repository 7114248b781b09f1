use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AppError, Result};

static ISBN_LIKE: OnceLock<Regex> = OnceLock::new();

fn isbn_like() -> &'static Regex {
    ISBN_LIKE.get_or_init(|| {
        // 13-digit form first so a 978/979 prefix is not read as an ISBN-10
        Regex::new(r"\b(?:97[89](?:[- ]?\d){10}|\d(?:[- ]?\d){8}[- ]?[\dXx])\b")
            .expect("ISBN pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsbnKind {
    Isbn10,
    Isbn13,
}

/// A checksum-validated ISBN stored in canonical form: digits only, with an
/// uppercase `X` allowed as the last character of an ISBN-10.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Isbn {
    canonical: String,
}

impl Isbn {
    pub fn parse(input: &str) -> Result<Self> {
        let canonical: String = input
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let valid = match canonical.len() {
            10 => is_valid_isbn10(&canonical),
            13 => is_valid_isbn13(&canonical),
            _ => false,
        };

        if valid {
            Ok(Self { canonical })
        } else {
            Err(AppError::InvalidIsbn(input.to_string()))
        }
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn kind(&self) -> IsbnKind {
        if self.canonical.len() == 10 {
            IsbnKind::Isbn10
        } else {
            IsbnKind::Isbn13
        }
    }

    pub fn to_isbn13(&self) -> Isbn {
        match self.kind() {
            IsbnKind::Isbn13 => self.clone(),
            IsbnKind::Isbn10 => {
                let mut canonical = format!("978{}", &self.canonical[..9]);
                let check = isbn13_check_digit(&canonical);
                canonical.push(char::from(b'0' + check));
                Isbn { canonical }
            }
        }
    }

    /// The ISBN-10 form, which only exists for 978-prefixed ISBN-13s.
    pub fn to_isbn10(&self) -> Option<Isbn> {
        match self.kind() {
            IsbnKind::Isbn10 => Some(self.clone()),
            IsbnKind::Isbn13 if self.canonical.starts_with("978") => {
                let mut canonical = self.canonical[3..12].to_string();
                canonical.push(isbn10_check_digit(&canonical));
                Some(Isbn { canonical })
            }
            IsbnKind::Isbn13 => None,
        }
    }

    /// Every notation this book may be stored under, ISBN-13 first.
    pub fn forms(&self) -> Vec<Isbn> {
        let mut forms = vec![self.to_isbn13()];
        forms.extend(self.to_isbn10());
        forms
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for Isbn {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Isbn::parse(s)
    }
}

/// First valid ISBN in `text`, if any.
pub fn find_isbn(text: &str) -> Option<Isbn> {
    isbn_like()
        .find_iter(text)
        .find_map(|m| Isbn::parse(m.as_str()).ok())
}

/// Every valid ISBN in `text`, in order of first appearance.
pub fn find_isbns(text: &str) -> Vec<Isbn> {
    let mut found: Vec<Isbn> = Vec::new();
    for isbn in isbn_like()
        .find_iter(text)
        .filter_map(|m| Isbn::parse(m.as_str()).ok())
    {
        if !found.contains(&isbn) {
            found.push(isbn);
        }
    }
    found
}

fn digit(c: u8) -> Option<u32> {
    (c as char).to_digit(10)
}

fn is_valid_isbn10(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut sum = 0;
    for (i, &c) in bytes.iter().enumerate() {
        let value = match (digit(c), i) {
            (Some(d), _) => d,
            (None, 9) if c == b'X' => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn is_valid_isbn13(s: &str) -> bool {
    if !(s.starts_with("978") || s.starts_with("979")) {
        return false;
    }
    if !s.bytes().all(|c| c.is_ascii_digit()) {
        return false;
    }
    isbn13_check_digit(&s[..12]) == s.as_bytes()[12] - b'0'
}

/// Check character for the first nine digits of an ISBN-10.
fn isbn10_check_digit(first_nine: &str) -> char {
    let sum: u32 = first_nine
        .bytes()
        .enumerate()
        .filter_map(|(i, c)| digit(c).map(|d| d * (10 - i as u32)))
        .sum();
    match (11 - sum % 11) % 11 {
        10 => 'X',
        check => char::from(b'0' + check as u8),
    }
}

/// Check digit for the first twelve digits of an ISBN-13.
fn isbn13_check_digit(first_twelve: &str) -> u8 {
    let sum: u32 = first_twelve
        .bytes()
        .enumerate()
        .filter_map(|(i, c)| digit(c).map(|d| if i % 2 == 0 { d } else { d * 3 }))
        .sum();
    ((10 - sum % 10) % 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_isbns_in_any_notation() {
        for input in ["9780226550275", "978-0-226-55027-5", "0-306-40615-2", "0 8044 2957 x"] {
            assert!(Isbn::parse(input).is_ok(), "{input}");
        }
        assert_eq!(Isbn::parse("0-8044-2957-x").unwrap().canonical(), "080442957X");
    }

    #[test]
    fn rejects_bad_checksums_and_lengths() {
        for input in ["9780226550276", "0-306-40615-3", "12345", "97802265502750", "X306406152"] {
            assert!(matches!(Isbn::parse(input), Err(AppError::InvalidIsbn(_))), "{input}");
        }
        // valid checksum, but not a Bookland prefix
        assert!(Isbn::parse("1230000000009").is_err());
    }

    #[test]
    fn converts_isbn10_to_isbn13() {
        let isbn = Isbn::parse("0226550273").unwrap();
        assert_eq!(isbn.kind(), IsbnKind::Isbn10);
        assert_eq!(isbn.to_isbn13().canonical(), "9780226550275");

        let isbn = Isbn::parse("0-306-40615-2").unwrap();
        assert_eq!(isbn.to_isbn13().to_string(), "9780306406157");
    }

    #[test]
    fn both_notations_share_forms() {
        let short = Isbn::parse("0-306-40615-2").unwrap();
        let long = Isbn::parse("978-0-306-40615-7").unwrap();
        assert_eq!(long.to_isbn10(), Some(short.clone()));
        assert_eq!(short.forms(), long.forms());

        let with_x = Isbn::parse("978-0-8044-2957-3").unwrap();
        assert_eq!(with_x.to_isbn10().unwrap().canonical(), "080442957X");

        let prefix_979 = Isbn::parse("9791234567896").unwrap();
        assert!(prefix_979.to_isbn10().is_none());
        assert_eq!(prefix_979.forms().len(), 1);
    }

    #[test]
    fn finds_isbns_in_noisy_text() {
        let text = "Printed in USA\nISBN 978-0-226-55027-5 (paper)\nphone 555 1234";
        assert_eq!(find_isbn(text).unwrap().canonical(), "9780226550275");

        assert!(find_isbn("no numbers worth reading here 12345").is_none());
        assert!(find_isbn("ISBN 978-0-226-55027-6").is_none());
    }

    #[test]
    fn finds_every_distinct_isbn() {
        let text = "0-306-40615-2, then 9780226550275, then 0306406152 again";
        let found: Vec<_> = find_isbns(text).into_iter().map(|i| i.to_string()).collect();
        assert_eq!(found, ["0306406152", "9780226550275"]);
    }
}
