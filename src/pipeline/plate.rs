//! License-plate text normalization.
//!
//! OCR output arrives either as two newline-separated lines or as one
//! unsegmented string. Both are cleaned, reformatted into the two-line
//! plate layout, and checked against the known line formats; only a plate
//! whose both lines match is classified `Certain`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateStatus {
    Certain,
    NeedsVerification,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    pub line1: String,
    pub line2: String,
    pub status: PlateStatus,
}

impl PlateReading {
    /// Two-line reading joined the way the violation backend expects it.
    pub fn formatted(&self) -> String {
        format!("{} {}", self.line1, self.line2)
    }
}

/// Strip everything but letters, digits, `-` and `.`, mapping the common
/// OCR confusions onto the separators they stand for.
fn clean_component(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            ':' | '@' => Some('-'),
            ';' | ',' | '#' => Some('.'),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => {
                Some(c.to_ascii_uppercase())
            }
            _ => None,
        })
        .collect()
}

/// First line: `DD-LD` / `DD-LL` with the dash restored when the OCR
/// dropped it, or a bare two-digit prefix.
fn format_line1(cleaned: &str) -> String {
    if cleaned.contains('-') {
        return cleaned.to_string();
    }
    let chars: Vec<char> = cleaned.chars().collect();
    if chars.len() == 4
        && chars[0].is_ascii_digit()
        && chars[1].is_ascii_digit()
        && chars[2].is_ascii_alphabetic()
        && chars[3].is_ascii_alphanumeric()
    {
        return format!("{}-{}", &cleaned[..2], &cleaned[2..]);
    }
    cleaned.to_string()
}

/// Second line: restore the `.` in five-digit serials and the `-` in
/// digit-letter serials; four-digit serials stay as they are.
fn format_line2(cleaned: &str) -> String {
    let mut out = if cleaned.contains('.') || cleaned.contains('-') {
        cleaned.to_string()
    } else {
        let chars: Vec<char> = cleaned.chars().collect();
        if chars.len() == 5 && chars.iter().all(|c| c.is_ascii_digit()) {
            format!("{}.{}", &cleaned[..3], &cleaned[3..])
        } else if chars.len() == 5
            && chars[..3].iter().all(|c| c.is_ascii_digit())
            && chars[3..].iter().all(|c| c.is_ascii_alphabetic())
        {
            format!("{}-{}", &cleaned[..3], &cleaned[3..])
        } else {
            cleaned.to_string()
        }
    };

    if out.len() == 5 && out.chars().all(|c| c.is_ascii_digit()) {
        out = format!("{}.{}", &out[..3], &out[3..]);
    }
    out
}

fn line1_valid(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    match chars.as_slice() {
        [a, b] => a.is_ascii_digit() && b.is_ascii_digit(),
        [a, b, '-', c, d] => {
            a.is_ascii_digit()
                && b.is_ascii_digit()
                && c.is_ascii_alphabetic()
                && (d.is_ascii_digit() || d.is_ascii_alphabetic())
        }
        _ => false,
    }
}

fn line2_valid(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    match chars.as_slice() {
        [a, b, c, d] => [a, b, c, d].iter().all(|ch| ch.is_ascii_digit()),
        [a, b, c, '.', d, e] => [a, b, c, d, e].iter().all(|ch| ch.is_ascii_digit()),
        [a, b, c, '-', d, e] => {
            [a, b, c].iter().all(|ch| ch.is_ascii_digit())
                && d.is_ascii_alphabetic()
                && e.is_ascii_alphabetic()
        }
        _ => false,
    }
}

/// Normalize an OCR reading into a two-line plate and classify it.
pub fn validate(raw: &str) -> PlateReading {
    if let Some((first, rest)) = raw.split_once('\n') {
        let line1 = format_line1(&clean_component(first));
        let line2 = format_line2(&clean_component(rest));
        let status = if line1_valid(&line1) && line2_valid(&line2) {
            PlateStatus::Certain
        } else {
            PlateStatus::NeedsVerification
        };
        return PlateReading { line1, line2, status };
    }

    let cleaned = clean_component(raw);
    if cleaned.len() >= 6 {
        // The OCR sometimes merges both lines; probe the plausible split
        // points and take the first that yields two valid lines.
        for split in 3..6 {
            let line1 = format_line1(&cleaned[..split]);
            let line2 = format_line2(&cleaned[split..]);
            if line1_valid(&line1) && line2_valid(&line2) {
                return PlateReading {
                    line1,
                    line2,
                    status: PlateStatus::Certain,
                };
            }
        }
    }

    PlateReading {
        line1: format_line1(&cleaned),
        line2: String::new(),
        status: PlateStatus::NeedsVerification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_two_line_plate_is_certain() {
        let reading = validate("77-L1\n270.62");
        assert_eq!(reading.line1, "77-L1");
        assert_eq!(reading.line2, "270.62");
        assert_eq!(reading.status, PlateStatus::Certain);
        assert_eq!(reading.formatted(), "77-L1 270.62");
    }

    #[test]
    fn separators_are_restored() {
        let reading = validate("77L1\n27062");
        assert_eq!(reading.line1, "77-L1");
        assert_eq!(reading.line2, "270.62");
        assert_eq!(reading.status, PlateStatus::Certain);
    }

    #[test]
    fn ocr_confusions_map_to_separators() {
        let reading = validate("77:L1\n270;62");
        assert_eq!(reading.line1, "77-L1");
        assert_eq!(reading.line2, "270.62");
        assert_eq!(reading.status, PlateStatus::Certain);
    }

    #[test]
    fn garbage_needs_verification() {
        let reading = validate("??\n??");
        assert_eq!(reading.status, PlateStatus::NeedsVerification);
        assert!(reading.line1.is_empty());
        assert!(reading.line2.is_empty());
    }

    #[test]
    fn unsegmented_text_splits_on_first_valid_point() {
        let reading = validate("77L1270.62");
        assert_eq!(reading.line1, "77-L1");
        assert_eq!(reading.line2, "270.62");
        assert_eq!(reading.status, PlateStatus::Certain);
    }

    #[test]
    fn unsegmented_digits_reformat_both_lines() {
        let reading = validate("77L127062");
        assert_eq!(reading.line1, "77-L1");
        assert_eq!(reading.line2, "270.62");
        assert_eq!(reading.status, PlateStatus::Certain);
    }

    #[test]
    fn unsplittable_text_needs_verification() {
        let reading = validate("9Z9Z9Z9Z");
        assert_eq!(reading.status, PlateStatus::NeedsVerification);
    }

    #[test]
    fn short_single_line_needs_verification() {
        let reading = validate("77");
        assert_eq!(reading.status, PlateStatus::NeedsVerification);
        assert_eq!(reading.line1, "77");
    }

    #[test]
    fn lowercase_input_is_uppercased() {
        let reading = validate("77l1\n270.62");
        assert_eq!(reading.line1, "77-L1");
        assert_eq!(reading.status, PlateStatus::Certain);
    }

    #[test]
    fn digit_letter_serial_gets_dash() {
        let reading = validate("77-L1\n123AB");
        assert_eq!(reading.line2, "123-AB");
        assert_eq!(reading.status, PlateStatus::Certain);
    }

    #[test]
    fn four_digit_serial_unchanged() {
        let reading = validate("77-L1\n1234");
        assert_eq!(reading.line2, "1234");
        assert_eq!(reading.status, PlateStatus::Certain);
    }
}
