// Publish-time checks for a listing draft.

use serde::Serialize;

use super::state::ListingForm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    BasicInfo,
    Contact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

/// Field errors for one wizard section; the client scrolls to `section`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub section: Section,
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn summary(&self) -> &'static str {
        match self.section {
            Section::BasicInfo => "Please ensure all required fields are filled, including the listing title.",
            Section::Contact => "Please fix the errors in your contact information before publishing.",
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.summary())
    }
}

/// `local@domain.tld`: no whitespace, a single '@', and a dot inside the domain.
pub fn validate_email(email: &str) -> Option<&'static str> {
    if email.is_empty() {
        return Some("Email is required.");
    }
    let valid = !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain
                        .char_indices()
                        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
            }
            None => false,
        };
    if valid { None } else { Some("Please enter a valid email address.") }
}

#[derive(Clone, Copy)]
enum PhonePart {
    Optional(char),
    Separator,
    Digits(usize, usize),
}

// [+][(]ddd[)][-. ]ddd[-. ]dddd..dddddddd
const PHONE_PATTERN: [PhonePart; 8] = [
    PhonePart::Optional('+'),
    PhonePart::Optional('('),
    PhonePart::Digits(3, 3),
    PhonePart::Optional(')'),
    PhonePart::Separator,
    PhonePart::Digits(3, 3),
    PhonePart::Separator,
    PhonePart::Digits(4, 8),
];

fn phone_matches(parts: &[PhonePart], input: &[char]) -> bool {
    let Some((part, rest)) = parts.split_first() else {
        return input.is_empty();
    };
    match *part {
        PhonePart::Optional(expected) => {
            (input.first() == Some(&expected) && phone_matches(rest, &input[1..])) || phone_matches(rest, input)
        }
        PhonePart::Separator => {
            let is_separator = |c: &char| *c == '-' || *c == '.' || c.is_whitespace();
            (input.first().is_some_and(is_separator) && phone_matches(rest, &input[1..]))
                || phone_matches(rest, input)
        }
        PhonePart::Digits(min, max) => {
            let available = input.iter().take_while(|c| c.is_ascii_digit()).count().min(max);
            (min..=available).rev().any(|n| phone_matches(rest, &input[n..]))
        }
    }
}

pub fn validate_phone(phone: &str) -> Option<&'static str> {
    if phone.is_empty() {
        return Some("Phone number is required.");
    }
    let chars: Vec<char> = phone.chars().collect();
    if phone_matches(&PHONE_PATTERN, &chars) {
        None
    } else {
        Some("Please enter a valid phone number format.")
    }
}

/// Title first, then contact details. Only the first failing section is reported.
pub fn validate_for_publish(form: &ListingForm) -> Result<(), ValidationErrors> {
    if form.title.trim().is_empty() {
        return Err(ValidationErrors {
            section: Section::BasicInfo,
            fields: vec![FieldError {
                field: "title",
                message: "Listing title is required.",
            }],
        });
    }

    let mut fields = Vec::new();
    if let Some(message) = validate_email(&form.contact_info.email) {
        fields.push(FieldError { field: "email", message });
    }
    if let Some(message) = validate_phone(&form.contact_info.phone) {
        fields.push(FieldError { field: "phone", message });
    }
    if fields.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors {
            section: Section::Contact,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert_eq!(validate_email(""), Some("Email is required."));
        assert_eq!(validate_email("seller@example.com"), None);
        assert_eq!(validate_email("a.b+c@mail.co.uk"), None);
        assert!(validate_email("seller@example").is_some());
        assert!(validate_email("seller@.com").is_some());
        assert!(validate_email("sel ler@example.com").is_some());
        assert!(validate_email("a@b@c.com").is_some());
        assert!(validate_email("@example.com").is_some());
    }

    #[test]
    fn phones() {
        for ok in ["5125550142", "512-555-0142", "(512) 555-0142", "+1235550142", "512.555.01423456"] {
            assert_eq!(validate_phone(ok), None, "{ok} should be accepted");
        }
        for bad in ["", "555-0142", "512-555-01", "512-555-014234567", "call me", "512--555-0142"] {
            assert!(validate_phone(bad).is_some(), "{bad} should be rejected");
        }
    }

    #[test]
    fn title_is_checked_before_contact() {
        let mut form = ListingForm::default();
        let errors = validate_for_publish(&form).unwrap_err();
        assert_eq!(errors.section, Section::BasicInfo);

        form.title = "2019 Honda Civic EX".into();
        form.contact_info.email = "nope".into();
        let errors = validate_for_publish(&form).unwrap_err();
        assert_eq!(errors.section, Section::Contact);
        let fields: Vec<&str> = errors.fields.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["email", "phone"]);

        form.contact_info.email = "seller@example.com".into();
        form.contact_info.phone = "512-555-0142".into();
        assert!(validate_for_publish(&form).is_ok());
    }
}
