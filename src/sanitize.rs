//! Text hygiene for user-authored content and log output.

/// Masks an email for log lines: `jane@example.com` becomes `j***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***MASKED***".to_string(),
    }
}

/// Removes HTML tags and trims the result. A `<` only opens a tag when followed by a
/// letter, `/` or `!`, so plain comparisons like `2 < 3` survive.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_tag = false;
    while let Some(ch) = chars.next() {
        if in_tag {
            if ch == '>' {
                in_tag = false;
            }
            continue;
        }
        let opens_tag = ch == '<'
            && chars
                .peek()
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == '/' || *next == '!');
        if opens_tag {
            in_tag = true;
        } else {
            out.push(ch);
        }
    }
    out.trim().to_string()
}

pub fn strip_tags_opt(input: Option<String>) -> Option<String> {
    input.map(|s| strip_tags(&s))
}

/// Lower-cases and collapses every run of non-alphanumeric characters into a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_email_local_part() {
        assert_eq!(mask_email("jane@example.com"), "j***@example.com");
        assert_eq!(mask_email("not-an-email"), "***MASKED***");
    }

    #[test]
    fn strips_markup() {
        assert_eq!(
            strip_tags("<script>alert(1)</script> Hello <b>world</b> "),
            "alert(1) Hello world"
        );
        assert_eq!(strip_tags("2 < 3"), "2 < 3");
        assert_eq!(strip_tags("<!-- hidden -->text"), "text");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("  Hello, World! AI in 2025 "), "hello-world-ai-in-2025");
        assert_eq!(slugify("---"), "");
    }
}
