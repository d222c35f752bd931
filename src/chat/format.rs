//! Turning raw message text into safe, display-ready markup.
//!
//! User text is only ever escaped. Assistant text is escaped first, then a
//! small markdown subset is applied, then bare URLs are linked. Escaping has to
//! come first so angle brackets inside a reply can never become markup, and
//! linking has to come last so the markdown passes never touch a URL.

use regex::Regex;

/// Escape every markup-significant character.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formatter for assistant replies.
pub struct MessageFormatter {
    bold: Regex,
    italic: Regex,
    code: Regex,
    url: Regex,
}

impl MessageFormatter {
    /// Compile the formatting patterns.
    ///
    /// # Errors
    /// Returns an error if any regex pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bold: Regex::new(r"\*\*(.*?)\*\*")?,
            italic: Regex::new(r"\*(.*?)\*")?,
            code: Regex::new(r"`(.*?)`")?,
            // Entities other than `&amp;` end a URL, so `&lt;` or `&quot;`
            // right after a link stays outside the href.
            url: Regex::new(r#"(?i)https?://[^\s<>"'&]+(?:&amp;[^\s<>"'&]+)*"#)?,
        })
    }

    /// Escape user-authored text.
    #[must_use]
    pub fn format_user_text(&self, text: &str) -> String {
        escape(text)
    }

    /// Escape, apply bold/italic/code/line breaks, then autolink.
    #[must_use]
    pub fn format_assistant_text(&self, text: &str) -> String {
        let escaped = escape(text);
        let bolded = self.bold.replace_all(&escaped, "<strong>${1}</strong>");
        let italicized = self.italic.replace_all(&bolded, "<em>${1}</em>");
        let coded = self.code.replace_all(&italicized, "<code>${1}</code>");
        let broken = coded.replace('\n', "<br>");
        self.url
            .replace_all(
                &broken,
                r#"<a href="${0}" target="_blank" rel="noopener noreferrer">${0}</a>"#,
            )
            .into_owned()
    }
}
