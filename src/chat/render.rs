//! Output rendering for the chat application.
//!
//! Messages arrive as the tagged output of the markup formatter.  The plain
//! text renderer turns the tags into ANSI styles, or drops them when color is
//! disabled, and decodes the escaped characters back to text.

use std::io::{self, Stdout, Write};

use crate::convert::Attachment;
use crate::session::RenderedMessage;
use crate::transcript::Sender;

/// ANSI escape code for bold text.
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for timestamps and previews).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text.
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code for strikethrough text.
const ANSI_STRIKE: &str = "\x1b[9m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for assistant labels).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for user labels).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

const TAGS: &[(&str, &str)] = &[
    ("<b>", ANSI_BOLD),
    ("</b>", "\x1b[22m"),
    ("<i>", ANSI_ITALIC),
    ("</i>", "\x1b[23m"),
    ("<s>", ANSI_STRIKE),
    ("</s>", "\x1b[29m"),
    ("<br>", "\n"),
];

const ENTITIES: &[(&str, char)] = &[
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&#x27;", '\''),
];

/// Converts formatter output to terminal text.
///
/// Style tags become ANSI escapes when `use_color` is set and are dropped
/// otherwise; line breaks become newlines either way.
pub fn to_terminal(html: &str, use_color: bool) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    'scan: while let Some(c) = rest.chars().next() {
        match c {
            '<' => {
                for (tag, ansi) in TAGS {
                    if let Some(tail) = rest.strip_prefix(tag) {
                        if use_color || *tag == "<br>" {
                            out.push_str(ansi);
                        }
                        rest = tail;
                        continue 'scan;
                    }
                }
            }
            '&' => {
                for (entity, decoded) in ENTITIES {
                    if let Some(tail) = rest.strip_prefix(entity) {
                        out.push(*decoded);
                        rest = tail;
                        continue 'scan;
                    }
                }
            }
            _ => {}
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Print a transcript entry.
    fn print_message(&mut self, rendered: &RenderedMessage);

    /// Print the preview of a freshly attached file.
    fn print_attachment(&mut self, attachment: &Attachment);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print a non-fatal warning.
    fn print_warning(&mut self, warning: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the user cancels a pending reply.
    fn print_interrupted(&mut self);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Returns true if ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// The header line for a message, e.g. `2024-05-01 12:00:00 AI:`.
    pub fn header(&self, rendered: &RenderedMessage) -> String {
        let message = &rendered.message;
        let label = message.sender().to_string();
        if !self.use_color {
            return format!("{} {}:", message.timestamp(), label);
        }
        let color = if message.is_error() {
            ANSI_RED
        } else {
            match message.sender() {
                Sender::User => ANSI_GREEN,
                Sender::Assistant => ANSI_CYAN,
                Sender::System => ANSI_YELLOW,
            }
        };
        format!(
            "{ANSI_DIM}{}{ANSI_RESET} {color}{ANSI_BOLD}{label}:{ANSI_RESET}",
            message.timestamp()
        )
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_message(&mut self, rendered: &RenderedMessage) {
        let header = self.header(rendered);
        let body = to_terminal(&rendered.html, self.use_color);
        if self.use_color {
            println!("{header}\n{body}{ANSI_RESET}\n");
        } else {
            println!("{header}\n{body}\n");
        }
        self.flush();
    }

    fn print_attachment(&mut self, attachment: &Attachment) {
        if self.use_color {
            println!(
                "{ANSI_BOLD}[Attached File: {}]{ANSI_RESET}\n{ANSI_DIM}{}{ANSI_RESET}\n",
                attachment.filename(),
                attachment.preview()
            );
        } else {
            println!(
                "[Attached File: {}]\n{}\n",
                attachment.filename(),
                attachment.preview()
            );
        }
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_warning(&mut self, warning: &str) {
        if self.use_color {
            eprintln!("{ANSI_YELLOW}Warning: {warning}{ANSI_RESET}");
        } else {
            eprintln!("Warning: {warning}");
        }
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
        self.flush();
    }

    fn print_interrupted(&mut self) {
        if self.use_color {
            println!("{ANSI_DIM}[reply cancelled]{ANSI_RESET}");
        } else {
            println!("[reply cancelled]");
        }
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::MarkupFormatter;
    use crate::transcript::Message;

    fn rendered(message: Message) -> RenderedMessage {
        let html = MarkupFormatter::new().render(message.content());
        RenderedMessage { message, html }
    }

    #[test]
    fn renderer_default_has_color() {
        assert!(PlainTextRenderer::default().use_color());
    }

    #[test]
    fn renderer_without_color() {
        assert!(!PlainTextRenderer::with_color(false).use_color());
    }

    #[test]
    fn plain_output_drops_tags_and_decodes_entities() {
        let html = MarkupFormatter::new().render("*a* & _b_<br>~c~\n'd' \"e\"");
        assert_eq!(to_terminal(&html, false), "a & b<br>c\n'd' \"e\"");
    }

    #[test]
    fn colored_output_maps_tags_to_ansi() {
        assert_eq!(
            to_terminal("<b>x</b> <i>y</i> <s>z</s>", true),
            "\x1b[1mx\x1b[22m \x1b[3my\x1b[23m \x1b[9mz\x1b[29m"
        );
        assert_eq!(to_terminal("a<br>b", true), "a\nb");
    }

    #[test]
    fn unknown_sequences_pass_through() {
        assert_eq!(to_terminal("<p>&nbsp;", false), "<p>&nbsp;");
        assert_eq!(to_terminal("caf\u{e9} \u{1f600}", true), "caf\u{e9} \u{1f600}");
    }

    #[test]
    fn header_uses_sender_label() {
        let plain = PlainTextRenderer::with_color(false);
        let user = rendered(Message::new(Sender::User, "hi", "2024-05-01 12:00:00"));
        assert_eq!(plain.header(&user), "2024-05-01 12:00:00 You:");

        let failed = rendered(Message::assistant_error("boom"));
        assert!(plain.header(&failed).ends_with(" AI:"));

        let colored = PlainTextRenderer::with_color(true);
        assert!(colored.header(&failed).contains(ANSI_RED));
        assert!(colored.header(&user).contains(ANSI_GREEN));
    }
}
