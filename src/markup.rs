//! Inline markup rendering.
//!
//! Messages are written in a WhatsApp-style dialect: `*strong*`, `_italic_`
//! and `~strikethrough~`.  [`MarkupFormatter::render`] turns such text into
//! HTML-tagged output that is safe to embed in a document: the input is
//! escaped first, so anything tag-like the user typed stays literal text, and
//! only then are the delimiter pairs converted to `<b>`, `<i>` and `<s>`.

/// An inline style introduced by a single ASCII delimiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Strong,
    Italic,
    Strike,
}

impl Marker {
    const ALL: [Marker; 3] = [Marker::Strong, Marker::Italic, Marker::Strike];

    fn from_delimiter(c: char) -> Option<Self> {
        match c {
            '*' => Some(Marker::Strong),
            '_' => Some(Marker::Italic),
            '~' => Some(Marker::Strike),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn delimiter(self) -> char {
        match self {
            Marker::Strong => '*',
            Marker::Italic => '_',
            Marker::Strike => '~',
        }
    }

    fn open_tag(self) -> &'static str {
        match self {
            Marker::Strong => "<b>",
            Marker::Italic => "<i>",
            Marker::Strike => "<s>",
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            Marker::Strong => "</b>",
            Marker::Italic => "</i>",
            Marker::Strike => "</s>",
        }
    }
}

/// Line-break marker emitted for every newline in the input.
pub const LINE_BREAK: &str = "<br>";

/// Renders the inline markup dialect into tagged, escaped text.
///
/// Rendering is pure and deterministic.  It is not idempotent: feeding
/// rendered output back in escapes the tags it produced.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkupFormatter;

impl MarkupFormatter {
    /// Creates a new formatter.
    pub fn new() -> Self {
        Self
    }

    /// Render `text` for display.
    ///
    /// # Examples
    ///
    /// ```
    /// use palaver::MarkupFormatter;
    ///
    /// let formatter = MarkupFormatter::new();
    /// assert_eq!(formatter.render("*hi* <there>"), "<b>hi</b> &lt;there&gt;");
    /// assert_eq!(formatter.render("*open"), "*open");
    /// ```
    pub fn render(&self, text: &str) -> String {
        let escaped = escape_with_breaks(text);
        apply_markers(&escaped)
    }
}

/// Escape the characters that carry meaning in HTML, including both quote
/// characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#x27;"),
        c => out.push(c),
    }
}

// `&str` is always well-formed UTF-8, so characters outside the basic plane
// (emoji and other pictographs) arrive here whole and are copied through as
// single chars; there are no surrogate halves to repair.
fn escape_with_breaks(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => out.push_str(LINE_BREAK),
            c => push_escaped(&mut out, c),
        }
    }
    out
}

/// Single left-to-right pass with one open/closed toggle per marker.
///
/// When a delimiter occurs an odd number of times its final occurrence has no
/// partner and is emitted literally.  A span that closes right after it
/// opened produces nothing at all.  Markers do not track each other, so
/// overlapping spans such as `*a _b* c_` yield interleaved tags
/// (`<b>a <i>b</b> c</i>`).
fn apply_markers(escaped: &str) -> String {
    let mut totals = [0usize; 3];
    for c in escaped.chars() {
        if let Some(marker) = Marker::from_delimiter(c) {
            totals[marker.index()] += 1;
        }
    }

    let mut seen = [0usize; 3];
    let mut open: [Option<usize>; 3] = [None; 3];
    let mut out = String::with_capacity(escaped.len() + 16);
    for c in escaped.chars() {
        let Some(marker) = Marker::from_delimiter(c) else {
            out.push(c);
            continue;
        };
        let i = marker.index();
        let occurrence = seen[i];
        seen[i] += 1;
        if totals[i] % 2 == 1 && occurrence + 1 == totals[i] {
            out.push(marker.delimiter());
            continue;
        }
        match open[i].take() {
            None => {
                open[i] = Some(out.len());
                out.push_str(marker.open_tag());
            }
            Some(start) if out.len() == start + marker.open_tag().len() => {
                out.truncate(start);
            }
            Some(_) => out.push_str(marker.close_tag()),
        }
    }
    debug_assert!(Marker::ALL.iter().all(|m| open[m.index()].is_none()));
    out
}
