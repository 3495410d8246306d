//! Attachment ingestion.
//!
//! Turning a document into text is delegated to a [`Converter`].  The bundled
//! [`TextFileConverter`] handles plain-text formats and rejects document and
//! image formats it cannot read; richer converters can be plugged into the
//! session in its place.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::ConversionError;

/// Number of characters shown in an attachment preview.
pub const PREVIEW_CHARS: usize = 500;

const PREVIEW_NOTICE: &str = "...\n[Preview limited to first 500 characters]";

/// Converts a file on disk into text suitable for a chat message.
pub trait Converter: Send + Sync {
    /// Returns the text content of the file at `path`.
    fn convert(&self, path: &Path) -> Result<String, ConversionError>;
}

impl<F> Converter for F
where
    F: Fn(&Path) -> Result<String, ConversionError> + Send + Sync,
{
    fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        self(path)
    }
}

/// Coarse file classification derived from the extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    /// Readable as UTF-8 text.
    Text,
    /// PDF document.
    Pdf,
    /// Word-processor document.
    Document,
    /// Slide deck.
    Presentation,
    /// Spreadsheet.
    Spreadsheet,
    /// EPUB book.
    Epub,
    /// Raster image.
    Image,
}

impl FileType {
    /// Classifies `path` by extension.  Files without an extension are
    /// treated as text; unknown extensions return `None`.
    pub fn detect(path: &Path) -> Option<Self> {
        let Some(ext) = path.extension() else {
            return Some(FileType::Text);
        };
        let ext = ext.to_string_lossy().to_ascii_lowercase();
        let file_type = match ext.as_str() {
            "txt" | "log" | "csv" | "tsv" | "md" | "markdown" | "rst" | "json" | "yaml"
            | "yml" | "toml" | "ini" | "cfg" | "xml" | "html" | "htm" | "rs" | "py" | "js"
            | "ts" | "c" | "h" | "cpp" | "hpp" | "go" | "java" | "sh" | "sql" => FileType::Text,
            "pdf" => FileType::Pdf,
            "doc" | "docx" | "odt" | "rtf" => FileType::Document,
            "ppt" | "pptx" | "odp" => FileType::Presentation,
            "xls" | "xlsx" | "ods" => FileType::Spreadsheet,
            "epub" => FileType::Epub,
            "jpg" | "jpeg" | "png" | "gif" | "tiff" | "bmp" | "webp" => FileType::Image,
            _ => return None,
        };
        Some(file_type)
    }

    fn mime_type(self) -> &'static str {
        match self {
            FileType::Text => "text/plain",
            FileType::Pdf => "application/pdf",
            FileType::Document => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            FileType::Presentation => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            FileType::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            FileType::Epub => "application/epub+zip",
            FileType::Image => "image/*",
        }
    }
}

/// Reads plain-text files as UTF-8.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextFileConverter;

impl Converter for TextFileConverter {
    fn convert(&self, path: &Path) -> Result<String, ConversionError> {
        let display = path.display().to_string();
        match FileType::detect(path) {
            Some(FileType::Text) => {}
            Some(other) => return Err(ConversionError::unsupported(display, other.mime_type())),
            None => return Err(ConversionError::unsupported(display, "unknown")),
        }
        let bytes = fs::read(path).map_err(|err| ConversionError::unreadable(&display, err))?;
        String::from_utf8(bytes).map_err(|err| {
            ConversionError::unreadable(
                &display,
                io::Error::new(io::ErrorKind::InvalidData, err.utf8_error()),
            )
        })
    }
}

/// Converted file text waiting to be folded into the next message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    full_text: String,
    preview: String,
}

impl Attachment {
    /// Creates an attachment.  Only the final component of `filename` is kept.
    pub fn new(filename: impl AsRef<Path>, full_text: impl Into<String>) -> Self {
        let filename = filename
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.as_ref().display().to_string());
        let full_text = full_text.into();
        let preview = preview_of(&full_text);
        Self {
            filename,
            full_text,
            preview,
        }
    }

    /// Base name of the attached file.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The complete converted text.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Bounded prefix of the text, for display only.
    pub fn preview(&self) -> &str {
        &self.preview
    }

    /// The delimited block appended to the user's text when the attachment is sent.
    pub fn folded_block(&self) -> String {
        format!("\n\n[Attached File: {}]\n{}", self.filename, self.full_text)
    }
}

fn preview_of(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{PREVIEW_NOTICE}", &text[..cut]),
        None => text.to_string(),
    }
}
