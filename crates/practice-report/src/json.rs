//! JSON output for practice sessions.
//!
//! [`JsonGenerator`] serializes a [`SessionRecord`] as compact single-line
//! JSON or pretty-printed for human readability.
//!
//! # Example
//!
//! ```rust
//! use practice_report::SessionRecord;
//! use practice_report::json::JsonGenerator;
//!
//! let record = SessionRecord::builder().course("ap-statistics").build().unwrap();
//! let generator = JsonGenerator::new(&record);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//!
//! // generator.write_to_file(std::path::Path::new("session.json"), true).unwrap();
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ReportError, Result, SessionRecord};

/// JSON session generator.
pub struct JsonGenerator<'a> {
    record: &'a SessionRecord,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given record.
    #[must_use]
    pub const fn new(record: &'a SessionRecord) -> Self {
        Self { record }
    }

    /// Generates compact JSON output (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.record).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.record).map_err(ReportError::from)
    }

    /// Writes the JSON record to a file, creating or overwriting it.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}
