//! Transfer descriptors shared between the connection tasks and their delegates.
//!
//! An inbound transfer is surfaced as a [`TransferMetadata`] when consent is requested.
//! The same ID is used to answer through
//! [`TransferManager::submit_user_consent`](crate::TransferManager::submit_user_consent).

use std::path::PathBuf;

use quickdrop_files::FileKind;
use url::Url;

use crate::error::{Error, Result};
use crate::proto::sharing::{file_metadata, text_metadata};

/// Connection / transfer identifier (a UUID for inbound transfers)
pub type TransferId = String;

/// Kind of a text item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKind {
    /// Plain text
    Text,
    /// URL, opened by the receiver
    Url,
    /// Phone number
    PhoneNumber,
    /// Street address
    Address,
}

impl TextKind {
    pub(crate) fn from_wire(kind: text_metadata::Type) -> Option<Self> {
        match kind {
            text_metadata::Type::Text => Some(Self::Text),
            text_metadata::Type::Url => Some(Self::Url),
            text_metadata::Type::PhoneNumber => Some(Self::PhoneNumber),
            text_metadata::Type::Address => Some(Self::Address),
            text_metadata::Type::Unknown => None,
        }
    }

    pub(crate) fn to_wire(self) -> text_metadata::Type {
        match self {
            Self::Text => text_metadata::Type::Text,
            Self::Url => text_metadata::Type::Url,
            Self::PhoneNumber => text_metadata::Type::PhoneNumber,
            Self::Address => text_metadata::Type::Address,
        }
    }
}

impl std::fmt::Display for TextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Url => write!(f, "URL"),
            Self::PhoneNumber => write!(f, "phone number"),
            Self::Address => write!(f, "address"),
        }
    }
}

pub(crate) fn file_kind_to_wire(kind: FileKind) -> file_metadata::Type {
    match kind {
        FileKind::Unknown => file_metadata::Type::Unknown,
        FileKind::Image => file_metadata::Type::Image,
        FileKind::Video => file_metadata::Type::Video,
        FileKind::App => file_metadata::Type::App,
        FileKind::Audio => file_metadata::Type::Audio,
    }
}

/// A file offered by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Name announced by the sender
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Declared MIME type
    pub mime_type: String,
    /// Where the file will be written if accepted
    pub destination: PathBuf,
}

/// A single text item offered by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInfo {
    /// Title shown before acceptance (host name for URLs)
    pub title: String,
    /// Kind of text
    pub kind: TextKind,
    /// Declared UTF-8 length
    pub size: u64,
}

/// Everything the user needs to decide on an inbound transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    /// Transfer ID to pass back with the decision
    pub id: TransferId,
    /// Offered files; empty for a text transfer
    pub files: Vec<FileInfo>,
    /// Offered text item, if this is a text transfer
    pub text: Option<TextInfo>,
    /// Four-digit PIN from the handshake
    pub pin: String,
}

impl TransferMetadata {
    /// Sum of declared file sizes, or the text length
    #[must_use]
    pub fn total_size(&self) -> u64 {
        match &self.text {
            Some(text) => text.size,
            None => self.files.iter().map(|f| f.size).sum(),
        }
    }

    /// One-line description, e.g. `3 files (1.2 MiB)` or `URL "example.com"`
    #[must_use]
    pub fn describe(&self) -> String {
        if let Some(text) = &self.text {
            return format!("{} \"{}\"", text.kind, text.title);
        }
        match self.files.as_slice() {
            [file] => file.name.clone(),
            files => format!("{} files", files.len()),
        }
    }
}

/// What an outbound transfer sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareTarget {
    /// Local files, in order
    Files(Vec<PathBuf>),
    /// A single URL, sent as a text item
    Url(Url),
}

impl ShareTarget {
    /// Interpret command-line style arguments: a single `http(s)` URL becomes
    /// [`ShareTarget::Url`], anything else a list of files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `args` is empty.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_string()).collect();
        if let [single] = args.as_slice() {
            if let Ok(url) = Url::parse(single) {
                if matches!(url.scheme(), "http" | "https") {
                    return Ok(Self::Url(url));
                }
            }
        }
        if args.is_empty() {
            return Err(Error::protocol("nothing to send"));
        }
        Ok(Self::Files(args.into_iter().map(PathBuf::from).collect()))
    }
}

/// Progress of one incoming file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileProgress {
    /// Payload ID of the file
    pub payload_id: i64,
    /// Bytes received so far
    pub bytes_received: u64,
    /// Declared size
    pub bytes_total: u64,
}

impl FileProgress {
    /// Fraction complete in `0.0..=1.0`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            return 1.0;
        }
        (self.bytes_received as f64 / self.bytes_total as f64).min(1.0)
    }

    /// Whether every declared byte has arrived
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bytes_received >= self.bytes_total
    }
}
