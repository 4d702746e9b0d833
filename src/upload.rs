//! Staging and gating of the two artifacts every participant must upload
//! before committing: the bank statement and the signed commitment letter.

use anyhow::{Context, Result};
use std::path::Path;
use veil_common::Role;

use crate::errors::ValidationError;

/// 10 MiB per file.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// `image/jpg` is not a registered type but some tools still emit it.
pub const ACCEPTED_MIME_TYPES: &[&str] =
    &["application/pdf", "image/png", "image/jpeg", "image/jpg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactSlot {
    BankStatement,
    CommitmentLetter,
}

impl ArtifactSlot {
    /// Multipart field name expected by the relay.
    pub fn form_field(&self) -> &'static str {
        match self {
            ArtifactSlot::BankStatement => "bank_statement",
            ArtifactSlot::CommitmentLetter => "commitment_letter",
        }
    }
}

impl std::fmt::Display for ArtifactSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactSlot::BankStatement => write!(f, "bank statement"),
            ArtifactSlot::CommitmentLetter => write!(f, "commitment letter"),
        }
    }
}

/// A file held in memory until upload.
#[derive(Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl StagedFile {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(file_name, mime, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    None,
    Staged,
    Uploaded,
}

/// Everything the relay needs for one upload call.
#[derive(Debug, Clone)]
pub struct ArtifactUpload {
    pub session_id: String,
    pub role: Role,
    pub bank_statement: StagedFile,
    pub commitment_letter: StagedFile,
}

/// Holds at most one staged file per slot and tracks whether the pair has
/// been acknowledged by the relay.
#[derive(Debug)]
pub struct UploadGate {
    bank_statement: Option<StagedFile>,
    commitment_letter: Option<StagedFile>,
    uploaded: bool,
    max_bytes: u64,
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_BYTES)
    }
}

impl UploadGate {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            bank_statement: None,
            commitment_letter: None,
            uploaded: false,
            max_bytes,
        }
    }

    pub fn validate(&self, file: &StagedFile) -> Result<(), ValidationError> {
        if file.size() > self.max_bytes {
            return Err(ValidationError::FileTooLarge {
                size: file.size(),
                max: self.max_bytes,
            });
        }
        let mime = file.mime.to_lowercase();
        if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(ValidationError::UnsupportedFileType {
                mime: file.mime.clone(),
            });
        }
        Ok(())
    }

    /// Stage `file` into `slot`. A rejected file leaves the slot as it was.
    ///
    /// Replacing a file after a successful upload drops back to `Staged` so
    /// the new pair is sent before the next commit.
    pub fn stage(&mut self, slot: ArtifactSlot, file: StagedFile) -> Result<(), ValidationError> {
        self.validate(&file)?;
        let target = match slot {
            ArtifactSlot::BankStatement => &mut self.bank_statement,
            ArtifactSlot::CommitmentLetter => &mut self.commitment_letter,
        };
        *target = Some(file);
        self.uploaded = false;
        Ok(())
    }

    pub fn staged(&self, slot: ArtifactSlot) -> Option<&StagedFile> {
        match slot {
            ArtifactSlot::BankStatement => self.bank_statement.as_ref(),
            ArtifactSlot::CommitmentLetter => self.commitment_letter.as_ref(),
        }
    }

    pub fn state(&self) -> UploadState {
        if self.uploaded {
            UploadState::Uploaded
        } else if self.bank_statement.is_some() && self.commitment_letter.is_some() {
            UploadState::Staged
        } else {
            UploadState::None
        }
    }

    /// Build the upload request, or `None` when the pair is already uploaded.
    pub fn prepare(
        &self,
        session_id: &str,
        role: Role,
    ) -> Result<Option<ArtifactUpload>, ValidationError> {
        if self.uploaded {
            return Ok(None);
        }
        match (&self.bank_statement, &self.commitment_letter) {
            (Some(bank), Some(letter)) => Ok(Some(ArtifactUpload {
                session_id: session_id.to_string(),
                role,
                bank_statement: bank.clone(),
                commitment_letter: letter.clone(),
            })),
            _ => Err(ValidationError::MissingArtifacts),
        }
    }

    pub fn mark_uploaded(&mut self) {
        self.uploaded = true;
    }

    pub fn clear(&mut self) {
        self.bank_statement = None;
        self.commitment_letter = None;
        self.uploaded = false;
    }
}
