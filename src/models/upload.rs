use std::path::Path;

use anyhow::{Context, Result};

pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// A user-selected file (receipt image or statement) held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the content type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = content_type_for(&file_name).to_string();
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Content type from a file extension; unknown extensions are treated as
/// JPEG images, which is what receipt cameras produce.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("fis.PNG"), "image/png");
        assert_eq!(content_type_for("ekstre.pdf"), "application/pdf");
        assert_eq!(content_type_for("photo"), "image/jpeg");
    }

    #[test]
    fn from_path_reads_bytes_and_name() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("statement.pdf");
        std::fs::write(&path, b"%PDF-1.4")?;

        let upload = Upload::from_path(&path)?;
        assert_eq!(upload.file_name, "statement.pdf");
        assert_eq!(upload.content_type, "application/pdf");
        assert!(!upload.is_image());
        assert_eq!(upload.len(), 8);
        Ok(())
    }
}
