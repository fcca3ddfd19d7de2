use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Categories under which migrated attachment files are stored. The list is
/// intentionally finite and comprised of filesystem safe identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentCategory {
    VehicleImages,
    ServiceFiles,
    InvoiceDocuments,
}

impl AttachmentCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            AttachmentCategory::VehicleImages => "vehicle_images",
            AttachmentCategory::ServiceFiles => "service_files",
            AttachmentCategory::InvoiceDocuments => "invoice_documents",
        }
    }
}

impl fmt::Display for AttachmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata recorded for a successfully migrated attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// Locator relative to the storage base: `<org>/<category>/<file>`.
    pub relative_path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub is_image: bool,
}

/// Extensions treated as images for categorization purposes.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "heic"];

/// Tenant-scoped durable attachment storage, laid out as
/// `<base>/<organization_id>/<category>/<file>`.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    base: PathBuf,
}

impl AttachmentStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Copy a source file into durable storage.
    ///
    /// Returns `None` when the source cannot be read or the copy fails; the
    /// caller skips that attachment and continues. Metadata is only produced
    /// after the copy succeeded.
    pub fn store_file(
        &self,
        organization_id: &str,
        category: AttachmentCategory,
        foreign_id: &str,
        source: &Path,
    ) -> Option<StoredAttachment> {
        let original_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = format!("{}_{}", sanitize_file_name(foreign_id), {
            let sanitized = sanitize_file_name(&original_name);
            if sanitized.is_empty() {
                "file".to_string()
            } else {
                sanitized
            }
        });

        let dir = self.base.join(organization_id).join(category.as_str());
        let target = dir.join(&file_name);

        let copied = fs::create_dir_all(&dir)
            .and_then(|_| fs::copy(source, &target));
        let size_bytes = match copied {
            Ok(size) => size,
            Err(err) => {
                warn!(
                    target: "wrenchcloud",
                    event = "attachment_skipped",
                    source = %source.display(),
                    category = category.as_str(),
                    error = %err
                );
                return None;
            }
        };

        Some(StoredAttachment {
            relative_path: format!(
                "{}/{}/{}",
                organization_id,
                category.as_str(),
                file_name
            ),
            mime_type: mime_for_name(&file_name),
            is_image: is_image_name(&file_name),
            file_name,
            size_bytes,
        })
    }
}

/// Strip every character outside the safe `[A-Za-z0-9._-]` set.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// MIME type from the file extension, generic binary for unknown extensions.
pub fn mime_for_name(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
