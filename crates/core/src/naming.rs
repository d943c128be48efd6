// crates/core/src/naming.rs
//! Filename helpers shared by the upload and download paths.
//!
//! Stored files are named `<job_id>_<sanitized name>`, so every job owns its
//! files exclusively and the presentable name can be reconstructed from the
//! suffix when nothing better is known.

/// Extensions accepted for upload (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &["epub"];

/// Name offered for download when nothing better can be recovered.
pub const FALLBACK_DOWNLOAD_NAME: &str = "converted.pdf";

const OUTPUT_EXTENSION: &str = ".pdf";

/// Whether `filename` carries one of [`ALLOWED_EXTENSIONS`].
pub fn is_allowed_upload(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Keeps ASCII letters, digits, `-`, `_` and `.`; path separators and
/// whitespace become `_`; leading dots and underscores are dropped so the
/// result can never be hidden or climb directories. Returns `"document"`
/// (plus the original extension, when it survives) if nothing usable is left.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.') {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else if c == '_' || c == '/' || c == '\\' || c.is_whitespace() {
            pending_sep = true;
        }
    }
    match out.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            let stem = stem.trim_matches(['.', '_']);
            if stem.is_empty() {
                format!("document.{ext}")
            } else {
                format!("{stem}.{ext}")
            }
        }
        _ => match out.trim_matches(['.', '_']) {
            "" => "document".to_string(),
            trimmed => trimmed.to_string(),
        },
    }
}

/// Presentable output name for an uploaded file: the original name with its
/// extension swapped for `.pdf`.
pub fn output_original_name(upload_name: &str) -> String {
    let stem = if upload_name.to_ascii_lowercase().ends_with(".epub") {
        &upload_name[..upload_name.len() - ".epub".len()]
    } else {
        upload_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(upload_name)
    };
    format!("{stem}{OUTPUT_EXTENSION}")
}

/// On-disk name for a file owned by `job_id`.
pub fn storage_filename(job_id: &str, sanitized: &str) -> String {
    format!("{job_id}_{sanitized}")
}

/// Best-effort presentable name recovered from a storage filename alone.
///
/// `"<id>_report.pdf"` becomes `"report.pdf"`; a suffix without the output
/// extension gets it forced on; a name without an id prefix is returned as
/// is.
pub fn name_from_storage_filename(storage: &str) -> String {
    let name = match storage.split_once('_') {
        Some((_, suffix)) if suffix.to_ascii_lowercase().ends_with(OUTPUT_EXTENSION) => {
            suffix.to_string()
        }
        Some((_, suffix)) => {
            let stem = suffix
                .rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(suffix);
            format!("{stem}{OUTPUT_EXTENSION}")
        }
        None => storage.to_string(),
    };

    if name.is_empty() || name == OUTPUT_EXTENSION {
        FALLBACK_DOWNLOAD_NAME.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_allowed_upload() {
        assert!(is_allowed_upload("book.epub"));
        assert!(is_allowed_upload("Book.EPUB"));
        assert!(!is_allowed_upload("book.pdf"));
        assert!(!is_allowed_upload("epub"));
        assert!(!is_allowed_upload(""));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Book.epub"), "My_Book.epub");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("a\\b c.epub"), "a_b_c.epub");
        assert_eq!(sanitize_filename(".hidden.epub"), "hidden.epub");
        assert_eq!(sanitize_filename("__init__.epub"), "init.epub");
        assert_eq!(sanitize_filename("notes."), "notes");
    }

    #[test]
    fn test_sanitize_filename_non_ascii_falls_back() {
        assert_eq!(sanitize_filename("三体.epub"), "document.epub");
        assert_eq!(sanitize_filename("三体"), "document");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn test_output_original_name() {
        assert_eq!(output_original_name("My Report.epub"), "My Report.pdf");
        assert_eq!(output_original_name("三体.EPUB"), "三体.pdf");
        assert_eq!(output_original_name("notes.txt"), "notes.pdf");
        assert_eq!(output_original_name("README"), "README.pdf");
    }

    #[test]
    fn test_storage_filename() {
        assert_eq!(storage_filename("abc", "report.pdf"), "abc_report.pdf");
    }

    #[test]
    fn test_name_from_storage_filename() {
        assert_eq!(
            name_from_storage_filename("5f0c7f9e-1111-2222-3333-444455556666_report.pdf"),
            "report.pdf"
        );
        assert_eq!(name_from_storage_filename("abc_My_Book.PDF"), "My_Book.PDF");
        assert_eq!(name_from_storage_filename("abc_book.epub"), "book.pdf");
        assert_eq!(name_from_storage_filename("abc_book"), "book.pdf");
        assert_eq!(name_from_storage_filename("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn test_name_from_storage_filename_fallback() {
        assert_eq!(name_from_storage_filename("abc_"), FALLBACK_DOWNLOAD_NAME);
        assert_eq!(name_from_storage_filename(""), FALLBACK_DOWNLOAD_NAME);
    }
}
