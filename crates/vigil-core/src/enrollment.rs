//! Enrollment form state and local validation.
//!
//! Submit is only offered once the form passes [`EnrollmentForm::check`].
//! The form itself never talks to the backend.

use crate::error::ValidationError;
use crate::user::{self, User};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Enroll a new face, or replace the face of an existing user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollMode {
    Enroll,
    ReEnroll,
}

/// A file picked by the operator, with its declared content type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageFile {
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

    /// Build from raw bytes, declaring the content type from the file
    /// extension and falling back to sniffing the bytes.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = declared_content_type(&file_name, &bytes);
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

fn declared_content_type(file_name: &str, bytes: &[u8]) -> String {
    ImageFormat::from_path(file_name)
        .or_else(|_| image::guess_format(bytes))
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_CONTENT_TYPE.to_string())
}

/// What the operator sees before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preview {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl Preview {
    /// Read the image header. `None` if the bytes are not a decodable image.
    pub fn inspect(bytes: &[u8]) -> Option<Self> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        let format = reader.format()?;
        let (width, height) = reader.into_dimensions().ok()?;
        Some(Self {
            width,
            height,
            format,
        })
    }
}

/// A validated, ready-to-send enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentSubmission {
    /// Trimmed name.
    pub name: String,
    pub image: ImageFile,
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentForm {
    name: String,
    file: Option<ImageFile>,
    preview: Option<Preview>,
}

impl EnrollmentForm {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn file(&self) -> Option<&ImageFile> {
        self.file.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Replace the selected file. A preview is produced only for images
    /// whose header can be read.
    pub fn select_file(&mut self, file: ImageFile) {
        self.preview = if file.is_image() {
            Preview::inspect(&file.bytes)
        } else {
            None
        };
        if self.preview.is_none() && file.is_image() {
            tracing::debug!(file = %file.file_name, "image header unreadable; no preview");
        }
        self.file = Some(file);
    }

    pub fn clear_file(&mut self) {
        self.file = None;
        self.preview = None;
    }

    /// Clear name, file and preview.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Check the form without building a submission.
    ///
    /// Re-enrollment additionally requires the name to match an entry of
    /// the fetched `directory` exactly.
    pub fn check(&self, mode: EnrollMode, directory: &[User]) -> Result<(), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let file = self.file.as_ref().ok_or(ValidationError::NoFile)?;
        if !file.is_image() {
            return Err(ValidationError::NotAnImage(file.content_type.clone()));
        }
        if mode == EnrollMode::ReEnroll && user::find(directory, name).is_none() {
            return Err(ValidationError::UnknownUser(name.to_string()));
        }
        Ok(())
    }

    pub fn can_submit(&self, mode: EnrollMode, directory: &[User]) -> bool {
        self.check(mode, directory).is_ok()
    }

    pub fn submission(
        &self,
        mode: EnrollMode,
        directory: &[User],
    ) -> Result<EnrollmentSubmission, ValidationError> {
        self.check(mode, directory)?;
        let image = self.file.clone().ok_or(ValidationError::NoFile)?;
        Ok(EnrollmentSubmission {
            name: self.name.trim().to_string(),
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn directory(names: &[&str]) -> Vec<User> {
        names
            .iter()
            .map(|n| User {
                name: n.to_string(),
                reminders: vec![],
            })
            .collect()
    }

    #[test]
    fn test_content_type_from_extension() {
        let file = ImageFile::from_bytes("face.JPG", vec![1, 2, 3]);
        assert_eq!(file.content_type, "image/jpeg");
        assert!(file.is_image());
    }

    #[test]
    fn test_content_type_sniffed_without_extension() {
        let file = ImageFile::from_bytes("upload", png_bytes(2, 2));
        assert_eq!(file.content_type, "image/png");
    }

    #[test]
    fn test_content_type_fallback() {
        let file = ImageFile::from_bytes("notes.txt", b"hello".to_vec());
        assert_eq!(file.content_type, FALLBACK_CONTENT_TYPE);
        assert!(!file.is_image());
    }

    #[test]
    fn test_preview_dimensions() {
        let mut form = EnrollmentForm::default();
        form.select_file(ImageFile::from_bytes("a.png", png_bytes(4, 3)));
        let preview = form.preview().unwrap();
        assert_eq!((preview.width, preview.height), (4, 3));
        assert_eq!(preview.format, ImageFormat::Png);
    }

    #[test]
    fn test_gating_truth_table() {
        let names = ["", "   ", "jane"];
        let files = [
            None,
            Some(ImageFile::new("doc.pdf", "application/pdf", vec![0])),
            Some(ImageFile::new("face.png", "image/png", png_bytes(1, 1))),
        ];
        for name in names {
            for file in &files {
                let mut form = EnrollmentForm::default();
                form.set_name(name);
                if let Some(f) = file {
                    form.select_file(f.clone());
                }
                let expected = !name.trim().is_empty()
                    && file.as_ref().map(|f| f.is_image()).unwrap_or(false);
                assert_eq!(
                    form.can_submit(EnrollMode::Enroll, &[]),
                    expected,
                    "name {name:?} file {file:?}"
                );
            }
        }
    }

    #[test]
    fn test_check_reports_reason() {
        let mut form = EnrollmentForm::default();
        assert_eq!(form.check(EnrollMode::Enroll, &[]), Err(ValidationError::EmptyName));
        form.set_name("jane");
        assert_eq!(form.check(EnrollMode::Enroll, &[]), Err(ValidationError::NoFile));
        form.select_file(ImageFile::new("x.txt", "text/plain", vec![]));
        assert_eq!(
            form.check(EnrollMode::Enroll, &[]),
            Err(ValidationError::NotAnImage("text/plain".into()))
        );
    }

    #[test]
    fn test_re_enroll_requires_directory_name() {
        let mut form = EnrollmentForm::default();
        form.set_name(" jane ");
        form.select_file(ImageFile::new("f.png", "image/png", png_bytes(1, 1)));

        assert_eq!(
            form.check(EnrollMode::ReEnroll, &directory(&["john"])),
            Err(ValidationError::UnknownUser("jane".into()))
        );
        assert!(form.can_submit(EnrollMode::ReEnroll, &directory(&["john", "jane"])));
        assert!(form.can_submit(EnrollMode::Enroll, &[]));
    }

    #[test]
    fn test_submission_trims_name_and_reset_clears() {
        let mut form = EnrollmentForm::default();
        form.set_name("  jane\t");
        form.select_file(ImageFile::new("f.png", "image/png", png_bytes(1, 1)));
        let submission = form.submission(EnrollMode::Enroll, &[]).unwrap();
        assert_eq!(submission.name, "jane");
        assert_eq!(submission.image.file_name, "f.png");

        form.reset();
        assert_eq!(form.name(), "");
        assert!(form.file().is_none());
        assert!(form.preview().is_none());
    }

    #[test]
    fn test_unreadable_image_still_submits() {
        let mut form = EnrollmentForm::default();
        form.set_name("jane");
        form.select_file(ImageFile::new("f.jpg", "image/jpeg", vec![0, 1, 2]));
        assert!(form.preview().is_none());
        assert!(form.can_submit(EnrollMode::Enroll, &[]));
    }
}
