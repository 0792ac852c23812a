/// Builder for creating disk images

use crate::boot::BootSector;
use crate::error::Result;
use crate::format::constants::CREATOR_SIGNATURE;
use crate::image::DiskImage;

/// Builder for constructing formatted disk images
#[derive(Debug, Clone)]
pub struct DiskImageBuilder {
    creator: String,
    label: Option<String>,
    boot_code: Option<Vec<u8>>,
}

impl DiskImageBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            creator: String::from_utf8_lossy(CREATOR_SIGNATURE).into_owned(),
            label: None,
            boot_code: None,
        }
    }

    /// Set the creator tag written to the disk info block
    pub fn creator(mut self, creator: &str) -> Self {
        self.creator = creator.to_string();
        self
    }

    /// Add a volume label entry
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Make the disk bootable with this Z80 code
    pub fn boot_code(mut self, code: &[u8]) -> Self {
        self.boot_code = Some(code.to_vec());
        self
    }

    /// Build the formatted image
    pub fn build(self) -> Result<DiskImage> {
        let mut image = DiskImage::create();
        image.header.set_creator(&self.creator);

        if let Some(label) = &self.label {
            image.set_label(label)?;
            image.flush_directory();
        }
        if let Some(code) = &self.boot_code {
            image.set_boot_sector(&BootSector::with_code(code)?)?;
        }

        log::debug!(
            "Built image creator='{}' label={:?} bootable={}",
            image.header.creator(),
            self.label,
            self.boot_code.is_some()
        );
        Ok(image)
    }
}

impl Default for DiskImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let image = DiskImageBuilder::new().build().unwrap();

        assert_eq!(image.header().creator(), "plus3dsk v0.1");
        assert!(image.label().is_none());
        assert!(image.boot_sector().unwrap().is_blank());
    }

    #[test]
    fn test_builder_custom() {
        let image = DiskImageBuilder::new()
            .creator("Tester")
            .label("GAMES")
            .boot_code(&[0xC9])
            .build()
            .unwrap();

        assert_eq!(image.header().creator(), "Tester");
        assert_eq!(image.label().as_deref(), Some("GAMES"));
        assert!(image.boot_sector().unwrap().is_bootable());
        assert_eq!(image.usage().file_count, 0);
    }

    #[test]
    fn test_builder_rejects_bad_label() {
        assert!(DiskImageBuilder::new().label("WAY TOO LONG LABEL").build().is_err());
    }
}
