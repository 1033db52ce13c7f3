//! Boot images
//!
//! Memory is loaded at construction from a flat little-endian byte
//! image, two bytes per 16-bit cell. The image can come from a raw
//! binary file, from the allocated sections of an ELF executable, or
//! directly from a list of instruction words (handy for tests).

use std::path::Path;

use elf::abi::SHF_ALLOC;
use elf::endian::AnyEndian;
use elf::section::SectionHeader;
use elf::string_table::StringTable;
use elf::ElfBytes;
use thiserror::Error;

use crate::config::MAX_MEMORY_BYTES;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse elf file: {0}")]
    Elf(#[from] elf::ParseError),
    #[error("elf file has no section headers")]
    NoSections,
    #[error("section {0} is compressed, which is not supported")]
    Compressed(String),
    #[error("image of {size} bytes does not fit in {capacity} bytes of memory")]
    TooLarge { size: usize, capacity: usize },
}

/// A flat byte image whose byte n is loaded at address n
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootImage {
    bytes: Vec<u8>,
}

impl BootImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Image made of 32-bit words, stored little-endian from address 0
    pub fn from_words(words: &[u32]) -> Self {
        let bytes = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        Self { bytes }
    }

    /// Read a raw binary file (e.g. the output of objcopy -O binary)
    pub fn from_binary(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let bytes = std::fs::read(path)?;
        log::info!("loaded {} byte binary image", bytes.len());
        Ok(Self { bytes })
    }

    /// Read an ELF file and place every allocated section (the ones
    /// meant to be present during program execution) at its load
    /// address
    pub fn from_elf(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let file_data = std::fs::read(path)?;
        Self::from_elf_bytes(&file_data)
    }

    pub fn from_elf_bytes(file_data: &[u8]) -> Result<Self, ImageError> {
        let file = ElfBytes::<AnyEndian>::minimal_parse(file_data)?;
        let (section_headers, strtab) = file.section_headers_with_strtab()?;
        let section_headers = section_headers.ok_or(ImageError::NoSections)?;

        let mut image = Self::default();
        for header in section_headers.iter() {
            if header.sh_flags & u64::from(SHF_ALLOC) == 0 {
                continue;
            }
            let name = section_name(&header, strtab.as_ref());
            let (data, compression) = file.section_data(&header)?;
            if compression.is_some() {
                return Err(ImageError::Compressed(name));
            }
            log::info!(
                "loading section {name}: {} bytes at 0x{:x}",
                data.len(),
                header.sh_addr
            );
            let addr = usize::try_from(header.sh_addr).ok();
            let end = addr.and_then(|addr| addr.checked_add(data.len()));
            let (Some(addr), Some(end)) = (addr, end) else {
                return Err(ImageError::TooLarge {
                    size: usize::MAX,
                    capacity: MAX_MEMORY_BYTES,
                });
            };
            if end > MAX_MEMORY_BYTES {
                return Err(ImageError::TooLarge {
                    size: end,
                    capacity: MAX_MEMORY_BYTES,
                });
            }
            image.place(addr, data);
        }
        Ok(image)
    }

    /// Copy data into the image at addr, growing the image if needed
    fn place(&mut self, addr: usize, data: &[u8]) {
        let end = addr + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[addr..end].copy_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pack the image into num_cells 16-bit cells. Byte 2n is the
    /// low lane of cell n and byte 2n+1 the high lane; an odd
    /// trailing byte sits in the low lane of the last cell with the
    /// high lane zero. Cells past the end of the image are zero.
    pub fn to_cells(&self, num_cells: usize) -> Result<Vec<u16>, ImageError> {
        let capacity = 2 * num_cells;
        if self.bytes.len() > capacity {
            return Err(ImageError::TooLarge {
                size: self.bytes.len(),
                capacity,
            });
        }
        let mut cells: Vec<u16> = self
            .bytes
            .chunks(2)
            .map(|pair| u16::from(pair[0]) | u16::from(*pair.get(1).unwrap_or(&0)) << 8)
            .collect();
        cells.resize(num_cells, 0);
        Ok(cells)
    }
}

fn section_name(header: &SectionHeader, strtab: Option<&StringTable>) -> String {
    strtab
        .and_then(|strtab| strtab.get(header.sh_name as usize).ok())
        .unwrap_or("<unnamed>")
        .to_string()
}
