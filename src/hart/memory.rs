//! Backing store of 16-bit cells
//!
//! Memory is addressed by cell index, not byte address; the MMU does
//! the translation. Writes can be masked to either byte lane of a
//! cell. Indices wrap modulo the number of cells, so an access that
//! runs off the end continues at cell 0.

use std::fmt;

use itertools::Itertools;

/// Bus access widths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wordsize {
    Byte,
    Halfword,
    Word,
}

impl Wordsize {
    pub fn width(&self) -> u8 {
        match self {
            Wordsize::Byte => 1,
            Wordsize::Halfword => 2,
            Wordsize::Word => 4,
        }
    }

    /// All-ones mask of the access width
    pub fn mask(&self) -> u32 {
        match self {
            Wordsize::Byte => 0xff,
            Wordsize::Halfword => 0xffff,
            Wordsize::Word => 0xffff_ffff,
        }
    }
}

impl fmt::Display for Wordsize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Wordsize::Byte => write!(f, "byte"),
            Wordsize::Halfword => write!(f, "half"),
            Wordsize::Word => write!(f, "word"),
        }
    }
}

/// Byte lanes of a cell enabled for a write. The low lane holds the
/// byte at the even address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lanes {
    Low,
    High,
    Both,
}

impl Lanes {
    fn mask(&self) -> u16 {
        match self {
            Lanes::Low => 0x00ff,
            Lanes::High => 0xff00,
            Lanes::Both => 0xffff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Zeroed memory of num_cells cells
    pub fn new(num_cells: usize) -> Self {
        Self {
            cells: vec![0; num_cells],
        }
    }

    pub fn from_cells(cells: Vec<u16>) -> Self {
        Self { cells }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    fn wrap(&self, index: usize) -> Option<usize> {
        index.checked_rem(self.cells.len())
    }

    /// Read the cell at index. Reading an empty memory gives zero.
    pub fn read(&self, index: usize) -> u16 {
        self.wrap(index).map_or(0, |index| self.cells[index])
    }

    /// Write the enabled lanes of value into the cell at index
    pub fn write(&mut self, index: usize, value: u16, lanes: Lanes) {
        if let Some(index) = self.wrap(index) {
            let mask = lanes.mask();
            let cell = &mut self.cells[index];
            *cell = (*cell & !mask) | (value & mask);
        }
    }

    /// Read the byte at a byte address, bypassing the MMU (used by
    /// the debug surface and tests)
    pub fn read_byte(&self, addr: u32) -> u8 {
        let cell = self.read((addr >> 1) as usize);
        if addr & 1 == 0 {
            cell as u8
        } else {
            (cell >> 8) as u8
        }
    }
}

impl fmt::Display for Memory {
    /// Hex dump, eight cells per line, skipping all-zero lines
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (line, chunk) in self.cells.chunks(8).enumerate() {
            if chunk.iter().all(|&cell| cell == 0) {
                continue;
            }
            let cells = chunk.iter().map(|cell| format!("{cell:04x}")).join(" ");
            writeln!(f, "{:06x}: {cells}", 16 * line)?;
        }
        Ok(())
    }
}
