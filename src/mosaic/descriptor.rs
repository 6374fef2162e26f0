//! Immutable map from grid cells to sub-tile source files

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use super::cell::{GridIndex, SubGridIndex};

/// Sub-tile layout and filenames for one cell
#[derive(Debug, Clone)]
struct CellFiles {
    sub_w: u32,
    sub_h: u32,
    /// Row-major by SubGridIndex; None where no file was declared
    files: Vec<Option<String>>,
}

impl CellFiles {
    fn slot(&self, sub: SubGridIndex) -> Option<&Option<String>> {
        if sub.i >= self.sub_w || sub.j >= self.sub_h {
            return None;
        }
        self.files.get((sub.j * self.sub_w + sub.i) as usize)
    }
}

/// Immutable descriptor of the mosaic grid
///
/// Built once, then only queried. Cells are kept in one flat row-major vec.
#[derive(Debug)]
pub struct GridDescriptor {
    width: u32,
    height: u32,
    cells: Vec<Option<CellFiles>>,
    do_cache: bool,
    use_cache: bool,
}

impl GridDescriptor {
    /// Build from a flat filename list: cells filled row-major, one sub-tile
    /// each. Fails without allocating cell storage when the file count does
    /// not match the declared grid size.
    pub fn from_files<S: AsRef<str>>(
        width: u32,
        height: u32,
        files: &[S],
        do_cache: bool,
        use_cache: bool,
    ) -> Result<Self> {
        let expected = width as usize * height as usize;
        if files.len() != expected {
            bail!(
                "file count {} does not match grid {}x{} ({} expected)",
                files.len(),
                width,
                height,
                expected
            );
        }

        let cells = files
            .iter()
            .map(|f| {
                Some(CellFiles {
                    sub_w: 1,
                    sub_h: 1,
                    files: vec![Some(f.as_ref().to_string())],
                })
            })
            .collect();

        Ok(Self {
            width,
            height,
            cells,
            do_cache,
            use_cache,
        })
    }

    /// Build from a descriptor text file with lines
    /// `GRID_I GRID_J SUBGRID_I SUBGRID_J FILENAME` (indices 1-4 digits).
    /// Lines that do not match the format are skipped without being reported.
    pub fn from_descriptor_file(path: &Path, do_cache: bool, use_cache: bool) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading descriptor {}", path.display()))?;

        let mut entries: Vec<(u32, u32, u32, u32, String)> = Vec::new();
        for line in text.lines() {
            if let Some(entry) = parse_descriptor_line(line) {
                entries.push(entry);
            }
        }
        if entries.is_empty() {
            bail!("descriptor {} contains no valid lines", path.display());
        }

        let width = entries.iter().map(|e| e.0).max().unwrap_or(0) + 1;
        let height = entries.iter().map(|e| e.1).max().unwrap_or(0) + 1;
        let mut cells: Vec<Option<CellFiles>> =
            vec![None; width as usize * height as usize];

        // First pass: per-cell sub-tile extent is 1 + max observed sub index
        for (gi, gj, si, sj, _) in &entries {
            let cell = cells[(gj * width + gi) as usize].get_or_insert(CellFiles {
                sub_w: 0,
                sub_h: 0,
                files: Vec::new(),
            });
            cell.sub_w = cell.sub_w.max(si + 1);
            cell.sub_h = cell.sub_h.max(sj + 1);
        }
        for cell in cells.iter_mut().flatten() {
            cell.files = vec![None; (cell.sub_w * cell.sub_h) as usize];
        }

        for (gi, gj, si, sj, file) in entries {
            if let Some(cell) = &mut cells[(gj * width + gi) as usize] {
                cell.files[(sj * cell.sub_w + si) as usize] = Some(file);
            }
        }

        Ok(Self {
            width,
            height,
            cells,
            do_cache,
            use_cache,
        })
    }

    pub fn grid_w(&self) -> u32 {
        self.width
    }

    pub fn grid_h(&self) -> u32 {
        self.height
    }

    pub fn do_cache(&self) -> bool {
        self.do_cache
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn contains(&self, idx: GridIndex) -> bool {
        idx.i >= 0 && idx.j >= 0 && (idx.i as u32) < self.width && (idx.j as u32) < self.height
    }

    fn cell(&self, idx: GridIndex) -> Option<&CellFiles> {
        if !self.contains(idx) {
            return None;
        }
        self.cells[(idx.j as u32 * self.width + idx.i as u32) as usize].as_ref()
    }

    /// True if any sub-tile of this cell has a declared source file
    pub fn square_has_data(&self, idx: GridIndex) -> bool {
        self.cell(idx)
            .map(|c| c.files.iter().any(|f| f.is_some()))
            .unwrap_or(false)
    }

    /// Sub-tile columns of a cell (0 for cells without data)
    pub fn subgrid_w(&self, idx: GridIndex) -> u32 {
        self.cell(idx).map(|c| c.sub_w).unwrap_or(0)
    }

    /// Sub-tile rows of a cell (0 for cells without data)
    pub fn subgrid_h(&self, idx: GridIndex) -> u32 {
        self.cell(idx).map(|c| c.sub_h).unwrap_or(0)
    }

    pub fn subgrid_has_data(&self, idx: GridIndex, sub: SubGridIndex) -> bool {
        self.cell(idx)
            .and_then(|c| c.slot(sub))
            .map(|f| f.is_some())
            .unwrap_or(false)
    }

    pub fn filename(&self, idx: GridIndex, sub: SubGridIndex) -> Option<&str> {
        self.cell(idx)
            .and_then(|c| c.slot(sub))
            .and_then(|f| f.as_deref())
    }
}

/// A descriptor index token: 1-4 ASCII digits
fn parse_index(token: &str) -> Option<u32> {
    if token.is_empty() || token.len() > 4 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn parse_descriptor_line(line: &str) -> Option<(u32, u32, u32, u32, String)> {
    let mut parts = line.split_whitespace();
    let gi = parse_index(parts.next()?)?;
    let gj = parse_index(parts.next()?)?;
    let si = parse_index(parts.next()?)?;
    let sj = parse_index(parts.next()?)?;
    let file = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((gi, gj, si, sj, file.to_string()))
}
