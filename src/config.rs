#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    Check,
    Fix,
    Format,
}

impl ScanMode {
    pub fn needs_write(self) -> bool {
        !matches!(self, ScanMode::Check)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FillPattern {
    #[default]
    Zero,
    Random,
}

#[derive(Clone, Copy, Debug)]
pub struct ScanConfig {
    pub block_sectors: u64,
    pub direct_io: bool,
    pub fill: FillPattern,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            block_sectors: 8192,
            direct_io: true,
            fill: FillPattern::Zero,
        }
    }
}
