use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Type of alignment to perform
///
/// Global alignment forces end-to-end alignment of the graph and the query. Semi-global alignment
/// aligns the whole query, but allows free gaps at the beginning and end of the graph. Local
/// alignment aligns any substring of the query to any path in the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignMode {
    #[default]
    Global,
    SemiGlobal,
    Local,
}

impl Display for AlignMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::SemiGlobal => write!(f, "semi-global"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl FromStr for AlignMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "semi-global" | "semiglobal" => Ok(Self::SemiGlobal),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown alignment mode '{s}'!"))
        }
    }
}

/// Gap-affine scoring parameters. Scores are maximized: matches are positive, the penalties
/// negative. A gap of length `L` scores `gap_open + L * gap_extend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlignParams {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl AlignParams {
    pub fn new(match_score: i32, mismatch: i32, gap_open: i32, gap_extend: i32) -> Self {
        Self { match_score, mismatch, gap_open, gap_extend }
    }

    #[inline(always)]
    pub fn substitution(&self, a: u8, b: u8) -> i32 {
        if a == b {
            self.match_score
        } else {
            self.mismatch
        }
    }

    #[inline(always)]
    pub fn gap_score(&self, length: usize) -> i32 {
        if length == 0 {
            0
        } else {
            self.gap_open + length as i32 * self.gap_extend
        }
    }
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            match_score: 3,
            mismatch: -5,
            gap_open: 0,
            gap_extend: -4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlignConfig {
    pub params: AlignParams,
    pub mode: AlignMode,
}

impl AlignConfig {
    pub fn new(params: AlignParams, mode: AlignMode) -> Self {
        Self { params, mode }
    }

    pub fn global() -> Self {
        Self::new(AlignParams::default(), AlignMode::Global)
    }

    pub fn semi_global() -> Self {
        Self::new(AlignParams::default(), AlignMode::SemiGlobal)
    }

    pub fn local() -> Self {
        Self::new(AlignParams::default(), AlignMode::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_score() {
        let params = AlignParams::new(2, -3, -5, -1);

        assert_eq!(params.gap_score(0), 0);
        assert_eq!(params.gap_score(1), -6);
        assert_eq!(params.gap_score(4), -9);
        assert_eq!(AlignParams::default().gap_score(3), -12);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("semi-global".parse::<AlignMode>(), Ok(AlignMode::SemiGlobal));
        assert_eq!("local".parse::<AlignMode>().map(|m| m.to_string()), Ok(String::from("local")));
        assert!("banded".parse::<AlignMode>().is_err());
    }

    #[test]
    fn test_config_serde() {
        let json = serde_json::to_string(&AlignConfig::local()).unwrap();
        assert!(json.contains("\"local\""));

        let config: AlignConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, AlignConfig::local());
    }
}
