//! Nuclei classes predicted by CellViT (PanNuke label set).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellClass {
    Unk = 0,
    Neoplastic = 1,
    Inflammatory = 2,
    Connective = 3,
    Dead = 4,
    Epithelial = 5,
}

impl CellClass {
    /// All classes in label-index order.
    pub const ALL: [CellClass; 6] = [
        CellClass::Unk,
        CellClass::Neoplastic,
        CellClass::Inflammatory,
        CellClass::Connective,
        CellClass::Dead,
        CellClass::Epithelial,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CellClass::Unk => "UNK",
            CellClass::Neoplastic => "Neoplastic",
            CellClass::Inflammatory => "Inflammatory",
            CellClass::Connective => "Connective",
            CellClass::Dead => "Dead",
            CellClass::Epithelial => "Epithelial",
        }
    }
}

impl fmt::Display for CellClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown cell class {:?}", s))
    }
}

/// Per-class probabilities; classes missing from the source read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClassDistribution([f64; 6]);

impl ClassDistribution {
    pub fn get(&self, class: CellClass) -> f64 {
        self.0[class.index()]
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Iterate `(class, probability)` in label-index order.
    pub fn iter(&self) -> impl Iterator<Item = (CellClass, f64)> + '_ {
        CellClass::ALL.iter().map(move |&c| (c, self.get(c)))
    }
}

/// Looks every class up by its name; other keys are ignored.
impl From<&HashMap<String, f64>> for ClassDistribution {
    fn from(raw: &HashMap<String, f64>) -> Self {
        let mut probs = [0.0; 6];
        for class in CellClass::ALL {
            probs[class.index()] = raw.get(class.name()).copied().unwrap_or(0.0);
        }
        ClassDistribution(probs)
    }
}
