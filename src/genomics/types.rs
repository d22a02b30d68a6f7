use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of canonical nucleotides tracked per position.
pub const NUM_BASES: usize = 4; // A, C, G, T

/// Canonical nucleotide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Base {
    /// Adenine.
    A,
    /// Cytosine.
    C,
    /// Guanine.
    G,
    /// Thymine.
    T,
}

impl Base {
    /// All bases in tally order.
    pub const ALL: [Base; NUM_BASES] = [Base::A, Base::C, Base::G, Base::T];

    /// Decode an ASCII nucleotide, ignoring case. `U` is read as `T`.
    pub fn from_ascii(byte: u8) -> Option<Self> {
        match byte {
            b'A' | b'a' => Some(Base::A),
            b'C' | b'c' => Some(Base::C),
            b'G' | b'g' => Some(Base::G),
            b'T' | b't' | b'U' | b'u' => Some(Base::T),
            _ => None,
        }
    }

    /// Index of the base in `[A, C, G, T]` tallies.
    pub fn index(self) -> usize {
        match self {
            Base::A => 0,
            Base::C => 1,
            Base::G => 2,
            Base::T => 3,
        }
    }

    /// Uppercase ASCII character for the base.
    pub fn as_char(self) -> char {
        match self {
            Base::A => 'A',
            Base::C => 'C',
            Base::G => 'G',
            Base::T => 'T',
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Allele observed at a diagnostic site: a nucleotide or an indel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Allele {
    /// Single nucleotide.
    Base(Base),
    /// Deletion of the reference base.
    Deletion,
    /// Insertion following the reference base.
    Insertion,
}

impl fmt::Display for Allele {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allele::Base(base) => write!(f, "{base}"),
            Allele::Deletion => f.write_str("del"),
            Allele::Insertion => f.write_str("ins"),
        }
    }
}

impl FromStr for Allele {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "del" | "deletion" | "-" | "*" => Ok(Allele::Deletion),
            "ins" | "insertion" | "+" => Ok(Allele::Insertion),
            _ if trimmed.len() == 1 => Base::from_ascii(trimmed.as_bytes()[0])
                .map(Allele::Base)
                .ok_or_else(|| format!("unrecognised allele '{trimmed}'")),
            _ => Err(format!("unrecognised allele '{trimmed}'")),
        }
    }
}

impl TryFrom<String> for Allele {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Allele> for String {
    fn from(value: Allele) -> Self {
        value.to_string()
    }
}

/// Genomic region typed independently by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// ABO exon 6 (carries c.261delG).
    Exon6,
    /// ABO exon 7 (carries the A/B-defining substitutions).
    Exon7,
}

impl Region {
    /// Both regions in report order.
    pub const ALL: [Region; 2] = [Region::Exon6, Region::Exon7];

    /// Lowercase label used in file names and tables.
    pub fn label(self) -> &'static str {
        match self {
            Region::Exon6 => "exon6",
            Region::Exon7 => "exon7",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exon6" | "6" => Ok(Region::Exon6),
            "exon7" | "7" => Ok(Region::Exon7),
            other => Err(format!("unknown region '{other}' (expected exon6 or exon7)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allele_parses_bases_and_indels() {
        assert_eq!("g".parse::<Allele>().unwrap(), Allele::Base(Base::G));
        assert_eq!("DEL".parse::<Allele>().unwrap(), Allele::Deletion);
        assert_eq!("+".parse::<Allele>().unwrap(), Allele::Insertion);
        assert!("N".parse::<Allele>().is_err());
        assert!("AC".parse::<Allele>().is_err());
    }

    #[test]
    fn region_labels_round_trip() {
        for region in Region::ALL {
            assert_eq!(region.label().parse::<Region>().unwrap(), region);
        }
        assert!("exon5".parse::<Region>().is_err());
    }
}
