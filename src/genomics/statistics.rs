use crate::genomics::{Allele, Base, PositionRecord, NUM_BASES};

/// Most frequent allele that differs from the reference at one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DominantAllele {
    /// The allele.
    pub allele: Allele,
    /// Its fraction, using the same denominators as [`PositionRecord::allele_fraction`].
    pub fraction: f64,
}

/// Position whose dominant non-reference allele rises above the noise floor.
#[derive(Debug, Clone, PartialEq)]
pub struct PolymorphismEntry {
    /// Contig name.
    pub contig: String,
    /// Position (1-based).
    pub position: u32,
    /// Reference base as reported by the pileup.
    pub reference_base: char,
    /// Usable depth.
    pub depth: u32,
    /// Dominant non-reference allele.
    pub dominant: DominantAllele,
    /// Fractions for [A, C, G, T].
    pub fractions: [f64; NUM_BASES],
    /// Deletion fraction.
    pub deletion_fraction: f64,
    /// Insertion fraction.
    pub insertion_fraction: f64,
}

/// Pick the strongest non-reference allele among the four bases, deletions
/// and insertions. Ties keep the first candidate in `A, C, G, T, del, ins`
/// order. Returns `None` when nothing but the reference was observed.
pub fn dominant_non_reference(record: &PositionRecord) -> Option<DominantAllele> {
    let reference = record.reference();
    let candidates = Base::ALL
        .into_iter()
        .filter(|&base| Some(base) != reference)
        .map(Allele::Base)
        .chain([Allele::Deletion, Allele::Insertion]);

    let mut best: Option<DominantAllele> = None;
    for allele in candidates {
        let fraction = record.allele_fraction(allele);
        if fraction <= 0.0 {
            continue;
        }
        if best.map_or(true, |current| fraction > current.fraction) {
            best = Some(DominantAllele { allele, fraction });
        }
    }
    best
}

/// Every position whose dominant non-reference allele fraction is strictly
/// above `noise_threshold`, in stream order.
pub fn polymorphism_log(
    records: &[PositionRecord],
    noise_threshold: f64,
) -> Vec<PolymorphismEntry> {
    records
        .iter()
        .filter_map(|record| {
            let dominant = dominant_non_reference(record)?;
            if dominant.fraction <= noise_threshold {
                return None;
            }
            Some(PolymorphismEntry {
                contig: record.contig.to_string(),
                position: record.position,
                reference_base: char::from(record.reference_base),
                depth: record.depth,
                dominant,
                fractions: record.fractions(),
                deletion_fraction: record.deletion_fraction(),
                insertion_fraction: record.insertion_fraction(),
            })
        })
        .collect()
}
